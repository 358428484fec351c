//! Run configuration and its validation

use dtclassifier_core::{Error, Result};
use std::path::{Path, PathBuf};

use crate::classifier::{ClassifierKind, ForestParams, TrainOptions, TreeParams, DEFAULT_MODEL_NAME};
use crate::morphology::GeneralizeMethod;
use crate::sampling::ExtractParams;

/// Where the classifier comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrainingSource {
    /// A saved model; no training set is built
    Model(PathBuf),
    /// A saved train layer
    TrainLayer(PathBuf),
    /// Presence and absence layers sampled against the input rasters
    Layers,
}

/// Immutable description of one classification run
#[derive(Debug, Clone)]
pub struct ClassificationConfig {
    pub input_rasters: Vec<PathBuf>,
    pub presence: Vec<PathBuf>,
    pub absence: Vec<PathBuf>,
    /// Classified raster to write
    pub output_raster: Option<PathBuf>,
    pub save_model: Option<PathBuf>,
    pub save_train_layer: Option<PathBuf>,
    /// Load this model instead of training
    pub use_model: Option<PathBuf>,
    /// Load the training set from this point layer
    pub use_train_layer: Option<PathBuf>,
    pub classifier: ClassifierKind,
    /// Categorical features and labels; Byte output
    pub discrete_labels: bool,
    /// Generalize the classified raster with this kernel size
    pub generalize: Option<usize>,
    pub generalize_method: GeneralizeMethod,
    pub model_name: String,
    pub tree: TreeParams,
    pub forest: ForestParams,
    pub extract: ExtractParams,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            input_rasters: Vec::new(),
            presence: Vec::new(),
            absence: Vec::new(),
            output_raster: None,
            save_model: None,
            save_train_layer: None,
            use_model: None,
            use_train_layer: None,
            classifier: ClassifierKind::default(),
            discrete_labels: false,
            generalize: None,
            generalize_method: GeneralizeMethod::default(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            tree: TreeParams::default(),
            forest: ForestParams::default(),
            extract: ExtractParams::default(),
        }
    }
}

fn invalid(name: &'static str, value: impl ToString, reason: &str) -> Error {
    Error::InvalidParameter {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn require_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(Error::InputNotFound { path: path.to_path_buf() })
    }
}

impl ClassificationConfig {
    /// Which source of training data this run uses. A model wins over a train
    /// layer, which wins over presence/absence layers.
    pub fn training_source(&self) -> TrainingSource {
        if let Some(model) = &self.use_model {
            TrainingSource::Model(model.clone())
        } else if let Some(layer) = &self.use_train_layer {
            TrainingSource::TrainLayer(layer.clone())
        } else {
            TrainingSource::Layers
        }
    }

    pub fn train_options(&self) -> TrainOptions {
        TrainOptions {
            kind: self.classifier,
            discrete: self.discrete_labels,
            tree: self.tree.clone(),
            forest: self.forest.clone(),
        }
    }

    /// Check the configuration before any input is opened.
    ///
    /// Every referenced input must exist; missing ones fail with
    /// [`Error::InputNotFound`]. Inconsistent combinations fail with
    /// [`Error::InvalidParameter`].
    pub fn validate(&self) -> Result<()> {
        let source = self.training_source();

        for path in &self.input_rasters {
            require_exists(path)?;
        }
        match &source {
            TrainingSource::Model(path) | TrainingSource::TrainLayer(path) => require_exists(path)?,
            TrainingSource::Layers => {
                for path in self.presence.iter().chain(&self.absence) {
                    require_exists(path)?;
                }
            }
        }

        if self.output_raster.is_none() && self.save_model.is_none() && self.save_train_layer.is_none() {
            return Err(invalid(
                "outputs",
                "none",
                "at least one of classify, save_model or save_train_layer is required",
            ));
        }
        if self.output_raster.is_some() && self.input_rasters.is_empty() {
            return Err(invalid("input_rasters", "none", "classification needs at least one input raster"));
        }

        match source {
            TrainingSource::Model(_) => {
                if self.save_train_layer.is_some() {
                    return Err(invalid(
                        "save_train_layer",
                        "set",
                        "a loaded model carries no training set to save",
                    ));
                }
            }
            TrainingSource::TrainLayer(_) => {}
            TrainingSource::Layers => {
                if self.presence.is_empty() || self.absence.is_empty() {
                    return Err(invalid(
                        "presence/absence",
                        format!("{} presence, {} absence", self.presence.len(), self.absence.len()),
                        "training needs at least one presence and one absence layer",
                    ));
                }
                if self.input_rasters.is_empty() {
                    return Err(invalid("input_rasters", "none", "sampling needs at least one input raster"));
                }
            }
        }

        if let Some(kernel) = self.generalize {
            if self.output_raster.is_none() {
                return Err(invalid("generalize", kernel, "generalization needs a classified output"));
            }
            if kernel == 0 {
                return Err(invalid("generalize", kernel, "kernel size must be at least 1"));
            }
        }
        if self.model_name.trim().is_empty() {
            return Err(invalid("model_name", "", "model name must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Inputs {
        _dir: TempDir,
        raster: PathBuf,
        presence: PathBuf,
        absence: PathBuf,
        out: PathBuf,
    }

    fn inputs() -> Inputs {
        let dir = TempDir::new().unwrap();
        let touch = |name: &str| {
            let p = dir.path().join(name);
            std::fs::write(&p, b"").unwrap();
            p
        };
        let raster = touch("bands.tif");
        let presence = touch("presence.geojson");
        let absence = touch("absence.geojson");
        let out = dir.path().join("classes.tif");
        Inputs {
            _dir: dir,
            raster,
            presence,
            absence,
            out,
        }
    }

    fn base(i: &Inputs) -> ClassificationConfig {
        ClassificationConfig {
            input_rasters: vec![i.raster.clone()],
            presence: vec![i.presence.clone()],
            absence: vec![i.absence.clone()],
            output_raster: Some(i.out.clone()),
            ..ClassificationConfig::default()
        }
    }

    #[test]
    fn test_valid_config() {
        let i = inputs();
        assert!(base(&i).validate().is_ok());
        assert_eq!(base(&i).training_source(), TrainingSource::Layers);
    }

    #[test]
    fn test_missing_input() {
        let i = inputs();
        let config = ClassificationConfig {
            presence: vec![i.presence.with_file_name("nope.geojson")],
            ..base(&i)
        };
        assert!(matches!(config.validate(), Err(Error::InputNotFound { .. })));
    }

    #[test]
    fn test_needs_an_output() {
        let i = inputs();
        let config = ClassificationConfig {
            output_raster: None,
            ..base(&i)
        };
        assert!(matches!(config.validate(), Err(Error::InvalidParameter { name: "outputs", .. })));
    }

    #[test]
    fn test_needs_both_label_sets() {
        let i = inputs();
        let config = ClassificationConfig {
            absence: vec![],
            ..base(&i)
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_model_overrides_layers() {
        let i = inputs();
        let config = ClassificationConfig {
            use_model: Some(i.presence.clone()),
            use_train_layer: Some(i.absence.clone()),
            presence: vec![i.raster.with_file_name("ignored.geojson")],
            absence: vec![],
            ..base(&i)
        };
        assert_eq!(config.training_source(), TrainingSource::Model(i.presence.clone()));
        // ignored layers are not checked
        assert!(config.validate().is_ok());

        let config = ClassificationConfig {
            save_train_layer: Some(i.out.with_extension("geojson")),
            ..config
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_generalize_rules() {
        let i = inputs();
        let config = ClassificationConfig {
            generalize: Some(0),
            ..base(&i)
        };
        assert!(config.validate().is_err());

        let config = ClassificationConfig {
            generalize: Some(2),
            output_raster: None,
            save_model: Some(i.out.with_extension("json")),
            ..base(&i)
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_classify_needs_rasters() {
        let i = inputs();
        let config = ClassificationConfig {
            input_rasters: vec![],
            use_model: Some(i.presence.clone()),
            ..base(&i)
        };
        assert!(config.validate().is_err());
    }
}
