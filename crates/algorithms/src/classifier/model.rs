//! Classifier selection and model persistence

use dtclassifier_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

use super::forest::{ForestParams, RandomForest};
use super::tree::{DecisionTree, TreeParams};
use crate::training::TrainingSet;

/// Identifier written in every model file
pub const MODEL_FORMAT: &str = "dtclassifier-model";
/// Current model file version
pub const MODEL_VERSION: u32 = 1;
/// Name given to models saved without one
pub const DEFAULT_MODEL_NAME: &str = "MyTree";

/// Which classifier to train
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassifierKind {
    DecisionTree,
    #[default]
    RandomForest,
}

impl std::fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifierKind::DecisionTree => write!(f, "decision tree"),
            ClassifierKind::RandomForest => write!(f, "random forest"),
        }
    }
}

/// Training options for [`ClassifierModel::train`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainOptions {
    pub kind: ClassifierKind,
    /// Treat labels and features as categories (classification) instead of
    /// training on the label as a continuous response
    pub discrete: bool,
    pub tree: TreeParams,
    pub forest: ForestParams,
}

/// A trained classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClassifierModel {
    DecisionTree(DecisionTree),
    RandomForest(RandomForest),
}

#[derive(Serialize, Deserialize)]
struct ModelDocument {
    format: String,
    version: u32,
    name: String,
    model: ClassifierModel,
}

impl ClassifierModel {
    /// Train on a set holding both presence and absence samples
    pub fn train(set: &TrainingSet, options: &TrainOptions) -> Result<Self> {
        set.ensure_trainable()?;
        let model = match options.kind {
            ClassifierKind::DecisionTree => {
                ClassifierModel::DecisionTree(DecisionTree::fit(set.features(), set.labels(), &options.tree, options.discrete)?)
            }
            ClassifierKind::RandomForest => ClassifierModel::RandomForest(RandomForest::fit(
                set.features(),
                set.labels(),
                &options.forest,
                options.discrete,
            )?),
        };
        info!(kind = %options.kind, discrete = options.discrete, samples = set.len(), "trained classifier");
        Ok(model)
    }

    pub fn kind(&self) -> ClassifierKind {
        match self {
            ClassifierModel::DecisionTree(_) => ClassifierKind::DecisionTree,
            ClassifierModel::RandomForest(_) => ClassifierKind::RandomForest,
        }
    }

    pub fn is_discrete(&self) -> bool {
        match self {
            ClassifierModel::DecisionTree(t) => t.is_discrete(),
            ClassifierModel::RandomForest(f) => f.is_discrete(),
        }
    }

    /// Number of band values a row must carry
    pub fn n_features(&self) -> usize {
        match self {
            ClassifierModel::DecisionTree(t) => t.n_features(),
            ClassifierModel::RandomForest(f) => f.n_features(),
        }
    }

    /// Prediction for one row of band values; NaN marks a missing value
    pub fn predict(&self, row: &[f64]) -> f64 {
        match self {
            ClassifierModel::DecisionTree(t) => t.predict(row),
            ClassifierModel::RandomForest(f) => f.predict(row),
        }
    }

    /// Write the model as JSON under `name`
    pub fn save(&self, path: &Path, name: &str) -> Result<()> {
        let writer_err = |reason: String| Error::Writer {
            path: path.to_path_buf(),
            reason,
        };
        let document = ModelDocument {
            format: MODEL_FORMAT.to_string(),
            version: MODEL_VERSION,
            name: name.to_string(),
            model: self.clone(),
        };
        let file = File::create(path).map_err(|e| writer_err(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &document).map_err(|e| writer_err(e.to_string()))?;
        writer.flush().map_err(|e| writer_err(e.to_string()))?;
        info!(path = %path.display(), name, kind = %self.kind(), "saved model");
        Ok(())
    }

    /// Read a model saved by [`ClassifierModel::save`]
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_named(path).map(|(_, model)| model)
    }

    /// Read a model and the name it was saved under
    pub fn load_named(path: &Path) -> Result<(String, Self)> {
        if !path.exists() {
            return Err(Error::InputNotFound { path: path.to_path_buf() });
        }
        let reader = BufReader::new(File::open(path)?);
        let document: ModelDocument =
            serde_json::from_reader(reader).map_err(|e| Error::Model(format!("{}: {}", path.display(), e)))?;
        if document.format != MODEL_FORMAT {
            return Err(Error::Model(format!(
                "{}: unknown format '{}'",
                path.display(),
                document.format
            )));
        }
        if document.version != MODEL_VERSION {
            return Err(Error::Model(format!(
                "{}: unsupported version {}",
                path.display(),
                document.version
            )));
        }
        info!(path = %path.display(), name = %document.name, kind = %document.model.kind(), "loaded model");
        Ok((document.name, document.model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::Sample;
    use tempfile::TempDir;

    fn training_set() -> TrainingSet {
        let samples: Vec<Sample> = (0..40)
            .map(|i| {
                let presence = i % 2 == 0;
                let base = if presence { 8.0 } else { 2.0 };
                Sample {
                    values: vec![base + (i % 5) as f64 * 0.25, (i % 3) as f64],
                    label: i32::from(presence),
                    x: i as f64,
                    y: 0.0,
                }
            })
            .collect();
        TrainingSet::from_samples(&samples, 2).unwrap()
    }

    #[test]
    fn test_train_dispatches_on_kind() {
        let set = training_set();
        let tree = ClassifierModel::train(
            &set,
            &TrainOptions {
                kind: ClassifierKind::DecisionTree,
                discrete: true,
                ..TrainOptions::default()
            },
        )
        .unwrap();
        assert_eq!(tree.kind(), ClassifierKind::DecisionTree);
        assert!(tree.is_discrete());
        assert_eq!(tree.n_features(), 2);
        assert_eq!(tree.predict(&[8.5, 1.0]), 1.0);

        let forest = ClassifierModel::train(&set, &TrainOptions::default()).unwrap();
        assert_eq!(forest.kind(), ClassifierKind::RandomForest);
        assert!(!forest.is_discrete());
    }

    #[test]
    fn test_degenerate_set_rejected() {
        let samples = vec![Sample {
            values: vec![1.0],
            label: 1,
            x: 0.0,
            y: 0.0,
        }];
        let set = TrainingSet::from_samples(&samples, 1).unwrap();
        let err = ClassifierModel::train(&set, &TrainOptions::default()).unwrap_err();
        assert!(matches!(err, Error::DegenerateTrainingSet { presence: 1, absence: 0 }));
    }

    #[test]
    fn test_save_load_predicts_identically() {
        let dir = TempDir::new().unwrap();
        let set = training_set();
        for kind in [ClassifierKind::DecisionTree, ClassifierKind::RandomForest] {
            let model = ClassifierModel::train(
                &set,
                &TrainOptions {
                    kind,
                    ..TrainOptions::default()
                },
            )
            .unwrap();
            let path = dir.path().join(format!("{:?}.json", kind));
            model.save(&path, DEFAULT_MODEL_NAME).unwrap();

            let (name, loaded) = ClassifierModel::load_named(&path).unwrap();
            assert_eq!(name, DEFAULT_MODEL_NAME);
            assert_eq!(loaded.kind(), kind);
            for i in 0..set.len() {
                let mut row = set.row(i).to_vec();
                row[0] += 0.1;
                assert_eq!(model.predict(&row).to_bits(), loaded.predict(&row).to_bits());
            }
        }
    }

    #[test]
    fn test_load_missing_file() {
        let err = ClassifierModel::load(Path::new("/nonexistent/model.json")).unwrap_err();
        assert!(matches!(err, Error::InputNotFound { .. }));
    }

    #[test]
    fn test_load_rejects_foreign_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("other.json");
        std::fs::write(&path, r#"{"format":"something-else","version":1,"name":"x","model":{}}"#).unwrap();
        assert!(matches!(ClassifierModel::load(&path), Err(Error::Model(_))));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(ClassifierModel::load(&path), Err(Error::Model(_))));
    }
}
