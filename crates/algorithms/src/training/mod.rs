//! Feature matrix assembly from presence/absence layers
//!
//! Samples are appended presence first, then absence, layer by layer, with no
//! de-duplication. A set can be persisted as a point layer carrying one
//! `Band_<i>` attribute per band and a `Class` attribute, and read back from
//! such a layer.

use dtclassifier_core::io::RasterSource;
use dtclassifier_core::vector::{AttributeType, AttributeValue, Feature, FieldDef, GeometryKind, VectorLayer};
use dtclassifier_core::{Error, Result, CRS};
use geo::{Geometry, Point};
use ndarray::{Array2, ArrayView1, ArrayView2};
use tracing::{debug, info};

use crate::progress::StepContext;
use crate::sampling::{ExtractParams, Sample, SampleExtractor};

/// Label of presence samples
pub const PRESENCE: i32 = 1;
/// Label of absence samples
pub const ABSENCE: i32 = 0;

const CLASS_FIELD: &str = "Class";

fn band_field(index: usize) -> String {
    format!("Band_{}", index + 1)
}

/// Row-aligned feature matrix and label vector
#[derive(Debug, Clone)]
pub struct TrainingSet {
    features: Array2<f64>,
    labels: Vec<i32>,
    coords: Vec<(f64, f64)>,
}

impl TrainingSet {
    /// Assemble a set from samples, all with `n_features` values
    pub fn from_samples(samples: &[Sample], n_features: usize) -> Result<Self> {
        let mut features = Array2::zeros((samples.len(), n_features));
        for (i, sample) in samples.iter().enumerate() {
            if sample.values.len() != n_features {
                return Err(Error::BandMismatch {
                    expected: n_features,
                    actual: sample.values.len(),
                });
            }
            for (j, &v) in sample.values.iter().enumerate() {
                features[[i, j]] = v;
            }
        }
        Ok(Self {
            features,
            labels: samples.iter().map(|s| s.label).collect(),
            coords: samples.iter().map(|s| (s.x, s.y)).collect(),
        })
    }

    /// Extract samples from every presence layer (label 1), then every
    /// absence layer (label 0)
    pub fn build_from_layers(
        presence: &[VectorLayer],
        absence: &[VectorLayer],
        source: &dyn RasterSource,
        params: &ExtractParams,
        ctx: &StepContext<'_>,
    ) -> Result<Self> {
        let extractor = SampleExtractor::with_params(source, params.clone());
        let mut samples = Vec::new();
        for layer in presence {
            samples.extend(extractor.extract_layer(layer, PRESENCE, ctx)?);
        }
        for layer in absence {
            samples.extend(extractor.extract_layer(layer, ABSENCE, ctx)?);
        }

        let set = Self::from_samples(&samples, source.grid_info().band_count)?;
        info!(
            samples = set.len(),
            presence = set.count_label(PRESENCE),
            absence = set.count_label(ABSENCE),
            bands = set.n_features(),
            "built training set"
        );
        Ok(set)
    }

    /// Read a set back from a point layer written by [`TrainingSet::to_train_layer`]
    pub fn build_from_point_layer(layer: &VectorLayer) -> Result<Self> {
        let layer_err = |reason: String| Error::Layer {
            layer: layer.name().to_string(),
            reason,
        };

        let n_features = (0..)
            .take_while(|&i| layer.schema().iter().any(|f| f.name == band_field(i)))
            .count();
        if n_features == 0 {
            return Err(layer_err("no Band_<n> attributes".into()));
        }

        let mut samples = Vec::with_capacity(layer.len());
        for (index, feature) in layer.features().enumerate() {
            let point = match &feature.geometry {
                Some(Geometry::Point(p)) => *p,
                Some(_) => return Err(layer_err(format!("feature {} is not a point", index))),
                None => return Err(layer_err(format!("feature {} has no geometry", index))),
            };
            let values = (0..n_features)
                .map(|i| {
                    feature
                        .get_property(&band_field(i))
                        .and_then(AttributeValue::as_f64)
                        .ok_or_else(|| layer_err(format!("feature {}: missing {}", index, band_field(i))))
                })
                .collect::<Result<Vec<f64>>>()?;
            let label = feature
                .get_property(CLASS_FIELD)
                .and_then(AttributeValue::as_i64)
                .and_then(|v| i32::try_from(v).ok())
                .ok_or_else(|| layer_err(format!("feature {}: missing or invalid {}", index, CLASS_FIELD)))?;
            samples.push(Sample {
                values,
                label,
                x: point.x(),
                y: point.y(),
            });
        }

        debug!(layer = %layer.name(), samples = samples.len(), bands = n_features, "loaded train layer");
        Self::from_samples(&samples, n_features)
    }

    /// Materialize the set as a point layer
    pub fn to_train_layer(&self, name: &str, crs: Option<CRS>) -> Result<VectorLayer> {
        let mut schema: Vec<FieldDef> = (0..self.n_features())
            .map(|i| FieldDef::new(band_field(i), AttributeType::Real))
            .collect();
        schema.push(FieldDef::new(CLASS_FIELD, AttributeType::Integer));

        let mut layer = VectorLayer::memory(name, GeometryKind::Point, schema);
        layer.set_crs(crs);

        let features = (0..self.len()).map(|i| {
            let (x, y) = self.coords[i];
            let mut feature = Feature::new(Point::new(x, y).into());
            for (j, &v) in self.features.row(i).iter().enumerate() {
                feature.set_property(band_field(j), AttributeValue::Float(v));
            }
            feature.set_property(CLASS_FIELD, AttributeValue::Int(self.labels[i] as i64));
            feature
        });
        layer.append_features(features)?;
        Ok(layer)
    }

    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    pub fn row(&self, index: usize) -> ArrayView1<'_, f64> {
        self.features.row(index)
    }

    pub fn labels(&self) -> &[i32] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn count_label(&self, label: i32) -> usize {
        self.labels.iter().filter(|&&l| l == label).count()
    }

    /// Fail with [`Error::DegenerateTrainingSet`] unless both presence and
    /// absence samples exist
    pub fn ensure_trainable(&self) -> Result<()> {
        let presence = self.count_label(PRESENCE);
        let absence = self.count_label(ABSENCE);
        if presence == 0 || absence == 0 {
            return Err(Error::DegenerateTrainingSet { presence, absence });
        }
        Ok(())
    }
}
