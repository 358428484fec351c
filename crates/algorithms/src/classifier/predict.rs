//! Full-raster prediction, one row at a time

use dtclassifier_core::io::{RasterSink, RasterSource, RasterWindow};
use dtclassifier_core::{Error, PixelType, RasterGridInfo, Result};
use ndarray::Array2;
use tracing::info;

use super::model::ClassifierModel;
use crate::progress::StepContext;

/// Counts from a [`predict_raster`] run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PredictSummary {
    pub rows: usize,
    pub predicted: usize,
    /// Pixels with every band missing, written as nodata
    pub nodata: usize,
}

/// Pixel type of the classified raster: Byte for discrete classes, Float32
/// for continuous scores
pub fn output_pixel_type(model: &ClassifierModel) -> PixelType {
    if model.is_discrete() {
        PixelType::Byte
    } else {
        PixelType::Float32
    }
}

/// Grid of the classified raster: the input grid with one band and the
/// output pixel type's nodata value
pub fn output_grid(input: &RasterGridInfo, pixel_type: PixelType) -> RasterGridInfo {
    let mut info = input.with_bands(1);
    info.nodata = Some(pixel_type.nodata());
    info
}

/// Predict every pixel of `source` into band 0 of `sink`.
///
/// Reads one row of all bands per iteration. Missing band values are passed
/// to the model as NaN; a pixel with every band missing gets the sink's
/// nodata value. The sink is flushed at the end.
pub fn predict_raster(
    source: &dyn RasterSource,
    model: &ClassifierModel,
    sink: &mut dyn RasterSink,
    ctx: &StepContext<'_>,
) -> Result<PredictSummary> {
    let info = source.grid_info();
    if info.band_count != model.n_features() {
        return Err(Error::BandMismatch {
            expected: model.n_features(),
            actual: info.band_count,
        });
    }
    let out_info = sink.grid_info();
    info.ensure_same_grid(&out_info)?;

    let nodata_out = out_info.nodata.unwrap_or_else(|| sink.pixel_type().nodata());
    let (rows, cols) = info.shape();
    let bands = info.band_count;
    let mut summary = PredictSummary::default();
    let mut pixel = vec![0.0; bands];
    let mut out_row = Array2::<f64>::zeros((1, cols));

    for row in 0..rows {
        ctx.checkpoint()?;
        ctx.sub_step(row, rows);

        let window = RasterWindow::row(row, cols);
        let block = source.read_window(0..bands, window)?;
        for col in 0..cols {
            let mut any_valid = false;
            for (band, value) in pixel.iter_mut().enumerate() {
                let v = block[[band, 0, col]];
                if info.is_missing(v) {
                    *value = f64::NAN;
                } else {
                    *value = v;
                    any_valid = true;
                }
            }
            out_row[[0, col]] = if any_valid {
                summary.predicted += 1;
                model.predict(&pixel)
            } else {
                summary.nodata += 1;
                nodata_out
            };
        }
        sink.write_window(0, window, out_row.view())?;
        summary.rows += 1;
    }
    ctx.sub_step(rows, rows);
    sink.flush()?;

    info!(
        rows = summary.rows,
        predicted = summary.predicted,
        nodata = summary.nodata,
        "classified raster"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ClassifierKind, TrainOptions, TreeParams};
    use crate::progress::CancelToken;
    use crate::sampling::Sample;
    use crate::training::TrainingSet;
    use dtclassifier_core::{GeoTransform, MultiBandRaster, Raster};

    fn model() -> ClassifierModel {
        let samples: Vec<Sample> = (0..20)
            .map(|i| Sample {
                values: vec![if i < 10 { 10.0 } else { 1.0 }],
                label: i32::from(i < 10),
                x: 0.0,
                y: 0.0,
            })
            .collect();
        let set = TrainingSet::from_samples(&samples, 1).unwrap();
        ClassifierModel::train(
            &set,
            &TrainOptions {
                kind: ClassifierKind::DecisionTree,
                discrete: true,
                tree: TreeParams {
                    cv_folds: 0,
                    ..TreeParams::default()
                },
                ..TrainOptions::default()
            },
        )
        .unwrap()
    }

    fn scene() -> MultiBandRaster {
        let band = Array2::from_shape_fn((3, 4), |(r, c)| if r == 1 && c > 0 { 10.0 } else { 1.0 });
        let mut raster = MultiBandRaster::from_bands(vec![band], GeoTransform::new(100.0, 200.0, 10.0, -10.0)).unwrap();
        raster.set(0, 2, 3, f64::NAN).unwrap();
        raster
    }

    #[test]
    fn test_predicts_every_pixel() {
        let model = model();
        let source = scene();
        let pixel_type = output_pixel_type(&model);
        assert_eq!(pixel_type, PixelType::Byte);

        let mut out: Raster<u8> = Raster::from_grid_info(&output_grid(source.grid_info(), pixel_type));
        let summary = predict_raster(&source, &model, &mut out, &StepContext::detached()).unwrap();

        assert_eq!(summary.rows, 3);
        assert_eq!(summary.predicted, 11);
        assert_eq!(summary.nodata, 1);
        assert_eq!(out.get(1, 1).unwrap(), 1);
        assert_eq!(out.get(0, 0).unwrap(), 0);
        assert_eq!(out.get(2, 3).unwrap(), 255);
        assert_eq!(out.transform(), &source.grid_info().transform);
    }

    #[test]
    fn test_band_count_must_match_model() {
        let model = model();
        let two_bands = MultiBandRaster::from_bands(
            vec![Array2::zeros((2, 2)), Array2::zeros((2, 2))],
            GeoTransform::default(),
        )
        .unwrap();
        let mut out: Raster<u8> = Raster::new(2, 2);
        let err = predict_raster(&two_bands, &model, &mut out, &StepContext::detached()).unwrap_err();
        assert!(matches!(err, Error::BandMismatch { expected: 1, actual: 2 }));
    }

    #[test]
    fn test_output_grid_must_match() {
        let model = model();
        let mut out: Raster<u8> = Raster::new(5, 5);
        let err = predict_raster(&scene(), &model, &mut out, &StepContext::detached()).unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { .. }));
    }

    #[test]
    fn test_cancellation_between_rows() {
        let model = model();
        let token = CancelToken::new();
        token.cancel();
        let ctx = StepContext::new(0, 1, &crate::progress::NoProgress, token);
        let mut out: Raster<u8> = Raster::new(3, 4);
        let err = predict_raster(&scene(), &model, &mut out, &ctx).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
