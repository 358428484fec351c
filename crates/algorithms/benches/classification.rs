//! Benchmarks for training, raster prediction and generalization

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dtclassifier_algorithms::classifier::{
    output_grid, predict_raster, ClassifierKind, ClassifierModel, TrainOptions, TreeParams,
};
use dtclassifier_algorithms::morphology::{generalize, GeneralizeMethod};
use dtclassifier_algorithms::progress::StepContext;
use dtclassifier_algorithms::sampling::Sample;
use dtclassifier_algorithms::training::TrainingSet;
use dtclassifier_core::io::create_raster;
use dtclassifier_core::{GeoTransform, MultiBandRaster, PixelType, Raster};
use ndarray::Array2;
use tempfile::TempDir;

const BANDS: usize = 4;

fn training_set(n: usize) -> TrainingSet {
    let samples: Vec<Sample> = (0..n)
        .map(|i| {
            let label = i32::from(i % 2 == 0);
            let values = (0..BANDS)
                .map(|b| ((i * 7 + b * 13) % 50) as f64 + f64::from(label) * 20.0)
                .collect();
            Sample {
                values,
                label,
                x: i as f64,
                y: 0.0,
            }
        })
        .collect();
    TrainingSet::from_samples(&samples, BANDS).unwrap()
}

fn create_stack(size: usize) -> MultiBandRaster {
    let bands = (0..BANDS)
        .map(|b| Array2::from_shape_fn((size, size), |(r, c)| ((r * 7 + c * 13 + b * 3) % 70) as f64))
        .collect();
    MultiBandRaster::from_bands(bands, GeoTransform::new(0.0, size as f64, 1.0, -1.0)).unwrap()
}

fn create_classes(size: usize) -> Raster<f64> {
    let mut r = Raster::new(size, size);
    r.set_transform(GeoTransform::new(0.0, size as f64, 1.0, -1.0));
    for row in 0..size {
        for col in 0..size {
            r.set(row, col, ((row * 7 + col * 13) % 3 == 0) as u8 as f64).unwrap();
        }
    }
    r
}

fn tree_options() -> TrainOptions {
    TrainOptions {
        kind: ClassifierKind::DecisionTree,
        tree: TreeParams {
            min_sample_count: 2,
            ..TreeParams::default()
        },
        ..TrainOptions::default()
    }
}

fn bench_train(c: &mut Criterion) {
    let mut group = c.benchmark_group("classification/train");
    group.sample_size(20);
    for n in [200, 1000] {
        let set = training_set(n);
        group.bench_with_input(BenchmarkId::new("tree", n), &n, |b, _| {
            b.iter(|| ClassifierModel::train(black_box(&set), &tree_options()).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("forest", n), &n, |b, _| {
            b.iter(|| ClassifierModel::train(black_box(&set), &TrainOptions::default()).unwrap())
        });
    }
    group.finish();
}

fn bench_predict_raster(c: &mut Criterion) {
    let mut group = c.benchmark_group("classification/predict_raster");
    group.sample_size(10);
    let model = ClassifierModel::train(&training_set(1000), &TrainOptions::default()).unwrap();
    let dir = TempDir::new().unwrap();
    for size in [128, 256] {
        let stack = create_stack(size);
        let grid = output_grid(stack.grid_info(), PixelType::Float32);
        let path = dir.path().join(format!("classes_{}.tif", size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let mut sink = create_raster(&path, &grid, PixelType::Float32).unwrap();
                predict_raster(black_box(&stack), &model, sink.as_mut(), &StepContext::detached()).unwrap()
            })
        });
    }
    group.finish();
}

fn bench_generalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("classification/generalize");
    for size in [256, 512, 1024] {
        let raster = create_classes(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| generalize(black_box(&raster), 1, GeneralizeMethod::Median).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_train, bench_predict_raster, bench_generalize);
criterion_main!(benches);
