use beverage_quality::artifacts::ArtifactStore;
use beverage_quality::dataset::{DatasetDescriptor, DatasetId};
use beverage_quality::inference::InferenceService;
use beverage_quality::preprocessing::{FeaturePipeline, FeatureRecord, LabelEncoder};
use beverage_quality::training::{
    Candidate, Catalog, ClassLabels, DecisionTree, Estimator, KNNClassifier, ModelSelector, RandomForest,
    SelectorConfig, TrainedModel,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{Array1, Array2};
use rand::prelude::*;

/// Milk-shaped table: 7 features, three grades driven by pH and odor
fn create_milk_data(n_rows: usize) -> (Array2<f64>, Array1<f64>) {
    let mut rng = StdRng::seed_from_u64(42);
    let mut x = Array2::zeros((n_rows, 7));
    let mut y = Array1::zeros(n_rows);
    for i in 0..n_rows {
        let ph = rng.gen_range(3.0..9.5);
        let odor = rng.gen_range(0..2) as f64;
        x[[i, 0]] = ph;
        x[[i, 1]] = rng.gen_range(34.0..90.0);
        x[[i, 2]] = rng.gen_range(240.0..255.0);
        x[[i, 3]] = rng.gen_range(0..2) as f64;
        x[[i, 4]] = odor;
        x[[i, 5]] = rng.gen_range(0..2) as f64;
        x[[i, 6]] = rng.gen_range(0..2) as f64;
        y[i] = if (6.4..=6.8).contains(&ph) && odor == 1.0 {
            0.0
        } else if (6.0..=7.5).contains(&ph) {
            1.0
        } else {
            2.0
        };
    }
    (x, y)
}

fn bench_preprocessing(c: &mut Criterion) {
    let mut group = c.benchmark_group("preprocessing");
    let features = DatasetDescriptor::milk().features().to_vec();

    for n_rows in [1000, 5000].iter() {
        let (x, _) = create_milk_data(*n_rows);
        group.bench_with_input(BenchmarkId::new("fit_transform", n_rows), &x, |b, x| {
            b.iter(|| {
                let mut pipeline = FeaturePipeline::new(features.clone(), true);
                pipeline.fit_matrix(black_box(x)).unwrap()
            })
        });
    }

    group.finish();
}

fn bench_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("selection");
    group.sample_size(10);

    let (x, y) = create_milk_data(1000);
    let mut pipeline = FeaturePipeline::new(DatasetDescriptor::milk().features().to_vec(), true);
    let xt = pipeline.fit_matrix(&x).unwrap();
    let labels = ClassLabels::indexed(vec!["high".into(), "medium".into(), "low".into()]);
    let catalog = Catalog::new()
        .push(Candidate::new("DecisionTree", |_p, seed| {
            Ok(TrainedModel::DecisionTree(DecisionTree::new_classifier().with_random_state(seed)))
        }))
        .push(Candidate::new("RandomForest", |_p, seed| {
            Ok(TrainedModel::RandomForest(RandomForest::new_classifier(50).with_random_state(seed)))
        }))
        .push(Candidate::new("KNeighbors", |_p, _seed| {
            Ok(TrainedModel::KNNClassifier(KNNClassifier::default()))
        }));
    let selector = ModelSelector::new(SelectorConfig::default(), catalog);

    group.bench_function("select_three_candidates", |b| {
        b.iter(|| selector.select(black_box(&xt), &y, &xt, &y, &labels).unwrap())
    });

    group.finish();
}

fn bench_inference(c: &mut Criterion) {
    let mut group = c.benchmark_group("inference");

    let (x, y) = create_milk_data(1000);
    let mut pipeline = FeaturePipeline::new(DatasetDescriptor::milk().features().to_vec(), true);
    let xt = pipeline.fit_matrix(&x).unwrap();
    let encoder = LabelEncoder::from_classes(vec!["high".into(), "medium".into(), "low".into()]).unwrap();
    let mut model = TrainedModel::RandomForest(RandomForest::new_classifier(50).with_random_state(42));
    model.fit(&xt, &y).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    store.save_bundle(DatasetId::Milk, &pipeline, &encoder, &model).unwrap();
    let service = InferenceService::new(DatasetDescriptor::milk(), &store);

    let record = FeatureRecord::new()
        .with("pH", 6.6)
        .with("Temprature", 35.0)
        .with("Colour", 254.0)
        .with("Taste", 1.0)
        .with("Odor", 1.0)
        .with("Fat", 1.0)
        .with("Turbidity", 0.0);

    group.bench_function("predict_single_record", |b| {
        b.iter(|| service.predict(black_box(&record)).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_preprocessing, bench_selection, bench_inference);
criterion_main!(benches);
