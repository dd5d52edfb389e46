//! End-to-end training for one dataset
//!
//! Split, fit preprocessing on the train part, search and select a model,
//! then persist the artifact bundle and a JSON training report.

use crate::artifacts::ArtifactStore;
use crate::config::{PipelineConfig, WineObjective};
use crate::dataset::{DatasetDescriptor, DatasetId, SearchStrategy};
use crate::error::{QualityError, Result};
use crate::ingestion::{DatasetSplitter, SplitConfig, SplitOutcome};
use crate::preprocessing::{FeaturePipeline, LabelEncoder};
use crate::training::{
    stacking_classifier, stacking_regressor, BestOfN, Catalog, ClassLabels, ModelSelector, Selection,
    SelectionReport, SelectorConfig,
};
use crate::utils::{column_labels, DataLoader};
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

/// How the target was modelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Objective {
    Classification,
    Regression,
}

/// Summary of one training run, written as `<dataset>_report.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub dataset: DatasetId,
    pub objective: Objective,
    pub split: SplitOutcome,
    pub train_rows: usize,
    pub test_rows: usize,
    /// Test rows dropped because their label never occurs in the train part
    pub dropped_test_rows: usize,
    pub input_features: Vec<String>,
    pub output_features: usize,
    pub classes: Vec<String>,
    pub preprocessing_secs: f64,
    pub selection_secs: f64,
    pub total_secs: f64,
    pub selection: SelectionReport,
    pub bundle_version: u64,
    pub created_at: DateTime<Utc>,
    pub report_path: PathBuf,
}

/// Training orchestrator
#[derive(Debug, Clone)]
pub struct TrainingPipeline {
    config: PipelineConfig,
    loader: DataLoader,
}

impl TrainingPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            loader: DataLoader::new(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn splitter(&self) -> DatasetSplitter {
        DatasetSplitter::new(SplitConfig {
            data_dir: self.config.data_dir.clone(),
            split_dir: self.config.split_dir.clone(),
            test_ratio: self.config.test_ratio,
            seed: self.config.seed,
        })
    }

    pub fn store(&self) -> ArtifactStore {
        ArtifactStore::new(self.config.artifact_dir.clone())
    }

    fn selector(&self, descriptor: &DatasetDescriptor) -> ModelSelector {
        ModelSelector::new(
            SelectorConfig {
                seed: self.config.seed,
                grid_cv_folds: self.config.grid_cv_folds,
                plain_cv_folds: self.config.plain_cv_folds,
            },
            Catalog::for_variant(descriptor.search().catalog),
        )
    }

    fn objective(&self, descriptor: &DatasetDescriptor) -> Objective {
        match (descriptor.id(), self.config.wine_objective) {
            (DatasetId::Wine, WineObjective::Regression) => Objective::Regression,
            _ => Objective::Classification,
        }
    }

    /// Train and persist the bundle of `descriptor`
    pub fn run(&self, descriptor: &DatasetDescriptor) -> Result<TrainingReport> {
        let start = Instant::now();
        let objective = self.objective(descriptor);
        info!(dataset = descriptor.name(), objective = ?objective, "Training started");

        let split = self.splitter().split(descriptor)?;
        let train_df = self.loader.load_csv(&split.train_path)?;
        let test_df = self.loader.load_csv(&split.test_path)?;

        let prep_start = Instant::now();
        let mut pipeline = FeaturePipeline::for_dataset(descriptor);
        let x_train = pipeline.fit_transform(&train_df)?;
        let x_test = pipeline.transform(&test_df)?;
        let preprocessing_secs = prep_start.elapsed().as_secs_f64();

        let raw_train = column_labels(&train_df, descriptor.target())?;
        let raw_test = column_labels(&test_df, descriptor.target())?;
        let mut encoder = LabelEncoder::new();
        encoder.fit(raw_train.as_slice())?;

        let (x_test, raw_test, dropped) = drop_unseen(x_test, raw_test, &encoder);
        if dropped > 0 {
            warn!(
                dataset = descriptor.name(),
                dropped,
                "Test rows with labels absent from the train part were dropped"
            );
        }
        if raw_test.is_empty() {
            return Err(QualityError::Data(format!(
                "no {} test rows left to evaluate",
                descriptor.name()
            )));
        }

        let select_start = Instant::now();
        let selection = self.select(descriptor, objective, &encoder, &x_train, &raw_train, &x_test, &raw_test)?;
        let selection_secs = select_start.elapsed().as_secs_f64();

        let store = self.store();
        let manifest = store.save_bundle(descriptor.id(), &pipeline, &encoder, &selection.model)?;

        let report = TrainingReport {
            dataset: descriptor.id(),
            objective,
            train_rows: x_train.nrows(),
            test_rows: x_test.nrows(),
            dropped_test_rows: dropped,
            input_features: descriptor.features().to_vec(),
            output_features: pipeline.n_output_features(),
            classes: encoder.classes().to_vec(),
            preprocessing_secs,
            selection_secs,
            total_secs: start.elapsed().as_secs_f64(),
            selection: selection.report,
            bundle_version: manifest.version,
            created_at: Utc::now(),
            report_path: descriptor.report_path(&self.config.artifact_dir),
            split,
        };
        fs::write(&report.report_path, serde_json::to_vec_pretty(&report)?)?;

        info!(
            dataset = descriptor.name(),
            model = %report.selection.model_name,
            test_accuracy = report.selection.test_accuracy,
            version = report.bundle_version,
            total_secs = report.total_secs,
            "Training finished"
        );
        Ok(report)
    }

    /// Train every supported dataset in turn, stopping at the first failure
    pub fn run_all(&self) -> Result<Vec<TrainingReport>> {
        DatasetId::ALL
            .iter()
            .map(|id| self.run(&DatasetDescriptor::for_id(*id)))
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn select(
        &self,
        descriptor: &DatasetDescriptor,
        objective: Objective,
        encoder: &LabelEncoder,
        x_train: &Array2<f64>,
        raw_train: &[String],
        x_test: &Array2<f64>,
        raw_test: &[String],
    ) -> Result<Selection> {
        let selector = self.selector(descriptor);
        let search = BestOfN {
            max_iterations: self.config.wine_max_iterations,
            target_accuracy: self.config.wine_target_accuracy,
        };

        match objective {
            Objective::Regression => {
                let y_train = numeric_targets(raw_train)?;
                let y_test = numeric_targets(raw_test)?;
                let mut values: Vec<f64> = y_train.iter().copied().collect();
                values.sort_by(|a, b| a.total_cmp(b));
                values.dedup();
                selector.select_best_of_n(
                    "StackingRegressor",
                    |seed| Ok(stacking_regressor(seed)),
                    search,
                    x_train,
                    &y_train,
                    x_test,
                    &y_test,
                    &ClassLabels::numeric(values),
                )
            }
            Objective::Classification => {
                let y_train = encoder.encode_all(raw_train)?;
                let y_test = encoder.encode_all(raw_test)?;
                let labels = ClassLabels::indexed(encoder.classes().to_vec());
                match descriptor.search().strategy {
                    SearchStrategy::Exhaustive => selector.select(x_train, &y_train, x_test, &y_test, &labels),
                    SearchStrategy::BestOfN => selector.select_best_of_n(
                        "StackingClassifier",
                        |seed| Ok(stacking_classifier(seed)),
                        search,
                        x_train,
                        &y_train,
                        x_test,
                        &y_test,
                        &labels,
                    ),
                }
            }
        }
    }
}

/// Remove test rows whose label the encoder has never seen
fn drop_unseen(x: Array2<f64>, labels: Vec<String>, encoder: &LabelEncoder) -> (Array2<f64>, Vec<String>, usize) {
    let keep: Vec<usize> = labels
        .iter()
        .enumerate()
        .filter(|(_, l)| encoder.encode(l).is_ok())
        .map(|(i, _)| i)
        .collect();
    let dropped = labels.len() - keep.len();
    if dropped == 0 {
        return (x, labels, 0);
    }
    let x = x.select(Axis(0), &keep);
    let labels = keep.iter().map(|&i| labels[i].clone()).collect();
    (x, labels, dropped)
}

fn numeric_targets(raw: &[String]) -> Result<Array1<f64>> {
    raw.iter()
        .map(|l| {
            l.parse::<f64>()
                .map_err(|_| QualityError::Data(format!("target `{}` is not numeric", l)))
        })
        .collect::<Result<Vec<_>>>()
        .map(Array1::from_vec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_drop_unseen_rows() {
        let mut encoder = LabelEncoder::new();
        encoder.fit(&["5", "6"]).unwrap();
        let x = array![[1.0], [2.0], [3.0]];
        let (x, labels, dropped) = drop_unseen(x, vec!["5".into(), "9".into(), "6".into()], &encoder);
        assert_eq!(dropped, 1);
        assert_eq!(labels, vec!["5".to_string(), "6".to_string()]);
        assert_eq!(x, array![[1.0], [3.0]]);
    }

    #[test]
    fn test_wine_objective_only_affects_wine() {
        let config = PipelineConfig::new().with_wine_objective(WineObjective::Regression);
        let pipeline = TrainingPipeline::new(config).unwrap();
        assert_eq!(pipeline.objective(&DatasetDescriptor::wine()), Objective::Regression);
        assert_eq!(pipeline.objective(&DatasetDescriptor::milk()), Objective::Classification);
    }

    #[test]
    fn test_numeric_targets() {
        assert_eq!(numeric_targets(&["6".to_string(), "7".to_string()]).unwrap(), array![6.0, 7.0]);
        assert!(numeric_targets(&["six".to_string()]).is_err());
    }
}
