//! Idempotent raw/train/test splitting

use crate::dataset::{DatasetDescriptor, SplitPaths};
use crate::error::{QualityError, Result};
use crate::utils::{DataLoader, DataSaver};
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Where the split lands and how it is drawn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    pub data_dir: PathBuf,
    pub split_dir: PathBuf,
    pub test_ratio: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("Dataset"),
            split_dir: PathBuf::from("data"),
            test_ratio: 0.2,
            seed: 42,
        }
    }
}

/// Result of a split call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitOutcome {
    pub train_path: PathBuf,
    pub test_path: PathBuf,
    /// Wall-clock time spent; zero when the split already existed
    pub elapsed: Duration,
    /// `true` when existing files were reused
    pub reused: bool,
    pub train_rows: Option<usize>,
    pub test_rows: Option<usize>,
}

/// Persists a seeded train/test split of a dataset's raw table, once
#[derive(Debug, Clone)]
pub struct DatasetSplitter {
    config: SplitConfig,
    loader: DataLoader,
}

impl DatasetSplitter {
    pub fn new(config: SplitConfig) -> Self {
        Self {
            config,
            loader: DataLoader::new(),
        }
    }

    pub fn config(&self) -> &SplitConfig {
        &self.config
    }

    /// Split `descriptor`'s raw table unless both split files already exist
    pub fn split(&self, descriptor: &DatasetDescriptor) -> Result<SplitOutcome> {
        let paths = descriptor.split_paths(&self.config.split_dir);
        if paths.train.exists() && paths.test.exists() {
            info!(dataset = descriptor.name(), "Split files present, skipping");
            return Ok(SplitOutcome {
                train_path: paths.train,
                test_path: paths.test,
                elapsed: Duration::ZERO,
                reused: true,
                train_rows: None,
                test_rows: None,
            });
        }

        let start = Instant::now();
        let source = descriptor.source_path(&self.config.data_dir);
        let df = self.loader.load_csv(&source)?;

        fs::create_dir_all(&self.config.split_dir).map_err(|e| {
            QualityError::ingestion(format!("cannot create {}", self.config.split_dir.display()), e)
        })?;
        copy_raw(&source, &paths.raw)?;

        let (mut train, mut test) = split_frame(&df, self.config.test_ratio, self.config.seed)?;
        write_pair(&mut train, &mut test, &paths)?;

        let elapsed = start.elapsed();
        info!(
            dataset = descriptor.name(),
            train_rows = train.height(),
            test_rows = test.height(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Dataset split"
        );

        Ok(SplitOutcome {
            train_path: paths.train,
            test_path: paths.test,
            elapsed,
            reused: false,
            train_rows: Some(train.height()),
            test_rows: Some(test.height()),
        })
    }
}

/// Shuffle row indices with a seeded generator; the first `ceil(n * ratio)`
/// shuffled rows form the test part, the rest the train part.
pub fn split_frame(df: &DataFrame, test_ratio: f64, seed: u64) -> Result<(DataFrame, DataFrame)> {
    let n = df.height();
    if n < 2 {
        return Err(QualityError::Ingestion {
            message: format!("need at least 2 rows to split, got {}", n),
            source: None,
        });
    }
    if !(test_ratio > 0.0 && test_ratio < 1.0) {
        return Err(QualityError::InvalidConfig(format!(
            "test_ratio must be in (0, 1), got {}",
            test_ratio
        )));
    }

    let n_test = ((n as f64 * test_ratio).ceil() as usize).clamp(1, n - 1);

    let mut indices: Vec<IdxSize> = (0..n as IdxSize).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let test_idx = IdxCa::from_vec("idx".into(), indices[..n_test].to_vec());
    let train_idx = IdxCa::from_vec("idx".into(), indices[n_test..].to_vec());

    Ok((df.take(&train_idx)?, df.take(&test_idx)?))
}

/// Write both parts through temporary files so that either both final files
/// exist afterwards or neither does.
fn write_pair(train: &mut DataFrame, test: &mut DataFrame, paths: &SplitPaths) -> Result<()> {
    let train_tmp = temp_path(&paths.train);
    let test_tmp = temp_path(&paths.test);

    let written = DataSaver::save_csv(train, &train_tmp).and_then(|_| DataSaver::save_csv(test, &test_tmp));
    if let Err(e) = written {
        remove_quietly(&train_tmp);
        remove_quietly(&test_tmp);
        return Err(QualityError::ingestion("cannot write split files", e));
    }

    if let Err(e) = fs::rename(&train_tmp, &paths.train) {
        remove_quietly(&train_tmp);
        remove_quietly(&test_tmp);
        return Err(QualityError::ingestion(format!("cannot move {} into place", paths.train.display()), e));
    }
    if let Err(e) = fs::rename(&test_tmp, &paths.test) {
        warn!(path = %paths.train.display(), "Removing train split after failed test rename");
        remove_quietly(&paths.train);
        remove_quietly(&test_tmp);
        return Err(QualityError::ingestion(format!("cannot move {} into place", paths.test.display()), e));
    }
    Ok(())
}

/// Copy the raw table beside its final name, then rename it into place
fn copy_raw(source: &Path, raw: &Path) -> Result<()> {
    let raw_tmp = temp_path(raw);
    if let Err(e) = fs::copy(source, &raw_tmp) {
        remove_quietly(&raw_tmp);
        return Err(QualityError::ingestion(format!("cannot copy raw table to {}", raw.display()), e));
    }
    if let Err(e) = fs::rename(&raw_tmp, raw) {
        remove_quietly(&raw_tmp);
        return Err(QualityError::ingestion(format!("cannot move {} into place", raw.display()), e));
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn remove_quietly(path: &Path) {
    if path.exists() {
        let _ = fs::remove_file(path);
    }
}
