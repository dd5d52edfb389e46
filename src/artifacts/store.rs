//! File-backed artifact store
//!
//! Each dataset owns three blobs under the store root:
//! `<dataset>_model.bin`, `<dataset>_preprocessor.bin` and
//! `<dataset>_label_encoder.bin`, plus a `<dataset>_manifest.json` naming the
//! bundle version and the SHA-256 of every blob. Bundle blobs wrap their
//! payload in a [`Stamped`] envelope carrying the same version as the
//! manifest, and a bundle only loads when stamps and hashes agree.

use crate::dataset::DatasetId;
use crate::error::{QualityError, Result};
use crate::preprocessing::{FeaturePipeline, LabelEncoder};
use crate::training::TrainedModel;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The three blobs of a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Model,
    Preprocessor,
    LabelEncoder,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [ArtifactKind::Model, ArtifactKind::Preprocessor, ArtifactKind::LabelEncoder];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Model => "model",
            ArtifactKind::Preprocessor => "preprocessor",
            ArtifactKind::LabelEncoder => "label_encoder",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payload tagged with the bundle version it was written for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stamped<T> {
    pub version: u64,
    pub payload: T,
}

/// One blob as recorded in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobEntry {
    pub file: String,
    pub sha256: String,
    pub bytes: u64,
}

/// Manifest written after all three blobs of a bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
    pub dataset: DatasetId,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub model_family: String,
    /// Keyed by [`ArtifactKind::as_str`]
    pub blobs: BTreeMap<String, BlobEntry>,
}

/// The fitted preprocessing pipeline, label encoder and model of one dataset
#[derive(Debug, Clone)]
pub struct ArtifactBundle {
    pub dataset: DatasetId,
    pub version: u64,
    pub pipeline: FeaturePipeline,
    pub encoder: LabelEncoder,
    pub model: TrainedModel,
}

/// Artifact store rooted at one directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<dataset>_<kind>.bin`
    pub fn path_for(&self, dataset: DatasetId, kind: ArtifactKind) -> PathBuf {
        self.root.join(format!("{}_{}.bin", dataset, kind))
    }

    pub fn manifest_path(&self, dataset: DatasetId) -> PathBuf {
        self.root.join(format!("{}_manifest.json", dataset))
    }

    /// Serialize `object` to its blob path, creating the root if needed
    pub fn save<T: Serialize>(&self, dataset: DatasetId, kind: ArtifactKind, object: &T) -> Result<PathBuf> {
        let path = self.path_for(dataset, kind);
        let bytes = bincode::serialize(object)?;
        self.write_atomic(&path, &bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "Artifact saved");
        Ok(path)
    }

    /// Deserialize a blob; absent, unreadable or mistyped files are
    /// `ArtifactLoad` errors
    pub fn load<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let bytes = read_blob(path)?;
        bincode::deserialize(&bytes).map_err(|e| QualityError::artifact_load(path, e))
    }

    /// Version of the bundle currently on disk, if a readable manifest exists
    pub fn current_version(&self, dataset: DatasetId) -> Option<u64> {
        self.read_manifest(dataset).ok().map(|m| m.version)
    }

    /// Write all three blobs stamped with the next version, then the manifest
    pub fn save_bundle(
        &self,
        dataset: DatasetId,
        pipeline: &FeaturePipeline,
        encoder: &LabelEncoder,
        model: &TrainedModel,
    ) -> Result<BundleManifest> {
        let version = self.current_version(dataset).unwrap_or(0) + 1;

        let mut blobs = BTreeMap::new();
        blobs.insert(
            ArtifactKind::Preprocessor.as_str().to_string(),
            self.save_stamped(dataset, ArtifactKind::Preprocessor, version, pipeline)?,
        );
        blobs.insert(
            ArtifactKind::LabelEncoder.as_str().to_string(),
            self.save_stamped(dataset, ArtifactKind::LabelEncoder, version, encoder)?,
        );
        blobs.insert(
            ArtifactKind::Model.as_str().to_string(),
            self.save_stamped(dataset, ArtifactKind::Model, version, model)?,
        );

        let manifest = BundleManifest {
            dataset,
            version,
            created_at: Utc::now(),
            model_family: model.family().to_string(),
            blobs,
        };
        let json = serde_json::to_vec_pretty(&manifest)?;
        self.write_atomic(&self.manifest_path(dataset), &json)?;

        info!(dataset = %dataset, version, model = model.family(), "Artifact bundle saved");
        Ok(manifest)
    }

    /// Load and verify the bundle of `dataset`
    pub fn load_bundle(&self, dataset: DatasetId) -> Result<ArtifactBundle> {
        let manifest = self.read_manifest(dataset)?;
        if manifest.dataset != dataset {
            return Err(QualityError::artifact_load(
                self.manifest_path(dataset),
                format!("manifest belongs to `{}`", manifest.dataset),
            ));
        }

        let pipeline: FeaturePipeline = self.load_stamped(&manifest, ArtifactKind::Preprocessor)?;
        let encoder: LabelEncoder = self.load_stamped(&manifest, ArtifactKind::LabelEncoder)?;
        let model: TrainedModel = self.load_stamped(&manifest, ArtifactKind::Model)?;

        info!(dataset = %dataset, version = manifest.version, model = model.family(), "Artifact bundle loaded");
        Ok(ArtifactBundle {
            dataset,
            version: manifest.version,
            pipeline,
            encoder,
            model,
        })
    }

    pub fn read_manifest(&self, dataset: DatasetId) -> Result<BundleManifest> {
        let path = self.manifest_path(dataset);
        let bytes = read_blob(&path)?;
        serde_json::from_slice(&bytes).map_err(|e| QualityError::artifact_load(&path, e))
    }

    fn save_stamped<T: Serialize>(
        &self,
        dataset: DatasetId,
        kind: ArtifactKind,
        version: u64,
        payload: &T,
    ) -> Result<BlobEntry> {
        let path = self.path_for(dataset, kind);
        let bytes = bincode::serialize(&Stamped { version, payload })?;
        self.write_atomic(&path, &bytes)?;
        Ok(BlobEntry {
            file: file_name(&path),
            sha256: sha256_hex(&bytes),
            bytes: bytes.len() as u64,
        })
    }

    fn load_stamped<T: DeserializeOwned>(&self, manifest: &BundleManifest, kind: ArtifactKind) -> Result<T> {
        let entry = manifest.blobs.get(kind.as_str()).ok_or_else(|| {
            QualityError::artifact_load(self.manifest_path(manifest.dataset), format!("no `{}` entry", kind))
        })?;
        let path = self.root.join(&entry.file);
        let bytes = read_blob(&path)?;

        let digest = sha256_hex(&bytes);
        if digest != entry.sha256 {
            return Err(QualityError::artifact_load(
                &path,
                format!("hash mismatch: manifest {}, file {}", entry.sha256, digest),
            ));
        }

        let stamped: Stamped<T> = bincode::deserialize(&bytes).map_err(|e| QualityError::artifact_load(&path, e))?;
        if stamped.version != manifest.version {
            return Err(QualityError::artifact_load(
                &path,
                format!("version skew: manifest {}, blob {}", manifest.version, stamped.version),
            ));
        }
        Ok(stamped.payload)
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp = path.with_extension("tmp");
        fs::write(&temp, bytes)?;
        fs::rename(&temp, path)?;
        Ok(())
    }
}

fn read_blob(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| QualityError::artifact_load(path, e))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Lowercase hex SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
