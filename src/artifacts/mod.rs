//! Persisted artifact bundles

mod store;

pub use store::{
    sha256_hex, ArtifactBundle, ArtifactKind, ArtifactStore, BlobEntry, BundleManifest, Stamped,
};
