//! Raw table ingestion and train/test splitting

mod splitter;

pub use splitter::{split_frame, DatasetSplitter, SplitConfig, SplitOutcome};
