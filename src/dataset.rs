//! Dataset descriptors
//!
//! The closed set of supported datasets, each with its feature schema,
//! target column, label policy and file layout.

use crate::error::{QualityError, Result};
use crate::training::CatalogVariant;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Identifier of a supported dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetId {
    Milk,
    Wine,
    Water,
}

impl DatasetId {
    pub const ALL: [DatasetId; 3] = [DatasetId::Milk, DatasetId::Wine, DatasetId::Water];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetId::Milk => "milk",
            DatasetId::Wine => "wine",
            DatasetId::Water => "water",
        }
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetId {
    type Err = QualityError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "milk" => Ok(DatasetId::Milk),
            "wine" => Ok(DatasetId::Wine),
            "water" => Ok(DatasetId::Water),
            other => Err(QualityError::UnsupportedDataset(other.to_string())),
        }
    }
}

/// Shape of the target column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetKind {
    /// Three ordinal grades
    OrdinalGrade,
    /// Integer quality score collapsed into three bands
    QualityBand,
    /// Binary potability flag
    BinaryPotability,
}

/// Maps a decoded raw label to the label returned to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelPolicy {
    /// The raw label is returned unchanged
    Verbatim,
    /// `0` is `bad`, `1` is `good`
    Potability,
    /// Quality below 5 is `bad`, above 7 is `good`, anything else `average`
    QualityBand,
}

impl LabelPolicy {
    /// Apply the policy to a raw label such as `"high"`, `"1"` or `"6"`
    pub fn apply(&self, raw: &str) -> Result<String> {
        match self {
            LabelPolicy::Verbatim => Ok(raw.to_string()),
            LabelPolicy::Potability => match parse_numeric_label(raw)? {
                v if v == 0.0 => Ok("bad".to_string()),
                v if v == 1.0 => Ok("good".to_string()),
                _ => Err(QualityError::UnknownLabel(format!("potability `{}`", raw))),
            },
            LabelPolicy::QualityBand => Ok(quality_band(parse_numeric_label(raw)?).to_string()),
        }
    }
}

fn parse_numeric_label(raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| QualityError::UnknownLabel(format!("`{}` is not a numeric label", raw)))
}

/// Wine quality bands: `bad` below 5, `good` above 7, `average` otherwise
pub fn quality_band(quality: f64) -> &'static str {
    if quality > 7.0 {
        "good"
    } else if quality < 5.0 {
        "bad"
    } else {
        "average"
    }
}

/// How the selector searches for a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchStrategy {
    /// Score every catalog candidate by cross-validation
    Exhaustive,
    /// Refit a stacking ensemble with successive seeds, keeping the best
    BestOfN,
}

/// Search strategy plus the catalog it draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPlan {
    pub strategy: SearchStrategy,
    pub catalog: CatalogVariant,
}

/// Locations of the three split files of one dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPaths {
    pub raw: PathBuf,
    pub train: PathBuf,
    pub test: PathBuf,
}

/// Immutable description of one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    id: DatasetId,
    /// Numeric feature columns, in declared order
    features: Vec<String>,
    target: String,
    target_kind: TargetKind,
    /// Raw CSV file name under the data directory
    source_file: String,
    /// Columns that may be present in the raw table but are never features
    ignored_columns: Vec<String>,
    /// Degree-2 polynomial expansion before scaling
    polynomial: bool,
    label_policy: LabelPolicy,
    search: SearchPlan,
}

fn names(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

impl DatasetDescriptor {
    pub fn milk() -> Self {
        Self {
            id: DatasetId::Milk,
            features: names(&["pH", "Temprature", "Colour", "Taste", "Odor", "Fat", "Turbidity"]),
            target: "Grade".to_string(),
            target_kind: TargetKind::OrdinalGrade,
            source_file: "milk.csv".to_string(),
            ignored_columns: Vec::new(),
            polynomial: true,
            label_policy: LabelPolicy::Verbatim,
            search: SearchPlan {
                strategy: SearchStrategy::Exhaustive,
                catalog: CatalogVariant::Standard,
            },
        }
    }

    pub fn wine() -> Self {
        Self {
            id: DatasetId::Wine,
            features: names(&[
                "fixed acidity",
                "volatile acidity",
                "citric acid",
                "residual sugar",
                "chlorides",
                "free sulfur dioxide",
                "total sulfur dioxide",
                "density",
                "pH",
                "sulphates",
                "alcohol",
            ]),
            target: "quality".to_string(),
            target_kind: TargetKind::QualityBand,
            source_file: "wine.csv".to_string(),
            ignored_columns: names(&["Id"]),
            polynomial: false,
            label_policy: LabelPolicy::QualityBand,
            search: SearchPlan {
                strategy: SearchStrategy::BestOfN,
                catalog: CatalogVariant::WithStacking,
            },
        }
    }

    pub fn water() -> Self {
        Self {
            id: DatasetId::Water,
            features: names(&[
                "ph",
                "Hardness",
                "Solids",
                "Chloramines",
                "Sulfate",
                "Conductivity",
                "Organic_carbon",
                "Trihalomethanes",
                "Turbidity",
            ]),
            target: "Potability".to_string(),
            target_kind: TargetKind::BinaryPotability,
            source_file: "water.csv".to_string(),
            ignored_columns: Vec::new(),
            polynomial: false,
            label_policy: LabelPolicy::Potability,
            search: SearchPlan {
                strategy: SearchStrategy::Exhaustive,
                catalog: CatalogVariant::Standard,
            },
        }
    }

    pub fn for_id(id: DatasetId) -> Self {
        match id {
            DatasetId::Milk => Self::milk(),
            DatasetId::Wine => Self::wine(),
            DatasetId::Water => Self::water(),
        }
    }

    /// Look a descriptor up by name; unknown names are `UnsupportedDataset`
    pub fn from_name(name: &str) -> Result<Self> {
        name.parse::<DatasetId>().map(Self::for_id)
    }

    pub fn id(&self) -> DatasetId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.id.as_str()
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn target_kind(&self) -> TargetKind {
        self.target_kind
    }

    pub fn source_file(&self) -> &str {
        &self.source_file
    }

    pub fn ignored_columns(&self) -> &[String] {
        &self.ignored_columns
    }

    /// Whether the pipeline expands features to degree 2
    pub fn polynomial(&self) -> bool {
        self.polynomial
    }

    pub fn label_policy(&self) -> LabelPolicy {
        self.label_policy
    }

    pub fn search(&self) -> SearchPlan {
        self.search
    }

    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    pub fn source_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.source_file)
    }

    /// `<dataset>_raw.csv`, `<dataset>_train.csv` and `<dataset>_test.csv`
    pub fn split_paths(&self, split_dir: &Path) -> SplitPaths {
        SplitPaths {
            raw: split_dir.join(format!("{}_raw.csv", self.name())),
            train: split_dir.join(format!("{}_train.csv", self.name())),
            test: split_dir.join(format!("{}_test.csv", self.name())),
        }
    }

    /// Path of the training report written beside the artifacts
    pub fn report_path(&self, artifact_dir: &Path) -> PathBuf {
        artifact_dir.join(format!("{}_report.json", self.name()))
    }
}
