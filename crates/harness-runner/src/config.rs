use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_DATASET_URL: &str = "https://sisap-23-challenge.s3.amazonaws.com/SISAP23-Challenge";
pub const DEFAULT_K: usize = 30;

/// Number of database vectors in a benchmark configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SizeLabel {
    S100K,
    S300K,
    S10M,
    S30M,
    S100M,
}

impl SizeLabel {
    pub const ALL: [SizeLabel; 5] = [
        SizeLabel::S100K,
        SizeLabel::S300K,
        SizeLabel::S10M,
        SizeLabel::S30M,
        SizeLabel::S100M,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SizeLabel::S100K => "100K",
            SizeLabel::S300K => "300K",
            SizeLabel::S10M => "10M",
            SizeLabel::S30M => "30M",
            SizeLabel::S100M => "100M",
        }
    }

    /// Numeric size code handed to the engine.
    pub fn code(self) -> &'static str {
        match self {
            SizeLabel::S100K => "100000",
            SizeLabel::S300K => "300000",
            SizeLabel::S10M => "10000000",
            SizeLabel::S30M => "30000000",
            SizeLabel::S100M => "100000000",
        }
    }
}

impl fmt::Display for SizeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SizeLabel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SizeLabel::ALL
            .into_iter()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownSize(s.to_string()))
    }
}

impl TryFrom<String> for SizeLabel {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SizeLabel> for String {
    fn from(value: SizeLabel) -> Self {
        value.as_str().to_string()
    }
}

/// How the external engine process is launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub java: PathBuf,
    pub jar: PathBuf,
    /// JVM heap ceiling, passed as `-Xmx<max_heap>`.
    pub max_heap: String,
    pub working_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            java: PathBuf::from("java"),
            jar: PathBuf::from("VMTrials")
                .join("target")
                .join("VMTrials-1.0-SNAPSHOT-jar-with-dependencies.jar"),
            max_heap: "500g".to_string(),
            working_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub root_folder: PathBuf,
    pub output_dir: PathBuf,
    pub kind: String,
    pub algorithm: String,
    pub dataset_url: String,
    pub engine: EngineConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            root_folder: PathBuf::from("Similarity_search"),
            output_dir: PathBuf::from("result"),
            kind: "clip768v2".to_string(),
            algorithm: "CRANBERRY".to_string(),
            dataset_url: DEFAULT_DATASET_URL.to_string(),
            engine: EngineConfig::default(),
        }
    }
}

impl HarnessConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: HarnessConfig =
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("algorithm", self.algorithm.trim().is_empty()),
            ("kind", self.kind.trim().is_empty()),
            ("dataset_url", self.dataset_url.trim().is_empty()),
            ("engine.max_heap", self.engine.max_heap.trim().is_empty()),
        ];
        match required.into_iter().find(|(_, empty)| *empty) {
            Some((field, _)) => Err(ConfigError::Empty { field }),
            None => Ok(()),
        }
    }
}

/// One benchmark configuration: what a single invocation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunRequest {
    pub size: SizeLabel,
    pub k: usize,
    pub build_index: bool,
}

impl RunRequest {
    pub fn new(size: SizeLabel, k: usize, build_index: bool) -> Result<Self, ConfigError> {
        if k == 0 {
            return Err(ConfigError::InvalidK);
        }
        Ok(Self {
            size,
            k,
            build_index,
        })
    }
}
