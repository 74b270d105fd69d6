use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Invalid version string: {0:?}")]
    InvalidVersion(String),
    #[error("Missing source for '{uid}': {}", path.display())]
    MissingSource { uid: String, path: PathBuf },
    #[error("Identifier not found in mapping table: {0}")]
    MissingMapping(String),
    #[error("No recognizable version metadata in {}", .0.display())]
    MalformedMetadata(PathBuf),
    #[error("Malformed archive {}: {reason}", path.display())]
    MalformedArchive { path: PathBuf, reason: String },
    #[error("Unknown atlas type '{0}'")]
    UnknownAtlasType(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid rule: {0}")]
    InvalidRule(String),
    #[error("Atlas '{0}' has no members to compose")]
    EmptyAtlas(String),
    #[error("No rule set for {platform} {version}")]
    NoRuleSet { platform: String, version: String },
    #[error("A build is already running")]
    BuildInProgress,
    #[error("No build has been started")]
    NotStarted,
    #[error("Build worker panicked: {0}")]
    WorkerPanicked(String),
    #[error("Output directory {} is locked by another build", .0.display())]
    OutputLocked(PathBuf),
    #[error("Build cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, PackError>;
