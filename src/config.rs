use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// OAuth client secret downloaded from the Google Cloud console.
    pub client_secret: PathBuf,
    /// Compact filter file used by `apply` when `--filters` is not given.
    pub filters_file: PathBuf,
    /// Create labels referenced by filters that don't exist yet.
    pub auto_create_labels: bool,
    pub user_id: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_secret: PathBuf::from("client_secret.json"),
            filters_file: PathBuf::from("filters.yaml"),
            auto_create_labels: true,
            user_id: "me".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Self {
        use std::fs;
        match fs::read_to_string(path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                warn!("Ignoring {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
