use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Fatal errors: the bridge cannot keep serving
#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("bluetooth: {0}")]
    Bluetooth(#[from] bluer::Error),
    #[error("bluetooth adapter {0} not found")]
    NoAdapter(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
