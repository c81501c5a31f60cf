//! Error types for pincer-core.
//!
//! Nothing in this crate is fatal to the process: failures surface as
//! structured results, logged diagnostics, or safe defaults. `CoreError`
//! covers the places where a caller still needs a typed error (settings
//! persistence, tokenizer construction).

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings file {path}: {source}")]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize settings: {0}")]
    SettingsSerialize(#[from] toml::ser::Error),

    #[error("no config directory available on this platform")]
    NoConfigDir,

    #[error("tokenizer initialization failed: {0}")]
    Tokenizer(String),
}
