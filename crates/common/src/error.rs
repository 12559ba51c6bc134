//! Error types for Testdrive

use thiserror::Error;

use crate::types::UnreadableFile;

/// Result type alias using Testdrive Error
pub type Result<T> = std::result::Result<T, Error>;

/// Testdrive error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(
        "The patterns/paths {pattern} ({directory}) used in the configuration file didn't match \
         any file, the files patterns/paths need to be relative to {base}"
    )]
    PatternNotMatched {
        pattern: String,
        directory: String,
        base: String,
    },

    #[error("{}", describe_unreadable(.0))]
    UnreadableFiles(Vec<UnreadableFile>),

    #[error("Patch {0} without a core file to patch")]
    PatchWithoutTarget(String),

    #[error("No server defined: pass --server or --port, or set `server` in the configuration")]
    NoServerDefined,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Error starting the server on {port}: {reason}")]
    ServerStartup {
        port: u16,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },
}

impl Error {
    /// Startup failure without an underlying cause
    pub fn server_startup(port: u16, reason: impl Into<String>) -> Self {
        Error::ServerStartup {
            port,
            reason: reason.into(),
            source: None,
        }
    }

    /// Startup failure wrapping the error raised by the server
    pub fn server_startup_caused_by(
        port: u16,
        reason: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Error::ServerStartup {
            port,
            reason: reason.into(),
            source: Some(source.into()),
        }
    }

    /// The unreadable entries carried by an aggregate failure, empty otherwise
    pub fn unreadable_files(&self) -> &[UnreadableFile] {
        match self {
            Error::UnreadableFiles(files) => files,
            _ => &[],
        }
    }
}

fn describe_unreadable(files: &[UnreadableFile]) -> String {
    let listing = files
        .iter()
        .map(|f| format!("{} ({})", f.declared_path, f.resolved_path))
        .collect::<Vec<_>>()
        .join(", ");
    format!("Unreadable files: {}", listing)
}
