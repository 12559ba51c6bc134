//! Testdrive Common Library
//!
//! Configuration resolution and the file model shared by the Testdrive
//! server and command line:
//! - [`PathResolver`] expands declared paths, globs and patches into files
//! - [`ParsedConfiguration`] / [`ResolvedConfiguration`] apply exclusions and
//!   compute the server and capture addresses
//! - [`TestCaseStore`] caches resolved files per test case for delivery

pub mod config;
pub mod error;
pub mod file_set;
pub mod resolver;
pub mod sanitizer;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::{
    capture_address, server_address, DocType, Flags, GatewayRoute, HandlerPathPrefix,
    ParsedConfiguration, ResolvedConfiguration,
};
pub use error::{Error, Result};
pub use file_set::FileSet;
pub use resolver::{FileParsePostProcessor, PathResolver};
pub use sanitizer::DisplayPathSanitizer;
pub use store::{
    CachedTestCase, DiskFileLoader, FileLoader, FileLookup, FilesCache, TestCaseStore,
};
pub use types::{is_web_address, FileEntry, FileKey, Plugin, UnreadableFile, UNKNOWN_TIMESTAMP};

/// Testdrive version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "testdrive.yaml";
