//! CLI Commands

pub mod files;
pub mod serve;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use testdrive_common::{Flags, HandlerPathPrefix, ParsedConfiguration, PathResolver, ResolvedConfiguration};
use tracing::debug;

/// Options that take part in resolving a configuration
#[derive(Args, Debug, Clone, Default)]
pub struct ResolveArgs {
    /// Server address, overriding the configuration file
    #[arg(long, env = "TESTDRIVE_SERVER")]
    pub server: Option<String>,

    /// Address browsers use to capture, defaults to `<server>/capture`
    #[arg(long)]
    pub capture_address: Option<String>,

    /// Path prefix every handler is mounted under
    #[arg(long, default_value = "")]
    pub server_handler_prefix: String,

    /// Directory paths are resolved against, overriding the configuration
    #[arg(long)]
    pub base_path: Option<PathBuf>,
}

impl ResolveArgs {
    pub fn flags(&self, port: Option<u16>, preload_files: bool) -> Flags {
        Flags {
            port,
            server: self.server.clone(),
            capture_address: self.capture_address.clone(),
            handler_prefix: HandlerPathPrefix::new(&self.server_handler_prefix),
            preload_files,
        }
    }

    /// Parse `config_path` and resolve every declared path
    pub fn resolve(&self, config_path: &Path, flags: &Flags) -> anyhow::Result<ResolvedConfiguration> {
        let parsed = ParsedConfiguration::from_file(config_path)
            .with_context(|| format!("Failed to read configuration {}", config_path.display()))?;
        let base_dir = self
            .base_path
            .clone()
            .unwrap_or_else(|| parsed.base_dir().to_path_buf());
        debug!("Resolving {} against {}", config_path.display(), base_dir.display());

        let resolver = PathResolver::for_base_dir(&base_dir);
        let resolved = parsed
            .resolve_paths(&resolver, flags)
            .with_context(|| format!("Failed to resolve configuration {}", config_path.display()))?;
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_with_base_path_override() {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path().join("project");
        std::fs::create_dir_all(project.join("src")).unwrap();
        std::fs::write(project.join("src/app.js"), "var app;").unwrap();
        let config = tmp.path().join("testdrive.yaml");
        std::fs::write(&config, "load:\n  - src/*.js\n").unwrap();

        let args = ResolveArgs {
            base_path: Some(project),
            ..Default::default()
        };
        let resolved = args.resolve(&config, &args.flags(Some(4224), false)).unwrap();

        assert_eq!(resolved.files_list().len(), 1);
        assert_eq!(resolved.server(), "http://127.0.0.1:4224");
    }

    #[test]
    fn test_missing_config_reports_path() {
        let args = ResolveArgs::default();
        let err = args
            .resolve(Path::new("/nonexistent/testdrive.yaml"), &args.flags(Some(1), false))
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/testdrive.yaml"));
    }
}
