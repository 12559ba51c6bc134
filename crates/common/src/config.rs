//! Declarative configuration and its resolved view
//!
//! A configuration file is YAML:
//!
//! ```yaml
//! server: http://localhost:9876
//! load:
//!   - lib/*.js
//!   - patch lib/fixes.js
//! test:
//!   - test/*.js
//! serve:
//!   - fixtures/*.json
//! exclude:
//!   - lib/debug.js
//! plugin:
//!   - name: coverage
//!     jar: plugins/coverage.jar
//!     module: com.example.CoverageModule
//!     args: one, two
//! timeout: 120
//! doctype: quirks
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::file_set::FileSet;
use crate::resolver::PathResolver;
use crate::store::CachedTestCase;
use crate::types::{FileEntry, Plugin};
use crate::{Error, Result};

/// Marker that turns a `load` entry into a patch for the entry before it
const PATCH_PREFIX: &str = "patch ";

/// Host used when only a port is known
const LOCAL_HOST: &str = "127.0.0.1";

/// Raw shape of the YAML document
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    load: Vec<String>,
    test: Vec<String>,
    serve: Vec<String>,
    exclude: Vec<String>,
    plugin: Vec<PluginDecl>,
    server: Option<String>,
    timeout: u64,
    basepath: Option<PathBuf>,
    proxy: Vec<GatewayRoute>,
    gateway: Vec<GatewayRoute>,
    doctype: DocType,
}

#[derive(Debug, Deserialize)]
struct PluginDecl {
    name: String,
    jar: String,
    module: String,
    #[serde(default)]
    args: Option<String>,
}

/// A forwarding rule for requests the test server does not answer itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRoute {
    pub matcher: String,
    pub server: String,
}

/// Rendering mode of the runner page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    /// Standards mode, `<!DOCTYPE html>`
    #[default]
    Strict,
    /// No declaration, so browsers fall back to quirks mode
    Quirks,
}

impl DocType {
    pub fn declaration(&self) -> Option<&'static str> {
        match self {
            DocType::Strict => Some("<!DOCTYPE html>"),
            DocType::Quirks => None,
        }
    }
}

/// Path prefix under which every handler is mounted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerPathPrefix {
    prefix: Option<String>,
}

impl HandlerPathPrefix {
    /// A prefix of `""` or `"/"` is the same as no prefix
    pub fn new(prefix: &str) -> Self {
        let trimmed = prefix.trim_matches('/');
        Self {
            prefix: (!trimmed.is_empty()).then(|| trimmed.to_string()),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    /// `/test/` becomes `/<prefix>/test/`
    pub fn prefix_path(&self, path: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("/{}/{}", prefix, path.trim_start_matches('/')),
            None => path.to_string(),
        }
    }

    /// `http://host:port` becomes `http://host:port/<prefix>`
    pub fn suffix_server(&self, server: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", server.trim_end_matches('/'), prefix),
            None => server.to_string(),
        }
    }
}

/// Runtime flags that take part in resolution and startup
#[derive(Debug, Clone, Default)]
pub struct Flags {
    pub port: Option<u16>,
    pub server: Option<String>,
    pub capture_address: Option<String>,
    pub handler_prefix: HandlerPathPrefix,
    pub preload_files: bool,
}

/// Configuration as declared, before any path is resolved
#[derive(Debug, Clone)]
pub struct ParsedConfiguration {
    files: FileSet,
    excluded: FileSet,
    tests: Vec<FileEntry>,
    plugins: Vec<Plugin>,
    server: String,
    test_timeout: Duration,
    base_dir: PathBuf,
    gateway: Vec<GatewayRoute>,
    doc_type: DocType,
}

impl ParsedConfiguration {
    /// Parse a YAML configuration; relative paths are resolved against `base_dir`
    pub fn from_yaml(yaml: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let raw: ConfigFile = if yaml.trim().is_empty() {
            ConfigFile::default()
        } else {
            serde_yaml::from_str(yaml)?
        };

        let mut base_dir = base_dir.into();
        if let Some(basepath) = &raw.basepath {
            base_dir = base_dir.join(basepath);
        }

        let mut files: FileSet = raw.load.iter().map(|p| declared_entry(p)).collect();
        files.extend(raw.serve.iter().map(|p| declared_entry(p).serve_only()));

        if let Some(p) = raw.plugin.iter().find(|p| p.name.trim().is_empty() || p.jar.trim().is_empty()) {
            return Err(Error::InvalidConfig(format!(
                "plugin entries need a name and a jar (got name {:?}, jar {:?})",
                p.name, p.jar
            )));
        }
        if let Some(route) = raw
            .proxy
            .iter()
            .chain(&raw.gateway)
            .find(|r| r.matcher.is_empty() || r.server.is_empty())
        {
            return Err(Error::InvalidConfig(format!(
                "gateway routes need a matcher and a server (got {:?} -> {:?})",
                route.matcher, route.server
            )));
        }

        let plugins = raw
            .plugin
            .into_iter()
            .map(|p| Plugin::new(p.name, p.jar, p.module, Plugin::parse_args(p.args.as_deref())))
            .collect();

        Ok(Self {
            files,
            excluded: raw.exclude.iter().map(|p| declared_entry(p)).collect(),
            tests: raw.test.iter().map(|p| declared_entry(p)).collect(),
            plugins,
            server: raw.server.unwrap_or_default(),
            test_timeout: Duration::from_secs(raw.timeout),
            base_dir,
            gateway: raw.proxy.into_iter().chain(raw.gateway).collect(),
            doc_type: raw.doctype,
        })
    }

    /// Load a configuration file; its directory is the base directory
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        debug!("Loading configuration {}", path.display());
        Self::from_yaml(&content, base_dir)
    }

    /// Declared load and serve entries without the declared exclusions
    pub fn files_list(&self) -> FileSet {
        self.files.difference(&self.excluded)
    }

    pub fn excluded(&self) -> &FileSet {
        &self.excluded
    }

    pub fn tests(&self) -> &[FileEntry] {
        &self.tests
    }

    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn test_suite_timeout(&self) -> Duration {
        self.test_timeout
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn gateway_configuration(&self) -> &[GatewayRoute] {
        &self.gateway
    }

    pub fn doc_type(&self) -> DocType {
        self.doc_type
    }

    /// Effective server address for the given flags
    pub fn server_address(&self, flags: &Flags) -> Result<String> {
        server_address(
            flags.server.as_deref(),
            &self.server,
            flags.port,
            &flags.handler_prefix,
        )
    }

    /// Resolve load, test and exclude lists, apply exclusions and compute addresses
    pub fn resolve_paths(
        &self,
        resolver: &PathResolver,
        flags: &Flags,
    ) -> Result<ResolvedConfiguration> {
        let mut files = resolver.resolve(&self.files)?;
        let mut tests = resolver.resolve(&self.tests)?;
        let excluded = resolver.resolve(&self.excluded)?;
        files.remove_all(&excluded);
        tests.remove_all(&excluded);

        let plugins = resolver.resolve_plugins(&self.plugins)?;
        let server = self.server_address(flags)?;
        let capture_address =
            capture_address(&server, flags.capture_address.as_deref(), &flags.handler_prefix);

        info!(
            "Resolved {} files and {} tests (server {})",
            files.len(),
            tests.len(),
            server
        );

        Ok(ResolvedConfiguration {
            files,
            tests: tests.to_vec(),
            plugins,
            server,
            capture_address,
            test_timeout: self.test_timeout,
            base_dir: resolver.base_dir().to_path_buf(),
            gateway: self.gateway.clone(),
            doc_type: self.doc_type,
        })
    }
}

/// Configuration after glob expansion, exclusion and address computation
#[derive(Debug, Clone)]
pub struct ResolvedConfiguration {
    files: FileSet,
    tests: Vec<FileEntry>,
    plugins: Vec<Plugin>,
    server: String,
    capture_address: String,
    test_timeout: Duration,
    base_dir: PathBuf,
    gateway: Vec<GatewayRoute>,
    doc_type: DocType,
}

impl ResolvedConfiguration {
    /// Load and serve files with exclusions applied
    pub fn files_list(&self) -> &FileSet {
        &self.files
    }

    pub fn tests(&self) -> &[FileEntry] {
        &self.tests
    }

    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn capture_address(&self) -> &str {
        &self.capture_address
    }

    pub fn test_suite_timeout(&self) -> Duration {
        self.test_timeout
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn gateway_configuration(&self) -> &[GatewayRoute] {
        &self.gateway
    }

    pub fn doc_type(&self) -> DocType {
        self.doc_type
    }

    /// Bundle the resolved files as a test case ready for the store
    pub fn to_test_case(&self, id: impl Into<String>) -> CachedTestCase {
        let (serve, load): (Vec<FileEntry>, Vec<FileEntry>) =
            self.files.iter().cloned().partition(FileEntry::is_serve_only);
        CachedTestCase::new(id, load, self.tests.clone(), serve)
    }
}

/// Pick the server address: flag, then configuration, then the local port
pub fn server_address(
    flag: Option<&str>,
    configured: &str,
    port: Option<u16>,
    prefix: &HandlerPathPrefix,
) -> Result<String> {
    if let Some(flag) = flag.filter(|f| !f.is_empty()) {
        return Ok(prefix.suffix_server(flag));
    }
    if !configured.is_empty() {
        return Ok(prefix.suffix_server(configured));
    }
    match port {
        Some(port) => Ok(prefix.suffix_server(&format!("http://{}:{}", LOCAL_HOST, port))),
        None => Err(Error::NoServerDefined),
    }
}

/// Address browsers are pointed at to be captured
pub fn capture_address(server: &str, flag: Option<&str>, prefix: &HandlerPathPrefix) -> String {
    match flag.filter(|f| !f.is_empty()) {
        Some(flag) => prefix.suffix_server(flag),
        None => format!("{}/capture", server.trim_end_matches('/')),
    }
}

fn declared_entry(raw: &str) -> FileEntry {
    match raw.strip_prefix(PATCH_PREFIX) {
        Some(path) => FileEntry::unresolved(path.trim()).patch(),
        None => FileEntry::unresolved(raw.trim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags_with_port(port: u16) -> Flags {
        Flags {
            port: Some(port),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_lists() {
        let yaml = r#"
load:
  - code/*.js
  - patch code/patch.js
serve:
  - fixtures/data.json
test:
  - test/*.js
exclude:
  - code/debug.js
"#;
        let config = ParsedConfiguration::from_yaml(yaml, "/base").unwrap();
        let files = config.files_list().to_vec();
        assert_eq!(files.len(), 3);
        assert_eq!(files[0].declared_path(), "code/*.js");
        assert!(files[1].is_patch());
        assert_eq!(files[1].declared_path(), "code/patch.js");
        assert!(files[2].is_serve_only());
        assert_eq!(config.tests().len(), 1);
        assert_eq!(config.excluded().len(), 1);
        assert_eq!(config.base_dir(), Path::new("/base"));
    }

    #[test]
    fn test_parse_plugins_and_extras() {
        let yaml = r#"
server: http://localhost:4224
timeout: 90
basepath: ../src
plugin:
  - name: test
    jar: "pathto.jar"
    module: "com.test.PluginModule"
  - name: test2
    jar: "pathto.jar2"
    module: "com.test.PluginModule2"
    args: hello, world, some/file.js
proxy:
  - matcher: "/api/*"
    server: http://localhost:8080
"#;
        let config = ParsedConfiguration::from_yaml(yaml, "/work/conf").unwrap();
        assert_eq!(config.server(), "http://localhost:4224");
        assert_eq!(config.test_suite_timeout(), Duration::from_secs(90));
        assert_eq!(config.base_dir(), Path::new("/work/conf/../src"));
        assert_eq!(config.plugins().len(), 2);
        assert!(config.plugins()[0].args.is_empty());
        assert_eq!(config.plugins()[1].args, vec!["hello", "world", "some/file.js"]);
        assert_eq!(config.gateway_configuration()[0].matcher, "/api/*");
    }

    #[test]
    fn test_doctype_defaults_to_strict_and_survives_resolution() {
        let strict = ParsedConfiguration::from_yaml("load: []", "/base").unwrap();
        assert_eq!(strict.doc_type(), DocType::Strict);
        assert_eq!(strict.doc_type().declaration(), Some("<!DOCTYPE html>"));

        let quirks = ParsedConfiguration::from_yaml("doctype: quirks", "/base").unwrap();
        assert_eq!(quirks.doc_type(), DocType::Quirks);
        assert_eq!(quirks.doc_type().declaration(), None);

        let resolver = PathResolver::for_base_dir("/base");
        let resolved = quirks.resolve_paths(&resolver, &flags_with_port(4224)).unwrap();
        assert_eq!(resolved.doc_type(), DocType::Quirks);

        assert!(matches!(
            ParsedConfiguration::from_yaml("doctype: loose", "/base"),
            Err(Error::Yaml(_))
        ));
    }

    #[test]
    fn test_incomplete_declarations_are_rejected() {
        let plugin = "plugin:\n  - name: \"\"\n    jar: a.jar\n    module: m\n";
        assert!(matches!(
            ParsedConfiguration::from_yaml(plugin, "/base"),
            Err(Error::InvalidConfig(_))
        ));

        let route = "gateway:\n  - matcher: \"/api/*\"\n    server: \"\"\n";
        assert!(matches!(
            ParsedConfiguration::from_yaml(route, "/base"),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_empty_document() {
        let config = ParsedConfiguration::from_yaml("", "/base").unwrap();
        assert!(config.files_list().is_empty());
        assert_eq!(config.server(), "");
    }

    #[test]
    fn test_server_address_precedence() {
        let none = HandlerPathPrefix::none();
        assert_eq!(
            server_address(Some("http://flag:1"), "http://conf:2", Some(3), &none).unwrap(),
            "http://flag:1"
        );
        assert_eq!(
            server_address(Some(""), "http://conf:2", Some(3), &none).unwrap(),
            "http://conf:2"
        );
        assert_eq!(
            server_address(None, "", Some(3), &none).unwrap(),
            "http://127.0.0.1:3"
        );
        assert!(matches!(
            server_address(None, "", None, &none),
            Err(Error::NoServerDefined)
        ));
    }

    #[test]
    fn test_server_address_is_suffixed() {
        let prefix = HandlerPathPrefix::new("/jstd/");
        assert_eq!(
            server_address(None, "", Some(9876), &prefix).unwrap(),
            "http://127.0.0.1:9876/jstd"
        );
        assert_eq!(prefix.prefix_path("/test/"), "/jstd/test/");
        assert_eq!(HandlerPathPrefix::new("/").prefix_path("/test/"), "/test/");
    }

    #[test]
    fn test_capture_address() {
        let none = HandlerPathPrefix::none();
        assert_eq!(
            capture_address("http://127.0.0.1:9876", None, &none),
            "http://127.0.0.1:9876/capture"
        );
        assert_eq!(
            capture_address("http://127.0.0.1:9876", Some("http://other:1/cap"), &none),
            "http://other:1/cap"
        );
    }

    #[test]
    fn test_server_address_from_flags() {
        let config = ParsedConfiguration::from_yaml("load: []", "/base").unwrap();
        assert_eq!(
            config.server_address(&flags_with_port(8080)).unwrap(),
            "http://127.0.0.1:8080"
        );
        assert!(config.server_address(&Flags::default()).is_err());
    }
}
