//! Inlining of test files into the runner page
//!
//! Each file of a case becomes a `<script>` or `<link>` tag wrapped in
//! resource-tracker calls so the browser can report load progress.
//! Emission stops at the first file whose URL the page cannot load directly.

use std::sync::Arc;

use serde::Serialize;
use testdrive_common::{FileEntry, HandlerPathPrefix, TestCaseStore};
use tracing::debug;

use crate::html::HtmlWriter;

/// Translates some files into URLs other than the default `/test/` path
pub trait FileScheme: Send + Sync {
    fn can_handle(&self, file: &FileEntry) -> bool;
    fn source_url(&self, file: &FileEntry, prefix: &HandlerPathPrefix) -> String;
}

/// Which URLs may be inlined, and which are style sheets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinePolicy {
    trusted_prefixes: Vec<String>,
    stylesheet_extensions: Vec<String>,
}

impl InlinePolicy {
    pub fn new(trusted_prefixes: Vec<String>, stylesheet_extensions: Vec<String>) -> Self {
        Self {
            trusted_prefixes,
            stylesheet_extensions,
        }
    }

    /// Web addresses plus files served under `<prefix>/test/`
    pub fn for_prefix(prefix: &HandlerPathPrefix) -> Self {
        Self::new(
            vec![
                "http://".to_string(),
                "https://".to_string(),
                prefix.prefix_path("/test/"),
            ],
            vec![".css".to_string()],
        )
    }

    pub fn is_trusted(&self, url: &str) -> bool {
        self.trusted_prefixes.iter().any(|p| url.starts_with(p.as_str()))
    }

    pub fn is_stylesheet(&self, url: &str) -> bool {
        self.stylesheet_extensions
            .iter()
            .any(|ext| url.ends_with(ext.as_str()))
    }
}

/// Payload handed to `startResourceLoad`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileSource<'a> {
    file_src: &'a str,
    timestamp: i64,
}

pub struct InlineFileEmitter {
    store: Arc<TestCaseStore>,
    prefix: HandlerPathPrefix,
    schemes: Vec<Arc<dyn FileScheme>>,
    policy: InlinePolicy,
}

impl InlineFileEmitter {
    pub fn new(
        store: Arc<TestCaseStore>,
        prefix: HandlerPathPrefix,
        schemes: Vec<Arc<dyn FileScheme>>,
        policy: InlinePolicy,
    ) -> Self {
        Self {
            store,
            prefix,
            schemes,
            policy,
        }
    }

    /// URL the browser should load `file` from
    pub fn source_url(&self, file: &FileEntry) -> String {
        if let Some(scheme) = self.schemes.iter().find(|s| s.can_handle(file)) {
            return scheme.source_url(file, &self.prefix);
        }
        if file.is_web_address() {
            file.path().to_string()
        } else {
            self.prefix
                .prefix_path(&format!("/test/{}", encode_path(file.display_path())))
        }
    }

    /// Write tags for the files of `test_case_id`. Returns how many files
    /// were inlined; an unknown case writes nothing.
    pub fn write_test_files(&self, writer: &mut HtmlWriter, test_case_id: &str) -> usize {
        let Some(case) = self.store.get_case(test_case_id) else {
            return 0;
        };

        let mut written = 0;
        for file in case.iter().filter(|f| !f.is_serve_only()) {
            let url = self.source_url(file);
            if !self.policy.is_trusted(&url) {
                debug!("Stopping inline emission at {}", url);
                break;
            }
            debug!("Writing {}", url);

            let source = FileSource {
                file_src: &url,
                timestamp: file.timestamp(),
            };
            writer.write_script(&format!(
                "jstestdriver.manualResourceTracker.startResourceLoad('{}')",
                js_single_quoted(&json(&source))
            ));
            if self.policy.is_stylesheet(&url) {
                writer.write_style_sheet(&url);
            } else {
                writer.write_external_script(&url);
            }
            writer.write_script("jstestdriver.manualResourceTracker.finishResourceLoad()");
            written += 1;
        }
        written
    }
}

/// Percent-encode each `/`-separated segment of a display path
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment))
        .collect::<Vec<_>>()
        .join("/")
}

fn json(source: &FileSource<'_>) -> String {
    // Only string and integer fields, so serialization cannot fail.
    serde_json::to_string(source).unwrap_or_default()
}

/// Escape for a single-quoted JS string literal inside a `<script>` tag
fn js_single_quoted(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\u0027"),
            '<' => escaped.push_str("\\u003c"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            _ => escaped.push(c),
        }
    }
    escaped
}
