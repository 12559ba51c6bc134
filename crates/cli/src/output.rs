//! Output formatting for CLI

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use testdrive_common::FileEntry;

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
    /// Plain text format
    Plain,
}

impl OutputFormat {
    /// Whether free-form messages may be mixed into the output
    pub fn is_human(self) -> bool {
        matches!(self, OutputFormat::Table | OutputFormat::Plain)
    }
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

/// Which list of the configuration a file came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRole {
    Load,
    Serve,
    Test,
}

impl std::fmt::Display for FileRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileRole::Load => write!(f, "load"),
            FileRole::Serve => write!(f, "serve"),
            FileRole::Test => write!(f, "test"),
        }
    }
}

/// One resolved file as shown by `testdrive files`
#[derive(Debug, Clone, Serialize)]
pub struct FileRow {
    pub role: FileRole,
    pub display_path: String,
    pub path: String,
    pub timestamp: i64,
    pub patches: Vec<String>,
}

impl FileRow {
    pub fn new(role: FileRole, file: &FileEntry) -> Self {
        Self {
            role,
            display_path: file.display_path().to_string(),
            path: file.path().to_string(),
            timestamp: file.timestamp(),
            patches: file
                .patches()
                .iter()
                .map(|p| p.display_path().to_string())
                .collect(),
        }
    }

    /// Load and serve rows in file-list order, followed by test rows
    pub fn from_lists<'a>(
        files: impl IntoIterator<Item = &'a FileEntry>,
        tests: impl IntoIterator<Item = &'a FileEntry>,
    ) -> Vec<Self> {
        let files = files.into_iter().map(|f| {
            let role = if f.is_serve_only() {
                FileRole::Serve
            } else {
                FileRole::Load
            };
            Self::new(role, f)
        });
        let tests = tests.into_iter().map(|f| Self::new(FileRole::Test, f));
        files.chain(tests).collect()
    }
}

impl TableDisplay for FileRow {
    fn headers() -> Vec<&'static str> {
        vec!["Role", "File", "Path", "Modified", "Patches"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.role.to_string(),
            self.display_path.clone(),
            self.path.clone(),
            if self.timestamp < 0 {
                "-".to_string()
            } else {
                self.timestamp.to_string()
            },
            self.patches.join(", "),
        ]
    }
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    if items.is_empty() && format.is_human() {
        println!("No files found.");
        return;
    }

    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);

            table.set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }

            println!("{table}");
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(items).unwrap_or_default());
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(items).unwrap_or_default());
        }
        OutputFormat::Plain => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    println!("---");
                }
                let row = item.row();
                for (header, value) in T::headers().iter().zip(row.iter()) {
                    println!("{}: {}", header, value);
                }
            }
        }
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

/// Print info message
pub fn print_info(message: &str) {
    println!("ℹ️  {}", message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_follow_list_order() {
        let load = vec![
            FileEntry::with_content("a.js", 1, "a"),
            FileEntry::with_content("data.json", 2, "{}").serve_only(),
        ];
        let tests = vec![FileEntry::with_content("a_test.js", -1, "t")];

        let rows = FileRow::from_lists(&load, &tests);
        let roles: Vec<_> = rows.iter().map(|r| r.role).collect();
        assert_eq!(roles, vec![FileRole::Load, FileRole::Serve, FileRole::Test]);
        assert_eq!(rows[2].row()[3], "-");
    }

    #[test]
    fn test_row_serializes_role_lowercase() {
        let row = FileRow::new(FileRole::Serve, &FileEntry::with_content("x.js", 1, "x"));
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["role"], "serve");
        assert_eq!(json["display_path"], "x.js");
    }
}
