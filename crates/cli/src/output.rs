//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use testrelay_common::TestOutcome;
use testrelay_e2e::TestResult;

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
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

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

/// One `key: value` line of a status listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub key: &'static str,
    pub value: String,
}

impl Field {
    pub fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

impl TableDisplay for Field {
    fn headers() -> Vec<&'static str> {
        vec!["Setting", "Value"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.key.to_string(), self.value.clone()]
    }
}

impl TableDisplay for TestResult {
    fn headers() -> Vec<&'static str> {
        vec!["Test", "Project", "Outcome", "Duration", "Error"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.project.as_str().to_string(),
            self.outcome.to_string(),
            format!("{} ms", self.duration_ms),
            self.error.clone().unwrap_or_default(),
        ]
    }
}

fn table<T: TableDisplay>(rows: impl Iterator<Item = Vec<String>>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(T::headers());
    for row in rows {
        table.add_row(row);
    }
    table
}

/// Render a list of items
pub fn render_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) -> String {
    match format {
        OutputFormat::Table => table::<T>(items.iter().map(T::row)).to_string(),
        OutputFormat::Json => serde_json::to_string_pretty(items).unwrap_or_default(),
        OutputFormat::Yaml => serde_yaml::to_string(items).unwrap_or_default(),
        OutputFormat::Plain => items
            .iter()
            .map(|item| {
                T::headers()
                    .iter()
                    .zip(item.row())
                    .map(|(header, value)| format!("{}: {}", header, value))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect::<Vec<_>>()
            .join("\n---\n"),
    }
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    if items.is_empty() {
        println!("No items found.");
        return;
    }
    println!("{}", render_list(items, format));
}

/// Colored outcome label for terminal summaries
pub fn outcome_label(outcome: TestOutcome) -> String {
    match outcome {
        TestOutcome::Passed => "passed".green().to_string(),
        TestOutcome::Failed => "failed".red().to_string(),
        TestOutcome::TimedOut => "timed out".red().bold().to_string(),
        TestOutcome::Skipped => "skipped".dimmed().to_string(),
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("⚠️  {}", message);
}

/// Print info message
pub fn print_info(message: &str) {
    println!("ℹ️  {}", message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_list_separates_items() {
        let fields = vec![Field::new("threads", "4"), Field::new("env", "LOCAL")];
        assert_eq!(
            render_list(&fields, OutputFormat::Plain),
            "Setting: threads\nValue: 4\n---\nSetting: env\nValue: LOCAL"
        );
    }

    #[test]
    fn test_json_list_uses_field_names() {
        let fields = vec![Field::new("threads", "4")];
        let json: serde_json::Value =
            serde_json::from_str(&render_list(&fields, OutputFormat::Json)).unwrap();
        assert_eq!(json[0]["key"], "threads");
        assert_eq!(json[0]["value"], "4");
    }

    #[test]
    fn test_table_contains_headers() {
        let fields = vec![Field::new("channel", "123")];
        let rendered = render_list(&fields, OutputFormat::Table);
        assert!(rendered.contains("Setting"));
        assert!(rendered.contains("123"));
    }
}
