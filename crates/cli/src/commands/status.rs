//! Reporting configuration and current run status

use std::path::Path;
use testrelay_common::{Project, RelayConfig, RunMetadata, RunMetadataStore};
use testrelay_reporter::setup::grep_label;

use crate::output::{self, Field, OutputFormat};

/// Settings and run metadata as display rows. The bot token is never shown.
pub fn status_fields(
    config: &RelayConfig,
    config_path: &Path,
    meta: Option<&RunMetadata>,
) -> Vec<Field> {
    let config_file = if config_path.exists() {
        config_path.display().to_string()
    } else {
        format!("{} (not found, using defaults)", config_path.display())
    };

    let reporting = match config.discord.credentials() {
        Some(_) => "enabled",
        None => "disabled",
    };

    let projects: Vec<&str> = config
        .run
        .selected_projects()
        .iter()
        .map(Project::as_str)
        .collect();

    let mut fields = vec![
        Field::new("config file", config_file),
        Field::new("discord reporting", reporting),
        Field::new(
            "channel",
            config.discord.channel_id.clone().unwrap_or_else(|| "-".to_string()),
        ),
        Field::new("api base", config.discord.api_base.clone()),
        Field::new("log passed", config.discord.log_passed.to_string()),
        Field::new("environment", config.run.test_env.clone()),
        Field::new(
            "base url",
            config.run.base_url().unwrap_or_else(|e| e.to_string()),
        ),
        Field::new(
            "graphql endpoint",
            match config.run.api_base_url() {
                Ok(base) => format!("{}{}", base.trim_end_matches('/'), config.run.graphql_path),
                Err(e) => e.to_string(),
            },
        ),
        Field::new("tags", grep_label(config.run.tags.as_deref(), None)),
        Field::new("threads", config.run.threads.to_string()),
        Field::new("projects", projects.join(", ")),
        Field::new("run metadata", config.run.run_meta_path.display().to_string()),
    ];

    match meta {
        Some(meta) => {
            fields.push(Field::new("suite", meta.suite_label.clone()));
            fields.push(Field::new("thread", meta.thread_id.clone()));
            fields.push(Field::new("header message", meta.header_message_id.clone()));
        }
        None => fields.push(Field::new("active run", "none")),
    }

    fields
}

pub async fn execute(
    config: &RelayConfig,
    config_path: &Path,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let store = RunMetadataStore::new(&config.run.run_meta_path);
    let meta = store.load().await;
    output::print_list(&status_fields(config, config_path, meta.as_ref()), format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value<'a>(fields: &'a [Field], key: &str) -> &'a str {
        fields
            .iter()
            .find(|f| f.key == key)
            .map(|f| f.value.as_str())
            .unwrap()
    }

    #[test]
    fn test_status_hides_token_and_reports_missing_targets() {
        let mut config = RelayConfig::default();
        config.discord.bot_token = Some("secret-token".to_string());
        config.discord.channel_id = Some("123".to_string());

        let fields = status_fields(&config, Path::new("missing.toml"), None);
        assert_eq!(value(&fields, "discord reporting"), "enabled");
        assert!(value(&fields, "base url").contains("BASE_URL_LOCAL"));
        assert_eq!(value(&fields, "projects"), "e2e, api");
        assert_eq!(value(&fields, "active run"), "none");
        assert!(fields.iter().all(|f| !f.value.contains("secret-token")));
    }

    #[test]
    fn test_status_lists_active_run() {
        let mut config = RelayConfig::default();
        config.run.api_base_url = Some("http://localhost:8080/".to_string());
        let meta = RunMetadata {
            thread_id: "thr".to_string(),
            channel_id: "chan".to_string(),
            header_message_id: "head".to_string(),
            suite_label: "Suite: LOCAL | all".to_string(),
        };

        let fields = status_fields(&config, Path::new("missing.toml"), Some(&meta));
        assert_eq!(value(&fields, "discord reporting"), "disabled");
        assert_eq!(
            value(&fields, "graphql endpoint"),
            "http://127.0.0.1:8080/api/v1/pharmaserv/graphql"
        );
        assert_eq!(value(&fields, "thread"), "thr");
    }
}
