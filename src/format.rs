//! Output formatting for resolved configs and errors.

use crate::config::ResolvedConfig;
use crate::error::ErrorReport;
use crate::schema::SchemaRegistry;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Protobuf text format (default)
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" | "prototxt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!(
                "Invalid format '{}'. Valid options: text, json",
                s
            )),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Render a resolved config.
///
/// JSON output wraps the tree with the selected task and source files.
pub fn render_config(
    config: &ResolvedConfig,
    schema: &SchemaRegistry,
    format: OutputFormat,
    show_defaults: bool,
) -> String {
    match format {
        OutputFormat::Text => config.to_text(schema, show_defaults),
        OutputFormat::Json => {
            let sources: Vec<String> = config
                .sources()
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            let value = json!({
                "task": config.task_name(),
                "sources": sources,
                "config": config.to_json(),
            });
            serde_json::to_string_pretty(&value).unwrap_or_else(|e| e.to_string())
        }
    }
}

/// Render an error report.
pub fn render_error(report: &ErrorReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut out = format!("error[{}]: {}", code_name(report), report.message);
            if let Some(mount) = report.mount.as_deref().filter(|m| !m.is_empty()) {
                out.push_str(&format!("\n  at mount: {}", mount));
            }
            out
        }
        OutputFormat::Json => serde_json::to_string_pretty(&json!({ "error": report.to_json() }))
            .unwrap_or_else(|e| e.to_string()),
    }
}

fn code_name(report: &ErrorReport) -> String {
    report.to_json()["code"]
        .as_str()
        .unwrap_or("INTERNAL_ERROR")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigResolver;
    use crate::error::ErrorCode;
    use crate::schema::builtin;
    use std::path::Path;

    #[test]
    fn test_parse_format() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert!("yaml".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Json.to_string(), "json");
    }

    #[test]
    fn test_render_config_json() {
        let schema = builtin();
        let config = ConfigResolver::new(schema)
            .resolve_str("train { batch_size: 7 }", Path::new("root.prototxt"), &[])
            .unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&render_config(&config, schema, OutputFormat::Json, false))
                .unwrap();
        assert_eq!(value["task"], "train");
        assert_eq!(value["sources"][0], "root.prototxt");
        assert_eq!(value["config"]["train"]["batch_size"], 7);
    }

    #[test]
    fn test_render_config_text() {
        let schema = builtin();
        let config = ConfigResolver::new(schema)
            .resolve_str("train { batch_size: 7 }", Path::new("root.prototxt"), &[])
            .unwrap();
        assert_eq!(
            render_config(&config, schema, OutputFormat::Text, false),
            "train {\n  batch_size: 7\n}\n"
        );
    }

    #[test]
    fn test_render_error() {
        let report = ErrorReport::new(ErrorCode::AmbiguousTask, "two tasks").with_mount("train");
        assert_eq!(
            render_error(&report, OutputFormat::Text),
            "error[AMBIGUOUS_TASK]: two tasks\n  at mount: train"
        );
        let value: serde_json::Value =
            serde_json::from_str(&render_error(&report, OutputFormat::Json)).unwrap();
        assert_eq!(value["error"]["code"], "AMBIGUOUS_TASK");
    }
}
