//! Resolve, validate and watch subcommands.

use crate::config::{ConfigResolver, ResolveError, ResolvedConfig, parse_overrides};
use crate::format::OutputFormat;
use clap::Args;
use serde_json::json;
use std::path::PathBuf;

/// Arguments shared by the resolve, validate and watch subcommands
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Root config file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Overrides relative to the selected task: `a.b=value` or `I.mount=path`
    #[arg(value_name = "OVERRIDES")]
    pub overrides: Vec<String>,
}

/// Parse the overrides in `args` and resolve its root config.
pub fn resolve(
    args: &ResolveArgs,
    resolver: &ConfigResolver<'_>,
) -> Result<ResolvedConfig, ResolveError> {
    let overrides = parse_overrides(&args.overrides)?;
    resolver.resolve_file(&args.config, &overrides)
}

/// One-line (or JSON) summary of a successful validation.
pub fn validation_summary(config: &ResolvedConfig, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format!(
            "OK: task '{}' resolved from {} file(s)",
            config.task_name(),
            config.sources().len()
        ),
        OutputFormat::Json => {
            let sources: Vec<String> = config
                .sources()
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            json!({"valid": true, "task": config.task_name(), "sources": sources}).to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::builtin;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_with_overrides() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("root.prototxt");
        fs::write(&root, "train { batch_size: 10 }").unwrap();

        let args = ResolveArgs {
            config: root,
            overrides: vec!["batch_size=20".into(), "lr=0.5".into()],
        };
        let config = resolve(&args, &ConfigResolver::new(builtin())).unwrap();
        assert_eq!(config.get_i64("train.batch_size"), Some(20));
        assert_eq!(config.get_f64("train.lr"), Some(0.5));
        assert_eq!(
            validation_summary(&config, OutputFormat::Text),
            "OK: task 'train' resolved from 1 file(s)"
        );
    }

    #[test]
    fn test_bad_override_fails_before_reading() {
        let args = ResolveArgs {
            config: PathBuf::from("/does/not/exist.prototxt"),
            overrides: vec!["oops".into()],
        };
        assert!(matches!(
            resolve(&args, &ConfigResolver::new(builtin())),
            Err(ResolveError::InvalidOverride { .. })
        ));
    }
}
