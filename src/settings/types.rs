//! Settings types for the resolver tool itself.

use crate::config::{ConfigResolver, DEFAULT_EXTENSION, DEFAULT_MAX_INCLUDE_DEPTH};
use crate::format::OutputFormat;
use crate::schema::SchemaRegistry;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub resolver: ResolverSettings,
    #[serde(default)]
    pub output: OutputSettings,
}

impl Settings {
    /// Build a resolver configured from these settings.
    pub fn resolver<'s>(&self, schema: &'s SchemaRegistry) -> ConfigResolver<'s> {
        ConfigResolver::new(schema)
            .with_common_dirs(self.search.common_dirs.iter().cloned())
            .with_extension(&self.search.extension)
            .with_max_include_depth(self.resolver.max_include_depth)
    }
}

/// Where includes are looked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Directories searched after the including file's own directory.
    #[serde(default = "default_common_dirs")]
    pub common_dirs: Vec<PathBuf>,

    /// Extension appended to include paths (default: prototxt).
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            common_dirs: default_common_dirs(),
            extension: default_extension(),
        }
    }
}

fn default_common_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("conf/common")]
}

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverSettings {
    /// Maximum nesting of includes before resolution fails (default: 32).
    #[serde(default = "default_max_include_depth")]
    pub max_include_depth: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            max_include_depth: default_max_include_depth(),
        }
    }
}

fn default_max_include_depth() -> usize {
    DEFAULT_MAX_INCLUDE_DEPTH
}

/// How resolved configs are printed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(default)]
    pub format: OutputFormat,

    /// Print fields that only carry schema defaults.
    #[serde(default)]
    pub show_defaults: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::builtin;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.search.common_dirs, vec![PathBuf::from("conf/common")]);
        assert_eq!(settings.search.extension, "prototxt");
        assert_eq!(settings.resolver.max_include_depth, 32);
        assert_eq!(settings.output.format, OutputFormat::Text);
        assert!(!settings.output.show_defaults);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let settings: Settings =
            serde_yaml::from_str("search:\n  extension: cfg\noutput:\n  format: json\n").unwrap();
        assert_eq!(settings.search.extension, "cfg");
        assert_eq!(settings.search.common_dirs, vec![PathBuf::from("conf/common")]);
        assert_eq!(settings.output.format, OutputFormat::Json);
    }

    #[test]
    fn test_resolver_uses_settings() {
        let mut settings = Settings::default();
        settings.search.extension = "cfg".into();
        settings.search.common_dirs = vec![PathBuf::from("a"), PathBuf::from("b")];
        let resolver = settings.resolver(builtin());
        assert_eq!(resolver.extension(), "cfg");
        assert_eq!(resolver.common_dirs().len(), 2);
    }
}
