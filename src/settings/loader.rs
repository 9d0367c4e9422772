//! Settings loader with tier-based merging.

use super::merge::deep_merge_all;
use super::types::Settings;
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Explicit settings file; disables tier merging.
pub const SETTINGS_ENV: &str = "CONF_RESOLVER_SETTINGS";
/// Colon-separated list of common include directories.
pub const COMMON_DIRS_ENV: &str = "CONF_RESOLVER_COMMON_DIRS";
pub const EXTENSION_ENV: &str = "CONF_RESOLVER_EXTENSION";
pub const MAX_INCLUDE_DEPTH_ENV: &str = "CONF_RESOLVER_MAX_INCLUDE_DEPTH";

const SETTINGS_FILE: &str = "config.yaml";
const SETTINGS_DIR: &str = ".conf-resolver";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read settings file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid YAML in settings file {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid settings: {0}")]
    Invalid(#[from] serde_json::Error),

    #[error("invalid value '{value}' for {name}: {reason}")]
    InvalidEnv {
        name: String,
        value: String,
        reason: String,
    },
}

/// Settings tier priority (lowest to highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SettingsTier {
    Defaults = 0,
    /// `./.conf-resolver/config.yaml`
    Project = 1,
    /// `~/.conf-resolver/config.yaml`
    User = 2,
    Environment = 3,
}

impl std::fmt::Display for SettingsTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsTier::Defaults => write!(f, "defaults"),
            SettingsTier::Project => write!(f, "project"),
            SettingsTier::User => write!(f, "user"),
            SettingsTier::Environment => write!(f, "environment"),
        }
    }
}

/// Where each settings tier lives.
#[derive(Debug, Clone, Default)]
pub struct SettingsPaths {
    /// Single file replacing the project and user tiers.
    pub explicit: Option<PathBuf>,
    pub project_dir: Option<PathBuf>,
    pub user_dir: Option<PathBuf>,
}

impl SettingsPaths {
    /// Discover settings paths from the environment and home directory.
    pub fn discover() -> Self {
        Self {
            explicit: std::env::var(SETTINGS_ENV).ok().map(PathBuf::from),
            project_dir: Some(PathBuf::from(SETTINGS_DIR)),
            user_dir: dirs::home_dir().map(|h| h.join(SETTINGS_DIR)),
        }
    }

    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            explicit: None,
            project_dir,
            user_dir,
        }
    }

    /// Use a single settings file instead of the project and user tiers.
    pub fn with_explicit(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit = Some(path.into());
        self
    }
}

/// Loaded settings plus the files they came from.
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    pub paths: SettingsPaths,
    settings: Settings,
    loaded_from: Vec<(SettingsTier, PathBuf)>,
}

impl SettingsLoader {
    /// Load settings from all tiers using the process environment.
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_with_paths(SettingsPaths::discover())
    }

    pub fn load_with_paths(paths: SettingsPaths) -> Result<Self, SettingsError> {
        Self::load_with_env(paths, |name| std::env::var(name).ok())
    }

    /// Load settings, reading environment overrides through `env`.
    pub fn load_with_env(
        paths: SettingsPaths,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SettingsError> {
        let mut tiers: Vec<Value> = vec![serde_json::to_value(Settings::default())?];
        let mut loaded_from = Vec::new();

        let files: Vec<(SettingsTier, PathBuf)> = match &paths.explicit {
            Some(path) => vec![(SettingsTier::Project, path.clone())],
            None => [
                (SettingsTier::Project, paths.project_dir.as_deref()),
                (SettingsTier::User, paths.user_dir.as_deref()),
            ]
            .into_iter()
            .filter_map(|(tier, dir)| dir.map(|d| (tier, d.join(SETTINGS_FILE))))
            .filter(|(_, file)| file.exists())
            .collect(),
        };

        for (tier, file) in files {
            debug!("Loading {} settings from {}", tier, file.display());
            tiers.push(read_yaml(&file)?);
            loaded_from.push((tier, file));
        }

        let mut settings: Settings = serde_json::from_value(deep_merge_all(tiers))?;
        Self::apply_env_overrides(&mut settings, env)?;

        Ok(Self {
            paths,
            settings,
            loaded_from,
        })
    }

    fn apply_env_overrides(
        settings: &mut Settings,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<(), SettingsError> {
        if let Some(dirs) = env(COMMON_DIRS_ENV) {
            settings.search.common_dirs = std::env::split_paths(&dirs)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
        }

        if let Some(extension) = env(EXTENSION_ENV) {
            settings.search.extension = extension.trim_start_matches('.').to_string();
        }

        if let Some(depth) = env(MAX_INCLUDE_DEPTH_ENV) {
            settings.resolver.max_include_depth =
                depth.trim().parse().map_err(|e: std::num::ParseIntError| {
                    SettingsError::InvalidEnv {
                        name: MAX_INCLUDE_DEPTH_ENV.to_string(),
                        value: depth.clone(),
                        reason: e.to_string(),
                    }
                })?;
        }

        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn into_settings(self) -> Settings {
        self.settings
    }

    /// Settings files that contributed, lowest tier first.
    pub fn loaded_from(&self) -> &[(SettingsTier, PathBuf)] {
        &self.loaded_from
    }
}

fn read_yaml(path: &Path) -> Result<Value, SettingsError> {
    let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str::<Value>(&content).map_err(|source| SettingsError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::OutputFormat;
    use std::fs;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn write_settings(dir: &Path, content: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(SETTINGS_FILE), content).unwrap();
    }

    #[test]
    fn test_defaults_without_files() {
        let temp = TempDir::new().unwrap();
        let paths = SettingsPaths::with_dirs(
            Some(temp.path().join("project")),
            Some(temp.path().join("user")),
        );
        let loader = SettingsLoader::load_with_env(paths, no_env).unwrap();
        assert_eq!(loader.settings(), &Settings::default());
        assert!(loader.loaded_from().is_empty());
    }

    #[test]
    fn test_user_tier_beats_project_tier() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("project");
        let user = temp.path().join("user");
        write_settings(
            &project,
            "search:\n  extension: cfg\n  common_dirs: [shared]\noutput:\n  show_defaults: true\n",
        );
        write_settings(&user, "search:\n  extension: txt\n");

        let loader =
            SettingsLoader::load_with_env(SettingsPaths::with_dirs(Some(project), Some(user)), no_env)
                .unwrap();
        let settings = loader.settings();
        assert_eq!(settings.search.extension, "txt");
        assert_eq!(settings.search.common_dirs, vec![PathBuf::from("shared")]);
        assert!(settings.output.show_defaults);
        assert_eq!(loader.loaded_from().len(), 2);
        assert_eq!(loader.loaded_from()[1].0, SettingsTier::User);
    }

    #[test]
    fn test_environment_beats_files() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("project");
        write_settings(&project, "resolver:\n  max_include_depth: 4\n");

        let env = |name: &str| match name {
            MAX_INCLUDE_DEPTH_ENV => Some("9".to_string()),
            EXTENSION_ENV => Some(".pbtxt".to_string()),
            COMMON_DIRS_ENV => Some("one:two".to_string()),
            _ => None,
        };
        let settings =
            SettingsLoader::load_with_env(SettingsPaths::with_dirs(Some(project), None), env)
                .unwrap()
                .into_settings();
        assert_eq!(settings.resolver.max_include_depth, 9);
        assert_eq!(settings.search.extension, "pbtxt");
        assert_eq!(
            settings.search.common_dirs,
            vec![PathBuf::from("one"), PathBuf::from("two")]
        );
    }

    #[test]
    fn test_explicit_file_skips_tiers() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("project");
        write_settings(&project, "search:\n  extension: cfg\n");
        let explicit = temp.path().join("mine.yaml");
        fs::write(&explicit, "output:\n  format: json\n").unwrap();

        let paths = SettingsPaths::with_dirs(Some(project), None).with_explicit(&explicit);
        let settings = SettingsLoader::load_with_env(paths, no_env)
            .unwrap()
            .into_settings();
        assert_eq!(settings.search.extension, "prototxt");
        assert_eq!(settings.output.format, OutputFormat::Json);
    }

    #[test]
    fn test_errors_are_reported() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("project");
        write_settings(&project, "search: [unclosed\n");
        let err = SettingsLoader::load_with_env(
            SettingsPaths::with_dirs(Some(project.clone()), None),
            no_env,
        )
        .unwrap_err();
        assert!(matches!(err, SettingsError::Yaml { .. }));

        let missing = SettingsPaths::default().with_explicit(temp.path().join("absent.yaml"));
        assert!(matches!(
            SettingsLoader::load_with_env(missing, no_env),
            Err(SettingsError::Read { .. })
        ));

        let bad_depth = |name: &str| (name == MAX_INCLUDE_DEPTH_ENV).then(|| "deep".to_string());
        assert!(matches!(
            SettingsLoader::load_with_env(SettingsPaths::default(), bad_depth),
            Err(SettingsError::InvalidEnv { .. })
        ));
    }
}
