//! Integration tests for settings tiers feeding the resolver.
//!
//! Tests that settings loaded through SettingsLoader:
//! - respect tier precedence (defaults < project < user < environment)
//! - configure include search for the resolver they build

use conf_resolver::format::OutputFormat;
use conf_resolver::schema::builtin;
use conf_resolver::settings::{SettingsLoader, SettingsPaths, SettingsTier};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, text).unwrap();
    path
}

fn no_env(_: &str) -> Option<String> {
    None
}

#[test]
fn test_tier_precedence() {
    let temp = TempDir::new().unwrap();
    let project = temp.path().join("project");
    let user = temp.path().join("user");
    write(
        &project,
        "config.yaml",
        "search:\n  extension: cfg\nresolver:\n  max_include_depth: 4\noutput:\n  format: json\n",
    );
    write(&user, "config.yaml", "resolver:\n  max_include_depth: 6\n");

    let env = |name: &str| (name == "CONF_RESOLVER_EXTENSION").then(|| "pbtxt".to_string());
    let loader =
        SettingsLoader::load_with_env(SettingsPaths::with_dirs(Some(project), Some(user)), env)
            .unwrap();
    let tiers: Vec<SettingsTier> = loader.loaded_from().iter().map(|(t, _)| *t).collect();
    assert_eq!(tiers, vec![SettingsTier::Project, SettingsTier::User]);

    let settings = loader.settings();
    assert_eq!(settings.search.extension, "pbtxt");
    assert_eq!(settings.resolver.max_include_depth, 6);
    assert_eq!(settings.output.format, OutputFormat::Json);
    assert_eq!(settings.search.common_dirs, vec![PathBuf::from("conf/common")]);
}

#[test]
fn test_settings_drive_include_search() {
    let temp = TempDir::new().unwrap();
    let shared = temp.path().join("shared");
    write(&shared, "slurm.cfg", "slurm { num_gpus: 4 }");
    let root = write(
        temp.path(),
        "exp/root.cfg",
        r#"includes { path: "slurm" mount: "train.launcher" } train { batch_size: 1000 }"#,
    );
    let project = temp.path().join("project");
    write(
        &project,
        "config.yaml",
        &format!(
            "search:\n  extension: .cfg\n  common_dirs:\n    - {}\n",
            shared.display()
        ),
    );

    let settings =
        SettingsLoader::load_with_env(SettingsPaths::with_dirs(Some(project), None), no_env)
            .unwrap()
            .into_settings();
    let resolver = settings.resolver(builtin());
    assert_eq!(resolver.extension(), "cfg");

    let config = resolver.resolve_file(&root, &[]).unwrap();
    assert_eq!(config.get_i64("train.launcher.slurm.num_gpus"), Some(4));
    assert_eq!(config.get_i64("train.batch_size"), Some(1000));
}

#[test]
fn test_depth_setting_limits_nesting() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "a.prototxt", r#"includes { path: "b" }"#);
    write(temp.path(), "b.prototxt", "train { batch_size: 1 }");
    let root = write(temp.path(), "root.prototxt", r#"includes { path: "a" }"#);

    let env = |name: &str| (name == "CONF_RESOLVER_MAX_INCLUDE_DEPTH").then(|| "1".to_string());
    let settings = SettingsLoader::load_with_env(SettingsPaths::default(), env)
        .unwrap()
        .into_settings();
    assert!(settings.resolver(builtin()).resolve_file(&root, &[]).is_err());
}
