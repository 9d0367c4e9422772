//! Structured error reports for command-line output.

use crate::config::{LocateError, MergeError, ParseError, ResolveError, Violation};
use crate::schema::SchemaError;
use crate::settings::SettingsError;
use serde::Serialize;
use std::fmt;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Document errors
    UnknownField,
    TypeMismatch,
    MalformedText,
    OneofConflict,

    // Include errors
    IncludeNotFound,
    IncludeCycle,
    IncludeDepthExceeded,
    InvalidMount,
    MountTypeMismatch,

    // Task and override errors
    AmbiguousTask,
    NoTaskSelected,
    InvalidOverride,
    ValidationFailed,

    // Environment errors
    IoError,
    InvalidSchema,
    InvalidSettings,
    InternalError,
}

impl ErrorCode {
    pub fn for_resolve(err: &ResolveError) -> Self {
        match err {
            ResolveError::Parse { source, .. } => match source {
                ParseError::UnknownField { .. } => ErrorCode::UnknownField,
                ParseError::TypeMismatch { .. } => ErrorCode::TypeMismatch,
                ParseError::MalformedText { .. } => ErrorCode::MalformedText,
                ParseError::OneofConflict { .. } => ErrorCode::OneofConflict,
            },
            ResolveError::Locate(LocateError::NotFound { .. }) => ErrorCode::IncludeNotFound,
            ResolveError::Merge { source, .. } => match source {
                MergeError::InvalidMount { .. } => ErrorCode::InvalidMount,
                MergeError::TypeMismatch { .. } => ErrorCode::MountTypeMismatch,
            },
            ResolveError::Io { .. } => ErrorCode::IoError,
            ResolveError::IncludeCycle { .. } => ErrorCode::IncludeCycle,
            ResolveError::IncludeDepthExceeded { .. } => ErrorCode::IncludeDepthExceeded,
            ResolveError::AmbiguousTask { .. } => ErrorCode::AmbiguousTask,
            ResolveError::NoTaskSelected { .. } => ErrorCode::NoTaskSelected,
            ResolveError::InvalidOverride { .. } => ErrorCode::InvalidOverride,
            ResolveError::Validation { .. } => ErrorCode::ValidationFailed,
        }
    }
}

/// Serializable description of a failure.
#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
}

impl ErrorReport {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            file: None,
            mount: None,
            violations: Vec::new(),
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_mount(mut self, mount: impl Into<String>) -> Self {
        self.mount = Some(mount.into());
        self
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InternalError, err.to_string())
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({"code": "INTERNAL_ERROR", "message": e.to_string()})
        })
    }
}

impl From<&ResolveError> for ErrorReport {
    fn from(err: &ResolveError) -> Self {
        let mut report = Self::new(ErrorCode::for_resolve(err), err.to_string());
        if let Some(file) = err.file() {
            report = report.with_file(file.display().to_string());
        }
        if let Some(mount) = err.mount() {
            report = report.with_mount(mount);
        }
        if let ResolveError::Validation { violations, .. } = err {
            report.violations = violations.clone();
        }
        report
    }
}

impl From<&SettingsError> for ErrorReport {
    fn from(err: &SettingsError) -> Self {
        let report = Self::new(ErrorCode::InvalidSettings, err.to_string());
        match err {
            SettingsError::Read { path, .. } | SettingsError::Yaml { path, .. } => {
                report.with_file(path.display().to_string())
            }
            _ => report,
        }
    }
}

impl From<&SchemaError> for ErrorReport {
    fn from(err: &SchemaError) -> Self {
        Self::new(ErrorCode::InvalidSchema, err.to_string())
    }
}

// Recover the structured error behind an anyhow chain where there is one
impl From<&anyhow::Error> for ErrorReport {
    fn from(err: &anyhow::Error) -> Self {
        if let Some(e) = err.downcast_ref::<ResolveError>() {
            e.into()
        } else if let Some(e) = err.downcast_ref::<SettingsError>() {
            e.into()
        } else if let Some(e) = err.downcast_ref::<SchemaError>() {
            e.into()
        } else {
            Self::internal(format!("{:#}", err))
        }
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ErrorReport {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigResolver, parse_overrides};
    use crate::schema::builtin;
    use serde_json::json;
    use std::path::{Path, PathBuf};

    fn resolve(text: &str) -> ResolveError {
        ConfigResolver::new(builtin())
            .resolve_str(text, Path::new("/cfg/root.prototxt"), &[])
            .unwrap_err()
    }

    #[test]
    fn test_parse_error_report() {
        let report = ErrorReport::from(&resolve("train { nope: 1 }"));
        assert_eq!(report.code, ErrorCode::UnknownField);
        assert_eq!(report.file.as_deref(), Some("/cfg/root.prototxt"));
        assert_eq!(report.mount.as_deref(), Some(""));
        let value = report.to_json();
        assert_eq!(value["code"], json!("UNKNOWN_FIELD"));
        assert!(value.get("violations").is_none());
    }

    #[test]
    fn test_task_selection_codes() {
        assert_eq!(
            ErrorCode::for_resolve(&resolve("")),
            ErrorCode::NoTaskSelected
        );
        assert_eq!(
            ErrorCode::for_resolve(&resolve("train {} compare_agents {}")),
            ErrorCode::AmbiguousTask
        );
    }

    #[test]
    fn test_missing_include_report() {
        let err = resolve(r#"includes { path: "missing" mount: "train" } train {}"#);
        let report = ErrorReport::from(&err);
        assert_eq!(report.code, ErrorCode::IncludeNotFound);
        assert_eq!(report.mount.as_deref(), Some("train"));
    }

    #[test]
    fn test_override_and_anyhow_reports() {
        let err = parse_overrides(&["???"]).unwrap_err();
        assert_eq!(ErrorCode::for_resolve(&err), ErrorCode::InvalidOverride);

        let wrapped = anyhow::Error::new(err).context("while resolving");
        assert_eq!(ErrorReport::from(&wrapped).code, ErrorCode::InvalidOverride);

        let other = anyhow::anyhow!("boom");
        assert_eq!(ErrorReport::from(&other).code, ErrorCode::InternalError);
    }

    #[test]
    fn test_settings_report_names_file() {
        let err = SettingsError::Read {
            path: PathBuf::from("/etc/x.yaml"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        let report = ErrorReport::from(&err);
        assert_eq!(report.code, ErrorCode::InvalidSettings);
        assert_eq!(report.file.as_deref(), Some("/etc/x.yaml"));
    }
}
