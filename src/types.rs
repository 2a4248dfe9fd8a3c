//! Validated newtypes for catalog identifiers. Modelled on the teacher's
//! `ValidatedPath`/`ValidatedDocumentId` pattern: these types cannot be
//! constructed with invalid data, so "is this a legal project name" is answered
//! once, at the boundary, rather than re-checked at every call site.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

fn validate_identifier(kind: &str, value: &str) -> Result<(), AppError> {
    if value.is_empty() {
        return Err(AppError::bad_request(format!("{kind} cannot be empty")));
    }
    if value.contains('\0') {
        return Err(AppError::bad_request(format!("{kind} contains a null byte")));
    }
    Ok(())
}

macro_rules! validated_name {
    ($name:ident, $label:expr) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Result<Self, AppError> {
                let value = value.into();
                validate_identifier($label, &value)?;
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

validated_name!(ProjectName, "project name");
validated_name!(PackageName, "package name");
validated_name!(ConnectionName, "connection name");

/// A relative path to a `.malloy`/`.malloynb`/`.md` file within a package root.
/// Rejects absolute paths and `..` traversal, mirroring the teacher's
/// `validate_file_path` directory-traversal check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelPath(String);

impl ModelPath {
    pub fn new(value: impl Into<String>) -> Result<Self, AppError> {
        let value = value.into();
        validate_identifier("model path", &value)?;
        let path = std::path::Path::new(&value);
        if path.is_absolute() {
            return Err(AppError::bad_request("model path must be relative"));
        }
        if path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(AppError::bad_request("model path cannot contain '..'"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> ModelKind {
        if self.0.ends_with(".malloynb") {
            ModelKind::Notebook
        } else {
            ModelKind::Model
        }
    }
}

impl fmt::Display for ModelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    Model,
    Notebook,
}

/// The row cap enforced by the query executor (spec §4.4, §4.9).
pub const ROW_LIMIT: usize = 1000;

/// Debounce window upper bound for watcher reload coalescing (spec §5).
pub const WATCH_DEBOUNCE_MS: u64 = 200;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_names() {
        assert!(ProjectName::new("").is_err());
        assert!(PackageName::new("").is_err());
    }

    #[test]
    fn rejects_traversal_in_model_path() {
        assert!(ModelPath::new("../secrets.malloy").is_err());
        assert!(ModelPath::new("/etc/passwd").is_err());
        assert!(ModelPath::new("flights.malloy").is_ok());
    }

    #[test]
    fn model_kind_from_extension() {
        assert_eq!(ModelPath::new("a.malloy").unwrap().kind(), ModelKind::Model);
        assert_eq!(
            ModelPath::new("a.malloynb").unwrap().kind(),
            ModelKind::Notebook
        );
    }
}
