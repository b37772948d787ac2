use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("validation error: {0}")]
    Validation(ValidationErrors),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a validation error carrying a single field message.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::default();
        errors.add(field, message);
        Error::Validation(errors)
    }
}

impl From<ValidationErrors> for Error {
    fn from(errors: ValidationErrors) -> Self {
        Error::Validation(errors)
    }
}

/// Field-keyed validation messages collected while checking a data dict.
///
/// Serializes as `{"field": ["message", ...]}`, ordered by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// `Ok(())` when nothing was collected, otherwise the collected errors.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{field}: {}", messages.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ValidationErrors};

    #[test]
    fn error_display_includes_context() {
        let e = Error::Config("bad yaml".into());
        assert_eq!(e.to_string(), "configuration error: bad yaml");

        let e = Error::NotFound("Showcase".into());
        assert_eq!(e.to_string(), "not found: Showcase");

        let e = Error::Other("misc".into());
        assert_eq!(e.to_string(), "misc");
    }

    #[test]
    fn validation_errors_group_by_field() {
        let mut errors = ValidationErrors::default();
        errors.add("name", "Missing value");
        errors.add("url", "Please provide a valid URL");
        errors.add("name", "Must be at least 2 characters long");

        assert_eq!(errors.get("name").map(<[String]>::len), Some(2));
        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["name", "url"]);
        assert_eq!(
            Error::Validation(errors).to_string(),
            "validation error: name: Missing value, Must be at least 2 characters long; url: Please provide a valid URL"
        );
    }

    #[test]
    fn empty_validation_errors_are_ok() {
        assert!(ValidationErrors::default().into_result().is_ok());
        assert!(matches!(
            Error::invalid("id", "The input field id was not expected.").to_string(),
            s if s.contains("id: The input field")
        ));
    }

    #[test]
    fn validation_errors_serialize_as_map() {
        let mut errors = ValidationErrors::default();
        errors.add("username", "Not found: User");
        let json = serde_json::to_string(&errors).unwrap();
        assert_eq!(json, r#"{"username":["Not found: User"]}"#);
    }
}
