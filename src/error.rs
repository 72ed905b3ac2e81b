use crate::model::ProviderError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while resolving, searching, patching or saving a module.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("type not found: {name}{}", suggestion_suffix(.suggestion))]
    TypeNotFound {
        name: String,
        suggestion: Option<String>,
    },

    #[error("method not found: {type_name}::{method}{}", suggestion_suffix(.suggestion))]
    MethodNotFound {
        type_name: String,
        method: String,
        suggestion: Option<String>,
    },

    #[error("method {method} has no body")]
    NoBody { method: String },

    #[error("target has no {field} specified")]
    MissingField { field: &'static str },

    #[error("target sets both {single} and {batch}; exactly one addressing form is allowed")]
    AddressingConflict {
        single: &'static str,
        batch: &'static str,
    },

    #[error("target is built wrong: {message}")]
    MalformedTarget { message: String },

    #[error("{indices} indices but {values} values supplied")]
    LengthMismatch { indices: usize, values: usize },

    #[error("index {index} is out of range for {what} of length {len}")]
    OutOfRange {
        index: usize,
        len: usize,
        what: &'static str,
    },

    #[error("instruction {index} has no operand")]
    MissingOperand { index: usize },

    #[error("module was loaded in memory and no file was specified; use save_to with an explicit path")]
    NoDestination,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PatchError {
    /// True for the resolution failures (type, method or body missing).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PatchError::TypeNotFound { .. }
                | PatchError::MethodNotFound { .. }
                | PatchError::NoBody { .. }
        )
    }

    /// True for addressing fields that are absent, doubled or inconsistent.
    pub fn is_malformed_target(&self) -> bool {
        matches!(
            self,
            PatchError::MissingField { .. }
                | PatchError::AddressingConflict { .. }
                | PatchError::MalformedTarget { .. }
                | PatchError::LengthMismatch { .. }
        )
    }
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" (did you mean '{s}'?)"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display_with_suggestion() {
        let err = PatchError::TypeNotFound {
            name: "App.Licence".into(),
            suggestion: Some("App.License".into()),
        };
        assert_eq!(
            err.to_string(),
            "type not found: App.Licence (did you mean 'App.License'?)"
        );
        assert!(err.is_not_found());
        assert!(!err.is_malformed_target());
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let err = PatchError::MissingField { field: "index" };
        assert_eq!(err.to_string(), "target has no index specified");
        assert!(err.is_malformed_target());
    }
}
