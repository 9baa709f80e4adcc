//! Error types for the core model.

use bastion_router::TemplateError;
use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while validating rules or resolving credentials.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// A rule violates a model invariant.
    #[error("invalid rule for '{path}': {reason}")]
    InvalidRule {
        /// Full path of the rule.
        path: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A rule's full path is not a valid template.
    #[error("invalid path template '{template}': {source}")]
    InvalidTemplate {
        /// The template text.
        template: String,
        /// Parser error.
        #[source]
        source: TemplateError,
    },

    /// An HTTP method token could not be parsed.
    #[error("invalid HTTP method '{token}'")]
    InvalidMethod {
        /// The raw token.
        token: String,
    },

    /// Credential material on a request was malformed.
    #[error("invalid credential header '{header}': {reason}")]
    InvalidCredential {
        /// Header name.
        header: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A rule set document could not be encoded or decoded.
    #[error("rule set serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Creates an invalid rule error.
    pub fn invalid_rule(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid template error.
    pub fn invalid_template(template: impl Into<String>, source: TemplateError) -> Self {
        Self::InvalidTemplate {
            template: template.into(),
            source,
        }
    }

    /// Creates an invalid credential error.
    pub fn invalid_credential(header: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCredential {
            header: header.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::invalid_rule("/orders", "methods must not be empty");
        assert_eq!(
            err.to_string(),
            "invalid rule for '/orders': methods must not be empty"
        );

        let err = CoreError::invalid_credential("x-auth-roles", "not valid UTF-8");
        assert!(err.to_string().contains("x-auth-roles"));
    }

    #[test]
    fn test_template_error_is_source() {
        use std::error::Error as _;
        let source = bastion_router::PathTemplate::parse("/a/**/b").unwrap_err();
        let err = CoreError::invalid_template("/a/**/b", source);
        assert!(err.source().is_some());
    }
}
