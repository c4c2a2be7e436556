//! Error types for translucent-core.

use thiserror::Error;

/// Result type for reactive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the reactive context.
#[derive(Debug, Error)]
pub enum Error {
    /// Cell name does not match the identifier grammar.
    #[error("invalid reactive cell name: \"{0}\"")]
    InvalidName(String),

    /// A cell with this name is already registered, or the name was given
    /// twice in one bulk call.
    #[error("duplicate reactive cell name: \"{0}\"")]
    DuplicateName(String),

    /// Malformed bulk call.
    #[error("invalid arguments: {0}")]
    Arguments(String),

    /// A name was resolved before any cell was registered under it.
    #[error("undefined key: \"{0}\"")]
    UndefinedKey(String),

    /// Operation applied to a cell of the wrong kind.
    #[error("\"{name}\" is not a reactive {expected}")]
    WrongKind {
        name: String,
        expected: &'static str,
    },

    /// A derived value was mutated outside of its own computation.
    #[error("derived value mutated outside its computation: \"{0}\"")]
    IntegrityViolation(String),

    /// Observers have no externally readable value.
    #[error("cannot get the value of observer \"{0}\"")]
    ObserverRead(String),

    /// A typed read could not decode the stored value.
    #[error("cannot decode value of \"{name}\": {source}")]
    Decode {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// Failure raised by a user function.
    #[error("function \"{name}\" failed: {message}")]
    Function { name: String, message: String },
}

impl Error {
    /// Build a user-function failure.
    pub fn function(name: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::Function {
            name: name.into(),
            message: message.to_string(),
        }
    }

    /// The missing name, if this is an [`Error::UndefinedKey`].
    pub fn undefined_key(&self) -> Option<&str> {
        match self {
            Error::UndefinedKey(name) => Some(name),
            _ => None,
        }
    }

    pub(crate) fn wrong_kind(name: &str, expected: &'static str) -> Self {
        Error::WrongKind {
            name: name.to_string(),
            expected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_key_exposes_name() {
        let err = Error::UndefinedKey("a".into());
        assert_eq!(err.undefined_key(), Some("a"));
        assert_eq!(err.to_string(), "undefined key: \"a\"");

        let err = Error::ObserverRead("c".into());
        assert_eq!(err.undefined_key(), None);
    }

    #[test]
    fn wrong_kind_message() {
        let err = Error::wrong_kind("v", "observer");
        assert_eq!(err.to_string(), "\"v\" is not a reactive observer");
    }
}
