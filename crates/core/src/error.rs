//! Error types for the tidal engine.

use crate::tuple::Tuple;
use crate::value::Value;
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// Result type alias for tidal operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for engine operations.
#[derive(Debug)]
pub enum Error {
    /// Two tuples with the same key but different value columns.
    KeyConstraint {
        collection: String,
        key: Vec<Value>,
        existing: Tuple,
        incoming: Tuple,
    },
    /// Invalid schema definition.
    InvalidSchema {
        message: String,
    },
    /// Collection not declared.
    CollectionNotFound {
        name: String,
    },
    /// Column not found in a collection schema.
    ColumnNotFound {
        collection: String,
        column: String,
    },
    /// Malformed rule set detected while wiring.
    Compile {
        message: String,
    },
    /// Operator not legal for the target collection kind.
    IllegalOperator {
        collection: String,
        operator: &'static str,
    },
    /// Value rejected by a lattice constructor or merge.
    Type {
        site: String,
        message: String,
    },
    /// API misuse.
    Usage {
        message: String,
    },
    /// Fault raised while evaluating a rule.
    Rule {
        rule: String,
        source: Box<Error>,
    },
    /// Network boundary failure.
    Transport {
        message: String,
    },
    /// Persistent storage failure.
    Storage {
        message: String,
    },
    /// A sealed lattice value was asked to change.
    SealedConflict {
        current: String,
        input: String,
    },
    /// The instance has been stopped.
    Shutdown,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::KeyConstraint {
                collection,
                key,
                existing,
                incoming,
            } => {
                write!(
                    f,
                    "Key conflict in {} for key {:?}: existing {:?}, incoming {:?}",
                    collection, key, existing, incoming
                )
            }
            Error::InvalidSchema { message } => {
                write!(f, "Invalid schema: {}", message)
            }
            Error::CollectionNotFound { name } => {
                write!(f, "Collection not found: {}", name)
            }
            Error::ColumnNotFound { collection, column } => {
                write!(f, "Column {} not found in collection {}", column, collection)
            }
            Error::Compile { message } => {
                write!(f, "Compile error: {}", message)
            }
            Error::IllegalOperator {
                collection,
                operator,
            } => {
                write!(f, "Illegal operator {} on collection {}", operator, collection)
            }
            Error::Type { site, message } => {
                write!(f, "Type error in {}: {}", site, message)
            }
            Error::Usage { message } => {
                write!(f, "Usage error: {}", message)
            }
            Error::Rule { rule, source } => {
                write!(f, "Error evaluating rule {}: {}", rule, source)
            }
            Error::Transport { message } => {
                write!(f, "Transport error: {}", message)
            }
            Error::Storage { message } => {
                write!(f, "Storage error: {}", message)
            }
            Error::SealedConflict { current, input } => {
                write!(
                    f,
                    "Cannot merge a sealed lattice value: {}, input = {}",
                    current, input
                )
            }
            Error::Shutdown => write!(f, "Instance has been shut down"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Rule { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl Error {
    /// Creates a key-constraint error.
    pub fn key_constraint(
        collection: impl Into<String>,
        key: Vec<Value>,
        existing: Tuple,
        incoming: Tuple,
    ) -> Self {
        Error::KeyConstraint {
            collection: collection.into(),
            key,
            existing,
            incoming,
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Error::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates a collection not found error.
    pub fn collection_not_found(name: impl Into<String>) -> Self {
        Error::CollectionNotFound { name: name.into() }
    }

    /// Creates a column not found error.
    pub fn column_not_found(collection: impl Into<String>, column: impl Into<String>) -> Self {
        Error::ColumnNotFound {
            collection: collection.into(),
            column: column.into(),
        }
    }

    /// Creates a compile error.
    pub fn compile(message: impl Into<String>) -> Self {
        Error::Compile {
            message: message.into(),
        }
    }

    /// Creates an illegal operator error.
    pub fn illegal_operator(collection: impl Into<String>, operator: &'static str) -> Self {
        Error::IllegalOperator {
            collection: collection.into(),
            operator,
        }
    }

    /// Creates a type error.
    pub fn type_error(site: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Type {
            site: site.into(),
            message: message.into(),
        }
    }

    /// Creates a usage error.
    pub fn usage(message: impl Into<String>) -> Self {
        Error::Usage {
            message: message.into(),
        }
    }

    /// Wraps an error with the identity of the rule that raised it.
    pub fn in_rule(self, rule: impl Into<String>) -> Self {
        match self {
            // keep the innermost rule identity
            Error::Rule { .. } => self,
            other => Error::Rule {
                rule: rule.into(),
                source: Box::new(other),
            },
        }
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Error::Transport {
            message: message.into(),
        }
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Error::Storage {
            message: message.into(),
        }
    }

    /// Returns the error with any rule wrapper removed.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Rule { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Returns true if this is (or wraps) a key-constraint violation.
    pub fn is_key_constraint(&self) -> bool {
        matches!(self.root_cause(), Error::KeyConstraint { .. })
    }
}
