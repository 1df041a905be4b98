use std::fmt;

/// Semantic failure categories surfaced by every public operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Parse,
    NotFound,
    AlreadyExists,
    InvalidArgument,
    ConstraintViolation,
    Unsupported,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Error {
            kind,
            context: context.into(),
        }
    }

    pub fn collection_exists(name: &str) -> Self {
        Error::new(
            ErrorKind::AlreadyExists,
            format!("collection '{}' already exists", name),
        )
    }

    pub fn collection_not_found(name: &str) -> Self {
        Error::new(
            ErrorKind::NotFound,
            format!("collection '{}' does not exist", name),
        )
    }

    pub fn invalid_collection(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidArgument, context)
    }

    pub fn duplicate_key(key: impl fmt::Debug) -> Self {
        Error::new(
            ErrorKind::ConstraintViolation,
            format!("duplicate key {:?} in unique index", key),
        )
    }

    pub fn key_not_found(key: impl fmt::Debug) -> Self {
        Error::new(ErrorKind::NotFound, format!("key {:?} not found", key))
    }

    pub fn index_not_found(name: &str) -> Self {
        Error::new(
            ErrorKind::NotFound,
            format!("index '{}' does not exist", name),
        )
    }

    pub fn tree_empty() -> Self {
        Error::new(ErrorKind::NotFound, "index tree is empty")
    }

    pub fn unsupported_operation(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Unsupported, context)
    }

    pub fn corrupted(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Parse, context)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.context)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        // Callers probe for existence by attempted read, so not-found must
        // stay distinguishable from a general transport failure.
        let kind = if err.kind() == std::io::ErrorKind::NotFound {
            ErrorKind::NotFound
        } else {
            ErrorKind::Io
        };
        Error {
            kind,
            context: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
