use thiserror::Error;

/// The public error taxonomy. Operations that fail in a way a caller is
/// expected to branch on (a corrupt repository, a missing work directory,
/// a duplicate tag name, ...) return one of these variants. Everything
/// else — an unexpected I/O failure deep in a helper, a SQL error from the
/// metadata store, a serialization hiccup — propagates as `anyhow::Error`
/// with `format_err!`/`bail!` context, the same split `pbs-datastore` uses
/// throughout.
#[derive(Debug, Error)]
pub enum ReversionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no storage provider recognises the repository at {path}")]
    IncompatibleRepository { path: String },

    #[error("repository at {path} is present but unreadable: {reason}")]
    InvalidRepository { path: String, reason: String },

    #[error("repository at {path} uses an unsupported format version {found} (expected {expected})")]
    UnsupportedFormat {
        path: String,
        found: u32,
        expected: u32,
    },

    #[error("{path} is already a working directory")]
    AlreadyAWorkDir { path: String },

    #[error("{path} is not a working directory")]
    NotAWorkDir { path: String },

    #[error("a record named '{name}' already exists")]
    RecordAlreadyExists { name: String },

    #[error("no such file: {path}")]
    NoSuchFile { path: String },

    #[error("invalid value '{value}' for config property '{key}': {message}")]
    ValueConvertError {
        key: String,
        value: String,
        message: String,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("data corruption detected: {reason}")]
    DataCorrupt { reason: String },
}

impl ReversionError {
    pub fn invalid_repository(path: impl Into<String>, reason: impl Into<String>) -> Self {
        ReversionError::InvalidRepository {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn no_such_file(path: impl Into<String>) -> Self {
        ReversionError::NoSuchFile { path: path.into() }
    }

    pub fn record_already_exists(name: impl Into<String>) -> Self {
        ReversionError::RecordAlreadyExists { name: name.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_with_context() {
        let err = ReversionError::no_such_file("a/b.txt");
        assert_eq!(err.to_string(), "no such file: a/b.txt");
    }
}
