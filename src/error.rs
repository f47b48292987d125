use thiserror::Error;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable: {name}")]
    MissingVar { name: &'static str },

    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },

    #[error("failed to read image allow-list {path}: {source}")]
    ImageList {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unparseable image reference on line {line}: {entry}")]
    ImageEntry { line: usize, entry: String },
}

/// Typed outcomes for every core operation.
///
/// The boundary layer maps these onto transport status codes; the core never
/// speaks HTTP itself.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid bearer credential.
    #[error("unauthenticated")]
    Unauthenticated,

    /// Authenticated caller is not the owner of the resource.
    #[error("forbidden")]
    Forbidden,

    /// Requested image is outside the allow-list.
    #[error("image '{0}' is not in the allow-list")]
    InvalidImage(String),

    /// Timeout or network failure at a system boundary. Never retried inside
    /// the core; the caller decides whether to try again.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Unknown instance id.
    #[error("instance not found")]
    NotFound,

    /// Unexpected adapter or store error.
    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the failure came from a boundary timeout or network fault.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            Error::Transient(err.to_string())
        } else {
            Error::Internal(err.to_string())
        }
    }
}
