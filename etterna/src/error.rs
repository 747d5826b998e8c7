use std::fmt;

/// The two outcomes callers distinguish between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The username, score key or song does not exist on the site.
    NotFound,
    /// Transport failure, bad status, malformed payload or parse failure.
    Unexpected,
}

/// Error returned by every remote operation.
///
/// `Display` renders only the message, which is meant to be shown to users as-is.
/// The underlying cause (if any) is available through `source()` for logging.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

pub type Result<T> = std::result::Result<T, Error>;

/// A payload did not have the shape the parsers expect.
///
/// Several fields embed HTML fragments; any structural mismatch in them is fatal
/// for the record rather than defaulted, since a silently zeroed rating would
/// corrupt the deltas computed from it.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("{field}: no <{element}> element in {fragment:?}")]
    MissingElement {
        field: &'static str,
        element: &'static str,
        fragment: String,
    },

    #[error("{field}: no '{attribute}' attribute in {fragment:?}")]
    MissingAttribute {
        field: &'static str,
        attribute: &'static str,
        fragment: String,
    },

    #[error("{field}: {value:?} is not a number")]
    InvalidNumber { field: &'static str, value: String },

    #[error("{field}: {value:?} is not a date")]
    InvalidDate { field: &'static str, value: String },

    #[error("{field}: {value:?} is not a valid score key")]
    InvalidScoreKey { field: &'static str, value: String },

    #[error("response contained no records")]
    EmptyResponse,

    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::NotFound,
            message: message.into(),
            source: None,
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Unexpected,
            message: message.into(),
            source: None,
        }
    }

    /// Attaches the underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            if let Some(source) = &self.source {
                return write!(f, "{}", source);
            }
        }

        f.write_str(&self.message)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}
