use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

/// Failure to obtain a page from the upstream service.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transient failures persisted past the retry budget.
    #[error("upstream unavailable after {attempts} attempt(s) for {url}: {reason}")]
    Unavailable {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// The upstream refused the request (4xx). Never retried.
    #[error("upstream rejected request with HTTP {status} for {url}: {body}")]
    Rejected { url: String, status: u16, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Unavailable,
    Rejected,
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Unavailable { .. } => FetchErrorKind::Unavailable,
            FetchError::Rejected { .. } => FetchErrorKind::Rejected,
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    /// The payload does not look like the schema we decode: either the envelope
    /// is unreadable or too many entries on one page failed validation.
    #[error("schema mismatch on page {page}: {rejected}/{total} entries rejected ({detail})")]
    SchemaMismatch {
        page: usize,
        rejected: usize,
        total: usize,
        detail: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    SchemaMismatch,
}

impl ParseError {
    pub fn kind(&self) -> ParseErrorKind {
        match self {
            ParseError::SchemaMismatch { .. } => ParseErrorKind::SchemaMismatch,
        }
    }
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("no valid records survived across {pages} page(s)")]
    Empty { pages: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeErrorKind {
    Empty,
}

impl MergeError {
    pub fn kind(&self) -> MergeErrorKind {
        match self {
            MergeError::Empty { .. } => MergeErrorKind::Empty,
        }
    }
}
