//! Error types for the OGD platform client.

/// A page request that could not produce records.
///
/// Any of these aborts the reporting period being fetched; pages already
/// received for that period are discarded by the caller.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("page request at offset {offset} timed out")]
    Timeout { offset: u32 },
    #[error("page request at offset {offset} failed")]
    Network {
        offset: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("upstream answered {status} for offset {offset}: {body}")]
    Status { offset: u32, status: u16, body: String },
    #[error("malformed page at offset {offset}")]
    Malformed {
        offset: u32,
        #[source]
        source: anyhow::Error,
    },
    #[error("no short page after {max_pages} pages, giving up")]
    TooManyPages { max_pages: u32 },
}

impl FetchError {
    /// Classify a transport error for the page at `offset`.
    ///
    /// The request URL carries the API key, so it is stripped before the
    /// error is kept anywhere it could be logged.
    pub fn from_transport(offset: u32, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout { offset }
        } else {
            Self::Network {
                offset,
                source: err.without_url(),
            }
        }
    }
}
