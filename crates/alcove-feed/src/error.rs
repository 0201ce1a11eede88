use thiserror::Error;

/// Page fetch failures, classified by how the caller should react.
/// Gateway transport loss never surfaces here; the failover source
/// handles that internally.
#[derive(Debug, Error)]
pub enum FetchError {
    /// 401: no usable session. Terminal, not worth retrying.
    #[error("unauthorized")]
    Unauthorized,

    /// 400: the request itself was malformed. Body text from the server.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// 5xx or anything unexpected. Body text from the server.
    #[error("server error: {0}")]
    Server(String),

    /// The server could not be reached or the payload did not decode.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}
