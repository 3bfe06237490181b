//! Contracts for the two remote services a document is published to.

pub mod asset;
pub mod cms;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    #[error("unexpected status from {endpoint}: {code}, body: {body}")]
    Status {
        endpoint: String,
        code: reqwest::StatusCode,
        body: String,
    },
    #[error("malformed response from {endpoint}: {detail}")]
    Format { endpoint: String, detail: String },
}
