use std::path::PathBuf;

pub mod config;
pub mod deploy;
pub mod frontmatter;
pub mod host;
pub mod markdown;
pub mod progress;
pub mod publish;
pub mod remote;
pub mod retry;
pub mod tags;
pub mod warning;

#[cfg(test)]
mod tests;

#[derive(Debug, thiserror::Error)]
#[error("{context}: {detail}")]
pub struct Error {
    pub context: Box<ErrorContext>,
    pub detail: Box<ErrorDetail>,
}

#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub path: PathBuf,
    pub post: Option<String>,
}

impl ErrorContext {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            post: None,
        }
    }

    pub(crate) fn with_post(&self, post: impl Into<String>) -> Self {
        Self {
            path: self.path.clone(),
            post: Some(post.into()),
        }
    }

    pub(crate) fn error(&self, detail: ErrorDetail) -> Error {
        Error {
            context: Box::new(self.clone()),
            detail: Box::new(detail),
        }
    }
}

impl std::fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.post {
            Some(post) => write!(f, "{post}({})", self.path.display()),
            None => write!(f, "{}", self.path.display()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ErrorDetail {
    #[error("Failed to read document: {0}")]
    ReadDocument(std::io::Error),
    #[error("Failed to write document: {0}")]
    WriteDocument(std::io::Error),
    #[error("Failed to create post: {0}")]
    CreatePost(remote::Error),
    #[error("Tag reconciliation gave up: {0}")]
    ReconciliationExhausted(retry::RetryError<remote::Error>),
}
