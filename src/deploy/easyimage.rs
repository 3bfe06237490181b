//! Client for an EasyImage-style image host.
//!
//! The host answers `{"url": .., "thumb": ..}` on success and
//! `{"result": "failed", "code": .., "message": ..}` when it rejects the upload.

use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    config::ImageHostConfig,
    remote::asset::{self, UploadResult},
};

pub struct Client {
    endpoint: String,
    token: String,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    #[error("unexpected status: {0}")]
    Status(StatusCode),
    #[error("rejected by image host. code: {code}, message: {message}")]
    Rejected {
        code: serde_json::Value,
        message: String,
    },
    #[error("response lacks url or thumb: {0}")]
    Incomplete(String),
    #[error("malformed response: {0}")]
    Format(serde_json::Error),
}

#[derive(Deserialize, Debug, Default)]
struct Response {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    code: serde_json::Value,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    thumb: Option<String>,
}

impl Client {
    pub fn new(config: &ImageHostConfig) -> Self {
        Self {
            endpoint: config.url.clone(),
            token: config.token.clone(),
            client: reqwest::Client::new(),
        }
    }

    async fn try_upload(&self, body: Vec<u8>, filename: &str) -> Result<(String, String), Error> {
        let mime = mime_guess::from_path(filename).first_or_octet_stream();
        let part = reqwest::multipart::Part::bytes(body)
            .file_name(filename.to_owned())
            .mime_str(mime.essence_str())
            .map_err(Error::Transport)?;
        let form = reqwest::multipart::Form::new()
            .part("image", part)
            .text("token", self.token.clone());
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await
            .map_err(Error::Transport)?;

        let code = response.status();
        if code != StatusCode::OK {
            return Err(Error::Status(code));
        }
        let bytes = response.bytes().await.map_err(Error::Transport)?;
        let response: Response = serde_json::from_slice(&bytes).map_err(Error::Format)?;
        if response.result.as_deref() == Some("failed") {
            return Err(Error::Rejected {
                code: response.code,
                message: response.message.unwrap_or_default(),
            });
        }
        match (response.url, response.thumb) {
            (Some(url), Some(thumb)) if !url.is_empty() && !thumb.is_empty() => Ok((url, thumb)),
            _ => Err(Error::Incomplete(String::from_utf8_lossy(&bytes).into_owned())),
        }
    }
}

impl asset::Client for Client {
    async fn upload(&self, body: Vec<u8>, filename: &str) -> UploadResult {
        let size = body.len();
        match self.try_upload(body, filename).await {
            Ok((url, thumb)) => {
                info!(filename, size, %url, "uploaded image");
                UploadResult::uploaded(url, thumb)
            }
            Err(error) => {
                warn!(filename, size, %error, "image upload failed");
                UploadResult::failed()
            }
        }
    }
}
