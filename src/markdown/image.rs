//! Image references in a markdown body.
//!
//! Local images are uploaded to the image host and replaced by `<img>` tags
//! pointing at the hosted copy. After a successful upload the reference in the
//! source document is rewritten to `![<hosted url>](<local path>)`; an alt text
//! that is itself a URL marks the image as already migrated on later runs.

use std::{
    ops::Range,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use regex::Regex;
use reqwest::{StatusCode, header::CONTENT_TYPE};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    config::ImagesConfig,
    host::FileStore,
    remote::asset,
    retry::{RetryError, RetryPolicy},
    warn_run,
};

static IMAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\[(.*?)\]\((.*?)\)").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub alt: String,
    pub src: String,
    /// Byte range of the whole `![alt](src)` occurrence.
    pub span: Range<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind<'a> {
    /// The link itself points at a remote image.
    Remote(&'a str),
    /// Uploaded on an earlier run: the alt text holds the hosted URL.
    Migrated(&'a str),
    Local,
}

fn is_remote(s: &str) -> bool {
    Url::parse(s.trim()).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

impl ImageReference {
    pub fn markdown(&self) -> String {
        format!("![{}]({})", self.alt, self.src)
    }

    pub fn kind(&self) -> ImageKind<'_> {
        if is_remote(&self.src) {
            ImageKind::Remote(self.src.trim())
        } else if is_remote(&self.alt) {
            ImageKind::Migrated(self.alt.trim())
        } else {
            ImageKind::Local
        }
    }
}

/// Every image reference in `content`, in source order.
pub fn extract(content: &str) -> Vec<ImageReference> {
    IMAGE
        .captures_iter(content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(ImageReference {
                alt: caps.get(1)?.as_str().to_owned(),
                src: caps.get(2)?.as_str().to_owned(),
                span: whole.range(),
            })
        })
        .collect()
}

/// Resolve an image path against the directory of the document it appears in.
pub fn resolve_local_path(document: &Path, src: &str) -> PathBuf {
    let src = src.trim();
    let src = src.strip_prefix("./").unwrap_or(src);
    match document.parent() {
        Some(dir) => dir.join(src),
        None => PathBuf::from(src),
    }
}

/// A textual replacement for the source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub original: String,
    pub replacement: String,
}

impl Rewrite {
    /// Replaces the first occurrence only.
    pub fn apply(&self, text: &str) -> String {
        text.replacen(&self.original, &self.replacement, 1)
    }
}

pub fn apply_rewrites(text: &str, rewrites: &[Rewrite]) -> String {
    rewrites
        .iter()
        .fold(text.to_owned(), |text, rewrite| rewrite.apply(&text))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigratedImage {
    pub alt: String,
    pub src: String,
    pub path: PathBuf,
    pub url: String,
    pub thumb: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Migration {
    /// The body with every image reference replaced by an HTML fragment.
    pub content: String,
    /// Edits to persist into the source document.
    pub rewrites: Vec<Rewrite>,
    pub migrated: Vec<MigratedImage>,
    pub failed: usize,
}

fn img_tag(src: &str, alt: &str) -> String {
    format!(
        "<img src=\"{}\" alt=\"{}\" />",
        html_escape::encode_double_quoted_attribute(src),
        html_escape::encode_double_quoted_attribute(alt),
    )
}

fn error_placeholder(message: &str) -> String {
    format!(
        "<div class=\"img-error\">image failed to load: {}</div>",
        html_escape::encode_text(message)
    )
}

pub struct ImageMigrator<A> {
    assets: A,
    validator: Option<RemoteImageValidator>,
}

impl<A: asset::Client> ImageMigrator<A> {
    pub fn new(assets: A) -> Self {
        Self {
            assets,
            validator: None,
        }
    }

    pub fn with_validator(mut self, validator: RemoteImageValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Replace every image reference in `content` (the body of `document`).
    ///
    /// Never fails: an image that cannot be read or uploaded is rendered from
    /// its original path and recorded as a warning.
    pub async fn migrate(
        &self,
        files: &impl FileStore,
        document: &Path,
        content: &str,
    ) -> Migration {
        let mut migration = Migration {
            content: String::with_capacity(content.len()),
            ..Default::default()
        };
        let mut last = 0;
        for reference in extract(content) {
            migration
                .content
                .push_str(&content[last..reference.span.start]);
            let html = self
                .resolve(files, document, &reference, &mut migration)
                .await;
            migration.content.push_str(&html);
            last = reference.span.end;
        }
        migration.content.push_str(&content[last..]);
        if !migration.migrated.is_empty() || migration.failed > 0 {
            info!(
                document = %document.display(),
                uploaded = migration.migrated.len(),
                failed = migration.failed,
                "migrated images"
            );
        }
        migration
    }

    async fn resolve(
        &self,
        files: &impl FileStore,
        document: &Path,
        reference: &ImageReference,
        migration: &mut Migration,
    ) -> String {
        match reference.kind() {
            ImageKind::Remote(url) => self.embed_remote(url, &reference.alt).await,
            ImageKind::Migrated(url) => self.embed_remote(url, &reference.src).await,
            ImageKind::Local => self.upload(files, document, reference, migration).await,
        }
    }

    async fn embed_remote(&self, url: &str, alt: &str) -> String {
        let Some(validator) = &self.validator else {
            return img_tag(url, alt);
        };
        match validator.check(url).await {
            Ok(checked) => img_tag(checked.as_str(), alt),
            Err(error) => {
                warn!(url, %error, "remote image is unavailable");
                warn_run!(Image, "remote image {url} is unavailable: {error}");
                error_placeholder(&error.to_string())
            }
        }
    }

    async fn upload(
        &self,
        files: &impl FileStore,
        document: &Path,
        reference: &ImageReference,
        migration: &mut Migration,
    ) -> String {
        let fallback = img_tag(&reference.src, &reference.alt);
        if reference.src.trim().is_empty() {
            warn!(alt = %reference.alt, "image reference without a path");
            warn_run!(Image, "image {:?} has no path", reference.alt);
            migration.failed += 1;
            return fallback;
        }
        let path = resolve_local_path(document, &reference.src);
        let body = match files.read(&path).await {
            Ok(body) => body,
            Err(error) => {
                warn!(path = %path.display(), %error, "failed to read image");
                warn_run!(Image, "failed to read image {}: {error}", path.display());
                migration.failed += 1;
                return fallback;
            }
        };
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| reference.src.clone());
        let result = self.assets.upload(body, &filename).await;
        let Some((url, thumb)) = result.urls() else {
            warn_run!(Image, "failed to upload image {}", path.display());
            migration.failed += 1;
            return fallback;
        };
        debug!(path = %path.display(), url, "image uploaded");
        migration.rewrites.push(Rewrite {
            original: reference.markdown(),
            replacement: format!("![{url}]({})", reference.src),
        });
        migration.migrated.push(MigratedImage {
            alt: reference.alt.clone(),
            src: reference.src.clone(),
            path,
            url: url.to_owned(),
            thumb: thumb.to_owned(),
        });
        img_tag(url, url)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    #[error("unexpected status: {0}")]
    Status(StatusCode),
    #[error("not an image: {0}")]
    NotAnImage(String),
    #[error("only {0} bytes")]
    TooSmall(u64),
}

#[derive(Debug, thiserror::Error)]
pub enum ValidateError {
    #[error("invalid url: {0}")]
    InvalidUrl(url::ParseError),
    #[error("{0}")]
    Unavailable(RetryError<FetchError>),
}

fn authority(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    })
}

fn with_authority(url: &Url, authority: &str) -> Option<Url> {
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => (host, Some(port.parse::<u16>().ok()?)),
        None => (authority, None),
    };
    let mut url = url.clone();
    url.set_host(Some(host)).ok()?;
    url.set_port(port).ok()?;
    Some(url)
}

/// Checks that a remote image is actually served, moving through the mirror
/// hosts when the image lives on one of them.
pub struct RemoteImageValidator {
    client: reqwest::Client,
    mirror_hosts: Vec<String>,
    min_bytes: u64,
    policy: RetryPolicy,
}

impl RemoteImageValidator {
    pub fn new(config: &ImagesConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            mirror_hosts: config.mirror_hosts.clone(),
            min_bytes: config.min_bytes,
            policy: config.retry,
        }
    }

    /// The URL to try on the given attempt (0-based).
    fn candidate(&self, url: &Url, attempt: usize) -> Url {
        let current = authority(url);
        let Some(index) = self
            .mirror_hosts
            .iter()
            .position(|host| Some(host) == current.as_ref())
        else {
            return url.clone();
        };
        let next = &self.mirror_hosts[(index + attempt) % self.mirror_hosts.len()];
        with_authority(url, next).unwrap_or_else(|| url.clone())
    }

    async fn fetch(&self, url: Url) -> Result<Url, FetchError> {
        debug!(%url, "probing remote image");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(FetchError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        let is_image = content_type
            .parse::<mime::Mime>()
            .is_ok_and(|mime| mime.type_() == mime::IMAGE);
        if !is_image {
            return Err(FetchError::NotAnImage(content_type));
        }
        let size = match response.content_length() {
            Some(size) => size,
            None => response.bytes().await.map_err(FetchError::Transport)?.len() as u64,
        };
        if size < self.min_bytes {
            return Err(FetchError::TooSmall(size));
        }
        Ok(url)
    }

    /// Returns the URL that served the image.
    pub async fn check(&self, src: &str) -> Result<Url, ValidateError> {
        let url = Url::parse(src.trim()).map_err(ValidateError::InvalidUrl)?;
        let mut attempt = 0;
        self.policy
            .run("remote image", || {
                let candidate = self.candidate(&url, attempt);
                attempt += 1;
                self.fetch(candidate)
            })
            .await
            .map_err(ValidateError::Unavailable)
    }
}
