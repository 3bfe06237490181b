use serde::Deserialize;

use crate::retry::RetryPolicy;

#[derive(Deserialize, Clone, Debug)]
pub struct HaloConfig {
    pub base_url: String,
    #[serde(default)]
    pub token: String,
}

impl HaloConfig {
    /// Public URL of a post, as written back into the document.
    pub fn post_link(&self, name: &str) -> String {
        format!("{}/archives/{name}", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct ImageHostConfig {
    pub url: String,
    #[serde(default)]
    pub token: String,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ImagesConfig {
    /// Check remote image links before embedding them.
    pub validate_remote: bool,
    /// Hosts that serve the same content; a failed check moves on to the next one.
    pub mirror_hosts: Vec<String>,
    /// Responses shorter than this are not considered images.
    pub min_bytes: u64,
    pub retry: RetryPolicy,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            validate_remote: false,
            mirror_hosts: Vec::new(),
            min_bytes: 1024,
            retry: RetryPolicy::remote_image(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct TagsConfig {
    pub retry: RetryPolicy,
}

impl Default for TagsConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::tag_reconciliation(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub halo: HaloConfig,
    pub image_host: ImageHostConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub tags: TagsConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), String> {
        if self.halo.base_url.trim().is_empty() {
            return Err("halo.base_url must not be empty".into());
        }
        url::Url::parse(&self.halo.base_url)
            .map_err(|e| format!("halo.base_url is not a valid URL: {e}"))?;
        if self.image_host.url.trim().is_empty() {
            return Err("image_host.url must not be empty".into());
        }
        url::Url::parse(&self.image_host.url)
            .map_err(|e| format!("image_host.url is not a valid URL: {e}"))?;
        if self.images.retry.max_attempts == 0 {
            return Err("images.retry.max_attempts must be at least 1".into());
        }
        if self.tags.retry.max_attempts == 0 {
            return Err("tags.retry.max_attempts must be at least 1".into());
        }
        Ok(())
    }
}
