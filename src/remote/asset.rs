/// What the image host reported for one upload. Both fields are `None` when
/// the upload failed for any reason.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadResult {
    pub url: Option<String>,
    pub thumb: Option<String>,
}

impl UploadResult {
    pub fn failed() -> Self {
        Self::default()
    }

    pub fn uploaded(url: impl Into<String>, thumb: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            thumb: Some(thumb.into()),
        }
    }

    /// `(url, thumb)` when the upload produced both.
    pub fn urls(&self) -> Option<(&str, &str)> {
        Some((self.url.as_deref()?, self.thumb.as_deref()?))
    }
}

pub trait Client {
    /// Never fails outright; failures are folded into an empty [`UploadResult`].
    fn upload(&self, body: Vec<u8>, filename: &str) -> impl Future<Output = UploadResult>;
}

impl<C: Client> Client for &C {
    fn upload(&self, body: Vec<u8>, filename: &str) -> impl Future<Output = UploadResult> {
        (**self).upload(body, filename)
    }
}
