//! Post and tag resources of the blog CMS.
//!
//! [`Post`] keeps every field it does not model in `rest`, so a fetched post can
//! be modified and sent back without dropping server-side state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::Error;

pub const API_VERSION: &str = "content.halo.run/v1alpha1";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PostSpec {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Post {
    pub metadata: Metadata,
    pub spec: PostSpec,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub content: String,
    pub raw: String,
    pub raw_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

impl Content {
    pub fn html(html: &str) -> Self {
        Self {
            content: html.to_owned(),
            raw: html.to_owned(),
            raw_type: "HTML".to_owned(),
            version: None,
        }
    }
}

/// Body of a post creation: the initial content plus the post resource.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PostRequest {
    pub content: Content,
    pub post: Post,
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl PostRequest {
    /// A public, published, commentable post under a fresh random name that
    /// doubles as its slug.
    pub fn new(title: &str, html: &str) -> Self {
        let name = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let post = Post {
            metadata: Metadata {
                name: name.clone(),
                rest: object(json!({ "annotations": {} })),
            },
            spec: PostSpec {
                title: title.to_owned(),
                slug: name,
                tags: Vec::new(),
                rest: object(json!({
                    "deleted": false,
                    "publish": true,
                    "pinned": false,
                    "allowComment": true,
                    "visible": "PUBLIC",
                    "priority": 0,
                    "excerpt": { "autoGenerate": true, "raw": "" },
                    "categories": [],
                    "htmlMetas": [],
                })),
            },
            rest: object(json!({
                "apiVersion": API_VERSION,
                "kind": "Post",
                "status": {
                    "phase": "PUBLISHED",
                    "conditions": [{
                        "type": "PUBLISHED",
                        "status": "TRUE",
                        "lastTransitionTime": now,
                    }],
                },
            })),
        };
        let mut content = Content::html(html);
        content.version = Some(0);
        Self { content, post }
    }

    pub fn name(&self) -> &str {
        &self.post.metadata.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub display_name: String,
    pub slug: String,
    /// Server-assigned identifier, referenced from a post's tag list.
    pub name: String,
}

pub fn tag_slug(display_name: &str) -> String {
    display_name.to_lowercase()
}

pub trait Client {
    /// Returns the name the server gave the new post.
    fn create_post(&self, request: &PostRequest) -> impl Future<Output = Result<String, Error>>;
    fn get_post(&self, name: &str) -> impl Future<Output = Result<Post, Error>>;
    fn put_post(&self, post: &Post) -> impl Future<Output = Result<(), Error>>;
    fn put_content(&self, name: &str, content: &Content)
    -> impl Future<Output = Result<(), Error>>;
    fn publish(&self, name: &str) -> impl Future<Output = Result<(), Error>>;
    fn list_tags(&self) -> impl Future<Output = Result<Vec<Tag>, Error>>;
    fn create_tag(&self, display_name: &str) -> impl Future<Output = Result<Tag, Error>>;
}

impl<C: Client> Client for &C {
    fn create_post(&self, request: &PostRequest) -> impl Future<Output = Result<String, Error>> {
        (**self).create_post(request)
    }

    fn get_post(&self, name: &str) -> impl Future<Output = Result<Post, Error>> {
        (**self).get_post(name)
    }

    fn put_post(&self, post: &Post) -> impl Future<Output = Result<(), Error>> {
        (**self).put_post(post)
    }

    fn put_content(
        &self,
        name: &str,
        content: &Content,
    ) -> impl Future<Output = Result<(), Error>> {
        (**self).put_content(name, content)
    }

    fn publish(&self, name: &str) -> impl Future<Output = Result<(), Error>> {
        (**self).publish(name)
    }

    fn list_tags(&self) -> impl Future<Output = Result<Vec<Tag>, Error>> {
        (**self).list_tags()
    }

    fn create_tag(&self, display_name: &str) -> impl Future<Output = Result<Tag, Error>> {
        (**self).create_tag(display_name)
    }
}

/// Outcome of the two calls behind [`update`]. At least one field is set.
#[derive(Debug)]
pub struct UpdateError {
    pub content: Option<Error>,
    pub publish: Option<Error>,
}

impl std::fmt::Display for UpdateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.content, &self.publish) {
            (Some(content), Some(publish)) => write!(
                f,
                "failed to replace content: {content}; failed to publish: {publish}"
            ),
            (Some(content), None) => write!(f, "failed to replace content: {content}"),
            (None, Some(publish)) => write!(f, "failed to publish: {publish}"),
            (None, None) => write!(f, "update failed"),
        }
    }
}

impl std::error::Error for UpdateError {}

pub async fn create(client: &impl Client, title: &str, html: &str) -> Result<String, Error> {
    let request = PostRequest::new(title, html);
    debug!(requested = request.name(), title, "creating post");
    let name = client.create_post(&request).await?;
    info!(post = %name, title, "created post");
    Ok(name)
}

/// Replace the content of an existing post, then publish it. Publish runs even
/// when the content call failed, and both results are reported.
pub async fn update(client: &impl Client, name: &str, html: &str) -> Result<(), UpdateError> {
    let content = client.put_content(name, &Content::html(html)).await.err();
    let publish = client.publish(name).await.err();
    if content.is_none() && publish.is_none() {
        info!(post = name, "updated post");
        return Ok(());
    }
    Err(UpdateError { content, publish })
}

/// Write `title` into the post. The post is put back even when the title
/// already matches.
pub async fn update_title(client: &impl Client, name: &str, title: &str) -> Result<(), Error> {
    let mut post = client.get_post(name).await?;
    post.spec.title = title.to_owned();
    client.put_post(&post).await
}
