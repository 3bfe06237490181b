//! REST client for a Halo blog.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::{
    config::HaloConfig,
    remote::{
        Error,
        cms::{self, Content, Post, PostRequest, Tag},
    },
};

const CONTENT_API: &str = "apis/content.halo.run/v1alpha1";
const CONSOLE_API: &str = "apis/api.console.halo.run/v1alpha1";

pub struct Client {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
struct TagSpec {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    slug: String,
    #[serde(default, skip_deserializing)]
    color: String,
    #[serde(default, skip_deserializing)]
    cover: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
struct TagMetadata {
    #[serde(default)]
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    generate_name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct TagResource {
    spec: TagSpec,
    metadata: TagMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
}

impl From<TagResource> for Tag {
    fn from(value: TagResource) -> Self {
        Self {
            display_name: value.spec.display_name,
            slug: value.spec.slug,
            name: value.metadata.name,
        }
    }
}

#[derive(Deserialize, Debug)]
struct TagList {
    #[serde(default)]
    items: Vec<TagResource>,
}

async fn expect_status(
    endpoint: &str,
    response: reqwest::Response,
    expected: StatusCode,
) -> Result<reqwest::Response, Error> {
    let code = response.status();
    if code != expected {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Status {
            endpoint: endpoint.to_owned(),
            code,
            body,
        });
    }
    Ok(response)
}

async fn decode<T: DeserializeOwned>(endpoint: &str, response: reqwest::Response) -> Result<T, Error> {
    let bytes = response.bytes().await.map_err(Error::Transport)?;
    serde_json::from_slice(&bytes).map_err(|e| Error::Format {
        endpoint: endpoint.to_owned(),
        detail: e.to_string(),
    })
}

impl Client {
    pub fn new(config: &HaloConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            token: config.token.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, api: &str, path: &str) -> String {
        format!("{}/{api}/{path}", self.base_url)
    }

    async fn send(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
        expected: StatusCode,
    ) -> Result<reqwest::Response, Error> {
        debug!(endpoint, "halo request");
        let response = request
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(Error::Transport)?;
        expect_status(endpoint, response, expected).await
    }
}

impl cms::Client for Client {
    async fn create_post(&self, request: &PostRequest) -> Result<String, Error> {
        let endpoint = self.endpoint(CONSOLE_API, "posts");
        let response = self
            .send(
                &endpoint,
                self.client.post(&endpoint).json(request),
                StatusCode::OK,
            )
            .await?;
        let post: Post = decode(&endpoint, response).await?;
        if post.metadata.name.is_empty() {
            return Err(Error::Format {
                endpoint,
                detail: "created post has no name".into(),
            });
        }
        Ok(post.metadata.name)
    }

    async fn get_post(&self, name: &str) -> Result<Post, Error> {
        let endpoint = self.endpoint(CONTENT_API, &format!("posts/{name}"));
        let response = self
            .send(&endpoint, self.client.get(&endpoint), StatusCode::OK)
            .await?;
        decode(&endpoint, response).await
    }

    async fn put_post(&self, post: &Post) -> Result<(), Error> {
        let endpoint = self.endpoint(CONTENT_API, &format!("posts/{}", post.metadata.name));
        self.send(&endpoint, self.client.put(&endpoint).json(post), StatusCode::OK)
            .await?;
        Ok(())
    }

    async fn put_content(&self, name: &str, content: &Content) -> Result<(), Error> {
        let endpoint = self.endpoint(CONSOLE_API, &format!("posts/{name}/content"));
        self.send(
            &endpoint,
            self.client.put(&endpoint).json(content),
            StatusCode::OK,
        )
        .await?;
        Ok(())
    }

    async fn publish(&self, name: &str) -> Result<(), Error> {
        let endpoint = self.endpoint(CONSOLE_API, &format!("posts/{name}/publish"));
        self.send(
            &endpoint,
            self.client.put(&endpoint).json(&serde_json::json!({})),
            StatusCode::OK,
        )
        .await?;
        Ok(())
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, Error> {
        let endpoint = self.endpoint(CONSOLE_API, "tags");
        let response = self
            .send(&endpoint, self.client.get(&endpoint), StatusCode::OK)
            .await?;
        let list: TagList = decode(&endpoint, response).await?;
        Ok(list.items.into_iter().map(Tag::from).collect())
    }

    async fn create_tag(&self, display_name: &str) -> Result<Tag, Error> {
        let endpoint = self.endpoint(CONTENT_API, "tags");
        let body = TagResource {
            spec: TagSpec {
                display_name: display_name.to_owned(),
                slug: cms::tag_slug(display_name),
                color: "#ffffff".into(),
                cover: String::new(),
            },
            metadata: TagMetadata {
                name: String::new(),
                generate_name: Some("tag-".into()),
            },
            api_version: Some(cms::API_VERSION.into()),
            kind: Some("Tag".into()),
        };
        let response = self
            .send(
                &endpoint,
                self.client.post(&endpoint).json(&body),
                StatusCode::CREATED,
            )
            .await?;
        let created: TagResource = decode(&endpoint, response).await?;
        if created.metadata.name.is_empty() {
            return Err(Error::Format {
                endpoint,
                detail: "created tag has no name".into(),
            });
        }
        Ok(created.into())
    }
}
