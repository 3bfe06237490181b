//! In-memory stand-ins for the CMS and the image host, with call recording and
//! injectable failures.

use std::collections::HashMap;

use indexmap::IndexMap;
use reqwest::StatusCode;

use crate::remote::{
    Error,
    asset::{self, UploadResult},
    cms::{self, Content, Post, PostRequest, Tag},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreatePost,
    GetPost,
    PutPost,
    PutContent,
    Publish,
    ListTags,
    CreateTag,
}

#[derive(Default)]
struct CmsState {
    posts: IndexMap<String, Post>,
    contents: HashMap<String, Content>,
    published: Vec<String>,
    tags: Vec<Tag>,
    faults: HashMap<Operation, usize>,
    failing_tags: Vec<String>,
    calls: Vec<Operation>,
}

impl CmsState {
    fn enter(&mut self, op: Operation) -> Result<(), Error> {
        self.calls.push(op);
        match self.faults.get_mut(&op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(Error::Status {
                    endpoint: format!("{op:?}"),
                    code: StatusCode::INTERNAL_SERVER_ERROR,
                    body: "injected failure".into(),
                })
            }
            _ => Ok(()),
        }
    }

    fn missing(name: &str) -> Error {
        Error::Status {
            endpoint: format!("posts/{name}"),
            code: StatusCode::NOT_FOUND,
            body: String::new(),
        }
    }
}

#[derive(Default)]
pub struct Cms {
    state: tokio::sync::Mutex<CmsState>,
}

impl Cms {
    /// Make the next `times` calls of `op` fail.
    pub async fn fail(&self, op: Operation, times: usize) {
        self.state.lock().await.faults.insert(op, times);
    }

    /// Make every creation of `display_name` fail.
    pub async fn fail_tag(&self, display_name: &str) {
        self.state
            .lock()
            .await
            .failing_tags
            .push(display_name.to_owned());
    }

    pub async fn insert_tag(&self, display_name: &str, name: &str) {
        self.state.lock().await.tags.push(Tag {
            display_name: display_name.to_owned(),
            slug: cms::tag_slug(display_name),
            name: name.to_owned(),
        });
    }

    pub async fn insert_post(&self, name: &str, title: &str) {
        let mut post = PostRequest::new(title, "").post;
        post.metadata.name = name.to_owned();
        self.state.lock().await.posts.insert(name.to_owned(), post);
    }

    pub async fn calls(&self) -> Vec<Operation> {
        self.state.lock().await.calls.clone()
    }

    pub async fn count(&self, op: Operation) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|call| **call == op)
            .count()
    }

    pub async fn post(&self, name: &str) -> Option<Post> {
        self.state.lock().await.posts.get(name).cloned()
    }

    pub async fn posts(&self) -> Vec<Post> {
        self.state.lock().await.posts.values().cloned().collect()
    }

    pub async fn content(&self, name: &str) -> Option<Content> {
        self.state.lock().await.contents.get(name).cloned()
    }

    pub async fn published(&self) -> Vec<String> {
        self.state.lock().await.published.clone()
    }

    pub async fn tags(&self) -> Vec<Tag> {
        self.state.lock().await.tags.clone()
    }
}

impl cms::Client for Cms {
    async fn create_post(&self, request: &PostRequest) -> Result<String, Error> {
        let mut state = self.state.lock().await;
        state.enter(Operation::CreatePost)?;
        let name = request.name().to_owned();
        state.posts.insert(name.clone(), request.post.clone());
        state.contents.insert(name.clone(), request.content.clone());
        state.published.push(name.clone());
        Ok(name)
    }

    async fn get_post(&self, name: &str) -> Result<Post, Error> {
        let mut state = self.state.lock().await;
        state.enter(Operation::GetPost)?;
        state
            .posts
            .get(name)
            .cloned()
            .ok_or_else(|| CmsState::missing(name))
    }

    async fn put_post(&self, post: &Post) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        state.enter(Operation::PutPost)?;
        let slot = state
            .posts
            .get_mut(&post.metadata.name)
            .ok_or_else(|| CmsState::missing(&post.metadata.name))?;
        *slot = post.clone();
        Ok(())
    }

    async fn put_content(&self, name: &str, content: &Content) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        state.enter(Operation::PutContent)?;
        if !state.posts.contains_key(name) {
            return Err(CmsState::missing(name));
        }
        state.contents.insert(name.to_owned(), content.clone());
        Ok(())
    }

    async fn publish(&self, name: &str) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        state.enter(Operation::Publish)?;
        if !state.posts.contains_key(name) {
            return Err(CmsState::missing(name));
        }
        state.published.push(name.to_owned());
        Ok(())
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, Error> {
        let mut state = self.state.lock().await;
        state.enter(Operation::ListTags)?;
        Ok(state.tags.clone())
    }

    async fn create_tag(&self, display_name: &str) -> Result<Tag, Error> {
        let mut state = self.state.lock().await;
        state.enter(Operation::CreateTag)?;
        if state.failing_tags.iter().any(|tag| tag == display_name) {
            return Err(Error::Status {
                endpoint: "tags".into(),
                code: StatusCode::BAD_REQUEST,
                body: format!("cannot create {display_name}"),
            });
        }
        let tag = Tag {
            display_name: display_name.to_owned(),
            slug: cms::tag_slug(display_name),
            name: format!("tag-{}", state.tags.len() + 1),
        };
        state.tags.push(tag.clone());
        Ok(tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub filename: String,
    pub size: usize,
}

#[derive(Default)]
struct AssetState {
    uploads: Vec<Upload>,
    failures: usize,
}

#[derive(Default)]
pub struct Assets {
    state: tokio::sync::Mutex<AssetState>,
}

impl Assets {
    pub const BASE: &'static str = "https://img.test";

    /// Make the next `times` uploads fail.
    pub async fn fail(&self, times: usize) {
        self.state.lock().await.failures = times;
    }

    pub async fn uploads(&self) -> Vec<Upload> {
        self.state.lock().await.uploads.clone()
    }
}

impl asset::Client for Assets {
    async fn upload(&self, body: Vec<u8>, filename: &str) -> UploadResult {
        let mut state = self.state.lock().await;
        if state.failures > 0 {
            state.failures -= 1;
            return UploadResult::failed();
        }
        state.uploads.push(Upload {
            filename: filename.to_owned(),
            size: body.len(),
        });
        let n = state.uploads.len();
        UploadResult::uploaded(
            format!("{}/i/{n}/{filename}", Self::BASE),
            format!("{}/t/{n}/{filename}", Self::BASE),
        )
    }
}
