//! Attach a document's tags to its post by display name.
//!
//! Each attempt reads the whole tag catalog, creates the names it lacks, and
//! replaces the post's tag list wholesale. Any failure of the catalog fetch,
//! the post fetch or the post update restarts the sequence under the
//! [`RetryPolicy`]; a single tag that cannot be created is left out.

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::{
    ErrorDetail,
    remote::{self, cms},
    retry::RetryPolicy,
    warn_run,
};

pub struct TagReconciler<'a, C> {
    client: &'a C,
    policy: RetryPolicy,
}

impl<'a, C: cms::Client> TagReconciler<'a, C> {
    pub fn new(client: &'a C, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Returns the tag identifiers now on the post.
    pub async fn reconcile(&self, post: &str, desired: &[String]) -> Result<Vec<String>, ErrorDetail> {
        let ids = self
            .policy
            .run("tag reconciliation", || self.attempt(post, desired))
            .await
            .map_err(ErrorDetail::ReconciliationExhausted)?;
        info!(post, tags = ?ids, "tags attached");
        Ok(ids)
    }

    async fn attempt(&self, post: &str, desired: &[String]) -> Result<Vec<String>, remote::Error> {
        // display name -> identifier; the first entry wins on duplicates
        let mut catalog = IndexMap::new();
        for tag in self.client.list_tags().await? {
            catalog.entry(tag.display_name).or_insert(tag.name);
        }

        let mut ids: Vec<String> = Vec::with_capacity(desired.len());
        for name in desired {
            let id = match catalog.get(name) {
                Some(id) => {
                    debug!(tag = %name, %id, "matched existing tag");
                    id.clone()
                }
                None => match self.client.create_tag(name).await {
                    Ok(tag) => {
                        debug!(tag = %name, id = %tag.name, "created tag");
                        catalog.insert(name.clone(), tag.name.clone());
                        tag.name
                    }
                    Err(error) => {
                        warn!(tag = %name, %error, "failed to create tag, leaving it out");
                        warn_run!(Tag, "tag {name} left out: {error}");
                        continue;
                    }
                },
            };
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        let mut current = self.client.get_post(post).await?;
        current.spec.tags = ids.clone();
        self.client.put_post(&current).await?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::TagReconciler;
    use crate::{
        ErrorDetail,
        deploy::memory::{Cms, Operation},
        retry::RetryPolicy,
    };

    fn names(tags: &[&str]) -> Vec<String> {
        tags.iter().map(|tag| tag.to_string()).collect()
    }

    async fn cms_with_post() -> Cms {
        let cms = Cms::default();
        cms.insert_post("p1", "Post").await;
        cms.insert_tag("Rust", "tag-rust").await;
        cms
    }

    #[tokio::test]
    async fn test_matches_and_creates() {
        let cms = cms_with_post().await;
        let ids = TagReconciler::new(&cms, RetryPolicy::tag_reconciliation())
            .reconcile("p1", &names(&["Rust", "Travel"]))
            .await
            .unwrap();
        assert_eq!(ids, vec!["tag-rust", "tag-2"]);
        assert_eq!(cms.post("p1").await.unwrap().spec.tags, ids);
        let created = cms.tags().await;
        assert_eq!(created[1].display_name, "Travel");
        assert_eq!(created[1].slug, "travel");
    }

    #[tokio::test]
    async fn test_replaces_existing_tags() {
        let cms = cms_with_post().await;
        let reconciler = TagReconciler::new(&cms, RetryPolicy::tag_reconciliation());
        reconciler.reconcile("p1", &names(&["A", "B"])).await.unwrap();
        reconciler.reconcile("p1", &names(&["Rust"])).await.unwrap();
        assert_eq!(cms.post("p1").await.unwrap().spec.tags, vec!["tag-rust"]);

        reconciler.reconcile("p1", &[]).await.unwrap();
        assert!(cms.post("p1").await.unwrap().spec.tags.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_names_resolve_once() {
        let cms = cms_with_post().await;
        let ids = TagReconciler::new(&cms, RetryPolicy::tag_reconciliation())
            .reconcile("p1", &names(&["New", "New", "Rust", "Rust"]))
            .await
            .unwrap();
        assert_eq!(ids, vec!["tag-2", "tag-rust"]);
        assert_eq!(cms.count(Operation::CreateTag).await, 1);
    }

    #[tokio::test]
    async fn test_case_sensitive_match() {
        let cms = cms_with_post().await;
        let ids = TagReconciler::new(&cms, RetryPolicy::tag_reconciliation())
            .reconcile("p1", &names(&["rust"]))
            .await
            .unwrap();
        assert_eq!(ids, vec!["tag-2"]);
    }

    #[tokio::test]
    async fn test_idempotent_across_runs() {
        let cms = cms_with_post().await;
        let reconciler = TagReconciler::new(&cms, RetryPolicy::tag_reconciliation());
        let first = reconciler.reconcile("p1", &names(&["X", "Rust"])).await.unwrap();
        let second = reconciler.reconcile("p1", &names(&["X", "Rust"])).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(cms.tags().await.len(), 2);
    }

    #[tokio::test]
    async fn test_retries_catalog_failures() {
        let cms = cms_with_post().await;
        cms.fail(Operation::ListTags, 2).await;
        let ids = TagReconciler::new(&cms, RetryPolicy::tag_reconciliation())
            .reconcile("p1", &names(&["Rust"]))
            .await
            .unwrap();
        assert_eq!(ids, vec!["tag-rust"]);
        assert_eq!(cms.count(Operation::ListTags).await, 3);
    }

    #[tokio::test]
    async fn test_update_failure_does_not_duplicate_tags() {
        let cms = cms_with_post().await;
        cms.fail(Operation::PutPost, 1).await;
        let ids = TagReconciler::new(&cms, RetryPolicy::tag_reconciliation())
            .reconcile("p1", &names(&["Fresh"]))
            .await
            .unwrap();
        assert_eq!(ids, vec!["tag-2"]);
        assert_eq!(cms.count(Operation::CreateTag).await, 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_policy() {
        let cms = cms_with_post().await;
        cms.fail(Operation::PutPost, usize::MAX).await;
        let result = TagReconciler::new(&cms, RetryPolicy::tag_reconciliation())
            .reconcile("p1", &names(&["Rust"]))
            .await;
        assert!(matches!(
            result,
            Err(ErrorDetail::ReconciliationExhausted(
                crate::retry::RetryError::Exhausted { attempts: 10, .. }
            ))
        ));
        assert_eq!(cms.count(Operation::PutPost).await, 10);
        assert!(cms.post("p1").await.unwrap().spec.tags.is_empty());
    }

    #[tokio::test]
    async fn test_uncreatable_tag_is_left_out() {
        let cms = cms_with_post().await;
        cms.fail_tag("Bad").await;
        let ids = TagReconciler::new(&cms, RetryPolicy::tag_reconciliation())
            .reconcile("p1", &names(&["Bad", "Rust"]))
            .await
            .unwrap();
        assert_eq!(ids, vec!["tag-rust"]);
    }
}
