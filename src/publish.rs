//! One publish run per document.
//!
//! A document without a recorded post is created remotely, and the new post's
//! name and link are then written into its frontmatter. A document with one is
//! updated in place. Either way the tags are reconciled afterwards, and the
//! document is written back at most once, after the remote calls. Reading the
//! document, creating the post and recording a created post are fatal. Every
//! other failure is logged and collected as a [`Warning`](warning::Warning).

use std::path::Path;

use tracing::{error, info, warn};

use crate::{
    Error, ErrorContext, ErrorDetail,
    config::{Config, HaloConfig},
    frontmatter::{self, Classification, Frontmatter},
    host::FileStore,
    markdown::{
        self,
        image::{self, ImageMigrator, RemoteImageValidator},
        postprocess,
    },
    progress::{Notice, Notifier},
    remote::{asset, cms},
    retry::RetryPolicy,
    tags::TagReconciler,
    warning::{self, Step, Warnings},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub post_name: String,
    pub link: Option<String>,
    pub outcome: Outcome,
    pub images_uploaded: usize,
    /// Tag identifiers on the post, or `None` when reconciliation gave up.
    pub tags: Option<Vec<String>>,
    pub warnings: Warnings,
}

pub struct Publisher<C, A, F, N> {
    cms: C,
    migrator: ImageMigrator<A>,
    files: F,
    notifier: N,
    halo: HaloConfig,
    tag_policy: RetryPolicy,
}

impl<C, A, F, N> Publisher<C, A, F, N>
where
    C: cms::Client,
    A: asset::Client,
    F: FileStore,
    N: Notifier,
{
    pub fn new(config: &Config, cms: C, assets: A, files: F, notifier: N) -> Self {
        let mut migrator = ImageMigrator::new(assets);
        if config.images.validate_remote {
            migrator = migrator.with_validator(RemoteImageValidator::new(&config.images));
        }
        Self {
            cms,
            migrator,
            files,
            notifier,
            halo: config.halo.clone(),
            tag_policy: config.tags.retry,
        }
    }

    pub async fn publish(&self, path: &Path) -> Result<PublishReport, Error> {
        let document = path.display().to_string();
        self.notifier.notify(Notice::Started {
            document: document.clone(),
        });
        let (result, warnings) = warning::scoped(self.run(path)).await;
        for warning in &warnings {
            self.notifier.notify(Notice::Warning(warning.clone()));
        }
        match result {
            Ok(mut report) => {
                report.warnings = warnings;
                self.notifier.notify(Notice::Finished { document });
                Ok(report)
            }
            Err(e) => {
                error!(%e, "failed to publish document");
                self.notifier.notify(Notice::Failed {
                    document,
                    reason: e.detail.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run(&self, path: &Path) -> Result<PublishReport, Error> {
        let context = ErrorContext::new(path);
        let source = self
            .files
            .read_to_string(path)
            .await
            .map_err(|e| context.error(ErrorDetail::ReadDocument(e)))?;

        let parsed = frontmatter::parse(&source, path);
        let classification = parsed.classification;
        let fields = parsed.fields.clone();
        info!(
            path = %path.display(),
            ?classification,
            title = %fields.title,
            "publishing document"
        );

        let migration = self.migrator.migrate(&self.files, path, parsed.body).await;
        let images_uploaded = migration.migrated.len();
        if images_uploaded > 0 || migration.failed > 0 {
            self.notifier.notify(Notice::ImagesMigrated {
                uploaded: images_uploaded,
                failed: migration.failed,
            });
        }
        // Kept in memory until the remote calls are done.
        let rewritten = (!migration.rewrites.is_empty())
            .then(|| image::apply_rewrites(&source, &migration.rewrites));

        let html = postprocess::process(&markdown::render(&migration.content));

        let report = match (classification, fields.post_name.as_deref()) {
            (Classification::FrontmatterWithId, Some(name)) => {
                let report = self.update(name, &fields, &html).await;
                if let Some(text) = &rewritten {
                    self.record_images(path, name, text).await;
                }
                report
            }
            _ => {
                self.create(path, &context, &source, rewritten, &fields, &html)
                    .await?
            }
        };
        Ok(PublishReport {
            images_uploaded,
            ..report
        })
    }

    async fn update(&self, name: &str, fields: &Frontmatter, html: &str) -> PublishReport {
        if let Err(e) = cms::update_title(&self.cms, name, &fields.title).await {
            warn!(post = name, %e, "failed to update title");
            warning::record(Step::Update, format!("title of {name} not updated: {e}"));
        }
        match cms::update(&self.cms, name, html).await {
            Ok(()) => self.notifier.notify(Notice::Updated {
                post: name.to_owned(),
            }),
            Err(e) => {
                error!(post = name, %e, "failed to update post");
                warning::record(Step::Update, format!("post {name} not updated: {e}"));
            }
        }
        let tags = self.reconcile_tags(name, &fields.tags).await;
        PublishReport {
            post_name: name.to_owned(),
            link: fields.link.clone(),
            outcome: Outcome::Updated,
            images_uploaded: 0,
            tags,
            warnings: Warnings::default(),
        }
    }

    /// Store image rewrites of an already recorded post. A failure only means
    /// the images are uploaded again next run.
    async fn record_images(&self, path: &Path, post: &str, text: &str) {
        if let Err(e) = self.files.write(path, text).await {
            warn!(path = %path.display(), post, %e, "failed to record uploaded images");
            warning::record(Step::Record, format!("uploaded images not recorded: {e}"));
        }
    }

    async fn create(
        &self,
        path: &Path,
        context: &ErrorContext,
        source: &str,
        rewritten: Option<String>,
        fields: &Frontmatter,
        html: &str,
    ) -> Result<PublishReport, Error> {
        let name = cms::create(&self.cms, &fields.title, html)
            .await
            .map_err(|e| context.error(ErrorDetail::CreatePost(e)))?;
        let link = self.halo.post_link(&name);
        self.notifier.notify(Notice::Created {
            post: name.clone(),
            link: link.clone(),
        });

        let tags = self.reconcile_tags(&name, &fields.tags).await;

        let current = rewritten.as_deref().unwrap_or(source);
        let with_post = frontmatter::parse(current, path).with_post(&name, &link);
        let recorded = with_post.or(rewritten);
        if let Some(text) = recorded {
            self.files.write(path, &text).await.map_err(|e| {
                error!(post = %name, %e, "post created but not recorded in document");
                context.with_post(&name).error(ErrorDetail::WriteDocument(e))
            })?;
        }
        Ok(PublishReport {
            post_name: name,
            link: Some(link),
            outcome: Outcome::Created,
            images_uploaded: 0,
            tags,
            warnings: Warnings::default(),
        })
    }

    async fn reconcile_tags(&self, post: &str, tags: &[String]) -> Option<Vec<String>> {
        match TagReconciler::new(&self.cms, self.tag_policy)
            .reconcile(post, tags)
            .await
        {
            Ok(ids) => {
                self.notifier.notify(Notice::TagsAttached {
                    post: post.to_owned(),
                    count: ids.len(),
                });
                Some(ids)
            }
            Err(e) => {
                error!(post, %e, "failed to attach tags");
                warning::record(Step::Tag, format!("tags of {post} not attached: {e}"));
                None
            }
        }
    }
}
