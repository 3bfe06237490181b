use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use crate::{
    ErrorDetail,
    config::Config,
    deploy::memory::{Assets, Cms, Operation},
    frontmatter::{self, Classification},
    host::{FileStore, MemoryFileStore},
    progress::{Notice, Notifier},
    publish::{Outcome, Publisher},
    warning::Step,
};

const SCENARIO: &str = "src/tests/scenario";

#[derive(Default)]
struct Recorder(Mutex<Vec<Notice>>);

impl Notifier for Recorder {
    fn notify(&self, notice: Notice) {
        self.0.lock().unwrap().push(notice);
    }
}

impl Recorder {
    fn notices(&self) -> Vec<Notice> {
        self.0.lock().unwrap().clone()
    }
}

async fn config() -> Config {
    let config = tokio::fs::read_to_string(Path::new(SCENARIO).join("config.yaml"))
        .await
        .unwrap();
    serde_yaml::from_str(&config).unwrap()
}

async fn load(files: &MemoryFileStore, names: &[&str]) {
    for name in names {
        let content = tokio::fs::read(Path::new(SCENARIO).join(name)).await.unwrap();
        files.insert(*name, content).await;
    }
}

struct Fixture {
    config: Config,
    cms: Cms,
    assets: Assets,
    files: MemoryFileStore,
    recorder: Arc<Recorder>,
}

impl Fixture {
    async fn new(files: MemoryFileStore, names: &[&str]) -> Self {
        load(&files, names).await;
        Self {
            config: config().await,
            cms: Cms::default(),
            assets: Assets::default(),
            files,
            recorder: Arc::default(),
        }
    }

    fn publisher(&self) -> Publisher<&Cms, &Assets, &MemoryFileStore, Arc<Recorder>> {
        Publisher::new(
            &self.config,
            &self.cms,
            &self.assets,
            &self.files,
            self.recorder.clone(),
        )
    }

    async fn document(&self, name: &str) -> String {
        self.files.get(Path::new(name)).await.unwrap()
    }
}

#[tokio::test]
async fn test_create_then_update() {
    let fixture = Fixture::new(
        MemoryFileStore::default(),
        &["notes/trip.md", "notes/img/temple.png"],
    )
    .await;
    let publisher = fixture.publisher();
    let path = Path::new("notes/trip.md");

    let report = publisher.publish(path).await.unwrap();
    assert_eq!(report.outcome, Outcome::Created);
    assert_eq!(report.images_uploaded, 1);
    assert_eq!(
        report.link.as_deref(),
        Some(format!("https://blog.example.com/archives/{}", report.post_name).as_str())
    );
    assert_eq!(fixture.cms.count(Operation::CreatePost).await, 1);
    assert_eq!(fixture.cms.count(Operation::PutContent).await, 0);
    assert_eq!(fixture.cms.count(Operation::Publish).await, 0);
    assert_eq!(fixture.files.writes(), 1);

    let uploads = fixture.assets.uploads().await;
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].filename, "temple.png");

    let content = fixture.cms.content(&report.post_name).await.unwrap();
    assert!(
        content
            .content
            .contains("<img src=\"https://img.test/i/1/temple.png\" alt=\"https://img.test/i/1/temple.png\" />\n</p>\n")
    );
    assert!(
        content
            .content
            .contains("<span class=\"todo unchecked\">⬜ book the train</span><br>")
    );

    let post = fixture.cms.post(&report.post_name).await.unwrap();
    assert_eq!(post.spec.title, "Three days in Kyoto");
    let tags = fixture.cms.tags().await;
    assert_eq!(tags.len(), 2);
    assert_eq!(
        post.spec.tags,
        tags.iter().map(|tag| tag.name.clone()).collect::<Vec<_>>()
    );
    assert_eq!(report.tags, Some(post.spec.tags.clone()));

    let document = fixture.document("notes/trip.md").await;
    assert!(document.contains("![https://img.test/i/1/temple.png](./img/temple.png)"));
    assert!(document.contains("draft: false"));
    let parsed = frontmatter::parse(&document, path);
    assert_eq!(parsed.classification, Classification::FrontmatterWithId);
    assert_eq!(parsed.fields.post_name.as_deref(), Some(report.post_name.as_str()));
    assert_eq!(parsed.fields.link, report.link);
    assert_eq!(parsed.fields.tags, vec!["Travel", "Japan", "Travel"]);

    let second = publisher.publish(path).await.unwrap();
    assert_eq!(second.outcome, Outcome::Updated);
    assert_eq!(second.post_name, report.post_name);
    assert_eq!(second.images_uploaded, 0);
    assert_eq!(second.tags, report.tags);
    assert_eq!(fixture.cms.count(Operation::CreatePost).await, 1);
    assert_eq!(fixture.cms.count(Operation::PutContent).await, 1);
    assert_eq!(fixture.cms.count(Operation::Publish).await, 1);
    assert_eq!(fixture.cms.posts().await.len(), 1);
    assert_eq!(fixture.cms.tags().await.len(), 2);
    assert_eq!(fixture.assets.uploads().await.len(), 1);
    assert_eq!(fixture.files.writes(), 1);

    let content = fixture.cms.content(&report.post_name).await.unwrap();
    assert!(
        content
            .content
            .contains("<img src=\"https://img.test/i/1/temple.png\" alt=\"./img/temple.png\" />")
    );
    assert_eq!(content.raw, content.content);

    let notices = fixture.recorder.notices();
    assert!(notices.contains(&Notice::ImagesMigrated {
        uploaded: 1,
        failed: 0
    }));
    assert!(notices.contains(&Notice::Updated {
        post: report.post_name.clone()
    }));
}

#[tokio::test]
async fn test_document_without_frontmatter() {
    let fixture = Fixture::new(MemoryFileStore::default(), &["notes/plain.md"]).await;
    let path = Path::new("notes/plain.md");

    let report = fixture.publisher().publish(path).await.unwrap();
    assert_eq!(report.outcome, Outcome::Created);
    assert_eq!(report.tags, Some(Vec::new()));
    assert_eq!(fixture.files.writes(), 1);

    let post = fixture.cms.post(&report.post_name).await.unwrap();
    assert_eq!(post.spec.title, "plain");

    let document = fixture.document("notes/plain.md").await;
    assert!(document.starts_with("---\ntitle: plain\ntags: []\n"));
    assert!(document.ends_with("---\n# Plain note\n\nNothing but text.\n"));
    let parsed = frontmatter::parse(&document, path);
    assert_eq!(parsed.classification, Classification::FrontmatterWithId);
    assert_eq!(parsed.fields.post_name, Some(report.post_name));
}

#[tokio::test]
async fn test_create_failure_is_fatal() {
    let fixture = Fixture::new(MemoryFileStore::default(), &["notes/plain.md"]).await;
    fixture.cms.fail(Operation::CreatePost, 1).await;

    let error = fixture
        .publisher()
        .publish(Path::new("notes/plain.md"))
        .await
        .unwrap_err();
    assert!(matches!(*error.detail, ErrorDetail::CreatePost(_)));
    assert_eq!(fixture.cms.calls().await, vec![Operation::CreatePost]);
    assert_eq!(fixture.files.writes(), 0);
    assert!(
        fixture
            .recorder
            .notices()
            .iter()
            .any(|notice| matches!(notice, Notice::Failed { .. }))
    );
}

#[tokio::test]
async fn test_create_failure_leaves_document_untouched() {
    let fixture = Fixture::new(
        MemoryFileStore::default(),
        &["notes/trip.md", "notes/img/temple.png"],
    )
    .await;
    fixture.cms.fail(Operation::CreatePost, 1).await;
    let path = Path::new("notes/trip.md");
    let before = fixture.document("notes/trip.md").await;

    let error = fixture.publisher().publish(path).await.unwrap_err();
    assert!(matches!(*error.detail, ErrorDetail::CreatePost(_)));
    assert_eq!(fixture.assets.uploads().await.len(), 1);
    assert_eq!(fixture.files.writes(), 0);
    assert_eq!(fixture.document("notes/trip.md").await, before);
    assert_eq!(fixture.cms.count(Operation::ListTags).await, 0);

    // The next run starts from the untouched document and creates the post.
    let report = fixture.publisher().publish(path).await.unwrap();
    assert_eq!(report.outcome, Outcome::Created);
    assert_eq!(report.images_uploaded, 1);
    assert_eq!(fixture.cms.posts().await.len(), 1);
    assert_eq!(fixture.files.writes(), 1);
    let document = fixture.document("notes/trip.md").await;
    assert!(document.contains("![https://img.test/i/2/temple.png](./img/temple.png)"));
    assert_eq!(
        frontmatter::parse(&document, path).classification,
        Classification::FrontmatterWithId
    );
}

#[tokio::test]
async fn test_update_failure_still_attaches_tags() {
    let fixture = Fixture::new(MemoryFileStore::default(), &["notes/published.md"]).await;
    fixture.cms.insert_post("post-1", "Old title").await;
    fixture.cms.insert_tag("Rust", "tag-rust").await;
    fixture.cms.fail(Operation::PutContent, 1).await;

    let report = fixture
        .publisher()
        .publish(Path::new("notes/published.md"))
        .await
        .unwrap();
    assert_eq!(report.outcome, Outcome::Updated);
    assert_eq!(report.post_name, "post-1");
    assert_eq!(
        report.link.as_deref(),
        Some("https://blog.example.com/archives/post-1")
    );
    assert_eq!(fixture.cms.count(Operation::CreatePost).await, 0);
    assert_eq!(fixture.cms.count(Operation::PutContent).await, 1);
    assert_eq!(fixture.cms.count(Operation::Publish).await, 1);
    assert_eq!(fixture.cms.published().await, vec!["post-1"]);
    assert_eq!(report.warnings.len(), 1);
    let warning = report.warnings.iter().next().unwrap();
    assert_eq!(warning.step, Step::Update);
    assert!(warning.message.contains("post-1 not updated"));
    assert!(warning.message.contains("failed to replace content"));
    assert!(
        fixture
            .recorder
            .notices()
            .contains(&Notice::Warning(warning.clone()))
    );

    let post = fixture.cms.post("post-1").await.unwrap();
    assert_eq!(post.spec.title, "Release notes");
    assert_eq!(post.spec.tags, vec!["tag-rust", "tag-2"]);
    assert_eq!(fixture.files.writes(), 0);
}

#[tokio::test]
async fn test_exhausted_tags_are_not_fatal() {
    let fixture = Fixture::new(MemoryFileStore::default(), &["notes/published.md"]).await;
    fixture.cms.insert_post("post-1", "Release notes").await;
    fixture.cms.fail(Operation::ListTags, usize::MAX).await;

    let report = fixture
        .publisher()
        .publish(Path::new("notes/published.md"))
        .await
        .unwrap();
    assert_eq!(report.tags, None);
    assert_eq!(fixture.cms.count(Operation::ListTags).await, 3);
    assert_eq!(fixture.cms.count(Operation::PutContent).await, 1);
    assert_eq!(report.warnings.count(Step::Tag), 1);
    assert!(
        report
            .warnings
            .of(Step::Tag)
            .any(|warning| warning.message.contains("tags of post-1 not attached"))
    );
}

#[tokio::test]
async fn test_unrecorded_post_is_reported() {
    let fixture = Fixture::new(
        MemoryFileStore::read_only(),
        &["notes/trip.md", "notes/img/temple.png"],
    )
    .await;

    let error = fixture
        .publisher()
        .publish(Path::new("notes/trip.md"))
        .await
        .unwrap_err();
    assert!(matches!(*error.detail, ErrorDetail::WriteDocument(_)));
    assert!(error.context.post.is_some());
    assert_eq!(fixture.cms.posts().await.len(), 1);
    assert_eq!(fixture.files.writes(), 0);
    assert!(
        fixture
            .recorder
            .notices()
            .iter()
            .any(|notice| matches!(notice, Notice::Failed { .. }))
    );
}

#[tokio::test]
async fn test_unrecorded_images_on_update_are_a_warning() {
    let fixture = Fixture::new(
        MemoryFileStore::read_only(),
        &["notes/published.md", "notes/img/temple.png"],
    )
    .await;
    fixture.cms.insert_post("post-1", "Release notes").await;
    let path = Path::new("notes/published.md");
    let document = fixture.document("notes/published.md").await;
    fixture
        .files
        .insert(
            "notes/published.md",
            format!("{document}
![Temple](./img/temple.png)
").into_bytes(),
        )
        .await;

    let report = fixture.publisher().publish(path).await.unwrap();
    assert_eq!(report.outcome, Outcome::Updated);
    assert_eq!(report.images_uploaded, 1);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings.count(Step::Record), 1);
    assert!(fixture.recorder.notices().iter().any(|notice| matches!(
        notice,
        Notice::Warning(warning) if warning.step == Step::Record
    )));
}

#[tokio::test]
async fn test_missing_document() {
    let fixture = Fixture::new(MemoryFileStore::default(), &[]).await;
    let error = fixture
        .publisher()
        .publish(Path::new("notes/nowhere.md"))
        .await
        .unwrap_err();
    assert!(matches!(*error.detail, ErrorDetail::ReadDocument(_)));
    assert!(fixture.cms.calls().await.is_empty());
}

#[tokio::test]
async fn test_failed_upload_is_retried_next_run() {
    let fixture = Fixture::new(
        MemoryFileStore::default(),
        &["notes/trip.md", "notes/img/temple.png"],
    )
    .await;
    fixture.assets.fail(1).await;
    let publisher = fixture.publisher();
    let path = Path::new("notes/trip.md");

    let report = publisher.publish(path).await.unwrap();
    assert_eq!(report.images_uploaded, 0);
    assert_eq!(report.warnings.count(Step::Image), 1);
    assert!(
        report
            .warnings
            .of(Step::Image)
            .any(|warning| warning.message.contains("failed to upload image"))
    );
    let document = fixture.document("notes/trip.md").await;
    assert!(document.contains("![Temple](./img/temple.png)"));
    assert_eq!(fixture.files.writes(), 1);

    let second = publisher.publish(path).await.unwrap();
    assert_eq!(second.outcome, Outcome::Updated);
    assert_eq!(second.images_uploaded, 1);
    assert!(
        fixture
            .document("notes/trip.md")
            .await
            .contains("![https://img.test/i/1/temple.png](./img/temple.png)")
    );
    assert!(
        fixture
            .files
            .read_to_string(path)
            .await
            .unwrap()
            .contains("halo_post_name:")
    );
    assert_eq!(fixture.files.writes(), 2);
}
