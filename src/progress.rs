//! User-facing notices.
//!
//! Publishing reports what happened to each document through a [`Notifier`],
//! so the pipeline stays independent of how (or whether) it is displayed.

use std::sync::{Arc, RwLock};

use indexmap::IndexMap;

use crate::warning::{Step, Warning};

/// Something worth telling the user about a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Started { document: String },
    ImagesMigrated { uploaded: usize, failed: usize },
    Created { post: String, link: String },
    Updated { post: String },
    TagsAttached { post: String, count: usize },
    Warning(Warning),
    Failed { document: String, reason: String },
    Finished { document: String },
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);

    /// Called once after the last document.
    fn finish(&self) {}
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn notify(&self, notice: Notice) {
        (**self).notify(notice)
    }

    fn finish(&self) {
        (**self).finish()
    }
}

/// Discards everything.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _notice: Notice) {}
}

#[derive(Debug, Default)]
struct Stats {
    documents: usize,
    created: usize,
    updated: usize,
    failed: usize,
    images: usize,
    warnings: IndexMap<Step, usize>,
    start_time: Option<std::time::Instant>,
}

impl Stats {
    fn started() -> Self {
        Self {
            start_time: Some(std::time::Instant::now()),
            ..Default::default()
        }
    }

    fn record(&mut self, notice: &Notice) {
        match notice {
            Notice::Started { .. } => self.documents += 1,
            Notice::ImagesMigrated { uploaded, .. } => self.images += uploaded,
            Notice::Created { .. } => self.created += 1,
            Notice::Updated { .. } => self.updated += 1,
            Notice::Warning(warning) => *self.warnings.entry(warning.step).or_default() += 1,
            Notice::Failed { .. } => self.failed += 1,
            Notice::TagsAttached { .. } | Notice::Finished { .. } => {}
        }
    }

    fn summary(&self) -> Vec<String> {
        let duration = self.start_time.map(|t| t.elapsed()).unwrap_or_default();
        let mut lines = vec![
            "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━".to_owned(),
            "📊 Summary".to_owned(),
            "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━".to_owned(),
            format!("   📄 Documents:  {}", self.documents),
            format!("   🆕 Created:    {}", self.created),
            format!("   ♻️  Updated:    {}", self.updated),
        ];
        if self.failed > 0 {
            lines.push(format!("   ❌ Failed:     {}", self.failed));
        }
        if self.images > 0 {
            lines.push(format!("   🖼️  Images:     {}", self.images));
        }
        let warnings: usize = self.warnings.values().sum();
        if warnings > 0 {
            let by_step = Step::ALL
                .iter()
                .filter_map(|step| {
                    let count = self.warnings.get(step).copied().unwrap_or(0);
                    (count > 0).then(|| format!("{step} {count}"))
                })
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("   ⚠️  Warnings:   {warnings} ({by_step})"));
        }
        lines.push(format!("   ⏱️  Duration:   {:.2}s", duration.as_secs_f64()));
        lines.push("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━".to_owned());
        lines
    }
}

fn describe(notice: &Notice) -> Option<String> {
    Some(match notice {
        Notice::Started { document } => format!("📄 {document}"),
        Notice::ImagesMigrated { uploaded, failed: 0 } => {
            format!("   🖼️  uploaded {uploaded} image(s)")
        }
        Notice::ImagesMigrated { uploaded, failed } => {
            format!("   🖼️  uploaded {uploaded} image(s), {failed} failed")
        }
        Notice::Created { post, link } => format!("   🆕 created {post}: {link}"),
        Notice::Updated { post } => format!("   ♻️  updated {post}"),
        Notice::TagsAttached { count: 0, .. } => return None,
        Notice::TagsAttached { count, .. } => format!("   🏷️  {count} tag(s) attached"),
        Notice::Warning(warning) => format!("   ⚠️  {warning}"),
        Notice::Failed { document, reason } => format!("   ❌ {document}: {reason}"),
        Notice::Finished { .. } => return None,
    })
}

/// Plain lines on stderr (for non-TTY).
pub struct SimpleNotifier {
    stats: RwLock<Stats>,
}

impl SimpleNotifier {
    pub fn new() -> Self {
        Self {
            stats: RwLock::new(Stats::started()),
        }
    }
}

impl Default for SimpleNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for SimpleNotifier {
    fn notify(&self, notice: Notice) {
        self.stats.write().unwrap().record(&notice);
        if let Some(line) = describe(&notice) {
            eprintln!("{line}");
        }
    }

    fn finish(&self) {
        eprintln!();
        for line in self.stats.read().unwrap().summary() {
            eprintln!("{line}");
        }
    }
}

/// Spinner for the document in flight, with notices printed above it (for TTY).
pub struct FancyNotifier {
    multi: indicatif::MultiProgress,
    spinner: indicatif::ProgressBar,
    stats: RwLock<Stats>,
}

impl FancyNotifier {
    pub fn new() -> Self {
        let multi = indicatif::MultiProgress::new();
        let spinner = multi.add(indicatif::ProgressBar::new_spinner());
        spinner.set_style(
            indicatif::ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap(),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(100));
        Self {
            multi,
            spinner,
            stats: RwLock::new(Stats::started()),
        }
    }
}

impl Default for FancyNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for FancyNotifier {
    fn notify(&self, notice: Notice) {
        self.stats.write().unwrap().record(&notice);
        match &notice {
            Notice::Started { document } => {
                self.spinner.set_message(format!("publishing {document}"));
            }
            Notice::Finished { document } => {
                self.spinner.set_message(format!("done {document}"));
            }
            _ => {}
        }
        if let Some(line) = describe(&notice) {
            self.multi.println(line).ok();
        }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
        for line in self.stats.read().unwrap().summary() {
            self.multi.println(line).ok();
        }
    }
}

/// Pick a notifier for the current terminal.
pub fn create_notifier() -> Arc<dyn Notifier> {
    if console::Term::stderr().is_term() {
        Arc::new(FancyNotifier::new())
    } else {
        Arc::new(SimpleNotifier::new())
    }
}
