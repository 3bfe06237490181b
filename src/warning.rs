//! Non-fatal problems met while publishing one document.
//!
//! A problem is logged where it happens and also recorded here, tagged with the
//! pipeline [`Step`] it came from. [`scoped`] hands the record of one document
//! back to the publisher, which puts it in the report and forwards each entry
//! to the notifier.

use std::{cell::RefCell, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Local image upload or remote image validation.
    Image,
    /// Tag creation or reconciliation.
    Tag,
    /// Title, content or publish call on an existing post.
    Update,
    /// Writing the document back to disk.
    Record,
}

impl Step {
    pub const ALL: [Step; 4] = [Step::Image, Step::Tag, Step::Update, Step::Record];

    pub fn label(self) -> &'static str {
        match self {
            Step::Image => "image",
            Step::Tag => "tag",
            Step::Update => "update",
            Step::Record => "record",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub step: Step,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.step, self.message)
    }
}

/// Warnings of one document, in the order they were recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Warnings(Vec<Warning>);

impl Warnings {
    pub fn push(&mut self, step: Step, message: impl Into<String>) {
        self.0.push(Warning {
            step,
            message: message.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Warning> {
        self.0.iter()
    }

    pub fn of(&self, step: Step) -> impl Iterator<Item = &Warning> {
        self.0.iter().filter(move |warning| warning.step == step)
    }

    pub fn count(&self, step: Step) -> usize {
        self.of(step).count()
    }
}

impl<'a> IntoIterator for &'a Warnings {
    type Item = &'a Warning;
    type IntoIter = std::slice::Iter<'a, Warning>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for Warnings {
    type Item = Warning;
    type IntoIter = std::vec::IntoIter<Warning>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

tokio::task_local! {
    static CURRENT: RefCell<Warnings>;
}

/// Record a warning for the document being published. Nothing is kept
/// outside of [`scoped`].
pub fn record(step: Step, message: impl Into<String>) {
    let message = message.into();
    let _ = CURRENT.try_with(|warnings| warnings.borrow_mut().push(step, message));
}

/// Run `f` and return its output with the warnings recorded while it ran.
pub async fn scoped<T>(f: impl Future<Output = T>) -> (T, Warnings) {
    CURRENT
        .scope(RefCell::new(Warnings::default()), async move {
            let output = f.await;
            (output, CURRENT.with(RefCell::take))
        })
        .await
}

/// `warn_run!(Image, "failed to upload {}", path)` records under [`Step::Image`].
#[macro_export]
macro_rules! warn_run {
    ($step:ident, $($arg:tt)*) => {
        $crate::warning::record($crate::warning::Step::$step, format!($($arg)*))
    };
}
