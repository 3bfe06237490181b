//! Fixups applied to rendered HTML before it is sent to the CMS.
//!
//! Every rewrite leaves its own output unmatched, so running [`process`] twice
//! yields the same result as running it once.

use std::sync::LazyLock;

use regex::Regex;

const PARAGRAPH_BREAK: &str = "\n</p>\n";

static IMG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<img[^>]*>").unwrap());

static UNCHECKED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<li>\[ \] (.*?)</li>").unwrap());

static CHECKED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<li>\[x\] (.*?)</li>").unwrap());

pub fn process(html: &str) -> String {
    let html = break_after_images(html);
    let html = UNCHECKED.replace_all(&html, r#"<span class="todo unchecked">⬜ $1</span><br>"#);
    CHECKED
        .replace_all(&html, r#"<span class="todo checked">✅ $1</span><br>"#)
        .into_owned()
}

fn break_after_images(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    for m in IMG.find_iter(html) {
        out.push_str(&html[last..m.end()]);
        if !html[m.end()..].starts_with(PARAGRAPH_BREAK) {
            out.push_str(PARAGRAPH_BREAK);
        }
        last = m.end();
    }
    out.push_str(&html[last..]);
    out
}
