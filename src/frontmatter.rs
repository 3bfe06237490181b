//! Frontmatter classification for published documents.
//!
//! This is a tolerant line-oriented extractor, not a YAML parser: it only
//! understands `title:`, `tags:` and the two keys written back after a post is
//! created. Every other line of the block is carried through untouched when the
//! block is rewritten.

use std::{path::Path, sync::LazyLock};

use regex::Regex;

pub const POST_NAME_KEY: &str = "halo_post_name";
pub const LINK_KEY: &str = "halo_link";

static FRONTMATTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A---[ \t]*\r?\n(?:((?s:.*?))\r?\n)??---[ \t]*(?:\r?\n|\z)").unwrap()
});

static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^title:[ \t]*(.*?)[ \t]*\r?$").unwrap());

static TAGS_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^tags:[ \t]*\r?\n((?:[ \t]*-.*(?:\n|\z))+)").unwrap());

static TAGS_FLOW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^tags:[ \t]*\[(.*)\][ \t]*\r?$").unwrap());

static POST_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?m)^{POST_NAME_KEY}:[ \t]*(.*?)[ \t]*\r?$")).unwrap()
});

static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?m)^{LINK_KEY}:[ \t]*(.*?)[ \t]*\r?$")).unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    NoFrontmatter,
    FrontmatterNoId,
    FrontmatterWithId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frontmatter {
    pub title: String,
    pub tags: Vec<String>,
    pub post_name: Option<String>,
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDocument<'a> {
    pub classification: Classification,
    pub fields: Frontmatter,
    /// Text between the delimiters.
    pub block: Option<&'a str>,
    /// Text after the closing delimiter, or the whole document.
    pub body: &'a str,
    /// `"\r\n"` when the document's first line ends that way, else `"\n"`.
    pub line_ending: &'static str,
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

fn scalar<'a>(re: &Regex, block: &'a str) -> Option<&'a str> {
    re.captures(block)
        .and_then(|caps| caps.get(1))
        .map(|value| unquote(value.as_str()))
        .filter(|value| !value.is_empty())
}

fn tags(block: &str) -> Vec<String> {
    if let Some(items) = TAGS_BLOCK.captures(block).and_then(|caps| caps.get(1)) {
        return items
            .as_str()
            .lines()
            .filter_map(|line| line.trim().strip_prefix('-'))
            .map(unquote)
            .filter(|tag| !tag.is_empty())
            .map(ToOwned::to_owned)
            .collect();
    }
    if let Some(items) = TAGS_FLOW.captures(block).and_then(|caps| caps.get(1)) {
        return items
            .as_str()
            .split(',')
            .map(unquote)
            .filter(|tag| !tag.is_empty())
            .map(ToOwned::to_owned)
            .collect();
    }
    Vec::new()
}

fn line_ending(text: &str) -> &'static str {
    match text.find('\n') {
        Some(end) if text[..end].ends_with('\r') => "\r\n",
        _ => "\n",
    }
}

fn file_title(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Classify a document and pull out the fields the publish run needs.
///
/// Never fails: a missing or malformed block yields the file name as title and
/// no tags.
pub fn parse<'a>(text: &'a str, path: &Path) -> ParsedDocument<'a> {
    let Some(caps) = FRONTMATTER.captures(text) else {
        return ParsedDocument {
            classification: Classification::NoFrontmatter,
            fields: Frontmatter {
                title: file_title(path),
                tags: Vec::new(),
                post_name: None,
                link: None,
            },
            block: None,
            body: text,
            line_ending: line_ending(text),
        };
    };
    let block = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    let body = &text[caps.get(0).map(|m| m.end()).unwrap_or_default()..];

    let post_name = scalar(&POST_NAME, block).map(ToOwned::to_owned);
    let classification = if post_name.is_some() {
        Classification::FrontmatterWithId
    } else {
        Classification::FrontmatterNoId
    };
    ParsedDocument {
        classification,
        fields: Frontmatter {
            title: scalar(&TITLE, block)
                .map(ToOwned::to_owned)
                .unwrap_or_else(|| file_title(path)),
            tags: tags(block),
            post_name,
            link: scalar(&LINK, block).map(ToOwned::to_owned),
        },
        block: Some(block),
        body,
        line_ending: line_ending(text),
    }
}

fn set_key(block: &str, key: &str, value: &str, eol: &str) -> String {
    let mut found = false;
    let mut lines = block
        .lines()
        .map(|line| {
            let is_key = line
                .strip_prefix(key)
                .is_some_and(|rest| rest.starts_with(':'));
            if is_key && !found {
                found = true;
                format!("{key}: {value}")
            } else {
                line.to_owned()
            }
        })
        .collect::<Vec<_>>();
    if !found {
        lines.push(format!("{key}: {value}"));
    }
    lines.join(eol)
}

/// Prepend a fresh block to a document that has none.
pub fn inject(body: &str, title: &str, post_name: &str, link: &str, eol: &str) -> String {
    let block = [
        format!("title: {title}"),
        "tags: []".to_owned(),
        format!("{POST_NAME_KEY}: {post_name}"),
        format!("{LINK_KEY}: {link}"),
    ]
    .join(eol);
    format!("---{eol}{block}{eol}---{eol}{}", body.trim_start())
}

/// Set the post name and link in an existing block, keeping all other lines.
pub fn append_ids(block: &str, body: &str, post_name: &str, link: &str, eol: &str) -> String {
    let block = set_key(block, POST_NAME_KEY, post_name, eol);
    let block = set_key(&block, LINK_KEY, link, eol);
    format!("---{eol}{block}{eol}---{eol}{}", body.trim_start())
}

impl ParsedDocument<'_> {
    /// The document text recording a newly created post, or `None` when the
    /// document already carries one.
    pub fn with_post(&self, post_name: &str, link: &str) -> Option<String> {
        match (self.classification, self.block) {
            (Classification::NoFrontmatter, _) => {
                Some(inject(
                    self.body,
                    &self.fields.title,
                    post_name,
                    link,
                    self.line_ending,
                ))
            }
            (Classification::FrontmatterNoId, Some(block)) => {
                Some(append_ids(
                    block,
                    self.body,
                    post_name,
                    link,
                    self.line_ending,
                ))
            }
            _ => None,
        }
    }
}
