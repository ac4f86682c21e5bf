//! Domain services containing business logic

use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Tags allowed in description and changelog sections
pub const SECTION_ALLOWED_TAGS: [&str; 9] = ["p", "li", "ul", "ol", "strong", "a", "em", "span", "br"];

static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment pattern"));

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"</?([A-Za-z][A-Za-z0-9-]*)\b[^>]*>").expect("tag pattern")
});

static UNTERMINATED_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[A-Za-z/!][^>]*$").expect("unterminated tag pattern"));

static PARAGRAPH_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n").expect("paragraph pattern"));

static BLOCK_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^</?(p|ul|ol|li)\b").expect("block pattern"));

/// Strips markup down to an allow-list of tags, keeping their text content.
pub struct HtmlSanitizer {
    allowed_tags: Vec<String>,
}

impl HtmlSanitizer {
    pub fn new<I, S>(allowed_tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_tags: allowed_tags
                .into_iter()
                .map(|t| t.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Sanitizer configured for update sections
    pub fn for_sections() -> Self {
        Self::new(SECTION_ALLOWED_TAGS)
    }

    fn is_allowed(&self, tag: &str) -> bool {
        let tag = tag.to_ascii_lowercase();
        self.allowed_tags.iter().any(|allowed| *allowed == tag)
    }

    /// Remove every tag outside the allow-list.
    ///
    /// Runs until nothing changes, so removing one tag can never splice the
    /// surrounding text into a new disallowed tag. A tag left open at the end
    /// of the input is dropped together with everything after it.
    pub fn sanitize(&self, text: &str) -> String {
        let mut current = COMMENT_RE.replace_all(text, "").into_owned();
        loop {
            let next = TAG_RE
                .replace_all(&current, |caps: &Captures| {
                    if self.is_allowed(&caps[1]) {
                        caps[0].to_string()
                    } else {
                        String::new()
                    }
                })
                .into_owned();
            let next = COMMENT_RE.replace_all(&next, "").into_owned();
            let next = UNTERMINATED_TAG_RE.replace(&next, "").into_owned();
            if next == current {
                return next;
            }
            current = next;
        }
    }
}

impl Default for HtmlSanitizer {
    fn default() -> Self {
        Self::for_sections()
    }
}

/// Wrap blank-line separated blocks in paragraphs and turn the remaining
/// newlines into line breaks. Blocks already starting with paragraph or list
/// markup are left as they are.
pub fn paragraphize(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let trimmed = normalized.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    PARAGRAPH_BREAK_RE
        .split(trimmed)
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(|block| {
            if BLOCK_START_RE.is_match(block) {
                block.to_string()
            } else {
                format!("<p>{}</p>", block.replace('\n', "<br />\n"))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Remove one level of backslash escaping (`\'` -> `'`, `\\` -> `\`).
pub fn unslash(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Sanitize and paragraphize one section body
pub fn format_section(sanitizer: &HtmlSanitizer, text: &str) -> String {
    paragraphize(&sanitizer.sanitize(text))
}
