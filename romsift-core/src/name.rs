//! Parser for No-Intro, Redump and MAME-style machine names.
//!
//! Catalog names encode variant information in trailing tags:
//! ```text
//! Game Name (Region1, Region2) (Rev X) (En,Fr,De) (Disc 2) [!] [b]
//! ```
//!
//! The parser splits a name into its title (all tags stripped), the raw tag
//! list, and the pieces romsift cares about for grouping and prioritizing:
//! regions, languages, revision, and disc number.

use serde::{Deserialize, Serialize};

/// Parsed components of a machine name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedName {
    /// Base title without any parenthetical or bracketed tags.
    pub title: String,
    /// Every tag in the order it appears. Bracketed tags keep their brackets
    /// (e.g. `"[b]"`) so they stay distinguishable from parenthesized ones.
    pub tags: Vec<String>,
    /// Region strings as they appear in the name (e.g. "USA", "Japan").
    pub regions: Vec<String>,
    /// Language codes if present (e.g. "En", "Fr").
    pub languages: Vec<String>,
    /// Revision string if present (e.g. "Rev A", "Rev 1").
    pub revision: Option<String>,
    /// Version string if present (e.g. "v1.1").
    pub version: Option<String>,
    /// Disc number for multi-disc games.
    pub disc_number: Option<u32>,
    /// Dump status from bracketed tags.
    pub status: DumpStatus,
}

/// Dump verification status from bracketed tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DumpStatus {
    /// No status tag or [!] verified tag.
    #[default]
    Verified,
    /// [b] bad dump.
    BadDump,
    /// [o] overdump.
    Overdump,
}

impl DumpStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DumpStatus::Verified => "verified",
            DumpStatus::BadDump => "bad_dump",
            DumpStatus::Overdump => "overdump",
        }
    }
}

impl ParsedName {
    /// Title plus the disc tag, e.g. `"Final Fantasy VII (Disc 2)"`.
    ///
    /// Equal to [`title`](Self::title) for single-disc machines.
    pub fn disc_title(&self) -> String {
        disc_title(&self.title, self.disc_number)
    }
}

/// Build the disc title for a title and optional disc number.
pub fn disc_title(title: &str, disc_number: Option<u32>) -> String {
    match disc_number {
        Some(n) => format!("{title} (Disc {n})"),
        None => title.to_string(),
    }
}

/// Parse a machine name into its components.
///
/// # Examples
///
/// ```
/// use romsift_core::name::parse_name;
///
/// let parsed = parse_name("Final Fantasy VII (USA) (Disc 1)");
/// assert_eq!(parsed.title, "Final Fantasy VII");
/// assert_eq!(parsed.regions, vec!["USA"]);
/// assert_eq!(parsed.disc_number, Some(1));
/// assert_eq!(parsed.disc_title(), "Final Fantasy VII (Disc 1)");
/// ```
pub fn parse_name(name: &str) -> ParsedName {
    let (title, tags) = extract_title_and_tags(name);
    let mut result = ParsedName {
        title,
        ..Default::default()
    };

    for tag in tags {
        match tag {
            Tag::Paren(content) => {
                classify_paren_tag(&content, &mut result);
                result.tags.push(content);
            }
            Tag::Bracket(content) => {
                classify_bracket_tag(&content, &mut result);
                result.tags.push(format!("[{content}]"));
            }
        }
    }

    result
}

// ── Internal parsing ────────────────────────────────────────────────────────

#[derive(Debug)]
enum Tag {
    Paren(String),
    Bracket(String),
}

/// Split a name into the base title and its (parenthesized) and [bracketed] tags.
fn extract_title_and_tags(name: &str) -> (String, Vec<Tag>) {
    let mut tags = Vec::new();
    let mut title_end = None;
    let mut chars = name.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        let (open, close, make_tag): (char, char, fn(String) -> Tag) = match ch {
            '(' => ('(', ')', Tag::Paren),
            '[' => ('[', ']', Tag::Bracket),
            _ => continue,
        };

        if title_end.is_none() {
            title_end = Some(i);
        }

        let mut depth = 1u32;
        let start = i + open.len_utf8();
        let mut end = name.len();

        for (j, c) in chars.by_ref() {
            if c == open {
                depth += 1;
            } else if c == close {
                depth -= 1;
                if depth == 0 {
                    end = j;
                    break;
                }
            }
        }

        let content = name[start..end].trim().to_string();
        if !content.is_empty() {
            tags.push(make_tag(content));
        }
    }

    let title = match title_end {
        Some(pos) => name[..pos].trim_end().to_string(),
        None => name.trim().to_string(),
    };

    (title, tags)
}

/// Known region strings in No-Intro/Redump naming.
const KNOWN_REGIONS: &[&str] = &[
    "USA",
    "Japan",
    "Europe",
    "World",
    "Australia",
    "Korea",
    "China",
    "Taiwan",
    "Brazil",
    "France",
    "Germany",
    "Spain",
    "Italy",
    "Netherlands",
    "Sweden",
    "Norway",
    "Denmark",
    "Finland",
    "Portugal",
    "Russia",
    "Hong Kong",
    "Asia",
    "Canada",
    "Mexico",
    "United Kingdom",
    "Scandinavia",
    "Latin America",
];

fn is_region_string(s: &str) -> bool {
    s.split(',').all(|part| {
        let trimmed = part.trim();
        KNOWN_REGIONS
            .iter()
            .any(|r| r.eq_ignore_ascii_case(trimmed))
    })
}

fn classify_paren_tag(content: &str, result: &mut ParsedName) {
    if is_region_string(content) {
        for part in content.split(',') {
            let region = part.trim().to_string();
            if !result.regions.contains(&region) {
                result.regions.push(region);
            }
        }
        return;
    }

    if content.starts_with("Rev ") {
        result.revision = Some(content.to_string());
        return;
    }

    if (content.starts_with('v') || content.starts_with('V'))
        && content.len() > 1
        && content.as_bytes()[1].is_ascii_digit()
    {
        result.version = Some(content.to_string());
        return;
    }

    // "Disc 1", "Disc 1 - The Beginning"
    if let Some(rest) = content.strip_prefix("Disc ") {
        let number = rest.split(" - ").next().unwrap_or(rest).trim();
        if let Ok(n) = number.parse::<u32>() {
            result.disc_number = Some(n);
        }
        return;
    }

    if looks_like_language_list(content) {
        for lang in content.split(',') {
            result.languages.push(lang.trim().to_string());
        }
    }
}

/// Check if a string looks like a language list ("En,Fr,De").
fn looks_like_language_list(s: &str) -> bool {
    let parts: Vec<&str> = s.split(',').collect();
    // A lone code like "En" is ambiguous with other short tags.
    if parts.len() < 2 {
        return false;
    }
    parts.iter().all(|p| {
        let t = p.trim();
        (2..=3).contains(&t.len())
            && t.chars().next().is_some_and(|c| c.is_ascii_uppercase())
            && t.chars().skip(1).all(|c| c.is_ascii_lowercase())
    })
}

fn classify_bracket_tag(content: &str, result: &mut ParsedName) {
    match content {
        "!" => result.status = DumpStatus::Verified,
        "b" => result.status = DumpStatus::BadDump,
        "o" => result.status = DumpStatus::Overdump,
        _ => {}
    }
}

#[cfg(test)]
#[path = "tests/name_tests.rs"]
mod tests;
