//! Résumé section parsing and reassembly.
//!
//! A document is split into named sections by header lines. Reassembly writes
//! sections back in canonical order, so replacing one section leaves every other
//! section's content byte-for-byte unchanged.

use serde::{Deserialize, Serialize};

/// Pseudo-section holding everything above the first recognised header
/// (name, contact line). Never offered as a resolvable section.
pub const HEADER_SECTION: &str = "HEADER";

/// Known section headers, in the order they are written back out.
/// Sections not in this list are appended afterwards in document order.
pub const CANONICAL_ORDER: &[&str] = &[
    "SUMMARY",
    "OBJECTIVE",
    "PROFILE",
    "EXPERIENCE",
    "WORK EXPERIENCE",
    "EMPLOYMENT",
    "EDUCATION",
    "ACADEMIC BACKGROUND",
    "SKILLS",
    "TECHNICAL SKILLS",
    "COMPETENCIES",
    "PROJECTS",
    "PORTFOLIO",
    "CERTIFICATIONS",
    "CERTIFICATES",
    "AWARDS",
    "ACHIEVEMENTS",
    "HONORS",
];

/// Header lines longer than this are treated as body text.
const MAX_HEADER_LEN: usize = 50;
const MIN_CUSTOM_HEADER_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub content: String,
}

/// Ordered, name-unique list of sections in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sections(Vec<Section>);

#[derive(Debug, PartialEq)]
enum LineKind<'a> {
    Header {
        name: String,
        inline: Option<&'a str>,
    },
    Rule,
    Text,
}

impl Sections {
    /// Splits `text` into sections.
    ///
    /// Recognised header forms:
    /// - a line that is exactly a known header, optionally `#`-prefixed or `:`-suffixed
    /// - `HEADER: inline content` for a known header
    /// - an all-caps line ending in `:` (non-standard section)
    pub fn parse(text: &str) -> Self {
        let mut sections = Sections::default();
        let mut current = HEADER_SECTION.to_string();
        let mut buffer: Vec<&str> = Vec::new();

        let lines: Vec<&str> = text.lines().collect();
        for (i, line) in lines.iter().copied().enumerate() {
            let underlined = lines
                .get(i + 1)
                .is_some_and(|next| classify_line(next) == LineKind::Rule);
            let kind = match classify_line(line) {
                LineKind::Text if underlined => underlined_header(line).unwrap_or(LineKind::Text),
                kind => kind,
            };
            match kind {
                LineKind::Header { name, inline } => {
                    sections.absorb(&current, &buffer);
                    buffer.clear();
                    current = name;
                    if let Some(inline) = inline {
                        buffer.push(inline);
                    }
                }
                LineKind::Rule => {}
                LineKind::Text => buffer.push(line),
            }
        }
        sections.absorb(&current, &buffer);

        sections
    }

    /// Section names a user can target, in document order (excludes `HEADER`).
    pub fn headers(&self) -> Vec<String> {
        self.0
            .iter()
            .filter(|s| s.name != HEADER_SECTION)
            .map(|s| s.name.clone())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.content.as_str())
    }

    /// Replaces the content of an existing section. Returns false if absent.
    pub fn replace(&mut self, name: &str, content: &str) -> bool {
        match self.0.iter_mut().find(|s| s.name == name) {
            Some(section) => {
                section.content = content.trim().to_string();
                true
            }
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reassembles the document: header block, canonical sections, then the rest.
    pub fn render(&self) -> String {
        let mut blocks: Vec<String> = Vec::new();

        if let Some(header) = self.get(HEADER_SECTION) {
            if !header.is_empty() {
                blocks.push(header.to_string());
            }
        }

        for name in CANONICAL_ORDER {
            if let Some(section) = self.0.iter().find(|s| s.name == *name) {
                blocks.push(render_block(section));
            }
        }

        for section in self
            .0
            .iter()
            .filter(|s| s.name != HEADER_SECTION && !CANONICAL_ORDER.contains(&s.name.as_str()))
        {
            blocks.push(render_block(section));
        }

        blocks.join("\n\n")
    }

    fn absorb(&mut self, name: &str, lines: &[&str]) {
        let content = lines.join("\n").trim().to_string();
        if content.is_empty() && name == HEADER_SECTION {
            return;
        }
        match self.0.iter_mut().find(|s| s.name == name) {
            // A repeated header continues the earlier section.
            Some(existing) => {
                if !content.is_empty() {
                    if !existing.content.is_empty() {
                        existing.content.push('\n');
                    }
                    existing.content.push_str(&content);
                }
            }
            None => self.0.push(Section {
                name: name.to_string(),
                content,
            }),
        }
    }
}

fn render_block(section: &Section) -> String {
    let underline = "=".repeat(section.name.chars().count());
    if section.content.is_empty() {
        format!("{}\n{}", section.name, underline)
    } else {
        format!("{}\n{}\n{}", section.name, underline, section.content)
    }
}

/// An all-caps line sitting on an `====` rule, as written by `render`.
fn underlined_header(line: &str) -> Option<LineKind<'_>> {
    let bare = line.trim().trim_end_matches(':').trim();
    let letters = bare.chars().filter(|c| c.is_alphabetic()).count();
    let all_caps = bare
        .chars()
        .filter(|c| c.is_alphabetic())
        .all(|c| c.is_uppercase());
    (letters >= MIN_CUSTOM_HEADER_LEN && all_caps && bare.len() <= MAX_HEADER_LEN).then(|| {
        LineKind::Header {
            name: bare.to_string(),
            inline: None,
        }
    })
}

fn classify_line(line: &str) -> LineKind<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineKind::Text;
    }
    if trimmed.len() >= 3 && (trimmed.chars().all(|c| c == '=') || trimmed.chars().all(|c| c == '-'))
    {
        return LineKind::Rule;
    }

    let candidate = trimmed.trim_start_matches('#').trim();

    // "SUMMARY: Seasoned engineer ...": known header with inline content
    if let Some((head, rest)) = candidate.split_once(':') {
        let head_upper = head.trim().to_uppercase();
        let rest = rest.trim();
        if !rest.is_empty() && CANONICAL_ORDER.contains(&head_upper.as_str()) {
            return LineKind::Header {
                name: head_upper,
                inline: Some(rest),
            };
        }
    }

    if candidate.len() > MAX_HEADER_LEN {
        return LineKind::Text;
    }

    let bare = candidate.trim_end_matches(':').trim();
    let upper = bare.to_uppercase();
    if CANONICAL_ORDER.contains(&upper.as_str()) {
        return LineKind::Header {
            name: upper,
            inline: None,
        };
    }

    let has_letters = bare.chars().filter(|c| c.is_alphabetic()).count() >= MIN_CUSTOM_HEADER_LEN;
    let all_caps = bare
        .chars()
        .filter(|c| c.is_alphabetic())
        .all(|c| c.is_uppercase());
    if candidate.ends_with(':') && has_letters && all_caps {
        return LineKind::Header {
            name: upper,
            inline: None,
        };
    }

    LineKind::Text
}
