// File: ./src/model/checklist.rs
// Parsing and rendering of single Markdown checklist lines.
use super::due::{DueDate, SUFFIX_SEPARATOR, parse_suffix};
use super::title_key;
use chrono::NaiveDate;

const OPEN_MARKER: &str = "- [ ]";
const DONE_MARKER: &str = "- [x]";

/// Byte length of the checkbox marker.
pub const MARKER_LEN: usize = 5;
/// Byte offset of the completion flag inside the marker (`- [` is 3 bytes).
pub const FLAG_OFFSET: usize = 3;

/// One checkbox entry read from a file. Rebuilt on every read, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecklistLine {
    pub completed: bool,
    pub text: String,
    pub due: Option<DueDate>,
    /// Position within the file when it was parsed.
    pub line_index: usize,
    /// The line exactly as read, used to find it again when patching.
    pub raw: String,
}

impl ChecklistLine {
    pub fn new(text: &str, completed: bool, due: Option<DueDate>) -> Self {
        let mut line = Self {
            completed,
            text: text.trim().to_string(),
            due,
            line_index: 0,
            raw: String::new(),
        };
        line.raw = line.encode();
        line
    }

    /// Returns `None` for anything that is not a `- [ ]` / `- [x]` line with text.
    ///
    /// A trailing ` – ...` is only treated as a due date when it parses; a
    /// separator followed by anything else stays part of the text.
    pub fn decode(raw: &str, line_index: usize, reference: NaiveDate) -> Option<Self> {
        let marker = raw.get(..MARKER_LEN)?;
        let completed = match marker {
            OPEN_MARKER => false,
            "- [x]" | "- [X]" => true,
            _ => return None,
        };

        let rest = &raw[MARKER_LEN..];
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            return None;
        }

        let (text, due) = split_suffix(rest, reference);
        if text.is_empty() {
            return None;
        }

        Some(Self {
            completed,
            text,
            due,
            line_index,
            raw: raw.to_string(),
        })
    }

    pub fn encode(&self) -> String {
        let marker = if self.completed {
            DONE_MARKER
        } else {
            OPEN_MARKER
        };
        let suffix = self.due.map(|d| d.to_suffix()).unwrap_or_default();
        format!("{} {}{}", marker, self.text, suffix)
    }

    /// Normalized title used to pair this line with a reminder.
    pub fn key(&self) -> String {
        title_key(&self.text)
    }

    /// `raw` with any parsed due-date suffix (and trailing whitespace) removed.
    pub fn raw_without_suffix(&self) -> &str {
        let trimmed = self.raw.trim_end();
        if self.due.is_some()
            && let Some(idx) = trimmed.rfind(SUFFIX_SEPARATOR)
        {
            return &trimmed[..idx];
        }
        trimmed
    }
}

fn split_suffix(rest: &str, reference: NaiveDate) -> (String, Option<DueDate>) {
    if let Some(idx) = rest.rfind(SUFFIX_SEPARATOR) {
        let head = rest[..idx].trim();
        if !head.is_empty()
            && let Some(due) = parse_suffix(&rest[idx..], reference)
        {
            return (head.to_string(), Some(due));
        }
    }
    (rest.trim().to_string(), None)
}

/// Decodes every checklist line of a document, keeping each line's index.
///
/// Lines are split on `\n` only, so indices match the byte arithmetic the
/// patcher uses.
pub fn decode_document(content: &str, reference: NaiveDate) -> Vec<ChecklistLine> {
    content
        .split('\n')
        .enumerate()
        .filter_map(|(idx, raw)| ChecklistLine::decode(raw, idx, reference))
        .collect()
}
