use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    /// UTF-16 code unit offset within the line.
    pub character: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub range: Range,
    pub new_text: String,
}

impl TextEdit {
    pub fn new(start: (u32, u32), end: (u32, u32), new_text: impl Into<String>) -> Self {
        Self {
            range: Range {
                start: Position {
                    line: start.0,
                    character: start.1,
                },
                end: Position {
                    line: end.0,
                    character: end.1,
                },
            },
            new_text: new_text.into(),
        }
    }
}

/// An edit that starts or ends more than one line past the end of the file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("edit at line {line} is past the end of the file ({line_count} lines)")]
pub struct EditOutOfRange {
    pub line: u32,
    pub line_count: usize,
}

/// Applies `edits` to `content` split on `\n`, joining the result back with `\n`.
pub fn apply_text_edits(content: &str, edits: &[TextEdit]) -> Result<String, EditOutOfRange> {
    let mut lines: Vec<String> = content.split('\n').map(str::to_string).collect();
    apply_text_edits_to_lines(&mut lines, edits)?;
    Ok(lines.join("\n"))
}

/// Orders edits bottom-up: descending start line, then descending start character.
///
/// The sort is stable, so edits sharing a start position keep their input order.
pub fn sort_bottom_up(edits: &[TextEdit]) -> Vec<&TextEdit> {
    let mut sorted: Vec<&TextEdit> = edits.iter().collect();
    sorted.sort_by(|a, b| b.range.start.cmp(&a.range.start));
    sorted
}

/// Applies every edit to `lines`, nearest the end of the file first.
///
/// Working bottom-up means no edit shifts the coordinates of an edit that has
/// not been applied yet, so the result does not depend on the order of
/// `edits` as long as their ranges do not overlap. Overlapping ranges are not
/// resolved: the outcome is whatever the bottom-up sequence produces.
///
/// Each edit replaces lines `start.line..=end.line` with
/// `prefix(start line) + new_text + suffix(end line)` split on `\n`; for a
/// single-line edit this is a splice inside that line. An edit may reach the
/// line just past the end of the file, which is created empty; anything
/// further is rejected before `lines` is touched.
pub fn apply_text_edits_to_lines(
    lines: &mut Vec<String>,
    edits: &[TextEdit],
) -> Result<(), EditOutOfRange> {
    let line_count = lines.len();
    if let Some(edit) = edits.iter().find(|e| {
        e.range.start.line as usize > line_count || e.range.end.line as usize > line_count
    }) {
        return Err(EditOutOfRange {
            line: edit.range.start.line.max(edit.range.end.line),
            line_count,
        });
    }

    for edit in sort_bottom_up(edits) {
        let start_line = edit.range.start.line as usize;
        let end_line = (edit.range.end.line as usize).max(start_line);
        if lines.len() <= end_line {
            lines.resize(end_line + 1, String::new());
        }

        let first = &lines[start_line];
        let last = &lines[end_line];
        let prefix_end = utf16_col_to_byte_idx(first, edit.range.start.character);
        let mut suffix_start = utf16_col_to_byte_idx(last, edit.range.end.character);
        if start_line == end_line {
            suffix_start = suffix_start.max(prefix_end);
        }

        let merged = format!(
            "{}{}{}",
            &first[..prefix_end],
            edit.new_text,
            &last[suffix_start..]
        );
        let replacement: Vec<String> = merged.split('\n').map(str::to_string).collect();
        lines.splice(start_line..=end_line, replacement);
    }
    Ok(())
}

fn utf16_col_to_byte_idx(line: &str, utf16_col: u32) -> usize {
    if utf16_col == 0 {
        return 0;
    }

    let mut units = 0u32;

    for (byte_idx, ch) in line.char_indices() {
        if units == utf16_col {
            return byte_idx;
        }

        units = units.saturating_add(ch.len_utf16() as u32);
        let end = byte_idx + ch.len_utf8();

        if units > utf16_col {
            // Avoid slicing in the middle of a Unicode scalar value.
            return end;
        }
    }

    line.len()
}
