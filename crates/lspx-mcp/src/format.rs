//! Plain-text rendering of protocol results for the calling agent.

use std::fmt::Write as _;
use std::str::FromStr;

use lspx_lsp::{AnyLocation, LspDiagnostic, uri_to_path};
use serde_json::Value;

pub(crate) const MAX_REFERENCES: usize = 200;

/// `path:line:col`, 1-based. Non-file URIs are printed as-is.
pub(crate) fn format_location(location: &AnyLocation) -> String {
    let start = location.range().start;
    let target = match uri_to_path(location.uri()) {
        Ok(path) => path.display().to_string(),
        Err(_) => location.uri().to_string(),
    };
    format!(
        "{target}:{}:{}",
        start.line.saturating_add(1),
        start.character.saturating_add(1)
    )
}

pub(crate) fn format_definitions(locations: &[AnyLocation]) -> String {
    if locations.is_empty() {
        return "No definition found".to_string();
    }
    locations
        .iter()
        .map(format_location)
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn format_references(locations: &[AnyLocation]) -> String {
    if locations.is_empty() {
        return "No references found".to_string();
    }
    let mut out = String::new();
    for location in locations.iter().take(MAX_REFERENCES) {
        out.push_str(&format_location(location));
        out.push('\n');
    }
    if locations.len() > MAX_REFERENCES {
        let _ = writeln!(out, "... and {} more", locations.len() - MAX_REFERENCES);
    }
    out.truncate(out.trim_end().len());
    out
}

pub(crate) fn severity_label(severity: Option<u32>) -> String {
    match severity {
        Some(1) => "error".to_string(),
        Some(2) => "warning".to_string(),
        Some(3) => "information".to_string(),
        Some(4) => "hint".to_string(),
        Some(other) => format!("unknown({other})"),
        None => "unknown".to_string(),
    }
}

/// `severity[source](code) at line:col: message`; absent parts are omitted.
pub(crate) fn format_diagnostic(diagnostic: &LspDiagnostic) -> String {
    let mut out = severity_label(diagnostic.severity);
    if let Some(source) = diagnostic.source.as_deref().filter(|s| !s.is_empty()) {
        let _ = write!(out, "[{source}]");
    }
    match &diagnostic.code {
        Some(Value::String(code)) => {
            let _ = write!(out, "({code})");
        }
        Some(Value::Number(code)) => {
            let _ = write!(out, "({code})");
        }
        _ => {}
    }
    let start = diagnostic.range.start;
    let _ = write!(
        out,
        " at {}:{}: {}",
        start.line.saturating_add(1),
        start.character.saturating_add(1),
        diagnostic.message
    );
    out
}

pub(crate) fn format_diagnostics(diagnostics: &[LspDiagnostic], filter: SeverityFilter) -> String {
    let lines: Vec<String> = diagnostics
        .iter()
        .filter(|d| filter.matches(d.severity))
        .map(format_diagnostic)
        .collect();
    if lines.is_empty() {
        return "No diagnostics found".to_string();
    }
    lines.join("\n")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SeverityFilter {
    #[default]
    All,
    Error,
    Warning,
    Information,
    Hint,
}

impl SeverityFilter {
    fn matches(self, severity: Option<u32>) -> bool {
        match self {
            SeverityFilter::All => true,
            SeverityFilter::Error => severity == Some(1),
            SeverityFilter::Warning => severity == Some(2),
            SeverityFilter::Information => severity == Some(3),
            SeverityFilter::Hint => severity == Some(4),
        }
    }
}

impl FromStr for SeverityFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(SeverityFilter::All),
            "error" => Ok(SeverityFilter::Error),
            "warning" => Ok(SeverityFilter::Warning),
            "information" | "info" => Ok(SeverityFilter::Information),
            "hint" => Ok(SeverityFilter::Hint),
            other => Err(format!(
                "unknown severity filter '{other}' (expected error, warning, information, hint or all)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn location(uri: &str, line: u32, character: u32) -> AnyLocation {
        serde_json::from_value(json!({
            "uri": uri,
            "range": {
                "start": { "line": line, "character": character },
                "end": { "line": line, "character": character + 1 }
            }
        }))
        .unwrap()
    }

    fn diagnostic(value: Value) -> LspDiagnostic {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn locations_render_one_based() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lib.rs");
        let uri = lspx_lsp::path_to_uri(&file).unwrap();
        let rendered = format_location(&location(&uri, 9, 4));
        assert_eq!(rendered, format!("{}:10:5", file.display()));
    }

    #[test]
    fn location_links_use_the_target_range() {
        let link: AnyLocation = serde_json::from_value(json!({
            "targetUri": "untitled:Untitled-1",
            "targetRange": { "start": { "line": 0, "character": 0 }, "end": { "line": 8, "character": 1 } },
            "targetSelectionRange": { "start": { "line": 2, "character": 3 }, "end": { "line": 2, "character": 6 } }
        }))
        .unwrap();
        assert_eq!(format_location(&link), "untitled:Untitled-1:1:1");
    }

    #[test]
    fn empty_results_have_fixed_text() {
        assert_eq!(format_definitions(&[]), "No definition found");
        assert_eq!(format_references(&[]), "No references found");
        assert_eq!(
            format_diagnostics(&[], SeverityFilter::All),
            "No diagnostics found"
        );
    }

    #[test]
    fn references_are_capped() {
        let locations: Vec<AnyLocation> = (0..205)
            .map(|i| location("untitled:refs", i, 0))
            .collect();
        let text = format_references(&locations);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), MAX_REFERENCES + 1);
        assert_eq!(lines[0], "untitled:refs:1:1");
        assert_eq!(lines[MAX_REFERENCES], "... and 5 more");
    }

    #[test]
    fn diagnostic_parts_are_optional() {
        let full = diagnostic(json!({
            "range": { "start": { "line": 3, "character": 0 }, "end": { "line": 3, "character": 5 } },
            "severity": 1,
            "source": "rustc",
            "code": "E0425",
            "message": "cannot find value `x`"
        }));
        assert_eq!(
            format_diagnostic(&full),
            "error[rustc](E0425) at 4:1: cannot find value `x`"
        );

        let numeric = diagnostic(json!({
            "range": { "start": { "line": 0, "character": 2 }, "end": { "line": 0, "character": 5 } },
            "severity": 2,
            "code": 6133,
            "message": "unused"
        }));
        assert_eq!(format_diagnostic(&numeric), "warning(6133) at 1:3: unused");

        let bare = diagnostic(json!({
            "range": { "start": { "line": 0, "character": 0 }, "end": { "line": 0, "character": 1 } },
            "message": "something"
        }));
        assert_eq!(format_diagnostic(&bare), "unknown at 1:1: something");
    }

    #[test]
    fn severity_filter_selects_matching_entries() {
        let diags = vec![
            diagnostic(json!({
                "range": { "start": { "line": 0, "character": 0 }, "end": { "line": 0, "character": 1 } },
                "severity": 1,
                "message": "bad"
            })),
            diagnostic(json!({
                "range": { "start": { "line": 1, "character": 0 }, "end": { "line": 1, "character": 1 } },
                "severity": 4,
                "message": "meh"
            })),
        ];
        let filter: SeverityFilter = "Error".parse().unwrap();
        assert_eq!(format_diagnostics(&diags, filter), "error at 1:1: bad");
        assert_eq!(
            format_diagnostics(&diags, "all".parse().unwrap()).lines().count(),
            2
        );
        assert!("fatal".parse::<SeverityFilter>().is_err());
    }
}
