//! Line-diff kernel (C2): a symmetric LCS-style line diff over two byte
//! sequences, a minimal unified-diff formatter, and summary statistics.
//! Binary content short-circuits to a byte-size comparison; identical
//! inputs short-circuit before line decoding even happens.

use std::fmt::Write as _;

use similar::{Algorithm, ChangeTag, TextDiff};

use crate::config::RepoConfig;
use crate::hash::is_binary;

/// Which side(s) of a diffed line number are populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineNo {
    pub old: Option<usize>,
    pub new: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Context,
    Removed,
    Added,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub kind: LineKind,
    pub line: String,
    pub line_no: LineNo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiffSummary {
    pub added: usize,
    pub removed: usize,
    pub context: usize,
    pub changed: usize,
}

/// The outcome of diffing two byte sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileDiff {
    /// `old == new` byte-for-byte; checked before any line decoding.
    Identical,
    /// Either side was classified binary; compared by size only.
    Binary { old_size: usize, new_size: usize },
    Text {
        lines: Vec<DiffLine>,
        summary: DiffSummary,
    },
}

const CONTEXT: usize = 3;

/// Diff two byte sequences, short-circuiting on byte equality or binary
/// content before line-level work happens.
pub fn diff_bytes(old: &[u8], new: &[u8], name: Option<&str>, config: &RepoConfig) -> FileDiff {
    if old == new {
        return FileDiff::Identical;
    }
    if is_binary(old, name, config) || is_binary(new, name, config) {
        return FileDiff::Binary {
            old_size: old.len(),
            new_size: new.len(),
        };
    }

    let old_text = crate::hash::utf8_decode_lossy(old);
    let new_text = crate::hash::utf8_decode_lossy(new);
    let (lines, summary) = diff_lines(&old_text, &new_text);
    FileDiff::Text { lines, summary }
}

/// Diff two line sequences (already split), returning every line tagged
/// with its kind and original line numbers plus aggregate counts.
fn diff_lines(old_text: &str, new_text: &str) -> (Vec<DiffLine>, DiffSummary) {
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_lines(old_text, new_text);

    let mut lines = Vec::new();
    let mut summary = DiffSummary::default();
    let mut old_no = 1usize;
    let mut new_no = 1usize;

    for change in diff.iter_all_changes() {
        let text = change.value().trim_end_matches(['\r', '\n']).to_string();
        match change.tag() {
            ChangeTag::Equal => {
                lines.push(DiffLine {
                    kind: LineKind::Context,
                    line: text,
                    line_no: LineNo {
                        old: Some(old_no),
                        new: Some(new_no),
                    },
                });
                summary.context += 1;
                old_no += 1;
                new_no += 1;
            }
            ChangeTag::Delete => {
                lines.push(DiffLine {
                    kind: LineKind::Removed,
                    line: text,
                    line_no: LineNo {
                        old: Some(old_no),
                        new: None,
                    },
                });
                summary.removed += 1;
                old_no += 1;
            }
            ChangeTag::Insert => {
                lines.push(DiffLine {
                    kind: LineKind::Added,
                    line: text,
                    line_no: LineNo {
                        old: None,
                        new: Some(new_no),
                    },
                });
                summary.added += 1;
                new_no += 1;
            }
        }
    }
    summary.changed = summary.added + summary.removed;
    (lines, summary)
}

/// Render a minimal unified diff from the tagged line list: context lines
/// only appear adjacent to a change, grouped into `@@ -a,b +c,d @@` hunks.
pub fn format_unified(lines: &[DiffLine]) -> String {
    let mut out = String::new();
    let mut i = 0;
    while i < lines.len() {
        if lines[i].kind == LineKind::Context {
            i += 1;
            continue;
        }

        // Walk backwards to include up to CONTEXT leading context lines.
        let mut start = i;
        let mut leading = 0;
        while start > 0 && leading < CONTEXT && lines[start - 1].kind == LineKind::Context {
            start -= 1;
            leading += 1;
        }

        // Walk forward through the change run, absorbing short context gaps.
        let mut end = i;
        loop {
            while end < lines.len() && lines[end].kind != LineKind::Context {
                end += 1;
            }
            // Count the run of context lines here; if it's short enough to
            // be "between two changes", swallow it and keep scanning.
            let mut gap = 0;
            while end + gap < lines.len() && lines[end + gap].kind == LineKind::Context {
                gap += 1;
            }
            if end + gap < lines.len() && gap <= CONTEXT * 2 {
                end += gap;
                continue;
            }
            break;
        }
        let trailing_end = (end + CONTEXT).min(lines.len());
        let hunk = &lines[start..trailing_end];
        write_hunk(&mut out, hunk);
        i = trailing_end;
    }
    out
}

fn write_hunk(out: &mut String, hunk: &[DiffLine]) {
    let old_first = hunk.iter().find_map(|l| l.line_no.old);
    let new_first = hunk.iter().find_map(|l| l.line_no.new);
    let old_count = hunk.iter().filter(|l| l.line_no.old.is_some()).count();
    let new_count = hunk.iter().filter(|l| l.line_no.new.is_some()).count();

    let _ = writeln!(
        out,
        "@@ -{},{} +{},{} @@",
        old_first.unwrap_or(0),
        old_count,
        new_first.unwrap_or(0),
        new_count
    );
    for line in hunk {
        let prefix = match line.kind {
            LineKind::Context => ' ',
            LineKind::Removed => '-',
            LineKind::Added => '+',
        };
        let _ = writeln!(out, "{prefix}{}", line.line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_short_circuits() {
        let config = RepoConfig::default();
        let diff = diff_bytes(b"same\n", b"same\n", None, &config);
        assert_eq!(diff, FileDiff::Identical);
    }

    #[test]
    fn binary_short_circuits_to_size_comparison() {
        let config = RepoConfig::default();
        let old = vec![0u8, 1, 2, 3];
        let new = vec![0u8, 1, 2, 3, 4, 5];
        let diff = diff_bytes(&old, &new, None, &config);
        assert_eq!(
            diff,
            FileDiff::Binary {
                old_size: 4,
                new_size: 6
            }
        );
    }

    #[test]
    fn text_diff_reports_added_and_removed() {
        let config = RepoConfig::default();
        let old = b"a\nb\nc\n";
        let new = b"a\nB\nc\nd\n";
        match diff_bytes(old, new, Some("f.txt"), &config) {
            FileDiff::Text { summary, lines } => {
                assert_eq!(summary.added, 2); // "B" and "d"
                assert_eq!(summary.removed, 1); // "b"
                assert_eq!(summary.context, 2); // "a" and "c"
                let unified = format_unified(&lines);
                assert!(unified.contains("-b"));
                assert!(unified.contains("+B"));
                assert!(unified.contains("+d"));
                assert!(unified.contains("@@"));
            }
            other => panic!("expected text diff, got {other:?}"),
        }
    }

    #[test]
    fn unified_diff_keeps_context_only_near_changes() {
        let config = RepoConfig::default();
        let old_lines: Vec<String> = (0..20).map(|i| format!("line{i}")).collect();
        let mut new_lines = old_lines.clone();
        new_lines[10] = "CHANGED".to_string();
        let old = old_lines.join("\n") + "\n";
        let new = new_lines.join("\n") + "\n";

        match diff_bytes(old.as_bytes(), new.as_bytes(), None, &config) {
            FileDiff::Text { lines, .. } => {
                let unified = format_unified(&lines);
                // Far-away unrelated lines should not appear in the hunk.
                assert!(!unified.contains("line0\n"));
                assert!(unified.contains("-line10"));
                assert!(unified.contains("+CHANGED"));
            }
            other => panic!("expected text diff, got {other:?}"),
        }
    }
}
