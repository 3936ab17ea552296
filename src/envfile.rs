// SPDX-License-Identifier: MIT
//! Line-oriented `.env` reader.
//!
//! This is deliberately not a dotenv loader: loaders normalize away exactly
//! the mistakes keycheck exists to report. Parsing here keeps line numbers,
//! records format quirks (quoted values, spaces around `=`) instead of
//! silently absorbing them, and never fails on malformed content. Only an
//! unreadable file is an error.
//!
//! Diagnostics carry short excerpts built from the key side of a line only;
//! value text stays out of them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::redact;

/// Longest excerpt a diagnostic may carry.
const EXCERPT_MAX_CHARS: usize = 32;

#[derive(Debug, Error)]
pub enum EnvFileError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} is not a regular file", path.display())]
    NotAFile { path: PathBuf },
}

/// A parsed env file: every assignment found, in file order, plus the
/// lines that could not be parsed as assignments.
#[derive(Debug, Clone)]
pub struct EnvFile {
    pub path: Option<PathBuf>,
    pub entries: Vec<Entry>,
    pub diagnostics: Vec<Diagnostic>,
}

/// One `KEY=value` line, with the syntax oddities seen on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// 1-based line number.
    pub line: u32,
    pub key: String,
    /// Effective value: quotes stripped, padding trimmed. What a typical
    /// loader would hand the application.
    pub value: String,
    pub quirks: Vec<Quirk>,
}

/// A format oddity that still yields a usable value. Most loaders paper
/// over these; some don't, which is why they are worth reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quirk {
    /// Value wrapped in matching quotes. Pitfall #1 in the setup guide.
    QuotedValue { quote: char },
    /// Whitespace between the key and `=`, or between `=` and the value.
    /// Pitfall #2.
    SpaceAroundEquals,
    /// Shell-style `export KEY=...`.
    ExportPrefix,
    /// Trailing whitespace after the value.
    TrailingWhitespace,
}

/// A line that produced no entry at all, or an entry in conflict.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    /// 1-based line number the problem was seen on.
    pub line: u32,
    #[serde(flatten)]
    pub kind: DiagnosticKind,
    /// Short, value-free snippet locating the problem.
    pub excerpt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum DiagnosticKind {
    /// Non-blank, non-comment line with no `=` at all.
    MissingEquals,
    /// A line starting with `=`.
    EmptyKey,
    /// Key already assigned earlier in the file. The later value wins.
    DuplicateKey { first_line: u32 },
}

impl Quirk {
    pub fn describe(&self) -> String {
        match self {
            Quirk::QuotedValue { quote: '\'' } => "value wrapped in single quotes".to_string(),
            Quirk::QuotedValue { .. } => "value wrapped in double quotes".to_string(),
            Quirk::SpaceAroundEquals => "whitespace around '='".to_string(),
            Quirk::ExportPrefix => "'export' prefix (shell syntax)".to_string(),
            Quirk::TrailingWhitespace => "trailing whitespace after the value".to_string(),
        }
    }
}

impl DiagnosticKind {
    pub fn describe(&self) -> String {
        match self {
            DiagnosticKind::MissingEquals => "no '=' on this line".to_string(),
            DiagnosticKind::EmptyKey => "missing variable name before '='".to_string(),
            DiagnosticKind::DuplicateKey { first_line } => {
                format!("duplicate of line {first_line}; the later value wins")
            }
        }
    }
}

impl EnvFile {
    /// Read and parse a file. The only errors are an unreadable path or a
    /// path that is not a regular file; content problems surface as
    /// diagnostics, never as `Err`.
    pub fn read(path: &Path) -> Result<EnvFile, EnvFileError> {
        if path.exists() && !path.is_file() {
            return Err(EnvFileError::NotAFile {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path).map_err(|source| EnvFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut parsed = EnvFile::parse(&text);
        parsed.path = Some(path.to_path_buf());
        Ok(parsed)
    }

    /// Parse env-file text. Total: any input yields an `EnvFile`.
    pub fn parse(text: &str) -> EnvFile {
        // A UTF-8 BOM would otherwise glue itself onto the first key.
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let mut entries: Vec<Entry> = Vec::new();
        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        let mut first_seen: HashMap<String, u32> = HashMap::new();

        for (idx, raw_line) in text.split('\n').enumerate() {
            let line_no = idx as u32 + 1;
            // CRLF files show up whenever Windows was involved.
            let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let mut quirks: Vec<Quirk> = Vec::new();
            let mut body = trimmed;
            if let Some(rest) = body.strip_prefix("export") {
                if rest.starts_with(char::is_whitespace) {
                    quirks.push(Quirk::ExportPrefix);
                    body = rest.trim_start();
                }
            }

            let Some(eq) = body.find('=') else {
                diagnostics.push(Diagnostic {
                    line: line_no,
                    kind: DiagnosticKind::MissingEquals,
                    excerpt: excerpt_of(body),
                });
                continue;
            };

            let key_raw = &body[..eq];
            let value_raw = &body[eq + 1..];
            let key = key_raw.trim_end();
            if key.is_empty() {
                diagnostics.push(Diagnostic {
                    line: line_no,
                    kind: DiagnosticKind::EmptyKey,
                    excerpt: "=…".to_string(),
                });
                continue;
            }

            if key.len() != key_raw.len() || value_raw.starts_with(char::is_whitespace) {
                quirks.push(Quirk::SpaceAroundEquals);
            }

            let mut value = value_raw.trim_start();
            let unpadded = value.trim_end();
            if unpadded.len() != value.len() {
                quirks.push(Quirk::TrailingWhitespace);
                value = unpadded;
            }

            // Strip exactly one layer of matching quotes. An unmatched
            // quote is left in place; the shape check will flag the value.
            if value.chars().count() >= 2 {
                if let (Some(first), Some(last)) = (value.chars().next(), value.chars().last()) {
                    if (first == '"' || first == '\'') && first == last {
                        quirks.push(Quirk::QuotedValue { quote: first });
                        value = &value[1..value.len() - 1];
                    }
                }
            }

            if let Some(&first_line) = first_seen.get(key) {
                diagnostics.push(Diagnostic {
                    line: line_no,
                    kind: DiagnosticKind::DuplicateKey { first_line },
                    excerpt: key.to_string(),
                });
            } else {
                first_seen.insert(key.to_string(), line_no);
            }

            entries.push(Entry {
                line: line_no,
                key: key.to_string(),
                value: value.to_string(),
                quirks,
            });
        }

        EnvFile {
            path: None,
            entries,
            diagnostics,
        }
    }

    /// Last assignment of `key`, matching what loaders resolve when a
    /// key appears twice.
    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.iter().rev().find(|e| e.key == key)
    }
}

/// First token of an unparseable line, capped at [`EXCERPT_MAX_CHARS`].
/// If the token itself is shaped like a key, it is masked rather than
/// quoted: a missing `=` is exactly how a secret ends up alone on a line.
fn excerpt_of(body: &str) -> String {
    let mut tokens = body.split_whitespace();
    let token = tokens.next().unwrap_or("");
    let truncated = token.chars().count() > EXCERPT_MAX_CHARS;
    let mut out: String = token.chars().take(EXCERPT_MAX_CHARS).collect();
    if truncated || tokens.next().is_some() {
        out.push('…');
    }
    if redact::contains_secret_like(token) {
        return redact::mask_key(token);
    }
    out
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry<'a>(file: &'a EnvFile, key: &str) -> &'a Entry {
        file.get(key).unwrap_or_else(|| panic!("missing entry {key}"))
    }

    #[test]
    fn clean_file_parses_without_noise() {
        let file = EnvFile::parse(
            "# AI provider credentials\n\
             HUGGINGFACE_API_KEY=hf_AbCdEfGhIjKlMnOp\n\
             \n\
             OPENAI_API_KEY=sk-proj-AbCdEfGhIjKlMnOp\n",
        );
        assert_eq!(file.entries.len(), 2);
        assert!(file.diagnostics.is_empty());
        let hf = entry(&file, "HUGGINGFACE_API_KEY");
        assert_eq!(hf.line, 2);
        assert_eq!(hf.value, "hf_AbCdEfGhIjKlMnOp");
        assert!(hf.quirks.is_empty());
    }

    #[test]
    fn quoted_value_yields_quirk_and_stripped_value() {
        let file = EnvFile::parse("OPENAI_API_KEY=\"sk-proj-AbCdEfGh\"\n");
        let e = entry(&file, "OPENAI_API_KEY");
        assert_eq!(e.value, "sk-proj-AbCdEfGh");
        assert_eq!(e.quirks, vec![Quirk::QuotedValue { quote: '"' }]);

        let file = EnvFile::parse("OPENAI_API_KEY='sk-proj-AbCdEfGh'\n");
        let e = entry(&file, "OPENAI_API_KEY");
        assert_eq!(e.value, "sk-proj-AbCdEfGh");
        assert_eq!(e.quirks, vec![Quirk::QuotedValue { quote: '\'' }]);
    }

    #[test]
    fn only_one_quote_layer_is_stripped() {
        let file = EnvFile::parse("K=\"\"inner\"\"\n");
        assert_eq!(entry(&file, "K").value, "\"inner\"");
    }

    #[test]
    fn unmatched_quote_is_kept() {
        let file = EnvFile::parse("K=\"sk-proj-AbCdEfGh\n");
        let e = entry(&file, "K");
        assert_eq!(e.value, "\"sk-proj-AbCdEfGh");
        assert!(e.quirks.is_empty());
    }

    #[test]
    fn space_around_equals_is_a_quirk_not_an_error() {
        let file = EnvFile::parse("OPENAI_API_KEY = sk-proj-AbCdEfGh\n");
        let e = entry(&file, "OPENAI_API_KEY");
        assert_eq!(e.key, "OPENAI_API_KEY");
        assert_eq!(e.value, "sk-proj-AbCdEfGh");
        assert_eq!(e.quirks, vec![Quirk::SpaceAroundEquals]);
    }

    #[test]
    fn space_only_after_equals_still_flagged() {
        let file = EnvFile::parse("K= v\n");
        assert_eq!(entry(&file, "K").quirks, vec![Quirk::SpaceAroundEquals]);
    }

    #[test]
    fn export_prefix_detected_and_stripped() {
        let file = EnvFile::parse("export OPENAI_API_KEY=sk-proj-AbCdEfGh\n");
        let e = entry(&file, "OPENAI_API_KEY");
        assert_eq!(e.value, "sk-proj-AbCdEfGh");
        assert_eq!(e.quirks, vec![Quirk::ExportPrefix]);
    }

    #[test]
    fn key_literally_named_export_is_not_a_quirk() {
        let file = EnvFile::parse("export=1\n");
        let e = entry(&file, "export");
        assert_eq!(e.value, "1");
        assert!(e.quirks.is_empty());
    }

    #[test]
    fn trailing_whitespace_flagged_and_trimmed() {
        let file = EnvFile::parse("K=value   \n");
        let e = entry(&file, "K");
        assert_eq!(e.value, "value");
        assert_eq!(e.quirks, vec![Quirk::TrailingWhitespace]);
    }

    #[test]
    fn quoted_spaces_survive_inside_quotes() {
        // Quote stripping happens after padding trim, so inner spaces stay.
        let file = EnvFile::parse("K=\" spaced \"\n");
        let e = entry(&file, "K");
        assert_eq!(e.value, " spaced ");
        assert_eq!(e.quirks, vec![Quirk::QuotedValue { quote: '"' }]);
    }

    #[test]
    fn value_may_contain_equals_signs() {
        let file = EnvFile::parse("K=abc=def==\n");
        assert_eq!(entry(&file, "K").value, "abc=def==");
    }

    #[test]
    fn empty_value_is_an_entry() {
        let file = EnvFile::parse("OPENAI_API_KEY=\n");
        let e = entry(&file, "OPENAI_API_KEY");
        assert_eq!(e.value, "");
        assert!(e.quirks.is_empty());
    }

    #[test]
    fn missing_equals_is_diagnosed_with_key_excerpt() {
        let file = EnvFile::parse("OPENAI_API_KEY sk-proj-AbCdEfGh\n");
        assert!(file.entries.is_empty());
        assert_eq!(file.diagnostics.len(), 1);
        let d = &file.diagnostics[0];
        assert_eq!(d.line, 1);
        assert_eq!(d.kind, DiagnosticKind::MissingEquals);
        assert_eq!(d.excerpt, "OPENAI_API_KEY…");
    }

    #[test]
    fn missing_equals_excerpt_never_leaks_a_bare_secret() {
        let secret = "sk-proj-AbCdEfGhIjKlMnOpQrStUvWxYz0123456789";
        let file = EnvFile::parse(&format!("{secret}\n"));
        let d = &file.diagnostics[0];
        assert_eq!(d.kind, DiagnosticKind::MissingEquals);
        assert!(!d.excerpt.contains("AbCdEfGhIjKl"), "excerpt: {}", d.excerpt);
        assert!(d.excerpt.starts_with("sk-proj-…"));
    }

    #[test]
    fn missing_equals_excerpt_masks_custom_prefix_keys() {
        // Providers added via keycheck.toml use prefixes no builtin
        // pattern knows; their keys get the same excerpt masking.
        let secret = "mst-AbCdEfGhIjKlMnOpQrStUvWx";
        let file = EnvFile::parse(&format!("{secret}\n"));
        let d = &file.diagnostics[0];
        assert_eq!(d.kind, DiagnosticKind::MissingEquals);
        assert!(!d.excerpt.contains("AbCdEfGh"), "excerpt: {}", d.excerpt);
        assert!(!redact::contains_secret_like(&d.excerpt));
    }

    #[test]
    fn empty_key_diagnosed_without_value_text() {
        let file = EnvFile::parse("=sk-proj-AbCdEfGh\n");
        assert!(file.entries.is_empty());
        let d = &file.diagnostics[0];
        assert_eq!(d.kind, DiagnosticKind::EmptyKey);
        assert_eq!(d.excerpt, "=…");
    }

    #[test]
    fn duplicate_key_reports_both_lines_and_last_wins() {
        let file = EnvFile::parse("K=first\nX=1\nK=second\n");
        assert_eq!(entry(&file, "K").value, "second");
        assert_eq!(file.diagnostics.len(), 1);
        let d = &file.diagnostics[0];
        assert_eq!(d.line, 3);
        assert_eq!(d.kind, DiagnosticKind::DuplicateKey { first_line: 1 });
        assert_eq!(d.excerpt, "K");
    }

    #[test]
    fn triple_duplicate_points_at_the_first() {
        let file = EnvFile::parse("K=a\nK=b\nK=c\n");
        assert_eq!(file.diagnostics.len(), 2);
        for d in &file.diagnostics {
            assert_eq!(d.kind, DiagnosticKind::DuplicateKey { first_line: 1 });
        }
        assert_eq!(entry(&file, "K").value, "c");
    }

    #[test]
    fn crlf_line_endings_are_invisible() {
        let file = EnvFile::parse("A=1\r\nB=2\r\n");
        assert_eq!(entry(&file, "A").value, "1");
        assert_eq!(entry(&file, "B").value, "2");
        assert!(entry(&file, "B").quirks.is_empty());
        assert!(file.diagnostics.is_empty());
    }

    #[test]
    fn bom_does_not_corrupt_first_key() {
        let file = EnvFile::parse("\u{feff}A=1\n");
        assert_eq!(entry(&file, "A").value, "1");
    }

    #[test]
    fn comments_and_blanks_are_skipped_without_diagnostics() {
        let file = EnvFile::parse("   \n# note\n  # indented note\n\n");
        assert!(file.entries.is_empty());
        assert!(file.diagnostics.is_empty());
    }

    #[test]
    fn read_missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = EnvFile::read(&dir.path().join("nope.env")).unwrap_err();
        assert!(err.to_string().contains("nope.env"));
    }

    #[test]
    fn read_directory_is_not_a_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = EnvFile::read(dir.path()).unwrap_err();
        assert!(matches!(err, EnvFileError::NotAFile { .. }), "{err}");
    }

    #[test]
    fn read_parses_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(".env");
        std::fs::write(&path, "A=1\n").expect("write");
        let file = EnvFile::read(&path).expect("read");
        assert_eq!(file.path.as_deref(), Some(path.as_path()));
        assert_eq!(entry(&file, "A").value, "1");
    }

    proptest! {
        #[test]
        fn parse_is_total(text in any::<String>()) {
            let _ = EnvFile::parse(&text);
        }

        #[test]
        fn entry_lines_strictly_increase(text in any::<String>()) {
            let file = EnvFile::parse(&text);
            for pair in file.entries.windows(2) {
                prop_assert!(pair[0].line < pair[1].line);
            }
        }

        #[test]
        fn values_never_keep_symmetric_outer_quotes(key in "[A-Z_]{1,8}", inner in "[a-z0-9]{0,12}") {
            let file = EnvFile::parse(&format!("{key}=\"{inner}\"\n"));
            let e = file.get(&key).expect("entry");
            prop_assert_eq!(e.value.as_str(), inner.as_str());
        }
    }
}
