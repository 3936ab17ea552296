// SPDX-License-Identifier: MIT
//! Static key detection.
//!
//! `scan` resolves each registered provider's key from the process
//! environment and the `.env` file, classifies what it finds, and folds the
//! results into a scored report. No network traffic; `probe` builds on the
//! same resolution when live verification is wanted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::envfile::{Diagnostic, EnvFile, Quirk};
use crate::providers::{self, KeyShape, ProviderSpec};
use crate::redact;

/// Score deduction per unparseable or conflicting file line.
const DIAGNOSTIC_PENALTY: u32 = 5;

/// Where a value can come from. How the resolver reads the process
/// environment is abstracted so tests never mutate global state.
pub trait EnvLookup {
    fn get(&self, key: &str) -> Option<String>;
}

/// The real process environment.
pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvLookup for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// Where the effective value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum KeySource {
    /// Exported in the process environment. Wins over the file, same as it
    /// does for every SDK that reads the environment first.
    ProcessEnv,
    /// Assigned in the env file.
    EnvFile { line: u32 },
    /// Not found anywhere.
    Absent,
}

/// Verdict for one provider's key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    /// Present and plausible. Not proof the key is live.
    Ok,
    /// Not set anywhere, or set to an empty value.
    Missing,
    /// Still carries a stand-in value from a template.
    Placeholder,
    /// Set to something that cannot be a real key for this provider.
    Malformed,
    /// Plausible value with file-syntax quirks that strict loaders reject.
    FormatQuirk,
}

impl KeyStatus {
    pub fn penalty(&self) -> u32 {
        match self {
            KeyStatus::Ok => 0,
            KeyStatus::Missing => 20,
            KeyStatus::Placeholder => 20,
            KeyStatus::Malformed => 10,
            KeyStatus::FormatQuirk => 5,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            KeyStatus::Ok => "ok",
            KeyStatus::Missing => "missing",
            KeyStatus::Placeholder => "placeholder",
            KeyStatus::Malformed => "malformed",
            KeyStatus::FormatQuirk => "format quirk",
        }
    }
}

/// One row of the scan report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyFinding {
    pub provider: String,
    pub env_var: String,
    pub source: KeySource,
    pub status: KeyStatus,
    /// Masked value for display. Placeholders appear verbatim (they are
    /// not secrets and seeing one is the remediation cue); real-looking
    /// values are reduced to prefix and tail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub masked: Option<String>,
    pub detail: String,
}

/// Result of one full static scan.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    /// 100 minus penalties, floored at 0.
    pub score: u8,
    /// The env file that was consulted (or would have been).
    pub env_file: PathBuf,
    pub env_file_found: bool,
    pub findings: Vec<KeyFinding>,
    pub file_diagnostics: Vec<Diagnostic>,
    pub generated_at: DateTime<Utc>,
}

impl ScanReport {
    /// Clean means every key is `Ok` and the file parsed without noise.
    /// Drives the process exit code.
    pub fn is_clean(&self) -> bool {
        self.findings.iter().all(|f| f.status == KeyStatus::Ok) && self.file_diagnostics.is_empty()
    }

    pub fn failed_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.status != KeyStatus::Ok)
            .count()
    }
}

// ─── Resolution ───────────────────────────────────────────────────────────────

/// A resolved value, before classification.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub value: Option<String>,
    pub source: KeySource,
    /// Quirks on the effective file entry. Empty unless the value came
    /// from the file.
    pub quirks: Vec<Quirk>,
    /// File entry overridden by the process environment, if any.
    pub shadowed: Option<ShadowedEntry>,
}

#[derive(Debug, Clone)]
pub struct ShadowedEntry {
    pub line: u32,
    /// The file holds a different value than the environment.
    pub differs: bool,
    pub quirky: bool,
}

/// Resolve one provider's key. Process environment wins over the file.
pub fn resolve(spec: &ProviderSpec, file: Option<&EnvFile>, env: &dyn EnvLookup) -> Resolved {
    let file_entry = file.and_then(|f| f.get(&spec.env_var));
    if let Some(process_value) = env.get(&spec.env_var) {
        let shadowed = file_entry.map(|e| ShadowedEntry {
            line: e.line,
            differs: e.value != process_value,
            quirky: !e.quirks.is_empty(),
        });
        return Resolved {
            value: Some(process_value),
            source: KeySource::ProcessEnv,
            quirks: Vec::new(),
            shadowed,
        };
    }
    match file_entry {
        Some(e) => Resolved {
            value: Some(e.value.clone()),
            source: KeySource::EnvFile { line: e.line },
            quirks: e.quirks.clone(),
            shadowed: None,
        },
        None => Resolved {
            value: None,
            source: KeySource::Absent,
            quirks: Vec::new(),
            shadowed: None,
        },
    }
}

// ─── Scanning ─────────────────────────────────────────────────────────────────

/// Run the static scan over every registered provider, in registry order.
pub fn scan(
    specs: &[ProviderSpec],
    env_path: &Path,
    file: Option<&EnvFile>,
    env: &dyn EnvLookup,
    extra_placeholders: &[String],
) -> ScanReport {
    let file_label = env_path.display().to_string();
    let findings: Vec<KeyFinding> = specs
        .iter()
        .map(|spec| {
            let resolved = resolve(spec, file, env);
            let finding = classify_finding(spec, specs, &resolved, &file_label, extra_placeholders);
            tracing::debug!(
                env_var = %finding.env_var,
                status = finding.status.label(),
                "classified key"
            );
            finding
        })
        .collect();

    let file_diagnostics = file.map(|f| f.diagnostics.clone()).unwrap_or_default();
    let penalty: u32 = findings.iter().map(|f| f.status.penalty()).sum::<u32>()
        + file_diagnostics.len() as u32 * DIAGNOSTIC_PENALTY;
    let score = 100u32.saturating_sub(penalty) as u8;

    ScanReport {
        score,
        env_file: env_path.to_path_buf(),
        env_file_found: file.is_some(),
        findings,
        file_diagnostics,
        generated_at: Utc::now(),
    }
}

fn classify_finding(
    spec: &ProviderSpec,
    all_specs: &[ProviderSpec],
    resolved: &Resolved,
    file_label: &str,
    extra_placeholders: &[String],
) -> KeyFinding {
    let console = console_hint(spec);

    let Some(raw) = resolved.value.as_deref() else {
        return KeyFinding {
            provider: spec.name.clone(),
            env_var: spec.env_var.clone(),
            source: KeySource::Absent,
            status: KeyStatus::Missing,
            masked: None,
            detail: format!("not set; add {} to {file_label}{console}", spec.env_var),
        };
    };

    let shape = spec.classify(raw, extra_placeholders);
    let shadow = shadow_note(resolved, file_label);

    let (status, masked, detail) = match shape {
        KeyShape::Empty => (
            KeyStatus::Missing,
            None,
            format!("set but empty{shadow}{console}"),
        ),
        KeyShape::Placeholder => (
            KeyStatus::Placeholder,
            Some(raw.to_string()),
            format!("placeholder value, replace it with a real key{shadow}{console}"),
        ),
        KeyShape::WrongPrefix => {
            let hint = providers::looks_like(all_specs, raw)
                .filter(|other| other.env_var != spec.env_var)
                .map(|other| format!("; looks like {} key material, check for swapped values", other.name))
                .unwrap_or_default();
            let expected = spec.preferred_prefix().unwrap_or("the documented prefix");
            (
                KeyStatus::Malformed,
                Some(redact::mask_key(raw)),
                format!("does not start with {expected}{hint}{shadow}{console}"),
            )
        }
        KeyShape::TooShort => (
            KeyStatus::Malformed,
            Some(redact::mask_key(raw)),
            format!("right prefix but too short to be a real key{shadow}{console}"),
        ),
        KeyShape::HasWhitespace => (
            KeyStatus::Malformed,
            Some(redact::mask_key(raw)),
            format!("contains whitespace, keys are single unbroken tokens{shadow}{console}"),
        ),
        KeyShape::Plausible if resolved.quirks.is_empty() => (
            KeyStatus::Ok,
            Some(redact::mask_key(raw)),
            format!("looks good{shadow}"),
        ),
        KeyShape::Plausible => {
            let quirk_list = resolved
                .quirks
                .iter()
                .map(Quirk::describe)
                .collect::<Vec<_>>()
                .join("; ");
            (
                KeyStatus::FormatQuirk,
                Some(redact::mask_key(raw)),
                format!("usable key, but {quirk_list}"),
            )
        }
    };

    KeyFinding {
        provider: spec.name.clone(),
        env_var: spec.env_var.clone(),
        source: resolved.source.clone(),
        status,
        masked,
        detail,
    }
}

fn shadow_note(resolved: &Resolved, file_label: &str) -> String {
    match &resolved.shadowed {
        Some(s) if s.differs => format!(
            "; process env overrides a different value at {file_label}:{}{}",
            s.line,
            if s.quirky { " (that entry also has format quirks)" } else { "" }
        ),
        Some(s) => format!("; process env overrides {file_label}:{}", s.line),
        None => String::new(),
    }
}

fn console_hint(spec: &ProviderSpec) -> String {
    spec.console_url
        .as_deref()
        .map(|u| format!(" (create one at {u})"))
        .unwrap_or_default()
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::builtin;
    use std::path::Path;

    fn no_env() -> HashMap<String, String> {
        HashMap::new()
    }

    fn env_of(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn finding<'a>(report: &'a ScanReport, env_var: &str) -> &'a KeyFinding {
        report
            .findings
            .iter()
            .find(|f| f.env_var == env_var)
            .unwrap_or_else(|| panic!("no finding for {env_var}"))
    }

    fn run(file_text: &str, env: &HashMap<String, String>) -> ScanReport {
        let file = EnvFile::parse(file_text);
        scan(&builtin(), Path::new(".env"), Some(&file), env, &[])
    }

    #[test]
    fn all_good_keys_score_100() {
        let report = run(
            "HUGGINGFACE_API_KEY=hf_AbCdEfGhIjKlMnOpQrStUvWx\n\
             OPENAI_API_KEY=sk-proj-AbCdEfGhIjKlMnOpQrStUvWx\n\
             ANTHROPIC_API_KEY=sk-ant-REDACTED\n",
            &no_env(),
        );
        assert!(report.is_clean());
        assert_eq!(report.score, 100);
        assert_eq!(report.failed_count(), 0);
        for f in &report.findings {
            assert_eq!(f.status, KeyStatus::Ok, "{}", f.env_var);
        }
    }

    #[test]
    fn findings_follow_registry_order() {
        let report = run("", &no_env());
        let vars: Vec<&str> = report.findings.iter().map(|f| f.env_var.as_str()).collect();
        assert_eq!(
            vars,
            vec!["HUGGINGFACE_API_KEY", "OPENAI_API_KEY", "ANTHROPIC_API_KEY"]
        );
    }

    #[test]
    fn missing_everywhere() {
        let report = scan(&builtin(), Path::new(".env"), None, &no_env(), &[]);
        assert!(!report.env_file_found);
        assert_eq!(report.score, 100 - 3 * 20);
        let f = finding(&report, "OPENAI_API_KEY");
        assert_eq!(f.status, KeyStatus::Missing);
        assert_eq!(f.source, KeySource::Absent);
        assert!(f.masked.is_none());
        assert!(f.detail.contains("add OPENAI_API_KEY to .env"));
        assert!(f.detail.contains("platform.openai.com"));
    }

    #[test]
    fn empty_value_counts_as_missing() {
        let report = run("OPENAI_API_KEY=\n", &no_env());
        let f = finding(&report, "OPENAI_API_KEY");
        assert_eq!(f.status, KeyStatus::Missing);
        assert!(f.detail.contains("set but empty"));
        assert_eq!(f.source, KeySource::EnvFile { line: 1 });
    }

    #[test]
    fn placeholders_shown_verbatim() {
        let report = run("OPENAI_API_KEY=your_api_key_here\n", &no_env());
        let f = finding(&report, "OPENAI_API_KEY");
        assert_eq!(f.status, KeyStatus::Placeholder);
        assert_eq!(f.masked.as_deref(), Some("your_api_key_here"));
        assert!(f.detail.contains("replace it with a real key"));
    }

    #[test]
    fn guide_pitfalls_become_format_quirks() {
        let report = run(
            "HUGGINGFACE_API_KEY=\"hf_AbCdEfGhIjKlMnOpQrStUvWx\"\n\
             OPENAI_API_KEY = sk-proj-AbCdEfGhIjKlMnOpQrStUvWx\n",
            &no_env(),
        );
        let hf = finding(&report, "HUGGINGFACE_API_KEY");
        assert_eq!(hf.status, KeyStatus::FormatQuirk);
        assert!(hf.detail.contains("double quotes"));
        assert_eq!(hf.source, KeySource::EnvFile { line: 1 });

        let oa = finding(&report, "OPENAI_API_KEY");
        assert_eq!(oa.status, KeyStatus::FormatQuirk);
        assert!(oa.detail.contains("whitespace around '='"));
    }

    #[test]
    fn swapped_keys_get_a_cross_provider_hint() {
        let report = run("OPENAI_API_KEY=sk-ant-REDACTED\n", &no_env());
        let f = finding(&report, "OPENAI_API_KEY");
        assert_eq!(f.status, KeyStatus::Malformed);
        assert!(f.detail.contains("Anthropic"), "detail: {}", f.detail);
    }

    #[test]
    fn process_env_wins_over_file() {
        let env = env_of(&[("OPENAI_API_KEY", "sk-proj-AbCdEfGhIjKlMnOpQrStUvWx")]);
        let report = run("OPENAI_API_KEY=your_api_key_here\n", &env);
        let f = finding(&report, "OPENAI_API_KEY");
        assert_eq!(f.status, KeyStatus::Ok);
        assert_eq!(f.source, KeySource::ProcessEnv);
        assert!(f.detail.contains("process env overrides a different value at .env:1"));
    }

    #[test]
    fn matching_shadow_is_noted_calmly() {
        let key = "sk-proj-AbCdEfGhIjKlMnOpQrStUvWx";
        let env = env_of(&[("OPENAI_API_KEY", key)]);
        let report = run(&format!("OPENAI_API_KEY={key}\n"), &env);
        let f = finding(&report, "OPENAI_API_KEY");
        assert_eq!(f.status, KeyStatus::Ok);
        assert!(f.detail.contains("process env overrides .env:1"));
        assert!(!f.detail.contains("different value"));
    }

    #[test]
    fn quirks_on_shadowed_entries_do_not_change_status() {
        let env = env_of(&[("OPENAI_API_KEY", "sk-proj-AbCdEfGhIjKlMnOpQrStUvWx")]);
        let report = run("OPENAI_API_KEY=\"your_api_key_here\"\n", &env);
        let f = finding(&report, "OPENAI_API_KEY");
        assert_eq!(f.status, KeyStatus::Ok);
        assert!(f.detail.contains("format quirks"));
    }

    #[test]
    fn file_diagnostics_penalize_the_score() {
        let report = run(
            "HUGGINGFACE_API_KEY=hf_AbCdEfGhIjKlMnOpQrStUvWx\n\
             OPENAI_API_KEY=sk-proj-AbCdEfGhIjKlMnOpQrStUvWx\n\
             ANTHROPIC_API_KEY=sk-ant-REDACTED\n\
             BROKEN LINE\n\
             OPENAI_API_KEY=sk-proj-AbCdEfGhIjKlMnOpQrStUvWx\n",
            &no_env(),
        );
        // One missing '=', one duplicate.
        assert_eq!(report.file_diagnostics.len(), 2);
        assert_eq!(report.score, 100 - 2 * 5);
        assert!(!report.is_clean());
    }

    #[test]
    fn score_floors_at_zero() {
        let file = EnvFile::parse("x\n".repeat(30).as_str());
        let report = scan(&builtin(), Path::new(".env"), Some(&file), &no_env(), &[]);
        // 3 missing keys plus 30 bad lines overflow the scale.
        assert_eq!(report.score, 0);
    }

    #[test]
    fn extra_placeholders_flow_through() {
        let extra = vec!["corp-standard-placeholder".to_string()];
        let file = EnvFile::parse("OPENAI_API_KEY=corp-standard-placeholder\n");
        let report = scan(&builtin(), Path::new(".env"), Some(&file), &no_env(), &extra);
        assert_eq!(
            finding(&report, "OPENAI_API_KEY").status,
            KeyStatus::Placeholder
        );
    }

    #[test]
    fn report_never_contains_raw_keys() {
        let secret = "sk-proj-AbCdEfGhIjKlMnOpQrStUvWxYz0123456789";
        let report = run(&format!("OPENAI_API_KEY={secret}\n"), &no_env());
        let json = serde_json::to_string(&report).expect("serialize");
        assert!(!json.contains(secret));
        assert!(!crate::redact::contains_secret_like(&json), "json: {json}");
    }

    #[test]
    fn json_report_uses_camel_case_wire_names() {
        let report = run("OPENAI_API_KEY=sk-proj-AbCdEfGhIjKlMnOpQrStUvWx\n", &no_env());
        let value = serde_json::to_value(&report).expect("serialize");
        assert!(value.get("envFileFound").is_some());
        assert!(value.get("fileDiagnostics").is_some());
        let f = &value["findings"][0];
        assert!(f.get("envVar").is_some());
        assert_eq!(value["findings"][1]["source"]["kind"], "envFile");
        assert_eq!(value["findings"][1]["source"]["line"], 1);
    }
}
