// SPDX-License-Identifier: MIT
//! Provider registry: the documented AI providers and their key conventions.
//!
//! Each provider contributes: the environment variable its SDKs read, the
//! key prefixes it issues, where a human obtains a key, and (optionally) a
//! cheap authenticated endpoint used by `keycheck probe`. Extra providers
//! can be declared in `keycheck.toml`; they get the same treatment.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Stable identity of a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderId {
    HuggingFace,
    OpenAi,
    Anthropic,
    /// Declared in `keycheck.toml` under `[[provider]]`.
    Custom(String),
}

/// How a probe request authenticates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ProbeAuth {
    /// `Authorization: Bearer <key>`.
    Bearer,
    /// Key sent in a named request header (Anthropic uses `x-api-key`).
    Header(String),
}

/// A provider's live-verification endpoint.
///
/// Always a GET with no request body: proving the key authenticates must
/// cost nothing and change nothing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeSpec {
    pub url: String,
    pub auth: ProbeAuth,
    /// Extra fixed headers (Anthropic requires `anthropic-version`).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
}

/// Everything keycheck knows about one provider.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSpec {
    #[serde(skip)]
    pub id: ProviderId,
    /// Display name, e.g. "Hugging Face".
    pub name: String,
    /// Canonical environment variable the provider's SDKs read.
    pub env_var: String,
    /// Accepted key prefixes, documented/preferred form first.
    pub prefixes: Vec<String>,
    /// Prefixes that would pass the accepted check but belong to another
    /// provider. An `sk-ant-...` value must not pass the OpenAI `sk-` test.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub excluded_prefixes: Vec<String>,
    /// Shortest plausible real key, prefix included.
    pub min_len: usize,
    /// Where a human creates a key for this provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe: Option<ProbeSpec>,
}

/// Result of the pure shape check on a candidate key value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyShape {
    /// Empty string.
    Empty,
    /// A documented stand-in that was never replaced.
    Placeholder,
    /// Does not start with any accepted prefix (or starts with an excluded one).
    WrongPrefix,
    /// Right prefix but too short to be a real key.
    TooShort,
    /// Contains whitespace; keys are single tokens.
    HasWhitespace,
    /// Passes every static check. Says nothing about being live.
    Plausible,
}

// ─── Builtin registry ─────────────────────────────────────────────────────────

/// The three documented providers, in the order the setup guide lists them.
pub fn builtin() -> Vec<ProviderSpec> {
    vec![
        ProviderSpec {
            id: ProviderId::HuggingFace,
            name: "Hugging Face".to_string(),
            env_var: "HUGGINGFACE_API_KEY".to_string(),
            prefixes: vec!["hf_".to_string()],
            excluded_prefixes: vec![],
            min_len: 12,
            console_url: Some("https://huggingface.co/settings/tokens".to_string()),
            probe: Some(ProbeSpec {
                url: "https://huggingface.co/api/whoami-v2".to_string(),
                auth: ProbeAuth::Bearer,
                headers: vec![],
            }),
        },
        ProviderSpec {
            id: ProviderId::OpenAi,
            name: "OpenAI".to_string(),
            env_var: "OPENAI_API_KEY".to_string(),
            // Project keys are the documented form; bare `sk-` keys are legacy.
            prefixes: vec!["sk-proj-".to_string(), "sk-".to_string()],
            excluded_prefixes: vec!["sk-ant-".to_string()],
            min_len: 20,
            console_url: Some("https://platform.openai.com/api-keys".to_string()),
            probe: Some(ProbeSpec {
                url: "https://api.openai.com/v1/models".to_string(),
                auth: ProbeAuth::Bearer,
                headers: vec![],
            }),
        },
        ProviderSpec {
            id: ProviderId::Anthropic,
            name: "Anthropic".to_string(),
            env_var: "ANTHROPIC_API_KEY".to_string(),
            prefixes: vec!["sk-ant-".to_string()],
            excluded_prefixes: vec![],
            min_len: 24,
            console_url: Some("https://console.anthropic.com/settings/keys".to_string()),
            probe: Some(ProbeSpec {
                url: "https://api.anthropic.com/v1/models".to_string(),
                auth: ProbeAuth::Header("x-api-key".to_string()),
                headers: vec![("anthropic-version".to_string(), "2023-06-01".to_string())],
            }),
        },
    ]
}

/// Look a provider up by its environment variable name (exact match).
pub fn find<'a>(specs: &'a [ProviderSpec], env_var: &str) -> Option<&'a ProviderSpec> {
    specs.iter().find(|s| s.env_var == env_var)
}

/// Look a provider up by id.
pub fn find_id<'a>(specs: &'a [ProviderSpec], id: &ProviderId) -> Option<&'a ProviderSpec> {
    specs.iter().find(|s| s.id == *id)
}

/// Which provider (if any) a raw value appears to belong to, judged by
/// prefix alone. Used for "this looks like an Anthropic key" hints.
pub fn looks_like<'a>(specs: &'a [ProviderSpec], raw: &str) -> Option<&'a ProviderSpec> {
    specs.iter().find(|s| s.accepts_prefix(raw))
}

// ─── Placeholder detection ────────────────────────────────────────────────────

/// Compiled patterns for the documented placeholder family
/// (`your_api_key_here` and friends). Case-insensitive where it matters.
static PLACEHOLDER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)^your[-_. ]",
        r"(?i)(key|token)[-_. ]?here$",
        r"(?i)^(changeme|change[-_ ]me)$",
        r"(?i)^x{3,}$",
        r"^<[^>]*>$",
        r"(?i)^(todo|tbd|fixme|placeholder|dummy|replace[-_ ]?me)$",
        r"(?i)^(insert|replace|paste)[-_ ]",
        r"^\.{3,}$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("placeholder pattern: invalid regex"))
    .collect()
});

/// True when `raw` is a known stand-in value rather than a credential.
///
/// `extra` carries team-specific placeholder words from `keycheck.toml`,
/// matched case-insensitively as whole values.
pub fn is_placeholder(raw: &str, extra: &[String]) -> bool {
    PLACEHOLDER_PATTERNS.iter().any(|p| p.is_match(raw))
        || extra.iter().any(|w| raw.eq_ignore_ascii_case(w))
}

// ─── Shape classification ─────────────────────────────────────────────────────

impl ProviderSpec {
    /// Classify a raw candidate value for this provider.
    ///
    /// Placeholder wins over every format error: a value that was never
    /// replaced should be reported as such, not as "wrong prefix".
    /// Never panics on arbitrary UTF-8 and never logs the input.
    pub fn classify(&self, raw: &str, extra_placeholders: &[String]) -> KeyShape {
        if raw.is_empty() {
            return KeyShape::Empty;
        }
        if is_placeholder(raw, extra_placeholders) || self.prefix_filler(raw) {
            return KeyShape::Placeholder;
        }
        if raw.chars().any(char::is_whitespace) {
            return KeyShape::HasWhitespace;
        }
        if self
            .excluded_prefixes
            .iter()
            .any(|p| raw.starts_with(p.as_str()))
        {
            return KeyShape::WrongPrefix;
        }
        if !self.prefixes.iter().any(|p| raw.starts_with(p.as_str())) {
            return KeyShape::WrongPrefix;
        }
        if raw.chars().count() < self.min_len {
            return KeyShape::TooShort;
        }
        KeyShape::Plausible
    }

    /// True when the value carries one of this provider's accepted prefixes
    /// and none of the excluded ones. Prefix test only; length is ignored.
    pub fn accepts_prefix(&self, raw: &str) -> bool {
        if self
            .excluded_prefixes
            .iter()
            .any(|p| raw.starts_with(p.as_str()))
        {
            return false;
        }
        self.prefixes.iter().any(|p| raw.starts_with(p.as_str()))
    }

    /// The documented prefix, used in remediation hints and `init` comments.
    pub fn preferred_prefix(&self) -> Option<&str> {
        self.prefixes.first().map(String::as_str)
    }

    /// Lowercased alphanumeric form of the name ("Hugging Face" → "huggingface").
    pub fn slug(&self) -> String {
        self.name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect()
    }

    /// Match a `--provider` selector against the name or the env var.
    pub fn matches_selector(&self, selector: &str) -> bool {
        let wanted: String = selector
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        wanted == self.slug() || selector.eq_ignore_ascii_case(&self.env_var)
    }

    /// A correct prefix followed by nothing but filler (`hf_xxxxxxxx`) is a
    /// placeholder someone copied from an example file.
    fn prefix_filler(&self, raw: &str) -> bool {
        self.prefixes.iter().any(|p| {
            raw.strip_prefix(p.as_str()).is_some_and(|rest| {
                !rest.is_empty() && rest.chars().all(|c| matches!(c, 'x' | 'X' | '*' | '.'))
            })
        })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
