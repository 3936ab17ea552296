//! Layered settings.
//!
//! Precedence is CLI flag (or its env var) over `keycheck.toml` over the
//! built-in default. The TOML file is optional and every field in it is
//! optional; an unparseable file logs an error and behaves like an absent
//! one rather than blocking a scan.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::providers::{self, ProbeAuth, ProbeSpec, ProviderId, ProviderSpec};

pub const DEFAULT_ENV_FILE: &str = ".env";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CONFIG_FILE: &str = "keycheck.toml";
/// Floor for custom providers that do not state a minimum length.
const DEFAULT_CUSTOM_MIN_LEN: usize = 8;

/// Fully resolved settings the commands run with.
#[derive(Debug, Clone)]
pub struct Settings {
    pub env_file: PathBuf,
    pub timeout_secs: u64,
    /// Team-specific placeholder words, checked alongside the built-in set.
    pub placeholder_extra: Vec<String>,
    /// Builtin providers first, then `[[provider]]` extras, registry order.
    pub providers: Vec<ProviderSpec>,
}

/// What the CLI layer resolved from flags and environment variables.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub env_file: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

/// `keycheck.toml` as written. Everything optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub env_file: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub placeholder_extra: Option<Vec<String>>,
    pub probe_urls: Option<ProbeUrls>,
    #[serde(default)]
    pub provider: Vec<CustomProvider>,
}

/// Probe endpoint overrides, for proxied or mirrored environments.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeUrls {
    pub huggingface: Option<String>,
    pub openai: Option<String>,
    pub anthropic: Option<String>,
}

/// A `[[provider]]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomProvider {
    pub name: String,
    pub env_var: String,
    pub prefixes: Vec<String>,
    pub min_len: Option<usize>,
    pub console_url: Option<String>,
    pub probe_url: Option<String>,
    /// Header name for the key. Absent means `Authorization: Bearer`.
    pub auth_header: Option<String>,
}

/// Read and parse a config file. Unreadable means absent; unparseable is
/// logged and treated as absent so a broken config never blocks a scan.
pub fn load_toml(path: &Path) -> Option<TomlConfig> {
    let text = std::fs::read_to_string(path).ok()?;
    match toml::from_str::<TomlConfig>(&text) {
        Ok(cfg) => Some(cfg),
        Err(err) => {
            tracing::error!(
                path = %path.display(),
                %err,
                "unparseable config file, falling back to defaults"
            );
            None
        }
    }
}

impl Settings {
    /// Resolve the effective settings. An explicit `--config` path that
    /// does not exist gets a warning; the implicit `./keycheck.toml` is
    /// simply picked up when present.
    pub fn load(cli: CliOverrides, config_path: Option<&Path>) -> Settings {
        let toml_cfg = match config_path {
            Some(p) => {
                if !p.exists() {
                    tracing::warn!(path = %p.display(), "config file not found");
                }
                load_toml(p)
            }
            None => {
                let implicit = Path::new(DEFAULT_CONFIG_FILE);
                if implicit.exists() {
                    load_toml(implicit)
                } else {
                    None
                }
            }
        }
        .unwrap_or_default();

        let providers = merge_providers(providers::builtin(), &toml_cfg);
        Settings {
            env_file: cli
                .env_file
                .or(toml_cfg.env_file)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_FILE)),
            timeout_secs: cli
                .timeout_secs
                .or(toml_cfg.timeout_secs)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
            placeholder_extra: toml_cfg.placeholder_extra.unwrap_or_default(),
            providers,
        }
    }
}

fn merge_providers(mut specs: Vec<ProviderSpec>, cfg: &TomlConfig) -> Vec<ProviderSpec> {
    if let Some(urls) = &cfg.probe_urls {
        override_probe_url(&mut specs, "HUGGINGFACE_API_KEY", urls.huggingface.as_deref());
        override_probe_url(&mut specs, "OPENAI_API_KEY", urls.openai.as_deref());
        override_probe_url(&mut specs, "ANTHROPIC_API_KEY", urls.anthropic.as_deref());
    }
    for custom in &cfg.provider {
        if specs.iter().any(|s| s.env_var == custom.env_var) {
            tracing::warn!(
                env_var = %custom.env_var,
                "custom provider shadows an existing one, ignoring"
            );
            continue;
        }
        if custom.prefixes.is_empty() {
            tracing::warn!(name = %custom.name, "custom provider has no prefixes, ignoring");
            continue;
        }
        specs.push(custom.to_spec());
    }
    specs
}

fn override_probe_url(specs: &mut [ProviderSpec], env_var: &str, url: Option<&str>) {
    let Some(url) = url else { return };
    if let Some(spec) = specs.iter_mut().find(|s| s.env_var == env_var) {
        if let Some(probe) = spec.probe.as_mut() {
            probe.url = url.to_string();
        }
    }
}

impl CustomProvider {
    fn to_spec(&self) -> ProviderSpec {
        ProviderSpec {
            id: ProviderId::Custom(self.name.clone()),
            name: self.name.clone(),
            env_var: self.env_var.clone(),
            prefixes: self.prefixes.clone(),
            excluded_prefixes: Vec::new(),
            min_len: self.min_len.unwrap_or(DEFAULT_CUSTOM_MIN_LEN),
            console_url: self.console_url.clone(),
            probe: self.probe_url.as_ref().map(|url| ProbeSpec {
                url: url.clone(),
                auth: match &self.auth_header {
                    Some(header) => ProbeAuth::Header(header.clone()),
                    None => ProbeAuth::Bearer,
                },
                headers: Vec::new(),
            }),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
