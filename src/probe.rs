// SPDX-License-Identifier: MIT
//! Live key verification.
//!
//! Each eligible provider gets one authenticated GET against its cheapest
//! endpoint, all providers in parallel. The probe proves exactly one thing:
//! whether the credential authenticates right now. Response bodies are only
//! glanced at for a human-friendly note; nothing is stored.
//!
//! Keys that fail the static shape check are never sent anywhere. There is
//! no point burning a network round-trip on `your_api_key_here`, and not
//! transmitting malformed values is the safer default anyway.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;

use crate::envfile::EnvFile;
use crate::providers::{KeyShape, ProbeAuth, ProbeSpec, ProviderSpec};
use crate::redact;
use crate::scan::{self, EnvLookup};

/// Pause before the single retry after a transport failure.
const RETRY_DELAY: Duration = Duration::from_millis(300);

/// What one probe request established.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ProbeOutcome {
    /// 2xx: the key authenticates.
    Valid {
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    /// 401 or 403: the provider rejected the credential.
    Unauthorized,
    /// 429: throttled before the key could be verified.
    RateLimited,
    /// Any other non-2xx status. Says nothing about the key.
    ProviderError { status: u16 },
    /// Transport-level failure: DNS, TCP, TLS, or timeout.
    Network { detail: String },
    /// Not probed at all, with the reason why.
    Skipped { reason: String },
}

impl ProbeOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ProbeOutcome::Valid { .. } => "valid",
            ProbeOutcome::Unauthorized => "unauthorized",
            ProbeOutcome::RateLimited => "rate limited",
            ProbeOutcome::ProviderError { .. } => "provider error",
            ProbeOutcome::Network { .. } => "network",
            ProbeOutcome::Skipped { .. } => "skipped",
        }
    }

    /// Anything that ran but did not come back `Valid` flips the exit
    /// code. A 429 likely means the key is known to the provider, but
    /// "likely known" is not "verified" and the run must say so.
    pub fn is_failure(&self) -> bool {
        !matches!(
            self,
            ProbeOutcome::Valid { .. } | ProbeOutcome::Skipped { .. }
        )
    }
}

/// One row of the probe report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeFinding {
    pub provider: String,
    pub env_var: String,
    pub outcome: ProbeOutcome,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub masked: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub findings: Vec<ProbeFinding>,
    pub generated_at: DateTime<Utc>,
}

impl ProbeReport {
    /// At least one probe actually went out.
    pub fn any_ran(&self) -> bool {
        self.findings
            .iter()
            .any(|f| !matches!(f.outcome, ProbeOutcome::Skipped { .. }))
    }

    pub fn all_passed(&self) -> bool {
        self.findings.iter().all(|f| !f.outcome.is_failure())
    }

    /// Drives the exit code: something ran, and nothing that ran failed.
    /// All-skipped is a failure; "nothing was verified" must not read as
    /// "everything verified".
    pub fn succeeded(&self) -> bool {
        self.any_ran() && self.all_passed()
    }
}

// ─── Planning ─────────────────────────────────────────────────────────────────

/// A per-provider decision: send a request, or report why not.
#[derive(Debug, Clone)]
pub enum ProbePlan {
    Run {
        provider: String,
        env_var: String,
        probe: ProbeSpec,
        key: String,
        masked: String,
    },
    Skip {
        provider: String,
        env_var: String,
        reason: String,
    },
}

/// Decide, per provider, whether a probe should go out. Uses the same
/// resolution as the static scan, so the two commands never disagree
/// about which value is in effect.
pub fn plan_probes(
    specs: &[ProviderSpec],
    file: Option<&EnvFile>,
    env: &dyn EnvLookup,
    extra_placeholders: &[String],
) -> Vec<ProbePlan> {
    specs
        .iter()
        .map(|spec| {
            let skip = |reason: &str| ProbePlan::Skip {
                provider: spec.name.clone(),
                env_var: spec.env_var.clone(),
                reason: reason.to_string(),
            };
            let resolved = scan::resolve(spec, file, env);
            let Some(raw) = resolved.value else {
                return skip("no key configured");
            };
            match spec.classify(&raw, extra_placeholders) {
                KeyShape::Plausible => match &spec.probe {
                    Some(probe) => ProbePlan::Run {
                        provider: spec.name.clone(),
                        env_var: spec.env_var.clone(),
                        probe: probe.clone(),
                        masked: redact::mask_key(&raw),
                        key: raw,
                    },
                    None => skip("no probe endpoint for this provider"),
                },
                KeyShape::Empty => skip("set but empty"),
                KeyShape::Placeholder => skip("placeholder value, see `keycheck scan`"),
                KeyShape::WrongPrefix | KeyShape::TooShort | KeyShape::HasWhitespace => {
                    skip("malformed key, see `keycheck scan`")
                }
            }
        })
        .collect()
}

// ─── Execution ────────────────────────────────────────────────────────────────

/// Shared HTTP client for all probes. The timeout covers the whole
/// request, connect included.
pub fn client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().timeout(timeout).build()
}

/// Run every planned probe concurrently. Findings come back in plan
/// order regardless of completion order.
pub async fn probe_all(
    client: &reqwest::Client,
    plans: Vec<ProbePlan>,
    timeout: Duration,
) -> ProbeReport {
    let futures = plans.into_iter().map(|plan| {
        let client = client.clone();
        async move { run_plan(&client, plan, timeout).await }
    });
    let findings = join_all(futures).await;
    ProbeReport {
        findings,
        generated_at: Utc::now(),
    }
}

async fn run_plan(client: &reqwest::Client, plan: ProbePlan, timeout: Duration) -> ProbeFinding {
    match plan {
        ProbePlan::Skip {
            provider,
            env_var,
            reason,
        } => ProbeFinding {
            provider,
            env_var,
            outcome: ProbeOutcome::Skipped { reason },
            elapsed_ms: 0,
            masked: None,
        },
        ProbePlan::Run {
            provider,
            env_var,
            probe,
            key,
            masked,
        } => {
            let started = Instant::now();
            let outcome = execute(client, &probe, &key, timeout).await;
            tracing::debug!(env_var = %env_var, outcome = outcome.label(), "probe finished");
            ProbeFinding {
                provider,
                env_var,
                outcome,
                elapsed_ms: started.elapsed().as_millis() as u64,
                masked: Some(masked),
            }
        }
    }
}

async fn execute(
    client: &reqwest::Client,
    probe: &ProbeSpec,
    key: &str,
    timeout: Duration,
) -> ProbeOutcome {
    match send_with_retry(client, probe, key).await {
        Ok(resp) => outcome_of_response(resp).await,
        Err(err) => ProbeOutcome::Network {
            detail: describe_error(&err, timeout),
        },
    }
}

fn request(
    client: &reqwest::Client,
    probe: &ProbeSpec,
    key: &str,
) -> reqwest::RequestBuilder {
    let mut req = client.get(&probe.url);
    req = match &probe.auth {
        ProbeAuth::Bearer => req.bearer_auth(key),
        ProbeAuth::Header(name) => req.header(name.as_str(), key),
    };
    for (name, value) in &probe.headers {
        req = req.header(name.as_str(), value.as_str());
    }
    req
}

/// One retry for transport failures: refused connections, DNS hiccups,
/// mid-response resets. A timeout is not retried, the second attempt
/// would just double the wait, and a malformed request cannot improve.
fn should_retry(err: &reqwest::Error) -> bool {
    !err.is_timeout() && !err.is_builder()
}

async fn send_with_retry(
    client: &reqwest::Client,
    probe: &ProbeSpec,
    key: &str,
) -> reqwest::Result<reqwest::Response> {
    match request(client, probe, key).send().await {
        Ok(resp) => Ok(resp),
        Err(err) if should_retry(&err) => {
            tracing::debug!(url = %probe.url, "transport error, retrying once");
            tokio::time::sleep(RETRY_DELAY).await;
            request(client, probe, key).send().await
        }
        Err(err) => Err(err),
    }
}

async fn outcome_of_response(resp: reqwest::Response) -> ProbeOutcome {
    let status = resp.status().as_u16();
    if (200..300).contains(&status) {
        let note = resp
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|body| note_from_body(&body));
        return ProbeOutcome::Valid { note };
    }
    outcome_of_status(status)
}

/// Pure status mapping. 2xx is handled by the caller, which also reads
/// the body; everything else is decided here.
pub fn outcome_of_status(status: u16) -> ProbeOutcome {
    match status {
        200..=299 => ProbeOutcome::Valid { note: None },
        401 | 403 => ProbeOutcome::Unauthorized,
        429 => ProbeOutcome::RateLimited,
        other => ProbeOutcome::ProviderError { status: other },
    }
}

/// Opportunistic human detail from a 2xx body: the account name from a
/// whoami payload, or the model count from a models listing. Absence is
/// fine; the outcome is already decided.
pub fn note_from_body(body: &serde_json::Value) -> Option<String> {
    if let Some(name) = body.get("name").and_then(|v| v.as_str()) {
        return Some(format!("account: {name}"));
    }
    if let Some(models) = body.get("data").and_then(|v| v.as_array()) {
        return Some(format!("{} models visible", models.len()));
    }
    None
}

fn describe_error(err: &reqwest::Error, timeout: Duration) -> String {
    if err.is_timeout() {
        format!("no response within {}s", timeout.as_secs())
    } else if err.is_connect() {
        "connection failed".to_string()
    } else {
        err.to_string()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
