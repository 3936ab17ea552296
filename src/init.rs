// SPDX-License-Identifier: MIT
//! Starter `.env` writer.
//!
//! `keycheck init` lays down a commented template with one placeholder line
//! per registered provider. It never overwrites an existing file unless
//! forced, writes through a temp file in the same directory so a crash
//! cannot leave a half-written credential file, and restricts permissions
//! before the file becomes visible under its final name.

use std::io::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

use crate::providers::ProviderSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Created,
    /// File already present and `--force` not given.
    SkippedExisting,
    Overwritten,
}

/// Render the template text for the registered providers, in registry order.
pub fn render_template(specs: &[ProviderSpec]) -> String {
    let mut out = String::new();
    out.push_str("# AI provider credentials. Filled in by hand, read by your tools.\n");
    out.push_str("#\n");
    out.push_str("# One KEY=value per line. No quotes around the value and no spaces\n");
    out.push_str("# around '=': both trip up stricter loaders.\n");
    out.push_str("#\n");
    out.push_str("# Run `keycheck scan` after editing.\n");
    for spec in specs {
        out.push('\n');
        if let Some(url) = &spec.console_url {
            out.push_str(&format!("# {}: create a key at {url}\n", spec.name));
        } else {
            out.push_str(&format!("# {}\n", spec.name));
        }
        if let Some(prefix) = spec.preferred_prefix() {
            out.push_str(&format!("# (keys start with {prefix})\n"));
        }
        out.push_str(&format!("{}=your_{}_key_here\n", spec.env_var, spec.slug()));
    }
    out
}

/// Write the template to `path`. Refuses to touch an existing file unless
/// `force` is set; without force the final rename is a noclobber, so a
/// file that appears between any lookup and the rename still survives.
pub fn write_template(path: &Path, specs: &[ProviderSpec], force: bool) -> Result<InitOutcome> {
    // Same-directory temp file, so persisting is a rename and never a copy.
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create a temp file in {}", parent.display()))?;
    tmp.write_all(render_template(specs).as_bytes())
        .context("failed to write the env template")?;

    // Owner-only before the file appears under its final name.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))
            .context("failed to restrict template permissions")?;
    }

    if force {
        let existed = path.exists();
        tmp.persist(path)
            .with_context(|| format!("failed to move the template to {}", path.display()))?;
        tracing::info!(path = %path.display(), "wrote env template");
        return Ok(if existed {
            InitOutcome::Overwritten
        } else {
            InitOutcome::Created
        });
    }

    match tmp.persist_noclobber(path) {
        Ok(_) => {
            tracing::info!(path = %path.display(), "wrote env template");
            Ok(InitOutcome::Created)
        }
        Err(err) if err.error.kind() == std::io::ErrorKind::AlreadyExists => {
            Ok(InitOutcome::SkippedExisting)
        }
        Err(err) => Err(err.error)
            .with_context(|| format!("failed to move the template to {}", path.display())),
    }
}

/// Make sure `file_name` is ignored when `dir` is a git work tree.
/// Returns whether `.gitignore` was changed.
pub fn ensure_gitignored(dir: &Path, file_name: &str) -> Result<bool> {
    if !dir.join(".git").exists() {
        return Ok(false);
    }
    let gitignore = dir.join(".gitignore");
    let current = std::fs::read_to_string(&gitignore).unwrap_or_default();
    let covered = current.lines().any(|line| {
        let t = line.trim();
        t == file_name
            || t == format!("/{file_name}")
            || (file_name.starts_with(".env") && (t == "*.env" || t == ".env*"))
    });
    if covered {
        return Ok(false);
    }

    let mut next = current.trim_end().to_string();
    if !next.is_empty() {
        next.push_str("\n\n");
    }
    next.push_str("# local credentials\n");
    next.push_str(file_name);
    next.push('\n');
    std::fs::write(&gitignore, next)
        .with_context(|| format!("failed to update {}", gitignore.display()))?;
    tracing::info!(path = %gitignore.display(), entry = file_name, "added gitignore entry");
    Ok(true)
}
