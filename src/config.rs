use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

use crate::cli::Cli;

pub const CFR_ENV: &str = "CFR_JAR";

const CFR_URL: &str = "https://github.com/leibnitz27/cfr/releases/download/0.152/cfr-0.152.jar";

/// `--cfr`, then `CFR_JAR`, then the tool directory (downloading on first use).
pub fn resolve_cfr_path(cli: &Cli) -> Result<PathBuf> {
    if let Some(p) = cfr_override(cli.cfr.as_ref(), env::var(CFR_ENV).ok()) {
        return Ok(p);
    }

    let default_path = explorer_home()?.join("tools").join("cfr.jar");
    if default_path.exists() {
        return Ok(default_path);
    }

    install_cfr_if_missing(&default_path)?;
    Ok(default_path)
}

pub fn cfr_override(flag: Option<&PathBuf>, env_value: Option<String>) -> Option<PathBuf> {
    flag.cloned()
        .or_else(|| env_value.filter(|v| !v.is_empty()).map(PathBuf::from))
}

/// Requested worker count, or the available parallelism when absent or zero.
pub fn thread_count(requested: Option<usize>) -> usize {
    requested.filter(|n| *n > 0).unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    })
}

fn explorer_home() -> Result<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::cache_dir)
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow::anyhow!("Failed to resolve data directory"))?;
    Ok(base.join("class-explorer"))
}

fn install_cfr_if_missing(target_path: &Path) -> Result<()> {
    if target_path.exists() {
        return Ok(());
    }

    if let Some(parent) = target_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    tracing::info!(target = %target_path.display(), "CFR not found, downloading");
    let status = std::process::Command::new("curl")
        .args([
            "-L",
            "--fail",
            "--silent",
            "--show-error",
            "-o",
            target_path
                .to_str()
                .context("cfr.jar target path is not valid UTF-8")?,
            CFR_URL,
        ])
        .status()
        .context(
            "Failed to execute curl (ensure curl is installed, or use --cfr to specify cfr.jar)",
        )?;

    if !status.success() {
        if cfg!(windows) {
            let ps_status = std::process::Command::new("powershell")
                .args([
                    "-NoProfile",
                    "-ExecutionPolicy",
                    "Bypass",
                    "-Command",
                    &format!(
                        "Invoke-WebRequest -Uri '{CFR_URL}' -OutFile '{}'",
                        target_path.display()
                    ),
                ])
                .status();

            if let Ok(s) = ps_status
                && s.success()
            {
                return Ok(());
            }
        }

        anyhow::bail!("Failed to download CFR. You can use --cfr to specify local cfr.jar");
    }

    Ok(())
}
