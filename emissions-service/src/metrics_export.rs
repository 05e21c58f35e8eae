//! Prometheus text export for batch runs.
//!
//! A run is too short-lived to be scraped, so the rendered exposition text
//! is written to a file for node_exporter's textfile collector instead.

use std::{fs, path::Path};

use anyhow::Context;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static PROM_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Installs the global Prometheus recorder. Later calls are no-ops.
pub fn init() -> anyhow::Result<()> {
    if PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus metrics recorder")?;

    // Ignore error if the handle was already set by a concurrent caller.
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub fn render() -> Option<String> {
    PROM_HANDLE.get().map(|h| h.render())
}

/// Writes the current exposition text to `path` via a sibling temp file so
/// collectors never read a partial file.
pub fn write_textfile(path: impl AsRef<Path>) -> anyhow::Result<()> {
    let path = path.as_ref();
    let body = render().context("metrics recorder not initialized")?;

    let tmp = path.with_extension("prom.tmp");
    fs::write(&tmp, body).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("failed to move metrics file to {}", path.display()))?;

    tracing::info!(path = %path.display(), "metrics written");
    Ok(())
}
