//! Learning mode (spec §6): captures every inbound textual frame to a
//! timestamped file for later replay/diagnostics. Best-effort, no retry —
//! matches the Asset Extractor's "no rollback" stance (spec §4.2).

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use tracing::warn;

/// Writes `raw` under `<root>/samples/<ISO8601-local-no-colons>-<label>.json`.
/// Failures are logged and swallowed; learning mode never affects the
/// source channel's reply.
pub async fn capture(root: &Path, label: &str, raw: &str, at: SystemTime) {
    let dir = root.join("samples");
    if let Err(err) = tokio::fs::create_dir_all(&dir).await {
        warn!(error = %err, "learning mode: failed to create samples directory");
        return;
    }
    let path: PathBuf = dir.join(format!("{}-{label}.json", timestamp_no_colons(at)));
    if let Err(err) = tokio::fs::write(&path, raw).await {
        warn!(error = %err, path = %path.display(), "learning mode: failed to write sample");
    }
}

/// `YYYYMMDDTHHMMSS.mmm` in local time, filename-safe (no colons).
fn timestamp_no_colons(at: SystemTime) -> String {
    let local: DateTime<Local> = at.into();
    local.format("%Y%m%dT%H%M%S%.3f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn formats_without_colons() {
        let at = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let formatted = timestamp_no_colons(at);
        assert!(!formatted.contains(':'), "got {formatted}");
        assert!(formatted.contains('T'));
    }
}
