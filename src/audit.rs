//! JSONL audit logging for remote invocations.
//!
//! Every operation sent to the host is logged as a single line in
//! `{config_dir}/audit/YYYY-MM-DD.jsonl`. Best-effort: never panics or fails
//! the caller.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
struct InvocationAuditEntry<'a> {
    ts: u64,
    request_id: &'a str,
    operation: &'a str,
    params: &'a Value,
    ok: bool,
    message: &'a str,
    duration_ms: u64,
}

/// Destination for audit lines. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AuditLog {
    dir: PathBuf,
}

impl AuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    /// Log a single remote invocation to today's JSONL audit file.
    ///
    /// `outcome` is `Ok(())` on success or `Err(message)` on failure.
    pub fn log_invocation(
        &self,
        request_id: &str,
        operation: &str,
        params: &Value,
        outcome: Result<(), &str>,
        duration: Duration,
    ) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let (ok, message) = match outcome {
            Ok(()) => (true, "ok"),
            Err(e) => (false, e),
        };

        let entry = InvocationAuditEntry {
            ts: now,
            request_id,
            operation,
            params,
            ok,
            message,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        };

        if let Err(e) = fs::create_dir_all(&self.dir) {
            tracing::debug!(dir = %self.dir.display(), error = %e, "audit dir unavailable");
            return;
        }

        let path = self.dir.join(format!("{}.jsonl", date_from_epoch(now)));

        if let Ok(json) = serde_json::to_string(&entry) {
            if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&path) {
                let _ = writeln!(file, "{json}");
            }
        }
    }
}

/// Format epoch seconds as `YYYY-MM-DD` without external deps.
#[allow(clippy::unreadable_literal, clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn date_from_epoch(epoch_secs: u64) -> String {
    // Civil date from day count (algorithm from Howard Hinnant)
    let days = (epoch_secs / 86400) as i64;
    let z = days + 719468;
    let era = (if z >= 0 { z } else { z - 146096 }) / 146097;
    let doe = (z - era * 146097) as u64; // day of era [0, 146096]
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = (yoe as i64) + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };

    format!("{y:04}-{m:02}-{d:02}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_date_from_epoch() {
        // 2025-02-24 00:00:00 UTC = 1740355200
        assert_eq!(date_from_epoch(1_740_355_200), "2025-02-24");
        assert_eq!(date_from_epoch(0), "1970-01-01");
        assert_eq!(date_from_epoch(946_684_800), "2000-01-01");
        assert_eq!(date_from_epoch(1_740_355_200 + 86399), "2025-02-24");
    }

    #[test]
    fn test_log_invocation_appends_line() {
        let dir = std::env::temp_dir().join("editor_relay_test_audit");
        let _ = fs::remove_dir_all(&dir);
        let log = AuditLog::new(&dir);
        let params = serde_json::json!({ "size": 2 });

        log.log_invocation("req-1", "create_cube", &params, Ok(()), Duration::from_millis(5));
        log.log_invocation(
            "req-2",
            "rename",
            &params,
            Err("no such object"),
            Duration::from_millis(1),
        );

        let file = fs::read_dir(&dir).unwrap().next().unwrap().unwrap().path();
        let text = fs::read_to_string(file).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["operation"], "create_cube");
        assert_eq!(lines[0]["ok"], true);
        assert_eq!(lines[1]["ok"], false);
        assert_eq!(lines[1]["message"], "no such object");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_unwritable_dir_does_not_panic() {
        let log = AuditLog::new("/proc/editor-relay-audit-cannot-exist");
        log.log_invocation(
            "req",
            "noop",
            &serde_json::Value::Null,
            Ok(()),
            Duration::ZERO,
        );
    }
}
