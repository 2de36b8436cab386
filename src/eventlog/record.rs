//! `EventRecord` and severity inference (spec.md §3, §4.4).

use std::fmt;

/// Severity, inferred from the event's `code` token — never set directly
/// by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    /// Infer severity from a code token per spec.md §4.4's substring rules,
    /// checked in the order given there (ERROR-like tokens win first).
    #[must_use]
    pub fn infer(code: &str) -> Self {
        if contains_any(code, &["ERR", "ERROR", "FAIL"]) {
            Self::Error
        } else if contains_any(code, &["WARN", "WARNING", "RESPALDO", "TS_INVALID_BACKUP"]) {
            Self::Warn
        } else if code.contains("DEBUG") {
            Self::Debug
        } else {
            Self::Info
        }
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        })
    }
}

/// One forensic log line: `ts_iso, ts_us, level, module, code, state, kv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub ts_iso: String,
    pub ts_us: u64,
    pub level: Severity,
    pub module: String,
    pub code: String,
    pub state: String,
    pub kv: String,
}

impl EventRecord {
    /// Format as one CSV line (without trailing newline). Commas and line
    /// breaks in `kv` are replaced with `.` and space, per spec.md §4.4.
    #[must_use]
    pub fn to_csv_line(&self) -> String {
        format!(
            "{},{},{},{},{},{},{}",
            self.ts_iso,
            self.ts_us,
            self.level,
            self.module,
            self.code,
            self.state,
            sanitize_kv(&self.kv)
        )
    }
}

fn sanitize_kv(kv: &str) -> String {
    kv.replace(['\n', '\r'], " ").replace(',', ".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_error_from_err_token() {
        assert_eq!(Severity::infer("UPLOAD_ERR"), Severity::Error);
        assert_eq!(Severity::infer("API_FAIL"), Severity::Error);
    }

    #[test]
    fn infers_warn_from_respaldo() {
        assert_eq!(Severity::infer("RESPALDO_STORE"), Severity::Warn);
        assert_eq!(Severity::infer("TS_INVALID_BACKUP"), Severity::Warn);
    }

    #[test]
    fn infers_debug() {
        assert_eq!(Severity::infer("LOOP_DEBUG"), Severity::Debug);
    }

    #[test]
    fn defaults_to_info() {
        assert_eq!(Severity::infer("BOOT_OK"), Severity::Info);
    }

    #[test]
    fn sanitizes_commas_and_newlines_in_kv() {
        let record = EventRecord {
            ts_iso: "2025-08-21T00:00:00Z".to_string(),
            ts_us: 1,
            level: Severity::Info,
            module: "API".to_string(),
            code: "API_ERR".to_string(),
            state: "Idle".to_string(),
            kv: "a=1,b=2\nc=3".to_string(),
        };
        let line = record.to_csv_line();
        assert!(!line.contains('\n'));
        assert_eq!(line, "2025-08-21T00:00:00Z,1,INFO,API,API_ERR,Idle,a=1.b=2 c=3");
    }
}
