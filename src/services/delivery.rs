//! Result delivery boundary
//!
//! Reports and error messages leave the engine through a [`ReportSink`].
//! The binary writes them as JSON lines on stdout; rendering them is up to
//! whatever consumes that stream.

use std::io::Write;
use std::sync::Mutex;

use serde::Serialize;
use tracing::error;

use crate::types::PlaytimeReport;

pub trait ReportSink: Send + Sync {
    /// Deliver a freshly computed report
    fn deliver(&self, report: &PlaytimeReport);

    /// Deliver a human-readable error on the separate error channel
    fn report_error(&self, identity: &str, message: &str);
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Notification<'a> {
    Playtime(&'a PlaytimeReport),
    UpdateError {
        identity: &'a str,
        message: &'a str,
    },
}

/// Writes one JSON object per line
pub struct JsonLinesSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn emit(&self, notification: &Notification<'_>) {
        let line = match serde_json::to_string(notification) {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "failed to serialize notification");
                return;
            }
        };

        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
            error!(error = %e, "failed to write notification");
        }
    }
}

impl<W: Write + Send> ReportSink for JsonLinesSink<W> {
    fn deliver(&self, report: &PlaytimeReport) {
        self.emit(&Notification::Playtime(report));
    }

    fn report_error(&self, identity: &str, message: &str) {
        self.emit(&Notification::UpdateError { identity, message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReportStats;
    use chrono::Utc;

    fn make_report() -> PlaytimeReport {
        PlaytimeReport {
            identity: "42".into(),
            generated_at: Utc::now(),
            days: Vec::new(),
            stats: ReportStats {
                unique_days_observed: 3,
                unique_entities_with_change: 1,
            },
        }
    }

    fn lines(sink: JsonLinesSink<Vec<u8>>) -> Vec<serde_json::Value> {
        let bytes = sink.into_inner();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_deliver_writes_tagged_report() {
        let sink = JsonLinesSink::new(Vec::new());

        sink.deliver(&make_report());

        let out = lines(sink);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["type"], "playtime");
        assert_eq!(out[0]["identity"], "42");
        assert_eq!(out[0]["stats"]["unique_days_observed"], 3);
    }

    #[test]
    fn test_report_error_separate_type() {
        let sink = JsonLinesSink::new(Vec::new());

        sink.report_error("42", "fetch error: 503: Service Unavailable");

        let out = lines(sink);
        assert_eq!(out[0]["type"], "update_error");
        assert_eq!(out[0]["identity"], "42");
        assert_eq!(out[0]["message"], "fetch error: 503: Service Unavailable");
    }

    #[test]
    fn test_report_roundtrips_from_line() {
        let sink = JsonLinesSink::new(Vec::new());
        let report = make_report();

        sink.deliver(&report);

        let bytes = sink.into_inner();
        let parsed: PlaytimeReport = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, report);
    }
}
