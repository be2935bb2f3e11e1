//! Minimal metrics for the relay, rendered in Prometheus text format.
//!
//! The metric set is fixed and small, so plain atomics suffice; the only
//! labelled family (relayed envelopes by kind) is keyed by the static wire
//! names from the proto crate.

use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use dashmap::DashMap;

#[derive(Default)]
pub struct RelayMetrics {
    ws_upgrades: AtomicU64,
    sessions_active: AtomicI64,
    decode_errors: AtomicU64,
    sends_dropped: AtomicU64,
    relayed: DashMap<&'static str, AtomicU64>,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_opened(&self) {
        self.ws_upgrades.fetch_add(1, Ordering::Relaxed);
        self.sessions_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        self.sessions_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn send_dropped(&self) {
        self.sends_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn relayed(&self, kind: &'static str) {
        self.relayed
            .entry(kind)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Prometheus text exposition.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# TYPE vimbalambi_ws_upgrades_total counter");
        let _ = writeln!(
            out,
            "vimbalambi_ws_upgrades_total {}",
            self.ws_upgrades.load(Ordering::Relaxed)
        );
        let _ = writeln!(out, "# TYPE vimbalambi_ws_sessions_active gauge");
        let _ = writeln!(
            out,
            "vimbalambi_ws_sessions_active {}",
            self.sessions_active.load(Ordering::Relaxed)
        );
        let _ = writeln!(out, "# TYPE vimbalambi_envelopes_relayed_total counter");
        for r in self.relayed.iter() {
            let _ = writeln!(
                out,
                "vimbalambi_envelopes_relayed_total{{kind=\"{}\"}} {}",
                r.key(),
                r.value().load(Ordering::Relaxed)
            );
        }
        let _ = writeln!(out, "# TYPE vimbalambi_decode_errors_total counter");
        let _ = writeln!(
            out,
            "vimbalambi_decode_errors_total {}",
            self.decode_errors.load(Ordering::Relaxed)
        );
        let _ = writeln!(out, "# TYPE vimbalambi_sends_dropped_total counter");
        let _ = writeln!(
            out,
            "vimbalambi_sends_dropped_total {}",
            self.sends_dropped.load(Ordering::Relaxed)
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_all_families() {
        let m = RelayMetrics::new();
        m.session_opened();
        m.relayed("message");
        m.relayed("message");
        m.decode_error();

        let out = m.render();
        assert!(out.contains("vimbalambi_ws_upgrades_total 1"));
        assert!(out.contains("vimbalambi_ws_sessions_active 1"));
        assert!(out.contains("vimbalambi_envelopes_relayed_total{kind=\"message\"} 2"));
        assert!(out.contains("vimbalambi_decode_errors_total 1"));
        assert!(out.contains("vimbalambi_sends_dropped_total 0"));
    }
}
