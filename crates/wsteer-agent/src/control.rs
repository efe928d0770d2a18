//! Operator surface: one-line requests on a unix socket, answered with
//! a JSON document. Read-only; anything configurable goes through the
//! config file and a restart.

use serde::Serialize;
use serde_json::json;
use wsteer_core::sta::EventType;
use wsteer_core::SteerCore;

/// Aggregate admission counters for one event type.
#[derive(Debug, Default, Clone, Copy, Serialize)]
struct CounterTotals {
    requests: u64,
    blocked_total: u64,
}

fn counters(core: &SteerCore) -> serde_json::Value {
    let mut totals = [CounterTotals::default(); EventType::COUNT];

    for sta in core.registry.sta_ids() {
        for &si in core.registry.sta(sta).info_ids() {
            for (slot, stats) in totals.iter_mut().zip(core.registry.sta_info(si).stats.iter()) {
                slot.requests += stats.requests as u64;
                slot.blocked_total += stats.blocked_total as u64;
            }
        }
    }

    json!({
        "probe": totals[EventType::Probe.index()],
        "auth": totals[EventType::Auth.index()],
        "assoc": totals[EventType::Assoc.index()],
    })
}

/// Answer one request line. Unknown commands get an error document.
pub fn handle_request(core: &SteerCore, line: &str) -> String {
    let response = match line.trim() {
        "status" => serde_json::to_value(core.status()).unwrap_or_default(),
        "config" => serde_json::to_value(&core.config).unwrap_or_default(),
        "counters" => counters(core),
        other => json!({ "error": format!("unknown command: {other}") }),
    };

    response.to_string()
}
