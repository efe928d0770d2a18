//! Event sink: renders core events through `tracing`. Kinds named in
//! the configured mask log at info, everything else at debug.

use wsteer_core::event::Event;

/// Which event kinds deserve info-level logging.
#[derive(Debug, Clone)]
pub struct EventLogMask {
    /// `None` means every kind.
    kinds: Option<Vec<String>>,
}

impl EventLogMask {
    pub fn new(kinds: Option<Vec<String>>) -> Self {
        EventLogMask { kinds }
    }

    fn kind_name(event: &Event) -> String {
        serde_json::to_value(event.kind)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default()
    }

    pub fn log(&self, event: &Event) {
        let kind = Self::kind_name(event);
        let detail = serde_json::to_string(event).unwrap_or_default();

        let elevated = match &self.kinds {
            None => true,
            Some(kinds) => kinds.iter().any(|k| k == &kind),
        };

        if elevated {
            tracing::info!(%kind, %detail, "steering event");
        } else {
            tracing::debug!(%kind, %detail, "steering event");
        }
    }
}
