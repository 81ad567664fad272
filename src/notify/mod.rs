//! Outbound notification dispatch.
//!
//! Conquest sends "you lost territory" messages, but delivery transport is a
//! collaborator, not part of the engine. Dispatch is fire-and-forget:
//! implementations swallow their own failures, and the engine never waits on
//! or inspects the result.

use std::sync::Mutex;

use uuid::Uuid;

/// Sink for conquest notifications.
pub trait Notifier: Send + Sync {
    /// A defender lost ground to an attacker.
    fn territory_lost(&self, defender_id: Uuid, attacker_id: Uuid, area_m2: f64);
}

/// Default sink: structured log lines only.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn territory_lost(&self, defender_id: Uuid, attacker_id: Uuid, area_m2: f64) {
        tracing::info!(
            defender = %defender_id,
            attacker = %attacker_id,
            area_m2,
            "territory lost"
        );
    }
}

/// In-memory sink that records every dispatch, for tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<(Uuid, Uuid, f64)>>,
}

impl Notifier for RecordingNotifier {
    fn territory_lost(&self, defender_id: Uuid, attacker_id: Uuid, area_m2: f64) {
        if let Ok(mut events) = self.events.lock() {
            events.push((defender_id, attacker_id, area_m2));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_notifier_captures_dispatches() {
        let notifier = RecordingNotifier::default();
        let (d, a) = (Uuid::new_v4(), Uuid::new_v4());
        notifier.territory_lost(d, a, 42.0);
        let events = notifier.events.lock().unwrap();
        assert_eq!(events.as_slice(), &[(d, a, 42.0)]);
    }
}
