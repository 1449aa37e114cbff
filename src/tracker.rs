//! Update decision tracking
//!
//! Decides, per field, whether a freshly decoded value should be forwarded to
//! the output boundary. A value is forwarded on first observation, when it
//! differs from the last forwarded value, or when the heartbeat interval has
//! elapsed since the last forward. The heartbeat exists so downstream
//! consumers can distinguish "unchanged" from "stale".

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::registers::FieldValue;
use crate::snapshot::Snapshot;

#[derive(Debug, Clone)]
struct TrackedField {
    last_value: FieldValue,
    last_forwarded: Instant,
}

/// Per-field forwarding state.
#[derive(Debug)]
pub struct UpdateTracker {
    entries: HashMap<&'static str, TrackedField>,
    heartbeat: Duration,
    /// Tolerance below which two numeric values count as equal. Zero means
    /// exact comparison.
    epsilon: f64,
}

impl UpdateTracker {
    pub fn new(heartbeat: Duration, epsilon: f64) -> Self {
        Self {
            entries: HashMap::new(),
            heartbeat,
            epsilon,
        }
    }

    fn changed(epsilon: f64, previous: &FieldValue, current: &FieldValue) -> bool {
        match (previous, current) {
            (FieldValue::Numeric(a), FieldValue::Numeric(b)) => (a - b).abs() > epsilon,
            // Enum labels and flags compare exactly, a state transition is
            // always a change
            (a, b) => a != b,
        }
    }

    /// Decide which fields of a snapshot to forward, updating tracker state.
    ///
    /// Heartbeat-driven forwards refresh the timestamp but keep the stored
    /// value, so a subsequent real change is still detected against the value
    /// last seen by consumers.
    pub fn decide(&mut self, snapshot: &Snapshot, now: Instant) -> Vec<&'static str> {
        let mut forward = Vec::new();
        let epsilon = self.epsilon;

        for (id, reading) in snapshot.iter() {
            match self.entries.get_mut(id) {
                None => {
                    // First observation
                    self.entries.insert(
                        id,
                        TrackedField {
                            last_value: reading.value.clone(),
                            last_forwarded: now,
                        },
                    );
                    forward.push(id);
                },
                Some(entry) => {
                    if Self::changed(epsilon, &entry.last_value, &reading.value) {
                        entry.last_value = reading.value.clone();
                        entry.last_forwarded = now;
                        forward.push(id);
                    } else if now.duration_since(entry.last_forwarded) >= self.heartbeat {
                        entry.last_forwarded = now;
                        forward.push(id);
                    }
                },
            }
        }

        forward
    }

    /// Drop all state; every field becomes a first observation again.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    fn tracked(&self, id: &str) -> Option<&FieldValue> {
        self.entries.get(id).map(|e| &e.last_value)
    }
}
