/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Process-wide key/value store shared between tick-driven services.
//!
//! Each value family (booleans, numerics, strings) sits behind its own
//! `RwLock`.  A single read or write is atomic for its key; there is no way
//! to read or write several keys as one transaction, and readers may see a
//! mix of values written in different ticks.  Callers must not rely on
//! anything stronger.
//!
//! The arbitration core never sees [`SharedValues`] directly.  It reads
//! through [`InputSource`] and writes through [`DiagnosticsSink`].

use std::collections::HashMap;

use parking_lot::RwLock;

/// Key under which the state machine publishes the active set each tick.
pub const ACTIVE_STATES_KEY: &str = "active states";

/// Read side: inputs other services have published.
pub trait InputSource: Send + Sync {
    /// Missing keys read as `false`.
    fn boolean(&self, key: &str) -> bool;
}

/// Write side: diagnostics for dashboards.  Values are overwritten, never
/// appended.
pub trait DiagnosticsSink: Send + Sync {
    fn publish_string(&self, key: &str, value: String);

    fn publish_numeric(&self, key: &str, value: f64);
}

/// Concurrent maps of named booleans, numerics and strings.
#[derive(Debug, Default)]
pub struct SharedValues {
    booleans: RwLock<HashMap<String, bool>>,
    numerics: RwLock<HashMap<String, f64>>,
    strings: RwLock<HashMap<String, String>>,
}

impl SharedValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_boolean(&self, key: &str, value: bool) {
        self.booleans.write().insert(key.to_string(), value);
    }

    pub fn get_boolean(&self, key: &str) -> bool {
        self.booleans.read().get(key).copied().unwrap_or(false)
    }

    pub fn set_numeric(&self, key: &str, value: f64) {
        self.numerics.write().insert(key.to_string(), value);
    }

    pub fn get_numeric(&self, key: &str) -> f64 {
        self.numerics.read().get(key).copied().unwrap_or(0.0)
    }

    pub fn set_string(&self, key: &str, value: impl Into<String>) {
        self.strings.write().insert(key.to_string(), value.into());
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.strings.read().get(key).cloned()
    }
}

impl InputSource for SharedValues {
    fn boolean(&self, key: &str) -> bool {
        self.get_boolean(key)
    }
}

impl DiagnosticsSink for SharedValues {
    fn publish_string(&self, key: &str, value: String) {
        self.set_string(key, value);
    }

    fn publish_numeric(&self, key: &str, value: f64) {
        self.set_numeric(key, value);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn missing_keys_have_neutral_defaults() {
        let values = SharedValues::new();
        assert!(!values.get_boolean("ipb_unknown"));
        assert_eq!(values.get_numeric("ipn_unknown"), 0.0);
        assert_eq!(values.get_string("unknown"), None);
    }

    #[test]
    fn writes_overwrite() {
        let values = SharedValues::new();
        values.set_boolean("ipb_ready", true);
        values.set_boolean("ipb_ready", false);
        values.publish_string(ACTIVE_STATES_KEY, "[a]".into());
        values.publish_string(ACTIVE_STATES_KEY, "[b]".into());

        assert!(!InputSource::boolean(&values, "ipb_ready"));
        assert_eq!(values.get_string(ACTIVE_STATES_KEY).as_deref(), Some("[b]"));
    }

    #[test]
    fn concurrent_writers_on_distinct_keys() {
        let values = Arc::new(SharedValues::new());
        let handles: Vec<_> = (0..4)
            .map(|n| {
                let values = values.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        values.set_numeric(&format!("ipn_{n}"), i as f64);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        for n in 0..4 {
            assert_eq!(values.get_numeric(&format!("ipn_{n}")), 99.0);
        }
    }
}
