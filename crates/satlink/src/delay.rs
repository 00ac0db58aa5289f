// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Satellite delay model.
//!
//! The sender enqueues with the current delay, the receiver reads it on
//! arrival; both stacks may query concurrently, so the values sit behind a
//! single mutex.

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::Mutex;

/// Per-carrier satellite delay, mutex-protected.
#[derive(Debug, Default)]
pub struct DelayMap {
    delays: Mutex<BTreeMap<u16, Duration>>,
}

impl DelayMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current delay of a carrier (zero when never set).
    pub fn delay(&self, carrier_id: u16) -> Duration {
        self.delays
            .lock()
            .get(&carrier_id)
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Update the delay of a carrier.
    pub fn set_delay(&self, carrier_id: u16, delay: Duration) {
        self.delays.lock().insert(carrier_id, delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_carrier_has_zero_delay() {
        let map = DelayMap::new();
        assert_eq!(map.delay(3), Duration::ZERO);
    }

    #[test]
    fn set_then_get() {
        let map = DelayMap::new();
        map.set_delay(3, Duration::from_millis(250));
        assert_eq!(map.delay(3), Duration::from_millis(250));
        map.set_delay(3, Duration::from_millis(270));
        assert_eq!(map.delay(3), Duration::from_millis(270));
    }

    #[test]
    fn concurrent_access_is_safe() {
        use std::sync::Arc;
        let map = Arc::new(DelayMap::new());
        let writer = {
            let map = Arc::clone(&map);
            std::thread::spawn(move || {
                for i in 0..1000u64 {
                    map.set_delay(1, Duration::from_micros(i));
                }
            })
        };
        for _ in 0..1000 {
            let _ = map.delay(1);
        }
        writer.join().unwrap();
    }
}
