//! Named invalidation channels.
//!
//! A [`Signal`] maps channel names to generation counters. Cache entries hold
//! a [`SignalToken`] snapshot taken when they were populated; a `trigger` on
//! the channel bumps the generation and every older token reports
//! `has_changed()`.
//!
//! `trigger` stores with `Release` and tokens load with `Acquire`, so a
//! trigger that returns before a lookup starts is always seen by it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

/// Process-wide broadcast of "this named thing changed". Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Signal {
    channels: Arc<Mutex<HashMap<String, Arc<AtomicU64>>>>,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&self, name: &str) -> Arc<AtomicU64> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(channels.entry(name.to_owned()).or_default())
    }

    /// Snapshot the current generation of `name`.
    pub fn token(&self, name: &str) -> SignalToken {
        let counter = self.channel(name);
        let generation = counter.load(Ordering::Acquire);
        SignalToken {
            channel: name.to_owned(),
            generation,
            counter,
        }
    }

    /// Advance `name`, invalidating every token taken before this call.
    pub fn trigger(&self, name: &str) {
        let generation = self.channel(name).fetch_add(1, Ordering::AcqRel) + 1;
        debug!(channel = name, generation, "signal triggered");
    }
}

/// A generation snapshot of one channel.
#[derive(Debug, Clone)]
pub struct SignalToken {
    channel: String,
    generation: u64,
    counter: Arc<AtomicU64>,
}

impl SignalToken {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True once the channel has been triggered after this token was taken.
    pub fn has_changed(&self) -> bool {
        self.counter.load(Ordering::Acquire) != self.generation
    }
}
