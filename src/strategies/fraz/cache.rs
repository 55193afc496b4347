//! Measurement cache keyed by the exact bit patterns of the input vector.
//!
//! Shared across evaluation threads; insertion-only during a search, then
//! drained to recover the full measurement of the winning input.

use rustc_hash::FxHashMap;
use std::sync::Mutex;

pub(crate) type BitKey = Vec<u64>;

pub(crate) fn bit_key(xs: &[f64]) -> BitKey {
    xs.iter().map(|x| x.to_bits()).collect()
}

#[derive(Debug, Default)]
pub(crate) struct EvalCache {
    entries: Mutex<FxHashMap<BitKey, Vec<f64>>>,
}

impl EvalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, xs: &[f64], measurement: Vec<f64>) {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .insert(bit_key(xs), measurement);
    }

    pub fn get(&self, xs: &[f64]) -> Option<Vec<f64>> {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .get(&bit_key(xs))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }
}
