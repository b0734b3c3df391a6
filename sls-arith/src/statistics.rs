//! Named counters reported by the engine.

use rustc_hash::FxHashMap;
use std::fmt;

/// A sink of named counters. `update` accumulates, so repeated collection
/// rounds add up the way an external statistics display expects.
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    entries: FxHashMap<&'static str, u64>,
}

impl Statistics {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `value` to the counter `key`.
    pub fn update(&mut self, key: &'static str, value: u64) {
        *self.entries.entry(key).or_insert(0) += value;
    }

    /// Current value of a counter.
    #[must_use]
    pub fn get(&self, key: &str) -> u64 {
        self.entries.get(key).copied().unwrap_or(0)
    }

    /// Iterate over all counters.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, *v))
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by_key(|(k, _)| *k);
        for (k, v) in entries {
            writeln!(f, "{k}: {v}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_accumulates() {
        let mut st = Statistics::new();
        st.update("moves", 3);
        st.update("moves", 4);
        assert_eq!(st.get("moves"), 7);
        assert_eq!(st.get("absent"), 0);
    }
}
