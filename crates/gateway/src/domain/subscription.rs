use candela_core::Timeframe;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One streamed (symbol, timeframe) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Subscription {
    pub symbol: String,
    pub timeframe: Timeframe,
}

/// Symbols × timeframe currently streamed
///
/// Owned by the connection session; it outlives any one socket and is
/// replayed against every new connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet {
    by_timeframe: BTreeMap<Timeframe, BTreeSet<String>>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the symbols that were not already present
    pub fn add(&mut self, symbols: &[String], timeframe: Timeframe) -> Vec<String> {
        let entry = self.by_timeframe.entry(timeframe).or_default();
        symbols
            .iter()
            .filter(|s| entry.insert((*s).clone()))
            .cloned()
            .collect()
    }

    /// Returns the symbols that were actually removed
    pub fn remove(&mut self, symbols: &[String], timeframe: Timeframe) -> Vec<String> {
        let Some(entry) = self.by_timeframe.get_mut(&timeframe) else {
            return Vec::new();
        };
        let removed = symbols
            .iter()
            .filter(|s| entry.remove(s.as_str()))
            .cloned()
            .collect();
        if entry.is_empty() {
            self.by_timeframe.remove(&timeframe);
        }
        removed
    }

    pub fn contains(&self, symbol: &str, timeframe: Timeframe) -> bool {
        self.by_timeframe
            .get(&timeframe)
            .is_some_and(|s| s.contains(symbol))
    }

    pub fn is_empty(&self) -> bool {
        self.by_timeframe.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_timeframe.values().map(|s| s.len()).sum()
    }

    /// Subscribed timeframes, finest first
    pub fn timeframes(&self) -> Vec<Timeframe> {
        self.by_timeframe.keys().copied().collect()
    }

    pub fn finest_timeframe(&self) -> Option<Timeframe> {
        self.by_timeframe.keys().next().copied()
    }

    pub fn symbols_for(&self, timeframe: Timeframe) -> Vec<String> {
        self.by_timeframe
            .get(&timeframe)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Distinct symbols across every timeframe
    pub fn symbols(&self) -> Vec<String> {
        let all: BTreeSet<&String> = self.by_timeframe.values().flatten().collect();
        all.into_iter().cloned().collect()
    }

    /// Grouped view used to replay subscriptions on a new socket
    pub fn groups(&self) -> impl Iterator<Item = (Timeframe, Vec<String>)> + '_ {
        self.by_timeframe
            .iter()
            .map(|(tf, symbols)| (*tf, symbols.iter().cloned().collect()))
    }

    pub fn snapshot(&self) -> Vec<Subscription> {
        self.by_timeframe
            .iter()
            .flat_map(|(tf, symbols)| {
                symbols.iter().map(move |s| Subscription {
                    symbol: s.clone(),
                    timeframe: *tf,
                })
            })
            .collect()
    }
}
