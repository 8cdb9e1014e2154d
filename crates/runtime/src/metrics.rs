use std::collections::BTreeMap;

/// Deterministic metrics aggregation keyed by a caller-defined metric type.
///
/// Keys are usually a small `Copy` enum. Sorted maps keep snapshots stable
/// so they can be logged and compared in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metrics<K: Ord + Copy> {
    counters: BTreeMap<K, u64>,
    gauges: BTreeMap<K, i64>,
    histograms: BTreeMap<K, Histogram>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Histogram {
    pub count: u64,
    pub sum: i64,
    pub min: i64,
    pub max: i64,
}

impl Histogram {
    pub fn record(&mut self, value: i64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum as f64 / self.count as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot<K> {
    pub counters: Vec<(K, u64)>,
    pub gauges: Vec<(K, i64)>,
    pub histograms: Vec<(K, Histogram)>,
}

impl<K: Ord + Copy> Default for Metrics<K> {
    fn default() -> Self {
        Self {
            counters: BTreeMap::new(),
            gauges: BTreeMap::new(),
            histograms: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Copy> Metrics<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.counters.clear();
        self.gauges.clear();
        self.histograms.clear();
    }

    pub fn counter(&self, key: K) -> u64 {
        self.counters.get(&key).copied().unwrap_or(0)
    }

    pub fn inc_counter(&mut self, key: K, by: u64) {
        *self.counters.entry(key).or_insert(0) += by;
    }

    pub fn gauge(&self, key: K) -> Option<i64> {
        self.gauges.get(&key).copied()
    }

    pub fn set_gauge(&mut self, key: K, value: i64) {
        self.gauges.insert(key, value);
    }

    pub fn record_histogram(&mut self, key: K, value: i64) {
        self.histograms.entry(key).or_default().record(value);
    }

    pub fn histogram(&self, key: K) -> Option<Histogram> {
        self.histograms.get(&key).copied()
    }

    pub fn snapshot(&self) -> MetricsSnapshot<K> {
        MetricsSnapshot {
            counters: self.counters.iter().map(|(k, v)| (*k, *v)).collect(),
            gauges: self.gauges.iter().map(|(k, v)| (*k, *v)).collect(),
            histograms: self.histograms.iter().map(|(k, v)| (*k, *v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Histogram, Metrics};
    use pretty_assertions::assert_eq;

    #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
    enum Key {
        Sent,
        Received,
        Pending,
    }

    #[test]
    fn counters_accumulate() {
        let mut m = Metrics::new();
        m.inc_counter(Key::Sent, 1);
        m.inc_counter(Key::Sent, 2);
        assert_eq!(m.counter(Key::Sent), 3);
        assert_eq!(m.counter(Key::Received), 0);
    }

    #[test]
    fn gauges_overwrite() {
        let mut m = Metrics::new();
        assert_eq!(m.gauge(Key::Pending), None);
        m.set_gauge(Key::Pending, 10);
        m.set_gauge(Key::Pending, 11);
        assert_eq!(m.gauge(Key::Pending), Some(11));
    }

    #[test]
    fn histogram_tracks_min_max_sum_count() {
        let mut h = Histogram::default();
        assert_eq!(h.mean(), None);
        h.record(5);
        h.record(-2);
        h.record(7);
        assert_eq!(h.count, 3);
        assert_eq!(h.sum, 10);
        assert_eq!(h.min, -2);
        assert_eq!(h.max, 7);
    }

    #[test]
    fn snapshot_follows_key_order() {
        let mut m = Metrics::new();
        m.inc_counter(Key::Received, 1);
        m.inc_counter(Key::Sent, 4);
        m.set_gauge(Key::Pending, 2);
        m.record_histogram(Key::Received, 10);
        m.record_histogram(Key::Sent, 5);

        let snap = m.snapshot();
        assert_eq!(snap.counters, vec![(Key::Sent, 4), (Key::Received, 1)]);
        assert_eq!(snap.gauges, vec![(Key::Pending, 2)]);
        assert_eq!(snap.histograms.len(), 2);
        assert_eq!(snap.histograms[0].0, Key::Sent);

        m.clear();
        assert_eq!(m.counter(Key::Sent), 0);
    }
}
