//! Contadores de rótulos passados explicitamente ao decodificador.

use std::collections::BTreeMap;

/// Destino das contagens de rótulos emitidos durante a decodificação.
pub trait MetricsSink {
    fn record_label(&mut self, label: &str);
}

impl<M: MetricsSink + ?Sized> MetricsSink for &mut M {
    fn record_label(&mut self, label: &str) {
        (**self).record_label(label);
    }
}

/// Descarta tudo.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_label(&mut self, _label: &str) {}
}

/// Conta ocorrências por rótulo, em ordem alfabética.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LabelCounts(pub BTreeMap<String, u64>);

impl LabelCounts {
    pub fn get(&self, label: &str) -> u64 {
        self.0.get(label).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    /// Soma as contagens de outro sink (ex: resultado de outra thread).
    pub fn merge(&mut self, other: &LabelCounts) {
        for (label, count) in &other.0 {
            *self.0.entry(label.clone()).or_insert(0) += count;
        }
    }
}

impl MetricsSink for LabelCounts {
    fn record_label(&mut self, label: &str) {
        *self.0.entry(label.to_string()).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_counts() {
        let mut counts = LabelCounts::default();
        counts.record_label("LOCATION");
        counts.record_label("LOCATION");
        counts.record_label("PERSON");
        assert_eq!(counts.get("LOCATION"), 2);
        assert_eq!(counts.get("TITLE"), 0);

        let mut other = LabelCounts::default();
        other.record_label("PERSON");
        counts.merge(&other);
        assert_eq!(counts.get("PERSON"), 2);
        assert_eq!(counts.total(), 4);
    }
}
