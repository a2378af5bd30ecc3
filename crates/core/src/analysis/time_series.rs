/// Ordered red-intensity samples, one per frame that produced a usable ROI.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimeSeriesAccumulator {
    samples: Vec<f64>,
    skipped: usize,
}

impl TimeSeriesAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            skipped: 0,
        }
    }

    pub fn push(&mut self, sample: f64) {
        self.samples.push(sample);
    }

    /// Appends the sample if the frame produced one, otherwise counts the
    /// frame as skipped.
    pub fn record(&mut self, sample: Option<f64>) {
        match sample {
            Some(v) => self.push(v),
            None => self.skipped += 1,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Frames that contributed no sample.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn into_samples(self) -> Vec<f64> {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_empty() {
        let acc = TimeSeriesAccumulator::new();
        assert!(acc.is_empty());
        assert_eq!(acc.len(), 0);
        assert_eq!(acc.skipped(), 0);
    }

    #[test]
    fn test_record_keeps_order_and_counts_skips() {
        let mut acc = TimeSeriesAccumulator::with_capacity(5);
        acc.record(Some(3.0));
        acc.record(None);
        acc.record(Some(1.0));
        acc.record(None);
        acc.push(2.0);

        assert_eq!(acc.samples(), &[3.0, 1.0, 2.0]);
        assert_eq!(acc.skipped(), 2);
        assert_eq!(acc.into_samples(), vec![3.0, 1.0, 2.0]);
    }
}
