//! Per-symbol rolling z-score standardization of feature vectors.

use std::collections::{HashMap, VecDeque};

/// Maintains a bounded history per symbol/dimension and z-scores each new
/// feature vector against it.
///
/// Uses population variance (the original's `sum((x - mean) ** 2) / n`, not
/// Bessel-corrected), matching `instrument/features.py::FeatureStandardizer`.
pub struct Standardizer {
    window: usize,
    history: HashMap<String, Vec<VecDeque<f64>>>,
}

impl Standardizer {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(2),
            history: HashMap::new(),
        }
    }

    fn ensure_buckets(&mut self, symbol: &str, dimensions: usize) -> &mut Vec<VecDeque<f64>> {
        let needs_reset = self
            .history
            .get(symbol)
            .map(|b| b.len() != dimensions)
            .unwrap_or(true);
        if needs_reset {
            let buckets = (0..dimensions)
                .map(|_| VecDeque::with_capacity(self.window))
                .collect();
            self.history.insert(symbol.to_string(), buckets);
        }
        self.history.get_mut(symbol).expect("just inserted")
    }

    /// Z-score `vector` against this symbol's rolling history, pushing the
    /// (sanitized) values into that history as a side effect. Non-finite
    /// inputs are treated as zero. Returns an empty vector for an empty
    /// input, and zero for any dimension with fewer than two observations
    /// or with near-zero variance.
    pub fn transform(&mut self, symbol: &str, vector: &[f64]) -> Vec<f64> {
        if vector.is_empty() {
            return Vec::new();
        }
        let window = self.window;
        let buckets = self.ensure_buckets(symbol, vector.len());

        let mut out = Vec::with_capacity(vector.len());
        for (bucket, &value) in buckets.iter_mut().zip(vector) {
            let safe_value = if value.is_finite() { value } else { 0.0 };
            if bucket.len() == window {
                bucket.pop_front();
            }
            bucket.push_back(safe_value);

            if bucket.len() < 2 {
                out.push(0.0);
                continue;
            }
            let n = bucket.len() as f64;
            let mean = bucket.iter().sum::<f64>() / n;
            let variance = bucket.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
            let std = variance.sqrt();
            if std <= 1e-9 {
                out.push(0.0);
            } else {
                out.push((safe_value - mean) / std);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_vector_passes_through_empty() {
        let mut s = Standardizer::new(30);
        assert_eq!(s.transform("AAPL", &[]), Vec::<f64>::new());
    }

    #[test]
    fn first_observation_is_zero() {
        let mut s = Standardizer::new(30);
        assert_eq!(s.transform("AAPL", &[1.0, 2.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn constant_series_has_zero_std_and_yields_zero() {
        let mut s = Standardizer::new(30);
        for _ in 0..5 {
            let out = s.transform("AAPL", &[5.0]);
            assert_eq!(out, vec![0.0]);
        }
    }

    #[test]
    fn non_finite_input_is_sanitized_to_zero() {
        let mut s = Standardizer::new(30);
        s.transform("AAPL", &[1.0]);
        let out = s.transform("AAPL", &[f64::NAN]);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_finite());
    }

    #[test]
    fn window_is_bounded() {
        let mut s = Standardizer::new(3);
        for i in 0..10 {
            s.transform("AAPL", &[i as f64]);
        }
        let buckets = s.history.get("AAPL").unwrap();
        assert_eq!(buckets[0].len(), 3);
    }

    #[test]
    fn dimension_change_resets_history() {
        let mut s = Standardizer::new(30);
        s.transform("AAPL", &[1.0, 2.0]);
        s.transform("AAPL", &[1.0, 2.0]);
        let out = s.transform("AAPL", &[1.0, 2.0, 3.0]);
        assert_eq!(out, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn symbols_are_independent() {
        let mut s = Standardizer::new(30);
        s.transform("AAPL", &[1.0]);
        let out = s.transform("MSFT", &[1.0]);
        assert_eq!(out, vec![0.0]);
    }
}
