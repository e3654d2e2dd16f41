use ndarray::Array3;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// Complex-valued reconstruction field (object or reciprocal space).
pub type CplxField = Array3<Complex64>;
/// Real-valued field (measured magnitudes, supports, coherence kernels).
pub type RealField = Array3<f64>;

/// One reconstruction instance at a point in the generational process.
///
/// A fresh slot starts with every field unset; the worker pool fills in all
/// of them (coherence only when configured); breeding replaces image and
/// support while clearing coherence and the traces for the next solve.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub image: Option<CplxField>,
    pub support: Option<RealField>,
    pub coherence: Option<RealField>,
    pub error_trace: Vec<f64>,
    pub reciprocal: Option<CplxField>,
}

impl Candidate {
    pub fn new() -> Candidate {
        Candidate {
            image: None,
            support: None,
            coherence: None,
            error_trace: Vec::new(),
            reciprocal: None,
        }
    }

    /// A seed carries only the fields the engine consumes as priors.
    pub fn seed(image: CplxField, support: Option<RealField>) -> Candidate {
        Candidate {
            image: Some(image),
            support,
            coherence: None,
            error_trace: Vec::new(),
            reciprocal: None,
        }
    }

    /// Last solver residual, the converged error under the `chi` metric.
    pub fn final_error(&self) -> f64 {
        self.error_trace.last().copied().unwrap_or(f64::INFINITY)
    }
}

impl Default for Candidate {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Candidate")
            .field("image", &self.image.as_ref().map(|a| a.dim()))
            .field("support", &self.support.as_ref().map(|a| a.dim()))
            .field("coherence", &self.coherence.as_ref().map(|a| a.dim()))
            .field("iterations", &self.error_trace.len())
            .field("final_error", &self.final_error())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_new_candidate_is_unset() {
        let c = Candidate::new();
        assert!(c.image.is_none());
        assert!(c.support.is_none());
        assert!(c.coherence.is_none());
        assert!(c.reciprocal.is_none());
        assert!(c.error_trace.is_empty());
    }

    #[test]
    fn test_final_error_without_trace_is_worst() {
        let c = Candidate::new();
        assert_eq!(c.final_error(), f64::INFINITY);
    }

    #[test]
    fn test_final_error_takes_last_entry() {
        let mut c = Candidate::new();
        c.error_trace = vec![3.0, 2.0, 0.5];
        assert_eq!(c.final_error(), 0.5);
    }

    #[test]
    fn test_seed_keeps_only_priors() {
        let image = Array3::from_elem((2, 2, 2), Complex64::new(1.0, 0.0));
        let c = Candidate::seed(image, None);
        assert!(c.image.is_some());
        assert!(c.support.is_none());
        assert!(c.reciprocal.is_none());
    }
}
