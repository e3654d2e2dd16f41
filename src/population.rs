use crate::candidate::Candidate;

/// The ordered set of candidates being evolved, exactly one per
/// configured reconstruction slot. Insertion order before ranking,
/// best-to-worst after `order()`.
#[derive(Clone, Debug, PartialEq)]
pub struct Population {
    pub candidates: Vec<Candidate>,
}

impl Population {
    pub fn new() -> Population {
        Population {
            candidates: Vec::new(),
        }
    }

    /// Fresh population of unset slots.
    pub fn fresh(size: usize) -> Population {
        Population {
            candidates: (0..size).map(|_| Candidate::new()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Reorder the population under a rank permutation (`perm[0]` is the
    /// index of the best candidate). Every per-candidate field travels with
    /// its candidate, so parallel sequences can never desynchronize.
    ///
    /// # Panics
    ///
    /// Panics if `perm` is not a permutation of `0..len`.
    pub fn order(&mut self, perm: &[usize]) {
        assert_eq!(perm.len(), self.candidates.len());
        let mut seen = vec![false; perm.len()];
        for &p in perm {
            assert!(!seen[p], "rank permutation repeats index {}", p);
            seen[p] = true;
        }
        let old = std::mem::take(&mut self.candidates);
        let mut slots: Vec<Option<Candidate>> = old.into_iter().map(Some).collect();
        self.candidates = perm
            .iter()
            .map(|&p| slots[p].take().unwrap())
            .collect();
    }
}

impl Default for Population {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_population_has_requested_size() {
        let pop = Population::fresh(4);
        assert_eq!(pop.len(), 4);
        assert!(pop.candidates.iter().all(|c| c.image.is_none()));
    }

    #[test]
    fn test_order_applies_permutation() {
        let mut pop = Population::fresh(3);
        for (i, c) in pop.candidates.iter_mut().enumerate() {
            c.error_trace = vec![i as f64];
        }
        pop.order(&[2, 0, 1]);
        let errors: Vec<f64> = pop.candidates.iter().map(|c| c.final_error()).collect();
        assert_eq!(errors, vec![2.0, 0.0, 1.0]);
    }

    #[test]
    #[should_panic]
    fn test_order_rejects_non_permutation() {
        let mut pop = Population::fresh(3);
        pop.order(&[0, 0, 1]);
    }
}
