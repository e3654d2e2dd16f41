use crate::candidate::Candidate;
use crate::imops::{sharpness, shrink_wrap, sum_phase_tight_support, total_variation};
use crate::population::Population;
use log::warn;
use serde::{Deserialize, Serialize};

//-----------------------------------------------------------------------------
// Candidate quality metrics and population ranking
//-----------------------------------------------------------------------------

#[allow(non_camel_case_types)]
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum RankMetric {
    chi,
    sharpness,
    summed_phase,
    area,
    TV,
}

impl RankMetric {
    /// Metric for a configured name; unrecognized names rank by `chi`.
    pub fn resolve(name: &str) -> RankMetric {
        match name {
            "chi" => RankMetric::chi,
            "sharpness" => RankMetric::sharpness,
            "summed_phase" => RankMetric::summed_phase,
            "area" => RankMetric::area,
            "TV" => RankMetric::TV,
            other => {
                warn!("Unrecognized ranking metric '{}', ranking by chi.", other);
                RankMetric::chi
            }
        }
    }

    /// Whether a larger score ranks earlier.
    fn descending(&self) -> bool {
        matches!(self, RankMetric::summed_phase | RankMetric::area)
    }

    /// Scalar quality score of one candidate. A candidate with no image
    /// scores worst under the image-based metrics.
    pub fn score(&self, candidate: &Candidate) -> f64 {
        let missing = if self.descending() {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
        match self {
            RankMetric::chi => candidate.final_error(),
            // sharpness keeps the ascending convention: lower ranks first
            RankMetric::sharpness => {
                candidate.image.as_ref().map_or(missing, sharpness)
            }
            RankMetric::summed_phase => candidate
                .image
                .as_ref()
                .map_or(missing, sum_phase_tight_support),
            RankMetric::area => candidate
                .image
                .as_ref()
                .map_or(missing, |im| shrink_wrap(im, 0.2, 0.5).sum()),
            RankMetric::TV => candidate.image.as_ref().map_or(missing, total_variation),
        }
    }
}

/// Rank a population best-to-worst under one metric. Returns the
/// permutation of original indices; equal scores keep their original
/// order, so ranking is deterministic.
pub fn rank(population: &Population, metric: RankMetric) -> Vec<usize> {
    let scores: Vec<f64> = population
        .candidates
        .iter()
        .map(|c| metric.score(c))
        .collect();

    let mut order: Vec<usize> = (0..scores.len()).collect();
    if metric.descending() {
        order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap());
    } else {
        order.sort_by(|&a, &b| scores[a].partial_cmp(&scores[b]).unwrap());
    }
    order
}
