use crate::breed::BreedMode;
use crate::candidate::RealField;
use crate::fourier::gaussian;
use crate::param::Param;
use crate::rank::RankMetric;
use log::warn;

//-----------------------------------------------------------------------------
// Per-generation policy resolution
//-----------------------------------------------------------------------------

/// All tunable knobs for a run, resolved once from the sparse configuration
/// and immutable afterwards. Every per-generation sequence has length equal
/// to the generation count; shorter configured sequences are right-padded
/// with the scalar default.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationPolicy {
    pub generations: usize,
    pub reconstructions: usize,
    pub low_resolution_generations: usize,
    metrics: Vec<RankMetric>,
    removes: Vec<usize>,
    support_thresholds: Vec<f64>,
    support_sigmas: Vec<f64>,
    breed_modes: Vec<BreedMode>,
    low_resolution_sigmas: Vec<f64>,
}

fn pad_sequence<T: Clone>(configured: Option<&Vec<T>>, generations: usize, default: T) -> Vec<T> {
    let mut seq: Vec<T> = configured.cloned().unwrap_or_default();
    seq.truncate(generations);
    while seq.len() < generations {
        seq.push(default.clone());
    }
    seq
}

fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![start];
    }
    (0..n)
        .map(|i| start + (end - start) * i as f64 / (n - 1) as f64)
        .collect()
}

impl GenerationPolicy {
    pub fn resolve(generations: usize, param: &Param) -> GenerationPolicy {
        let metrics = pad_sequence(
            param
                .ga
                .metrics
                .as_ref()
                .map(|names| names.iter().map(|n| RankMetric::resolve(n)).collect())
                .as_ref(),
            generations,
            RankMetric::chi,
        );

        let breed_modes = pad_sequence(
            param
                .ga
                .breed_modes
                .as_ref()
                .map(|names| names.iter().map(|n| BreedMode::resolve(n)).collect())
                .as_ref(),
            generations,
            BreedMode::none,
        );

        let removes = pad_sequence(param.ga.removes.as_ref(), generations, 0);
        let support_thresholds = pad_sequence(
            param.ga.support_thresholds.as_ref(),
            generations,
            param.rec.support_threshold,
        );
        let support_sigmas = pad_sequence(
            param.ga.support_sigmas.as_ref(),
            generations,
            param.rec.support_sigma,
        );

        let (low_resolution_generations, low_resolution_sigmas) =
            Self::resolve_low_resolution(param);

        GenerationPolicy {
            generations,
            reconstructions: param.rec.reconstructions,
            low_resolution_generations,
            metrics,
            removes,
            support_thresholds,
            support_sigmas,
            breed_modes,
            low_resolution_sigmas,
        }
    }

    fn resolve_low_resolution(param: &Param) -> (usize, Vec<f64>) {
        let count = param.ga.low_resolution_generations;
        if count == 0 {
            return (0, Vec::new());
        }

        let sigma_min = param.ga.low_resolution_sigma_min;
        let sigma_max = param.ga.low_resolution_sigma_max;
        let support_sigma = param.rec.support_sigma;

        match param.ga.low_resolution_sigma_alg.as_str() {
            "assigned" => match param.ga.low_resolution_sigmas {
                Some(ref sigmas) if sigmas.len() >= count => (count, sigmas[..count].to_vec()),
                _ => {
                    warn!(
                        "low_resolution_sigmas does not cover {} low-resolution \
                        generations; turning off low-resolution masking.",
                        count
                    );
                    (0, Vec::new())
                }
            },
            "scale_power" => {
                let power = param.ga.low_resolution_scale_power;
                let sigmas = linspace(0.0, 1.0, count)
                    .into_iter()
                    .map(|x| {
                        let scale = (x * (1.0 - sigma_min) + sigma_min).powf(power);
                        (support_sigma / scale).max(support_sigma).min(sigma_max)
                    })
                    .collect();
                (count, sigmas)
            }
            alg => {
                if alg != "space_linear" {
                    warn!(
                        "Unknown low_resolution_sigma_alg '{}', using space_linear.",
                        alg
                    );
                }
                (count, linspace(sigma_max, support_sigma, count))
            }
        }
    }

    pub fn metric(&self, generation: usize) -> RankMetric {
        self.metrics[generation]
    }

    pub fn remove_count(&self, generation: usize) -> usize {
        self.removes[generation]
    }

    pub fn support_threshold(&self, generation: usize) -> f64 {
        self.support_thresholds[generation]
    }

    pub fn support_sigma(&self, generation: usize) -> f64 {
        self.support_sigmas[generation]
    }

    pub fn breed_mode(&self, generation: usize) -> BreedMode {
        self.breed_modes[generation]
    }

    /// Measured data for a generation: unchanged past the low-resolution
    /// phase, otherwise attenuated by a fresh Gaussian passband mask. A
    /// scheduled sigma >= 1.0 keeps the full passband.
    pub fn masked_data(&self, data: &RealField, generation: usize) -> RealField {
        if generation >= self.low_resolution_generations {
            return data.clone();
        }
        let sigma = self.low_resolution_sigmas[generation];
        if sigma >= 1.0 {
            return data.clone();
        }
        let mask = gaussian(data.dim(), sigma);
        data * &mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_resolve_all_defaults() {
        let mut param = Param::default();
        param.rec.reconstructions = 4;
        let policy = GenerationPolicy::resolve(3, &param);

        assert_eq!(policy.generations, 3);
        assert_eq!(policy.low_resolution_generations, 0);
        for g in 0..3 {
            assert_eq!(policy.metric(g), RankMetric::chi);
            assert_eq!(policy.remove_count(g), 0);
            assert_eq!(policy.support_threshold(g), 0.1);
            assert_eq!(policy.support_sigma(g), 1.0);
            assert_eq!(policy.breed_mode(g), BreedMode::none);
        }
    }

    #[test]
    fn test_resolve_pads_short_sequences_with_scalar_default() {
        let mut param = Param::default();
        param.rec.support_threshold = 0.15;
        param.ga.support_thresholds = Some(vec![0.25]);
        param.ga.removes = Some(vec![2]);
        param.ga.metrics = Some(vec!["area".to_string()]);
        let policy = GenerationPolicy::resolve(3, &param);

        assert_eq!(policy.support_threshold(0), 0.25);
        assert_eq!(policy.support_threshold(1), 0.15);
        assert_eq!(policy.support_threshold(2), 0.15);
        assert_eq!(policy.remove_count(0), 2);
        assert_eq!(policy.remove_count(1), 0);
        assert_eq!(policy.metric(0), RankMetric::area);
        assert_eq!(policy.metric(1), RankMetric::chi);
    }

    #[test]
    fn test_unrecognized_metric_falls_back_to_chi() {
        let mut param = Param::default();
        param.ga.metrics = Some(vec!["entropy".to_string(), "TV".to_string()]);
        let policy = GenerationPolicy::resolve(2, &param);
        assert_eq!(policy.metric(0), RankMetric::chi);
        assert_eq!(policy.metric(1), RankMetric::TV);
    }

    #[test]
    fn test_assigned_sigmas_missing_disables_low_resolution() {
        let mut param = Param::default();
        param.ga.low_resolution_generations = 2;
        param.ga.low_resolution_sigma_alg = "assigned".to_string();
        let policy = GenerationPolicy::resolve(3, &param);
        assert_eq!(policy.low_resolution_generations, 0);

        param.ga.low_resolution_sigmas = Some(vec![0.5]);
        let policy = GenerationPolicy::resolve(3, &param);
        assert_eq!(policy.low_resolution_generations, 0);

        param.ga.low_resolution_sigmas = Some(vec![0.5, 0.8]);
        let policy = GenerationPolicy::resolve(3, &param);
        assert_eq!(policy.low_resolution_generations, 2);
        assert_eq!(policy.low_resolution_sigmas, vec![0.5, 0.8]);
    }

    #[test]
    fn test_space_linear_schedule() {
        let mut param = Param::default();
        param.ga.low_resolution_generations = 3;
        param.ga.low_resolution_sigma_max = 2.0;
        param.rec.support_sigma = 1.0;
        let policy = GenerationPolicy::resolve(4, &param);
        let expect = [2.0, 1.5, 1.0];
        for (got, want) in policy.low_resolution_sigmas.iter().zip(expect) {
            assert!((got - want).abs() < 1e-12);
        }
    }

    #[test]
    fn test_scale_power_schedule() {
        let mut param = Param::default();
        param.ga.low_resolution_generations = 3;
        param.ga.low_resolution_sigma_alg = "scale_power".to_string();
        param.ga.low_resolution_sigma_min = 0.1;
        param.ga.low_resolution_sigma_max = 2.0;
        param.ga.low_resolution_scale_power = 1.0;
        param.rec.support_sigma = 1.0;
        let policy = GenerationPolicy::resolve(4, &param);
        // 1.0 / [0.1, 0.55, 1.0] clipped to [1.0, 2.0]
        let expect = [2.0, 1.0 / 0.55, 1.0];
        for (got, want) in policy.low_resolution_sigmas.iter().zip(expect) {
            assert!((got - want).abs() < 1e-12);
        }
    }

    #[test]
    fn test_mask_is_identity_past_low_resolution_phase() {
        let mut param = Param::default();
        param.ga.low_resolution_generations = 1;
        param.ga.low_resolution_sigma_alg = "assigned".to_string();
        param.ga.low_resolution_sigmas = Some(vec![0.5]);
        let policy = GenerationPolicy::resolve(3, &param);

        let data = Array3::from_shape_fn((4, 4, 4), |(i, j, k)| (i + j + k) as f64);
        assert_eq!(policy.masked_data(&data, 1), data);
        assert_eq!(policy.masked_data(&data, 2), data);
    }

    #[test]
    fn test_mask_attenuates_band_edges_when_sigma_below_one() {
        let mut param = Param::default();
        param.ga.low_resolution_generations = 2;
        param.ga.low_resolution_sigma_alg = "assigned".to_string();
        param.ga.low_resolution_sigmas = Some(vec![0.3, 1.5]);
        let policy = GenerationPolicy::resolve(2, &param);

        let data = Array3::from_elem((6, 6, 6), 2.0);
        let masked = policy.masked_data(&data, 0);
        assert!((masked[[3, 3, 3]] - 2.0).abs() < 1e-12);
        assert!(masked[[0, 0, 0]] < 2.0);

        // sigma >= 1.0 keeps the full passband
        assert_eq!(policy.masked_data(&data, 1), data);
    }
}
