use crate::candidate::{CplxField, RealField};
use crate::fourier::{shifted_fft, shifted_ifft};
use crate::imops::{
    align_arrays, check_get_conj_reflect, shrink_wrap, zero_phase, zero_phase_cc,
};
use crate::policy::GenerationPolicy;
use log::warn;
use ndarray::Zip;
use num_complex::Complex64;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

//-----------------------------------------------------------------------------
// Breeding: combining ranked candidate images into the next seed population
//-----------------------------------------------------------------------------

/// Image-combination rule applied between a candidate (`beta`) and the
/// running best reference (`alpha`), optionally with a third reference
/// (`gamma`, the second-ranked survivor).
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreedMode {
    none,
    sqrt_ab,
    dsqrt,
    pixel_switch,
    b_pa,
    two_ab_a_b,
    two_a_minus_b_pa,
    sqrt_ab_pa,
    sqrt_ab_pa_recip,
    sqrt_ab_recip,
    max_all,
    max_ab,
    max_ab_pa,
    min_ab_pa,
    avg_ab,
    avg_ab_pa,
    Dhalf,
    Dhalf_best,
    sqrt_abg,
    sqrt_abg_pa,
    max_abg,
    max_abg_pa,
    avg_abg,
    avg_abg_pa,
    avg_sqrt,
}

impl BreedMode {
    /// Mode for a configured name; unrecognized names disable breeding.
    pub fn resolve(name: &str) -> BreedMode {
        match name {
            "none" => BreedMode::none,
            "sqrt_ab" => BreedMode::sqrt_ab,
            "dsqrt" => BreedMode::dsqrt,
            "pixel_switch" => BreedMode::pixel_switch,
            "b_pa" => BreedMode::b_pa,
            "2ab_a_b" => BreedMode::two_ab_a_b,
            "2a-b_pa" => BreedMode::two_a_minus_b_pa,
            "sqrt_ab_pa" => BreedMode::sqrt_ab_pa,
            "sqrt_ab_pa_recip" => BreedMode::sqrt_ab_pa_recip,
            "sqrt_ab_recip" => BreedMode::sqrt_ab_recip,
            "max_all" => BreedMode::max_all,
            "max_ab" => BreedMode::max_ab,
            "max_ab_pa" => BreedMode::max_ab_pa,
            "min_ab_pa" => BreedMode::min_ab_pa,
            "avg_ab" => BreedMode::avg_ab,
            "avg_ab_pa" => BreedMode::avg_ab_pa,
            "Dhalf" => BreedMode::Dhalf,
            "Dhalf-best" => BreedMode::Dhalf_best,
            "sqrt_abg" => BreedMode::sqrt_abg,
            "sqrt_abg_pa" => BreedMode::sqrt_abg_pa,
            "max_abg" => BreedMode::max_abg,
            "max_abg_pa" => BreedMode::max_abg_pa,
            "avg_abg" => BreedMode::avg_abg,
            "avg_abg_pa" => BreedMode::avg_abg_pa,
            "avg_sqrt" => BreedMode::avg_sqrt,
            other => {
                warn!("Unrecognized breed mode '{}', breeding disabled.", other);
                BreedMode::none
            }
        }
    }

    fn needs_gamma(&self) -> bool {
        matches!(
            self,
            BreedMode::sqrt_abg
                | BreedMode::sqrt_abg_pa
                | BreedMode::max_abg
                | BreedMode::max_abg_pa
                | BreedMode::avg_abg
                | BreedMode::avg_abg_pa
                | BreedMode::avg_sqrt
        )
    }

    /// Apply the mode's combination formula.
    pub fn combine(&self, cx: &BreedContext, rng: &mut ChaCha8Rng) -> CplxField {
        let gamma = cx.gamma.as_ref().unwrap_or(cx.beta);
        match self {
            BreedMode::none => cx.beta.clone(),
            BreedMode::sqrt_ab => sqrt_ab(cx.alpha, cx.beta),
            BreedMode::dsqrt => dsqrt(cx.beta),
            BreedMode::pixel_switch => pixel_switch(cx.alpha, cx.beta, rng),
            BreedMode::b_pa => b_pa(cx.alpha, cx.beta),
            BreedMode::two_ab_a_b => two_ab_a_b(cx.alpha, cx.beta),
            BreedMode::two_a_minus_b_pa => two_a_minus_b_pa(cx.alpha, cx.beta),
            BreedMode::sqrt_ab_pa => sqrt_ab_pa(cx.alpha, cx.beta),
            BreedMode::sqrt_ab_pa_recip => sqrt_ab_pa_recip(cx.alpha, cx.beta),
            BreedMode::sqrt_ab_recip => sqrt_ab_recip(cx.alpha, cx.beta),
            BreedMode::max_all => max_all(cx.beta, cx.survivors),
            BreedMode::max_ab => max_ab(cx.alpha, cx.beta),
            BreedMode::max_ab_pa => max_ab_pa(cx.alpha, cx.beta),
            BreedMode::min_ab_pa => min_ab_pa(cx.alpha, cx.beta),
            BreedMode::avg_ab => avg_ab(cx.alpha, cx.beta),
            BreedMode::avg_ab_pa => avg_ab_pa(cx.alpha, cx.beta),
            BreedMode::Dhalf | BreedMode::Dhalf_best => dhalf(cx.beta, cx.survivors, cx.index),
            BreedMode::sqrt_abg => sqrt_abg(cx.alpha, cx.beta, gamma),
            BreedMode::sqrt_abg_pa => sqrt_abg_pa(cx.alpha, cx.beta, gamma),
            BreedMode::max_abg => max_abg(cx.alpha, cx.beta, gamma),
            BreedMode::max_abg_pa => max_abg_pa(cx.alpha, cx.beta, gamma),
            BreedMode::avg_abg => avg_abg(cx.alpha, cx.beta, gamma),
            BreedMode::avg_abg_pa => avg_abg_pa(cx.alpha, cx.beta, gamma),
            BreedMode::avg_sqrt => avg_sqrt(cx.alpha, cx.beta, gamma),
        }
    }
}

/// Inputs of one combination: the aligned phase-zeroed reference, the
/// phase-matched candidate, the prepared third reference when the mode
/// uses one, and the full zero-phased breeding stock.
pub struct BreedContext<'a> {
    pub alpha: &'a CplxField,
    pub beta: &'a CplxField,
    pub gamma: Option<CplxField>,
    pub survivors: &'a [CplxField],
    pub index: usize,
}

//-----------------------------------------------------------------------------
// Combination kernels, one pure function per mode
//-----------------------------------------------------------------------------

pub fn sqrt_ab(alpha: &CplxField, beta: &CplxField) -> CplxField {
    Zip::from(alpha).and(beta).map_collect(|&a, &b| {
        Complex64::from_polar((a.norm() * b.norm()).sqrt(), 0.5 * (b.arg() + a.arg()))
    })
}

pub fn dsqrt(beta: &CplxField) -> CplxField {
    beta.mapv(|b| Complex64::from_polar(b.norm().sqrt(), b.arg()))
}

pub fn pixel_switch(alpha: &CplxField, beta: &CplxField, rng: &mut ChaCha8Rng) -> CplxField {
    let mut out = beta.clone();
    Zip::from(&mut out).and(alpha).for_each(|o, &a| {
        if rng.gen::<f64>() <= 0.5 {
            *o = a;
        }
    });
    out
}

pub fn b_pa(alpha: &CplxField, beta: &CplxField) -> CplxField {
    Zip::from(alpha)
        .and(beta)
        .map_collect(|&a, &b| Complex64::from_polar(b.norm(), a.arg()))
}

pub fn two_ab_a_b(alpha: &CplxField, beta: &CplxField) -> CplxField {
    Zip::from(alpha).and(beta).map_collect(|&a, &b| {
        let denom = a + b;
        if denom.norm() < f64::EPSILON {
            Complex64::new(0.0, 0.0)
        } else {
            2.0 * (b * a) / denom
        }
    })
}

pub fn two_a_minus_b_pa(alpha: &CplxField, beta: &CplxField) -> CplxField {
    Zip::from(alpha)
        .and(beta)
        .map_collect(|&a, &b| Complex64::from_polar(2.0 * a.norm() - b.norm(), a.arg()))
}

pub fn sqrt_ab_pa(alpha: &CplxField, beta: &CplxField) -> CplxField {
    Zip::from(alpha)
        .and(beta)
        .map_collect(|&a, &b| Complex64::from_polar((a.norm() * b.norm()).sqrt(), a.arg()))
}

pub fn sqrt_ab_pa_recip(alpha: &CplxField, beta: &CplxField) -> CplxField {
    let fb = shifted_fft(beta);
    let fa = shifted_fft(alpha);
    let combined = Zip::from(&fb)
        .and(&fa)
        .map_collect(|&tb, &ta| Complex64::from_polar((tb.norm() * ta.norm()).sqrt(), ta.arg()));
    shifted_ifft(&combined)
}

pub fn sqrt_ab_recip(alpha: &CplxField, beta: &CplxField) -> CplxField {
    let fb = shifted_fft(beta);
    let fa = shifted_fft(alpha);
    let combined = Zip::from(&fb).and(&fa).map_collect(|&tb, &ta| {
        Complex64::from_polar((tb.norm() * ta.norm()).sqrt(), 0.5 * (tb.arg() + ta.arg()))
    });
    shifted_ifft(&combined)
}

pub fn max_all(beta: &CplxField, survivors: &[CplxField]) -> CplxField {
    let mut amplitude = survivors[0].mapv(|v| v.norm());
    for im in &survivors[1..] {
        Zip::from(&mut amplitude).and(im).for_each(|amp, &v| {
            if v.norm() > *amp {
                *amp = v.norm();
            }
        });
    }
    Zip::from(&amplitude)
        .and(beta)
        .map_collect(|&amp, &b| Complex64::from_polar(amp, b.arg()))
}

pub fn max_ab(alpha: &CplxField, beta: &CplxField) -> CplxField {
    Zip::from(alpha).and(beta).map_collect(|&a, &b| {
        Complex64::from_polar(a.norm().max(b.norm()), 0.5 * (b.arg() + a.arg()))
    })
}

pub fn max_ab_pa(alpha: &CplxField, beta: &CplxField) -> CplxField {
    Zip::from(alpha)
        .and(beta)
        .map_collect(|&a, &b| Complex64::from_polar(a.norm().max(b.norm()), a.arg()))
}

pub fn min_ab_pa(alpha: &CplxField, beta: &CplxField) -> CplxField {
    Zip::from(alpha)
        .and(beta)
        .map_collect(|&a, &b| Complex64::from_polar(a.norm().min(b.norm()), a.arg()))
}

pub fn avg_ab(alpha: &CplxField, beta: &CplxField) -> CplxField {
    Zip::from(alpha)
        .and(beta)
        .map_collect(|&a, &b| 0.5 * (a + b))
}

pub fn avg_ab_pa(alpha: &CplxField, beta: &CplxField) -> CplxField {
    Zip::from(alpha)
        .and(beta)
        .map_collect(|&a, &b| Complex64::from_polar(0.5 * (a.norm() + b.norm()), a.arg()))
}

/// Amplify beta's deviation from the better half of the breeding stock.
pub fn dhalf(beta: &CplxField, survivors: &[CplxField], index: usize) -> CplxField {
    let nhalf = ((survivors.len() as f64) / 2.0).round() as usize;
    let mut delta = survivors[index].mapv(|v| v * nhalf as f64);
    for im in &survivors[..nhalf] {
        delta = &delta - im;
    }
    beta + &delta
}

pub fn sqrt_abg(alpha: &CplxField, beta: &CplxField, gamma: &CplxField) -> CplxField {
    Zip::from(alpha)
        .and(beta)
        .and(gamma)
        .map_collect(|&a, &b, &g| {
            Complex64::from_polar(
                (a.norm() * b.norm() * g.norm()).cbrt(),
                (b.arg() + a.arg() + g.arg()) / 3.0,
            )
        })
}

pub fn sqrt_abg_pa(alpha: &CplxField, beta: &CplxField, gamma: &CplxField) -> CplxField {
    Zip::from(alpha)
        .and(beta)
        .and(gamma)
        .map_collect(|&a, &b, &g| {
            Complex64::from_polar((a.norm() * b.norm() * g.norm()).cbrt(), a.arg())
        })
}

pub fn max_abg(alpha: &CplxField, beta: &CplxField, gamma: &CplxField) -> CplxField {
    Zip::from(alpha)
        .and(beta)
        .and(gamma)
        .map_collect(|&a, &b, &g| {
            Complex64::from_polar(
                a.norm().max(b.norm()).max(g.norm()),
                (b.arg() + a.arg() + g.arg()) / 3.0,
            )
        })
}

pub fn max_abg_pa(alpha: &CplxField, beta: &CplxField, gamma: &CplxField) -> CplxField {
    Zip::from(alpha)
        .and(beta)
        .and(gamma)
        .map_collect(|&a, &b, &g| {
            Complex64::from_polar(a.norm().max(b.norm()).max(g.norm()), a.arg())
        })
}

pub fn avg_abg(alpha: &CplxField, beta: &CplxField, gamma: &CplxField) -> CplxField {
    Zip::from(alpha)
        .and(beta)
        .and(gamma)
        .map_collect(|&a, &b, &g| (a + b + g) / 3.0)
}

pub fn avg_abg_pa(alpha: &CplxField, beta: &CplxField, gamma: &CplxField) -> CplxField {
    Zip::from(alpha)
        .and(beta)
        .and(gamma)
        .map_collect(|&a, &b, &g| {
            Complex64::from_polar((a.norm() + b.norm() + g.norm()) / 3.0, a.arg())
        })
}

pub fn avg_sqrt(alpha: &CplxField, beta: &CplxField, gamma: &CplxField) -> CplxField {
    Zip::from(alpha)
        .and(beta)
        .and(gamma)
        .map_collect(|&a, &b, &g| {
            let amp = (b.norm().cbrt() + a.norm().cbrt() + g.norm().cbrt()) / 3.0;
            Complex64::from_polar(amp.powi(3), b.arg())
        })
}

//-----------------------------------------------------------------------------
// Breeding engine
//-----------------------------------------------------------------------------

/// Breed the next seed population from rank-ordered images.
///
/// Returns `None` when the generation's mode is `none`: the caller keeps
/// its images and supports unchanged. Otherwise emits one child per
/// survivor (population size minus the generation's removal count, never
/// below one), each with a recomputed shrink-wrap support.
pub fn breed(
    images: &[CplxField],
    generation: usize,
    policy: &GenerationPolicy,
    rng: &mut ChaCha8Rng,
) -> Option<(Vec<CplxField>, Vec<RealField>)> {
    let mode = policy.breed_mode(generation);
    if mode == BreedMode::none {
        return None;
    }

    let threshold = policy.support_threshold(generation);
    let sigma = policy.support_sigma(generation);
    let survivor_count = images
        .len()
        .saturating_sub(policy.remove_count(generation))
        .max(1);

    let survivors: Vec<CplxField> = images[..survivor_count].iter().map(zero_phase).collect();

    // the best candidate goes through unchanged apart from phase zeroing
    let mut alpha = survivors[0].clone();
    let mut child_images = vec![alpha.clone()];
    let mut child_supports = vec![shrink_wrap(&alpha, threshold, sigma)];

    for index in 1..survivors.len() {
        let beta = &survivors[index];

        // resolve the conjugate-reflection ambiguity against the running
        // reference, then bring the reference onto beta's lattice and phase
        alpha = check_get_conj_reflect(beta, &alpha);
        let alpha_s = zero_phase(&align_arrays(beta, &alpha));
        let beta_m = zero_phase_cc(beta, &alpha_s);

        let gamma = if mode.needs_gamma() {
            Some(prepare_gamma(&survivors, index, &beta_m))
        } else {
            None
        };

        let cx = BreedContext {
            alpha: &alpha_s,
            beta: &beta_m,
            gamma,
            survivors: &survivors,
            index,
        };
        let child = mode.combine(&cx, rng);
        child_supports.push(shrink_wrap(&child, threshold, sigma));
        child_images.push(child);
    }

    Some((child_images, child_supports))
}

/// Third reference for the three-way modes: the second-ranked survivor,
/// conjugate-resolved and matched against beta once beta itself is past
/// that rank.
fn prepare_gamma(survivors: &[CplxField], index: usize, beta: &CplxField) -> CplxField {
    let gamma = &survivors[1];
    if index > 1 {
        let resolved = check_get_conj_reflect(beta, gamma);
        let aligned = align_arrays(beta, &resolved);
        zero_phase_cc(&aligned, beta)
    } else {
        gamma.clone()
    }
}
