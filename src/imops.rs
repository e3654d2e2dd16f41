use crate::candidate::{CplxField, RealField};
use crate::fourier::{cross_correlation, gauss_filter, peak, roll};
use ndarray::Array3;
use num_complex::Complex64;

//-----------------------------------------------------------------------------
// Complex-image operations shared by ranking and breeding
//-----------------------------------------------------------------------------
//
// Phase-retrieval reconstructions are determined only up to a global phase,
// a lattice translation, and a conjugate-reflection. The helpers here remove
// those ambiguities so that candidate images can be compared and combined
// voxel by voxel.

fn center(a: &CplxField) -> [usize; 3] {
    let (n0, n1, n2) = a.dim();
    [n0 / 2, n1 / 2, n2 / 2]
}

/// Rotate the global phase so the central voxel has zero phase.
pub fn zero_phase(a: &CplxField) -> CplxField {
    let c = center(a);
    let pivot = a[[c[0], c[1], c[2]]];
    if pivot.norm() == 0.0 {
        return a.clone();
    }
    let rotation = Complex64::from_polar(1.0, -pivot.arg());
    a.mapv(|v| v * rotation)
}

/// Rotate the global phase of `a` to best match `reference`, using the
/// phase of the inner product `sum(conj(reference) * a)`.
pub fn zero_phase_cc(a: &CplxField, reference: &CplxField) -> CplxField {
    let inner: Complex64 = reference
        .iter()
        .zip(a.iter())
        .map(|(r, v)| r.conj() * v)
        .sum();
    if inner.norm() == 0.0 {
        return a.clone();
    }
    let rotation = Complex64::from_polar(1.0, -inner.arg());
    a.mapv(|v| v * rotation)
}

/// The conjugate-reflected twin: conjugate of the image reversed (with
/// wrap-around) along every axis.
pub fn conj_reflect(a: &CplxField) -> CplxField {
    let (n0, n1, n2) = a.dim();
    Array3::from_shape_fn((n0, n1, n2), |(i, j, k)| {
        a[[(n0 - i) % n0, (n1 - j) % n1, (n2 - k) % n2]].conj()
    })
}

/// Integer-voxel shift that moves `moving` onto `reference`, located at the
/// magnitude cross-correlation peak.
pub fn align_shift(reference: &CplxField, moving: &CplxField) -> [i64; 3] {
    let cc = cross_correlation(
        &reference.mapv(|v| v.norm()),
        &moving.mapv(|v| v.norm()),
    );
    let (p, _) = peak(&cc);
    let dims = [reference.dim().0, reference.dim().1, reference.dim().2];
    let mut shift = [0i64; 3];
    for axis in 0..3 {
        let n = dims[axis] as i64;
        let raw = p[axis] as i64;
        shift[axis] = if raw > n / 2 { raw - n } else { raw };
    }
    shift
}

/// Translate `moving` so its magnitude distribution overlaps `reference`.
pub fn align_arrays(reference: &CplxField, moving: &CplxField) -> CplxField {
    roll(moving, align_shift(reference, moving))
}

/// Pick whichever of `other` and its conjugate-reflected twin correlates
/// better with `reference`, comparing shrink-wrap supports.
pub fn check_get_conj_reflect(reference: &CplxField, other: &CplxField) -> CplxField {
    let support_ref = shrink_wrap(reference, 0.1, 1.0);
    let twin = conj_reflect(other);

    let direct = shrink_wrap(other, 0.1, 1.0);
    let reflected = shrink_wrap(&twin, 0.1, 1.0);

    let (_, score_direct) = peak(&cross_correlation(&support_ref, &direct));
    let (_, score_reflected) = peak(&cross_correlation(&support_ref, &reflected));

    if score_reflected > score_direct {
        twin
    } else {
        other.clone()
    }
}

/// Derive a binary support by thresholding the Gaussian-smoothed magnitude
/// at a fraction of its maximum.
pub fn shrink_wrap(image: &CplxField, threshold: f64, sigma: f64) -> RealField {
    let blurred = gauss_filter(&image.mapv(|v| v.norm()), sigma);
    let top = blurred.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if top <= 0.0 {
        return Array3::zeros(image.dim());
    }
    blurred.mapv(|v| if v >= threshold * top { 1.0 } else { 0.0 })
}

/// Sum of absolute phases inside a tight shrink-wrap support.
pub fn sum_phase_tight_support(image: &CplxField) -> f64 {
    let tight = shrink_wrap(image, 0.2, 0.5);
    image
        .iter()
        .zip(tight.iter())
        .filter(|(_, &s)| s > 0.0)
        .map(|(v, _)| v.arg().abs())
        .sum()
}

/// Total variation: summed magnitude of forward differences along all axes.
pub fn total_variation(image: &CplxField) -> f64 {
    let (n0, n1, n2) = image.dim();
    let mut tv = 0.0;
    for ((i, j, k), v) in image.indexed_iter() {
        if i + 1 < n0 {
            tv += (image[[i + 1, j, k]] - v).norm();
        }
        if j + 1 < n1 {
            tv += (image[[i, j + 1, k]] - v).norm();
        }
        if k + 1 < n2 {
            tv += (image[[i, j, k + 1]] - v).norm();
        }
    }
    tv
}

/// Fourth-power magnitude sum.
pub fn sharpness(image: &CplxField) -> f64 {
    image.iter().map(|v| v.norm().powi(4)).sum()
}
