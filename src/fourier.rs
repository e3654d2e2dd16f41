use crate::candidate::{CplxField, RealField};
use ndarray::{Array3, Axis};
use num_complex::Complex64;
use rustfft::FftPlanner;
use std::f64::consts::PI;

//-----------------------------------------------------------------------------
// Discrete transforms and frequency-space helpers
//-----------------------------------------------------------------------------

fn transform_axis(a: &mut CplxField, axis: usize, inverse: bool) {
    let len = a.shape()[axis];
    if len < 2 {
        return;
    }
    let mut planner = FftPlanner::new();
    let fft = if inverse {
        planner.plan_fft_inverse(len)
    } else {
        planner.plan_fft_forward(len)
    };
    // Lanes are not guaranteed contiguous, so each one goes through a buffer.
    let mut buf = vec![Complex64::new(0.0, 0.0); len];
    for mut lane in a.lanes_mut(Axis(axis)) {
        for (b, v) in buf.iter_mut().zip(lane.iter()) {
            *b = *v;
        }
        fft.process(&mut buf);
        for (v, b) in lane.iter_mut().zip(buf.iter()) {
            *v = *b;
        }
    }
}

/// Forward DFT along all three axes, unnormalized.
pub fn fftn(a: &CplxField) -> CplxField {
    let mut out = a.clone();
    for axis in 0..3 {
        transform_axis(&mut out, axis, false);
    }
    out
}

/// Inverse DFT along all three axes, normalized by the voxel count so that
/// `ifftn(fftn(x)) == x`.
pub fn ifftn(a: &CplxField) -> CplxField {
    let mut out = a.clone();
    for axis in 0..3 {
        transform_axis(&mut out, axis, true);
    }
    let n = a.len() as f64;
    out.mapv_inplace(|v| v / n);
    out
}

/// Circular shift: `roll(a, d)[x] == a[x - d]` with wrap-around, the numpy
/// roll convention.
pub fn roll<T: Clone>(a: &Array3<T>, shift: [i64; 3]) -> Array3<T> {
    let (n0, n1, n2) = a.dim();
    Array3::from_shape_fn((n0, n1, n2), |(i, j, k)| {
        let s0 = (i as i64 - shift[0]).rem_euclid(n0 as i64) as usize;
        let s1 = (j as i64 - shift[1]).rem_euclid(n1 as i64) as usize;
        let s2 = (k as i64 - shift[2]).rem_euclid(n2 as i64) as usize;
        a[[s0, s1, s2]].clone()
    })
}

pub fn fftshift<T: Clone>(a: &Array3<T>) -> Array3<T> {
    let (n0, n1, n2) = a.dim();
    roll(a, [(n0 / 2) as i64, (n1 / 2) as i64, (n2 / 2) as i64])
}

pub fn ifftshift<T: Clone>(a: &Array3<T>) -> Array3<T> {
    let (n0, n1, n2) = a.dim();
    roll(a, [-((n0 / 2) as i64), -((n1 / 2) as i64), -((n2 / 2) as i64)])
}

/// Zero-centered forward transform, `fftshift(fftn(fftshift(a)))`.
pub fn shifted_fft(a: &CplxField) -> CplxField {
    fftshift(&fftn(&fftshift(a)))
}

/// Zero-centered inverse transform.
pub fn shifted_ifft(a: &CplxField) -> CplxField {
    fftshift(&ifftn(&fftshift(a)))
}

/// Centered Gaussian window over a shape. `sigma` is relative to the axis
/// extent: the standard deviation along axis `i` is `sigma * n_i`. The
/// central voxel evaluates to 1.
pub fn gaussian(shape: (usize, usize, usize), sigma: f64) -> RealField {
    let (n0, n1, n2) = shape;
    Array3::from_shape_fn(shape, |(i, j, k)| {
        let mut e = 0.0;
        for (idx, n) in [(i, n0), (j, n1), (k, n2)] {
            let c = idx as f64 - (n / 2) as f64;
            let s = sigma * n as f64;
            e += (c / s).powi(2);
        }
        (-0.5 * e).exp()
    })
}

fn frequency(k: usize, n: usize) -> f64 {
    if k <= n / 2 {
        k as f64 / n as f64
    } else {
        (k as f64 - n as f64) / n as f64
    }
}

/// Gaussian low-pass filter of a real field, `sigma` in voxels. Implemented
/// as a frequency-domain multiply, which keeps the filter exact and
/// circular, matching the periodic treatment of the reconstruction volume.
pub fn gauss_filter(a: &RealField, sigma: f64) -> RealField {
    let complex = a.mapv(|v| Complex64::new(v, 0.0));
    let mut spectrum = fftn(&complex);
    let (n0, n1, n2) = a.dim();
    for ((i, j, k), v) in spectrum.indexed_iter_mut() {
        let f0 = frequency(i, n0);
        let f1 = frequency(j, n1);
        let f2 = frequency(k, n2);
        let fsq = f0 * f0 + f1 * f1 + f2 * f2;
        *v *= (-2.0 * PI * PI * sigma * sigma * fsq).exp();
    }
    ifftn(&spectrum).mapv(|v| v.re)
}

/// Circular cross-correlation of two real fields,
/// `ifftn(fftn(a) * conj(fftn(b)))`. The peak sits at the shift that moves
/// `b` onto `a` (negated, wrap-around).
pub fn cross_correlation(a: &RealField, b: &RealField) -> CplxField {
    let fa = fftn(&a.mapv(|v| Complex64::new(v, 0.0)));
    let fb = fftn(&b.mapv(|v| Complex64::new(v, 0.0)));
    let product = &fa * &fb.mapv(|v| v.conj());
    ifftn(&product)
}

/// Index and magnitude of the strongest voxel.
pub fn peak(a: &CplxField) -> ([usize; 3], f64) {
    let mut best = [0usize; 3];
    let mut best_norm = f64::NEG_INFINITY;
    for ((i, j, k), v) in a.indexed_iter() {
        let n = v.norm();
        if n > best_norm {
            best_norm = n;
            best = [i, j, k];
        }
    }
    (best, best_norm)
}
