use crate::candidate::{Candidate, CplxField, RealField};
use crate::fourier::fftn;
use crate::param::Param;
use num_complex::Complex64;

//-----------------------------------------------------------------------------
// External reconstruction-engine seam
//-----------------------------------------------------------------------------

pub type EngineError = Box<dyn std::error::Error + Send + Sync>;

/// One solve invocation: measured data plus prior state in, a completed
/// candidate's fields out.
pub struct SolveRequest<'a> {
    /// Processor class the engine should run on ("cpu", "cuda", ...).
    pub processor: &'a str,
    /// Compute device bound to the worker executing this task.
    pub device: i64,
    /// Engine configuration handle.
    pub config: &'a Param,
    /// Measured magnitudes, possibly attenuated by the low-resolution mask.
    pub data: &'a RealField,
    /// Shape of the partial-coherence kernel, when coherence is modelled.
    pub coherence_shape: Option<&'a [usize]>,
    pub prior_image: Option<&'a CplxField>,
    pub prior_support: Option<&'a RealField>,
    pub prior_coherence: Option<&'a RealField>,
}

pub struct SolveOutput {
    pub image: CplxField,
    pub support: RealField,
    pub coherence: Option<RealField>,
    pub error_trace: Vec<f64>,
    pub reciprocal: CplxField,
}

impl SolveOutput {
    pub fn into_candidate(self) -> Candidate {
        Candidate {
            image: Some(self.image),
            support: Some(self.support),
            coherence: self.coherence,
            error_trace: self.error_trace,
            reciprocal: Some(self.reciprocal),
        }
    }
}

/// The iterative phase-retrieval solver, supplied by the caller. The
/// scheduler invokes it once per candidate per generation; implementations
/// must be callable from multiple worker threads at once.
pub trait Engine: Sync {
    fn solve(&self, request: SolveRequest) -> Result<SolveOutput, EngineError>;
}

/// Pass-through engine for pipeline validation: carries the prior forward
/// (or seeds a zero-phase image from the data magnitudes) without any
/// retrieval iterations. Selected by the `dryrun` processor tag.
pub struct NullEngine;

impl Engine for NullEngine {
    fn solve(&self, request: SolveRequest) -> Result<SolveOutput, EngineError> {
        let image = match request.prior_image {
            Some(prior) => prior.clone(),
            None => request.data.mapv(|v| Complex64::new(v.abs().sqrt(), 0.0)),
        };
        let support = match request.prior_support {
            Some(prior) => prior.clone(),
            None => request.data.mapv(|_| 1.0),
        };
        let reciprocal = fftn(&image);
        Ok(SolveOutput {
            image,
            support,
            coherence: request.prior_coherence.cloned(),
            error_trace: vec![0.0],
            reciprocal,
        })
    }
}
