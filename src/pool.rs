use crate::candidate::{Candidate, RealField};
use crate::engine::{Engine, SolveRequest};
use crate::param::Param;
use crate::rank::RankMetric;
use crate::store;
use log::debug;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::error::Error;
use std::path::PathBuf;

//-----------------------------------------------------------------------------
// Device-bound worker pool
//-----------------------------------------------------------------------------

pub type PoolError = Box<dyn Error + Send + Sync>;

/// One pending reconstruction: a population slot, its prior state (unset
/// for a fresh start), and the directory its result lands in.
pub struct Task {
    pub slot: usize,
    pub prior: Option<Candidate>,
    pub dest: PathBuf,
}

/// A completed task. `slot` and `dest` are the correspondence tokens; the
/// collection order of results carries no meaning.
#[derive(Debug)]
pub struct TaskResult {
    pub slot: usize,
    pub dest: PathBuf,
    pub candidate: Candidate,
    pub score: f64,
}

/// Fixed-size pool of workers, one per compute device. The worker-slot to
/// device table is fixed at construction, so a worker keeps its device for
/// the pool's lifetime and no device is ever shared between two workers.
pub struct WorkerPool {
    pool: ThreadPool,
    devices: Vec<i64>,
}

impl WorkerPool {
    pub fn new(devices: &[i64]) -> Result<WorkerPool, PoolError> {
        if devices.is_empty() {
            return Err("cannot build a worker pool without devices".into());
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(devices.len())
            .build()?;
        Ok(WorkerPool {
            pool,
            devices: devices.to_vec(),
        })
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Run the engine once per task, at most one task per device at any
    /// instant. Each task persists its candidate to its destination
    /// directory and scores it under the generation's metric. The call
    /// blocks until every task finished; any task error aborts the whole
    /// dispatch and surfaces here.
    pub fn dispatch(
        &self,
        engine: &dyn Engine,
        processor: &str,
        data: &RealField,
        metric: RankMetric,
        param: &Param,
        tasks: Vec<Task>,
    ) -> Result<Vec<TaskResult>, PoolError> {
        self.pool.install(|| {
            tasks
                .into_par_iter()
                .map(|task| {
                    let worker = rayon::current_thread_index().unwrap_or(0);
                    let device = self.devices[worker];
                    debug!(
                        "Worker {} solving slot {} on device {}...",
                        worker, task.slot, device
                    );

                    let output = engine
                        .solve(SolveRequest {
                            processor,
                            device,
                            config: param,
                            data,
                            coherence_shape: param.rec.coherence_shape.as_deref(),
                            prior_image: task.prior.as_ref().and_then(|c| c.image.as_ref()),
                            prior_support: task.prior.as_ref().and_then(|c| c.support.as_ref()),
                            prior_coherence: task
                                .prior
                                .as_ref()
                                .and_then(|c| c.coherence.as_ref()),
                        })
                        .map_err(|e| -> PoolError {
                            format!("reconstruction of slot {} failed: {}", task.slot, e).into()
                        })?;

                    let candidate = output.into_candidate();
                    let score = metric.score(&candidate);
                    store::persist(&candidate, &task.dest)?;

                    Ok(TaskResult {
                        slot: task.slot,
                        dest: task.dest,
                        candidate,
                        score,
                    })
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, SolveOutput};
    use ndarray::Array3;
    use num_complex::Complex64;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct CountingEngine {
        running: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
        devices_seen: Mutex<Vec<i64>>,
    }

    impl CountingEngine {
        fn new() -> CountingEngine {
            CountingEngine {
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
                devices_seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Engine for CountingEngine {
        fn solve(&self, request: SolveRequest) -> Result<SolveOutput, EngineError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.devices_seen.lock().unwrap().push(request.device);

            std::thread::sleep(Duration::from_millis(20));

            self.running.fetch_sub(1, Ordering::SeqCst);
            let image = request.data.mapv(|v| Complex64::new(v, 0.0));
            Ok(SolveOutput {
                support: request.data.mapv(|_| 1.0),
                reciprocal: image.clone(),
                coherence: None,
                error_trace: vec![1.0, 0.5],
                image,
            })
        }
    }

    struct FailingEngine;

    impl Engine for FailingEngine {
        fn solve(&self, _request: SolveRequest) -> Result<SolveOutput, EngineError> {
            Err("engine exploded".into())
        }
    }

    fn scratch(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("genrec_pool_{}_{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn make_tasks(dir: &Path, n: usize) -> Vec<Task> {
        (0..n)
            .map(|slot| Task {
                slot,
                prior: None,
                dest: dir.join(slot.to_string()),
            })
            .collect()
    }

    #[test]
    fn test_dispatch_bounds_concurrency_by_device_count() {
        let dir = scratch("bounded");
        let engine = CountingEngine::new();
        let pool = WorkerPool::new(&[10, 20]).unwrap();
        let param = Param::default();
        let data = Array3::from_elem((3, 3, 3), 1.0);

        let results = pool
            .dispatch(
                &engine,
                "cpu",
                &data,
                RankMetric::chi,
                &param,
                make_tasks(&dir, 5),
            )
            .unwrap();

        assert_eq!(results.len(), 5);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 5);
        assert!(engine.peak.load(Ordering::SeqCst) <= 2);

        // every task ran on a device from the pool
        let devices = engine.devices_seen.lock().unwrap();
        assert_eq!(devices.len(), 5);
        assert!(devices.iter().all(|d| *d == 10 || *d == 20));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_dispatch_results_carry_slot_tokens() {
        let dir = scratch("tokens");
        let engine = CountingEngine::new();
        let pool = WorkerPool::new(&[1, 2, 3]).unwrap();
        let param = Param::default();
        let data = Array3::from_elem((3, 3, 3), 2.0);

        let results = pool
            .dispatch(
                &engine,
                "cpu",
                &data,
                RankMetric::chi,
                &param,
                make_tasks(&dir, 4),
            )
            .unwrap();

        let mut slots: Vec<usize> = results.iter().map(|r| r.slot).collect();
        slots.sort_unstable();
        assert_eq!(slots, vec![0, 1, 2, 3]);
        for result in &results {
            assert_eq!(result.dest, dir.join(result.slot.to_string()));
            assert!(result.dest.join("image.bin").exists());
            assert_eq!(result.score, 0.5);
        }

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_dispatch_surfaces_task_failure() {
        let dir = scratch("failure");
        let pool = WorkerPool::new(&[-1]).unwrap();
        let param = Param::default();
        let data = Array3::from_elem((2, 2, 2), 1.0);

        let outcome = pool.dispatch(
            &FailingEngine,
            "cpu",
            &data,
            RankMetric::chi,
            &param,
            make_tasks(&dir, 2),
        );
        assert!(outcome.is_err());
        assert!(outcome.unwrap_err().to_string().contains("engine exploded"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_pool_requires_devices() {
        assert!(WorkerPool::new(&[]).is_err());
    }
}
