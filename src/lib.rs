pub mod breed;
pub mod candidate;
pub mod engine;
pub mod fourier;
pub mod imops;
pub mod param;
pub mod policy;
pub mod population;
pub mod pool;
pub mod rank;
pub mod store;

use crate::candidate::{Candidate, CplxField, RealField};
use crate::engine::Engine;
use crate::param::Param;
use crate::policy::GenerationPolicy;
use crate::pool::{Task, WorkerPool};
use crate::population::Population;
use log::{debug, info};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub type RunError = Box<dyn Error + Send + Sync>;

/// Where generation results land: an explicit `save_dir`, the `results`
/// sub-directory of an experiment directory, or a `results` directory next
/// to the configuration file.
fn resolve_save_dir(conf_info: &str, param: &Param) -> PathBuf {
    if !param.data.save_dir.is_empty() {
        return PathBuf::from(&param.data.save_dir);
    }
    let conf = Path::new(conf_info);
    if conf.is_dir() {
        conf.join("results")
    } else {
        conf.parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.join("results"))
            .unwrap_or_else(|| PathBuf::from("results"))
    }
}

/// Seed population for the run: fresh unset slots, or per-slot continuation
/// state when configured. A slot whose continuation load fails starts
/// fresh; the run itself proceeds.
fn init_population(policy: &GenerationPolicy, param: &Param) -> Population {
    if param.data.cont && !param.data.continue_dir.is_empty() {
        info!("Continuing from {}...", param.data.continue_dir);
        let slots = store::load_continuation(
            Path::new(&param.data.continue_dir),
            policy.reconstructions,
        );
        Population {
            candidates: slots
                .into_iter()
                .map(|slot| slot.unwrap_or_default())
                .collect(),
        }
    } else {
        Population::fresh(policy.reconstructions)
    }
}

/// Drive a full generational reconstruction run.
///
/// For every generation: mask the measured data, dispatch the population to
/// the device-bound worker pool, rank the completed candidates, persist
/// them to `<save_dir>/g_<generation>/<rank>/`, and breed the next seed
/// population unless this was the final generation. Generations are
/// strictly sequential; a failed dispatch aborts the run and leaves the
/// completed generations' results on disk.
pub fn run(
    engine: &dyn Engine,
    generations: usize,
    processor: &str,
    data: &RealField,
    conf_info: &str,
    param: &Param,
) -> Result<(), RunError> {
    let time = Instant::now();

    let policy = GenerationPolicy::resolve(generations, param);
    let save_dir = resolve_save_dir(conf_info, param);
    let worker_pool = WorkerPool::new(&param.general.devices)?;
    let mut rng = ChaCha8Rng::seed_from_u64(param.general.seed);

    let mut population = init_population(&policy, param);

    info!(
        "Evolving {} candidate(s) over {} generation(s) on {} device(s), processor '{}'.",
        policy.reconstructions,
        generations,
        worker_pool.device_count(),
        processor
    );

    for g in 0..generations {
        let gen_data = policy.masked_data(data, g);
        let gen_dir = save_dir.join(format!("g_{}", g));
        let metric = policy.metric(g);

        let priors = std::mem::take(&mut population.candidates);
        let tasks: Vec<Task> = priors
            .into_iter()
            .enumerate()
            .map(|(slot, candidate)| Task {
                slot,
                prior: if candidate.image.is_some() {
                    Some(candidate)
                } else {
                    None
                },
                dest: gen_dir.join(slot.to_string()),
            })
            .collect();

        let results = worker_pool.dispatch(engine, processor, &gen_data, metric, param, tasks)?;

        // results arrive as a bag; the slot token restores correspondence
        let mut slots: Vec<Option<Candidate>> =
            (0..policy.reconstructions).map(|_| None).collect();
        for result in results {
            debug!(
                "Generation {} slot {} scored {:.6e}.",
                g, result.slot, result.score
            );
            slots[result.slot] = Some(result.candidate);
        }
        population.candidates = slots
            .into_iter()
            .enumerate()
            .map(|(slot, c)| {
                c.ok_or_else(|| -> RunError {
                    format!("worker pool returned no result for slot {}", slot).into()
                })
            })
            .collect::<Result<Vec<Candidate>, RunError>>()?;

        let perm = rank::rank(&population, metric);
        population.order(&perm);
        store::persist_generation(&population, &gen_dir)?;

        info!(
            "Generation {}/{} ranked by {:?} | best error {:.4e} | worst error {:.4e}",
            g + 1,
            generations,
            metric,
            population.candidates[0].final_error(),
            population.candidates[population.len() - 1].final_error()
        );

        if g + 1 < generations && population.len() > 1 {
            next_generation(&mut population, g, &policy, &mut rng)?;
        }
    }

    info!(
        "Computed {} generation(s) in {:.2?}, results under {:?}.",
        generations,
        time.elapsed(),
        save_dir
    );

    Ok(())
}

/// Breed the ranked population into the next generation's seeds. Removal
/// counts shrink the breeding stock only: the emitted population is padded
/// back to full size by cycling the top-ranked children, keeping the
/// population size constant across generations.
fn next_generation(
    population: &mut Population,
    generation: usize,
    policy: &GenerationPolicy,
    rng: &mut ChaCha8Rng,
) -> Result<(), RunError> {
    let images: Vec<CplxField> = population
        .candidates
        .iter()
        .map(|c| {
            c.image.clone().ok_or_else(|| -> RunError {
                "cannot breed from a candidate without an image".into()
            })
        })
        .collect::<Result<Vec<CplxField>, RunError>>()?;

    match breed::breed(&images, generation, policy, rng) {
        Some((child_images, child_supports)) => {
            let mut seeds: Vec<Candidate> = child_images
                .into_iter()
                .zip(child_supports)
                .map(|(image, support)| Candidate::seed(image, Some(support)))
                .collect();
            let survivors = seeds.len();
            let mut next = 0;
            while seeds.len() < policy.reconstructions {
                seeds.push(seeds[next % survivors].clone());
                next += 1;
            }
            if survivors < policy.reconstructions {
                debug!(
                    "Generation {} bred {} survivor(s); population padded back to {}.",
                    generation, survivors, policy.reconstructions
                );
            }
            population.candidates = seeds;
        }
        // breeding disabled: ranked candidates seed the next generation
        None => {}
    }
    Ok(())
}
