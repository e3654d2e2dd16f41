use crate::candidate::{Candidate, RealField};
use crate::population::Population;
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error;
use std::fs;
use std::path::Path;

//-----------------------------------------------------------------------------
// Candidate persistence
//-----------------------------------------------------------------------------
//
// One directory per candidate, one bincode file per field:
// image.bin, support.bin, coherence.bin (when present), reciprocal.bin,
// error_trace.bin. Generations are laid out as <save_root>/g_<g>/<rank>/.

pub type StoreError = Box<dyn Error + Send + Sync>;

const IMAGE_FILE: &str = "image.bin";
const SUPPORT_FILE: &str = "support.bin";
const COHERENCE_FILE: &str = "coherence.bin";
const RECIPROCAL_FILE: &str = "reciprocal.bin";
const ERROR_TRACE_FILE: &str = "error_trace.bin";

fn write_field<T: Serialize>(dir: &Path, file: &str, value: &T) -> Result<(), StoreError> {
    fs::write(dir.join(file), bincode::serialize(value)?)?;
    Ok(())
}

fn read_field<T: DeserializeOwned>(dir: &Path, file: &str) -> Option<T> {
    let bytes = fs::read(dir.join(file)).ok()?;
    bincode::deserialize(&bytes).ok()
}

fn drop_field(dir: &Path, file: &str) -> Result<(), StoreError> {
    let path = dir.join(file);
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Persist one candidate into its directory, creating it as needed. An
/// unset field removes any file a previous occupant left behind, so the
/// directory always reflects exactly this candidate.
pub fn persist(candidate: &Candidate, dir: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(dir)?;
    match candidate.image {
        Some(ref image) => write_field(dir, IMAGE_FILE, image)?,
        None => drop_field(dir, IMAGE_FILE)?,
    }
    match candidate.support {
        Some(ref support) => write_field(dir, SUPPORT_FILE, support)?,
        None => drop_field(dir, SUPPORT_FILE)?,
    }
    match candidate.coherence {
        Some(ref coherence) => write_field(dir, COHERENCE_FILE, coherence)?,
        None => drop_field(dir, COHERENCE_FILE)?,
    }
    match candidate.reciprocal {
        Some(ref reciprocal) => write_field(dir, RECIPROCAL_FILE, reciprocal)?,
        None => drop_field(dir, RECIPROCAL_FILE)?,
    }
    write_field(dir, ERROR_TRACE_FILE, &candidate.error_trace)?;
    Ok(())
}

/// Load a candidate from its directory. Returns `None` when no usable
/// image is found; auxiliary fields are optional.
pub fn load(dir: &Path) -> Option<Candidate> {
    let image = read_field(dir, IMAGE_FILE)?;
    Some(Candidate {
        image: Some(image),
        support: read_field(dir, SUPPORT_FILE),
        coherence: read_field(dir, COHERENCE_FILE),
        error_trace: read_field(dir, ERROR_TRACE_FILE).unwrap_or_default(),
        reciprocal: read_field(dir, RECIPROCAL_FILE),
    })
}

/// Persist a rank-ordered population, one sub-directory per rank.
pub fn persist_generation(population: &Population, dir: &Path) -> Result<(), StoreError> {
    for (rank, candidate) in population.candidates.iter().enumerate() {
        persist(candidate, &dir.join(rank.to_string()))?;
    }
    Ok(())
}

/// Continuation state for every slot: `<continue_dir>/<slot>/`. A slot
/// whose directory is missing or unreadable starts fresh.
pub fn load_continuation(continue_dir: &Path, slots: usize) -> Vec<Option<Candidate>> {
    (0..slots)
        .map(|slot| {
            let dir = continue_dir.join(slot.to_string());
            let loaded = load(&dir);
            if loaded.is_none() {
                warn!(
                    "No usable continuation state in {:?}; slot {} starts fresh.",
                    dir, slot
                );
            }
            loaded
        })
        .collect()
}

/// Measured data array, bincode on disk.
pub fn load_data(path: &Path) -> Result<RealField, StoreError> {
    let bytes = fs::read(path)?;
    Ok(bincode::deserialize(&bytes)?)
}

pub fn save_data(data: &RealField, path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bincode::serialize(data)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::CplxField;
    use ndarray::Array3;
    use num_complex::Complex64;
    use std::path::PathBuf;

    fn scratch(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("genrec_store_{}_{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn full_candidate() -> Candidate {
        let image: CplxField = Array3::from_shape_fn((3, 4, 5), |(i, j, k)| {
            Complex64::new(i as f64 + 0.25, (j * k) as f64 - 1.5)
        });
        Candidate {
            reciprocal: Some(image.mapv(|v| v * 2.0)),
            support: Some(image.mapv(|v| if v.re > 1.0 { 1.0 } else { 0.0 })),
            coherence: Some(Array3::from_elem((2, 2, 2), 0.125)),
            error_trace: vec![2.0, 1.0, 0.125],
            image: Some(image),
        }
    }

    #[test]
    fn test_round_trip_is_exact() {
        let dir = scratch("roundtrip");
        let candidate = full_candidate();
        persist(&candidate, &dir).unwrap();
        let back = load(&dir).unwrap();
        assert_eq!(candidate, back);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_persisted_bytes_are_stable() {
        let dir = scratch("stable");
        let candidate = full_candidate();
        persist(&candidate, &dir).unwrap();
        let first = fs::read(dir.join(IMAGE_FILE)).unwrap();
        persist(&candidate, &dir).unwrap();
        let second = fs::read(dir.join(IMAGE_FILE)).unwrap();
        assert_eq!(first, second);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_missing_directory_is_none() {
        let dir = scratch("missing");
        assert!(load(&dir.join("nothing_here")).is_none());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_candidate_without_coherence_round_trips() {
        let dir = scratch("nocoh");
        // a previous occupant with coherence must not leak into the reload
        persist(&full_candidate(), &dir).unwrap();

        let mut candidate = full_candidate();
        candidate.coherence = None;
        persist(&candidate, &dir).unwrap();
        let back = load(&dir).unwrap();
        assert!(back.coherence.is_none());
        assert_eq!(candidate, back);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_continuation_recovers_per_slot() {
        let dir = scratch("cont");
        persist(&full_candidate(), &dir.join("1")).unwrap();
        let slots = load_continuation(&dir, 3);
        assert!(slots[0].is_none());
        assert!(slots[1].is_some());
        assert!(slots[2].is_none());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_persist_generation_layout() {
        let dir = scratch("gen");
        let mut pop = Population::new();
        pop.candidates.push(full_candidate());
        pop.candidates.push(full_candidate());
        persist_generation(&pop, &dir.join("g_0")).unwrap();
        assert!(dir.join("g_0").join("0").join(IMAGE_FILE).exists());
        assert!(dir.join("g_0").join("1").join(IMAGE_FILE).exists());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_data_round_trip() {
        let dir = scratch("data");
        let data: RealField = Array3::from_shape_fn((4, 4, 4), |(i, j, k)| (i * j + k) as f64);
        let path = dir.join("data.bin");
        save_data(&data, &path).unwrap();
        assert_eq!(load_data(&path).unwrap(), data);
        fs::remove_dir_all(&dir).unwrap();
    }
}
