use log::warn;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs::File;
use std::io::BufReader;

// Field definitions and associated default values

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Param {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub data: Data,
    #[serde(default)]
    pub rec: Rec,
    #[serde(default)]
    pub ga: GA,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct General {
    #[serde(default = "seed_default")]
    pub seed: u64,
    #[serde(default = "processor_default")]
    pub processor: String,
    #[serde(default = "devices_default")]
    pub devices: Vec<i64>,
    #[serde(default = "log_base_default")]
    pub log_base: String,
    #[serde(default = "log_suffix_default")]
    pub log_suffix: String,
    #[serde(default = "log_level_default")]
    pub log_level: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Data {
    #[serde(default = "empty_string")]
    pub data_file: String,
    #[serde(default = "empty_string")]
    pub save_dir: String,
    #[serde(default = "false_default")]
    pub cont: bool,
    #[serde(default = "empty_string")]
    pub continue_dir: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Rec {
    #[serde(default = "one_default")]
    pub reconstructions: usize,
    #[serde(default = "support_threshold_default")]
    pub support_threshold: f64,
    #[serde(default = "support_sigma_default")]
    pub support_sigma: f64,
    /// Shape of the partial-coherence kernel handed to the engine, absent
    /// when coherence is not modelled.
    #[serde(default)]
    pub coherence_shape: Option<Vec<usize>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GA {
    #[serde(default = "one_default")]
    pub generations: usize,
    #[serde(default)]
    pub metrics: Option<Vec<String>>,
    #[serde(default)]
    pub removes: Option<Vec<usize>>,
    #[serde(default)]
    pub support_thresholds: Option<Vec<f64>>,
    #[serde(default)]
    pub support_sigmas: Option<Vec<f64>>,
    #[serde(default)]
    pub breed_modes: Option<Vec<String>>,
    #[serde(default = "uzero_default")]
    pub low_resolution_generations: usize,
    #[serde(default = "low_resolution_sigma_alg_default")]
    pub low_resolution_sigma_alg: String,
    #[serde(default)]
    pub low_resolution_sigmas: Option<Vec<f64>>,
    #[serde(default = "low_resolution_sigma_min_default")]
    pub low_resolution_sigma_min: f64,
    #[serde(default = "low_resolution_sigma_max_default")]
    pub low_resolution_sigma_max: f64,
    #[serde(default = "low_resolution_scale_power_default")]
    pub low_resolution_scale_power: f64,
}

// Default section definitions

impl Default for General {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Data {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Rec {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for GA {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Param {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Param {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn get(param_file: String) -> Result<Param, Box<dyn Error>> {
    let param_file_reader = File::open(param_file)?;
    let param_reader = BufReader::new(param_file_reader);

    let mut config: Param = serde_yaml::from_reader(param_reader)?;

    validate(&mut config)?;

    Ok(config)
}

pub fn validate(param: &mut Param) -> Result<(), String> {
    if param.general.devices.is_empty() {
        return Err("At least one device identifier must be configured.".to_string());
    }

    if param.rec.reconstructions == 0 {
        return Err("reconstructions must be >= 1.".to_string());
    }

    if param.ga.generations == 0 {
        return Err("generations must be >= 1.".to_string());
    }

    if param.rec.support_threshold <= 0.0 || param.rec.support_threshold >= 1.0 {
        return Err(format!(
            "Invalid support_threshold={:.3}. Must be in range (0, 1).",
            param.rec.support_threshold
        ));
    }

    if param.rec.support_sigma <= 0.0 {
        return Err(format!(
            "Invalid support_sigma={:.3}. Must be > 0.",
            param.rec.support_sigma
        ));
    }

    if let Some(ref removes) = param.ga.removes {
        if removes.iter().any(|&r| r >= param.rec.reconstructions) {
            return Err(format!(
                "A per-generation removal count reaches the population size ({}): \
                at least one candidate must survive every generation.",
                param.rec.reconstructions
            ));
        }
    }

    if param.ga.low_resolution_generations >= param.ga.generations
        && param.ga.low_resolution_generations > 0
    {
        warn!(
            "All {} generations run with low-resolution data masking; \
            the final reconstruction never sees the full passband.",
            param.ga.generations
        );
    }

    if param.data.cont && param.data.continue_dir.is_empty() {
        warn!("cont is set without continue_dir: all slots will start fresh.");
    }

    Ok(())
}

// Default value definitions

fn seed_default() -> u64 {
    4815162342
}
fn empty_string() -> String {
    "".to_string()
}
fn processor_default() -> String {
    "cpu".to_string()
}
fn devices_default() -> Vec<i64> {
    vec![-1]
}
fn log_base_default() -> String {
    "".to_string()
}
fn log_suffix_default() -> String {
    "log".to_string()
}
fn log_level_default() -> String {
    "info".to_string()
}
fn false_default() -> bool {
    false
}
fn one_default() -> usize {
    1
}
fn uzero_default() -> usize {
    0
}
fn support_threshold_default() -> f64 {
    0.1
}
fn support_sigma_default() -> f64 {
    1.0
}
fn low_resolution_sigma_alg_default() -> String {
    "space_linear".to_string()
}
fn low_resolution_sigma_min_default() -> f64 {
    0.1
}
fn low_resolution_sigma_max_default() -> f64 {
    2.0
}
fn low_resolution_scale_power_default() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_param_is_valid() {
        let mut param = Param::default();
        assert!(validate(&mut param).is_ok());
        assert_eq!(param.rec.reconstructions, 1);
        assert_eq!(param.ga.generations, 1);
        assert_eq!(param.general.devices, vec![-1]);
        assert!(param.ga.metrics.is_none());
        assert!(param.ga.breed_modes.is_none());
    }

    #[test]
    fn test_validate_rejects_empty_device_pool() {
        let mut param = Param::default();
        param.general.devices.clear();
        assert!(validate(&mut param).is_err());
    }

    #[test]
    fn test_validate_rejects_total_removal() {
        let mut param = Param::default();
        param.rec.reconstructions = 4;
        param.ga.generations = 2;
        param.ga.removes = Some(vec![0, 4]);
        assert!(validate(&mut param).is_err());

        param.ga.removes = Some(vec![0, 3]);
        assert!(validate(&mut param).is_ok());
    }

    #[test]
    fn test_yaml_absent_sequence_differs_from_empty() {
        let absent: Param = serde_yaml::from_str("ga:\n  generations: 2\n").unwrap();
        assert!(absent.ga.metrics.is_none());

        let empty: Param = serde_yaml::from_str("ga:\n  generations: 2\n  metrics: []\n").unwrap();
        assert_eq!(empty.ga.metrics, Some(vec![]));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut param = Param::default();
        param.rec.reconstructions = 8;
        param.ga.breed_modes = Some(vec!["sqrt_ab".to_string()]);
        let text = serde_yaml::to_string(&param).unwrap();
        let back: Param = serde_yaml::from_str(&text).unwrap();
        assert_eq!(param, back);
    }
}
