//! TOML-based scenario configuration and preset definitions.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level scenario configuration parsed from TOML.
///
/// All fields have defaults matching the baseline scenario. Load from
/// TOML with [`ScenarioConfig::from_toml_file`] or use
/// [`ScenarioConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub basic: BasicConfig,
    #[serde(default)]
    pub charging: ChargingConfig,
    #[serde(default)]
    pub weights: WeightsConfig,
    #[serde(default)]
    pub cost_options: SeriesOptions,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub sim_params: SimParamsConfig,
    #[serde(default)]
    pub outputs: OutputsConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub emission_options: SeriesOptions,
    #[serde(default)]
    pub temperature_options: TemperatureOptions,
}

/// Global simulation timing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BasicConfig {
    pub start_date: String,
    pub end_date: String,
    /// Timestep size in minutes.
    pub step_size: u32,
    /// Selects the Stepper/Resolver variant; currently only `"schedule"`.
    pub simulation_type: String,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            start_date: "2023-01-01".to_string(),
            end_date: "2023-01-02".to_string(),
            step_size: 15,
            simulation_type: "schedule".to_string(),
        }
    }
}

/// Charging policy and EmCS strategy selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChargingConfig {
    pub soc_min: f64,
    pub end_of_day_soc: f64,
    pub min_charging_power: f64,
    /// Average driving speed, km/h.
    pub average_speed: f64,
    /// Minimum resolvable charging window, minutes.
    pub charging_step_size: f64,
    pub charging_strategy: String,
    pub alternative_strategy: String,
    pub alternative_strategy_min_standing_time: f64,
    pub spiceev_horizon: u32,
}

impl Default for ChargingConfig {
    fn default() -> Self {
        Self {
            soc_min: 0.2,
            end_of_day_soc: 0.8,
            min_charging_power: 0.1,
            average_speed: 30.0,
            charging_step_size: 15.0,
            charging_strategy: "greedy".to_string(),
            alternative_strategy: "balanced".to_string(),
            alternative_strategy_min_standing_time: 120.0,
            spiceev_horizon: 24,
        }
    }
}

/// Evaluator scoring weights.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WeightsConfig {
    pub time_factor: f64,
    pub energy_factor: f64,
    pub cost_factor: f64,
    pub local_renewables_factor: f64,
    pub soc_factor: f64,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self { time_factor: 0.4, energy_factor: 0.3, cost_factor: 0.2, local_renewables_factor: 0.05, soc_factor: 0.05 }
    }
}

/// Shared shape for referencing a time-series CSV: cost and emission series
/// both need the same `{start_time, step_duration, column}` triple.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SeriesOptions {
    pub start_time: String,
    pub step_duration: u32,
    pub column: String,
    /// Feed-in purchase price per kWh; only meaningful for `cost_options`.
    pub feed_in_price: f64,
}

impl Default for SeriesOptions {
    fn default() -> Self {
        Self { start_time: "2023-01-01T00:00:00".to_string(), step_duration: 900, column: "value".to_string(), feed_in_price: 0.05 }
    }
}

/// Fallback values substituted for missing or invalid inputs.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DefaultsConfig {
    pub level_of_loading_default: f64,
    pub incline_default: f64,
    pub temperature_default: f64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self { level_of_loading_default: 0.0, incline_default: 0.0, temperature_default: 20.0 }
    }
}

/// Run-level knobs that do not belong to a specific component.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimParamsConfig {
    pub seed: u64,
    /// Whether the Resolver may delete rides to escape an infeasible plan.
    pub delete_rides: bool,
    pub ignore_emcs_warnings: bool,
}

impl Default for SimParamsConfig {
    fn default() -> Self {
        Self { seed: 42, delete_rides: true, ignore_emcs_warnings: false }
    }
}

/// Which export artifacts to produce.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputsConfig {
    pub vehicle_csv: bool,
    pub location_csv: bool,
    /// Parsed and validated, but plotting is out of scope — this field is a
    /// no-op beyond input validation.
    pub plot_png: bool,
    /// Parsed and validated, but plotting is out of scope — this field is a
    /// no-op beyond input validation.
    pub plot_html: bool,
}

impl Default for OutputsConfig {
    fn default() -> Self {
        Self { vehicle_csv: true, location_csv: true, plot_png: false, plot_html: false }
    }
}

/// Input file paths, resolved relative to the config file's own directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilesConfig {
    pub schedule: PathBuf,
    pub vehicle_types: PathBuf,
    pub charging_points: PathBuf,
    pub distance: PathBuf,
    pub incline: PathBuf,
    pub consumption: PathBuf,
    pub temperature: PathBuf,
    pub cost: PathBuf,
    pub emission: Option<PathBuf>,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            schedule: PathBuf::from("schedule.csv"),
            vehicle_types: PathBuf::from("vehicle_types.csv"),
            charging_points: PathBuf::from("charging_points.csv"),
            distance: PathBuf::from("distance.csv"),
            incline: PathBuf::from("incline.csv"),
            consumption: PathBuf::from("consumption.csv"),
            temperature: PathBuf::from("temperature.csv"),
            cost: PathBuf::from("cost.csv"),
            emission: None,
        }
    }
}

/// Which temperature-table column to sample.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemperatureOptions {
    pub column: String,
}

impl Default for TemperatureOptions {
    fn default() -> Self {
        Self { column: "default".to_string() }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g. `"charging.soc_min"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "config error: {} — {}", self.field, self.message)
    }
}

impl ScenarioConfig {
    /// Returns the baseline scenario's defaults.
    pub fn baseline() -> Self {
        Self {
            basic: BasicConfig::default(),
            charging: ChargingConfig::default(),
            weights: WeightsConfig::default(),
            cost_options: SeriesOptions::default(),
            defaults: DefaultsConfig::default(),
            sim_params: SimParamsConfig::default(),
            outputs: OutputsConfig::default(),
            files: FilesConfig::default(),
            emission_options: SeriesOptions::default(),
            temperature_options: TemperatureOptions::default(),
        }
    }

    /// A fleet under heavy charger contention: fewer usable candidates per
    /// break, tighter SoC tolerance.
    pub fn contention() -> Self {
        Self {
            charging: ChargingConfig { soc_min: 0.25, end_of_day_soc: 0.9, ..ChargingConfig::default() },
            sim_params: SimParamsConfig { delete_rides: false, ..SimParamsConfig::default() },
            ..Self::baseline()
        }
    }

    /// A cost-sensitive preset that weighs price and renewables heavily.
    pub fn cost_sensitive() -> Self {
        Self {
            weights: WeightsConfig { time_factor: 0.2, energy_factor: 0.2, cost_factor: 0.4, local_renewables_factor: 0.15, soc_factor: 0.05 },
            ..Self::baseline()
        }
    }

    pub const PRESETS: &'static [&'static str] = &["baseline", "contention", "cost_sensitive"];

    /// Loads a scenario from a named preset.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "contention" => Ok(Self::contention()),
            "cost_sensitive" => Ok(Self::cost_sensitive()),
            _ => Err(ConfigError { field: "preset".to_string(), message: format!("unknown preset \"{name}\", available: {}", Self::PRESETS.join(", ")) }),
        }
    }

    /// Parses a scenario from a TOML file; input paths in `[files]` are
    /// resolved relative to the file's own directory.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError { field: "scenario".to_string(), message: format!("cannot read \"{}\": {e}", path.display()) })?;
        let mut cfg = Self::from_toml_str(&content)?;
        if let Some(base_dir) = path.parent() {
            cfg.files.schedule = base_dir.join(&cfg.files.schedule);
            cfg.files.vehicle_types = base_dir.join(&cfg.files.vehicle_types);
            cfg.files.charging_points = base_dir.join(&cfg.files.charging_points);
            cfg.files.distance = base_dir.join(&cfg.files.distance);
            cfg.files.incline = base_dir.join(&cfg.files.incline);
            cfg.files.consumption = base_dir.join(&cfg.files.consumption);
            cfg.files.temperature = base_dir.join(&cfg.files.temperature);
            cfg.files.cost = base_dir.join(&cfg.files.cost);
            cfg.files.emission = cfg.files.emission.map(|p| base_dir.join(p));
        }
        Ok(cfg)
    }

    /// Parses a scenario from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError { field: "toml".to_string(), message: e.to_string() })
    }

    /// Validates all fields and returns a list of errors; empty means valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        let c = &self.charging;
        if !(0.0..=1.0).contains(&c.soc_min) {
            errors.push(ConfigError { field: "charging.soc_min".into(), message: "must be in [0.0, 1.0]".into() });
        }
        if !(0.0..=1.0).contains(&c.end_of_day_soc) {
            errors.push(ConfigError { field: "charging.end_of_day_soc".into(), message: "must be in [0.0, 1.0]".into() });
        }
        if c.end_of_day_soc < c.soc_min {
            errors.push(ConfigError { field: "charging.end_of_day_soc".into(), message: "must be >= charging.soc_min".into() });
        }
        if c.average_speed <= 0.0 {
            errors.push(ConfigError { field: "charging.average_speed".into(), message: "must be > 0".into() });
        }
        if c.charging_step_size <= 0.0 {
            errors.push(ConfigError { field: "charging.charging_step_size".into(), message: "must be > 0".into() });
        }
        if c.alternative_strategy_min_standing_time < 0.0 {
            errors.push(ConfigError { field: "charging.alternative_strategy_min_standing_time".into(), message: "must be >= 0".into() });
        }

        let w = &self.weights;
        let weight_sum = w.time_factor + w.energy_factor + w.cost_factor + w.local_renewables_factor + w.soc_factor;
        if weight_sum <= 0.0 {
            errors.push(ConfigError { field: "weights".into(), message: "at least one weight must be positive".into() });
        }

        let b = &self.basic;
        if b.step_size == 0 {
            errors.push(ConfigError { field: "basic.step_size".into(), message: "must be > 0".into() });
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_preset_is_valid() {
        let cfg = ScenarioConfig::baseline();
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn from_preset_unknown_fails() {
        let err = ScenarioConfig::from_preset("nonexistent").unwrap_err();
        assert!(err.message.contains("unknown preset"));
    }

    #[test]
    fn all_presets_are_valid() {
        for name in ScenarioConfig::PRESETS {
            let cfg = ScenarioConfig::from_preset(name).unwrap();
            assert!(cfg.validate().is_empty(), "preset {name} should be valid");
        }
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let toml = r#"
[charging]
soc_min = 0.3
"#;
        let cfg = ScenarioConfig::from_toml_str(toml).unwrap();
        assert_eq!(cfg.charging.soc_min, 0.3);
        assert_eq!(cfg.charging.average_speed, 30.0);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let toml = r#"
[charging]
soc_min = 0.3
bogus = true
"#;
        assert!(ScenarioConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn validation_catches_end_of_day_below_min() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.charging.end_of_day_soc = 0.1;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "charging.end_of_day_soc"));
    }

    #[test]
    fn validation_catches_all_zero_weights() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.weights = WeightsConfig { time_factor: 0.0, energy_factor: 0.0, cost_factor: 0.0, local_renewables_factor: 0.0, soc_factor: 0.0 };
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "weights"));
    }
}
