//! Configuration models and loaders for the mission simulator.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Level of physical detail used when propagating the orbit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Fidelity {
    #[serde(alias = "low")]
    Low,
    #[serde(alias = "medium")]
    Medium,
    #[serde(alias = "high")]
    High,
}

impl Fidelity {
    pub fn as_str(self) -> &'static str {
        match self {
            Fidelity::Low => "LOW",
            Fidelity::Medium => "MEDIUM",
            Fidelity::High => "HIGH",
        }
    }
}

impl fmt::Display for Fidelity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Fidelity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(Fidelity::Low),
            "MEDIUM" => Ok(Fidelity::Medium),
            "HIGH" => Ok(Fidelity::High),
            _ => Err(ConfigError::invalid("fidelity", format!("unknown level `{s}`"))),
        }
    }
}

/// Orientation of the solar array normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PanelPointing {
    /// Array normal always points at the sun.
    #[default]
    SunTracking,
    /// Body-mounted array facing away from Earth.
    Zenith,
    /// Body-mounted array facing Earth.
    Nadir,
}

/// Battery and array electrical limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerConfig {
    pub max_charge_rate_w: f64,
    pub max_discharge_rate_w: f64,
    pub round_trip_efficiency: f64,
    pub min_soc: f64,
    pub panel_pointing: PanelPointing,
    /// Fixed sun direction in ECI. Normalized on use.
    pub sun_direction: [f64; 3],
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            max_charge_rate_w: 1_000.0,
            max_discharge_rate_w: 2_000.0,
            round_trip_efficiency: 0.9,
            min_soc: 0.1,
            panel_pointing: PanelPointing::SunTracking,
            sun_direction: [1.0, 0.0, 0.0],
        }
    }
}

/// Hall-effect thruster characteristics and duty-cycle layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PropulsionConfig {
    pub thrust_n: f64,
    pub isp_s: f64,
    pub power_w: f64,
    /// Number of thrust arcs laid out per orbit.
    pub arcs_per_orbit: u32,
    /// Angular width of each arc, degrees of orbit travel.
    pub arc_width_deg: f64,
    /// Specific impulse of the reaction-control thrusters used for desaturation.
    pub rcs_isp_s: f64,
}

impl Default for PropulsionConfig {
    fn default() -> Self {
        Self {
            thrust_n: 0.1,
            isp_s: 1_500.0,
            power_w: 1_500.0,
            arcs_per_orbit: 2,
            arc_width_deg: 60.0,
            rcs_isp_s: 70.0,
        }
    }
}

/// Imaging payload characteristics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadConfig {
    pub imager_power_w: f64,
    pub frame_size_mb: f64,
    pub frames_per_minute: f64,
    /// Instantaneous field of view of one detector pixel (µrad).
    pub ifov_urad: f64,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            imager_power_w: 150.0,
            frame_size_mb: 50.0,
            frames_per_minute: 6.0,
            ifov_urad: 2.0,
        }
    }
}

/// Downlink radio characteristics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommsConfig {
    pub transmitter_power_w: f64,
    pub downlink_rate_mbps: f64,
}

impl Default for CommsConfig {
    fn default() -> Self {
        Self {
            transmitter_power_w: 80.0,
            downlink_rate_mbps: 100.0,
        }
    }
}

/// Attitude-control actuators used for momentum management.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdcsConfig {
    pub desat_power_w: f64,
    pub moment_arm_m: f64,
    pub magnetorquer_torque_nm: f64,
    pub magnetorquer_power_w: f64,
}

impl Default for AdcsConfig {
    fn default() -> Self {
        Self {
            desat_power_w: 40.0,
            moment_arm_m: 0.8,
            magnetorquer_torque_nm: 0.002,
            magnetorquer_power_w: 15.0,
        }
    }
}

/// Static spacecraft design parameters, immutable for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpacecraftConfig {
    #[serde(default)]
    pub name: String,
    pub dry_mass_kg: f64,
    pub initial_propellant_kg: f64,
    pub battery_capacity_wh: f64,
    pub solar_panel_area_m2: f64,
    pub solar_panel_efficiency: f64,
    pub base_power_w: f64,
    pub storage_capacity_gb: f64,
    #[serde(default)]
    pub power: PowerConfig,
    #[serde(default)]
    pub propulsion: PropulsionConfig,
    #[serde(default)]
    pub payload: PayloadConfig,
    #[serde(default)]
    pub comms: CommsConfig,
    #[serde(default)]
    pub adcs: AdcsConfig,
}

impl SpacecraftConfig {
    /// Convenience accessor for total initial mass.
    pub fn initial_mass_kg(&self) -> f64 {
        self.dry_mass_kg + self.initial_propellant_kg
    }

    /// Reject physically meaningless design parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("spacecraft.dry_mass_kg", self.dry_mass_kg)?;
        non_negative("spacecraft.initial_propellant_kg", self.initial_propellant_kg)?;
        positive("spacecraft.battery_capacity_wh", self.battery_capacity_wh)?;
        non_negative("spacecraft.solar_panel_area_m2", self.solar_panel_area_m2)?;
        fraction("spacecraft.solar_panel_efficiency", self.solar_panel_efficiency)?;
        non_negative("spacecraft.base_power_w", self.base_power_w)?;
        positive("spacecraft.storage_capacity_gb", self.storage_capacity_gb)?;

        let power = &self.power;
        non_negative("power.max_charge_rate_w", power.max_charge_rate_w)?;
        non_negative("power.max_discharge_rate_w", power.max_discharge_rate_w)?;
        fraction("power.round_trip_efficiency", power.round_trip_efficiency)?;
        if !(0.0..1.0).contains(&power.min_soc) {
            return Err(ConfigError::invalid(
                "power.min_soc",
                format!("{} is outside [0, 1)", power.min_soc),
            ));
        }
        let sun = power.sun_direction;
        if sun.iter().any(|c| !c.is_finite()) || sun.iter().all(|c| *c == 0.0) {
            return Err(ConfigError::invalid(
                "power.sun_direction",
                "must be a finite non-zero vector",
            ));
        }

        let prop = &self.propulsion;
        non_negative("propulsion.thrust_n", prop.thrust_n)?;
        positive("propulsion.isp_s", prop.isp_s)?;
        non_negative("propulsion.power_w", prop.power_w)?;
        positive("propulsion.rcs_isp_s", prop.rcs_isp_s)?;
        if prop.arcs_per_orbit == 0 {
            return Err(ConfigError::invalid(
                "propulsion.arcs_per_orbit",
                "at least one arc per orbit is required",
            ));
        }
        if !(prop.arc_width_deg > 0.0 && prop.arc_width_deg * prop.arcs_per_orbit as f64 <= 360.0)
        {
            return Err(ConfigError::invalid(
                "propulsion.arc_width_deg",
                format!(
                    "{} arcs of {}° do not fit in one orbit",
                    prop.arcs_per_orbit, prop.arc_width_deg
                ),
            ));
        }

        non_negative("payload.imager_power_w", self.payload.imager_power_w)?;
        positive("payload.frame_size_mb", self.payload.frame_size_mb)?;
        non_negative("payload.frames_per_minute", self.payload.frames_per_minute)?;
        positive("payload.ifov_urad", self.payload.ifov_urad)?;
        non_negative("comms.transmitter_power_w", self.comms.transmitter_power_w)?;
        non_negative("comms.downlink_rate_mbps", self.comms.downlink_rate_mbps)?;
        non_negative("adcs.desat_power_w", self.adcs.desat_power_w)?;
        positive("adcs.moment_arm_m", self.adcs.moment_arm_m)?;
        non_negative("adcs.magnetorquer_torque_nm", self.adcs.magnetorquer_torque_nm)?;
        non_negative("adcs.magnetorquer_power_w", self.adcs.magnetorquer_power_w)?;
        Ok(())
    }
}

fn default_time_step() -> f64 {
    60.0
}

/// Run-level configuration passed to the engine alongside the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub spacecraft: SpacecraftConfig,
    #[serde(default = "default_time_step")]
    pub time_step_s: f64,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub enable_cache: bool,
    #[serde(default)]
    pub random_seed: u64,
}

impl SimConfig {
    pub fn new(spacecraft: SpacecraftConfig) -> Self {
        Self {
            spacecraft,
            time_step_s: default_time_step(),
            output_dir: None,
            enable_cache: false,
            random_seed: 0,
        }
    }

    /// Validate the whole configuration. Called before any activity runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.time_step_s.is_finite() && self.time_step_s > 0.0) {
            return Err(ConfigError::invalid(
                "time_step_s",
                format!("{} is not a positive step", self.time_step_s),
            ));
        }
        self.spacecraft.validate()
    }
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} must be positive")))
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} must be non-negative")))
    }
}

fn fraction(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} is outside (0, 1]")))
    }
}

/// Load a spacecraft design from YAML, TOML, or JSON.
pub fn load_spacecraft<P: AsRef<Path>>(path: P) -> Result<SpacecraftConfig, ConfigError> {
    let config: SpacecraftConfig = load_document(path)?;
    config.validate()?;
    Ok(config)
}

/// Load a run configuration from YAML, TOML, or JSON.
pub fn load_sim_config<P: AsRef<Path>>(path: P) -> Result<SimConfig, ConfigError> {
    let config: SimConfig = load_document(path)?;
    config.validate()?;
    Ok(config)
}

/// Deserialize any document, picking the format from the file extension (YAML by default).
pub fn load_document<T, P>(path: P) -> Result<T, ConfigError>
where
    T: for<'de> Deserialize<'de>,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => {
            let contents = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&contents)?)
        }
        Some("json") => {
            let reader = File::open(path)?;
            Ok(serde_json::from_reader(reader)?)
        }
        _ => {
            let reader = File::open(path)?;
            Ok(serde_yaml::from_reader(reader)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample() -> SpacecraftConfig {
        SpacecraftConfig {
            name: "test-sat".into(),
            dry_mass_kg: 450.0,
            initial_propellant_kg: 50.0,
            battery_capacity_wh: 2_000.0,
            solar_panel_area_m2: 6.0,
            solar_panel_efficiency: 0.3,
            base_power_w: 150.0,
            storage_capacity_gb: 256.0,
            power: PowerConfig::default(),
            propulsion: PropulsionConfig::default(),
            payload: PayloadConfig::default(),
            comms: CommsConfig::default(),
            adcs: AdcsConfig::default(),
        }
    }

    #[test]
    fn sample_config_validates() {
        assert!(sample().validate().is_ok());
        assert_eq!(sample().initial_mass_kg(), 500.0);
    }

    #[test]
    fn zero_time_step_is_rejected() {
        let mut config = SimConfig::new(sample());
        config.time_step_s = 0.0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "time_step_s", .. }));
    }

    #[test]
    fn arcs_must_fit_in_one_orbit() {
        let mut config = sample();
        config.propulsion.arcs_per_orbit = 4;
        config.propulsion.arc_width_deg = 100.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn fidelity_parses_case_insensitively() {
        assert_eq!("medium".parse::<Fidelity>().unwrap(), Fidelity::Medium);
        assert!("ultra".parse::<Fidelity>().is_err());
        let parsed: Fidelity = serde_json::from_str("\"HIGH\"").unwrap();
        assert_eq!(parsed, Fidelity::High);
    }

    #[test]
    fn yaml_spacecraft_fills_nested_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "dry_mass_kg: 400\ninitial_propellant_kg: 40\nbattery_capacity_wh: 1500\n\
             solar_panel_area_m2: 4\nsolar_panel_efficiency: 0.28\nbase_power_w: 120\n\
             storage_capacity_gb: 128\npropulsion:\n  thrust_n: 0.05\n"
        )
        .unwrap();
        let config = load_spacecraft(file.path()).unwrap();
        assert_eq!(config.propulsion.thrust_n, 0.05);
        assert_eq!(config.propulsion.isp_s, 1_500.0);
        assert_eq!(config.power.panel_pointing, PanelPointing::SunTracking);
    }

    #[test]
    fn toml_sim_config_uses_default_step() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "random_seed = 7\n[spacecraft]\ndry_mass_kg = 400.0\ninitial_propellant_kg = 40.0\n\
             battery_capacity_wh = 1500.0\nsolar_panel_area_m2 = 4.0\n\
             solar_panel_efficiency = 0.28\nbase_power_w = 120.0\nstorage_capacity_gb = 128.0\n"
        )
        .unwrap();
        let config = load_sim_config(file.path()).unwrap();
        assert_eq!(config.time_step_s, 60.0);
        assert_eq!(config.random_seed, 7);
        assert!(!config.enable_cache);
    }
}
