use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::{
    dispersal::{RadialDisperser, RadialDisperserConfig},
    engine::EngineSettings,
    mosaic::{MapKind, MapSource, Mosaic},
    output::Layer,
    raster::Raster,
    processes::{
        ControlTable, DispersalProcess, GroundControlProcess, GrowthProcess, InfestationProcess,
        MonitorProcess,
    },
    species::SpeciesId,
};

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("scenario '{0}' declares no species")]
    NoSpecies(String),
    #[error("species '{0}' is declared more than once")]
    DuplicateSpecies(String),
    #[error("{section} refers to unknown species '{name}'")]
    UnknownSpecies { section: &'static str, name: String },
    #[error("time increment must be positive, got {0}")]
    InvalidTimeIncrement(i64),
    #[error("check frequency must be positive, got {0}")]
    InvalidCheckFrequency(i64),
    #[error("discovery probability {value} for species '{species}' is outside [0, 1]")]
    InvalidProbability { species: String, value: f64 },
    #[error("no grid was established: give a `grid` section or at least one map file")]
    MissingGrid,
}

fn default_time_increment() -> i64 {
    1
}

fn default_presence() -> MapSource {
    MapSource::None
}

fn default_habitat() -> MapSource {
    MapSource::All
}

fn default_check_frequency() -> i64 {
    1
}

fn default_core_buffer_size() -> usize {
    1
}

fn default_output_interval() -> u64 {
    0
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_layers() -> Vec<Layer> {
    Layer::ALL.to_vec()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    pub seed: u64,
    #[serde(default = "default_time_increment")]
    pub time_increment: i64,
    #[serde(default)]
    pub ticks: Option<u64>,
    #[serde(default)]
    pub no_presence: f64,
    #[serde(default)]
    pub no_management: f64,
    #[serde(default)]
    pub grid: Option<GridConfig>,
    pub species: Vec<ScenarioSpecies>,
    #[serde(default)]
    pub ground_control: GroundControlConfig,
    #[serde(default)]
    pub monitor: Option<MonitorConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Explicit grid dimensions, for scenarios driven only by uniform maps.
#[derive(Debug, Clone, Deserialize)]
pub struct GridConfig {
    pub rows: usize,
    pub cols: usize,
    pub cellsize: f64,
    #[serde(default)]
    pub xll: f64,
    #[serde(default)]
    pub yll: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioSpecies {
    pub name: String,
    #[serde(default = "default_presence")]
    pub presence: MapSource,
    #[serde(default = "default_habitat")]
    pub habitat: MapSource,
    #[serde(default)]
    pub age: Option<MapSource>,
    #[serde(default)]
    pub management: Option<MapSource>,
    /// Ages at which the infestation moves to the next stage.
    #[serde(default)]
    pub thresholds: Vec<i64>,
    #[serde(default)]
    pub wait_time: i64,
    #[serde(default)]
    pub disperser: Option<RadialDisperserConfig>,
    /// Discovery probability per stage.
    #[serde(default)]
    pub p_discovery: Vec<f64>,
}

impl ScenarioSpecies {
    /// Configured maps in load order.
    pub fn maps(&self) -> Vec<(MapKind, &MapSource)> {
        [
            (MapKind::Presence, Some(&self.presence)),
            (MapKind::Habitat, Some(&self.habitat)),
            (MapKind::Age, self.age.as_ref()),
            (MapKind::Management, self.management.as_ref()),
        ]
        .into_iter()
        .filter_map(|(kind, source)| source.map(|source| (kind, source)))
        .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroundControlConfig {
    #[serde(default = "default_check_frequency")]
    pub check_frequency: i64,
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default)]
    pub table: Option<ControlTable>,
}

impl Default for GroundControlConfig {
    fn default() -> Self {
        Self {
            check_frequency: default_check_frequency(),
            ignore: Vec::new(),
            table: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_core_buffer_size")]
    pub core_buffer_size: usize,
    /// Cluster area from which containment is used. Defaults to four cells.
    #[serde(default)]
    pub containment_cutoff: Option<f64>,
    #[serde(default)]
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_interval")]
    pub interval: u64,
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_layers")]
    pub layers: Vec<Layer>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            interval: default_output_interval(),
            dir: default_output_dir(),
            layers: default_layers(),
        }
    }
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// Reads and validates a scenario. Relative map paths are resolved
    /// against the scenario file's directory.
    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let mut scenario: Scenario = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        let map_dir = path.parent().unwrap_or(self.base_dir.as_path()).to_path_buf();
        scenario.resolve_paths(&map_dir);
        scenario
            .validate()
            .with_context(|| format!("Invalid scenario {}", path.display()))?;
        Ok(scenario)
    }
}

impl Scenario {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let scenario: Scenario = serde_yaml::from_str(text).context("Failed to parse scenario")?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for species in &mut self.species {
            species.presence = species.presence.resolve(base);
            species.habitat = species.habitat.resolve(base);
            species.age = species.age.as_ref().map(|s| s.resolve(base));
            species.management = species.management.as_ref().map(|s| s.resolve(base));
        }
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.species.is_empty() {
            return Err(ScenarioError::NoSpecies(self.name.clone()));
        }
        if self.time_increment <= 0 {
            return Err(ScenarioError::InvalidTimeIncrement(self.time_increment));
        }
        if self.ground_control.check_frequency <= 0 {
            return Err(ScenarioError::InvalidCheckFrequency(
                self.ground_control.check_frequency,
            ));
        }
        let mut seen = BTreeSet::new();
        for species in &self.species {
            if !seen.insert(species.name.as_str()) {
                return Err(ScenarioError::DuplicateSpecies(species.name.clone()));
            }
            if let Some(&value) = species
                .p_discovery
                .iter()
                .find(|p| !(0.0..=1.0).contains(*p))
            {
                return Err(ScenarioError::InvalidProbability {
                    species: species.name.clone(),
                    value,
                });
            }
        }
        let monitor_ignore = self.monitor.iter().flat_map(|m| m.ignore.iter());
        for (section, name) in self
            .ground_control
            .ignore
            .iter()
            .map(|n| ("ground_control.ignore", n))
            .chain(monitor_ignore.map(|n| ("monitor.ignore", n)))
        {
            if !seen.contains(name.as_str()) {
                return Err(ScenarioError::UnknownSpecies {
                    section,
                    name: name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn ticks(&self, override_ticks: Option<u64>) -> u64 {
        override_ticks.or(self.ticks).unwrap_or(20)
    }

    fn first_map_file(&self) -> Option<&Path> {
        self.species
            .iter()
            .flat_map(ScenarioSpecies::maps)
            .find_map(|(_, source)| match source {
                MapSource::File(path) => Some(path.as_path()),
                _ => None,
            })
    }

    /// Builds the mosaic and loads every species' maps, in the order
    /// presence, habitat, age, management.
    pub fn build_mosaic(&self) -> Result<Mosaic> {
        let mut mosaic = Mosaic::with_species(self.species.iter().map(|s| s.name.as_str()));
        mosaic.set_no_presence(self.no_presence);
        mosaic.set_no_management(self.no_management);
        if let Some(grid) = &self.grid {
            mosaic.setup(grid.rows, grid.cols, grid.cellsize, grid.xll, grid.yll);
        } else {
            // uniform sources need cells, so the first map file sets the grid
            let path = self.first_map_file().ok_or(ScenarioError::MissingGrid)?;
            let template = Raster::read_ascii(path)
                .with_context(|| format!("Failed to read grid template '{}'", path.display()))?;
            mosaic.setup_from_template(&template);
        }

        for species in &self.species {
            let id = mosaic.require_species(&species.name)?;
            for (kind, source) in species.maps() {
                mosaic.load_map(kind, id, source).with_context(|| {
                    format!(
                        "Failed to load {kind:?} map '{source}' for species '{}'",
                        species.name
                    )
                })?;
            }
            if let Some(config) = &species.disperser {
                mosaic.set_disperser(id, &RadialDisperser::new(config.clone()));
            }
        }

        info!(
            scenario = %self.name,
            rows = mosaic.nrows(),
            cols = mosaic.ncols(),
            species = mosaic.species().len(),
            infested = mosaic.infested_any().len(),
            "mosaic ready"
        );
        Ok(mosaic)
    }

    fn species_ids<'a>(
        &self,
        mosaic: &Mosaic,
        section: &'static str,
        names: impl IntoIterator<Item = &'a String>,
    ) -> Result<Vec<SpeciesId>, ScenarioError> {
        names
            .into_iter()
            .map(|name| {
                mosaic
                    .species_id(name)
                    .ok_or_else(|| ScenarioError::UnknownSpecies {
                        section,
                        name: name.clone(),
                    })
            })
            .collect()
    }

    pub fn growth_process(&self, mosaic: &Mosaic) -> Result<GrowthProcess> {
        let mut growth = GrowthProcess::new();
        for species in &self.species {
            let id = mosaic.require_species(&species.name)?;
            growth.set_thresholds(id, species.thresholds.clone());
        }
        Ok(growth)
    }

    pub fn dispersal_process(&self, mosaic: &Mosaic) -> Result<DispersalProcess> {
        let mut dispersal = DispersalProcess::new();
        for species in &self.species {
            let id = mosaic.require_species(&species.name)?;
            dispersal = dispersal.with_wait_time(id, species.wait_time);
        }
        Ok(dispersal)
    }

    pub fn infestation_process(&self) -> InfestationProcess {
        InfestationProcess::new()
    }

    /// `None` when the scenario has no `monitor` section.
    pub fn monitor_process(&self, mosaic: &Mosaic) -> Result<Option<MonitorProcess>> {
        let Some(config) = &self.monitor else {
            return Ok(None);
        };
        let mut monitor = MonitorProcess::new().with_core_buffer_size(config.core_buffer_size);
        if let Some(cutoff) = config.containment_cutoff {
            monitor = monitor.with_containment_cutoff(cutoff);
        }
        for species in &self.species {
            if species.p_discovery.is_empty() {
                continue;
            }
            let id = mosaic.require_species(&species.name)?;
            monitor = monitor.with_discovery(id, species.p_discovery.clone());
        }
        for id in self.species_ids(mosaic, "monitor.ignore", &config.ignore)? {
            monitor.ignore(id);
        }
        Ok(Some(monitor))
    }

    pub fn ground_control_process(&self, mosaic: &Mosaic) -> Result<GroundControlProcess> {
        let config = &self.ground_control;
        let mut process = GroundControlProcess::new()
            .with_table(config.table.clone().unwrap_or_default())
            .with_check_frequency(config.check_frequency);
        for id in self.species_ids(mosaic, "ground_control.ignore", &config.ignore)? {
            process.ignore(id);
        }
        Ok(process)
    }

    pub fn engine_settings(
        &self,
        output_interval: Option<u64>,
        output_dir: Option<PathBuf>,
    ) -> EngineSettings {
        EngineSettings {
            scenario_name: self.name.clone(),
            seed: self.seed,
            time_increment: self.time_increment,
            output_interval_ticks: output_interval.unwrap_or(self.output.interval),
            output_dir: output_dir.unwrap_or_else(|| self.output.dir.clone()),
            output_layers: self.output.layers.clone(),
        }
    }
}
