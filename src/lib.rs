pub mod dispersal;
pub mod engine;
pub mod geometry;
pub mod mosaic;
pub mod occupancy;
pub mod output;
pub mod patch;
pub mod processes;
pub mod raster;
pub mod rng;
pub mod scenario;
pub mod species;

pub use engine::{Engine, EngineBuilder, EngineSettings, Process, ProcessContext};
pub use mosaic::{MapKind, MapSource, Mosaic, MosaicError};
pub use occupancy::{ControlType, Occupancy};
pub use patch::Patch;
pub use scenario::{Scenario, ScenarioLoader};
pub use species::SpeciesId;
