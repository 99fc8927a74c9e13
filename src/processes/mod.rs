mod dispersal;
mod ground_control;
mod growth;
mod infestation;
mod monitor;

pub use dispersal::DispersalProcess;
pub use ground_control::{ControlTable, ControlTableError, GroundControlProcess};
pub use growth::{stage_for_age, GrowthProcess};
pub use infestation::InfestationProcess;
pub use monitor::{MonitorProcess, MonitorReport};
