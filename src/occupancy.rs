use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dispersal::{DispersalError, Disperser};
use crate::geometry::Coordinate;
use crate::rng::RandomGenerator;

/// Management controls. Declaration order is severity order, so the greatest
/// active control of an occupancy is the maximum key of its control map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlType {
    GroundControl,
    Containment,
    ContainmentCore,
}

impl ControlType {
    pub const ALL: [ControlType; 3] = [
        ControlType::GroundControl,
        ControlType::Containment,
        ControlType::ContainmentCore,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            ControlType::GroundControl => "Ground Control",
            ControlType::Containment => "Containment",
            ControlType::ContainmentCore => "Containment Core",
        }
    }

    /// Ordinal used in management rasters and output layers (0 is "none").
    pub fn code(self) -> u8 {
        match self {
            ControlType::GroundControl => 1,
            ControlType::Containment => 2,
            ControlType::ContainmentCore => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ControlType::GroundControl),
            2 => Some(ControlType::Containment),
            3 => Some(ControlType::ContainmentCore),
            _ => None,
        }
    }
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Infestation and management state of one species in one patch.
#[derive(Debug, Clone)]
pub struct Occupancy {
    infested: bool,
    was_infested: bool,
    stage: u32,
    max_stage: u32,
    age: i64,
    cumulative_age: i64,
    habitat_suitability: f64,
    controls: BTreeMap<ControlType, i64>,
    propagules: Vec<Coordinate>,
    disperser: Option<Box<dyn Disperser>>,
    no_data: bool,
}

impl Default for Occupancy {
    fn default() -> Self {
        Self {
            infested: false,
            was_infested: false,
            stage: 0,
            max_stage: 0,
            age: 0,
            cumulative_age: 0,
            habitat_suitability: 1.0,
            controls: BTreeMap::new(),
            propagules: Vec::new(),
            disperser: None,
            no_data: false,
        }
    }
}

impl Occupancy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_infested(&self) -> bool {
        self.infested
    }

    pub fn was_infested(&self) -> bool {
        self.was_infested
    }

    /// Setting `true` always restarts the stage at 1; setting `false` zeroes
    /// the stage but keeps the high-water mark.
    pub fn set_infested(&mut self, infested: bool) {
        self.infested = infested;
        if infested {
            self.was_infested = true;
            self.stage = 1;
            self.max_stage = 1;
        } else {
            self.stage = 0;
        }
    }

    /// Clears the infestation, its stage and its high-water mark. Cumulative
    /// age and controls are left alone.
    pub fn clear_infestation(&mut self) {
        self.infested = false;
        self.stage = 0;
        self.max_stage = 0;
    }

    pub fn stage(&self) -> u32 {
        self.stage
    }

    pub fn max_stage(&self) -> u32 {
        self.max_stage
    }

    /// Stage 0 clears the infestation flag; any other stage raises the
    /// high-water mark when exceeded.
    pub fn set_stage(&mut self, stage: u32) {
        if stage == 0 {
            self.infested = false;
            self.stage = 0;
            return;
        }
        self.infested = true;
        self.was_infested = true;
        self.stage = stage;
        if stage > self.max_stage {
            self.max_stage = stage;
        }
    }

    pub fn age(&self) -> i64 {
        self.age
    }

    pub fn set_age(&mut self, age: i64) {
        self.age = age;
    }

    pub fn cumulative_age(&self) -> i64 {
        self.cumulative_age
    }

    /// Ages an infested occupancy; uninfested ones are unchanged.
    pub fn increment_age(&mut self, increment: i64) {
        if self.infested {
            self.age += increment;
            self.cumulative_age += increment;
        }
    }

    pub fn habitat_suitability(&self) -> f64 {
        self.habitat_suitability
    }

    pub fn set_habitat_suitability(&mut self, suitability: f64) {
        self.habitat_suitability = suitability;
    }

    pub fn controls(&self) -> &BTreeMap<ControlType, i64> {
        &self.controls
    }

    pub fn has_control(&self, control: ControlType) -> bool {
        self.controls.contains_key(&control)
    }

    pub fn has_any_control(&self) -> bool {
        !self.controls.is_empty()
    }

    pub fn max_control(&self) -> Option<ControlType> {
        self.controls.keys().next_back().copied()
    }

    /// Activates `control` with zero elapsed time; an active control keeps its clock.
    pub fn add_control(&mut self, control: ControlType) {
        self.controls.entry(control).or_insert(0);
    }

    pub fn remove_control(&mut self, control: ControlType) {
        self.controls.remove(&control);
    }

    pub fn clear_controls(&mut self) {
        self.controls.clear();
    }

    pub fn control_time(&self, control: ControlType) -> Option<i64> {
        self.controls.get(&control).copied()
    }

    pub fn set_control_time(&mut self, control: ControlType, elapsed: i64) {
        self.controls.insert(control, elapsed);
    }

    pub fn advance_control_time(&mut self, control: ControlType, increment: i64) {
        if let Some(elapsed) = self.controls.get_mut(&control) {
            *elapsed += increment;
        }
    }

    pub fn propagules(&self) -> &[Coordinate] {
        &self.propagules
    }

    pub fn set_propagules(&mut self, propagules: Vec<Coordinate>) {
        self.propagules = propagules;
    }

    pub fn take_propagules(&mut self) -> Vec<Coordinate> {
        std::mem::take(&mut self.propagules)
    }

    pub fn clear_propagules(&mut self) {
        self.propagules.clear();
    }

    pub fn disperser(&self) -> Option<&dyn Disperser> {
        self.disperser.as_deref()
    }

    pub fn set_disperser(&mut self, disperser: Box<dyn Disperser>) {
        self.disperser = Some(disperser);
    }

    /// Replaces the propagule list with the disperser's output. A missing or
    /// failing disperser leaves the list empty.
    pub fn disperse(&mut self, rng: &mut dyn RandomGenerator) -> Result<(), DispersalError> {
        self.propagules.clear();
        let disperser = self
            .disperser
            .as_mut()
            .ok_or_else(|| DispersalError::Misconfigured("no disperser installed".into()))?;
        self.propagules = disperser.disperse(rng)?;
        Ok(())
    }

    pub fn has_no_data(&self) -> bool {
        self.no_data
    }

    pub fn set_no_data(&mut self, no_data: bool) {
        self.no_data = no_data;
    }
}
