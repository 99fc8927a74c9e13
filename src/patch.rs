use std::cmp::Ordering;

use crate::occupancy::{ControlType, Occupancy};
use crate::species::SpeciesId;

/// One grid cell. `id` is `row * ncols + col`; patches order by id.
#[derive(Debug, Clone)]
pub struct Patch {
    id: usize,
    no_data: bool,
    monitored: bool,
    occupants: Vec<Occupancy>,
}

impl Patch {
    pub fn new(id: usize, species_count: usize) -> Self {
        Self {
            id,
            no_data: false,
            monitored: false,
            occupants: vec![Occupancy::new(); species_count],
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn has_no_data(&self) -> bool {
        self.no_data
    }

    pub fn set_no_data(&mut self, no_data: bool) {
        self.no_data = no_data;
    }

    /// Flags the cell and the species' occupancy as outside the simulation.
    pub fn mark_no_data(&mut self, species: SpeciesId) {
        self.no_data = true;
        if let Some(occ) = self.occupants.get_mut(species.index()) {
            occ.clear_infestation();
            occ.clear_propagules();
            occ.set_no_data(true);
        }
    }

    pub fn is_monitored(&self) -> bool {
        self.monitored
    }

    pub fn set_monitored(&mut self, monitored: bool) {
        self.monitored = monitored;
    }

    pub fn occupant(&self, species: SpeciesId) -> Option<&Occupancy> {
        self.occupants.get(species.index())
    }

    pub fn occupant_mut(&mut self, species: SpeciesId) -> Option<&mut Occupancy> {
        self.occupants.get_mut(species.index())
    }

    /// The species' occupancy unless this cell or the occupancy is no-data.
    pub fn active(&self, species: SpeciesId) -> Option<&Occupancy> {
        if self.no_data {
            return None;
        }
        self.occupants
            .get(species.index())
            .filter(|occ| !occ.has_no_data())
    }

    pub fn active_mut(&mut self, species: SpeciesId) -> Option<&mut Occupancy> {
        if self.no_data {
            return None;
        }
        self.occupants
            .get_mut(species.index())
            .filter(|occ| !occ.has_no_data())
    }

    pub fn occupants(&self) -> &[Occupancy] {
        &self.occupants
    }

    pub(crate) fn push_occupant(&mut self, occupancy: Occupancy) {
        self.occupants.push(occupancy);
    }

    /// Infestation flag used by region searches; inert cells read as uninfested.
    pub fn is_infested(&self, species: SpeciesId) -> bool {
        self.active(species).map_or(false, Occupancy::is_infested)
    }

    pub fn has_control(&self, species: SpeciesId, control: ControlType) -> bool {
        self.active(species)
            .map_or(false, |occ| occ.has_control(control))
    }

    /// True when any species in this cell carries `control`.
    pub fn has_control_any(&self, control: ControlType) -> bool {
        !self.no_data
            && self
                .occupants
                .iter()
                .any(|occ| !occ.has_no_data() && occ.has_control(control))
    }
}

impl PartialEq for Patch {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Patch {}

impl PartialOrd for Patch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Patch {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}
