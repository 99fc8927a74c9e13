use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use tracing::debug;

use crate::{
    engine::{Process, ProcessContext},
    mosaic::{Mosaic, Region},
    occupancy::ControlType,
    rng::{ProcessRng, RandomGenerator},
    species::SpeciesId,
};

/// Discovers uncontrolled infestations and assigns management to the
/// clusters they belong to.
///
/// Small clusters (area below `containment_cutoff`) get ground control. Larger
/// ones are filled and contained, and what survives `core_buffer_size`
/// rounds of nibbling becomes the containment core. Without an explicit
/// cutoff, clusters of `DEFAULT_CONTAINMENT_CELLS` cells or more are contained.
pub const DEFAULT_CONTAINMENT_CELLS: f64 = 4.0;

#[derive(Debug, Clone)]
pub struct MonitorProcess {
    p_discovery: BTreeMap<SpeciesId, Vec<f64>>,
    core_buffer_size: usize,
    containment_cutoff: Option<f64>,
    ignore: BTreeSet<SpeciesId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorReport {
    pub discovered: usize,
    pub ground_control: usize,
    pub containment: usize,
    pub core: usize,
}

impl Default for MonitorProcess {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorProcess {
    pub fn new() -> Self {
        Self {
            p_discovery: BTreeMap::new(),
            core_buffer_size: 1,
            containment_cutoff: None,
            ignore: BTreeSet::new(),
        }
    }

    /// Discovery probability per stage; stages past the end use the last entry.
    pub fn with_discovery(mut self, species: SpeciesId, p_by_stage: Vec<f64>) -> Self {
        self.p_discovery.insert(species, p_by_stage);
        self
    }

    pub fn with_core_buffer_size(mut self, size: usize) -> Self {
        self.core_buffer_size = size;
        self
    }

    pub fn with_containment_cutoff(mut self, area: f64) -> Self {
        self.containment_cutoff = Some(area);
        self
    }

    /// Cluster area from which containment replaces ground control.
    pub fn containment_cutoff(&self, cellsize: f64) -> f64 {
        self.containment_cutoff
            .unwrap_or(DEFAULT_CONTAINMENT_CELLS * cellsize * cellsize)
    }

    pub fn ignore(&mut self, species: SpeciesId) {
        self.ignore.insert(species);
    }

    pub fn discovery_probability(&self, species: SpeciesId, stage: u32) -> f64 {
        let Some(probs) = self.p_discovery.get(&species) else {
            return 0.0;
        };
        let Some(last) = probs.len().checked_sub(1) else {
            return 0.0;
        };
        let idx = (stage.max(1) as usize - 1).min(last);
        probs[idx]
    }

    pub fn apply(&self, mosaic: &mut Mosaic, rng: &mut dyn RandomGenerator) -> MonitorReport {
        let mut report = MonitorReport::default();
        let species: Vec<SpeciesId> = mosaic.species().ids().collect();
        let cutoff = self.containment_cutoff(mosaic.cellsize());
        for sp in species {
            if self.ignore.contains(&sp) || !self.p_discovery.contains_key(&sp) {
                continue;
            }

            let mut discovered = Vec::new();
            for (id, occ) in mosaic.occupancies(sp) {
                if !occ.is_infested() || occ.has_any_control() {
                    continue;
                }
                if rng.next_uniform() < self.discovery_probability(sp, occ.stage()) {
                    discovered.push(id);
                }
            }
            report.discovered += discovered.len();

            let mut claimed = BTreeSet::new();
            for seed in discovered {
                if claimed.contains(&seed) {
                    continue;
                }
                let Some(cluster) = mosaic.search_infestation(seed, sp) else {
                    continue;
                };
                claimed.extend(cluster.iter().copied());
                let area = mosaic.region_area(&cluster);
                debug!(species = %sp, seed, cells = cluster.len(), area, "infestation discovered");

                if area < cutoff {
                    report.ground_control +=
                        assign(mosaic, sp, &cluster, ControlType::GroundControl);
                    continue;
                }
                let filled = mosaic.fill(&cluster, sp);
                let core = mosaic.nibble_strong(&filled, sp, self.core_buffer_size);
                report.containment += assign(mosaic, sp, &filled, ControlType::Containment);
                report.core += assign(mosaic, sp, &core, ControlType::ContainmentCore);
            }
        }
        report
    }
}

fn assign(
    mosaic: &mut Mosaic,
    species: SpeciesId,
    region: &Region,
    control: ControlType,
) -> usize {
    let mut assigned = 0;
    for &id in region {
        let Some(patch) = mosaic.patch_mut(id) else {
            continue;
        };
        let Some(occ) = patch.active_mut(species) else {
            continue;
        };
        occ.add_control(control);
        patch.set_monitored(true);
        assigned += 1;
    }
    assigned
}

impl Process for MonitorProcess {
    fn name(&self) -> &str {
        "monitor"
    }

    fn run(
        &mut self,
        ctx: &ProcessContext,
        mosaic: &mut Mosaic,
        rng: &mut ProcessRng<'_>,
    ) -> Result<()> {
        let report = self.apply(mosaic, rng);
        debug!(
            tick = ctx.tick,
            discovered = report.discovered,
            ground_control = report.ground_control,
            containment = report.containment,
            core = report.core,
            "monitoring"
        );
        Ok(())
    }
}
