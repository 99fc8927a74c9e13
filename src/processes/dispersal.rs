use std::collections::BTreeMap;

use anyhow::Result;
use tracing::{debug, warn};

use crate::{
    engine::{Process, ProcessContext},
    mosaic::Mosaic,
    rng::{ProcessRng, RandomGenerator},
    species::SpeciesId,
};

/// Fills propagule lists from each infested occupancy's disperser once the
/// infestation is at least `wait_time` old.
#[derive(Debug, Clone, Default)]
pub struct DispersalProcess {
    wait_times: BTreeMap<SpeciesId, i64>,
}

impl DispersalProcess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wait_time(mut self, species: SpeciesId, wait_time: i64) -> Self {
        self.wait_times.insert(species, wait_time);
        self
    }

    pub fn wait_time(&self, species: SpeciesId) -> i64 {
        self.wait_times.get(&species).copied().unwrap_or(0)
    }

    /// Returns the number of propagules produced.
    pub fn apply(&self, mosaic: &mut Mosaic, rng: &mut dyn RandomGenerator) -> usize {
        let species: Vec<SpeciesId> = mosaic.species().ids().collect();
        let mut produced = 0;
        let mut failures = 0;
        for sp in species {
            let wait_time = self.wait_time(sp);
            for patch in mosaic.patches_mut() {
                let id = patch.id();
                let Some(occ) = patch.active_mut(sp) else {
                    continue;
                };
                if !occ.is_infested() || occ.age() < wait_time {
                    occ.clear_propagules();
                    continue;
                }
                match occ.disperse(rng) {
                    Ok(()) => produced += occ.propagules().len(),
                    Err(err) => {
                        failures += 1;
                        if failures == 1 {
                            warn!(patch = id, species = %sp, error = %err, "dispersal produced no propagules");
                        }
                    }
                }
            }
        }
        if failures > 1 {
            warn!(failures, "dispersal failed for several patches");
        }
        produced
    }
}

impl Process for DispersalProcess {
    fn name(&self) -> &str {
        "dispersal"
    }

    fn run(
        &mut self,
        ctx: &ProcessContext,
        mosaic: &mut Mosaic,
        rng: &mut ProcessRng<'_>,
    ) -> Result<()> {
        let produced = self.apply(mosaic, rng);
        debug!(tick = ctx.tick, produced, "dispersal");
        Ok(())
    }
}
