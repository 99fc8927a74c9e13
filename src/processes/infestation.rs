use anyhow::Result;
use tracing::debug;

use crate::{
    engine::{Process, ProcessContext},
    mosaic::Mosaic,
    rng::{ProcessRng, RandomGenerator},
    species::SpeciesId,
};

/// Turns the propagules left by dispersal into new infestations.
#[derive(Debug, Clone, Copy, Default)]
pub struct InfestationProcess;

impl InfestationProcess {
    pub fn new() -> Self {
        Self
    }

    /// Returns the number of new infestations across all species.
    pub fn apply(&self, mosaic: &mut Mosaic, rng: &mut dyn RandomGenerator) -> usize {
        let species: Vec<SpeciesId> = mosaic.species().ids().collect();
        let mut established = 0;
        for sp in species {
            let propagules: Vec<_> = mosaic
                .patches_mut()
                .iter_mut()
                .filter_map(|patch| patch.active_mut(sp))
                .flat_map(|occ| occ.take_propagules())
                .collect();
            if propagules.is_empty() {
                continue;
            }
            established += mosaic.infest(sp, &propagules, rng);
        }
        established
    }
}

impl Process for InfestationProcess {
    fn name(&self) -> &str {
        "infestation"
    }

    fn run(
        &mut self,
        ctx: &ProcessContext,
        mosaic: &mut Mosaic,
        rng: &mut ProcessRng<'_>,
    ) -> Result<()> {
        let established = self.apply(mosaic, rng);
        debug!(tick = ctx.tick, established, "infestation");
        Ok(())
    }
}
