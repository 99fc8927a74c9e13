use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;

use crate::{
    engine::{Process, ProcessContext},
    mosaic::Mosaic,
    occupancy::ControlType,
    rng::ProcessRng,
    species::SpeciesId,
};

/// Stage reached at `age` given ascending thresholds: one plus the number of
/// thresholds strictly below the age.
pub fn stage_for_age(thresholds: &[i64], age: i64) -> u32 {
    let passed = thresholds.iter().take_while(|&&t| t < age).count();
    1 + passed as u32
}

/// Ages infestations and advances their stage from per-species thresholds.
///
/// Patches under containment (for any species) or under ground control or
/// core containment for the species itself are frozen.
#[derive(Debug, Clone, Default)]
pub struct GrowthProcess {
    thresholds: BTreeMap<SpeciesId, Vec<i64>>,
    ignore: BTreeSet<SpeciesId>,
}

impl GrowthProcess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thresholds(mut self, species: SpeciesId, thresholds: Vec<i64>) -> Self {
        self.set_thresholds(species, thresholds);
        self
    }

    pub fn set_thresholds(&mut self, species: SpeciesId, mut thresholds: Vec<i64>) {
        thresholds.sort_unstable();
        self.thresholds.insert(species, thresholds);
    }

    pub fn thresholds(&self, species: SpeciesId) -> Option<&[i64]> {
        self.thresholds.get(&species).map(Vec::as_slice)
    }

    pub fn ignore(&mut self, species: SpeciesId) {
        self.ignore.insert(species);
    }

    pub fn apply(&self, mosaic: &mut Mosaic, time_increment: i64) {
        for (&species, thresholds) in &self.thresholds {
            if self.ignore.contains(&species) {
                continue;
            }
            for patch in mosaic.patches_mut() {
                if patch.has_control_any(ControlType::Containment) {
                    continue;
                }
                let Some(occ) = patch.active_mut(species) else {
                    continue;
                };
                if !occ.is_infested()
                    || occ.has_control(ControlType::GroundControl)
                    || occ.has_control(ControlType::ContainmentCore)
                {
                    continue;
                }
                occ.increment_age(time_increment);
                occ.set_stage(stage_for_age(thresholds, occ.age()));
            }
        }
    }
}

impl Process for GrowthProcess {
    fn name(&self) -> &str {
        "growth"
    }

    fn run(
        &mut self,
        ctx: &ProcessContext,
        mosaic: &mut Mosaic,
        _rng: &mut ProcessRng<'_>,
    ) -> Result<()> {
        self.apply(mosaic, ctx.time_increment);
        Ok(())
    }
}
