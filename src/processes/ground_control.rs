use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{
    engine::{Process, ProcessContext},
    mosaic::Mosaic,
    occupancy::ControlType,
    rng::ProcessRng,
    species::SpeciesId,
};

#[derive(Debug, Error, PartialEq)]
pub enum ControlTableError {
    #[error("control table needs at least one breakpoint")]
    NoBreakpoints,
    #[error("control table breakpoints must be strictly ascending")]
    Unsorted,
    #[error("control table row for stage {stage} has {found} entries, expected {expected}")]
    RowLength {
        stage: u32,
        expected: usize,
        found: usize,
    },
}

/// Next stage under ground control, by starting stage and elapsed control time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ControlTableConfig")]
pub struct ControlTable {
    breakpoints: Vec<i64>,
    stages: BTreeMap<u32, Vec<u32>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ControlTableConfig {
    breakpoints: Vec<i64>,
    stages: BTreeMap<u32, Vec<u32>>,
}

impl TryFrom<ControlTableConfig> for ControlTable {
    type Error = ControlTableError;

    fn try_from(config: ControlTableConfig) -> Result<Self, Self::Error> {
        ControlTable::new(config.breakpoints, config.stages)
    }
}

impl Default for ControlTable {
    fn default() -> Self {
        let stages = BTreeMap::from([
            (1, vec![1, 1, 1, 1, 1, 0, 0, 0]),
            (2, vec![2, 2, 1, 1, 1, 0, 0, 0]),
            (3, vec![3, 3, 2, 2, 1, 1, 1, 0]),
        ]);
        Self {
            breakpoints: (0..8).collect(),
            stages,
        }
    }
}

impl ControlTable {
    pub fn new(
        breakpoints: Vec<i64>,
        stages: BTreeMap<u32, Vec<u32>>,
    ) -> Result<Self, ControlTableError> {
        if breakpoints.is_empty() {
            return Err(ControlTableError::NoBreakpoints);
        }
        if breakpoints.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ControlTableError::Unsorted);
        }
        for (&stage, row) in &stages {
            if row.len() != breakpoints.len() {
                return Err(ControlTableError::RowLength {
                    stage,
                    expected: breakpoints.len(),
                    found: row.len(),
                });
            }
        }
        Ok(Self {
            breakpoints,
            stages,
        })
    }

    pub fn breakpoints(&self) -> &[i64] {
        &self.breakpoints
    }

    /// Column for `elapsed`: the exact breakpoint, else the next larger one,
    /// clamped to the last column.
    pub fn column(&self, elapsed: i64) -> usize {
        let idx = match self.breakpoints.binary_search(&elapsed) {
            Ok(idx) | Err(idx) => idx,
        };
        idx.min(self.breakpoints.len() - 1)
    }

    /// `None` when the table has no row for `stage`.
    pub fn lookup(&self, stage: u32, elapsed: i64) -> Option<u32> {
        let row = self.stages.get(&stage)?;
        row.get(self.column(elapsed)).copied()
    }
}

/// Reduces ground-controlled infestations along the control table. Fires
/// once `check_frequency` time has accumulated, then starts counting again.
#[derive(Debug, Clone)]
pub struct GroundControlProcess {
    table: ControlTable,
    check_frequency: i64,
    counter: i64,
    ignore: BTreeSet<SpeciesId>,
}

impl Default for GroundControlProcess {
    fn default() -> Self {
        Self::new()
    }
}

impl GroundControlProcess {
    pub fn new() -> Self {
        Self {
            table: ControlTable::default(),
            check_frequency: 1,
            counter: 0,
            ignore: BTreeSet::new(),
        }
    }

    pub fn with_table(mut self, table: ControlTable) -> Self {
        self.table = table;
        self
    }

    pub fn with_check_frequency(mut self, check_frequency: i64) -> Self {
        self.check_frequency = check_frequency;
        self
    }

    pub fn table(&self) -> &ControlTable {
        &self.table
    }

    pub fn check_frequency(&self) -> i64 {
        self.check_frequency
    }

    pub fn ignore(&mut self, species: SpeciesId) {
        self.ignore.insert(species);
    }

    pub fn unignore(&mut self, species: SpeciesId) {
        self.ignore.remove(&species);
    }

    /// Accumulates `time_increment` and reports whether a check is due.
    pub fn tick_counter(&mut self, time_increment: i64) -> bool {
        self.counter += time_increment;
        if self.counter < self.check_frequency {
            return false;
        }
        self.counter = 0;
        true
    }

    /// Applies one control step to every ground-controlled occupancy.
    /// Returns the number of infestations cleared.
    pub fn apply(&self, mosaic: &mut Mosaic) -> usize {
        let species: Vec<SpeciesId> = mosaic.species().ids().collect();
        let mut cleared = 0;
        for sp in species {
            if self.ignore.contains(&sp) {
                continue;
            }
            for patch in mosaic.patches_mut() {
                let Some(occ) = patch.active_mut(sp) else {
                    continue;
                };
                let Some(elapsed) = occ.control_time(ControlType::GroundControl) else {
                    continue;
                };
                // max stage is the severity at discovery; stage is frozen afterwards
                let Some(next) = self.table.lookup(occ.max_stage(), elapsed) else {
                    continue;
                };
                if next == 0 {
                    occ.clear_infestation();
                    occ.remove_control(ControlType::GroundControl);
                    cleared += 1;
                } else {
                    occ.set_stage(next);
                    occ.advance_control_time(ControlType::GroundControl, self.check_frequency);
                }
            }
        }
        cleared
    }
}

impl Process for GroundControlProcess {
    fn name(&self) -> &str {
        "ground_control"
    }

    fn run(
        &mut self,
        ctx: &ProcessContext,
        mosaic: &mut Mosaic,
        _rng: &mut ProcessRng<'_>,
    ) -> Result<()> {
        if !self.tick_counter(ctx.time_increment) {
            return Ok(());
        }
        let cleared = self.apply(mosaic);
        debug!(tick = ctx.tick, cleared, "ground control applied");
        Ok(())
    }
}
