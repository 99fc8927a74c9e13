//! The landscape grid: a row-major array of patches plus georeferencing.

mod maps;
mod region;

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::dispersal::Disperser;
use crate::geometry::Coordinate;
use crate::occupancy::Occupancy;
use crate::patch::Patch;
use crate::raster::{Raster, RasterError};
use crate::rng::RandomGenerator;
use crate::species::{SpeciesId, SpeciesRegistry};

pub use maps::{MapKind, MapSource, MapSourceError};
pub use region::{Adjacency, Region};

#[derive(Debug, Error)]
pub enum MosaicError {
    #[error(
        "mosaic has been populated, but dimensions of {path} ({rows},{cols}) are inconsistent ({expected_rows},{expected_cols})"
    )]
    DimensionMismatch {
        path: String,
        rows: usize,
        cols: usize,
        expected_rows: usize,
        expected_cols: usize,
    },
    #[error(
        "management class {value} encountered in {path}, but the value must be 1-3, equal to the no-management value ({no_management}) or no-data"
    )]
    InvalidManagementValue {
        value: f64,
        path: String,
        no_management: f64,
    },
    #[error("no grid has been established, so a uniform {kind:?} map has nothing to apply to")]
    NoGrid { kind: MapKind },
    #[error("unknown species '{0}'")]
    UnknownSpecies(String),
    #[error("map source '{source_text}' cannot be used for a {kind:?} map")]
    UnsupportedSource { kind: MapKind, source_text: String },
    #[error(transparent)]
    Raster(#[from] RasterError),
}

#[derive(Debug, Clone)]
pub struct Mosaic {
    nrows: usize,
    ncols: usize,
    cellsize: f64,
    llx: f64,
    lly: f64,
    species: SpeciesRegistry,
    patches: Vec<Patch>,
    layers: BTreeMap<MapKind, Raster>,
    no_presence: f64,
    no_management: f64,
}

impl Default for Mosaic {
    fn default() -> Self {
        Self {
            nrows: 0,
            ncols: 0,
            cellsize: 0.0,
            llx: 0.0,
            lly: 0.0,
            species: SpeciesRegistry::default(),
            patches: Vec::new(),
            layers: BTreeMap::new(),
            no_presence: 0.0,
            no_management: 0.0,
        }
    }
}

impl Mosaic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_species<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut mosaic = Self::new();
        for name in names {
            mosaic.add_species(name);
        }
        mosaic
    }

    /// Registers a species; existing patches gain a fresh occupancy for it.
    pub fn add_species(&mut self, name: &str) -> SpeciesId {
        let before = self.species.len();
        let id = self.species.register(name);
        if self.species.len() > before {
            for patch in &mut self.patches {
                patch.push_occupant(Occupancy::new());
            }
        }
        id
    }

    pub fn species(&self) -> &SpeciesRegistry {
        &self.species
    }

    pub fn species_id(&self, name: &str) -> Option<SpeciesId> {
        self.species.id(name)
    }

    pub fn require_species(&self, name: &str) -> Result<SpeciesId, MosaicError> {
        self.species
            .id(name)
            .ok_or_else(|| MosaicError::UnknownSpecies(name.to_string()))
    }

    /// Builds the patch array from explicit dimensions, discarding any previous state.
    pub fn setup(&mut self, nrows: usize, ncols: usize, cellsize: f64, llx: f64, lly: f64) {
        self.nrows = nrows;
        self.ncols = ncols;
        self.cellsize = cellsize;
        self.llx = llx;
        self.lly = lly;
        self.layers.clear();
        self.build_patches();
    }

    pub fn setup_from_template(&mut self, template: &Raster) {
        self.setup(
            template.rows(),
            template.cols(),
            template.cellsize(),
            template.xll(),
            template.yll(),
        );
    }

    fn build_patches(&mut self) {
        let species_count = self.species.len();
        self.patches = (0..self.nrows * self.ncols)
            .map(|id| Patch::new(id, species_count))
            .collect();
        debug!(
            rows = self.nrows,
            cols = self.ncols,
            species = species_count,
            "built patches"
        );
    }

    /// Drops all patches, loaded maps and georeferencing. Species stay registered.
    pub fn clear(&mut self) {
        self.nrows = 0;
        self.ncols = 0;
        self.cellsize = 0.0;
        self.llx = 0.0;
        self.lly = 0.0;
        self.patches.clear();
        self.layers.clear();
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn cellsize(&self) -> f64 {
        self.cellsize
    }

    pub fn llx(&self) -> f64 {
        self.llx
    }

    pub fn lly(&self) -> f64 {
        self.lly
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn no_presence(&self) -> f64 {
        self.no_presence
    }

    pub fn set_no_presence(&mut self, value: f64) {
        self.no_presence = value;
    }

    pub fn no_management(&self) -> f64 {
        self.no_management
    }

    pub fn set_no_management(&mut self, value: f64) {
        self.no_management = value;
    }

    pub fn patch(&self, id: usize) -> Option<&Patch> {
        self.patches.get(id)
    }

    pub fn patch_mut(&mut self, id: usize) -> Option<&mut Patch> {
        self.patches.get_mut(id)
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    pub fn patches_mut(&mut self) -> &mut [Patch] {
        &mut self.patches
    }

    pub fn row_col(&self, id: usize) -> (usize, usize) {
        (id / self.ncols, id % self.ncols)
    }

    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.ncols + col
    }

    /// Cell index containing `coord`, or `None` when it falls outside the grid.
    pub fn index_of(&self, coord: Coordinate) -> Option<usize> {
        if self.patches.is_empty() || self.cellsize <= 0.0 {
            return None;
        }
        let col = ((coord.x - self.llx) / self.cellsize).floor();
        let row_from_bottom = ((coord.y - self.lly) / self.cellsize).floor();
        // range checks stay in f64; NaN fails both comparisons
        let in_range = |v: f64, n: usize| v >= 0.0 && v < n as f64;
        if !in_range(col, self.ncols) || !in_range(row_from_bottom, self.nrows) {
            return None;
        }
        let row = self.nrows - 1 - row_from_bottom as usize;
        Some(self.index(row, col as usize))
    }

    pub fn cell_centroid(&self, id: usize) -> Coordinate {
        let (row, col) = self.row_col(id);
        let half = self.cellsize / 2.0;
        Coordinate::new(
            self.llx + col as f64 * self.cellsize + half,
            self.lly + (self.nrows - row - 1) as f64 * self.cellsize + half,
        )
    }

    /// Attempts to establish each propagule. Out-of-bounds, no-data and
    /// already infested cells are skipped without drawing; every other
    /// candidate draws once and establishes when the draw is below the cell's
    /// habitat suitability. Returns the number of new infestations.
    pub fn infest(
        &mut self,
        species: SpeciesId,
        propagules: &[Coordinate],
        rng: &mut dyn RandomGenerator,
    ) -> usize {
        let mut established = 0;
        for coord in propagules {
            let Some(id) = self.index_of(*coord) else {
                continue;
            };
            let Some(occ) = self.patches[id].active_mut(species) else {
                continue;
            };
            if occ.is_infested() {
                continue;
            }
            if rng.next_uniform() < occ.habitat_suitability() {
                occ.set_infested(true);
                occ.set_age(0);
                established += 1;
            }
        }
        established
    }

    /// Installs a clone of `prototype`, positioned at the cell centroid, in
    /// every data patch.
    pub fn set_disperser(&mut self, species: SpeciesId, prototype: &dyn Disperser) {
        for id in 0..self.patches.len() {
            let centroid = self.cell_centroid(id);
            if let Some(occ) = self.patches[id].active_mut(species) {
                let mut disperser = prototype.clone_box();
                disperser.set_position(centroid);
                occ.set_disperser(disperser);
            }
        }
    }

    /// Ids of data patches where `species` is infested.
    pub fn infested(&self, species: SpeciesId) -> Vec<usize> {
        self.patches
            .iter()
            .filter(|p| p.is_infested(species))
            .map(Patch::id)
            .collect()
    }

    /// Ids of patches where any species is infested.
    pub fn infested_any(&self) -> Vec<usize> {
        self.patches
            .iter()
            .filter(|p| self.species.ids().any(|sp| p.is_infested(sp)))
            .map(Patch::id)
            .collect()
    }

    pub fn controlled(&self, species: SpeciesId) -> Vec<usize> {
        self.patches
            .iter()
            .filter(|p| p.active(species).map_or(false, Occupancy::has_any_control))
            .map(Patch::id)
            .collect()
    }

    pub fn monitored(&self) -> Vec<usize> {
        self.patches
            .iter()
            .filter(|p| p.is_monitored())
            .map(Patch::id)
            .collect()
    }

    pub fn number_infested(&self, species: SpeciesId) -> usize {
        self.patches.iter().filter(|p| p.is_infested(species)).count()
    }

    pub fn number_controlled(&self, species: SpeciesId) -> usize {
        self.controlled(species).len()
    }

    pub fn number_monitored(&self) -> usize {
        self.patches.iter().filter(|p| p.is_monitored()).count()
    }

    /// Data occupancies of `species`, in id order.
    pub fn occupancies(&self, species: SpeciesId) -> impl Iterator<Item = (usize, &Occupancy)> {
        self.patches
            .iter()
            .filter_map(move |p| p.active(species).map(|occ| (p.id(), occ)))
    }

    pub fn region_area(&self, region: &Region) -> f64 {
        region.len() as f64 * self.cellsize * self.cellsize
    }

    pub fn set_monitored(&mut self, ids: impl IntoIterator<Item = usize>, monitored: bool) {
        for id in ids {
            if let Some(patch) = self.patches.get_mut(id) {
                patch.set_monitored(monitored);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispersal::{RadialDisperser, RadialDisperserConfig};
    use crate::occupancy::ControlType;
    use crate::rng::{FixedUniform, SequenceUniform};

    fn grid(rows: usize, cols: usize) -> (Mosaic, SpeciesId) {
        let mut mosaic = Mosaic::with_species(["Test_1"]);
        mosaic.setup(rows, cols, 1.0, 0.0, 0.0);
        let sp = mosaic.require_species("Test_1").unwrap();
        (mosaic, sp)
    }

    #[test]
    fn coordinates_map_to_row_major_cells() {
        let mut mosaic = Mosaic::with_species(["a"]);
        mosaic.setup(3, 4, 10.0, 100.0, 200.0);
        // bottom-left cell is the last row
        assert_eq!(mosaic.index_of(Coordinate::new(105.0, 205.0)), Some(8));
        // top-right cell
        assert_eq!(mosaic.index_of(Coordinate::new(139.9, 229.9)), Some(3));
        assert_eq!(mosaic.index_of(Coordinate::new(99.0, 205.0)), None);
        assert_eq!(mosaic.index_of(Coordinate::new(140.0, 205.0)), None);
        assert_eq!(mosaic.index_of(Coordinate::new(105.0, 230.0)), None);
        assert_eq!(mosaic.index_of(Coordinate::new(105.0, 199.0)), None);
    }

    #[test]
    fn far_away_coordinates_are_dropped() {
        let (mut mosaic, sp) = grid(3, 3);
        for coord in [
            Coordinate::new(1.5, -1.0e20),
            Coordinate::new(-1.0e20, 1.5),
            Coordinate::new(1.0e20, 1.5),
            Coordinate::new(1.5, 1.0e20),
            Coordinate::new(f64::NAN, 1.5),
            Coordinate::new(1.5, f64::NEG_INFINITY),
        ] {
            assert_eq!(mosaic.index_of(coord), None, "{coord:?}");
        }
        let far = [Coordinate::new(1.5, -1.0e20), Coordinate::new(-1.0e20, 1.5)];
        assert_eq!(mosaic.infest(sp, &far, &mut FixedUniform(0.0)), 0);
        assert!(mosaic.infested(sp).is_empty());
    }

    #[test]
    fn centroid_lands_in_its_own_cell() {
        let mut mosaic = Mosaic::with_species(["a"]);
        mosaic.setup(4, 5, 2.5, -10.0, 3.0);
        for id in 0..mosaic.len() {
            assert_eq!(mosaic.index_of(mosaic.cell_centroid(id)), Some(id));
        }
    }

    #[test]
    fn infest_center_cell_only() {
        let (mut mosaic, sp) = grid(3, 3);
        let n = mosaic.infest(sp, &[Coordinate::new(1.5, 1.5)], &mut FixedUniform(0.0));
        assert_eq!(n, 1);
        for patch in mosaic.patches() {
            let occ = patch.occupant(sp).unwrap();
            if patch.id() == 4 {
                assert!(occ.is_infested());
                assert_eq!(occ.stage(), 1);
                assert_eq!(occ.age(), 0);
            } else {
                assert!(!occ.is_infested());
                assert_eq!(occ.stage(), 0);
            }
        }
    }

    #[test]
    fn infest_respects_suitability_and_bounds() {
        let (mut mosaic, sp) = grid(2, 2);
        mosaic
            .patch_mut(0)
            .unwrap()
            .occupant_mut(sp)
            .unwrap()
            .set_habitat_suitability(0.3);
        let propagules = [
            Coordinate::new(0.5, 1.5),
            Coordinate::new(-3.0, 0.5),
            Coordinate::new(1.5, 1.5),
        ];
        let mut rng = SequenceUniform::new(vec![0.5, 0.2]);
        let n = mosaic.infest(sp, &propagules, &mut rng);
        assert_eq!(n, 1);
        assert!(!mosaic.patch(0).unwrap().is_infested(sp));
        assert!(mosaic.patch(1).unwrap().is_infested(sp));
    }

    #[test]
    fn infest_skips_no_data_and_infested() {
        let (mut mosaic, sp) = grid(1, 2);
        mosaic.patch_mut(0).unwrap().mark_no_data(sp);
        {
            let occ = mosaic.patch_mut(1).unwrap().occupant_mut(sp).unwrap();
            occ.set_infested(true);
            occ.set_stage(2);
            occ.set_age(7);
        }
        let n = mosaic.infest(
            sp,
            &[Coordinate::new(0.5, 0.5), Coordinate::new(1.5, 0.5)],
            &mut FixedUniform(0.0),
        );
        assert_eq!(n, 0);
        let occ = mosaic.patch(1).unwrap().occupant(sp).unwrap();
        assert_eq!(occ.stage(), 2);
        assert_eq!(occ.age(), 7);
    }

    #[test]
    fn disperser_installed_at_centroids() {
        let (mut mosaic, sp) = grid(2, 2);
        mosaic.patch_mut(3).unwrap().mark_no_data(sp);
        let prototype = RadialDisperser::new(RadialDisperserConfig {
            propagules: 1,
            mean_distance: 1.0,
        });
        mosaic.set_disperser(sp, &prototype);
        let d = mosaic.patch(0).unwrap().occupant(sp).unwrap().disperser();
        assert_eq!(d.and_then(|d| d.position()), Some(Coordinate::new(0.5, 1.5)));
        assert!(mosaic
            .patch(3)
            .unwrap()
            .occupant(sp)
            .unwrap()
            .disperser()
            .is_none());
    }

    #[test]
    fn late_species_registration_extends_patches() {
        let (mut mosaic, _) = grid(2, 2);
        let b = mosaic.add_species("Test_2");
        assert_eq!(mosaic.add_species("Test_2"), b);
        assert!(mosaic.patches().iter().all(|p| p.occupants().len() == 2));
    }

    #[test]
    fn queries_report_in_id_order() {
        let (mut mosaic, sp) = grid(2, 3);
        for id in [5, 1] {
            mosaic
                .patch_mut(id)
                .unwrap()
                .occupant_mut(sp)
                .unwrap()
                .set_infested(true);
        }
        mosaic
            .patch_mut(2)
            .unwrap()
            .occupant_mut(sp)
            .unwrap()
            .add_control(ControlType::GroundControl);
        mosaic.set_monitored([2, 4], true);
        assert_eq!(mosaic.infested(sp), vec![1, 5]);
        assert_eq!(mosaic.infested_any(), vec![1, 5]);
        assert_eq!(mosaic.controlled(sp), vec![2]);
        assert_eq!(mosaic.monitored(), vec![2, 4]);
        assert_eq!(mosaic.number_monitored(), 2);
        assert_eq!(mosaic.occupancies(sp).count(), 6);
    }

    #[test]
    fn clone_is_independent() {
        let (mut original, sp) = grid(2, 2);
        original
            .patch_mut(0)
            .unwrap()
            .occupant_mut(sp)
            .unwrap()
            .add_control(ControlType::GroundControl);
        let mut copy = original.clone();

        original
            .patch_mut(0)
            .unwrap()
            .occupant_mut(sp)
            .unwrap()
            .set_infested(true);
        copy.patch_mut(0)
            .unwrap()
            .occupant_mut(sp)
            .unwrap()
            .set_control_time(ControlType::GroundControl, 5);

        assert!(!copy.patch(0).unwrap().is_infested(sp));
        assert_eq!(
            original
                .patch(0)
                .unwrap()
                .occupant(sp)
                .unwrap()
                .control_time(ControlType::GroundControl),
            Some(0)
        );
    }

    #[test]
    fn clear_discards_patches_and_georeferencing() {
        let (mut mosaic, _) = grid(3, 3);
        mosaic.clear();
        assert!(mosaic.is_empty());
        assert_eq!(mosaic.nrows(), 0);
        assert_eq!(mosaic.cellsize(), 0.0);
        assert_eq!(mosaic.index_of(Coordinate::new(0.5, 0.5)), None);
        assert_eq!(mosaic.species().len(), 1);
    }
}
