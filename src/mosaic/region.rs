//! Connectivity queries over the patch grid.
//!
//! All searches keep their visited set local to the call, so they never
//! leave marks on the patches and can be repeated freely.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashSet};

use crate::geometry::Bounds;
use crate::patch::Patch;
use crate::species::SpeciesId;

use super::Mosaic;

/// Patch ids, ascending.
pub type Region = BTreeSet<usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Adjacency {
    /// Up, down, left, right.
    Strong,
    /// Strong plus the four diagonals.
    Weak,
}

const STRONG_OFFSETS: [(i64, i64); 4] = [(-1, 0), (0, -1), (0, 1), (1, 0)];
const WEAK_OFFSETS: [(i64, i64); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

impl Mosaic {
    /// Window covering the whole grid; `None` for an empty mosaic.
    pub fn full_bounds(&self) -> Option<Bounds> {
        if self.nrows == 0 || self.ncols == 0 {
            return None;
        }
        Some(Bounds::new(0, 0, self.nrows - 1, self.ncols - 1))
    }

    /// Neighbours of `id` inside both the grid and `bounds`, in ascending id order.
    pub fn adjacent(&self, id: usize, adjacency: Adjacency, bounds: Bounds) -> Vec<usize> {
        let offsets: &[(i64, i64)] = match adjacency {
            Adjacency::Strong => &STRONG_OFFSETS,
            Adjacency::Weak => &WEAK_OFFSETS,
        };
        let (row, col) = self.row_col(id);
        let mut out = Vec::with_capacity(offsets.len());
        for (dr, dc) in offsets {
            let r = row as i64 + dr;
            let c = col as i64 + dc;
            if r < 0 || c < 0 || r >= self.nrows as i64 || c >= self.ncols as i64 {
                continue;
            }
            let (r, c) = (r as usize, c as usize);
            if bounds.contains(r, c) {
                out.push(self.index(r, c));
            }
        }
        out
    }

    pub fn strong_adjacent(&self, id: usize) -> Vec<usize> {
        match self.full_bounds() {
            Some(bounds) => self.adjacent(id, Adjacency::Strong, bounds),
            None => Vec::new(),
        }
    }

    pub fn weak_adjacent(&self, id: usize) -> Vec<usize> {
        match self.full_bounds() {
            Some(bounds) => self.adjacent(id, Adjacency::Weak, bounds),
            None => Vec::new(),
        }
    }

    /// Smallest window containing every patch in `region`.
    pub fn bounds_of(&self, region: &Region) -> Option<Bounds> {
        let mut iter = region.iter().map(|&id| self.row_col(id));
        let (row, col) = iter.next()?;
        let mut bounds = Bounds::new(row, col, row, col);
        for (row, col) in iter {
            bounds.row_min = bounds.row_min.min(row);
            bounds.col_min = bounds.col_min.min(col);
            bounds.row_max = bounds.row_max.max(row);
            bounds.col_max = bounds.col_max.max(col);
        }
        Some(bounds)
    }

    /// Every patch inside `bounds`, clipped to the grid.
    pub fn block(&self, bounds: Bounds) -> Region {
        let mut out = Region::new();
        if self.nrows == 0 || self.ncols == 0 {
            return out;
        }
        let row_max = bounds.row_max.min(self.nrows - 1);
        let col_max = bounds.col_max.min(self.ncols - 1);
        for row in bounds.row_min..=row_max {
            for col in bounds.col_min..=col_max {
                out.insert(self.index(row, col));
            }
        }
        out
    }

    pub fn strong_region(&self, seed: usize, species: SpeciesId) -> Region {
        match self.full_bounds() {
            Some(bounds) => self.strong_region_within(seed, species, bounds),
            None => Region::new(),
        }
    }

    /// Patches 4-connected to `seed` inside `bounds` that share its infestation
    /// status for `species`. An inert seed yields an empty region.
    pub fn strong_region_within(&self, seed: usize, species: SpeciesId, bounds: Bounds) -> Region {
        self.matching_region(seed, species, bounds, Adjacency::Strong)
    }

    pub fn weak_region(&self, seed: usize, species: SpeciesId) -> Region {
        match self.full_bounds() {
            Some(bounds) => self.weak_region_within(seed, species, bounds),
            None => Region::new(),
        }
    }

    /// As [`Mosaic::strong_region_within`], but 8-connected throughout.
    pub fn weak_region_within(&self, seed: usize, species: SpeciesId, bounds: Bounds) -> Region {
        self.matching_region(seed, species, bounds, Adjacency::Weak)
    }

    fn matching_region(
        &self,
        seed: usize,
        species: SpeciesId,
        bounds: Bounds,
        adjacency: Adjacency,
    ) -> Region {
        let Some(seed_patch) = self.patches.get(seed) else {
            return Region::new();
        };
        if seed_patch.active(species).is_none() {
            return Region::new();
        }
        let status = seed_patch.is_infested(species);
        self.flood(seed, bounds, adjacency, |p| {
            p.active(species).is_some() && p.is_infested(species) == status
        })
    }

    /// 8-connected infested patches reachable from an infested seed.
    ///
    /// Returns `None` when the seed is no-data for `species`, and an empty
    /// region when the seed is simply uninfested.
    pub fn search_infestation(&self, seed: usize, species: SpeciesId) -> Option<Region> {
        let patch = self.patches.get(seed)?;
        patch.active(species)?;
        if !patch.is_infested(species) {
            return Some(Region::new());
        }
        let bounds = self.full_bounds()?;
        Some(self.flood(seed, bounds, Adjacency::Weak, |p| {
            p.is_infested(species)
        }))
    }

    /// Lowest-id-first flood fill from `seed`. The seed is always included.
    fn flood(
        &self,
        seed: usize,
        bounds: Bounds,
        adjacency: Adjacency,
        accept: impl Fn(&Patch) -> bool,
    ) -> Region {
        let mut region = Region::new();
        let mut visited = HashSet::new();
        let mut queue = BinaryHeap::new();

        region.insert(seed);
        visited.insert(seed);
        for n in self.adjacent(seed, adjacency, bounds) {
            queue.push(Reverse(n));
        }

        while let Some(Reverse(id)) = queue.pop() {
            if !visited.insert(id) {
                continue;
            }
            if accept(&self.patches[id]) {
                region.insert(id);
                for n in self.adjacent(id, adjacency, bounds) {
                    if !visited.contains(&n) {
                        queue.push(Reverse(n));
                    }
                }
            }
        }
        region
    }

    /// Adds to `region` every enclosed hole inside its bounding window.
    ///
    /// Each non-member patch of the window seeds a 4-connected search confined
    /// to the window; components reaching the window border are not enclosed
    /// and are dropped.
    pub fn fill(&self, region: &Region, species: SpeciesId) -> Region {
        let mut out = region.clone();
        let Some(bounds) = self.bounds_of(region) else {
            return out;
        };
        let mut candidates: BTreeSet<usize> =
            self.block(bounds).difference(region).copied().collect();

        while let Some(seed) = candidates.pop_first() {
            let tile = self.strong_region_within(seed, species, bounds);
            if tile.is_empty() {
                continue;
            }
            for id in &tile {
                candidates.remove(id);
            }
            let enclosed = tile.iter().all(|&id| {
                let (row, col) = self.row_col(id);
                !bounds.on_border(row, col)
            });
            if enclosed {
                out.extend(tile);
            }
        }
        out
    }

    pub fn nibble_strong(&self, region: &Region, species: SpeciesId, depth: usize) -> Region {
        self.nibble(region, species, depth, Adjacency::Strong)
    }

    pub fn nibble_weak(&self, region: &Region, species: SpeciesId, depth: usize) -> Region {
        self.nibble(region, species, depth, Adjacency::Weak)
    }

    /// Peels boundary patches off `region`, `depth` times.
    ///
    /// A patch is on the boundary when a neighbour differs from it in
    /// infestation status for `species`, or was peeled by an earlier pass.
    fn nibble(
        &self,
        region: &Region,
        species: SpeciesId,
        depth: usize,
        adjacency: Adjacency,
    ) -> Region {
        let mut out = region.clone();
        let Some(bounds) = self.full_bounds() else {
            return out;
        };
        let mut peeled: HashSet<usize> = HashSet::new();
        for _ in 0..depth {
            if out.is_empty() {
                break;
            }
            let boundary: Vec<usize> = out
                .iter()
                .copied()
                .filter(|&id| {
                    let status = self.patches[id].is_infested(species);
                    self.adjacent(id, adjacency, bounds).into_iter().any(|n| {
                        peeled.contains(&n) || self.patches[n].is_infested(species) != status
                    })
                })
                .collect();
            if boundary.is_empty() {
                break;
            }
            for id in boundary {
                out.remove(&id);
                peeled.insert(id);
            }
        }
        out
    }
}
