//! Loading per-cell maps onto the mosaic.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::occupancy::ControlType;
use crate::raster::Raster;
use crate::species::SpeciesId;

use super::{Mosaic, MosaicError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapKind {
    Presence,
    Habitat,
    Age,
    Management,
}

#[derive(Debug, Error)]
#[error("map source must not be empty")]
pub struct MapSourceError;

/// Where a map's values come from, decided once when the configuration is read.
///
/// Text forms: `ALL`, `NONE`, `GROUND`, `CONTAINMENT`, `CORE` (any case), a
/// number, or otherwise a path to an ESRI ASCII grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MapSource {
    All,
    None,
    Constant(f64),
    Control(ControlType),
    File(PathBuf),
}

impl MapSource {
    /// Joins relative file paths onto `base`; other variants are unchanged.
    pub fn resolve(&self, base: &Path) -> MapSource {
        match self {
            MapSource::File(path) if path.is_relative() => MapSource::File(base.join(path)),
            other => other.clone(),
        }
    }
}

impl FromStr for MapSource {
    type Err = MapSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(MapSourceError);
        }
        let source = match trimmed.to_ascii_uppercase().as_str() {
            "ALL" => MapSource::All,
            "NONE" => MapSource::None,
            "GROUND" => MapSource::Control(ControlType::GroundControl),
            "CONTAINMENT" => MapSource::Control(ControlType::Containment),
            "CORE" => MapSource::Control(ControlType::ContainmentCore),
            _ => match trimmed.parse::<f64>() {
                Ok(value) if value.is_finite() => MapSource::Constant(value),
                _ => MapSource::File(PathBuf::from(trimmed)),
            },
        };
        Ok(source)
    }
}

impl TryFrom<String> for MapSource {
    type Error = MapSourceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MapSource> for String {
    fn from(value: MapSource) -> Self {
        value.to_string()
    }
}

impl fmt::Display for MapSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapSource::All => f.write_str("ALL"),
            MapSource::None => f.write_str("NONE"),
            MapSource::Constant(value) => write!(f, "{value}"),
            MapSource::Control(ControlType::GroundControl) => f.write_str("GROUND"),
            MapSource::Control(ControlType::Containment) => f.write_str("CONTAINMENT"),
            MapSource::Control(ControlType::ContainmentCore) => f.write_str("CORE"),
            MapSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

impl Mosaic {
    /// Applies `source` as the `kind` map of `species`.
    pub fn load_map(
        &mut self,
        kind: MapKind,
        species: SpeciesId,
        source: &MapSource,
    ) -> Result<(), MosaicError> {
        if let MapSource::File(path) = source {
            let raster = Raster::read_ascii(path)?;
            return self.apply_raster(kind, species, raster);
        }
        if self.patches.is_empty() {
            return Err(MosaicError::NoGrid { kind });
        }
        match (kind, source) {
            (MapKind::Presence, MapSource::All) => self.for_each_active(species, |occ| {
                occ.set_infested(true);
            }),
            (MapKind::Presence, MapSource::None) => self.for_each_active(species, |occ| {
                occ.set_infested(false);
            }),
            (MapKind::Habitat, MapSource::All) => self.for_each_active(species, |occ| {
                occ.set_habitat_suitability(1.0);
            }),
            (MapKind::Habitat, MapSource::None) => self.for_each_active(species, |occ| {
                occ.set_habitat_suitability(0.0);
            }),
            (MapKind::Habitat, MapSource::Constant(value)) => {
                let value = *value;
                self.for_each_active(species, |occ| occ.set_habitat_suitability(value));
            }
            (MapKind::Age, MapSource::Constant(value)) => {
                let age = *value as i64;
                self.for_each_active(species, |occ| {
                    if occ.is_infested() {
                        occ.set_age(age);
                    }
                });
            }
            (MapKind::Management, MapSource::All) => self.for_each_active(species, |occ| {
                for control in ControlType::ALL {
                    occ.add_control(control);
                }
            }),
            (MapKind::Management, MapSource::Control(control)) => {
                let control = *control;
                self.for_each_active(species, |occ| occ.add_control(control));
            }
            (MapKind::Management, MapSource::None) => {
                self.for_each_active(species, |occ| occ.clear_controls())
            }
            _ => {
                return Err(MosaicError::UnsupportedSource {
                    kind,
                    source_text: source.to_string(),
                })
            }
        }
        info!(?kind, species = %species, %source, "applied uniform map");
        Ok(())
    }

    fn for_each_active(
        &mut self,
        species: SpeciesId,
        mut f: impl FnMut(&mut crate::occupancy::Occupancy),
    ) {
        for patch in &mut self.patches {
            if let Some(occ) = patch.active_mut(species) {
                f(occ);
            }
        }
    }

    /// Applies a raster as the `kind` map of `species`.
    ///
    /// An empty mosaic takes its dimensions from the raster. Cells that are
    /// no-data here, or in any earlier map, become no-data for `species`.
    pub fn apply_raster(
        &mut self,
        kind: MapKind,
        species: SpeciesId,
        raster: Raster,
    ) -> Result<(), MosaicError> {
        if self.patches.is_empty() {
            self.setup_from_template(&raster);
        }
        if raster.rows() != self.nrows || raster.cols() != self.ncols {
            return Err(MosaicError::DimensionMismatch {
                path: raster.label().to_string(),
                rows: raster.rows(),
                cols: raster.cols(),
                expected_rows: self.nrows,
                expected_cols: self.ncols,
            });
        }
        if kind == MapKind::Management {
            self.validate_management(&raster)?;
        }

        let mut no_data_cells = 0usize;
        for row in 0..self.nrows {
            for col in 0..self.ncols {
                let id = self.index(row, col);
                let value = raster.value(row, col);
                let inherited = self
                    .layers
                    .iter()
                    .any(|(other, layer)| *other != kind && layer.is_no_data(row, col));
                let patch = &mut self.patches[id];
                if value.is_nan() || inherited {
                    patch.mark_no_data(species);
                    no_data_cells += 1;
                    continue;
                }
                let Some(occ) = patch.active_mut(species) else {
                    continue;
                };
                match kind {
                    MapKind::Presence => occ.set_infested(value != self.no_presence),
                    MapKind::Habitat => occ.set_habitat_suitability(value),
                    MapKind::Age => {
                        if occ.is_infested() {
                            occ.set_age(value as i64);
                        }
                    }
                    MapKind::Management => {
                        if value == self.no_management {
                            continue;
                        }
                        if let Some(control) = ControlType::from_code(value as u8) {
                            occ.add_control(control);
                        }
                        patch.set_monitored(true);
                    }
                }
            }
        }

        info!(
            ?kind,
            species = %species,
            source = raster.label(),
            rows = raster.rows(),
            cols = raster.cols(),
            no_data_cells,
            "loaded map"
        );
        self.layers.insert(kind, raster);
        Ok(())
    }

    fn validate_management(&self, raster: &Raster) -> Result<(), MosaicError> {
        for row in 0..raster.rows() {
            for col in 0..raster.cols() {
                let value = raster.value(row, col);
                if value.is_nan() || value == self.no_management {
                    continue;
                }
                let valid = value.fract() == 0.0 && (1.0..=3.0).contains(&value);
                if !valid {
                    return Err(MosaicError::InvalidManagementValue {
                        value,
                        path: raster.label().to_string(),
                        no_management: self.no_management,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAN: f64 = f64::NAN;

    fn mosaic() -> (Mosaic, SpeciesId) {
        let mosaic = Mosaic::with_species(["Test_1"]);
        let sp = mosaic.require_species("Test_1").unwrap();
        (mosaic, sp)
    }

    #[test]
    fn sentinel_strings_parse_once() {
        assert_eq!("all".parse::<MapSource>().unwrap(), MapSource::All);
        assert_eq!("NONE".parse::<MapSource>().unwrap(), MapSource::None);
        assert_eq!(
            "Ground".parse::<MapSource>().unwrap(),
            MapSource::Control(ControlType::GroundControl)
        );
        assert_eq!(
            "CORE".parse::<MapSource>().unwrap(),
            MapSource::Control(ControlType::ContainmentCore)
        );
        assert_eq!("12".parse::<MapSource>().unwrap(), MapSource::Constant(12.0));
        assert_eq!(
            "maps/presence.asc".parse::<MapSource>().unwrap(),
            MapSource::File(PathBuf::from("maps/presence.asc"))
        );
        assert!("  ".parse::<MapSource>().is_err());
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        let source = MapSource::File(PathBuf::from("a.asc"));
        assert_eq!(
            source.resolve(Path::new("/data")),
            MapSource::File(PathBuf::from("/data/a.asc"))
        );
        assert_eq!(MapSource::All.resolve(Path::new("/data")), MapSource::All);
    }

    #[test]
    fn first_raster_becomes_template() {
        let (mut mosaic, sp) = mosaic();
        let presence = Raster::from_rows(&[vec![1.0, 0.0], vec![0.0, 2.0]], 10.0, 5.0, 7.0);
        mosaic.apply_raster(MapKind::Presence, sp, presence).unwrap();
        assert_eq!((mosaic.nrows(), mosaic.ncols()), (2, 2));
        assert_eq!(mosaic.cellsize(), 10.0);
        assert_eq!(mosaic.llx(), 5.0);
        assert_eq!(mosaic.lly(), 7.0);
        assert_eq!(mosaic.infested(sp), vec![0, 3]);
    }

    #[test]
    fn mismatched_dimensions_are_fatal() {
        let (mut mosaic, sp) = mosaic();
        mosaic.setup(2, 2, 1.0, 0.0, 0.0);
        let wrong = Raster::from_rows(&[vec![1.0, 0.0, 0.0]], 1.0, 0.0, 0.0).with_label("wrong.asc");
        let err = mosaic.apply_raster(MapKind::Habitat, sp, wrong).unwrap_err();
        match err {
            MosaicError::DimensionMismatch {
                path,
                rows,
                cols,
                expected_rows,
                expected_cols,
            } => {
                assert_eq!(path, "wrong.asc");
                assert_eq!((rows, cols), (1, 3));
                assert_eq!((expected_rows, expected_cols), (2, 2));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn no_data_propagates_from_earlier_maps() {
        let (mut mosaic, sp) = mosaic();
        let habitat = Raster::from_rows(&[vec![0.5, NAN], vec![1.0, 1.0]], 1.0, 0.0, 0.0);
        mosaic.apply_raster(MapKind::Habitat, sp, habitat).unwrap();
        let presence = Raster::from_rows(&[vec![1.0, 1.0], vec![NAN, 0.0]], 1.0, 0.0, 0.0);
        mosaic.apply_raster(MapKind::Presence, sp, presence).unwrap();

        assert!(mosaic.patch(1).unwrap().has_no_data());
        assert!(mosaic.patch(2).unwrap().has_no_data());
        assert_eq!(mosaic.infested(sp), vec![0]);
        let occ = mosaic.patch(0).unwrap().active(sp).unwrap();
        assert_eq!(occ.habitat_suitability(), 0.5);
    }

    #[test]
    fn age_raster_only_touches_infested_cells() {
        let (mut mosaic, sp) = mosaic();
        let presence = Raster::from_rows(&[vec![1.0, 0.0]], 1.0, 0.0, 0.0);
        mosaic.apply_raster(MapKind::Presence, sp, presence).unwrap();
        let age = Raster::from_rows(&[vec![6.0, 9.0]], 1.0, 0.0, 0.0);
        mosaic.apply_raster(MapKind::Age, sp, age).unwrap();
        assert_eq!(mosaic.patch(0).unwrap().active(sp).unwrap().age(), 6);
        assert_eq!(mosaic.patch(1).unwrap().active(sp).unwrap().age(), 0);

        mosaic
            .load_map(MapKind::Age, sp, &MapSource::Constant(3.0))
            .unwrap();
        assert_eq!(mosaic.patch(0).unwrap().active(sp).unwrap().age(), 3);
        assert_eq!(mosaic.patch(1).unwrap().active(sp).unwrap().age(), 0);
    }

    #[test]
    fn management_raster_assigns_controls() {
        let (mut mosaic, sp) = mosaic();
        let management = Raster::from_rows(&[vec![0.0, 1.0, 2.0, 3.0]], 1.0, 0.0, 0.0);
        mosaic
            .apply_raster(MapKind::Management, sp, management)
            .unwrap();
        let controls = |id: usize| {
            mosaic
                .patch(id)
                .unwrap()
                .active(sp)
                .unwrap()
                .controls()
                .keys()
                .copied()
                .collect::<Vec<_>>()
        };
        assert!(controls(0).is_empty());
        assert_eq!(controls(1), vec![ControlType::GroundControl]);
        assert_eq!(controls(2), vec![ControlType::Containment]);
        assert_eq!(controls(3), vec![ControlType::ContainmentCore]);
        assert_eq!(mosaic.monitored(), vec![1, 2, 3]);
    }

    #[test]
    fn bad_management_value_aborts_without_mutation() {
        let (mut mosaic, sp) = mosaic();
        mosaic.setup(1, 3, 1.0, 0.0, 0.0);
        let management =
            Raster::from_rows(&[vec![1.0, 4.0, 2.0]], 1.0, 0.0, 0.0).with_label("mgmt.asc");
        let err = mosaic
            .apply_raster(MapKind::Management, sp, management)
            .unwrap_err();
        assert!(matches!(
            err,
            MosaicError::InvalidManagementValue { value, ref path, .. } if value == 4.0 && path == "mgmt.asc"
        ));
        assert!(err.to_string().contains("mgmt.asc"));
        assert!(mosaic.controlled(sp).is_empty());
        assert!(mosaic.monitored().is_empty());
    }

    #[test]
    fn configurable_no_management_value() {
        let (mut mosaic, sp) = mosaic();
        mosaic.set_no_management(-1.0);
        let management = Raster::from_rows(&[vec![-1.0, 1.0]], 1.0, 0.0, 0.0);
        mosaic
            .apply_raster(MapKind::Management, sp, management)
            .unwrap();
        assert_eq!(mosaic.controlled(sp), vec![1]);
    }

    #[test]
    fn uniform_sources_skip_no_data() {
        let (mut mosaic, sp) = mosaic();
        mosaic.setup(1, 3, 1.0, 0.0, 0.0);
        mosaic.patch_mut(1).unwrap().mark_no_data(sp);

        mosaic.load_map(MapKind::Presence, sp, &MapSource::All).unwrap();
        assert_eq!(mosaic.infested(sp), vec![0, 2]);

        mosaic
            .load_map(
                MapKind::Management,
                sp,
                &MapSource::Control(ControlType::Containment),
            )
            .unwrap();
        assert_eq!(mosaic.controlled(sp), vec![0, 2]);

        mosaic.load_map(MapKind::Management, sp, &MapSource::None).unwrap();
        assert!(mosaic.controlled(sp).is_empty());

        mosaic.load_map(MapKind::Habitat, sp, &MapSource::None).unwrap();
        assert_eq!(
            mosaic.patch(0).unwrap().active(sp).unwrap().habitat_suitability(),
            0.0
        );
    }

    #[test]
    fn uniform_source_needs_a_grid() {
        let (mut mosaic, sp) = mosaic();
        let err = mosaic.load_map(MapKind::Presence, sp, &MapSource::All).unwrap_err();
        assert!(matches!(err, MosaicError::NoGrid { kind: MapKind::Presence }));
        assert!(mosaic.is_empty());
    }

    #[test]
    fn unsupported_combination_is_rejected() {
        let (mut mosaic, sp) = mosaic();
        mosaic.setup(1, 1, 1.0, 0.0, 0.0);
        let err = mosaic
            .load_map(
                MapKind::Habitat,
                sp,
                &MapSource::Control(ControlType::GroundControl),
            )
            .unwrap_err();
        assert!(matches!(err, MosaicError::UnsupportedSource { kind: MapKind::Habitat, .. }));
    }
}
