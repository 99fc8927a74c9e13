//! Periodic raster and summary output.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mosaic::Mosaic;
use crate::raster::Raster;
use crate::species::SpeciesId;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode summary: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Presence,
    Stage,
    MaxControl,
    Monitored,
}

impl Layer {
    pub const ALL: [Layer; 4] = [
        Layer::Presence,
        Layer::Stage,
        Layer::MaxControl,
        Layer::Monitored,
    ];

    pub fn file_stem(self) -> &'static str {
        match self {
            Layer::Presence => "presence",
            Layer::Stage => "stage",
            Layer::MaxControl => "max_control",
            Layer::Monitored => "monitored",
        }
    }

    /// Value written for one cell; `NaN` (no-data) for cells outside the
    /// simulation for `species`.
    pub fn cell_value(self, mosaic: &Mosaic, index: usize, species: SpeciesId) -> f64 {
        let Some(occ) = mosaic.patch(index).and_then(|p| p.active(species)) else {
            return f64::NAN;
        };
        match self {
            Layer::Presence => f64::from(u8::from(occ.is_infested())),
            Layer::Stage => f64::from(occ.stage()),
            Layer::MaxControl => occ.max_control().map_or(0.0, |c| f64::from(c.code())),
            Layer::Monitored => {
                let monitored = mosaic.patch(index).map_or(false, |p| p.is_monitored());
                f64::from(u8::from(monitored))
            }
        }
    }

    pub fn render(self, mosaic: &Mosaic, species: SpeciesId) -> Raster {
        let mut raster = Raster::filled(
            mosaic.nrows(),
            mosaic.ncols(),
            mosaic.cellsize(),
            mosaic.llx(),
            mosaic.lly(),
            f64::NAN,
        );
        for id in 0..mosaic.len() {
            let (row, col) = mosaic.row_col(id);
            raster.set_value(row, col, self.cell_value(mosaic, id, species));
        }
        raster
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesSummary {
    pub name: String,
    pub infested: usize,
    pub controlled: usize,
    pub infested_area: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MosaicSummary {
    pub tick: u64,
    pub time: i64,
    pub monitored: usize,
    pub species: Vec<SpeciesSummary>,
}

impl MosaicSummary {
    pub fn capture(mosaic: &Mosaic, tick: u64, time: i64) -> Self {
        let cell_area = mosaic.cellsize() * mosaic.cellsize();
        let species = mosaic
            .species()
            .iter()
            .map(|(id, name)| {
                let infested = mosaic.number_infested(id);
                SpeciesSummary {
                    name: name.to_string(),
                    infested,
                    controlled: mosaic.number_controlled(id),
                    infested_area: infested as f64 * cell_area,
                }
            })
            .collect();
        Self {
            tick,
            time,
            monitored: mosaic.number_monitored(),
            species,
        }
    }

    pub fn total_infested(&self) -> usize {
        self.species.iter().map(|s| s.infested).sum()
    }

    pub fn species(&self, name: &str) -> Option<&SpeciesSummary> {
        self.species.iter().find(|s| s.name == name)
    }
}

/// Writes one ASCII grid per species and layer, plus `summary.json`, into a
/// `tick_NNNNNN` directory every `interval` ticks. An interval of 0 disables output.
#[derive(Debug, Clone)]
pub struct RasterWriter {
    dir: PathBuf,
    interval: u64,
    layers: Vec<Layer>,
}

impl RasterWriter {
    pub fn new(dir: impl Into<PathBuf>, interval: u64, layers: Vec<Layer>) -> Self {
        Self {
            dir: dir.into(),
            interval,
            layers,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn should_write(&self, tick: u64) -> bool {
        self.interval > 0 && tick % self.interval == 0
    }

    pub fn maybe_write(
        &self,
        mosaic: &Mosaic,
        summary: &MosaicSummary,
    ) -> Result<Option<PathBuf>, OutputError> {
        if !self.should_write(summary.tick) {
            return Ok(None);
        }
        self.write(mosaic, summary).map(Some)
    }

    pub fn write(&self, mosaic: &Mosaic, summary: &MosaicSummary) -> Result<PathBuf, OutputError> {
        let dir = self.dir.join(format!("tick_{:06}", summary.tick));
        fs::create_dir_all(&dir).map_err(|source| io_error(&dir, source))?;

        for (species, name) in mosaic.species().iter() {
            for layer in &self.layers {
                let path = dir.join(format!("{}_{}.asc", name, layer.file_stem()));
                layer
                    .render(mosaic, species)
                    .write_ascii(&path)
                    .map_err(|source| io_error(&path, source))?;
            }
        }

        let path = dir.join("summary.json");
        let json = serde_json::to_string_pretty(summary)?;
        fs::write(&path, json).map_err(|source| io_error(&path, source))?;
        Ok(dir)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> OutputError {
    OutputError::Io {
        path: path.display().to_string(),
        source,
    }
}
