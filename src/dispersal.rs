use std::f64::consts::TAU;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::Coordinate;
use crate::rng::RandomGenerator;

#[derive(Debug, Error)]
pub enum DispersalError {
    #[error("disperser has no source position")]
    MissingPosition,
    #[error("disperser is misconfigured: {0}")]
    Misconfigured(String),
}

/// Produces candidate propagule locations from a source position.
pub trait Disperser: fmt::Debug {
    fn clone_box(&self) -> Box<dyn Disperser>;
    fn set_position(&mut self, position: Coordinate);
    fn position(&self) -> Option<Coordinate>;
    fn disperse(&mut self, rng: &mut dyn RandomGenerator)
        -> Result<Vec<Coordinate>, DispersalError>;
}

impl Clone for Box<dyn Disperser> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadialDisperserConfig {
    pub propagules: usize,
    pub mean_distance: f64,
}

/// Emits a fixed number of propagules per call, each at an exponentially
/// distributed distance and uniform bearing from the source.
#[derive(Debug, Clone, PartialEq)]
pub struct RadialDisperser {
    config: RadialDisperserConfig,
    position: Option<Coordinate>,
}

impl RadialDisperser {
    pub fn new(config: RadialDisperserConfig) -> Self {
        Self {
            config,
            position: None,
        }
    }
}

impl Disperser for RadialDisperser {
    fn clone_box(&self) -> Box<dyn Disperser> {
        Box::new(self.clone())
    }

    fn set_position(&mut self, position: Coordinate) {
        self.position = Some(position);
    }

    fn position(&self) -> Option<Coordinate> {
        self.position
    }

    fn disperse(
        &mut self,
        rng: &mut dyn RandomGenerator,
    ) -> Result<Vec<Coordinate>, DispersalError> {
        let origin = self.position.ok_or(DispersalError::MissingPosition)?;
        if self.config.mean_distance.is_nan() || self.config.mean_distance < 0.0 {
            return Err(DispersalError::Misconfigured(format!(
                "mean distance must be non-negative, got {}",
                self.config.mean_distance
            )));
        }
        let mut out = Vec::with_capacity(self.config.propagules);
        for _ in 0..self.config.propagules {
            let distance = -self.config.mean_distance * (1.0 - rng.next_uniform()).ln();
            let bearing = TAU * rng.next_uniform();
            out.push(origin.offset(distance * bearing.cos(), distance * bearing.sin()));
        }
        Ok(out)
    }
}
