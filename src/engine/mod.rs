use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::{
    mosaic::Mosaic,
    output::{Layer, MosaicSummary, RasterWriter},
    rng::{ProcessRng, RngManager},
};

pub struct EngineSettings {
    pub scenario_name: String,
    pub seed: u64,
    pub time_increment: i64,
    pub output_interval_ticks: u64,
    pub output_dir: PathBuf,
    pub output_layers: Vec<Layer>,
}

pub struct EngineBuilder {
    settings: EngineSettings,
    processes: Vec<Box<dyn Process>>,
}

impl EngineBuilder {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            processes: Vec::new(),
        }
    }

    pub fn with_process(mut self, process: impl Process + 'static) -> Self {
        self.processes.push(Box::new(process));
        self
    }

    pub fn push_process(&mut self, process: impl Process + 'static) {
        self.processes.push(Box::new(process));
    }

    pub fn build(self) -> Engine {
        Engine {
            rng: RngManager::new(self.settings.seed),
            processes: self.processes,
            writer: RasterWriter::new(
                self.settings.output_dir.join(&self.settings.scenario_name),
                self.settings.output_interval_ticks,
                self.settings.output_layers.clone(),
            ),
            tick: 0,
            time: 0,
            settings: self.settings,
        }
    }
}

/// Runs the registered processes in order, once per tick.
pub struct Engine {
    rng: RngManager,
    processes: Vec<Box<dyn Process>>,
    writer: RasterWriter,
    tick: u64,
    time: i64,
    settings: EngineSettings,
}

impl Engine {
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn process_names(&self) -> Vec<&str> {
        self.processes.iter().map(|p| p.name()).collect()
    }

    pub fn run(&mut self, mosaic: &mut Mosaic, ticks: u64) -> Result<MosaicSummary> {
        self.run_with_hook(mosaic, ticks, |_| {})
    }

    pub fn run_with_hook<F>(
        &mut self,
        mosaic: &mut Mosaic,
        ticks: u64,
        mut hook: F,
    ) -> Result<MosaicSummary>
    where
        F: FnMut(&MosaicSummary),
    {
        let mut summary = MosaicSummary::capture(mosaic, self.tick, self.time);
        for _ in 0..ticks {
            summary = self.step(mosaic)?;
            hook(&summary);
        }
        info!(
            scenario = %self.settings.scenario_name,
            ticks = self.tick,
            time = self.time,
            infested = summary.total_infested(),
            monitored = summary.monitored,
            "run complete"
        );
        Ok(summary)
    }

    /// Advances one tick: every process runs with its own RNG stream, then
    /// time moves forward and output is written when due.
    pub fn step(&mut self, mosaic: &mut Mosaic) -> Result<MosaicSummary> {
        self.tick += 1;
        let ctx = ProcessContext {
            tick: self.tick,
            time: self.time,
            time_increment: self.settings.time_increment,
        };
        for process in &mut self.processes {
            let mut rng_stream = self.rng.stream(process.name());
            process
                .run(&ctx, mosaic, &mut rng_stream)
                .with_context(|| {
                    format!("process '{}' failed at tick {}", process.name(), ctx.tick)
                })?;
        }
        self.time += self.settings.time_increment;

        let summary = MosaicSummary::capture(mosaic, self.tick, self.time);
        debug!(
            tick = self.tick,
            time = self.time,
            infested = summary.total_infested(),
            "tick complete"
        );
        if let Some(dir) = self
            .writer
            .maybe_write(mosaic, &summary)
            .with_context(|| format!("failed to write output for tick {}", self.tick))?
        {
            debug!(dir = %dir.display(), "wrote output");
        }
        Ok(summary)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessContext {
    pub tick: u64,
    /// Simulated time at the start of the tick.
    pub time: i64,
    pub time_increment: i64,
}

/// One stage of the per-tick update. Each process finishes its full scan of
/// the mosaic before the next one starts.
pub trait Process {
    fn name(&self) -> &str;
    fn run(
        &mut self,
        ctx: &ProcessContext,
        mosaic: &mut Mosaic,
        rng: &mut ProcessRng<'_>,
    ) -> Result<()>;
}
