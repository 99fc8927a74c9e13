use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use nspread::{engine::EngineBuilder, scenario::ScenarioLoader};

#[derive(Debug, Parser)]
#[command(author, version, about = "Invasive species spread and management simulator")]
struct Cli {
    /// Path to the scenario YAML file
    #[arg(long, default_value = "scenarios/small_patch.yaml")]
    scenario: PathBuf,

    /// Override tick count (uses scenario default when omitted)
    #[arg(long)]
    ticks: Option<u64>,

    /// Override raster output interval in ticks (0 disables output)
    #[arg(long)]
    output_interval: Option<u64>,

    /// Directory for raster output
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let loader = ScenarioLoader::new(".");
    let scenario = loader.load(&cli.scenario)?;
    let mut mosaic = scenario.build_mosaic()?;
    let ticks = scenario.ticks(cli.ticks);
    let settings = scenario.engine_settings(cli.output_interval, cli.output_dir);

    let mut builder = EngineBuilder::new(settings)
        .with_process(scenario.growth_process(&mosaic)?)
        .with_process(scenario.dispersal_process(&mosaic)?)
        .with_process(scenario.infestation_process());
    if let Some(monitor) = scenario.monitor_process(&mosaic)? {
        builder.push_process(monitor);
    }
    builder.push_process(scenario.ground_control_process(&mosaic)?);
    let mut engine = builder.build();

    let summary = engine.run(&mut mosaic, ticks)?;
    for species in &summary.species {
        info!(
            species = %species.name,
            infested = species.infested,
            controlled = species.controlled,
            area = species.infested_area,
            "final state"
        );
    }
    println!(
        "Scenario '{}' completed for {} ticks. Infested cells: {}, monitored cells: {}",
        scenario.name,
        ticks,
        summary.total_infested(),
        summary.monitored
    );
    Ok(())
}
