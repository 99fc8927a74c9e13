use std::path::{Path, PathBuf};

use nspread::{
    engine::{EngineBuilder, EngineSettings},
    geometry::Coordinate,
    mosaic::{MapSource, Mosaic, MosaicError},
    occupancy::ControlType,
    output::{Layer, MosaicSummary},
    raster::Raster,
    rng::FixedUniform,
    scenario::{Scenario, ScenarioLoader},
};

fn scenario_loader() -> ScenarioLoader {
    ScenarioLoader::new(env!("CARGO_MANIFEST_DIR"))
}

fn load(name: &str) -> Scenario {
    scenario_loader()
        .load(PathBuf::from("scenarios").join(name))
        .expect("scenario parses")
}

fn build_engine(
    scenario: &Scenario,
    mosaic: &Mosaic,
    output_dir: &Path,
    interval: u64,
) -> EngineBuilder {
    let settings = scenario.engine_settings(Some(interval), Some(output_dir.to_path_buf()));
    let mut builder = EngineBuilder::new(settings)
        .with_process(scenario.growth_process(mosaic).unwrap())
        .with_process(scenario.dispersal_process(mosaic).unwrap())
        .with_process(scenario.infestation_process());
    if let Some(monitor) = scenario.monitor_process(mosaic).unwrap() {
        builder.push_process(monitor);
    }
    builder.push_process(scenario.ground_control_process(mosaic).unwrap());
    builder
}

#[test]
fn scenario_loader_reads_fixture() {
    let scenario = load("small_patch.yaml");
    assert_eq!(scenario.name, "small_patch");
    assert_eq!(scenario.species.len(), 1);
    assert_eq!(scenario.ticks(None), 12);
    match &scenario.species[0].presence {
        MapSource::File(path) => {
            assert!(path.is_absolute());
            assert!(path.exists(), "{} should exist", path.display());
        }
        other => panic!("expected a file source, got {other}"),
    }
    assert_eq!(scenario.species[0].age, Some(MapSource::Constant(2.0)));
}

#[test]
fn mosaic_is_built_from_maps() {
    let scenario = load("small_patch.yaml");
    let mosaic = scenario.build_mosaic().unwrap();
    let sp = mosaic.require_species("Test_1").unwrap();

    assert_eq!((mosaic.nrows(), mosaic.ncols()), (5, 6));
    assert_eq!(mosaic.cellsize(), 10.0);
    assert_eq!(mosaic.infested(sp), vec![7, 8, 13, 14, 28]);
    assert!(mosaic.patch(17).unwrap().has_no_data());
    assert!(mosaic.patch(17).unwrap().active(sp).is_none());

    let managed = mosaic.patch(28).unwrap();
    assert!(managed.has_control(sp, ControlType::GroundControl));
    assert!(managed.is_monitored());
    assert_eq!(mosaic.monitored(), vec![28]);

    let occ = mosaic.patch(7).unwrap().active(sp).unwrap();
    assert_eq!(occ.age(), 2);
    assert_eq!(occ.habitat_suitability(), 1.0);
    assert!(occ.disperser().is_some());
}

#[test]
fn engine_runs_deterministically() {
    let scenario = load("small_patch.yaml");
    let temp = tempfile::tempdir().unwrap();

    let run = |seed_dir: &str| {
        let mut mosaic = scenario.build_mosaic().unwrap();
        let mut summaries = Vec::new();
        let mut engine = build_engine(&scenario, &mosaic, &temp.path().join(seed_dir), 0).build();
        engine
            .run_with_hook(&mut mosaic, 10, |summary| summaries.push(summary.clone()))
            .unwrap();
        let sp = mosaic.require_species("Test_1").unwrap();
        (summaries, mosaic.infested(sp), mosaic.controlled(sp))
    };

    let (summaries_a, infested_a, controlled_a) = run("a");
    let (summaries_b, infested_b, controlled_b) = run("b");
    assert_eq!(summaries_a.len(), 10);
    assert_eq!(summaries_a, summaries_b);
    assert_eq!(infested_a, infested_b);
    assert_eq!(controlled_a, controlled_b);
}

#[test]
fn engine_runs_hook_each_tick() {
    let scenario = load("small_patch.yaml");
    let temp = tempfile::tempdir().unwrap();
    let mut mosaic = scenario.build_mosaic().unwrap();
    let mut engine = build_engine(&scenario, &mosaic, temp.path(), 0).build();

    let mut ticks = Vec::new();
    let mut times = Vec::new();
    engine
        .run_with_hook(&mut mosaic, 6, |summary| {
            ticks.push(summary.tick);
            times.push(summary.time);
        })
        .expect("run succeeds");

    assert_eq!(ticks, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(times, vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn engine_writes_rasters_and_summary() {
    let scenario = load("small_patch.yaml");
    let temp = tempfile::tempdir().unwrap();
    let out = temp.path().join("rasters");
    let mut mosaic = scenario.build_mosaic().unwrap();
    let mut engine = build_engine(&scenario, &mosaic, &out, 4).build();
    engine.run(&mut mosaic, 8).unwrap();

    let tick_dir = out.join("small_patch").join("tick_000004");
    for layer in Layer::ALL {
        let path = tick_dir.join(format!("Test_1_{}.asc", layer.file_stem()));
        assert!(path.exists(), "expected {} to exist", path.display());
    }
    assert!(out.join("small_patch").join("tick_000008").exists());
    assert!(!out.join("small_patch").join("tick_000002").exists());

    let presence = Raster::read_ascii(tick_dir.join("Test_1_presence.asc")).unwrap();
    assert_eq!((presence.rows(), presence.cols()), (5, 6));
    assert!(presence.is_no_data(2, 5));

    let json = std::fs::read_to_string(tick_dir.join("summary.json")).unwrap();
    let summary: MosaicSummary = serde_json::from_str(&json).unwrap();
    assert_eq!(summary.tick, 4);
    assert_eq!(summary.species[0].name, "Test_1");
}

#[test]
fn ground_control_clears_managed_cell() {
    let scenario = load("small_patch.yaml");
    let mut mosaic = scenario.build_mosaic().unwrap();
    let sp = mosaic.require_species("Test_1").unwrap();
    let settings = EngineSettings {
        scenario_name: scenario.name.clone(),
        seed: scenario.seed,
        time_increment: 1,
        output_interval_ticks: 0,
        output_dir: PathBuf::from("unused"),
        output_layers: Vec::new(),
    };
    let mut engine = EngineBuilder::new(settings)
        .with_process(scenario.growth_process(&mosaic).unwrap())
        .with_process(scenario.ground_control_process(&mosaic).unwrap())
        .build();

    engine.run(&mut mosaic, 5).unwrap();
    let occ = mosaic.patch(28).unwrap().active(sp).unwrap();
    assert!(occ.is_infested());
    // under ground control the infestation does not age
    assert_eq!(occ.age(), 2);
    assert_eq!(occ.control_time(ControlType::GroundControl), Some(5));

    engine.run(&mut mosaic, 1).unwrap();
    let occ = mosaic.patch(28).unwrap().active(sp).unwrap();
    assert!(!occ.is_infested());
    assert!(!occ.has_control(ControlType::GroundControl));

    // unmanaged cells kept growing
    let grown = mosaic.patch(7).unwrap().active(sp).unwrap();
    assert_eq!(grown.age(), 8);
    assert_eq!(grown.stage(), 3);
}

#[test]
fn uniform_maps_apply_once_a_map_file_sets_the_grid() {
    let scenario = load("presence_all.yaml");
    assert!(scenario.grid.is_none());
    let mosaic = scenario.build_mosaic().unwrap();
    let sp = mosaic.require_species("Test_1").unwrap();

    assert_eq!((mosaic.nrows(), mosaic.ncols()), (5, 6));
    assert_eq!(mosaic.cellsize(), 10.0);
    // every data cell is infested; the habitat no-data cell stays inert
    assert_eq!(mosaic.infested(sp).len(), 29);
    assert!(mosaic.patch(17).unwrap().active(sp).is_none());
    assert_eq!(mosaic.controlled(sp).len(), 29);

    let occ = mosaic.patch(0).unwrap().active(sp).unwrap();
    assert_eq!(occ.age(), 3);
    assert_eq!(occ.habitat_suitability(), 0.8);
    assert!(occ.has_control(ControlType::GroundControl));
}

#[test]
fn bad_management_value_aborts_load() {
    let scenario = load("bad_management.yaml");
    let err = scenario.build_mosaic().unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("management class 4"), "{message}");
    assert!(message.contains("management_bad.asc"), "{message}");
    assert!(matches!(
        err.downcast_ref::<MosaicError>(),
        Some(MosaicError::InvalidManagementValue { .. })
    ));
}

#[test]
fn mismatched_map_dimensions_abort_load() {
    let temp = tempfile::tempdir().unwrap();
    let small = Raster::from_rows(&[vec![1.0, 0.0]], 10.0, 0.0, 0.0);
    let path = temp.path().join("small.asc");
    small.write_ascii(&path).unwrap();

    let scenario = load("small_patch.yaml");
    let mut mosaic = scenario.build_mosaic().unwrap();
    let sp = mosaic.require_species("Test_1").unwrap();
    let err = mosaic
        .load_map(nspread::MapKind::Habitat, sp, &MapSource::File(path))
        .unwrap_err();
    assert!(matches!(err, MosaicError::DimensionMismatch { rows: 1, cols: 2, .. }));
}

#[test]
fn center_cell_infestation() {
    let scenario = load("center_cell.yaml");
    let mut mosaic = scenario.build_mosaic().unwrap();
    let sp = mosaic.require_species("Test_1").unwrap();
    assert!(mosaic.infested(sp).is_empty());

    let established = mosaic.infest(sp, &[Coordinate::new(1.5, 1.5)], &mut FixedUniform(0.0));
    assert_eq!(established, 1);
    assert_eq!(mosaic.infested(sp), vec![4]);
    let occ = mosaic.patch(4).unwrap().active(sp).unwrap();
    assert_eq!(occ.stage(), 1);
    assert_eq!(occ.age(), 0);
}
