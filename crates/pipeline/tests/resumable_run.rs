//! End-to-end runs over synthetic monthly rasters.

use approx::assert_abs_diff_eq;
use habistat_core::{GeoTransform, Georef, RasterStore};
use habistat_pipeline::{EngineConfig, RunController, RunEvent, StatisticKind};
use ndarray::Array2;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const KINDS: [&str; 3] = ["STD", "MORAN", "GEARY"];

fn setup() -> (TempDir, PathBuf, EngineConfig) {
    let root = TempDir::new().unwrap();
    let ndvi = root.path().join("ndvi");
    fs::create_dir_all(&ndvi).unwrap();
    let mut config = EngineConfig::new(
        root.path(),
        BTreeMap::from([("NDVI".to_string(), PathBuf::from("ndvi"))]),
    );
    config.tile_size = 32;
    (root, ndvi, config)
}

fn georef() -> Georef {
    Georef::new(GeoTransform::new(13.08, 52.68, 0.0002, -0.0002))
}

fn write_base(dir: &Path, month: u8) -> PathBuf {
    let path = dir.join(format!("NDVI_BerlinBB_2022_{month:02}.tif"));
    let data = Array2::from_shape_fn((64, 50), |(r, c)| {
        if (r + c) % 23 == 0 {
            f64::NAN
        } else {
            ((r as f64 / 9.0).sin() * (c as f64 / 7.0).cos() + month as f64 * 0.01).clamp(-1.0, 1.0)
        }
    });
    RasterStore::default().write(&path, &georef(), data).unwrap();
    path
}

fn artefact(dir: &Path, kind: &str, month: u8) -> PathBuf {
    dir.join(format!("NDVI_{kind}_2022_{month:02}.tif"))
}

#[test]
fn second_run_is_a_no_op() {
    let (_root, ndvi, config) = setup();
    write_base(&ndvi, 6);
    write_base(&ndvi, 7);

    let controller = RunController::new(config).unwrap();
    let first = controller.run();
    assert_eq!(first.completed, 2);
    assert!(first.is_clean());

    let before: Vec<Vec<u8>> = [6, 7]
        .iter()
        .flat_map(|&m| KINDS.iter().map(move |k| (k, m)))
        .map(|(k, m)| fs::read(artefact(&ndvi, k, m)).unwrap())
        .collect();

    assert!(controller.pending().unwrap().is_empty());
    let second = controller.run();
    assert_eq!(second.completed, 0);
    assert_eq!(second.up_to_date, 2);

    let after: Vec<Vec<u8>> = [6, 7]
        .iter()
        .flat_map(|&m| KINDS.iter().map(move |k| (k, m)))
        .map(|(k, m)| fs::read(artefact(&ndvi, k, m)).unwrap())
        .collect();
    assert_eq!(before, after);
}

#[test]
fn only_the_incomplete_month_is_processed() {
    let (_root, ndvi, config) = setup();
    write_base(&ndvi, 6);
    write_base(&ndvi, 7);
    for kind in KINDS {
        RasterStore::default()
            .write(artefact(&ndvi, kind, 6), &georef(), Array2::from_elem((64, 50), 0.25))
            .unwrap();
    }

    let mut started = Vec::new();
    let summary = RunController::new(config).unwrap().run_with_progress(|event| {
        if let RunEvent::ItemStarted { item, .. } = event {
            started.push(item.base.label());
        }
    });

    assert_eq!(started, vec!["NDVI_2022_07".to_string()]);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.up_to_date, 1);
    assert_eq!(summary.skipped, 0);

    // the pre-existing artefact was not recomputed
    let kept = RasterStore::default().read(artefact(&ndvi, "STD", 6)).unwrap();
    assert!(kept.data().iter().all(|&v| v == 0.25));
}

#[test]
fn corrupt_raster_does_not_stop_the_run() {
    let (_root, ndvi, config) = setup();
    fs::write(ndvi.join("NDVI_BerlinBB_2022_05.tif"), b"II*\0 definitely not a raster").unwrap();
    write_base(&ndvi, 6);

    let summary = RunController::new(config).unwrap().run();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failures.len(), 1);
    assert!(summary.failures[0].0.ends_with("NDVI_BerlinBB_2022_05.tif"));

    for kind in KINDS {
        assert!(artefact(&ndvi, kind, 6).is_file(), "{kind}");
        assert!(!artefact(&ndvi, kind, 5).exists(), "{kind}");
    }
}

#[test]
fn artefacts_match_source_shape_and_georeference() {
    let (_root, ndvi, config) = setup();
    write_base(&ndvi, 6);
    RunController::new(config).unwrap().run();

    let store = RasterStore::default();
    let source = store.read(ndvi.join("NDVI_BerlinBB_2022_06.tif")).unwrap();
    for kind in KINDS {
        let raster = store.read(artefact(&ndvi, kind, 6)).unwrap();
        assert_eq!(raster.shape(), source.shape(), "{kind}");
        assert_eq!(raster.georef(), source.georef(), "{kind}");
        assert_eq!(raster.transform(), &georef().transform, "{kind}");
    }

    // moran/geary are block-replicated from the 5x lattice
    let moran = store.read(artefact(&ndvi, "MORAN", 6)).unwrap();
    assert_abs_diff_eq!(moran.get(0, 0).unwrap(), moran.get(4, 4).unwrap(), epsilon = 1e-12);
    assert_abs_diff_eq!(moran.get(60, 45).unwrap(), moran.get(63, 49).unwrap(), epsilon = 1e-12);
}

#[test]
fn deleted_artefact_is_regenerated() {
    let (_root, ndvi, config) = setup();
    write_base(&ndvi, 6);
    let controller = RunController::new(config).unwrap();
    controller.run();

    fs::remove_file(artefact(&ndvi, "GEARY", 6)).unwrap();
    let pending = controller.pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].missing.iter().copied().collect::<Vec<_>>(), vec![StatisticKind::Geary]);

    let summary = controller.run();
    assert_eq!(summary.completed, 1);
    assert!(artefact(&ndvi, "GEARY", 6).is_file());
}

#[test]
fn missing_raster_directory_is_reported() {
    let (_root, ndvi, mut config) = setup();
    write_base(&ndvi, 6);
    config.raster_dirs.insert("NDWI".into(), PathBuf::from("ndwi"));

    let summary = RunController::new(config).unwrap().run();
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.unscanned, vec!["NDWI".to_string()]);
    assert!(!summary.is_clean());
}

#[test]
fn yaml_config_drives_a_run() {
    let (root, ndvi, _) = setup();
    write_base(&ndvi, 6);
    let yaml = format!(
        "base_dir: {}\nraster_dirs:\n  NDVI: ndvi\nstatistics: [std]\nwindow_size: 3\n",
        root.path().display()
    );
    let config_path = root.path().join("habistat.yaml");
    fs::write(&config_path, yaml).unwrap();

    let config = EngineConfig::load(&config_path).unwrap();
    let summary = RunController::new(config).unwrap().run();
    assert_eq!(summary.completed, 1);
    assert!(artefact(&ndvi, "STD", 6).is_file());
    assert!(!artefact(&ndvi, "MORAN", 6).exists());
}
