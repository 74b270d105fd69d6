use image::{Rgba, RgbaImage};
use packsmith_core::build::{BuildEvent, BuildPlan, CancelToken, LOCK_FILE};
use packsmith_core::config::BuildConfig;
use packsmith_core::session::BuildSession;
use packsmith_core::PackError;
use std::fs::File;
use std::path::{Path, PathBuf};

fn write(path: &Path, text: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, text).unwrap();
}

fn solid_png(path: &Path, rgba: [u8; 4]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    RgbaImage::from_pixel(16, 16, Rgba(rgba)).save(path).unwrap();
}

/// A small two-platform workspace; returns the build config path.
fn fixture(root: &Path) -> PathBuf {
    let src = root.join("src");
    solid_png(&src.join("blocks/stone.png"), [120, 120, 120, 255]);
    solid_png(&src.join("blocks/dirt.png"), [120, 80, 40, 255]);
    write(
        &src.join("pack.mcmeta"),
        r#"{"pack": {"pack_format": "%pack_format%", "description": "%description% (%resolution%)"}}"#,
    );
    write(
        &root.join("source_mapping.json"),
        r#"{
            "STONE": {"path": "blocks/stone.png", "resolution": [16, 16]},
            "DIRT": {"path": "blocks/dirt.png", "resolution": [16, 16]},
            "META": {"path": "pack.mcmeta", "inject": "TRUE", "downsample": "FALSE"}
        }"#,
    );
    write(
        &root.join("mappings/version_mappings.json"),
        r#"{
            "Java": {"1.12": {"pack_format": 3}, "1.20": {"pack_format": 15}},
            "Bedrock": {"1.20": {"pack_format": 2, "zip_extension": ".mcpack"}}
        }"#,
    );
    let rules = r#"[
        {"source": "META", "destination": "pack.mcmeta"},
        {"source": "STONE", "destination": "assets/textures/block/stone.png"},
        {"type": "grid", "destination": "assets/textures/terrain.png", "grid_size": [2, 1], "source": ["STONE", "DIRT"]}
    ]"#;
    write(&root.join("mappings/Java/1.20/blocks.json"), rules);
    write(&root.join("mappings/Bedrock/1.20/blocks.json"), rules);
    write(
        &root.join("pack.config"),
        "name: Test\ndescription: Demo\npack_version_number: [1, 0, 2]\nresolutions:\n  0: 16x\n  1: 8x\n",
    );

    let cfg = BuildConfig {
        source_dir: src,
        mappings_dir: root.join("mappings"),
        output_dir: root.join("out"),
        tempfile_dir: root.join("tmp"),
        log_output_dir: root.join("logs"),
        source_mapping_file: root.join("source_mapping.json"),
        version_mappings_file: root.join("mappings/version_mappings.json"),
        pack_config_file: root.join("pack.config"),
    };
    let path = root.join("test.config");
    cfg.save(&path).unwrap();
    path
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|rd| {
            rd.map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

fn entry_names(zip_path: &Path) -> Vec<String> {
    let archive = zip::ZipArchive::new(File::open(zip_path).unwrap()).unwrap();
    archive.file_names().map(str::to_string).collect()
}

#[test]
fn full_matrix_produces_named_artifacts() {
    let tmp = tempfile::tempdir().unwrap();
    let plan = BuildPlan::from_path(&fixture(tmp.path())).unwrap();
    let mut skipped = Vec::new();
    let summary = plan
        .run(&CancelToken::new(), &mut |e| {
            if let BuildEvent::VersionSkipped { platform, version } = e {
                skipped.push(format!("{platform} {version}"));
            }
        })
        .unwrap();

    assert_eq!(skipped, vec!["Java 1.12".to_string()]);
    assert!(!summary.cancelled);
    assert!(summary.failed.is_empty(), "{:?}", summary.failed);
    let names: Vec<String> = summary
        .artifacts
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec![
            "[Java][1.20][16x]Test_1.0.2.zip",
            "[Java][1.20][8x]Test_1.0.2.zip",
            "[Bedrock][1.20][16x]Test_1.0.2.mcpack",
            "[Bedrock][1.20][8x]Test_1.0.2.mcpack",
        ]
    );
    assert!(file_names(&tmp.path().join("tmp")).is_empty());
    assert!(!tmp.path().join("out").join(LOCK_FILE).exists());

    let java_8x = &summary.artifacts[1];
    assert_eq!(
        entry_names(java_8x),
        vec![
            "assets/textures/block/stone.png",
            "assets/textures/terrain.png",
            "pack.mcmeta",
        ]
    );
    let mut archive = zip::ZipArchive::new(File::open(java_8x).unwrap()).unwrap();
    let mut meta = String::new();
    std::io::Read::read_to_string(&mut archive.by_name("pack.mcmeta").unwrap(), &mut meta).unwrap();
    assert_eq!(meta, r#"{"pack": {"pack_format": "15", "description": "Demo (8x)"}}"#);

    let mut terrain = Vec::new();
    std::io::Read::read_to_end(
        &mut archive.by_name("assets/textures/terrain.png").unwrap(),
        &mut terrain,
    )
    .unwrap();
    let terrain = image::load_from_memory(&terrain).unwrap();
    assert_eq!((terrain.width(), terrain.height()), (16, 8));
}

#[test]
fn rebuilding_gives_identical_archives() {
    let tmp = tempfile::tempdir().unwrap();
    let plan = BuildPlan::from_path(&fixture(tmp.path())).unwrap();
    let first = plan.run(&CancelToken::new(), &mut |_| {}).unwrap();
    let before = std::fs::read(&first.artifacts[0]).unwrap();
    plan.run(&CancelToken::new(), &mut |_| {}).unwrap();
    assert_eq!(std::fs::read(&first.artifacts[0]).unwrap(), before);
}

#[test]
fn cancelling_after_first_cell_leaves_no_scratch_or_partial_files() {
    let tmp = tempfile::tempdir().unwrap();
    let plan = BuildPlan::from_path(&fixture(tmp.path())).unwrap();
    let token = CancelToken::new();
    let trigger = token.clone();
    let mut cancelled_event = false;
    let summary = plan
        .run(&token, &mut |e| match e {
            BuildEvent::CellFinished { .. } => trigger.cancel(),
            BuildEvent::Cancelled => cancelled_event = true,
            _ => {}
        })
        .unwrap();

    assert!(summary.cancelled);
    assert!(cancelled_event);
    assert_eq!(summary.artifacts.len(), 1);
    assert!(file_names(&tmp.path().join("tmp")).is_empty());
    assert_eq!(file_names(&tmp.path().join("out")), vec!["[Java][1.20][16x]Test_1.0.2.zip"]);
    // the finished cell's archive is complete
    assert_eq!(entry_names(&summary.artifacts[0]).len(), 3);
}

#[test]
fn cancelling_a_started_cell_abandons_only_that_cell() {
    let tmp = tempfile::tempdir().unwrap();
    let plan = BuildPlan::from_path(&fixture(tmp.path())).unwrap();
    let token = CancelToken::new();
    let trigger = token.clone();
    let mut finished = Vec::new();
    let mut failed = Vec::new();
    let summary = plan
        .run(&token, &mut |e| match e {
            BuildEvent::CellStarted { index: 1, .. } => trigger.cancel(),
            BuildEvent::CellFinished { index, .. } => finished.push(index),
            BuildEvent::CellFailed { index, .. } => failed.push(index),
            _ => {}
        })
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(finished, vec![0]);
    assert!(failed.is_empty());
    assert!(summary.failed.is_empty());
    assert_eq!(summary.artifacts.len(), 1);

    let out = file_names(&tmp.path().join("out"));
    assert_eq!(out, vec!["[Java][1.20][16x]Test_1.0.2.zip"]);
    assert!(!out.iter().any(|n| n.ends_with(".partial")));
    assert!(!tmp.path().join("out").join(LOCK_FILE).exists());
    let scratch = file_names(&tmp.path().join("tmp"));
    assert!(
        !scratch
            .iter()
            .any(|n| n.ends_with(".resolved") || n.ends_with(".packed")),
        "scratch left behind: {scratch:?}"
    );
    assert_eq!(entry_names(&summary.artifacts[0]).len(), 3);
}

#[test]
fn locked_output_directory_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let plan = BuildPlan::from_path(&fixture(tmp.path())).unwrap();
    let out = tmp.path().join("out");
    std::fs::create_dir_all(&out).unwrap();
    std::fs::write(out.join(LOCK_FILE), "").unwrap();

    let err = plan.run(&CancelToken::new(), &mut |_| {}).unwrap_err();
    assert!(matches!(err, PackError::OutputLocked(_)));
    assert!(out.join(LOCK_FILE).exists());
}

#[test]
fn session_streams_events_and_returns_summary() {
    let tmp = tempfile::tempdir().unwrap();
    let config = fixture(tmp.path());
    let mut session = BuildSession::new();
    let events = session.start(&config).unwrap();

    let received: Vec<BuildEvent> = events.iter().collect();
    let summary = session.wait().unwrap();
    assert!(!session.is_running());
    assert_eq!(summary.artifacts.len(), 4);

    assert!(matches!(received.first(), Some(BuildEvent::VersionSkipped { .. })));
    assert!(matches!(received.last(), Some(BuildEvent::Finished(_))));
    let started = received
        .iter()
        .filter(|e| matches!(e, BuildEvent::CellStarted { .. }))
        .count();
    assert_eq!(started, 4);

    // the session can run again once idle
    let again = session.start(&config).unwrap();
    drop(again);
    assert_eq!(session.wait().unwrap().artifacts.len(), 4);
}
