use image::{Rgba, RgbaImage};
use packsmith_core::atlas::{compile, deconstruct};
use packsmith_core::mapping::IdentifierTable;
use packsmith_core::model::MappingRule;
use packsmith_core::report::RunReport;
use packsmith_core::scale::{ScaleFactor, atlas_scale_factor};
use packsmith_core::version::SchemaVersion;
use serde_json::json;
use std::path::Path;

const RED: [u8; 4] = [255, 0, 0, 255];
const GREEN: [u8; 4] = [0, 255, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];
const YELLOW: [u8; 4] = [255, 255, 0, 255];

fn solid_image(w: u32, h: u32, rgba: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(w, h, Rgba(rgba))
}

fn ids() -> packsmith_core::mapping::ResolvedIdentifiers {
    let table = IdentifierTable::from_json_str(
        r#"{
            "R": {"path": "t/red.png", "resolution": [16, 16]},
            "G": {"path": "t/green.png", "resolution": [16, 16]},
            "B": {"path": "t/blue.png", "resolution": [16, 16]},
            "Y": {"path": "t/yellow.png", "resolution": [16, 16]}
        }"#,
    )
    .unwrap();
    table.resolve(&SchemaVersion::parse("1.20").unwrap())
}

fn grid_rule() -> packsmith_core::model::AtlasRule {
    let rule = MappingRule::from_value(json!({
        "type": "grid",
        "destination": "textures/atlas.png",
        "grid_size": [2, 2],
        "source": ["R", "G", "B", "Y"]
    }))
    .unwrap();
    match rule {
        MappingRule::Atlas(a) => a,
        other => panic!("expected atlas rule, got {other:?}"),
    }
}

fn write_sources(dir: &Path) {
    std::fs::create_dir_all(dir.join("t")).unwrap();
    for (name, c) in [("red", RED), ("green", GREEN), ("blue", BLUE), ("yellow", YELLOW)] {
        solid_image(16, 16, c).save(dir.join(format!("t/{name}.png"))).unwrap();
    }
}

fn quadrant_is(img: &RgbaImage, x0: u32, y0: u32, c: [u8; 4]) -> bool {
    (y0..y0 + 16).all(|y| (x0..x0 + 16).all(|x| img.get_pixel(x, y).0 == c))
}

#[test]
fn two_by_two_grid_places_quadrants() {
    let tmp = tempfile::tempdir().unwrap();
    write_sources(tmp.path());
    let mut report = RunReport::default();
    let atlas = compile(&grid_rule(), tmp.path(), &ids(), &mut report).unwrap();

    assert_eq!(atlas.dimensions(), (32, 32));
    assert!(quadrant_is(&atlas, 0, 0, RED));
    assert!(quadrant_is(&atlas, 16, 0, GREEN));
    assert!(quadrant_is(&atlas, 0, 16, BLUE));
    assert!(quadrant_is(&atlas, 16, 16, YELLOW));
    assert!(report.is_clean());
}

#[test]
fn missing_member_leaves_a_hole_and_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    write_sources(tmp.path());
    std::fs::remove_file(tmp.path().join("t/green.png")).unwrap();
    let mut report = RunReport::default();
    let atlas = compile(&grid_rule(), tmp.path(), &ids(), &mut report).unwrap();

    assert_eq!(atlas.dimensions(), (32, 32));
    assert!(quadrant_is(&atlas, 16, 0, [0, 0, 0, 0]));
    assert!(quadrant_is(&atlas, 16, 16, YELLOW));
    assert_eq!(report.missing_files.len(), 1);
}

#[test]
fn grid_with_no_members_fails_that_atlas() {
    let tmp = tempfile::tempdir().unwrap();
    let mut report = RunReport::default();
    let err = compile(&grid_rule(), tmp.path(), &ids(), &mut report).unwrap_err();
    assert!(matches!(err, packsmith_core::PackError::EmptyAtlas(_)));
}

#[test]
fn deconstruct_round_trips_at_double_scale() {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("src");
    std::fs::create_dir_all(src.join("t")).unwrap();
    for (name, c) in [("red", RED), ("green", GREEN), ("blue", BLUE), ("yellow", YELLOW)] {
        solid_image(32, 32, c).save(src.join(format!("t/{name}.png"))).unwrap();
    }
    let ids = ids();
    let rule = grid_rule();
    let mut report = RunReport::default();
    let atlas = compile(&rule, &src, &ids, &mut report).unwrap();
    assert_eq!(atlas.dimensions(), (64, 64));

    let scale = atlas_scale_factor(&atlas, &rule, &ids);
    assert_eq!(scale, ScaleFactor { x: 2, y: 2 });

    let out = tmp.path().join("out");
    let parts = deconstruct(&rule, &atlas, &ids, scale, &out, &mut report).unwrap();
    assert_eq!(parts.len(), 4);
    let green = image::open(out.join("t/green.png")).unwrap().to_rgba8();
    assert_eq!(green, solid_image(32, 32, GREEN));
}
