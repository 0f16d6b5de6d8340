use pretty_assertions::assert_eq;
use rusqlite::Connection;
use std::{fs, path::Path};
use tempfile::TempDir;
use tilepack::{pack, PackConfig, TileFormat};

fn zxy_tree(files: &[&str]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();

    for file in files {
        let path = dir.path().join("tiles").join(file);

        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, format!("tile {file}")).unwrap();
    }

    dir
}

fn metadata_value(archive: &Path, name: &str) -> String {
    Connection::open(archive)
        .unwrap()
        .query_row("SELECT value FROM metadata WHERE name = ?1", [name], |row| row.get(0))
        .unwrap()
}

#[test]
fn packs_two_zoom_levels() {
    let dir = zxy_tree(&["0/0/0.png", "1/0/0.png", "1/0/1.png", "1/1/0.png", "1/1/1.png"]);
    let archive = dir.path().join("tiles.mbtiles");

    let config = PackConfig {
        name: "T".to_string(),
        format: TileFormat::Png,
        batch_size: 2,
        ..Default::default()
    };

    let summary = pack(&dir.path().join("tiles"), &archive, &config).unwrap();

    assert_eq!(summary.written, 5);
    assert_eq!(summary.batches, 3);
    assert!(summary.is_complete());

    let conn = Connection::open(&archive).unwrap();

    let count: u32 = conn
        .query_row("SELECT COUNT(*) FROM tiles", [], |row| row.get(0))
        .unwrap();

    assert_eq!(count, 5);

    let zoom0_row: u32 = conn
        .query_row(
            "SELECT tile_row FROM tiles WHERE zoom_level = 0 AND tile_column = 0",
            [],
            |row| row.get(0),
        )
        .unwrap();

    assert_eq!(zoom0_row, 0);

    let north_west: Vec<u8> = conn
        .query_row(
            "SELECT tile_data FROM tiles WHERE zoom_level = 1 AND tile_column = 0 AND tile_row = 1",
            [],
            |row| row.get(0),
        )
        .unwrap();

    assert_eq!(north_west, b"tile 1/0/0.png".to_vec());

    assert_eq!(metadata_value(&archive, "format"), "png");
    assert_eq!(metadata_value(&archive, "name"), "T");
    assert_eq!(metadata_value(&archive, "minzoom"), "0");
    assert_eq!(metadata_value(&archive, "maxzoom"), "1");
}

#[test]
fn repacking_unchanged_tree_gives_identical_rows() {
    let dir = zxy_tree(&["2/0/3.webp", "2/1/1.webp", "3/7/0.webp", "3/4/4.webp"]);
    let tiles = dir.path().join("tiles");

    let config = PackConfig {
        format: TileFormat::Webp,
        batch_size: 3,
        ..Default::default()
    };

    let read_rows = |archive: &Path| -> Vec<(u8, u32, u32, Vec<u8>)> {
        let conn = Connection::open(archive).unwrap();

        let mut stmt = conn
            .prepare("SELECT zoom_level, tile_column, tile_row, tile_data FROM tiles ORDER BY 1, 2, 3")
            .unwrap();

        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
            .unwrap()
            .map(|row| row.unwrap())
            .collect()
    };

    let first = dir.path().join("first.mbtiles");
    let second = dir.path().join("second.mbtiles");

    pack(&tiles, &first, &config).unwrap();
    pack(&tiles, &second, &config).unwrap();

    assert_eq!(read_rows(&first), read_rows(&second));
    assert_eq!(read_rows(&first).len(), 4);
}
