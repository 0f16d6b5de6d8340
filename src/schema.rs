use rusqlite::{Connection, Error};

pub fn create_schema(conn: &Connection) -> Result<(), Error> {
    conn.execute(
        "CREATE TABLE metadata (
          name TEXT,
          value TEXT,
          UNIQUE(name)
        )",
        (),
    )?;

    conn.execute(
        "CREATE TABLE tiles (
          zoom_level INTEGER,
          tile_column INTEGER,
          tile_row INTEGER,
          tile_data BLOB
        )",
        (),
    )?;

    conn.execute(
        "CREATE UNIQUE INDEX tile_index ON tiles (zoom_level, tile_column, tile_row)",
        (),
    )?;

    Ok(())
}
