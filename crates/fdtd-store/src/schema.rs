use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 1;

pub const RESULTS_TABLE: &str = "simulation_results";

/// Scalar columns that may appear in filters and on which indexes may be
/// created. Anything else is rejected before it reaches SQL.
pub const FILTER_COLUMNS: &[&str] = &[
    "id",
    "simulation_name",
    "simulation_hash",
    "created_at",
    "active_monitors",
    "comment",
    "structure_1_x_span",
    "structure_1_y_span",
    "structure_1_z_span",
    "structure_1_material",
    "structure_2_x_span",
    "structure_2_y_span",
    "structure_2_z_span",
    "structure_2_material",
    "structure_3_x_span",
    "structure_3_y_span",
    "structure_3_z_span",
    "structure_3_material",
    "unit_cell_1_x",
    "unit_cell_1_y",
    "unit_cell_2_x",
    "unit_cell_2_y",
    "unit_cell_3_x",
    "unit_cell_3_y",
    "edge_mesh_1_size",
    "edge_mesh_1_step",
    "edge_mesh_2_size",
    "edge_mesh_2_step",
    "edge_mesh_3_size",
    "edge_mesh_3_step",
    "polarization_angle",
    "incidence_angle",
    "fdtd_x_span",
    "fdtd_y_span",
    "fdtd_z_span",
    "mesh_dx",
    "mesh_dy",
    "mesh_dz",
    "wavelength_start",
    "wavelength_stop",
    "frequency_points",
    "boundary_conditions",
    "film_thickness",
    "ref_power_res_lambda",
    "ref_power_res",
    "trans_power_res_lambda",
    "trans_power_res",
    "ref_profile_distance",
    "ref_mag_res_lambda",
    "ref_mag_res",
    "trans_profile_distance",
    "trans_mag_res_lambda",
    "trans_mag_res",
];

pub fn is_filter_column(name: &str) -> bool {
    FILTER_COLUMNS.contains(&name)
}

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    conn.pragma_update(None, "wal_autocheckpoint", 100)?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS simulation_results (
            id                      INTEGER PRIMARY KEY AUTOINCREMENT,
            simulation_name         TEXT NOT NULL,
            simulation_hash         TEXT NOT NULL UNIQUE,
            created_at              TEXT NOT NULL DEFAULT (datetime('now')),
            active_monitors         TEXT NOT NULL DEFAULT '',
            comment                 TEXT NOT NULL DEFAULT '',

            structure_1_x_span      REAL,
            structure_1_y_span      REAL,
            structure_1_z_span      REAL,
            structure_1_material    TEXT,
            structure_2_x_span      REAL,
            structure_2_y_span      REAL,
            structure_2_z_span      REAL,
            structure_2_material    TEXT,
            structure_3_x_span      REAL,
            structure_3_y_span      REAL,
            structure_3_z_span      REAL,
            structure_3_material    TEXT,
            unit_cell_1_x           REAL,
            unit_cell_1_y           REAL,
            unit_cell_2_x           REAL,
            unit_cell_2_y           REAL,
            unit_cell_3_x           REAL,
            unit_cell_3_y           REAL,
            edge_mesh_1_size        REAL,
            edge_mesh_1_step        REAL,
            edge_mesh_2_size        REAL,
            edge_mesh_2_step        REAL,
            edge_mesh_3_size        REAL,
            edge_mesh_3_step        REAL,
            polarization_angle      REAL NOT NULL,
            incidence_angle         REAL NOT NULL,
            fdtd_x_span             REAL NOT NULL,
            fdtd_y_span             REAL NOT NULL,
            fdtd_z_span             REAL NOT NULL,
            mesh_dx                 REAL NOT NULL,
            mesh_dy                 REAL NOT NULL,
            mesh_dz                 REAL NOT NULL,
            wavelength_start        REAL NOT NULL,
            wavelength_stop         REAL NOT NULL,
            frequency_points        INTEGER NOT NULL,
            boundary_conditions     TEXT NOT NULL,
            film_thickness          REAL,

            lambdas                 BLOB,
            ref_powers              BLOB,
            ref_power_res_lambda    REAL,
            ref_power_res           REAL,
            trans_powers            BLOB,
            trans_power_res_lambda  REAL,
            trans_power_res         REAL,

            ref_profile_x           BLOB,
            ref_profile_y           BLOB,
            ref_profile_distance    REAL,
            ref_profile_vectors     BLOB,
            ref_mag_max_pr_lambda   BLOB,
            ref_mag_res_lambda      REAL,
            ref_mag_res             REAL,
            trans_profile_x         BLOB,
            trans_profile_y         BLOB,
            trans_profile_distance  REAL,
            trans_profile_vectors   BLOB,
            trans_mag_max_pr_lambda BLOB,
            trans_mag_res_lambda    REAL,
            trans_mag_res           REAL,

            xz_profile_e_vectors    BLOB,
            xz_profile_p_vectors    BLOB,
            xz_profile_x_coord      BLOB,
            xz_profile_z_coord      BLOB,
            yz_profile_e_vectors    BLOB,
            yz_profile_p_vectors    BLOB,
            yz_profile_y_coord      BLOB,
            yz_profile_z_coord      BLOB
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_results_hash ON simulation_results(simulation_hash);
        CREATE INDEX IF NOT EXISTS idx_results_name ON simulation_results(simulation_name);
        CREATE INDEX IF NOT EXISTS idx_results_material
            ON simulation_results(structure_1_material);
        ",
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;
    tracing::debug!("schema initialized at version {SCHEMA_VERSION}");

    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let mut stmt = conn.prepare("SELECT value FROM metadata WHERE key = 'schema_version'")?;
    let version = stmt
        .query_row([], |row| {
            let v: String = row.get(0)?;
            Ok(v.parse::<i64>().unwrap_or(0))
        })
        .ok();
    Ok(version)
}

/// Create an index on a whitelisted column. Returns the index name.
pub fn create_column_index(conn: &Connection, column: &str) -> Result<String> {
    if !is_filter_column(column) {
        return Err(crate::error::StoreError::InvalidData(format!(
            "cannot index unknown column {column:?}"
        )));
    }
    let index = format!("idx_results_{column}");
    conn.execute_batch(&format!(
        "CREATE INDEX IF NOT EXISTS {index} ON {RESULTS_TABLE}({column});"
    ))?;
    Ok(index)
}
