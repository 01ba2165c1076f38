use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use tracing::{debug, info, warn};

use fdtd_core::Fingerprint;

use crate::error::{Result, StoreError};
use crate::filter::Filter;
use crate::record::ResultRecord;
use crate::schema::{self, RESULTS_TABLE};

/// Row listing without the array payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSummary {
    pub id: i64,
    pub name: String,
    pub fingerprint: String,
    pub active_monitors: String,
    pub created_at: String,
}

pub struct ResultStore {
    conn: Connection,
}

impl ResultStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
    fn in_transaction<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let tx = self.conn.unchecked_transaction()?;
        let conn: &Connection = &tx;
        match f(conn) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                warn!("rolling back: {e}");
                tx.rollback()?;
                Err(e)
            }
        }
    }

    // --- Lookup ---

    /// The record stored under `fingerprint`. Absence is not an error.
    pub fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Option<ResultRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT * FROM {RESULTS_TABLE} WHERE simulation_hash = ?1"
        ))?;
        let mut rows = stmt.query([fingerprint.as_str()])?;
        match rows.next()? {
            Some(row) => Ok(Some(ResultRecord::from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn get_by_id(&self, id: i64) -> Result<Option<ResultRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM {RESULTS_TABLE} WHERE id = ?1"))?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => Ok(Some(ResultRecord::from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Records for `ids` in id order. Unknown ids are skipped.
    pub fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<ResultRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT * FROM {RESULTS_TABLE} WHERE id IN ({}) ORDER BY id",
            placeholders.join(", ")
        ))?;
        let mut rows = stmt.query(params_from_iter(ids.iter()))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(ResultRecord::from_row(row)?);
        }
        Ok(records)
    }

    pub fn last_id(&self) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(&format!("SELECT MAX(id) FROM {RESULTS_TABLE}"), [], |row| {
                row.get(0)
            })?)
    }

    pub fn count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {RESULTS_TABLE}"), [], |row| {
                row.get(0)
            })?)
    }

    /// Database size in bytes.
    pub fn db_size(&self) -> Result<u64> {
        let pages: i64 = self.conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = self.conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
        Ok(u64::try_from(pages * page_size).unwrap_or(0))
    }

    // --- Filtered reads ---

    fn where_clause(filters: &[Filter]) -> String {
        if filters.is_empty() {
            return String::new();
        }
        let clauses: Vec<String> = filters
            .iter()
            .enumerate()
            .map(|(i, f)| f.clause(i + 1))
            .collect();
        format!(" WHERE {}", clauses.join(" AND "))
    }

    /// Records matching every filter, in id order.
    pub fn filtered_query(&self, filters: &[Filter]) -> Result<Vec<ResultRecord>> {
        let sql = format!(
            "SELECT * FROM {RESULTS_TABLE}{} ORDER BY id",
            Self::where_clause(filters)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(filters.iter().map(Filter::value)))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(ResultRecord::from_row(row)?);
        }
        Ok(records)
    }

    pub fn filtered_ids(&self, filters: &[Filter]) -> Result<Vec<i64>> {
        let sql = format!(
            "SELECT id FROM {RESULTS_TABLE}{} ORDER BY id",
            Self::where_clause(filters)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params_from_iter(filters.iter().map(Filter::value)), |row| {
                row.get(0)
            })?
            .collect::<std::result::Result<_, _>>()?;
        Ok(ids)
    }

    pub fn summaries(&self, filters: &[Filter]) -> Result<Vec<RecordSummary>> {
        let sql = format!(
            "SELECT id, simulation_name, simulation_hash, active_monitors, created_at
             FROM {RESULTS_TABLE}{} ORDER BY id",
            Self::where_clause(filters)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let summaries = stmt
            .query_map(params_from_iter(filters.iter().map(Filter::value)), |row| {
                Ok(RecordSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    fingerprint: row.get(2)?,
                    active_monitors: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<_, _>>()?;
        Ok(summaries)
    }

    // --- Writes ---

    /// Insert a new record and return its id. Fails if the fingerprint is
    /// already stored.
    pub fn insert(&self, record: &ResultRecord) -> Result<i64> {
        let columns = record.mutable_columns()?;
        let id = self.in_transaction(|conn| {
            let exists: Option<i64> = conn
                .query_row(
                    &format!("SELECT id FROM {RESULTS_TABLE} WHERE simulation_hash = ?1"),
                    [record.fingerprint.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                return Err(StoreError::DuplicateFingerprint(
                    record.fingerprint.to_string(),
                ));
            }

            let mut names = vec!["simulation_hash"];
            names.extend(columns.iter().map(|(name, _)| *name));
            let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "INSERT INTO {RESULTS_TABLE} ({}) VALUES ({})",
                names.join(", "),
                placeholders.join(", ")
            );

            let hash = rusqlite::types::Value::Text(record.fingerprint.to_string());
            let values = std::iter::once(&hash).chain(columns.iter().map(|(_, v)| v));
            conn.execute(&sql, params_from_iter(values))?;
            Ok(conn.last_insert_rowid())
        })?;
        info!("inserted record {id} for {}", record.fingerprint);
        Ok(id)
    }

    /// Rewrite every mutable column of a stored record in one transaction.
    pub fn update(&self, record: &ResultRecord) -> Result<()> {
        let id = record
            .id
            .ok_or_else(|| StoreError::InvalidData("cannot update a record without id".into()))?;
        let columns = record.mutable_columns()?;
        self.in_transaction(|conn| {
            let assignments: Vec<String> = columns
                .iter()
                .enumerate()
                .map(|(i, (name, _))| format!("{name} = ?{}", i + 1))
                .collect();
            let sql = format!(
                "UPDATE {RESULTS_TABLE} SET {} WHERE id = ?{} AND simulation_hash = ?{}",
                assignments.join(", "),
                columns.len() + 1,
                columns.len() + 2
            );
            let id_value = rusqlite::types::Value::Integer(id);
            let hash = rusqlite::types::Value::Text(record.fingerprint.to_string());
            let values = columns
                .iter()
                .map(|(_, v)| v)
                .chain([&id_value, &hash]);
            let changed = conn.execute(&sql, params_from_iter(values))?;
            if changed == 0 {
                return Err(StoreError::InvalidData(format!(
                    "no record {id} with fingerprint {}",
                    record.fingerprint
                )));
            }
            Ok(())
        })?;
        info!("updated record {id}, monitors now {}", record.active_monitors);
        Ok(())
    }

    /// Delete by id. A missing id is a logged no-op; returns whether a row
    /// was removed.
    pub fn delete_by_id(&self, id: i64) -> Result<bool> {
        let removed = self.in_transaction(|conn| {
            Ok(conn.execute(&format!("DELETE FROM {RESULTS_TABLE} WHERE id = ?1"), params![id])?)
        })?;
        if removed == 0 {
            warn!("no record with id {id} to delete");
            return Ok(false);
        }
        info!("deleted record {id}");
        Ok(true)
    }

    /// Index whitelisted columns. Returns the index names.
    pub fn index_columns(&self, columns: &[&str]) -> Result<Vec<String>> {
        self.in_transaction(|conn| {
            columns
                .iter()
                .map(|column| schema::create_column_index(conn, column))
                .collect()
        })
        .inspect(|names: &Vec<String>| debug!("indexes ready: {}", names.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdtd_core::{
        Comment, MonitorKind, MonitorSet, PowerResult, Resonance, ResultSet, SimulationParameters,
    };

    fn params(polarization: f32) -> SimulationParameters {
        SimulationParameters {
            polarization_angle: polarization,
            ..Default::default()
        }
    }

    fn record(polarization: f32) -> ResultRecord {
        let mut results = ResultSet::new();
        results.lambdas = Some(vec![400.0, 500.0, 600.0]);
        results.reflection_power = Some(PowerResult {
            powers: vec![0.1, 0.4, 0.2],
            resonance: Some(Resonance {
                wavelength: 500.0,
                value: 0.4,
            }),
        });
        ResultRecord::new("sweep", params(polarization), results, Comment::new("first", "pol"))
    }

    #[test]
    fn test_insert_and_find() {
        let store = ResultStore::open_in_memory().unwrap();
        let rec = record(0.0);
        let id = store.insert(&rec).unwrap();

        let found = store.find_by_fingerprint(&rec.fingerprint).unwrap().unwrap();
        assert_eq!(found.id, Some(id));
        assert_eq!(found.parameters, rec.parameters);
        assert_eq!(found.results, rec.results);
        assert_eq!(found.comment, Comment::new("first", "pol"));
        assert_eq!(
            found.active_monitors,
            MonitorSet::of(&[MonitorKind::ReflectionPower])
        );
        assert!(found.created_at.is_some());
    }

    #[test]
    fn test_missing_fingerprint_is_none() {
        let store = ResultStore::open_in_memory().unwrap();
        let fp = Fingerprint::of(&params(1.0));
        assert!(store.find_by_fingerprint(&fp).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let store = ResultStore::open_in_memory().unwrap();
        store.insert(&record(0.0)).unwrap();
        assert!(matches!(
            store.insert(&record(0.0)),
            Err(StoreError::DuplicateFingerprint(_))
        ));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_update_extends_record() {
        let store = ResultStore::open_in_memory().unwrap();
        let id = store.insert(&record(0.0)).unwrap();

        let mut stored = store.get_by_id(id).unwrap().unwrap();
        let mut fresh = ResultSet::new();
        fresh.transmission_power = Some(PowerResult {
            powers: vec![-0.9, -0.6, -0.8],
            resonance: None,
        });
        stored.extend(&fresh, MonitorSet::of(&[MonitorKind::TransmissionPower]));
        store.update(&stored).unwrap();

        let reread = store.get_by_id(id).unwrap().unwrap();
        assert_eq!(reread.active_monitors.len(), 2);
        assert_eq!(reread.results.transmission_power, fresh.transmission_power);
        assert_eq!(reread.results.reflection_power, record(0.0).results.reflection_power);
    }

    #[test]
    fn test_update_without_id_fails() {
        let store = ResultStore::open_in_memory().unwrap();
        assert!(store.update(&record(0.0)).is_err());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = ResultStore::open_in_memory().unwrap();
        let id = store.insert(&record(0.0)).unwrap();
        assert!(store.delete_by_id(id).unwrap());
        assert!(!store.delete_by_id(id).unwrap());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_ids_and_filters() {
        let store = ResultStore::open_in_memory().unwrap();
        for pol in [0.0, 45.0, 90.0] {
            store.insert(&record(pol)).unwrap();
        }
        assert_eq!(store.last_id().unwrap(), Some(3));

        let filters: Vec<Filter> = vec!["polarization_angle>=45".parse().unwrap()];
        assert_eq!(store.filtered_ids(&filters).unwrap(), vec![2, 3]);
        let records = store.filtered_query(&filters).unwrap();
        assert_eq!(records[0].parameters.polarization_angle, 45.0);

        let both: Vec<Filter> = vec![
            "polarization_angle>=45".parse().unwrap(),
            "polarization_angle!=90".parse().unwrap(),
        ];
        assert_eq!(store.filtered_ids(&both).unwrap(), vec![2]);

        let picked = store.get_by_ids(&[3, 1, 99]).unwrap();
        let ids: Vec<_> = picked.iter().filter_map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3]);

        let summaries = store.summaries(&[]).unwrap();
        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[0].active_monitors, "ref_power_monitor");
    }

    #[test]
    fn test_stats_helpers() {
        let store = ResultStore::open_in_memory().unwrap();
        assert_eq!(store.last_id().unwrap(), None);
        assert!(store.db_size().unwrap() > 0);
        let names = store
            .index_columns(&["polarization_angle", "incidence_angle"])
            .unwrap();
        assert_eq!(names.len(), 2);
        assert!(store.index_columns(&["lambdas"]).is_err());
    }
}
