//! SQLite-backed catalog.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use super::{Catalog, CatalogRecord, DerivedFile, DirectoryFilter, NewRecord, RecordId};
use crate::error::Result;
use crate::paths;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    guid TEXT NOT NULL,
    title TEXT NOT NULL,
    mime_type TEXT,
    primary_path TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_guid ON records(guid);
CREATE INDEX IF NOT EXISTS idx_records_path ON records(primary_path);

CREATE TABLE IF NOT EXISTS derived_files (
    record_id INTEGER NOT NULL REFERENCES records(id) ON DELETE CASCADE,
    suffix TEXT NOT NULL,
    file TEXT NOT NULL,
    width INTEGER NOT NULL,
    height INTEGER NOT NULL,
    PRIMARY KEY (record_id, suffix)
);

CREATE INDEX IF NOT EXISTS idx_derived_file ON derived_files(file);
"#;

/// Record selection below a prefix, compared with `substr` so `%` and `_` in directory names
/// need no escaping.
const UNDER_PREFIX: &str = "substr(primary_path, 1, length(?1)) = ?1";
const DIRECTLY_IN: &str = "substr(primary_path, 1, length(?1)) = ?1 \
     AND length(primary_path) > length(?1) \
     AND instr(substr(primary_path, length(?1) + 1), '/') = 0";

/// Catalog stored in a single SQLite database.
///
/// Thread-safe via a mutex around the connection.
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
}

impl SqliteCatalog {
    /// Open (or create) the catalog database at `db_path`.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::init(conn)
    }

    /// Open a private in-memory catalog.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load_derived(conn: &Connection, id: RecordId) -> Result<Vec<DerivedFile>> {
        let mut stmt = conn.prepare_cached(
            "SELECT suffix, file, width, height FROM derived_files WHERE record_id = ?1 ORDER BY suffix",
        )?;
        let rows = stmt.query_map(params![id], |row| {
            Ok(DerivedFile {
                suffix: row.get(0)?,
                file: row.get(1)?,
                width: row.get(2)?,
                height: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn record_from_row(row: &Row<'_>) -> rusqlite::Result<CatalogRecord> {
        Ok(CatalogRecord {
            id: row.get(0)?,
            guid: row.get(1)?,
            title: row.get(2)?,
            mime_type: row.get(3)?,
            primary_path: row.get(4)?,
            derived: Vec::new(),
        })
    }

    fn query_records(&self, clause: &str, prefix: &str) -> Result<Vec<CatalogRecord>> {
        let conn = self.lock();
        let sql = format!(
            "SELECT id, guid, title, mime_type, primary_path FROM records WHERE {} ORDER BY id",
            clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut records = stmt
            .query_map(params![prefix], Self::record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for record in &mut records {
            record.derived = Self::load_derived(&conn, record.id)?;
        }
        Ok(records)
    }
}

impl Catalog for SqliteCatalog {
    fn get(&self, id: RecordId) -> Result<Option<CatalogRecord>> {
        let conn = self.lock();
        let record = conn
            .query_row(
                "SELECT id, guid, title, mime_type, primary_path FROM records WHERE id = ?1",
                params![id],
                Self::record_from_row,
            )
            .optional()?;
        match record {
            Some(mut record) => {
                record.derived = Self::load_derived(&conn, id)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn records_under(&self, dir: &str) -> Result<Vec<CatalogRecord>> {
        self.query_records(UNDER_PREFIX, DirectoryFilter::new(dir).prefix())
    }

    fn records_in(&self, dir: &str) -> Result<Vec<CatalogRecord>> {
        self.query_records(DIRECTLY_IN, DirectoryFilter::new(dir).prefix())
    }

    fn count_under(&self, dir: &str) -> Result<usize> {
        let conn = self.lock();
        let sql = format!("SELECT count(*) FROM records WHERE {}", UNDER_PREFIX);
        let count: i64 = conn.query_row(&sql, params![DirectoryFilter::new(dir).prefix()], |row| {
            row.get(0)
        })?;
        Ok(count as usize)
    }

    fn insert(&self, record: NewRecord) -> Result<RecordId> {
        let primary_path = paths::normalize(&record.primary_path);
        let conn = self.lock();
        conn.execute(
            "INSERT INTO records (guid, title, mime_type, primary_path) VALUES (?1, ?2, ?3, ?4)",
            params![record.guid, record.title, record.mime_type, primary_path],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, path = %primary_path, "catalog record inserted");
        Ok(id)
    }

    fn set_primary_path(&self, id: RecordId, primary_path: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE records SET primary_path = ?2 WHERE id = ?1",
            params![id, paths::normalize(primary_path)],
        )?;
        Ok(())
    }

    fn set_derived(&self, id: RecordId, derived: &[DerivedFile]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM derived_files WHERE record_id = ?1", params![id])?;
        for file in derived {
            tx.execute(
                "INSERT INTO derived_files (record_id, suffix, file, width, height) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, file.suffix, file.file, file.width, file.height],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn references_file(&self, guid: &str, primary_path: &str) -> Result<bool> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT count(*) FROM records WHERE guid = ?1 OR primary_path = ?2",
            params![guid, paths::normalize(primary_path)],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn references_derived(&self, dir: &str, filename: &str) -> Result<bool> {
        let conn = self.lock();
        let sql = format!(
            "SELECT count(*) FROM derived_files d JOIN records r ON r.id = d.record_id \
             WHERE d.file = ?2 AND r.id IN (SELECT id FROM records WHERE {})",
            DIRECTLY_IN
        );
        let count: i64 = conn.query_row(
            &sql,
            params![DirectoryFilter::new(dir).prefix(), filename],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths;

    fn record(path: &str) -> NewRecord {
        NewRecord {
            guid: format!("http://localhost/uploads/{}", path),
            title: paths::basename(path).to_string(),
            mime_type: Some("image/jpeg".into()),
            primary_path: path.to_string(),
        }
    }

    fn thumb(file: &str) -> DerivedFile {
        DerivedFile {
            suffix: "thumbnail".into(),
            file: file.into(),
            width: 150,
            height: 150,
        }
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let id = catalog.insert(record("a/cat.jpg")).unwrap();
        catalog.set_derived(id, &[thumb("cat-150x150.jpg")]).unwrap();

        let loaded = catalog.get(id).unwrap().unwrap();
        assert_eq!(loaded.primary_path, "a/cat.jpg");
        assert_eq!(loaded.derived, vec![thumb("cat-150x150.jpg")]);
        assert!(catalog.get(id + 100).unwrap().is_none());
    }

    #[test]
    fn records_under_matches_on_separator_boundary() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        catalog.insert(record("a/file.jpg")).unwrap();
        catalog.insert(record("a/x/deep.jpg")).unwrap();
        catalog.insert(record("ab/file.jpg")).unwrap();

        let under: Vec<String> = catalog
            .records_under("a")
            .unwrap()
            .into_iter()
            .map(|r| r.primary_path)
            .collect();
        assert_eq!(under, vec!["a/file.jpg", "a/x/deep.jpg"]);
        assert_eq!(catalog.count_under("a").unwrap(), 2);
        assert_eq!(catalog.count_under("ab").unwrap(), 1);
        assert_eq!(catalog.count_under(paths::ROOT_ID).unwrap(), 3);
    }

    #[test]
    fn slash_prefixed_paths_and_dirs_are_canonical() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let id = catalog.insert(record("/a/x.jpg")).unwrap();
        assert_eq!(catalog.get(id).unwrap().unwrap().primary_path, "a/x.jpg");
        assert_eq!(catalog.count_under("/a").unwrap(), 1);
        assert_eq!(catalog.count_under("a/").unwrap(), 1);
        assert_eq!(catalog.records_in("/a").unwrap().len(), 1);

        catalog.set_primary_path(id, "/z/x.jpg").unwrap();
        assert_eq!(catalog.count_under("z").unwrap(), 1);
        assert!(catalog.references_file("none", "/z/x.jpg").unwrap());
    }

    #[test]
    fn records_in_lists_direct_children() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        catalog.insert(record("top.jpg")).unwrap();
        catalog.insert(record("a/file.jpg")).unwrap();
        catalog.insert(record("a/x/deep.jpg")).unwrap();

        let in_a: Vec<String> = catalog
            .records_in("a")
            .unwrap()
            .into_iter()
            .map(|r| r.primary_path)
            .collect();
        assert_eq!(in_a, vec!["a/file.jpg"]);

        let in_root: Vec<String> = catalog
            .records_in(paths::ROOT_ID)
            .unwrap()
            .into_iter()
            .map(|r| r.primary_path)
            .collect();
        assert_eq!(in_root, vec!["top.jpg"]);
    }

    #[test]
    fn prefix_with_like_wildcards_is_literal() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        catalog.insert(record("50%_off/a.jpg")).unwrap();
        catalog.insert(record("50xyoff/a.jpg")).unwrap();
        assert_eq!(catalog.count_under("50%_off").unwrap(), 1);
    }

    #[test]
    fn set_primary_path_updates_record() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let id = catalog.insert(record("a/cat.jpg")).unwrap();
        catalog.set_primary_path(id, "z/cat.jpg").unwrap();
        assert_eq!(catalog.get(id).unwrap().unwrap().primary_path, "z/cat.jpg");
        assert_eq!(catalog.count_under("a").unwrap(), 0);
    }

    #[test]
    fn references_by_guid_or_path() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let id = catalog.insert(record("a/cat.jpg")).unwrap();
        assert!(catalog
            .references_file("http://localhost/uploads/a/cat.jpg", "nope")
            .unwrap());

        // After a move the guid is stale but the path still matches.
        catalog.set_primary_path(id, "b/cat.jpg").unwrap();
        assert!(catalog
            .references_file("http://localhost/uploads/b/cat.jpg", "b/cat.jpg")
            .unwrap());
        assert!(!catalog
            .references_file("http://localhost/uploads/c/cat.jpg", "c/cat.jpg")
            .unwrap());
    }

    #[test]
    fn references_derived_scoped_to_directory() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let id = catalog.insert(record("a/cat.jpg")).unwrap();
        catalog.set_derived(id, &[thumb("cat-150x150.jpg")]).unwrap();

        assert!(catalog.references_derived("a", "cat-150x150.jpg").unwrap());
        assert!(!catalog.references_derived("b", "cat-150x150.jpg").unwrap());
        assert!(!catalog.references_derived("a", "dog-150x150.jpg").unwrap());
    }
}
