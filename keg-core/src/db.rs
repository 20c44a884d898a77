//! Metadata database
//!
//! A small relational index over every PSV response ever fetched: one
//! `responses` journal plus one table per recognized PSV schema. Rows keep
//! their original row index so iteration order is stable, and `(remote,
//! path)` histories are append-only with the newest timestamp winning.

use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use tracing::debug;

use keg_psv::PsvDocument;

use crate::{Error, Result};

const TABLE_DEFINITIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS "responses" (
        remote text,
        path text,
        timestamp int64,
        digest text,
        source int
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS "blobs" (
        remote text,
        key text,
        row int,
        Region text,
        InstallBlobMD5 text,
        GameBlobMD5 text
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS "cdns" (
        remote text,
        key text,
        row int,
        Name text,
        Path text,
        Hosts text,
        Servers text,
        ConfigPath text
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS "versions" (
        remote text,
        key text,
        row int,
        BuildConfig text,
        BuildID int,
        CDNConfig text,
        KeyRing text,
        ProductConfig text,
        Region text,
        VersionsName text
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS "bgdl" (
        remote text,
        key text,
        row int,
        BuildConfig text,
        BuildID int,
        CDNConfig text,
        KeyRing text,
        ProductConfig text,
        Region text,
        VersionsName text
    )"#,
];

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Http = 1,
    Ribbit = 2,
}

/// The SQLite-backed metadata index. Single connection, serialized writes.
pub struct KegDb {
    conn: Mutex<Connection>,
}

impl KegDb {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open(path)?),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    pub fn create_tables(&self) -> Result<()> {
        let conn = self.conn.lock();
        for statement in TABLE_DEFINITIONS {
            conn.execute(statement, [])?;
        }
        Ok(())
    }

    /// Journal one fetched response.
    pub fn write_response(
        &self,
        remote: &str,
        path: &str,
        timestamp: i64,
        digest: &str,
        source: ResponseSource,
    ) -> Result<()> {
        self.conn.lock().execute(
            r#"
            INSERT INTO "responses" (remote, path, timestamp, digest, source)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            (remote, path, timestamp, digest, source as i64),
        )?;
        Ok(())
    }

    /// The digest of the newest response for `(remote, path)`.
    pub fn get_response_key(&self, remote: &str, path: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT digest FROM responses
            WHERE remote = ?1 AND path = ?2
            ORDER BY timestamp DESC, rowid DESC
            LIMIT 1
            "#,
        )?;
        let mut rows = stmt.query((remote, path))?;
        Ok(rows.next()?.map(|row| row.get(0)).transpose()?)
    }

    /// All `(digest, timestamp)` pairs for `(remote, path)`, oldest first.
    pub fn get_responses(&self, remote: &str, path: &str) -> Result<Vec<(String, i64)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT digest, timestamp FROM responses
            WHERE remote = ?1 AND path = ?2
            ORDER BY timestamp, rowid
            "#,
        )?;
        let rows = stmt
            .query_map((remote, path), |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Replace the rows of one PSV response in its schema table.
    ///
    /// Rows are keyed by `(remote, key)` where `key` is the response digest;
    /// re-inserting the same response is idempotent. Hex-typed columns are
    /// lowercased on the way in.
    pub fn write_psv(
        &self,
        doc: &PsvDocument,
        key: &str,
        remote: &str,
        path: &str,
    ) -> Result<()> {
        let table = table_for_path(path)?;
        let columns: Vec<&str> = doc.schema().clean_names();
        for column in &columns {
            validate_column_name(column)?;
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        tx.execute(
            &format!(r#"DELETE FROM "{table}" WHERE remote = ?1 AND key = ?2"#),
            (remote, key),
        )?;

        let placeholders: Vec<String> =
            (1..=columns.len() + 3).map(|i| format!("?{i}")).collect();
        let insert = format!(
            r#"INSERT INTO "{table}" (remote, key, row, {}) VALUES ({})"#,
            columns.join(", "),
            placeholders.join(", "),
        );

        {
            let mut stmt = tx.prepare(&insert)?;
            let hex_columns: Vec<bool> = doc
                .schema()
                .fields()
                .iter()
                .map(|f| f.field_type.is_some_and(|t| t.is_hex()))
                .collect();

            for (i, row) in doc.rows().iter().enumerate() {
                let mut params: Vec<rusqlite::types::Value> = Vec::with_capacity(columns.len() + 3);
                params.push(remote.to_string().into());
                params.push(key.to_string().into());
                params.push((i as i64).into());
                for (cell, &is_hex) in row.values().iter().zip(&hex_columns) {
                    let cell = if is_hex {
                        cell.to_ascii_lowercase()
                    } else {
                        cell.clone()
                    };
                    params.push(cell.into());
                }
                stmt.execute(rusqlite::params_from_iter(params))?;
            }
        }

        tx.commit()?;
        debug!("wrote {} {table} rows for {remote}", doc.row_count());
        Ok(())
    }

    /// Distinct `(BuildConfig, CDNConfig)` pairs, optionally per remote.
    pub fn get_build_configs(&self, remote: Option<&str>) -> Result<Vec<(String, String)>> {
        let conn = self.conn.lock();
        let map = |row: &rusqlite::Row<'_>| Ok((row.get(0)?, row.get(1)?));

        let rows = if let Some(remote) = remote {
            let mut stmt = conn.prepare(
                r#"
                SELECT DISTINCT BuildConfig, CDNConfig FROM versions
                WHERE remote = ?1
                GROUP BY BuildConfig
                "#,
            )?;
            let rows = stmt.query_map([remote], map)?.collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        } else {
            let mut stmt = conn.prepare(
                r#"
                SELECT DISTINCT BuildConfig, CDNConfig FROM versions
                GROUP BY BuildConfig
                "#,
            )?;
            let rows = stmt.query_map([], map)?.collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };
        Ok(rows)
    }

    /// Distinct CDN configs over a set of remotes (all remotes when empty).
    pub fn get_cdn_configs(&self, remotes: &[String]) -> Result<Vec<String>> {
        let conn = self.conn.lock();

        let rows = if remotes.is_empty() {
            let mut stmt = conn.prepare(
                r#"
                SELECT DISTINCT CDNConfig FROM versions
                GROUP BY CDNConfig ORDER BY CDNConfig
                "#,
            )?;
            let rows = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        } else {
            let placeholders: Vec<String> =
                (1..=remotes.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                r#"
                SELECT DISTINCT CDNConfig FROM versions
                WHERE remote IN ({})
                GROUP BY CDNConfig ORDER BY CDNConfig
                "#,
                placeholders.join(", ")
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(remotes), |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };
        Ok(rows)
    }

    /// `(BuildConfig, BuildID, VersionsName)` for a remote, ascending by
    /// build id.
    pub fn get_versions(&self, remote: &str) -> Result<Vec<(String, String, String)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT DISTINCT BuildConfig, BuildID, VersionsName FROM versions
            WHERE remote = ?1
            ORDER BY BuildID ASC
            "#,
        )?;
        let rows = stmt
            .query_map([remote], |row| {
                Ok((
                    row.get(0)?,
                    row.get::<_, i64>(1).map(|v| v.to_string()).or_else(|_| row.get(1))?,
                    row.get(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Resolve a user-supplied version to its `(BuildConfig, CDNConfig)`.
    ///
    /// `version` may be a VersionsName, a BuildID or a BuildConfig. Only
    /// BuildConfig is guaranteed unambiguous; anything matching several
    /// builds fails with the candidate list.
    pub fn find_version(&self, remote: &str, version: &str) -> Result<(String, String)> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT DISTINCT BuildConfig, CDNConfig FROM versions
            WHERE remote = ?1
              AND (VersionsName = ?2 OR BuildID = ?2 OR BuildConfig = ?2)
            GROUP BY BuildConfig
            "#,
        )?;
        let results: Vec<(String, String)> = stmt
            .query_map((remote, version), |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        match results.len() {
            0 => Err(Error::VersionNotFound {
                version: version.to_string(),
            }),
            1 => Ok(results.into_iter().next().unwrap_or_default()),
            _ => {
                let mut hints: Vec<String> =
                    results.into_iter().map(|(build, _)| build).collect();
                hints.sort();
                hints.dedup();
                Err(Error::AmbiguousVersion {
                    version: version.to_string(),
                    hints,
                })
            }
        }
    }
}

fn table_for_path(path: &str) -> Result<&'static str> {
    match path.trim_matches('/') {
        "versions" => Ok("versions"),
        "cdns" => Ok("cdns"),
        "bgdl" => Ok("bgdl"),
        "blobs" => Ok("blobs"),
        _ => Err(Error::UnknownPsvTable {
            path: path.to_string(),
        }),
    }
}

fn validate_column_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidColumnName {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERSIONS_PSV: &str = "\
Region!STRING:0|BuildConfig!HEX:16|CDNConfig!HEX:16|KeyRing!HEX:16|BuildId!DEC:4|VersionsName!String:0|ProductConfig!HEX:16
us|4EB3986466EC004FFA1755642B375A87|fb445ca0526699c61a92830ab894a985||27291|8.0.1.27291|19a26886b5b1c264de1177ae6aa7fbf5
eu|4eb3986466ec004ffa1755642b375a87|fb445ca0526699c61a92830ab894a985||27291|8.0.1.27291|19a26886b5b1c264de1177ae6aa7fbf5
";

    fn db() -> KegDb {
        let db = KegDb::open_in_memory().unwrap();
        db.create_tables().unwrap();
        db
    }

    #[test]
    fn test_create_tables() {
        let db = db();
        let conn = db.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type = 'table'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 5);
    }

    #[test]
    fn test_write_and_read_responses() {
        let db = db();
        db.write_response("r", "versions", 100, "aaaa", ResponseSource::Http)
            .unwrap();
        db.write_response("r", "versions", 200, "bbbb", ResponseSource::Ribbit)
            .unwrap();

        assert_eq!(
            db.get_response_key("r", "versions").unwrap(),
            Some("bbbb".to_string())
        );
        assert_eq!(db.get_response_key("r", "cdns").unwrap(), None);
        assert_eq!(
            db.get_responses("r", "versions").unwrap(),
            vec![("aaaa".to_string(), 100), ("bbbb".to_string(), 200)]
        );
    }

    #[test]
    fn test_response_timestamp_ties_break_by_insertion() {
        let db = db();
        db.write_response("r", "versions", 100, "first", ResponseSource::Http)
            .unwrap();
        db.write_response("r", "versions", 100, "second", ResponseSource::Http)
            .unwrap();
        assert_eq!(
            db.get_response_key("r", "versions").unwrap(),
            Some("second".to_string())
        );
    }

    #[test]
    fn test_write_psv_and_queries() {
        let db = db();
        let doc = keg_psv::PsvDocument::parse(VERSIONS_PSV).unwrap();
        db.write_psv(&doc, "digest1", "r", "versions").unwrap();

        // Hex columns are lowercased on insert.
        let builds = db.get_build_configs(Some("r")).unwrap();
        assert_eq!(
            builds,
            vec![(
                "4eb3986466ec004ffa1755642b375a87".to_string(),
                "fb445ca0526699c61a92830ab894a985".to_string()
            )]
        );
        assert!(db.get_build_configs(Some("other")).unwrap().is_empty());

        let cdns = db.get_cdn_configs(&["r".to_string()]).unwrap();
        assert_eq!(cdns, vec!["fb445ca0526699c61a92830ab894a985".to_string()]);

        let versions = db.get_versions("r").unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].1, "27291");
        assert_eq!(versions[0].2, "8.0.1.27291");

        // Idempotent per (remote, digest).
        db.write_psv(&doc, "digest1", "r", "versions").unwrap();
        assert_eq!(db.get_versions("r").unwrap().len(), 1);
    }

    #[test]
    fn test_find_version() {
        let db = db();
        let doc = keg_psv::PsvDocument::parse(VERSIONS_PSV).unwrap();
        db.write_psv(&doc, "digest1", "r", "versions").unwrap();

        let expected = (
            "4eb3986466ec004ffa1755642b375a87".to_string(),
            "fb445ca0526699c61a92830ab894a985".to_string(),
        );
        assert_eq!(db.find_version("r", "8.0.1.27291").unwrap(), expected);
        assert_eq!(db.find_version("r", "27291").unwrap(), expected);
        assert_eq!(
            db.find_version("r", "4eb3986466ec004ffa1755642b375a87")
                .unwrap(),
            expected
        );

        assert!(matches!(
            db.find_version("r", "nope"),
            Err(Error::VersionNotFound { .. })
        ));
        // The remote filter applies to every match arm.
        assert!(matches!(
            db.find_version("other", "27291"),
            Err(Error::VersionNotFound { .. })
        ));
    }

    #[test]
    fn test_find_version_ambiguous() {
        let db = db();
        let doc = keg_psv::PsvDocument::parse(
            "Region!STRING:0|BuildConfig!HEX:16|CDNConfig!HEX:16|KeyRing!HEX:16|BuildId!DEC:4|VersionsName!String:0|ProductConfig!HEX:16\n\
             us|aaaa|cccc||100|1.0.0.100|\n\
             eu|bbbb|cccc||100|1.0.0.100|",
        )
        .unwrap();
        db.write_psv(&doc, "digest1", "r", "versions").unwrap();

        match db.find_version("r", "1.0.0.100") {
            Err(Error::AmbiguousVersion { hints, .. }) => {
                assert_eq!(hints, vec!["aaaa".to_string(), "bbbb".to_string()]);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn test_write_psv_unknown_table() {
        let db = db();
        let doc = keg_psv::PsvDocument::parse("A!STRING:0\nx").unwrap();
        assert!(matches!(
            db.write_psv(&doc, "d", "r", "certs"),
            Err(Error::UnknownPsvTable { .. })
        ));
    }

    #[test]
    fn test_write_psv_rejects_bad_column() {
        let db = db();
        let doc = keg_psv::PsvDocument::parse("Bad Column!STRING:0\nx").unwrap();
        assert!(matches!(
            db.write_psv(&doc, "d", "r", "versions"),
            Err(Error::InvalidColumnName { .. })
        ));
    }
}
