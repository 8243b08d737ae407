//! Write path: one staging database per run, published on commit.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use tracing::{debug, info, warn};

use super::schema::{create_schema_sql, insert_sql, kind_columns, ColumnType};
use super::{configure_connection, DatabaseLocation, Result, RunMetadata, StorageError};
use crate::entity::{Entity, EntityKind, FileEntities};

/// Creates run databases.
#[derive(Debug, Clone, Default)]
pub struct StorageEngine;

impl StorageEngine {
    pub fn new() -> Self {
        Self
    }

    /// Start writing the database for one run.
    ///
    /// Nothing is visible at `location` until [`RunWriter::commit`].
    pub fn begin_run(&self, location: &DatabaseLocation) -> Result<RunWriter> {
        if let Some(parent) = location.path().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let staging = location.staging_path();

        let conn = Connection::open(&staging)?;
        configure_connection(&conn)?;
        conn.execute_batch(&create_schema_sql())?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        debug!("Staging run database at {}", staging.display());

        let insert = EntityKind::ALL
            .into_iter()
            .map(|kind| (kind, insert_sql(kind)))
            .collect();

        Ok(RunWriter {
            conn: Some(conn),
            staging,
            target: location.clone(),
            insert,
            counts: BTreeMap::new(),
        })
    }
}

/// An open run database; dropping it without committing aborts the run.
pub struct RunWriter {
    conn: Option<Connection>,
    staging: PathBuf,
    target: DatabaseLocation,
    insert: HashMap<EntityKind, String>,
    counts: BTreeMap<EntityKind, usize>,
}

impl std::fmt::Debug for RunWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunWriter")
            .field("staging", &self.staging)
            .field("target", &self.target)
            .field("counts", &self.counts)
            .finish()
    }
}

impl RunWriter {
    pub fn location(&self) -> &DatabaseLocation {
        &self.target
    }

    /// Rows inserted so far, per kind.
    pub fn counts(&self) -> &BTreeMap<EntityKind, usize> {
        &self.counts
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn
            .as_ref()
            .ok_or(StorageError::Sqlite(rusqlite::Error::InvalidQuery))
    }

    /// Insert the entities of one file.
    ///
    /// Arena references are resolved to `(kind, row id)` of this database.
    /// Rows are written owners first, so every resolvable reference is known
    /// when its row is inserted and no row is touched twice.
    pub fn insert_entities(&mut self, file: &FileEntities) -> Result<usize> {
        let conn = self.conn()?;
        let mut rows: Vec<Option<(EntityKind, i64)>> = vec![None; file.entities.len()];

        for index in insertion_order(file) {
            let entity = &file.entities[index];
            let kind = entity.kind();
            let sql = self
                .insert
                .get(&kind)
                .ok_or(StorageError::Sqlite(rusqlite::Error::InvalidQuery))?;
            let values = entity_values(file, entity, &rows)?;
            conn.prepare_cached(sql)?
                .execute(params_from_iter(values))?;
            rows[index] = Some((kind, conn.last_insert_rowid()));
        }

        for entity in &file.entities {
            *self.counts.entry(entity.kind()).or_default() += 1;
        }
        Ok(file.entities.len())
    }

    /// Write the run metadata row.
    pub fn write_run_metadata(&mut self, metadata: &RunMetadata) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO run_metadata
                (id, codebase_hash, input_root, created_at, schema_version, tool_version,
                 files_discovered, files_attempted, files_succeeded, files_failed,
                 skipped_nodes, duration_ms, failures, entity_counts)
            VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                metadata.codebase_hash,
                metadata.input_root,
                metadata.created_at.to_rfc3339(),
                metadata.schema_version,
                metadata.tool_version,
                metadata.files_discovered as i64,
                metadata.files_attempted as i64,
                metadata.files_succeeded as i64,
                metadata.files_failed as i64,
                metadata.skipped_nodes as i64,
                i64::try_from(metadata.duration_ms).unwrap_or(i64::MAX),
                serde_json::to_string(&metadata.failures)?,
                serde_json::to_string(&metadata.entity_counts)?,
            ],
        )?;
        Ok(())
    }

    /// Commit the transaction and publish the database at its location.
    pub fn commit(mut self) -> Result<DatabaseLocation> {
        let Some(conn) = self.conn.take() else {
            return Err(StorageError::Sqlite(rusqlite::Error::InvalidQuery));
        };
        if let Err(e) = conn.execute_batch("COMMIT") {
            drop(conn);
            self.discard_staging();
            return Err(e.into());
        }
        if let Err((_, e)) = conn.close() {
            self.discard_staging();
            return Err(e.into());
        }

        let target = self.target.path().to_path_buf();
        if let Err(source) = std::fs::rename(&self.staging, &target) {
            self.discard_staging();
            return Err(StorageError::Publish {
                path: target,
                source,
            });
        }

        let total: usize = self.counts.values().sum();
        info!("Published run database {} ({} entities)", self.target, total);
        Ok(self.target.clone())
    }

    /// Roll back and delete the staging database.
    pub fn abort(mut self) -> Result<()> {
        self.rollback()
    }

    fn rollback(&mut self) -> Result<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        let rolled_back = conn.execute_batch("ROLLBACK");
        drop(conn);
        self.discard_staging();
        debug!("Aborted run database {}", self.target);
        rolled_back.map_err(StorageError::from)
    }

    fn discard_staging(&self) {
        if let Err(e) = remove_if_exists(&self.staging) {
            warn!(
                "Failed to remove staging database {}: {}",
                self.staging.display(),
                e
            );
        }
    }
}

impl Drop for RunWriter {
    fn drop(&mut self) {
        if self.conn.is_some() {
            if let Err(e) = self.rollback() {
                warn!("Rollback of unfinished run failed: {}", e);
            }
        }
    }
}

fn remove_if_exists(path: &std::path::Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unseen,
    Open,
    Done,
}

/// Arena indices in an order where referenced entities precede their
/// referrers, otherwise keeping document order.
///
/// A reference that would close a cycle stays unresolved (NULL id, name kept).
fn insertion_order(file: &FileEntities) -> Vec<usize> {
    let len = file.entities.len();
    let mut marks = vec![Mark::Unseen; len];
    let mut order = Vec::with_capacity(len);

    for root in 0..len {
        if marks[root] != Mark::Unseen {
            continue;
        }
        marks[root] = Mark::Open;
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        while let Some(top) = stack.last_mut() {
            let (index, edge) = *top;
            let entity = &file.entities[index];
            let refs = [entity.member_of, entity.declared_in, entity.parent_function];
            if edge < refs.len() {
                top.1 += 1;
                let next = refs[edge]
                    .map(|r| r.index())
                    .filter(|&r| r < len && marks[r] == Mark::Unseen);
                if let Some(next) = next {
                    marks[next] = Mark::Open;
                    stack.push((next, 0));
                }
            } else {
                marks[index] = Mark::Done;
                order.push(index);
                stack.pop();
            }
        }
    }
    order
}

fn resolve(
    index: Option<usize>,
    rows: &[Option<(EntityKind, i64)>],
) -> Option<(EntityKind, i64)> {
    index.and_then(|i| rows.get(i).copied().flatten())
}

fn to_i64(n: usize) -> Value {
    Value::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

fn text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |s| Value::Text(s.to_string()))
}

/// Parameters for the insert statement of `entity`'s kind, in column order.
fn entity_values(
    file: &FileEntities,
    entity: &Entity,
    rows: &[Option<(EntityKind, i64)>],
) -> Result<Vec<Value>> {
    let member_of = resolve(entity.member_of.map(|r| r.index()), rows);
    let declared_in = resolve(entity.declared_in.map(|r| r.index()), rows);
    let parent_function = resolve(entity.parent_function.map(|r| r.index()), rows);
    let declared_in_name = file.scope_of(entity).map(|scope| scope.name.as_str());
    let span = &entity.span;

    let mut values = vec![
        Value::Text(entity.name.clone()),
        Value::Text(entity.file_path.clone()),
        Value::Text(entity.language.as_str().to_string()),
        to_i64(span.start_line),
        to_i64(span.end_line),
        to_i64(span.start_column),
        to_i64(span.end_column),
        to_i64(span.start_byte),
        to_i64(span.end_byte),
        text(entity.body.as_deref()),
        text(member_of.map(|(kind, _)| kind.as_str())),
        member_of.map_or(Value::Null, |(_, id)| Value::Integer(id)),
        text(entity.member_of_name.as_deref()),
        text(declared_in.map(|(kind, _)| kind.as_str())),
        declared_in.map_or(Value::Null, |(_, id)| Value::Integer(id)),
        text(declared_in_name),
        parent_function.map_or(Value::Null, |(_, id)| Value::Integer(id)),
    ];

    // Attribute columns are named after the payload fields.
    let payload = serde_json::to_value(&entity.payload)?;
    for (name, column) in kind_columns(entity.kind()) {
        let field = payload.get(*name).unwrap_or(&serde_json::Value::Null);
        let value = match (column, field) {
            (_, serde_json::Value::Null) if *column == ColumnType::NameList => {
                Value::Text("[]".to_string())
            }
            (_, serde_json::Value::Null) => Value::Null,
            (_, serde_json::Value::String(s)) => Value::Text(s.clone()),
            (_, other) => Value::Text(serde_json::to_string(other)?),
        };
        values.push(value);
    }
    Ok(values)
}
