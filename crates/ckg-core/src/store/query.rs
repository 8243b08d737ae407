//! Read-only query surface over a run database.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde_json::{Map, Value};

use super::schema::{
    kind_columns, select_columns, ColumnType, COMMON_COLUMNS, RUN_METADATA_COLUMNS, SCHEMA_VERSION,
};
use super::{Result, RunMetadata, StorageError};
use crate::entity::EntityKind;
use crate::language::Language;

/// Which functions `query_function` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FunctionScope {
    #[default]
    Any,
    /// Functions not bound to a type.
    Free,
    /// Functions bound to a type, in this file or elsewhere.
    Method,
}

/// One entity row.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub kind: EntityKind,
    pub id: i64,
    pub name: String,
    pub file_path: String,
    pub language: Language,
    pub start_line: usize,
    pub end_line: usize,
    pub start_column: usize,
    pub end_column: usize,
    pub start_byte: usize,
    pub end_byte: usize,
    pub body: Option<String>,
    pub member_of: Option<(EntityKind, i64)>,
    pub member_of_name: Option<String>,
    pub declared_in: Option<(EntityKind, i64)>,
    pub declared_in_name: Option<String>,
    pub parent_function_id: Option<i64>,
    /// Kind-specific columns: name lists as arrays, text as strings.
    pub attributes: Map<String, Value>,
}

impl EntityRecord {
    /// Names held by a name-list attribute (`methods`, `fields`, ...).
    pub fn names(&self, attribute: &str) -> Vec<&str> {
        self.attributes
            .get(attribute)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// A text attribute (`parameters`, `target_type`, ...).
    pub fn text(&self, attribute: &str) -> Option<&str> {
        self.attributes.get(attribute).and_then(Value::as_str)
    }

    pub fn is_method(&self) -> bool {
        self.kind == EntityKind::Function && self.member_of_name.is_some()
    }
}

fn conversion_error(
    index: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

fn get_usize(row: &Row<'_>, index: usize) -> rusqlite::Result<usize> {
    let value: i64 = row.get(index)?;
    usize::try_from(value).map_err(|e| conversion_error(index, e))
}

fn get_kind(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<EntityKind>> {
    let value: Option<String> = row.get(index)?;
    value
        .map(|s| {
            s.parse::<EntityKind>()
                .map_err(|e| conversion_error(index, std::io::Error::other(e)))
        })
        .transpose()
}

fn reference(kind: Option<EntityKind>, id: Option<i64>) -> Option<(EntityKind, i64)> {
    kind.zip(id)
}

fn row_to_record(kind: EntityKind, row: &Row<'_>) -> rusqlite::Result<EntityRecord> {
    let language: String = row.get(3)?;
    let language = language
        .parse::<Language>()
        .map_err(|e| conversion_error(3, e))?;

    let mut attributes = Map::new();
    for (offset, (name, column)) in kind_columns(kind).iter().enumerate() {
        let index = COMMON_COLUMNS.len() + offset;
        let raw: Option<String> = row.get(index)?;
        let value = match (column, raw) {
            (_, None) => Value::Null,
            (ColumnType::Text, Some(text)) => Value::String(text),
            (ColumnType::NameList, Some(json)) => {
                serde_json::from_str(&json).map_err(|e| conversion_error(index, e))?
            }
        };
        attributes.insert(name.to_string(), value);
    }

    Ok(EntityRecord {
        kind,
        id: row.get(0)?,
        name: row.get(1)?,
        file_path: row.get(2)?,
        language,
        start_line: get_usize(row, 4)?,
        end_line: get_usize(row, 5)?,
        start_column: get_usize(row, 6)?,
        end_column: get_usize(row, 7)?,
        start_byte: get_usize(row, 8)?,
        end_byte: get_usize(row, 9)?,
        body: row.get(10)?,
        member_of: reference(get_kind(row, 11)?, row.get(12)?),
        member_of_name: row.get(13)?,
        declared_in: reference(get_kind(row, 14)?, row.get(15)?),
        declared_in_name: row.get(16)?,
        parent_function_id: row.get(17)?,
        attributes,
    })
}

/// A published run database, opened read-only.
pub struct CkgDatabase {
    conn: Connection,
}

impl CkgDatabase {
    /// Open a run database and check its schema version.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let version: Option<i64> = conn
            .query_row(
                "SELECT schema_version FROM run_metadata WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|_| StorageError::SchemaVersion {
                expected: SCHEMA_VERSION,
                found: "none".to_string(),
            })?;
        match version {
            Some(v) if v == i64::from(SCHEMA_VERSION) => Ok(Self { conn }),
            Some(v) => Err(StorageError::SchemaVersion {
                expected: SCHEMA_VERSION,
                found: v.to_string(),
            }),
            None => Err(StorageError::SchemaVersion {
                expected: SCHEMA_VERSION,
                found: "none".to_string(),
            }),
        }
    }

    /// The run metadata row.
    pub fn run_metadata(&self) -> Result<RunMetadata> {
        let sql = format!("SELECT {} FROM run_metadata WHERE id = 1", RUN_METADATA_COLUMNS);
        let (created_at, failures, entity_counts, mut metadata) =
            self.conn.query_row(&sql, [], |row| {
                let created_at: String = row.get(2)?;
                let failures: String = row.get(11)?;
                let entity_counts: String = row.get(12)?;
                let metadata = RunMetadata {
                    codebase_hash: row.get(0)?,
                    input_root: row.get(1)?,
                    created_at: DateTime::<Utc>::default(),
                    schema_version: row.get(3)?,
                    tool_version: row.get(4)?,
                    files_discovered: get_usize(row, 5)?,
                    files_attempted: get_usize(row, 6)?,
                    files_succeeded: get_usize(row, 7)?,
                    files_failed: get_usize(row, 8)?,
                    skipped_nodes: get_usize(row, 9)?,
                    duration_ms: row.get::<_, i64>(10)?.max(0) as u64,
                    failures: Vec::new(),
                    entity_counts: BTreeMap::new(),
                };
                Ok((created_at, failures, entity_counts, metadata))
            })?;

        metadata.created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| StorageError::Sqlite(conversion_error(2, e)))?
            .with_timezone(&Utc);
        metadata.failures = serde_json::from_str(&failures)?;
        metadata.entity_counts = serde_json::from_str(&entity_counts)?;
        Ok(metadata)
    }

    /// Number of rows of one kind.
    pub fn count(&self, kind: EntityKind) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", kind.table_name()),
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }

    /// Row counts of every kind, including empty tables.
    pub fn counts(&self) -> Result<BTreeMap<EntityKind, usize>> {
        let mut counts = BTreeMap::new();
        for kind in EntityKind::ALL {
            counts.insert(kind, self.count(kind)?);
        }
        Ok(counts)
    }

    fn select(
        &self,
        kind: EntityKind,
        filter: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<EntityRecord>> {
        let sql = format!(
            "SELECT {} FROM {} {} ORDER BY file_path, start_byte",
            select_columns(kind),
            kind.table_name(),
            filter
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params, |row| row_to_record(kind, row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Every row of one kind, by file and position.
    pub fn all(&self, kind: EntityKind) -> Result<Vec<EntityRecord>> {
        self.select(kind, "", [])
    }

    /// Rows of one kind with the given name.
    pub fn find(&self, kind: EntityKind, name: &str) -> Result<Vec<EntityRecord>> {
        self.select(kind, "WHERE name = ?1", [name])
    }

    /// Rows of one kind defined in a file.
    pub fn in_file(&self, kind: EntityKind, file_path: &str) -> Result<Vec<EntityRecord>> {
        self.select(kind, "WHERE file_path = ?1", [file_path])
    }

    pub fn get(&self, kind: EntityKind, id: i64) -> Result<Option<EntityRecord>> {
        Ok(self.select(kind, "WHERE id = ?1", [id])?.into_iter().next())
    }

    /// The enclosing type of a record.
    pub fn member_of(&self, record: &EntityRecord) -> Result<Option<EntityRecord>> {
        match record.member_of {
            Some((kind, id)) => self.get(kind, id),
            None => Ok(None),
        }
    }

    /// The enclosing module or namespace of a record.
    pub fn declared_in(&self, record: &EntityRecord) -> Result<Option<EntityRecord>> {
        match record.declared_in {
            Some((kind, id)) => self.get(kind, id),
            None => Ok(None),
        }
    }

    /// Every entity whose "member of" reference points at `record`.
    pub fn members(&self, record: &EntityRecord) -> Result<Vec<EntityRecord>> {
        let mut members = Vec::new();
        for kind in EntityKind::ALL {
            members.extend(self.select(
                kind,
                "WHERE member_of_kind = ?1 AND member_of_id = ?2",
                params![record.kind.as_str(), record.id],
            )?);
        }
        Ok(members)
    }

    /// Functions by name, optionally restricted to free functions or methods.
    pub fn query_function(&self, name: &str, scope: FunctionScope) -> Result<Vec<EntityRecord>> {
        let filter = match scope {
            FunctionScope::Any => "WHERE name = ?1",
            FunctionScope::Free => "WHERE name = ?1 AND member_of_name IS NULL",
            FunctionScope::Method => "WHERE name = ?1 AND member_of_name IS NOT NULL",
        };
        self.select(EntityKind::Function, filter, [name])
    }

    pub fn query_class(&self, name: &str) -> Result<Vec<EntityRecord>> {
        self.find(EntityKind::Class, name)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{DatabaseLocation, StorageEngine};
    use super::*;
    use crate::builder::{FailureStage, FileFailure};
    use crate::entity::{Entity, EntityRef, FileEntities, Payload, Span};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn span(start: usize, end: usize) -> Span {
        Span {
            start_byte: start,
            end_byte: end,
            start_line: 1 + start / 10,
            start_column: 0,
            end_line: 1 + end / 10,
            end_column: 0,
        }
    }

    fn entity(name: &str, range: (usize, usize), payload: Payload) -> Entity {
        Entity {
            name: name.to_string(),
            file_path: "shapes/mod.rs".to_string(),
            language: Language::Rust,
            span: span(range.0, range.1),
            body: Some(format!("/* {} */", name)),
            member_of: None,
            member_of_name: None,
            declared_in: None,
            parent_function: None,
            payload,
        }
    }

    fn metadata() -> RunMetadata {
        RunMetadata {
            codebase_hash: "abc123".to_string(),
            input_root: "/src".to_string(),
            created_at: DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
                .unwrap()
                .with_timezone(&Utc),
            schema_version: SCHEMA_VERSION,
            tool_version: "0.1.0".to_string(),
            files_discovered: 2,
            files_attempted: 2,
            files_succeeded: 1,
            files_failed: 1,
            skipped_nodes: 0,
            duration_ms: 12,
            failures: vec![FileFailure {
                path: "broken.rs".to_string(),
                stage: FailureStage::Parse,
                reason: "syntax error".to_string(),
            }],
            entity_counts: BTreeMap::from([(EntityKind::Function, 2), (EntityKind::Struct, 1)]),
        }
    }

    /// mod shapes { struct Circle; impl Circle { fn area() } fn unit() }
    fn build(dir: &Path) -> CkgDatabase {
        let mut module = entity(
            "shapes",
            (0, 100),
            Payload::Module {
                exports: vec!["Circle".to_string(), "unit".to_string()],
            },
        );
        module.body = None;
        let mut circle = entity(
            "Circle",
            (10, 30),
            Payload::Struct {
                fields: vec!["radius".to_string()],
                methods: vec!["area".to_string()],
            },
        );
        circle.declared_in = Some(EntityRef(0));
        let mut area = entity(
            "area",
            (40, 60),
            Payload::function(Some("(&self)".to_string()), Some("f64".to_string())),
        );
        area.member_of = Some(EntityRef(1));
        area.member_of_name = Some("Circle".to_string());
        area.declared_in = Some(EntityRef(0));
        let mut unit = entity(
            "unit",
            (70, 90),
            Payload::function(Some("()".to_string()), None),
        );
        unit.declared_in = Some(EntityRef(0));

        let file = FileEntities {
            file_path: "shapes/mod.rs".to_string(),
            entities: vec![module, circle, area, unit],
            skipped: 0,
        };

        let location = DatabaseLocation::new(dir.join("run.db"));
        let mut writer = StorageEngine::new().begin_run(&location).unwrap();
        writer.insert_entities(&file).unwrap();
        writer.write_run_metadata(&metadata()).unwrap();
        writer.commit().unwrap();
        CkgDatabase::open(&location).unwrap()
    }

    #[test]
    fn test_counts_and_metadata() {
        let temp = TempDir::new().unwrap();
        let db = build(temp.path());

        let counts = db.counts().unwrap();
        assert_eq!(counts.len(), 14);
        assert_eq!(counts[&EntityKind::Function], 2);
        assert_eq!(counts[&EntityKind::Struct], 1);
        assert_eq!(counts[&EntityKind::Module], 1);
        assert_eq!(counts[&EntityKind::Class], 0);

        assert_eq!(db.run_metadata().unwrap(), metadata());
    }

    #[test]
    fn test_query_function_scopes() {
        let temp = TempDir::new().unwrap();
        let db = build(temp.path());

        let area = db.query_function("area", FunctionScope::Method).unwrap();
        assert_eq!(area.len(), 1);
        assert!(area[0].is_method());
        assert_eq!(area[0].text("return_type"), Some("f64"));
        assert!(db.query_function("area", FunctionScope::Free).unwrap().is_empty());

        let unit = db.query_function("unit", FunctionScope::Free).unwrap();
        assert_eq!(unit.len(), 1);
        assert_eq!(unit[0].text("return_type"), None);
        assert_eq!(db.query_function("unit", FunctionScope::Any).unwrap().len(), 1);
        assert!(db.query_class("Circle").unwrap().is_empty());
    }

    #[test]
    fn test_back_references() {
        let temp = TempDir::new().unwrap();
        let db = build(temp.path());

        let area = db.find(EntityKind::Function, "area").unwrap().remove(0);
        let owner = db.member_of(&area).unwrap().unwrap();
        assert_eq!(owner.kind, EntityKind::Struct);
        assert_eq!(owner.name, "Circle");
        assert_eq!(owner.names("fields"), vec!["radius"]);
        assert_eq!(owner.names("methods"), vec!["area"]);

        let members: Vec<String> = db
            .members(&owner)
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(members, vec!["area"]);

        let module = db.declared_in(&owner).unwrap().unwrap();
        assert_eq!(module.name, "shapes");
        assert_eq!(owner.declared_in_name.as_deref(), Some("shapes"));
        assert_eq!(module.names("exports"), vec!["Circle", "unit"]);
        assert_eq!(module.body, None);
    }

    #[test]
    fn test_in_file_and_get() {
        let temp = TempDir::new().unwrap();
        let db = build(temp.path());

        let functions = db.in_file(EntityKind::Function, "shapes/mod.rs").unwrap();
        let names: Vec<&str> = functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["area", "unit"]);
        assert_eq!(functions[0].start_byte, 40);
        assert_eq!(functions[0].language, Language::Rust);

        let again = db.get(EntityKind::Function, functions[1].id).unwrap().unwrap();
        assert_eq!(again, functions[1]);
        assert!(db.get(EntityKind::Function, 9999).unwrap().is_none());
        assert!(db.in_file(EntityKind::Function, "other.rs").unwrap().is_empty());
    }

    #[test]
    fn test_open_rejects_database_without_metadata() {
        let temp = TempDir::new().unwrap();
        let location = DatabaseLocation::new(temp.path().join("bare.db"));
        let writer = StorageEngine::new().begin_run(&location).unwrap();
        writer.commit().unwrap();

        assert!(matches!(
            CkgDatabase::open(&location),
            Err(StorageError::SchemaVersion { .. })
        ));
    }
}
