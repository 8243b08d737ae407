//! SQLite schema for run databases.
//!
//! One table per entity kind. All tables share the location and
//! back-reference columns; each kind adds its own attribute columns, named
//! after the payload fields they hold. Name lists are stored as JSON arrays.

use crate::entity::EntityKind;

/// Schema version recorded in every run database.
/// v1: fourteen entity tables plus run_metadata
pub const SCHEMA_VERSION: u32 = 1;

/// Storage class of a kind-specific column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Free text, nullable.
    Text,
    /// JSON array of names.
    NameList,
}

impl ColumnType {
    fn sql(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::NameList => "TEXT NOT NULL DEFAULT '[]'",
        }
    }
}

/// Columns shared by every entity table, in row order.
pub const COMMON_COLUMNS: &[&str] = &[
    "id",
    "name",
    "file_path",
    "language",
    "start_line",
    "end_line",
    "start_column",
    "end_column",
    "start_byte",
    "end_byte",
    "body",
    "member_of_kind",
    "member_of_id",
    "member_of_name",
    "declared_in_kind",
    "declared_in_id",
    "declared_in_name",
    "parent_function_id",
];

const COMMON_DEFINITIONS: &str = r#"
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    file_path TEXT NOT NULL CHECK (file_path <> ''),
    language TEXT NOT NULL CHECK (language <> ''),

    -- Location: 1-based lines, 0-based columns, byte range
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    start_column INTEGER NOT NULL,
    end_column INTEGER NOT NULL,
    start_byte INTEGER NOT NULL,
    end_byte INTEGER NOT NULL,

    -- Optional source slice
    body TEXT,

    -- Innermost enclosing type; the name is also set for types declared elsewhere
    member_of_kind TEXT,
    member_of_id INTEGER,
    member_of_name TEXT,

    -- Innermost enclosing module or namespace
    declared_in_kind TEXT,
    declared_in_id INTEGER,
    declared_in_name TEXT,

    -- Enclosing function (row of functions)
    parent_function_id INTEGER"#;

/// Attribute columns of one kind.
pub fn kind_columns(kind: EntityKind) -> &'static [(&'static str, ColumnType)] {
    use ColumnType::{NameList, Text};
    match kind {
        EntityKind::Function => &[("parameters", Text), ("return_type", Text)],
        EntityKind::Class | EntityKind::Struct => &[("fields", NameList), ("methods", NameList)],
        EntityKind::Enum => &[("variants", NameList)],
        EntityKind::Interface => &[("methods", NameList), ("properties", NameList)],
        EntityKind::Trait => &[("methods", NameList), ("associated_types", NameList)],
        EntityKind::Module => &[("exports", NameList)],
        EntityKind::Namespace => &[("members", NameList)],
        EntityKind::Contract => &[
            ("functions", NameList),
            ("events", NameList),
            ("modifiers", NameList),
            ("state_variables", NameList),
        ],
        EntityKind::Component => &[
            ("props", NameList),
            ("methods", NameList),
            ("template", Text),
        ],
        EntityKind::TypeAlias => &[("target_type", Text)],
        EntityKind::Extension => &[("extended_type", Text), ("methods", NameList)],
        EntityKind::Union => &[("fields", NameList)],
        EntityKind::GenericType => &[("type_parameters", Text), ("constraints", Text)],
    }
}

/// `CREATE TABLE` statement for one entity table.
pub fn create_table_sql(kind: EntityKind) -> String {
    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS {} ({},\n",
        kind.table_name(),
        COMMON_DEFINITIONS
    );
    for (name, column) in kind_columns(kind) {
        sql.push_str(&format!("    {} {},\n", name, column.sql()));
    }
    sql.push_str("    UNIQUE(file_path, start_byte, end_byte)\n)");
    sql
}

/// Index statements for one entity table.
pub fn create_indexes_sql(kind: EntityKind) -> String {
    let table = kind.table_name();
    format!(
        "CREATE INDEX IF NOT EXISTS idx_{t}_name ON {t}(name);\n\
         CREATE INDEX IF NOT EXISTS idx_{t}_file ON {t}(file_path);\n\
         CREATE INDEX IF NOT EXISTS idx_{t}_member_of ON {t}(member_of_kind, member_of_id);\n\
         CREATE INDEX IF NOT EXISTS idx_{t}_member_of_name ON {t}(member_of_name);\n\
         CREATE INDEX IF NOT EXISTS idx_{t}_declared_in ON {t}(declared_in_kind, declared_in_id);\n",
        t = table
    )
}

/// Insert statement for one entity table; `id` is assigned by SQLite.
pub fn insert_sql(kind: EntityKind) -> String {
    let mut columns: Vec<&str> = COMMON_COLUMNS[1..].to_vec();
    columns.extend(kind_columns(kind).iter().map(|(name, _)| *name));
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        kind.table_name(),
        columns.join(", "),
        placeholders.join(", ")
    )
}

/// Column list for entity queries (common columns then attributes).
pub fn select_columns(kind: EntityKind) -> String {
    let mut columns: Vec<&str> = COMMON_COLUMNS.to_vec();
    columns.extend(kind_columns(kind).iter().map(|(name, _)| *name));
    columns.join(", ")
}

/// SQL to create the run metadata table.
///
/// Exactly one row per database.
pub const SCHEMA_CREATE_RUN_METADATA: &str = r#"
CREATE TABLE IF NOT EXISTS run_metadata (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    codebase_hash TEXT NOT NULL,
    input_root TEXT NOT NULL,
    created_at TEXT NOT NULL,
    schema_version INTEGER NOT NULL,
    tool_version TEXT NOT NULL,
    files_discovered INTEGER NOT NULL,
    files_attempted INTEGER NOT NULL,
    files_succeeded INTEGER NOT NULL,
    files_failed INTEGER NOT NULL,
    skipped_nodes INTEGER NOT NULL,
    duration_ms INTEGER NOT NULL,

    -- JSON: [{path, stage, reason}]
    failures TEXT NOT NULL,

    -- JSON: {kind: count}
    entity_counts TEXT NOT NULL
)
"#;

/// Column names for run metadata queries (in order for row mapping)
pub const RUN_METADATA_COLUMNS: &str = "codebase_hash, input_root, created_at, schema_version, \
     tool_version, files_discovered, files_attempted, files_succeeded, files_failed, \
     skipped_nodes, duration_ms, failures, entity_counts";

/// Every statement needed for an empty run database.
pub fn create_schema_sql() -> String {
    let mut sql = String::new();
    for kind in EntityKind::ALL {
        sql.push_str(&create_table_sql(kind));
        sql.push_str(";\n");
        sql.push_str(&create_indexes_sql(kind));
    }
    sql.push_str(SCHEMA_CREATE_RUN_METADATA);
    sql.push_str(";\n");
    sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn names(conn: &Connection, sql: &str) -> Vec<String> {
        conn.prepare(sql)
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_schema_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&create_schema_sql()).unwrap();

        let tables = names(
            &conn,
            "SELECT name FROM sqlite_master WHERE type='table' AND name <> 'sqlite_sequence' ORDER BY name",
        );
        assert_eq!(tables.len(), 15);
        for kind in EntityKind::ALL {
            assert!(tables.contains(&kind.table_name().to_string()));
        }
        assert!(tables.contains(&"run_metadata".to_string()));
    }

    #[test]
    fn test_schema_creates_indexes() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&create_schema_sql()).unwrap();

        let indexes = names(
            &conn,
            "SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%' ORDER BY name",
        );
        assert!(indexes.contains(&"idx_functions_name".to_string()));
        assert!(indexes.contains(&"idx_classes_file".to_string()));
        assert!(indexes.contains(&"idx_generic_types_member_of".to_string()));
    }

    #[test]
    fn test_natural_key_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&create_schema_sql()).unwrap();

        let insert = "INSERT INTO enums (name, file_path, language, start_line, end_line, \
                      start_column, end_column, start_byte, end_byte) \
                      VALUES (?1, 'a.rs', 'rust', 1, 1, 0, 10, 0, 10)";
        conn.execute(insert, ["Color"]).unwrap();
        assert!(conn.execute(insert, ["Shade"]).is_err());

        let variants: String = conn
            .query_row("SELECT variants FROM enums", [], |row| row.get(0))
            .unwrap();
        assert_eq!(variants, "[]");
    }

    #[test]
    fn test_insert_sql_placeholders_match_columns() {
        for kind in EntityKind::ALL {
            let sql = insert_sql(kind);
            let expected = COMMON_COLUMNS.len() - 1 + kind_columns(kind).len();
            assert!(sql.contains(&format!("?{})", expected)), "{}", sql);
        }
    }
}
