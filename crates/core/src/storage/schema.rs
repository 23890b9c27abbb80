//! Registry schema: the global tables and the per-tool table sets.
//!
//! Every tool gets its own `documents_<id>` and `vectors_<id>` tables plus
//! the index tables that serve their lookups. Names are formatted from the
//! numeric [`ToolId`] only.

use redb::{
    MultimapTableDefinition, MultimapTableHandle, ReadTransaction, ReadableTable, TableDefinition,
    TableHandle, WriteTransaction,
};

use super::Connection;
use crate::error::StoreError;
use crate::types::ToolId;

/// Registry rows keyed by tool id (JSON values)
pub(crate) const TOOLS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("tools");
/// Unique tool name -> tool id
pub(crate) const TOOLS_BY_NAME_TABLE: TableDefinition<&str, u64> =
    TableDefinition::new("tools_by_name");
/// Last id handed out per table, never decremented
pub(crate) const SEQUENCES_TABLE: TableDefinition<&str, u64> = TableDefinition::new("sequences");

/// Per-tool row tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Documents,
    Vectors,
}

impl TableKind {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Documents => "documents",
            Self::Vectors => "vectors",
        }
    }
}

/// Per-tool index tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// documents by tool id
    DocumentsByTool,
    /// unique (tool id, file path, content hash)
    DocumentsPathHash,
    /// documents by (tool id, file path)
    DocumentsByToolPath,
    /// vectors by embedding bytes
    VectorsByEmbedding,
    /// vectors by (tool id, document id)
    VectorsByToolDoc,
    /// vectors by (document id, start, end)
    VectorsByPosition,
}

impl IndexKind {
    pub const ALL: [IndexKind; 6] = [
        Self::DocumentsByTool,
        Self::DocumentsPathHash,
        Self::DocumentsByToolPath,
        Self::VectorsByEmbedding,
        Self::VectorsByToolDoc,
        Self::VectorsByPosition,
    ];

    pub fn table(self) -> TableKind {
        match self {
            Self::DocumentsByTool | Self::DocumentsPathHash | Self::DocumentsByToolPath => {
                TableKind::Documents
            }
            Self::VectorsByEmbedding | Self::VectorsByToolDoc | Self::VectorsByPosition => {
                TableKind::Vectors
            }
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Self::DocumentsByTool => "tool",
            Self::DocumentsPathHash => "path_hash",
            Self::DocumentsByToolPath => "tool_path",
            Self::VectorsByEmbedding => "embedding",
            Self::VectorsByToolDoc => "tool_doc",
            Self::VectorsByPosition => "position",
        }
    }
}

/// Name of a per-tool row table, e.g. `documents_12`
pub fn table_name(kind: TableKind, tool_id: ToolId) -> String {
    format!("{}_{}", kind.prefix(), tool_id.get())
}

/// Like [`table_name`] for an id given as text. Anything but plain decimal
/// digits is rejected before it reaches a table name.
pub fn table_name_from_raw(kind: TableKind, raw_id: &str) -> Result<String, StoreError> {
    let tool_id =
        ToolId::parse(raw_id).ok_or_else(|| StoreError::InvalidIdentifier(raw_id.to_string()))?;
    Ok(table_name(kind, tool_id))
}

/// Name of a per-tool index table, e.g. `idx_vectors_12_position`
pub fn index_name(kind: IndexKind, tool_id: ToolId) -> String {
    format!(
        "idx_{}_{}_{}",
        kind.table().prefix(),
        tool_id.get(),
        kind.suffix()
    )
}

/// The full set of table names owned by one tool, with typed definitions.
#[derive(Debug, Clone)]
pub struct ToolTables {
    tool_id: ToolId,
    documents: String,
    vectors: String,
    documents_by_tool: String,
    documents_path_hash: String,
    documents_by_tool_path: String,
    vectors_by_embedding: String,
    vectors_by_tool_doc: String,
    vectors_by_position: String,
}

impl ToolTables {
    pub fn new(tool_id: ToolId) -> Self {
        Self {
            tool_id,
            documents: table_name(TableKind::Documents, tool_id),
            vectors: table_name(TableKind::Vectors, tool_id),
            documents_by_tool: index_name(IndexKind::DocumentsByTool, tool_id),
            documents_path_hash: index_name(IndexKind::DocumentsPathHash, tool_id),
            documents_by_tool_path: index_name(IndexKind::DocumentsByToolPath, tool_id),
            vectors_by_embedding: index_name(IndexKind::VectorsByEmbedding, tool_id),
            vectors_by_tool_doc: index_name(IndexKind::VectorsByToolDoc, tool_id),
            vectors_by_position: index_name(IndexKind::VectorsByPosition, tool_id),
        }
    }

    pub fn tool_id(&self) -> ToolId {
        self.tool_id
    }

    /// All names, row tables first
    pub fn names(&self) -> [&str; 8] {
        [
            &self.documents,
            &self.vectors,
            &self.documents_by_tool,
            &self.documents_path_hash,
            &self.documents_by_tool_path,
            &self.vectors_by_embedding,
            &self.vectors_by_tool_doc,
            &self.vectors_by_position,
        ]
    }

    pub fn documents_name(&self) -> &str {
        &self.documents
    }

    pub fn vectors_name(&self) -> &str {
        &self.vectors
    }

    pub(crate) fn documents(&self) -> TableDefinition<'_, u64, &'static [u8]> {
        TableDefinition::new(&self.documents)
    }

    pub(crate) fn vectors(&self) -> TableDefinition<'_, u64, &'static [u8]> {
        TableDefinition::new(&self.vectors)
    }

    pub(crate) fn documents_by_tool(&self) -> MultimapTableDefinition<'_, u64, u64> {
        MultimapTableDefinition::new(&self.documents_by_tool)
    }

    pub(crate) fn documents_path_hash(
        &self,
    ) -> TableDefinition<'_, (u64, &'static str, &'static str), u64> {
        TableDefinition::new(&self.documents_path_hash)
    }

    pub(crate) fn documents_by_tool_path(
        &self,
    ) -> MultimapTableDefinition<'_, (u64, &'static str), u64> {
        MultimapTableDefinition::new(&self.documents_by_tool_path)
    }

    pub(crate) fn vectors_by_embedding(&self) -> MultimapTableDefinition<'_, &'static [u8], u64> {
        MultimapTableDefinition::new(&self.vectors_by_embedding)
    }

    pub(crate) fn vectors_by_tool_doc(&self) -> MultimapTableDefinition<'_, (u64, u64), u64> {
        MultimapTableDefinition::new(&self.vectors_by_tool_doc)
    }

    pub(crate) fn vectors_by_position(
        &self,
    ) -> MultimapTableDefinition<'_, (u64, u64, u64), u64> {
        MultimapTableDefinition::new(&self.vectors_by_position)
    }
}

/// Create the global registry tables if they are missing
pub fn initialize_in(txn: &WriteTransaction) -> Result<(), StoreError> {
    txn.open_table(TOOLS_TABLE)?;
    txn.open_table(TOOLS_BY_NAME_TABLE)?;
    txn.open_table(SEQUENCES_TABLE)?;
    Ok(())
}

/// Create a tool's tables and indexes inside `txn` ("create if not exists")
pub fn provision_in(txn: &WriteTransaction, tool_id: ToolId) -> Result<(), StoreError> {
    let tables = ToolTables::new(tool_id);

    txn.open_table(tables.documents())?;
    txn.open_table(tables.vectors())?;

    txn.open_multimap_table(tables.documents_by_tool())?;
    txn.open_table(tables.documents_path_hash())?;
    txn.open_multimap_table(tables.documents_by_tool_path())?;
    txn.open_multimap_table(tables.vectors_by_embedding())?;
    txn.open_multimap_table(tables.vectors_by_tool_doc())?;
    txn.open_multimap_table(tables.vectors_by_position())?;

    tracing::debug!("Provisioned tables for tool {}", tool_id);
    Ok(())
}

/// Drop a tool's tables inside `txn` ("drop if exists").
///
/// Vector tables go before document tables; their rows reference documents.
pub fn teardown_in(txn: &WriteTransaction, tool_id: ToolId) -> Result<(), StoreError> {
    let tables = ToolTables::new(tool_id);

    txn.delete_multimap_table(tables.vectors_by_position())?;
    txn.delete_multimap_table(tables.vectors_by_tool_doc())?;
    txn.delete_multimap_table(tables.vectors_by_embedding())?;
    txn.delete_table(tables.vectors())?;

    txn.delete_multimap_table(tables.documents_by_tool_path())?;
    txn.delete_table(tables.documents_path_hash())?;
    txn.delete_multimap_table(tables.documents_by_tool())?;
    txn.delete_table(tables.documents())?;

    let mut sequences = txn.open_table(SEQUENCES_TABLE)?;
    sequences.remove(tables.documents_name())?;
    sequences.remove(tables.vectors_name())?;

    tracing::debug!("Dropped tables for tool {}", tool_id);
    Ok(())
}

/// Allocate the next id for `sequence`. Ids start at 1 and are never reused.
pub(crate) fn next_id(txn: &WriteTransaction, sequence: &str) -> Result<u64, StoreError> {
    let mut table = txn.open_table(SEQUENCES_TABLE)?;
    let last = table.get(sequence)?.map(|guard| guard.value()).unwrap_or(0);
    let next = last + 1;
    table.insert(sequence, next)?;
    Ok(next)
}

/// Whether a table (plain or multimap) named `name` exists
pub(crate) fn table_exists(txn: &WriteTransaction, name: &str) -> Result<bool, StoreError> {
    Ok(txn.list_tables()?.any(|handle| handle.name() == name)
        || txn.list_multimap_tables()?.any(|handle| handle.name() == name))
}

fn existing_in(txn: &ReadTransaction, tables: &ToolTables) -> Result<Vec<String>, StoreError> {
    let names = tables.names();
    let mut present: Vec<String> = txn
        .list_tables()?
        .map(|handle| handle.name().to_string())
        .chain(
            txn.list_multimap_tables()?
                .map(|handle| handle.name().to_string()),
        )
        .filter(|name| names.contains(&name.as_str()))
        .collect();
    present.sort();
    Ok(present)
}

/// Standalone schema operations, each run as its own transaction.
pub struct SchemaManager<'c> {
    conn: &'c Connection,
}

impl<'c> SchemaManager<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Create the global registry tables
    pub fn initialize(&self) -> Result<(), StoreError> {
        self.conn.transaction(initialize_in)
    }

    /// Create a tool's table set; all or nothing
    pub fn provision(&self, tool_id: ToolId) -> Result<(), StoreError> {
        self.conn.transaction(|txn| provision_in(txn, tool_id))
    }

    /// Drop a tool's table set; all or nothing
    pub fn teardown(&self, tool_id: ToolId) -> Result<(), StoreError> {
        self.conn.transaction(|txn| teardown_in(txn, tool_id))
    }

    /// Names of the tool's tables that currently exist, sorted
    pub fn existing_tables(&self, tool_id: ToolId) -> Result<Vec<String>, StoreError> {
        let txn = self.conn.read()?;
        existing_in(&txn, &ToolTables::new(tool_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Connection) {
        let temp_dir = TempDir::new().unwrap();
        let conn = Connection::new(temp_dir.path().join("tools.redb"));
        SchemaManager::new(&conn).initialize().unwrap();
        (temp_dir, conn)
    }

    #[test]
    fn test_table_names() {
        let id = ToolId(12);
        assert_eq!(table_name(TableKind::Documents, id), "documents_12");
        assert_eq!(table_name(TableKind::Vectors, id), "vectors_12");
        assert_eq!(
            index_name(IndexKind::DocumentsPathHash, id),
            "idx_documents_12_path_hash"
        );
        assert_eq!(
            index_name(IndexKind::VectorsByPosition, id),
            "idx_vectors_12_position"
        );
    }

    #[test]
    fn test_table_name_from_raw() {
        assert_eq!(
            table_name_from_raw(TableKind::Vectors, "7").unwrap(),
            "vectors_7"
        );
        for raw in ["", "-1", "1; drop", "1 ", "0x10", "documents_1"] {
            assert!(
                matches!(
                    table_name_from_raw(TableKind::Documents, raw),
                    Err(StoreError::InvalidIdentifier(_))
                ),
                "{raw:?}"
            );
        }
    }

    #[test]
    fn test_names_do_not_collide_across_tools() {
        let one = ToolTables::new(ToolId(1));
        let eleven = ToolTables::new(ToolId(11));

        for name in one.names() {
            assert!(!eleven.names().contains(&name), "{name}");
        }

        let mut index_names: Vec<String> = IndexKind::ALL
            .iter()
            .map(|kind| index_name(*kind, ToolId(1)))
            .collect();
        index_names.sort();
        index_names.dedup();
        assert_eq!(index_names.len(), IndexKind::ALL.len());
    }

    #[test]
    fn test_provision_creates_all_tables() {
        let (_temp_dir, conn) = setup();
        let schema = SchemaManager::new(&conn);

        schema.provision(ToolId(3)).unwrap();

        let mut expected: Vec<String> = ToolTables::new(ToolId(3))
            .names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        expected.sort();
        assert_eq!(schema.existing_tables(ToolId(3)).unwrap(), expected);
        assert!(schema.existing_tables(ToolId(4)).unwrap().is_empty());
    }

    #[test]
    fn test_provision_is_idempotent() {
        let (_temp_dir, conn) = setup();
        let schema = SchemaManager::new(&conn);

        schema.provision(ToolId(1)).unwrap();
        schema.provision(ToolId(1)).unwrap();

        assert_eq!(schema.existing_tables(ToolId(1)).unwrap().len(), 8);
    }

    #[test]
    fn test_teardown_drops_everything_and_is_idempotent() {
        let (_temp_dir, conn) = setup();
        let schema = SchemaManager::new(&conn);

        schema.provision(ToolId(1)).unwrap();
        schema.provision(ToolId(2)).unwrap();

        schema.teardown(ToolId(1)).unwrap();
        assert!(schema.existing_tables(ToolId(1)).unwrap().is_empty());
        assert_eq!(schema.existing_tables(ToolId(2)).unwrap().len(), 8);

        schema.teardown(ToolId(1)).unwrap();
        schema.teardown(ToolId(99)).unwrap();
    }

    #[test]
    fn test_failed_provision_leaves_nothing() {
        let (_temp_dir, conn) = setup();
        let schema = SchemaManager::new(&conn);

        // A multimap table squatting on the vectors name makes provisioning fail
        // after the documents table was opened.
        conn.transaction(|txn| -> Result<(), StoreError> {
            let squatter: MultimapTableDefinition<u64, u64> =
                MultimapTableDefinition::new("vectors_5");
            txn.open_multimap_table(squatter)?;
            Ok(())
        })
        .unwrap();

        let result = schema.provision(ToolId(5));
        assert!(matches!(result, Err(StoreError::Table(_))));
        assert_eq!(
            schema.existing_tables(ToolId(5)).unwrap(),
            vec!["vectors_5".to_string()]
        );
    }

    #[test]
    fn test_next_id_is_monotonic() {
        let (_temp_dir, conn) = setup();

        let ids: Vec<u64> = (0..3)
            .map(|_| conn.transaction(|txn| next_id(txn, "tools")).unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let other = conn.transaction(|txn| next_id(txn, "documents_1")).unwrap();
        assert_eq!(other, 1);
    }
}
