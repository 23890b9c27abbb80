//! Row access for a tool's document and vector tables.
//!
//! redb has no secondary indexes or foreign keys, so this module keeps the
//! per-tool index tables, the `(tool, path, hash)` uniqueness rule and the
//! document -> vector cascade in step with the row tables, always inside the
//! same write transaction.

use chrono::Utc;
use redb::{
    MultimapTableDefinition, ReadOnlyMultimapTable, ReadOnlyTable, ReadTransaction,
    ReadableMultimapTable, ReadableTable, TableDefinition, TableError, WriteTransaction,
};
use serde::de::DeserializeOwned;

use super::schema::{next_id, table_exists, ToolTables};
use super::Connection;
use crate::error::StoreError;
use crate::types::{Document, DocumentWrite, NewChunk, ToolId, VectorChunk};

/// Documents and vector chunks of one tool
pub struct ToolDataStore<'c> {
    conn: &'c Connection,
    tables: ToolTables,
}

impl<'c> ToolDataStore<'c> {
    pub fn new(conn: &'c Connection, tool_id: ToolId) -> Self {
        Self {
            conn,
            tables: ToolTables::new(tool_id),
        }
    }

    pub fn tool_id(&self) -> ToolId {
        self.tables.tool_id()
    }

    /// Store `content` for `file_path`.
    ///
    /// Nothing is written when the same path and content hash are already
    /// stored. Otherwise the new version is inserted and any older version of
    /// the path is removed together with its chunks.
    pub fn upsert_document(
        &self,
        file_path: &str,
        content: &str,
    ) -> Result<DocumentWrite, StoreError> {
        let hash = Document::hash_content(content);
        let tool = self.tool_id().get();
        let tables = &self.tables;

        self.conn.transaction(|txn| -> Result<DocumentWrite, StoreError> {
            ensure_tables(txn, tables)?;

            let existing = {
                let unique = txn.open_table(tables.documents_path_hash())?;
                let found = unique
                    .get((tool, file_path, hash.as_str()))?
                    .map(|guard| guard.value());
                found
            };
            if let Some(id) = existing {
                return Ok(DocumentWrite::Unchanged(id));
            }

            let previous_ids: Vec<u64> = {
                let by_path = txn.open_multimap_table(tables.documents_by_tool_path())?;
                let mut ids = Vec::new();
                for id in by_path.get((tool, file_path))? {
                    ids.push(id?.value());
                }
                ids
            };

            let mut previous: Option<Document> = None;
            for id in previous_ids {
                if let Some(removed) = delete_document_in(txn, tables, id)? {
                    previous = Some(removed);
                }
            }

            let now = Utc::now();
            let document = Document {
                id: next_id(txn, tables.documents_name())?,
                tool_id: tables.tool_id(),
                file_path: file_path.to_string(),
                content_hash: hash.clone(),
                content: content.to_string(),
                created_at: previous.as_ref().map(|doc| doc.created_at).unwrap_or(now),
                updated_at: now,
            };

            {
                let mut rows = txn.open_table(tables.documents())?;
                let value = serde_json::to_vec(&document)?;
                rows.insert(document.id, value.as_slice())?;
            }
            {
                let mut by_tool = txn.open_multimap_table(tables.documents_by_tool())?;
                by_tool.insert(tool, document.id)?;
            }
            {
                let mut unique = txn.open_table(tables.documents_path_hash())?;
                unique.insert((tool, file_path, hash.as_str()), document.id)?;
            }
            {
                let mut by_path = txn.open_multimap_table(tables.documents_by_tool_path())?;
                by_path.insert((tool, file_path), document.id)?;
            }

            tracing::debug!(
                "Stored document {} ({}) for tool {}",
                document.id,
                file_path,
                tool
            );

            Ok(match previous {
                Some(old) => DocumentWrite::Replaced {
                    id: document.id,
                    previous: old.id,
                },
                None => DocumentWrite::Created(document.id),
            })
        })
    }

    /// Get a document by ID
    pub fn get_document(&self, id: u64) -> Result<Option<Document>, StoreError> {
        let txn = self.conn.read()?;
        let rows = open_read(&txn, self.tables.documents())?;
        let document = match rows.get(id)? {
            Some(guard) => Some(decode(guard.value())?),
            None => None,
        };
        Ok(document)
    }

    /// All documents, ordered by id
    pub fn documents(&self) -> Result<Vec<Document>, StoreError> {
        let txn = self.conn.read()?;
        let rows = open_read(&txn, self.tables.documents())?;

        let mut documents = Vec::new();
        for item in rows.iter()? {
            let (_key, value) = item?;
            documents.push(decode(value.value())?);
        }
        Ok(documents)
    }

    /// Stored versions of one file path
    pub fn documents_at(&self, file_path: &str) -> Result<Vec<Document>, StoreError> {
        let txn = self.conn.read()?;
        let by_path = open_read_multimap(&txn, self.tables.documents_by_tool_path())?;
        let rows = open_read(&txn, self.tables.documents())?;

        let mut documents = Vec::new();
        for id in by_path.get((self.tool_id().get(), file_path))? {
            if let Some(guard) = rows.get(id?.value())? {
                documents.push(decode(guard.value())?);
            }
        }
        Ok(documents)
    }

    /// Delete a document and its chunks. Returns false if it did not exist.
    pub fn delete_document(&self, id: u64) -> Result<bool, StoreError> {
        let tables = &self.tables;
        self.conn.transaction(|txn| -> Result<bool, StoreError> {
            ensure_tables(txn, tables)?;
            Ok(delete_document_in(txn, tables, id)?.is_some())
        })
    }

    /// Add a chunk to an existing document
    pub fn insert_chunk(&self, chunk: NewChunk) -> Result<u64, StoreError> {
        if chunk.start_position >= chunk.end_position {
            return Err(StoreError::InvalidSpan {
                start: chunk.start_position,
                end: chunk.end_position,
            });
        }

        let tool = self.tool_id().get();
        let tables = &self.tables;

        self.conn.transaction(|txn| -> Result<u64, StoreError> {
            ensure_tables(txn, tables)?;

            let document_exists = {
                let documents = txn.open_table(tables.documents())?;
                let exists = documents.get(chunk.document_id)?.is_some();
                exists
            };
            if !document_exists {
                return Err(StoreError::Constraint(format!(
                    "document {} does not exist in {}",
                    chunk.document_id,
                    tables.documents_name()
                )));
            }

            let row = VectorChunk {
                id: next_id(txn, tables.vectors_name())?,
                tool_id: tables.tool_id(),
                document_id: chunk.document_id,
                chunk_text: chunk.chunk_text,
                start_position: chunk.start_position,
                end_position: chunk.end_position,
                embedding: chunk.embedding,
                created_at: Utc::now(),
            };

            {
                let mut rows = txn.open_table(tables.vectors())?;
                let value = serde_json::to_vec(&row)?;
                rows.insert(row.id, value.as_slice())?;
            }
            {
                let mut by_embedding = txn.open_multimap_table(tables.vectors_by_embedding())?;
                by_embedding.insert(row.embedding.as_slice(), row.id)?;
            }
            {
                let mut by_doc = txn.open_multimap_table(tables.vectors_by_tool_doc())?;
                by_doc.insert((tool, row.document_id), row.id)?;
            }
            {
                let mut by_position = txn.open_multimap_table(tables.vectors_by_position())?;
                by_position.insert(
                    (row.document_id, row.start_position, row.end_position),
                    row.id,
                )?;
            }

            Ok(row.id)
        })
    }

    /// Chunks of a document, ordered by (start, end)
    pub fn chunks_for_document(&self, document_id: u64) -> Result<Vec<VectorChunk>, StoreError> {
        let txn = self.conn.read()?;
        let by_position = open_read_multimap(&txn, self.tables.vectors_by_position())?;
        let rows = open_read(&txn, self.tables.vectors())?;

        let mut chunks = Vec::new();
        let span = (document_id, 0u64, 0u64)..=(document_id, u64::MAX, u64::MAX);
        for entry in by_position.range(span)? {
            let (_position, ids) = entry?;
            for id in ids {
                if let Some(guard) = rows.get(id?.value())? {
                    chunks.push(decode(guard.value())?);
                }
            }
        }
        Ok(chunks)
    }

    /// Chunks whose embedding bytes equal `embedding`
    pub fn find_by_embedding(&self, embedding: &[u8]) -> Result<Vec<VectorChunk>, StoreError> {
        let txn = self.conn.read()?;
        let by_embedding = open_read_multimap(&txn, self.tables.vectors_by_embedding())?;
        let rows = open_read(&txn, self.tables.vectors())?;

        let mut chunks = Vec::new();
        for id in by_embedding.get(embedding)? {
            if let Some(guard) = rows.get(id?.value())? {
                chunks.push(decode(guard.value())?);
            }
        }
        Ok(chunks)
    }

    /// Number of stored chunks across all documents
    pub fn chunk_count(&self) -> Result<usize, StoreError> {
        let txn = self.conn.read()?;
        let rows = open_read(&txn, self.tables.vectors())?;
        let mut count = 0;
        for item in rows.iter()? {
            item?;
            count += 1;
        }
        Ok(count)
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Writes must never re-create a torn-down tool's tables
fn ensure_tables(txn: &WriteTransaction, tables: &ToolTables) -> Result<(), StoreError> {
    for name in [tables.documents_name(), tables.vectors_name()] {
        if !table_exists(txn, name)? {
            return Err(StoreError::MissingTable(name.to_string()));
        }
    }
    Ok(())
}

fn open_read<K, V>(
    txn: &ReadTransaction,
    definition: TableDefinition<'_, K, V>,
) -> Result<ReadOnlyTable<K, V>, StoreError>
where
    K: redb::Key + 'static,
    V: redb::Value + 'static,
{
    txn.open_table(definition).map_err(|e| match e {
        TableError::TableDoesNotExist(name) => StoreError::MissingTable(name),
        other => other.into(),
    })
}

fn open_read_multimap<K, V>(
    txn: &ReadTransaction,
    definition: MultimapTableDefinition<'_, K, V>,
) -> Result<ReadOnlyMultimapTable<K, V>, StoreError>
where
    K: redb::Key + 'static,
    V: redb::Key + 'static,
{
    txn.open_multimap_table(definition).map_err(|e| match e {
        TableError::TableDoesNotExist(name) => StoreError::MissingTable(name),
        other => other.into(),
    })
}

/// Remove a document row, its index entries and its chunks
fn delete_document_in(
    txn: &WriteTransaction,
    tables: &ToolTables,
    id: u64,
) -> Result<Option<Document>, StoreError> {
    let tool = tables.tool_id().get();

    let document: Document = {
        let mut rows = txn.open_table(tables.documents())?;
        let removed = rows.remove(id)?;
        let Some(guard) = removed else {
            return Ok(None);
        };
        let document = decode(guard.value())?;
        document
    };

    let chunk_ids: Vec<u64> = {
        let by_doc = txn.open_multimap_table(tables.vectors_by_tool_doc())?;
        let mut ids = Vec::new();
        for chunk_id in by_doc.get((tool, id))? {
            ids.push(chunk_id?.value());
        }
        ids
    };
    for chunk_id in chunk_ids {
        delete_chunk_in(txn, tables, chunk_id)?;
    }

    {
        let mut by_tool = txn.open_multimap_table(tables.documents_by_tool())?;
        by_tool.remove(tool, id)?;
    }
    {
        let mut unique = txn.open_table(tables.documents_path_hash())?;
        unique.remove((
            tool,
            document.file_path.as_str(),
            document.content_hash.as_str(),
        ))?;
    }
    {
        let mut by_path = txn.open_multimap_table(tables.documents_by_tool_path())?;
        by_path.remove((tool, document.file_path.as_str()), id)?;
    }

    Ok(Some(document))
}

fn delete_chunk_in(
    txn: &WriteTransaction,
    tables: &ToolTables,
    id: u64,
) -> Result<(), StoreError> {
    let chunk: VectorChunk = {
        let mut rows = txn.open_table(tables.vectors())?;
        let removed = rows.remove(id)?;
        let Some(guard) = removed else {
            return Ok(());
        };
        let chunk = decode(guard.value())?;
        chunk
    };

    {
        let mut by_embedding = txn.open_multimap_table(tables.vectors_by_embedding())?;
        by_embedding.remove(chunk.embedding.as_slice(), id)?;
    }
    {
        let mut by_doc = txn.open_multimap_table(tables.vectors_by_tool_doc())?;
        by_doc.remove((chunk.tool_id.get(), chunk.document_id), id)?;
    }
    {
        let mut by_position = txn.open_multimap_table(tables.vectors_by_position())?;
        by_position.remove(
            (chunk.document_id, chunk.start_position, chunk.end_position),
            id,
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SchemaManager;
    use tempfile::TempDir;

    fn setup(tool_id: ToolId) -> (TempDir, Connection) {
        let temp_dir = TempDir::new().unwrap();
        let conn = Connection::new(temp_dir.path().join("tools.redb"));
        let schema = SchemaManager::new(&conn);
        schema.initialize().unwrap();
        schema.provision(tool_id).unwrap();
        (temp_dir, conn)
    }

    fn chunk(document_id: u64, start: u64, end: u64, embedding: &[u8]) -> NewChunk {
        NewChunk {
            document_id,
            chunk_text: format!("chunk {start}..{end}"),
            start_position: start,
            end_position: end,
            embedding: embedding.to_vec(),
        }
    }

    #[test]
    fn test_upsert_document_dedupes_by_hash() {
        let (_temp_dir, conn) = setup(ToolId(1));
        let store = ToolDataStore::new(&conn, ToolId(1));

        let first = store.upsert_document("src/lib.rs", "pub fn a() {}").unwrap();
        assert!(matches!(first, DocumentWrite::Created(_)));

        let again = store.upsert_document("src/lib.rs", "pub fn a() {}").unwrap();
        assert_eq!(again, DocumentWrite::Unchanged(first.id()));

        assert_eq!(store.documents().unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_document_replaces_old_version() {
        let (_temp_dir, conn) = setup(ToolId(1));
        let store = ToolDataStore::new(&conn, ToolId(1));

        let first = store.upsert_document("src/lib.rs", "v1").unwrap();
        store
            .insert_chunk(chunk(first.id(), 0, 2, b"emb-v1"))
            .unwrap();

        let second = store.upsert_document("src/lib.rs", "v2").unwrap();
        assert_eq!(
            second,
            DocumentWrite::Replaced {
                id: second.id(),
                previous: first.id()
            }
        );
        assert_ne!(second.id(), first.id());

        let versions = store.documents_at("src/lib.rs").unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].content, "v2");
        assert_eq!(versions[0].content_hash, Document::hash_content("v2"));

        assert!(store.get_document(first.id()).unwrap().is_none());
        assert_eq!(store.chunk_count().unwrap(), 0);
        assert!(store.find_by_embedding(b"emb-v1").unwrap().is_empty());
    }

    #[test]
    fn test_chunks_ordered_by_position() {
        let (_temp_dir, conn) = setup(ToolId(2));
        let store = ToolDataStore::new(&conn, ToolId(2));
        let doc = store.upsert_document("README.md", "hello world").unwrap().id();

        store.insert_chunk(chunk(doc, 6, 11, b"b")).unwrap();
        store.insert_chunk(chunk(doc, 0, 5, b"a")).unwrap();

        let chunks = store.chunks_for_document(doc).unwrap();
        let spans: Vec<(u64, u64)> = chunks
            .iter()
            .map(|c| (c.start_position, c.end_position))
            .collect();
        assert_eq!(spans, vec![(0, 5), (6, 11)]);
        assert!(chunks.iter().all(|c| c.tool_id == ToolId(2)));

        let found = store.find_by_embedding(b"a").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].start_position, 0);
    }

    #[test]
    fn test_insert_chunk_rejects_bad_span_and_unknown_document() {
        let (_temp_dir, conn) = setup(ToolId(1));
        let store = ToolDataStore::new(&conn, ToolId(1));
        let doc = store.upsert_document("a.txt", "abc").unwrap().id();

        let err = store.insert_chunk(chunk(doc, 3, 3, b"x")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidSpan { start: 3, end: 3 }));

        let err = store.insert_chunk(chunk(doc + 100, 0, 1, b"x")).unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));

        assert_eq!(store.chunk_count().unwrap(), 0);
    }

    #[test]
    fn test_delete_document_cascades_to_chunks() {
        let (_temp_dir, conn) = setup(ToolId(1));
        let store = ToolDataStore::new(&conn, ToolId(1));
        let keep = store.upsert_document("keep.rs", "keep").unwrap().id();
        let gone = store.upsert_document("drop.rs", "gone").unwrap().id();

        store.insert_chunk(chunk(keep, 0, 4, b"k")).unwrap();
        store.insert_chunk(chunk(gone, 0, 2, b"d1")).unwrap();
        store.insert_chunk(chunk(gone, 2, 4, b"d2")).unwrap();

        assert!(store.delete_document(gone).unwrap());
        assert!(!store.delete_document(gone).unwrap());

        assert_eq!(store.chunk_count().unwrap(), 1);
        assert!(store.chunks_for_document(gone).unwrap().is_empty());
        assert_eq!(store.chunks_for_document(keep).unwrap().len(), 1);

        // the same content can come back after deletion
        let again = store.upsert_document("drop.rs", "gone").unwrap();
        assert!(matches!(again, DocumentWrite::Created(_)));
    }

    #[test]
    fn test_torn_down_tool_is_not_recreated() {
        let (_temp_dir, conn) = setup(ToolId(1));
        let store = ToolDataStore::new(&conn, ToolId(1));
        store.upsert_document("a.rs", "a").unwrap();

        SchemaManager::new(&conn).teardown(ToolId(1)).unwrap();

        let err = store.upsert_document("a.rs", "a").unwrap_err();
        assert!(matches!(err, StoreError::MissingTable(name) if name == "documents_1"));

        let err = store.documents().unwrap_err();
        assert!(matches!(err, StoreError::MissingTable(_)));

        assert!(SchemaManager::new(&conn)
            .existing_tables(ToolId(1))
            .unwrap()
            .is_empty());
    }
}
