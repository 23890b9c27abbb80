//! Tool registry: validation, persistence and per-tool schema lifecycle.
//!
//! Every mutating operation runs in one write transaction, so a registry
//! row never exists without its per-tool tables and vice versa.

use chrono::Utc;
use redb::{ReadTransaction, ReadableTable, WriteTransaction};
use std::sync::Arc;

use crate::error::{RegistryError, RegistryResult, StoreError};
use crate::storage::schema::{self, next_id, TOOLS_BY_NAME_TABLE, TOOLS_TABLE};
use crate::storage::{Connection, SchemaManager, ToolDataStore};
use crate::types::{Tool, ToolId};
use crate::validation::{validate_tool_name, DirectoryValidator, FsDirectoryValidator};

/// Everything the registry needs, built once at startup and handed in
pub struct RegistryDeps {
    pub connection: Connection,
    pub directory_validator: Arc<dyn DirectoryValidator>,
}

impl RegistryDeps {
    /// Dependencies with the filesystem directory validator
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            directory_validator: Arc::new(FsDirectoryValidator),
        }
    }

    pub fn with_directory_validator(mut self, validator: impl DirectoryValidator + 'static) -> Self {
        self.directory_validator = Arc::new(validator);
        self
    }
}

/// Registry of tools backed by one store
pub struct ToolRegistry {
    conn: Connection,
    directory_validator: Arc<dyn DirectoryValidator>,
}

impl ToolRegistry {
    /// Create the registry, initializing the global tables if needed
    pub fn new(deps: RegistryDeps) -> RegistryResult<Self> {
        SchemaManager::new(&deps.connection).initialize()?;

        Ok(Self {
            conn: deps.connection,
            directory_validator: deps.directory_validator,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn schema(&self) -> SchemaManager<'_> {
        SchemaManager::new(&self.conn)
    }

    /// Document and vector access for a registered tool
    pub fn data_store(&self, tool: &Tool) -> ToolDataStore<'_> {
        ToolDataStore::new(&self.conn, tool.id)
    }

    /// Register a new tool and provision its tables
    pub fn add(
        &self,
        name: &str,
        description: &str,
        source_directory: &str,
        app_version: Option<&str>,
    ) -> RegistryResult<ToolId> {
        validate_tool_name(name)?;
        let source_directory = self.directory_validator.validate(source_directory)?;

        let id = self.conn.transaction(|txn| -> RegistryResult<ToolId> {
            if find_id_in(txn, name)?.is_some() {
                return Err(RegistryError::AlreadyExists(name.to_string()));
            }

            let now = Utc::now();
            let tool = Tool {
                id: ToolId::new(next_id(txn, TOOLS_TABLE_NAME)?),
                name: name.to_string(),
                description: description.to_string(),
                source_directory,
                is_active: true,
                app_version: app_version.map(str::to_string),
                created_at: now,
                updated_at: now,
            };

            store_tool_in(txn, &tool)?;
            schema::provision_in(txn, tool.id)?;
            Ok(tool.id)
        })?;

        tracing::info!("Added tool '{}' with ID {}", name, id);
        Ok(id)
    }

    /// Get a tool by exact name
    pub fn get_by_name(&self, name: &str) -> RegistryResult<Option<Tool>> {
        let txn = self.conn.read()?;
        let by_name = txn.open_table(TOOLS_BY_NAME_TABLE).map_err(StoreError::from)?;
        let id = by_name
            .get(name)
            .map_err(StoreError::from)?
            .map(|guard| guard.value());

        match id {
            Some(id) => Ok(load_tool_read(&txn, id)?),
            None => {
                tracing::debug!("Tool '{}' not found", name);
                Ok(None)
            }
        }
    }

    /// Get a tool by ID
    pub fn get_by_id(&self, id: ToolId) -> RegistryResult<Option<Tool>> {
        let txn = self.conn.read()?;
        Ok(load_tool_read(&txn, id.get())?)
    }

    /// List tools ordered by name, optionally only active ones
    pub fn list(&self, active_only: bool) -> RegistryResult<Vec<Tool>> {
        Ok(list_tools(&self.conn, active_only)?)
    }

    /// Change a tool's description and/or source directory.
    ///
    /// Returns false if the tool does not exist. With nothing to change it
    /// returns true without writing.
    pub fn update(
        &self,
        name: &str,
        description: Option<&str>,
        source_directory: Option<&str>,
    ) -> RegistryResult<bool> {
        if self.get_by_name(name)?.is_none() {
            return Ok(false);
        }
        if description.is_none() && source_directory.is_none() {
            return Ok(true);
        }

        let source_directory = source_directory
            .map(|path| self.directory_validator.validate(path))
            .transpose()?;

        let updated = self.conn.transaction(|txn| -> RegistryResult<bool> {
            let Some(mut tool) = find_tool_in(txn, name)? else {
                return Ok(false);
            };

            if let Some(description) = description {
                tool.description = description.to_string();
            }
            if let Some(source_directory) = source_directory {
                tool.source_directory = source_directory;
            }
            tool.updated_at = Utc::now();

            store_tool_in(txn, &tool)?;
            Ok(true)
        })?;

        if updated {
            tracing::info!("Updated tool '{}'", name);
        }
        Ok(updated)
    }

    /// Remove a tool and drop its tables. Returns false if it does not exist.
    pub fn delete(&self, name: &str) -> RegistryResult<bool> {
        let removed = self.conn.transaction(|txn| -> RegistryResult<Option<ToolId>> {
            let Some(tool) = find_tool_in(txn, name)? else {
                return Ok(None);
            };

            schema::teardown_in(txn, tool.id)?;
            remove_tool_in(txn, &tool)?;
            Ok(Some(tool.id))
        })?;

        match removed {
            Some(id) => {
                tracing::info!("Deleted tool '{}' (ID {})", name, id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Mark a tool active
    pub fn enable(&self, name: &str) -> RegistryResult<bool> {
        self.set_active(name, true)
    }

    /// Mark a tool inactive
    pub fn disable(&self, name: &str) -> RegistryResult<bool> {
        self.set_active(name, false)
    }

    fn set_active(&self, name: &str, is_active: bool) -> RegistryResult<bool> {
        let changed = self.conn.transaction(|txn| -> RegistryResult<bool> {
            let Some(mut tool) = find_tool_in(txn, name)? else {
                return Ok(false);
            };

            tool.is_active = is_active;
            tool.updated_at = Utc::now();
            store_tool_in(txn, &tool)?;
            Ok(true)
        })?;

        if changed {
            tracing::info!(
                "Tool '{}' {}",
                name,
                if is_active { "enabled" } else { "disabled" }
            );
        }
        Ok(changed)
    }
}

/// Sequence key for tool ids
const TOOLS_TABLE_NAME: &str = "tools";

fn decode_tool(bytes: &[u8]) -> Result<Tool, StoreError> {
    Ok(serde_json::from_slice(bytes)?)
}

fn load_tool<T>(table: &T, id: u64) -> Result<Option<Tool>, StoreError>
where
    T: ReadableTable<u64, &'static [u8]>,
{
    let tool = match table.get(id)? {
        Some(guard) => Some(decode_tool(guard.value())?),
        None => None,
    };
    Ok(tool)
}

fn load_tool_read(txn: &ReadTransaction, id: u64) -> Result<Option<Tool>, StoreError> {
    let tools = txn.open_table(TOOLS_TABLE)?;
    load_tool(&tools, id)
}

fn list_tools(conn: &Connection, active_only: bool) -> Result<Vec<Tool>, StoreError> {
    let txn = conn.read()?;
    let by_name = txn.open_table(TOOLS_BY_NAME_TABLE)?;
    let tools = txn.open_table(TOOLS_TABLE)?;

    // The name index iterates in byte order of the name
    let mut result = Vec::new();
    for item in by_name.iter()? {
        let (_name, id) = item?;
        if let Some(tool) = load_tool(&tools, id.value())? {
            if !active_only || tool.is_active {
                result.push(tool);
            }
        }
    }
    Ok(result)
}

fn find_id_in(txn: &WriteTransaction, name: &str) -> Result<Option<u64>, StoreError> {
    let by_name = txn.open_table(TOOLS_BY_NAME_TABLE)?;
    let id = by_name.get(name)?.map(|guard| guard.value());
    Ok(id)
}

fn find_tool_in(txn: &WriteTransaction, name: &str) -> Result<Option<Tool>, StoreError> {
    let Some(id) = find_id_in(txn, name)? else {
        return Ok(None);
    };
    let tools = txn.open_table(TOOLS_TABLE)?;
    load_tool(&tools, id)
}

fn store_tool_in(txn: &WriteTransaction, tool: &Tool) -> Result<(), StoreError> {
    let value = serde_json::to_vec(tool)?;
    {
        let mut tools = txn.open_table(TOOLS_TABLE)?;
        tools.insert(tool.id.get(), value.as_slice())?;
    }
    let mut by_name = txn.open_table(TOOLS_BY_NAME_TABLE)?;
    by_name.insert(tool.name.as_str(), tool.id.get())?;
    Ok(())
}

fn remove_tool_in(txn: &WriteTransaction, tool: &Tool) -> Result<(), StoreError> {
    {
        let mut tools = txn.open_table(TOOLS_TABLE)?;
        tools.remove(tool.id.get())?;
    }
    let mut by_name = txn.open_table(TOOLS_BY_NAME_TABLE)?;
    by_name.remove(tool.name.as_str())?;
    Ok(())
}
