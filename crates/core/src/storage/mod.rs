pub mod connection;
pub mod documents;
pub mod schema;

pub use connection::Connection;
pub use documents::ToolDataStore;
pub use schema::{
    index_name, table_name, table_name_from_raw, IndexKind, SchemaManager, TableKind, ToolTables,
};
