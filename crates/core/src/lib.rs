// Core types and storage for the toolreg tool registry

pub mod error;
pub mod registry;
pub mod storage;
pub mod types;
pub mod validation;

pub use error::{DirectoryError, NameError, RegistryError, RegistryResult, StoreError};
pub use registry::{RegistryDeps, ToolRegistry};
pub use types::*;
