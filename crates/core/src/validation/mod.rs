//! Input validation for tool names and source directories.

pub mod directory;
pub mod name;

pub use directory::{DirectoryValidator, FsDirectoryValidator};
pub use name::{validate_tool_name, MAX_TOOL_NAME_LEN};
