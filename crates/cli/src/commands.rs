use clap::Subcommand;
use std::io::Write;
use toolreg_core::RegistryError;

use crate::config::AppState;
use crate::output::{render_tool, render_tools, OutputFormat};

#[derive(Subcommand, Debug)]
pub enum ToolCommand {
    /// Register a new tool
    Add {
        /// Tool name
        #[arg(short, long)]
        name: String,

        /// Tool description
        #[arg(short, long)]
        description: String,

        /// Source directory
        #[arg(short, long)]
        source: String,

        /// Version of the tool's application
        #[arg(long)]
        app_version: Option<String>,
    },

    /// List registered tools
    List {
        /// Only show active tools
        #[arg(long)]
        active: bool,

        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Show one tool
    Show {
        name: String,

        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Change a tool's description or source directory
    Update {
        name: String,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long)]
        source: Option<String>,
    },

    /// Remove a tool and everything stored for it
    Delete { name: String },

    /// Mark a tool active
    Enable { name: String },

    /// Mark a tool inactive
    Disable { name: String },
}

/// Why a command did not succeed
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Bad input or missing tool; the message is meant for the user.
    #[error("{0}")]
    Rejected(String),

    #[error("Unexpected error: {0:#}")]
    Unexpected(anyhow::Error),
}

impl CommandError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Rejected(_) => 1,
            Self::Unexpected(_) => 2,
        }
    }

    fn not_found(name: &str) -> Self {
        Self::Rejected(format!("Tool '{name}' not found"))
    }
}

impl From<anyhow::Error> for CommandError {
    fn from(e: anyhow::Error) -> Self {
        Self::Unexpected(e)
    }
}

impl From<RegistryError> for CommandError {
    fn from(e: RegistryError) -> Self {
        if e.is_validation() {
            Self::Rejected(e.to_string())
        } else {
            Self::Unexpected(e.into())
        }
    }
}

impl From<std::io::Error> for CommandError {
    fn from(e: std::io::Error) -> Self {
        Self::Unexpected(e.into())
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(e: serde_json::Error) -> Self {
        Self::Unexpected(e.into())
    }
}

pub fn run(state: &AppState, command: ToolCommand, out: &mut dyn Write) -> Result<(), CommandError> {
    let registry = &state.registry;
    let default_format = state.config.display.default_format;

    match command {
        ToolCommand::Add {
            name,
            description,
            source,
            app_version,
        } => {
            let id = registry.add(&name, &description, &source, app_version.as_deref())?;
            writeln!(out, "Tool '{name}' added successfully with ID: {id}")?;
        }
        ToolCommand::List { active, format } => {
            let tools = registry.list(active)?;
            writeln!(out, "{}", render_tools(&tools, format.unwrap_or(default_format))?)?;
        }
        ToolCommand::Show { name, format } => {
            let tool = registry
                .get_by_name(&name)?
                .ok_or_else(|| CommandError::not_found(&name))?;
            writeln!(out, "{}", render_tool(&tool, format.unwrap_or(default_format))?)?;
        }
        ToolCommand::Update {
            name,
            description,
            source,
        } => {
            if !registry.update(&name, description.as_deref(), source.as_deref())? {
                return Err(CommandError::not_found(&name));
            }
            writeln!(out, "Tool '{name}' updated successfully")?;
        }
        ToolCommand::Delete { name } => {
            if !registry.delete(&name)? {
                return Err(CommandError::not_found(&name));
            }
            writeln!(out, "Tool '{name}' deleted successfully")?;
        }
        ToolCommand::Enable { name } => {
            if !registry.enable(&name)? {
                return Err(CommandError::not_found(&name));
            }
            writeln!(out, "Tool '{name}' enabled")?;
        }
        ToolCommand::Disable { name } => {
            if !registry.disable(&name)? {
                return Err(CommandError::not_found(&name));
            }
            writeln!(out, "Tool '{name}' disabled")?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, ChunkingConfig, DatabaseConfig, DisplayConfig};
    use tempfile::TempDir;
    use toolreg_core::Tool;

    struct Harness {
        _db_dir: TempDir,
        source: TempDir,
        state: AppState,
    }

    impl Harness {
        fn new(default_format: OutputFormat) -> Self {
            let db_dir = TempDir::new().unwrap();
            let config = AppConfig {
                database: DatabaseConfig {
                    path: db_dir.path().join("tools.redb"),
                },
                chunking: ChunkingConfig {
                    size: 1000,
                    overlap: 200,
                },
                display: DisplayConfig { default_format },
            };
            Self {
                _db_dir: db_dir,
                source: TempDir::new().unwrap(),
                state: AppState::new(config).unwrap(),
            }
        }

        fn run(&self, command: ToolCommand) -> Result<String, CommandError> {
            let mut out = Vec::new();
            run(&self.state, command, &mut out)?;
            Ok(String::from_utf8(out).unwrap())
        }

        fn add(&self, name: &str) -> Result<String, CommandError> {
            self.run(ToolCommand::Add {
                name: name.to_string(),
                description: format!("{name} tool"),
                source: self.source.path().to_str().unwrap().to_string(),
                app_version: None,
            })
        }
    }

    #[test]
    fn test_add_prints_id() {
        let h = Harness::new(OutputFormat::Table);
        assert_eq!(
            h.add("alpha").unwrap(),
            "Tool 'alpha' added successfully with ID: 1\n"
        );
    }

    #[test]
    fn test_validation_errors_exit_one() {
        let h = Harness::new(OutputFormat::Table);
        h.add("alpha").unwrap();

        let err = h.add("alpha").unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.to_string(), "Tool 'alpha' already exists");

        let err = h.add("bad name").unwrap_err();
        assert_eq!(err.exit_code(), 1);

        let err = h
            .run(ToolCommand::Add {
                name: "beta".to_string(),
                description: String::new(),
                source: h.source.path().join("missing").to_str().unwrap().to_string(),
                app_version: None,
            })
            .unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().starts_with("Source directory does not exist"));
    }

    #[test]
    fn test_missing_tool_messages() {
        let h = Harness::new(OutputFormat::Table);
        let commands = [
            ToolCommand::Show {
                name: "ghost".to_string(),
                format: None,
            },
            ToolCommand::Update {
                name: "ghost".to_string(),
                description: Some("x".to_string()),
                source: None,
            },
            ToolCommand::Delete {
                name: "ghost".to_string(),
            },
            ToolCommand::Enable {
                name: "ghost".to_string(),
            },
            ToolCommand::Disable {
                name: "ghost".to_string(),
            },
        ];

        for command in commands {
            let err = h.run(command).unwrap_err();
            assert_eq!(err.to_string(), "Tool 'ghost' not found");
            assert_eq!(err.exit_code(), 1);
        }
    }

    #[test]
    fn test_lifecycle_messages() {
        let h = Harness::new(OutputFormat::Table);
        h.add("alpha").unwrap();

        let out = h
            .run(ToolCommand::Update {
                name: "alpha".to_string(),
                description: Some("new".to_string()),
                source: None,
            })
            .unwrap();
        assert_eq!(out, "Tool 'alpha' updated successfully\n");

        let out = h
            .run(ToolCommand::Disable {
                name: "alpha".to_string(),
            })
            .unwrap();
        assert_eq!(out, "Tool 'alpha' disabled\n");

        let out = h
            .run(ToolCommand::List {
                active: true,
                format: None,
            })
            .unwrap();
        assert_eq!(out, "No tools registered\n");

        let out = h
            .run(ToolCommand::Enable {
                name: "alpha".to_string(),
            })
            .unwrap();
        assert_eq!(out, "Tool 'alpha' enabled\n");

        let out = h
            .run(ToolCommand::Delete {
                name: "alpha".to_string(),
            })
            .unwrap();
        assert_eq!(out, "Tool 'alpha' deleted successfully\n");
        assert!(h.state.registry.get_by_name("alpha").unwrap().is_none());
    }

    #[test]
    fn test_format_defaults_to_config() {
        let h = Harness::new(OutputFormat::Json);
        h.add("alpha").unwrap();

        let out = h
            .run(ToolCommand::List {
                active: false,
                format: None,
            })
            .unwrap();
        let tools: Vec<Tool> = serde_json::from_str(&out).unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].description, "alpha tool");

        let out = h
            .run(ToolCommand::Show {
                name: "alpha".to_string(),
                format: Some(OutputFormat::Table),
            })
            .unwrap();
        assert!(out.starts_with("ID:          1\nName:        alpha\n"));
    }
}
