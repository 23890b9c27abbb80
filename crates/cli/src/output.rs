//! Rendering of tools for the terminal.

use serde::{Deserialize, Serialize};
use toolreg_core::Tool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

const HEADERS: [&str; 6] = ["ID", "NAME", "ACTIVE", "VERSION", "SOURCE", "DESCRIPTION"];

pub fn render_tools(tools: &[Tool], format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(tools),
        OutputFormat::Table => Ok(tools_table(tools)),
    }
}

pub fn render_tool(tool: &Tool, format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(tool),
        OutputFormat::Table => Ok(tool_details(tool)),
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn tools_table(tools: &[Tool]) -> String {
    if tools.is_empty() {
        return "No tools registered".to_string();
    }

    let rows: Vec<[String; 6]> = tools
        .iter()
        .map(|tool| {
            [
                tool.id.to_string(),
                tool.name.clone(),
                yes_no(tool.is_active).to_string(),
                tool.app_version.clone().unwrap_or_else(|| "-".to_string()),
                tool.source_directory.display().to_string(),
                tool.description.clone(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(|header| header.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(format_row(HEADERS.iter().copied(), &widths));
    for row in &rows {
        lines.push(format_row(row.iter().map(String::as_str), &widths));
    }
    lines.join("\n")
}

fn format_row<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let line = cells
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn tool_details(tool: &Tool) -> String {
    let fields = [
        ("ID", tool.id.to_string()),
        ("Name", tool.name.clone()),
        ("Description", tool.description.clone()),
        ("Source", tool.source_directory.display().to_string()),
        ("Active", yes_no(tool.is_active).to_string()),
        (
            "App version",
            tool.app_version.clone().unwrap_or_else(|| "-".to_string()),
        ),
        ("Created", tool.created_at.to_rfc3339()),
        ("Updated", tool.updated_at.to_rfc3339()),
    ];

    fields
        .iter()
        .map(|(label, value)| format!("{:<13}{}", format!("{label}:"), value))
        .collect::<Vec<_>>()
        .join("\n")
}
