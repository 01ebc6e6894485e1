//! `tools` command: list the built-in tool catalogue.

use prettytable::{format, row, Table};

use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::mcp::types::McpTool;
use crate::tools::ToolRegistry;

/// Print the tools enabled by `config`, as a table or as JSON
pub fn list_tools(config: &Config, json: bool) -> Result<()> {
    let registry = ToolRegistry::with_builtin_tools(&config.tools);
    let definitions = registry.definitions();

    if json {
        let output =
            serde_json::to_string_pretty(&definitions).map_err(RelayError::Serialization)?;
        println!("{}", output);
    } else {
        print_table(&definitions);
    }
    Ok(())
}

fn print_table(definitions: &[McpTool]) {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(row!["Name", "Description", "Required Arguments"]);

    for tool in definitions {
        table.add_row(row![
            tool.name,
            tool.description.as_deref().unwrap_or("-"),
            required_arguments(tool)
        ]);
    }

    println!("\nAvailable tools:\n");
    table.printstd();
    println!();
}

fn required_arguments(tool: &McpTool) -> String {
    let required: Vec<&str> = tool
        .input_schema
        .get("required")
        .and_then(|value| value.as_array())
        .map(|items| items.iter().filter_map(|item| item.as_str()).collect())
        .unwrap_or_default();

    if required.is_empty() {
        "None".to_string()
    } else {
        required.join(", ")
    }
}
