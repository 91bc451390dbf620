//! surgical-modifier -- MCP server for precise, reversible source edits.
//!
//! Usage: surgical-modifier [--workspace <path>] [--init]
//!
//! `--init` writes a default `.surgeon/config.toml` into the workspace and exits.

use anyhow::Context;

fn main() -> anyhow::Result<()> {
    // Initialize tracing to stderr so it does not interfere with MCP stdio.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let workspace = args
        .iter()
        .skip_while(|a| *a != "--workspace")
        .nth(1)
        .map_or(".", String::as_str);

    let workspace = std::path::Path::new(workspace)
        .canonicalize()
        .with_context(|| format!("workspace not found: {workspace}"))?;

    if args.iter().any(|a| a == "--init") {
        let path = surgical_modifier::SurgeonConfig::init(&workspace)?;
        eprintln!("wrote {}", path.display());
        return Ok(());
    }

    let config = surgical_modifier::server::McpServerConfig { workspace };
    surgical_modifier::run_mcp_server(config)
}
