// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use clap::{Parser, Subcommand};
use paramql_cli::commands;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "paramql")]
#[command(author = "Maravilla Labs")]
#[command(version)]
#[command(about = "Parameterized SQL templating compiled to Lua", long_about = None)]
struct Cli {
    /// Log level: error, warn, info, debug, trace
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Template root directory
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// File extension for extension-less template names
    #[arg(long, global = true, default_value = "sql")]
    extension: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a template and print its Lua artifact
    Compile {
        /// Template name, relative to the root
        name: String,
        /// Print only the generated Lua source
        #[arg(long)]
        lua: bool,
    },
    /// Print a template's static metadata as JSON
    Metadata {
        /// Template name, relative to the root
        name: String,
    },
    /// Render a template against a data object
    Render {
        /// Template name, relative to the root
        name: String,
        /// Data as inline JSON, or @path to a JSON file
        #[arg(short, long)]
        data: Option<String>,
        /// Fail on undefined top-level variables
        #[arg(long)]
        strict: bool,
    },
    /// Execute a template and print its result value as JSON
    Execute {
        /// Template name, relative to the root
        name: String,
        /// Data as inline JSON, or @path to a JSON file
        #[arg(short, long)]
        data: Option<String>,
        /// Fail on undefined top-level variables
        #[arg(long)]
        strict: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with the specified log level
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Compile { name, lua } => {
            commands::compile::run(&cli.root, &cli.extension, &name, lua)
        }
        Commands::Metadata { name } => commands::metadata::run(&cli.root, &cli.extension, &name),
        Commands::Render { name, data, strict } => {
            commands::render::run(&cli.root, &cli.extension, &name, data.as_deref(), strict)
        }
        Commands::Execute { name, data, strict } => {
            commands::execute::run(&cli.root, &cli.extension, &name, data.as_deref(), strict)
        }
    }
}
