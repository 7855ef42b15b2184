use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use nestjail::ParamSet;
use std::{fs, path::PathBuf};

const HEADING_PARAMS: &str = "Parameters";
const HEADING_DEBUG: &str = "Debug";

#[derive(Parser, Debug)]
#[command(name = "nestjail", about = "Create, inspect and nest FreeBSD jails")]
pub struct Config {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub debug: DebugOptions,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a jail
    Create {
        #[arg(long, help = "Attach this process to the new jail")]
        attach: bool,

        #[command(flatten)]
        params: ParamOptions,
    },

    /// Create a jail nested inside another one
    CreateChild {
        #[arg(long, help = "Parent jail, by name or jid")]
        parent: String,

        #[command(flatten)]
        params: ParamOptions,
    },

    /// Print the jid and name of a jail
    Get {
        #[arg(help = "Jail name or jid")]
        jail: String,
    },

    /// Update parameters of an existing jail
    Set {
        #[arg(help = "Jail name or jid")]
        jail: String,

        #[command(flatten)]
        params: ParamOptions,
    },

    /// Remove a jail, killing its processes
    Destroy {
        #[arg(help = "Jail name or jid")]
        jail: String,
    },
}

#[derive(Args, Debug)]
pub struct ParamOptions {
    #[arg(
        long = "params",
        value_name = "FILE",
        help = "Load parameters from a JSON object",
        help_heading = HEADING_PARAMS
    )]
    pub file: Option<PathBuf>,

    #[arg(
        value_name = "KEY=VALUE",
        help = "Jail parameter; a bare KEY sets a boolean",
        help_heading = HEADING_PARAMS
    )]
    pub assignments: Vec<String>,
}

impl ParamOptions {
    /// File parameters first, then positional assignments on top.
    pub fn load(&self) -> Result<ParamSet> {
        let mut params = match &self.file {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                serde_json::from_str::<ParamSet>(&text)
                    .with_context(|| format!("Invalid parameter file {}", path.display()))?
            }
            None => ParamSet::new(),
        };

        params.extend(
            self.assignments
                .iter()
                .map(|arg| nestjail::ParamValue::parse_assignment(arg))
                .collect(),
        );
        Ok(params)
    }
}

#[derive(Args, Debug)]
pub struct DebugOptions {
    #[arg(
        long,
        short,
        global = true,
        help = "Log every kernel call",
        help_heading = HEADING_DEBUG
    )]
    pub verbose: bool,
}
