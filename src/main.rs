mod config;
mod context;

use anyhow::{Context, Result};
use clap::Parser;
use config::{Command, Config};
use context::GlobalContext;
use nestjail::{Jail, Kernel};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let config = Config::parse();
    init_tracing(config.debug.verbose);

    let context = GlobalContext::init().context("Failed to create global context")?;
    if !context.root() {
        tracing::warn!(
            ruid = %context.ruid(),
            euid = %context.euid(),
            level = ?context.privilege_level(),
            "not running as root; the kernel will refuse most jail operations"
        );
    }

    run(config.command)
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Create { attach, params } => {
            let params = params.load()?;
            let jail = match attach {
                true => Jail::create_and_attach(&params),
                false => Jail::create(&params),
            }
            .context("Failed to create jail")?;
            println!("{}", jail.id());
        }
        Command::CreateChild { parent, params } => {
            let params = params.load()?;
            let parent = lookup(&parent)?;
            let child = parent
                .create_child(&params)
                .with_context(|| format!("Failed to create child of {}", parent.name()))?;
            println!("{}", child.id());
        }
        Command::Get { jail } => {
            let jail = lookup(&jail)?;
            println!("{} {}", jail.id(), jail.name());
        }
        Command::Set { jail, params } => {
            let params = params.load()?;
            let jail = lookup(&jail)?;
            jail.set(&params)
                .with_context(|| format!("Failed to update {}", jail.name()))?;
            println!("{}", jail.id());
        }
        Command::Destroy { jail } => {
            let jail = lookup(&jail)?;
            jail.destroy()
                .with_context(|| format!("Failed to destroy {}", jail.name()))?;
            println!("{}", jail.id());
        }
    }

    Ok(())
}

/// Resolves a jail given by name or jid.
fn lookup(jail: &str) -> Result<Jail> {
    let jid = Kernel::host()
        .get_id(jail)
        .with_context(|| format!("No such jail: {jail}"))?;
    Jail::get_by_id(jid).with_context(|| format!("Failed to read jail {jid}"))
}
