pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "clinica")]
#[command(about = "Clinica CLI - operator tooling for the clinic management API")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Create or migrate the central registry database")]
    Init(commands::init::InitArgs),

    #[command(about = "Organization registry and tenant provisioning")]
    Org {
        #[command(subcommand)]
        cmd: commands::org::OrgCommands,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Init(args) => commands::init::run(args, cli.json).await,
        Commands::Org { cmd } => commands::org::run(cmd, cli.json).await,
    }
}
