mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand, incident::IncidentSubcommand, rules::RulesSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "distill",
    about = "Distill incident postmortems into a size-capped set of operating rules",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .distill/ or .git/)
    #[arg(long, global = true, env = "DISTILL_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize distill in the current project
    Init {
        /// Project name (default: root directory name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Record and query incident postmortems
    Incident {
        #[command(subcommand)]
        subcommand: IncidentSubcommand,
    },

    /// Inspect the ruleset and drive change proposals through approval
    Rules {
        #[command(subcommand)]
        subcommand: RulesSubcommand,
    },

    /// Recall past incidents and their rules for a piece of work
    Recall {
        /// Keyword describing the work (repeatable)
        #[arg(long = "keyword", short = 'k')]
        keywords: Vec<String>,

        /// Incident known to be relevant (repeatable)
        #[arg(long = "incident", short = 'i')]
        incidents: Vec<String>,

        /// YAML work description with `keywords` and `incidents` lists
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Show the outcome log of past proposals
    History {
        /// Only the most recent N entries
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Inspect and validate the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init { name } => cmd::init::run(&root, name.as_deref()),
        Commands::Incident { subcommand } => cmd::incident::run(&root, subcommand, cli.json),
        Commands::Rules { subcommand } => cmd::rules::run(&root, subcommand, cli.json),
        Commands::Recall {
            keywords,
            incidents,
            file,
        } => cmd::recall::run(&root, keywords, incidents, file.as_deref(), cli.json),
        Commands::History { limit } => cmd::history::run(&root, limit, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
