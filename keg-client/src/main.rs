//! `keg`: mirror and inspect NGDP builds.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use keg_core::{Error, Keg};

#[derive(Parser)]
#[command(name = "keg", about = "Content-addressed mirror for NGDP builds", version)]
struct Cli {
    /// Repository directory
    #[arg(long, default_value = ".ngdp", global = true)]
    ngdp_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize a repository
    Init,

    /// Manage remotes
    Remote {
        #[command(subcommand)]
        action: RemoteAction,
    },

    /// Fetch builds from remotes (all default-fetch remotes when none given)
    Fetch {
        remotes: Vec<String>,

        /// Stop after the metadata phase
        #[arg(long)]
        metadata_only: bool,

        /// Parallel fetches per drain
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
    },

    /// Inspect mirrored metadata
    Inspect {
        #[command(subcommand)]
        target: commands::InspectTarget,
    },

    /// Verify every object in the local store
    Verify,
}

#[derive(Subcommand)]
enum RemoteAction {
    /// Track a remote
    Add {
        remote: String,

        /// Exclude from parameterless `fetch`
        #[arg(long)]
        no_fetch: bool,

        /// Mark the remote writeable
        #[arg(long)]
        writeable: bool,
    },

    /// Stop tracking a remote
    Rm { remote: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            match e.downcast_ref::<Error>() {
                Some(Error::RepositoryNotFound { .. }) => ExitCode::from(2),
                _ => ExitCode::from(1),
            }
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Init => {
            let mut keg = Keg::open(&cli.ngdp_dir)?;
            let created = keg.initialize()?;
            println!(
                "{} in {}",
                if created { "Initialized" } else { "Reinitialized" },
                keg.path().display()
            );
            Ok(())
        }

        Command::Remote { action } => {
            let mut keg = Keg::open_existing(&cli.ngdp_dir)?;
            match action {
                RemoteAction::Add {
                    remote,
                    no_fetch,
                    writeable,
                } => {
                    let remote = keg.clean_remote(&remote);
                    keg.config.add_remote(&remote, !no_fetch, writeable)?;
                    println!("Added remote {remote}");
                }
                RemoteAction::Rm { remote } => {
                    let remote = keg.clean_remote(&remote);
                    keg.config.remove_remote(&remote)?;
                    println!("Removed remote {remote}");
                }
            }
            Ok(())
        }

        Command::Fetch {
            remotes,
            metadata_only,
            concurrency,
        } => {
            let keg = Keg::open_existing(&cli.ngdp_dir)?;
            commands::fetch(&keg, &remotes, metadata_only, concurrency).await
        }

        Command::Inspect { target } => {
            let keg = Keg::open_existing(&cli.ngdp_dir)?;
            commands::inspect(&keg, &target)
        }

        Command::Verify => {
            let keg = Keg::open_existing(&cli.ngdp_dir)?;
            commands::verify(&keg)
        }
    }
}
