use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "histsync")]
#[command(about = "Tail terminal and AI session history into an indexing endpoint")]
#[command(version)]
pub struct Cli {
    /// State directory (default: $HISTSYNC_PATH, then the XDG data dir).
    #[arg(long, global = true)]
    pub state_dir: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the ingestion daemon in the foreground")]
    Run {
        /// Run a single poll cycle and exit instead of looping.
        #[arg(long)]
        once: bool,
    },

    #[command(about = "Write a default config.toml into the state directory")]
    Init {
        /// Overwrite an existing config file.
        #[arg(long)]
        force: bool,
    },

    #[command(about = "Show the daemon's last status snapshot")]
    Status {
        #[arg(long)]
        json: bool,
    },

    #[command(about = "List the sources the daemon would poll right now")]
    Sources,
}
