use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "roomlog")]
#[command(about = "Archive chat room history into a local database", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List the rooms being tracked
    List,

    /// Track a room, optionally with its passcode
    Add {
        room: String,
        passcode: Option<String>,
    },

    /// Stop tracking rooms and delete their archives
    Remove {
        #[arg(required = true)]
        rooms: Vec<String>,
    },

    /// Delete archived messages but keep tracking the rooms
    Reset {
        #[arg(required = true)]
        rooms: Vec<String>,
    },

    /// Catch the archive up (all tracked rooms by default)
    Update { rooms: Vec<String> },

    /// Delete and download rooms from scratch
    Redownload { rooms: Vec<String> },
}
