//! Subcommand argument types.

use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum WeightsCommand {
    /// List trained weights for every pipeline
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rename a trained weight entry
    Rename {
        /// Current name
        name: String,

        /// New name
        new_name: String,

        /// Pipeline the weights belong to (defaults to the configured pipeline)
        #[arg(short, long)]
        pipeline: Option<String>,
    },

    /// Delete a trained weight entry
    Delete {
        /// Name of the weights
        name: String,

        /// Pipeline the weights belong to (defaults to the configured pipeline)
        #[arg(short, long)]
        pipeline: Option<String>,
    },
}
