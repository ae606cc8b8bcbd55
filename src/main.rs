//! Death Counter
//!
//! Watches a screen region of the running game, reads it with Tesseract, and
//! counts deaths per game. Counts are written to small text files for stream
//! overlays.

mod capture;
mod daemon;
mod logging;
mod ocr;
mod paths;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use paths::Paths;

#[derive(Parser)]
#[command(name = "death-counter")]
#[command(version, about = "OCR-based per-game death counter")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Directory holding config, state, and output files (default: next to the executable)
    #[arg(short, long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the detection daemon (default)
    Run,
    /// Ask the running daemon to stop
    Stop,
    /// Zero all death counts, keeping the known games
    Reset,
    /// Make a game the active one
    Switch { game: String },
    /// Print the saved counts
    Status,
    /// Capture the region once and show what OCR reads
    CaptureDebug {
        #[arg(short, long)]
        game: Option<String>,
    },
    /// List monitors with the indices used in the config
    Monitors,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let paths = Paths::new(cli.base_dir.unwrap_or_else(paths::get_exe_dir));
    paths.ensure_directories()?;

    logging::install_panic_hook(&paths.log_file());
    logging::init(&paths.log_file());

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => daemon::run_daemon(&paths),
        Commands::Stop => daemon::commands::stop(&paths),
        Commands::Reset => daemon::commands::reset(&paths),
        Commands::Switch { game } => daemon::commands::switch(&paths, &game),
        Commands::Status => daemon::commands::status(&paths),
        Commands::CaptureDebug { game } => daemon::commands::capture_debug(&paths, game.as_deref()),
        Commands::Monitors => daemon::commands::monitors(),
    };

    if let Err(e) = &result {
        log::error!("{:#}", e);
    }
    result
}
