use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use exfat_inspect::{report, volume::Volume};

/// Per-file metadata and fragmentation in an exFAT image
#[derive(Parser)]
#[command(name = "exfat-stat", version)]
struct Cli {
    /// exFAT image file
    image: PathBuf,
    /// Path inside the image
    path: String,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("exfat-stat: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: &Cli) -> exfat_inspect::Result<()> {
    let mut volume = Volume::open_path(&cli.image)?;
    volume.traverse_root_directory()?;
    report::stat(&mut volume, &cli.path)
}
