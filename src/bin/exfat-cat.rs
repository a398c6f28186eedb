use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use exfat_inspect::{report, volume::Volume};

/// Write a file from an exFAT image to standard output
#[derive(Parser)]
#[command(name = "exfat-cat", version)]
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
            eprintln!("exfat-cat: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: &Cli) -> exfat_inspect::Result<()> {
    let mut volume = Volume::open_path(&cli.image)?;
    volume.traverse_root_directory()?;

    let mut stdout = std::io::stdout().lock();
    report::cat(&mut volume, &cli.path, &mut stdout)?;
    stdout.flush()?;
    Ok(())
}
