use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use exfat_inspect::{report, volume::Volume};

/// Print the boot-sector geometry of an exFAT image
#[derive(Parser)]
#[command(name = "exfat-statfs", version)]
struct Cli {
    /// exFAT image file
    image: PathBuf,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("exfat-statfs: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: &Cli) -> exfat_inspect::Result<()> {
    let volume = Volume::open_path(&cli.image)?;
    report::print_boot(&volume)
}
