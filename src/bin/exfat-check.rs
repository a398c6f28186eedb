use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use exfat_inspect::{Error, volume::Volume};

/// Check FAT / Allocation Bitmap consistency of an exFAT image
#[derive(Parser)]
#[command(name = "exfat-check", version)]
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
            eprintln!("exfat-check: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: &Cli) -> exfat_inspect::Result<()> {
    let mut volume = Volume::open_path(&cli.image)?;
    volume.verify_boot_region()?;
    volume.traverse_root_directory()?;

    let report = volume.check_consistency()?;
    let total = report.inconsistencies();
    println!("{total} inconsistencies found.");

    if total != 0 {
        return Err(Error::Inconsistency(format!(
            "{total} inconsistencies detected"
        )));
    }
    Ok(())
}
