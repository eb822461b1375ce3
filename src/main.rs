use anyhow::{Context, Result};
use clap::Parser;
use env_logger::{Env, Target};
use log::{debug, info, LevelFilter};
use std::fs::File;
use std::path::PathBuf;
use std::process;

use trawler::{Image, LayerFiles, Notifier, OuterArchive};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(help = "Saved image archive to inspect (.tar, .tar.gz or .tgz)")]
    image: PathBuf,

    #[arg(
        short,
        long,
        env = "TRAWLER_OUTPUT_DIR",
        default_value = ".",
        help = "Default directory for extracted files"
    )]
    output_dir: PathBuf,

    #[arg(long, help = "Write logs to this file while the interactive session runs")]
    log_file: Option<PathBuf>,

    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        help = "Verbose mode (-v for info, -vv for debug, -vvv for trace). Also switches to text-based progress"
    )]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if !cli.image.is_file() {
        eprintln!("File not found: {}", cli.image.display());
        process::exit(1);
    }

    // Setup logging based on verbosity level
    let log_level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(Env::default());
    builder.filter_level(log_level);
    if let Some(log_file) = &cli.log_file {
        let file = File::create(log_file)
            .with_context(|| format!("Failed to create log file: {}", log_file.display()))?;
        builder.target(Target::Pipe(Box::new(file)));
    }
    builder.init();

    info!("Starting trawler with image: {}", cli.image.display());
    debug!("Output directory: {}", cli.output_dir.display());

    let notifier = Notifier::new(cli.verbose);
    let archive = OuterArchive::open(&cli.image)?;
    let image = Image::from_archive(&archive, &notifier)?;
    notifier.finish();

    // Nothing may write to the terminal once the UI owns it
    if cli.log_file.is_none() {
        log::set_max_level(LevelFilter::Off);
    }

    let index = LayerFiles::new(archive);
    trawler::tui::run(&image, &index, &cli.output_dir)
}
