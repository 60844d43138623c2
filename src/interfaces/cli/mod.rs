//! Command-line interface for QZFS.

use std::path::{Path, PathBuf};

use anyhow::{self, Context};
use clap::Parser;
use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::io::format::qzfs_output;

const VERSION: Option<&str> = option_env!("CARGO_PKG_VERSION");

const HEADING_WIDTH: usize = 101;

const HEADING_ART: [&str; 5] = [
    "   ___   _____ _____ ____  ",
    "  / _ \\ |__  /|  ___/ ___| ",
    " | | | |  / / | |_  \\___ \\ ",
    " | |_| | / /_ |  _|  ___) |",
    "  \\__\\_\\/____||_|   |____/ ",
];

/// Logs a nicely formatted QZFS heading to the `qzfs-output` logger.
pub fn log_heading() {
    let version = if let Some(ver) = VERSION {
        format!("v{ver}")
    } else {
        "v unknown".to_string()
    };
    let rule = "─".repeat(HEADING_WIDTH);
    qzfs_output!("╭{rule}╮");
    qzfs_output!("│{:width$}│", "", width = HEADING_WIDTH);
    for line in HEADING_ART.iter() {
        qzfs_output!("│ {:<width$}│", line, width = HEADING_WIDTH - 1);
    }
    qzfs_output!("│{:width$}│", "", width = HEADING_WIDTH);
    qzfs_output!(
        "│ {:<width$}│",
        "Spin-spin zero-field splitting from plane-wave Kohn-Sham orbitals",
        width = HEADING_WIDTH - 1
    );
    qzfs_output!("│{:>width$} │", version, width = HEADING_WIDTH - 1);
    qzfs_output!("╰{rule}╯");
    qzfs_output!("");
}

/// Sets up `log4rs` loggers for a QZFS run.
///
/// The main output goes to `<output>.out` if an output name is given, or to standard output
/// otherwise. Diagnostic messages from all other targets go to standard error.
///
/// # Arguments
///
/// * `output` - Optional name of the main output file, without extension.
/// * `debug` - Boolean indicating if debug messages are to be shown.
pub fn setup_logger(output: Option<&Path>, debug: bool) -> Result<log4rs::Handle, anyhow::Error> {
    let main_encoder = PatternEncoder::new("{m}{n}");
    let main_appender: Box<dyn log4rs::append::Append> = match output {
        Some(name) => {
            let mut path = name.as_os_str().to_owned();
            path.push(".out");
            Box::new(
                FileAppender::builder()
                    .encoder(Box::new(main_encoder))
                    .append(false)
                    .build(PathBuf::from(path))
                    .with_context(|| "Unable to create the main output file")?,
            )
        }
        None => Box::new(
            ConsoleAppender::builder()
                .encoder(Box::new(main_encoder))
                .build(),
        ),
    };
    let diagnostic_appender = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} {h({l}):<5} {t} - {m}{n}",
        )))
        .build();

    let root_level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let config = Config::builder()
        .appender(Appender::builder().build("main", main_appender))
        .appender(Appender::builder().build("diagnostic", Box::new(diagnostic_appender)))
        .logger(
            Logger::builder()
                .appender("main")
                .additive(false)
                .build("qzfs-output", LevelFilter::Info),
        )
        .build(Root::builder().appender("diagnostic").build(root_level))
        .with_context(|| "Unable to configure loggers")?;
    log4rs::init_config(config).with_context(|| "Unable to initialise loggers")
}

/// Command-line arguments for QZFS.
#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML input configuration file.
    #[arg(short, long)]
    pub config: PathBuf,

    /// Name of the main output file, without extension. If absent, the main output is written to
    /// standard output.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Shows debug messages.
    #[arg(short, long)]
    pub debug: bool,
}
