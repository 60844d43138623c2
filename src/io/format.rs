//! Formatting of the QZFS main output.

use std::fmt;

use log;

use crate::units::EnergyUnit;

#[cfg(test)]
#[path = "format_tests.rs"]
mod format_tests;

/// Width of the main output, in characters.
const OUTPUT_WIDTH: usize = 103;

/// Logs a warning to the `qzfs-output` logger.
macro_rules! qzfs_warn {
    ($fmt:expr $(, $($arg:tt)*)?) => { log::warn!(target: "qzfs-output", $fmt, $($($arg)*)?); }
}

/// Logs a main output line to the `qzfs-output` logger.
macro_rules! qzfs_output {
    ($fmt:expr $(, $($arg:tt)*)?) => { log::info!(target: "qzfs-output", $fmt, $($($arg)*)?); }
}

pub(crate) use {qzfs_output, qzfs_warn};

/// The boundaries of a section of work in the main output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SectionBoundary {
    Begin,
    End,
}

/// Returns the three lines of a boxed section title.
pub(crate) fn title_lines(title: &str) -> [String; 3] {
    let length = title.chars().count().max(OUTPUT_WIDTH - 6);
    let bar = "─".repeat(length);
    [
        format!("┌──{bar}──┐"),
        format!("│§ {title:^length$} §│"),
        format!("└──{bar}──┘"),
    ]
}

/// Returns a subtitle and its double underline.
pub(crate) fn subtitle_lines(subtitle: &str) -> [String; 2] {
    [
        subtitle.to_string(),
        "═".repeat(subtitle.chars().count()),
    ]
}

/// Returns the marker line opening or closing a section of work.
pub(crate) fn section_line(name: &str, boundary: SectionBoundary) -> String {
    let width = OUTPUT_WIDTH - 14;
    let name = format!("{name} ");
    match boundary {
        SectionBoundary::Begin => format!("❬❬❬❬❬ [Begin] {name:❬<width$}"),
        SectionBoundary::End => format!("❭❭❭❭❭ [ End ] {name:❭<width$}"),
    }
}

/// Logs a boxed section title to the `qzfs-output` logger.
pub(crate) fn log_title(title: &str) {
    title_lines(title)
        .iter()
        .for_each(|line| {
            qzfs_output!("{line}");
        });
}

/// Writes a subtitle.
pub(crate) fn write_subtitle(f: &mut fmt::Formatter<'_>, subtitle: &str) -> fmt::Result {
    subtitle_lines(subtitle)
        .iter()
        .try_for_each(|line| writeln!(f, "{line}"))
}

/// Logs a subtitle to the `qzfs-output` logger.
pub(crate) fn log_subtitle(subtitle: &str) {
    subtitle_lines(subtitle)
        .iter()
        .for_each(|line| {
            qzfs_output!("{line}");
        });
}

/// Logs the opening or closing marker of a section of work to the `qzfs-output` logger.
pub(crate) fn log_section(name: &str, boundary: SectionBoundary) {
    qzfs_output!("{}", section_line(name, boundary));
}

/// Turns a boolean into a string of `yes` or `no`.
pub(crate) fn nice_bool(b: bool) -> String {
    if b {
        "yes".to_string()
    } else {
        "no".to_string()
    }
}

/// Formats a number of bytes in MiB.
pub(crate) fn nice_bytes(n_bytes: usize) -> String {
    format!("{:.2} MiB", n_bytes as f64 / 1024.0 / 1024.0)
}

/// Formats an energy in Hartree as MHz and as wavenumbers.
pub(crate) fn nice_energy(hartree: f64) -> String {
    let mhz = EnergyUnit::MHz;
    let wavenumber = EnergyUnit::Wavenumber;
    format!(
        "{:+.3} {mhz} = {:+.6} {wavenumber}",
        mhz.from_hartree(hartree),
        wavenumber.from_hartree(hartree)
    )
}

/// A trait for logging `QZFS` outputs nicely.
pub(crate) trait QZfsOutput: fmt::Debug + fmt::Display {
    /// Logs display output line by line.
    fn log_output_display(&self) {
        let lines = self.to_string();
        lines.lines().for_each(|line| {
            qzfs_output!("{line}");
        })
    }
}

// Blanket implementation
impl<T> QZfsOutput for T where T: fmt::Debug + fmt::Display {}
