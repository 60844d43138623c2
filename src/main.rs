use std::process;

use anyhow::{self, Context};
use clap::Parser;
use log;

use qzfs::interfaces::cli::{log_heading, setup_logger, Cli};
use qzfs::interfaces::input::Input;
use qzfs::interfaces::InputHandle;
use qzfs::io::read_qzfs_yaml;
use qzfs::zfs::dispatch::ProcessGroup;

fn run(cli: &Cli, process_group: &dyn ProcessGroup) -> Result<(), anyhow::Error> {
    let input = read_qzfs_yaml::<Input, _>(&cli.config).with_context(|| {
        format!(
            "Unable to read the input configuration file `{}`",
            cli.config.display()
        )
    })?;
    input.handle(process_group)
}

fn execute(cli: &Cli, process_group: &dyn ProcessGroup) -> i32 {
    // Only the root writes the main output file.
    let output = if process_group.is_root() {
        cli.output.as_deref()
    } else {
        None
    };
    if let Err(err) = setup_logger(output, cli.debug) {
        eprintln!("{err:?}");
        return 1;
    }
    if process_group.is_root() {
        log_heading();
    }
    match run(cli, process_group) {
        Ok(()) => 0,
        Err(err) => {
            log::error!("Rank {}: {err:?}", process_group.rank());
            log::error!(target: "qzfs-output", "{err:?}");
            1
        }
    }
}

#[cfg(not(feature = "mpi"))]
fn main() {
    use qzfs::zfs::dispatch::SingleProcess;

    let cli = Cli::parse();
    process::exit(execute(&cli, &SingleProcess));
}

#[cfg(feature = "mpi")]
fn main() {
    use mpi::traits::Communicator;
    use qzfs::zfs::dispatch::MpiGroup;

    let cli = Cli::parse();
    let code = match mpi::initialize() {
        Some(universe) => {
            let world = universe.world();
            let code = execute(&cli, &MpiGroup::new(universe.world()));
            if code != 0 && world.size() > 1 {
                // Peers may still be waiting in the reduction.
                log::error!("Rank {}: aborting all MPI processes.", world.rank());
                world.abort(code);
            }
            code
        }
        None => {
            eprintln!("Unable to initialise MPI.");
            1
        }
    };
    process::exit(code);
}
