//! Resident installer/remover entry point (spec §4.8, §6 "CLI — resident
//! installer").

use clap::Parser;
use log::error;

use smbfsd::cli::ResidentArgs;
use smbfsd::resident::{Resident, ResidentError, SimulatedHost};

fn main() {
    let args = ResidentArgs::parse();

    env_logger::builder()
        .format_timestamp_nanos()
        .filter_level(args.log_level_filter())
        .init();

    let config = args.to_config();

    // A production build wires a `HostHooks` impl that touches the real
    // low-memory tables; see resident.rs's module doc comment. This
    // executable only exercises the in-memory simulation, so it can never
    // actually install a resident driver on real hardware.
    let mut host = SimulatedHost::new(b'Z');

    let result = if config.remove {
        error!("cannot remove a resident from a fresh process; run the installer process and send it -r");
        Err(ResidentError::NotInstalled)
    } else {
        Resident::install(&config, &mut host).map(|_resident| ())
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}
