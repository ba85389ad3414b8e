//! Supplemental mount utility entry point (spec §6 "CLI — mount utility").
//!
//! Parses and validates mount/unmount requests the way the resident's
//! Ioctl dispatch (`dispatch::do_ioctl`) expects them, and reports the
//! resolved action. Human68k delivers these requests to a running resident
//! through the `IOCTRL` device entry point; this crate has no equivalent
//! cross-process transport (there is no resident daemon socket to dial), so
//! this binary stops at resolving and printing the request rather than
//! delivering it. See DESIGN.md.

use clap::Parser;
use log::error;

use smbfsd::cli::{self, MountArgs};

fn main() {
    let args = MountArgs::parse();
    env_logger::builder().format_timestamp_nanos().init();

    match (&args.url, &args.drive, args.unmount) {
        (None, None, false) => {
            println!("(listing current mounts requires a running resident; not available from this process)");
        }
        (_, Some(drive), true) => {
            let Some(unit) = cli::parse_drive_letter(drive) else {
                error!("not a drive letter: {drive}");
                std::process::exit(1);
            };
            println!("would unmount unit {unit} ({drive})");
        }
        (Some(url), drive, false) => {
            let normalized = cli::normalize_mount_url(url);
            let (username, password) = match &args.user {
                Some(u) => {
                    let (user, pass) = cli::split_user_arg(u);
                    (Some(user), pass)
                }
                None => (None, None),
            };
            let drive_desc = drive.as_deref().unwrap_or("(next free drive)");
            println!("would mount {normalized} on {drive_desc}");
            if let Some(user) = &username {
                println!("  as user {user}{}", if password.is_some() { " (password supplied)" } else { "" });
            }
        }
        _ => {
            error!("usage: smbmount <url> [drive:] [-U user[%pass]] | smbmount -D <drive:>");
            std::process::exit(1);
        }
    }
}
