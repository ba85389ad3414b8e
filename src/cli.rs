//! CLI argument definitions (spec §6 "CLI — resident installer" / "CLI —
//! mount utility"), built on `clap`'s derive API with
//! `features = ["cargo", "derive"]`.

use clap::{ArgAction, Parser};

use crate::resident::ResidentConfig;

/// Flags for the `smbfsd` resident installer/remover (spec §4.8 step 1,
/// §6's `-u<N> -m<KiB> -r -D` flag list).
#[derive(Parser, Debug)]
#[command(name = "smbfsd", about = "Human68k-to-SMB2/3 filesystem driver resident")]
pub struct ResidentArgs {
    /// Number of drive units to install, 1..=8 (spec §4.8 step 1).
    #[arg(short = 'u', default_value_t = 1)]
    pub units: u8,

    /// Heap size in KiB, must be >= 96 (spec §4.8 step 1).
    #[arg(short = 'm', default_value_t = crate::resident::MIN_HEAP_KIB)]
    pub heap_kib: u32,

    /// Remove a previously installed resident instead of installing one.
    #[arg(short = 'r')]
    pub remove: bool,

    /// Increase debug verbosity; repeatable (supplemented feature: the
    /// original `com_init`'s `case 'd': debuglevel++;` increments rather
    /// than toggles).
    #[arg(short = 'D', action = ArgAction::Count)]
    pub debug: u8,
}

impl ResidentArgs {
    pub fn to_config(&self) -> ResidentConfig {
        ResidentConfig {
            unit_count: self.units,
            heap_kib: self.heap_kib,
            remove: self.remove,
            debug_level: self.debug,
        }
    }

    /// Maps the repeatable `-D` count to a `log` verbosity level
    /// (supplemented feature, see `SPEC_FULL.md`).
    pub fn log_level_filter(&self) -> log::LevelFilter {
        match self.debug {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

/// The supplemental `smbmount` utility's sub-command (spec §6: "mount
/// <url> [drive:] [-U user[%pass]]"; "mount -D [drive:]" unmount; no args
/// lists mounts).
#[derive(Parser, Debug)]
#[command(name = "smbmount", about = "Mount/unmount SMB2/3 shares on an smbfsd resident")]
pub struct MountArgs {
    /// Share URL, e.g. `smb://server/share`. Omitted together with `drive`
    /// to list current mounts.
    pub url: Option<String>,

    /// Target drive letter, e.g. `A:`.
    pub drive: Option<String>,

    /// Unmount the given drive instead of mounting.
    #[arg(short = 'D')]
    pub unmount: bool,

    /// `user[%pass]` credential override.
    #[arg(short = 'U')]
    pub user: Option<String>,
}

/// Splits a `-U user[%pass]` argument into username and optional password.
pub fn split_user_arg(arg: &str) -> (String, Option<String>) {
    match arg.split_once('%') {
        Some((user, pass)) => (user.to_string(), Some(pass.to_string())),
        None => (arg.to_string(), None),
    }
}

/// Parses `[A-Za-z]:` drive syntax into a 0-based unit index (`A:` -> 0).
pub fn parse_drive_letter(drive: &str) -> Option<u8> {
    let mut chars = drive.chars();
    let letter = chars.next()?;
    if chars.next() != Some(':') || chars.next().is_some() {
        return None;
    }
    if !letter.is_ascii_alphabetic() {
        return None;
    }
    Some(letter.to_ascii_uppercase() as u8 - b'A')
}

/// Normalizes a mount URL per spec §6: strip leading whitespace; if the
/// result has no `smb:`/`//` prefix at all, prefix `smb://`; a bare `//host`
/// gets `smb:` prefixed; a bare `/host` gets `smb:/` prefixed; and if there's
/// no path component after the host, a trailing `/` is appended.
pub fn normalize_mount_url(raw: &str) -> String {
    let trimmed = raw.trim_start();

    let mut url = if trimmed.starts_with("smb://") || trimmed.starts_with("smb:") {
        trimmed.to_string()
    } else if trimmed.starts_with("//") {
        format!("smb:{trimmed}")
    } else if trimmed.starts_with('/') {
        format!("smb:/{trimmed}")
    } else {
        format!("smb://{trimmed}")
    };

    let after_scheme = url.strip_prefix("smb://").or_else(|| url.strip_prefix("smb:")).unwrap_or("");
    let after_host = after_scheme.trim_start_matches('/');
    if !after_host.contains('/') {
        url.push('/');
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_count_maps_to_increasing_verbosity() {
        let args = ResidentArgs { units: 1, heap_kib: 96, remove: false, debug: 0 };
        assert_eq!(args.log_level_filter(), log::LevelFilter::Warn);
        let args = ResidentArgs { debug: 3, ..args };
        assert_eq!(args.log_level_filter(), log::LevelFilter::Trace);
    }

    #[test]
    fn splits_user_and_password() {
        assert_eq!(split_user_arg("alice%secret"), ("alice".to_string(), Some("secret".to_string())));
        assert_eq!(split_user_arg("alice"), ("alice".to_string(), None));
    }

    #[test]
    fn parses_drive_letter_to_zero_based_unit() {
        assert_eq!(parse_drive_letter("A:"), Some(0));
        assert_eq!(parse_drive_letter("d:"), Some(3));
        assert_eq!(parse_drive_letter("AB:"), None);
        assert_eq!(parse_drive_letter("5:"), None);
    }

    #[test]
    fn bare_host_gets_smb_scheme_and_trailing_slash() {
        assert_eq!(normalize_mount_url("  server/share"), "smb://server/share/");
    }

    #[test]
    fn double_slash_prefix_gets_smb_colon() {
        assert_eq!(normalize_mount_url("//server/share"), "smb://server/share");
    }

    #[test]
    fn single_slash_prefix_gets_smb_colon_slash() {
        assert_eq!(normalize_mount_url("/server/share"), "smb://server/share");
    }

    #[test]
    fn full_url_with_path_is_left_alone() {
        assert_eq!(normalize_mount_url("smb://server/share/sub"), "smb://server/share/sub");
    }

    #[test]
    fn full_url_without_path_gets_trailing_slash() {
        assert_eq!(normalize_mount_url("smb://server"), "smb://server/");
    }
}
