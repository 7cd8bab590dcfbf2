use bitlocker::{candidate_devices, scan, ScanConfig};
use clap::{error::ErrorKind, Parser};
use std::{ffi::OsString, path::PathBuf, process::ExitCode};
use tracing::Level;

/// Find BitLocker encrypted volumes.
///
/// Prints every BitLocker volume found, one per line. The exit code is the
/// number of volumes found, 255 on error.
#[derive(Parser)]
#[command(name = "bitlocker-find", version)]
struct Cli {
	/// Number of devices probed in parallel (defaults to the number of CPUs)
	#[arg(short = 'j', long)]
	jobs: Option<usize>,

	/// Log more, repeat for debug output
	#[arg(short, long, action = clap::ArgAction::Count)]
	verbose: u8,

	/// Devices or images to check instead of every device of the host
	devices: Vec<PathBuf>,
}

/// Exit code of usage errors and of a host whose devices cannot be listed.
/// Never a match count, those stop at 254.
const FAILURE: u8 = u8::MAX;

fn parse_args<I, T>(args: I) -> Result<Cli, u8>
where
	I: IntoIterator<Item = T>,
	T: Into<OsString> + Clone,
{
	Cli::try_parse_from(args).map_err(|e| {
		let _ = e.print();
		match e.kind() {
			ErrorKind::DisplayHelp
			| ErrorKind::DisplayVersion
			| ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => 0,
			_ => FAILURE,
		}
	})
}

fn exit_code(found: usize) -> u8 {
	found.min(usize::from(FAILURE - 1)) as u8
}

fn main() -> ExitCode {
	let cli = match parse_args(std::env::args_os()) {
		Ok(cli) => cli,
		Err(code) => return ExitCode::from(code),
	};

	let level = match cli.verbose {
		0 => Level::WARN,
		1 => Level::INFO,
		_ => Level::DEBUG,
	};
	tracing_subscriber::fmt()
		.with_max_level(level)
		.with_writer(std::io::stderr)
		.init();

	let devices = if cli.devices.is_empty() {
		match candidate_devices() {
			Ok(devices) => devices,
			Err(e) => {
				eprintln!("{}", e);
				return ExitCode::from(FAILURE);
			}
		}
	} else {
		cli.devices
	};

	let config = cli.jobs.map_or_else(ScanConfig::default, ScanConfig::with_workers);
	let found = scan(&devices, &config);

	if found.is_empty() {
		eprintln!("No BitLocker volume found.");
	}
	for path in &found {
		println!("{}", path.display());
	}

	ExitCode::from(exit_code(found.len()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn usage_errors_are_not_a_match_count() {
		assert_eq!(parse_args(["bitlocker-find", "--bogus"]).err(), Some(FAILURE));
		assert_eq!(parse_args(["bitlocker-find", "-j"]).err(), Some(FAILURE));
		assert_eq!(parse_args(["bitlocker-find", "-j", "many"]).err(), Some(FAILURE));
		assert_eq!(parse_args(["bitlocker-find", "--help"]).err(), Some(0));
		assert_eq!(parse_args(["bitlocker-find", "--version"]).err(), Some(0));

		let cli = parse_args(["bitlocker-find", "-j", "2", "/dev/sda1"]).unwrap();
		assert_eq!(cli.jobs, Some(2));
		assert_eq!(cli.devices, vec![PathBuf::from("/dev/sda1")]);
	}

	#[test]
	fn match_counts_stay_below_the_failure_code() {
		assert_eq!(exit_code(0), 0);
		assert_eq!(exit_code(2), 2);
		assert_eq!(exit_code(254), 254);
		assert_eq!(exit_code(255), 254);
		assert_eq!(exit_code(10_000), 254);
	}
}
