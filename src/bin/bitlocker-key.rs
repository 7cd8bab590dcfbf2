use bitlocker::{
	error::FveError, password, recover_key, Credential, FveMetadata, KeyProtectors, RecoveredKey,
	StartupKey, VolumeConfig,
};
use clap::Parser;
use secrecy::{Secret, SecretString};
use serde_json::json;
use std::{error::Error, path::PathBuf, process::ExitCode};
use tracing::Level;

/// Recover the full volume encryption key of a BitLocker volume.
///
/// Without a password or startup key the volume must have a clear key
/// (BitLocker suspended).
#[derive(Parser)]
#[command(name = "bitlocker-key", version)]
struct Cli {
	/// BitLocker volume, or an image of one
	volume: PathBuf,

	/// Byte offset of the volume in the device or image, decimal or 0x-prefixed hex
	#[arg(short = 'o', long, default_value = "0", value_parser = parse_offset)]
	offset: u64,

	/// Use this metadata block (1-3) without validating it, 0 for the first valid one
	#[arg(short = 'b', long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=3))]
	block: u8,

	/// Unlock with the user password, prompted for when not given
	#[arg(short = 'u', long, num_args = 0..=1, default_missing_value = "", conflicts_with = "recovery_password")]
	user_password: Option<String>,

	/// Unlock with the 48-digit recovery password, prompted for when not given
	#[arg(short = 'r', long, num_args = 0..=1, default_missing_value = "", conflicts_with = "bekfile")]
	recovery_password: Option<String>,

	/// Unlock with the startup key stored in this .BEK file
	#[arg(short = 'f', long, value_name = "PATH", conflicts_with = "user_password")]
	bekfile: Option<PathBuf>,

	/// Also print the volume header and the key protectors
	#[arg(short = 'i', long)]
	info: bool,

	/// Print the result as JSON
	#[arg(long)]
	json: bool,

	/// Log more, repeat for debug output
	#[arg(short, long, action = clap::ArgAction::Count)]
	verbose: u8,
}

fn parse_offset(s: &str) -> Result<u64, String> {
	let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
		Some(hex) => u64::from_str_radix(hex, 16),
		None => s.parse(),
	};
	parsed.map_err(|e| format!("invalid offset {:?}: {}", s, e))
}

fn given_or_prompted(value: String, message: &str) -> Result<SecretString, FveError> {
	if value.is_empty() {
		password::prompt(message)
	} else {
		Ok(Secret::new(value))
	}
}

fn credential(cli: &mut Cli) -> Result<Option<Credential>, FveError> {
	if let Some(p) = cli.user_password.take() {
		let p = given_or_prompted(p, "Enter the user password: ")?;
		return Ok(Some(Credential::UserPassword(p)));
	}
	if let Some(p) = cli.recovery_password.take() {
		let p = given_or_prompted(p, "Enter the recovery password: ")?;
		return Ok(Some(Credential::RecoveryPassword(p)));
	}
	if let Some(path) = cli.bekfile.take() {
		return Ok(Some(Credential::StartupKey(StartupKey::open(path)?)));
	}
	Ok(None)
}

fn print_info(metadata: &FveMetadata) {
	println!("{}", metadata.header());
	println!("version: {:?}", metadata.version());
	println!("metadata block in use: {}", metadata.selected_block());
	match metadata.encryption_method() {
		Some(m) => println!("encryption method: {}", m),
		None => println!("encryption method: unknown ({:#06x})", metadata.dataset().algorithm),
	}
	for (guid, kind) in metadata.protectors() {
		println!("key protector {}: {}", guid, kind);
	}
}

fn info_json(metadata: &FveMetadata) -> serde_json::Value {
	let protectors: Vec<_> = metadata
		.protectors()
		.into_iter()
		.map(|(guid, kind)| json!({ "guid": guid.to_string(), "kind": kind.to_string() }))
		.collect();
	json!({
		"version": format!("{:?}", metadata.version()),
		"block": metadata.selected_block(),
		"block_offsets": metadata.block_offsets(),
		"has_clear_key": metadata.has_clear_key(),
		"protectors": protectors,
	})
}

fn print_key(cli: &Cli, metadata: &FveMetadata, key: &RecoveredKey) {
	if cli.json {
		let mut out = json!({
			"volume": cli.volume.display().to_string(),
			"method": key.method().to_string(),
			"method_id": key.method().as_u16(),
			"key": key.to_hex(),
		});
		if cli.info {
			out["info"] = info_json(metadata);
		}
		println!("{}", out);
	} else {
		if cli.info {
			print_info(metadata);
		}
		println!("{}: {}", key.method(), key.to_hex());
	}
}

fn run(mut cli: Cli) -> Result<(), Box<dyn Error>> {
	let config = VolumeConfig::new().with_offset(cli.offset).with_block(cli.block);
	let metadata = FveMetadata::open(&cli.volume, &config)?;
	let credential = credential(&mut cli)?;

	let key = recover_key(&metadata, credential)?;
	print_key(&cli, &metadata, &key);
	Ok(())
}

fn main() -> ExitCode {
	let cli = Cli::parse();

	let level = match cli.verbose {
		0 => Level::WARN,
		1 => Level::INFO,
		_ => Level::DEBUG,
	};
	tracing_subscriber::fmt()
		.with_max_level(level)
		.with_writer(std::io::stderr)
		.init();

	match run(cli) {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			eprintln!("{}", e);
			ExitCode::FAILURE
		}
	}
}
