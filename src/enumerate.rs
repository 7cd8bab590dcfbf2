//! Listing the devices of the host that may hold a BitLocker volume.

use crate::error::EnumerateError;
use std::{
	fs,
	path::{Path, PathBuf},
};
use tracing::{debug, error};

/// Hosts with a known way of listing their block devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
	Linux,
	FreeBsd,
	Darwin,
}

impl Platform {
	/// The platform this binary runs on, if supported.
	pub fn detect() -> Option<Self> {
		Self::from_os(std::env::consts::OS)
	}

	/// Map an OS name as found in `std::env::consts::OS`.
	pub fn from_os(os: &str) -> Option<Self> {
		match os {
			"linux" => Some(Platform::Linux),
			"freebsd" => Some(Platform::FreeBsd),
			"macos" => Some(Platform::Darwin),
			_ => None,
		}
	}

	pub fn source(self) -> Box<dyn DeviceSource> {
		match self {
			Platform::Linux => Box::new(ProcPartitions::default()),
			Platform::FreeBsd => Box::new(DevDirectory::new("/dev/diskid", "")),
			Platform::Darwin => Box::new(DevDirectory::new("/dev", "disk")),
		}
	}
}

/// A way of listing candidate devices.
pub trait DeviceSource {
	fn devices(&self) -> Result<Vec<PathBuf>, EnumerateError>;
}

/// Devices named in a Linux `/proc/partitions` style table.
#[derive(Debug, Clone)]
pub struct ProcPartitions {
	pub path: PathBuf,
}

impl Default for ProcPartitions {
	fn default() -> Self {
		ProcPartitions { path: PathBuf::from("/proc/partitions") }
	}
}

impl DeviceSource for ProcPartitions {
	fn devices(&self) -> Result<Vec<PathBuf>, EnumerateError> {
		let content = fs::read_to_string(&self.path)?;
		parse_partitions(&content, Path::new("/dev"))
	}
}

/// Parse a partitions table: two header lines, then one device per line
/// with its name in the fourth column.
pub fn parse_partitions(content: &str, dev: &Path) -> Result<Vec<PathBuf>, EnumerateError> {
	let lines: Vec<&str> = content.lines().collect();
	if lines.len() <= 2 {
		return Err(EnumerateError::MalformedPartitions(lines.len()));
	}

	Ok(lines[2..]
		.iter()
		.filter_map(|line| line.split_whitespace().nth(3))
		.map(|name| dev.join(name))
		.collect())
}

/// Entries of a directory whose name starts with a prefix.
#[derive(Debug, Clone)]
pub struct DevDirectory {
	pub dir: PathBuf,
	pub prefix: String,
}

impl DevDirectory {
	pub fn new<P: Into<PathBuf>>(dir: P, prefix: &str) -> Self {
		DevDirectory { dir: dir.into(), prefix: prefix.to_string() }
	}
}

impl DeviceSource for DevDirectory {
	fn devices(&self) -> Result<Vec<PathBuf>, EnumerateError> {
		let mut devices: Vec<PathBuf> = fs::read_dir(&self.dir)?
			.flatten()
			.filter(|e| e.file_name().to_string_lossy().starts_with(&self.prefix))
			.map(|e| e.path())
			.collect();
		devices.sort();
		Ok(devices)
	}
}

/// Every candidate device of the host. An unsupported host yields no
/// candidates.
pub fn candidate_devices() -> Result<Vec<PathBuf>, EnumerateError> {
	match Platform::detect() {
		Some(platform) => {
			let devices = platform.source().devices()?;
			debug!("{} candidate devices on {:?}", devices.len(), platform);
			Ok(devices)
		}
		None => {
			error!("listing devices is not supported on {}", std::env::consts::OS);
			Ok(Vec::new())
		}
	}
}
