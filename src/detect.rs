//! Telling BitLocker volumes apart from everything else by their first sector.

use crate::{
	config::ScanConfig,
	header::{Guid, BITLOCKER_SIGNATURE, BITLOCKER_TO_GO_SIGNATURE, VOLUME_HEADER_SIZE},
};
use rayon::prelude::*;
use std::{
	fs::File,
	io::Read,
	path::{Path, PathBuf},
};
use tracing::{debug, warn};

pub const SIGNATURE_OFFSET: usize = 3;
pub const SIGNATURE_LEN: usize = 8;

/// Signatures accepted at [`SIGNATURE_OFFSET`].
pub const SIGNATURES: [[u8; SIGNATURE_LEN]; 2] = [BITLOCKER_SIGNATURE, BITLOCKER_TO_GO_SIGNATURE];

/// A region of the header that may hold the volume identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifierWindow {
	pub offset: usize,
	pub len: usize,
}

/// Where Vista/7 volumes and To-Go volumes keep their identifier, in the
/// order they are tried.
pub const IDENTIFIER_WINDOWS: [IdentifierWindow; 2] = [
	IdentifierWindow { offset: 0xa0, len: 16 },
	IdentifierWindow { offset: 0x1a8, len: 16 },
];

/// Classify a raw volume header. Buffers shorter than a header never match.
pub fn classify_header(bytes: &[u8]) -> bool {
	if bytes.len() < VOLUME_HEADER_SIZE {
		return false;
	}

	let signature = &bytes[SIGNATURE_OFFSET..SIGNATURE_OFFSET + SIGNATURE_LEN];
	if !SIGNATURES.iter().any(|s| s == signature) {
		return false;
	}

	IDENTIFIER_WINDOWS.iter().any(|w| {
		Guid::from_slice(&bytes[w.offset..w.offset + w.len]).map_or(false, |g| g.is_information_guid())
	})
}

/// Whether the device or image at `path` holds a BitLocker volume.
///
/// Every failure to open or read (no medium, locked device, missing
/// permissions, short read) is a negative answer.
pub fn is_target_format<P: AsRef<Path>>(path: P) -> bool {
	let path = path.as_ref();
	let mut file = match File::open(path) {
		Ok(file) => file,
		Err(e) => {
			debug!("{}: cannot open: {}", path.display(), e);
			return false;
		}
	};

	let mut header = [0u8; VOLUME_HEADER_SIZE];
	if let Err(e) = file.read_exact(&mut header) {
		debug!("{}: cannot read the volume header: {}", path.display(), e);
		return false;
	}

	let found = classify_header(&header);
	debug!("{}: {}", path.display(), if found { "BitLocker volume" } else { "no BitLocker signature" });
	found
}

fn probe(path: &Path) -> bool {
	path.exists() && is_target_format(path)
}

/// Keep the paths holding a BitLocker volume, in their original order.
/// Paths that do not exist are skipped without being opened.
pub fn scan<P: AsRef<Path> + Sync>(paths: &[P], config: &ScanConfig) -> Vec<PathBuf> {
	let sequential = || {
		paths
			.iter()
			.map(AsRef::as_ref)
			.filter(|p| probe(p))
			.map(Path::to_path_buf)
			.collect()
	};

	if config.workers <= 1 || paths.len() <= 1 {
		return sequential();
	}

	match rayon::ThreadPoolBuilder::new().num_threads(config.workers).build() {
		Ok(pool) => pool.install(|| {
			paths
				.par_iter()
				.map(AsRef::as_ref)
				.filter(|p| probe(p))
				.map(Path::to_path_buf)
				.collect()
		}),
		Err(e) => {
			warn!("could not start {} scan workers, scanning sequentially: {}", config.workers, e);
			sequential()
		}
	}
}
