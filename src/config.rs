//! Runtime options for opening a volume and for scanning devices.

use crate::error::ParseError;
use std::num::NonZeroUsize;

/// How to locate and read the FVE metadata of a volume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VolumeConfig {
	/// Byte offset of the volume inside the device or image.
	pub offset: u64,
	/// Use this metadata block (1, 2 or 3) without CRC validation. `None`
	/// picks the first valid block.
	pub block: Option<u8>,
}

impl VolumeConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_offset(mut self, offset: u64) -> Self {
		self.offset = offset;
		self
	}

	/// `0` means "any block", like leaving it unset.
	pub fn with_block(mut self, block: u8) -> Self {
		self.block = if block == 0 { None } else { Some(block) };
		self
	}

	pub fn validate(&self) -> Result<(), ParseError> {
		match self.block {
			Some(n) if !(1..=3).contains(&n) => Err(ParseError::InvalidBlock(n)),
			_ => Ok(()),
		}
	}
}

/// Options of a batch detection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
	/// Upper bound on concurrently probed devices. `1` scans sequentially.
	pub workers: usize,
}

impl ScanConfig {
	pub fn sequential() -> Self {
		ScanConfig { workers: 1 }
	}

	pub fn with_workers(workers: usize) -> Self {
		ScanConfig { workers: workers.max(1) }
	}
}

impl Default for ScanConfig {
	fn default() -> Self {
		let workers = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
		ScanConfig { workers }
	}
}
