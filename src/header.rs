//! Fixed-size on-disk structures of a BitLocker volume: the volume header
//! (boot sector), the FVE information header, the dataset header and the
//! validation header stored right after each metadata block.

use crate::error::ParseError;
use bincode::Options;
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;
use std::{
	fmt::{self, Debug, Display},
	io::Read,
};

/// Signature of volumes encrypted by Windows Vista and later.
pub const BITLOCKER_SIGNATURE: [u8; 8] = *b"-FVE-FS-";
/// Signature of volumes encrypted with BitLocker To-Go.
pub const BITLOCKER_TO_GO_SIGNATURE: [u8; 8] = *b"MSWIN4.1";

pub const VOLUME_HEADER_SIZE: usize = 512;
pub const INFORMATION_HEADER_SIZE: usize = 0x40;
pub const DATASET_HEADER_SIZE: usize = 0x30;
pub const VALIDATIONS_SIZE: usize = 8;

/// GUID found in the volume header of volumes encrypted by Windows 7 and later.
pub const INFORMATION_OFFSET_GUID: Guid = Guid([
	0x3b, 0xd6, 0x67, 0x49, 0x29, 0x2e, 0xd8, 0x4a,
	0x83, 0x99, 0xf6, 0xa3, 0x39, 0xe3, 0xd0, 0x01,
]);

/// GUID found in the volume header of volumes using "encrypt on write".
pub const EOW_INFORMATION_OFFSET_GUID: Guid = Guid([
	0x3b, 0x4d, 0xa8, 0x92, 0x80, 0xdd, 0x0e, 0x4d,
	0x9e, 0x4e, 0xb1, 0xe3, 0x28, 0x4e, 0xae, 0xd8,
]);

fn options() -> impl Options {
	bincode::options()
		.with_little_endian()
		.with_fixint_encoding()
		.allow_trailing_bytes()
}

/// A raw 16-byte GUID as stored on disk (mixed endian).
#[derive(Clone, Copy, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Guid(pub [u8; 16]);

impl Guid {
	pub fn from_slice(bytes: &[u8]) -> Option<Self> {
		let mut g = [0; 16];
		if bytes.len() != 16 {
			return None;
		}
		g.copy_from_slice(bytes);
		Some(Guid(g))
	}

	/// One of the two GUIDs a BitLocker volume header can carry.
	pub fn is_information_guid(&self) -> bool {
		*self == INFORMATION_OFFSET_GUID || *self == EOW_INFORMATION_OFFSET_GUID
	}
}

// printed the way Windows prints them: first three groups little endian
impl Display for Guid {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let g = &self.0;
		write!(
			f,
			"{:02X}{:02X}{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}-",
			g[3], g[2], g[1], g[0], g[5], g[4], g[7], g[6], g[8], g[9]
		)?;
		for b in &g[10..] {
			write!(f, "{:02X}", b)?;
		}
		Ok(())
	}
}

impl Debug for Guid {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Guid({})", self)
	}
}

/// The BitLocker flavour a volume header describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeVersion {
	/// Encrypted by Windows Vista: no GUID in the header, metadata found via its LCN.
	Vista,
	/// Encrypted by Windows 7 or later.
	Seven,
	/// BitLocker To-Go (removable media, FAT-looking header).
	ToGo,
}

/// The first sector of a BitLocker volume.
#[derive(Deserialize, PartialEq, Serialize)]
pub struct VolumeHeader {
	pub jump: [u8; 3],
	/// "-FVE-FS-" or "MSWIN4.1"
	pub signature: [u8; 8],
	/// usually 512
	pub sector_size: u16,
	pub sectors_per_cluster: u8,
	pub reserved_clusters: u16,
	pub fat_count: u8,
	pub root_entries: u16,
	pub nb_sectors_16b: u16,
	pub media_descriptor: u8,
	pub sectors_per_fat: u16,
	pub sectors_per_track: u16,
	pub nb_of_heads: u16,
	pub hidden_sectors: u32,
	pub nb_sectors_32b: u32,
	_unknown2: [u8; 4],
	pub nb_sectors_64b: u64,
	pub mft_start_cluster: u64,
	/// non-zero only for volumes encrypted by Vista
	pub metadata_lcn: u64,
	#[serde(with = "BigArray")]
	_unknown3: [u8; 96],
	/// at offset 0xa0
	pub guid: Guid,
	/// offsets of the three FVE metadata blocks, not for Vista
	pub information_off: [u64; 3],
	/// not for Vista nor 7
	pub eow_information_off: [u64; 2],
	#[serde(with = "BigArray")]
	_unknown4: [u8; 208],
	/// at offset 0x1a8, To-Go only
	pub bltg_guid: Guid,
	pub bltg_header: [u64; 3],
	#[serde(with = "BigArray")]
	_unknown7: [u8; 46],
	/// 0xaa55
	pub boot_partition_identifier: u16,
}

impl VolumeHeader {
	/// Attempt to read a volume header from a reader.
	///
	/// Note: a volume header is always exactly 512 bytes long. No check is
	/// performed here, see [`VolumeHeader::version`].
	pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, ParseError> {
		Ok(options().deserialize_from(reader)?)
	}

	/// Decode a volume header from the start of `bytes`.
	pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
		Ok(options().deserialize(bytes)?)
	}

	/// Check the header and tell which BitLocker flavour wrote it.
	pub fn version(&self) -> Result<VolumeVersion, ParseError> {
		if self.sector_size == 0 {
			return Err(ParseError::NullSectorSize);
		}

		let version = if self.signature == BITLOCKER_SIGNATURE {
			if self.metadata_lcn == 0 {
				VolumeVersion::Seven
			} else {
				VolumeVersion::Vista
			}
		} else if self.signature == BITLOCKER_TO_GO_SIGNATURE {
			VolumeVersion::ToGo
		} else {
			return Err(ParseError::InvalidSignature(self.signature));
		};

		// there's no GUID in the header of volumes encrypted by Vista
		if version != VolumeVersion::Vista {
			let guid = self.volume_guid();
			if !guid.is_information_guid() {
				return Err(ParseError::UnknownVolumeGuid(guid.to_string()));
			}
		}

		Ok(version)
	}

	/// The GUID identifying the header layout, depending on the signature.
	pub fn volume_guid(&self) -> Guid {
		if self.signature == BITLOCKER_TO_GO_SIGNATURE {
			self.bltg_guid
		} else {
			self.guid
		}
	}

	/// Byte offset of the first metadata block of a Vista volume.
	pub fn vista_metadata_offset(&self) -> u64 {
		self.metadata_lcn
			.wrapping_mul(u64::from(self.sectors_per_cluster))
			.wrapping_mul(u64::from(self.sector_size))
	}
}

// implement manually to omit the unknown sections
impl Debug for VolumeHeader {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("VolumeHeader")
			.field("jump", &self.jump)
			.field("signature", &self.signature)
			.field("sector_size", &self.sector_size)
			.field("sectors_per_cluster", &self.sectors_per_cluster)
			.field("nb_sectors_64b", &self.nb_sectors_64b)
			.field("metadata_lcn", &self.metadata_lcn)
			.field("guid", &self.guid)
			.field("information_off", &self.information_off)
			.field("eow_information_off", &self.eow_information_off)
			.field("bltg_guid", &self.bltg_guid)
			.field("bltg_header", &self.bltg_header)
			.field("boot_partition_identifier", &self.boot_partition_identifier)
			.finish()
	}
}

impl Display for VolumeHeader {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fn offsets_to_string(offsets: &[u64]) -> String {
			offsets
				.iter()
				.map(|o| format!("{:#x}", o))
				.collect::<Vec<_>>()
				.join(", ")
		}

		let (guid, offsets) = if self.signature == BITLOCKER_TO_GO_SIGNATURE {
			(self.bltg_guid, offsets_to_string(&self.bltg_header))
		} else {
			(self.guid, offsets_to_string(&self.information_off))
		};

		write!(f, "VolumeHeader {{\n\
			\tsignature: {},\n\
			\tsector size: {},\n\
			\tsectors per cluster: {},\n\
			\tsectors: {},\n\
			\tmetadata lcn: {},\n\
			\tvolume guid: {},\n\
			\tmetadata offsets: [{}],\n\
			\tboot partition identifier: {:#06x}\n\
			}}",
			String::from_utf8_lossy(&self.signature), self.sector_size,
			self.sectors_per_cluster, self.nb_sectors_64b, self.metadata_lcn,
			guid, offsets, self.boot_partition_identifier
		)
	}
}

/// Header of an FVE metadata block ("information" in Microsoft parlance).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct InformationHeader {
	/// must be "-FVE-FS-"
	pub signature: [u8; 8],
	/// total block size, multiplied by 16 when the version is 2
	pub size: u16,
	/// 1 for Vista, 2 for 7 and later
	pub version: u16,
	pub curr_state: u16,
	pub next_state: u16,
	pub encrypted_volume_size: u64,
	pub convert_size: u32,
	pub nb_backup_sectors: u32,
	pub information_off: [u64; 3],
	/// boot sectors backup, or MFT mirror backup for Vista
	pub boot_sectors_backup: u64,
}

impl InformationHeader {
	pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
		Ok(options().deserialize(bytes)?)
	}

	/// Size in bytes of the whole metadata block this header starts.
	pub fn metadata_size(&self) -> usize {
		if self.version == 2 {
			usize::from(self.size) << 4
		} else {
			usize::from(self.size)
		}
	}
}

/// Header of the dataset holding every datum of a metadata block.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DatasetHeader {
	pub size: u32,
	/// = 1
	pub unknown1: u32,
	/// = 0x30
	pub header_size: u32,
	/// = size
	pub copy_size: u32,
	pub guid: Guid,
	pub next_counter: u32,
	/// encryption method of the volume
	pub algorithm: u16,
	pub trash: u16,
	/// NTFS timestamp
	pub timestamp: u64,
}

impl DatasetHeader {
	pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
		Ok(options().deserialize(bytes)?)
	}

	/// Sanity checks on the sizes, `available` being the bytes left in the
	/// metadata block from the dataset start.
	pub fn check(&self, available: usize) -> Result<(), ParseError> {
		if self.copy_size < self.header_size
			|| self.size > self.copy_size
			|| self.copy_size - self.header_size < 8
			|| self.size as usize > available
		{
			return Err(ParseError::InvalidDataset {
				size: self.size,
				copy_size: self.copy_size,
				header_size: self.header_size,
			});
		}
		Ok(())
	}
}

/// Stored right after each metadata block; carries its CRC32.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Validations {
	pub size: u16,
	pub version: u16,
	pub crc32: u32,
}

impl Validations {
	pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, ParseError> {
		Ok(options().deserialize_from(reader)?)
	}
}
