//! Reading the FVE metadata of a volume and unwrapping its keys.
//!
//! A BitLocker volume keeps three copies of its metadata. Each copy is an
//! information header, a dataset header and the datums, followed by a small
//! validation header carrying the CRC32 of the copy.

use crate::{
	config::VolumeConfig,
	crypto,
	datum::{
		AesCcmDatum, Datum, DatumIter, KeyDatum, ValueType, VmkDatum, CLEAR_KEY_PROTECTION,
		ENTRY_FVEK, ENTRY_VMK, RECOVERY_PASSWORD_PROTECTION, STARTUP_KEY_PROTECTION,
		USER_PASSWORD_PROTECTION,
	},
	error::{FveError, ParseError},
	header::{
		DatasetHeader, Guid, InformationHeader, Validations, VolumeHeader, VolumeVersion,
		BITLOCKER_SIGNATURE, DATASET_HEADER_SIZE, INFORMATION_HEADER_SIZE,
	},
	keys::{EncryptionMethod, MasterKey, ProtectorKind, RecoveredKey},
	recovery::KeyProtectors,
	startup_key::StartupKey,
};
use secrecy::{ExposeSecret, SecretString};
use std::{
	fs::File,
	io::{Read, Seek, SeekFrom},
	ops::{Range, RangeInclusive},
	path::Path,
};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// The parsed metadata of a BitLocker volume.
pub struct FveMetadata {
	header: VolumeHeader,
	version: VolumeVersion,
	offsets: [u64; 3],
	selected: u8,
	information: InformationHeader,
	dataset: DatasetHeader,
	block: Vec<u8>,
	datums: Range<usize>,
}

impl FveMetadata {
	/// Open the volume at `path` and read its metadata.
	pub fn open<P: AsRef<Path>>(path: P, config: &VolumeConfig) -> Result<Self, FveError> {
		let file = File::open(path.as_ref())?;
		Self::from_device(file, config)
	}

	/// Read the metadata of the volume starting at `config.offset` in `device`.
	pub fn from_device<D: Read + Seek>(mut device: D, config: &VolumeConfig) -> Result<Self, FveError> {
		config.validate()?;

		device.seek(SeekFrom::Start(config.offset))?;
		let header = VolumeHeader::read_from(&mut device)?;
		let version = header.version()?;
		debug!("volume header: {:?}", header);
		info!("found a {:?} BitLocker volume at offset {:#x}", version, config.offset);

		let offsets = block_offsets(&mut device, config.offset, &header, version)?;
		let (selected, block) = select_block(&mut device, config, &offsets)?;

		let information = InformationHeader::from_bytes(&block)?;
		let dataset = DatasetHeader::from_bytes(&block[INFORMATION_HEADER_SIZE..])?;
		dataset.check(block.len() - INFORMATION_HEADER_SIZE)?;

		let start = INFORMATION_HEADER_SIZE + dataset.header_size as usize;
		let end = INFORMATION_HEADER_SIZE + dataset.size as usize;
		if start > end {
			return Err(ParseError::InvalidDataset {
				size: dataset.size,
				copy_size: dataset.copy_size,
				header_size: dataset.header_size,
			}
			.into());
		}

		Ok(FveMetadata {
			header,
			version,
			offsets,
			selected,
			information,
			dataset,
			block,
			datums: start..end,
		})
	}

	pub fn header(&self) -> &VolumeHeader {
		&self.header
	}

	pub fn version(&self) -> VolumeVersion {
		self.version
	}

	pub fn information(&self) -> &InformationHeader {
		&self.information
	}

	pub fn dataset(&self) -> &DatasetHeader {
		&self.dataset
	}

	/// Offsets, relative to the volume start, of the three metadata blocks.
	pub fn block_offsets(&self) -> [u64; 3] {
		self.offsets
	}

	/// The metadata block in use, 1 to 3.
	pub fn selected_block(&self) -> u8 {
		self.selected
	}

	/// Encryption method announced by the dataset header, if known.
	pub fn encryption_method(&self) -> Option<EncryptionMethod> {
		EncryptionMethod::from_u16(self.dataset.algorithm)
	}

	/// Every top-level datum of the dataset.
	pub fn datums(&self) -> DatumIter<'_> {
		DatumIter::new(&self.block[self.datums.clone()])
	}

	/// The VMK datums of the dataset, malformed ones skipped.
	pub fn vmks(&self) -> impl Iterator<Item = VmkDatum<'_>> + '_ {
		self.datums()
			.filter_map(Result::ok)
			.filter(|d| d.entry_type() == ENTRY_VMK)
			.filter_map(|d| VmkDatum::new(d).ok())
	}

	/// GUID and kind of every key protector of the volume.
	pub fn protectors(&self) -> Vec<(Guid, ProtectorKind)> {
		self.vmks().map(|v| (v.guid(), v.protector())).collect()
	}

	fn unwrap_with_stretched<F>(
		&self,
		range: RangeInclusive<u16>,
		kind: ProtectorKind,
		derive: F,
	) -> Result<MasterKey, FveError>
	where
		F: Fn(&[u8; 16]) -> Zeroizing<[u8; 32]>,
	{
		let mut result = Err(FveError::NoProtector(kind));
		for vmk in self.vmks().filter(|v| range.contains(&v.protection())) {
			let (stretch, aes) = match (vmk.stretch_key(), vmk.aes_ccm()) {
				(Some(s), Some(a)) => (s, a),
				(stretch, _) => {
					let missing = if stretch.is_none() { "STRETCH KEY" } else { "AES-CCM" };
					warn!("{} VMK {} has no {} datum", kind, vmk.guid(), missing);
					// a wrong password on another VMK is the more useful error
					if matches!(result, Err(FveError::NoProtector(_))) {
						result = Err(FveError::MissingDatum(missing));
					}
					continue;
				}
			};

			let key = derive(&stretch.salt());
			match crypto::decrypt_datum(&key[..], &aes, "VMK") {
				Ok(plain) => {
					info!("VMK {} unwrapped with the {}", vmk.guid(), kind);
					return master_key_from(&plain);
				}
				Err(FveError::AuthenticationFailed(_)) => {
					debug!("{} does not open VMK {}", kind, vmk.guid());
					result = Err(FveError::InvalidPassword);
				}
				Err(e) => return Err(e),
			}
		}
		result
	}
}

impl KeyProtectors for FveMetadata {
	fn has_clear_key(&self) -> bool {
		self.vmks().any(|v| CLEAR_KEY_PROTECTION.contains(&v.protection()))
	}

	fn unwrap_with_clear_key(&self) -> Result<MasterKey, FveError> {
		let vmk = self
			.vmks()
			.find(|v| CLEAR_KEY_PROTECTION.contains(&v.protection()))
			.ok_or(FveError::NoProtector(ProtectorKind::ClearKey))?;
		let key = vmk.key().ok_or(FveError::MissingDatum("KEY"))?;
		let aes = vmk.aes_ccm().ok_or(FveError::MissingDatum("AES-CCM"))?;

		let plain = crypto::decrypt_datum(key.key(), &aes, "VMK")?;
		info!("VMK {} unwrapped with its clear key", vmk.guid());
		master_key_from(&plain)
	}

	fn unwrap_with_password(&self, password: &SecretString) -> Result<MasterKey, FveError> {
		let password = password.expose_secret();
		self.unwrap_with_stretched(USER_PASSWORD_PROTECTION, ProtectorKind::Password, |salt| {
			crypto::user_password_key(password, salt)
		})
	}

	fn unwrap_with_recovery_password(&self, recovery_password: &SecretString) -> Result<MasterKey, FveError> {
		let key = crypto::recovery_password_key(recovery_password.expose_secret())?;
		self.unwrap_with_stretched(
			RECOVERY_PASSWORD_PROTECTION,
			ProtectorKind::RecoveryPassword,
			|salt| crypto::recovery_password_stretch(&key, salt),
		)
	}

	fn unwrap_with_startup_key(&self, startup_key: &StartupKey) -> Result<MasterKey, FveError> {
		let vmk = self
			.vmks()
			.filter(|v| STARTUP_KEY_PROTECTION.contains(&v.protection()))
			.find(|v| v.guid() == startup_key.guid())
			.ok_or(FveError::NoProtector(ProtectorKind::StartupKey))?;
		let aes = vmk.aes_ccm().ok_or(FveError::MissingDatum("AES-CCM"))?;

		let plain = crypto::decrypt_datum(startup_key.key(), &aes, "VMK")?;
		info!("VMK {} unwrapped with the startup key", vmk.guid());
		master_key_from(&plain)
	}

	fn derive_content_key(&self, vmk: &MasterKey) -> Result<RecoveredKey, FveError> {
		let fvek = self
			.datums()
			.filter_map(Result::ok)
			.find(|d| d.entry_type() == ENTRY_FVEK && d.value_type() == Some(ValueType::AesCcm))
			.ok_or(FveError::MissingDatum("FVEK"))?;

		let plain = crypto::decrypt_datum(vmk.as_bytes(), &AesCcmDatum::new(fvek)?, "FVEK")?;
		let key = KeyDatum::new(Datum::parse(&plain)?)?;
		let method = EncryptionMethod::from_u16(key.algorithm())
			.ok_or(FveError::UnsupportedCipher(key.algorithm()))?;

		let bytes = key.key();
		if bytes.len() < method.key_len() {
			return Err(FveError::InvalidKeyLength {
				expected: method.key_len(),
				found: bytes.len(),
			});
		}
		info!("FVEK decrypted, encryption method {}", method);
		Ok(RecoveredKey::new(method, bytes[..method.key_len()].to_vec()))
	}
}

fn master_key_from(plain: &[u8]) -> Result<MasterKey, FveError> {
	let key = KeyDatum::new(Datum::parse(plain)?)?;
	Ok(MasterKey::new(key.key().to_vec()))
}

/// Read the metadata block at `offset` from the volume start `base`. Leaves
/// the device positioned right after the block.
fn read_block<D: Read + Seek>(device: &mut D, base: u64, offset: u64) -> Result<Vec<u8>, FveError> {
	if offset == 0 {
		return Err(ParseError::InvalidMetadataOffset(offset).into());
	}
	let start = base
		.checked_add(offset)
		.ok_or(ParseError::InvalidMetadataOffset(offset))?;
	device.seek(SeekFrom::Start(start))?;

	let mut raw_information = [0u8; INFORMATION_HEADER_SIZE];
	device.read_exact(&mut raw_information)?;
	let information = InformationHeader::from_bytes(&raw_information)?;
	if information.signature != BITLOCKER_SIGNATURE {
		return Err(ParseError::InvalidInformationSignature(offset).into());
	}

	let size = information.metadata_size();
	if size <= INFORMATION_HEADER_SIZE + DATASET_HEADER_SIZE {
		return Err(ParseError::MetadataTooSmall { offset, size }.into());
	}

	let mut block = vec![0u8; size];
	block[..INFORMATION_HEADER_SIZE].copy_from_slice(&raw_information);
	device.read_exact(&mut block[INFORMATION_HEADER_SIZE..])?;
	Ok(block)
}

fn block_offsets<D: Read + Seek>(
	device: &mut D,
	base: u64,
	header: &VolumeHeader,
	version: VolumeVersion,
) -> Result<[u64; 3], FveError> {
	match version {
		VolumeVersion::Seven => Ok(header.information_off),
		VolumeVersion::ToGo => Ok(header.bltg_header),
		VolumeVersion::Vista => {
			// only the first block is known from the header, it points to the others
			let first = header.vista_metadata_offset();
			let block = read_block(device, base, first)?;
			let information = InformationHeader::from_bytes(&block)?;
			Ok([first, information.information_off[1], information.information_off[2]])
		}
	}
}

fn select_block<D: Read + Seek>(
	device: &mut D,
	config: &VolumeConfig,
	offsets: &[u64; 3],
) -> Result<(u8, Vec<u8>), FveError> {
	if let Some(n) = config.block {
		let offset = offsets[usize::from(n - 1)];
		info!("using metadata block {} at {:#x} without validation", n, offset);
		return Ok((n, read_block(device, config.offset, offset)?));
	}

	for (n, &offset) in (1u8..).zip(offsets.iter()) {
		let block = match read_block(device, config.offset, offset) {
			Ok(block) => block,
			Err(e) => {
				warn!("could not read metadata block {} at {:#x}: {}", n, offset, e);
				continue;
			}
		};
		let validations = match Validations::read_from(device) {
			Ok(v) => v,
			Err(e) => {
				warn!("could not read the validations of metadata block {}: {}", n, e);
				continue;
			}
		};

		let crc32 = crc32fast::hash(&block);
		if crc32 == validations.crc32 {
			info!("using metadata block {} at {:#x}", n, offset);
			return Ok((n, block));
		}
		warn!(
			"metadata block {} failed validation: crc32 {:#010x}, expected {:#010x}",
			n, crc32, validations.crc32
		);
	}

	Err(ParseError::NoValidMetadata.into())
}
