//! Startup keys, as saved by BitLocker to `.BEK` files on removable media.
//!
//! A BEK file is a bare dataset: a dataset header followed by datums, one of
//! them an EXTERNAL KEY naming the VMK it opens and holding the key for it.

use crate::{
	datum::{DatumIter, ExternalKeyDatum, ValueType},
	error::{FveError, ParseError},
	header::{DatasetHeader, Guid, DATASET_HEADER_SIZE},
};
use std::{
	fmt,
	fs::File,
	io::{self, Read},
	path::Path,
};
use tracing::{debug, info};
use zeroize::Zeroizing;

/// The external key read from a BEK file.
pub struct StartupKey {
	guid: Guid,
	key: Zeroizing<Vec<u8>>,
}

impl StartupKey {
	pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FveError> {
		let file = File::open(path.as_ref())?;
		Self::from_reader(file)
	}

	pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, FveError> {
		let mut raw_header = [0u8; DATASET_HEADER_SIZE];
		reader.read_exact(&mut raw_header)?;
		let dataset = DatasetHeader::from_bytes(&raw_header)?;
		debug!("BEK dataset header: {:?}", dataset);

		let size = dataset.size as usize;
		let header_size = dataset.header_size as usize;
		if size <= DATASET_HEADER_SIZE || header_size < DATASET_HEADER_SIZE || header_size > size {
			return Err(ParseError::InvalidDataset {
				size: dataset.size,
				copy_size: dataset.copy_size,
				header_size: dataset.header_size,
			}
			.into());
		}

		let mut dataset_bytes = Zeroizing::new(raw_header.to_vec());
		reader
			.take((size - DATASET_HEADER_SIZE) as u64)
			.read_to_end(&mut dataset_bytes)?;
		if dataset_bytes.len() != size {
			return Err(io::Error::new(
				io::ErrorKind::UnexpectedEof,
				format!("BEK file holds {} of {} dataset bytes", dataset_bytes.len(), size),
			)
			.into());
		}

		let datum = DatumIter::new(&dataset_bytes[header_size..])
			.filter_map(Result::ok)
			.find(|d| d.value_type() == Some(ValueType::ExternalKey))
			.ok_or(FveError::MissingDatum("EXTERNAL KEY"))?;
		let external = ExternalKeyDatum::new(datum)?;
		let key = external.key().ok_or(FveError::MissingDatum("KEY"))?;

		info!("startup key for VMK {}", external.guid());
		Ok(StartupKey {
			guid: external.guid(),
			key: Zeroizing::new(key.key().to_vec()),
		})
	}

	/// GUID of the VMK this key opens.
	pub fn guid(&self) -> Guid {
		self.guid
	}

	pub fn key(&self) -> &[u8] {
		&self.key
	}
}

impl fmt::Debug for StartupKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("StartupKey")
			.field("guid", &self.guid)
			.field("key", &"..")
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Cursor;

	fn datum(value: u16, body: &[u8]) -> Vec<u8> {
		let mut d = Vec::new();
		d.extend_from_slice(&((8 + body.len()) as u16).to_le_bytes());
		d.extend_from_slice(&[6, 0]);
		d.extend_from_slice(&value.to_le_bytes());
		d.extend_from_slice(&[1, 0]);
		d.extend_from_slice(body);
		d
	}

	fn bek(datums: &[u8]) -> Vec<u8> {
		let size = (DATASET_HEADER_SIZE + datums.len()) as u32;
		let mut raw = vec![0u8; DATASET_HEADER_SIZE];
		raw[0..4].copy_from_slice(&size.to_le_bytes());
		raw[4..8].copy_from_slice(&1u32.to_le_bytes());
		raw[8..12].copy_from_slice(&0x30u32.to_le_bytes());
		raw[12..16].copy_from_slice(&size.to_le_bytes());
		raw.extend_from_slice(datums);
		raw
	}

	fn external_key(guid: u8, key: &[u8]) -> Vec<u8> {
		let mut body = vec![guid; 16];
		body.extend_from_slice(&[0u8; 8]);
		let mut nested = 0x2000u16.to_le_bytes().to_vec();
		nested.extend_from_slice(&[0, 0]);
		nested.extend_from_slice(key);
		body.extend(datum(1, &nested));
		datum(9, &body)
	}

	#[test]
	fn reads_the_external_key() {
		// a description datum ahead of the key
		let mut datums = datum(2, &[b'B', 0, b'E', 0, b'K', 0]);
		datums.extend(external_key(0xa4, &[0xbe; 32]));
		let key = StartupKey::from_reader(Cursor::new(bek(&datums))).unwrap();
		assert_eq!(key.guid(), Guid([0xa4; 16]));
		assert_eq!(key.key(), &[0xbe; 32][..]);
		assert!(!format!("{:?}", key).contains("190"));
	}

	#[test]
	fn rejects_headers_only_and_truncated_files() {
		assert!(matches!(
			StartupKey::from_reader(Cursor::new(bek(&[]))),
			Err(FveError::ParseError(ParseError::InvalidDataset { size: 0x30, .. }))
		));

		let mut raw = bek(&external_key(0xa4, &[0xbe; 32]));
		raw.truncate(raw.len() - 1);
		assert!(matches!(
			StartupKey::from_reader(Cursor::new(raw)),
			Err(FveError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof
		));
	}

	#[test]
	fn needs_an_external_key_with_a_key() {
		let datums = datum(2, &[b'B', 0, b'E', 0, b'K', 0]);
		assert!(matches!(
			StartupKey::from_reader(Cursor::new(bek(&datums))),
			Err(FveError::MissingDatum("EXTERNAL KEY"))
		));

		let mut body = vec![0xa4; 16];
		body.extend_from_slice(&[0u8; 8]);
		assert!(matches!(
			StartupKey::from_reader(Cursor::new(bek(&datum(9, &body)))),
			Err(FveError::MissingDatum("KEY"))
		));
	}
}
