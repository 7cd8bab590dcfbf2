//! Datums are the variable-size records stored in the dataset of an FVE
//! metadata block. Each one starts with an 8-byte header giving its size, its
//! entry type (what it is for) and its value type (how its payload is laid out).

use crate::{
	error::ParseError,
	header::Guid,
	keys::ProtectorKind,
};
use std::ops::RangeInclusive;

pub const DATUM_HEADER_SIZE: usize = 8;

/// Entry type of datums holding a VMK.
pub const ENTRY_VMK: u16 = 0x0002;
/// Entry type of the datum holding the FVEK.
pub const ENTRY_FVEK: u16 = 0x0003;

/// Protection values of VMK datums for each supported credential.
pub const CLEAR_KEY_PROTECTION: RangeInclusive<u16> = 0x0000..=0x00ff;
pub const RECOVERY_PASSWORD_PROTECTION: RangeInclusive<u16> = 0x0800..=0x0fff;
pub const STARTUP_KEY_PROTECTION: RangeInclusive<u16> = 0x0200..=0x0200;
pub const USER_PASSWORD_PROTECTION: RangeInclusive<u16> = 0x2000..=0x2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
	Erased,
	Key,
	Unicode,
	StretchKey,
	UseKey,
	AesCcm,
	TpmEncoded,
	Validation,
	Vmk,
	ExternalKey,
	Update,
	Error,
	AsymEnc,
	ExportedKey,
	PublicKey,
	VirtualizationInfo,
	Simple1,
	Simple2,
	ConcatHashKey,
	Simple3,
}

impl ValueType {
	pub fn from_u16(value: u16) -> Option<Self> {
		use ValueType::*;
		const TYPES: [ValueType; 20] = [
			Erased, Key, Unicode, StretchKey, UseKey, AesCcm, TpmEncoded, Validation,
			Vmk, ExternalKey, Update, Error, AsymEnc, ExportedKey, PublicKey,
			VirtualizationInfo, Simple1, Simple2, ConcatHashKey, Simple3,
		];
		TYPES.get(usize::from(value)).copied()
	}

	/// Size of the datum header for this value type, the common 8-byte header
	/// included.
	pub fn header_size(self) -> usize {
		use ValueType::*;
		match self {
			Erased | Unicode | Validation | AsymEnc | ExportedKey | PublicKey => 8,
			Key | UseKey | TpmEncoded | Simple1 | Simple2 | Simple3 => 0xc,
			VirtualizationInfo => 0x18,
			StretchKey | ConcatHashKey => 0x1c,
			ExternalKey => 0x20,
			AesCcm | Vmk => 0x24,
			Update => 0x2c,
			Error => 0x34,
		}
	}

	pub fn has_nested(self) -> bool {
		use ValueType::*;
		matches!(self, StretchKey | UseKey | Vmk | ExternalKey | Update)
	}

	pub fn name(self) -> &'static str {
		use ValueType::*;
		match self {
			Erased => "ERASED",
			Key => "KEY",
			Unicode => "UNICODE",
			StretchKey => "STRETCH KEY",
			UseKey => "USE KEY",
			AesCcm => "AES-CCM",
			TpmEncoded => "TPM ENCODED",
			Validation => "VALIDATION",
			Vmk => "VMK",
			ExternalKey => "EXTERNAL KEY",
			Update => "UPDATE",
			Error => "ERROR",
			AsymEnc => "ASYM ENC",
			ExportedKey => "EXPORTED KEY",
			PublicKey => "PUBLIC KEY",
			VirtualizationInfo => "VIRTUALIZATION INFO",
			Simple1 | Simple2 | Simple3 => "SIMPLE",
			ConcatHashKey => "CONCAT HASH KEY",
		}
	}
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
	u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

/// A single datum, borrowed from the buffer it was found in.
#[derive(Clone, Copy, Debug)]
pub struct Datum<'a> {
	bytes: &'a [u8],
}

impl<'a> Datum<'a> {
	/// Parse the datum starting at `bytes[0]`. The returned datum only covers
	/// the size announced in its header.
	pub fn parse(bytes: &'a [u8]) -> Result<Self, ParseError> {
		Self::parse_at(bytes, 0)
	}

	fn parse_at(bytes: &'a [u8], offset: usize) -> Result<Self, ParseError> {
		if bytes.len() < DATUM_HEADER_SIZE {
			return Err(ParseError::InvalidDatum(offset));
		}
		let size = usize::from(read_u16(bytes, 0));
		if size < DATUM_HEADER_SIZE || size > bytes.len() {
			return Err(ParseError::InvalidDatum(offset));
		}
		let datum = Datum { bytes: &bytes[..size] };
		if size < datum.header_size() {
			return Err(ParseError::InvalidDatum(offset));
		}
		Ok(datum)
	}

	pub fn size(&self) -> usize {
		self.bytes.len()
	}

	pub fn entry_type(&self) -> u16 {
		read_u16(self.bytes, 2)
	}

	pub fn raw_value_type(&self) -> u16 {
		read_u16(self.bytes, 4)
	}

	pub fn value_type(&self) -> Option<ValueType> {
		ValueType::from_u16(self.raw_value_type())
	}

	pub fn error_status(&self) -> u16 {
		read_u16(self.bytes, 6)
	}

	pub fn header_size(&self) -> usize {
		self.value_type().map_or(DATUM_HEADER_SIZE, ValueType::header_size)
	}

	/// Everything after the type-specific header.
	pub fn payload(&self) -> &'a [u8] {
		&self.bytes[self.header_size()..]
	}

	pub fn as_bytes(&self) -> &'a [u8] {
		self.bytes
	}

	/// Iterate over the datums nested in this one. Empty for value types that
	/// cannot carry nested datums.
	pub fn nested(&self) -> DatumIter<'a> {
		match self.value_type() {
			Some(vt) if vt.has_nested() => DatumIter::new(self.payload()),
			_ => DatumIter::new(&[]),
		}
	}

	/// First nested datum of the given value type.
	pub fn nested_of(&self, value_type: ValueType) -> Option<Datum<'a>> {
		self.nested()
			.filter_map(Result::ok)
			.find(|d| d.value_type() == Some(value_type))
	}

	fn expect(self, value_type: ValueType) -> Result<Self, ParseError> {
		if self.value_type() != Some(value_type) {
			return Err(ParseError::UnexpectedDatumType {
				expected: value_type.name(),
				found: self.raw_value_type(),
			});
		}
		Ok(self)
	}
}

/// Iterator over consecutive datums of a buffer.
///
/// Stops when fewer than a datum header's worth of bytes remain, and after
/// yielding the first error.
pub struct DatumIter<'a> {
	rest: &'a [u8],
	offset: usize,
}

impl<'a> DatumIter<'a> {
	pub fn new(bytes: &'a [u8]) -> Self {
		DatumIter { rest: bytes, offset: 0 }
	}
}

impl<'a> Iterator for DatumIter<'a> {
	type Item = Result<Datum<'a>, ParseError>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.rest.len() <= DATUM_HEADER_SIZE {
			return None;
		}
		match Datum::parse_at(self.rest, self.offset) {
			Ok(d) => {
				self.rest = &self.rest[d.size()..];
				self.offset += d.size();
				Some(Ok(d))
			}
			Err(e) => {
				self.rest = &[];
				Some(Err(e))
			}
		}
	}
}

/// A KEY datum: an algorithm identifier and raw key bytes.
#[derive(Clone, Copy, Debug)]
pub struct KeyDatum<'a>(Datum<'a>);

impl<'a> KeyDatum<'a> {
	pub fn new(datum: Datum<'a>) -> Result<Self, ParseError> {
		Ok(KeyDatum(datum.expect(ValueType::Key)?))
	}

	pub fn algorithm(&self) -> u16 {
		read_u16(self.0.bytes, 8)
	}

	pub fn key(&self) -> &'a [u8] {
		self.0.payload()
	}
}

/// A STRETCH KEY datum, carrying the salt used to stretch passwords.
#[derive(Clone, Copy, Debug)]
pub struct StretchKeyDatum<'a>(Datum<'a>);

impl<'a> StretchKeyDatum<'a> {
	pub fn new(datum: Datum<'a>) -> Result<Self, ParseError> {
		Ok(StretchKeyDatum(datum.expect(ValueType::StretchKey)?))
	}

	pub fn algorithm(&self) -> u16 {
		read_u16(self.0.bytes, 8)
	}

	pub fn salt(&self) -> [u8; 16] {
		let mut salt = [0; 16];
		salt.copy_from_slice(&self.0.bytes[12..28]);
		salt
	}
}

/// An AES-CCM datum: nonce, MAC and the encrypted payload.
#[derive(Clone, Copy, Debug)]
pub struct AesCcmDatum<'a>(Datum<'a>);

impl<'a> AesCcmDatum<'a> {
	pub fn new(datum: Datum<'a>) -> Result<Self, ParseError> {
		Ok(AesCcmDatum(datum.expect(ValueType::AesCcm)?))
	}

	pub fn nonce(&self) -> &'a [u8] {
		&self.0.bytes[8..20]
	}

	pub fn mac(&self) -> &'a [u8] {
		&self.0.bytes[20..36]
	}

	pub fn ciphertext(&self) -> &'a [u8] {
		self.0.payload()
	}
}

/// An EXTERNAL KEY datum, as found in startup key (.BEK) files: the GUID of
/// the VMK it opens and a nested KEY datum.
#[derive(Clone, Copy, Debug)]
pub struct ExternalKeyDatum<'a>(Datum<'a>);

impl<'a> ExternalKeyDatum<'a> {
	pub fn new(datum: Datum<'a>) -> Result<Self, ParseError> {
		Ok(ExternalKeyDatum(datum.expect(ValueType::ExternalKey)?))
	}

	pub fn guid(&self) -> Guid {
		let mut g = [0; 16];
		g.copy_from_slice(&self.0.bytes[8..24]);
		Guid(g)
	}

	pub fn key(&self) -> Option<KeyDatum<'a>> {
		self.0.nested_of(ValueType::Key).map(KeyDatum)
	}
}

/// A VMK datum: the protector GUID, its nonce and the nested datums needed to
/// unwrap the VMK.
#[derive(Clone, Copy, Debug)]
pub struct VmkDatum<'a>(Datum<'a>);

impl<'a> VmkDatum<'a> {
	pub fn new(datum: Datum<'a>) -> Result<Self, ParseError> {
		Ok(VmkDatum(datum.expect(ValueType::Vmk)?))
	}

	pub fn guid(&self) -> Guid {
		let mut g = [0; 16];
		g.copy_from_slice(&self.0.bytes[8..24]);
		Guid(g)
	}

	pub fn nonce(&self) -> &'a [u8] {
		&self.0.bytes[24..36]
	}

	/// The last two bytes of the nonce tell which protector guards this VMK.
	pub fn protection(&self) -> u16 {
		read_u16(self.0.bytes, 34)
	}

	pub fn protector(&self) -> ProtectorKind {
		ProtectorKind::from_protection(self.protection())
	}

	pub fn datum(&self) -> Datum<'a> {
		self.0
	}

	pub fn key(&self) -> Option<KeyDatum<'a>> {
		self.0.nested_of(ValueType::Key).map(KeyDatum)
	}

	pub fn stretch_key(&self) -> Option<StretchKeyDatum<'a>> {
		self.0.nested_of(ValueType::StretchKey).map(StretchKeyDatum)
	}

	pub fn aes_ccm(&self) -> Option<AesCcmDatum<'a>> {
		self.0.nested_of(ValueType::AesCcm).map(AesCcmDatum)
	}
}
