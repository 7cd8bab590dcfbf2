//! Key material and the enumerations describing it.

use std::fmt;
use zeroize::Zeroize;

/// The kind of protector guarding a VMK datum, taken from the last two bytes
/// of the datum's nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectorKind {
	/// The VMK is stored next to its key; protection is suspended.
	ClearKey,
	Tpm,
	StartupKey,
	TpmAndPin,
	RecoveryPassword,
	Password,
	Unknown(u16),
}

impl ProtectorKind {
	pub fn from_protection(value: u16) -> Self {
		match value {
			0x0000..=0x00ff => ProtectorKind::ClearKey,
			0x0100 => ProtectorKind::Tpm,
			0x0200 => ProtectorKind::StartupKey,
			0x0500 => ProtectorKind::TpmAndPin,
			0x0800..=0x0fff => ProtectorKind::RecoveryPassword,
			0x2000 => ProtectorKind::Password,
			x => ProtectorKind::Unknown(x),
		}
	}
}

impl fmt::Display for ProtectorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProtectorKind::ClearKey => write!(f, "clear key"),
			ProtectorKind::Tpm => write!(f, "TPM"),
			ProtectorKind::StartupKey => write!(f, "startup key"),
			ProtectorKind::TpmAndPin => write!(f, "TPM and PIN"),
			ProtectorKind::RecoveryPassword => write!(f, "recovery password"),
			ProtectorKind::Password => write!(f, "user password"),
			ProtectorKind::Unknown(x) => write!(f, "unknown ({:#06x})", x),
		}
	}
}

/// Encryption method of the volume content, as stored with the FVEK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMethod {
	Aes128Diffuser,
	Aes256Diffuser,
	Aes128,
	Aes256,
	AesXts128,
	AesXts256,
}

impl EncryptionMethod {
	pub fn from_u16(value: u16) -> Option<Self> {
		match value {
			0x8000 => Some(EncryptionMethod::Aes128Diffuser),
			0x8001 => Some(EncryptionMethod::Aes256Diffuser),
			0x8002 => Some(EncryptionMethod::Aes128),
			0x8003 => Some(EncryptionMethod::Aes256),
			0x8004 => Some(EncryptionMethod::AesXts128),
			0x8005 => Some(EncryptionMethod::AesXts256),
			_ => None,
		}
	}

	pub fn as_u16(self) -> u16 {
		match self {
			EncryptionMethod::Aes128Diffuser => 0x8000,
			EncryptionMethod::Aes256Diffuser => 0x8001,
			EncryptionMethod::Aes128 => 0x8002,
			EncryptionMethod::Aes256 => 0x8003,
			EncryptionMethod::AesXts128 => 0x8004,
			EncryptionMethod::AesXts256 => 0x8005,
		}
	}

	/// Size in bytes of the key material this method needs. Diffuser methods
	/// carry the sector key and the diffuser tweak key in one 64-byte block.
	pub fn key_len(self) -> usize {
		match self {
			EncryptionMethod::Aes128 => 16,
			EncryptionMethod::Aes256 | EncryptionMethod::AesXts128 => 32,
			EncryptionMethod::Aes128Diffuser
			| EncryptionMethod::Aes256Diffuser
			| EncryptionMethod::AesXts256 => 64,
		}
	}
}

impl fmt::Display for EncryptionMethod {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			EncryptionMethod::Aes128Diffuser => "AES-128-CBC + Elephant diffuser",
			EncryptionMethod::Aes256Diffuser => "AES-256-CBC + Elephant diffuser",
			EncryptionMethod::Aes128 => "AES-128-CBC",
			EncryptionMethod::Aes256 => "AES-256-CBC",
			EncryptionMethod::AesXts128 => "AES-XTS-128",
			EncryptionMethod::AesXts256 => "AES-XTS-256",
		};
		f.write_str(s)
	}
}

/// The volume master key, unwrapped from one of the key protectors.
pub struct MasterKey(Vec<u8>);

impl MasterKey {
	pub fn new(key: Vec<u8>) -> Self {
		MasterKey(key)
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl Drop for MasterKey {
	fn drop(&mut self) {
		self.0.zeroize();
	}
}

// never print key bytes
impl fmt::Debug for MasterKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "MasterKey {{ len: {} }}", self.0.len())
	}
}

/// The full volume encryption key, the final result of a recovery attempt.
pub struct RecoveredKey {
	method: EncryptionMethod,
	key: Vec<u8>,
}

impl RecoveredKey {
	pub fn new(method: EncryptionMethod, key: Vec<u8>) -> Self {
		RecoveredKey { method, key }
	}

	pub fn method(&self) -> EncryptionMethod {
		self.method
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.key
	}

	pub fn len(&self) -> usize {
		self.key.len()
	}

	pub fn is_empty(&self) -> bool {
		self.key.is_empty()
	}

	/// Lowercase hex rendering of the key bytes.
	pub fn to_hex(&self) -> String {
		hex::encode(&self.key)
	}
}

impl Drop for RecoveredKey {
	fn drop(&mut self) {
		self.key.zeroize();
	}
}

impl fmt::Debug for RecoveredKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "RecoveredKey {{ method: {:?}, len: {} }}", self.method, self.key.len())
	}
}
