use crate::{datum::AesCcmDatum, error::FveError};
use aes::{Aes128, Aes256};
use ccm::{
	aead::{generic_array::GenericArray, Aead, KeyInit},
	consts::{U12, U16},
	Ccm,
};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

type Aes128Ccm = Ccm<Aes128, U16, U12>;
type Aes256Ccm = Ccm<Aes256, U16, U12>;

/// Number of SHA-256 rounds applied when stretching a password.
pub const STRETCH_ROUNDS: u64 = 0x10_0000;

const RECOVERY_BLOCKS: usize = 8;
const RECOVERY_BLOCK_DIGITS: usize = 6;
const RECOVERY_PASSWORD_LEN: usize = RECOVERY_BLOCKS * (RECOVERY_BLOCK_DIGITS + 1) - 1;

/// Stretches a 32-byte password hash with a 16-byte salt.
///
/// The hashed state is `updated_hash | password_hash | salt | count`, the
/// counter being a little endian u64 incremented after every round.
pub fn stretch_key(password_hash: &[u8; 32], salt: &[u8; 16]) -> Zeroizing<[u8; 32]> {
	let mut chain = Zeroizing::new([0u8; 88]);
	chain[32..64].copy_from_slice(password_hash);
	chain[64..80].copy_from_slice(salt);

	let mut sha256 = Sha256::new();
	for count in 0..STRETCH_ROUNDS {
		chain[80..88].copy_from_slice(&count.to_le_bytes());
		sha256.update(&chain[..]);
		chain[..32].copy_from_slice(&sha256.finalize_reset()[..]);
	}

	let mut result = Zeroizing::new([0u8; 32]);
	result.copy_from_slice(&chain[..32]);
	result
}

/// SHA256(SHA256(UTF-16LE(password))), without any string terminator.
pub fn user_password_hash(password: &str) -> Zeroizing<[u8; 32]> {
	let utf16: Zeroizing<Vec<u8>> = Zeroizing::new(
		password.encode_utf16().flat_map(u16::to_le_bytes).collect(),
	);
	let first = Sha256::digest(&utf16[..]);
	let mut hash = Zeroizing::new([0u8; 32]);
	hash.copy_from_slice(&Sha256::digest(&first[..])[..]);
	hash
}

/// Key used to unwrap a VMK protected by a user password.
pub fn user_password_key(password: &str, salt: &[u8; 16]) -> Zeroizing<[u8; 32]> {
	stretch_key(&user_password_hash(password), salt)
}

fn recovery_block(digits: &[u8], block: usize) -> Result<u16, FveError> {
	let malformed = |why: String| FveError::MalformedRecoveryPassword(format!("block {}: {}", block, why));

	if !digits.iter().all(u8::is_ascii_digit) {
		return Err(malformed("not only digits".to_string()));
	}
	let value = digits.iter().fold(0u32, |acc, d| acc * 10 + u32::from(d - b'0'));
	if value % 11 != 0 {
		return Err(malformed(format!("{} is not divisible by 11", value)));
	}
	if value >= 720_896 {
		return Err(malformed(format!("{} is not less than 2**16 * 11", value)));
	}
	// the check digit (d0 - d1 + d2 - d3 + d4) mod 11 == d5 is implied by
	// divisibility by 11

	Ok((value / 11) as u16)
}

/// Validates a 48-digit recovery password ("XXXXXX-XXXXXX-...") and returns
/// the 16-byte key it encodes.
pub fn recovery_password_key(recovery_password: &str) -> Result<Zeroizing<[u8; 16]>, FveError> {
	let rp = recovery_password.trim().as_bytes();
	if rp.len() != RECOVERY_PASSWORD_LEN {
		return Err(FveError::MalformedRecoveryPassword(format!(
			"wrong length {} (has to be {})", rp.len(), RECOVERY_PASSWORD_LEN
		)));
	}

	let mut key = Zeroizing::new([0u8; 16]);
	for (i, chunk) in rp.chunks(RECOVERY_BLOCK_DIGITS + 1).enumerate() {
		if i + 1 < RECOVERY_BLOCKS && chunk.get(RECOVERY_BLOCK_DIGITS) != Some(&b'-') {
			return Err(FveError::MalformedRecoveryPassword(format!(
				"block {}: not followed by a dash", i + 1
			)));
		}
		let block = recovery_block(&chunk[..RECOVERY_BLOCK_DIGITS], i + 1)?;
		key[2 * i..2 * i + 2].copy_from_slice(&block.to_le_bytes());
	}
	Ok(key)
}

/// Key used to unwrap a VMK protected by a recovery password.
pub fn recovery_password_stretch(key: &[u8; 16], salt: &[u8; 16]) -> Zeroizing<[u8; 32]> {
	let mut hash = Zeroizing::new([0u8; 32]);
	hash.copy_from_slice(&Sha256::digest(&key[..])[..]);
	stretch_key(&hash, salt)
}

/// Decrypt and authenticate the payload of an AES-CCM datum.
///
/// `what` names the decrypted material in the error returned on MAC mismatch.
pub fn decrypt_datum(
	key: &[u8],
	datum: &AesCcmDatum<'_>,
	what: &'static str,
) -> Result<Zeroizing<Vec<u8>>, FveError> {
	let nonce = GenericArray::from_slice(datum.nonce());
	let mut sealed = Vec::with_capacity(datum.ciphertext().len() + 16);
	sealed.extend_from_slice(datum.ciphertext());
	sealed.extend_from_slice(datum.mac());

	let plain = match key.len() {
		16 => Aes128Ccm::new_from_slice(key)
			.map_err(|_| FveError::UnsupportedKeySize(key.len()))?
			.decrypt(nonce, &sealed[..]),
		32 => Aes256Ccm::new_from_slice(key)
			.map_err(|_| FveError::UnsupportedKeySize(key.len()))?
			.decrypt(nonce, &sealed[..]),
		n => return Err(FveError::UnsupportedKeySize(n)),
	};

	plain
		.map(Zeroizing::new)
		.map_err(|_| FveError::AuthenticationFailed(what))
}
