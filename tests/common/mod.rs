//! Builds small BitLocker volume images: a volume header and three metadata
//! blocks holding VMKs protected by a clear key, passwords or a startup key,
//! and an FVEK. Also builds the BEK files holding startup keys.
#![allow(dead_code)]

use aes::Aes256;
use bitlocker::{
	crypto,
	header::{BITLOCKER_SIGNATURE, INFORMATION_OFFSET_GUID, VOLUME_HEADER_SIZE},
};
use ccm::{
	aead::{generic_array::GenericArray, Aead, KeyInit},
	consts::{U12, U16},
	Ccm,
};

type Aes256Ccm = Ccm<Aes256, U16, U12>;

pub const BLOCK_OFFSETS: [u64; 3] = [0x1000, 0x3000, 0x5000];
pub const IMAGE_SIZE: usize = 0x6000;
pub const XTS_128: u16 = 0x8004;
pub const STARTUP_KEY: [u8; 32] = [0xbe; 32];
pub const STARTUP_KEY_GUID: u8 = 0xa4;

pub fn datum(entry: u16, value: u16, body: &[u8]) -> Vec<u8> {
	let mut d = Vec::new();
	d.extend_from_slice(&((8 + body.len()) as u16).to_le_bytes());
	d.extend_from_slice(&entry.to_le_bytes());
	d.extend_from_slice(&value.to_le_bytes());
	d.extend_from_slice(&1u16.to_le_bytes());
	d.extend_from_slice(body);
	d
}

pub fn key_datum(entry: u16, algorithm: u16, key: &[u8]) -> Vec<u8> {
	let mut body = algorithm.to_le_bytes().to_vec();
	body.extend_from_slice(&[0, 0]);
	body.extend_from_slice(key);
	datum(entry, 1, &body)
}

fn stretch_key_datum(salt: &[u8; 16]) -> Vec<u8> {
	let mut body = 0x1000u16.to_le_bytes().to_vec();
	body.extend_from_slice(&[0, 0]);
	body.extend_from_slice(salt);
	datum(0, 3, &body)
}

pub fn aes_ccm_datum(entry: u16, key: &[u8; 32], nonce: &[u8; 12], plain: &[u8]) -> Vec<u8> {
	let sealed = Aes256Ccm::new_from_slice(key)
		.unwrap()
		.encrypt(GenericArray::from_slice(nonce), plain)
		.unwrap();
	let (ct, mac) = sealed.split_at(sealed.len() - 16);

	let mut body = nonce.to_vec();
	body.extend_from_slice(mac);
	body.extend_from_slice(ct);
	datum(entry, 5, &body)
}

fn dataset_header(size: u32, method: u16) -> Vec<u8> {
	let mut dataset = vec![0u8; 0x30];
	dataset[0..4].copy_from_slice(&size.to_le_bytes());
	dataset[4..8].copy_from_slice(&1u32.to_le_bytes());
	dataset[8..12].copy_from_slice(&0x30u32.to_le_bytes());
	dataset[12..16].copy_from_slice(&size.to_le_bytes());
	dataset[36..38].copy_from_slice(&method.to_le_bytes());
	dataset
}

/// A BEK file holding `key` for the VMK whose GUID is `guid` repeated.
pub fn bek_file(guid: u8, key: &[u8]) -> Vec<u8> {
	let mut external = vec![guid; 16];
	external.extend_from_slice(&0x01d0_0000_0000_0000u64.to_le_bytes());
	external.extend(key_datum(0, 0x2002, key));

	let mut datums = datum(7, 2, &"STARTUP KEY\0".encode_utf16().flat_map(u16::to_le_bytes).collect::<Vec<_>>());
	datums.extend(datum(6, 9, &external));

	let mut file = dataset_header((0x30 + datums.len()) as u32, 0);
	file.extend(datums);
	file
}

fn vmk_datum(guid: u8, protection: u16, nested: &[Vec<u8>]) -> Vec<u8> {
	let mut body = vec![guid; 16];
	body.extend_from_slice(&[0x01; 10]);
	body.extend_from_slice(&protection.to_le_bytes());
	for n in nested {
		body.extend_from_slice(n);
	}
	datum(2, 8, &body)
}

pub struct VolumeBuilder {
	pub vmk: [u8; 32],
	pub fvek: Vec<u8>,
	pub method: u16,
	protectors: Vec<Vec<u8>>,
	corrupt: Vec<usize>,
	nonce: u8,
	vista: bool,
}

impl VolumeBuilder {
	pub fn new() -> Self {
		VolumeBuilder {
			vmk: [0x5a; 32],
			fvek: (0..32).collect(),
			method: XTS_128,
			protectors: Vec::new(),
			corrupt: Vec::new(),
			nonce: 0,
			vista: false,
		}
	}

	fn next_nonce(&mut self) -> [u8; 12] {
		self.nonce += 1;
		[self.nonce; 12]
	}

	fn wrapped_vmk(&mut self, key: &[u8; 32]) -> Vec<u8> {
		let nonce = self.next_nonce();
		let plain = key_datum(0, 0x2000, &self.vmk);
		aes_ccm_datum(0, key, &nonce, &plain)
	}

	pub fn clear_key(mut self) -> Self {
		let clear = [0xc1; 32];
		let wrapped = self.wrapped_vmk(&clear);
		let vmk = vmk_datum(0xa1, 0x0000, &[key_datum(0, 0x2000, &clear), wrapped]);
		self.protectors.push(vmk);
		self
	}

	/// A clear key VMK whose wrapped key fails authentication.
	pub fn broken_clear_key(mut self) -> Self {
		let clear = [0xc1; 32];
		let mut wrapped = self.wrapped_vmk(&clear);
		// first MAC byte, after the datum header and the nonce
		wrapped[20] ^= 0xff;
		let vmk = vmk_datum(0xa1, 0x0000, &[key_datum(0, 0x2000, &clear), wrapped]);
		self.protectors.push(vmk);
		self
	}

	pub fn startup_key(mut self) -> Self {
		let wrapped = self.wrapped_vmk(&STARTUP_KEY);
		let vmk = vmk_datum(STARTUP_KEY_GUID, 0x0200, &[wrapped]);
		self.protectors.push(vmk);
		self
	}

	/// Lay the volume out the way Vista does: no GUID nor block offsets in the
	/// header, the first block found through `metadata_lcn`, sizes in bytes.
	pub fn vista(mut self) -> Self {
		self.vista = true;
		self
	}

	pub fn user_password(mut self, password: &str) -> Self {
		let salt = [0x5b; 16];
		let key = crypto::user_password_key(password, &salt);
		let wrapped = self.wrapped_vmk(&key);
		let vmk = vmk_datum(0xa2, 0x2000, &[stretch_key_datum(&salt), wrapped]);
		self.protectors.push(vmk);
		self
	}

	pub fn recovery_password(mut self, recovery_password: &str) -> Self {
		let salt = [0x5c; 16];
		let rk = crypto::recovery_password_key(recovery_password).unwrap();
		let key = crypto::recovery_password_stretch(&rk, &salt);
		let wrapped = self.wrapped_vmk(&key);
		let vmk = vmk_datum(0xa3, 0x0800, &[stretch_key_datum(&salt), wrapped]);
		self.protectors.push(vmk);
		self
	}

	/// Store a wrong CRC32 for block `n` (1-based).
	pub fn corrupt_block(mut self, n: usize) -> Self {
		self.corrupt.push(n);
		self
	}

	fn datums(&self) -> Vec<u8> {
		let mut datums = Vec::new();
		// volume description
		datums.extend(datum(7, 2, &"TEST\0".encode_utf16().flat_map(u16::to_le_bytes).collect::<Vec<_>>()));
		for p in &self.protectors {
			datums.extend_from_slice(p);
		}
		let plain = key_datum(0, self.method, &self.fvek);
		datums.extend(aes_ccm_datum(3, &self.vmk, &[0xfe; 12], &plain));
		datums
	}

	fn block(&self) -> Vec<u8> {
		let datums = self.datums();
		let dataset_size = (0x30 + datums.len()) as u32;
		let block_size = (0x40 + dataset_size as usize + 15) & !15;

		let (size, version) = if self.vista { (block_size, 1u16) } else { (block_size >> 4, 2) };

		let mut block = vec![0u8; block_size];
		block[..8].copy_from_slice(&BITLOCKER_SIGNATURE);
		block[8..10].copy_from_slice(&(size as u16).to_le_bytes());
		block[10..12].copy_from_slice(&version.to_le_bytes());
		block[12..14].copy_from_slice(&4u16.to_le_bytes());
		block[14..16].copy_from_slice(&4u16.to_le_bytes());
		for (i, o) in BLOCK_OFFSETS.iter().enumerate() {
			block[0x20 + 8 * i..0x28 + 8 * i].copy_from_slice(&o.to_le_bytes());
		}

		block[0x40..0x70].copy_from_slice(&dataset_header(dataset_size, self.method));
		block[0x70..0x70 + datums.len()].copy_from_slice(&datums);
		block
	}

	pub fn build(&self) -> Vec<u8> {
		let mut image = vec![0u8; IMAGE_SIZE];

		let h = &mut image[..VOLUME_HEADER_SIZE];
		h[..3].copy_from_slice(&[0xeb, 0x58, 0x90]);
		h[3..11].copy_from_slice(&BITLOCKER_SIGNATURE);
		h[0x0b..0x0d].copy_from_slice(&512u16.to_le_bytes());
		h[0x0d] = 8;
		if self.vista {
			// cluster 1 of 8 sectors of 512 bytes
			h[0x38..0x40].copy_from_slice(&1u64.to_le_bytes());
		} else {
			h[0xa0..0xb0].copy_from_slice(&INFORMATION_OFFSET_GUID.0);
			for (i, o) in BLOCK_OFFSETS.iter().enumerate() {
				h[0xb0 + 8 * i..0xb8 + 8 * i].copy_from_slice(&o.to_le_bytes());
			}
		}
		h[0x1fe..].copy_from_slice(&0xaa55u16.to_le_bytes());

		let block = self.block();
		let crc32 = crc32fast::hash(&block);
		for (i, &o) in BLOCK_OFFSETS.iter().enumerate() {
			let start = o as usize;
			image[start..start + block.len()].copy_from_slice(&block);

			let crc32 = if self.corrupt.contains(&(i + 1)) { !crc32 } else { crc32 };
			let v = &mut image[start + block.len()..start + block.len() + 8];
			v[0..2].copy_from_slice(&8u16.to_le_bytes());
			v[2..4].copy_from_slice(&2u16.to_le_bytes());
			v[4..8].copy_from_slice(&crc32.to_le_bytes());
		}
		image
	}
}
