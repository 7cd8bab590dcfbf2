use bitlocker::{
	classify_header,
	detect::{IDENTIFIER_WINDOWS, SIGNATURES},
	header::{EOW_INFORMATION_OFFSET_GUID, INFORMATION_OFFSET_GUID},
	is_target_format, scan, ScanConfig,
};
use proptest::prelude::*;
use std::{
	fs,
	path::{Path, PathBuf},
};
use tempfile::TempDir;

const HEADER: usize = 512;

fn bitlocker_header() -> Vec<u8> {
	let mut h = vec![0u8; HEADER];
	h[3..11].copy_from_slice(b"-FVE-FS-");
	h[0xa0..0xb0].copy_from_slice(&INFORMATION_OFFSET_GUID.0);
	h
}

fn ntfs_header() -> Vec<u8> {
	let mut h = vec![0u8; HEADER];
	h[3..11].copy_from_slice(b"NTFS    ");
	h
}

fn write(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
	let path = dir.path().join(name);
	fs::write(&path, content).unwrap();
	path
}

fn known_guid(window: &[u8]) -> bool {
	window == INFORMATION_OFFSET_GUID.0 || window == EOW_INFORMATION_OFFSET_GUID.0
}

proptest! {
	#[test]
	fn foreign_signatures_never_match(
		mut bytes in proptest::collection::vec(any::<u8>(), HEADER),
		guid_window in 0..2usize,
	) {
		prop_assume!(!SIGNATURES.iter().any(|s| &bytes[3..11] == s));
		let w = IDENTIFIER_WINDOWS[guid_window];
		bytes[w.offset..w.offset + w.len].copy_from_slice(&INFORMATION_OFFSET_GUID.0);
		prop_assert!(!classify_header(&bytes));
	}

	#[test]
	fn signature_without_identifier_never_matches(
		mut bytes in proptest::collection::vec(any::<u8>(), HEADER),
		signature in 0..2usize,
	) {
		bytes[3..11].copy_from_slice(&SIGNATURES[signature]);
		prop_assume!(IDENTIFIER_WINDOWS
			.iter()
			.all(|w| !known_guid(&bytes[w.offset..w.offset + w.len])));
		prop_assert!(!classify_header(&bytes));
	}

	#[test]
	fn signature_and_identifier_always_match(
		mut bytes in proptest::collection::vec(any::<u8>(), HEADER..2 * HEADER),
		signature in 0..2usize,
		window in 0..2usize,
		eow in any::<bool>(),
	) {
		bytes[3..11].copy_from_slice(&SIGNATURES[signature]);
		let guid = if eow { EOW_INFORMATION_OFFSET_GUID } else { INFORMATION_OFFSET_GUID };
		let w = IDENTIFIER_WINDOWS[window];
		bytes[w.offset..w.offset + w.len].copy_from_slice(&guid.0);
		prop_assert!(classify_header(&bytes));
	}

	#[test]
	fn short_buffers_never_match(len in 0..HEADER) {
		let header = bitlocker_header();
		prop_assert!(!classify_header(&header[..len]));
	}
}

#[test]
fn bitlocker_header_on_disk() {
	let dir = TempDir::new().unwrap();
	let path = write(&dir, "bitlocker.img", &bitlocker_header());
	assert!(is_target_format(&path));
}

#[test]
fn truncated_device() {
	let dir = TempDir::new().unwrap();
	let path = write(&dir, "short.img", &bitlocker_header()[..HEADER - 1]);
	assert!(!is_target_format(&path));
}

#[test]
fn missing_and_unreadable_paths() {
	let dir = TempDir::new().unwrap();
	assert!(!is_target_format(dir.path().join("missing")));
	// a directory cannot be read as a device
	assert!(!is_target_format(dir.path()));
}

#[test]
fn scan_keeps_input_order() {
	let dir = TempDir::new().unwrap();
	let a = write(&dir, "a.img", &bitlocker_header());
	let b = write(&dir, "b.img", &ntfs_header());
	let c = write(&dir, "c.img", &bitlocker_header());
	let missing = dir.path().join("missing.img");
	let d = write(&dir, "d.img", &bitlocker_header()[..100]);

	let paths = vec![c.clone(), missing, b, a.clone(), d];
	let found = scan(&paths, &ScanConfig::sequential());
	assert_eq!(found, vec![c, a]);

	// idempotent
	assert_eq!(scan(&paths, &ScanConfig::sequential()), found);
}

#[test]
fn parallel_scan_matches_sequential() {
	let dir = TempDir::new().unwrap();
	let paths: Vec<PathBuf> = (0..32)
		.map(|i| {
			let content = if i % 3 == 0 { bitlocker_header() } else { ntfs_header() };
			write(&dir, &format!("{:02}.img", i), &content)
		})
		.collect();

	let sequential = scan(&paths, &ScanConfig::sequential());
	let parallel = scan(&paths, &ScanConfig::with_workers(4));
	assert_eq!(sequential.len(), 11);
	assert_eq!(parallel, sequential);
}

#[test]
fn scan_accepts_borrowed_paths() {
	let dir = TempDir::new().unwrap();
	let a = write(&dir, "a.img", &bitlocker_header());
	let paths: Vec<&Path> = vec![a.as_path(), Path::new("/nonexistent/device")];
	assert_eq!(scan(&paths, &ScanConfig::default()), vec![a.clone()]);
	assert!(scan::<&Path>(&[], &ScanConfig::default()).is_empty());
}
