use bitlocker::{FveMetadata, KeyProtectors, VolumeConfig};
use std::env;

fn main() {
	// any image of a BitLocker volume works, e.g. one made with `dd if=/dev/sdb1 of=volume.img`
	let path = env::args()
		.nth(1)
		.unwrap_or_else(|| format!("{}/demos/volume.img", env!("CARGO_MANIFEST_DIR")));

	let metadata = FveMetadata::open(&path, &VolumeConfig::new())
		.expect("could not read the BitLocker metadata; is this a BitLocker volume?");

	println!("{}", metadata.header());
	println!("{:#?}", metadata.information());
	println!("{:#?}", metadata.dataset());
	println!("metadata block in use: {}", metadata.selected_block());

	for datum in metadata.datums().flatten() {
		let value_type = datum.value_type().map_or("UNKNOWN", |v| v.name());
		println!(
			"datum: entry type {:#06x}, value type {} ({} bytes)",
			datum.entry_type(), value_type, datum.size()
		);
	}
	for (guid, kind) in metadata.protectors() {
		println!("protector {}: {}", guid, kind);
	}
	println!("clear key available: {}", metadata.has_clear_key());
}
