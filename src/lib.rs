//! This crate finds BitLocker encrypted volumes and recovers their full volume
//! encryption key (FVEK).
//!
//! [`detect`] classifies devices by their first sector, [`enumerate`] lists the
//! devices of the host. [`FveMetadata`] parses the FVE metadata of a volume and
//! implements [`KeyProtectors`], on top of which [`recover_key`] unwraps the
//! volume master key with a clear key, a user password, a recovery password
//! or a [`StartupKey`] and decrypts the FVEK.
//!
//! See `demos/dump_metadata.rs` for how to print the metadata of a volume image.

pub mod config;
pub mod crypto;
pub mod datum;
pub mod detect;
pub mod enumerate;
/// Error types.
pub mod error;
pub mod header;
pub mod keys;
pub mod metadata;
/// Reading passwords from the terminal.
#[cfg(feature = "prompt")]
pub mod password;
pub mod recovery;
pub mod startup_key;

pub use config::{ScanConfig, VolumeConfig};
pub use detect::{classify_header, is_target_format, scan};
pub use enumerate::{candidate_devices, DeviceSource, Platform};
pub use header::{Guid, VolumeHeader, VolumeVersion};
pub use keys::{EncryptionMethod, MasterKey, ProtectorKind, RecoveredKey};
pub use metadata::FveMetadata;
pub use recovery::{recover_key, Credential, KeyProtectors};
pub use startup_key::StartupKey;
