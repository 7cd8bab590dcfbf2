use crate::keys::ProtectorKind;
use std::fmt;
use thiserror::Error;

/// Enum for errors arising during parsing of on-disk structures.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Deserialization error: {0}")]
    BincodeError(#[from] Box<bincode::ErrorKind>),

    #[error("Invalid volume signature {0:?}: must be \"-FVE-FS-\" or \"MSWIN4.1\"")]
    InvalidSignature([u8; 8]),

    #[error("Invalid sector size in volume header: must not be zero")]
    NullSectorSize,

    #[error("Unknown volume GUID {0}, not supported")]
    UnknownVolumeGuid(String),

    #[error("Invalid metadata offset {0:#x}")]
    InvalidMetadataOffset(u64),

    #[error("Invalid information signature at offset {0:#x}: must be \"-FVE-FS-\"")]
    InvalidInformationSignature(u64),

    #[error("Metadata block at offset {offset:#x} is too small: {size} bytes")]
    MetadataTooSmall { offset: u64, size: usize },

    #[error(
        "Invalid dataset: size={size:#x}, copy_size={copy_size:#x}, header_size={header_size:#x}"
    )]
    InvalidDataset {
        size: u32,
        copy_size: u32,
        header_size: u32,
    },

    #[error("Invalid datum at offset {0:#x}: size does not fit the enclosing buffer")]
    InvalidDatum(usize),

    #[error("Unexpected datum type: expected {expected}, found {found:#06x}")]
    UnexpectedDatumType { expected: &'static str, found: u16 },

    #[error("Invalid metadata block selector {0}: must be between 1 and 3")]
    InvalidBlock(u8),

    #[error("None of the metadata blocks passed the CRC32 validation")]
    NoValidMetadata,
}

/// Enum for errors arising during interaction with a BitLocker volume and its
/// key protectors.
#[derive(Debug, Error)]
pub enum FveError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parsing error: {0}")]
    ParseError(#[from] ParseError),

    #[error("No {0} key protector found on the volume")]
    NoProtector(ProtectorKind),

    #[error("Missing {0} datum")]
    MissingDatum(&'static str),

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Malformed recovery password: {0}")]
    MalformedRecoveryPassword(String),

    #[error("Authentication of the decrypted {0} failed")]
    AuthenticationFailed(&'static str),

    #[error("Unsupported key size: {0}. Valid sizes are 16 for AES-128 or 32 for AES-256")]
    UnsupportedKeySize(usize),

    #[error("Unsupported encryption method: {0:#06x}")]
    UnsupportedCipher(u16),

    #[error("Invalid key length: {found}, the encryption method needs {expected} bytes")]
    InvalidKeyLength { expected: usize, found: usize },
}

/// Enum for errors arising while listing candidate devices.
#[derive(Debug, Error)]
pub enum EnumerateError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Wrong partitions file format: expected more than 2 lines, found {0}")]
    MalformedPartitions(usize),
}

/// The credential kinds a caller can supply explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    UserPassword,
    RecoveryPassword,
    StartupKey,
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialKind::UserPassword => write!(f, "user password"),
            CredentialKind::RecoveryPassword => write!(f, "recovery password"),
            CredentialKind::StartupKey => write!(f, "startup key"),
        }
    }
}

/// Terminal failure of a single key recovery attempt.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("No usable credential: the volume has no clear key and no credential was supplied")]
    NoUsableCredential,

    #[error("Clear key unwrap failed: {0}")]
    ClearKeyRejected(#[source] FveError),

    #[error("The supplied {kind} was rejected: {source}")]
    CredentialRejected {
        kind: CredentialKind,
        #[source]
        source: FveError,
    },

    #[error("Could not derive the content encryption key: {0}")]
    DerivationFailed(#[source] FveError),
}

impl RecoveryError {
    /// No key material was available to even attempt an unwrap.
    pub fn is_no_credential(&self) -> bool {
        matches!(self, RecoveryError::NoUsableCredential)
    }

    /// A caller-supplied credential was tried and did not unlock the volume.
    pub fn is_credential_rejected(&self) -> bool {
        matches!(self, RecoveryError::CredentialRejected { .. })
    }
}
