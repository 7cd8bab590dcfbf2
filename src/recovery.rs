//! Recovering the full volume encryption key from whatever credential the
//! caller has.
//!
//! Without a credential only a clear key (suspended protection) can open the
//! volume. A supplied password or startup key is tried directly. Either way the unwrapped
//! volume master key then decrypts the FVEK. Nothing is retried and no other
//! credential kind is tried after a failure.

use crate::{
	error::{CredentialKind, FveError, RecoveryError},
	keys::{MasterKey, RecoveredKey},
	startup_key::StartupKey,
};
use secrecy::SecretString;
use std::fmt;
use tracing::debug;

/// What the caller offers to open the volume with.
pub enum Credential {
	/// Rely on the clear key stored on the volume. Same as passing no credential.
	ClearKey,
	UserPassword(SecretString),
	/// A 48-digit recovery password.
	RecoveryPassword(SecretString),
	/// The external key of a `.BEK` file.
	StartupKey(StartupKey),
}

impl fmt::Debug for Credential {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Credential::ClearKey => write!(f, "ClearKey"),
			Credential::UserPassword(_) => write!(f, "UserPassword(..)"),
			Credential::RecoveryPassword(_) => write!(f, "RecoveryPassword(..)"),
			Credential::StartupKey(key) => write!(f, "StartupKey({})", key.guid()),
		}
	}
}

/// The operations key recovery needs from a parsed volume.
pub trait KeyProtectors {
	/// The volume stores its VMK next to a clear key.
	fn has_clear_key(&self) -> bool;

	fn unwrap_with_clear_key(&self) -> Result<MasterKey, FveError>;

	fn unwrap_with_password(&self, password: &SecretString) -> Result<MasterKey, FveError>;

	fn unwrap_with_recovery_password(&self, recovery_password: &SecretString) -> Result<MasterKey, FveError>;

	/// Unwrap the VMK named by the startup key.
	fn unwrap_with_startup_key(&self, startup_key: &StartupKey) -> Result<MasterKey, FveError>;

	/// Decrypt the FVEK with an unwrapped VMK.
	fn derive_content_key(&self, vmk: &MasterKey) -> Result<RecoveredKey, FveError>;
}

enum Step<'c> {
	Start(Option<&'c Credential>),
	ClearKeyUnlock,
	PasswordUnlock(&'c SecretString),
	RecoveryPasswordUnlock(&'c SecretString),
	StartupKeyUnlock(&'c StartupKey),
	KeyDerived(MasterKey),
}

impl fmt::Debug for Step<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Step::Start(credential) => write!(f, "Start({:?})", credential),
			Step::ClearKeyUnlock => write!(f, "ClearKeyUnlock"),
			Step::PasswordUnlock(_) => write!(f, "PasswordUnlock"),
			Step::RecoveryPasswordUnlock(_) => write!(f, "RecoveryPasswordUnlock"),
			Step::StartupKeyUnlock(key) => write!(f, "StartupKeyUnlock({})", key.guid()),
			Step::KeyDerived(_) => write!(f, "KeyDerived"),
		}
	}
}

/// Run one recovery attempt against `volume`.
///
/// A password or startup key is used as is: `has_clear_key` is only
/// consulted when no credential is given.
pub fn recover_key<V: KeyProtectors + ?Sized>(
	volume: &V,
	credential: Option<Credential>,
) -> Result<RecoveredKey, RecoveryError> {
	let mut step = Step::Start(credential.as_ref());
	loop {
		debug!("key recovery: {:?}", step);
		step = match step {
			Step::Start(None) | Step::Start(Some(Credential::ClearKey)) => {
				if volume.has_clear_key() {
					Step::ClearKeyUnlock
				} else {
					return Err(RecoveryError::NoUsableCredential);
				}
			}
			Step::Start(Some(Credential::UserPassword(p))) => Step::PasswordUnlock(p),
			Step::Start(Some(Credential::RecoveryPassword(p))) => Step::RecoveryPasswordUnlock(p),
			Step::Start(Some(Credential::StartupKey(k))) => Step::StartupKeyUnlock(k),
			Step::ClearKeyUnlock => volume
				.unwrap_with_clear_key()
				.map(Step::KeyDerived)
				.map_err(RecoveryError::ClearKeyRejected)?,
			Step::PasswordUnlock(p) => volume
				.unwrap_with_password(p)
				.map(Step::KeyDerived)
				.map_err(|source| RecoveryError::CredentialRejected {
					kind: CredentialKind::UserPassword,
					source,
				})?,
			Step::RecoveryPasswordUnlock(p) => volume
				.unwrap_with_recovery_password(p)
				.map(Step::KeyDerived)
				.map_err(|source| RecoveryError::CredentialRejected {
					kind: CredentialKind::RecoveryPassword,
					source,
				})?,
			Step::StartupKeyUnlock(k) => volume
				.unwrap_with_startup_key(k)
				.map(Step::KeyDerived)
				.map_err(|source| RecoveryError::CredentialRejected {
					kind: CredentialKind::StartupKey,
					source,
				})?,
			Step::KeyDerived(vmk) => {
				return volume
					.derive_content_key(&vmk)
					.map_err(RecoveryError::DerivationFailed);
			}
		};
	}
}
