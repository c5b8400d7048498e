//! Error handling subsystem. Implements a custom Error type.

use std::fmt;

pub type StResult<T> = std::result::Result<T, Error>;

/// Errors surfaced by the configuration engine.
///
/// The type is `Clone` so a single refresh outcome can be handed to every
/// caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
	/// No override and no default exists for the key
	KeyNotFound(Box<str>),
	/// Write rejected because a tier at or above the caller holds a lock
	Locked { key: Box<str>, tier: Box<str> },
	/// Operation not permitted at the requested tier
	Forbidden(String),
	/// Transient persistence failure (connection lost, pool exhausted, ...)
	BackendUnavailable(String),
	/// Permanent persistence failure (corrupt row, constraint violation, ...)
	DbError(String),
	/// A cache object with the same key is already registered
	DuplicateKey(Box<str>),
	/// A value was requested as a type it does not hold
	TypeMismatch { key: Box<str>, expected: &'static str },
	ValidationError(String),
	ConfigError(String),
	/// The caller's cancellation token fired
	Cancelled,
	Internal(String),
}

impl Error {
	/// Whether retrying later may succeed
	pub fn is_transient(&self) -> bool {
		matches!(self, Error::BackendUnavailable(_))
	}

	/// Short machine-readable error code
	pub fn code(&self) -> &'static str {
		match self {
			Error::KeyNotFound(_) => "E-KEY-NOTFOUND",
			Error::Locked { .. } => "E-LOCKED",
			Error::Forbidden(_) => "E-FORBIDDEN",
			Error::BackendUnavailable(_) => "E-BACKEND-UNAVAILABLE",
			Error::DbError(_) => "E-DB",
			Error::DuplicateKey(_) => "E-DUPLICATE",
			Error::TypeMismatch { .. } => "E-TYPE-MISMATCH",
			Error::ValidationError(_) => "E-VALIDATION",
			Error::ConfigError(_) => "E-CONFIG",
			Error::Cancelled => "E-CANCELLED",
			Error::Internal(_) => "E-INTERNAL",
		}
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::KeyNotFound(key) => write!(f, "setting '{}' not found", key),
			Error::Locked { key, tier } => {
				write!(f, "setting '{}' is locked at tier '{}'", key, tier)
			}
			Error::Forbidden(msg) => write!(f, "forbidden: {}", msg),
			Error::BackendUnavailable(msg) => write!(f, "backend unavailable: {}", msg),
			Error::DbError(msg) => write!(f, "database error: {}", msg),
			Error::DuplicateKey(key) => write!(f, "key '{}' is already registered", key),
			Error::TypeMismatch { key, expected } => {
				write!(f, "'{}' is not of type {}", key, expected)
			}
			Error::ValidationError(msg) => write!(f, "validation error: {}", msg),
			Error::ConfigError(msg) => write!(f, "configuration error: {}", msg),
			Error::Cancelled => write!(f, "operation cancelled"),
			Error::Internal(msg) => write!(f, "internal error: {}", msg),
		}
	}
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		tracing::warn!("serde_json error: {}", err);
		Error::ValidationError(format!("invalid JSON: {}", err))
	}
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
	use super::*;

	#[test]
	fn test_transient_classification() {
		assert!(Error::BackendUnavailable("timeout".into()).is_transient());
		assert!(!Error::DbError("corrupt".into()).is_transient());
		assert!(!Error::Locked { key: "a".into(), tier: "system".into() }.is_transient());
	}

	#[test]
	fn test_locked_message_names_tier() {
		let err = Error::Locked { key: "theme".into(), tier: "System".into() };
		assert_eq!(err.to_string(), "setting 'theme' is locked at tier 'System'");
		assert_eq!(err.code(), "E-LOCKED");
	}
}

// vim: ts=4
