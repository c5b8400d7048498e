//! Hierarchical setting keys
//!
//! Keys are `/`-delimited paths such as `appearance/background/color`.
//! Comparison is case-insensitive, so keys are lower-cased on construction.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::prelude::*;

pub const KEY_SEPARATOR: char = '/';

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SettingKey(Box<str>);

impl SettingKey {
	/// Parse and normalize a key
	pub fn new(key: &str) -> StResult<Self> {
		let trimmed = key.trim().trim_matches(KEY_SEPARATOR);
		if trimmed.is_empty() {
			return Err(Error::ValidationError("setting key cannot be empty".into()));
		}
		if trimmed.split(KEY_SEPARATOR).any(|seg| seg.trim().is_empty()) {
			return Err(Error::ValidationError(format!("setting key '{}' has an empty segment", key)));
		}
		Ok(Self(trimmed.to_lowercase().into()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn segments(&self) -> impl Iterator<Item = &str> {
		self.0.split(KEY_SEPARATOR)
	}

	pub fn depth(&self) -> usize {
		self.segments().count()
	}

	pub fn parent(&self) -> Option<SettingKey> {
		self.0.rfind(KEY_SEPARATOR).map(|pos| SettingKey(self.0[..pos].into()))
	}

	/// Proper prefixes, shortest first
	pub fn ancestors(&self) -> Vec<SettingKey> {
		self.0
			.match_indices(KEY_SEPARATOR)
			.map(|(pos, _)| SettingKey(self.0[..pos].into()))
			.collect()
	}

	/// Ancestors followed by the key itself
	pub fn lineage(&self) -> Vec<SettingKey> {
		let mut keys = self.ancestors();
		keys.push(self.clone());
		keys
	}

	/// True if `self` equals `prefix` or lies below it
	pub fn starts_with(&self, prefix: &SettingKey) -> bool {
		self == prefix || self.is_descendant_of(prefix)
	}

	/// True if `self` lies strictly below `prefix`
	pub fn is_descendant_of(&self, prefix: &SettingKey) -> bool {
		self.0.len() > prefix.0.len()
			&& self.0.starts_with(&*prefix.0)
			&& self.0[prefix.0.len()..].starts_with(KEY_SEPARATOR)
	}

	/// Append a child segment
	pub fn join(&self, child: &str) -> StResult<SettingKey> {
		SettingKey::new(&format!("{}{}{}", self.0, KEY_SEPARATOR, child))
	}
}

impl fmt::Display for SettingKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl AsRef<str> for SettingKey {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

impl std::str::FromStr for SettingKey {
	type Err = Error;

	fn from_str(s: &str) -> StResult<Self> {
		SettingKey::new(s)
	}
}

impl Serialize for SettingKey {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_str(&self.0)
	}
}

impl<'de> Deserialize<'de> for SettingKey {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		SettingKey::new(&s).map_err(serde::de::Error::custom)
	}
}


// vim: ts=4
