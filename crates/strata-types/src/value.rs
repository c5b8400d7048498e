//! Setting values

use serde::{Deserialize, Serialize};

use crate::prelude::*;

/// Setting value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)] // No type tag - the type name is persisted next to the value
pub enum SettingValue {
	Bool(bool), // Must be before Int to avoid bool -> int coercion
	Int(i64),
	String(String),
	Json(serde_json::Value),
}

impl SettingValue {
	/// Check if this value matches the type of another value
	pub fn matches_type(&self, other: &SettingValue) -> bool {
		matches!(
			(self, other),
			(SettingValue::String(_), SettingValue::String(_))
				| (SettingValue::Int(_), SettingValue::Int(_))
				| (SettingValue::Bool(_), SettingValue::Bool(_))
				| (SettingValue::Json(_), SettingValue::Json(_))
		)
	}

	/// Get the type name used for persistence and error messages
	pub fn type_name(&self) -> &'static str {
		match self {
			SettingValue::String(_) => "string",
			SettingValue::Int(_) => "int",
			SettingValue::Bool(_) => "bool",
			SettingValue::Json(_) => "json",
		}
	}

	/// Serialized form stored by adapters
	pub fn to_json(&self) -> serde_json::Value {
		match self {
			SettingValue::String(s) => serde_json::Value::String(s.clone()),
			SettingValue::Int(i) => serde_json::Value::from(*i),
			SettingValue::Bool(b) => serde_json::Value::Bool(*b),
			SettingValue::Json(j) => j.clone(),
		}
	}

	/// Rebuild a value from its persisted type name and serialization.
	/// The type name wins over the shape of the JSON, so a `json` setting
	/// holding `true` stays `Json`.
	pub fn from_typed(type_name: &str, value: serde_json::Value) -> StResult<Self> {
		let mismatch = |v: &serde_json::Value| {
			Error::ValidationError(format!("stored value {} is not of type {}", v, type_name))
		};
		match type_name {
			"string" => match value {
				serde_json::Value::String(s) => Ok(SettingValue::String(s)),
				v => Err(mismatch(&v)),
			},
			"int" => value.as_i64().map(SettingValue::Int).ok_or_else(|| mismatch(&value)),
			"bool" => value.as_bool().map(SettingValue::Bool).ok_or_else(|| mismatch(&value)),
			"json" => Ok(SettingValue::Json(value)),
			other => Err(Error::ValidationError(format!("unknown setting type '{}'", other))),
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			SettingValue::String(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_int(&self) -> Option<i64> {
		match self {
			SettingValue::Int(i) => Some(*i),
			_ => None,
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			SettingValue::Bool(b) => Some(*b),
			_ => None,
		}
	}
}

impl From<&str> for SettingValue {
	fn from(s: &str) -> Self {
		SettingValue::String(s.to_string())
	}
}

impl From<String> for SettingValue {
	fn from(s: String) -> Self {
		SettingValue::String(s)
	}
}

impl From<i64> for SettingValue {
	fn from(i: i64) -> Self {
		SettingValue::Int(i)
	}
}

impl From<bool> for SettingValue {
	fn from(b: bool) -> Self {
		SettingValue::Bool(b)
	}
}

impl std::fmt::Display for SettingValue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			SettingValue::String(s) => write!(f, "{}", s),
			SettingValue::Int(i) => write!(f, "{}", i),
			SettingValue::Bool(b) => write!(f, "{}", b),
			SettingValue::Json(j) => write!(f, "{}", j),
		}
	}
}


// vim: ts=4
