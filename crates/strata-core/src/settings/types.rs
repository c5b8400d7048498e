//! Setting definitions and their registry
//!
//! Definitions describe the settings a module knows about: default value,
//! how specific a tier may override it and an optional validator.

use std::collections::HashMap;
use std::fmt::Debug;

use crate::prelude::*;
use strata_types::{SettingKey, SettingValue, TierRank};

/// Type alias for setting validator function
pub type SettingValidator = Box<dyn Fn(&SettingValue) -> StResult<()> + Send + Sync>;

const WILDCARD_SUFFIX: &str = "/*";

/// Setting definition - defines metadata for each setting
pub struct SettingDefinition {
	/// Key, or key prefix for wildcard definitions
	pub key: SettingKey,

	/// Registered as `prefix/*`, covering every key below `key`
	pub wildcard: bool,

	/// Human-readable description
	pub description: String,

	/// Optional default value
	/// If None and optional=false, the setting MUST be configured at the most general tier
	pub default: Option<SettingValue>,

	/// Most specific tier allowed to hold an override (None = any tier)
	pub max_tier: Option<TierRank>,

	/// Whether this setting can stay unconfigured even without a default
	pub optional: bool,

	/// Optional validation function
	pub validator: Option<SettingValidator>,
}

impl Debug for SettingDefinition {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SettingDefinition")
			.field("key", &self.key)
			.field("wildcard", &self.wildcard)
			.field("description", &self.description)
			.field("default", &self.default)
			.field("max_tier", &self.max_tier)
			.field("optional", &self.optional)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl SettingDefinition {
	/// Create a builder for constructing a SettingDefinition
	pub fn builder(key: impl Into<String>) -> SettingDefinitionBuilder {
		SettingDefinitionBuilder::new(key)
	}

	/// Check a value about to be written at `tier`
	pub fn check(&self, value: &SettingValue, tier: TierRank) -> StResult<()> {
		if let Some(max_tier) = self.max_tier {
			if tier > max_tier {
				return Err(Error::Forbidden(format!(
					"setting '{}' cannot be overridden below tier {}",
					self.key, max_tier
				)));
			}
		}

		if let Some(default) = &self.default {
			if !value.matches_type(default) {
				return Err(Error::ValidationError(format!(
					"Type mismatch for setting '{}': expected {}, got {}",
					self.key,
					default.type_name(),
					value.type_name()
				)));
			}
		}

		if let Some(validator) = &self.validator {
			validator(value)?;
		}
		Ok(())
	}
}

/// Builder for SettingDefinition with fluent API
pub struct SettingDefinitionBuilder {
	key: String,
	description: Option<String>,
	default: Option<SettingValue>,
	max_tier: Option<TierRank>,
	optional: bool,
	validator: Option<SettingValidator>,
}

impl SettingDefinitionBuilder {
	pub fn new(key: impl Into<String>) -> Self {
		Self {
			key: key.into(),
			description: None,
			default: None,
			max_tier: None,
			optional: false, // Default to required for safety
			validator: None,
		}
	}

	/// Set the description (required)
	pub fn description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());
		self
	}

	/// Set the default value (optional - if not set, setting is required)
	pub fn default(mut self, value: impl Into<SettingValue>) -> Self {
		self.default = Some(value.into());
		self
	}

	/// Restrict overrides to `tier` and more general tiers
	pub fn max_tier(mut self, tier: TierRank) -> Self {
		self.max_tier = Some(tier);
		self
	}

	/// Mark this setting as optional (can be unconfigured)
	pub fn optional(mut self, optional: bool) -> Self {
		self.optional = optional;
		self
	}

	/// Set a validation function
	pub fn validator<F>(mut self, f: F) -> Self
	where
		F: Fn(&SettingValue) -> StResult<()> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(f));
		self
	}

	/// Build the SettingDefinition
	pub fn build(self) -> StResult<SettingDefinition> {
		let description = self
			.description
			.ok_or_else(|| Error::ConfigError("Setting description is required".into()))?;

		let (raw_key, wildcard) = match self.key.strip_suffix(WILDCARD_SUFFIX) {
			Some(prefix) => (prefix, true),
			None => (self.key.as_str(), false),
		};
		let key = SettingKey::new(raw_key)
			.map_err(|e| Error::ConfigError(format!("Invalid setting key '{}': {}", self.key, e)))?;

		if wildcard && self.default.is_some() {
			tracing::warn!(
				"Wildcard setting '{}' has a default - it applies to every key below it",
				self.key
			);
		}

		if let Some(default) = &self.default {
			if let Some(validator) = &self.validator {
				validator(default).map_err(|e| {
					Error::ConfigError(format!("Default of '{}' fails validation: {}", self.key, e))
				})?;
			}
		}

		Ok(SettingDefinition {
			key,
			wildcard,
			description,
			default: self.default,
			max_tier: self.max_tier,
			optional: self.optional,
			validator: self.validator,
		})
	}
}

/// Mutable registry used during app initialization
pub struct SettingsRegistry {
	exact: HashMap<SettingKey, SettingDefinition>,
	wildcard: HashMap<SettingKey, SettingDefinition>,
}

impl SettingsRegistry {
	pub fn new() -> Self {
		Self { exact: HashMap::new(), wildcard: HashMap::new() }
	}

	/// Register a new setting definition
	pub fn register(&mut self, def: SettingDefinition) -> StResult<()> {
		let map = if def.wildcard { &mut self.wildcard } else { &mut self.exact };
		if map.contains_key(&def.key) {
			return Err(Error::ConfigError(format!("Setting '{}' is already registered", def.key)));
		}

		tracing::debug!("Registering setting: {}{}", def.key, if def.wildcard { "/*" } else { "" });
		map.insert(def.key.clone(), def);
		Ok(())
	}

	/// Freeze the registry (make it immutable)
	pub fn freeze(self) -> FrozenSettingsRegistry {
		tracing::info!("Freezing settings registry with {} definitions", self.len());
		FrozenSettingsRegistry { exact: self.exact, wildcard: self.wildcard }
	}

	/// Get number of registered settings
	pub fn len(&self) -> usize {
		self.exact.len() + self.wildcard.len()
	}

	/// Check if registry is empty
	pub fn is_empty(&self) -> bool {
		self.exact.is_empty() && self.wildcard.is_empty()
	}
}

impl Default for SettingsRegistry {
	fn default() -> Self {
		Self::new()
	}
}

/// Immutable registry stored in AppState
pub struct FrozenSettingsRegistry {
	exact: HashMap<SettingKey, SettingDefinition>,
	wildcard: HashMap<SettingKey, SettingDefinition>,
}

impl FrozenSettingsRegistry {
	pub fn empty() -> Self {
		SettingsRegistry::new().freeze()
	}

	/// Get the definition covering a key
	/// First tries exact match, then the nearest wildcard ancestor
	pub fn get(&self, key: &SettingKey) -> Option<&SettingDefinition> {
		if let Some(def) = self.exact.get(key) {
			return Some(def);
		}

		key.ancestors().iter().rev().find_map(|prefix| self.wildcard.get(prefix))
	}

	/// List all registered settings
	pub fn list(&self) -> impl Iterator<Item = &SettingDefinition> {
		self.exact.values().chain(self.wildcard.values())
	}

	/// List exact (non-wildcard) settings strictly below a prefix
	pub fn list_by_prefix<'a>(
		&'a self,
		prefix: &'a SettingKey,
	) -> impl Iterator<Item = &'a SettingDefinition> + 'a {
		self.exact.values().filter(move |def| def.key.is_descendant_of(prefix))
	}

	/// Get number of registered settings
	pub fn len(&self) -> usize {
		self.exact.len() + self.wildcard.len()
	}

	/// Check if registry is empty
	pub fn is_empty(&self) -> bool {
		self.exact.is_empty() && self.wildcard.is_empty()
	}
}


// vim: ts=4
