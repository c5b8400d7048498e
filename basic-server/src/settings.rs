//! Settings known to the basic server

use strata::prelude::*;
use strata::settings::{SettingDefinition, SettingsRegistry};
use strata::tier::TierRank;
use strata::value::SettingValue;

pub fn register_settings(registry: &mut SettingsRegistry) -> StResult<()> {
	registry.register(
		SettingDefinition::builder("ui/theme")
			.description("Colour theme of the user interface")
			.default("light")
			.build()?,
	)?;

	registry.register(
		SettingDefinition::builder("ui/font-size")
			.description("Base font size in points")
			.default(12_i64)
			.validator(|v| match v {
				SettingValue::Int(size) if (6..=72).contains(size) => Ok(()),
				_ => Err(Error::ValidationError("Font size must be between 6 and 72".into())),
			})
			.build()?,
	)?;

	// Feature flags below the Distributor tier are not allowed
	registry.register(
		SettingDefinition::builder("features/*")
			.description("Feature flags")
			.optional(true)
			.max_tier(TierRank(2))
			.validator(|v| match v {
				SettingValue::Bool(_) => Ok(()),
				_ => Err(Error::ValidationError("Feature flags are booleans".into())),
			})
			.build()?,
	)?;

	Ok(())
}

// vim: ts=4
