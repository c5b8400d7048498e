//! Settings definitions registry
//!
//! Modules register the settings they know about through a
//! `register_settings(&mut SettingsRegistry)` function at start-up; the
//! registry is then frozen and shared with the resolver.

pub mod types;

pub use types::{
	FrozenSettingsRegistry, SettingDefinition, SettingDefinitionBuilder, SettingValidator,
	SettingsRegistry,
};

// vim: ts=4
