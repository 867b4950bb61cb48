//! Provider limits.
//!
//! Loaded from TOML; every field has a default so an empty document is a
//! valid configuration. Unknown keys are rejected.

use serde::Deserialize;
use thiserror::Error;
use xdsm_types::OBJECT_HANDLE_LEN;

/// Errors loading a [`ProviderConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Malformed TOML or an unknown key.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	/// A limit is outside its usable range.
	#[error("invalid value for '{key}': {reason}")]
	Invalid {
		/// Offending field.
		key: &'static str,
		/// Why the value was rejected.
		reason: &'static str,
	},
}

/// Limits applied by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
	/// Session info strings must be strictly shorter than this.
	#[serde(default = "default_max_session_info")]
	pub max_session_info: usize,
	/// Largest USER message payload in bytes.
	#[serde(default = "default_max_message_data")]
	pub max_message_data: usize,
	/// Largest region list accepted by `set_region`.
	#[serde(default = "default_max_managed_regions")]
	pub max_managed_regions: usize,
	/// Messages a consumer task retrieves per `get_events` call.
	#[serde(default = "default_get_events_batch")]
	pub get_events_batch: usize,
	/// Answered tokens each session remembers, so a repeated answer fails
	/// [`xdsm_types::Error::TokenRetired`] rather than `InvalidToken`.
	#[serde(default = "default_retired_tokens")]
	pub retired_tokens: usize,
}

fn default_max_session_info() -> usize {
	256
}

fn default_max_message_data() -> usize {
	4096
}

fn default_max_managed_regions() -> usize {
	64
}

fn default_get_events_batch() -> usize {
	32
}

fn default_retired_tokens() -> usize {
	1024
}

impl Default for ProviderConfig {
	fn default() -> Self {
		Self {
			max_session_info: default_max_session_info(),
			max_message_data: default_max_message_data(),
			max_managed_regions: default_max_managed_regions(),
			get_events_batch: default_get_events_batch(),
			retired_tokens: default_retired_tokens(),
		}
	}
}

impl ProviderConfig {
	/// Parses and validates a TOML document.
	pub fn from_toml(src: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(src)?;
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_session_info == 0 {
			return Err(ConfigError::Invalid { key: "max_session_info", reason: "must be at least 1" });
		}
		if self.max_managed_regions == 0 {
			return Err(ConfigError::Invalid { key: "max_managed_regions", reason: "must be at least 1" });
		}
		if self.get_events_batch == 0 {
			return Err(ConfigError::Invalid { key: "get_events_batch", reason: "must be at least 1" });
		}
		if self.retired_tokens == 0 {
			return Err(ConfigError::Invalid { key: "retired_tokens", reason: "must be at least 1" });
		}
		Ok(())
	}

	/// Value reported by `get_config` for `key`.
	pub fn value(&self, key: ConfigKey) -> u64 {
		match key {
			ConfigKey::LockUpgrade | ConfigKey::ObjRef | ConfigKey::Pending => 1,
			ConfigKey::Legacy => 0,
			ConfigKey::MaxHandleSize => OBJECT_HANDLE_LEN as u64,
			ConfigKey::MaxManagedRegions => self.max_managed_regions as u64,
			ConfigKey::MaxMessageData => self.max_message_data as u64,
		}
	}
}

/// Queryable provider capabilities (`dm_get_config`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
	LockUpgrade,
	ObjRef,
	Pending,
	Legacy,
	MaxHandleSize,
	MaxManagedRegions,
	MaxMessageData,
}
