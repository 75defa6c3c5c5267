//! Gate configuration values and the per-consumer sources that resolve them.
//!
//! The gate itself only ever sees a [`GateConfig`] passed by value. How that value is found for
//! a given caller is the job of a [`ConfigSource`]; [`StaticConfigSource`] applies one
//! configuration to everybody, while [`ConsumerConfigs`] maps consumer identifiers to
//! serde-loadable [`BufferSettings`].

// self
use crate::{_prelude::*, consumer::ConsumerId, error::ConfigError};

/// Immutable parameters for a single gate evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GateConfig {
	/// Time suspended between polls of an in-flight entry.
	pub wait_unit: Duration,
	/// Polls attempted before giving up with a timeout.
	pub max_retries: u32,
	/// Lifetime of the in-flight marker, bounding how long a crashed caller can block others.
	pub in_flight_ttl: Duration,
	/// Lifetime of a completed result available for replay.
	pub result_ttl: Duration,
}
impl GateConfig {
	const DEFAULT_IN_FLIGHT_TTL: Duration = Duration::seconds(30);
	const DEFAULT_MAX_RETRIES: u32 = 10;
	const DEFAULT_RESULT_TTL: Duration = Duration::minutes(5);
	const DEFAULT_WAIT_UNIT: Duration = Duration::milliseconds(100);

	/// Overrides the poll interval.
	pub fn with_wait_unit(mut self, wait_unit: Duration) -> Self {
		self.wait_unit = wait_unit;

		self
	}

	/// Overrides the retry budget.
	pub fn with_max_retries(mut self, max_retries: u32) -> Self {
		self.max_retries = max_retries;

		self
	}

	/// Overrides the in-flight marker lifetime.
	pub fn with_in_flight_ttl(mut self, ttl: Duration) -> Self {
		self.in_flight_ttl = ttl;

		self
	}

	/// Overrides the completed result lifetime.
	pub fn with_result_ttl(mut self, ttl: Duration) -> Self {
		self.result_ttl = ttl;

		self
	}

	/// Worst-case time a duplicate waits before timing out (`max_retries * wait_unit`).
	///
	/// Upstream transport timeouts should be sized above this bound.
	pub fn max_wait(&self) -> Duration {
		self.wait_unit.saturating_mul(i32::try_from(self.max_retries).unwrap_or(i32::MAX))
	}

	/// Rejects non-positive durations.
	pub fn validate(self) -> Result<Self, ConfigError> {
		if self.max_retries > 0 && !self.wait_unit.is_positive() {
			return Err(ConfigError::NonPositiveDuration { setting: "wait_unit" });
		}
		if !self.in_flight_ttl.is_positive() {
			return Err(ConfigError::NonPositiveDuration { setting: "in_flight_ttl" });
		}
		if !self.result_ttl.is_positive() {
			return Err(ConfigError::NonPositiveDuration { setting: "result_ttl" });
		}

		Ok(self)
	}
}
impl Default for GateConfig {
	fn default() -> Self {
		Self {
			wait_unit: Self::DEFAULT_WAIT_UNIT,
			max_retries: Self::DEFAULT_MAX_RETRIES,
			in_flight_ttl: Self::DEFAULT_IN_FLIGHT_TTL,
			result_ttl: Self::DEFAULT_RESULT_TTL,
		}
	}
}

/// Serde-facing buffer settings attached to a consumer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferSettings {
	/// Whether refresh requests from this consumer go through the gate.
	pub enabled: bool,
	/// Poll interval in milliseconds.
	pub wait_timeout_ms: u64,
	/// Number of polls before timing out.
	pub wait_retry_count: u32,
	/// In-flight marker lifetime in seconds.
	pub in_flight_ttl_secs: u64,
	/// Completed result lifetime in seconds.
	pub result_ttl_secs: u64,
}
impl BufferSettings {
	/// Converts the settings into a validated [`GateConfig`], or `None` when disabled.
	pub fn gate_config(&self) -> Result<Option<GateConfig>, ConfigError> {
		if !self.enabled {
			return Ok(None);
		}

		let config = GateConfig {
			wait_unit: duration_from(self.wait_timeout_ms, Duration::milliseconds)?,
			max_retries: self.wait_retry_count,
			in_flight_ttl: duration_from(self.in_flight_ttl_secs, Duration::seconds)?,
			result_ttl: duration_from(self.result_ttl_secs, Duration::seconds)?,
		};

		config.validate().map(Some)
	}
}
impl Default for BufferSettings {
	fn default() -> Self {
		let defaults = GateConfig::default();

		Self {
			enabled: false,
			wait_timeout_ms: defaults.wait_unit.whole_milliseconds() as u64,
			wait_retry_count: defaults.max_retries,
			in_flight_ttl_secs: defaults.in_flight_ttl.whole_seconds() as u64,
			result_ttl_secs: defaults.result_ttl.whole_seconds() as u64,
		}
	}
}

/// How the adapter reacts when the coordination store cannot be reached.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreFailurePolicy {
	/// Bypass the gate and run the protected action, logging a warning.
	#[default]
	FailOpen,
	/// Reject the request with a service-unavailable response.
	FailClosed,
}

/// Boxed future returned by [`ConfigSource::resolve`].
pub type ConfigFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Option<GateConfig>, ConfigError>> + 'a + Send>>;

/// Resolves the gate configuration for a caller; `None` disables gating for it.
pub trait ConfigSource
where
	Self: Send + Sync,
{
	/// Looks up the configuration for `consumer` (absent when the request names none).
	fn resolve<'a>(&'a self, consumer: Option<&'a ConsumerId>) -> ConfigFuture<'a>;
}

/// Applies the same configuration to every caller.
#[derive(Clone, Debug, Default)]
pub struct StaticConfigSource(Option<GateConfig>);
impl StaticConfigSource {
	/// Enables gating for everybody with `config`.
	pub fn enabled(config: GateConfig) -> Self {
		Self(Some(config))
	}

	/// Disables gating for everybody.
	pub fn disabled() -> Self {
		Self(None)
	}
}
impl ConfigSource for StaticConfigSource {
	fn resolve<'a>(&'a self, _consumer: Option<&'a ConsumerId>) -> ConfigFuture<'a> {
		let config = self.0;

		Box::pin(async move { Ok(config) })
	}
}

/// Per-consumer settings table, typically deserialized from the service configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerConfigs {
	/// Settings keyed by consumer identifier.
	#[serde(default)]
	pub consumers: HashMap<ConsumerId, BufferSettings>,
}
impl ConsumerConfigs {
	/// Parses a JSON settings document.
	pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
		serde_json::from_str(raw)
	}

	/// Adds or replaces the settings for a consumer.
	pub fn with_consumer(mut self, consumer: ConsumerId, settings: BufferSettings) -> Self {
		self.consumers.insert(consumer, settings);

		self
	}
}
impl ConfigSource for ConsumerConfigs {
	fn resolve<'a>(&'a self, consumer: Option<&'a ConsumerId>) -> ConfigFuture<'a> {
		Box::pin(async move {
			match consumer.and_then(|id| self.consumers.get(id)) {
				Some(settings) => settings.gate_config(),
				None => Ok(None),
			}
		})
	}
}

fn duration_from(value: u64, unit: fn(i64) -> Duration) -> Result<Duration, ConfigError> {
	i64::try_from(value)
		.map(unit)
		.map_err(|_| ConfigError::NonPositiveDuration { setting: "duration" })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn defaults_match_documented_values() {
		let config = GateConfig::default();

		assert_eq!(config.wait_unit, Duration::milliseconds(100));
		assert_eq!(config.max_retries, 10);
		assert_eq!(config.max_wait(), Duration::seconds(1));
	}

	#[test]
	fn validation_rejects_zero_wait_with_retries() {
		let err = GateConfig::default()
			.with_wait_unit(Duration::ZERO)
			.validate()
			.expect_err("Zero wait with retries should be rejected.");

		assert!(matches!(err, ConfigError::NonPositiveDuration { setting: "wait_unit" }));
		assert!(
			GateConfig::default()
				.with_wait_unit(Duration::ZERO)
				.with_max_retries(0)
				.validate()
				.is_ok()
		);
	}

	#[test]
	fn settings_deserialize_with_defaults() {
		let configs = ConsumerConfigs::from_json(
			r#"{"consumers":{"mobile-app":{"enabled":true,"wait_timeout_ms":50}}}"#,
		)
		.expect("Settings document should parse.");
		let consumer = ConsumerId::new("mobile-app").expect("Consumer fixture should be valid.");
		let settings = &configs.consumers[&consumer];

		assert_eq!(settings.wait_retry_count, 10);

		let config = settings
			.gate_config()
			.expect("Settings should validate.")
			.expect("Enabled settings should yield a config.");

		assert_eq!(config.wait_unit, Duration::milliseconds(50));
		assert_eq!(config.max_wait(), Duration::milliseconds(500));
	}

	#[tokio::test]
	async fn consumer_configs_resolve_disabled_and_unknown_as_none() {
		let enabled = ConsumerId::new("enabled").expect("Consumer fixture should be valid.");
		let disabled = ConsumerId::new("disabled").expect("Consumer fixture should be valid.");
		let unknown = ConsumerId::new("unknown").expect("Consumer fixture should be valid.");
		let configs = ConsumerConfigs::default()
			.with_consumer(enabled.clone(), BufferSettings { enabled: true, ..Default::default() })
			.with_consumer(disabled.clone(), BufferSettings::default());

		assert_eq!(
			configs.resolve(Some(&enabled)).await.expect("Resolve should succeed."),
			Some(GateConfig::default())
		);
		assert_eq!(configs.resolve(Some(&disabled)).await.expect("Resolve should succeed."), None);
		assert_eq!(configs.resolve(Some(&unknown)).await.expect("Resolve should succeed."), None);
		assert_eq!(configs.resolve(None).await.expect("Resolve should succeed."), None);
	}

	#[tokio::test]
	async fn static_source_ignores_consumer() {
		let source = StaticConfigSource::enabled(GateConfig::default().with_max_retries(3));

		assert_eq!(
			source.resolve(None).await.expect("Resolve should succeed.").map(|c| c.max_retries),
			Some(3)
		);
		assert_eq!(
			StaticConfigSource::disabled().resolve(None).await.expect("Resolve should succeed."),
			None
		);
	}
}
