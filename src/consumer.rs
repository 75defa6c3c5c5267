//! Strongly typed consumer identifiers used to resolve per-caller buffer settings.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

const IDENTIFIER_MAX_LEN: usize = 128;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("Consumer identifier cannot be empty.")]
	Empty,
	/// The identifier contains whitespace characters.
	#[error("Consumer identifier contains whitespace.")]
	ContainsWhitespace,
	/// The identifier exceeded the allowed character count.
	#[error("Consumer identifier exceeds {max} characters.")]
	TooLong {
		/// Maximum permitted character count.
		max: usize,
	},
}

/// OAuth client (consumer) identifier, taken from `client_id` or the `X-Consumer-ID` header.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConsumerId(String);
impl ConsumerId {
	/// Creates a new identifier after validation.
	pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
		let view = value.as_ref();

		validate_view(view)?;

		Ok(Self(view.to_owned()))
	}
}
impl Deref for ConsumerId {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for ConsumerId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl From<ConsumerId> for String {
	fn from(value: ConsumerId) -> Self {
		value.0
	}
}
impl TryFrom<String> for ConsumerId {
	type Error = IdentifierError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		validate_view(&value)?;

		Ok(Self(value))
	}
}
impl Borrow<str> for ConsumerId {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl Debug for ConsumerId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Consumer({})", self.0)
	}
}
impl Display for ConsumerId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}
impl FromStr for ConsumerId {
	type Err = IdentifierError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}

fn validate_view(view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty);
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace);
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn identifiers_validate() {
		assert!(ConsumerId::new(" client").is_err(), "Leading whitespace must be rejected.");
		assert_eq!(ConsumerId::new(""), Err(IdentifierError::Empty));

		let consumer = ConsumerId::new("client-1").expect("Consumer fixture should be valid.");

		assert_eq!(consumer.as_ref(), "client-1");
		assert_eq!(format!("{consumer:?}"), "Consumer(client-1)");

		let too_long = "a".repeat(IDENTIFIER_MAX_LEN + 1);

		assert_eq!(
			ConsumerId::new(&too_long),
			Err(IdentifierError::TooLong { max: IDENTIFIER_MAX_LEN })
		);
	}

	#[test]
	fn serde_round_trip_enforces_validation() {
		let consumer: ConsumerId =
			serde_json::from_str("\"client-42\"").expect("Consumer should deserialize.");

		assert_eq!(consumer.as_ref(), "client-42");
		assert!(serde_json::from_str::<ConsumerId>("\"with space\"").is_err());
	}

	#[test]
	fn borrow_supports_fast_lookup() {
		let map: HashMap<ConsumerId, u8> = HashMap::from_iter([(
			ConsumerId::new("client-1").expect("Consumer used for lookup should be valid."),
			3_u8,
		)]);

		assert_eq!(map.get("client-1"), Some(&3));
	}
}
