//! Content-derived request identity used as the deduplication key.
//!
//! A [`Fingerprint`] is the SHA-256 digest of the canonical JSON serialization of a request's
//! parameters. [`RequestParams`] keeps parameter names sorted, so the same logical parameter
//! set always fingerprints identically regardless of the order a client sent the names in.
//! Values of a repeated name keep their submission order and all take part in the digest.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use percent_encoding::percent_decode;
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// Raised when request parameters cannot be canonicalized.
#[derive(Debug, ThisError)]
pub enum EncodingError {
	/// A form name or value does not percent-decode to valid UTF-8.
	#[error("Request body is not valid UTF-8 form data.")]
	InvalidUtf8(#[source] std::str::Utf8Error),
	/// The parameters could not be serialized.
	#[error("Request parameters could not be serialized.")]
	Serialize(#[source] serde_json::Error),
}

/// Request parameters grouped by name, names sorted, values kept in submission order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestParams(BTreeMap<String, Vec<String>>);
impl RequestParams {
	/// Parses an `application/x-www-form-urlencoded` body.
	///
	/// Every name and value must percent-decode to valid UTF-8. Repeated names keep all of their
	/// values, so `scope[]=a&scope[]=b` and `scope[]=b` stay distinct.
	pub fn from_form(body: &[u8]) -> Result<Self, EncodingError> {
		let mut params = Self::default();

		for pair in body.split(|b| *b == b'&').filter(|pair| !pair.is_empty()) {
			let (name, value) = match pair.iter().position(|b| *b == b'=') {
				Some(at) => (&pair[..at], &pair[at + 1..]),
				None => (pair, &[][..]),
			};

			params.append(decode_component(name)?, decode_component(value)?);
		}

		Ok(params)
	}

	/// Returns the last value submitted for `key`.
	pub fn get(&self, key: &str) -> Option<&str> {
		self.0.get(key).and_then(|values| values.last()).map(String::as_str)
	}

	/// Returns every value submitted for `key`, in submission order.
	pub fn get_all(&self, key: &str) -> &[String] {
		self.0.get(key).map(Vec::as_slice).unwrap_or_default()
	}

	/// Replaces all values of `key` with `value`.
	pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
		self.0.insert(key.into(), vec![value.into()]);
	}

	/// Adds `value` after any values already submitted for `key`.
	pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
		self.0.entry(key.into()).or_default().push(value.into());
	}

	/// Number of distinct parameter names.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns true when no parameters are present.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl<K, V> FromIterator<(K, V)> for RequestParams
where
	K: Into<String>,
	V: Into<String>,
{
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		let mut params = Self::default();

		for (key, value) in iter {
			params.append(key, value);
		}

		params
	}
}

/// Fixed-length (256-bit) request identity.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint([u8; 32]);
impl Fingerprint {
	/// Fingerprints a parameter set.
	pub fn of(params: &RequestParams) -> Result<Self, EncodingError> {
		Self::of_serialize(params)
	}

	/// Fingerprints any serializable value through its canonical JSON form.
	///
	/// Map-like values only serialize canonically when their iteration order is stable (for
	/// example [`BTreeMap`]); prefer [`Fingerprint::of`] for request bodies.
	pub fn of_serialize<T>(value: &T) -> Result<Self, EncodingError>
	where
		T: ?Sized + Serialize,
	{
		let canonical = serde_json::to_vec(value).map_err(EncodingError::Serialize)?;

		Ok(Self(Sha256::digest(&canonical).into()))
	}

	/// Raw digest bytes.
	pub fn as_bytes(&self) -> &[u8; 32] {
		&self.0
	}

	/// Store key form: unpadded URL-safe base64 of the digest.
	pub fn encode(&self) -> String {
		URL_SAFE_NO_PAD.encode(self.0)
	}
}
impl Debug for Fingerprint {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("Fingerprint").field(&self.encode()).finish()
	}
}
impl Display for Fingerprint {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.encode())
	}
}

fn decode_component(raw: &[u8]) -> Result<String, EncodingError> {
	let spaced = raw.iter().map(|b| if *b == b'+' { b' ' } else { *b }).collect::<Vec<_>>();

	percent_decode(&spaced)
		.decode_utf8()
		.map(|decoded| decoded.into_owned())
		.map_err(EncodingError::InvalidUtf8)
}
