//! Serde adapter encoding binary payloads as standard base64 strings.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{de::Error, Deserialize, Deserializer, Serializer};

pub fn serialize<S>(value: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	serializer.serialize_str(&STANDARD.encode(value))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
where
	D: Deserializer<'de>,
{
	let encoded = String::deserialize(deserializer)?;
	STANDARD
		.decode(encoded.as_bytes())
		.map(Bytes::from)
		.map_err(|e| D::Error::custom(format!("Invalid base64: {}", e)))
}
