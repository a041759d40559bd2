//! Payload codecs.
//!
//! A codec turns inbound bytes into a generic [`Value`] and renders
//! configured responses back into bytes.

use crate::error::CodecError;
use crate::value::Value;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Wire format of an endpoint's payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    #[default]
    Json,
    Yaml,
}

impl Codec {
    /// Decode a message body. Blank bodies decode to an empty mapping.
    pub fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::empty_mapping());
        }
        match self {
            Codec::Json => Ok(serde_json::from_slice(bytes)?),
            Codec::Yaml => Ok(serde_yaml::from_slice(bytes)?),
        }
    }

    /// Encode a value.
    pub fn encode(&self, value: &Value) -> Result<Bytes, CodecError> {
        match self {
            Codec::Json => Ok(Bytes::from(serde_json::to_vec(value)?)),
            Codec::Yaml => Ok(Bytes::from(serde_yaml::to_string(value)?)),
        }
    }

    /// Render a configured response payload.
    ///
    /// Strings go out verbatim, anything else is encoded.
    pub fn render(&self, response: Option<&Value>) -> Result<Bytes, CodecError> {
        match response {
            None | Some(Value::Null) => Ok(Bytes::new()),
            Some(Value::String(s)) => Ok(Bytes::from(s.clone())),
            Some(other) => self.encode(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_body_is_empty_mapping() {
        assert_eq!(Codec::Json.decode(b"").unwrap(), Value::empty_mapping());
        assert_eq!(Codec::Yaml.decode(b"  \n").unwrap(), Value::empty_mapping());
    }

    #[test]
    fn test_malformed_json_is_error() {
        let err = Codec::Json.decode(b"{\"type\":").unwrap_err();
        assert!(matches!(err, CodecError::Json(_)));
    }

    #[test]
    fn test_yaml_body() {
        let value = Codec::Yaml.decode(b"type: a\ncount: 2\n").unwrap();
        assert_eq!(value.get("count"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_render_string_verbatim() {
        let bytes = Codec::Json.render(Some(&Value::from("pong"))).unwrap();
        assert_eq!(&bytes[..], b"pong");
    }

    #[test]
    fn test_render_structured_and_empty() {
        let value: Value = serde_yaml::from_str("ok: true").unwrap();
        let bytes = Codec::Json.render(Some(&value)).unwrap();
        assert_eq!(&bytes[..], br#"{"ok":true}"#);
        assert!(Codec::Json.render(None).unwrap().is_empty());
    }
}
