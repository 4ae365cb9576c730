use serde::{Deserialize, Serialize};

use crate::error::{MeshflowError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceId(String);

impl TraceId {
    /// Accepts 64-bit and 128-bit hex trace ids. Short ids are left-padded to
    /// 32 characters so both backends key the same trace identically.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if !matches!(trimmed.len(), 16 | 32) || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(MeshflowError::Parse(format!("invalid trace id: {input}")));
        }
        Ok(Self(format!("{:0>32}", trimmed.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

pub fn hex_encode(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    Some(bytes.iter().map(|b| format!("{b:02x}")).collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ids() {
        let trace = TraceId::parse("4BF92F3577B34DA6A3CE929D0E0E4736").unwrap();
        assert_eq!(trace.as_str(), "4bf92f3577b34da6a3ce929d0e0e4736");
    }

    #[test]
    fn pads_short_ids() {
        let trace = TraceId::parse("a3ce929d0e0e4736").unwrap();
        assert_eq!(trace.as_str(), "0000000000000000a3ce929d0e0e4736");
    }

    #[test]
    fn encodes_bytes() {
        assert_eq!(hex_encode(&[0xab, 0x01]).as_deref(), Some("ab01"));
        assert!(hex_encode(&[]).is_none());
    }

    #[test]
    fn rejects_bad_ids() {
        assert!(TraceId::parse("abc").is_err());
        assert!(TraceId::parse("zzzzzzzzzzzzzzzz").is_err());
    }
}
