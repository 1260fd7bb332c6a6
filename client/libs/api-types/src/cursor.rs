//! Opaque pagination cursor codec
//!
//! Wire format: base64 of `"{timestamp}:{item_id}"`. The server hands the
//! cursor back verbatim on the next fetch; the client never interprets it
//! for ordering, only for transport. Decoding exists so tests and tooling
//! can build well-formed cursors.

use base64::{engine::general_purpose, Engine as _};

/// Decoded continuation cursor for timestamp-ordered collections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub timestamp: i64,
    pub item_id: String,
}

impl Cursor {
    pub fn new(timestamp: i64, item_id: impl Into<String>) -> Self {
        Self {
            timestamp,
            item_id: item_id.into(),
        }
    }

    /// Encode into the opaque wire form
    pub fn encode(&self) -> String {
        general_purpose::STANDARD.encode(format!("{}:{}", self.timestamp, self.item_id))
    }

    /// Decode from the opaque wire form
    pub fn decode(raw: &str) -> Result<Self, String> {
        let decoded = general_purpose::STANDARD
            .decode(raw)
            .map_err(|_| "invalid cursor format".to_string())?;
        let cursor_str =
            String::from_utf8(decoded).map_err(|_| "invalid cursor encoding".to_string())?;

        let (ts_str, item_id) = cursor_str
            .split_once(':')
            .ok_or_else(|| "invalid cursor structure".to_string())?;
        let timestamp = ts_str
            .parse::<i64>()
            .map_err(|_| "invalid cursor timestamp".to_string())?;

        Ok(Self {
            timestamp,
            item_id: item_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_round_trip() {
        let cursor = Cursor::new(1_700_000_000, "post-123");
        let encoded = cursor.encode();
        assert_eq!(Cursor::decode(&encoded).unwrap(), cursor);
    }

    #[test]
    fn test_cursor_rejects_garbage() {
        assert!(Cursor::decode("not-base64!!!").is_err());

        let no_separator = general_purpose::STANDARD.encode("12345");
        assert!(Cursor::decode(&no_separator).is_err());

        let bad_timestamp = general_purpose::STANDARD.encode("abc:post-1");
        assert!(Cursor::decode(&bad_timestamp).is_err());
    }
}
