//! Serde helpers for addresses written as `"0x8033B170"` or plain numbers.

use serde::{Deserialize, Deserializer, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Number(u64),
    Text(String),
}

/// Parse `0x`-prefixed hex or decimal text
pub fn parse_u64(text: &str) -> Option<u64> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16).ok(),
        None => text.parse().ok(),
    }
}

pub fn format_u64(value: u64) -> String {
    format!("0x{:X}", value)
}

fn from_raw<E: serde::de::Error>(raw: RawNumber) -> Result<u64, E> {
    match raw {
        RawNumber::Number(n) => Ok(n),
        RawNumber::Text(s) => {
            parse_u64(&s).ok_or_else(|| E::custom(format!("invalid address '{}'", s)))
        }
    }
}

pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_u64(*value))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    from_raw(RawNumber::deserialize(deserializer)?)
}

pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&format_u64(*v)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<u64>, D::Error> {
        Option::<RawNumber>::deserialize(deserializer)?
            .map(from_raw)
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Entry {
        #[serde(with = "crate::hex")]
        address: u64,
        #[serde(default, with = "crate::hex::option")]
        mask: Option<u64>,
    }

    #[test]
    fn test_parse_u64() {
        assert_eq!(parse_u64("0x8033B170"), Some(0x8033_B170));
        assert_eq!(parse_u64("0X10"), Some(16));
        assert_eq!(parse_u64("42"), Some(42));
        assert_eq!(parse_u64("0xZZ"), None);
    }

    #[test]
    fn test_accepts_text_and_numbers() {
        let entry: Entry = serde_json::from_str(r#"{"address": "0x10", "mask": 255}"#).unwrap();
        assert_eq!(entry.address, 0x10);
        assert_eq!(entry.mask, Some(0xFF));

        let entry: Entry = serde_json::from_str(r#"{"address": 16}"#).unwrap();
        assert_eq!(entry.mask, None);
    }

    #[test]
    fn test_serializes_as_hex_text() {
        let entry = Entry {
            address: 0x8033_B170,
            mask: Some(0x0F),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"address":"0x8033B170","mask":"0xF"}"#);
    }

    #[test]
    fn test_rejects_bad_text() {
        assert!(serde_json::from_str::<Entry>(r#"{"address": "nope"}"#).is_err());
    }
}
