//! STRING value container with the int/embstr/raw dual encoding.

use bytes::Bytes;

/// A string value, automatically tracking whether it round-trips as an
/// integer (`OBJECT ENCODING` reports `"int"`) or holds arbitrary bytes
/// (`"embstr"` below 44 bytes, `"raw"` above).
#[derive(Debug, Clone, PartialEq)]
pub enum StringValue {
    Int(i64),
    Bytes(Bytes),
}

/// Below this length a byte string is reported as `"embstr"`; at or above,
/// `"raw"`. Matches the reference implementation's inline-allocation cutoff.
const EMBSTR_LIMIT: usize = 44;

impl StringValue {
    pub fn from_bytes(b: Bytes) -> Self {
        if let Some(i) = parse_canonical_int(&b) {
            Self::Int(i)
        } else {
            Self::Bytes(b)
        }
    }

    pub fn as_bytes(&self) -> Bytes {
        match self {
            Self::Int(i) => Bytes::from(i.to_string()),
            Self::Bytes(b) => b.clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Int(i) => int_digit_len(*i),
            Self::Bytes(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bytes(b) => std::str::from_utf8(b).ok()?.trim().parse().ok(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Bytes(b) => std::str::from_utf8(b).ok()?.trim().parse().ok(),
        }
    }

    /// `OBJECT ENCODING` name.
    pub fn encoding(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Bytes(b) if b.len() < EMBSTR_LIMIT => "embstr",
            Self::Bytes(_) => "raw",
        }
    }
}

/// Parses `s` as an `i64` only when it round-trips exactly (no leading
/// zeros, no leading `+`, no surrounding whitespace) — matches the encoding
/// rule that `"007"` and `"+5"` stay string-encoded even though they parse.
fn parse_canonical_int(s: &[u8]) -> Option<i64> {
    let text = std::str::from_utf8(s).ok()?;
    if text.is_empty() || text.len() > 20 {
        return None;
    }
    let value: i64 = text.parse().ok()?;
    if value.to_string() == text {
        Some(value)
    } else {
        None
    }
}

fn int_digit_len(i: i64) -> usize {
    i.to_string().len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_integer_is_int_encoded() {
        let v = StringValue::from_bytes(Bytes::from_static(b"12345"));
        assert_eq!(v.encoding(), "int");
        assert_eq!(v.as_int(), Some(12345));
    }

    #[test]
    fn leading_zero_stays_string() {
        let v = StringValue::from_bytes(Bytes::from_static(b"007"));
        assert_eq!(v.encoding(), "embstr");
    }

    #[test]
    fn negative_integer() {
        let v = StringValue::from_bytes(Bytes::from_static(b"-42"));
        assert_eq!(v.encoding(), "int");
        assert_eq!(v.as_int(), Some(-42));
    }

    #[test]
    fn short_string_is_embstr() {
        let v = StringValue::from_bytes(Bytes::from_static(b"hello world"));
        assert_eq!(v.encoding(), "embstr");
    }

    #[test]
    fn long_string_is_raw() {
        let long = "x".repeat(100);
        let v = StringValue::from_bytes(Bytes::from(long));
        assert_eq!(v.encoding(), "raw");
    }

    #[test]
    fn plus_prefixed_not_int() {
        let v = StringValue::from_bytes(Bytes::from_static(b"+5"));
        assert_eq!(v.encoding(), "embstr");
    }

    #[test]
    fn round_trip_bytes() {
        let v = StringValue::from_bytes(Bytes::from_static(b"42"));
        assert_eq!(v.as_bytes(), Bytes::from_static(b"42"));
    }

    #[test]
    fn as_f64_from_int() {
        let v = StringValue::Int(10);
        assert_eq!(v.as_f64(), Some(10.0));
    }
}
