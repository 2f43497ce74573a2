// ObjectId-shaped identifier validator (§4.5 item 6). Most entities in this
// system are keyed by UUIDv4, but the external product catalog keys
// products with 24-hex-char ids; `POST /payments/create-intent` validates
// every `productId` against this pattern before it ever reaches the
// catalog lookup.

use once_cell::sync::Lazy;
use regex::Regex;

static OBJECT_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[a-f0-9]{24}$").expect("valid regex"));

pub fn validate_object_id(candidate: &str) -> bool {
    OBJECT_ID_PATTERN.is_match(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_24_hex_chars() {
        assert!(validate_object_id("507f1f77bcf86cd799439011"));
        assert!(validate_object_id("507F1F77BCF86CD799439011"));
    }

    #[test]
    fn rejects_wrong_length_or_charset() {
        assert!(!validate_object_id("not-an-object-id"));
        assert!(!validate_object_id(""));
        assert!(!validate_object_id("507f1f77bcf86cd79943901")); // 23 chars
    }
}
