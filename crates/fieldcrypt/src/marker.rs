//! The ciphertext marker: a fixed trailing tag that makes stored values
//! self-describing.
//!
//! For every string field managed by the engine, ending in [`MARKER`] means the
//! value is ciphertext produced by a [`crate::crypto::CipherProvider`]; anything
//! else is plaintext. The tag is part of the at-rest format and must never
//! change.

use crate::schema::FieldValue;

/// Tag appended to every encrypted value.
pub const MARKER: &str = "<ENC>";

/// How a stored value should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// A non-empty string without the marker.
    Plaintext,
    /// A string ending in the marker.
    Ciphertext,
    /// Null, empty, or not a string; never transformed.
    Passthrough,
}

/// Classify a field value.
pub fn classify(value: &FieldValue<'_>) -> Classification {
    match value {
        FieldValue::Text(text) if text.is_empty() => Classification::Passthrough,
        FieldValue::Text(text) if is_marked(text) => Classification::Ciphertext,
        FieldValue::Text(_) => Classification::Plaintext,
        FieldValue::Null | FieldValue::Other => Classification::Passthrough,
    }
}

/// Returns `true` if `value` ends in the marker.
pub fn is_marked(value: &str) -> bool {
    value.ends_with(MARKER)
}

/// Append the marker to a ciphertext body.
pub fn mark(ciphertext: &str) -> String {
    let mut marked = String::with_capacity(ciphertext.len() + MARKER.len());
    marked.push_str(ciphertext);
    marked.push_str(MARKER);
    marked
}

/// Strip the marker. Values without it are returned unchanged; classify first.
pub fn unmark(value: &str) -> &str {
    value.strip_suffix(MARKER).unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_is_five_characters() {
        assert_eq!(MARKER.len(), 5);
    }

    #[test]
    fn marked_values_are_ciphertext() {
        for body in ["", "abc", "aGVsbG8=", "<ENC"] {
            let marked = mark(body);
            assert_eq!(classify(&FieldValue::Text(&marked)), Classification::Ciphertext);
            assert_eq!(unmark(&marked), body);
        }
    }

    #[test]
    fn unmarked_strings_are_plaintext() {
        for value in ["hello", "ENC>", "<ENC>x", "<enc>"] {
            assert_eq!(classify(&FieldValue::Text(value)), Classification::Plaintext);
        }
    }

    #[test]
    fn empty_null_and_non_strings_pass_through() {
        assert_eq!(classify(&FieldValue::Text("")), Classification::Passthrough);
        assert_eq!(classify(&FieldValue::Null), Classification::Passthrough);
        assert_eq!(classify(&FieldValue::Other), Classification::Passthrough);
    }

    #[test]
    fn unmark_without_marker_is_a_no_op() {
        assert_eq!(unmark("plain"), "plain");
    }
}
