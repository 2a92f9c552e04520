//! Tolerant JSON decoding for upstream payloads.
//!
//! Statistical services occasionally emit JSON with raw control characters
//! inside strings or with line breaks splitting tokens. [`decode`] walks a
//! fallback ladder and only gives up once every rung has failed:
//!
//! 1. strict parse
//! 2. lenient parse: raw control characters inside string literals are escaped
//! 3. lenient parse after removing every CR and LF

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Every rung of the ladder failed; carries the message of the last attempt.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Error decoding JSON: {message}")]
pub struct DecodeError {
    pub message: String,
}

pub fn decode(text: &str) -> Result<Value, DecodeError> {
    if let Ok(value) = serde_json::from_str(text) {
        return Ok(value);
    }
    warn!("Error decoding JSON, trying unrestricted parsing");

    if let Ok(value) = decode_lenient(text) {
        return Ok(value);
    }
    warn!("Error decoding JSON, trying after removing CR/LF");

    let stripped: String = text.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    decode_lenient(&stripped).map_err(|e| {
        warn!(error = %e, "Error decoding JSON after removing CR/LF");
        DecodeError {
            message: e.to_string(),
        }
    })
}

fn decode_lenient(text: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(&escape_string_controls(text))
}

/// Escapes control characters that appear inside string literals.
fn escape_string_controls(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
            continue;
        }

        if escaped {
            escaped = false;
            out.push(c);
            continue;
        }

        match c {
            '\\' => {
                escaped = true;
                out.push(c);
            }
            '"' => {
                in_string = false;
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() && (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strict_json() {
        let value = decode(r#"{"id": 7, "URL": "http://example.org/7"}"#).unwrap();
        assert_eq!(value["id"], json!(7));
    }

    #[test]
    fn test_control_characters_in_strings() {
        let text = "{\"Descrizione\": \"prima riga\nseconda\triga\u{1}\"}";
        assert!(serde_json::from_str::<Value>(text).is_err());

        let value = decode(text).unwrap();
        assert_eq!(value["Descrizione"], json!("prima riga\nseconda\triga\u{1}"));
    }

    #[test]
    fn test_newline_splitting_a_token() {
        let text = "{\"AnnoInizio\": 20\n01, \"attivo\": tr\r\nue}";
        assert!(decode_lenient(text).is_err());

        let value = decode(text).unwrap();
        assert_eq!(value["AnnoInizio"], json!(2001));
        assert_eq!(value["attivo"], json!(true));
    }

    #[test]
    fn test_escaped_quote_keeps_string_state() {
        let text = "{\"a\": \"say \\\"hi\\\"\nnow\", \"b\": 1}";
        let value = decode(text).unwrap();
        assert_eq!(value["a"], json!("say \"hi\"\nnow"));
        assert_eq!(value["b"], json!(1));
    }

    #[test]
    fn test_all_fallbacks_fail() {
        let err = decode("{\"id\": 1,, }").unwrap_err();
        assert!(err.to_string().starts_with("Error decoding JSON"));
        assert!(!err.message.is_empty());
    }

    #[test]
    fn test_truncated_payload_is_not_partially_returned() {
        assert!(decode("{\"items\": [1, 2").is_err());
    }
}
