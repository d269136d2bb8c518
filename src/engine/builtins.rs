//! Pure built-in functions exposed to template expressions.

use base64::Engine as _;
use sha2::{Digest, Sha256};

use super::errors::{EngineError, EngineResult};
use super::value::Value;

/// DNS label length limit bounding generated names.
pub const DNS_LABEL_MAX: usize = 63;

/// Length of the content-hash suffix appended by `oc_generate_name`.
const NAME_SUFFIX_LEN: usize = 8;

/// Deep merge with right-hand wins, depth-first. Requires at least two
/// map arguments; differently-shaped maps are legal.
pub fn merge(args: Vec<Value>) -> EngineResult<Value> {
    if args.len() < 2 {
        return Err(EngineError::Type(format!(
            "oc_merge expects at least 2 arguments, got {}",
            args.len()
        )));
    }
    let mut iter = args.into_iter();
    let mut acc = match iter.next() {
        Some(Value::Map(m)) => m,
        Some(other) => {
            return Err(EngineError::Type(format!(
                "oc_merge arguments must be maps, got {}",
                other.type_name()
            )));
        }
        None => unreachable!(),
    };
    for arg in iter {
        let right = match arg {
            Value::Map(right) => right,
            other => {
                return Err(EngineError::Type(format!(
                    "oc_merge arguments must be maps, got {}",
                    other.type_name()
                )));
            }
        };
        for (key, value) in right {
            let merged = match (acc.get(&key), value) {
                (Some(Value::Map(_)), Value::Map(rm)) => {
                    let Some(Value::Map(lm)) = acc.get(&key).cloned() else {
                        unreachable!()
                    };
                    merge(vec![Value::Map(lm), Value::Map(rm)])?
                }
                (_, value) => value,
            };
            acc.insert(key, merged);
        }
    }
    Ok(Value::Map(acc))
}

/// Deterministic 8-hex-character content fingerprint (SHA-256 prefix).
pub fn hash_hex8(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex_prefix(&digest, NAME_SUFFIX_LEN)
}

fn hex_prefix(bytes: &[u8], hex_chars: usize) -> String {
    let mut out = String::with_capacity(hex_chars);
    for byte in bytes {
        if out.len() >= hex_chars {
            break;
        }
        out.push_str(&format!("{byte:02x}"));
    }
    out.truncate(hex_chars);
    out
}

/// Join parts with `-`, lowercase, sanitize to a DNS label, and append an
/// 8-hex suffix hashed from the pre-sanitization concatenation.
///
/// Overflow beyond the DNS label limit trims the body from the left; the
/// suffix always survives and always reflects the original input.
pub fn generate_name(parts: &[String]) -> EngineResult<String> {
    if parts.is_empty() {
        return Err(EngineError::Type(
            "oc_generate_name expects at least 1 argument".to_string(),
        ));
    }
    let body = parts.join("-");
    let suffix = hash_hex8(&body);
    let mut sanitized = sanitize_label(&body);

    let body_max = DNS_LABEL_MAX - NAME_SUFFIX_LEN - 1;
    if sanitized.len() > body_max {
        sanitized = sanitized[sanitized.len() - body_max..].to_string();
        sanitized = sanitized.trim_start_matches('-').to_string();
    }

    if sanitized.is_empty() {
        return Ok(suffix);
    }
    Ok(format!("{sanitized}-{suffix}"))
}

/// Lowercase and reduce to name-safe characters (`a-z`, `0-9`, `.`, `-`),
/// collapsing replacement runs and trimming separators from both ends.
fn sanitize_label(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_dash = false;
    for c in input.chars() {
        let mapped = match c.to_ascii_lowercase() {
            c @ ('a'..='z' | '0'..='9' | '.') => Some(c),
            _ => None,
        };
        match mapped {
            Some(c) => {
                out.push(c);
                last_dash = false;
            }
            None => {
                if !last_dash && !out.is_empty() {
                    out.push('-');
                    last_dash = true;
                }
            }
        }
    }
    out.trim_end_matches(['-', '.']).to_string()
}

/// `base64.encode(string)`.
pub fn base64_encode(value: &Value) -> EngineResult<Value> {
    let s = value.as_str().map_err(|_| {
        EngineError::Type(format!(
            "base64.encode expects a string, got {}",
            value.type_name()
        ))
    })?;
    Ok(Value::String(
        base64::engine::general_purpose::STANDARD.encode(s.as_bytes()),
    ))
}

/// `base64.decode(string)`; the decoded bytes must be valid UTF-8.
pub fn base64_decode(value: &Value) -> EngineResult<Value> {
    let s = value.as_str().map_err(|_| {
        EngineError::Type(format!(
            "base64.decode expects a string, got {}",
            value.type_name()
        ))
    })?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|e| EngineError::Type(format!("invalid base64: {e}")))?;
    String::from_utf8(bytes)
        .map(Value::String)
        .map_err(|_| EngineError::Type("base64.decode produced non-UTF-8 bytes".to_string()))
}
