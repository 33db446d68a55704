//! String functions
//!
//! Indexing is character-based, not byte-based. `matches` and
//! `replaceMatches` compile in single-line mode (`(?s)`) through a
//! process-wide pattern cache.

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use lru::LruCache;
use once_cell::sync::Lazy;
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::value::{Collection, Value, ValueData};

/// Compiled-pattern cache, bounded by the number of distinct source
/// patterns in play.
static REGEX_CACHE: Lazy<Mutex<LruCache<String, Regex>>> =
    Lazy::new(|| Mutex::new(LruCache::new(NonZeroUsize::new(256).unwrap())));

fn compiled_regex(pattern: &str) -> Result<Regex> {
    let mut cache = REGEX_CACHE.lock().unwrap();
    if let Some(regex) = cache.get(pattern) {
        return Ok(regex.clone());
    }
    // Single-line mode: `.` matches newlines, per the FHIRPath spec.
    let regex = Regex::new(&format!("(?s){}", pattern))
        .map_err(|e| Error::Domain(format!("invalid regular expression: {}", e)))?;
    cache.put(pattern.to_string(), regex.clone());
    Ok(regex)
}

/// Render a single value as its FHIRPath string form (`toString()`).
pub fn render_value(value: &Value) -> Result<String> {
    let out = match value.data() {
        ValueData::String(s) => s.to_string(),
        ValueData::Boolean(b) => b.to_string(),
        ValueData::Integer(i) | ValueData::Long(i) => i.to_string(),
        ValueData::Decimal(d) => d.to_string(),
        ValueData::Date { value, precision } => crate::value::format_date(value, *precision),
        ValueData::DateTime {
            value,
            precision,
            timezone_offset,
        } => crate::value::format_datetime(value, *precision, *timezone_offset),
        ValueData::Time { value, precision } => crate::value::format_time(value, *precision),
        ValueData::Quantity { value, unit } => {
            if crate::value::CalendarUnit::parse(unit).is_some() {
                format!("{} {}", value, unit)
            } else {
                format!("{} '{}'", value, unit)
            }
        }
        ValueData::Node(node) => match node.data() {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Bool(b)) => b.to_string(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => {
                return Err(Error::Type(format!(
                    "cannot convert {} to String",
                    value.type_name()
                )))
            }
        },
    };
    Ok(out)
}

pub fn to_string(input: &Collection) -> Result<Collection> {
    match input.singleton_item("toString()")? {
        None => Ok(Collection::empty()),
        Some(item) => Ok(Collection::singleton(Value::string(render_value(item)?))),
    }
}

pub fn index_of(input: &Collection, search: &Collection) -> Result<Collection> {
    if search.is_empty() {
        return Ok(Collection::empty());
    }
    let s = input.as_string()?;
    let needle = search.as_string()?;
    match s.find(needle.as_ref()) {
        Some(byte_idx) => {
            let char_idx = s[..byte_idx].chars().count();
            Ok(Collection::singleton(Value::integer(char_idx as i64)))
        }
        None => Ok(Collection::singleton(Value::integer(-1))),
    }
}

pub fn substring(
    input: &Collection,
    start: Option<i64>,
    length: Option<Option<i64>>,
) -> Result<Collection> {
    let Some(start) = start else {
        return Ok(Collection::empty());
    };
    let s = input.as_string()?;
    let chars: Vec<char> = s.chars().collect();
    if start < 0 || start as usize >= chars.len() {
        return Ok(Collection::empty());
    }
    let start = start as usize;

    let end = match length {
        Some(Some(len)) => {
            if len <= 0 {
                return Ok(Collection::empty());
            }
            (start + len as usize).min(chars.len())
        }
        // An empty length argument yields empty.
        Some(None) => return Ok(Collection::empty()),
        None => chars.len(),
    };

    let out: String = chars[start..end].iter().collect();
    Ok(Collection::singleton(Value::string(out)))
}

pub fn starts_with(input: &Collection, prefix: &Collection) -> Result<Collection> {
    if prefix.is_empty() {
        return Ok(Collection::empty());
    }
    let s = input.as_string()?;
    let prefix = prefix.as_string()?;
    Ok(Collection::singleton(Value::boolean(
        s.starts_with(prefix.as_ref()),
    )))
}

pub fn ends_with(input: &Collection, suffix: &Collection) -> Result<Collection> {
    if suffix.is_empty() {
        return Ok(Collection::empty());
    }
    let s = input.as_string()?;
    let suffix = suffix.as_string()?;
    Ok(Collection::singleton(Value::boolean(
        s.ends_with(suffix.as_ref()),
    )))
}

pub fn contains_str(input: &Collection, needle: &Collection) -> Result<Collection> {
    if needle.is_empty() {
        return Ok(Collection::empty());
    }
    let s = input.as_string()?;
    let needle = needle.as_string()?;
    Ok(Collection::singleton(Value::boolean(
        s.contains(needle.as_ref()),
    )))
}

pub fn upper(input: &Collection) -> Result<Collection> {
    let s = input.as_string()?;
    Ok(Collection::singleton(Value::string(s.to_uppercase())))
}

pub fn lower(input: &Collection) -> Result<Collection> {
    let s = input.as_string()?;
    Ok(Collection::singleton(Value::string(s.to_lowercase())))
}

pub fn replace(input: &Collection, old: &Collection, new: &Collection) -> Result<Collection> {
    if old.is_empty() || new.is_empty() {
        return Ok(Collection::empty());
    }
    let s = input.as_string()?;
    let old = old.as_string()?;
    let new = new.as_string()?;
    if old.is_empty() {
        // Splicing the replacement between every character, per spec.
        let mut out = String::from(new.as_ref());
        for c in s.chars() {
            out.push(c);
            out.push_str(&new);
        }
        return Ok(Collection::singleton(Value::string(out)));
    }
    Ok(Collection::singleton(Value::string(
        s.replace(old.as_ref(), new.as_ref()),
    )))
}

pub fn matches(input: &Collection, pattern: &Collection) -> Result<Collection> {
    if pattern.is_empty() {
        return Ok(Collection::empty());
    }
    let s = input.as_string()?;
    let regex = compiled_regex(&pattern.as_string()?)?;
    Ok(Collection::singleton(Value::boolean(regex.is_match(&s))))
}

pub fn replace_matches(
    input: &Collection,
    pattern: &Collection,
    replacement: &Collection,
) -> Result<Collection> {
    if pattern.is_empty() || replacement.is_empty() {
        return Ok(Collection::empty());
    }
    let s = input.as_string()?;
    let regex = compiled_regex(&pattern.as_string()?)?;
    let replacement = replacement.as_string()?;
    let out = regex.replace_all(&s, replacement.as_ref()).into_owned();
    Ok(Collection::singleton(Value::string(out)))
}

pub fn length(input: &Collection) -> Result<Collection> {
    let s = input.as_string()?;
    Ok(Collection::singleton(Value::integer(
        s.chars().count() as i64
    )))
}

pub fn to_chars(input: &Collection) -> Result<Collection> {
    let s = input.as_string()?;
    Ok(s.chars().map(|c| Value::string(c.to_string())).collect())
}

pub fn trim(input: &Collection) -> Result<Collection> {
    let s = input.as_string()?;
    Ok(Collection::singleton(Value::string(s.trim())))
}

pub fn split(input: &Collection, separator: &Collection) -> Result<Collection> {
    if separator.is_empty() {
        return Ok(Collection::empty());
    }
    let s = input.as_string()?;
    let sep = separator.as_string()?;
    if sep.is_empty() {
        return to_chars(input);
    }
    Ok(s.split(sep.as_ref())
        .map(|part| Value::string(part.to_string()))
        .collect())
}

pub fn join(input: &Collection, separator: Option<&Collection>) -> Result<Collection> {
    let sep = match separator {
        Some(c) if !c.is_empty() => c.as_string()?.to_string(),
        _ => String::new(),
    };
    let mut parts = Vec::with_capacity(input.len());
    for item in input.iter() {
        let s = item.as_str_like().ok_or_else(|| {
            Error::Type(format!("join() requires strings, got {}", item.type_name()))
        })?;
        parts.push(s.to_string());
    }
    Ok(Collection::singleton(Value::string(parts.join(&sep))))
}

/// `encode(format)`: `base64`, `base64url`/`urlbase64`, `hex`.
pub fn encode(input: &Collection, format: &Collection) -> Result<Collection> {
    if format.is_empty() {
        return Ok(Collection::empty());
    }
    let s = input.as_string()?;
    let format = format.as_string()?;
    let out = match format.as_ref() {
        "base64" => STANDARD.encode(s.as_bytes()),
        "base64url" | "urlbase64" => URL_SAFE.encode(s.as_bytes()),
        "hex" => s.as_bytes().iter().map(|b| format!("{:02x}", b)).collect(),
        other => {
            return Err(Error::Domain(format!(
                "unsupported encoding '{}'",
                other
            )))
        }
    };
    Ok(Collection::singleton(Value::string(out)))
}

pub fn decode(input: &Collection, format: &Collection) -> Result<Collection> {
    if format.is_empty() {
        return Ok(Collection::empty());
    }
    let s = input.as_string()?;
    let format = format.as_string()?;
    let bytes = match format.as_ref() {
        "base64" => STANDARD
            .decode(s.as_bytes())
            .map_err(|e| Error::Domain(format!("invalid base64: {}", e)))?,
        "base64url" | "urlbase64" => URL_SAFE
            .decode(s.as_bytes())
            .map_err(|e| Error::Domain(format!("invalid base64url: {}", e)))?,
        "hex" => {
            if s.len() % 2 != 0 {
                return Err(Error::Domain(
                    "hex string must have an even number of digits".into(),
                ));
            }
            (0..s.len())
                .step_by(2)
                .map(|i| {
                    u8::from_str_radix(&s[i..i + 2], 16)
                        .map_err(|e| Error::Domain(format!("invalid hex: {}", e)))
                })
                .collect::<Result<Vec<u8>>>()?
        }
        other => {
            return Err(Error::Domain(format!(
                "unsupported encoding '{}'",
                other
            )))
        }
    };
    let out = String::from_utf8(bytes)
        .map_err(|_| Error::Domain("decoded bytes are not valid UTF-8".into()))?;
    Ok(Collection::singleton(Value::string(out)))
}
