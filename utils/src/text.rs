//! Function-variable interpolation for text-oriented processors and
//! outputs.
//!
//! The grammar is `${!name}` or `${!name:arg}` where `name` matches
//! `[a-z_]+` and `arg` matches `[^}]+`. Any other `$`, `{`, `}` sequence is
//! literal, and a well-formed reference with an unrecognised name is left
//! untouched.

use std::collections::BTreeMap;

use chrono::Utc;
use common::Message;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::bytes::{Captures, Regex};

static FUNCTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{!([a-z_]+)(?::([^}]+))?\}").expect("function variable pattern"));

/// Per-key counters backing `${!count:key}`. Process-global so repeated
/// expansions are monotonic across components.
static COUNTERS: Lazy<DashMap<String, u64>> = Lazy::new(DashMap::new);

/// Returns `true` iff `input` contains at least one well-formed function
/// reference. Purely syntactic: the name does not have to be recognised.
pub fn contains_function_variables(input: &[u8]) -> bool {
    FUNCTION_RE.is_match(input)
}

/// Expands every recognised function reference in `input`. `msg` supplies
/// the payload for the `metadata` and `json_field` functions; pass `None`
/// for message-independent expansion.
pub fn replace_function_variables(msg: Option<&Message>, input: &[u8]) -> Vec<u8> {
    FUNCTION_RE
        .replace_all(input, |caps: &Captures<'_>| -> Vec<u8> {
            let name = match std::str::from_utf8(&caps[1]) {
                Ok(name) => name,
                Err(_) => return caps[0].to_vec(),
            };
            let arg = caps.get(2).map(|m| m.as_bytes());
            resolve_function(msg, name, arg).unwrap_or_else(|| caps[0].to_vec())
        })
        .into_owned()
}

fn resolve_function(msg: Option<&Message>, name: &str, arg: Option<&[u8]>) -> Option<Vec<u8>> {
    match name {
        "hostname" => Some(
            crate::device_info::hostname()
                .unwrap_or_default()
                .into_bytes(),
        ),
        "timestamp_unix" => {
            let now = Utc::now();
            let places = arg
                .and_then(|a| std::str::from_utf8(a).ok())
                .and_then(|a| a.parse::<usize>().ok());
            Some(match places {
                Some(places) => {
                    let seconds =
                        now.timestamp() as f64 + f64::from(now.timestamp_subsec_nanos()) / 1e9;
                    format!("{seconds:.places$}").into_bytes()
                }
                None => now.timestamp().to_string().into_bytes(),
            })
        }
        "timestamp_unix_nano" => Some(
            Utc::now()
                .timestamp_nanos_opt()
                .unwrap_or_default()
                .to_string()
                .into_bytes(),
        ),
        "timestamp" => Some(
            Utc::now()
                .format("%a %b %-d %H:%M:%S +0000 UTC %Y")
                .to_string()
                .into_bytes(),
        ),
        "echo" => Some(arg.map(<[u8]>::to_vec).unwrap_or_default()),
        "count" => {
            let key = String::from_utf8_lossy(arg.unwrap_or_default()).into_owned();
            let mut entry = COUNTERS.entry(key).or_insert(0);
            *entry += 1;
            Some((*entry).to_string().into_bytes())
        }
        "metadata" => Some(match arg {
            Some(key) => {
                let key = String::from_utf8_lossy(key);
                msg.and_then(|m| m.metadata(&key))
                    .map(|v| v.as_bytes().to_vec())
                    .unwrap_or_default()
            }
            None => msg.map(Message::metadata_json).unwrap_or_else(|| {
                serde_json::to_vec(&BTreeMap::<&str, &str>::new()).unwrap_or_default()
            }),
        }),
        "json_field" => Some(json_field(msg, arg.unwrap_or_default())),
        _ => None,
    }
}

/// Resolves `path` or `path,index` against the JSON-parsed message part at
/// `index` (default 0). Compound subtrees render as literal JSON, scalars as
/// their raw form, anything missing or unparseable as `null`.
fn json_field(msg: Option<&Message>, arg: &[u8]) -> Vec<u8> {
    let arg = String::from_utf8_lossy(arg);
    let mut split = arg.split(',');
    let path = split.next().unwrap_or_default();
    let part_index = split
        .next()
        .and_then(|idx| idx.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let Some(part) = msg.and_then(|m| m.get(part_index)) else {
        return b"null".to_vec();
    };
    let Ok(mut value) = serde_json::from_slice::<serde_json::Value>(part) else {
        return b"null".to_vec();
    };
    for segment in path.split('.') {
        match value.get_mut(segment) {
            Some(child) => value = child.take(),
            None => return b"null".to_vec(),
        }
    }
    match value {
        serde_json::Value::String(s) => s.into_bytes(),
        other => other.to_string().into_bytes(),
    }
}
