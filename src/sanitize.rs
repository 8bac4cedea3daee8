//! Storage-safe object keys from user supplied file names.

use std::sync::atomic::{AtomicU64, Ordering};

/// Longest key the drive will store.
pub const MAX_KEY_LEN: usize = 200;

const DASH_VARIANTS: [char; 4] = ['\u{2010}', '\u{2011}', '\u{2013}', '\u{2014}'];

static LAST_FALLBACK: AtomicU64 = AtomicU64::new(0);

/// Maps an arbitrary file name to a key made of `[A-Za-z0-9_.-]`.
///
/// - Every other character becomes `-`, runs of `-` collapse to one
/// - No leading or trailing `-`, no leading `.`
/// - At most [`MAX_KEY_LEN`] characters, keeping the extension whole
/// - Falls back to `file_<millis>` when nothing survives
pub fn sanitize_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if DASH_VARIANTS.contains(&c) { '-' } else { c };
        let c = if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
            c
        } else {
            '-'
        };
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }

    let key = trim_edges(&out);
    let key = if key.len() > MAX_KEY_LEN {
        truncate_keeping_extension(key)
    } else {
        key.to_string()
    };

    if key.is_empty() {
        fallback_name()
    } else {
        key
    }
}

fn trim_edges(s: &str) -> &str {
    let mut s = s.trim_matches('-');
    while let Some(rest) = s.strip_prefix('.') {
        s = rest.trim_matches('-');
    }
    s
}

// Input is ASCII here, so byte offsets are char boundaries.
fn truncate_keeping_extension(key: &str) -> String {
    match key.rfind('.') {
        Some(dot) if key.len() - dot < MAX_KEY_LEN => {
            let ext = &key[dot..];
            let name = &key[..MAX_KEY_LEN - ext.len()];
            format!("{name}{ext}")
        }
        _ => key[..MAX_KEY_LEN].trim_end_matches('-').to_string(),
    }
}

/// Unique `file_<token>` name, the token being epoch milliseconds bumped
/// past the previous fallback handed out by this process.
pub fn fallback_name() -> String {
    let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let mut prev = LAST_FALLBACK.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST_FALLBACK.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => return format!("file_{next}"),
            Err(actual) => prev = actual,
        }
    }
}

/// True when `key` could have come out of [`sanitize_file_name`].
pub fn is_sanitized(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
        && !key.contains("--")
        && !key.starts_with('-')
        && !key.ends_with('-')
        && !key.starts_with('.')
}
