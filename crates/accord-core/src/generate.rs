//! Value generation for `Generated` kinds and regex descriptors.
//!
//! Every entry point takes the caller's RNG; request handlers pass `rand::rng()`, which is
//! thread-local, so concurrent stub requests never share generator state.

use accord_contracts::GeneratedKind;
use chrono::{Duration, FixedOffset, NaiveDate, SecondsFormat, TimeZone};
use rand::seq::IndexedRandom;
use rand::Rng;
use regex::Regex;
use regex_syntax::hir::{Class, Hir, HirKind};
use serde_json::{Number, Value};

/// Extra iterations allowed for `*` / `+` / `{n,}`.
const UNBOUNDED_EXTRA: u32 = 8;
const ATTEMPTS: usize = 16;

const ALPHA: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const ALNUM: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const HEX: &[u8] = b"0123456789abcdef";

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GenerateError {
    #[error("invalid regex `{pattern}`: {reason}")]
    InvalidRegex { pattern: String, reason: String },
    #[error("no value matching `{0}` found after {ATTEMPTS} attempts")]
    Exhausted(String),
}

/// Produces a string fully matching `pattern`.
pub fn sample_regex<R: Rng + ?Sized>(pattern: &str, rng: &mut R) -> Result<String, GenerateError> {
    let invalid = |reason: String| GenerateError::InvalidRegex {
        pattern: pattern.to_string(),
        reason,
    };
    let hir = regex_syntax::Parser::new()
        .parse(pattern)
        .map_err(|err| invalid(err.to_string()))?;
    let check = Regex::new(&format!("^(?:{pattern})$")).map_err(|err| invalid(err.to_string()))?;
    for _ in 0..ATTEMPTS {
        let mut out = String::new();
        emit(&hir, rng, &mut out);
        if check.is_match(&out) {
            return Ok(out);
        }
    }
    Err(GenerateError::Exhausted(pattern.to_string()))
}

fn emit<R: Rng + ?Sized>(hir: &Hir, rng: &mut R, out: &mut String) {
    match hir.kind() {
        HirKind::Empty | HirKind::Look(_) => {}
        HirKind::Literal(literal) => out.push_str(&String::from_utf8_lossy(&literal.0)),
        HirKind::Class(Class::Unicode(class)) => {
            let ranges: Vec<(u32, u32)> = class
                .ranges()
                .iter()
                .map(|r| (r.start() as u32, r.end() as u32))
                .collect();
            if let Some(c) = pick_char(&ranges, rng) {
                out.push(c);
            }
        }
        HirKind::Class(Class::Bytes(class)) => {
            let ranges: Vec<(u32, u32)> = class
                .ranges()
                .iter()
                .map(|r| (r.start() as u32, r.end().min(0x7F) as u32))
                .filter(|(start, end)| start <= end)
                .collect();
            if let Some(c) = pick_char(&ranges, rng) {
                out.push(c);
            }
        }
        HirKind::Repetition(rep) => {
            let upper = rep
                .max
                .unwrap_or_else(|| rep.min.saturating_add(UNBOUNDED_EXTRA))
                .max(rep.min);
            let count = rng.random_range(rep.min..=upper);
            for _ in 0..count {
                emit(&rep.sub, rng, out);
            }
        }
        HirKind::Capture(capture) => emit(&capture.sub, rng, out),
        HirKind::Concat(items) => {
            for item in items {
                emit(item, rng, out);
            }
        }
        HirKind::Alternation(items) => {
            if let Some(item) = items.choose(rng) {
                emit(item, rng, out);
            }
        }
    }
}

/// Picks a char from the class, preferring printable ASCII when the class allows it.
fn pick_char<R: Rng + ?Sized>(ranges: &[(u32, u32)], rng: &mut R) -> Option<char> {
    let printable: Vec<(u32, u32)> = ranges
        .iter()
        .filter_map(|&(start, end)| {
            let (lo, hi) = (start.max(0x20), end.min(0x7E));
            (lo <= hi).then_some((lo, hi))
        })
        .collect();
    let pool = if printable.is_empty() { ranges } else { &printable[..] };
    let total: u64 = pool.iter().map(|(s, e)| u64::from(e - s) + 1).sum();
    if total == 0 {
        return None;
    }
    let mut offset = rng.random_range(0..total);
    for &(start, end) in pool {
        let width = u64::from(end - start) + 1;
        if offset < width {
            let code = start + offset as u32;
            return char::from_u32(code).or_else(|| char::from_u32(start));
        }
        offset -= width;
    }
    None
}

fn pick_from<R: Rng + ?Sized>(alphabet: &[u8], len: usize, rng: &mut R) -> String {
    (0..len)
        .map(|_| *alphabet.choose(rng).unwrap_or(&b'x') as char)
        .collect()
}

/// Produces a fresh value satisfying `kind`; re-invocation may differ.
pub fn generate_kind<R: Rng + ?Sized>(kind: GeneratedKind, rng: &mut R) -> Value {
    match kind {
        GeneratedKind::AlphaUnicode => {
            Value::String(pick_from(ALPHA, rng.random_range(5..=12), rng))
        }
        GeneratedKind::AlphaNumeric
        | GeneratedKind::NonBlankString
        | GeneratedKind::NonEmptyString => {
            Value::String(pick_from(ALNUM, rng.random_range(5..=16), rng))
        }
        GeneratedKind::Number => {
            if rng.random_bool(0.5) {
                Value::from(rng.random_range(0..100_000_i64))
            } else {
                random_double(rng)
            }
        }
        GeneratedKind::Integer => Value::from(rng.random_range(-100_000..=100_000_i64)),
        GeneratedKind::PositiveInt => Value::from(rng.random_range(1..=100_000_i64)),
        GeneratedKind::Double => random_double(rng),
        GeneratedKind::Hex => Value::String(pick_from(HEX, rng.random_range(8..=16), rng)),
        GeneratedKind::Boolean => Value::Bool(rng.random_bool(0.5)),
        GeneratedKind::Uuid => Value::String(uuid::Uuid::new_v4().to_string()),
        GeneratedKind::Email => Value::String(format!(
            "{}@{}.com",
            pick_from(ALNUM, rng.random_range(4..=10), rng).to_lowercase(),
            pick_from(ALPHA, rng.random_range(4..=10), rng).to_lowercase()
        )),
        GeneratedKind::Url | GeneratedKind::HttpsUrl => {
            let scheme = if kind == GeneratedKind::HttpsUrl || rng.random_bool(0.5) {
                "https"
            } else {
                "http"
            };
            Value::String(format!(
                "{scheme}://{}.com/{}",
                pick_from(ALPHA, rng.random_range(4..=10), rng).to_lowercase(),
                pick_from(ALNUM, rng.random_range(3..=8), rng)
            ))
        }
        GeneratedKind::IpAddress => Value::String(format!(
            "{}.{}.{}.{}",
            rng.random_range(1..=254_u8),
            rng.random_range(0..=255_u8),
            rng.random_range(0..=255_u8),
            rng.random_range(1..=254_u8)
        )),
        GeneratedKind::Hostname => Value::String(format!(
            "{}.example.com",
            pick_from(ALPHA, rng.random_range(4..=10), rng).to_lowercase()
        )),
        GeneratedKind::Date => Value::String(random_date(rng).format("%Y-%m-%d").to_string()),
        GeneratedKind::DateTime => Value::String(
            random_datetime(rng)
                .format("%Y-%m-%dT%H:%M:%S")
                .to_string(),
        ),
        GeneratedKind::Time => {
            Value::String(random_datetime(rng).format("%H:%M:%S").to_string())
        }
        GeneratedKind::Iso8601WithOffset => {
            let hours = rng.random_range(-11..=11);
            let offset = FixedOffset::east_opt(hours * 3600)
                .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset"));
            let stamp = offset.from_utc_datetime(&random_datetime(rng));
            Value::String(stamp.to_rfc3339_opts(SecondsFormat::Millis, true))
        }
    }
}

fn random_double<R: Rng + ?Sized>(rng: &mut R) -> Value {
    let whole = rng.random_range(0..10_000) as f64;
    let cents = rng.random_range(1..100) as f64 / 100.0;
    Number::from_f64(whole + cents)
        .map(Value::Number)
        .unwrap_or_else(|| Value::from(0.5))
}

fn random_date<R: Rng + ?Sized>(rng: &mut R) -> NaiveDate {
    let base = NaiveDate::from_ymd_opt(2000, 1, 1).expect("valid base date");
    base + Duration::days(rng.random_range(0..11_000))
}

fn random_datetime<R: Rng + ?Sized>(rng: &mut R) -> chrono::NaiveDateTime {
    let date = random_date(rng);
    date.and_hms_opt(
        rng.random_range(0..24),
        rng.random_range(0..60),
        rng.random_range(0..60),
    )
    .unwrap_or_else(|| date.and_hms_opt(0, 0, 0).expect("midnight"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn regex_samples_satisfy_their_pattern() {
        let mut rng = rand::rng();
        for pattern in ["[2-9][0-9]", r"\d{3}-[A-Z]{2}", "(foo|bar)+baz?", r"[^\s]{4}"] {
            let check = Regex::new(&format!("^(?:{pattern})$")).unwrap();
            for _ in 0..20 {
                let sample = sample_regex(pattern, &mut rng).unwrap();
                assert!(check.is_match(&sample), "{sample} !~ {pattern}");
            }
        }
    }

    #[test]
    fn invalid_regex_is_reported() {
        let err = sample_regex("([a-z", &mut rand::rng()).unwrap_err();
        assert!(matches!(err, GenerateError::InvalidRegex { .. }));
    }

    #[test]
    fn every_kind_generates_an_accepted_value() {
        let mut rng = rand::rng();
        for kind in GeneratedKind::ALL {
            for _ in 0..25 {
                let value = generate_kind(kind, &mut rng);
                assert!(kind.accepts_json(&value), "{kind} rejected {value}");
            }
        }
    }

    proptest! {
        #[test]
        fn bounded_repetitions_stay_in_bounds(min in 0u32..4, extra in 0u32..4) {
            let pattern = format!("a{{{},{}}}", min, min + extra);
            let sample = sample_regex(&pattern, &mut rand::rng()).unwrap();
            prop_assert!(sample.len() as u32 >= min);
            prop_assert!(sample.len() as u32 <= min + extra);
        }
    }
}
