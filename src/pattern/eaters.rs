/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

//! Argument eaters: REGEXP, RANGE and DATERANGE micro-grammars.
//!
//! Each `eat_*` function takes the tail of the input immediately after an
//! operator letter and returns how many bytes it consumed plus the parsed
//! value, so the compiler's cursor can be advanced in place.

use std::time::{SystemTime, UNIX_EPOCH};

use regex::RegexBuilder;

use super::ast::{DateMatch, RangeMatch, StringMatch, SENTINEL};
use super::error::{PatternError, Result};

/// Current time as a Unix timestamp. Kept as the single production-code
/// entry point to the wall clock so `dynamic` date windows and the `=`/`<`/
/// `>` relative forms can be recomputed; all the actual date arithmetic is
/// pure and takes `now_ts` explicitly, so tests can pin it.
pub fn now_ts() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Extracts one whitespace-delimited token, honoring double-quoted strings
/// and backslash escapes. Returns the unescaped token text
/// and the number of input bytes consumed.
pub fn eat_token(input: &str) -> Result<(String, usize)> {
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i] == b' ' {
        i += 1;
    }
    if i >= bytes.len() {
        return Err(PatternError::Compile("Empty expression".into()));
    }

    let mut out = String::new();
    if bytes[i] == b'"' {
        i += 1;
        loop {
            if i >= bytes.len() {
                return Err(PatternError::Compile("Unterminated quoted string".into()));
            }
            match bytes[i] {
                b'"' => {
                    i += 1;
                    break;
                }
                b'\\' if i + 1 < bytes.len() => {
                    out.push(bytes[i + 1] as char);
                    i += 2;
                }
                _ => {
                    let ch_len = utf8_char_len(bytes[i]);
                    out.push_str(&input[i..i + ch_len]);
                    i += ch_len;
                }
            }
        }
    } else {
        while i < bytes.len() {
            match bytes[i] {
                b' ' | b')' => break,
                b'\\' if i + 1 < bytes.len() => {
                    out.push(bytes[i + 1] as char);
                    i += 2;
                }
                _ => {
                    let ch_len = utf8_char_len(bytes[i]);
                    out.push_str(&input[i..i + ch_len]);
                    i += ch_len;
                }
            }
        }
    }

    if out.is_empty() {
        return Err(PatternError::Compile("Empty expression".into()));
    }
    Ok((out, i))
}

fn utf8_char_len(first_byte: u8) -> usize {
    if first_byte & 0x80 == 0 {
        1
    } else if first_byte & 0xE0 == 0xC0 {
        2
    } else if first_byte & 0xF0 == 0xE0 {
        3
    } else {
        4
    }
}

/// True iff `text` contains no ASCII uppercase byte, scanning the raw UTF-8
/// bytes rather than decoded codepoints.
pub fn literal_ign_case(text: &str) -> bool {
    !text.bytes().any(|b| b.is_ascii_uppercase())
}

/// REGEXP eater. `is_literal` corresponds to the `=` operator prefix,
/// `is_group` to `%`; otherwise the token is compiled as an extended regex.
pub fn eat_regexp(input: &str, is_literal: bool, is_group: bool) -> Result<(StringMatch, usize)> {
    let (token, consumed) = eat_token(input)?;
    let value = if is_literal {
        let ign_case = literal_ign_case(&token);
        StringMatch::Literal {
            text: token,
            ign_case,
        }
    } else if is_group {
        StringMatch::Group { name: token }
    } else {
        let ign_case = literal_ign_case(&token);
        let re = RegexBuilder::new(&token)
            .case_insensitive(ign_case)
            .multi_line(true)
            .build()
            .map_err(|e| PatternError::Compile(format!("Invalid regexp \"{token}\": {e}")))?;
        StringMatch::Regex {
            re: Box::new(re),
            source: token,
        }
    };
    Ok((value, consumed))
}

/// RANGE eater. Faithful to the `[<>]? N[KM]? (-N[KM]?)?` grammar,
/// including the exclusive-bound adjustment and the quote-tolerant wrapper
/// used when ranges are synthesized by the simple-search expansion.
pub fn eat_range(input: &str) -> Result<(RangeMatch, usize)> {
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i] == b' ' {
        i += 1;
    }
    let skip_quote = i < bytes.len() && bytes[i] == b'"';
    if skip_quote {
        i += 1;
    }

    let exclusive_upper = i < bytes.len() && bytes[i] == b'<';
    let mut min = 0i64;
    let mut max;

    if bytes.get(i) != Some(&b'-') && bytes.get(i) != Some(&b'<') {
        if bytes.get(i) == Some(&b'>') {
            i += 1;
            let (value, consumed) = parse_num_suffix(&input[i..])?;
            i += consumed;
            let range = RangeMatch {
                min: value + 1,
                max: SENTINEL,
            };
            i = skip_trailing_quote(input, i, skip_quote);
            return Ok((range, i));
        }
        let (value, consumed) = parse_num_suffix(&input[i..])?;
        i += consumed;
        min = value;

        if bytes.get(i) != Some(&b'-') {
            let range = RangeMatch { min, max: min };
            i = skip_trailing_quote(input, i, skip_quote);
            return Ok((range, i));
        }
        i += 1;
    } else {
        i += 1;
    }

    if i < bytes.len() && bytes[i].is_ascii_digit() {
        let (value, consumed) = parse_num_suffix(&input[i..])?;
        i += consumed;
        max = value;
    } else {
        max = SENTINEL;
    }
    if exclusive_upper {
        max -= 1;
    }

    i = skip_trailing_quote(input, i, skip_quote);
    Ok((RangeMatch { min, max }, i))
}

fn skip_trailing_quote(input: &str, mut i: usize, skip_quote: bool) -> usize {
    let bytes = input.as_bytes();
    if skip_quote && bytes.get(i) == Some(&b'"') {
        i += 1;
    }
    while bytes.get(i) == Some(&b' ') {
        i += 1;
    }
    i
}

fn parse_num_suffix(input: &str) -> Result<(i64, usize)> {
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == 0 {
        return Err(PatternError::Compile(format!(
            "Invalid number: {input}"
        )));
    }
    let mut value: i64 = input[..i].parse().map_err(|_| {
        PatternError::Compile(format!("Number out of range: {}", &input[..i]))
    })?;
    match bytes.get(i).map(|b| b.to_ascii_uppercase()) {
        Some(b'K') => {
            value *= 1024;
            i += 1;
        }
        Some(b'M') => {
            value *= 1024 * 1024;
            i += 1;
        }
        _ => {}
    }
    Ok((value, i))
}

const SECS_PER_MIN: i64 = 60;
const SECS_PER_HOUR: i64 = 3600;
const SECS_PER_DAY: i64 = 86400;

fn is_leap_year(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: i64, month: i64) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 30,
    }
}

fn start_of_day(ts: i64) -> i64 {
    let dt = crate::DateTime::from_timestamp(ts);
    crate::DateTime {
        hour: 0,
        minute: 0,
        second: 0,
        ..dt
    }
    .to_timestamp()
}

fn end_of_day(ts: i64) -> i64 {
    let dt = crate::DateTime::from_timestamp(ts);
    crate::DateTime {
        hour: 23,
        minute: 59,
        second: 59,
        ..dt
    }
    .to_timestamp()
}

/// Adds (or subtracts, for negative `n`) `n` months to `ts`, clamping the
/// day of month if it would overflow the target month (e.g. Jan 31 - 1mo
/// lands on Feb 28/29).
fn add_months(ts: i64, n: i64) -> i64 {
    let dt = crate::DateTime::from_timestamp(ts);
    let total = dt.year as i64 * 12 + (dt.month as i64 - 1) + n;
    let year = total.div_euclid(12);
    let month = total.rem_euclid(12) + 1;
    let day = (dt.day).min(days_in_month(year, month));
    crate::DateTime {
        year: year as u16,
        month: month as u8,
        day,
        ..dt
    }
    .to_timestamp()
}

/// Unit letters accepted by DATERANGE: `y m w d H M S`.
fn unit_seconds_or_months(n: i64, unit: u8) -> UnitDelta {
    match unit {
        b'S' => UnitDelta::Seconds(n),
        b'M' => UnitDelta::Seconds(n * SECS_PER_MIN),
        b'H' => UnitDelta::Seconds(n * SECS_PER_HOUR),
        b'd' => UnitDelta::Seconds(n * SECS_PER_DAY),
        b'w' => UnitDelta::Seconds(n * 7 * SECS_PER_DAY),
        b'm' => UnitDelta::Months(n),
        b'y' => UnitDelta::Months(n * 12),
        _ => UnitDelta::Seconds(0),
    }
}

enum UnitDelta {
    Seconds(i64),
    Months(i64),
}

impl UnitDelta {
    fn apply(&self, ts: i64) -> i64 {
        match self {
            UnitDelta::Seconds(s) => ts - s,
            UnitDelta::Months(m) => add_months(ts, -m),
        }
    }
}

fn is_hms_unit(unit: u8) -> bool {
    matches!(unit, b'H' | b'M' | b'S')
}

/// Parses a `+N{unit}`/`-N{unit}`/`*N{unit}` offset tail, returning the
/// delta applier and bytes consumed, or `None` if `input` doesn't start
/// with a digit (no offset present).
fn parse_offset(input: &str) -> Option<(UnitDelta, u8, usize)> {
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == 0 {
        return None;
    }
    let n: i64 = input[..i].parse().ok()?;
    let unit = *bytes.get(i)?;
    i += 1;
    Some((unit_seconds_or_months(n, unit), unit, i))
}

/// Parses an absolute date: ISO 8601 `YYYYMMDD` (eight digits) or
/// `D[/M[/Y]]`, missing parts defaulting to today's month/year.
/// Returns the parsed calendar fields (as a start-of-day timestamp) and
/// bytes consumed.
fn parse_absolute_date(input: &str, now_ts: i64) -> Result<(i64, usize)> {
    let bytes = input.as_bytes();
    let is_iso8601 = bytes.len() >= 8 && bytes[..8].iter().all(u8::is_ascii_digit);

    if is_iso8601 {
        let year: i64 = input[0..4].parse().unwrap();
        let month: i64 = input[4..6].parse().unwrap();
        let day: i64 = input[6..8].parse().unwrap();
        if !(1..=31).contains(&day) {
            return Err(PatternError::Compile(format!("Invalid day of month: {input}")));
        }
        if !(1..=12).contains(&month) {
            return Err(PatternError::Compile(format!("Invalid month: {input}")));
        }
        let ts = crate::DateTime {
            year: year as u16,
            month: month as u8,
            day: day as u8,
            hour: 0,
            minute: 0,
            second: 0,
            tz_before_gmt: false,
            tz_hour: 0,
            tz_minute: 0,
        }
        .to_timestamp();
        return Ok((ts, 8));
    }

    let today = crate::DateTime::from_timestamp(now_ts);
    let mut i = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == 0 {
        return Err(PatternError::Compile(format!("Invalid date: {input}")));
    }
    let day: i64 = input[..i].parse().unwrap();
    if !(1..=31).contains(&day) {
        return Err(PatternError::Compile(format!("Invalid day of month: {input}")));
    }

    let mut month = today.month as i64;
    let mut year = today.year as i64;

    if bytes.get(i) == Some(&b'/') {
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == start {
            return Err(PatternError::Compile(format!("Invalid month: {input}")));
        }
        month = input[start..i].parse().unwrap();
        if !(1..=12).contains(&month) {
            return Err(PatternError::Compile(format!("Invalid month: {input}")));
        }

        if bytes.get(i) == Some(&b'/') {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i == start {
                return Err(PatternError::Compile(format!("Invalid year: {input}")));
            }
            let mut y: i64 = input[start..i].parse().unwrap();
            if y < 70 {
                y += 2000;
            } else if y < 100 {
                y += 1900;
            }
            year = y;
        }
    }

    let ts = crate::DateTime {
        year: year as u16,
        month: month as u8,
        day: day as u8,
        hour: 0,
        minute: 0,
        second: 0,
        tz_before_gmt: false,
        tz_hour: 0,
        tz_minute: 0,
    }
    .to_timestamp();
    Ok((ts, i))
}

/// DATERANGE eater. Returns the absolute `(min, max)` window and
/// bytes consumed; `now_ts` is threaded through explicitly so `dynamic`
/// nodes can recompute deterministically.
pub fn eat_daterange(input: &str, now_ts: i64) -> Result<(DateMatch, usize)> {
    let (token, consumed) = eat_token(input)?;
    let (min, max) = parse_daterange_text(&token, now_ts)?;
    Ok((
        DateMatch {
            min,
            max,
            source: token,
        },
        consumed,
    ))
}

/// Recomputes the window for a previously-eaten DATERANGE source string
/// against a (possibly new) `now_ts`, for `dynamic` nodes.
pub fn parse_daterange_text(token: &str, now_ts: i64) -> Result<(i64, i64)> {
    let bytes = token.as_bytes();
    if bytes.is_empty() {
        return Err(PatternError::Compile("Empty expression".into()));
    }

    match bytes[0] {
        b'<' | b'>' | b'=' => {
            let rest = &token[1..];
            let (n, unit_consumed) = {
                let mut j = 0;
                while j < rest.as_bytes().len() && rest.as_bytes()[j].is_ascii_digit() {
                    j += 1;
                }
                if j == 0 {
                    return Err(PatternError::Compile(format!("Invalid relative date: {token}")));
                }
                (rest[..j].parse::<i64>().unwrap(), j)
            };
            let unit = *rest.as_bytes().get(unit_consumed).ok_or_else(|| {
                PatternError::Compile(format!("Invalid relative date: {token}"))
            })?;
            let delta = unit_seconds_or_months(n, unit);
            let hms = is_hms_unit(unit);
            let reference = delta.apply(now_ts);

            Ok(match bytes[0] {
                b'<' => {
                    let min = if hms { reference } else { start_of_day(reference) };
                    let max = if hms { now_ts } else { end_of_day(now_ts) };
                    (min, max)
                }
                b'>' => {
                    let max = if hms { reference } else { end_of_day(reference) };
                    (0, max)
                }
                _ => {
                    if hms {
                        (reference, reference)
                    } else {
                        (start_of_day(reference), end_of_day(reference))
                    }
                }
            })
        }
        _ => {
            let (date1, i) = parse_absolute_date(token, now_ts)?;
            let mut min = date1;
            let mut max = end_of_day(date1);

            let rest = &token[i..];
            if let Some(tail) = rest.strip_prefix('-') {
                if tail.trim().is_empty() {
                    max = now_ts;
                } else if let Ok((date2, _consumed2)) = parse_absolute_date(tail, now_ts) {
                    max = end_of_day(date2);
                } else if let Some((delta, _unit, _consumed2)) = parse_offset(tail) {
                    min = delta.apply(date1);
                } else {
                    return Err(PatternError::Compile(format!("Invalid relative date: {token}")));
                }
            } else if let Some(tail) = rest.strip_prefix('+') {
                if let Some((delta, unit, _consumed2)) = parse_offset(tail) {
                    let extended = match delta {
                        UnitDelta::Seconds(s) => end_of_day(date1) + s,
                        UnitDelta::Months(_) => add_months(end_of_day(date1), unit_months(unit, tail)),
                    };
                    max = extended;
                } else {
                    return Err(PatternError::Compile(format!("Invalid relative date: {token}")));
                }
            } else if let Some(tail) = rest.strip_prefix('*') {
                if let Some((delta, _unit, _consumed2)) = parse_offset(tail) {
                    min = delta.apply(date1);
                    max = negate_delta_apply(&delta, end_of_day(date1));
                } else {
                    return Err(PatternError::Compile(format!("Invalid relative date: {token}")));
                }
            }

            if min > max {
                std::mem::swap(&mut min, &mut max);
                min = start_of_day(min);
                max = end_of_day(max);
            }
            Ok((min, max))
        }
    }
}

fn unit_months(unit: u8, tail: &str) -> i64 {
    let mut j = 0;
    let bytes = tail.as_bytes();
    while j < bytes.len() && bytes[j].is_ascii_digit() {
        j += 1;
    }
    let n: i64 = tail[..j].parse().unwrap_or(0);
    match unit {
        b'm' => n,
        b'y' => n * 12,
        _ => 0,
    }
}

fn negate_delta_apply(delta: &UnitDelta, ts: i64) -> i64 {
    match delta {
        UnitDelta::Seconds(s) => ts + s,
        UnitDelta::Months(m) => add_months(ts, *m),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_single_with_suffix() {
        let (r, _) = eat_range("1K").unwrap();
        assert_eq!((r.min, r.max), (1024, 1024));
    }

    #[test]
    fn range_bounds_with_suffix() {
        let (r, _) = eat_range("1M-2M").unwrap();
        assert_eq!((r.min, r.max), (1048576, 2097152));
    }

    #[test]
    fn range_exclusive_lower() {
        let (r, _) = eat_range(">5").unwrap();
        assert_eq!((r.min, r.max), (6, SENTINEL));
    }

    #[test]
    fn range_exclusive_upper() {
        let (r, _) = eat_range("<5").unwrap();
        assert_eq!((r.min, r.max), (0, 4));
    }

    #[test]
    fn range_trailing_dash_unbounded_max() {
        let (r, _) = eat_range("5-").unwrap();
        assert_eq!((r.min, r.max), (5, SENTINEL));
    }

    fn ts(y: u16, m: u8, d: u8, h: u8, mi: u8, s: u8) -> i64 {
        crate::DateTime {
            year: y,
            month: m,
            day: d,
            hour: h,
            minute: mi,
            second: s,
            tz_before_gmt: false,
            tz_hour: 0,
            tz_minute: 0,
        }
        .to_timestamp()
    }

    fn fixed_now() -> i64 {
        ts(2020, 6, 15, 12, 0, 0)
    }

    #[test]
    fn daterange_last_3_days() {
        let (min, max) = parse_daterange_text("<3d", fixed_now()).unwrap();
        assert_eq!(min, ts(2020, 6, 12, 0, 0, 0));
        assert_eq!(max, ts(2020, 6, 15, 23, 59, 59));
    }

    #[test]
    fn daterange_exact_3_days_ago() {
        let (min, max) = parse_daterange_text("=3d", fixed_now()).unwrap();
        assert_eq!(min, ts(2020, 6, 12, 0, 0, 0));
        assert_eq!(max, ts(2020, 6, 12, 23, 59, 59));
    }

    #[test]
    fn daterange_absolute_range() {
        let (min, max) = parse_daterange_text("20200101-20200131", fixed_now()).unwrap();
        assert_eq!(min, ts(2020, 1, 1, 0, 0, 0));
        assert_eq!(max, ts(2020, 1, 31, 23, 59, 59));
    }

    #[test]
    fn daterange_trailing_dash_until_now() {
        let (min, max) = parse_daterange_text("20200201-", fixed_now()).unwrap();
        assert_eq!(min, ts(2020, 2, 1, 0, 0, 0));
        assert_eq!(max, fixed_now());
    }

    #[test]
    fn daterange_widen_both_sides() {
        let (min, max) = parse_daterange_text("20200201*1w", fixed_now()).unwrap();
        assert_eq!(min, ts(2020, 1, 25, 0, 0, 0));
        assert_eq!(max, ts(2020, 2, 8, 23, 59, 59));
    }
}
