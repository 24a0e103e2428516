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

//! The message text scanner: streams a message's header/body text and
//! runs a node's textual predicate line by line, in one of two modes:
//!
//! - *raw*: scan the on-disk bytes directly, with RFC 822 unfolding for
//!   headers but no MIME/charset decoding.
//! - *thorough*: decode RFC 2047 header words and MIME body text first
//!   (spilling to a temp file, mirroring the source's approach of writing a
//!   scratch copy before scanning it), then scan the decoded text.
//!
//! Both modes honor a cumulative byte budget so an unbounded body can't make
//! one scan run forever; the budget is decremented by the
//! *stripped* line length, not the original line-plus-newline length, so a
//! pathological file can exhaust the budget one line early. That quirk is
//! preserved rather than fixed.

use std::convert::TryInto;
use std::io::{Read, Seek, SeekFrom, Write};

use super::ast::{Op, Payload, PatternNode, StringMatch};
use super::error::Result;
use super::store::{GroupRegistry, PatternConfig};

/// Scans `raw` (a complete on-disk message) for `node`'s textual predicate.
/// `node.op` must be `BODY`, `HEADER`, or `WHOLE_MSG`.
pub fn scan(
    node: &PatternNode,
    raw: &[u8],
    groups: &dyn GroupRegistry,
    config: &PatternConfig,
) -> Result<bool> {
    let sm = match &node.payload {
        Payload::String(s) => s,
        _ => return Ok(false),
    };
    let want_header = matches!(node.op, Op::Header | Op::WholeMsg);
    let want_body = matches!(node.op, Op::Body | Op::WholeMsg);
    let mut budget = config.scan_byte_budget;

    if config.thorough {
        scan_thorough(raw, want_header, want_body, sm, groups, &mut budget)
    } else {
        scan_raw(raw, want_header, want_body, sm, groups, &mut budget)
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Splits `raw` into header bytes (including the blank line) and body bytes,
/// by locating the first blank line. A message with no blank line at all is
/// treated as all-header, no body.
fn split_header_body(raw: &[u8]) -> (&[u8], &[u8]) {
    if let Some(pos) = find_subsequence(raw, b"\r\n\r\n") {
        (&raw[..pos + 2], &raw[pos + 4..])
    } else if let Some(pos) = find_subsequence(raw, b"\n\n") {
        (&raw[..pos + 1], &raw[pos + 2..])
    } else {
        (raw, &[])
    }
}

/// RFC 822 line unfolding: a continuation line beginning with whitespace is
/// joined onto the previous logical line with a single space.
fn unfolded_lines(data: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(data);
    let mut lines: Vec<String> = Vec::new();
    for raw_line in text.split('\n') {
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        if (line.starts_with(' ') || line.starts_with('\t')) && !lines.is_empty() {
            let last = lines.last_mut().unwrap();
            last.push(' ');
            last.push_str(line.trim_start());
        } else if !line.is_empty() || lines.is_empty() {
            lines.push(line.to_string());
        }
    }
    lines
}

fn plain_lines(data: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(data)
        .lines()
        .map(str::to_string)
        .collect()
}

/// Tests `lines` one at a time against `sm`, consuming `budget` as it goes
/// and stopping (without matching) once it is exhausted.
fn scan_lines(lines: &[String], sm: &StringMatch, groups: &dyn GroupRegistry, budget: &mut usize) -> bool {
    for line in lines {
        if *budget == 0 {
            break;
        }
        if sm.is_match(line, groups) {
            return true;
        }
        *budget = budget.saturating_sub(line.len());
    }
    false
}

fn scan_raw(
    raw: &[u8],
    want_header: bool,
    want_body: bool,
    sm: &StringMatch,
    groups: &dyn GroupRegistry,
    budget: &mut usize,
) -> Result<bool> {
    let (header_bytes, body_bytes) = split_header_body(raw);
    if want_header && scan_lines(&unfolded_lines(header_bytes), sm, groups, budget) {
        return Ok(true);
    }
    if want_body && scan_lines(&plain_lines(body_bytes), sm, groups, budget) {
        return Ok(true);
    }
    Ok(false)
}

/// Decodes `=?charset?enc?data?=` runs inside a header value using the same
/// state machine the unstructured-field parser uses while reading a live
/// message, applied here to an already-extracted header string.
pub(crate) fn decode_rfc2047_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'=' && bytes.get(i + 1) == Some(&b'?') {
            let mut stream = crate::parsers::MessageStream::new(&bytes[i + 2..]);
            if let Some(decoded) = stream.decode_rfc2047() {
                out.push_str(&decoded);
                i += 2 + stream.offset();
                continue;
            }
        }
        let ch = input[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

fn scan_thorough(
    raw: &[u8],
    want_header: bool,
    want_body: bool,
    sm: &StringMatch,
    groups: &dyn GroupRegistry,
    budget: &mut usize,
) -> Result<bool> {
    let mut tmp = tempfile::tempfile()?;

    if want_header {
        let message: Result<crate::Message> = raw.try_into().map_err(|_| {
            super::error::PatternError::Compile("failed to parse message headers".into())
        }).or_else(|_| {
            // Fall back to a degenerate empty message rather than failing
            // the whole scan outright; the raw split below still works.
            Err(super::error::PatternError::Compile("unparsable message".into()))
        });
        if let Ok(message) = message {
            for (name, value) in message.get_headers_raw() {
                let unfolded = value.replace("\r\n", "").replace('\n', "");
                let decoded = decode_rfc2047_text(unfolded.trim());
                writeln!(tmp, "{name}: {decoded}")?;
            }
        } else {
            log::warn!("failed to parse message headers during thorough scan");
            let (header_bytes, _) = split_header_body(raw);
            for line in unfolded_lines(header_bytes) {
                writeln!(tmp, "{}", decode_rfc2047_text(&line))?;
            }
        }
    }

    if want_body {
        match raw.try_into() as std::result::Result<crate::Message, _> {
            Ok(message) => {
                for i in 0..message.get_text_body_count() {
                    if let Some(text) = message.get_text_body(i) {
                        writeln!(tmp, "{text}")?;
                    }
                }
            }
            Err(_) => {
                let (_, body_bytes) = split_header_body(raw);
                tmp.write_all(body_bytes)?;
            }
        }
    }

    tmp.seek(SeekFrom::Start(0))?;
    let mut buf = String::new();
    tmp.read_to_string(&mut buf)?;
    let lines: Vec<String> = buf.lines().map(str::to_string).collect();
    Ok(scan_lines(&lines, sm, groups, budget))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::ast::{Op, PatternNode};
    use crate::pattern::store::PatternConfig;

    struct NoGroups;
    impl GroupRegistry for NoGroups {
        fn group_match(&self, _group: &str, _value: &str) -> bool {
            false
        }
    }

    fn literal_node(op: Op, text: &str) -> PatternNode {
        let mut node = PatternNode::leaf(op);
        node.payload = Payload::String(StringMatch::Literal {
            text: text.to_string(),
            ign_case: true,
        });
        node
    }

    #[test]
    fn raw_mode_finds_body_match() {
        let mut cfg = PatternConfig::default();
        cfg.thorough = false;
        let raw = b"Subject: hi\r\n\r\nhello world\r\nbye\r\n";
        let node = literal_node(Op::Body, "world");
        assert!(scan(&node, raw, &NoGroups, &cfg).unwrap());
    }

    #[test]
    fn raw_mode_header_unfolds_continuation() {
        let mut cfg = PatternConfig::default();
        cfg.thorough = false;
        let raw = b"Subject: hello\r\n world\r\n\r\nbody\r\n";
        let node = literal_node(Op::Header, "hello world");
        assert!(scan(&node, raw, &NoGroups, &cfg).unwrap());
    }

    #[test]
    fn raw_mode_respects_byte_budget() {
        let mut cfg = PatternConfig::default();
        cfg.thorough = false;
        cfg.scan_byte_budget = 0;
        let raw = b"Subject: hi\r\n\r\nhello world\r\n";
        let node = literal_node(Op::Body, "hello");
        assert!(!scan(&node, raw, &NoGroups, &cfg).unwrap());
    }
}
