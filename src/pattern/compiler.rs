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

//! The pattern compiler: single-pass recursive descent over a byte
//! cursor, producing a `PatternNode` tree.
//!
//! The control flow here (the `chain`/`or_active`/`implicit` dance used to
//! fold `|` and juxtaposition into the right precedence) is ported directly
//! from `examples/original_source/pattern.c`'s `mutt_pattern_comp`, which
//! builds the whole thing as one `next`-linked list and repeatedly
//! collapses prefixes of it into a single wrapper node. A `Vec<PatternNode>`
//! stands in for the C code's `curlist`/`last` pointer pair; `link` folds it
//! into the `next`-chain shape `ast::PatternNode` actually stores.

use super::ast::{ArgKind, Op, Payload, PatternNode};
use super::eaters::{eat_daterange, eat_range, eat_regexp};
use super::error::{PatternError, Result};
use super::store::PatternConfig;

/// Which compile contexts a caller is compiling for (mirrors mutt's
/// `MUTT_FULL_MSG`/`MUTT_SEND_MODE_SEARCH` flags).
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileFlags {
    /// Compiling against a fully-fetched message (body/header text available).
    pub full_msg: bool,
    /// Compiling a pattern that will run against a message being composed.
    pub send_mode_search: bool,
}

impl CompileFlags {
    pub const fn full_msg() -> Self {
        CompileFlags {
            full_msg: true,
            send_mode_search: false,
        }
    }

    pub const fn send_mode() -> Self {
        CompileFlags {
            full_msg: false,
            send_mode_search: true,
        }
    }
}

/// Expands a "simple search" into a full pattern string. A no-op
/// (returns `input` unchanged) unless `input` contains none of `~ = %`
/// outside a backslash escape.
pub fn expand_simple_search(input: &str, cfg: &PatternConfig) -> String {
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if i + 1 < bytes.len() => i += 2,
            b'~' | b'=' | b'%' => return input.to_string(),
            _ => i += 1,
        }
    }

    let canonical = match input {
        "^" | "." => Some("~A"),
        s if s.eq_ignore_ascii_case("all") => Some("~A"),
        s if s.eq_ignore_ascii_case("del") => Some("~D"),
        s if s.eq_ignore_ascii_case("flag") => Some("~F"),
        s if s.eq_ignore_ascii_case("new") => Some("~N"),
        s if s.eq_ignore_ascii_case("old") => Some("~O"),
        s if s.eq_ignore_ascii_case("repl") => Some("~Q"),
        s if s.eq_ignore_ascii_case("read") => Some("~R"),
        s if s.eq_ignore_ascii_case("tag") => Some("~T"),
        s if s.eq_ignore_ascii_case("unread") => Some("~U"),
        _ => None,
    };

    match canonical {
        Some(pat) => pat.to_string(),
        None => {
            let quoted = quote_simple(input);
            cfg.simple_search_template.replacen("%s", &quoted, 2)
        }
    }
}

fn quote_simple(p: &str) -> String {
    let mut out = String::with_capacity(p.len() + 2);
    out.push('"');
    for ch in p.chars() {
        if ch == '\\' || ch == '"' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

/// Compiles a pattern string into a tree, applying the simple-search
/// pre-pass first.
pub fn compile(
    input: &str,
    flags: CompileFlags,
    cfg: &PatternConfig,
    now_ts: i64,
) -> Result<PatternNode> {
    let expanded = expand_simple_search(input, cfg);
    compile_expr(&expanded, flags, now_ts)
}

/// Finds the index of the `)` matching an already-consumed `(`, scanning
/// `bytes[start..]` (`start` is the byte right after the opening paren).
/// Returns `bytes.len()` if unmatched (the caller checks for `)` at the
/// returned index, mirroring `find_matching_paren`'s end-of-string return).
fn find_matching_paren(bytes: &[u8], start: usize) -> usize {
    let mut level = 1i32;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => level += 1,
            b')' => {
                level -= 1;
                if level == 0 {
                    return i;
                }
            }
            _ => {}
        }
        i += 1;
    }
    i
}

fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i] == b' ' {
        i += 1;
    }
    i
}

/// Folds a run of sibling terms into the `next`-chain shape `PatternNode`
/// stores, returning the head. Panics on an empty vec; callers never build
/// one (a run is only ever finalized with at least one term already in it).
fn link(mut nodes: Vec<PatternNode>) -> Box<PatternNode> {
    let mut head = Box::new(nodes.pop().expect("non-empty term run"));
    while let Some(mut node) = nodes.pop() {
        node.next = Some(head);
        head = Box::new(node);
    }
    head
}

/// Wraps `nodes` into a single `AND`/`OR` node iff it has more than one
/// element; otherwise returns the lone element unchanged. Mirrors the
/// `if (curlist->next) { wrap }` collapses throughout `mutt_pattern_comp`.
fn wrap(op: Op, mut nodes: Vec<PatternNode>) -> PatternNode {
    if nodes.len() == 1 {
        return nodes.pop().unwrap();
    }
    let mut node = PatternNode::leaf(op);
    node.payload = Payload::Child(link(nodes));
    node
}

fn validate_class(op: Op, flags: CompileFlags) -> bool {
    if !op.requires_full_msg() {
        return true;
    }
    flags.full_msg || (op.is_text_scan() && flags.send_mode_search)
}

/// Recursive-descent compiler proper. Operates on one parenthesis
/// level at a time; sub-expressions recurse through this same entry point.
fn compile_expr(input: &str, flags: CompileFlags, now_ts: i64) -> Result<PatternNode> {
    if input.trim().is_empty() {
        return Err(PatternError::Compile("empty pattern".into()));
    }

    let bytes = input.as_bytes();
    let mut pos = skip_ws(bytes, 0);

    let mut chain: Vec<PatternNode> = Vec::new();
    let mut or_active = false;
    let mut implicit = true;

    let mut negate = false;
    let mut all_addr = false;
    let mut is_alias = false;

    while pos < bytes.len() {
        match bytes[pos] {
            b'^' => {
                pos += 1;
                all_addr = !all_addr;
            }
            b'!' => {
                pos += 1;
                negate = !negate;
            }
            b'@' => {
                pos += 1;
                is_alias = !is_alias;
            }
            b'|' => {
                if !or_active {
                    if chain.is_empty() {
                        return Err(PatternError::Compile(format!(
                            "error in pattern at: {}",
                            &input[pos..]
                        )));
                    }
                    if chain.len() > 1 {
                        let wrapped = wrap(Op::And, std::mem::take(&mut chain));
                        chain.push(wrapped);
                    }
                    or_active = true;
                }
                pos += 1;
                implicit = false;
                negate = false;
                all_addr = false;
                is_alias = false;
            }
            b'~' | b'=' | b'%' => {
                if pos + 1 >= bytes.len() {
                    return Err(PatternError::Compile(format!(
                        "missing pattern: {}",
                        &input[pos..]
                    )));
                }
                let introducer = bytes[pos];

                let thread_op = if bytes[pos + 1] == b'(' {
                    Some(Op::Thread)
                } else if bytes[pos + 1] == b'<' && bytes.get(pos + 2) == Some(&b'(') {
                    Some(Op::Parent)
                } else if bytes[pos + 1] == b'>' && bytes.get(pos + 2) == Some(&b'(') {
                    Some(Op::Children)
                } else {
                    None
                };

                if let Some(op) = thread_op {
                    let paren_at = if matches!(op, Op::Parent | Op::Children) {
                        pos + 2
                    } else {
                        pos + 1
                    };
                    let close = find_matching_paren(bytes, paren_at + 1);
                    if bytes.get(close) != Some(&b')') {
                        return Err(PatternError::Compile(format!(
                            "mismatched brackets: {}",
                            &input[pos..]
                        )));
                    }

                    let mut node = PatternNode::leaf(op);
                    node.negate ^= negate;
                    node.all_addr |= all_addr;
                    node.is_alias |= is_alias;
                    negate = false;
                    all_addr = false;
                    is_alias = false;

                    let sub = &input[paren_at + 1..close];
                    let child = compile_expr(sub, flags, now_ts)?;
                    node.payload = Payload::Child(Box::new(child));

                    chain.push(node);
                    pos = close + 1;
                    pos = skip_ws(bytes, pos);
                    continue;
                }

                if implicit && or_active {
                    let wrapped = wrap(Op::Or, std::mem::take(&mut chain));
                    chain.push(wrapped);
                    or_active = false;
                }

                let mut node = PatternNode {
                    negate,
                    all_addr,
                    is_alias,
                    ..PatternNode::leaf(Op::All)
                };
                negate = false;
                all_addr = false;
                is_alias = false;

                let is_literal = introducer == b'=';
                let is_group = introducer == b'%';

                pos += 1;
                let tag = input[pos..].chars().next().ok_or_else(|| {
                    PatternError::Compile("missing pattern modifier".into())
                })?;
                let op = Op::from_tag(tag).ok_or_else(|| {
                    PatternError::Compile(format!("{tag}: invalid pattern modifier"))
                })?;
                if !validate_class(op, flags) {
                    return Err(PatternError::Compile(format!(
                        "{tag}: not supported in this mode"
                    )));
                }
                node.op = op;
                if flags.send_mode_search && op.is_text_scan() {
                    node.send_mode = true;
                }

                pos += tag.len_utf8();
                pos = skip_ws(bytes, pos);

                match op.arg_kind() {
                    ArgKind::Regex => {
                        if pos >= bytes.len() {
                            return Err(PatternError::Compile("missing parameter".into()));
                        }
                        let (value, consumed) = eat_regexp(&input[pos..], is_literal, is_group)?;
                        node.payload = Payload::String(value);
                        pos += consumed;
                    }
                    ArgKind::Range => {
                        if pos >= bytes.len() {
                            return Err(PatternError::Compile("missing parameter".into()));
                        }
                        let (value, consumed) = eat_range(&input[pos..])?;
                        node.payload = Payload::Range(value);
                        pos += consumed;
                    }
                    ArgKind::Date => {
                        if pos >= bytes.len() {
                            return Err(PatternError::Compile("missing parameter".into()));
                        }
                        let (value, consumed) = eat_daterange(&input[pos..], now_ts)?;
                        node.dynamic = matches!(
                            value.source.as_bytes().first(),
                            Some(b'<') | Some(b'>') | Some(b'=')
                        );
                        node.payload = Payload::Date(value);
                        pos += consumed;
                    }
                    ArgKind::None | ArgKind::SubPattern => {}
                }

                chain.push(node);
                implicit = true;
            }
            b'(' => {
                let close = find_matching_paren(bytes, pos + 1);
                if bytes.get(close) != Some(&b')') {
                    return Err(PatternError::Compile(format!(
                        "mismatched parenthesis: {}",
                        &input[pos..]
                    )));
                }
                let sub = &input[pos + 1..close];
                let mut node = compile_expr(sub, flags, now_ts)?;
                node.negate ^= negate;
                node.all_addr |= all_addr;
                node.is_alias |= is_alias;
                negate = false;
                all_addr = false;
                is_alias = false;

                chain.push(node);
                pos = close + 1;
            }
            _ => {
                return Err(PatternError::Compile(format!(
                    "error in pattern at: {}",
                    &input[pos..]
                )));
            }
        }
        pos = skip_ws(bytes, pos);
    }

    if chain.is_empty() {
        return Err(PatternError::Compile("empty pattern".into()));
    }
    if chain.len() > 1 {
        let op = if or_active { Op::Or } else { Op::And };
        return Ok(wrap(op, chain));
    }
    Ok(chain.pop().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> PatternConfig {
        PatternConfig::default()
    }

    fn compile_full(input: &str) -> Result<PatternNode> {
        compile(input, CompileFlags::full_msg(), &cfg(), 0)
    }

    #[test]
    fn single_term() {
        let node = compile_full("~F").unwrap();
        assert_eq!(node.op, Op::Flag);
        assert!(!node.negate);
    }

    #[test]
    fn negated_all_addr_modifiers() {
        let node = compile_full("!^~f foo").unwrap();
        assert_eq!(node.op, Op::From);
        assert!(node.negate);
        assert!(node.all_addr);
    }

    #[test]
    fn implicit_and() {
        let node = compile_full("~N ~F").unwrap();
        assert_eq!(node.op, Op::And);
        let Payload::Child(child) = &node.payload else {
            panic!("expected child payload")
        };
        assert_eq!(child.op, Op::New);
        assert_eq!(child.next.as_ref().unwrap().op, Op::Flag);
    }

    #[test]
    fn simple_or() {
        let node = compile_full("~N|~F").unwrap();
        assert_eq!(node.op, Op::Or);
    }

    #[test]
    fn and_or_and_precedence() {
        // "~N ~F|~O ~D" folds as "(A & B) | C", then the trailing "~D"
        // wraps that whole OR back into an AND: root is "((A & B) | C) & D".
        let node = compile_full("~N ~F|~O ~D").unwrap();
        assert_eq!(node.op, Op::And);
        let Payload::Child(first) = &node.payload else {
            panic!("expected child payload")
        };
        assert_eq!(first.op, Op::Or);
        let second = first.next.as_ref().unwrap();
        assert_eq!(second.op, Op::Deleted);

        let Payload::Child(or_first) = &first.payload else {
            panic!("expected child payload")
        };
        assert_eq!(or_first.op, Op::And);
        let or_second = or_first.next.as_ref().unwrap();
        assert_eq!(or_second.op, Op::Old);

        let Payload::Child(and_first) = &or_first.payload else {
            panic!("expected child payload")
        };
        assert_eq!(and_first.op, Op::New);
        assert_eq!(and_first.next.as_ref().unwrap().op, Op::Flag);
    }

    #[test]
    fn or_and_or_precedence() {
        // "~N|~F ~O" == "(A | B) & C"
        let node = compile_full("~N|~F ~O").unwrap();
        assert_eq!(node.op, Op::And);
        let Payload::Child(first) = &node.payload else {
            panic!("expected child payload")
        };
        assert_eq!(first.op, Op::Or);
        let second = first.next.as_ref().unwrap();
        assert_eq!(second.op, Op::Old);

        let Payload::Child(or_first) = &first.payload else {
            panic!("expected child payload")
        };
        assert_eq!(or_first.op, Op::New);
        assert_eq!(or_first.next.as_ref().unwrap().op, Op::Flag);
    }

    #[test]
    fn grouping() {
        let node = compile_full("(~N|~F) ~O").unwrap();
        assert_eq!(node.op, Op::And);
    }

    #[test]
    fn thread_navigator() {
        let node = compile_full("~(~N)").unwrap();
        assert_eq!(node.op, Op::Thread);
    }

    #[test]
    fn parent_navigator() {
        let node = compile_full("~<(~F)").unwrap();
        assert_eq!(node.op, Op::Parent);
    }

    #[test]
    fn children_navigator() {
        let node = compile_full("~>(~F)").unwrap();
        assert_eq!(node.op, Op::Children);
    }

    #[test]
    fn mismatched_parenthesis_is_error() {
        assert!(compile_full("(~N").is_err());
    }

    #[test]
    fn unknown_tag_is_error() {
        assert!(compile_full("~Z").is_err());
    }

    #[test]
    fn body_rejected_outside_full_msg() {
        let err = compile("~b foo", CompileFlags::default(), &cfg(), 0).unwrap_err();
        assert!(matches!(err, PatternError::Compile(_)));
    }

    #[test]
    fn body_allowed_in_send_mode_search() {
        let node = compile("~b foo", CompileFlags::send_mode(), &cfg(), 0).unwrap();
        assert!(node.send_mode);
    }

    #[test]
    fn simple_search_keyword_expands() {
        assert_eq!(expand_simple_search("new", &cfg()), "~N");
    }

    #[test]
    fn simple_search_text_uses_template() {
        let expanded = expand_simple_search("hello world", &cfg());
        assert_eq!(expanded, "~f \"hello world\" | ~s \"hello world\"");
    }

    #[test]
    fn range_term() {
        let node = compile_full("~z 1K-2K").unwrap();
        let Payload::Range(r) = &node.payload else {
            panic!("expected range payload")
        };
        assert_eq!((r.min, r.max), (1024, 2048));
    }
}
