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

//! The pattern tree: node kind, modifier flags and the payload each op needs.
//!
//! The source this is ported from (`examples/original_source/pattern.c`)
//! encodes node kind as an integer opcode plus a scattering of booleans
//! (`stringmatch`, `groupmatch`, `dynamic`) that together determine which
//! union field is live. Here that's replaced with a sum type (`Payload`)
//! whose variants carry exactly the right data, so there is no way to
//! construct a node with a payload that doesn't match its op.

use regex::Regex;

/// "Unbounded" sentinel for range/count payloads.
pub const SENTINEL: i64 = i64::MAX;

/// The closed set of operation codes (see the tag table in the module docs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    All,
    Body,
    WholeMsg,
    Cc,
    Recipient,
    Date,
    Deleted,
    Sender,
    Expired,
    From,
    Flag,
    CryptoSign,
    CryptoGoodSign,
    CryptoEncrypt,
    CryptoPgpKey,
    Header,
    Hormel,
    Id,
    List,
    SubscribedList,
    Address,
    Message,
    MimeType,
    Score,
    New,
    Old,
    Read,
    Unread,
    PersonalRecip,
    PersonalFrom,
    Replied,
    DateReceived,
    Subject,
    Superseded,
    To,
    Tag,
    Collapsed,
    Reference,
    MimeAttach,
    XLabel,
    Size,
    Duplicated,
    Unreferenced,
    And,
    Or,
    Thread,
    Parent,
    Children,
}

impl Op {
    /// Looks up the single-letter tag table. `None` for ops that have
    /// no tag of their own (`AND`/`OR`/thread navigators are produced by
    /// meta-syntax, not a tag letter).
    pub fn from_tag(tag: char) -> Option<Op> {
        Some(match tag {
            'A' => Op::All,
            'b' => Op::Body,
            'B' => Op::WholeMsg,
            'c' => Op::Cc,
            'C' => Op::Recipient,
            'd' => Op::Date,
            'D' => Op::Deleted,
            'e' => Op::Sender,
            'E' => Op::Expired,
            'f' => Op::From,
            'F' => Op::Flag,
            'g' => Op::CryptoSign,
            'G' => Op::CryptoGoodSign,
            'k' => Op::CryptoPgpKey,
            'V' => Op::CryptoEncrypt,
            'h' => Op::Header,
            'H' => Op::Hormel,
            'i' => Op::Id,
            'l' => Op::List,
            'u' => Op::SubscribedList,
            'L' => Op::Address,
            'm' => Op::Message,
            'M' => Op::MimeType,
            'n' => Op::Score,
            'N' => Op::New,
            'O' => Op::Old,
            'R' => Op::Read,
            'U' => Op::Unread,
            'p' => Op::PersonalRecip,
            'P' => Op::PersonalFrom,
            'Q' => Op::Replied,
            'r' => Op::DateReceived,
            's' => Op::Subject,
            'S' => Op::Superseded,
            't' => Op::To,
            'T' => Op::Tag,
            'v' => Op::Collapsed,
            'x' => Op::Reference,
            'X' => Op::MimeAttach,
            'y' => Op::XLabel,
            'z' => Op::Size,
            '=' => Op::Duplicated,
            '$' => Op::Unreferenced,
            _ => return None,
        })
    }

    /// Whether this op requires access to message body/header text and is
    /// therefore rejected in thread/score-only compile contexts.
    pub fn requires_full_msg(&self) -> bool {
        matches!(self, Op::Body | Op::WholeMsg | Op::Header | Op::MimeType)
    }

    /// Whether this op is one of the three textual scanners that read
    /// `send_mode` instead of a mailbox message.
    pub fn is_text_scan(&self) -> bool {
        matches!(self, Op::Body | Op::WholeMsg | Op::Header)
    }

    /// Whether this op iterates one or more address lists.
    pub fn is_address_list(&self) -> bool {
        matches!(
            self,
            Op::From
                | Op::Sender
                | Op::To
                | Op::Cc
                | Op::Recipient
                | Op::Address
                | Op::List
                | Op::SubscribedList
                | Op::PersonalRecip
                | Op::PersonalFrom
        )
    }

    pub fn is_crypto(&self) -> bool {
        matches!(
            self,
            Op::CryptoSign | Op::CryptoGoodSign | Op::CryptoEncrypt | Op::CryptoPgpKey
        )
    }

    /// The argument micro-grammar this op's tail is parsed with, or
    /// `None` for flag/no-argument ops and logical/thread nodes.
    pub fn arg_kind(&self) -> ArgKind {
        match self {
            Op::Body
            | Op::WholeMsg
            | Op::Cc
            | Op::Recipient
            | Op::Sender
            | Op::From
            | Op::Header
            | Op::Hormel
            | Op::Id
            | Op::Address
            | Op::MimeType
            | Op::Subject
            | Op::To
            | Op::Reference
            | Op::XLabel => ArgKind::Regex,
            Op::Message | Op::Score | Op::MimeAttach | Op::Size => ArgKind::Range,
            Op::Date | Op::DateReceived => ArgKind::Date,
            Op::And | Op::Or | Op::Thread | Op::Parent | Op::Children => ArgKind::SubPattern,
            _ => ArgKind::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    None,
    Regex,
    Range,
    Date,
    SubPattern,
}

/// A compiled EXPR argument: either a literal substring (operator `=`), a
/// named address-group reference (operator `%`), or a compiled regular
/// expression (operator `~`).
#[derive(Debug, Clone)]
pub enum StringMatch {
    Literal { text: String, ign_case: bool },
    Group { name: String },
    Regex { re: Box<Regex>, source: String },
}

impl StringMatch {
    pub fn is_match(&self, haystack: &str, groups: &dyn crate::pattern::store::GroupRegistry) -> bool {
        match self {
            StringMatch::Literal { text, ign_case } => {
                if *ign_case {
                    haystack.to_lowercase().contains(&text.to_lowercase())
                } else {
                    haystack.contains(text.as_str())
                }
            }
            StringMatch::Group { name } => groups.group_match(name, haystack),
            StringMatch::Regex { re, .. } => re.is_match(haystack),
        }
    }
}

/// A `RANGE` argument. `max == SENTINEL` means unbounded above.
#[derive(Debug, Clone, Copy)]
pub struct RangeMatch {
    pub min: i64,
    pub max: i64,
}

impl RangeMatch {
    pub fn contains(&self, value: i64) -> bool {
        value >= self.min && (self.max == SENTINEL || value <= self.max)
    }
}

/// A `DATERANGE` argument. `source` is kept so `dynamic` windows can
/// be recomputed against the current "now" at each evaluation.
#[derive(Debug, Clone)]
pub struct DateMatch {
    pub min: i64,
    pub max: i64,
    pub source: String,
}

/// One node of the compiled pattern tree.
pub struct PatternNode {
    pub op: Op,
    pub negate: bool,
    pub all_addr: bool,
    pub is_alias: bool,
    pub send_mode: bool,
    pub dynamic: bool,
    pub payload: Payload,
    pub next: Option<Box<PatternNode>>,
}

/// Exactly one variant of `Payload` is meaningful per node, selected by `op`.
pub enum Payload {
    None,
    String(StringMatch),
    Range(RangeMatch),
    Date(DateMatch),
    Child(Box<PatternNode>),
}

impl PatternNode {
    pub fn leaf(op: Op) -> PatternNode {
        PatternNode {
            op,
            negate: false,
            all_addr: false,
            is_alias: false,
            send_mode: false,
            dynamic: false,
            payload: Payload::None,
            next: None,
        }
    }
}

impl std::fmt::Debug for PatternNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternNode")
            .field("op", &self.op)
            .field("negate", &self.negate)
            .field("all_addr", &self.all_addr)
            .field("is_alias", &self.is_alias)
            .field("send_mode", &self.send_mode)
            .field("dynamic", &self.dynamic)
            .finish()
    }
}
