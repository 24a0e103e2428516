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

//! The message-view data model consumed by the evaluator.
//!
//! This is deliberately a superset of `crate::Message`/`crate::MessagePart`:
//! it adds the flags, counters, thread pointers and byte offsets a pattern
//! needs, while delegating actual MIME decoding to the `core`/`parsers`
//! modules. Addresses and header text are owned (`String`) rather than
//! borrowed, mirroring the `Addr::into_owned`/`Group::into_owned`
//! conversions already present in `core/address.rs` for the same reason:
//! a `MessageHeader` is expected to live for a whole mailbox sweep, well
//! past the lifetime of any single parse of the raw bytes.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{ContentType, DateTime, HeaderValue, Message as MimeMessage, RfcHeader};

/// An owned RFC5322/RFC2369 address, independent of the lifetime of the
/// original raw bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailAddress {
    pub name: Option<String>,
    pub address: Option<String>,
}

impl MailAddress {
    pub fn new(name: Option<&str>, address: Option<&str>) -> Self {
        MailAddress {
            name: name.map(str::to_string),
            address: address.map(str::to_string),
        }
    }
}

/// Parsed envelope fields.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    pub from: Vec<MailAddress>,
    pub sender: Vec<MailAddress>,
    pub to: Vec<MailAddress>,
    pub cc: Vec<MailAddress>,
    pub subject: Option<String>,
    pub message_id: Option<String>,
    pub references: Vec<String>,
    pub in_reply_to: Vec<String>,
    pub x_label: Option<String>,
    pub spam_tag: Option<String>,
}

/// Boolean flags carried on a header record.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flags {
    pub read: bool,
    pub old: bool,
    pub replied: bool,
    pub flagged: bool,
    pub deleted: bool,
    pub tagged: bool,
    pub expired: bool,
    pub superseded: bool,
    pub collapsed: bool,
    /// Set by the caller before a copy to request attachment deletion
    /// cleared by the copier once the rewrite completes.
    pub attach_del: bool,
}

/// Crypto status bits consumed from the crypto collaborator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecurityFlags {
    pub sign: bool,
    pub goodsign: bool,
    pub encrypt: bool,
    pub pgpkey: bool,
}

/// Whether the crypto collaborator is wired up at all. When it is not,
/// crypto ops must return false and log a one-time diagnostic.
pub static CRYPTO_AVAILABLE: AtomicBool = AtomicBool::new(false);

/// A node of the MIME tree as seen by the pattern language.
///
/// Distinct from `crate::MessagePart`: the pattern language needs a
/// first-child/next-sibling linked shape with a `deleted` flag it can set
/// ahead of a copy, so it's a separate lightweight tree built once from a
/// parsed `crate::Message` (see `Body::from_mime`).
#[derive(Debug, Clone, Default)]
pub struct Body {
    pub r#type: String,
    pub subtype: String,
    pub filename: Option<String>,
    /// `Content-Description`, if present; substituted as `%d` in the
    /// attachment-deletion replacement body template.
    pub description: Option<String>,
    /// `Content-Disposition`'s disposition type (`attachment`/`inline`/...),
    /// substituted as `%D`.
    pub disposition: Option<String>,
    pub offset: usize,
    pub hdr_offset: usize,
    pub length: usize,
    pub deleted: bool,
    pub parts: Option<Box<Body>>,
    pub next: Option<Box<Body>>,
}

impl Body {
    /// Builds the pattern-language MIME tree from a parsed message,
    /// keeping only the shape the evaluator and copier need.
    pub fn from_mime(msg: &MimeMessage) -> Body {
        fn build(msg: &MimeMessage, id: usize, siblings: &[usize]) -> Body {
            let part = &msg.parts[id];
            let ct = part
                .headers
                .iter()
                .find(|h| matches!(&h.name, crate::HeaderName::Rfc(RfcHeader::ContentType)))
                .and_then(|h| h.value.as_content_type_ref());
            let (r#type, subtype) = content_type_parts(ct, &part.body);
            let filename = ct.and_then(|ct| {
                ct.attributes.as_ref().and_then(|attrs| {
                    attrs
                        .iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case("name"))
                        .map(|(_, v)| v.to_string())
                })
            });

            let description = part
                .headers
                .iter()
                .find(|h| matches!(&h.name, crate::HeaderName::Rfc(RfcHeader::ContentDescription)))
                .and_then(|h| h.value.as_text_ref())
                .map(str::to_string);

            let disposition = part
                .headers
                .iter()
                .find(|h| matches!(&h.name, crate::HeaderName::Rfc(RfcHeader::ContentDisposition)))
                .and_then(|h| h.value.as_content_type_ref())
                .map(|ct| ct.c_type.to_lowercase());

            let children: Vec<usize> = match &part.body {
                crate::PartType::Multipart(ids) => ids.clone(),
                _ => Vec::new(),
            };

            let mut body = Body {
                r#type,
                subtype,
                filename,
                description,
                disposition,
                offset: part.offset_body,
                hdr_offset: part.offset_header,
                length: part.offset_end.saturating_sub(part.offset_body),
                deleted: false,
                parts: None,
                next: None,
            };

            if let Some((&first, rest)) = children.split_first() {
                body.parts = Some(Box::new(build(msg, first, rest)));
            }

            if let Some((&next_id, rest)) = siblings.split_first() {
                body.next = Some(Box::new(build(msg, next_id, rest)));
            }

            body
        }

        build(msg, 0, &[])
    }

    /// Recursively walks this part and its children, yielding `"type/subtype"`.
    pub fn walk_content_types<'a>(&'a self, visit: &mut dyn FnMut(&'a Body)) {
        visit(self);
        if let Some(parts) = &self.parts {
            parts.walk_content_types(visit);
        }
        if let Some(next) = &self.next {
            next.walk_content_types(visit);
        }
    }

    pub fn content_type_string(&self) -> String {
        format!("{}/{}", self.r#type, self.subtype)
    }

    /// Number of leaf (non-multipart) parts under this node, inclusive.
    pub fn attachment_count(&self) -> i64 {
        let mut count = 0i64;
        self.walk_content_types(&mut |b| {
            if b.parts.is_none() {
                count += 1;
            }
        });
        count
    }
}

fn content_type_parts(ct: Option<&ContentType>, body: &crate::PartType) -> (String, String) {
    if let Some(ct) = ct {
        (
            ct.c_type.to_lowercase(),
            ct.c_subtype
                .as_ref()
                .map(|s| s.to_lowercase())
                .unwrap_or_default(),
        )
    } else {
        match body {
            crate::PartType::Text(_) => ("text".into(), "plain".into()),
            crate::PartType::Html(_) => ("text".into(), "html".into()),
            crate::PartType::Multipart(_) => ("multipart".into(), "mixed".into()),
            crate::PartType::Message(_) => ("message".into(), "rfc822".into()),
            _ => ("application".into(), "octet-stream".into()),
        }
    }
}

/// A node in the reply-relationship thread graph.
///
/// Mirrors the `parent`/`child`/`prev`/`next` shape of mutt's `MUTTTHREAD`:
/// `child` is the first child, siblings chain through `next` (and `prev`
/// backwards), and `parent` is a `Weak` reference to avoid a reference
/// cycle with `child`/`next`.
#[derive(Debug, Default)]
pub struct ThreadNode {
    pub parent: RefCell<Option<Weak<ThreadNode>>>,
    pub child: RefCell<Option<Rc<ThreadNode>>>,
    pub prev: RefCell<Option<Weak<ThreadNode>>>,
    pub next: RefCell<Option<Rc<ThreadNode>>>,
    /// Index of the message this thread node carries, if any (collapsed
    /// containers with no message of their own use `None`).
    pub msgno: Option<usize>,
    pub duplicate_thread: bool,
}

impl ThreadNode {
    pub fn new(msgno: Option<usize>) -> Rc<ThreadNode> {
        Rc::new(ThreadNode {
            msgno,
            ..Default::default()
        })
    }

    /// Appends `child` as this node's last child.
    pub fn append_child(self: &Rc<Self>, child: &Rc<ThreadNode>) {
        *child.parent.borrow_mut() = Some(Rc::downgrade(self));
        let mut cur = self.child.borrow_mut();
        match cur.as_ref() {
            None => *cur = Some(child.clone()),
            Some(first) => {
                let mut last = first.clone();
                loop {
                    let next = last.next.borrow().clone();
                    match next {
                        Some(n) => last = n,
                        None => break,
                    }
                }
                *last.next.borrow_mut() = Some(child.clone());
                *child.prev.borrow_mut() = Some(Rc::downgrade(&last));
            }
        }
    }
}

/// Per-evaluation cache for the four address-list predicates expensive
/// enough to memoize, using an optional boolean in place of the
/// source's tri-state ("unset"/false/true) workaround.
/// One slot per `(op, all_addr)` combination.
#[derive(Debug, Clone, Copy, Default)]
pub struct PredicateCache {
    slots: [Option<bool>; 8],
}

/// Selects a cache slot for one of the four cacheable ops crossed with the
/// `all_addr` polarity.
fn cache_slot(op: super::ast::Op, all_addr: bool) -> Option<usize> {
    use super::ast::Op;
    let base = match op {
        Op::List => 0,
        Op::SubscribedList => 1,
        Op::PersonalRecip => 2,
        Op::PersonalFrom => 3,
        _ => return None,
    };
    Some(base * 2 + all_addr as usize)
}

impl PredicateCache {
    pub fn get(&self, op: super::ast::Op, all_addr: bool) -> Option<bool> {
        cache_slot(op, all_addr).and_then(|i| self.slots[i])
    }

    pub fn set(&mut self, op: super::ast::Op, all_addr: bool, value: bool) {
        if let Some(i) = cache_slot(op, all_addr) {
            self.slots[i] = Some(value);
        }
    }
}

/// A single message's worth of the data the evaluator needs.
#[derive(Debug, Clone)]
pub struct MessageHeader {
    pub msgno: usize,
    pub envelope: Envelope,
    pub flags: Flags,
    pub security: SecurityFlags,
    pub score: i64,
    pub size: u64,
    pub lines: u64,
    pub num_hidden: u32,
    pub date_sent: Option<DateTime>,
    pub date_received: Option<DateTime>,
    pub body: Body,
    pub thread: Option<Rc<ThreadNode>>,
    /// Byte offset of this message's `From ` line (or start) in the store.
    pub offset: usize,
    /// Byte offset of the first header byte (after any retained `From ` line).
    pub hdr_offset: usize,
    /// Byte offset of the first content (post-header) byte.
    pub content_offset: usize,
    /// Length in bytes of the content, from `content_offset`.
    pub content_length: usize,
    /// Pre-populated by a server-side search (e.g. IMAP `SEARCH`), consulted
    /// instead of re-scanning when the folder advertises the capability.
    pub matched: Option<bool>,
    /// Memoized address-list predicates for this header.
    pub cache: RefCell<PredicateCache>,
}

impl MessageHeader {
    /// Builds a header record from a parsed MIME message and its raw bytes.
    /// `msgno` is the 1-based position of this message within its store.
    pub fn from_mime(msgno: usize, msg: &MimeMessage, raw: &[u8]) -> MessageHeader {
        let addr_list = |value: &HeaderValue| -> Vec<MailAddress> {
            match value {
                HeaderValue::Address(a) => vec![MailAddress::new(
                    a.name.as_deref(),
                    a.address.as_deref(),
                )],
                HeaderValue::AddressList(list) => list
                    .iter()
                    .map(|a| MailAddress::new(a.name.as_deref(), a.address.as_deref()))
                    .collect(),
                HeaderValue::Group(group) => group
                    .addresses
                    .iter()
                    .map(|a| MailAddress::new(a.name.as_deref(), a.address.as_deref()))
                    .collect(),
                HeaderValue::GroupList(groups) => groups
                    .iter()
                    .flat_map(|g| g.addresses.iter())
                    .map(|a| MailAddress::new(a.name.as_deref(), a.address.as_deref()))
                    .collect(),
                _ => Vec::new(),
            }
        };

        let text_list = |value: &HeaderValue| -> Vec<String> {
            value
                .as_text_list()
                .map(|l| l.into_iter().map(str::to_string).collect())
                .unwrap_or_default()
        };

        let envelope = Envelope {
            from: addr_list(msg.get_header_values(RfcHeader::From).next().unwrap_or(&HeaderValue::Empty)),
            sender: addr_list(msg.get_header_values(RfcHeader::Sender).next().unwrap_or(&HeaderValue::Empty)),
            to: addr_list(msg.get_header_values(RfcHeader::To).next().unwrap_or(&HeaderValue::Empty)),
            cc: addr_list(msg.get_header_values(RfcHeader::Cc).next().unwrap_or(&HeaderValue::Empty)),
            subject: msg
                .get_header_values(RfcHeader::Subject)
                .next()
                .and_then(|v| v.as_text_ref())
                .map(str::to_string),
            message_id: msg
                .get_header_values(RfcHeader::MessageId)
                .next()
                .and_then(|v| v.as_text_ref())
                .map(str::to_string),
            references: msg
                .get_header_values(RfcHeader::References)
                .next()
                .map(text_list)
                .unwrap_or_default(),
            in_reply_to: msg
                .get_header_values(RfcHeader::InReplyTo)
                .next()
                .map(text_list)
                .unwrap_or_default(),
            x_label: msg
                .get_header_raw("X-Label")
                .map(str::trim)
                .map(str::to_string),
            spam_tag: msg
                .get_header_raw("X-Spam-Tag")
                .or_else(|| msg.get_header_raw("X-Spam-Status"))
                .map(str::trim)
                .map(str::to_string),
        };

        let date_sent = msg
            .get_header_values(RfcHeader::Date)
            .next()
            .and_then(|v| v.as_datetime_ref())
            .cloned();

        MessageHeader {
            msgno,
            envelope,
            flags: Flags::default(),
            security: SecurityFlags::default(),
            score: 0,
            size: raw.len() as u64,
            lines: raw.iter().filter(|&&b| b == b'\n').count() as u64,
            num_hidden: 0,
            date_sent,
            date_received: None,
            body: Body::from_mime(msg),
            thread: None,
            offset: 0,
            hdr_offset: msg.parts[0].offset_header,
            content_offset: msg.parts[0].offset_body,
            content_length: msg.parts[0].offset_end.saturating_sub(msg.parts[0].offset_body),
            matched: None,
            cache: RefCell::new(PredicateCache::default()),
        }
    }
}

/// Resolves a reverse alias lookup: does `addr` belong to an alias the user
/// has defined?
pub trait AliasResolver {
    fn reverse_lookup(&self, addr: &str) -> Option<String>;
}

/// Resolves named address-group membership for `%group` patterns.
pub trait GroupRegistry {
    fn group_match(&self, group: &str, value: &str) -> bool;
}

/// Resolves a message number to the header record the evaluator needs to
/// test it against a sub-pattern. Thread navigation
/// (`THREAD`/`PARENT`/`CHILDREN`) is the only evaluator path that needs to
/// look at a message other than the one it was invoked on.
pub trait MessageStore {
    fn header(&self, msgno: usize) -> Option<&MessageHeader>;
    /// Raw on-disk bytes for a stored message, consulted by the text
    /// scanner when scanning a message other than "the current one"
    /// (e.g. while walking a thread).
    fn raw_message(&self, msgno: usize) -> Option<&[u8]>;
}

/// Collaborator-supplied configuration: header weed/reorder lists, the
/// attachment-deletion replacement body template and the simple-search
/// expansion template.
#[derive(Debug, Clone)]
pub struct PatternConfig {
    /// Case-insensitive header-name prefixes to drop from a header copy.
    pub ignore: Vec<String>,
    /// Case-insensitive header-name prefixes that override `ignore`.
    pub unignore: Vec<String>,
    /// Case-insensitive header-name prefixes controlling output order;
    /// headers not listed are emitted last, in input order.
    pub hdr_order: Vec<String>,
    /// `printf`-style one-line notice substituted for a deleted part's body.
    /// `%d` = content-description, `%D` = content-disposition, `%T` =
    /// content-type/subtype, `%F` = filename, `%s` = size in bytes.
    pub attach_del_template: String,
    /// Template for the simple-search expansion; `%s` is substituted
    /// twice with the (quoted) search text.
    pub simple_search_template: String,
    /// Whether the scanner decodes bodies/headers into a temp file first
    /// ("thorough") or scans the raw on-disk bytes directly ("raw").
    pub thorough: bool,
    /// Cumulative byte budget for one text-scan call.
    pub scan_byte_budget: usize,
    /// Retain the message store envelope's leading `From ` line on copy.
    pub keep_from_line: bool,
}

impl Default for PatternConfig {
    fn default() -> Self {
        PatternConfig {
            ignore: Vec::new(),
            unignore: Vec::new(),
            hdr_order: Vec::new(),
            attach_del_template: "[-- %T/%s, %F --]\n".to_string(),
            simple_search_template: "~f %s | ~s %s".to_string(),
            thorough: true,
            scan_byte_budget: 2 * 1024 * 1024,
            keep_from_line: false,
        }
    }
}

/// The process-wide interrupt flag polled between messages.
#[derive(Debug, Default)]
pub struct Interrupt(AtomicBool);

impl Interrupt {
    pub const fn new() -> Self {
        Interrupt(AtomicBool::new(false))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Checks and clears the flag, as the driver does between messages.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}
