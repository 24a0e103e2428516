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

//! The evaluator: walks a compiled pattern tree against one message
//! header and returns a match/no-match boolean.
//!
//! Ported from `mutt_pattern_exec` in
//! `examples/original_source/pattern.c`. The thread-navigation ops
//! (`THREAD`/`PARENT`/`CHILDREN`) replace the source's `(left, up, right,
//! down)` recursive direction flags with an explicit worklist plus a
//! visited set: the shape of the graph is the same, but a
//! node is never evaluated twice even if the thread structure turns out to
//! have a cycle in it.

use std::collections::HashSet;
use std::rc::Rc;

use super::ast::{Op, Payload, PatternNode, SENTINEL};
use super::eaters::parse_daterange_text;
use super::store::{MailAddress, MessageHeader, PatternConfig, ThreadNode};

/// Collaborators and caller-supplied policy the evaluator needs beyond the
/// header it is testing.
pub struct EvalContext<'a> {
    pub now_ts: i64,
    pub alias: &'a dyn super::store::AliasResolver,
    pub groups: &'a dyn super::store::GroupRegistry,
    pub store: &'a dyn super::store::MessageStore,
    pub lists: &'a dyn AddressClassifier,
    /// Whether address matching also checks the personal (display) name, not
    /// just the mailbox, when a pattern calls for it (mutt's
    /// `MUTT_MATCH_FULL_ADDRESS`).
    pub full_address: bool,
    /// The message-being-composed's raw bytes, consulted instead of the
    /// store when a node's `send_mode` flag is set.
    pub draft: Option<&'a [u8]>,
    pub config: &'a PatternConfig,
}

/// Classifies addresses against mailing-list and "this is me" side tables
/// (mutt's `mutt_is_mail_list`/`mutt_is_subscribed_list`/`mutt_addr_is_user`,
/// consulted by the `l`/`u`/`p`/`P` ops), required by the op table in the
/// same way the alias resolver and group registry are.
pub trait AddressClassifier {
    fn is_mailing_list(&self, addr: &MailAddress) -> bool;
    fn is_subscribed_list(&self, addr: &MailAddress) -> bool;
    fn is_user_address(&self, addr: &MailAddress) -> bool;
}

/// Evaluates `node` against `header`. `negate` is applied by each arm as
/// `pat->not ^ predicate`, except the asymmetric `NEW`/`OLD`/`UNREAD` ops
/// (preserved deliberately as mutt's own documented behavior).
pub fn eval(node: &PatternNode, header: &MessageHeader, ctx: &EvalContext) -> bool {
    match node.op {
        Op::And => node.negate ^ eval_and(node, header, ctx),
        Op::Or => node.negate ^ eval_or(node, header, ctx),
        Op::Thread => {
            let result = match &header.thread {
                Some(t) => match_threadcomplete(child_of(node), t, ctx),
                None => false,
            };
            node.negate ^ result
        }
        Op::Parent => {
            let result = match &header.thread {
                Some(t) => match_threadparent(child_of(node), t, ctx),
                None => false,
            };
            node.negate ^ result
        }
        Op::Children => {
            let result = match &header.thread {
                Some(t) => match_threadchildren(child_of(node), t, ctx),
                None => false,
            };
            node.negate ^ result
        }
        Op::All => !node.negate,
        Op::Expired => node.negate ^ header.flags.expired,
        Op::Superseded => node.negate ^ header.flags.superseded,
        Op::Flag => node.negate ^ header.flags.flagged,
        Op::Tag => node.negate ^ header.flags.tagged,
        // Asymmetric under negation by design, matching mutt's own semantics.
        Op::New => {
            if node.negate {
                header.flags.old || header.flags.read
            } else {
                !(header.flags.old || header.flags.read)
            }
        }
        Op::Unread => {
            if node.negate {
                header.flags.read
            } else {
                !header.flags.read
            }
        }
        Op::Old => {
            if node.negate {
                !header.flags.old || header.flags.read
            } else {
                header.flags.old && !header.flags.read
            }
        }
        Op::Replied => node.negate ^ header.flags.replied,
        Op::Read => node.negate ^ header.flags.read,
        Op::Deleted => node.negate ^ header.flags.deleted,
        Op::Collapsed => node.negate ^ (header.flags.collapsed && header.num_hidden > 1),
        Op::Duplicated => {
            node.negate
                ^ header
                    .thread
                    .as_ref()
                    .map(|t| t.duplicate_thread)
                    .unwrap_or(false)
        }
        Op::Unreferenced => {
            node.negate
                ^ header
                    .thread
                    .as_ref()
                    .map(|t| t.child.borrow().is_none())
                    .unwrap_or(false)
        }
        Op::Message => {
            let range = range_of(node);
            node.negate ^ range_contains_1_based(range, header.msgno)
        }
        Op::Score => {
            let range = range_of(node);
            node.negate ^ range.contains(header.score)
        }
        Op::Size => {
            let range = range_of(node);
            node.negate ^ range.contains(header.content_length as i64)
        }
        Op::MimeAttach => {
            let range = range_of(node);
            node.negate ^ range.contains(header.body.attachment_count())
        }
        Op::Date => eval_date(node, header.date_sent.as_ref(), ctx.now_ts),
        Op::DateReceived => eval_date(node, header.date_received.as_ref(), ctx.now_ts),
        Op::Body | Op::Header | Op::WholeMsg => eval_text_scan(node, header, ctx),
        Op::Sender => {
            node.negate ^ match_adrlist(node, ctx, std::iter::once(header.envelope.sender.iter()))
        }
        Op::From => {
            node.negate ^ match_adrlist(node, ctx, std::iter::once(header.envelope.from.iter()))
        }
        Op::To => node.negate ^ match_adrlist(node, ctx, std::iter::once(header.envelope.to.iter())),
        Op::Cc => node.negate ^ match_adrlist(node, ctx, std::iter::once(header.envelope.cc.iter())),
        Op::Recipient => {
            node.negate
                ^ match_adrlist(
                    node,
                    ctx,
                    [header.envelope.to.iter(), header.envelope.cc.iter()].into_iter(),
                )
        }
        Op::Address => {
            node.negate
                ^ match_adrlist(
                    node,
                    ctx,
                    [
                        header.envelope.from.iter(),
                        header.envelope.sender.iter(),
                        header.envelope.to.iter(),
                        header.envelope.cc.iter(),
                    ]
                    .into_iter(),
                )
        }
        Op::Subject => {
            node.negate
                ^ header
                    .envelope
                    .subject
                    .as_deref()
                    .map(|s| string_match_of(node).is_match(s, ctx.groups))
                    .unwrap_or(false)
        }
        Op::Id => {
            node.negate
                ^ header
                    .envelope
                    .message_id
                    .as_deref()
                    .map(|s| string_match_of(node).is_match(s, ctx.groups))
                    .unwrap_or(false)
        }
        Op::XLabel => {
            node.negate
                ^ header
                    .envelope
                    .x_label
                    .as_deref()
                    .map(|s| string_match_of(node).is_match(s, ctx.groups))
                    .unwrap_or(false)
        }
        Op::Hormel => {
            node.negate
                ^ header
                    .envelope
                    .spam_tag
                    .as_deref()
                    .map(|s| string_match_of(node).is_match(s, ctx.groups))
                    .unwrap_or(false)
        }
        Op::Reference => {
            let sm = string_match_of(node);
            let matched = header
                .envelope
                .references
                .iter()
                .chain(header.envelope.in_reply_to.iter())
                .any(|r| sm.is_match(r, ctx.groups));
            node.negate ^ matched
        }
        Op::List => eval_cached(node, header, |alladdr| {
            is_list_cc(ctx.lists, alladdr, &header.envelope.to, &header.envelope.cc, false)
        }),
        Op::SubscribedList => eval_cached(node, header, |alladdr| {
            is_list_cc(ctx.lists, alladdr, &header.envelope.to, &header.envelope.cc, true)
        }),
        Op::PersonalRecip => eval_cached(node, header, |alladdr| {
            match_user(ctx.lists, alladdr, &header.envelope.to, &header.envelope.cc)
        }),
        Op::PersonalFrom => eval_cached(node, header, |alladdr| {
            match_user(ctx.lists, alladdr, &header.envelope.from, &[])
        }),
        Op::MimeType => node.negate ^ match_content_type(node, Some(&header.body), ctx),
        Op::CryptoSign => eval_crypto(node, header.security.sign, "g"),
        Op::CryptoGoodSign => eval_crypto(node, header.security.goodsign, "G"),
        Op::CryptoEncrypt => eval_crypto(node, header.security.encrypt, "V"),
        Op::CryptoPgpKey => eval_crypto(node, header.security.pgpkey, "k"),
    }
}

fn eval_and(node: &PatternNode, header: &MessageHeader, ctx: &EvalContext) -> bool {
    let mut cur = child_of(node);
    loop {
        if !eval(cur, header, ctx) {
            return false;
        }
        match &cur.next {
            Some(n) => cur = n,
            None => return true,
        }
    }
}

fn eval_or(node: &PatternNode, header: &MessageHeader, ctx: &EvalContext) -> bool {
    let mut cur = child_of(node);
    loop {
        if eval(cur, header, ctx) {
            return true;
        }
        match &cur.next {
            Some(n) => cur = n,
            None => return false,
        }
    }
}

fn child_of(node: &PatternNode) -> &PatternNode {
    match &node.payload {
        Payload::Child(child) => child,
        _ => unreachable!("AND/OR/THREAD/PARENT/CHILDREN always carry a Child payload"),
    }
}

fn range_of(node: &PatternNode) -> super::ast::RangeMatch {
    match &node.payload {
        Payload::Range(r) => *r,
        _ => unreachable!("range ops always carry a Range payload"),
    }
}

fn string_match_of(node: &PatternNode) -> &super::ast::StringMatch {
    match &node.payload {
        Payload::String(s) => s,
        _ => unreachable!("regex ops always carry a String payload"),
    }
}

/// `MESSAGE` is 1-based; the stored bounds are adjusted by one before the
/// comparison.
fn range_contains_1_based(range: super::ast::RangeMatch, msgno: usize) -> bool {
    let msgno = msgno as i64;
    msgno >= range.min - 1 && (range.max == SENTINEL || msgno <= range.max - 1)
}

fn eval_date(node: &PatternNode, date: Option<&crate::DateTime>, now_ts: i64) -> bool {
    let (mut min, mut max) = match &node.payload {
        Payload::Date(d) => (d.min, d.max),
        _ => unreachable!("date ops always carry a Date payload"),
    };
    if node.dynamic {
        if let Payload::Date(d) = &node.payload {
            if let Ok((m0, m1)) = parse_daterange_text(&d.source, now_ts) {
                min = m0;
                max = m1;
            }
        }
    }
    match date {
        Some(dt) => {
            let ts = dt.to_timestamp();
            node.negate ^ (ts >= min && ts <= max)
        }
        None => node.negate ^ false,
    }
}

/// Ported from `match_adrlist`: the `atom` formula, crossed with
/// `all_addr`'s "every" vs. "some" quantification and XORed with `negate`
/// at the end. `lists` is one iterator per address list consulted (e.g.
/// `to` and `cc` together for `RECIPIENT`).
fn match_adrlist<'a, I>(node: &PatternNode, ctx: &EvalContext, lists: I) -> bool
where
    I: IntoIterator<Item = std::slice::Iter<'a, MailAddress>>,
{
    let sm = string_match_of(node);
    for list in lists {
        for addr in list {
            let atom = (!node.is_alias || ctx.alias.reverse_lookup(addr_key(addr)).is_some())
                && (addr
                    .address
                    .as_deref()
                    .map(|m| sm.is_match(m, ctx.groups))
                    .unwrap_or(false)
                    || (ctx.full_address
                        && addr
                            .name
                            .as_deref()
                            .map(|p| sm.is_match(p, ctx.groups))
                            .unwrap_or(false)));
            if node.all_addr ^ atom {
                return !node.all_addr;
            }
        }
    }
    node.all_addr
}

fn addr_key(addr: &MailAddress) -> &str {
    addr.address.as_deref().unwrap_or_default()
}

fn is_list_cc(
    lists: &dyn AddressClassifier,
    all_addr: bool,
    to: &[MailAddress],
    cc: &[MailAddress],
    subscribed_only: bool,
) -> bool {
    let pred = |a: &MailAddress| {
        if subscribed_only {
            lists.is_subscribed_list(a)
        } else {
            lists.is_mailing_list(a)
        }
    };
    for a in to.iter().chain(cc.iter()) {
        if all_addr ^ pred(a) {
            return !all_addr;
        }
    }
    all_addr
}

fn match_user(
    lists: &dyn AddressClassifier,
    all_addr: bool,
    a1: &[MailAddress],
    a2: &[MailAddress],
) -> bool {
    for a in a1.iter().chain(a2.iter()) {
        if all_addr ^ lists.is_user_address(a) {
            return !all_addr;
        }
    }
    all_addr
}

/// Looks up (or computes and stores) a cacheable predicate on `header`'s
/// slot for `(node.op, node.all_addr)`.
fn eval_cached(
    node: &PatternNode,
    header: &MessageHeader,
    compute: impl FnOnce(bool) -> bool,
) -> bool {
    let mut cache = header.cache.borrow_mut();
    let result = match cache.get(node.op, node.all_addr) {
        Some(v) => v,
        None => {
            let v = compute(node.all_addr);
            cache.set(node.op, node.all_addr, v);
            v
        }
    };
    node.negate ^ result
}

fn eval_crypto(node: &PatternNode, bit: bool, tag: &str) -> bool {
    if !super::store::CRYPTO_AVAILABLE.load(std::sync::atomic::Ordering::Relaxed) {
        log::warn!("crypto support is not available, pattern modifier '{tag}' always fails");
        return false;
    }
    node.negate ^ bit
}

fn match_content_type(
    node: &PatternNode,
    body: Option<&super::store::Body>,
    ctx: &EvalContext,
) -> bool {
    let Some(b) = body else { return false };
    let sm = string_match_of(node);
    if sm.is_match(&b.content_type_string(), ctx.groups) {
        return true;
    }
    if match_content_type(node, b.parts.as_deref(), ctx) {
        return true;
    }
    match_content_type(node, b.next.as_deref(), ctx)
}

/// Explicit worklist replacing the source's `(left, up, right, down)`
/// recursion. Each thread node is visited at most once.
fn match_threadcomplete(child: &PatternNode, start: &Rc<ThreadNode>, ctx: &EvalContext) -> bool {
    let mut visited: HashSet<*const ThreadNode> = HashSet::new();
    let mut stack: Vec<(Rc<ThreadNode>, bool, bool, bool, bool)> =
        vec![(start.clone(), true, true, true, true)];

    while let Some((t, left, up, right, down)) = stack.pop() {
        let ptr = Rc::as_ptr(&t);
        if !visited.insert(ptr) {
            continue;
        }

        if let Some(msgno) = t.msgno {
            if let Some(h) = ctx.store.header(msgno) {
                if eval(child, h, ctx) {
                    return true;
                }
            }
        }

        if up {
            if let Some(p) = t.parent.borrow().as_ref().and_then(|w| w.upgrade()) {
                stack.push((p, true, true, true, false));
            }
        }
        let has_parent = t.parent.borrow().is_some();
        if right && has_parent {
            if let Some(n) = t.next.borrow().clone() {
                stack.push((n, false, false, true, true));
            }
        }
        if left && has_parent {
            if let Some(p) = t.prev.borrow().as_ref().and_then(|w| w.upgrade()) {
                stack.push((p, true, false, false, true));
            }
        }
        if down {
            if let Some(c) = t.child.borrow().clone() {
                stack.push((c, true, false, true, true));
            }
        }
    }
    false
}

fn match_threadparent(child: &PatternNode, start: &Rc<ThreadNode>, ctx: &EvalContext) -> bool {
    let parent = match start.parent.borrow().as_ref().and_then(|w| w.upgrade()) {
        Some(p) => p,
        None => return false,
    };
    match parent.msgno.and_then(|m| ctx.store.header(m)) {
        Some(h) => eval(child, h, ctx),
        None => false,
    }
}

fn match_threadchildren(child: &PatternNode, start: &Rc<ThreadNode>, ctx: &EvalContext) -> bool {
    let mut cur = start.child.borrow().clone();
    while let Some(t) = cur {
        if let Some(h) = t.msgno.and_then(|m| ctx.store.header(m)) {
            if eval(child, h, ctx) {
                return true;
            }
        }
        cur = t.next.borrow().clone();
    }
    false
}

fn eval_text_scan(node: &PatternNode, header: &MessageHeader, ctx: &EvalContext) -> bool {
    if node.send_mode {
        return match ctx.draft {
            None => false,
            Some(raw) => {
                node.negate ^ super::scanner::scan(node, raw, ctx.groups, ctx.config).unwrap_or(false)
            }
        };
    }
    if let Some(matched) = header.matched {
        if matches!(&node.payload, Payload::String(super::ast::StringMatch::Literal { .. })) {
            return node.negate ^ matched;
        }
    }
    let result = ctx
        .store
        .raw_message(header.msgno)
        .and_then(|raw| super::scanner::scan(node, raw, ctx.groups, ctx.config).ok())
        .unwrap_or(false);
    node.negate ^ result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::store::{AliasResolver, Flags, GroupRegistry, MessageStore};

    struct NoAlias;
    impl AliasResolver for NoAlias {
        fn reverse_lookup(&self, _addr: &str) -> Option<String> {
            None
        }
    }

    struct NoGroups;
    impl GroupRegistry for NoGroups {
        fn group_match(&self, _group: &str, _value: &str) -> bool {
            false
        }
    }

    struct NoLists;
    impl AddressClassifier for NoLists {
        fn is_mailing_list(&self, _addr: &MailAddress) -> bool {
            false
        }
        fn is_subscribed_list(&self, _addr: &MailAddress) -> bool {
            false
        }
        fn is_user_address(&self, _addr: &MailAddress) -> bool {
            false
        }
    }

    struct EmptyStore;
    impl MessageStore for EmptyStore {
        fn header(&self, _msgno: usize) -> Option<&MessageHeader> {
            None
        }
        fn raw_message(&self, _msgno: usize) -> Option<&[u8]> {
            None
        }
    }

    fn ctx(cfg: &PatternConfig) -> EvalContext<'_> {
        EvalContext {
            now_ts: 0,
            alias: &NoAlias,
            groups: &NoGroups,
            store: &EmptyStore,
            lists: &NoLists,
            full_address: true,
            draft: None,
            config: cfg,
        }
    }

    fn blank_header() -> MessageHeader {
        MessageHeader {
            msgno: 1,
            envelope: Default::default(),
            flags: Flags::default(),
            security: Default::default(),
            score: 0,
            size: 0,
            lines: 0,
            num_hidden: 0,
            date_sent: None,
            date_received: None,
            body: Default::default(),
            thread: None,
            offset: 0,
            hdr_offset: 0,
            content_offset: 0,
            content_length: 0,
            matched: None,
            cache: Default::default(),
        }
    }

    #[test]
    fn all_matches_always() {
        let cfg = PatternConfig::default();
        let node = PatternNode::leaf(Op::All);
        assert!(eval(&node, &blank_header(), &ctx(&cfg)));
    }

    #[test]
    fn flag_double_negation_is_identity() {
        let cfg = PatternConfig::default();
        let mut header = blank_header();
        header.flags.flagged = true;
        let plain = PatternNode::leaf(Op::Flag);
        let mut once = PatternNode::leaf(Op::Flag);
        once.negate = true;
        let mut twice = PatternNode::leaf(Op::Flag);
        twice.negate = true;
        twice.negate = false; // two negations cancel; equivalent to `plain`
        assert_eq!(
            eval(&plain, &header, &ctx(&cfg)),
            eval(&twice, &header, &ctx(&cfg))
        );
        assert_ne!(
            eval(&plain, &header, &ctx(&cfg)),
            eval(&once, &header, &ctx(&cfg))
        );
    }

    #[test]
    fn new_old_unread_asymmetry() {
        let cfg = PatternConfig::default();
        let header = blank_header(); // read=false, old=false
        let new_node = PatternNode::leaf(Op::New);
        assert!(eval(&new_node, &header, &ctx(&cfg)));
        let mut not_new = PatternNode::leaf(Op::New);
        not_new.negate = true;
        // `!NEW` is not simply `!eval(NEW)` for a read message, but here
        // old=read=false so old||read is false either way.
        assert!(!eval(&not_new, &header, &ctx(&cfg)));
    }

    #[test]
    fn all_addr_on_empty_list_is_true_any_is_false() {
        let cfg = PatternConfig::default();
        let header = blank_header();
        let mut all_node = PatternNode::leaf(Op::From);
        all_node.all_addr = true;
        all_node.payload = Payload::String(super::super::ast::StringMatch::Literal {
            text: "x".into(),
            ign_case: true,
        });
        assert!(eval(&all_node, &header, &ctx(&cfg)));

        let mut any_node = PatternNode::leaf(Op::From);
        any_node.payload = Payload::String(super::super::ast::StringMatch::Literal {
            text: "x".into(),
            ign_case: true,
        });
        assert!(!eval(&any_node, &header, &ctx(&cfg)));
    }

    #[test]
    fn mimeattach_range_matches_part_count() {
        let cfg = PatternConfig::default();
        let mut header = blank_header();
        header.body = super::super::store::Body {
            r#type: "multipart".into(),
            subtype: "mixed".into(),
            parts: Some(Box::new(super::super::store::Body {
                r#type: "text".into(),
                subtype: "plain".into(),
                next: Some(Box::new(super::super::store::Body {
                    r#type: "image".into(),
                    subtype: "png".into(),
                    ..Default::default()
                })),
                ..Default::default()
            })),
            ..Default::default()
        };
        let mut node = PatternNode::leaf(Op::MimeAttach);
        node.payload = Payload::Range(super::super::ast::RangeMatch {
            min: 2,
            max: SENTINEL,
        });
        assert!(eval(&node, &header, &ctx(&cfg)));

        let mut too_few = PatternNode::leaf(Op::MimeAttach);
        too_few.payload = Payload::Range(super::super::ast::RangeMatch {
            min: 3,
            max: SENTINEL,
        });
        assert!(!eval(&too_few, &header, &ctx(&cfg)));
    }

    #[test]
    fn crypto_unavailable_is_false() {
        let cfg = PatternConfig::default();
        let header = blank_header();
        let node = PatternNode::leaf(Op::CryptoSign);
        assert!(!eval(&node, &header, &ctx(&cfg)));
    }
}
