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

//! The sweep driver: runs a compiled pattern over every message a
//! collaborator hands it, in order, polling the process-wide interrupt flag
//! between messages rather than between sub-nodes.
//!
//! The core evaluator (`eval`) is synchronous and single-message; this is
//! the thin loop mutt's callers (`mutt_pattern_func`, the `LIMIT`/tag-by-
//! pattern commands) build around a folder's message list. It owns no
//! mailbox state itself — it is handed an ordered list of message numbers
//! and a lookup closure to resolve each one against a `MessageStore`.

use super::ast::PatternNode;
use super::eval::{eval, EvalContext};
use super::store::{Interrupt, MessageHeader};

/// Outcome of one sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Every message in `order` was visited.
    Completed { matched: Vec<usize> },
    /// The interrupt flag was observed between two messages; the flag has
    /// been cleared, the sweep stopped, and flags/cache mutations already
    /// applied to earlier messages are left in place.
    Interrupted { matched: Vec<usize> },
}

/// Runs `pattern` over every message number in `order` (already sorted by
/// the caller: ascending msgno for `LIMIT`, ascending virtual index
/// otherwise), resolving headers through `lookup`.
///
/// The interrupt flag is polled between messages, never between sub-nodes
/// a pattern that is mid-evaluation always finishes that one message.
/// `MessageHeader`'s predicate cache is a `RefCell` the evaluator borrows
/// internally, so the driver needs nothing more than a shared reference per
/// message — exactly one evaluation borrows a given header's cache at a
/// time because the sweep itself is sequential.
pub fn sweep<F>(pattern: &PatternNode, order: &[usize], interrupt: &Interrupt, ctx: &EvalContext, mut lookup: F) -> SweepOutcome
where
    F: FnMut(usize) -> Option<MessageHeader>,
{
    let mut matched = Vec::new();
    for (visited, &msgno) in order.iter().enumerate() {
        if interrupt.take() {
            log::debug!("sweep interrupted after {visited} of {} messages", order.len());
            return SweepOutcome::Interrupted { matched };
        }
        let Some(header) = lookup(msgno) else {
            continue;
        };
        if eval(pattern, &header, ctx) {
            matched.push(msgno);
        }
    }
    SweepOutcome::Completed { matched }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::ast::{Op, PatternNode};
    use crate::pattern::eval::AddressClassifier;
    use crate::pattern::store::{
        AliasResolver, Body, Envelope, Flags, GroupRegistry, MailAddress, MessageStore, PatternConfig,
        SecurityFlags,
    };

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

    fn blank_header(msgno: usize, flagged: bool) -> MessageHeader {
        MessageHeader {
            msgno,
            envelope: Envelope::default(),
            flags: Flags {
                flagged,
                ..Default::default()
            },
            security: SecurityFlags::default(),
            score: 0,
            size: 0,
            lines: 0,
            num_hidden: 0,
            date_sent: None,
            date_received: None,
            body: Body::default(),
            thread: None,
            offset: 0,
            hdr_offset: 0,
            content_offset: 0,
            content_length: 0,
            matched: None,
            cache: Default::default(),
        }
    }

    fn ctx(cfg: &PatternConfig) -> EvalContext<'_> {
        EvalContext {
            now_ts: 0,
            alias: &NoAlias,
            groups: &NoGroups,
            store: &EmptyStore,
            lists: &NoLists,
            full_address: false,
            draft: None,
            config: cfg,
        }
    }

    #[test]
    fn completes_and_collects_matches_in_order() {
        let pattern = PatternNode::leaf(Op::Flag);
        let headers = [blank_header(1, false), blank_header(2, true), blank_header(3, true)];
        let interrupt = Interrupt::new();
        let cfg = PatternConfig::default();
        let outcome = sweep(&pattern, &[0, 1, 2], &interrupt, &ctx(&cfg), |i| {
            headers.get(i).cloned()
        });
        assert_eq!(outcome, SweepOutcome::Completed { matched: vec![1, 2] });
    }

    #[test]
    fn interrupt_stops_the_sweep_and_clears_the_flag() {
        let pattern = PatternNode::leaf(Op::All);
        let headers = [blank_header(1, false), blank_header(2, false)];
        let interrupt = Interrupt::new();
        interrupt.set();
        let cfg = PatternConfig::default();
        let outcome = sweep(&pattern, &[0, 1], &interrupt, &ctx(&cfg), |i| headers.get(i).cloned());
        assert_eq!(outcome, SweepOutcome::Interrupted { matched: vec![] });
        assert!(!interrupt.take(), "interrupt flag must be cleared once observed");
    }
}
