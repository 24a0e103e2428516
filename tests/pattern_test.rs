//! End-to-end scenarios from the pattern-language specification's
//! "Testable properties" section: compile a textual pattern, evaluate it
//! against a parsed message, assert the match/no-match outcome.
//!
//! Component-level properties (range arithmetic, date windows, evaluator
//! negation laws, the copier's byte-identical/length properties) are
//! covered by the `#[cfg(test)]` modules colocated with each component;
//! this file only exercises the full compile→evaluate pipeline the way a
//! caller actually uses it.

use mail_pattern::pattern::{
    compile, eval, AddressClassifier, AliasResolver, CompileFlags, EvalContext, GroupRegistry,
    MailAddress, MessageHeader, MessageStore, PatternConfig, ThreadNode,
};
use mail_pattern::Message;

struct NoAlias;
impl AliasResolver for NoAlias {
    fn reverse_lookup(&self, _addr: &str) -> Option<String> {
        None
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

/// Resolves exactly one named group, `spam-group`, against a fixed
/// substring (`"viagra"`) — enough to exercise `%op` group-reference
/// compilation and evaluation without a real address-book collaborator.
struct OneGroup;
impl GroupRegistry for OneGroup {
    fn group_match(&self, group: &str, value: &str) -> bool {
        group == "spam-group" && value.to_lowercase().contains("viagra")
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

/// Hands back fixed raw bytes for any message number, so a text-scan op can
/// find something to scan without a full message store behind it.
struct WithRaw<'a>(&'a [u8]);
impl<'a> MessageStore for WithRaw<'a> {
    fn header(&self, _msgno: usize) -> Option<&MessageHeader> {
        None
    }
    fn raw_message(&self, _msgno: usize) -> Option<&[u8]> {
        Some(self.0)
    }
}

/// A fixed two-message store (`bob`'s message at msgno 2) backing the
/// thread-navigator scenario.
struct ThreadStore {
    bob: MessageHeader,
}
impl MessageStore for ThreadStore {
    fn header(&self, msgno: usize) -> Option<&MessageHeader> {
        (msgno == 2).then_some(&self.bob)
    }
    fn raw_message(&self, _msgno: usize) -> Option<&[u8]> {
        None
    }
}

fn header_of(msgno: usize, raw: &[u8]) -> MessageHeader {
    let msg: Message = raw.try_into().expect("well-formed test fixture message");
    MessageHeader::from_mime(msgno, &msg, raw)
}

fn ctx<'a>(cfg: &'a PatternConfig, store: &'a dyn MessageStore, now_ts: i64) -> EvalContext<'a> {
    EvalContext {
        now_ts,
        alias: &NoAlias,
        groups: &OneGroup,
        store,
        lists: &NoLists,
        full_address: false,
        draft: None,
        config: cfg,
    }
}

// Fixed "now": 2020-06-15 12:00:00 UTC, for deterministic date-window tests.
const NOW: i64 = 1592222400;

#[test]
fn scenario_1_recent_date_and_sender_matches() {
    // `NOW` is 2020-06-15T12:00:00Z; this is one day earlier.
    let raw = b"From: Alice <alice@example.com>\r\nSubject: hi\r\nDate: Sun, 14 Jun 2020 12:00:00 +0000\r\n\r\nbody\r\n";
    let header = header_of(1, raw);

    let cfg = PatternConfig::default();
    let pattern = compile("~d <1w ~f alice@example.com", CompileFlags::full_msg(), &cfg, NOW)
        .expect("valid pattern");
    assert!(eval(&pattern, &header, &ctx(&cfg, &EmptyStore, NOW)));
}

#[test]
fn scenario_2_flagged_message_with_matching_subject_is_excluded() {
    let raw = b"From: x@example.com\r\nSubject: Re: Urgent fix\r\n\r\nbody\r\n";
    let mut header = header_of(1, raw);
    header.flags.flagged = true;

    let cfg = PatternConfig::default();
    let pattern = compile(r#"!~F ~s "re: urgent""#, CompileFlags::full_msg(), &cfg, NOW)
        .expect("valid pattern");
    assert!(!eval(&pattern, &header, &ctx(&cfg, &EmptyStore, NOW)));
}

#[test]
fn scenario_3_body_group_reference_matches() {
    let raw = b"From: x@example.com\r\nSubject: offer\r\n\r\nbuy VIAGRA now\r\n";
    let header = header_of(1, raw);

    let cfg = PatternConfig::default();
    let pattern = compile("%b spam-group", CompileFlags::full_msg(), &cfg, NOW).expect("valid pattern");
    let store = WithRaw(raw);
    let ectx = ctx(&cfg, &store, NOW);
    assert!(eval(&pattern, &header, &ectx));

    // `^%spam-group` (all-addr) still compiles against a non-address op; the
    // flag is simply ignored by the body op's evaluation.
    let pattern_all_addr =
        compile("^%b spam-group", CompileFlags::full_msg(), &cfg, NOW).expect("valid pattern");
    assert!(pattern_all_addr.all_addr);
    assert!(eval(&pattern_all_addr, &header, &ectx));
}

#[test]
fn scenario_4_message_number_or_range() {
    let cfg = PatternConfig::default();
    let pattern = compile("~m 10-20 | ~m 100", CompileFlags::full_msg(), &cfg, NOW).expect("valid pattern");
    let ectx = ctx(&cfg, &EmptyStore, NOW);

    // `~m` ranges are written in the 1-based numbering a user sees, but
    // compare against the header's own 0-based `msgno` (the range bounds
    // are shifted down by one at evaluation time, matching the original's
    // `h->msgno >= pat->min - 1` check) — so displayed message 10 is
    // `header.msgno == 9`, and so on.
    for displayed in [10usize, 15, 20, 100] {
        let mut header = header_of(1, b"Subject: x\r\n\r\nbody\r\n");
        header.msgno = displayed - 1;
        assert!(eval(&pattern, &header, &ectx), "message {displayed} should match");
    }
    for displayed in [9usize, 21, 50, 101] {
        let mut header = header_of(1, b"Subject: x\r\n\r\nbody\r\n");
        header.msgno = displayed - 1;
        assert!(!eval(&pattern, &header, &ectx), "message {displayed} should not match");
    }
}

#[test]
fn scenario_5_thread_navigator_matches_via_any_member() {
    let root = ThreadNode::new(Some(1));
    let bob_node = ThreadNode::new(Some(2));
    root.append_child(&bob_node);

    let mut subject_header = header_of(1, b"From: carol@example.com\r\nSubject: x\r\n\r\nbody\r\n");
    subject_header.thread = Some(root);

    let bob_header = header_of(2, b"From: bob@example.com\r\nSubject: y\r\n\r\nbody\r\n");
    let store = ThreadStore { bob: bob_header };

    let cfg = PatternConfig::default();
    let pattern = compile("~(~f bob@example.com)", CompileFlags::full_msg(), &cfg, NOW).expect("valid pattern");
    assert!(eval(&pattern, &subject_header, &ctx(&cfg, &store, NOW)));
}

#[test]
fn scenario_6_literal_case_fold_is_keyed_on_the_pattern_token_not_the_haystack() {
    // The pattern token "urgent" contains no uppercase byte, so `ign_case`
    // is true regardless of what the scanned line looks like:
    // the fold is a property of the compiled token, not the haystack.
    let raw = b"URGENT: yes\r\nSubject: x\r\n\r\nbody\r\n";
    let header = header_of(1, raw);

    let cfg = PatternConfig::default();
    let store = WithRaw(raw);
    let ectx = ctx(&cfg, &store, NOW);

    let positive = compile("=urgent", CompileFlags::full_msg(), &cfg, NOW);
    // `=urgent` parses as tag `u` (`SubscribedList`, a no-argument op)
    // followed by the trailing garbage "rgent", not as a literal-substring
    // test with an implicit tag; the grammar is `=op argument`, with the op
    // letter mandatory right after the introducer. Express the scenario the
    // way the grammar actually accepts it: `=h urgent` (literal header scan).
    assert!(positive.is_err(), "'=urgent' has no operator argument slot, so the leftover text is a compile error");

    let pattern = compile("=h urgent", CompileFlags::full_msg(), &cfg, NOW).expect("valid pattern");
    assert!(eval(&pattern, &header, &ectx));

    let negated = compile("!=h urgent", CompileFlags::full_msg(), &cfg, NOW).expect("valid pattern");
    assert!(!eval(&negated, &header, &ectx));
}
