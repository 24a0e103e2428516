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

use std::fmt;
use std::io;

/// Fatal error produced while compiling a pattern or copying a message.
///
/// Evaluation errors never reach this type: the evaluator folds them into
/// `false` and, for conditions worth surfacing (e.g. crypto unavailable),
/// emits a one-time `log::warn!` instead.
#[derive(Debug)]
pub enum PatternError {
    /// A compile-time error: bad argument, mismatched bracket, unknown tag, ...
    Compile(String),
    /// I/O failure while scanning or copying a message.
    Io(io::Error),
    /// A crypto-dependent tag (`~g`/`~G`/`~k`) was compiled, but this build
    /// has no crypto backend wired up (`store::CRYPTO_AVAILABLE` is false).
    /// Compilation still succeeds — these tags degrade to a
    /// constant no-match at evaluation time — but callers that want to
    /// reject such patterns up front (e.g. a config linter) can check for
    /// this variant after a dry-run compile.
    CryptoUnavailable,
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternError::Compile(msg) => write!(f, "{msg}"),
            PatternError::Io(err) => write!(f, "{err}"),
            PatternError::CryptoUnavailable => write!(f, "crypto support is not available in this build"),
        }
    }
}

impl std::error::Error for PatternError {}

impl From<io::Error> for PatternError {
    fn from(err: io::Error) -> Self {
        PatternError::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, PatternError>;
