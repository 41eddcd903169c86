#![allow(clippy::cognitive_complexity)]
#![allow(clippy::new_without_default)]
#![allow(clippy::upper_case_acronyms)]
#![forbid(unsafe_code)]

//! A lexer for feeding [`slrpar`]'s parser. A [`LexerDef`] groups rules under named lexer
//! states: lexing starts in the `initial` state, rules can switch to another state or back to
//! the previous one after they match, and rules in the `all` state apply in every state at
//! lower priority than the state's own. Within a state the first matching rule wins, so rules
//! are tried in the order they were added.
//!
//! Rules match through the [`Matcher`] trait. [`StrMatcher`] matches a literal string and
//! [`RegexMatcher`] an anchored regular expression; other schemes can be plugged in by
//! implementing the trait directly.

mod lexer;
mod matchers;

pub use crate::{
    lexer::{
        LexAction, LexBuildError, LexError, LexErrorKind, LexOutput, LexRule, LexerDef,
        LexerDefBuilder, SwitchTo,
    },
    matchers::{Matcher, RegexMatcher, StrMatcher},
};

/// The name of the state lexing starts in.
pub const INITIAL_STATE: &str = "initial";
/// The name of the state whose rules apply in every state, after the state's own rules.
pub const ALL_STATE: &str = "all";
/// Reserved name for the state a pop returns to. No rules can be declared under it; popping is
/// expressed as [`SwitchTo::Previous`].
pub const PREVIOUS_STATE: &str = "previous";
