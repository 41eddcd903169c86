#![allow(clippy::cognitive_complexity)]
#![allow(clippy::new_without_default)]
#![allow(clippy::upper_case_acronyms)]
#![forbid(unsafe_code)]

//! A library for building context-free grammars and computing their FIRST and FOLLOW sets, the
//! two ingredients an SLR table generator needs on top of the grammar itself.
//!
//! Grammar terminology is used as follows:
//!
//!   * A *grammar* is an ordered sequence of *productions*.
//!   * A *production* is an ordered sequence of *symbols*.
//!   * A *rule* maps a name to one or more productions.
//!   * A *token* is the name of a syntactic element.
//!
//! For example, in the grammar:
//!
//! ```text
//!   R1: "a" "b" | R2;
//!   R2: "c";
//! ```
//!
//! the following statements are true:
//!
//!   * There are 3 productions. 1: ["a", "b"] 2: ["R2"] 3: ["c"]
//!   * There are two rules: R1 and R2. The mapping to productions is {R1: {1, 2}, R2: {3}}
//!   * There are three tokens: a, b, and c.
//!
//! A [`Grammar`] built by this library is always *augmented*: a fresh start rule with a single
//! production referencing the user's start symbol is added as rule 0 / production 0, and a
//! synthetic end-of-input token is added after all user tokens. Zero-length productions are the
//! only representation of "this rule can derive the empty string": there is no epsilon symbol,
//! and nullability is tracked as a separate flag on FIRST sets.
//!
//! Grammars are parameterised by an unsigned integer type `StorageT` used to store symbol
//! indices. If a grammar is too big to fit in the given `StorageT`, building it panics.

mod firsts;
mod follows;
mod grammar;
mod idxnewtype;

pub use crate::{
    firsts::{FirstSet, Firsts},
    follows::Follows,
    grammar::{Grammar, GrammarBuilder, GrammarBuilderError, RuleAction, RuleActions},
    idxnewtype::{PIdx, RIdx, SIdx, TIdx},
};

/// A grammar symbol: a reference to either a rule or a token.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Symbol<StorageT> {
    Rule(RIdx<StorageT>),
    Token(TIdx<StorageT>),
}
