#![allow(clippy::cognitive_complexity)]
#![allow(clippy::new_without_default)]
#![allow(clippy::upper_case_acronyms)]
#![forbid(unsafe_code)]

//! A run-time SLR parser. Given a [`slrgrammar::Grammar`], the [`slrtable::StateTable`] built
//! from it, and the grammar's semantic actions, [`RTParserBuilder`] parses a sequence of
//! [`Token`]s into a single semantic value:
//!
//! ```text
//!   let (grm, actions) = GrammarBuilder::new("Expr")
//!       ...
//!       .build::<u32>()?;
//!   let (_, stable) = slrtable::from_grammar(&grm);
//!   let pb = RTParserBuilder::new(&grm, &stable, &actions);
//!   let val = pb.parse(tokens, row_count)?;
//! ```
//!
//! Parsing is purely table-driven: conflicts were already resolved when the table was built, so
//! a parse either succeeds, or fails at the first token (or end of input) for which the table
//! holds no action. Failures are reported as [`ParseError`]s which know which symbols the
//! failing state would have accepted.

mod parser;
mod token;

pub use crate::{
    parser::{ParseError, ParseErrorKind, RTParserBuilder},
    token::Token,
};
