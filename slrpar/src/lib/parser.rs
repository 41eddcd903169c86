use std::{collections::VecDeque, error::Error, fmt, hash::Hash};

use num_traits::{AsPrimitive, PrimInt, Unsigned, Zero};

use slrgrammar::{Grammar, PIdx, RuleActions, Symbol};
use slrtable::{Action, StIdx, StIdxStorageT, StateTable};

use crate::token::Token;

/// An entry on the parse stack. States and tokens strictly alternate, with a state at the
/// bottom (and, between calls to the parsing loop, at the top too).
enum StackEntry<StorageT, ActionT> {
    St(StIdx),
    Tok(Token<StorageT, ActionT>),
}

/// A run-time parser builder.
///
/// The builder borrows a grammar, the state table built from it and the grammar's semantic
/// actions; [`RTParserBuilder::parse`] can then be called any number of times.
pub struct RTParserBuilder<'a, StorageT: Eq + Hash, ActionT> {
    grm: &'a Grammar<StorageT>,
    stable: &'a StateTable<StorageT>,
    actions: &'a RuleActions<ActionT>,
    expected_limit: Option<usize>,
}

impl<'a, StorageT: 'static + fmt::Debug + Hash + PrimInt + Unsigned, ActionT>
    RTParserBuilder<'a, StorageT, ActionT>
where
    usize: AsPrimitive<StorageT>,
{
    /// Create a new parser builder for `grm`, `stable` and `actions`.
    pub fn new(
        grm: &'a Grammar<StorageT>,
        stable: &'a StateTable<StorageT>,
        actions: &'a RuleActions<ActionT>,
    ) -> Self {
        RTParserBuilder {
            grm,
            stable,
            actions,
            expected_limit: Some(1),
        }
    }

    /// Set how many candidate symbols an error message is allowed to name ([`None`] meaning "no
    /// limit"). The default of `Some(1)` names a candidate only when it is the sole
    /// possibility.
    pub fn expected_limit(mut self, expected_limit: Option<usize>) -> Self {
        self.expected_limit = expected_limit;
        self
    }

    /// Parse `tokens`, read from an input `row_count` lines long, into a single semantic
    /// value. Parsing stops at the first token for which the current state holds no action,
    /// returning a [`ParseError`] describing it.
    pub fn parse(
        &self,
        tokens: Vec<Token<StorageT, ActionT>>,
        row_count: usize,
    ) -> Result<Option<ActionT>, ParseError<StorageT, ActionT>> {
        let mut input = VecDeque::from(tokens);
        input.push_back(Token::with_context(
            Symbol::Token(self.grm.eof_token_idx()),
            None,
            None,
            Some(row_count),
            None,
        ));
        let mut pstack = vec![StackEntry::St(StIdx::from(StIdxStorageT::zero()))];
        loop {
            let stidx = match pstack.last() {
                Some(&StackEntry::St(stidx)) => stidx,
                _ => unreachable!(),
            };
            // Reductions consume no input, so the next token is only peeked at here. The
            // end-of-input token can neither be shifted nor reduced, so input never runs dry.
            let sym = input.front().unwrap().symbol();
            match sym {
                Symbol::Rule(ridx) => match self.stable.goto(stidx, ridx) {
                    Some(nxt_stidx) => {
                        let tok = input.pop_front().unwrap();
                        pstack.push(StackEntry::Tok(tok));
                        pstack.push(StackEntry::St(nxt_stidx));
                    }
                    None => {
                        return Err(self.parse_error(stidx, input.pop_front().unwrap()));
                    }
                },
                Symbol::Token(tidx) => match self.stable.action(stidx, tidx) {
                    Action::Shift(nxt_stidx) => {
                        let tok = input.pop_front().unwrap();
                        pstack.push(StackEntry::Tok(tok));
                        pstack.push(StackEntry::St(nxt_stidx));
                    }
                    Action::Reduce(pidx) => self.reduce(&mut pstack, &mut input, pidx),
                    Action::Accept => {
                        debug_assert_eq!(tidx, self.grm.eof_token_idx());
                        // The start rule's production has a single symbol, so its token sits
                        // at index 1, directly above the start state.
                        let tok = match pstack.drain(1..).next() {
                            Some(StackEntry::Tok(tok)) => tok,
                            _ => panic!("parse stack corrupt: accepted without a value"),
                        };
                        return Ok(tok.into_value());
                    }
                    Action::Error => {
                        return Err(self.parse_error(stidx, input.pop_front().unwrap()));
                    }
                },
            }
        }
    }

    /// Pop the right-hand side of production `pidx` off the parse stack, apply the
    /// production's action to the popped values, and prepend a token for the production's
    /// rule, carrying the result, to `input`.
    ///
    /// The popped tokens must match the production's symbols. They can only fail to do so if
    /// `stable` was not built from `grm`, in which case the parse stack is corrupt and this
    /// function panics.
    fn reduce(
        &self,
        pstack: &mut Vec<StackEntry<StorageT, ActionT>>,
        input: &mut VecDeque<Token<StorageT, ActionT>>,
        pidx: PIdx<StorageT>,
    ) {
        let prod = self.grm.prod(pidx);
        let ridx = self.grm.prod_to_rule(pidx);
        let mut values = VecDeque::with_capacity(prod.len());
        let mut row = None;
        let mut col = None;
        let mut lex_state = None;
        let mut lex_state_known = false;
        for sym in prod.iter().rev() {
            match pstack.pop() {
                Some(StackEntry::St(_)) => (),
                _ => panic!(
                    "parse stack corrupt: {} reduction underflowed",
                    self.grm.rule_name(ridx)
                ),
            }
            let tok = match pstack.pop() {
                Some(StackEntry::Tok(tok)) => tok,
                _ => panic!(
                    "parse stack corrupt: {} reduction underflowed",
                    self.grm.rule_name(ridx)
                ),
            };
            if tok.symbol() != *sym {
                panic!(
                    "parse stack corrupt: {} reduction popped {}, expected {}",
                    self.grm.rule_name(ridx),
                    self.sym_name(tok.symbol()),
                    self.sym_name(*sym)
                );
            }
            // The leftmost token with a position provides the merged token's position, so
            // each further-left pop overwrites.
            if tok.row().is_some() {
                row = tok.row();
                col = tok.col();
            }
            // A merged token keeps its parts' lexing state only when they all agree.
            let tok_lex_state = tok.lex_state().map(str::to_string);
            if !lex_state_known {
                lex_state = tok_lex_state;
                lex_state_known = true;
            } else if lex_state != tok_lex_state {
                lex_state = None;
            }
            values.push_front(tok.into_value());
        }
        match pstack.last() {
            Some(StackEntry::St(_)) => (),
            _ => panic!(
                "parse stack corrupt: no state beneath {} reduction",
                self.grm.rule_name(ridx)
            ),
        }
        let value = self.actions.apply(pidx, Vec::from(values));
        input.push_front(Token::with_context(
            Symbol::Rule(ridx),
            value,
            lex_state,
            row,
            col,
        ));
    }

    fn parse_error(
        &self,
        stidx: StIdx,
        token: Token<StorageT, ActionT>,
    ) -> ParseError<StorageT, ActionT> {
        let kind = if token.symbol() == Symbol::Token(self.grm.eof_token_idx()) {
            ParseErrorKind::UnexpectedEof
        } else {
            ParseErrorKind::UnexpectedToken
        };
        ParseError {
            kind,
            name: self.sym_name(token.symbol()),
            expected: self.expected_at(stidx),
            expected_limit: self.expected_limit,
            token,
        }
    }

    /// The names of every symbol `stidx` has an action or a goto for, tokens first.
    fn expected_at(&self, stidx: StIdx) -> Vec<String> {
        let mut expected = Vec::new();
        for tidx in self.stable.state_actions(stidx) {
            expected.push(self.grm.token_name(tidx).unwrap_or("$").to_string());
        }
        for ridx in self.grm.iter_rules() {
            if self.stable.goto(stidx, ridx).is_some() {
                expected.push(self.grm.rule_name(ridx).to_string());
            }
        }
        expected
    }

    fn sym_name(&self, sym: Symbol<StorageT>) -> String {
        match sym {
            Symbol::Rule(ridx) => self.grm.rule_name(ridx).to_string(),
            Symbol::Token(tidx) => self.grm.token_name(tidx).unwrap_or("$").to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParseErrorKind {
    /// The state reached at the end of input holds no action for the end-of-input token.
    UnexpectedEof,
    /// A state holds no action (or, for rule-typed tokens, no goto) for the next token.
    UnexpectedToken,
}

/// A parse error, recording the offending token and which symbols the state it died in would
/// have accepted instead.
#[derive(Debug)]
pub struct ParseError<StorageT, ActionT> {
    kind: ParseErrorKind,
    name: String,
    expected: Vec<String>,
    expected_limit: Option<usize>,
    token: Token<StorageT, ActionT>,
}

impl<StorageT, ActionT> ParseError<StorageT, ActionT> {
    pub fn kind(&self) -> ParseErrorKind {
        self.kind
    }

    /// The token the parser could do nothing with.
    pub fn token(&self) -> &Token<StorageT, ActionT> {
        &self.token
    }

    pub fn into_token(self) -> Token<StorageT, ActionT> {
        self.token
    }

    /// The names of the symbols the failing state had actions or gotos for, however many of
    /// them there are. [`ParseError`]'s `Display` impl is what the expected limit applies to.
    pub fn expected(&self) -> &[String] {
        &self.expected
    }
}

impl<StorageT, ActionT> fmt::Display for ParseError<StorageT, ActionT> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            ParseErrorKind::UnexpectedEof => {
                write!(f, "Unexpected end of input")?;
                if let Some(row) = self.token.row() {
                    write!(f, " on line {}", row)?;
                }
                write!(f, ".")
            }
            ParseErrorKind::UnexpectedToken => {
                write!(f, "Unexpected {}", self.name)?;
                let show = match self.expected_limit {
                    None => !self.expected.is_empty(),
                    Some(lim) => !self.expected.is_empty() && self.expected.len() <= lim,
                };
                if show {
                    write!(f, ", expecting {}", join_expected(&self.expected))?;
                }
                if let Some(row) = self.token.row() {
                    write!(f, " on line {}", row)?;
                    if let Some(col) = self.token.col() {
                        write!(f, ", column {}", col)?;
                    }
                }
                write!(f, ".")
            }
        }
    }
}

impl<StorageT: fmt::Debug, ActionT: fmt::Debug> Error for ParseError<StorageT, ActionT> {}

/// Join symbol names in the "a, b or c" style of prose.
fn join_expected(expected: &[String]) -> String {
    match expected.split_last() {
        None => String::new(),
        Some((last, [])) => last.clone(),
        Some((last, rest)) => format!("{} or {}", rest.join(", "), last),
    }
}
