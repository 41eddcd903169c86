use std::{
    collections::{HashMap, HashSet},
    error::Error,
    fmt,
    hash::Hash,
};

use indexmap::IndexMap;
use num_traits::{PrimInt, Unsigned};

use slrgrammar::{Symbol, TIdx};
use slrpar::Token;

use crate::{ALL_STATE, INITIAL_STATE, PREVIOUS_STATE, matchers::Matcher};

/// Computes the semantic value of a token from its matched text.
pub type LexAction<ActionT> = Box<dyn Fn(&str) -> Option<ActionT> + Send + Sync>;

#[derive(Debug, Eq, PartialEq)]
pub enum LexBuildError {
    /// Rules were declared under the reserved state name `previous`.
    ReservedStateName,
    /// A rule named `previous` as its switch target. Popping back to the previous state is
    /// expressed as [`SwitchTo::Previous`].
    ReservedSwitchTarget,
}

impl fmt::Display for LexBuildError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LexBuildError::ReservedStateName => {
                write!(f, "'{}' is a reserved lexer state name", PREVIOUS_STATE)
            }
            LexBuildError::ReservedSwitchTarget => write!(
                f,
                "'{}' cannot be a switch target; pop with SwitchTo::Previous",
                PREVIOUS_STATE
            ),
        }
    }
}

impl Error for LexBuildError {}

/// Where a rule sends the lexer after it matches.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SwitchTo {
    /// Push the named state onto the state stack and continue lexing in it.
    State(String),
    /// Pop the state stack, returning to the state the current one was entered from.
    Previous,
}

/// A single lexing rule: a [`Matcher`] plus what to do with its matches.
pub struct LexRule<StorageT, ActionT> {
    /// The token id bound by [`LexerDef::set_token_ids`], if this rule's name has been bound.
    tok_id: Option<TIdx<StorageT>>,
    name: Option<String>,
    matcher: Box<dyn Matcher>,
    action: Option<LexAction<ActionT>>,
    switch: Option<SwitchTo>,
}

impl<StorageT, ActionT> LexRule<StorageT, ActionT> {
    /// Create a rule whose matches become tokens named `name`. Rules with no name match and
    /// advance the lexer but produce no token.
    pub fn new(name: Option<&str>, matcher: Box<dyn Matcher>) -> Self {
        LexRule {
            tok_id: None,
            name: name.map(str::to_string),
            matcher,
            action: None,
            switch: None,
        }
    }

    /// Compute the semantic value of this rule's tokens with `f`, which is handed the matched
    /// text.
    pub fn action<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> Option<ActionT> + Send + Sync + 'static,
    {
        self.action = Some(Box::new(f));
        self
    }

    /// Switch lexer state after this rule matches.
    pub fn switch(mut self, switch: SwitchTo) -> Self {
        self.switch = Some(switch);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl<StorageT: Copy, ActionT> LexRule<StorageT, ActionT> {
    pub fn tok_id(&self) -> Option<TIdx<StorageT>> {
        self.tok_id
    }
}

/// Build up a [`LexerDef`] state by state, rule by rule.
pub struct LexerDefBuilder<StorageT, ActionT> {
    rules: IndexMap<String, Vec<LexRule<StorageT, ActionT>>>,
}

impl<StorageT, ActionT> LexerDefBuilder<StorageT, ActionT> {
    pub fn new() -> Self {
        LexerDefBuilder {
            rules: IndexMap::new(),
        }
    }

    /// Add `rule` to the lexer state `state`, declaring the state if this is its first rule.
    /// Within a state, rules match at the priority they were added in.
    pub fn rule(mut self, state: &str, rule: LexRule<StorageT, ActionT>) -> Self {
        self.rules
            .entry(state.to_string())
            .or_insert_with(Vec::new)
            .push(rule);
        self
    }

    pub fn build(self) -> Result<LexerDef<StorageT, ActionT>, LexBuildError> {
        if self.rules.contains_key(PREVIOUS_STATE) {
            return Err(LexBuildError::ReservedStateName);
        }
        for rules in self.rules.values() {
            for rule in rules {
                if let Some(SwitchTo::State(target)) = &rule.switch {
                    if target == PREVIOUS_STATE {
                        return Err(LexBuildError::ReservedSwitchTarget);
                    }
                }
            }
        }
        Ok(LexerDef { rules: self.rules })
    }
}

/// Everything tokens carry out of [`LexerDef::lex`]: the tokens themselves and how many rows
/// the input spanned, which the parser reports end-of-input errors against.
#[derive(Debug)]
pub struct LexOutput<StorageT, ActionT> {
    pub tokens: Vec<Token<StorageT, ActionT>>,
    pub rows: usize,
}

/// A set of lexing rules grouped into named lexer states. Lexing starts in the state named
/// `initial`; rules declared under `all` apply in every state, after the state's own rules.
pub struct LexerDef<StorageT, ActionT> {
    rules: IndexMap<String, Vec<LexRule<StorageT, ActionT>>>,
}

impl<StorageT, ActionT> fmt::Debug for LexerDef<StorageT, ActionT> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("LexerDef").finish_non_exhaustive()
    }
}

impl<StorageT: Copy + Eq + Hash + PrimInt + Unsigned, ActionT> LexerDef<StorageT, ActionT> {
    /// Iterate over the declared state names, in declaration order.
    pub fn iter_states(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// The rules declared under `state`, in declaration order.
    pub fn rules(&self, state: &str) -> Option<&[LexRule<StorageT, ActionT>]> {
        self.rules.get(state).map(Vec::as_slice)
    }

    /// Bind the grammar's token ids to this lexer's named rules, by name. Named rules whose
    /// name is not in `tokens_map` are left unbound. The return value is a tuple
    /// `(missing_from_lexer, missing_from_parser)` where:
    ///   1. If a token in `tokens_map` has no rule of that name, the first element is
    ///      `Some(...)` of all such token names.
    ///   2. If a named rule's name is not a key of `tokens_map`, the second element is
    ///      `Some(...)` of all such rule names.
    pub fn set_token_ids<'a>(
        &'a mut self,
        tokens_map: &HashMap<&'a str, TIdx<StorageT>>,
    ) -> (Option<HashSet<&'a str>>, Option<HashSet<&'a str>>) {
        let mut missing_from_parser_idxs = Vec::new();
        for (sidx, rules) in self.rules.values_mut().enumerate() {
            for (ridx, rule) in rules.iter_mut().enumerate() {
                if let Some(ref n) = rule.name {
                    match tokens_map.get(&**n) {
                        Some(tidx) => rule.tok_id = Some(*tidx),
                        None => {
                            rule.tok_id = None;
                            missing_from_parser_idxs.push((sidx, ridx));
                        }
                    }
                }
            }
        }

        let missing_from_parser = if missing_from_parser_idxs.is_empty() {
            None
        } else {
            let mut mfp = HashSet::with_capacity(missing_from_parser_idxs.len());
            for &(sidx, ridx) in &missing_from_parser_idxs {
                mfp.insert(self.rules[sidx][ridx].name.as_ref().unwrap().as_str());
            }
            Some(mfp)
        };

        let defined = self
            .rules
            .values()
            .flat_map(|rules| rules.iter())
            .filter_map(|rule| rule.name.as_deref())
            .collect::<HashSet<_>>();
        let missing_from_lexer = {
            let mfl = tokens_map
                .keys()
                .cloned()
                .filter(|n| !defined.contains(n))
                .collect::<HashSet<_>>();
            if mfl.is_empty() { None } else { Some(mfl) }
        };

        (missing_from_lexer, missing_from_parser)
    }

    /// Lex `input` from its start in the `initial` state. The first error encountered halts
    /// lexing. Tokens reference the matched text's semantic value (if the matching rule has an
    /// action), the state the rule matched in, and the 1-based row and column the match started
    /// at.
    pub fn lex(&self, input: &str) -> Result<LexOutput<StorageT, ActionT>, LexError> {
        let mut tokens = Vec::new();
        let mut stack = vec![INITIAL_STATE.to_string()];
        let mut row = 1;
        let mut col = 1;
        let mut off = 0;
        // An open run of unrecognized input: its start offset, row, and column.
        let mut unrec: Option<(usize, usize, usize)> = None;
        while off < input.len() {
            let state = stack.last().unwrap().clone();
            match self.rule_match(&state, input, off) {
                None => {
                    if unrec.is_none() {
                        unrec = Some((off, row, col));
                    }
                    let c = input[off..].chars().next().unwrap();
                    let clen = c.len_utf8();
                    advance_caret(&input[off..off + clen], &mut row, &mut col);
                    off += clen;
                }
                Some((rule, len)) => {
                    if let Some((start, urow, ucol)) = unrec {
                        return Err(LexError {
                            kind: LexErrorKind::Unrecognized(input[start..off].to_string()),
                            row: urow,
                            col: ucol,
                        });
                    }
                    let text = &input[off..off + len];
                    if let Some(name) = &rule.name {
                        match rule.tok_id {
                            Some(tidx) => {
                                let value = match &rule.action {
                                    Some(f) => f(text),
                                    None => None,
                                };
                                tokens.push(Token::with_context(
                                    Symbol::Token(tidx),
                                    value,
                                    Some(state.clone()),
                                    Some(row),
                                    Some(col),
                                ));
                            }
                            None => {
                                return Err(LexError {
                                    kind: LexErrorKind::UnboundToken(name.clone()),
                                    row,
                                    col,
                                });
                            }
                        }
                    }
                    match &rule.switch {
                        Some(SwitchTo::State(target)) => {
                            if self.rules.contains_key(target) {
                                stack.push(target.clone());
                            } else {
                                return Err(LexError {
                                    kind: LexErrorKind::UnknownState(target.clone()),
                                    row,
                                    col,
                                });
                            }
                        }
                        Some(SwitchTo::Previous) => {
                            if stack.len() == 1 {
                                return Err(LexError {
                                    kind: LexErrorKind::NoPreviousState,
                                    row,
                                    col,
                                });
                            }
                            stack.pop();
                        }
                        None => (),
                    }
                    advance_caret(text, &mut row, &mut col);
                    off += len;
                }
            }
        }
        if let Some((start, urow, ucol)) = unrec {
            return Err(LexError {
                kind: LexErrorKind::Unrecognized(input[start..].to_string()),
                row: urow,
                col: ucol,
            });
        }
        Ok(LexOutput { tokens, rows: row })
    }

    /// The first rule matching at `off` in `state`, and its match length. The state's own
    /// rules are tried first, then the `all` state's. Zero-length matches cannot advance the
    /// input and so do not count.
    fn rule_match(
        &self,
        state: &str,
        input: &str,
        off: usize,
    ) -> Option<(&LexRule<StorageT, ActionT>, usize)> {
        let own = self.rules.get(state).map(Vec::as_slice).unwrap_or(&[]);
        let all = if state == ALL_STATE {
            &[]
        } else {
            self.rules.get(ALL_STATE).map(Vec::as_slice).unwrap_or(&[])
        };
        for rule in own.iter().chain(all.iter()) {
            if let Some(len) = rule.matcher.find(input, off) {
                if len > 0 {
                    return Some((rule, len));
                }
            }
        }
        None
    }
}

#[derive(Debug, Eq, PartialEq)]
pub enum LexErrorKind {
    /// No rule matched. The payload is the whole run of input skipped over before a rule
    /// matched again or the input ended.
    Unrecognized(String),
    /// A rule matched whose name [`LexerDef::set_token_ids`] did not bind a token id to.
    UnboundToken(String),
    /// A rule switched to a lexer state no rules were declared under.
    UnknownState(String),
    /// A rule popped the state stack when the lexer was in the state it started in.
    NoPreviousState,
}

/// A lexing error and the 1-based row and column it occurred at.
#[derive(Debug, Eq, PartialEq)]
pub struct LexError {
    kind: LexErrorKind,
    row: usize,
    col: usize,
}

impl LexError {
    pub fn kind(&self) -> &LexErrorKind {
        &self.kind
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn col(&self) -> usize {
        self.col
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            LexErrorKind::Unrecognized(text) => write!(f, "Unrecognized text '{}'", text)?,
            LexErrorKind::UnboundToken(name) => {
                write!(f, "Token '{}' is not referenced by the grammar", name)?
            }
            LexErrorKind::UnknownState(name) => write!(f, "Unknown lexer state '{}'", name)?,
            LexErrorKind::NoPreviousState => write!(f, "No previous lexer state to return to")?,
        }
        write!(f, " on line {}, column {}.", self.row, self.col)
    }
}

impl Error for LexError {}

/// Advance `row` and `col` over `s`. Columns count characters, not bytes. `\r\n` and `\n\r`
/// each count as a single row.
fn advance_caret(s: &str, row: &mut usize, col: &mut usize) {
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\n' => {
                if chars.peek() == Some(&'\r') {
                    chars.next();
                }
                *row += 1;
                *col = 1;
            }
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                *row += 1;
                *col = 1;
            }
            _ => *col += 1,
        }
    }
}
