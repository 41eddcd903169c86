use std::{collections::HashMap, error::Error, fmt};

use indexmap::IndexSet;
use num_traits::{AsPrimitive, PrimInt, Unsigned};

use crate::{PIdx, RIdx, SIdx, Symbol, TIdx, firsts::Firsts, follows::Follows};

const START_RULE: &str = "^";

/// The type of a semantic action: it is handed the values of the production's symbols in
/// left-to-right order and produces the value of the rule instance. Actions are `Send + Sync`
/// so that a built grammar can be shared across concurrent parses.
pub type RuleAction<ActionT> = Box<dyn Fn(Vec<Option<ActionT>>) -> Option<ActionT> + Send + Sync>;

/// Errors raised by [`GrammarBuilder::build`].
#[derive(Debug, Eq, PartialEq)]
pub enum GrammarBuilderError {
    /// The start symbol has no rules.
    MissingStartRule(String),
    /// A name was declared as a token but also appears as a rule's left-hand side.
    TokenAlsoRule(String),
}

impl fmt::Display for GrammarBuilderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GrammarBuilderError::MissingStartRule(n) => {
                write!(f, "Start symbol '{}' has no rules", n)
            }
            GrammarBuilderError::TokenAlsoRule(n) => {
                write!(f, "'{}' is declared as both a token and a rule", n)
            }
        }
    }
}

impl Error for GrammarBuilderError {}

/// Incrementally builds a [`Grammar`] and its accompanying [`RuleActions`].
///
/// Rules are added by name; names appearing on a right-hand side which are never used as a
/// left-hand side are interned as tokens. Tokens which never appear in a right-hand side (e.g.
/// tokens a lexer produces but the grammar ignores) can be declared up-front with
/// [`token`](GrammarBuilder::token).
pub struct GrammarBuilder<ActionT> {
    start: String,
    tokens: IndexSet<String>,
    prods: Vec<(String, Vec<String>, Option<RuleAction<ActionT>>)>,
}

impl<ActionT> GrammarBuilder<ActionT> {
    pub fn new(start: &str) -> Self {
        GrammarBuilder {
            start: start.to_string(),
            tokens: IndexSet::new(),
            prods: Vec::new(),
        }
    }

    /// Declare `name` as a token, whether or not any production references it. Declared tokens
    /// are indexed before tokens which are interned from right-hand sides.
    pub fn token(mut self, name: &str) -> Self {
        self.tokens.insert(name.to_string());
        self
    }

    /// Add a production `name: rhs`, with the default action (the first symbol's value, or
    /// `None` for a zero-length production).
    pub fn rule(mut self, name: &str, rhs: &[&str]) -> Self {
        self.prods.push((
            name.to_string(),
            rhs.iter().map(|x| x.to_string()).collect(),
            None,
        ));
        self
    }

    /// Add a production `name: rhs` whose value is computed by `f`.
    pub fn rule_with_action<F>(mut self, name: &str, rhs: &[&str], f: F) -> Self
    where
        F: Fn(Vec<Option<ActionT>>) -> Option<ActionT> + Send + Sync + 'static,
    {
        self.prods.push((
            name.to_string(),
            rhs.iter().map(|x| x.to_string()).collect(),
            Some(Box::new(f)),
        ));
        self
    }

    /// Consume the builder, producing an augmented grammar and the parallel table of semantic
    /// actions.
    ///
    /// A fresh start rule (rule 0, production 0) referencing the start symbol is added, its name
    /// derived from `^` (extended until it clashes with no user rule). A synthetic end-of-input
    /// token with no name is interned after all user tokens.
    ///
    /// # Panics
    ///
    /// If the grammar does not fit into `StorageT`.
    pub fn build<StorageT: 'static + PrimInt + Unsigned>(
        self,
    ) -> Result<(Grammar<StorageT>, RuleActions<ActionT>), GrammarBuilderError>
    where
        usize: AsPrimitive<StorageT>,
    {
        let user_rules = self
            .prods
            .iter()
            .map(|(l, _, _)| l.clone())
            .collect::<IndexSet<_>>();
        if !user_rules.contains(&self.start) {
            return Err(GrammarBuilderError::MissingStartRule(self.start));
        }
        for name in &self.tokens {
            if user_rules.contains(name) {
                return Err(GrammarBuilderError::TokenAlsoRule(name.clone()));
            }
        }

        let mut start_rule = START_RULE.to_string();
        while user_rules.contains(&start_rule) {
            start_rule += START_RULE;
        }
        let mut rule_names = vec![start_rule];
        rule_names.extend(user_rules.iter().cloned());
        let rule_map = rule_names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect::<HashMap<_, _>>();

        let mut token_names = self
            .tokens
            .iter()
            .map(|n| Some(n.clone()))
            .collect::<Vec<_>>();
        let mut token_map = self
            .tokens
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect::<HashMap<_, _>>();
        for (_, rhs, _) in &self.prods {
            for name in rhs {
                if !rule_map.contains_key(name) && !token_map.contains_key(name) {
                    token_map.insert(name.clone(), token_names.len());
                    token_names.push(Some(name.clone()));
                }
            }
        }
        // The end-of-input token is interned after every named token and has no name.
        let eof_off = token_names.len();
        token_names.push(None);

        if StorageT::from(rule_names.len()).is_none() {
            panic!("StorageT is not big enough to store this grammar's rules.");
        }
        if StorageT::from(token_names.len()).is_none() {
            panic!("StorageT is not big enough to store this grammar's tokens.");
        }
        if StorageT::from(self.prods.len() + 1).is_none() {
            panic!("StorageT is not big enough to store this grammar's productions.");
        }
        for (_, rhs, _) in &self.prods {
            if StorageT::from(rhs.len()).is_none() {
                panic!(
                    "StorageT is not big enough to store the symbols of at least one of this grammar's productions."
                );
            }
        }

        let start_ridx = rule_map[&self.start];
        let mut prods = vec![vec![Symbol::Rule(RIdx(start_ridx.as_()))]];
        let mut prods_rules = vec![RIdx(StorageT::zero())];
        let mut rules_prods = vec![Vec::new(); rule_names.len()];
        rules_prods[0].push(PIdx(StorageT::zero()));
        let mut prods_containing = vec![Vec::new(); rule_names.len()];
        prods_containing[start_ridx].push(PIdx(StorageT::zero()));
        let mut actions = vec![None];
        for (left, rhs, action) in self.prods {
            let pidx = PIdx(prods.len().as_());
            let ridx = rule_map[&left];
            let mut syms = Vec::with_capacity(rhs.len());
            for name in &rhs {
                match rule_map.get(name) {
                    Some(&r) => {
                        let r_ridx = RIdx(r.as_());
                        if !prods_containing[r].contains(&pidx) {
                            prods_containing[r].push(pidx);
                        }
                        syms.push(Symbol::Rule(r_ridx));
                    }
                    None => syms.push(Symbol::Token(TIdx(token_map[name].as_()))),
                }
            }
            prods.push(syms);
            prods_rules.push(RIdx(ridx.as_()));
            rules_prods[ridx].push(pidx);
            actions.push(action);
        }

        Ok((
            Grammar {
                rules_len: RIdx(rule_names.len().as_()),
                rule_names,
                tokens_len: TIdx(token_names.len().as_()),
                token_names,
                eof_token_idx: TIdx(eof_off.as_()),
                prods_len: PIdx(prods.len().as_()),
                start_prod: PIdx(StorageT::zero()),
                prods,
                rules_prods,
                prods_rules,
                prods_containing,
            },
            RuleActions { actions },
        ))
    }
}

/// An augmented context-free grammar.
///
/// Rule 0 is the synthetic start rule and production 0 its single production; user rules and
/// productions follow in declaration order. The end-of-input token is the last token index and
/// has no name.
#[derive(Debug)]
pub struct Grammar<StorageT = u32> {
    rules_len: RIdx<StorageT>,
    rule_names: Vec<String>,
    tokens_len: TIdx<StorageT>,
    token_names: Vec<Option<String>>,
    eof_token_idx: TIdx<StorageT>,
    prods_len: PIdx<StorageT>,
    start_prod: PIdx<StorageT>,
    prods: Vec<Vec<Symbol<StorageT>>>,
    rules_prods: Vec<Vec<PIdx<StorageT>>>,
    prods_rules: Vec<RIdx<StorageT>>,
    prods_containing: Vec<Vec<PIdx<StorageT>>>,
}

impl<StorageT: 'static + PrimInt + Unsigned> Grammar<StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    /// How many productions does this grammar have?
    pub fn prods_len(&self) -> PIdx<StorageT> {
        self.prods_len
    }

    /// Return an iterator which produces (in order from `0..self.prods_len()`) all this
    /// grammar's valid `PIdx`s.
    pub fn iter_pidxs(&self) -> impl Iterator<Item = PIdx<StorageT>> {
        (0..usize::from(self.prods_len)).map(|x| PIdx(x.as_()))
    }

    /// Get the sequence of symbols for production `pidx`.
    pub fn prod(&self, pidx: PIdx<StorageT>) -> &[Symbol<StorageT>] {
        &self.prods[usize::from(pidx)]
    }

    /// How many symbols does production `pidx` have?
    pub fn prod_len(&self, pidx: PIdx<StorageT>) -> SIdx<StorageT> {
        SIdx(self.prods[usize::from(pidx)].len().as_())
    }

    /// Return the rule index of the production `pidx`.
    pub fn prod_to_rule(&self, pidx: PIdx<StorageT>) -> RIdx<StorageT> {
        self.prods_rules[usize::from(pidx)]
    }

    /// Return the production index of the start rule's sole production (defined by the
    /// construction process).
    pub fn start_prod(&self) -> PIdx<StorageT> {
        self.start_prod
    }

    /// How many rules does this grammar have?
    pub fn rules_len(&self) -> RIdx<StorageT> {
        self.rules_len
    }

    /// Return an iterator which produces (in order from `0..self.rules_len()`) all this
    /// grammar's valid `RIdx`s.
    pub fn iter_rules(&self) -> impl Iterator<Item = RIdx<StorageT>> {
        (0..usize::from(self.rules_len)).map(|x| RIdx(x.as_()))
    }

    /// Return the productions for rule `ridx`.
    pub fn rule_to_prods(&self, ridx: RIdx<StorageT>) -> &[PIdx<StorageT>] {
        &self.rules_prods[usize::from(ridx)]
    }

    /// Return the productions in whose right-hand side rule `ridx` appears. Each production is
    /// listed exactly once, however many of its symbols reference `ridx`.
    pub fn prods_containing(&self, ridx: RIdx<StorageT>) -> &[PIdx<StorageT>] {
        &self.prods_containing[usize::from(ridx)]
    }

    /// Return the name of rule `ridx`.
    pub fn rule_name(&self, ridx: RIdx<StorageT>) -> &str {
        &self.rule_names[usize::from(ridx)]
    }

    /// Return the `RIdx` of the rule named `n` or `None` if it doesn't exist.
    pub fn rule_idx(&self, n: &str) -> Option<RIdx<StorageT>> {
        self.rule_names
            .iter()
            .position(|x| x == n)
            .map(|x| RIdx(x.as_()))
    }

    /// Return the index of the start rule.
    pub fn start_rule_idx(&self) -> RIdx<StorageT> {
        self.prod_to_rule(self.start_prod)
    }

    /// How many tokens does this grammar have?
    pub fn tokens_len(&self) -> TIdx<StorageT> {
        self.tokens_len
    }

    /// Return an iterator which produces (in order from `0..self.tokens_len()`) all this
    /// grammar's valid `TIdx`s.
    pub fn iter_tidxs(&self) -> impl Iterator<Item = TIdx<StorageT>> {
        (0..usize::from(self.tokens_len)).map(|x| TIdx(x.as_()))
    }

    /// Return the index of the end-of-input token.
    pub fn eof_token_idx(&self) -> TIdx<StorageT> {
        self.eof_token_idx
    }

    /// Return the name of token `tidx`. The end-of-input token has no name.
    pub fn token_name(&self, tidx: TIdx<StorageT>) -> Option<&str> {
        self.token_names[usize::from(tidx)].as_deref()
    }

    /// Return the `TIdx` of the token named `n` or `None` if it doesn't exist.
    pub fn token_idx(&self, n: &str) -> Option<TIdx<StorageT>> {
        self.token_names
            .iter()
            .position(|x| x.as_deref() == Some(n))
            .map(|x| TIdx(x.as_()))
    }

    /// Return a map from names to `TIdx`s of all named tokens.
    pub fn tokens_map(&self) -> HashMap<&str, TIdx<StorageT>> {
        let mut m = HashMap::with_capacity(usize::from(self.tokens_len) - 1);
        for tidx in self.iter_tidxs() {
            if let Some(n) = self.token_names[usize::from(tidx)].as_deref() {
                m.insert(n, tidx);
            }
        }
        m
    }

    /// Pretty-print production `pidx`, quoting tokens.
    pub fn pp_prod(&self, pidx: PIdx<StorageT>) -> String {
        let mut sprod = String::new();
        sprod.push_str(self.rule_name(self.prod_to_rule(pidx)));
        sprod.push_str(" ->");
        for sym in self.prod(pidx) {
            let s = match *sym {
                Symbol::Token(tidx) => format!("'{}'", self.token_name(tidx).unwrap_or("$")),
                Symbol::Rule(ridx) => self.rule_name(ridx).to_string(),
            };
            sprod.push(' ');
            sprod.push_str(&s);
        }
        sprod
    }

    /// Return a lazy FIRST set solver for this grammar.
    pub fn firsts(&self) -> Firsts<'_, StorageT> {
        Firsts::new(self)
    }

    /// Return a lazy FOLLOW set solver for this grammar.
    pub fn follows(&self) -> Follows<'_, StorageT> {
        Follows::new(self)
    }
}

/// Semantic actions for each production of a [`Grammar`], indexed by `PIdx`.
pub struct RuleActions<ActionT> {
    actions: Vec<Option<RuleAction<ActionT>>>,
}

impl<ActionT> RuleActions<ActionT> {
    /// Compute the value of an instance of production `pidx` from the values of its symbols.
    /// Productions registered without an action pass the first value through unchanged;
    /// zero-length productions produce `None`.
    pub fn apply<StorageT: PrimInt + Unsigned>(
        &self,
        pidx: PIdx<StorageT>,
        args: Vec<Option<ActionT>>,
    ) -> Option<ActionT> {
        match &self.actions[usize::from(pidx)] {
            Some(f) => f(args),
            None => args.into_iter().next().unwrap_or(None),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{GrammarBuilder, GrammarBuilderError};
    use crate::{PIdx, RIdx, Symbol, TIdx};

    #[test]
    fn test_minimal() {
        let (grm, _) = GrammarBuilder::<()>::new("R")
            .token("b")
            .rule("R", &["S"])
            .rule("S", &["b"])
            .build::<u32>()
            .unwrap();

        assert_eq!(grm.start_prod(), PIdx(0));
        assert_eq!(grm.start_rule_idx(), RIdx(0));
        assert_eq!(grm.rule_name(RIdx(0)), "^");
        grm.rule_idx("^").unwrap();
        let r_rule_idx = grm.rule_idx("R").unwrap();
        let s_rule_idx = grm.rule_idx("S").unwrap();
        assert_eq!(r_rule_idx, RIdx(1));
        assert_eq!(s_rule_idx, RIdx(2));
        assert_eq!(grm.rules_len(), RIdx(3));
        assert_eq!(grm.prods_len(), PIdx(3));
        // "b" was declared, so it is interned before anything from a right-hand side.
        assert_eq!(grm.token_idx("b"), Some(TIdx(0)));
        assert_eq!(grm.tokens_len(), TIdx(2));
        assert_eq!(grm.eof_token_idx(), TIdx(1));
        assert_eq!(grm.token_name(grm.eof_token_idx()), None);

        assert_eq!(grm.rule_to_prods(RIdx(0)), &[PIdx(0)]);
        assert_eq!(grm.rule_to_prods(r_rule_idx), &[PIdx(1)]);
        assert_eq!(grm.rule_to_prods(s_rule_idx), &[PIdx(2)]);
        assert_eq!(grm.prod(PIdx(0)), &[Symbol::Rule(r_rule_idx)]);
        assert_eq!(grm.prod(PIdx(1)), &[Symbol::Rule(s_rule_idx)]);
        assert_eq!(grm.prod(PIdx(2)), &[Symbol::Token(TIdx(0))]);
        assert_eq!(grm.prod_to_rule(PIdx(0)), RIdx(0));
        assert_eq!(grm.prod_to_rule(PIdx(1)), r_rule_idx);
        assert_eq!(grm.prod_to_rule(PIdx(2)), s_rule_idx);
    }

    #[test]
    fn test_multiple_prods_one_rule() {
        let (grm, _) = GrammarBuilder::<()>::new("E")
            .rule("E", &["E", "+", "E"])
            .rule("E", &["id"])
            .build::<u32>()
            .unwrap();

        let e_ridx = grm.rule_idx("E").unwrap();
        assert_eq!(grm.rule_to_prods(e_ridx), &[PIdx(1), PIdx(2)]);
        assert_eq!(grm.prods_rules.as_slice(), &[RIdx(0), e_ridx, e_ridx]);
        // Right-hand side tokens are interned in first-occurrence order.
        assert_eq!(grm.token_idx("+"), Some(TIdx(0)));
        assert_eq!(grm.token_idx("id"), Some(TIdx(1)));
        assert_eq!(grm.eof_token_idx(), TIdx(2));
    }

    #[test]
    fn test_prods_containing() {
        let (grm, _) = GrammarBuilder::<()>::new("E")
            .rule("E", &["E", "+", "E"])
            .rule("E", &["(", "E", ")"])
            .rule("E", &["N"])
            .rule("N", &["digit"])
            .build::<u32>()
            .unwrap();

        let e_ridx = grm.rule_idx("E").unwrap();
        let n_ridx = grm.rule_idx("N").unwrap();
        // The production referencing E twice appears once only.
        assert_eq!(
            grm.prods_containing(e_ridx),
            &[PIdx(0), PIdx(1), PIdx(2)]
        );
        assert_eq!(grm.prods_containing(n_ridx), &[PIdx(3)]);
    }

    #[test]
    fn test_zero_length_prod() {
        let (grm, _) = GrammarBuilder::<()>::new("N")
            .rule("N", &["N", "digit"])
            .rule("N", &[])
            .build::<u32>()
            .unwrap();

        let n_ridx = grm.rule_idx("N").unwrap();
        assert_eq!(grm.rule_to_prods(n_ridx), &[PIdx(1), PIdx(2)]);
        assert!(grm.prod(PIdx(2)).is_empty());
        assert_eq!(usize::from(grm.prod_len(PIdx(2))), 0);
    }

    #[test]
    fn test_start_rule_uniquified() {
        let (grm, _) = GrammarBuilder::<()>::new("^")
            .rule("^", &["a"])
            .build::<u32>()
            .unwrap();

        assert_eq!(grm.rule_name(RIdx(0)), "^^");
        assert_eq!(grm.rule_idx("^"), Some(RIdx(1)));
        assert_eq!(grm.prod(PIdx(0)), &[Symbol::Rule(RIdx(1))]);
    }

    #[test]
    fn test_missing_start_rule() {
        match GrammarBuilder::<()>::new("S").rule("T", &["a"]).build::<u32>() {
            Err(GrammarBuilderError::MissingStartRule(n)) => assert_eq!(n, "S"),
            _ => panic!("Missing start rule not caught"),
        }
    }

    #[test]
    fn test_token_also_rule() {
        match GrammarBuilder::<()>::new("S")
            .token("S")
            .rule("S", &["a"])
            .build::<u32>()
        {
            Err(GrammarBuilderError::TokenAlsoRule(n)) => assert_eq!(n, "S"),
            _ => panic!("Token/rule clash not caught"),
        }
    }

    #[test]
    fn test_tokens_map() {
        let (grm, _) = GrammarBuilder::<()>::new("S")
            .rule("S", &["a", "b"])
            .build::<u32>()
            .unwrap();
        let m = grm.tokens_map();
        assert_eq!(m.len(), 2);
        assert_eq!(m["a"], grm.token_idx("a").unwrap());
        assert_eq!(m["b"], grm.token_idx("b").unwrap());
    }

    #[test]
    fn test_pp_prod() {
        let (grm, _) = GrammarBuilder::<()>::new("E")
            .rule("E", &["E", "+", "E"])
            .rule("E", &[])
            .build::<u32>()
            .unwrap();
        assert_eq!(grm.pp_prod(PIdx(0)), "^ -> E");
        assert_eq!(grm.pp_prod(PIdx(1)), "E -> E '+' E");
        assert_eq!(grm.pp_prod(PIdx(2)), "E ->");
    }

    #[test]
    fn test_actions() {
        let (grm, actions) = GrammarBuilder::<u64>::new("E")
            .rule_with_action("E", &["E", "+", "E"], |mut args| {
                Some(args.remove(0).unwrap() + args.remove(1).unwrap())
            })
            .rule("E", &["num"])
            .rule("E", &[])
            .build::<u32>()
            .unwrap();

        let plus_pidx = grm.rule_to_prods(grm.rule_idx("E").unwrap())[0];
        assert_eq!(
            actions.apply(plus_pidx, vec![Some(2), None, Some(3)]),
            Some(5)
        );
        // The default action passes the first value through.
        assert_eq!(actions.apply(PIdx(2u32), vec![Some(7)]), Some(7));
        // Zero-length productions have no first value.
        assert_eq!(actions.apply(PIdx(3u32), vec![]), None);
    }

    #[test]
    #[should_panic(expected = "not big enough")]
    fn test_storaget_overflow() {
        let mut gb = GrammarBuilder::<()>::new("S").rule("S", &["t0"]);
        for i in 0..300 {
            gb = gb.token(&format!("t{}", i));
        }
        let _ = gb.build::<u8>();
    }
}
