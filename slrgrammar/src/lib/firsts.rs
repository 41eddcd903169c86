use std::{cell::RefCell, marker::PhantomData};

use num_traits::{AsPrimitive, PrimInt, Unsigned};
use vob::Vob;

use crate::{RIdx, Symbol, TIdx, grammar::Grammar};

/// The FIRST set of a single rule: the tokens which can begin strings derived from it, plus a
/// flag recording whether it can derive the empty string. The flag is deliberately not a token:
/// zero-length derivations have no token to show for themselves.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FirstSet<StorageT> {
    tokens: Vob,
    epsilon: bool,
    phantom: PhantomData<StorageT>,
}

impl<StorageT: 'static + PrimInt + Unsigned> FirstSet<StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    fn empty(tokens_len: usize) -> Self {
        FirstSet {
            tokens: Vob::from_elem(tokens_len, false),
            epsilon: false,
            phantom: PhantomData,
        }
    }

    /// The tokens of this set as a bitfield indexed by `TIdx`.
    pub fn tokens(&self) -> &Vob {
        &self.tokens
    }

    /// Is the token `tidx` in this set?
    pub fn is_set(&self, tidx: TIdx<StorageT>) -> bool {
        self.tokens[usize::from(tidx)]
    }

    /// Can the rule this set describes derive the empty string?
    pub fn is_epsilon_set(&self) -> bool {
        self.epsilon
    }
}

/// A lazy FIRST set solver.
///
/// Sets are computed on demand and memoized per rule. Computation carries a per-call set of
/// rules already being expanded: a right-hand symbol found in that set contributes nothing, is
/// not counted towards the all-nullable check, and scanning continues past it. A cycle back
/// into the rule currently being computed is harmless, but a blocked symbol other than the
/// current rule means the result may be missing entries from elsewhere in the cycle, so it is
/// returned to the caller but not memoized; a later call can complete and cache it.
///
/// For example, given this code and grammar:
/// ```text
///   let (grm, _) = GrammarBuilder::<()>::new("S")
///       .rule("S", &["A", "b"])
///       .rule("A", &["a"])
///       .rule("A", &[])
///       .build::<u32>()
///       .unwrap();
///   let firsts = grm.firsts();
/// ```
/// then the following assertions (and only the following assertions) about the firsts set are
/// correct:
/// ```text
///   assert!(firsts.is_set(grm.rule_idx("S").unwrap(), grm.token_idx("a").unwrap()));
///   assert!(firsts.is_set(grm.rule_idx("S").unwrap(), grm.token_idx("b").unwrap()));
///   assert!(firsts.is_set(grm.rule_idx("A").unwrap(), grm.token_idx("a").unwrap()));
///   assert!(firsts.is_epsilon_set(grm.rule_idx("A").unwrap()));
/// ```
pub struct Firsts<'a, StorageT> {
    grm: &'a Grammar<StorageT>,
    sets: RefCell<Vec<Option<FirstSet<StorageT>>>>,
}

impl<'a, StorageT: 'static + PrimInt + Unsigned> Firsts<'a, StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    pub fn new(grm: &'a Grammar<StorageT>) -> Self {
        Firsts {
            grm,
            sets: RefCell::new(vec![None; usize::from(grm.rules_len())]),
        }
    }

    /// Return the FIRST set of rule `ridx`, computing it if it isn't cached yet.
    pub fn firsts(&self, ridx: RIdx<StorageT>) -> FirstSet<StorageT> {
        let visited = Vob::from_elem(usize::from(self.grm.rules_len()), false);
        self.firsts_cached(ridx, &visited)
    }

    /// Return the FIRST set of a symbol. For a token this is the singleton set containing it.
    pub fn firsts_sym(&self, sym: Symbol<StorageT>) -> FirstSet<StorageT> {
        match sym {
            Symbol::Rule(ridx) => self.firsts(ridx),
            Symbol::Token(tidx) => {
                let mut fs = FirstSet::empty(usize::from(self.grm.tokens_len()));
                fs.tokens.set(usize::from(tidx), true);
                fs
            }
        }
    }

    /// Is the token `tidx` in the FIRST set of rule `ridx`?
    pub fn is_set(&self, ridx: RIdx<StorageT>, tidx: TIdx<StorageT>) -> bool {
        self.firsts(ridx).is_set(tidx)
    }

    /// Can rule `ridx` derive the empty string?
    pub fn is_epsilon_set(&self, ridx: RIdx<StorageT>) -> bool {
        self.firsts(ridx).is_epsilon_set()
    }

    fn firsts_cached(&self, ridx: RIdx<StorageT>, visited: &Vob) -> FirstSet<StorageT> {
        let cached = self.sets.borrow()[usize::from(ridx)].clone();
        if let Some(fs) = cached {
            return fs;
        }
        let (fs, complete) = self.compute(ridx, visited);
        if complete {
            self.sets.borrow_mut()[usize::from(ridx)] = Some(fs.clone());
        }
        fs
    }

    fn compute(&self, ridx: RIdx<StorageT>, visited: &Vob) -> (FirstSet<StorageT>, bool) {
        let grm = self.grm;
        let mut visited = visited.clone();
        visited.set(usize::from(ridx), true);
        let mut fs = FirstSet::empty(usize::from(grm.tokens_len()));
        let mut incomplete = false;
        for &pidx in grm.rule_to_prods(ridx) {
            let prod = grm.prod(pidx);
            if prod.is_empty() {
                fs.epsilon = true;
                continue;
            }
            let mut nullable = 0;
            for sym in prod.iter() {
                match *sym {
                    Symbol::Token(s_tidx) => {
                        fs.tokens.set(usize::from(s_tidx), true);
                        break;
                    }
                    Symbol::Rule(s_ridx) => {
                        if visited[usize::from(s_ridx)] {
                            if s_ridx != ridx {
                                incomplete = true;
                            }
                            continue;
                        }
                        let sym_fs = self.firsts_cached(s_ridx, &visited);
                        fs.tokens.or(sym_fs.tokens());
                        if sym_fs.is_epsilon_set() {
                            nullable += 1;
                        } else {
                            break;
                        }
                    }
                }
            }
            // Epsilon is in FIRST only if every symbol of the production could derive the empty
            // string. Blocked symbols were skipped above and so can never satisfy this.
            if nullable == prod.len() {
                fs.epsilon = true;
            }
        }
        (fs, !incomplete)
    }
}

#[cfg(test)]
mod test {
    use super::Firsts;
    use crate::grammar::{Grammar, GrammarBuilder};
    use num_traits::{AsPrimitive, PrimInt, Unsigned};

    fn has<StorageT: 'static + PrimInt + Unsigned>(
        grm: &Grammar<StorageT>,
        firsts: &Firsts<StorageT>,
        rn: &str,
        should_be: Vec<&str>,
    ) where
        usize: AsPrimitive<StorageT>,
    {
        let ridx = grm.rule_idx(rn).unwrap();
        for tidx in grm.iter_tidxs() {
            let n = match grm.token_name(tidx) {
                Some(n) => n,
                None => "<no name>",
            };
            match should_be.iter().position(|&x| x == n) {
                Some(_) => {
                    if !firsts.is_set(ridx, tidx) {
                        panic!("{} is not set in {}", n, rn);
                    }
                }
                None => {
                    if firsts.is_set(ridx, tidx) {
                        panic!("{} is incorrectly set in {}", n, rn);
                    }
                }
            }
        }
        if should_be.iter().any(|x| x == &"") {
            assert!(firsts.is_epsilon_set(ridx));
        } else {
            assert!(!firsts.is_epsilon_set(ridx));
        }
    }

    #[test]
    fn test_first() {
        let (grm, _) = GrammarBuilder::<()>::new("C")
            .rule("C", &["c"])
            .rule("D", &["d"])
            .rule("E", &["D"])
            .rule("E", &["C"])
            .rule("F", &["E"])
            .build::<u32>()
            .unwrap();
        let firsts = grm.firsts();
        has(&grm, &firsts, "^", vec!["c"]);
        has(&grm, &firsts, "D", vec!["d"]);
        has(&grm, &firsts, "E", vec!["d", "c"]);
        has(&grm, &firsts, "F", vec!["d", "c"]);
    }

    #[test]
    fn test_first_no_subsequent_rules() {
        let (grm, _) = GrammarBuilder::<()>::new("C")
            .rule("C", &["c"])
            .rule("D", &["d"])
            .rule("E", &["D", "C"])
            .build::<u32>()
            .unwrap();
        let firsts = grm.firsts();
        has(&grm, &firsts, "E", vec!["d"]);
    }

    #[test]
    fn test_first_epsilon() {
        let (grm, _) = GrammarBuilder::<()>::new("A")
            .rule("A", &["B", "a"])
            .rule("B", &["b"])
            .rule("B", &[])
            .rule("C", &["c"])
            .rule("C", &[])
            .rule("D", &["C"])
            .build::<u32>()
            .unwrap();
        let firsts = grm.firsts();
        has(&grm, &firsts, "A", vec!["b", "a"]);
        has(&grm, &firsts, "C", vec!["c", ""]);
        has(&grm, &firsts, "D", vec!["c", ""]);
    }

    #[test]
    fn test_last_epsilon() {
        let (grm, _) = GrammarBuilder::<()>::new("A")
            .rule("A", &["B", "C"])
            .rule("B", &["b"])
            .rule("B", &[])
            .rule("C", &["B", "c", "B"])
            .build::<u32>()
            .unwrap();
        let firsts = grm.firsts();
        has(&grm, &firsts, "A", vec!["b", "c"]);
        has(&grm, &firsts, "B", vec!["b", ""]);
        has(&grm, &firsts, "C", vec!["b", "c"]);
    }

    #[test]
    fn test_first_no_multiples() {
        let (grm, _) = GrammarBuilder::<()>::new("A")
            .rule("A", &["B", "b"])
            .rule("B", &["b"])
            .rule("B", &[])
            .build::<u32>()
            .unwrap();
        let firsts = grm.firsts();
        has(&grm, &firsts, "A", vec!["b"]);
    }

    #[test]
    fn test_first_left_recursive() {
        // A blocked self-reference is scanned past, so the token after it turns up in the set.
        let (grm, _) = GrammarBuilder::<()>::new("N")
            .rule("N", &["N", "digit"])
            .rule("N", &[])
            .build::<u32>()
            .unwrap();
        let firsts = grm.firsts();
        has(&grm, &firsts, "N", vec!["digit", ""]);
    }

    #[test]
    fn test_first_mutual_recursion() {
        // X's computation blocks on X inside Y, so Y's set is returned partial and not cached;
        // the later direct call for Y completes against the now-cached X.
        let (grm, _) = GrammarBuilder::<()>::new("X")
            .rule("X", &["Y", "x"])
            .rule("X", &["a"])
            .rule("Y", &["X", "y"])
            .rule("Y", &["b"])
            .build::<u32>()
            .unwrap();
        let firsts = grm.firsts();
        has(&grm, &firsts, "X", vec!["a", "b", "y"]);
        has(&grm, &firsts, "Y", vec!["a", "b", "y"]);
    }

    fn eco_grammar() -> Grammar<u32> {
        let (grm, _) = GrammarBuilder::<()>::new("S")
            .rule("S", &["S", "b"])
            .rule("S", &["b", "A", "a"])
            .rule("S", &["a"])
            .rule("A", &["a", "S", "c"])
            .rule("A", &["a"])
            .rule("A", &["a", "S", "b"])
            .rule("B", &["A", "S"])
            .rule("C", &["D", "A"])
            .rule("D", &["d"])
            .rule("D", &[])
            .rule("F", &["C", "D", "f"])
            .build::<u32>()
            .unwrap();
        grm
    }

    #[test]
    fn test_first_from_eco() {
        let grm = eco_grammar();
        let firsts = grm.firsts();
        has(&grm, &firsts, "S", vec!["a", "b"]);
        has(&grm, &firsts, "A", vec!["a"]);
        has(&grm, &firsts, "B", vec!["a"]);
        has(&grm, &firsts, "D", vec!["d", ""]);
        has(&grm, &firsts, "C", vec!["d", "a"]);
        has(&grm, &firsts, "F", vec!["d", "a"]);
    }

    #[test]
    fn test_first_sym() {
        let (grm, _) = GrammarBuilder::<()>::new("S")
            .rule("S", &["a"])
            .build::<u32>()
            .unwrap();
        let firsts = grm.firsts();
        let a_tidx = grm.token_idx("a").unwrap();
        let fs = firsts.firsts_sym(crate::Symbol::Token(a_tidx));
        assert!(fs.is_set(a_tidx));
        assert!(!fs.is_epsilon_set());
        let fs = firsts.firsts_sym(crate::Symbol::Rule(grm.rule_idx("S").unwrap()));
        assert!(fs.is_set(a_tidx));
    }
}
