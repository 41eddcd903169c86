use std::{
    collections::{
        VecDeque,
        hash_map::{Entry, HashMap},
    },
    hash::{BuildHasherDefault, Hash},
};

use fnv::FnvHasher;
use num_traits::{AsPrimitive, PrimInt, Unsigned};

use slrgrammar::{Grammar, SIdx, Symbol};

use crate::{
    StIdx, StIdxStorageT,
    itemset::{Item, Itemset},
};

#[derive(Debug)]
pub struct StateGraph<StorageT: Eq + Hash> {
    /// The closed itemset of each state. The start state is always at offset 0.
    states: Vec<Itemset<StorageT>>,
    /// For each state in `states`, edges is a hashmap from symbols to state offsets.
    edges: Vec<HashMap<Symbol<StorageT>, StIdx>>,
}

impl<StorageT: 'static + Hash + PrimInt + Unsigned> StateGraph<StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    /// Build the canonical LR(0) state graph for `grm` by breadth-first exploration from the
    /// start production's closed itemset. States are deduplicated structurally, so each distinct
    /// closed itemset appears exactly once.
    pub fn new(grm: &Grammar<StorageT>) -> Self {
        let mut start_is = Itemset::new();
        start_is.add(Item::new(grm, grm.start_prod(), SIdx(StorageT::zero())));
        let start_is = start_is.close(grm);

        let mut states = vec![start_is.clone()];
        let mut edges = Vec::new();
        let mut seen = HashMap::with_hasher(BuildHasherDefault::<FnvHasher>::default());
        seen.insert(start_is, StIdx(0));
        let mut todo = VecDeque::new();
        todo.push_back(StIdx(0));
        while let Some(stidx) = todo.pop_front() {
            // States enter todo in index order, so edges grows in lockstep with the state
            // being processed.
            debug_assert_eq!(edges.len(), usize::from(stidx));
            let state = states[usize::from(stidx)].clone();
            let mut st_edges = HashMap::new();
            for sym in state.next_syms(grm) {
                let nxt = state.goto(grm, sym);
                let nxt_stidx = match seen.entry(nxt) {
                    Entry::Occupied(e) => *e.get(),
                    Entry::Vacant(e) => {
                        let nxt_stidx = StIdx::from(states.len());
                        states.push(e.key().clone());
                        todo.push_back(nxt_stidx);
                        e.insert(nxt_stidx);
                        nxt_stidx
                    }
                };
                let old = st_edges.insert(sym, nxt_stidx);
                debug_assert!(old.is_none());
            }
            edges.push(st_edges);
        }
        StateGraph { states, edges }
    }

    /// Return this state graph's start state.
    pub fn start_state(&self) -> StIdx {
        StIdx(0)
    }

    /// Return an iterator which produces (in order from `0..self.all_states_len()`) all this
    /// graph's valid `StIdx`s.
    pub fn iter_stidxs(&self) -> Box<dyn Iterator<Item = StIdx>> {
        // We can use as safely, because we know that we're only generating integers from
        // 0..self.states.len() which we've already checked fits within StIdxStorageT.
        Box::new((0..self.states.len()).map(|x| StIdx(x as StIdxStorageT)))
    }

    /// Return the closed itemset for state `stidx`. Panics if `stidx` doesn't exist.
    pub fn itemset(&self, stidx: StIdx) -> &Itemset<StorageT> {
        &self.states[usize::from(stidx)]
    }

    /// Return an iterator over all itemsets in this `StateGraph`.
    pub fn iter_itemsets<'a>(&'a self) -> Box<dyn Iterator<Item = &'a Itemset<StorageT>> + 'a> {
        Box::new(self.states.iter())
    }

    /// How many states does this `StateGraph` contain?
    pub fn all_states_len(&self) -> StIdx {
        StIdx::from(self.states.len())
    }

    /// Return the state pointed to by `sym` from `stidx` or `None` otherwise.
    pub fn edge(&self, stidx: StIdx, sym: Symbol<StorageT>) -> Option<StIdx> {
        self.edges
            .get(usize::from(stidx))
            .and_then(|x| x.get(&sym))
            .cloned()
    }

    /// Return the edges for state `stidx`. Panics if `stidx` doesn't exist.
    pub fn edges(&self, stidx: StIdx) -> &HashMap<Symbol<StorageT>, StIdx> {
        &self.edges[usize::from(stidx)]
    }

    /// How many edges does this `StateGraph` contain?
    pub fn all_edges_len(&self) -> usize {
        self.edges.iter().fold(0, |a, x| a + x.len())
    }

    /// Pretty print this stategraph as a `String`, one state per block with its items and
    /// outgoing edges.
    pub fn pp(&self, grm: &Grammar<StorageT>) -> String {
        fn num_digits(i: StIdx) -> usize {
            if usize::from(i) == 0 {
                1
            } else {
                ((usize::from(i) as f64).log10() as usize) + 1
            }
        }

        fn fmt_sym<StorageT: 'static + PrimInt + Unsigned>(
            grm: &Grammar<StorageT>,
            sym: Symbol<StorageT>,
        ) -> String
        where
            usize: AsPrimitive<StorageT>,
        {
            match sym {
                Symbol::Rule(ridx) => grm.rule_name(ridx).to_string(),
                Symbol::Token(tidx) => format!("'{}'", grm.token_name(tidx).unwrap_or("$")),
            }
        }

        let mut o = String::new();
        for (stidx, st) in self.iter_stidxs().zip(self.states.iter()) {
            if usize::from(stidx) != 0 {
                o.push('\n');
            }
            {
                let padding = num_digits(self.all_states_len()) - num_digits(stidx);
                o.push_str(&format!("{}:{}", usize::from(stidx), " ".repeat(padding)));
            }

            for (i, item) in st.items().iter().enumerate() {
                let padding = if i == 0 {
                    0
                } else {
                    o.push_str("\n "); // Extra space to compensate for ":" printed above
                    num_digits(self.all_states_len())
                };
                o.push_str(&format!(
                    "{} [{} ->",
                    " ".repeat(padding),
                    grm.rule_name(grm.prod_to_rule(item.pidx()))
                ));
                for (sidx, ssym) in grm.prod(item.pidx()).iter().enumerate() {
                    if sidx == usize::from(item.dot()) {
                        o.push_str(" .");
                    }
                    o.push_str(&format!(" {}", fmt_sym(grm, *ssym)));
                }
                if item.is_complete(grm) {
                    o.push_str(" .");
                }
                o.push(']');
            }
            let mut st_edges = self.edges(stidx).iter().collect::<Vec<_>>();
            st_edges.sort_by_key(|(sym, _)| match **sym {
                Symbol::Token(tidx) => (0, usize::from(tidx)),
                Symbol::Rule(ridx) => (1, usize::from(ridx)),
            });
            for (esym, e_stidx) in st_edges {
                o.push_str(&format!(
                    "\n{}{} -> {}",
                    " ".repeat(num_digits(self.all_states_len()) + 2),
                    fmt_sym(grm, *esym),
                    usize::from(*e_stidx)
                ));
            }
        }
        o
    }
}

#[cfg(test)]
pub fn state_exists<StorageT: 'static + Hash + PrimInt + Unsigned>(
    grm: &Grammar<StorageT>,
    is: &Itemset<StorageT>,
    nt: &str,
    prod_off: usize,
    dot: usize,
) where
    usize: AsPrimitive<StorageT>,
{
    let pidx = grm.rule_to_prods(grm.rule_idx(nt).unwrap())[prod_off];
    let item = Item::new(grm, pidx, SIdx(dot.as_()));
    if !is.items().contains(&item) {
        panic!(
            "item with dot {} is not in production {} of {} when it should be",
            dot, prod_off, nt
        );
    }
}

#[cfg(test)]
mod test {
    use super::{StateGraph, state_exists};
    use crate::StIdx;
    use slrgrammar::{GrammarBuilder, Symbol};

    #[test]
    fn test_stategraph() {
        let (grm, _) = GrammarBuilder::<()>::new("S")
            .rule("S", &["S", "b"])
            .rule("S", &["b", "A", "a"])
            .rule("A", &["a"])
            .build::<u32>()
            .unwrap();
        let sg = StateGraph::new(&grm);

        assert_eq!(sg.start_state(), StIdx(0));
        assert_eq!(sg.all_states_len(), StIdx(7));
        assert_eq!(sg.all_edges_len(), 6);
        assert_eq!(
            sg.iter_itemsets().fold(0, |a, x| a + x.len()),
            11
        );

        let s0 = sg.start_state();
        assert_eq!(sg.itemset(s0).len(), 3);
        state_exists(&grm, sg.itemset(s0), "^", 0, 0);
        state_exists(&grm, sg.itemset(s0), "S", 0, 0);
        state_exists(&grm, sg.itemset(s0), "S", 1, 0);

        let s1 = sg.edge(s0, Symbol::Rule(grm.rule_idx("S").unwrap())).unwrap();
        state_exists(&grm, sg.itemset(s1), "^", 0, 1);
        state_exists(&grm, sg.itemset(s1), "S", 0, 1);

        let s2 = sg.edge(s0, Symbol::Token(grm.token_idx("b").unwrap())).unwrap();
        state_exists(&grm, sg.itemset(s2), "S", 1, 1);
        state_exists(&grm, sg.itemset(s2), "A", 0, 0);

        let s3 = sg.edge(s1, Symbol::Token(grm.token_idx("b").unwrap())).unwrap();
        assert_eq!(sg.itemset(s3).len(), 1);
        state_exists(&grm, sg.itemset(s3), "S", 0, 2);

        let s4 = sg.edge(s2, Symbol::Rule(grm.rule_idx("A").unwrap())).unwrap();
        state_exists(&grm, sg.itemset(s4), "S", 1, 2);

        let s5 = sg.edge(s2, Symbol::Token(grm.token_idx("a").unwrap())).unwrap();
        state_exists(&grm, sg.itemset(s5), "A", 0, 1);

        let s6 = sg.edge(s4, Symbol::Token(grm.token_idx("a").unwrap())).unwrap();
        state_exists(&grm, sg.itemset(s6), "S", 1, 3);
        assert!(sg.edges(s6).is_empty());
    }

    #[test]
    #[rustfmt::skip]
    fn test_stategraph_brackets() {
        // Taken from p13 of https://link.springer.com/article/10.1007/s00236-010-0115-6
        let (grm, _) = GrammarBuilder::<()>::new("A")
            .rule("A", &["OPEN_BRACKET", "A", "CLOSE_BRACKET"])
            .rule("A", &["a"])
            .rule("A", &["b"])
            .build::<u32>()
            .unwrap();
        let sg = StateGraph::new(&grm);
        assert_eq!(sg.all_states_len(), StIdx(7));
        assert_eq!(sg.all_edges_len(), 9);
        assert_eq!(sg.iter_itemsets().fold(0, |a, x| a + x.len()), 13);

        // This follows the (not particularly logical) ordering of state numbers in the paper.
        let s0 = StIdx(0);
        sg.edge(s0, Symbol::Rule(grm.rule_idx("A").unwrap())).unwrap(); // s1
        let s2 = sg.edge(s0, Symbol::Token(grm.token_idx("a").unwrap())).unwrap();
        let s3 = sg.edge(s0, Symbol::Token(grm.token_idx("b").unwrap())).unwrap();
        let s5 = sg.edge(s0, Symbol::Token(grm.token_idx("OPEN_BRACKET").unwrap())).unwrap();
        assert_eq!(s2, sg.edge(s5, Symbol::Token(grm.token_idx("a").unwrap())).unwrap());
        assert_eq!(s3, sg.edge(s5, Symbol::Token(grm.token_idx("b").unwrap())).unwrap());
        assert_eq!(s5, sg.edge(s5, Symbol::Token(grm.token_idx("OPEN_BRACKET").unwrap())).unwrap());
        let s4 = sg.edge(s5, Symbol::Rule(grm.rule_idx("A").unwrap())).unwrap();
        sg.edge(s4, Symbol::Token(grm.token_idx("CLOSE_BRACKET").unwrap())).unwrap(); // s6
    }

    #[test]
    fn test_pp() {
        let (grm, _) = GrammarBuilder::<()>::new("S")
            .rule("S", &["b"])
            .build::<u32>()
            .unwrap();
        let sg = StateGraph::new(&grm);
        assert_eq!(sg.all_states_len(), StIdx(3));
        let expected = "0: [^ -> . S]\n   [S -> . 'b']\n   'b' -> 2\n   S -> 1\n\
                        1: [^ -> S .]\n\
                        2: [S -> 'b' .]";
        assert_eq!(sg.pp(&grm), expected);
    }
}
