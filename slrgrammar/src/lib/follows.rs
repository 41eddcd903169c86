use std::cell::RefCell;

use num_traits::{AsPrimitive, PrimInt, Unsigned};
use vob::Vob;

use crate::{RIdx, Symbol, TIdx, firsts::Firsts, grammar::Grammar};

/// A lazy FOLLOW set solver.
///
/// The FOLLOW set of the start rule is the end-of-input token alone and is fixed at
/// construction; everything else is computed on demand and memoized per rule. For an occurrence
/// of a rule inside a production, only the symbol immediately after the occurrence is
/// consulted: its FIRST set is added and, if that symbol is nullable or the occurrence is at
/// the end of the production, the FOLLOW set of the production's own rule fills in the rest.
///
/// Cycle handling mirrors [`Firsts`]: computation carries a per-call set of rules already being
/// expanded, a blocked rule other than the one currently being computed marks the result
/// incomplete, and incomplete results are returned but not memoized.
pub struct Follows<'a, StorageT> {
    grm: &'a Grammar<StorageT>,
    firsts: Firsts<'a, StorageT>,
    sets: RefCell<Vec<Option<Vob>>>,
}

impl<'a, StorageT: 'static + PrimInt + Unsigned> Follows<'a, StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    pub fn new(grm: &'a Grammar<StorageT>) -> Self {
        let mut sets = vec![None; usize::from(grm.rules_len())];
        let mut eofs = Vob::from_elem(usize::from(grm.tokens_len()), false);
        eofs.set(usize::from(grm.eof_token_idx()), true);
        sets[usize::from(grm.start_rule_idx())] = Some(eofs);
        Follows {
            grm,
            firsts: Firsts::new(grm),
            sets: RefCell::new(sets),
        }
    }

    /// Return the FOLLOW set of rule `ridx` as a bitfield indexed by `TIdx`, computing it if it
    /// isn't cached yet.
    pub fn follows(&self, ridx: RIdx<StorageT>) -> Vob {
        let visited = Vob::from_elem(usize::from(self.grm.rules_len()), false);
        self.follows_cached(ridx, &visited)
    }

    /// Is the token `tidx` in the FOLLOW set of rule `ridx`?
    pub fn is_set(&self, ridx: RIdx<StorageT>, tidx: TIdx<StorageT>) -> bool {
        self.follows(ridx)[usize::from(tidx)]
    }

    fn follows_cached(&self, ridx: RIdx<StorageT>, visited: &Vob) -> Vob {
        let cached = self.sets.borrow()[usize::from(ridx)].clone();
        if let Some(fl) = cached {
            return fl;
        }
        let (fl, complete) = self.compute(ridx, visited);
        if complete {
            self.sets.borrow_mut()[usize::from(ridx)] = Some(fl.clone());
        }
        fl
    }

    fn compute(&self, ridx: RIdx<StorageT>, visited: &Vob) -> (Vob, bool) {
        let grm = self.grm;
        let mut visited = visited.clone();
        visited.set(usize::from(ridx), true);
        let mut fl = Vob::from_elem(usize::from(grm.tokens_len()), false);
        let mut incomplete = false;
        for &pidx in grm.prods_containing(ridx) {
            let left = grm.prod_to_rule(pidx);
            let prod = grm.prod(pidx);
            for sidx in 0..prod.len() {
                if prod[sidx] != Symbol::Rule(ridx) {
                    continue;
                }
                let mut include_left = sidx + 1 == prod.len();
                if !include_left {
                    let nxt = self.firsts.firsts_sym(prod[sidx + 1]);
                    fl.or(nxt.tokens());
                    include_left = nxt.is_epsilon_set();
                }
                if include_left {
                    if !visited[usize::from(left)] {
                        fl.or(&self.follows_cached(left, &visited));
                    } else if left != ridx {
                        incomplete = true;
                    }
                }
            }
        }
        (fl, !incomplete)
    }
}
