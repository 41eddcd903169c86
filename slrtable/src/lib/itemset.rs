use std::collections::{BTreeSet, VecDeque};

use num_traits::{AsPrimitive, PrimInt, Unsigned};
use vob::Vob;

use slrgrammar::{Grammar, PIdx, SIdx, Symbol};

/// An LR(0) item: a production with a dot at some position in its right-hand side.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Item<StorageT> {
    pidx: PIdx<StorageT>,
    dot: SIdx<StorageT>,
}

impl<StorageT: 'static + PrimInt + Unsigned> Item<StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    /// Create an item for production `pidx` with the dot at `dot`. Panics if `dot` is past the
    /// end of the production.
    pub fn new(grm: &Grammar<StorageT>, pidx: PIdx<StorageT>, dot: SIdx<StorageT>) -> Self {
        assert!(usize::from(dot) <= grm.prod(pidx).len());
        Item { pidx, dot }
    }

    pub fn pidx(&self) -> PIdx<StorageT> {
        self.pidx
    }

    pub fn dot(&self) -> SIdx<StorageT> {
        self.dot
    }

    /// The symbol immediately after the dot, or `None` if the dot is at the end.
    pub fn next_sym(&self, grm: &Grammar<StorageT>) -> Option<Symbol<StorageT>> {
        grm.prod(self.pidx).get(usize::from(self.dot)).copied()
    }

    /// Has the dot reached the end of the production?
    pub fn is_complete(&self, grm: &Grammar<StorageT>) -> bool {
        usize::from(self.dot) == grm.prod(self.pidx).len()
    }

    /// Return the item with the dot moved one symbol to the right, or `None` if the dot is
    /// already at the end.
    pub fn step(&self, grm: &Grammar<StorageT>) -> Option<Item<StorageT>> {
        if self.is_complete(grm) {
            None
        } else {
            Some(Item::new(
                grm,
                self.pidx,
                SIdx((usize::from(self.dot) + 1).as_()),
            ))
        }
    }
}

/// An ordered set of items. Itemsets compare and hash structurally, which is what lets the
/// state graph use them as state keys.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Itemset<StorageT> {
    items: BTreeSet<Item<StorageT>>,
}

impl<StorageT: 'static + PrimInt + Unsigned> Itemset<StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    /// Create a blank Itemset.
    pub fn new() -> Self {
        Itemset {
            items: BTreeSet::new(),
        }
    }

    /// Add `item` to this itemset. Returns true if this led to any changes in the itemset.
    pub fn add(&mut self, item: Item<StorageT>) -> bool {
        self.items.insert(item)
    }

    pub fn items(&self) -> &BTreeSet<Item<StorageT>> {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Create a new itemset which is a closed version of `self`: whenever an item's dot sits
    /// before a rule, every production of that rule is present with the dot at position 0.
    pub fn close(&self, grm: &Grammar<StorageT>) -> Self {
        let mut new_is = self.clone();
        let mut todo = self.items.iter().copied().collect::<VecDeque<_>>();
        // Items carry no lookahead, so each rule needs expanding at most once.
        let mut seen_rules = Vob::from_elem(usize::from(grm.rules_len()), false);
        while let Some(item) = todo.pop_front() {
            if let Some(Symbol::Rule(ridx)) = item.next_sym(grm) {
                if seen_rules[usize::from(ridx)] {
                    continue;
                }
                seen_rules.set(usize::from(ridx), true);
                for &pidx in grm.rule_to_prods(ridx) {
                    let new_item = Item::new(grm, pidx, SIdx(StorageT::zero()));
                    if new_is.add(new_item) {
                        todo.push_back(new_item);
                    }
                }
            }
        }
        new_is
    }

    /// Create the closed itemset reached by moving the dot over `sym` in every item where `sym`
    /// is the next symbol.
    pub fn goto(&self, grm: &Grammar<StorageT>, sym: Symbol<StorageT>) -> Self {
        let mut new_is = Itemset::new();
        for item in &self.items {
            if item.next_sym(grm) == Some(sym) {
                new_is.add(item.step(grm).unwrap());
            }
        }
        new_is.close(grm)
    }

    /// All distinct symbols which appear after a dot, in item order.
    pub fn next_syms(&self, grm: &Grammar<StorageT>) -> Vec<Symbol<StorageT>> {
        let mut syms = Vec::new();
        for item in &self.items {
            if let Some(sym) = item.next_sym(grm) {
                if !syms.contains(&sym) {
                    syms.push(sym);
                }
            }
        }
        syms
    }
}
