#![allow(clippy::cognitive_complexity)]
#![allow(clippy::new_without_default)]
#![allow(clippy::upper_case_acronyms)]
#![forbid(unsafe_code)]

//! Build LR(0) state graphs and SLR(1) state tables from a [`Grammar`].
//!
//! The two main structs are built in sequence: [`StateGraph`] is the canonical collection of
//! closed LR(0) itemsets plus the transitions between them, and [`StateTable`] flattens a graph
//! into the action and goto tables a parser executes. [`from_grammar`] runs both steps.
//!
//! Shift/reduce and reduce/reduce conflicts do not stop table construction: every conflicted
//! cell is resolved by a fixed default (see [`StateTable::new`]) and the losing actions are kept
//! in a [`Conflicts`] log for callers that want to report them.

use std::hash::Hash;

use num_traits::{AsPrimitive, PrimInt, Unsigned};

use slrgrammar::Grammar;

mod itemset;
mod stategraph;
pub mod statetable;

pub use crate::itemset::{Item, Itemset};
pub use crate::stategraph::StateGraph;
pub use crate::statetable::{Action, Conflicts, StateTable};

pub type StIdxStorageT = u32;

/// StIdx is a wrapper for a 32-bit state index.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct StIdx(StIdxStorageT);

impl StIdx {
    fn max_value() -> StIdx {
        StIdx(StIdxStorageT::MAX)
    }
}

impl From<u32> for StIdx {
    fn from(v: u32) -> Self {
        StIdx(v)
    }
}

impl From<usize> for StIdx {
    fn from(v: usize) -> Self {
        if v > StIdxStorageT::MAX as usize {
            panic!("Overflow");
        }
        StIdx(v as StIdxStorageT)
    }
}

impl From<StIdx> for usize {
    fn from(st: StIdx) -> Self {
        st.0 as usize
    }
}

impl From<StIdx> for u32 {
    fn from(st: StIdx) -> Self {
        st.0
    }
}

/// Build the state graph and state table for `grm` in one go.
pub fn from_grammar<StorageT: 'static + Hash + PrimInt + Unsigned>(
    grm: &Grammar<StorageT>,
) -> (StateGraph<StorageT>, StateTable<StorageT>)
where
    usize: AsPrimitive<StorageT>,
{
    let sg = StateGraph::new(grm);
    let st = StateTable::new(grm, &sg);
    (sg, st)
}
