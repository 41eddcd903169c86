use std::{
    collections::hash_map::HashMap,
    hash::{BuildHasherDefault, Hash},
    marker::PhantomData,
};

use fnv::FnvHasher;
use num_traits::{AsPrimitive, PrimInt, Unsigned};
use packedvec::PackedVec;
use vob::{IterSetBits, Vob};

use slrgrammar::{Grammar, PIdx, RIdx, Symbol, TIdx};

use crate::{StIdx, StIdxStorageT, stategraph::StateGraph};

type ConflictCells<StorageT> =
    HashMap<(StIdx, TIdx<StorageT>), Vec<Action<StorageT>>, BuildHasherDefault<FnvHasher>>;

/// A representation of a `StateTable` for a grammar. `actions` and `gotos` are stored as two
/// densely packed tables where rows represent states and columns represent tokens (for
/// `actions`) or rules (for `gotos`).
pub struct StateTable<StorageT> {
    actions: PackedVec<usize>,
    state_actions: Vob,
    gotos: Vec<StIdx>,
    rules_len: RIdx<StorageT>,
    tokens_len: TIdx<StorageT>,
    conflicts: Option<Conflicts<StorageT>>,
    pub final_state: StIdx,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Action<StorageT> {
    /// Shift to state X in the statetable.
    Shift(StIdx),
    /// Reduce production X in the grammar.
    Reduce(PIdx<StorageT>),
    /// Accept this input.
    Accept,
    Error,
}

const SHIFT: usize = 1;
const REDUCE: usize = 2;
const ACCEPT: usize = 3;
const ERROR: usize = 0;

impl<StorageT: 'static + Hash + PrimInt + Unsigned> StateTable<StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    /// Build the SLR(1) table for `grm` from its state graph `sg`. Conflicted cells never
    /// cause a failure: each is resolved by a fixed default (an existing shift beats a reduce;
    /// of two reduces the lower production index wins; the accept of the start production beats
    /// everything) and every action which competed for the cell is kept in [`Conflicts`].
    pub fn new(grm: &Grammar<StorageT>, sg: &StateGraph<StorageT>) -> Self {
        // Actions are encoded as two tag bits plus a payload, so state and production indexes
        // must fit in usize minus two bits.
        assert!(usize::from(sg.all_states_len()) < usize::MAX >> 2);
        assert!(usize::from(grm.prods_len()) < usize::MAX >> 2);
        let maxa = usize::from(grm.tokens_len()) * usize::from(sg.all_states_len());
        let maxg = usize::from(grm.rules_len()) * usize::from(sg.all_states_len());
        let mut actions: Vec<usize> = vec![0; maxa];
        let mut gotos: Vec<StIdx> = vec![StIdx::max_value(); maxg];
        let mut state_actions = Vob::from_elem(maxa, false);

        let mut cells = ConflictCells::default();
        let mut shift_reduce = 0;
        let mut reduce_reduce = 0;
        let mut final_state = None;

        let follows = grm.follows();
        for (stidx, state) in sg.iter_stidxs().zip(sg.iter_itemsets()) {
            // Install the state's edges first: token edges as shifts, rule edges as gotos.
            for (&sym, &ref_stidx) in sg.edges(stidx) {
                match sym {
                    Symbol::Rule(s_ridx) => {
                        let off = usize::from(stidx) * usize::from(grm.rules_len())
                            + usize::from(s_ridx);
                        debug_assert!(gotos[off] == StIdx::max_value());
                        gotos[off] = ref_stidx;
                    }
                    Symbol::Token(s_tidx) => {
                        let off = actions_offset(grm.tokens_len(), stidx, s_tidx);
                        // A state has at most one edge per token, so the cell is still free.
                        debug_assert_eq!(actions[off], ERROR);
                        state_actions.set(off, true);
                        actions[off] = StateTable::encode(Action::Shift(ref_stidx));
                    }
                }
            }

            // Then the completed items, spread over the follow set of their rule. The start
            // production's completed item becomes the accept action; the follow set of the
            // start rule only ever holds the end-of-input token, so that is where it lands.
            for item in state.items() {
                if !item.is_complete(grm) {
                    continue;
                }
                let pidx = item.pidx();
                let action = if pidx == grm.start_prod() {
                    Action::Accept
                } else {
                    Action::Reduce(pidx)
                };
                let fl = follows.follows(grm.prod_to_rule(pidx));
                for i in fl.iter_set_bits(..) {
                    // fl is exactly tokens_len bits long, so the as_ call is safe.
                    let tidx = TIdx(i.as_());
                    let off = actions_offset(grm.tokens_len(), stidx, tidx);
                    state_actions.set(off, true);
                    match StateTable::decode(actions[off]) {
                        Action::Error => {
                            if let Action::Accept = action {
                                assert!(final_state.is_none());
                                final_state = Some(stidx);
                            }
                            actions[off] = StateTable::encode(action);
                        }
                        existing @ Action::Shift(_) => {
                            // The shift installed from this state's edges keeps the cell.
                            log_conflict(&mut cells, stidx, tidx, existing, action);
                            shift_reduce += 1;
                        }
                        existing @ Action::Reduce(r_pidx) => {
                            log_conflict(&mut cells, stidx, tidx, existing, action);
                            // The earlier production in the grammar wins the cell.
                            if let Action::Reduce(new_pidx) = action {
                                if new_pidx < r_pidx {
                                    actions[off] = StateTable::encode(action);
                                }
                            }
                            reduce_reduce += 1;
                        }
                        existing @ Action::Accept => {
                            // The accept of the start production keeps the cell.
                            log_conflict(&mut cells, stidx, tidx, existing, action);
                            reduce_reduce += 1;
                        }
                    }
                }
            }
        }
        assert!(final_state.is_some());

        let conflicts = if cells.is_empty() {
            None
        } else {
            Some(Conflicts {
                cells,
                shift_reduce,
                reduce_reduce,
            })
        };

        StateTable {
            actions: PackedVec::<usize>::new(actions),
            state_actions,
            gotos,
            rules_len: grm.rules_len(),
            tokens_len: grm.tokens_len(),
            conflicts,
            final_state: final_state.unwrap(),
        }
    }

    fn decode(bits: usize) -> Action<StorageT> {
        let action = bits & 0b11;
        let val = bits >> 2;

        match action {
            SHIFT => {
                // Since val was originally stored in an StIdxStorageT, we know that it's safe to
                // cast it back to an StIdxStorageT here.
                Action::Shift(StIdx::from(val as StIdxStorageT))
            }
            REDUCE => Action::Reduce(PIdx(val.as_())),
            ACCEPT => Action::Accept,
            ERROR => Action::Error,
            _ => unreachable!(),
        }
    }

    fn encode(action: Action<StorageT>) -> usize {
        match action {
            Action::Shift(stidx) => SHIFT | (usize::from(stidx) << 2),
            Action::Reduce(pidx) => REDUCE | (usize::from(pidx) << 2),
            Action::Accept => ACCEPT,
            Action::Error => ERROR,
        }
    }

    /// Return the action for `stidx` and `tidx`. Cells nothing was installed into decode to
    /// [`Action::Error`].
    pub fn action(&self, stidx: StIdx, tidx: TIdx<StorageT>) -> Action<StorageT> {
        let off = actions_offset(self.tokens_len, stidx, tidx);
        StateTable::decode(self.actions.get(off).unwrap())
    }

    /// Return an iterator over the indexes of all non-empty actions of `stidx`.
    pub fn state_actions(&self, stidx: StIdx) -> StateActionsIterator<StorageT> {
        let start = usize::from(stidx) * usize::from(self.tokens_len);
        let end = start + usize::from(self.tokens_len);
        StateActionsIterator {
            iter: self.state_actions.iter_set_bits(start..end),
            start,
            phantom: PhantomData,
        }
    }

    /// Return the goto state for `stidx` and `ridx`, or `None` if there isn't any.
    pub fn goto(&self, stidx: StIdx, ridx: RIdx<StorageT>) -> Option<StIdx> {
        let off = (usize::from(stidx) * usize::from(self.rules_len)) + usize::from(ridx);
        if self.gotos[off] == StIdx::max_value() {
            None
        } else {
            Some(self.gotos[off])
        }
    }

    /// Return a struct describing the conflicts the table build resolved, or `None` if there
    /// were none.
    pub fn conflicts(&self) -> Option<&Conflicts<StorageT>> {
        self.conflicts.as_ref()
    }

    /// Render the table as a grid: one row per state, with a column per token (the end-of-input
    /// token rendered as `$`) followed by a goto column per rule other than the start rule. If
    /// `show_conflicts` is set, a conflicted cell lists every action which competed for it
    /// joined with `/`; otherwise only the winning action is shown.
    pub fn pp(&self, grm: &Grammar<StorageT>, show_conflicts: bool) -> String {
        let states_len = self.state_actions.len() / usize::from(self.tokens_len);

        let mut header = vec![String::new()];
        for tidx in grm.iter_tidxs() {
            header.push(grm.token_name(tidx).unwrap_or("$").to_string());
        }
        for ridx in grm.iter_rules() {
            if ridx == grm.start_rule_idx() {
                continue;
            }
            header.push(grm.rule_name(ridx).to_string());
        }
        let mut rows = vec![header];

        for stidx in (0..states_len).map(StIdx::from) {
            let mut row = vec![usize::from(stidx).to_string()];
            for tidx in grm.iter_tidxs() {
                let cell = match self.conflicts().and_then(|c| c.actions(stidx, tidx)) {
                    Some(acts) if show_conflicts => acts
                        .iter()
                        .map(|x| pp_action(*x))
                        .collect::<Vec<_>>()
                        .join("/"),
                    _ => pp_action(self.action(stidx, tidx)),
                };
                row.push(cell);
            }
            for ridx in grm.iter_rules() {
                if ridx == grm.start_rule_idx() {
                    continue;
                }
                row.push(match self.goto(stidx, ridx) {
                    Some(g_stidx) => usize::from(g_stidx).to_string(),
                    None => String::new(),
                });
            }
            rows.push(row);
        }

        let widths = (0..rows[0].len())
            .map(|i| rows.iter().map(|r| r[i].chars().count()).max().unwrap() + 2)
            .collect::<Vec<_>>();
        // An extra vertical rule sits before the first token column and the first goto column.
        let sections = [1, 1 + usize::from(self.tokens_len)];

        let mut o = String::new();
        for (i, row) in rows.iter().enumerate() {
            if i == 1 {
                for (j, width) in widths.iter().enumerate() {
                    if sections.contains(&j) {
                        o.push('|');
                    }
                    o.push('|');
                    o.push_str(&"-".repeat(*width));
                }
                o.push('\n');
            }
            for (j, cell) in row.iter().enumerate() {
                if sections.contains(&j) {
                    o.push('|');
                }
                o.push('|');
                o.push_str(&pad_centre(cell, widths[j]));
            }
            o.push('\n');
        }
        o
    }
}

/// A record of the conflicts resolved while populating a [`StateTable`]. Each conflicted cell
/// keeps every action which competed for it in arrival order, starting with the action holding
/// the cell when the first clash happened.
pub struct Conflicts<StorageT> {
    cells: ConflictCells<StorageT>,
    shift_reduce: u64,
    reduce_reduce: u64,
}

impl<StorageT: 'static + Hash + PrimInt + Unsigned> Conflicts<StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    /// How many shift/reduce conflicts were resolved?
    pub fn sr_len(&self) -> u64 {
        self.shift_reduce
    }

    /// How many reduce/reduce conflicts were resolved?
    pub fn rr_len(&self) -> u64 {
        self.reduce_reduce
    }

    /// Return every action which competed for the cell `(stidx, tidx)`, or `None` if that cell
    /// was never conflicted.
    pub fn actions(&self, stidx: StIdx, tidx: TIdx<StorageT>) -> Option<&[Action<StorageT>]> {
        self.cells.get(&(stidx, tidx)).map(|x| x.as_slice())
    }
}

fn actions_offset<StorageT: PrimInt + Unsigned>(
    tokens_len: TIdx<StorageT>,
    stidx: StIdx,
    tidx: TIdx<StorageT>,
) -> usize {
    usize::from(stidx) * usize::from(tokens_len) + usize::from(tidx)
}

fn log_conflict<StorageT: Hash + PrimInt + Unsigned>(
    cells: &mut ConflictCells<StorageT>,
    stidx: StIdx,
    tidx: TIdx<StorageT>,
    existing: Action<StorageT>,
    new: Action<StorageT>,
) {
    cells
        .entry((stidx, tidx))
        .or_insert_with(|| vec![existing])
        .push(new);
}

fn pp_action<StorageT: 'static + PrimInt + Unsigned>(action: Action<StorageT>) -> String
where
    usize: AsPrimitive<StorageT>,
{
    match action {
        Action::Shift(stidx) => format!("s{}", usize::from(stidx)),
        Action::Reduce(pidx) => format!("r{}", usize::from(pidx)),
        Action::Accept => "ACC".to_string(),
        Action::Error => String::new(),
    }
}

fn pad_centre(s: &str, width: usize) -> String {
    let pad = width - s.chars().count();
    let left = pad / 2;
    format!("{}{}{}", " ".repeat(left), s, " ".repeat(pad - left))
}

pub struct StateActionsIterator<'a, StorageT> {
    iter: IterSetBits<'a, usize>,
    start: usize,
    phantom: PhantomData<StorageT>,
}

impl<'a, StorageT: 'static + PrimInt + Unsigned> Iterator for StateActionsIterator<'a, StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    type Item = TIdx<StorageT>;

    fn next(&mut self) -> Option<TIdx<StorageT>> {
        // Since self.iter's IterSetBits range is exactly tokens_len long, by definition `i -
        // self.start` fits into StorageT and thus the as_ call here is safe.
        self.iter.next().map(|i| TIdx((i - self.start).as_()))
    }
}
