//! Partial re-customization after localized weight changes.
//!
//! Instead of re-running the full triangle pass, only the upward arcs
//! whose value can transitively depend on a changed input arc are
//! recomputed, in ascending lower-endpoint rank. The resulting metric
//! state is bit-identical to a full customization on the updated weight
//! vector.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::{cell::Cell, marker::PhantomData};

use log::debug;
use rustc_hash::FxHashMap;

use crate::{
    constants::Weight,
    customization::{compute_arc_weights, Metric},
    error::CchError,
    graph::EdgeIndex,
    hierarchy::CchStructure,
};

/// Reusable partial updater bound to one structure.
///
/// Owns its dirty-set scratch so repeated small updates allocate
/// nothing. One instance per thread; concurrent `apply` calls on the
/// same metric serialize through the metric's internal lock.
pub struct PartialUpdater {
    structure: Arc<CchStructure>,
    /// Dirty arcs keyed by lower-endpoint rank, lowest first.
    queue: BinaryHeap<Reverse<(usize, EdgeIndex)>>,
    queued: Vec<bool>,

    // Send but not Sync: concurrent applies would race on the scratch.
    _marker: PhantomData<Cell<()>>,
}

impl PartialUpdater {
    pub fn new(structure: Arc<CchStructure>) -> Self {
        let arc_count = structure.up_arc_count();
        PartialUpdater {
            structure,
            queue: BinaryHeap::new(),
            queued: vec![false; arc_count],
            _marker: PhantomData,
        }
    }

    pub fn structure(&self) -> &Arc<CchStructure> {
        &self.structure
    }

    /// Applies a batch of `arc -> new_weight` changes to `metric` and
    /// re-establishes the shortcut-weight invariant for every affected
    /// upward arc.
    ///
    /// Fails with `StructureMismatch` if `metric` was built from a
    /// different structure, `NegativeWeight` on invalid weights and
    /// `InvalidTopology` on out-of-range arc ids. On error the metric is
    /// left untouched.
    pub fn apply(
        &mut self,
        metric: &Metric,
        updates: &FxHashMap<EdgeIndex, Weight>,
    ) -> Result<(), CchError> {
        if !Arc::ptr_eq(&self.structure, metric.structure()) {
            return Err(CchError::StructureMismatch);
        }
        for (&arc, &w) in updates {
            if arc.index() >= self.structure.input_arc_count() {
                return Err(CchError::InvalidTopology(format!(
                    "arc id {} out of range ({} input arcs)",
                    arc.index(),
                    self.structure.input_arc_count()
                )));
            }
            if !(w >= 0.0) {
                return Err(CchError::NegativeWeight {
                    arc: arc.index(),
                    weight: w,
                });
            }
        }

        let structure = &self.structure;
        let mut state = metric.write_state();

        for (&arc, &w) in updates {
            state.weights[arc.index()] = w;
            let up = structure.input_to_up[arc.index()];
            if up != EdgeIndex::end() && !self.queued[up.index()] {
                self.queued[up.index()] = true;
                let rank = structure.order.rank(structure.up_arc(up).lo);
                self.queue.push(Reverse((rank, up)));
            }
        }

        let mut recomputed = 0usize;
        while let Some(Reverse((_, arc))) = self.queue.pop() {
            self.queued[arc.index()] = false;
            recomputed += 1;

            let (fwd, bwd) = compute_arc_weights(structure, &state, arc);
            if fwd == state.fwd[arc.index()] && bwd == state.bwd[arc.index()] {
                // Value unaffected; nothing above can change either.
                continue;
            }
            state.fwd[arc.index()] = fwd;
            state.bwd[arc.index()] = bwd;

            for &dep in &structure.dependents[arc.index()] {
                if !self.queued[dep.index()] {
                    self.queued[dep.index()] = true;
                    let rank = structure.order.rank(structure.up_arc(dep).lo);
                    self.queue.push(Reverse((rank, dep)));
                }
            }
        }

        debug!(
            "Partial update: {} changed arcs, {} upward arcs recomputed",
            updates.len(),
            recomputed
        );
        Ok(())
    }
}
