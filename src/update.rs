//! The update engine.
//!
//! A [`ModelingUpdate`] applies a batch of classified [`Change`]s to the
//! graph in stages: drop no-ops, capture the affected roots, swap the new
//! inputs in without side effects, then recompute the optimized downstream
//! chain linearly. Every swap and every recompute records the value it
//! displaced, so the whole update can be undone by restoring the snapshot in
//! reverse order.

use tracing::{debug, warn};

use crate::chain::{
    calculated_slots, dependent_objects, dependent_value_slots, optimize_object_chain,
    optimize_value_chain, CalcSlot,
};
use crate::collections::{LinkedObjects, WeightedMix};
use crate::link::{ObjectId, Slot, ValueId};
use crate::object::AttrValue;
use crate::value::ExplainableValue;
use crate::EngineError;
use crate::ModelGraph;

/// One classified modeling change.
///
/// The kind is explicit at the call site; the update engine never inspects
/// runtime types to decide how to treat a change.
#[derive(Debug, Clone)]
pub enum Change {
    /// A scalar or hourly input value is replaced.
    Scalar {
        /// The slot holding the value.
        slot: Slot,
        /// The replacement value.
        new: ExplainableValue,
    },
    /// A reference attribute is repointed.
    Reference {
        /// The object holding the reference.
        owner: ObjectId,
        /// The reference attribute's name.
        attr: String,
        /// The previous target, if any.
        old: Option<ObjectId>,
        /// The new target, if any.
        new: Option<ObjectId>,
    },
    /// A linked list's membership is replaced.
    List {
        /// The object holding the list.
        owner: ObjectId,
        /// The list attribute's name.
        attr: String,
        /// The full new membership, in order.
        new: Vec<ObjectId>,
    },
    /// A weighted mix's key set changes; treated structurally.
    Mix {
        /// The object holding the mix.
        owner: ObjectId,
        /// The mix attribute's name.
        attr: String,
        /// The full new entry set.
        new: Vec<(ObjectId, f64)>,
    },
    /// Only the weights of a mix change; the key set is identical.
    MixWeights {
        /// The object holding the mix.
        owner: ObjectId,
        /// The mix attribute's name.
        attr: String,
        /// The full new entry set, over the same keys.
        new: Vec<(ObjectId, f64)>,
    },
}

impl Change {
    fn describe(&self) -> String {
        match self {
            Change::Scalar { slot, .. } => format!("scalar change at {slot}"),
            Change::Reference { owner, attr, .. } => {
                format!("reference change at {attr} of {owner}")
            }
            Change::List { owner, attr, .. } => format!("list change at {attr} of {owner}"),
            Change::Mix { owner, attr, .. } => format!("mix change at {attr} of {owner}"),
            Change::MixWeights { owner, attr, .. } => {
                format!("weight change at {attr} of {owner}")
            }
        }
    }

    /// Returns true if applying this change would not alter the graph.
    fn is_noop(&self, graph: &ModelGraph) -> Result<bool, EngineError> {
        Ok(match self {
            Change::Scalar { slot, new } => {
                let current = graph.value(&slot.owner, slot.key.attr())?;
                current == new
            }
            Change::Reference { owner, attr, new, .. } => {
                graph.reference(owner, attr)? == new.as_ref()
            }
            Change::List { owner, attr, new } => graph.list(owner, attr)?.items() == new,
            Change::Mix { owner, attr, new } | Change::MixWeights { owner, attr, new } => {
                graph.mix(owner, attr)?.entries() == new
            }
        })
    }
}

/// A batch of changes applied together as one recomputation.
#[derive(Debug)]
pub struct ModelingUpdate {
    changes: Vec<Change>,
}

/// The record of an applied update: every displaced value, in the order it
/// was displaced.
#[derive(Debug, Default)]
pub struct AppliedUpdate {
    pub(crate) snapshot: Vec<(ObjectId, String, AttrValue)>,
}

impl AppliedUpdate {
    /// The attribute slots this update touched, in application order.
    pub fn touched(&self) -> impl Iterator<Item = (&ObjectId, &str)> {
        self.snapshot.iter().map(|(id, attr, _)| (id, attr.as_str()))
    }

    /// Returns true if the update changed nothing.
    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    pub(crate) fn record(&mut self, id: &ObjectId, attr: &str, old: Option<AttrValue>) {
        if let Some(old) = old {
            self.snapshot.push((id.clone(), attr.to_string(), old));
        }
    }
}

impl ModelingUpdate {
    /// Build an update from its classified changes.
    pub fn new(changes: Vec<Change>) -> Self {
        ModelingUpdate { changes }
    }

    /// Apply the update: filter no-ops, swap inputs, recompute downstream.
    ///
    /// A failure partway through leaves the already-applied portion in
    /// place; callers needing all-or-nothing semantics wrap the update in a
    /// simulation and revert.
    pub fn apply(self, graph: &mut ModelGraph) -> Result<AppliedUpdate, EngineError> {
        let mut changes = Vec::with_capacity(self.changes.len());
        for change in self.changes {
            if change.is_noop(graph)? {
                warn!("{} is a no-op, skipping", change.describe());
            } else {
                changes.push(change);
            }
        }
        if changes.is_empty() {
            return Ok(AppliedUpdate::default());
        }

        // Roots are captured against the pre-swap graph so removed members
        // still recompute; the chains themselves expand on the post-swap
        // graph so new structure is visible.
        let mut object_roots: Vec<ObjectId> = Vec::new();
        let mut value_roots: Vec<ValueId> = Vec::new();
        for change in &changes {
            match change {
                Change::Scalar { slot, .. } => value_roots.push(slot.value_id()),
                Change::Reference { owner, old, new, .. } => {
                    object_roots.push(owner.clone());
                    object_roots.extend(old.clone());
                    object_roots.extend(new.clone());
                }
                Change::List { owner, attr, new } => {
                    object_roots.push(owner.clone());
                    object_roots.extend(graph.list(owner, attr)?.iter().cloned());
                    object_roots.extend(new.iter().cloned());
                }
                Change::Mix { owner, attr, new } => {
                    object_roots.push(owner.clone());
                    object_roots.extend(graph.mix(owner, attr)?.keys().cloned());
                    object_roots.extend(new.iter().map(|(id, _)| id.clone()));
                }
                Change::MixWeights { owner, .. } => object_roots.push(owner.clone()),
            }
        }

        let mut applied = AppliedUpdate::default();
        for change in &changes {
            debug!("applying {}", change.describe());
            Self::swap(graph, change, &mut applied)?;
        }

        let object_chain = dependent_objects(graph, &object_roots)?;
        let object_chain = optimize_object_chain(graph, object_chain)?;
        let mut value_chain = calculated_slots(graph, &object_chain)?;
        value_chain.extend(dependent_value_slots(graph, &value_roots));
        let value_chain = optimize_value_chain(graph, value_chain)?;

        for CalcSlot { owner, attr } in &value_chain {
            debug!("recomputing {attr} of {owner}");
            let old = graph.recompute_attr(owner, attr)?;
            applied.record(owner, attr, old);
        }
        Ok(applied)
    }

    fn swap(
        graph: &mut ModelGraph,
        change: &Change,
        applied: &mut AppliedUpdate,
    ) -> Result<(), EngineError> {
        match change {
            Change::Scalar { slot, new } => {
                let old = graph.replace_without_recompute(
                    &slot.owner,
                    slot.key.attr(),
                    AttrValue::Value(new.clone()),
                )?;
                applied.record(&slot.owner, slot.key.attr(), Some(old));
            }
            Change::Reference { owner, attr, new, .. } => {
                let wrapped = graph.reference_value(owner, attr, new.clone());
                let old = graph.replace_without_recompute(owner, attr, wrapped)?;
                applied.record(owner, attr, Some(old));
            }
            Change::List { owner, attr, new } => {
                let old = graph.replace_without_recompute(
                    owner,
                    attr,
                    AttrValue::List(LinkedObjects::new(new.clone())),
                )?;
                applied.record(owner, attr, Some(old));
            }
            Change::Mix { owner, attr, new } | Change::MixWeights { owner, attr, new } => {
                let mix = WeightedMix::new(new.clone(), attr)?;
                let old = graph.replace_without_recompute(owner, attr, AttrValue::Mix(mix))?;
                applied.record(owner, attr, Some(old));
            }
        }
        Ok(())
    }
}
