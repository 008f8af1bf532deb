//! Computation chains and their canonical ordering.
//!
//! A modeling change touches a set of objects (structural changes) or a set
//! of owned values (scalar changes). The chain module expands those roots
//! into the full downstream recomputation chain and then optimizes it:
//! duplicates collapse onto their first occurrence, the survivors sort by
//! class rank with a stable sort so ties keep discovery order, and System
//! objects always land at the very end. Recomputing the optimized chain
//! linearly, in order, recomputes every affected value exactly once.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use crate::link::{ObjectId, ValueId};
use crate::ModelGraph;
use crate::EngineError;

/// One calculated attribute of one object, as a recomputation step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CalcSlot {
    /// The owning object.
    pub owner: ObjectId,
    /// The calculated attribute's name.
    pub attr: String,
}

impl fmt::Display for CalcSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {}", self.attr, self.owner)
    }
}

/// The downstream object closure of `roots`, roots included.
///
/// Breadth-first over the classes' declared dependents, in discovery order.
/// The closure may contain duplicates when dependency paths reconverge;
/// [`optimize_object_chain`] collapses them.
pub fn dependent_objects(
    graph: &ModelGraph,
    roots: &[ObjectId],
) -> Result<Vec<ObjectId>, EngineError> {
    let mut chain: Vec<ObjectId> = Vec::new();
    let mut frontier: VecDeque<ObjectId> = roots.iter().cloned().collect();
    let mut seen: BTreeSet<ObjectId> = BTreeSet::new();
    while let Some(id) = frontier.pop_front() {
        if !seen.insert(id.clone()) {
            continue;
        }
        let object = graph.object(&id)?;
        let dependents = (object.class().dependents())(graph, &id);
        chain.push(id);
        frontier.extend(dependents);
    }
    Ok(chain)
}

/// Collapse duplicates onto their first occurrence and order the chain
/// canonically.
///
/// The sort is stable on class rank, so objects of equal rank keep their
/// discovery order; System objects carry the maximum rank and therefore
/// always recompute last, after every contributing object has settled.
pub fn optimize_object_chain(
    graph: &ModelGraph,
    chain: Vec<ObjectId>,
) -> Result<Vec<ObjectId>, EngineError> {
    let mut seen: BTreeSet<ObjectId> = BTreeSet::new();
    let mut deduped: Vec<(u32, ObjectId)> = Vec::new();
    for id in chain {
        if seen.insert(id.clone()) {
            let rank = graph.object(&id)?.class().rank();
            deduped.push((rank, id));
        }
    }
    deduped.sort_by_key(|(rank, _)| *rank);
    Ok(deduped.into_iter().map(|(_, id)| id).collect())
}

/// The recomputation steps of an already-optimized object chain: each
/// object's calculated attributes, in declaration order.
pub fn calculated_slots(
    graph: &ModelGraph,
    chain: &[ObjectId],
) -> Result<Vec<CalcSlot>, EngineError> {
    let mut slots = Vec::new();
    for id in chain {
        for calc in graph.object(id)?.class().calculated() {
            slots.push(CalcSlot {
                owner: id.clone(),
                attr: calc.name.clone(),
            });
        }
    }
    Ok(slots)
}

/// The downstream value closure of `roots`, roots excluded.
///
/// Breadth-first over the recorded child edges; every reached value is an
/// owned calculated value whose slot the graph knows.
pub fn dependent_value_slots(graph: &ModelGraph, roots: &[ValueId]) -> Vec<CalcSlot> {
    let mut slots: Vec<CalcSlot> = Vec::new();
    let mut frontier: VecDeque<ValueId> = roots.iter().cloned().collect();
    let mut seen: BTreeSet<ValueId> = roots.iter().cloned().collect();
    while let Some(vid) = frontier.pop_front() {
        for child in graph.children_of(&vid) {
            if !seen.insert(child.clone()) {
                continue;
            }
            if let Some(slot) = graph.slot_of(&child) {
                slots.push(CalcSlot {
                    owner: slot.owner.clone(),
                    attr: slot.key.attr().to_string(),
                });
            }
            frontier.push_back(child);
        }
    }
    slots
}

/// Optimize a value chain the same way object chains are optimized: dedup
/// keep-first, stable sort on the owner's class rank, System-owned values
/// last.
///
/// Within one object, rank cannot order the calculated attributes against
/// each other, so ties break on the class's declaration order. Declaration
/// order is recomputation order, which keeps a calculated attribute that
/// reads a sibling from seeing the sibling's stale value.
pub fn optimize_value_chain(
    graph: &ModelGraph,
    chain: Vec<CalcSlot>,
) -> Result<Vec<CalcSlot>, EngineError> {
    let mut seen: BTreeSet<CalcSlot> = BTreeSet::new();
    let mut deduped: Vec<(u32, usize, CalcSlot)> = Vec::new();
    for slot in chain {
        if seen.insert(slot.clone()) {
            let class = graph.object(&slot.owner)?.class();
            let declared = class
                .calculated()
                .iter()
                .position(|c| c.name == slot.attr)
                .unwrap_or(usize::MAX);
            deduped.push((class.rank(), declared, slot));
        }
    }
    deduped.sort_by_key(|(rank, declared, _)| (*rank, *declared));
    Ok(deduped.into_iter().map(|(_, _, slot)| slot).collect())
}
