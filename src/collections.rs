//! Linked collection types.
//!
//! Containers of child objects that carry their own ownership slot and keep
//! back-references current. A [`LinkedObjects`] list never mutates in place
//! once its owner is armed: mutators build a copy with the change applied and
//! the graph submits the `(old, new)` pair as a tracked update. A
//! [`WeightedMix`] maps objects to dimensionless weights that must sum to 1
//! and is frozen after construction.

use std::fmt;

use crate::link::{ObjectId, Slot};
use crate::EngineError;

/// Tolerance on the weighted-mix sum-to-1 invariant.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// An ordered sequence of child objects with a single ownership slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkedObjects {
    items: Vec<ObjectId>,
    slot: Option<Slot>,
}

impl LinkedObjects {
    /// Build a list from its members.
    pub fn new(items: Vec<ObjectId>) -> Self {
        LinkedObjects { items, slot: None }
    }

    /// The members, in order.
    pub fn items(&self) -> &[ObjectId] {
        &self.items
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the list has no members.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns true if `id` is a member.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.items.contains(id)
    }

    /// Iterate over the members.
    pub fn iter(&self) -> impl Iterator<Item = &ObjectId> {
        self.items.iter()
    }

    /// The slot this list occupies, if owned.
    pub fn slot(&self) -> Option<&Slot> {
        self.slot.as_ref()
    }

    pub(crate) fn set_slot(&mut self, slot: Slot) {
        self.slot = Some(slot);
    }

    pub(crate) fn clear_slot(&mut self) {
        self.slot = None;
    }

    // Mutated copies, consumed by the tracked-change path. The armed list
    // itself is never mutated in place.

    /// A copy with `id` appended.
    #[must_use]
    pub fn appended(&self, id: ObjectId) -> Vec<ObjectId> {
        let mut items = self.items.clone();
        items.push(id);
        items
    }

    /// A copy with `id` inserted at `index`. Inserting at `len` appends.
    pub fn inserted(&self, index: usize, id: ObjectId) -> Result<Vec<ObjectId>, EngineError> {
        if index > self.items.len() {
            return Err(self.out_of_range(index));
        }
        let mut items = self.items.clone();
        items.insert(index, id);
        Ok(items)
    }

    /// A copy with the first occurrence of `id` removed.
    #[must_use]
    pub fn removed(&self, id: &ObjectId) -> Vec<ObjectId> {
        let mut items = self.items.clone();
        if let Some(pos) = items.iter().position(|i| i == id) {
            items.remove(pos);
        }
        items
    }

    /// A copy with the member at `index` replaced.
    pub fn replaced(&self, index: usize, id: ObjectId) -> Result<Vec<ObjectId>, EngineError> {
        if index >= self.items.len() {
            return Err(self.out_of_range(index));
        }
        let mut items = self.items.clone();
        items[index] = id;
        Ok(items)
    }

    fn out_of_range(&self, index: usize) -> EngineError {
        EngineError::IndexOutOfRange {
            label: self
                .slot
                .as_ref()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unowned list".to_string()),
            index,
            len: self.items.len(),
        }
    }

    /// A copy extended with `ids`.
    #[must_use]
    pub fn extended(&self, ids: impl IntoIterator<Item = ObjectId>) -> Vec<ObjectId> {
        let mut items = self.items.clone();
        items.extend(ids);
        items
    }
}

impl fmt::Display for LinkedObjects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, id) in self.items.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{id}")?;
        }
        write!(f, "]")
    }
}

/// A frozen mapping from child objects to dimensionless weights summing to 1.
///
/// Construction validates the invariant; afterwards the mix only changes
/// through the graph's tracked weight-replacement path. There is no public
/// duplication API: the sum-to-1 invariant is load-bearing enough that
/// cloning a mix around would invite drift.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedMix {
    entries: Vec<(ObjectId, f64)>,
    slot: Option<Slot>,
}

impl WeightedMix {
    /// Build a mix, validating that the weights sum to 1 (within
    /// [`WEIGHT_TOLERANCE`]).
    pub fn new(entries: Vec<(ObjectId, f64)>, label: &str) -> Result<Self, EngineError> {
        Self::validate(&entries, label)?;
        Ok(WeightedMix {
            entries,
            slot: None,
        })
    }

    pub(crate) fn validate(entries: &[(ObjectId, f64)], label: &str) -> Result<(), EngineError> {
        let total: f64 = entries.iter().map(|(_, w)| w).sum();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(EngineError::NonUnitWeights {
                label: label.to_string(),
                total,
            });
        }
        Ok(())
    }

    /// The entries, in insertion order.
    pub fn entries(&self) -> &[(ObjectId, f64)] {
        &self.entries
    }

    /// The member objects, in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &ObjectId> {
        self.entries.iter().map(|(id, _)| id)
    }

    /// The weight of `id`, if present.
    pub fn weight(&self, id: &ObjectId) -> Option<f64> {
        self.entries
            .iter()
            .find(|(i, _)| i == id)
            .map(|(_, w)| *w)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the mix has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The slot this mix occupies, if owned.
    pub fn slot(&self) -> Option<&Slot> {
        self.slot.as_ref()
    }

    pub(crate) fn set_slot(&mut self, slot: Slot) {
        self.slot = Some(slot);
    }

    pub(crate) fn clear_slot(&mut self) {
        self.slot = None;
    }

    fn frozen(&self, operation: &'static str) -> EngineError {
        EngineError::FrozenMix {
            label: self
                .slot
                .as_ref()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unowned mix".to_string()),
            operation,
        }
    }

    /// Key removal through the frozen surface is forbidden.
    ///
    /// Key-set changes go through the graph's tracked replacement path.
    pub fn remove(&self, _id: &ObjectId) -> Result<(), EngineError> {
        Err(self.frozen("remove"))
    }

    /// Clearing through the frozen surface is forbidden.
    pub fn clear(&self) -> Result<(), EngineError> {
        Err(self.frozen("clear"))
    }

    /// Piecemeal bulk update through the frozen surface is forbidden.
    ///
    /// Replace the whole entry set through the graph instead.
    pub fn update(&self, _entries: &[(ObjectId, f64)]) -> Result<(), EngineError> {
        Err(self.frozen("update"))
    }
}

impl fmt::Display for WeightedMix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (id, w)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{id}: {w}")?;
        }
        write!(f, "}}")
    }
}
