//! The model graph: arena of objects plus dependency bookkeeping.
//!
//! [`ModelGraph`] is the explicit context handle every operation runs
//! against. It owns all modeling objects, maintains the reverse-container
//! sets and the ancestor/child edges between owned values, and routes
//! attribute assignment on armed objects through the update engine. All of
//! it is single-threaded and synchronous: only one logical update is ever in
//! flight, so a linear, in-order replay of the computation chain is always
//! sufficient.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::collections::{LinkedObjects, WeightedMix};
use crate::link::{ObjectId, Slot, SlotKey, ValueId};
use crate::object::{AttrValue, ClassSpec, ContextualRef, ModelObject};
use crate::update::{Change, ModelingUpdate};
use crate::value::{ExplainableValue, Payload};
use crate::EngineError;

/// The object graph and its dependency bookkeeping.
#[derive(Default)]
pub struct ModelGraph {
    objects: BTreeMap<ObjectId, ModelObject>,
    /// Upstream edges: owned value -> the leaf values its computation touched.
    ancestors: BTreeMap<ValueId, Vec<ValueId>>,
    /// Reverse edges, kept walkable after structural edits.
    children: BTreeMap<ValueId, BTreeSet<ValueId>>,
    /// Where each owned value currently lives.
    slots: BTreeMap<ValueId, Slot>,
}

impl ModelGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Default::default()
    }

    // ========================================================================
    // Object lifecycle
    // ========================================================================

    /// Construct a new object.
    ///
    /// Attaches every input attribute, computes each declared calculated
    /// attribute once, then arms the object so that subsequent assignments
    /// route through the update engine. If `class` is a System class, the
    /// object claims system membership over every transitively linked object
    /// and rejects construction if any of them already belongs to another
    /// system.
    pub fn add_object(
        &mut self,
        class: Arc<ClassSpec>,
        name: &str,
        inputs: Vec<(String, AttrValue)>,
    ) -> Result<ObjectId, EngineError> {
        let id = ObjectId::new(name);
        let mut object = ModelObject::new(id.clone(), name, class.clone());
        if class.is_system() {
            object.set_system(Some(id.clone()));
        }
        self.objects.insert(id.clone(), object);

        for (attr, value) in inputs {
            self.attach(&id, &attr, value)?;
        }

        for calc in class.calculated().to_vec() {
            let fresh = (calc.recompute)(self, &id)?;
            self.attach_or_replace(&id, &calc.name, AttrValue::Value(fresh))?;
        }

        self.object_mut(&id)?.arm();
        Ok(id)
    }

    /// Delete an object that nothing references anymore.
    ///
    /// Fails with [`EngineError::StillReferenced`], naming the referencing
    /// container, if any inbound reference remains. On success all of the
    /// object's own outbound references are detached first.
    pub fn self_delete(&mut self, id: &ObjectId) -> Result<(), EngineError> {
        let object = self.object(id)?;
        if let Some((container, attr)) = object.containers().iter().next() {
            let by = match self.objects.get(container) {
                Some(c) => format!("{} (via '{}')", c, attr),
                None => format!("{container} (via '{attr}')"),
            };
            return Err(EngineError::StillReferenced {
                object: object.to_string(),
                by,
            });
        }
        let attrs: Vec<String> = object.attrs().keys().cloned().collect();
        for attr in attrs {
            if let Some(AttrValue::Value(_)) = self.object(id)?.attr(&attr) {
                let vid = Slot::attr(id.clone(), attr.clone()).value_id();
                self.children.remove(&vid);
            }
            self.detach(id, &attr)?;
        }
        self.objects.remove(id);
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Look up an object.
    pub fn object(&self, id: &ObjectId) -> Result<&ModelObject, EngineError> {
        self.objects
            .get(id)
            .ok_or_else(|| EngineError::MissingObject(id.to_string()))
    }

    fn object_mut(&mut self, id: &ObjectId) -> Result<&mut ModelObject, EngineError> {
        self.objects
            .get_mut(id)
            .ok_or_else(|| EngineError::MissingObject(id.to_string()))
    }

    /// Iterate over all objects.
    pub fn objects(&self) -> impl Iterator<Item = &ModelObject> {
        self.objects.values()
    }

    /// One attribute of one object.
    pub fn attr(&self, id: &ObjectId, attr: &str) -> Result<&AttrValue, EngineError> {
        self.object(id)?
            .attr(attr)
            .ok_or_else(|| EngineError::MissingAttribute {
                object: id.to_string(),
                attr: attr.to_string(),
            })
    }

    /// The explainable value held by an attribute.
    pub fn value(&self, id: &ObjectId, attr: &str) -> Result<&ExplainableValue, EngineError> {
        match self.attr(id, attr)? {
            AttrValue::Value(v) => Ok(v),
            other => Err(EngineError::TypeMismatch {
                slot: Slot::attr(id.clone(), attr).to_string(),
                expected: "value",
                actual: other.kind(),
            }),
        }
    }

    /// The target of a reference attribute, if set.
    pub fn reference(&self, id: &ObjectId, attr: &str) -> Result<Option<&ObjectId>, EngineError> {
        match self.attr(id, attr)? {
            AttrValue::Ref(r) => Ok(r.as_ref().map(ContextualRef::target)),
            other => Err(EngineError::TypeMismatch {
                slot: Slot::attr(id.clone(), attr).to_string(),
                expected: "reference",
                actual: other.kind(),
            }),
        }
    }

    /// The list held by an attribute.
    pub fn list(&self, id: &ObjectId, attr: &str) -> Result<&LinkedObjects, EngineError> {
        match self.attr(id, attr)? {
            AttrValue::List(l) => Ok(l),
            other => Err(EngineError::TypeMismatch {
                slot: Slot::attr(id.clone(), attr).to_string(),
                expected: "list",
                actual: other.kind(),
            }),
        }
    }

    /// The weighted mix held by an attribute.
    pub fn mix(&self, id: &ObjectId, attr: &str) -> Result<&WeightedMix, EngineError> {
        match self.attr(id, attr)? {
            AttrValue::Mix(m) => Ok(m),
            other => Err(EngineError::TypeMismatch {
                slot: Slot::attr(id.clone(), attr).to_string(),
                expected: "mix",
                actual: other.kind(),
            }),
        }
    }

    /// The values that directly depend on `vid`.
    pub fn children_of(&self, vid: &ValueId) -> Vec<ValueId> {
        self.children
            .get(vid)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The leaf ancestors recorded for `vid`.
    pub fn ancestors_of(&self, vid: &ValueId) -> &[ValueId] {
        self.ancestors.get(vid).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The slot an owned value currently occupies.
    pub fn slot_of(&self, vid: &ValueId) -> Option<&Slot> {
        self.slots.get(vid)
    }

    /// The union of all attached hourly ranges, if any hourly data exists.
    pub fn modeling_window(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let mut window: Option<(NaiveDateTime, NaiveDateTime)> = None;
        for object in self.objects.values() {
            for value in object.attrs().values() {
                if let AttrValue::Value(v) = value {
                    if let Payload::Hourly(series) = v.payload() {
                        if series.is_empty() {
                            continue;
                        }
                        window = Some(match window {
                            None => (series.start(), series.end()),
                            Some((lo, hi)) => (lo.min(series.start()), hi.max(series.end())),
                        });
                    }
                }
            }
        }
        window
    }

    // ========================================================================
    // Change routing
    // ========================================================================

    /// Assign a value attribute.
    ///
    /// During construction (object not yet armed), or on the very first
    /// assignment of a previously-unset attribute, the value is attached
    /// directly. On an armed object the assignment becomes a tracked
    /// [`ModelingUpdate`].
    pub fn set_value(
        &mut self,
        id: &ObjectId,
        attr: &str,
        new: ExplainableValue,
    ) -> Result<(), EngineError> {
        let object = self.object(id)?;
        let tracked = object.armed()
            && !object.class().is_untracked(attr)
            && object.attr(attr).is_some();
        if !tracked {
            return self.attach_or_replace(id, attr, AttrValue::Value(new));
        }
        ModelingUpdate::new(vec![Change::Scalar {
            slot: Slot::attr(id.clone(), attr),
            new,
        }])
        .apply(self)?;
        Ok(())
    }

    /// Clear a value attribute to the Empty variant.
    pub fn clear_value(&mut self, id: &ObjectId, attr: &str) -> Result<(), EngineError> {
        let label = self.value(id, attr)?.label().to_string();
        self.set_value(id, attr, ExplainableValue::empty(label))
    }

    /// Assign a reference attribute.
    ///
    /// The target is wrapped in a contextual reference recording where the
    /// reference lives; both the old and the new referent's back-link sets
    /// are kept current.
    pub fn set_reference(
        &mut self,
        id: &ObjectId,
        attr: &str,
        target: Option<ObjectId>,
    ) -> Result<(), EngineError> {
        if let Some(t) = &target {
            self.object(t)?;
        }
        let object = self.object(id)?;
        let tracked = object.armed()
            && !object.class().is_untracked(attr)
            && object.attr(attr).is_some();
        if !tracked {
            let wrapped = self.wrap_reference(id, attr, target);
            return self.attach_or_replace(id, attr, wrapped);
        }
        let old = self.reference(id, attr)?.cloned();
        ModelingUpdate::new(vec![Change::Reference {
            owner: id.clone(),
            attr: attr.to_string(),
            old,
            new: target,
        }])
        .apply(self)?;
        Ok(())
    }

    fn wrap_reference(&self, id: &ObjectId, attr: &str, target: Option<ObjectId>) -> AttrValue {
        AttrValue::Ref(target.map(|t| ContextualRef::new(t, id.clone(), attr)))
    }

    /// Append to a list attribute.
    pub fn list_append(
        &mut self,
        id: &ObjectId,
        attr: &str,
        member: ObjectId,
    ) -> Result<(), EngineError> {
        let new = self.list(id, attr)?.appended(member);
        self.submit_list(id, attr, new)
    }

    /// Insert into a list attribute.
    pub fn list_insert(
        &mut self,
        id: &ObjectId,
        attr: &str,
        index: usize,
        member: ObjectId,
    ) -> Result<(), EngineError> {
        let new = self.list(id, attr)?.inserted(index, member)?;
        self.submit_list(id, attr, new)
    }

    /// Remove the first occurrence of `member` from a list attribute.
    pub fn list_remove(
        &mut self,
        id: &ObjectId,
        attr: &str,
        member: &ObjectId,
    ) -> Result<(), EngineError> {
        let new = self.list(id, attr)?.removed(member);
        self.submit_list(id, attr, new)
    }

    /// Replace the member at `index` of a list attribute.
    pub fn list_set(
        &mut self,
        id: &ObjectId,
        attr: &str,
        index: usize,
        member: ObjectId,
    ) -> Result<(), EngineError> {
        let new = self.list(id, attr)?.replaced(index, member)?;
        self.submit_list(id, attr, new)
    }

    /// Extend a list attribute.
    pub fn list_extend(
        &mut self,
        id: &ObjectId,
        attr: &str,
        members: impl IntoIterator<Item = ObjectId>,
    ) -> Result<(), EngineError> {
        let new = self.list(id, attr)?.extended(members);
        self.submit_list(id, attr, new)
    }

    /// Empty a list attribute.
    pub fn list_clear(&mut self, id: &ObjectId, attr: &str) -> Result<(), EngineError> {
        self.list(id, attr)?;
        self.submit_list(id, attr, Vec::new())
    }

    fn submit_list(
        &mut self,
        id: &ObjectId,
        attr: &str,
        new: Vec<ObjectId>,
    ) -> Result<(), EngineError> {
        for member in &new {
            self.object(member)?;
        }
        let object = self.object(id)?;
        if !object.armed() || object.class().is_untracked(attr) {
            return self.attach_or_replace(id, attr, AttrValue::List(LinkedObjects::new(new)));
        }
        ModelingUpdate::new(vec![Change::List {
            owner: id.clone(),
            attr: attr.to_string(),
            new,
        }])
        .apply(self)?;
        Ok(())
    }

    /// Replace the entry set of a weighted-mix attribute.
    ///
    /// An identical key set takes the weight-only path, recomputing just the
    /// mix's downstream value chain; any key-set difference is a structural
    /// change routed like a list swap. The full new entry set is re-validated
    /// against the sum-to-1 invariant either way.
    pub fn mix_set_weights(
        &mut self,
        id: &ObjectId,
        attr: &str,
        entries: Vec<(ObjectId, f64)>,
    ) -> Result<(), EngineError> {
        WeightedMix::validate(&entries, &Slot::attr(id.clone(), attr).to_string())?;
        for (member, _) in &entries {
            self.object(member)?;
        }
        let current = self.mix(id, attr)?;
        let same_keys = current.len() == entries.len()
            && entries.iter().all(|(k, _)| current.weight(k).is_some());
        let object = self.object(id)?;
        if !object.armed() || object.class().is_untracked(attr) {
            let mix = WeightedMix::new(entries, attr)?;
            return self.attach_or_replace(id, attr, AttrValue::Mix(mix));
        }
        let change = if same_keys {
            Change::MixWeights {
                owner: id.clone(),
                attr: attr.to_string(),
                new: entries,
            }
        } else {
            Change::Mix {
                owner: id.clone(),
                attr: attr.to_string(),
                new: entries,
            }
        };
        ModelingUpdate::new(vec![change]).apply(self)?;
        Ok(())
    }

    // ========================================================================
    // Ownership primitives
    // ========================================================================

    /// Attach `value` into `(id, attr)`, wiring ownership and back-links.
    ///
    /// Fails if a value already owned elsewhere is attached here, or if a
    /// linked object would cross system boundaries.
    pub(crate) fn attach(
        &mut self,
        id: &ObjectId,
        attr: &str,
        value: AttrValue,
    ) -> Result<(), EngineError> {
        let slot = Slot::attr(id.clone(), attr);
        let system = self.object(id)?.system().cloned();
        let value = match value {
            AttrValue::Value(mut v) => {
                v.set_slot(slot.clone())?;
                let vid = slot.value_id();
                let ancestors = v.leaf_ancestors();
                for ancestor in &ancestors {
                    self.children
                        .entry(ancestor.clone())
                        .or_default()
                        .insert(vid.clone());
                }
                self.ancestors.insert(vid.clone(), ancestors);
                self.slots.insert(vid, slot);
                AttrValue::Value(v)
            }
            AttrValue::Ref(target) => {
                let wrapped = match target {
                    Some(r) => {
                        let target = r.target().clone();
                        self.link_member(id, attr, &target, &system)?;
                        Some(ContextualRef::new(target, id.clone(), attr))
                    }
                    None => None,
                };
                AttrValue::Ref(wrapped)
            }
            AttrValue::List(mut list) => {
                for member in list.items().to_vec() {
                    self.link_member(id, attr, &member, &system)?;
                }
                list.set_slot(slot);
                AttrValue::List(list)
            }
            AttrValue::Mix(mut mix) => {
                for member in mix.keys().cloned().collect::<Vec<_>>() {
                    self.link_member(id, attr, &member, &system)?;
                }
                mix.set_slot(slot);
                AttrValue::Mix(mix)
            }
        };
        self.object_mut(id)?.insert_attr(attr.to_string(), value);
        Ok(())
    }

    fn link_member(
        &mut self,
        owner: &ObjectId,
        attr: &str,
        member: &ObjectId,
        system: &Option<ObjectId>,
    ) -> Result<(), EngineError> {
        self.object_mut(member)?
            .add_container(owner.clone(), attr.to_string());
        if let Some(system) = system {
            self.claim_system(member, system)?;
        }
        Ok(())
    }

    /// Claim `id` (and everything it links to) for `system`.
    ///
    /// Every object belongs to at most one system; a conflicting prior claim
    /// fails the whole construction.
    fn claim_system(&mut self, id: &ObjectId, system: &ObjectId) -> Result<(), EngineError> {
        let object = self.object_mut(id)?;
        match object.system() {
            Some(existing) if existing == system => return Ok(()),
            Some(existing) => {
                return Err(EngineError::SystemMembership {
                    object: object.to_string(),
                    system: existing.to_string(),
                })
            }
            None => object.set_system(Some(system.clone())),
        }
        let linked: Vec<ObjectId> = self.outbound_links(id)?;
        for member in linked {
            self.claim_system(&member, system)?;
        }
        Ok(())
    }

    fn outbound_links(&self, id: &ObjectId) -> Result<Vec<ObjectId>, EngineError> {
        let mut out = Vec::new();
        for value in self.object(id)?.attrs().values() {
            match value {
                AttrValue::Ref(Some(r)) => out.push(r.target().clone()),
                AttrValue::List(l) => out.extend(l.iter().cloned()),
                AttrValue::Mix(m) => out.extend(m.keys().cloned()),
                _ => {}
            }
        }
        Ok(out)
    }

    /// Detach and return the attribute, unwiring ownership and back-links.
    ///
    /// The children edges pointing *at* the slot's value id are kept: the
    /// slot keeps its identity across replacement.
    pub(crate) fn detach(
        &mut self,
        id: &ObjectId,
        attr: &str,
    ) -> Result<AttrValue, EngineError> {
        let removed =
            self.object_mut(id)?
                .remove_attr(attr)
                .ok_or_else(|| EngineError::MissingAttribute {
                    object: id.to_string(),
                    attr: attr.to_string(),
                })?;
        let slot = Slot::attr(id.clone(), attr);
        Ok(match removed {
            AttrValue::Value(mut v) => {
                let vid = slot.value_id();
                if let Some(ancestors) = self.ancestors.remove(&vid) {
                    for ancestor in ancestors {
                        if let Some(set) = self.children.get_mut(&ancestor) {
                            set.remove(&vid);
                        }
                    }
                }
                self.slots.remove(&vid);
                v.clear_slot();
                AttrValue::Value(v)
            }
            AttrValue::Ref(r) => {
                if let Some(r) = &r {
                    let target = r.target().clone();
                    self.object_mut(&target)?.remove_container(id, attr);
                }
                AttrValue::Ref(r)
            }
            AttrValue::List(mut list) => {
                for member in list.items().to_vec() {
                    self.object_mut(&member)?.remove_container(id, attr);
                }
                list.clear_slot();
                AttrValue::List(list)
            }
            AttrValue::Mix(mut mix) => {
                for member in mix.keys().cloned().collect::<Vec<_>>() {
                    self.object_mut(&member)?.remove_container(id, attr);
                }
                mix.clear_slot();
                AttrValue::Mix(mix)
            }
        })
    }

    /// The substitution primitive: swap the attribute's value without any
    /// recompute side effects.
    ///
    /// Requires the replacement to be of the exact same kind as the value it
    /// replaces. Returns the detached old value, its owner unset.
    pub(crate) fn replace_without_recompute(
        &mut self,
        id: &ObjectId,
        attr: &str,
        new: AttrValue,
    ) -> Result<AttrValue, EngineError> {
        let old = self.attr(id, attr)?;
        if !old.same_kind(&new) {
            return Err(EngineError::TypeMismatch {
                slot: Slot::attr(id.clone(), attr).to_string(),
                expected: old.kind(),
                actual: new.kind(),
            });
        }
        let old = self.detach(id, attr)?;
        self.attach(id, attr, new)?;
        Ok(old)
    }

    fn attach_or_replace(
        &mut self,
        id: &ObjectId,
        attr: &str,
        new: AttrValue,
    ) -> Result<(), EngineError> {
        if self.object(id)?.attr(attr).is_some() {
            self.detach(id, attr)?;
        }
        self.attach(id, attr, new)
    }

    /// Re-run the registered recompute function for one calculated attribute
    /// and swap the fresh value in. Returns the previous value, if any.
    pub(crate) fn recompute_attr(
        &mut self,
        id: &ObjectId,
        attr: &str,
    ) -> Result<Option<AttrValue>, EngineError> {
        let calc = self
            .object(id)?
            .class()
            .calculated()
            .iter()
            .find(|c| c.name == attr)
            .cloned()
            .ok_or_else(|| EngineError::MissingAttribute {
                object: id.to_string(),
                attr: attr.to_string(),
            })?;
        let fresh = (calc.recompute)(self, id)?;
        if self.object(id)?.attr(attr).is_some() {
            Ok(Some(self.replace_without_recompute(
                id,
                attr,
                AttrValue::Value(fresh),
            )?))
        } else {
            self.attach(id, attr, AttrValue::Value(fresh))?;
            Ok(None)
        }
    }

    /// Restore a previously detached attribute value into its slot.
    ///
    /// Used by simulation revert; the inverse of the snapshot taken while
    /// swapping.
    pub(crate) fn restore(
        &mut self,
        id: &ObjectId,
        attr: &str,
        value: AttrValue,
    ) -> Result<(), EngineError> {
        self.attach_or_replace(id, attr, value)
    }

    /// Insert a bare object during graph rebuild, before any attribute is
    /// attached. The object stays unarmed until the rebuild settles.
    pub(crate) fn insert_bare(
        &mut self,
        id: ObjectId,
        name: &str,
        class: Arc<ClassSpec>,
        system: Option<ObjectId>,
    ) {
        let mut object = ModelObject::new(id.clone(), name, class);
        object.set_system(system);
        self.objects.insert(id, object);
    }

    pub(crate) fn arm_object(&mut self, id: &ObjectId) -> Result<(), EngineError> {
        self.object_mut(id)?.arm();
        Ok(())
    }

    /// Build a reference attribute value for `target` living at `(id, attr)`.
    pub(crate) fn reference_value(
        &self,
        id: &ObjectId,
        attr: &str,
        target: Option<ObjectId>,
    ) -> AttrValue {
        self.wrap_reference(id, attr, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ClassSpec;
    use crate::units::{kilogram, Quantity};

    fn leaf_class() -> Arc<ClassSpec> {
        ClassSpec::builder("Leaf", 0).build()
    }

    fn kg_value(magnitude: f64, label: &str) -> AttrValue {
        AttrValue::Value(ExplainableValue::from_quantity(
            Quantity::new(magnitude, kilogram()),
            label,
        ))
    }

    #[test]
    fn attach_enforces_single_ownership() {
        let mut graph = ModelGraph::new();
        let a = graph
            .add_object(leaf_class(), "a", vec![("x".into(), kg_value(1.0, "x"))])
            .unwrap();
        let b = graph.add_object(leaf_class(), "b", vec![]).unwrap();

        let owned = graph.value(&a, "x").unwrap().clone();
        let err = graph.attach(&b, "y", AttrValue::Value(owned)).unwrap_err();
        assert!(matches!(err, EngineError::AlreadyOwned { .. }));
    }

    #[test]
    fn replacement_preserves_slot_identity() {
        let mut graph = ModelGraph::new();
        let a = graph
            .add_object(leaf_class(), "a", vec![("x".into(), kg_value(1.0, "x"))])
            .unwrap();
        let old = graph
            .replace_without_recompute(&a, "x", kg_value(2.0, "x2"))
            .unwrap();
        assert!(old.as_value().unwrap().slot().is_none());
        let current = graph.value(&a, "x").unwrap();
        assert_eq!(current.quantity().unwrap().magnitude, 2.0);
        assert_eq!(
            current.value_id().unwrap(),
            Slot::attr(a.clone(), "x").value_id()
        );
    }

    #[test]
    fn replacement_requires_exact_kind() {
        let mut graph = ModelGraph::new();
        let a = graph
            .add_object(leaf_class(), "a", vec![("x".into(), kg_value(1.0, "x"))])
            .unwrap();
        let err = graph
            .replace_without_recompute(&a, "x", AttrValue::List(LinkedObjects::default()))
            .unwrap_err();
        assert!(matches!(err, EngineError::TypeMismatch { .. }));
    }

    #[test]
    fn references_maintain_back_links() {
        let mut graph = ModelGraph::new();
        let server = graph.add_object(leaf_class(), "server", vec![]).unwrap();
        let job = graph.add_object(leaf_class(), "job", vec![]).unwrap();
        graph
            .set_reference(&job, "server", Some(server.clone()))
            .unwrap();
        assert!(graph
            .object(&server)
            .unwrap()
            .containers()
            .contains(&(job.clone(), "server".into())));

        graph.set_reference(&job, "server", None).unwrap();
        assert!(graph.object(&server).unwrap().containers().is_empty());
    }

    #[test]
    fn self_delete_guard_names_the_container() {
        let mut graph = ModelGraph::new();
        let server = graph.add_object(leaf_class(), "the-server", vec![]).unwrap();
        let job = graph.add_object(leaf_class(), "the-job", vec![]).unwrap();
        graph
            .set_reference(&job, "server", Some(server.clone()))
            .unwrap();

        let err = graph.self_delete(&server).unwrap_err();
        match err {
            EngineError::StillReferenced { by, .. } => assert!(by.contains("the-job")),
            other => panic!("unexpected error: {other:?}"),
        }

        graph.set_reference(&job, "server", None).unwrap();
        graph.self_delete(&server).unwrap();
        assert!(graph.object(&server).is_err());
    }

    #[test]
    fn system_membership_is_exclusive() {
        let mut graph = ModelGraph::new();
        let system_class = ClassSpec::builder("System", crate::object::SYSTEM_RANK).build();
        let shared = graph.add_object(leaf_class(), "shared", vec![]).unwrap();

        graph
            .add_object(
                system_class.clone(),
                "system-1",
                vec![(
                    "parts".into(),
                    AttrValue::List(LinkedObjects::new(vec![shared.clone()])),
                )],
            )
            .unwrap();

        let err = graph
            .add_object(
                system_class,
                "system-2",
                vec![(
                    "parts".into(),
                    AttrValue::List(LinkedObjects::new(vec![shared.clone()])),
                )],
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::SystemMembership { .. }));
    }
}
