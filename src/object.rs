//! Modeling objects and their class descriptors.
//!
//! A [`ModelObject`] is one domain entity (a server, a job, a usage pattern)
//! participating in the dependency graph. Its behavior comes from a
//! [`ClassSpec`]: the list of calculated attributes with their registered
//! recompute functions, the hand-declared forward dependency edges, and the
//! class's rank in the canonical recomputation order. Domain layers build
//! class specs once and share them across instances.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::collections::{LinkedObjects, WeightedMix};
use crate::graph::ModelGraph;
use crate::link::ObjectId;
use crate::value::ExplainableValue;
use crate::EngineError;

/// Rank reserved for System classes; always recomputed last.
pub const SYSTEM_RANK: u32 = u32::MAX;

/// Recompute function registered for one calculated attribute.
///
/// A pure function of the graph and the owning object: it reads current
/// input/dependency state and returns a fresh explainable value.
pub type RecomputeFn =
    Arc<dyn Fn(&ModelGraph, &ObjectId) -> Result<ExplainableValue, EngineError> + Send + Sync>;

/// Declared forward edges: the objects whose calculated attributes depend
/// directly on an instance of this class.
///
/// This is the hand-authored edge list that seeds the dependency graph; it is
/// not inferred from attribute reads.
pub type DependentsFn = Arc<dyn Fn(&ModelGraph, &ObjectId) -> Vec<ObjectId> + Send + Sync>;

/// A reference to another object, carrying where the reference lives.
///
/// The same target can be referenced from many places; each reference site
/// tracks its own back-link metadata, so the target can report exactly who
/// points at it and under which attribute name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextualRef {
    target: ObjectId,
    owner: ObjectId,
    attr: String,
}

impl ContextualRef {
    pub(crate) fn new(target: ObjectId, owner: ObjectId, attr: impl Into<String>) -> Self {
        ContextualRef {
            target,
            owner,
            attr: attr.into(),
        }
    }

    /// The referenced object.
    pub fn target(&self) -> &ObjectId {
        &self.target
    }

    /// The object holding this reference.
    pub fn owner(&self) -> &ObjectId {
        &self.owner
    }

    /// The attribute the reference lives under.
    pub fn attr(&self) -> &str {
        &self.attr
    }
}

/// The kinds of value an object attribute can hold.
///
/// One explicit variant per trackable change kind, built at the call site
/// rather than inferred from runtime types.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// An explainable value (scalar, hourly series, or opaque object).
    Value(ExplainableValue),
    /// A single, possibly absent, reference to another object.
    Ref(Option<ContextualRef>),
    /// An ordered list of child objects.
    List(LinkedObjects),
    /// A weighted mix of child objects.
    Mix(WeightedMix),
}

impl AttrValue {
    /// The attribute kind, for type-mismatch diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            AttrValue::Value(_) => "value",
            AttrValue::Ref(_) => "reference",
            AttrValue::List(_) => "list",
            AttrValue::Mix(_) => "mix",
        }
    }

    /// Returns true if `other` holds the same kind of attribute.
    pub fn same_kind(&self, other: &AttrValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// The inner explainable value, if this is a value attribute.
    pub fn as_value(&self) -> Option<&ExplainableValue> {
        match self {
            AttrValue::Value(v) => Some(v),
            _ => None,
        }
    }

    /// The inner list, if this is a list attribute.
    pub fn as_list(&self) -> Option<&LinkedObjects> {
        match self {
            AttrValue::List(l) => Some(l),
            _ => None,
        }
    }

    /// The inner mix, if this is a mix attribute.
    pub fn as_mix(&self) -> Option<&WeightedMix> {
        match self {
            AttrValue::Mix(m) => Some(m),
            _ => None,
        }
    }

    /// The referenced object id, if this is a non-empty reference attribute.
    pub fn as_ref_target(&self) -> Option<&ObjectId> {
        match self {
            AttrValue::Ref(Some(r)) => Some(r.target()),
            _ => None,
        }
    }

    /// A reference attribute input for object construction.
    ///
    /// The owner context of the wrapper is filled in when the graph attaches
    /// the attribute.
    pub fn reference(target: Option<ObjectId>) -> AttrValue {
        AttrValue::Ref(target.map(|t| ContextualRef::new(t.clone(), t, String::new())))
    }
}

/// One calculated attribute: a name plus its registered recompute function.
#[derive(Clone)]
pub struct CalculatedAttr {
    /// Attribute name.
    pub name: String,
    /// The registered recompute function.
    pub recompute: RecomputeFn,
}

impl fmt::Debug for CalculatedAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalculatedAttr")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Class descriptor shared by all instances of one domain class.
pub struct ClassSpec {
    name: String,
    rank: u32,
    calculated: Vec<CalculatedAttr>,
    dependents: DependentsFn,
    untracked: BTreeSet<String>,
}

impl ClassSpec {
    /// Start building a class spec.
    ///
    /// `rank` is the class's position in the canonical recomputation order:
    /// leaf entity classes get low ranks, aggregates high ranks, and
    /// [`SYSTEM_RANK`] is reserved for systems.
    pub fn builder(name: impl Into<String>, rank: u32) -> ClassSpecBuilder {
        ClassSpecBuilder {
            name: name.into(),
            rank,
            calculated: Vec::new(),
            dependents: Arc::new(|_, _| Vec::new()),
            untracked: BTreeSet::new(),
        }
    }

    /// The class name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The canonical-order rank.
    pub fn rank(&self) -> u32 {
        self.rank
    }

    /// The calculated attributes, in declaration (recomputation) order.
    pub fn calculated(&self) -> &[CalculatedAttr] {
        &self.calculated
    }

    /// Returns true if `attr` is one of the calculated attributes.
    pub fn is_calculated(&self, attr: &str) -> bool {
        self.calculated.iter().any(|c| c.name == attr)
    }

    /// The declared dependents function.
    pub fn dependents(&self) -> &DependentsFn {
        &self.dependents
    }

    /// Returns true if assignments to `attr` bypass update interception.
    pub fn is_untracked(&self, attr: &str) -> bool {
        self.untracked.contains(attr)
    }

    /// Returns true if this class is a System class.
    pub fn is_system(&self) -> bool {
        self.rank == SYSTEM_RANK
    }
}

impl fmt::Debug for ClassSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassSpec")
            .field("name", &self.name)
            .field("rank", &self.rank)
            .field(
                "calculated",
                &self.calculated.iter().map(|c| &c.name).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

/// Builder for [`ClassSpec`].
pub struct ClassSpecBuilder {
    name: String,
    rank: u32,
    calculated: Vec<CalculatedAttr>,
    dependents: DependentsFn,
    untracked: BTreeSet<String>,
}

impl ClassSpecBuilder {
    /// Declare a calculated attribute with its recompute function.
    ///
    /// Declaration order is recomputation order within the object.
    pub fn calculated(
        mut self,
        name: impl Into<String>,
        recompute: impl Fn(&ModelGraph, &ObjectId) -> Result<ExplainableValue, EngineError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.calculated.push(CalculatedAttr {
            name: name.into(),
            recompute: Arc::new(recompute),
        });
        self
    }

    /// Declare the objects whose calculated attributes depend directly on an
    /// instance of this class.
    pub fn dependents(
        mut self,
        dependents: impl Fn(&ModelGraph, &ObjectId) -> Vec<ObjectId> + Send + Sync + 'static,
    ) -> Self {
        self.dependents = Arc::new(dependents);
        self
    }

    /// Exempt a bookkeeping attribute from update interception.
    pub fn untracked(mut self, attr: impl Into<String>) -> Self {
        self.untracked.insert(attr.into());
        self
    }

    /// Finish the spec.
    pub fn build(self) -> Arc<ClassSpec> {
        Arc::new(ClassSpec {
            name: self.name,
            rank: self.rank,
            calculated: self.calculated,
            dependents: self.dependents,
            untracked: self.untracked,
        })
    }
}

/// One domain entity in the graph.
#[derive(Debug, Clone)]
pub struct ModelObject {
    id: ObjectId,
    name: String,
    class: Arc<ClassSpec>,
    attrs: BTreeMap<String, AttrValue>,
    containers: BTreeSet<(ObjectId, String)>,
    armed: bool,
    system: Option<ObjectId>,
}

impl ModelObject {
    pub(crate) fn new(id: ObjectId, name: impl Into<String>, class: Arc<ClassSpec>) -> Self {
        ModelObject {
            id,
            name: name.into(),
            class,
            attrs: BTreeMap::new(),
            containers: BTreeSet::new(),
            armed: false,
            system: None,
        }
    }

    /// The object's unique id.
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    /// The object's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The object's class descriptor.
    pub fn class(&self) -> &Arc<ClassSpec> {
        &self.class
    }

    /// All attributes.
    pub fn attrs(&self) -> &BTreeMap<String, AttrValue> {
        &self.attrs
    }

    /// One attribute, if present.
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }

    /// The `(container, attr)` pairs currently referencing this object.
    pub fn containers(&self) -> &BTreeSet<(ObjectId, String)> {
        &self.containers
    }

    /// Whether attribute assignment routes through the update engine.
    pub fn armed(&self) -> bool {
        self.armed
    }

    /// The system this object belongs to, if any.
    pub fn system(&self) -> Option<&ObjectId> {
        self.system.as_ref()
    }

    pub(crate) fn insert_attr(&mut self, name: String, value: AttrValue) {
        self.attrs.insert(name, value);
    }

    pub(crate) fn remove_attr(&mut self, name: &str) -> Option<AttrValue> {
        self.attrs.remove(name)
    }

    pub(crate) fn add_container(&mut self, container: ObjectId, attr: String) {
        self.containers.insert((container, attr));
    }

    pub(crate) fn remove_container(&mut self, container: &ObjectId, attr: &str) {
        self.containers
            .remove(&(container.clone(), attr.to_string()));
    }

    pub(crate) fn arm(&mut self) {
        self.armed = true;
    }

    pub(crate) fn set_system(&mut self, system: Option<ObjectId>) {
        self.system = system;
    }
}

impl fmt::Display for ModelObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}' ({})", self.class.name(), self.name, self.id)
    }
}
