//! Graph serialization.
//!
//! A graph serializes to a versioned, flat JSON document mapping object ids
//! to objects. Behavior does not serialize: classes are referenced by name
//! and resolved against a [`ClassRegistry`] on rebuild, and calculated
//! attributes are always recomputed from the re-attached inputs, so stored
//! calculated data (written only on request) is informational.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::link::ObjectId;
use crate::object::{AttrValue, ClassSpec, ContextualRef};
use crate::value::{ExplainableValue, Payload, Source};
use crate::collections::{LinkedObjects, WeightedMix};
use crate::EngineError;
use crate::ModelGraph;

/// Current serialized-format version.
pub const FORMAT_VERSION: u32 = 1;

/// The class specs a rebuild can resolve, keyed by class name.
#[derive(Default)]
pub struct ClassRegistry {
    classes: BTreeMap<String, Arc<ClassSpec>>,
}

impl ClassRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Default::default()
    }

    /// Register a class spec under its own name.
    pub fn register(&mut self, class: Arc<ClassSpec>) {
        self.classes.insert(class.name().to_string(), class);
    }

    /// Resolve a class by name.
    pub fn get(&self, name: &str) -> Result<&Arc<ClassSpec>, EngineError> {
        self.classes
            .get(name)
            .ok_or_else(|| EngineError::UnknownClass(name.to_string()))
    }
}

#[derive(Serialize, Deserialize)]
struct SerializedGraph {
    version: u32,
    objects: BTreeMap<ObjectId, SerializedObject>,
}

#[derive(Serialize, Deserialize)]
struct SerializedObject {
    name: String,
    class: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    system: Option<ObjectId>,
    attrs: BTreeMap<String, SerializedAttr>,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum SerializedAttr {
    Value {
        label: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        source: Option<Source>,
        payload: Payload,
    },
    Reference {
        target: Option<ObjectId>,
    },
    List {
        items: Vec<ObjectId>,
    },
    Mix {
        entries: Vec<(ObjectId, f64)>,
    },
}

/// Serialize the graph to pretty JSON.
///
/// Calculated attributes are skipped unless `with_calculated_attributes_data`
/// is set; either way a rebuild recomputes them from the inputs.
pub fn to_json(
    graph: &ModelGraph,
    with_calculated_attributes_data: bool,
) -> Result<String, EngineError> {
    let mut objects = BTreeMap::new();
    for object in graph.objects() {
        let mut attrs = BTreeMap::new();
        for (name, value) in object.attrs() {
            if object.class().is_calculated(name) && !with_calculated_attributes_data {
                continue;
            }
            let serialized = match value {
                AttrValue::Value(v) => SerializedAttr::Value {
                    label: v.label().to_string(),
                    source: v.source().cloned(),
                    payload: v.payload().clone(),
                },
                AttrValue::Ref(r) => SerializedAttr::Reference {
                    target: r.as_ref().map(|r| r.target().clone()),
                },
                AttrValue::List(l) => SerializedAttr::List {
                    items: l.items().to_vec(),
                },
                AttrValue::Mix(m) => SerializedAttr::Mix {
                    entries: m.entries().to_vec(),
                },
            };
            attrs.insert(name.clone(), serialized);
        }
        objects.insert(
            object.id().clone(),
            SerializedObject {
                name: object.name().to_string(),
                class: object.class().name().to_string(),
                system: object.system().cloned(),
                attrs,
            },
        );
    }
    let doc = SerializedGraph {
        version: FORMAT_VERSION,
        objects,
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// Rebuild a graph from its JSON form.
///
/// Objects are re-created bare with their serialized ids, inputs are
/// re-attached, then every calculated attribute is replayed in canonical
/// rank order before the objects arm. Stored calculated data, if present,
/// is ignored in favor of the replay.
pub fn from_json(json: &str, registry: &ClassRegistry) -> Result<ModelGraph, EngineError> {
    let doc: SerializedGraph = serde_json::from_str(json)?;
    if doc.version != FORMAT_VERSION {
        return Err(EngineError::UnsupportedVersion(doc.version));
    }

    let mut graph = ModelGraph::new();
    for (id, object) in &doc.objects {
        let class = registry.get(&object.class)?;
        graph.insert_bare(id.clone(), &object.name, class.clone(), object.system.clone());
    }

    for (id, object) in &doc.objects {
        let class = registry.get(&object.class)?;
        for (attr, serialized) in &object.attrs {
            if class.is_calculated(attr) {
                continue;
            }
            let value = match serialized {
                SerializedAttr::Value {
                    label,
                    source,
                    payload,
                } => {
                    let mut v = match payload {
                        Payload::Empty => ExplainableValue::empty(label.clone()),
                        Payload::Quantity(q) => {
                            ExplainableValue::from_quantity(q.clone(), label.clone())
                        }
                        Payload::Hourly(s) => {
                            ExplainableValue::from_hourly(s.clone(), label.clone())
                        }
                        Payload::Object(o) => {
                            ExplainableValue::from_object(o.clone(), label.clone())
                        }
                    };
                    if let Some(source) = source {
                        v = v.with_source(source.clone());
                    }
                    AttrValue::Value(v)
                }
                SerializedAttr::Reference { target } => AttrValue::Ref(
                    target
                        .clone()
                        .map(|t| ContextualRef::new(t, id.clone(), attr.clone())),
                ),
                SerializedAttr::List { items } => {
                    AttrValue::List(LinkedObjects::new(items.clone()))
                }
                SerializedAttr::Mix { entries } => {
                    AttrValue::Mix(WeightedMix::new(entries.clone(), attr)?)
                }
            };
            graph.attach(id, attr, value)?;
        }
    }

    // Replay calculated attributes in canonical order so every recompute
    // reads already-settled upstream values.
    let mut replay: Vec<(u32, ObjectId)> = doc
        .objects
        .keys()
        .map(|id| Ok((graph.object(id)?.class().rank(), id.clone())))
        .collect::<Result<_, EngineError>>()?;
    replay.sort();
    for (_, id) in &replay {
        let calculated: Vec<String> = graph
            .object(id)?
            .class()
            .calculated()
            .iter()
            .map(|c| c.name.clone())
            .collect();
        for attr in calculated {
            debug!(%id, attr, "replaying calculated attribute");
            graph.recompute_attr(id, &attr)?;
        }
    }
    for (_, id) in &replay {
        graph.arm_object(id)?;
    }
    Ok(graph)
}
