//! Identities and ownership slots.
//!
//! Every owned value or collection lives in exactly one [`Slot`]: an owning
//! object plus an attribute name (or a keyed entry inside a mapping
//! attribute). The slot gives the value its [`ValueId`], the stable composite
//! key used by the dependency bookkeeping. A value with no slot has no id.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of a modeling object.
///
/// Built from the object's name slug plus a uuid fragment, so ids stay
/// readable in logs and stable across serialization round-trips.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(String);

impl ObjectId {
    /// Allocate a fresh id for an object named `name`.
    pub fn new(name: &str) -> Self {
        let slug: String = name
            .chars()
            .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();
        let fragment = &Uuid::new_v4().simple().to_string()[..6];
        ObjectId(format!("{slug}-{fragment}"))
    }

    /// Rebuild an id from its serialized form.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        ObjectId(raw.into())
    }

    /// The raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where inside its owner an owned value lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SlotKey {
    /// A plain attribute.
    Attr(String),
    /// A keyed entry inside a mapping attribute.
    MapEntry {
        /// The mapping attribute's name.
        attr: String,
        /// The key within the mapping.
        key: ObjectId,
    },
}

impl SlotKey {
    /// The attribute name, whether plain or mapping.
    pub fn attr(&self) -> &str {
        match self {
            SlotKey::Attr(attr) => attr,
            SlotKey::MapEntry { attr, .. } => attr,
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKey::Attr(attr) => write!(f, "{attr}"),
            SlotKey::MapEntry { attr, key } => write!(f, "{attr}[{key}]"),
        }
    }
}

/// The single owner location of a value: owning object plus slot key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Slot {
    /// The owning object.
    pub owner: ObjectId,
    /// The slot within the owner.
    pub key: SlotKey,
}

impl Slot {
    /// A plain-attribute slot.
    pub fn attr(owner: ObjectId, attr: impl Into<String>) -> Self {
        Slot {
            owner,
            key: SlotKey::Attr(attr.into()),
        }
    }

    /// A keyed-mapping slot.
    pub fn map_entry(owner: ObjectId, attr: impl Into<String>, key: ObjectId) -> Self {
        Slot {
            owner,
            key: SlotKey::MapEntry {
                attr: attr.into(),
                key,
            },
        }
    }

    /// The composite value id for whatever occupies this slot.
    pub fn value_id(&self) -> ValueId {
        ValueId(format!("{}-in-{}", self.key, self.owner))
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {}", self.key, self.owner)
    }
}

/// Composite key identifying an owned value: `"{attr}-in-{owner_id}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(String);

impl ValueId {
    /// The raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
