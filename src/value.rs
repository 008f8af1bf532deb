//! Explainable values.
//!
//! An [`ExplainableValue`] is a value that remembers how it was computed: a
//! payload (scalar quantity, hourly series, or opaque object), a human label,
//! an optional provenance source, and links to the two operand values and the
//! operator that produced it. Arithmetic always builds a *new* value, never
//! mutates in place, so the upstream expression tree stays immutable and can
//! be rendered after the fact with [`ExplainableValue::explain`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::link::{Slot, ValueId};
use crate::series::HourlySeries;
use crate::units::{Quantity, Unit};
use crate::EngineError;

/// The operation that combined two values into a derived one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    /// Addition.
    Add,
    /// Subtraction.
    Subtract,
    /// Multiplication.
    Multiply,
    /// Division.
    Divide,
    /// Fold of several values into one.
    Sum,
    /// Rounding to a number of decimals.
    Round,
    /// Unit conversion.
    Convert,
}

impl Operator {
    /// Infix or function symbol used in labels and explanations.
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::Sum => "sum",
            Operator::Round => "round",
            Operator::Convert => "to",
        }
    }

    fn is_binary(&self) -> bool {
        matches!(
            self,
            Operator::Add | Operator::Subtract | Operator::Multiply | Operator::Divide
        )
    }
}

/// Named provenance of a source value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Name of the source (publication, dataset, hypothesis).
    pub name: String,
    /// Optional link to the source.
    pub link: Option<String>,
}

impl Source {
    /// A named source with an optional link.
    pub fn new(name: impl Into<String>, link: Option<String>) -> Self {
        Source {
            name: name.into(),
            link,
        }
    }

    /// The conventional source for modeler-chosen values.
    pub fn hypothesis() -> Self {
        Source::new("hypothesis", None)
    }
}

/// The payload carried by an explainable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// Intentionally absent. The identity element of every binary operation.
    Empty,
    /// A scalar with a unit.
    Quantity(Quantity),
    /// An hourly time series.
    Hourly(HourlySeries),
    /// An opaque non-numeric payload.
    Object(serde_json::Value),
}

impl Payload {
    /// The payload kind, for type-mismatch diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Empty => "empty value",
            Payload::Quantity(_) => "quantity",
            Payload::Hourly(_) => "hourly series",
            Payload::Object(_) => "object",
        }
    }

    /// Returns true for the Empty variant.
    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Empty => write!(f, "no value"),
            Payload::Quantity(q) => write!(f, "{q}"),
            Payload::Hourly(s) => write!(f, "{s}"),
            Payload::Object(v) => write!(f, "{v}"),
        }
    }
}

/// A value annotated with how it was derived and where it lives.
#[derive(Debug, Clone)]
pub struct ExplainableValue {
    payload: Payload,
    label: String,
    source: Option<Source>,
    left: Option<Arc<ExplainableValue>>,
    right: Option<Arc<ExplainableValue>>,
    operator: Option<Operator>,
    slot: Option<Slot>,
}

impl ExplainableValue {
    /// The distinguished Empty value.
    pub fn empty(label: impl Into<String>) -> Self {
        ExplainableValue {
            payload: Payload::Empty,
            label: label.into(),
            source: None,
            left: None,
            right: None,
            operator: None,
            slot: None,
        }
    }

    /// A leaf scalar value.
    pub fn from_quantity(quantity: Quantity, label: impl Into<String>) -> Self {
        ExplainableValue {
            payload: Payload::Quantity(quantity),
            label: label.into(),
            source: None,
            left: None,
            right: None,
            operator: None,
            slot: None,
        }
    }

    /// A leaf hourly-series value.
    pub fn from_hourly(series: HourlySeries, label: impl Into<String>) -> Self {
        ExplainableValue {
            payload: Payload::Hourly(series),
            label: label.into(),
            source: None,
            left: None,
            right: None,
            operator: None,
            slot: None,
        }
    }

    /// A leaf opaque-object value.
    pub fn from_object(value: serde_json::Value, label: impl Into<String>) -> Self {
        ExplainableValue {
            payload: Payload::Object(value),
            label: label.into(),
            source: None,
            left: None,
            right: None,
            operator: None,
            slot: None,
        }
    }

    /// Attach a provenance source.
    #[must_use]
    pub fn with_source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }

    /// Override the auto-generated label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// The payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// The human label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The provenance source, if any.
    pub fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    /// The combining operator, if this value is derived.
    pub fn operator(&self) -> Option<Operator> {
        self.operator
    }

    /// Left operand of the derivation, if any.
    pub fn left_operand(&self) -> Option<&ExplainableValue> {
        self.left.as_deref()
    }

    /// Right operand of the derivation, if any.
    pub fn right_operand(&self) -> Option<&ExplainableValue> {
        self.right.as_deref()
    }

    /// The slot this value currently occupies, if owned.
    pub fn slot(&self) -> Option<&Slot> {
        self.slot.as_ref()
    }

    /// The composite id of this value.
    ///
    /// Fails with [`EngineError::Unowned`] for a value with no owner, since an
    /// un-owned value has no stable identity for dependency bookkeeping.
    pub fn value_id(&self) -> Result<ValueId, EngineError> {
        match &self.slot {
            Some(slot) => Ok(slot.value_id()),
            None => Err(EngineError::Unowned {
                label: self.label.clone(),
            }),
        }
    }

    /// The scalar payload, if this value is a quantity.
    pub fn quantity(&self) -> Option<&Quantity> {
        match &self.payload {
            Payload::Quantity(q) => Some(q),
            _ => None,
        }
    }

    /// The series payload, if this value is hourly.
    pub fn hourly(&self) -> Option<&HourlySeries> {
        match &self.payload {
            Payload::Hourly(s) => Some(s),
            _ => None,
        }
    }

    /// Claim the slot for this value.
    ///
    /// Fails with [`EngineError::AlreadyOwned`] if the value already lives in
    /// a *different* slot; re-claiming the same slot is a no-op.
    pub(crate) fn set_slot(&mut self, slot: Slot) -> Result<(), EngineError> {
        match &self.slot {
            Some(existing) if *existing != slot => Err(EngineError::AlreadyOwned {
                label: self.label.clone(),
                existing: existing.to_string(),
                attempted: slot.to_string(),
            }),
            _ => {
                self.slot = Some(slot);
                Ok(())
            }
        }
    }

    /// Orphan this value.
    pub(crate) fn clear_slot(&mut self) {
        self.slot = None;
    }

    /// A detached copy: same payload and provenance, no owner.
    #[must_use]
    pub fn detached(&self) -> ExplainableValue {
        let mut copy = self.clone();
        copy.slot = None;
        copy
    }

    fn derived(
        payload: Payload,
        label: String,
        operator: Operator,
        left: &ExplainableValue,
        right: Option<&ExplainableValue>,
    ) -> ExplainableValue {
        ExplainableValue {
            payload,
            label,
            source: None,
            left: Some(Arc::new(left.clone())),
            right: right.map(|r| Arc::new(r.clone())),
            operator: Some(operator),
            slot: None,
        }
    }

    fn numeric_mismatch(&self) -> EngineError {
        EngineError::TypeMismatch {
            slot: self.label.clone(),
            expected: "numeric payload",
            actual: self.payload.kind(),
        }
    }

    /// Add two values. Empty is the identity element.
    pub fn add(&self, other: &ExplainableValue) -> Result<ExplainableValue, EngineError> {
        self.additive(other, Operator::Add)
    }

    /// Subtract `other` from this value. Empty is the identity element.
    pub fn subtract(&self, other: &ExplainableValue) -> Result<ExplainableValue, EngineError> {
        self.additive(other, Operator::Subtract)
    }

    fn additive(
        &self,
        other: &ExplainableValue,
        op: Operator,
    ) -> Result<ExplainableValue, EngineError> {
        if self.payload.is_empty() {
            return Ok(other.detached());
        }
        if other.payload.is_empty() {
            return Ok(self.detached());
        }
        let payload = match (&self.payload, &other.payload) {
            (Payload::Quantity(a), Payload::Quantity(b)) => Payload::Quantity(match op {
                Operator::Subtract => a.checked_sub(b)?,
                _ => a.checked_add(b)?,
            }),
            (Payload::Hourly(a), Payload::Hourly(b)) => Payload::Hourly(match op {
                Operator::Subtract => a.checked_sub(b)?,
                _ => a.checked_add(b)?,
            }),
            (Payload::Hourly(a), Payload::Quantity(b)) => {
                // Scalar operand applied element-wise.
                let factor = b.to(a.unit())?.magnitude;
                let shifted: Vec<f64> = a
                    .values()
                    .iter()
                    .map(|v| match op {
                        Operator::Subtract => v - factor,
                        _ => v + factor,
                    })
                    .collect();
                Payload::Hourly(HourlySeries::new(a.start(), shifted, a.unit().clone())?)
            }
            (Payload::Quantity(_), Payload::Hourly(_)) if op == Operator::Add => {
                return other.additive(self, op)
            }
            _ => return Err(self.numeric_mismatch()),
        };
        Ok(ExplainableValue::derived(
            payload,
            format!("{} {} {}", self.label, op.symbol(), other.label),
            op,
            self,
            Some(other),
        ))
    }

    /// Multiply two values, composing units. Empty is the identity element.
    pub fn multiply(&self, other: &ExplainableValue) -> Result<ExplainableValue, EngineError> {
        if self.payload.is_empty() {
            return Ok(other.detached());
        }
        if other.payload.is_empty() {
            return Ok(self.detached());
        }
        let payload = match (&self.payload, &other.payload) {
            (Payload::Quantity(a), Payload::Quantity(b)) => Payload::Quantity(a.multiply(b)),
            (Payload::Hourly(a), Payload::Quantity(b)) => Payload::Hourly(a.scale(b)),
            (Payload::Quantity(a), Payload::Hourly(b)) => Payload::Hourly(b.scale(a)),
            (Payload::Hourly(a), Payload::Hourly(b)) => Payload::Hourly(a.checked_mul(b)?),
            _ => return Err(self.numeric_mismatch()),
        };
        Ok(ExplainableValue::derived(
            payload,
            format!("{} * {}", self.label, other.label),
            Operator::Multiply,
            self,
            Some(other),
        ))
    }

    /// Divide this value by `other`, composing units. Empty is the identity
    /// element.
    pub fn divide(&self, other: &ExplainableValue) -> Result<ExplainableValue, EngineError> {
        if self.payload.is_empty() {
            return Ok(other.detached());
        }
        if other.payload.is_empty() {
            return Ok(self.detached());
        }
        let payload = match (&self.payload, &other.payload) {
            (Payload::Quantity(a), Payload::Quantity(b)) => Payload::Quantity(a.divide(b)),
            (Payload::Hourly(a), Payload::Quantity(b)) => Payload::Hourly(a.scale_div(b)),
            _ => return Err(self.numeric_mismatch()),
        };
        Ok(ExplainableValue::derived(
            payload,
            format!("{} / {}", self.label, other.label),
            Operator::Divide,
            self,
            Some(other),
        ))
    }

    /// Fold several values into one by addition.
    ///
    /// An empty slice (or a slice of Empty values) yields the Empty value.
    pub fn sum<'a>(
        values: impl IntoIterator<Item = &'a ExplainableValue>,
        label: impl Into<String>,
    ) -> Result<ExplainableValue, EngineError> {
        let label = label.into();
        let mut acc = ExplainableValue::empty(label.clone());
        for value in values {
            acc = acc.add(value)?;
        }
        Ok(acc.with_label(label))
    }

    /// Collapse an hourly value into its scalar sum.
    pub fn sum_over_time(&self) -> Result<ExplainableValue, EngineError> {
        let payload = match &self.payload {
            Payload::Empty => Payload::Empty,
            Payload::Hourly(s) => Payload::Quantity(s.sum()),
            Payload::Quantity(q) => Payload::Quantity(q.clone()),
            Payload::Object(_) => return Err(self.numeric_mismatch()),
        };
        Ok(ExplainableValue::derived(
            payload,
            format!("sum of {}", self.label),
            Operator::Sum,
            self,
            None,
        ))
    }

    /// Convert to another unit of the same dimension.
    pub fn to(&self, unit: &Unit) -> Result<ExplainableValue, EngineError> {
        let payload = match &self.payload {
            Payload::Empty => Payload::Empty,
            Payload::Quantity(q) => Payload::Quantity(q.to(unit)?),
            Payload::Hourly(s) => Payload::Hourly(s.to(unit)?),
            Payload::Object(_) => return Err(self.numeric_mismatch()),
        };
        Ok(ExplainableValue::derived(
            payload,
            format!("{} in {}", self.label, unit),
            Operator::Convert,
            self,
            None,
        ))
    }

    /// Round the numeric payload to `decimals` decimal places.
    pub fn round(&self, decimals: u32) -> Result<ExplainableValue, EngineError> {
        let payload = match &self.payload {
            Payload::Empty => Payload::Empty,
            Payload::Quantity(q) => Payload::Quantity(q.round(decimals)),
            Payload::Hourly(s) => Payload::Hourly(s.round(decimals)),
            Payload::Object(_) => return Err(self.numeric_mismatch()),
        };
        Ok(ExplainableValue::derived(
            payload,
            format!("{} rounded", self.label),
            Operator::Round,
            self,
            None,
        ))
    }

    /// A detached copy whose hourly payload keeps only the hours from `at`
    /// onward, or the Empty variant if nothing remains.
    ///
    /// Non-hourly payloads are returned unchanged (still detached). Label,
    /// source, and derivation links are preserved.
    #[must_use]
    pub fn trimmed_from(&self, at: chrono::NaiveDateTime) -> ExplainableValue {
        let mut copy = self.detached();
        if let Payload::Hourly(series) = &self.payload {
            copy.payload = match series.trim_from(at) {
                Some(trimmed) => Payload::Hourly(trimmed),
                None => Payload::Empty,
            };
        }
        copy
    }

    /// The live ancestors of this value, deduplicated by identity.
    ///
    /// Walks the operand tree and collects the nearest *owned* values, which
    /// are the leaves the full upstream computation touched. Used for
    /// dependency edges and simulation-period filtering.
    pub fn leaf_ancestors(&self) -> Vec<ValueId> {
        let mut out = Vec::new();
        fn collect(value: &ExplainableValue, out: &mut Vec<ValueId>) {
            for operand in [value.left.as_deref(), value.right.as_deref()]
                .into_iter()
                .flatten()
            {
                if let Some(slot) = &operand.slot {
                    let id = slot.value_id();
                    if !out.contains(&id) {
                        out.push(id);
                    }
                } else {
                    collect(operand, out);
                }
            }
        }
        collect(self, &mut out);
        out
    }

    /// Render the full upstream expression tree as human text.
    ///
    /// Recurses through the operands until reaching leaves (source values
    /// with no operands).
    pub fn explain(&self) -> String {
        if self.operator.is_none() {
            return match &self.source {
                Some(source) => format!("{} = {} (source: {})", self.label, self.payload, source.name),
                None => format!("{} = {}", self.label, self.payload),
            };
        }
        format!("{} = {} = {}", self.label, self.expression(), self.payload)
    }

    fn expression(&self) -> String {
        match (self.operator, self.left.as_deref(), self.right.as_deref()) {
            (Some(op), Some(left), Some(right)) if op.is_binary() => {
                format!(
                    "({} {} {})",
                    left.sub_expression(),
                    op.symbol(),
                    right.sub_expression()
                )
            }
            (Some(op), Some(left), _) => {
                format!("{}({})", op.symbol(), left.sub_expression())
            }
            _ => format!("{}", self.payload),
        }
    }

    fn sub_expression(&self) -> String {
        if self.operator.is_some() {
            self.expression()
        } else {
            format!("{} ({})", self.label, self.payload)
        }
    }
}

impl PartialEq for ExplainableValue {
    /// Equality by payload value, not by identity or label.
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload
    }
}

impl fmt::Display for ExplainableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{gram, kilogram, kilowatt_hour};

    fn kg(magnitude: f64, label: &str) -> ExplainableValue {
        ExplainableValue::from_quantity(Quantity::new(magnitude, kilogram()), label)
    }

    #[test]
    fn addition_records_derivation() {
        let a = kg(10.0, "a");
        let b = kg(5.0, "b");
        let total = a.add(&b).unwrap();
        assert_eq!(total.quantity().unwrap().magnitude, 15.0);
        assert_eq!(total.label(), "a + b");
        assert_eq!(total.operator(), Some(Operator::Add));
        assert_eq!(total.left_operand().unwrap().label(), "a");
        assert_eq!(total.right_operand().unwrap().label(), "b");
    }

    #[test]
    fn empty_is_identity_both_ways() {
        let v = kg(3.0, "v");
        let empty = ExplainableValue::empty("nothing");
        assert_eq!(v.add(&empty).unwrap(), v);
        assert_eq!(empty.add(&v).unwrap(), v);
        assert_eq!(v.multiply(&empty).unwrap(), v);
    }

    #[test]
    fn dimensionality_mismatch_propagates() {
        let mass = kg(1.0, "mass");
        let energy = ExplainableValue::from_quantity(
            Quantity::new(1.0, kilowatt_hour()),
            "energy",
        );
        assert!(matches!(
            mass.add(&energy),
            Err(EngineError::Dimensionality { .. })
        ));
    }

    #[test]
    fn equality_by_value_not_label() {
        let a = kg(1.0, "a");
        let b = ExplainableValue::from_quantity(Quantity::new(1000.0, gram()), "b");
        assert_eq!(a, b);
    }

    #[test]
    fn unowned_value_has_no_id() {
        let v = kg(1.0, "v");
        assert!(matches!(v.value_id(), Err(EngineError::Unowned { .. })));
    }

    #[test]
    fn explain_renders_expression_tree() {
        let a = kg(10.0, "server fabrication").with_source(Source::hypothesis());
        let b = kg(5.0, "storage fabrication");
        let total = a.add(&b).unwrap().with_label("total fabrication");
        let text = total.explain();
        assert!(text.contains("total fabrication ="));
        assert!(text.contains("server fabrication (10 kg)"));
        assert!(text.contains("storage fabrication (5 kg)"));
        assert!(text.contains("= 15 kg"));
    }

    #[test]
    fn sum_folds_with_empty_identity() {
        let values = [kg(1.0, "a"), ExplainableValue::empty("gap"), kg(2.0, "b")];
        let total = ExplainableValue::sum(values.iter(), "total").unwrap();
        assert_eq!(total.quantity().unwrap().magnitude, 3.0);
        assert_eq!(total.label(), "total");
    }

    #[test]
    fn leaf_ancestors_dedup_by_identity() {
        let mut a = kg(2.0, "a");
        a.set_slot(Slot::attr(crate::link::ObjectId::from_raw("obj-1"), "a"))
            .unwrap();
        let b = kg(3.0, "b"); // unowned, contributes nothing
        let double = a.add(&a).unwrap();
        let total = double.add(&b).unwrap();
        let ancestors = total.leaf_ancestors();
        assert_eq!(ancestors.len(), 1);
        assert_eq!(ancestors[0].as_str(), "a-in-obj-1");
    }
}
