//! Impact-Flow: a reactive recomputation engine for environmental footprint
//! models.
//!
//! The engine keeps a graph of modeling objects whose calculated attributes
//! are explainable values: quantities and hourly series that remember the
//! operands and operators that produced them. Changing an input swaps the
//! new value in and replays exactly the affected downstream computations,
//! in a canonical order that never reads a stale upstream value.
//!
//! # Key Features
//!
//! - **Explainable values**: every derived quantity renders its full
//!   upstream expression tree with [`ExplainableValue::explain`]
//! - **Single ownership**: a value lives in exactly one attribute slot;
//!   attaching it elsewhere is an error, not a silent alias
//! - **Incremental updates**: a [`ModelingUpdate`] recomputes only the
//!   optimized downstream chain of what actually changed
//! - **Revertible simulations**: a [`Simulation`] forks the timeline from a
//!   date, and reverting restores the baseline exactly
//! - **Dimensioned arithmetic**: quantities and hourly series carry units
//!   and fail loudly on dimensional mismatch
//!
//! # Example
//!
//! ```ignore
//! use impact_flow::{AttrValue, ClassSpec, ExplainableValue, ModelGraph, Quantity, units};
//!
//! let server = ClassSpec::builder("Server", 1)
//!     .calculated("yearly_footprint", |graph, id| {
//!         let fabrication = graph.value(id, "fabrication")?;
//!         let lifespan = graph.value(id, "lifespan")?;
//!         fabrication.divide(lifespan)
//!     })
//!     .build();
//!
//! let mut graph = ModelGraph::new();
//! let id = graph.add_object(server, "server-1", vec![
//!     ("fabrication".into(), AttrValue::Value(ExplainableValue::from_quantity(
//!         Quantity::new(600.0, units::kilogram()), "fabrication footprint"))),
//!     ("lifespan".into(), AttrValue::Value(ExplainableValue::from_quantity(
//!         Quantity::new(6.0, units::year()), "lifespan"))),
//! ])?;
//!
//! // Assigning an input on the armed object replays the downstream chain.
//! graph.set_value(&id, "fabrication", ExplainableValue::from_quantity(
//!     Quantity::new(1200.0, units::kilogram()), "fabrication footprint"))?;
//! println!("{}", graph.value(&id, "yearly_footprint")?.explain());
//! ```

pub mod chain;
mod collections;
mod error;
mod graph;
mod link;
mod object;
mod recurrent;
mod serialize;
mod series;
mod simulation;
pub mod units;
mod update;
mod value;

pub use collections::{LinkedObjects, WeightedMix, WEIGHT_TOLERANCE};
pub use error::EngineError;
pub use graph::ModelGraph;
pub use link::{ObjectId, Slot, SlotKey, ValueId};
pub use object::{
    AttrValue, CalculatedAttr, ClassSpec, ClassSpecBuilder, ContextualRef, DependentsFn,
    ModelObject, RecomputeFn, SYSTEM_RANK,
};
pub use recurrent::{RecurrentQuantity, HOURS_PER_WEEK};
pub use serialize::{from_json, to_json, ClassRegistry, FORMAT_VERSION};
pub use series::HourlySeries;
pub use simulation::{AppliedSimulation, Simulation};
pub use units::{Quantity, Unit};
pub use update::{AppliedUpdate, Change, ModelingUpdate};
pub use value::{ExplainableValue, Operator, Payload, Source};
