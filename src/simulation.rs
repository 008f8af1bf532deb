//! Time-boxed, revertible updates.
//!
//! A [`Simulation`] forks part of the timeline: it validates the simulation
//! date against the modeled hourly window, applies its changes as a regular
//! update, then trims every untouched hourly ancestor of the recomputed
//! values so the simulated effect only covers the hours from the simulation
//! date onward. Every displaced value is snapshotted, and
//! [`AppliedSimulation::revert`] restores them in reverse order, leaving the
//! baseline graph exactly as it was.

use std::collections::BTreeSet;

use chrono::{NaiveDateTime, Timelike};
use tracing::{debug, info};

use crate::link::{ObjectId, ValueId};
use crate::object::AttrValue;
use crate::update::{Change, ModelingUpdate};
use crate::value::Payload;
use crate::EngineError;
use crate::ModelGraph;

/// A batch of changes taking effect at one simulation date.
#[derive(Debug)]
pub struct Simulation {
    at: NaiveDateTime,
    changes: Vec<Change>,
}

/// The record of an applied simulation, holding everything needed to revert.
#[derive(Debug)]
pub struct AppliedSimulation {
    at: NaiveDateTime,
    snapshot: Vec<(ObjectId, String, AttrValue)>,
}

impl Simulation {
    /// Build a simulation taking effect at `at`.
    pub fn new(at: NaiveDateTime, changes: Vec<Change>) -> Self {
        Simulation { at, changes }
    }

    /// Apply the simulation.
    ///
    /// Fails before any mutation if `at` is not hour-aligned or falls
    /// outside the union of modeled hourly ranges; partial application is
    /// never allowed.
    pub fn apply(self, graph: &mut ModelGraph) -> Result<AppliedSimulation, EngineError> {
        if self.at.minute() != 0 || self.at.second() != 0 || self.at.nanosecond() != 0 {
            return Err(EngineError::MisalignedSeries {
                left: format!("simulation date {} is not hour-aligned", self.at),
                right: "hourly grid".to_string(),
            });
        }
        match graph.modeling_window() {
            None => {
                return Err(EngineError::SimulationOutOfWindow {
                    at: self.at,
                    window: "empty".to_string(),
                })
            }
            Some((lo, hi)) if self.at < lo || self.at >= hi => {
                return Err(EngineError::SimulationOutOfWindow {
                    at: self.at,
                    window: format!("[{lo} .. {hi})"),
                })
            }
            Some(_) => {}
        }
        info!(at = %self.at, changes = self.changes.len(), "applying simulation");

        let applied = ModelingUpdate::new(self.changes).apply(graph)?;
        let mut snapshot = applied.snapshot;

        // The hourly ancestors the update did not touch still carry
        // pre-simulation history; trim them so the fork only covers hours
        // from the simulation date onward.
        let touched: BTreeSet<ValueId> = snapshot
            .iter()
            .map(|(id, attr, _)| crate::link::Slot::attr(id.clone(), attr.clone()).value_id())
            .collect();
        let mut ancestors: Vec<ValueId> = Vec::new();
        for vid in &touched {
            for ancestor in graph.ancestors_of(vid) {
                if !touched.contains(ancestor) && !ancestors.contains(ancestor) {
                    ancestors.push(ancestor.clone());
                }
            }
        }
        for vid in ancestors {
            let Some(slot) = graph.slot_of(&vid).cloned() else {
                continue;
            };
            let current = graph.value(&slot.owner, slot.key.attr())?;
            if !matches!(current.payload(), Payload::Hourly(_)) {
                continue;
            }
            debug!(%vid, at = %self.at, "trimming untouched hourly ancestor");
            let trimmed = current.trimmed_from(self.at);
            let old = graph.replace_without_recompute(
                &slot.owner,
                slot.key.attr(),
                AttrValue::Value(trimmed),
            )?;
            snapshot.push((slot.owner.clone(), slot.key.attr().to_string(), old));
        }

        Ok(AppliedSimulation {
            at: self.at,
            snapshot,
        })
    }
}

impl AppliedSimulation {
    /// The simulation date.
    pub fn at(&self) -> NaiveDateTime {
        self.at
    }

    /// The attribute slots this simulation touched, in application order.
    pub fn touched(&self) -> impl Iterator<Item = (&ObjectId, &str)> {
        self.snapshot.iter().map(|(id, attr, _)| (id, attr.as_str()))
    }

    /// Undo the simulation, restoring every displaced value in reverse
    /// order. The graph ends exactly as it was before the simulation.
    pub fn revert(self, graph: &mut ModelGraph) -> Result<(), EngineError> {
        info!(at = %self.at, "reverting simulation");
        for (id, attr, value) in self.snapshot.into_iter().rev() {
            graph.restore(&id, &attr, value)?;
        }
        Ok(())
    }
}
