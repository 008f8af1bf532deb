//! Hourly time series.
//!
//! An [`HourlySeries`] is a uniform-frequency sequence of dimensioned values
//! indexed by UTC timestamp at hour granularity. Element-wise arithmetic
//! requires identical index ranges; summation collapses a series into a
//! [`Quantity`].

use std::fmt;

use chrono::{Duration, FixedOffset, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::units::{Quantity, Unit};
use crate::EngineError;

/// A uniform hourly sequence of values sharing one unit.
///
/// Timestamps are UTC. `Clone` deep-copies the underlying values, so snapshots
/// taken for simulations can never alias live state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlySeries {
    start: NaiveDateTime,
    values: Vec<f64>,
    unit: Unit,
}

impl HourlySeries {
    /// Build a series starting at `start` (must be hour-aligned).
    pub fn new(
        start: NaiveDateTime,
        values: Vec<f64>,
        unit: Unit,
    ) -> Result<Self, EngineError> {
        if start.minute() != 0 || start.second() != 0 || start.nanosecond() != 0 {
            return Err(EngineError::MisalignedSeries {
                left: format!("start {start} is not hour-aligned"),
                right: "hourly grid".to_string(),
            });
        }
        Ok(HourlySeries {
            start,
            values,
            unit,
        })
    }

    /// First timestamp of the series.
    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    /// One past the last timestamp of the series.
    pub fn end(&self) -> NaiveDateTime {
        self.start + Duration::hours(self.values.len() as i64)
    }

    /// Number of hours covered.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the series covers no hours.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The values, in hour order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// The unit shared by all values.
    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    fn range_repr(&self) -> String {
        format!("[{} .. {})", self.start, self.end())
    }

    fn require_aligned(&self, other: &HourlySeries) -> Result<(), EngineError> {
        if self.start != other.start || self.values.len() != other.values.len() {
            return Err(EngineError::MisalignedSeries {
                left: self.range_repr(),
                right: other.range_repr(),
            });
        }
        Ok(())
    }

    /// Element-wise addition. Requires identical index ranges; converts
    /// `other` into this series' unit.
    pub fn checked_add(&self, other: &HourlySeries) -> Result<HourlySeries, EngineError> {
        self.require_aligned(other)?;
        let factor = other.unit.conversion_factor(&self.unit)?;
        let values = self
            .values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| a + b * factor)
            .collect();
        Ok(HourlySeries {
            start: self.start,
            values,
            unit: self.unit.clone(),
        })
    }

    /// Element-wise subtraction with the same alignment rules as addition.
    pub fn checked_sub(&self, other: &HourlySeries) -> Result<HourlySeries, EngineError> {
        self.require_aligned(other)?;
        let factor = other.unit.conversion_factor(&self.unit)?;
        let values = self
            .values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| a - b * factor)
            .collect();
        Ok(HourlySeries {
            start: self.start,
            values,
            unit: self.unit.clone(),
        })
    }

    /// Multiply every value by a quantity, composing units.
    pub fn scale(&self, by: &Quantity) -> HourlySeries {
        HourlySeries {
            start: self.start,
            values: self.values.iter().map(|v| v * by.magnitude).collect(),
            unit: self.unit.multiply(&by.unit),
        }
    }

    /// Divide every value by a quantity, composing units.
    pub fn scale_div(&self, by: &Quantity) -> HourlySeries {
        HourlySeries {
            start: self.start,
            values: self.values.iter().map(|v| v / by.magnitude).collect(),
            unit: self.unit.divide(&by.unit),
        }
    }

    /// Element-wise multiplication of two aligned series, composing units.
    pub fn checked_mul(&self, other: &HourlySeries) -> Result<HourlySeries, EngineError> {
        self.require_aligned(other)?;
        let values = self
            .values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| a * b)
            .collect();
        Ok(HourlySeries {
            start: self.start,
            values,
            unit: self.unit.multiply(&other.unit),
        })
    }

    /// Collapse the series into a single quantity by summation.
    pub fn sum(&self) -> Quantity {
        Quantity::new(self.values.iter().sum(), self.unit.clone())
    }

    /// The sub-series with timestamps in `[from, to)`, clamped to the series
    /// range. Sub-hour bounds snap down to the hourly grid, so the result
    /// never drifts off it.
    pub fn slice(&self, from: NaiveDateTime, to: NaiveDateTime) -> HourlySeries {
        let from = from.max(self.start);
        let to = to.min(self.end());
        if to <= from {
            return HourlySeries {
                start: self.start,
                values: Vec::new(),
                unit: self.unit.clone(),
            };
        }
        let lo = ((from - self.start).num_hours()) as usize;
        let hi = ((to - self.start).num_hours()) as usize;
        HourlySeries {
            start: self.start + Duration::hours(lo as i64),
            values: self.values[lo..hi].to_vec(),
            unit: self.unit.clone(),
        }
    }

    /// The tail of the series starting at `at`, or `None` if nothing remains.
    pub fn trim_from(&self, at: NaiveDateTime) -> Option<HourlySeries> {
        let trimmed = self.slice(at, self.end());
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    }

    /// Reinterpret a local-time series as UTC by subtracting the offset.
    pub fn local_to_utc(&self, offset: FixedOffset) -> HourlySeries {
        HourlySeries {
            start: self.start - Duration::seconds(offset.local_minus_utc() as i64),
            values: self.values.clone(),
            unit: self.unit.clone(),
        }
    }

    /// Round every value to `decimals` decimal places.
    pub fn round(&self, decimals: u32) -> HourlySeries {
        let scale = 10f64.powi(decimals as i32);
        HourlySeries {
            start: self.start,
            values: self
                .values
                .iter()
                .map(|v| (v * scale).round() / scale)
                .collect(),
            unit: self.unit.clone(),
        }
    }

    /// Convert the series into another unit of the same dimension.
    pub fn to(&self, unit: &Unit) -> Result<HourlySeries, EngineError> {
        let factor = self.unit.conversion_factor(unit)?;
        Ok(HourlySeries {
            start: self.start,
            values: self.values.iter().map(|v| v * factor).collect(),
            unit: unit.clone(),
        })
    }
}

impl PartialEq for HourlySeries {
    /// Index-aligned value equality, converting units.
    fn eq(&self, other: &Self) -> bool {
        if self.start != other.start || self.values.len() != other.values.len() {
            return false;
        }
        let Ok(factor) = other.unit.conversion_factor(&self.unit) else {
            return false;
        };
        self.values
            .iter()
            .zip(&other.values)
            .all(|(a, b)| *a == b * factor)
    }
}

impl fmt::Display for HourlySeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} hourly values in {} from {}",
            self.values.len(),
            self.unit,
            self.start
        )
    }
}
