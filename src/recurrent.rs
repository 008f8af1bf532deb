//! Weekly recurrence templates.
//!
//! A [`RecurrentQuantity`] is a compact 168-hour cyclic pattern (one value per
//! hour of the week) expanded on demand into a full hourly series over an
//! arbitrary horizon, anchored so that template index 0 is Monday 00:00 in the
//! pattern's local timezone.

use chrono::{Datelike, Duration, FixedOffset, Timelike};
use serde::{Deserialize, Serialize};

use crate::series::HourlySeries;
use crate::units::Unit;
use crate::EngineError;

/// Hours in one week.
pub const HOURS_PER_WEEK: usize = 24 * 7;

/// A one-week cyclic hourly template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrentQuantity {
    values: Vec<f64>,
    unit: Unit,
}

impl RecurrentQuantity {
    /// Build a weekly template from exactly 168 non-negative finite values.
    pub fn new(values: Vec<f64>, unit: Unit) -> Result<Self, EngineError> {
        if values.len() != HOURS_PER_WEEK {
            return Err(EngineError::InvalidRecurrence {
                reason: format!("expected {HOURS_PER_WEEK} values, got {}", values.len()),
            });
        }
        if let Some(v) = values.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(EngineError::InvalidRecurrence {
                reason: format!("value {v} is negative or not finite"),
            });
        }
        Ok(RecurrentQuantity { values, unit })
    }

    /// The 168 hourly values, Monday 00:00 local time first.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// The template's unit.
    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    /// Tile the template across the span of `nb_instances` and multiply
    /// element-wise.
    ///
    /// `nb_instances` is an hourly series in UTC (for example, the number of
    /// live devices per hour). The template is aligned so index 0 lands on
    /// Monday 00:00 in the `timezone` local calendar; the result is in UTC
    /// with the unit `template_unit * nb_instances_unit`. Partial weeks at
    /// either end fall out of the modular indexing.
    pub fn generate_hourly_quantities_over_timespan(
        &self,
        nb_instances: &HourlySeries,
        timezone: FixedOffset,
    ) -> Result<HourlySeries, EngineError> {
        let local_start =
            nb_instances.start() + Duration::seconds(timezone.local_minus_utc() as i64);
        let first_index = local_start.weekday().num_days_from_monday() as usize * 24
            + local_start.hour() as usize;

        let values: Vec<f64> = nb_instances
            .values()
            .iter()
            .enumerate()
            .map(|(i, n)| self.values[(first_index + i) % HOURS_PER_WEEK] * n)
            .collect();

        HourlySeries::new(
            nb_instances.start(),
            values,
            self.unit.multiply(nb_instances.unit()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{dimensionless, hour};
    use chrono::{NaiveDate, NaiveDateTime};

    fn template() -> RecurrentQuantity {
        // One unit of usage during the first hour of every day, none elsewhere.
        let mut values = vec![0.0; HOURS_PER_WEEK];
        for d in 0..7 {
            values[d * 24] = 1.0;
        }
        RecurrentQuantity::new(values, hour()).unwrap()
    }

    fn utc_midnight_monday() -> NaiveDateTime {
        // 2025-01-06 is a Monday.
        NaiveDate::from_ymd_opt(2025, 1, 6)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(
            RecurrentQuantity::new(vec![0.0; 10], hour()),
            Err(EngineError::InvalidRecurrence { .. })
        ));
    }

    #[test]
    fn rejects_negative_values() {
        let mut values = vec![0.0; HOURS_PER_WEEK];
        values[3] = -1.0;
        assert!(RecurrentQuantity::new(values, hour()).is_err());
    }

    #[test]
    fn utc_expansion_aligns_monday_midnight() {
        let nb = HourlySeries::new(utc_midnight_monday(), vec![2.0; 48], dimensionless()).unwrap();
        let out = template()
            .generate_hourly_quantities_over_timespan(&nb, FixedOffset::east_opt(0).unwrap())
            .unwrap();
        assert_eq!(out.len(), 48);
        assert_eq!(out.values()[0], 2.0); // Monday 00:00 local
        assert_eq!(out.values()[1], 0.0);
        assert_eq!(out.values()[24], 2.0); // Tuesday 00:00 local
    }

    #[test]
    fn timezone_shifts_alignment() {
        // UTC+2: Monday 00:00 UTC is Monday 02:00 local, so the local-midnight
        // peak happened two UTC hours earlier; the next peak lands at UTC 22:00.
        let nb = HourlySeries::new(utc_midnight_monday(), vec![1.0; 24], dimensionless()).unwrap();
        let out = template()
            .generate_hourly_quantities_over_timespan(&nb, FixedOffset::east_opt(7200).unwrap())
            .unwrap();
        assert_eq!(out.values()[0], 0.0);
        assert_eq!(out.values()[22], 1.0);
    }

    #[test]
    fn partial_week_remainders_wrap() {
        // Start mid-week (Thursday 12:00) and span past the following Monday.
        let start = NaiveDate::from_ymd_opt(2025, 1, 9)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let nb = HourlySeries::new(start, vec![1.0; 120], dimensionless()).unwrap();
        let out = template()
            .generate_hourly_quantities_over_timespan(&nb, FixedOffset::east_opt(0).unwrap())
            .unwrap();
        // Next daily peak is Friday 00:00, 12 hours after the start.
        assert_eq!(out.values()[12], 1.0);
        // Monday 00:00 falls 3.5 days after the start.
        assert_eq!(out.values()[12 + 3 * 24], 1.0);
    }

    #[test]
    fn unit_composition() {
        let nb = HourlySeries::new(utc_midnight_monday(), vec![1.0; 24], dimensionless()).unwrap();
        let out = template()
            .generate_hourly_quantities_over_timespan(&nb, FixedOffset::east_opt(0).unwrap())
            .unwrap();
        assert!(out.unit().compatible_with(&hour()));
    }
}
