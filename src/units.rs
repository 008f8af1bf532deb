//! Units and dimensioned quantities.
//!
//! Every numeric value in the engine carries a [`Unit`]. Units compose under
//! multiplication and division, addition requires matching dimensions, and
//! conversion between units of different dimensions fails with
//! [`EngineError::Dimensionality`]. The dimension space is the small set the
//! footprint domain needs: mass (of CO2-equivalent), time, energy, and data.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Integer exponents over the four base dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Dimension {
    /// Mass exponent (base unit: gram).
    pub mass: i8,
    /// Time exponent (base unit: hour).
    pub time: i8,
    /// Energy exponent (base unit: watt-hour).
    pub energy: i8,
    /// Data exponent (base unit: byte).
    pub data: i8,
}

impl Dimension {
    /// The dimensionless dimension.
    pub const NONE: Dimension = Dimension {
        mass: 0,
        time: 0,
        energy: 0,
        data: 0,
    };

    fn combine(self, other: Dimension, sign: i8) -> Dimension {
        Dimension {
            mass: self.mass + sign * other.mass,
            time: self.time + sign * other.time,
            energy: self.energy + sign * other.energy,
            data: self.data + sign * other.data,
        }
    }

    /// Returns true if all exponents are zero.
    pub fn is_none(&self) -> bool {
        *self == Dimension::NONE
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return write!(f, "dimensionless");
        }
        let mut parts = Vec::new();
        for (name, exp) in [
            ("mass", self.mass),
            ("time", self.time),
            ("energy", self.energy),
            ("data", self.data),
        ] {
            match exp {
                0 => {}
                1 => parts.push(name.to_string()),
                n => parts.push(format!("{name}^{n}")),
            }
        }
        write!(f, "{}", parts.join("*"))
    }
}

/// A unit of measure: a dimension plus a conversion factor to the base unit
/// of that dimension, and a display symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    dim: Dimension,
    /// Multiplier converting one of this unit into base units.
    factor: f64,
    symbol: String,
}

impl Unit {
    /// Build a unit from raw parts.
    pub fn new(dim: Dimension, factor: f64, symbol: impl Into<String>) -> Self {
        Unit {
            dim,
            factor,
            symbol: symbol.into(),
        }
    }

    /// The unit's dimension.
    pub fn dimension(&self) -> Dimension {
        self.dim
    }

    /// The unit's display symbol.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Returns true if this unit is dimensionless.
    pub fn is_dimensionless(&self) -> bool {
        self.dim.is_none()
    }

    /// Returns true if `other` measures the same dimension.
    pub fn compatible_with(&self, other: &Unit) -> bool {
        self.dim == other.dim
    }

    /// Factor converting one of `self` into `other`.
    ///
    /// Fails if the dimensions differ.
    pub fn conversion_factor(&self, other: &Unit) -> Result<f64, EngineError> {
        if !self.compatible_with(other) {
            return Err(EngineError::Dimensionality {
                left: self.symbol.clone(),
                right: other.symbol.clone(),
            });
        }
        Ok(self.factor / other.factor)
    }

    /// The product of two units.
    pub fn multiply(&self, other: &Unit) -> Unit {
        Unit {
            dim: self.dim.combine(other.dim, 1),
            factor: self.factor * other.factor,
            symbol: compose_symbol(&self.symbol, &other.symbol, '*'),
        }
    }

    /// The quotient of two units.
    pub fn divide(&self, other: &Unit) -> Unit {
        Unit {
            dim: self.dim.combine(other.dim, -1),
            factor: self.factor / other.factor,
            symbol: compose_symbol(&self.symbol, &other.symbol, '/'),
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

fn compose_symbol(left: &str, right: &str, op: char) -> String {
    match (left.is_empty(), right.is_empty()) {
        (true, true) => String::new(),
        (false, true) => left.to_string(),
        (true, false) if op == '*' => right.to_string(),
        (true, false) => format!("1/{right}"),
        (false, false) => format!("{left}{op}{right}"),
    }
}

// Predefined units. Base units are gram, hour, watt-hour, byte.

/// Dimensionless.
pub fn dimensionless() -> Unit {
    Unit::new(Dimension::NONE, 1.0, "")
}

/// Gram (mass base unit, used for CO2-equivalent).
pub fn gram() -> Unit {
    Unit::new(
        Dimension {
            mass: 1,
            ..Dimension::NONE
        },
        1.0,
        "g",
    )
}

/// Kilogram.
pub fn kilogram() -> Unit {
    Unit::new(
        Dimension {
            mass: 1,
            ..Dimension::NONE
        },
        1_000.0,
        "kg",
    )
}

/// Metric tonne.
pub fn tonne() -> Unit {
    Unit::new(
        Dimension {
            mass: 1,
            ..Dimension::NONE
        },
        1_000_000.0,
        "t",
    )
}

/// Hour (time base unit).
pub fn hour() -> Unit {
    Unit::new(
        Dimension {
            time: 1,
            ..Dimension::NONE
        },
        1.0,
        "h",
    )
}

/// Day.
pub fn day() -> Unit {
    Unit::new(
        Dimension {
            time: 1,
            ..Dimension::NONE
        },
        24.0,
        "day",
    )
}

/// Year (365 days).
pub fn year() -> Unit {
    Unit::new(
        Dimension {
            time: 1,
            ..Dimension::NONE
        },
        24.0 * 365.0,
        "yr",
    )
}

/// Watt-hour (energy base unit).
pub fn watt_hour() -> Unit {
    Unit::new(
        Dimension {
            energy: 1,
            ..Dimension::NONE
        },
        1.0,
        "Wh",
    )
}

/// Kilowatt-hour.
pub fn kilowatt_hour() -> Unit {
    Unit::new(
        Dimension {
            energy: 1,
            ..Dimension::NONE
        },
        1_000.0,
        "kWh",
    )
}

/// Watt (energy per time).
pub fn watt() -> Unit {
    Unit::new(
        Dimension {
            energy: 1,
            time: -1,
            ..Dimension::NONE
        },
        1.0,
        "W",
    )
}

/// Kilowatt.
pub fn kilowatt() -> Unit {
    Unit::new(
        Dimension {
            energy: 1,
            time: -1,
            ..Dimension::NONE
        },
        1_000.0,
        "kW",
    )
}

/// Byte (data base unit).
pub fn byte() -> Unit {
    Unit::new(
        Dimension {
            data: 1,
            ..Dimension::NONE
        },
        1.0,
        "B",
    )
}

/// Gigabyte.
pub fn gigabyte() -> Unit {
    Unit::new(
        Dimension {
            data: 1,
            ..Dimension::NONE
        },
        1e9,
        "GB",
    )
}

/// Terabyte.
pub fn terabyte() -> Unit {
    Unit::new(
        Dimension {
            data: 1,
            ..Dimension::NONE
        },
        1e12,
        "TB",
    )
}

/// Grams of CO2-equivalent per kilowatt-hour (carbon intensity).
pub fn gram_per_kwh() -> Unit {
    gram().divide(&kilowatt_hour())
}

/// A scalar magnitude tagged with a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quantity {
    /// The numeric magnitude, in `unit`.
    pub magnitude: f64,
    /// The unit of `magnitude`.
    pub unit: Unit,
}

impl Quantity {
    /// Build a quantity.
    pub fn new(magnitude: f64, unit: Unit) -> Self {
        Quantity { magnitude, unit }
    }

    /// A dimensionless quantity.
    pub fn dimensionless(magnitude: f64) -> Self {
        Quantity::new(magnitude, dimensionless())
    }

    /// Convert to another unit of the same dimension.
    pub fn to(&self, unit: &Unit) -> Result<Quantity, EngineError> {
        let factor = self.unit.conversion_factor(unit)?;
        Ok(Quantity::new(self.magnitude * factor, unit.clone()))
    }

    /// Add, converting `other` into this quantity's unit first.
    pub fn checked_add(&self, other: &Quantity) -> Result<Quantity, EngineError> {
        let other = other.to(&self.unit)?;
        Ok(Quantity::new(self.magnitude + other.magnitude, self.unit.clone()))
    }

    /// Subtract, converting `other` into this quantity's unit first.
    pub fn checked_sub(&self, other: &Quantity) -> Result<Quantity, EngineError> {
        let other = other.to(&self.unit)?;
        Ok(Quantity::new(self.magnitude - other.magnitude, self.unit.clone()))
    }

    /// Multiply, composing units.
    pub fn multiply(&self, other: &Quantity) -> Quantity {
        Quantity::new(
            self.magnitude * other.magnitude,
            self.unit.multiply(&other.unit),
        )
    }

    /// Divide, composing units.
    pub fn divide(&self, other: &Quantity) -> Quantity {
        Quantity::new(
            self.magnitude / other.magnitude,
            self.unit.divide(&other.unit),
        )
    }

    /// Round the magnitude to `decimals` decimal places.
    pub fn round(&self, decimals: u32) -> Quantity {
        let scale = 10f64.powi(decimals as i32);
        Quantity::new((self.magnitude * scale).round() / scale, self.unit.clone())
    }

    /// The magnitude expressed in the dimension's base unit.
    pub fn base_magnitude(&self) -> f64 {
        self.magnitude * self.unit.factor
    }
}

impl PartialEq for Quantity {
    /// Equality by converted value: `1 kg == 1000 g`.
    fn eq(&self, other: &Self) -> bool {
        self.unit.compatible_with(&other.unit) && self.base_magnitude() == other.base_magnitude()
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit.symbol().is_empty() {
            write!(f, "{}", self.magnitude)
        } else {
            write!(f, "{} {}", self.magnitude, self.unit)
        }
    }
}
