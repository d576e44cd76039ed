// FlagVet - Veto evaluation engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Physical units attached to metric output.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Unit of a metric value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    /// No unit
    #[default]
    Dimensionless,
    /// Percentage
    Percent,
    /// Seconds
    Seconds,
    /// Hertz
    Hertz,
    /// Any other unit, kept verbatim
    Other(String),
}

impl FromStr for Unit {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Ok(match trimmed.to_lowercase().as_str() {
            "" | "dimensionless" | "none" => Unit::Dimensionless,
            "%" | "percent" | "pct" => Unit::Percent,
            "s" | "sec" | "second" | "seconds" => Unit::Seconds,
            "hz" | "hertz" => Unit::Hertz,
            _ => Unit::Other(trimmed.to_string()),
        })
    }
}

impl From<&str> for Unit {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(unit) => unit,
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Dimensionless => Ok(()),
            Unit::Percent => f.write_str("%"),
            Unit::Seconds => f.write_str("s"),
            Unit::Hertz => f.write_str("Hz"),
            Unit::Other(symbol) => f.write_str(symbol),
        }
    }
}
