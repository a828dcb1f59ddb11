use std::{fmt::Display, iter::Sum, ops::Add, str::FromStr};

use serde::{de::Error as DeError, Deserialize, Deserializer, Serialize, Serializer};
use sqlx::Type;
use thiserror::Error;

use crate::op;

//--------------------------------------      Points       -----------------------------------------------------------
/// A quantity of loyalty points, stored as hundredths of a point.
///
/// The accrual oracle and the user-facing APIs speak fractional numbers (`729.98`), but the ledger only ever stores
/// and adds integers, so that balance arithmetic is exact.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd)]
#[sqlx(transparent)]
pub struct Points(i64);

op!(binary Points, Add, add);
op!(binary Points, Sub, sub);
op!(inplace Points, SubAssign, sub_assign);
op!(unary Points, Neg, neg);

impl Sum for Points {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in points: {0}")]
pub struct PointsConversionError(String);

impl From<i64> for Points {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Points {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Points {}

impl TryFrom<f64> for Points {
    type Error = PointsConversionError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        let hundredths = (value * 100.0).round();
        if !hundredths.is_finite() || hundredths.abs() >= i64::MAX as f64 {
            return Err(PointsConversionError(format!("{value} is out of range")));
        }
        #[allow(clippy::cast_possible_truncation)]
        Ok(Self(hundredths as i64))
    }
}

impl Display for Points {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.as_f64())
    }
}

impl FromStr for Points {
    type Err = PointsConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().parse::<f64>().map_err(|e| PointsConversionError(format!("{s}: {e}")))?;
        Self::try_from(value)
    }
}

impl Serialize for Points {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Points {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Points::try_from(value).map_err(D::Error::custom)
    }
}

impl Points {
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Whole points, e.g. `Points::from_points(500)` is 500.00 points.
    pub fn from_points(points: i64) -> Self {
        Self(points * 100)
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic_is_exact() {
        let a = Points::try_from(729.98).unwrap();
        let b = Points::try_from(0.02).unwrap();
        assert_eq!(a + b, Points::from_points(730));
        assert_eq!(Points::from_points(730) - a, b);
        assert_eq!((-b).value(), -2);
    }

    #[test]
    fn serde_round_trip_as_number() {
        let p: Points = serde_json::from_str("500").unwrap();
        assert_eq!(p, Points::from_points(500));
        let p: Points = serde_json::from_str("729.98").unwrap();
        assert_eq!(p.value(), 72998);
        assert_eq!(serde_json::to_string(&p).unwrap(), "729.98");
    }

    #[test]
    fn sum_of_points() {
        let total: Points = [100, 250, 7].iter().map(|v| Points::from(*v)).sum();
        assert_eq!(total.value(), 357);
    }
}
