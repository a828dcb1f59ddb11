mod luhn;
mod points;

pub mod op;

pub use luhn::luhn_valid;
pub use points::{Points, PointsConversionError};
