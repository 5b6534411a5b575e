//! Provides input/output functionality for correspondence data.
//!
//! Point sets are exchanged as plain text, one `x y z` triple per line, through
//! the [`traits::PointSetFile`] interface. Compactness curves are exported as CSV.

pub mod points;
pub mod scree;
pub mod traits;
