//! Numerical helpers
//!
//! Savitzky-Golay smoothing, linear interpolation, and validated
//! vector/matrix constructors used by the models and filters.

pub mod interp;
pub mod savgol;
pub mod shape;

pub use interp::*;
pub use savgol::*;
pub use shape::*;
