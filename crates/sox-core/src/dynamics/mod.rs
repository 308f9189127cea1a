//! Battery dynamics models
//!
//! - OCV curve provider (smoothed OCV and its SOC derivative)
//! - Dynamics model interface used by the filters
//! - Isothermal Thevenin equivalent circuit

pub mod model;
pub mod ocv;
pub mod thevenin;

pub use model::*;
pub use ocv::*;
pub use thevenin::*;
