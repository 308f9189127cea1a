//! State estimation algorithms
//!
//! - EKF with exact linear prediction and Joseph-form update
//! - Merwe scaled sigma points and the unscented transform
//! - UKF
//! - Coulomb counting baseline

pub mod coulomb;
pub mod ekf;
pub mod sigma_points;
pub mod ukf;
pub mod unscented;

pub use coulomb::*;
pub use ekf::*;
pub use sigma_points::*;
pub use ukf::*;
pub use unscented::*;
