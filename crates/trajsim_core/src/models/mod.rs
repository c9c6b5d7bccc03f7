//! Reference implementations of the `DynamicModel` and `Controller` contracts.
//!
//! - `bicycle`: planar bicycle vehicle model and its small-angle linearization.
//! - `open_loop`: time-varying steering and drive-force profiles.
//! - `equation`: models and controllers defined by equation strings at runtime.

pub mod bicycle;
pub mod equation;
pub mod open_loop;

pub use bicycle::{BicycleModel, BicycleParameters, LinearizedBicycleModel};
pub use equation::{
    EquationController, EquationControllerConfig, EquationModel, EquationModelConfig,
};
pub use open_loop::{OpenLoopController, OpenLoopProfile};

pub(crate) fn to_names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
