use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars in our simulations.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A vector field driven by an external control input.
///
/// Besides the state derivative, a system may report auxiliary quantities
/// (derived angles, speeds, ...) that are logged but never integrated.
pub trait ControlledSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Returns the number of control inputs.
    fn input_dimension(&self) -> usize;

    /// Returns the number of auxiliary quantities written by `observe`.
    fn auxiliary_dimension(&self) -> usize {
        0
    }

    /// Evaluates the vector field.
    /// t: current time (ignored by time-invariant systems)
    /// x: current state
    /// u: control input
    /// out: buffer to write dx/dt
    fn apply(&self, t: T, x: &[T], u: &[T], out: &mut [T]);

    /// Evaluates the auxiliary quantities at the same arguments as `apply`.
    fn observe(&self, _t: T, _x: &[T], _u: &[T], _aux: &mut [T]) {}
}

/// A trait for fixed-step solvers that advance a controlled system.
pub trait ControlledStepper<T: Scalar> {
    /// Performs one step of size dt starting at time t.
    /// state: current state (updated after step)
    /// control: input held constant over the step
    /// aux: buffer receiving the auxiliaries sampled at the start of the step
    fn step(
        &mut self,
        system: &impl ControlledSystem<T>,
        t: T,
        state: &mut [T],
        control: &[T],
        aux: &mut [T],
        dt: T,
    );
}
