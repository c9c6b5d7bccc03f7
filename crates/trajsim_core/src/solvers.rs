use crate::traits::{ControlledStepper, ControlledSystem, Scalar};

/// Classic Runge-Kutta 4th Order Solver with a zero-order-hold control input.
///
/// The control is evaluated once per step by the caller and frozen across all
/// four stages; the controller is not re-sampled at the stage midpoints. This
/// is a known approximation that trades sub-step control fidelity for
/// simplicity, and trajectories depend on it.
///
/// Auxiliaries are the values at the start of the step (stage 1); they are
/// snapshots, not integrated quantities.
pub struct RK4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> RK4<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            k1: vec![T::zero(); dim],
            k2: vec![T::zero(); dim],
            k3: vec![T::zero(); dim],
            k4: vec![T::zero(); dim],
            tmp: vec![T::zero(); dim],
        }
    }
}

impl<T: Scalar> ControlledStepper<T> for RK4<T> {
    fn step(
        &mut self,
        system: &impl ControlledSystem<T>,
        t: T,
        state: &mut [T],
        control: &[T],
        aux: &mut [T],
        dt: T,
    ) {
        let half = T::from_f64(0.5).unwrap();
        let sixth = T::from_f64(1.0 / 6.0).unwrap();
        let two = T::from_f64(2.0).unwrap();

        system.observe(t, state, control, aux);

        // k1 = f(t, y, u)
        system.apply(t, state, control, &mut self.k1);

        // k2 = f(t + dt/2, y + dt*k1/2, u)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + self.k1[i] * dt * half;
        }
        system.apply(t + dt * half, &self.tmp, control, &mut self.k2);

        // k3 = f(t + dt/2, y + dt*k2/2, u)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + self.k2[i] * dt * half;
        }
        system.apply(t + dt * half, &self.tmp, control, &mut self.k3);

        // k4 = f(t + dt, y + dt*k3, u)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + self.k3[i] * dt;
        }
        system.apply(t + dt, &self.tmp, control, &mut self.k4);

        // y_next = y + dt/6 * (k1 + 2k2 + 2k3 + k4)
        for i in 0..state.len() {
            state[i] = state[i]
                + dt * sixth * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }
    }
}

/// One RK4 step returning `(x_next, aux)` by value.
pub fn rk4_step<T: Scalar>(
    system: &impl ControlledSystem<T>,
    dt: T,
    x: &[T],
    u: &[T],
    t: T,
) -> (Vec<T>, Vec<T>) {
    let mut stepper = RK4::new(x.len());
    let mut next = x.to_vec();
    let mut aux = vec![T::zero(); system.auxiliary_dimension()];
    stepper.step(system, t, &mut next, u, &mut aux, dt);
    (next, aux)
}
