//! Planar bicycle model of a vehicle with front and rear steering and drive.
//!
//! Body-frame states `x, x_dot, y, y_dot, psi, psi_dot`, plus the fixed-frame
//! path `X, Y` and travelled distance `S`. Inputs are the longitudinal tyre
//! forces `a_f, a_r` [N] and steering angles `d_f, d_r` [rad]. Lateral tyre
//! forces are linear in slip angle.

use super::to_names;
use crate::equation_engine::Expr;
use crate::error::{Result, SimError};
use crate::model::{DynamicModel, Equations};
use serde::{Deserialize, Serialize};

pub const STATE_NAMES: [&str; 9] = ["x", "x_dot", "y", "y_dot", "psi", "psi_dot", "X", "Y", "S"];
pub const INPUT_NAMES: [&str; 4] = ["a_f", "a_r", "d_f", "d_r"];
pub const AUXILIARY_NAMES: [&str; 6] = ["beta_f", "beta_r", "beta", "alpha_f", "alpha_r", "v"];

/// Added to the forward speed inside the slip-angle arctangents.
pub const SLIP_EPSILON: f64 = 1e-8;

/// Lower bound on the forward speed used as a denominator by the linearized model.
pub const MIN_FORWARD_SPEED: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BicycleParameters {
    /// Mass [kg].
    pub m: f64,
    /// Front cornering stiffness [N/rad].
    pub c_f: f64,
    /// Rear cornering stiffness [N/rad].
    pub c_r: f64,
    /// Distance from the centre of mass to the front axle [m].
    pub l_f: f64,
    /// Distance from the centre of mass to the rear axle [m].
    pub l_r: f64,
    /// Yaw moment of inertia [kg m^2].
    #[serde(alias = "I_z")]
    pub i_z: f64,
}

/// Small electric test vehicle.
impl Default for BicycleParameters {
    fn default() -> Self {
        Self {
            m: 230.0,
            c_f: 2.25,
            c_r: 2.25,
            l_f: 0.69,
            l_r: 0.85,
            i_z: 1.0,
        }
    }
}

impl BicycleParameters {
    pub fn validate(&self) -> Result<()> {
        let named = [
            ("m", self.m),
            ("c_f", self.c_f),
            ("c_r", self.c_r),
            ("l_f", self.l_f),
            ("l_r", self.l_r),
            ("I_z", self.i_z),
        ];
        for (name, value) in named {
            if !value.is_finite() || value <= 0.0 {
                return Err(SimError::Configuration(format!(
                    "Parameter '{name}' must be finite and positive, got {value}."
                )));
            }
        }
        Ok(())
    }

    fn wheelbase(&self) -> f64 {
        self.l_f + self.l_r
    }
}

fn checked_initial_conditions(initial_conditions: Vec<f64>) -> Result<Vec<f64>> {
    if initial_conditions.len() > STATE_NAMES.len() {
        return Err(SimError::Configuration(format!(
            "{} initial conditions given for {} states.",
            initial_conditions.len(),
            STATE_NAMES.len()
        )));
    }
    Ok(initial_conditions)
}

/// Symbols unpacked from the state and input vectors.
struct Signals {
    f_long_f: Expr,
    f_long_r: Expr,
    delta_f: Expr,
    delta_r: Expr,
    x_dot: Expr,
    y_dot: Expr,
    psi: Expr,
    psi_dot: Expr,
}

impl Signals {
    fn unpack(states: &[Expr], inputs: &[Expr]) -> Self {
        Self {
            f_long_f: inputs[0].clone(),
            f_long_r: inputs[1].clone(),
            delta_f: inputs[2].clone(),
            delta_r: inputs[3].clone(),
            x_dot: states[1].clone(),
            y_dot: states[3].clone(),
            psi: states[4].clone(),
            psi_dot: states[5].clone(),
        }
    }
}

/// Nonlinear bicycle model.
#[derive(Debug, Clone)]
pub struct BicycleModel {
    params: BicycleParameters,
    states: Vec<String>,
    inputs: Vec<String>,
    auxiliaries: Vec<String>,
    initial_conditions: Vec<f64>,
}

impl BicycleModel {
    pub fn new(params: BicycleParameters) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            states: to_names(&STATE_NAMES),
            inputs: to_names(&INPUT_NAMES),
            auxiliaries: to_names(&AUXILIARY_NAMES),
            initial_conditions: Vec::new(),
        })
    }

    pub fn with_initial_conditions(mut self, initial_conditions: Vec<f64>) -> Result<Self> {
        self.initial_conditions = checked_initial_conditions(initial_conditions)?;
        Ok(self)
    }

    pub fn parameters(&self) -> &BicycleParameters {
        &self.params
    }
}

impl DynamicModel for BicycleModel {
    fn state_names(&self) -> &[String] {
        &self.states
    }

    fn input_names(&self) -> &[String] {
        &self.inputs
    }

    fn auxiliary_names(&self) -> &[String] {
        &self.auxiliaries
    }

    fn initial_conditions(&self) -> &[f64] {
        &self.initial_conditions
    }

    fn equations_of_motion(
        &self,
        states: &[Expr],
        inputs: &[Expr],
        _time: Option<&Expr>,
    ) -> Equations {
        let p = &self.params;
        let Signals {
            f_long_f,
            f_long_r,
            delta_f,
            delta_r,
            x_dot,
            y_dot,
            psi,
            psi_dot,
        } = Signals::unpack(states, inputs);

        let v = (x_dot.clone().powf(2.0) + y_dot.clone().powf(2.0)).sqrt();

        let beta_f = (y_dot.clone() + p.l_f * psi_dot.clone()).atan2(x_dot.clone() + SLIP_EPSILON);
        let beta_r = (y_dot.clone() - p.l_r * psi_dot.clone()).atan2(x_dot.clone() + SLIP_EPSILON);
        let beta =
            (p.l_r * beta_f.clone().tan() + p.l_f * beta_r.clone().tan()).atan2(p.wheelbase());

        let alpha_f = delta_f.clone() - beta_f.clone();
        let alpha_r = delta_r.clone() - beta_r.clone();

        let f_lat_f = 2.0 * p.c_f * alpha_f.clone();
        let f_lat_r = 2.0 * p.c_r * alpha_r.clone();

        let f_long_x_f = f_long_f.clone() * delta_f.clone().cos();
        let f_long_y_f = f_long_f * delta_f.clone().sin();
        let f_lat_x_f = -(f_lat_f.clone() * delta_f.clone().sin());
        let f_lat_y_f = f_lat_f * delta_f.cos();

        let f_long_x_r = f_long_r.clone() * delta_r.clone().cos();
        let f_long_y_r = f_long_r * delta_r.clone().sin();
        let f_lat_x_r = -(f_lat_r.clone() * delta_r.clone().sin());
        let f_lat_y_r = f_lat_r * delta_r.cos();

        let x_rate = v.clone() * beta.clone().cos();
        let x_dot_rate = (f_long_x_f + f_lat_x_f + f_long_x_r - f_lat_x_r) / p.m
            + psi_dot.clone() * y_dot.clone();
        let y_rate = v.clone() * beta.clone().sin();
        let y_dot_rate = (f_long_y_f.clone()
            + f_lat_y_f.clone()
            + f_long_y_r.clone()
            + f_lat_y_r.clone())
            / p.m
            - psi_dot * x_dot;
        let psi_rate = v.clone()
            * beta.clone().cos()
            * (beta_f.clone().tan() - beta_r.clone().tan())
            / p.wheelbase();
        let psi_dot_rate =
            ((f_long_y_f + f_lat_y_f) * p.l_f - (f_long_y_r + f_lat_y_r) * p.l_r) / p.i_z;

        let heading = psi + beta.clone();
        let x_fixed_rate = v.clone() * heading.clone().cos();
        let y_fixed_rate = v.clone() * heading.sin();
        let s_rate = v.clone();

        Equations::new(
            vec![
                x_rate,
                x_dot_rate,
                y_rate,
                y_dot_rate,
                psi_rate,
                psi_dot_rate,
                x_fixed_rate,
                y_fixed_rate,
                s_rate,
            ],
            vec![beta_f, beta_r, beta, alpha_f, alpha_r, v],
        )
    }
}

/// Bicycle model linearized for small slip and steering angles.
///
/// `sin(d) ~ d`, `cos(d) ~ 1`, `tan(b) ~ b`, `v ~ x_dot`, and the lateral
/// kinematic coupling terms are dropped. The forward speed in slip-angle
/// denominators is clamped to `MIN_FORWARD_SPEED`.
#[derive(Debug, Clone)]
pub struct LinearizedBicycleModel {
    params: BicycleParameters,
    states: Vec<String>,
    inputs: Vec<String>,
    auxiliaries: Vec<String>,
    initial_conditions: Vec<f64>,
}

impl LinearizedBicycleModel {
    pub fn new(params: BicycleParameters) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            states: to_names(&STATE_NAMES),
            inputs: to_names(&INPUT_NAMES),
            auxiliaries: to_names(&AUXILIARY_NAMES),
            initial_conditions: Vec::new(),
        })
    }

    pub fn with_initial_conditions(mut self, initial_conditions: Vec<f64>) -> Result<Self> {
        self.initial_conditions = checked_initial_conditions(initial_conditions)?;
        Ok(self)
    }

    pub fn parameters(&self) -> &BicycleParameters {
        &self.params
    }
}

impl DynamicModel for LinearizedBicycleModel {
    fn state_names(&self) -> &[String] {
        &self.states
    }

    fn input_names(&self) -> &[String] {
        &self.inputs
    }

    fn auxiliary_names(&self) -> &[String] {
        &self.auxiliaries
    }

    fn initial_conditions(&self) -> &[f64] {
        &self.initial_conditions
    }

    fn equations_of_motion(
        &self,
        states: &[Expr],
        inputs: &[Expr],
        _time: Option<&Expr>,
    ) -> Equations {
        let p = &self.params;
        let Signals {
            f_long_f,
            f_long_r,
            delta_f,
            delta_r,
            x_dot,
            y_dot,
            psi,
            psi_dot,
        } = Signals::unpack(states, inputs);

        let v = x_dot.clone();

        let denominator = x_dot.clone().max(MIN_FORWARD_SPEED);
        let beta_f = (y_dot.clone() + p.l_f * psi_dot.clone()) / denominator.clone();
        let beta_r = (y_dot - p.l_r * psi_dot) / denominator;
        let beta = (beta_f.clone() * p.l_r + beta_r.clone() * p.l_f) / p.wheelbase();

        let alpha_f = delta_f.clone() - beta_f.clone();
        let alpha_r = delta_r.clone() - beta_r.clone();

        let f_lat_f = 2.0 * p.c_f * alpha_f.clone();
        let f_lat_r = 2.0 * p.c_r * alpha_r.clone();

        let f_long_x_f = f_long_f.clone();
        let f_long_y_f = f_long_f * delta_f.clone();
        let f_lat_x_f = -(f_lat_f.clone() * delta_f);
        let f_lat_y_f = f_lat_f;

        let f_long_x_r = f_long_r.clone();
        let f_long_y_r = f_long_r * delta_r.clone();
        let f_lat_x_r = -(f_lat_r.clone() * delta_r);
        let f_lat_y_r = f_lat_r;

        let x_rate = x_dot;
        let x_dot_rate = (f_long_x_f + f_lat_x_f + f_long_x_r - f_lat_x_r) / p.m;
        let y_rate = Expr::num(0.0);
        let y_dot_rate =
            (f_long_y_f.clone() + f_lat_y_f.clone() + f_long_y_r.clone() + f_lat_y_r.clone()) / p.m;
        let psi_rate = v.clone() * (beta_f.clone() - beta_r.clone()) / p.wheelbase();
        let psi_dot_rate =
            ((f_long_y_f + f_lat_y_f) * p.l_f - (f_long_y_r + f_lat_y_r) * p.l_r) / p.i_z;

        let heading = psi + beta.clone();
        let x_fixed_rate = v.clone() * heading.clone().cos();
        let y_fixed_rate = v.clone() * heading.sin();
        let s_rate = v.clone();

        Equations::new(
            vec![
                x_rate,
                x_dot_rate,
                y_rate,
                y_dot_rate,
                psi_rate,
                psi_dot_rate,
                x_fixed_rate,
                y_fixed_rate,
                s_rate,
            ],
            vec![beta_f, beta_r, beta, alpha_f, alpha_r, v],
        )
    }
}
