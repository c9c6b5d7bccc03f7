use super::bicycle::INPUT_NAMES;
use super::to_names;
use crate::equation_engine::Expr;
use crate::model::{Controller, TIME_SYMBOL};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Shape of the open-loop test manoeuvre.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenLoopProfile {
    /// Peak scale of the rear drive force pulse [N].
    pub rear_force_gain: f64,
    /// Front steering amplitude [deg].
    pub steering_amplitude_deg: f64,
    /// Steering angular frequency [rad/s].
    pub steering_frequency: f64,
}

impl Default for OpenLoopProfile {
    fn default() -> Self {
        Self {
            rear_force_gain: 20000.0,
            steering_amplitude_deg: 40.0,
            steering_frequency: 4.0,
        }
    }
}

/// Time-scheduled inputs for the bicycle models, independent of state.
///
/// ```text
/// a_f = 0
/// a_r = G (1 - cos t) e^-t
/// d_f = A sin(w t / 2) (1 - cos(w t)) / 2 * pi / 180
/// d_r = 0
/// ```
#[derive(Debug, Clone)]
pub struct OpenLoopController {
    profile: OpenLoopProfile,
    outputs: Vec<String>,
}

impl OpenLoopController {
    pub fn new(profile: OpenLoopProfile) -> Self {
        Self {
            profile,
            outputs: to_names(&INPUT_NAMES),
        }
    }

    pub fn profile(&self) -> &OpenLoopProfile {
        &self.profile
    }
}

impl Default for OpenLoopController {
    fn default() -> Self {
        Self::new(OpenLoopProfile::default())
    }
}

impl Controller for OpenLoopController {
    fn output_names(&self) -> &[String] {
        &self.outputs
    }

    fn time_variant(&self) -> bool {
        true
    }

    fn control_law(&self, _states: &[Expr], time: Option<&Expr>) -> Vec<Expr> {
        let t = time.cloned().unwrap_or_else(|| Expr::var(TIME_SYMBOL));
        let w = self.profile.steering_frequency;

        let rear_force =
            self.profile.rear_force_gain * (1.0 - t.clone().cos()) * (-t.clone()).exp();
        let steering = self.profile.steering_amplitude_deg
            * (t.clone() * (w / 2.0)).sin()
            * (1.0 - (t * w).cos())
            / 2.0
            * (PI / 180.0);

        vec![Expr::num(0.0), rear_force, steering, Expr::num(0.0)]
    }
}
