//! Models and controllers described by equation strings.
//!
//! Text is parsed once at construction; `compile` resolves names and emits
//! bytecode as for any other `DynamicModel` or `Controller`.

use crate::equation_engine::{parse, Expr};
use crate::error::{Result, SimError};
use crate::model::{Controller, DynamicModel, Equations};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EquationModelConfig {
    pub states: Vec<String>,
    pub inputs: Vec<String>,
    /// One right-hand side per state, in state order.
    pub equations: Vec<String>,
    pub auxiliary_names: Vec<String>,
    pub auxiliary_equations: Vec<String>,
    pub parameter_names: Vec<String>,
    pub parameter_values: Vec<f64>,
    pub initial_conditions: Vec<f64>,
    pub time_variant: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EquationControllerConfig {
    pub outputs: Vec<String>,
    pub control_law: Vec<String>,
    pub parameter_names: Vec<String>,
    pub parameter_values: Vec<f64>,
    pub time_variant: bool,
}

fn parse_all(kind: &str, labels: &[String], sources: &[String]) -> Result<Vec<Expr>> {
    if labels.len() != sources.len() {
        return Err(SimError::dimension(kind, labels.len(), sources.len()));
    }
    labels
        .iter()
        .zip(sources)
        .map(|(label, source)| {
            parse(source)
                .map_err(|msg| SimError::Compilation(format!("{kind} for '{label}': {msg}")))
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct EquationModel {
    config: EquationModelConfig,
    derivatives: Vec<Expr>,
    auxiliaries: Vec<Expr>,
}

impl EquationModel {
    pub fn new(config: EquationModelConfig) -> Result<Self> {
        if config.initial_conditions.len() > config.states.len() {
            return Err(SimError::Configuration(format!(
                "{} initial conditions given for {} states.",
                config.initial_conditions.len(),
                config.states.len()
            )));
        }
        let derivatives = parse_all("equation", &config.states, &config.equations)?;
        let auxiliaries = parse_all(
            "auxiliary equation",
            &config.auxiliary_names,
            &config.auxiliary_equations,
        )?;
        Ok(Self {
            config,
            derivatives,
            auxiliaries,
        })
    }

    pub fn config(&self) -> &EquationModelConfig {
        &self.config
    }
}

impl DynamicModel for EquationModel {
    fn state_names(&self) -> &[String] {
        &self.config.states
    }

    fn input_names(&self) -> &[String] {
        &self.config.inputs
    }

    fn auxiliary_names(&self) -> &[String] {
        &self.config.auxiliary_names
    }

    fn time_variant(&self) -> bool {
        self.config.time_variant
    }

    fn initial_conditions(&self) -> &[f64] {
        &self.config.initial_conditions
    }

    fn parameter_names(&self) -> &[String] {
        &self.config.parameter_names
    }

    fn parameter_values(&self) -> &[f64] {
        &self.config.parameter_values
    }

    // The parsed trees already refer to the declared names, so the symbols
    // handed in here are not substituted.
    fn equations_of_motion(
        &self,
        _states: &[Expr],
        _inputs: &[Expr],
        _time: Option<&Expr>,
    ) -> Equations {
        Equations::new(self.derivatives.clone(), self.auxiliaries.clone())
    }
}

#[derive(Debug, Clone)]
pub struct EquationController {
    config: EquationControllerConfig,
    law: Vec<Expr>,
}

impl EquationController {
    pub fn new(config: EquationControllerConfig) -> Result<Self> {
        let law = parse_all("control law", &config.outputs, &config.control_law)?;
        Ok(Self { config, law })
    }

    pub fn config(&self) -> &EquationControllerConfig {
        &self.config
    }
}

impl Controller for EquationController {
    fn output_names(&self) -> &[String] {
        &self.config.outputs
    }

    fn time_variant(&self) -> bool {
        self.config.time_variant
    }

    fn parameter_names(&self) -> &[String] {
        &self.config.parameter_names
    }

    fn parameter_values(&self) -> &[f64] {
        &self.config.parameter_values
    }

    fn control_law(&self, _states: &[Expr], _time: Option<&Expr>) -> Vec<Expr> {
        self.law.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn oscillator() -> EquationModelConfig {
        EquationModelConfig {
            states: names(&["q", "p"]),
            inputs: names(&["f"]),
            equations: names(&["p", "-omega^2 * q + f"]),
            auxiliary_names: names(&["energy"]),
            auxiliary_equations: names(&["0.5 * (p^2 + omega^2 * q^2)"]),
            parameter_names: names(&["omega"]),
            parameter_values: vec![2.0],
            ..EquationModelConfig::default()
        }
    }

    #[test]
    fn model_compiles_and_evaluates() {
        let model = EquationModel::new(oscillator()).expect("model");
        let compiled = model.compile().expect("compile");
        let (derivatives, aux) = compiled.evaluate(&[1.0, 3.0], &[0.5], 0.0).expect("evaluate");
        assert_eq!(derivatives, vec![3.0, -4.0 + 0.5]);
        assert_eq!(aux, vec![0.5 * (9.0 + 4.0)]);
    }

    #[test]
    fn parse_errors_name_the_equation() {
        let mut config = oscillator();
        config.equations[1] = "-omega^2 * (q".to_string();
        let err = EquationModel::new(config).expect_err("unbalanced parenthesis");
        assert!(matches!(&err, SimError::Compilation(msg) if msg.starts_with("equation for 'p'")));
    }

    #[test]
    fn equation_count_must_match_states() {
        let mut config = oscillator();
        config.equations.pop();
        let err = EquationModel::new(config).expect_err("missing equation");
        assert_eq!(err, SimError::dimension("equation", 2, 1));

        let mut config = oscillator();
        config.auxiliary_equations.clear();
        assert!(EquationModel::new(config).is_err());
    }

    #[test]
    fn initial_conditions_may_be_short_but_not_long() {
        let mut config = oscillator();
        config.initial_conditions = vec![1.0];
        assert!(EquationModel::new(config.clone()).is_ok());
        config.initial_conditions = vec![1.0, 2.0, 3.0];
        let err = EquationModel::new(config).expect_err("too many");
        assert!(err.to_string().contains("3 initial conditions given for 2 states"));
    }

    #[test]
    fn time_variant_model_sees_time() {
        let model = EquationModel::new(EquationModelConfig {
            states: names(&["x"]),
            inputs: names(&["u"]),
            equations: names(&["u * t"]),
            time_variant: true,
            ..EquationModelConfig::default()
        })
        .expect("model");
        let compiled = model.compile().expect("compile");
        assert!(compiled.time_variant());
        let (derivatives, _) = compiled.evaluate(&[0.0], &[2.0], 1.5).expect("evaluate");
        assert_eq!(derivatives, vec![3.0]);
    }

    #[test]
    fn controller_evaluates_parameters_and_pi() {
        let controller = EquationController::new(EquationControllerConfig {
            outputs: names(&["f"]),
            control_law: names(&["-k * q + sin(pi / 2)"]),
            parameter_names: names(&["k"]),
            parameter_values: vec![4.0],
            time_variant: false,
        })
        .expect("controller");
        let compiled = controller.compile(&names(&["q", "p"])).expect("compile");
        let out = compiled.evaluate(&[0.5, 0.0], 0.0).expect("evaluate");
        assert!((out[0] - (-2.0 + 1.0)).abs() < 1e-12);
    }

    #[test]
    fn controller_parse_errors_surface_at_construction() {
        let err = EquationController::new(EquationControllerConfig {
            outputs: names(&["f"]),
            control_law: names(&["3 $ q"]),
            ..EquationControllerConfig::default()
        })
        .expect_err("bad character");
        assert!(
            matches!(&err, SimError::Compilation(msg) if msg.starts_with("control law for 'f'"))
        );
    }

    #[test]
    fn configs_deserialize_from_json() {
        let json = r#"{
            "states": ["x"],
            "inputs": ["u"],
            "equations": ["u"]
        }"#;
        let config: EquationModelConfig = serde_json::from_str(json).expect("json");
        assert!(config.auxiliary_names.is_empty());
        assert!(!config.time_variant);
        assert!(EquationModel::new(config).is_ok());
    }
}
