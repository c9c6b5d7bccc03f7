//! Capability contracts for dynamic models and controllers.
//!
//! Both contracts describe their equations symbolically over `Expr` symbols
//! and provide a `compile` step that turns those equations into bytecode
//! evaluated by the `VM`. Compilation happens on every call; nothing is
//! memoized between runs.

use crate::equation_engine::{Bytecode, Compiler, Expr, VM};
use crate::error::{ensure_unique, validate_names, Result, SimError};
use crate::traits::ControlledSystem;
use std::cell::RefCell;

/// Name of the time symbol handed to time-variant models and controllers.
pub const TIME_SYMBOL: &str = "t";

/// Symbolic equations of motion: one derivative per state plus the
/// auxiliary (logged) quantities.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Equations {
    pub derivatives: Vec<Expr>,
    pub auxiliaries: Vec<Expr>,
}

impl Equations {
    pub fn new(derivatives: Vec<Expr>, auxiliaries: Vec<Expr>) -> Self {
        Self {
            derivatives,
            auxiliaries,
        }
    }
}

/// A system of first-order ODEs driven by control inputs.
pub trait DynamicModel {
    /// Ordered state names; derivatives and initial conditions follow this order.
    fn state_names(&self) -> &[String];

    /// Ordered control input names.
    fn input_names(&self) -> &[String];

    /// Labels of the auxiliary quantities returned by `equations_of_motion`.
    fn auxiliary_names(&self) -> &[String] {
        &[]
    }

    /// Whether the equations reference the time symbol.
    fn time_variant(&self) -> bool {
        false
    }

    /// Initial state, possibly shorter than the state list (missing entries are zero).
    fn initial_conditions(&self) -> &[f64] {
        &[]
    }

    fn parameter_names(&self) -> &[String] {
        &[]
    }

    fn parameter_values(&self) -> &[f64] {
        &[]
    }

    /// Builds the symbolic equations. `time` is `Some` only for time-variant models.
    fn equations_of_motion(&self, states: &[Expr], inputs: &[Expr], time: Option<&Expr>)
        -> Equations;

    /// Compiles the equations of motion into a numeric function of
    /// `(states, inputs[, time])`.
    fn compile(&self) -> Result<CompiledModel> {
        let states = self.state_names();
        let inputs = self.input_names();
        validate_names("state", states)?;
        validate_names("input", inputs)?;
        ensure_unique("auxiliary", self.auxiliary_names())?;

        let mut var_names: Vec<String> = states.iter().chain(inputs).cloned().collect();
        if self.time_variant() {
            var_names.push(TIME_SYMBOL.to_string());
        }
        let param_names = self.parameter_names();
        check_parameters(param_names, self.parameter_values())?;
        ensure_unique("model variable", var_names.iter().chain(param_names))?;

        let state_syms: Vec<Expr> = states.iter().map(Expr::var).collect();
        let input_syms: Vec<Expr> = inputs.iter().map(Expr::var).collect();
        let time_sym = self.time_variant().then(|| Expr::var(TIME_SYMBOL));
        let equations = self.equations_of_motion(&state_syms, &input_syms, time_sym.as_ref());

        if equations.derivatives.len() != states.len() {
            return Err(SimError::dimension(
                "equations of motion derivatives",
                states.len(),
                equations.derivatives.len(),
            ));
        }
        if equations.auxiliaries.len() != self.auxiliary_names().len() {
            return Err(SimError::dimension(
                "equations of motion auxiliaries",
                self.auxiliary_names().len(),
                equations.auxiliaries.len(),
            ));
        }

        let compiler = Compiler::new(&var_names, param_names);
        let derivatives = compile_all(&compiler, &equations.derivatives, "derivative", states)?;
        let auxiliaries = compile_all(
            &compiler,
            &equations.auxiliaries,
            "auxiliary",
            self.auxiliary_names(),
        )?;
        tracing::debug!(
            states = states.len(),
            inputs = inputs.len(),
            auxiliaries = auxiliaries.len(),
            ops = derivatives.iter().chain(&auxiliaries).map(Bytecode::len).sum::<usize>(),
            "compiled equations of motion"
        );

        Ok(CompiledModel {
            derivatives,
            auxiliaries,
            params: self.parameter_values().to_vec(),
            num_states: states.len(),
            num_inputs: inputs.len(),
            time_variant: self.time_variant(),
            vars: RefCell::new(vec![0.0; var_names.len()]),
            stack: RefCell::new(Vec::with_capacity(64)),
        })
    }
}

/// A feedback law mapping state (and optionally time) to control outputs.
pub trait Controller {
    /// Ordered output names; they feed the model inputs of the same position.
    fn output_names(&self) -> &[String];

    /// Whether the control law references the time symbol.
    fn time_variant(&self) -> bool {
        false
    }

    fn parameter_names(&self) -> &[String] {
        &[]
    }

    fn parameter_values(&self) -> &[f64] {
        &[]
    }

    /// Builds the symbolic control law. `time` is `Some` only for time-variant controllers.
    fn control_law(&self, states: &[Expr], time: Option<&Expr>) -> Vec<Expr>;

    /// Compiles the control law against the state names of the model it drives.
    fn compile(&self, state_names: &[String]) -> Result<CompiledController> {
        let outputs = self.output_names();
        validate_names("output", outputs)?;
        validate_names("state", state_names)?;

        let mut var_names = state_names.to_vec();
        if self.time_variant() {
            var_names.push(TIME_SYMBOL.to_string());
        }
        let param_names = self.parameter_names();
        check_parameters(param_names, self.parameter_values())?;
        ensure_unique("controller variable", var_names.iter().chain(param_names))?;

        let state_syms: Vec<Expr> = state_names.iter().map(Expr::var).collect();
        let time_sym = self.time_variant().then(|| Expr::var(TIME_SYMBOL));
        let law = self.control_law(&state_syms, time_sym.as_ref());
        if law.len() != outputs.len() {
            return Err(SimError::dimension(
                "control law outputs",
                outputs.len(),
                law.len(),
            ));
        }

        let compiler = Compiler::new(&var_names, param_names);
        let outputs = compile_all(&compiler, &law, "control output", outputs)?;
        tracing::debug!(
            outputs = outputs.len(),
            ops = outputs.iter().map(Bytecode::len).sum::<usize>(),
            "compiled control law"
        );

        Ok(CompiledController {
            outputs,
            params: self.parameter_values().to_vec(),
            num_states: state_names.len(),
            time_variant: self.time_variant(),
            vars: RefCell::new(vec![0.0; var_names.len()]),
            stack: RefCell::new(Vec::with_capacity(64)),
        })
    }
}

fn check_parameters(names: &[String], values: &[f64]) -> Result<()> {
    if names.len() != values.len() {
        return Err(SimError::Configuration(format!(
            "{} parameter names but {} parameter values.",
            names.len(),
            values.len()
        )));
    }
    Ok(())
}

fn compile_all(
    compiler: &Compiler,
    exprs: &[Expr],
    kind: &str,
    labels: &[String],
) -> Result<Vec<Bytecode>> {
    exprs
        .iter()
        .zip(labels)
        .map(|(expr, label)| {
            compiler.compile(expr).map_err(|err| match err {
                SimError::Compilation(msg) => {
                    SimError::Compilation(format!("{kind} '{label}': {msg}"))
                }
                other => other,
            })
        })
        .collect()
}

/// Numeric form of a `DynamicModel`.
///
/// Variables are laid out as `[states..., inputs..., t?]`. The scratch
/// buffers make this type `!Sync`; build one per run.
#[derive(Debug)]
pub struct CompiledModel {
    derivatives: Vec<Bytecode>,
    auxiliaries: Vec<Bytecode>,
    params: Vec<f64>,
    num_states: usize,
    num_inputs: usize,
    time_variant: bool,
    vars: RefCell<Vec<f64>>,
    stack: RefCell<Vec<f64>>,
}

impl CompiledModel {
    pub fn time_variant(&self) -> bool {
        self.time_variant
    }

    /// Evaluates `(derivatives, auxiliaries)` at one point.
    /// `t` is ignored by time-invariant models.
    pub fn evaluate(&self, x: &[f64], u: &[f64], t: f64) -> Result<(Vec<f64>, Vec<f64>)> {
        if x.len() != self.num_states {
            return Err(SimError::dimension("model state", self.num_states, x.len()));
        }
        if u.len() != self.num_inputs {
            return Err(SimError::dimension("model input", self.num_inputs, u.len()));
        }
        let mut derivatives = vec![0.0; self.num_states];
        let mut auxiliaries = vec![0.0; self.auxiliaries.len()];
        self.apply(t, x, u, &mut derivatives);
        self.observe(t, x, u, &mut auxiliaries);
        Ok((derivatives, auxiliaries))
    }

    fn run(&self, codes: &[Bytecode], t: f64, x: &[f64], u: &[f64], out: &mut [f64]) {
        let mut vars = self.vars.borrow_mut();
        vars[..self.num_states].copy_from_slice(x);
        vars[self.num_states..self.num_states + self.num_inputs].copy_from_slice(u);
        if self.time_variant {
            vars[self.num_states + self.num_inputs] = t;
        }
        let mut stack = self.stack.borrow_mut();
        for (slot, code) in out.iter_mut().zip(codes) {
            *slot = VM::execute(code, &vars, &self.params, &mut stack);
        }
    }
}

/// Unchecked evaluation used by the integrator.
///
/// # Panics
///
/// `apply` and `observe` panic if `x` or `u` do not match the compiled
/// state and input counts. Use `CompiledModel::evaluate` for checked calls.
impl ControlledSystem<f64> for CompiledModel {
    fn dimension(&self) -> usize {
        self.num_states
    }

    fn input_dimension(&self) -> usize {
        self.num_inputs
    }

    fn auxiliary_dimension(&self) -> usize {
        self.auxiliaries.len()
    }

    fn apply(&self, t: f64, x: &[f64], u: &[f64], out: &mut [f64]) {
        self.run(&self.derivatives, t, x, u, out);
    }

    fn observe(&self, t: f64, x: &[f64], u: &[f64], aux: &mut [f64]) {
        self.run(&self.auxiliaries, t, x, u, aux);
    }
}

/// Numeric form of a `Controller`, laid out as `[states..., t?]`.
#[derive(Debug)]
pub struct CompiledController {
    outputs: Vec<Bytecode>,
    params: Vec<f64>,
    num_states: usize,
    time_variant: bool,
    vars: RefCell<Vec<f64>>,
    stack: RefCell<Vec<f64>>,
}

impl CompiledController {
    pub fn output_dimension(&self) -> usize {
        self.outputs.len()
    }

    pub fn time_variant(&self) -> bool {
        self.time_variant
    }

    /// Writes the control outputs for state `x` at time `t` into `out`.
    ///
    /// # Panics
    ///
    /// Panics if `x` does not have one entry per compiled state.
    pub fn apply(&self, t: f64, x: &[f64], out: &mut [f64]) {
        let mut vars = self.vars.borrow_mut();
        vars[..self.num_states].copy_from_slice(x);
        if self.time_variant {
            vars[self.num_states] = t;
        }
        let mut stack = self.stack.borrow_mut();
        for (slot, code) in out.iter_mut().zip(&self.outputs) {
            *slot = VM::execute(code, &vars, &self.params, &mut stack);
        }
    }

    pub fn evaluate(&self, x: &[f64], t: f64) -> Result<Vec<f64>> {
        if x.len() != self.num_states {
            return Err(SimError::dimension("controller state", self.num_states, x.len()));
        }
        let mut out = vec![0.0; self.outputs.len()];
        self.apply(t, x, &mut out);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::{Controller, DynamicModel, Equations, TIME_SYMBOL};
    use crate::equation_engine::Expr;
    use crate::error::SimError;
    use crate::traits::ControlledSystem;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// Damped cart: x' = v, v' = (f - c v) / m, logging kinetic energy.
    struct Cart {
        states: Vec<String>,
        inputs: Vec<String>,
        aux: Vec<String>,
        mass: f64,
        damping: f64,
        extra_derivative: bool,
    }

    impl Cart {
        fn new() -> Self {
            Self {
                states: names(&["x", "v"]),
                inputs: names(&["f"]),
                aux: names(&["energy"]),
                mass: 2.0,
                damping: 0.5,
                extra_derivative: false,
            }
        }
    }

    impl DynamicModel for Cart {
        fn state_names(&self) -> &[String] {
            &self.states
        }

        fn input_names(&self) -> &[String] {
            &self.inputs
        }

        fn auxiliary_names(&self) -> &[String] {
            &self.aux
        }

        fn equations_of_motion(&self, s: &[Expr], u: &[Expr], _t: Option<&Expr>) -> Equations {
            let v = s[1].clone();
            let mut derivatives = vec![
                v.clone(),
                (u[0].clone() - self.damping * v.clone()) / self.mass,
            ];
            if self.extra_derivative {
                derivatives.push(Expr::num(0.0));
            }
            Equations::new(derivatives, vec![0.5 * self.mass * v.powf(2.0)])
        }
    }

    struct Forcing {
        outputs: Vec<String>,
        time_variant: bool,
    }

    impl Controller for Forcing {
        fn output_names(&self) -> &[String] {
            &self.outputs
        }

        fn time_variant(&self) -> bool {
            self.time_variant
        }

        fn control_law(&self, states: &[Expr], time: Option<&Expr>) -> Vec<Expr> {
            let feedback = -3.0 * states[0].clone();
            match time {
                Some(t) => vec![feedback + t.clone().sin()],
                None => vec![feedback + Expr::var(TIME_SYMBOL)],
            }
        }
    }

    #[test]
    fn compiled_model_matches_closed_form() {
        let model = Cart::new();
        let compiled = model.compile().expect("compile");
        assert_eq!(compiled.dimension(), 2);
        assert_eq!(compiled.input_dimension(), 1);
        assert_eq!(compiled.auxiliary_dimension(), 1);

        let (derivatives, aux) = compiled.evaluate(&[1.0, 4.0], &[3.0], 0.0).expect("evaluate");
        assert!((derivatives[0] - 4.0).abs() < 1e-12);
        assert!((derivatives[1] - (3.0 - 0.5 * 4.0) / 2.0).abs() < 1e-12);
        assert!((aux[0] - 16.0).abs() < 1e-12);
    }

    #[test]
    fn evaluate_rejects_wrongly_sized_slices() {
        let compiled = Cart::new().compile().expect("compile");
        let err = compiled
            .evaluate(&[1.0], &[1.0], 0.0)
            .expect_err("one state for a two-state model");
        assert_eq!(err, SimError::dimension("model state", 2, 1));
        let err = compiled
            .evaluate(&[1.0, 2.0], &[], 0.0)
            .expect_err("missing input");
        assert_eq!(err, SimError::dimension("model input", 1, 0));

        let controller = Forcing {
            outputs: names(&["f"]),
            time_variant: true,
        };
        let compiled = controller.compile(&names(&["x", "v"])).expect("compile");
        let err = compiled.evaluate(&[1.0, 2.0, 3.0], 0.0).expect_err("extra state");
        assert_eq!(err, SimError::dimension("controller state", 2, 3));
    }

    #[test]
    fn compile_rejects_wrong_derivative_count() {
        let mut model = Cart::new();
        model.extra_derivative = true;
        let err = model.compile().expect_err("extra derivative should fail");
        assert_eq!(
            err,
            SimError::DimensionMismatch {
                component: "equations of motion derivatives".to_string(),
                expected: 2,
                actual: 3,
            }
        );
    }

    #[test]
    fn compile_rejects_auxiliary_label_mismatch() {
        let mut model = Cart::new();
        model.aux = names(&["energy", "power"]);
        let err = model.compile().expect_err("missing auxiliary should fail");
        assert!(matches!(
            err,
            SimError::DimensionMismatch {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn compile_rejects_bad_name_lists() {
        let mut model = Cart::new();
        model.inputs = Vec::new();
        assert!(matches!(model.compile(), Err(SimError::Configuration(_))));

        let mut model = Cart::new();
        model.inputs = names(&["v"]);
        let err = model.compile().expect_err("state/input collision");
        assert!(err.to_string().contains("Duplicate model variable name 'v'"));
    }

    #[test]
    fn time_variant_controller_reads_time() {
        let controller = Forcing {
            outputs: names(&["f"]),
            time_variant: true,
        };
        let compiled = controller.compile(&names(&["x", "v"])).expect("compile");
        assert!(compiled.time_variant());
        let out = compiled.evaluate(&[2.0, 0.0], std::f64::consts::FRAC_PI_2).expect("evaluate");
        assert!((out[0] - (-6.0 + 1.0)).abs() < 1e-12);
    }

    #[test]
    fn time_invariant_controller_cannot_reference_time() {
        let controller = Forcing {
            outputs: names(&["f"]),
            time_variant: false,
        };
        let err = controller
            .compile(&names(&["x", "v"]))
            .expect_err("time symbol is not declared");
        assert!(matches!(&err, SimError::Compilation(msg) if msg.contains("control output 'f'")));
    }

    #[test]
    fn controller_output_count_must_match_law() {
        let controller = Forcing {
            outputs: names(&["f", "g"]),
            time_variant: true,
        };
        let err = controller
            .compile(&names(&["x", "v"]))
            .expect_err("law has one output");
        assert!(matches!(
            err,
            SimError::DimensionMismatch {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }
}
