//! Simulation runners exposed to JavaScript.

use anyhow::{bail, Context};
use js_sys::Float64Array;
use serde::{Deserialize, Serialize};
use serde_wasm_bindgen::{from_value, to_value};
use trajsim_core::model::{Controller, DynamicModel};
use trajsim_core::models::{
    BicycleModel, BicycleParameters, EquationController, EquationControllerConfig, EquationModel,
    EquationModelConfig, LinearizedBicycleModel, OpenLoopController, OpenLoopProfile,
};
use trajsim_core::simulation::{SimulationResult, SimulationSettings, Simulator};
use wasm_bindgen::prelude::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub model: EquationModelConfig,
    pub controller: EquationControllerConfig,
    #[serde(default)]
    pub reject_non_finite: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleScenario {
    pub parameters: BicycleParameters,
    pub profile: OpenLoopProfile,
    pub initial_conditions: Vec<f64>,
}

/// Result table in a shape that serializes cleanly to a JS object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationTable {
    pub labels: Vec<String>,
    pub rows: usize,
    pub columns: usize,
    /// Row-major samples.
    pub data: Vec<f64>,
}

impl From<SimulationResult> for SimulationTable {
    fn from(result: SimulationResult) -> Self {
        let (matrix, labels) = result.into_parts();
        Self {
            labels,
            rows: matrix.nrows(),
            columns: matrix.ncols(),
            data: matrix.transpose().as_slice().to_vec(),
        }
    }
}

fn to_js_error(err: anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{err:#}"))
}

fn settings(
    t_start: f64,
    t_end: f64,
    num_samples: u32,
    reject_non_finite: bool,
) -> SimulationSettings {
    SimulationSettings {
        t_start,
        t_end,
        num_samples: num_samples as usize,
        reject_non_finite,
    }
}

fn build_equation_system(
    config: SimulationConfig,
) -> anyhow::Result<(EquationModel, EquationController, bool)> {
    let model = EquationModel::new(config.model).context("Invalid model")?;
    let controller = EquationController::new(config.controller).context("Invalid controller")?;
    // Fail at construction rather than on the first run.
    Simulator::new(&model, &controller)?;
    Ok((model, controller, config.reject_non_finite))
}

/// Configuration an equation system was built from.
fn system_config(
    model: &EquationModel,
    controller: &EquationController,
    reject_non_finite: bool,
) -> SimulationConfig {
    SimulationConfig {
        model: model.config().clone(),
        controller: controller.config().clone(),
        reject_non_finite,
    }
}

fn simulate(
    model: &dyn DynamicModel,
    controller: &dyn Controller,
    settings: &SimulationSettings,
) -> anyhow::Result<SimulationResult> {
    let simulator = Simulator::new(model, controller)?;
    let result = simulator.run_with(settings).context("Simulation failed")?;
    Ok(result)
}

fn result_to_csv(result: &SimulationResult) -> anyhow::Result<String> {
    let mut buffer = Vec::new();
    result.write_csv(&mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

fn vehicle_scenario(
    scenario: VehicleScenario,
    variant: &str,
    settings: &SimulationSettings,
) -> anyhow::Result<SimulationResult> {
    let controller = OpenLoopController::new(scenario.profile);
    match variant {
        "nonlinear" => {
            let model = BicycleModel::new(scenario.parameters)?
                .with_initial_conditions(scenario.initial_conditions)?;
            simulate(&model, &controller, settings)
        }
        "linearized" => {
            let model = LinearizedBicycleModel::new(scenario.parameters)?
                .with_initial_conditions(scenario.initial_conditions)?;
            simulate(&model, &controller, settings)
        }
        other => bail!("Unknown bicycle model variant '{other}'."),
    }
}

#[wasm_bindgen]
pub struct WasmSimulation {
    model: EquationModel,
    controller: EquationController,
    reject_non_finite: bool,
}

#[wasm_bindgen]
impl WasmSimulation {
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<WasmSimulation, JsValue> {
        console_error_panic_hook::set_once();

        let config: SimulationConfig = from_value(config)
            .map_err(|e| JsValue::from_str(&format!("Invalid simulation config: {}", e)))?;
        let (model, controller, reject_non_finite) =
            build_equation_system(config).map_err(to_js_error)?;
        Ok(WasmSimulation {
            model,
            controller,
            reject_non_finite,
        })
    }

    pub fn config(&self) -> Result<JsValue, JsValue> {
        to_value(&system_config(
            &self.model,
            &self.controller,
            self.reject_non_finite,
        ))
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    pub fn labels(&self) -> Result<Vec<String>, JsValue> {
        Simulator::new(&self.model, &self.controller)
            .map(|sim| sim.labels())
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn run(&self, t_start: f64, t_end: f64, num_samples: u32) -> Result<JsValue, JsValue> {
        let result = self.simulate(t_start, t_end, num_samples)?;
        to_value(&SimulationTable::from(result))
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    pub fn run_csv(&self, t_start: f64, t_end: f64, num_samples: u32) -> Result<String, JsValue> {
        let result = self.simulate(t_start, t_end, num_samples)?;
        result_to_csv(&result).map_err(to_js_error)
    }

    /// Row-major samples without labels.
    pub fn run_data(
        &self,
        t_start: f64,
        t_end: f64,
        num_samples: u32,
    ) -> Result<Float64Array, JsValue> {
        let result = self.simulate(t_start, t_end, num_samples)?;
        Ok(Float64Array::from(result.to_row_major().as_slice()))
    }
}

impl WasmSimulation {
    fn simulate(
        &self,
        t_start: f64,
        t_end: f64,
        num_samples: u32,
    ) -> Result<SimulationResult, JsValue> {
        let settings = settings(t_start, t_end, num_samples, self.reject_non_finite);
        simulate(&self.model, &self.controller, &settings).map_err(to_js_error)
    }
}

/// Runs a bicycle model variant (`"nonlinear"` or `"linearized"`) under the
/// open-loop manoeuvre.
#[wasm_bindgen]
pub fn run_vehicle_scenario(
    scenario: JsValue,
    variant: &str,
    t_start: f64,
    t_end: f64,
    num_samples: u32,
) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let scenario: VehicleScenario = if scenario.is_undefined() || scenario.is_null() {
        VehicleScenario::default()
    } else {
        from_value(scenario)
            .map_err(|e| JsValue::from_str(&format!("Invalid vehicle scenario: {}", e)))?
    };
    let settings = settings(t_start, t_end, num_samples, false);
    let result = vehicle_scenario(scenario, variant, &settings).map_err(to_js_error)?;
    to_value(&SimulationTable::from(result))
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn decay_config() -> SimulationConfig {
        SimulationConfig {
            model: EquationModelConfig {
                states: names(&["x"]),
                inputs: names(&["u"]),
                equations: names(&["-x + u"]),
                initial_conditions: vec![1.0],
                ..EquationModelConfig::default()
            },
            controller: EquationControllerConfig {
                outputs: names(&["u"]),
                control_law: names(&["0"]),
                ..EquationControllerConfig::default()
            },
            reject_non_finite: false,
        }
    }

    #[test]
    fn equation_system_runs_and_tabulates() {
        let (model, controller, reject) = build_equation_system(decay_config()).expect("build");
        assert!(!reject);
        let result = simulate(&model, &controller, &settings(0.0, 1.0, 11, reject)).expect("run");
        let table = SimulationTable::from(result);
        assert_eq!(table.labels, names(&["Time [s]", "x", "u"]));
        assert_eq!((table.rows, table.columns), (11, 3));
        assert_eq!(table.data.len(), 33);
        // Last row: time then x(1) ~ exp(-1).
        assert_eq!(table.data[30], 1.0);
        assert!((table.data[31] - (-1.0f64).exp()).abs() < 1e-6);
    }

    #[test]
    fn built_system_reports_its_config() {
        let mut config = decay_config();
        config.reject_non_finite = true;
        let (model, controller, reject) = build_equation_system(config.clone()).expect("build");
        let reported = system_config(&model, &controller, reject);
        assert_eq!(reported.model, config.model);
        assert_eq!(reported.controller, config.controller);
        assert!(reported.reject_non_finite);
    }

    #[test]
    fn build_reports_count_mismatch() {
        let mut config = decay_config();
        config.controller.outputs = names(&["u", "w"]);
        config.controller.control_law = names(&["0", "1"]);
        let err = build_equation_system(config).expect_err("mismatch");
        assert!(format!("{err:#}").contains("declares 1 inputs"));
    }

    #[test]
    fn build_reports_parse_errors_with_context() {
        let mut config = decay_config();
        config.model.equations = names(&["-x +"]);
        let err = build_equation_system(config).expect_err("parse error");
        let message = format!("{err:#}");
        assert!(message.starts_with("Invalid model: "), "{message}");
    }

    #[test]
    fn csv_text_has_header_and_rows() {
        let (model, controller, _) = build_equation_system(decay_config()).expect("build");
        let result = simulate(&model, &controller, &settings(0.0, 1.0, 3, false)).expect("run");
        let csv = result_to_csv(&result).expect("csv");
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "Time [s],x,u");
        assert!(lines[1].starts_with("0,1,0"));
    }

    #[test]
    fn vehicle_scenario_runs_both_variants() {
        let run = |variant| {
            vehicle_scenario(
                VehicleScenario::default(),
                variant,
                &settings(0.0, 1.0, 101, false),
            )
            .expect("scenario")
        };
        let nonlinear = run("nonlinear");
        let linearized = run("linearized");
        assert_eq!(nonlinear.num_columns(), 1 + 9 + 4 + 6);
        assert_eq!(nonlinear.labels(), linearized.labels());
        assert!(nonlinear.data().iter().all(|v| v.is_finite()));
        assert!(linearized.data().iter().all(|v| v.is_finite()));
        // The rear drive pulse accelerates the vehicle from rest.
        let speed = nonlinear.column("x_dot").expect("x_dot");
        assert!(speed[100] > 0.0);
    }

    #[test]
    fn vehicle_scenario_rejects_unknown_variant() {
        let err = vehicle_scenario(
            VehicleScenario::default(),
            "unicycle",
            &settings(0.0, 1.0, 10, false),
        )
        .expect_err("unknown variant");
        assert!(err.to_string().contains("unicycle"));
    }

    #[test]
    fn scenario_deserializes_with_defaults() {
        let scenario: VehicleScenario =
            serde_json::from_str(r#"{ "initial_conditions": [0.0, 5.0] }"#).expect("json");
        assert_eq!(scenario.parameters, BicycleParameters::default());
        assert_eq!(scenario.initial_conditions, vec![0.0, 5.0]);
    }
}
