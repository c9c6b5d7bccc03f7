//! JavaScript bindings for `trajsim_core`.
//!
//! Logic lives in plain functions returning `anyhow::Result`; the
//! `#[wasm_bindgen]` wrappers only convert values and errors.

mod simulation;

pub use simulation::{
    run_vehicle_scenario, SimulationConfig, SimulationTable, VehicleScenario, WasmSimulation,
};
