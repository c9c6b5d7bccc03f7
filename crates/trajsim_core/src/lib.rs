pub mod equation_engine;
pub mod error;
pub mod model;
pub mod models;
pub mod simulation;
pub mod solvers;
/// The `trajsim_core` crate simulates controlled dynamic systems described by
/// symbolic equations of motion.
///
/// Models and controllers build `Expr` trees once; these are compiled to
/// bytecode and integrated with a fixed-step RK4 scheme.
///
/// Key components:
/// - **Model**: `DynamicModel` and `Controller` contracts and their compiled forms.
/// - **Equation Engine**: Expression trees, a text parser and a bytecode VM.
/// - **Solvers**: Classic RK4 with the control input held across each step.
/// - **Simulation**: `Simulator`, run settings and the tabular `SimulationResult`.
/// - **Models**: Nonlinear and linearized bicycle vehicle models, an open-loop
///   manoeuvre, and string-defined models and controllers.
pub mod traits;

pub use error::{Result, SimError};
pub use model::{Controller, DynamicModel, Equations};
pub use simulation::{SimulationResult, SimulationSettings, Simulator};
