use crate::error::{Result, SimError};
use crate::model::{Controller, DynamicModel};
use crate::solvers::RK4;
use crate::traits::{ControlledStepper, ControlledSystem};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// Label of the first result column.
pub const TIME_LABEL: &str = "Time [s]";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub t_start: f64,
    pub t_end: f64,
    pub num_samples: usize,
    /// Abort with `SimError::Numeric` on the first non-finite value instead
    /// of letting it propagate into the result.
    pub reject_non_finite: bool,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            t_start: 0.0,
            t_end: 1.0,
            num_samples: 100,
            reject_non_finite: false,
        }
    }
}

impl SimulationSettings {
    pub fn validate(&self) -> Result<()> {
        if !self.t_start.is_finite() || !self.t_end.is_finite() {
            return Err(SimError::Configuration(
                "Start and end times must be finite.".to_string(),
            ));
        }
        if self.t_end <= self.t_start {
            return Err(SimError::Configuration(format!(
                "End time ({}) must be greater than start time ({}).",
                self.t_end, self.t_start
            )));
        }
        if self.num_samples < 2 {
            return Err(SimError::Configuration(format!(
                "At least 2 samples are required, got {}.",
                self.num_samples
            )));
        }
        Ok(())
    }

    pub fn step_size(&self) -> f64 {
        (self.t_end - self.t_start) / (self.num_samples - 1) as f64
    }
}

/// Uniform grid of `num_samples` points over `[t_start, t_end]`.
/// The last point is exactly `t_end`.
pub fn time_grid(t_start: f64, t_end: f64, num_samples: usize) -> Vec<f64> {
    match num_samples {
        0 => Vec::new(),
        1 => vec![t_start],
        n => {
            let dt = (t_end - t_start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { t_end } else { t_start + i as f64 * dt })
                .collect()
        }
    }
}

/// Drives a model under a controller over a uniform time grid.
///
/// The simulator only borrows its collaborators and keeps no state between
/// runs; each `run` compiles, integrates and returns a fresh result.
pub struct Simulator<'a> {
    model: &'a dyn DynamicModel,
    controller: &'a dyn Controller,
}

impl<'a> Simulator<'a> {
    pub fn new(model: &'a dyn DynamicModel, controller: &'a dyn Controller) -> Result<Self> {
        let inputs = model.input_names().len();
        let outputs = controller.output_names().len();
        if inputs != outputs {
            return Err(SimError::Configuration(format!(
                "Model declares {inputs} inputs but controller declares {outputs} outputs."
            )));
        }
        Ok(Self { model, controller })
    }

    /// Column labels: time, states, controller outputs, auxiliaries.
    pub fn labels(&self) -> Vec<String> {
        std::iter::once(TIME_LABEL.to_string())
            .chain(self.model.state_names().iter().cloned())
            .chain(self.controller.output_names().iter().cloned())
            .chain(self.model.auxiliary_names().iter().cloned())
            .collect()
    }

    pub fn run(&self, t_start: f64, t_end: f64, num_samples: usize) -> Result<SimulationResult> {
        self.run_with(&SimulationSettings {
            t_start,
            t_end,
            num_samples,
            ..SimulationSettings::default()
        })
    }

    pub fn run_with(&self, settings: &SimulationSettings) -> Result<SimulationResult> {
        settings.validate()?;
        let n = settings.num_samples;
        let dt = settings.step_size();
        let times = time_grid(settings.t_start, settings.t_end, n);

        let model = self.model.compile()?;
        let controller = self.controller.compile(self.model.state_names())?;
        let ns = model.dimension();
        let nu = model.input_dimension();
        let na = model.auxiliary_dimension();
        if controller.output_dimension() != nu {
            return Err(SimError::dimension(
                "controller outputs",
                nu,
                controller.output_dimension(),
            ));
        }

        let mut state = initial_state(self.model)?;
        let mut control = vec![0.0; nu];
        let mut aux = vec![0.0; na];
        let mut stepper = RK4::new(ns);
        let mut data = DMatrix::zeros(n, 1 + ns + nu + na);
        tracing::info!(
            t_start = settings.t_start,
            t_end = settings.t_end,
            samples = n,
            dt,
            "starting simulation"
        );

        for (i, &t) in times.iter().enumerate() {
            data[(i, 0)] = t;
            write_row(&mut data, i, 1, &state);
            controller.apply(t, &state, &mut control);
            if i + 1 < n {
                stepper.step(&model, t, &mut state, &control, &mut aux, dt);
            } else {
                model.observe(t, &state, &control, &mut aux);
            }
            write_row(&mut data, i, 1 + ns, &control);
            write_row(&mut data, i, 1 + ns + nu, &aux);

            if settings.reject_non_finite {
                check_finite(&data, i, &[("state", ns), ("control", nu), ("auxiliary", na)])?;
            }
        }

        let non_finite = data.iter().filter(|value| !value.is_finite()).count();
        if non_finite > 0 {
            tracing::warn!(non_finite, "simulation produced non-finite values");
        }
        tracing::info!(rows = n, columns = data.ncols(), "simulation finished");

        SimulationResult::new(data, self.labels())
    }
}

fn initial_state(model: &dyn DynamicModel) -> Result<Vec<f64>> {
    let num_states = model.state_names().len();
    let initial = model.initial_conditions();
    if initial.len() > num_states {
        return Err(SimError::Configuration(format!(
            "{} initial conditions given for {} states.",
            initial.len(),
            num_states
        )));
    }
    let mut state = vec![0.0; num_states];
    state[..initial.len()].copy_from_slice(initial);
    Ok(state)
}

fn write_row(data: &mut DMatrix<f64>, row: usize, offset: usize, values: &[f64]) {
    for (j, &value) in values.iter().enumerate() {
        data[(row, offset + j)] = value;
    }
}

fn check_finite(data: &DMatrix<f64>, row: usize, blocks: &[(&str, usize)]) -> Result<()> {
    let mut col = 1;
    for &(component, width) in blocks {
        if (col..col + width).any(|j| !data[(row, j)].is_finite()) {
            return Err(SimError::Numeric {
                component: component.to_string(),
                time: data[(row, 0)],
            });
        }
        col += width;
    }
    Ok(())
}

/// A sampled trajectory: one row per time point, columns
/// `[time, states..., outputs..., auxiliaries...]`, with matching labels.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    data: DMatrix<f64>,
    labels: Vec<String>,
}

impl SimulationResult {
    pub fn new(data: DMatrix<f64>, labels: Vec<String>) -> Result<Self> {
        if data.ncols() != labels.len() {
            return Err(SimError::dimension("result labels", data.ncols(), labels.len()));
        }
        Ok(Self { data, labels })
    }

    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn num_samples(&self) -> usize {
        self.data.nrows()
    }

    pub fn num_columns(&self) -> usize {
        self.data.ncols()
    }

    pub fn column_index(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Values of the column with the given label, in sample order.
    pub fn column(&self, label: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(label)?;
        Some(self.data.column(idx).iter().copied().collect())
    }

    pub fn time(&self) -> Vec<f64> {
        self.data.column(0).iter().copied().collect()
    }

    pub fn row(&self, index: usize) -> Option<Vec<f64>> {
        (index < self.data.nrows()).then(|| self.data.row(index).iter().copied().collect())
    }

    /// Row-major copy of the matrix.
    pub fn to_row_major(&self) -> Vec<f64> {
        self.data.transpose().as_slice().to_vec()
    }

    /// Splits the result into its column-major matrix and labels.
    pub fn into_parts(self) -> (DMatrix<f64>, Vec<String>) {
        (self.data, self.labels)
    }

    /// Writes a header line of labels followed by one comma-separated line per sample.
    pub fn write_csv<W: Write>(&self, mut writer: W) -> io::Result<()> {
        let header: Vec<String> = self.labels.iter().map(|l| csv_field(l)).collect();
        writeln!(writer, "{}", header.join(","))?;
        for row in self.data.row_iter() {
            let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            writeln!(writer, "{}", line.join(","))?;
        }
        Ok(())
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
