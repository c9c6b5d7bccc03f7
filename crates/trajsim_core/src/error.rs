use thiserror::Error;

/// Errors raised while compiling or running a simulation.
///
/// Every variant aborts the current run; no partial result is produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    /// Name lists, run arguments or physical parameters are unusable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A symbolic function returned a list whose length disagrees with the declared names.
    #[error("Dimension mismatch in {component}: expected {expected}, got {actual}")]
    DimensionMismatch {
        component: String,
        expected: usize,
        actual: usize,
    },

    /// An expression could not be reduced to bytecode.
    #[error("Compilation error: {0}")]
    Compilation(String),

    /// A non-finite value was produced while non-finite rejection was enabled.
    #[error("Non-finite {component} value at t = {time}")]
    Numeric { component: String, time: f64 },
}

pub type Result<T> = std::result::Result<T, SimError>;

impl SimError {
    pub(crate) fn dimension(component: impl Into<String>, expected: usize, actual: usize) -> Self {
        SimError::DimensionMismatch {
            component: component.into(),
            expected,
            actual,
        }
    }
}

/// Checks that a declared name list is non-empty and free of duplicates.
pub(crate) fn validate_names(kind: &str, names: &[String]) -> Result<()> {
    if names.is_empty() {
        return Err(SimError::Configuration(format!(
            "{kind} name list must not be empty."
        )));
    }
    ensure_unique(kind, names)
}

pub(crate) fn ensure_unique<'a>(
    kind: &str,
    names: impl IntoIterator<Item = &'a String>,
) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(SimError::Configuration(format!(
                "{kind} names must not be blank."
            )));
        }
        if !seen.insert(name.as_str()) {
            return Err(SimError::Configuration(format!(
                "Duplicate {kind} name '{name}'."
            )));
        }
    }
    Ok(())
}
