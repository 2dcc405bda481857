use crate::plan::schema::{CorrectionPlan, InstrumentationPlan, PlanValidationError};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("failed to read plan from {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse plan TOML{}: {source}", fmt_path(.path))]
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },

    #[error("invalid plan{}: {source}", fmt_path(.path))]
    Validation {
        path: Option<PathBuf>,
        source: PlanValidationError,
    },
}

fn fmt_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" ({})", path.display()),
        None => String::new(),
    }
}

impl PlanError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            PlanError::Toml { path: None, source } => PlanError::Toml {
                path: Some(path),
                source,
            },
            PlanError::Validation { path: None, source } => PlanError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

pub fn instrumentation_from_str(input: &str) -> Result<InstrumentationPlan, PlanError> {
    let plan: InstrumentationPlan =
        toml_edit::de::from_str(input).map_err(|source| PlanError::Toml { path: None, source })?;
    plan.validate()
        .map_err(|source| PlanError::Validation { path: None, source })?;
    Ok(plan)
}

pub fn instrumentation_from_path(
    path: impl AsRef<Path>,
) -> Result<InstrumentationPlan, PlanError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| PlanError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    instrumentation_from_str(&contents).map_err(|error| error.with_path(path))
}

pub fn correction_from_str(input: &str) -> Result<CorrectionPlan, PlanError> {
    let plan: CorrectionPlan =
        toml_edit::de::from_str(input).map_err(|source| PlanError::Toml { path: None, source })?;
    plan.validate()
        .map_err(|source| PlanError::Validation { path: None, source })?;
    Ok(plan)
}

pub fn correction_from_path(path: impl AsRef<Path>) -> Result<CorrectionPlan, PlanError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| PlanError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    correction_from_str(&contents).map_err(|error| error.with_path(path))
}
