//! Unified error model for plan validation and execution.
//! Every variant carries a stable machine code plus a human message so callers can
//! branch on the code and show the message.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    #[error("{code}: {message}")]
    InvalidPlan { code: String, message: String },
    #[error("{code}: {message}")]
    ColumnNotFound { code: String, message: String },
    #[error("{code}: {message}")]
    Exec { code: String, message: String },
    #[error("{code}: {message}")]
    Io { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::InvalidPlan { code, .. }
            | AppError::ColumnNotFound { code, .. }
            | AppError::Exec { code, .. }
            | AppError::Io { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::InvalidPlan { message, .. }
            | AppError::ColumnNotFound { message, .. }
            | AppError::Exec { message, .. }
            | AppError::Io { message, .. } => message.as_str(),
        }
    }

    pub fn invalid_plan<S: Into<String>>(code: S, msg: S) -> Self { AppError::InvalidPlan { code: code.into(), message: msg.into() } }
    pub fn column_not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::ColumnNotFound { code: code.into(), message: msg.into() } }
    pub fn exec<S: Into<String>>(code: S, msg: S) -> Self { AppError::Exec { code: code.into(), message: msg.into() } }

    /// Process exit code used by the command-line front end.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::InvalidPlan { .. } => 2,
            AppError::ColumnNotFound { .. } => 3,
            AppError::Exec { .. } => 4,
            AppError::Io { .. } => 5,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<polars::prelude::PolarsError> for AppError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        AppError::Exec { code: "polars_error".into(), message: err.to_string() }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Exec { code: "exec_error".into(), message: format!("{:#}", err) }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidPlan { code: "invalid_json".into(), message: err.to_string() }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io { code: "io_error".into(), message: err.to_string() }
    }
}
