use std::path::PathBuf;

use thiserror::Error;

use crate::target::Target;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, BenchError>;

/// Everything that can stop a benchmark run.
///
/// All variants are fatal: the engine never retries and never continues the
/// traversal past one of them. Per-item anomalies (non-200 statuses, invalid
/// bodies, missing profiling samples) are folded into the statistics instead.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("invalid selection '{0}': expected module/name, module/* or *")]
    InvalidSelection(String),

    #[error("the '{0}' module doesn't exist")]
    ModuleNotFound(String),

    #[error("the '{name}' widget doesn't exist in module '{module}'")]
    WidgetNotFound { module: String, name: String },

    #[error("the '{0}' layout doesn't exist")]
    LayoutNotFound(String),

    #[error("authentication failed{}: {message}", at(.target))]
    Authentication {
        target: Option<Target>,
        message: String,
    },

    #[error("request to {url} failed{}: {message}", at(.target))]
    Transport {
        target: Option<Target>,
        url: String,
        message: String,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("cannot read layout '{layout}': {message}")]
    Layout { layout: String, message: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write report: {0}")]
    Output(#[from] std::io::Error),
}

fn at(target: &Option<Target>) -> String {
    target
        .as_ref()
        .map(|t| format!(" at {t}"))
        .unwrap_or_default()
}

impl BenchError {
    pub fn config(msg: impl Into<String>) -> Self {
        BenchError::Configuration(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        BenchError::Authentication {
            target: None,
            message: msg.into(),
        }
    }

    pub fn transport(url: impl Into<String>, err: impl std::fmt::Display) -> Self {
        BenchError::Transport {
            target: None,
            url: url.into(),
            message: err.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BenchError::Io {
            path: path.into(),
            source,
        }
    }

    /// Attach the target being measured when the error came from one of its
    /// exchanges. Errors that already name a target keep it.
    pub fn at_target(mut self, current: &Target) -> Self {
        match &mut self {
            BenchError::Authentication { target, .. } | BenchError::Transport { target, .. } => {
                if target.is_none() {
                    *target = Some(current.clone());
                }
            }
            _ => {}
        }
        self
    }

    /// True for the module / widget / layout lookup failures.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BenchError::ModuleNotFound(_)
                | BenchError::WidgetNotFound { .. }
                | BenchError::LayoutNotFound(_)
        )
    }
}
