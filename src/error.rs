use miette::Diagnostic;
use thiserror::Error;

use crate::model::ConfigKey;
use crate::provision::Stage;

#[derive(Debug, Error, Diagnostic)]
pub enum MinivirtError {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {message}")]
    ConfigParse { path: String, message: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// A config key has neither an override record nor a static default.
    #[error("no value for config key '{key}': not in overrides and no static default")]
    MissingConfigKey { key: ConfigKey },

    /// A template referenced an outer placeholder with no substitution.
    #[error("template references unknown placeholder '{{{placeholder}}}'")]
    Template { placeholder: String },

    /// An external provisioning command exited non-zero. `message` carries
    /// the last non-empty line of its combined output.
    #[error("provisioning failed at {stage} stage: {message}")]
    Provision { stage: Stage, message: String },
}
