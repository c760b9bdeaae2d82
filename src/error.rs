//! ==============================================================================
//! error.rs - node failure taxonomy
//! ==============================================================================
//!
//! purpose:
//!     typed errors for the things the node itself can get wrong.
//!     collaborator plumbing (hal subprocesses, http, display) stays on anyhow
//!     and is handled where the node decides what to do with it.
//!
//! ==============================================================================

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    /// the conditioner was handed an empty soil sample set
    #[error("no soil samples to average")]
    NoSamples,

    /// every read in a sampling burst failed
    #[error("sensor error: {0}")]
    Sensor(String),

    /// configuration rejected by validation
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, NodeError>;
