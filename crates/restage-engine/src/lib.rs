//! Quality-gated generative room restaging.
//!
//! A [`Pipeline`] sends a room photo through a two-turn generative edit,
//! verifies the result against an ordered list of structural fidelity checks,
//! and retries with the accumulated failures as corrective context until a
//! candidate passes or the attempt budget runs out. The best candidate is
//! always returned.

pub mod aggregate;
pub mod cancel;
pub mod config;
pub mod error;
pub mod input;
pub mod mask;
pub mod orchestrator;
pub mod pipeline;
pub mod services;
pub mod transform;
pub mod verify;

pub use aggregate::PipelineResult;
pub use cancel::CancellationToken;
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use input::ImageInput;
pub use orchestrator::{Attempt, StopReason};
pub use pipeline::{Pipeline, PipelineRequest};
