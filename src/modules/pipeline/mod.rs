pub mod error;
pub mod model;
pub mod service;

pub use error::PipelineError;
pub use model::{PipelineOutcome, WorkItem};
pub use service::{Pipeline, PipelineSettings};
