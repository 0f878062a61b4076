pub mod archive;
pub mod harness;
pub mod model;
pub mod process;
pub mod request;

pub use harness::{Converter, ConverterHarness, HarnessSettings};
pub use model::{ConversionResult, FailureReason};
