pub mod conversion;
pub mod events;
pub mod pipeline;
