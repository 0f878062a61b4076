pub mod dto;
pub mod handler;

pub use dto::S3Notification;
pub use handler::EventHandler;
