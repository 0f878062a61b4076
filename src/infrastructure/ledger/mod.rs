pub mod processed;
