pub mod job;
pub mod preset;
