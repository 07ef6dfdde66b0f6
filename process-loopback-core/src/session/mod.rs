pub mod drain;
pub mod engine;
