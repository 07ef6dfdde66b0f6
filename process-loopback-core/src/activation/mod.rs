pub mod activator;
pub mod completion;
