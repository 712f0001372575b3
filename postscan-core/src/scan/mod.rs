pub mod orchestration;

pub use orchestration::*;
