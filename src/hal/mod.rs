// src/hal/mod.rs
//! Hardware Abstraction Layer for analog input devices

pub mod traits;
pub mod types;
pub mod simulator;

#[cfg(test)]
mod tests;

pub use traits::*;
pub use types::*;
