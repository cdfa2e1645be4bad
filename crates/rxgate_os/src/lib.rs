#![forbid(unsafe_code)]

mod correlation;
pub mod gate;
pub mod verify;
