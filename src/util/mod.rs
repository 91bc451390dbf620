//! File system and text helpers shared by the operation layer.

pub mod atomic;
pub mod diff;
pub mod fs;
