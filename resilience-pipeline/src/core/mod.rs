//! Core types shared by every strategy.

mod outcome;

pub use outcome::Outcome;
