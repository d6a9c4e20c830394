//! Cooperative cancellation.
//!
//! [`CancellationToken`] links parent and child tokens so that cancelling an
//! execution reaches every nested strategy, while a timeout that cancels its
//! own child token never leaks upward.

mod token;

pub use token::CancellationToken;
