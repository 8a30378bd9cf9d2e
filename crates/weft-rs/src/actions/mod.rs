//! Prompt helpers built on the core combinators.
//!
//! - [`roles`]: [`system`], [`user`], [`assistant`] role scopes and
//!   [`block`] output scopes.
//! - [`generation`]: [`generate`] and [`ai`], which call the active completion
//!   function and record the result as an output.
//! - [`loops`]: [`loop_until`] and [`map`], repeating a body with per-iteration
//!   context.
//! - [`queue`]: [`wait`], which blocks on items pushed into the run state.

pub mod generation;
pub mod loops;
pub mod queue;
pub mod roles;

pub use generation::{GenOptions, ai, generate};
pub use loops::{LoopOptions, UntilFn, loop_until, map};
pub use queue::wait;
pub use roles::{assistant, block, system, user};
