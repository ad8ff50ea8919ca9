//! Ambient CLI surface for the `ragzip` binary — out of spec.md's scope for
//! the *format*, kept thin per §1 Non-goals, built the way the teacher's own
//! `cli` module is: a display-level global plus a hand-rolled argument loop.

pub mod args;
pub mod constants;

pub use args::{parse_args, parse_args_from, OpMode, ParsedArgs};
