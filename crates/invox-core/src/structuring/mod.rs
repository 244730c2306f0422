//! Prompt-driven structuring of raw invoice text.

mod coerce;
mod engine;
mod parser;
pub mod prompt;

pub use coerce::{parse_amount, parse_date};
pub use engine::StructuringEngine;
pub use parser::parse_reply;
