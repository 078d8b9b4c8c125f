#![forbid(unsafe_code)]

//! FlowMD parsing engine.
//!
//! Turns a FlowMD document (orientation line, node/edge statements,
//! `subgraph ... end` blocks, `%%` comments) into a [`fv_core::FlowGraph`].
//! Parsing is a single synchronous pass; cycle detection runs over the
//! finished adjacency and lands in the result's warning list.

mod cycle_detect;
mod flowmd_parser;
mod graph_builder;

pub use flowmd_parser::{ParseLimits, parse, parse_with_limits};
