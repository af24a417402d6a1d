//! Analysis Layer
//!
//! Interprets recognized text against the accepted code grammar.

pub mod grammar;

pub use grammar::{strip_whitespace, CodeValidator, ExtractedCode};
