//! Backend bridge: command types and the worker thread that executes them.

pub mod commands;
pub mod runtime;
