//! The reference RunMat engine process.
//!
//! A small MATLAB interpreter that owns a workspace and answers the engine
//! protocol on stdin/stdout. Display output goes to stderr unless a request
//! asks for it to be captured.

pub mod array;
pub mod builtins;
pub mod display;
pub mod engine;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod ops;
pub mod parser;
pub mod printf;
pub mod server;

pub use engine::{Engine, Reply, ENGINE_NAME};
pub use error::{EvalError, EvalResult};
pub use interp::Interpreter;
pub use server::{serve, Shutdown};
