//! Sessions with external RunMat engine processes.
//!
//! A [`Session`] owns one engine process, moves variables in and out of its
//! workspace and evaluates code there. Named sessions live in a
//! [`SessionRegistry`]; the [`default`] module keeps one process-wide
//! session for quick scripting.

pub mod channel;
pub mod config;
pub mod default;
pub mod error;
pub mod registry;
pub mod session;
pub mod store;

pub use channel::{Channel, ChannelError, ProcessChannel};
pub use config::{ConfigLoader, EngineConfig, DEFAULT_ENGINE_COMMAND};
pub use default::{
    call_function, close_default_session, configure_default_session, default_session,
    eval_string, get_converted, get_variable, put_variable, restart_default_session,
    DEFAULT_SESSION_NAME,
};
pub use error::{EngineError, Result};
pub use registry::SessionRegistry;
pub use session::{EngineInfo, Session, SessionState};
pub use store::{copy_variables, MemoryStore, VariableStore};
