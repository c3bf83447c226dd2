//! The process-wide default session.
//!
//! Opened lazily on first use from the configuration set with
//! [`configure_default_session`], or from [`ConfigLoader::load`] when none
//! was set. It is registered in [`SessionRegistry::global`] under
//! [`DEFAULT_SESSION_NAME`].

use once_cell::sync::Lazy;
use runmat_mx::{ForeignValue, HostValue, ToForeign};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::{ConfigLoader, EngineConfig};
use crate::error::Result;
use crate::registry::SessionRegistry;
use crate::session::{Session, SessionState};

pub const DEFAULT_SESSION_NAME: &str = "default";

/// Serialises opening, restarting and closing the default session.
static DEFAULT_CONFIG: Lazy<Mutex<Option<EngineConfig>>> = Lazy::new(|| Mutex::new(None));

fn config_slot() -> MutexGuard<'static, Option<EngineConfig>> {
    DEFAULT_CONFIG.lock().unwrap_or_else(|e| e.into_inner())
}

fn open_default(slot: &Option<EngineConfig>) -> Result<Arc<Session>> {
    let config = match slot {
        Some(config) => config.clone(),
        None => ConfigLoader::load()?,
    };
    let session = Arc::new(Session::open(config)?);
    SessionRegistry::global().insert(DEFAULT_SESSION_NAME, session.clone())?;
    Ok(session)
}

/// Configuration used the next time the default session is opened. A
/// running default session is not affected until it is restarted.
pub fn configure_default_session(config: EngineConfig) {
    *config_slot() = Some(config);
}

/// The default session, opened on first use (and again after it was
/// closed). A broken default session is returned as is; restart it with
/// [`restart_default_session`].
pub fn default_session() -> Result<Arc<Session>> {
    let slot = config_slot();
    if let Some(session) = SessionRegistry::global().get(DEFAULT_SESSION_NAME) {
        if session.state() != SessionState::Closed {
            return Ok(session);
        }
    }
    open_default(&slot)
}

/// Close the default session and open a fresh one with an empty workspace.
pub fn restart_default_session() -> Result<Arc<Session>> {
    let slot = config_slot();
    SessionRegistry::global().close(DEFAULT_SESSION_NAME)?;
    open_default(&slot)
}

/// Close the default session; the next use reopens it.
pub fn close_default_session() -> Result<()> {
    let _slot = config_slot();
    SessionRegistry::global().close(DEFAULT_SESSION_NAME)?;
    Ok(())
}

/// Evaluate `code` in the default session.
pub fn eval_string(code: &str) -> Result<String> {
    default_session()?.evaluate(code)
}

/// Store `value` in the default session's workspace.
pub fn put_variable(name: &str, value: &(impl ToForeign + ?Sized)) -> Result<()> {
    default_session()?.put(name, value)
}

pub fn get_variable(name: &str) -> Result<ForeignValue> {
    default_session()?.get_value(name)
}

pub fn get_converted(name: &str) -> Result<HostValue> {
    default_session()?.get_converted(name)
}

/// Call `function` in the default session.
pub fn call_function(function: &str, num_outputs: usize, args: &[HostValue]) -> Result<Vec<HostValue>> {
    default_session()?.call_function(function, num_outputs, args)
}
