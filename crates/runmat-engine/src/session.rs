//! Sessions with an engine process.

use log::{debug, info, trace, warn};
use runmat_engine_protocol::{
    decode_line, encode_line, Envelope, ErrorKind, Request, Response, ResponseEnvelope,
    WireArray, PROTOCOL_VERSION,
};
use runmat_mx::{
    is_valid_identifier, to_default, ForeignAllocator, ForeignValue, HostValue, MxArray, MxResult,
    ToForeign,
};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

use crate::channel::{Channel, ProcessChannel};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// Time a closing engine gets to say goodbye and exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Ready,
    Evaluating,
    /// A channel failure happened; permanent
    Broken,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Starting => "starting",
            SessionState::Ready => "ready",
            SessionState::Evaluating => "evaluating",
            SessionState::Broken => "broken",
            SessionState::Closed => "closed",
        })
    }
}

/// What the engine reported in its `ready` greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInfo {
    pub engine: String,
    pub version: String,
    pub protocol_version: u32,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn channel_failure(context: &str, err: impl fmt::Display) -> EngineError {
    EngineError::Channel(format!("{context}: {err}"))
}

fn validate_name(name: &str) -> Result<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(EngineError::InvalidArgument(format!(
            "'{name}' is not a valid variable name"
        )))
    }
}

/// Function names may be package-qualified (`pkg.fn`).
fn validate_function_name(name: &str) -> Result<()> {
    if !name.is_empty() && name.split('.').all(is_valid_identifier) {
        Ok(())
    } else {
        Err(EngineError::InvalidArgument(format!(
            "'{name}' is not a valid function name"
        )))
    }
}

/// Source for `[o1, o2] = f(a1, a2);`.
fn call_source(function: &str, args: &[String], outputs: &[String]) -> String {
    let call = format!("{function}({})", args.join(", "));
    match outputs.len() {
        0 => format!("{call};"),
        1 => format!("{} = {call};", outputs[0]),
        _ => format!("[{}] = {call};", outputs.join(", ")),
    }
}

/// A live connection to one engine process and its workspace.
///
/// All traffic goes through one channel lock, so requests from different
/// threads never interleave. While an evaluation runs, other callers fail
/// fast with [`EngineError::SessionState`] instead of queueing behind it.
pub struct Session {
    id: String,
    config: EngineConfig,
    engine: EngineInfo,
    description: String,
    link: Mutex<Option<Box<dyn Channel>>>,
    state: Mutex<SessionState>,
}

impl Session {
    /// Start the configured engine process and wait for its greeting.
    pub fn open(config: EngineConfig) -> Result<Self> {
        let channel = ProcessChannel::spawn(&config).map_err(|e| {
            EngineError::SessionStart(format!("cannot run {}: {e}", config.command.display()))
        })?;
        Self::with_channel(config, channel)
    }

    /// Handshake over an already established channel.
    pub fn with_channel(config: EngineConfig, channel: impl Channel + 'static) -> Result<Self> {
        let mut channel: Box<dyn Channel> = Box::new(channel);
        let description = channel.describe();
        let engine = match Self::handshake(&mut *channel, config.startup_timeout()) {
            Ok(info) => info,
            Err(e) => {
                channel.terminate(Duration::ZERO);
                return Err(e);
            }
        };
        let session = Session {
            id: Uuid::new_v4().to_string(),
            config,
            engine,
            description,
            link: Mutex::new(Some(channel)),
            state: Mutex::new(SessionState::Ready),
        };
        info!(
            "session {} ready: {} {} on {}",
            session.id, session.engine.engine, session.engine.version, session.description
        );
        Ok(session)
    }

    fn handshake(channel: &mut dyn Channel, timeout: Duration) -> Result<EngineInfo> {
        let line = channel
            .recv(Some(timeout))
            .map_err(|e| EngineError::SessionStart(format!("no ready message: {e}")))?;
        let greeting: ResponseEnvelope = decode_line(&line)
            .map_err(|e| EngineError::SessionStart(format!("bad ready message: {e}")))?;
        match greeting.body {
            Response::Ready {
                engine,
                version,
                protocol_version,
            } if protocol_version == PROTOCOL_VERSION => Ok(EngineInfo {
                engine,
                version,
                protocol_version,
            }),
            Response::Ready {
                protocol_version, ..
            } => Err(EngineError::SessionStart(format!(
                "engine speaks protocol {protocol_version}, expected {PROTOCOL_VERSION}"
            ))),
            other => Err(EngineError::SessionStart(format!(
                "expected a ready message, got {}",
                other.verb()
            ))),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    pub fn engine_info(&self) -> &EngineInfo {
        &self.engine
    }

    /// Description of the underlying channel.
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn capture_output(&self) -> bool {
        self.config.capture_output
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.config.request_timeout()
    }

    fn state_error(&self, state: SessionState, operation: &'static str) -> EngineError {
        match state {
            SessionState::Broken => EngineError::SessionBroken(self.id.clone()),
            state => EngineError::SessionState { state, operation },
        }
    }

    /// Run `f` with exclusive use of the channel.
    ///
    /// `busy` operations are visible as `Evaluating` while they run. A
    /// channel failure breaks the session for good and stops the engine.
    fn with_link<T>(
        &self,
        operation: &'static str,
        busy: bool,
        f: impl FnOnce(&mut dyn Channel) -> Result<T>,
    ) -> Result<T> {
        // Fail fast instead of queueing behind a running evaluation.
        let seen = self.state();
        if seen != SessionState::Ready {
            return Err(self.state_error(seen, operation));
        }

        let mut link = lock(&self.link);
        {
            let mut state = lock(&self.state);
            if *state != SessionState::Ready {
                return Err(self.state_error(*state, operation));
            }
            if busy {
                *state = SessionState::Evaluating;
            }
        }

        let result = match link.as_mut() {
            Some(channel) => f(&mut **channel),
            None => Err(EngineError::Channel("engine link is gone".into())),
        };

        let mut state = lock(&self.state);
        match &result {
            Err(EngineError::Channel(reason)) => {
                warn!("session {} broken during {operation}: {reason}", self.id);
                *state = SessionState::Broken;
                if let Some(mut channel) = link.take() {
                    channel.terminate(Duration::ZERO);
                }
            }
            _ if busy && *state == SessionState::Evaluating => *state = SessionState::Ready,
            _ => {}
        }
        result
    }

    /// One request/response exchange.
    fn exchange(&self, channel: &mut dyn Channel, request: Request) -> Result<Response> {
        let verb = request.verb();
        let envelope = Envelope::new(request);
        let line = encode_line(&envelope)?;
        debug!("session {} -> {verb} ({})", self.id, envelope.id);
        channel
            .send(&line)
            .map_err(|e| channel_failure("send failed", e))?;
        let reply_line = channel
            .recv(self.config.request_timeout())
            .map_err(|e| channel_failure("receive failed", e))?;
        let reply: ResponseEnvelope =
            decode_line(&reply_line).map_err(|e| channel_failure("malformed reply", e))?;
        if !reply.answers(&envelope) {
            return Err(channel_failure(
                "out-of-sequence reply",
                format!("{:?} does not answer {}", reply.parent_id, envelope.id),
            ));
        }
        trace!("session {} <- {}", self.id, reply.body.verb());
        Ok(reply.body)
    }

    fn unexpected(expected: &str, got: &Response) -> EngineError {
        channel_failure(
            "unexpected reply",
            format!("expected {expected}, got {}", got.verb()),
        )
    }

    /// Map an engine `error` reply.
    fn engine_error(name: Option<&str>, response: Response) -> EngineError {
        match response {
            Response::Error {
                kind: ErrorKind::UndefinedVariable,
                message,
                ..
            } => EngineError::UndefinedVariable(name.map(str::to_string).unwrap_or(message)),
            Response::Error {
                kind: ErrorKind::Evaluation,
                identifier,
                message,
                output,
            } => EngineError::Evaluation {
                identifier,
                message,
                output,
            },
            Response::Error {
                kind: ErrorKind::InvalidRequest,
                message,
                ..
            } => EngineError::InvalidArgument(message),
            other => Self::unexpected("an error", &other),
        }
    }

    fn request_put(&self, channel: &mut dyn Channel, name: &str, value: WireArray) -> Result<()> {
        let request = Request::Put {
            name: name.to_string(),
            value,
        };
        match self.exchange(channel, request)? {
            Response::Ok => Ok(()),
            err @ Response::Error { .. } => Err(Self::engine_error(Some(name), err)),
            other => Err(Self::unexpected("ok", &other)),
        }
    }

    fn request_get(&self, channel: &mut dyn Channel, name: &str) -> Result<MxArray> {
        match self.exchange(channel, Request::Get { name: name.to_string() })? {
            Response::Value { value } => {
                MxArray::try_from(value).map_err(|e| channel_failure("malformed value", e))
            }
            err @ Response::Error { .. } => Err(Self::engine_error(Some(name), err)),
            other => Err(Self::unexpected("value", &other)),
        }
    }

    fn request_eval(&self, channel: &mut dyn Channel, code: &str) -> Result<String> {
        let request = Request::Eval {
            code: code.to_string(),
            capture_output: self.config.capture_output,
        };
        match self.exchange(channel, request)? {
            Response::Evaluated { output } => Ok(output),
            err @ Response::Error { .. } => Err(Self::engine_error(None, err)),
            other => Err(Self::unexpected("evaluated", &other)),
        }
    }

    fn request_clear(&self, channel: &mut dyn Channel, names: Vec<String>) -> Result<()> {
        match self.exchange(channel, Request::Clear { names })? {
            Response::Ok => Ok(()),
            err @ Response::Error { .. } => Err(Self::engine_error(None, err)),
            other => Err(Self::unexpected("ok", &other)),
        }
    }

    /// Copy a host-owned value into the workspace as `name`. On success the
    /// value becomes session-owned and its host memory is freed.
    pub fn put_value(&self, name: &str, value: &mut ForeignValue) -> Result<()> {
        validate_name(name)?;
        let wire = WireArray::from(value.array()?);
        self.with_link("put", false, |channel| self.request_put(channel, name, wire))?;
        value.transfer_to_session()?;
        Ok(())
    }

    /// Convert `value` and store it as `name`.
    pub fn put(&self, name: &str, value: &(impl ToForeign + ?Sized)) -> Result<()> {
        validate_name(name)?;
        let mut foreign = value.to_foreign()?;
        self.put_value(name, &mut foreign)
    }

    /// Fresh host-owned copy of a workspace variable.
    pub fn get_value(&self, name: &str) -> Result<ForeignValue> {
        self.get_value_in(name, ForeignAllocator::global())
    }

    /// Like [`get_value`](Self::get_value), charging `allocator`.
    pub fn get_value_in(&self, name: &str, allocator: &ForeignAllocator) -> Result<ForeignValue> {
        validate_name(name)?;
        let array = self.with_link("get", false, |channel| self.request_get(channel, name))?;
        Ok(allocator.adopt(array)?)
    }

    /// Workspace variable converted with [`to_default`].
    pub fn get_converted(&self, name: &str) -> Result<HostValue> {
        let mut value = self.get_value(name)?;
        let converted = to_default(&value)?;
        value.release()?;
        Ok(converted)
    }

    /// Evaluate MATLAB source. Returns the display output when capture is
    /// on, otherwise an empty string.
    pub fn evaluate(&self, code: &str) -> Result<String> {
        self.with_link("evaluate", true, |channel| self.request_eval(channel, code))
    }

    /// Call `function` with `args` and return `num_outputs` converted
    /// results.
    pub fn call_function(
        &self,
        function: &str,
        num_outputs: usize,
        args: &[HostValue],
    ) -> Result<Vec<HostValue>> {
        let values = self.call_function_values(function, num_outputs, args)?;
        values
            .into_iter()
            .map(|mut value| {
                let converted = to_default(&value)?;
                value.release()?;
                Ok(converted)
            })
            .collect()
    }

    /// Call `function` and return its outputs as foreign values.
    ///
    /// Arguments and outputs pass through uniquely named temporaries that
    /// are cleared afterwards, also when the call fails.
    pub fn call_function_values(
        &self,
        function: &str,
        num_outputs: usize,
        args: &[HostValue],
    ) -> Result<Vec<ForeignValue>> {
        validate_function_name(function)?;
        let arrays = args
            .iter()
            .map(ToForeign::to_mx_array)
            .collect::<MxResult<Vec<_>>>()?;
        let simple = Uuid::new_v4().simple().to_string();
        let tag = &simple[..8];
        let arg_names: Vec<String> = (0..arrays.len()).map(|i| format!("rmarg_{tag}_{i}")).collect();
        let out_names: Vec<String> = (0..num_outputs).map(|i| format!("rmout_{tag}_{i}")).collect();
        let code = call_source(function, &arg_names, &out_names);

        let outputs = self.with_link("call_function", true, |channel| {
            let result = self.run_call(channel, &arrays, &arg_names, &code, &out_names);
            if matches!(result, Err(EngineError::Channel(_))) {
                return result;
            }
            let temporaries: Vec<String> = arg_names.iter().chain(&out_names).cloned().collect();
            if !temporaries.is_empty() {
                match self.request_clear(channel, temporaries) {
                    Err(e @ EngineError::Channel(_)) => return Err(e),
                    Err(e) => warn!("could not clear call temporaries: {e}"),
                    Ok(()) => {}
                }
            }
            result
        })?;

        let allocator = ForeignAllocator::global();
        outputs
            .into_iter()
            .map(|array| Ok(allocator.adopt(array)?))
            .collect()
    }

    fn run_call(
        &self,
        channel: &mut dyn Channel,
        arrays: &[MxArray],
        arg_names: &[String],
        code: &str,
        out_names: &[String],
    ) -> Result<Vec<MxArray>> {
        for (name, array) in arg_names.iter().zip(arrays) {
            self.request_put(channel, name, WireArray::from(array))?;
        }
        self.request_eval(channel, code)?;
        out_names
            .iter()
            .map(|name| self.request_get(channel, name))
            .collect()
    }

    /// Names of all workspace variables, sorted.
    pub fn variable_names(&self) -> Result<Vec<String>> {
        self.with_link("list variables", false, |channel| {
            match self.exchange(channel, Request::Who)? {
                Response::Names { mut names } => {
                    names.sort();
                    Ok(names)
                }
                err @ Response::Error { .. } => Err(Self::engine_error(None, err)),
                other => Err(Self::unexpected("names", &other)),
            }
        })
    }

    /// Remove the named variables; names that do not exist are ignored.
    pub fn clear(&self, names: &[&str]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        for name in names {
            validate_name(name)?;
        }
        let names = names.iter().map(|n| n.to_string()).collect();
        self.with_link("clear", false, |channel| self.request_clear(channel, names))
    }

    /// Empty the workspace.
    pub fn clear_all(&self) -> Result<()> {
        self.with_link("clear", false, |channel| self.request_clear(channel, Vec::new()))
    }

    /// Shut the engine down. Safe to call repeatedly.
    pub fn close(&self) -> Result<()> {
        let mut link = lock(&self.link);
        let previous = {
            let mut state = lock(&self.state);
            std::mem::replace(&mut *state, SessionState::Closed)
        };
        if previous == SessionState::Closed {
            return Ok(());
        }
        if let Some(mut channel) = link.take() {
            if previous == SessionState::Ready {
                let goodbye = Envelope::new(Request::Shutdown);
                let said_goodbye = encode_line(&goodbye)
                    .ok()
                    .and_then(|line| channel.send(&line).ok())
                    .and_then(|_| channel.recv(Some(SHUTDOWN_GRACE)).ok())
                    .and_then(|line| decode_line::<ResponseEnvelope>(&line).ok())
                    .is_some_and(|reply| reply.body == Response::Goodbye);
                if !said_goodbye {
                    debug!("session {} engine did not acknowledge shutdown", self.id);
                }
            }
            channel.terminate(SHUTDOWN_GRACE);
        }
        info!("session {} closed", self.id);
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("session {} did not close cleanly: {e}", self.id);
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("engine", &self.engine)
            .field("channel", &self.description)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::channel::ChannelError;
    use runmat_engine_protocol::RequestEnvelope;
    use runmat_mx::{to_scalar, ElementType, Ownership, Scalar};
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Arc;

    /// In-process engine double: a tiny workspace that only evaluates
    /// `name = number;`, plus scripted faults.
    #[derive(Default)]
    pub(crate) struct FakeEngine {
        workspace: BTreeMap<String, WireArray>,
        pending: VecDeque<String>,
        pub(crate) log: Arc<Mutex<Vec<String>>>,
        pub(crate) hang_on_eval: bool,
        pub(crate) reply_to_wrong_id: bool,
        pub(crate) terminated: Arc<Mutex<bool>>,
    }

    impl FakeEngine {
        pub(crate) fn new() -> Self {
            let mut engine = FakeEngine::default();
            engine.push(Envelope::new(Response::Ready {
                engine: "fake".into(),
                version: "0".into(),
                protocol_version: PROTOCOL_VERSION,
            }));
            engine
        }

        fn push(&mut self, reply: ResponseEnvelope) {
            self.pending.push_back(encode_line(&reply).unwrap());
        }

        fn handle(&mut self, request: &Request) -> Option<Response> {
            Some(match request {
                Request::Put { name, value } => {
                    self.workspace.insert(name.clone(), value.clone());
                    Response::Ok
                }
                Request::Get { name } => match self.workspace.get(name) {
                    Some(value) => Response::Value { value: value.clone() },
                    None => Response::error(
                        ErrorKind::UndefinedVariable,
                        "MATLAB:UndefinedFunction",
                        format!("Undefined function or variable '{name}'."),
                    ),
                },
                Request::Eval { .. } if self.hang_on_eval => return None,
                Request::Eval { code, .. } => {
                    let statement = code.trim().trim_end_matches(';');
                    let parsed = statement
                        .split_once('=')
                        .and_then(|(l, r)| Some((l.trim(), r.trim().parse::<f64>().ok()?)));
                    match parsed {
                        Some((name, value)) => {
                            let wire = WireArray::from(&MxArray::scalar(value));
                            self.workspace.insert(name.to_string(), wire);
                            Response::Evaluated {
                                output: format!("{name} = {value}\n"),
                            }
                        }
                        None => Response::Error {
                            kind: ErrorKind::Evaluation,
                            identifier: "MATLAB:UndefinedFunction".into(),
                            message: format!("cannot evaluate '{statement}'"),
                            output: String::new(),
                        },
                    }
                }
                Request::Clear { names } if names.is_empty() => {
                    self.workspace.clear();
                    Response::Ok
                }
                Request::Clear { names } => {
                    for name in names {
                        self.workspace.remove(name);
                    }
                    Response::Ok
                }
                Request::Who => Response::Names {
                    names: self.workspace.keys().cloned().collect(),
                },
                Request::Shutdown => Response::Goodbye,
            })
        }
    }

    impl Channel for FakeEngine {
        fn send(&mut self, line: &str) -> std::result::Result<(), ChannelError> {
            let request: RequestEnvelope = decode_line(line).unwrap();
            lock(&self.log).push(request.body.verb().to_string());
            if let Some(body) = self.handle(&request.body) {
                let mut reply = Envelope::reply(&request, body);
                if self.reply_to_wrong_id {
                    reply.parent_id = Some("somebody-else".into());
                }
                self.push(reply);
            }
            Ok(())
        }

        fn recv(&mut self, timeout: Option<Duration>) -> std::result::Result<String, ChannelError> {
            self.pending
                .pop_front()
                .ok_or(ChannelError::TimedOut(timeout.unwrap_or_default()))
        }

        fn terminate(&mut self, _grace: Duration) {
            *lock(&self.terminated) = true;
        }

        fn describe(&self) -> String {
            "fake engine".into()
        }
    }

    fn session_with(engine: FakeEngine) -> Session {
        Session::with_channel(EngineConfig::default(), engine).unwrap()
    }

    #[test]
    fn put_transfers_ownership() {
        let session = session_with(FakeEngine::new());
        let mut value = ForeignValue::create(ElementType::Float64, &[2, 2]).unwrap();
        session.put_value("a", &mut value).unwrap();
        assert_eq!(value.ownership(), Ownership::SessionOwned);
        assert!(matches!(
            session.put_value("b", &mut value),
            Err(EngineError::Mx(_))
        ));

        let back = session.get_value("a").unwrap();
        assert_eq!(back.ownership(), Ownership::HostOwned);
        assert_eq!(back.shape().unwrap(), &[2, 2]);
        assert_eq!(session.variable_names().unwrap(), vec!["a"]);
    }

    #[test]
    fn invalid_names_are_rejected_before_any_traffic() {
        let engine = FakeEngine::new();
        let log = engine.log.clone();
        let session = session_with(engine);
        assert!(matches!(
            session.put("1x", &1.0f64),
            Err(EngineError::InvalidArgument(_))
        ));
        assert!(matches!(
            session.get_value("has space"),
            Err(EngineError::InvalidArgument(_))
        ));
        assert!(lock(&log).is_empty());
    }

    #[test]
    fn undefined_variable_keeps_session_ready() {
        let session = session_with(FakeEngine::new());
        match session.get_value("nope") {
            Err(EngineError::UndefinedVariable(name)) => assert_eq!(name, "nope"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[test]
    fn evaluation_error_keeps_session_ready() {
        let session = session_with(FakeEngine::new());
        let err = session.evaluate("undefinedFn(1,2)").unwrap_err();
        assert_eq!(err.identifier(), Some("MATLAB:UndefinedFunction"));
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.evaluate("x = 3;").unwrap(), "x = 3\n");
        assert_eq!(
            to_scalar(&session.get_value("x").unwrap()).unwrap(),
            Scalar::Float64(3.0)
        );
    }

    #[test]
    fn timeout_breaks_the_session() {
        let mut engine = FakeEngine::new();
        engine.hang_on_eval = true;
        let terminated = engine.terminated.clone();
        let session = session_with(engine);
        assert!(matches!(
            session.evaluate("pause(10)"),
            Err(EngineError::Channel(_))
        ));
        assert_eq!(session.state(), SessionState::Broken);
        assert!(*lock(&terminated));
        assert!(matches!(
            session.variable_names(),
            Err(EngineError::SessionBroken(_))
        ));
        session.close().unwrap();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn out_of_sequence_reply_is_a_channel_failure() {
        let mut engine = FakeEngine::new();
        engine.reply_to_wrong_id = true;
        let session = session_with(engine);
        assert!(matches!(session.clear_all(), Err(EngineError::Channel(_))));
        assert_eq!(session.state(), SessionState::Broken);
    }

    #[test]
    fn evaluating_state_rejects_other_callers() {
        let session = session_with(FakeEngine::new());
        *lock(&session.state) = SessionState::Evaluating;
        match session.put("y", &2.0f64) {
            Err(EngineError::SessionState { state, .. }) => {
                assert_eq!(state, SessionState::Evaluating)
            }
            other => panic!("unexpected {other:?}"),
        }
        *lock(&session.state) = SessionState::Ready;
        session.put("y", &2.0f64).unwrap();
    }

    #[test]
    fn call_clears_temporaries_even_on_failure() {
        let engine = FakeEngine::new();
        let log = engine.log.clone();
        let session = session_with(engine);
        let err = session
            .call_function("unknownFunction", 1, &[HostValue::from(1.0)])
            .unwrap_err();
        assert!(matches!(err, EngineError::Evaluation { .. }));
        assert_eq!(
            *lock(&log),
            vec!["put".to_string(), "eval".into(), "clear".into()]
        );
        assert!(session.variable_names().unwrap().is_empty());
    }

    #[test]
    fn close_is_idempotent() {
        let engine = FakeEngine::new();
        let log = engine.log.clone();
        let session = session_with(engine);
        session.close().unwrap();
        session.close().unwrap();
        assert_eq!(*lock(&log), vec!["shutdown".to_string()]);
        assert!(matches!(
            session.evaluate("x = 1;"),
            Err(EngineError::SessionState {
                state: SessionState::Closed,
                ..
            })
        ));
    }

    #[test]
    fn handshake_requires_ready() {
        let mut engine = FakeEngine::default();
        engine.push(Envelope::new(Response::Ok));
        assert!(matches!(
            Session::with_channel(EngineConfig::default(), engine),
            Err(EngineError::SessionStart(_))
        ));
        assert!(matches!(
            Session::open(EngineConfig::new("/definitely/not/an/engine")),
            Err(EngineError::SessionStart(_))
        ));
    }

    #[test]
    fn call_source_shapes() {
        let a = vec!["a".to_string(), "b".to_string()];
        let o = vec!["x".to_string(), "y".to_string()];
        assert_eq!(call_source("f", &a, &o), "[x, y] = f(a, b);");
        assert_eq!(call_source("f", &a, &o[..1]), "x = f(a, b);");
        assert_eq!(call_source("f", &[], &[]), "f();");
        assert!(validate_function_name("pkg.fn").is_ok());
        assert!(validate_function_name("bad name").is_err());
    }
}
