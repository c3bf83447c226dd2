//! Request handling for one engine process.

use log::{debug, info};
use runmat_engine_protocol::{ErrorKind, Request, Response, WireArray, PROTOCOL_VERSION};
use runmat_mx::{is_valid_identifier, MxArray};

use crate::error::EvalError;
use crate::interp::{Interpreter, EXIT_REQUESTED};

pub const ENGINE_NAME: &str = "runmat-engine-worker";

/// What the server loop does after a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Send(Response),
    /// Send the response, then stop reading requests
    Last(Response),
    /// Leave the process immediately without answering
    Exit(i32),
}

#[derive(Debug)]
pub struct Engine {
    name: String,
    interp: Interpreter,
}

impl Engine {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interp: Interpreter::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interp
    }

    /// The unsolicited greeting.
    pub fn ready(&self) -> Response {
        Response::Ready {
            engine: self.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: PROTOCOL_VERSION,
        }
    }

    pub fn handle(&mut self, request: Request) -> Reply {
        debug!("{}: {}", self.name, request.verb());
        match request {
            Request::Put { name, value } => Reply::Send(self.put(&name, value)),
            Request::Get { name } => Reply::Send(self.get(&name)),
            Request::Eval {
                code,
                capture_output,
            } => self.eval(&code, capture_output),
            Request::Clear { names } => {
                if names.is_empty() {
                    self.interp.clear_all();
                } else {
                    for name in &names {
                        self.interp.remove(name);
                    }
                }
                Reply::Send(Response::Ok)
            }
            Request::Who => Reply::Send(Response::Names {
                names: self.interp.names(),
            }),
            Request::Shutdown => {
                info!("{}: shutting down", self.name);
                Reply::Last(Response::Goodbye)
            }
        }
    }

    fn put(&mut self, name: &str, value: WireArray) -> Response {
        if !is_valid_identifier(name) {
            return Response::error(
                ErrorKind::InvalidRequest,
                "MATLAB:invalidVariableName",
                format!("'{name}' is not a valid variable name."),
            );
        }
        match MxArray::try_from(value) {
            Ok(array) => {
                self.interp.set(name, array);
                Response::Ok
            }
            Err(e) => Response::error(
                ErrorKind::InvalidRequest,
                "RunMat:malformedValue",
                e.to_string(),
            ),
        }
    }

    fn get(&self, name: &str) -> Response {
        match self.interp.get(name) {
            Some(array) => Response::Value {
                value: WireArray::from(array),
            },
            None => {
                let err = EvalError::undefined(name);
                Response::error(ErrorKind::UndefinedVariable, err.identifier, err.message)
            }
        }
    }

    fn eval(&mut self, code: &str, capture: bool) -> Reply {
        let (output, result) = self.interp.run(code, capture);
        match result {
            Ok(()) => Reply::Send(Response::Evaluated { output }),
            Err(err) if err.identifier == EXIT_REQUESTED => {
                let code = self.interp.exit_code().unwrap_or(0);
                info!("{}: exit({code}) requested", self.name);
                Reply::Exit(code)
            }
            Err(err) => {
                debug!("{}: {} ({})", self.name, err.message, err.identifier);
                Reply::Send(Response::Error {
                    kind: ErrorKind::Evaluation,
                    identifier: err.identifier,
                    message: err.message,
                    output,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(engine: &mut Engine, code: &str) -> Reply {
        engine.handle(Request::Eval {
            code: code.into(),
            capture_output: true,
        })
    }

    #[test]
    fn put_eval_get() {
        let mut engine = Engine::new("test");
        let put = engine.handle(Request::Put {
            name: "x".into(),
            value: WireArray::from(&MxArray::scalar(2.0)),
        });
        assert_eq!(put, Reply::Send(Response::Ok));
        assert_eq!(
            eval(&mut engine, "y = x * 3"),
            Reply::Send(Response::Evaluated {
                output: "y =\n\n     6\n\n".into()
            })
        );
        assert_eq!(
            engine.handle(Request::Get { name: "y".into() }),
            Reply::Send(Response::Value {
                value: WireArray::from(&MxArray::scalar(6.0))
            })
        );
        assert_eq!(
            engine.handle(Request::Who),
            Reply::Send(Response::Names {
                names: vec!["x".into(), "y".into()]
            })
        );
    }

    #[test]
    fn errors_are_classified() {
        let mut engine = Engine::new("test");
        match engine.handle(Request::Get { name: "nope".into() }) {
            Reply::Send(Response::Error { kind, identifier, .. }) => {
                assert_eq!(kind, ErrorKind::UndefinedVariable);
                assert_eq!(identifier, "MATLAB:UndefinedFunction");
            }
            other => panic!("unexpected {other:?}"),
        }
        match eval(&mut engine, "disp(1); undefinedFn(1, 2)") {
            Reply::Send(Response::Error {
                kind,
                identifier,
                message,
                output,
            }) => {
                assert_eq!(kind, ErrorKind::Evaluation);
                assert_eq!(identifier, "MATLAB:UndefinedFunction");
                assert!(message.contains("undefinedFn"));
                assert_eq!(output, "     1\n");
            }
            other => panic!("unexpected {other:?}"),
        }
        let bad_name = engine.handle(Request::Put {
            name: "1x".into(),
            value: WireArray::from(&MxArray::scalar(1.0)),
        });
        assert!(matches!(
            bad_name,
            Reply::Send(Response::Error {
                kind: ErrorKind::InvalidRequest,
                ..
            })
        ));
    }

    #[test]
    fn clear_shutdown_and_exit() {
        let mut engine = Engine::new("test");
        eval(&mut engine, "a = 1; b = 2; c = 3;");
        engine.handle(Request::Clear {
            names: vec!["b".into(), "missing".into()],
        });
        assert_eq!(engine.interpreter().names(), vec!["a", "c"]);
        engine.handle(Request::Clear { names: vec![] });
        assert!(engine.interpreter().names().is_empty());
        assert_eq!(eval(&mut engine, "exit(3)"), Reply::Exit(3));
        assert_eq!(engine.handle(Request::Shutdown), Reply::Last(Response::Goodbye));
    }
}
