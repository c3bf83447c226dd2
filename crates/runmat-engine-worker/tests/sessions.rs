use once_cell::sync::Lazy;
use runmat_engine::{
    call_function, close_default_session, configure_default_session, copy_variables,
    default_session, eval_string, get_variable, put_variable, restart_default_session,
    EngineConfig, EngineError, MemoryStore, Session, SessionState, VariableStore,
};
use runmat_mx::{HostArray, HostValue, IndexMap, Scalar};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// The default session is process-wide.
static DEFAULT_SESSION: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

fn worker() -> EngineConfig {
    EngineConfig::new(env!("CARGO_BIN_EXE_runmat-engine-worker"))
        .with_args(["--log-level", "warn"])
        .with_startup_timeout(Duration::from_secs(20))
}

fn open(config: EngineConfig) -> Session {
    Session::open(config).expect("worker starts")
}

#[test]
fn sessions_keep_separate_workspaces() {
    let a = open(worker().with_args(["--name", "left"]));
    let b = open(worker());
    assert_eq!(a.engine_info().engine, "left");
    assert_eq!(b.engine_info().engine, "runmat-engine-worker");

    a.put("x", &1.0f64).unwrap();
    b.put("x", &2.0f64).unwrap();
    a.evaluate("y = x + 10;").unwrap();

    assert_eq!(a.get_converted("x").unwrap().as_f64(), Some(1.0));
    assert_eq!(b.get_converted("x").unwrap().as_f64(), Some(2.0));
    assert_eq!(a.variable_names().unwrap(), vec!["x", "y"]);
    assert_eq!(b.variable_names().unwrap(), vec!["x"]);
    assert!(matches!(
        b.get_value("y"),
        Err(EngineError::UndefinedVariable(name)) if name == "y"
    ));
}

#[test]
fn evaluation_errors_keep_the_session_ready() {
    let session = open(worker());
    let err = session.evaluate("undefinedFn(1, 2)").unwrap_err();
    assert_eq!(err.identifier(), Some("MATLAB:UndefinedFunction"));
    assert_eq!(session.state(), SessionState::Ready);

    session.put("v", &3.0f64).unwrap();
    assert_eq!(session.get_converted("v").unwrap().as_f64(), Some(3.0));

    let err = session.evaluate("a = [1 2] + [1 2 3];").unwrap_err();
    assert!(matches!(err, EngineError::Evaluation { .. }), "{err}");
    assert_eq!(session.state(), SessionState::Ready);
}

#[test]
fn captured_output_is_returned() {
    let session = open(worker().with_capture_output(true));
    let output = session.evaluate("x = 5\ny = [1 2];\ndisp('done')").unwrap();
    assert_eq!(output, "x =\n\n     5\n\ndone\n");

    let quiet = open(worker());
    assert_eq!(quiet.evaluate("z = 7").unwrap(), "");
}

#[test]
fn meshgrid_call_leaves_no_temporaries() {
    let session = open(worker());
    let x = HostValue::Array(HostArray::vector(vec![1.0, 2.0, 3.0]));
    let y = HostValue::Array(HostArray::vector(vec![10.0, 20.0]));
    let outputs = session.call_function("meshgrid", 2, &[x, y]).unwrap();
    assert_eq!(outputs.len(), 2);
    for output in &outputs {
        let array = output.as_array().expect("array output");
        assert_eq!(array.shape(), &[2, 3]);
    }
    let xx = outputs[0].as_array().unwrap();
    assert_eq!(xx.get::<f64>(&[1, 2]), Some(3.0));
    let yy = outputs[1].as_array().unwrap();
    assert_eq!(yy.get::<f64>(&[1, 0]), Some(20.0));
    assert!(session.variable_names().unwrap().is_empty());

    let err = session
        .call_function("undefinedFn", 1, &[HostValue::Scalar(Scalar::Float64(1.0))])
        .unwrap_err();
    assert_eq!(err.identifier(), Some("MATLAB:UndefinedFunction"));
    assert!(session.variable_names().unwrap().is_empty());
}

#[test]
fn structs_round_trip() {
    let session = open(worker());
    let mut record = IndexMap::new();
    record.insert("a".to_string(), HostValue::Scalar(Scalar::Float64(1.0)));
    record.insert("b".to_string(), HostValue::String("x".into()));
    record.insert(
        "c".to_string(),
        HostValue::Array(HostArray::vector(vec![1.0, 2.0, 3.0])),
    );
    session.put("s", &record).unwrap();
    session.evaluate("n = numel(s.c); s.d = 'new';").unwrap();

    let back = session.get_converted("s").unwrap();
    let map = back.as_map().expect("struct comes back as a map");
    assert_eq!(map["a"].as_f64(), Some(1.0));
    assert_eq!(map["b"].as_str(), Some("x"));
    assert_eq!(map["c"].as_array().map(HostArray::len), Some(3));
    assert_eq!(map["d"].as_str(), Some("new"));
    assert_eq!(session.get_converted("n").unwrap().as_f64(), Some(3.0));
}

#[test]
fn oversized_arrays_keep_the_session_ready() {
    let session = open(worker());
    session.put("kept", &2.0f64).unwrap();
    for code in ["x = 1:1e20;", "x = ones(1e6, 1e6);", "x = zeros(1, 2^62);"] {
        let err = session.evaluate(code).unwrap_err();
        assert_eq!(
            err.identifier(),
            Some("MATLAB:array:SizeLimitExceeded"),
            "{code}: {err}"
        );
        assert_eq!(session.state(), SessionState::Ready);
    }
    assert_eq!(session.get_converted("kept").unwrap().as_f64(), Some(2.0));
    assert_eq!(session.variable_names().unwrap(), vec!["kept"]);
}

#[test]
fn separate_sessions_do_not_block_each_other() {
    let slow = Arc::new(open(worker()));
    let fast = open(worker());
    let started = Instant::now();
    let busy = {
        let slow = Arc::clone(&slow);
        thread::spawn(move || {
            slow.evaluate("pause(1.5); late = 1;")?;
            Ok::<_, EngineError>(started.elapsed())
        })
    };
    thread::sleep(Duration::from_millis(100));
    fast.put("early", &5.0f64).unwrap();
    fast.evaluate("early = early + 1;").unwrap();
    assert_eq!(fast.get_converted("early").unwrap().as_f64(), Some(6.0));
    let fast_done = started.elapsed();

    let slow_done = busy.join().unwrap().unwrap();
    assert!(fast_done < Duration::from_millis(1200), "{fast_done:?}");
    assert!(fast_done < slow_done);
    assert_eq!(slow.get_converted("late").unwrap().as_f64(), Some(1.0));
    assert_eq!(slow.variable_names().unwrap(), vec!["late"]);
    assert_eq!(fast.variable_names().unwrap(), vec!["early"]);
}

#[test]
fn workspace_snapshot_restores_into_a_new_session() {
    let first = open(worker());
    first
        .evaluate("m = [1 2; 3 4]; s.name = 'grid'; c = {1, 'a'};")
        .unwrap();
    let snapshot = MemoryStore::new();
    copy_variables(&first, &snapshot, &[]).unwrap();
    first.close().unwrap();
    assert_eq!(snapshot.variable_names().unwrap(), vec!["c", "m", "s"]);

    let second = open(worker());
    copy_variables(&snapshot, &second, &["m", "s"]).unwrap();
    second.evaluate("t = sum(m(:));").unwrap();
    assert_eq!(second.get_converted("t").unwrap().as_f64(), Some(10.0));
    let s = second.get_converted("s").unwrap();
    assert_eq!(s.as_map().unwrap()["name"].as_str(), Some("grid"));
    assert_eq!(second.variable_names().unwrap(), vec!["m", "s", "t"]);
}

#[test]
fn exit_breaks_the_session() {
    let session = open(worker());
    let err = session.evaluate("exit").unwrap_err();
    assert!(matches!(err, EngineError::Channel(_)), "{err}");
    assert_eq!(session.state(), SessionState::Broken);
    assert!(matches!(
        session.get_value("x"),
        Err(EngineError::SessionBroken(_))
    ));
    session.close().unwrap();
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn request_timeout_breaks_the_session() {
    let session = open(worker().with_request_timeout(Some(Duration::from_millis(300))));
    let err = session.evaluate("pause(30)").unwrap_err();
    assert!(matches!(err, EngineError::Channel(_)), "{err}");
    assert_eq!(session.state(), SessionState::Broken);
}

#[test]
fn concurrent_callers_fail_fast_during_evaluation() {
    let session = Arc::new(open(worker()));
    let busy = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.evaluate("pause(1.5); done = 1;"))
    };
    thread::sleep(Duration::from_millis(300));
    let err = session.put("other", &1.0f64).unwrap_err();
    assert!(
        matches!(
            err,
            EngineError::SessionState {
                state: SessionState::Evaluating,
                ..
            }
        ),
        "{err}"
    );
    busy.join().unwrap().unwrap();
    assert_eq!(session.get_converted("done").unwrap().as_f64(), Some(1.0));
}

#[test]
fn default_session_restart_and_close_empty_the_workspace() {
    let _guard = DEFAULT_SESSION.lock().unwrap_or_else(|e| e.into_inner());
    configure_default_session(worker());

    put_variable("kept", &4.0f64).unwrap();
    eval_string("twice = kept * 2;").unwrap();
    let mut twice = get_variable("twice").unwrap();
    assert_eq!(runmat_mx::to_scalar(&twice).unwrap().as_f64(), Some(8.0));
    twice.release().unwrap();

    let out = call_function("size", 2, &[HostValue::Scalar(Scalar::Float64(1.0))]).unwrap();
    assert_eq!(out[0].as_f64(), Some(1.0));

    let first = default_session().unwrap();
    restart_default_session().unwrap();
    assert_eq!(first.state(), SessionState::Closed);
    assert!(default_session().unwrap().variable_names().unwrap().is_empty());

    eval_string("again = 1;").unwrap();
    close_default_session().unwrap();
    assert!(matches!(
        get_variable("again"),
        Err(EngineError::UndefinedVariable(_))
    ));
    close_default_session().unwrap();
}
