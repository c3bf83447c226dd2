//! Logging setup for RunMat engine hosts and workers.
//!
//! Library crates log through the `log` facade; [`init_logging`] bridges
//! those records into `tracing` and writes them to stderr, either as plain
//! text or as one JSON object per line. Stdout is never touched, since a
//! worker's stdout carries the engine protocol.

use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::Arc;
use tracing::subscriber::DefaultGuard;
use tracing::Subscriber;
use tracing_log::LogTracer;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;

/// One log event in structured form.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub ts: String,
    pub level: String,
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<JsonValue>,
}

type LogHook = Arc<dyn Fn(&LogRecord) + Send + Sync>;

static LOG_HOOK: OnceCell<LogHook> = OnceCell::new();

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "plain" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}' (expected text or json)")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoggingOptions {
    /// Filter directive such as `debug` or `runmat_engine=trace`. Overrides
    /// `RUST_LOG` and `RUNMAT_LOG` when set.
    pub level: Option<String>,
    pub format: LogFormat,
    /// Tag added to JSON records, e.g. the worker's session name.
    pub process: Option<String>,
}

/// Keeps a thread-local subscriber alive when a global one was already set.
pub struct LoggingGuard {
    _scoped: Option<DefaultGuard>,
}

/// Receive every record that passes the filter, in addition to stderr.
/// Only the first hook installed in a process takes effect.
pub fn set_log_hook<F>(hook: F)
where
    F: Fn(&LogRecord) + Send + Sync + 'static,
{
    let _ = LOG_HOOK.set(Arc::new(hook));
}

fn env_filter(opts: &LoggingOptions) -> EnvFilter {
    if let Some(level) = opts.level.as_deref() {
        if let Ok(filter) = EnvFilter::try_new(level) {
            return filter;
        }
    }
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env("RUNMAT_LOG"))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init_logging(opts: LoggingOptions) -> LoggingGuard {
    // Route log:: macros into tracing
    let _ = LogTracer::init();

    let subscriber = || {
        let text_layer = (opts.format == LogFormat::Text).then(|| {
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
        });
        let record_layer = RecordLayer {
            json_to_stderr: opts.format == LogFormat::Json,
            process: opts.process.clone(),
        };
        tracing_subscriber::registry()
            .with(env_filter(&opts))
            .with(text_layer)
            .with(record_layer)
    };

    let scoped = match tracing::subscriber::set_global_default(subscriber()) {
        Ok(()) => None,
        Err(_) => Some(tracing::subscriber::set_default(subscriber())),
    };

    LoggingGuard { _scoped: scoped }
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Builds [`LogRecord`]s for the hook and, in JSON mode, for stderr.
struct RecordLayer {
    json_to_stderr: bool,
    process: Option<String>,
}

impl<S> Layer<S> for RecordLayer
where
    S: Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let hook = LOG_HOOK.get();
        if hook.is_none() && !self.json_to_stderr {
            return;
        }

        let mut collector = FieldCollector::default();
        event.record(&mut collector);
        let meta = event.metadata();
        let record = LogRecord {
            ts: timestamp(),
            level: meta.level().to_string(),
            target: meta.target().to_string(),
            message: collector.message.unwrap_or_else(|| meta.name().to_string()),
            process: self.process.clone(),
            fields: collector
                .fields
                .filter(|obj| obj.as_object().is_some_and(|m| !m.is_empty())),
        };

        if let Some(hook) = hook {
            hook(&record);
        }
        if self.json_to_stderr {
            if let Ok(line) = serde_json::to_string(&record) {
                let mut stderr = io::stderr().lock();
                let _ = writeln!(stderr, "{line}");
            }
        }
    }
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    fields: Option<JsonValue>,
}

impl FieldCollector {
    fn insert(&mut self, name: &str, entry: JsonValue) {
        // log records arrive with their metadata as `log.*` fields
        if name.starts_with("log.") {
            return;
        }
        let obj = self
            .fields
            .get_or_insert_with(|| JsonValue::Object(Default::default()));
        if let JsonValue::Object(map) = obj {
            map.insert(name.to_string(), entry);
        }
    }
}

impl tracing::field::Visit for FieldCollector {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let text = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(text);
        } else {
            self.insert(field.name(), JsonValue::String(text));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.insert(field.name(), JsonValue::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.insert(field.name(), JsonValue::from(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.insert(field.name(), JsonValue::from(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.insert(field.name(), JsonValue::from(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn log_format_parses() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("Text".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn hook_receives_structured_records() {
        let captured: Arc<Mutex<Vec<LogRecord>>> = Arc::new(Mutex::new(Vec::new()));
        let hook = {
            let c = captured.clone();
            move |rec: &LogRecord| {
                c.lock().unwrap().push(rec.clone());
            }
        };
        set_log_hook(hook);
        let _guard = init_logging(LoggingOptions {
            level: Some("debug".into()),
            format: LogFormat::Text,
            process: Some("unit".into()),
        });

        tracing::info!(request = 7u64, "hello world");

        let items = captured.lock().unwrap();
        let record = items
            .iter()
            .find(|r| r.message.contains("hello world"))
            .expect("record captured");
        assert_eq!(record.level, "INFO");
        assert_eq!(record.process.as_deref(), Some("unit"));
        assert_eq!(
            record.fields.as_ref().and_then(|f| f.get("request")),
            Some(&JsonValue::from(7u64))
        );
    }
}
