//! Logging bootstrap (§1A "Logging", §2 component I, §9 "Global state").
//!
//! Resolves [`crate::engine_config::LoggerSinkConfig`] into `tracing`
//! layers and installs the process-wide subscriber exactly once, mirroring
//! the teacher's `tracing_setup::init_tracing` (`Registry` + `EnvFilter` +
//! `fmt` layer), minus the OpenTelemetry export the teacher gates behind an
//! `otlp` feature this crate doesn't carry.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::Subscriber;
use tracing_subscriber::layer::{Context as LayerContext, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::engine_config::{LoggerSinkConfig, LoggerTarget};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Parsed `RUNTIME_VERBOSE` env var (§6): a comma/space-separated list of
/// words gating optional spans. Unknown words are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerboseFlags {
    pub metric: bool,
    pub logging: bool,
    pub route: bool,
    pub error_caller: bool,
}

impl VerboseFlags {
    pub fn parse(raw: &str) -> Self {
        let mut flags = Self::default();
        for word in raw.split(|c: char| c == ',' || c.is_whitespace()).map(str::trim).filter(|w| !w.is_empty()) {
            match word {
                "metric" => flags.metric = true,
                "logging" => flags.logging = true,
                "route" => flags.route = true,
                "error_caller" => flags.error_caller = true,
                _ => {}
            }
        }
        flags
    }

    pub fn from_env() -> Self {
        std::env::var("RUNTIME_VERBOSE").map(|raw| Self::parse(&raw)).unwrap_or_default()
    }

    /// Extra `EnvFilter` directives implied by the flags (§1A: "gates
    /// optional `tracing` spans for `metric`, `logging`, `route`").
    fn directives(&self) -> Vec<&'static str> {
        let mut directives = Vec::new();
        if self.metric {
            directives.push("engine_core::resource_group=debug");
        }
        if self.logging {
            directives.push("engine_core::logging=debug");
        }
        if self.route {
            directives.push("engine_core::router=debug");
        }
        directives
    }
}

/// Keeps the sink tasks alive; dropping it does not flush in-flight lines,
/// since (unlike the teacher's OTel guard) a TCP sink has no batched export
/// to drain.
pub struct LoggingGuard {
    _tcp_senders: Vec<mpsc::UnboundedSender<String>>,
}

/// Build and install the process-wide subscriber from the configured sinks,
/// gated by `RUNTIME_VERBOSE` (§1A, §6). Idempotent per process via
/// `tracing_subscriber`'s own "already set" guard; the second call is a
/// silent no-op, matching `Engine::new`'s "exactly once" global-state rule
/// when an embedding app constructs more than one `Engine`.
pub fn init(sinks: &[LoggerSinkConfig], verbose: VerboseFlags) -> LoggingGuard {
    let mut filter = EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    for directive in verbose.directives() {
        filter = filter.add_directive(directive.parse().expect("static directive is well-formed"));
    }

    let mut tcp_senders = Vec::new();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    for sink in sinks {
        match &sink.target {
            LoggerTarget::Stdout => {
                layers.push(Box::new(tracing_subscriber::fmt::layer().with_target(true).with_thread_ids(false)));
            }
            LoggerTarget::Tcp { host, port } => {
                let (sender, receiver) = mpsc::unbounded_channel();
                spawn_tcp_sink(host.clone(), *port, receiver);
                tcp_senders.push(sender.clone());
                layers.push(Box::new(TcpLayer { role: sink.role.clone(), sender }));
            }
        }
    }

    let subscriber = Registry::default().with(filter).with(layers);
    let _ = tracing::subscriber::set_global_default(subscriber);

    LoggingGuard { _tcp_senders: tcp_senders }
}

/// One TCP sink's reconnect loop (§1A, §5 "one TCP sink uses an internal
/// send queue with a reconnect loop"): initial delay 0, fixed delay
/// thereafter. Lines queued while disconnected are held in the unbounded
/// channel and flushed once the connection comes back.
fn spawn_tcp_sink(host: String, port: u16, mut receiver: mpsc::UnboundedReceiver<String>) {
    tokio::spawn(async move {
        let mut delay = Duration::ZERO;
        loop {
            tokio::time::sleep(delay).await;
            delay = RECONNECT_DELAY;

            let mut stream = match TcpStream::connect((host.as_str(), port)).await {
                Ok(stream) => stream,
                Err(err) => {
                    tracing::warn!(%host, port, %err, "log sink tcp connect failed, retrying");
                    continue;
                }
            };

            loop {
                let Some(line) = receiver.recv().await else { return };
                if let Err(err) = stream.write_all(line.as_bytes()).await {
                    tracing::warn!(%host, port, %err, "log sink tcp write failed, reconnecting");
                    break;
                }
            }
        }
    });
}

/// A `tracing_subscriber::Layer` that serializes each event to a JSON line
/// and hands it to the sink's background task (§1A).
struct TcpLayer {
    role: String,
    sender: mpsc::UnboundedSender<String>,
}

impl<S> Layer<S> for TcpLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: LayerContext<'_, S>) {
        let mut fields = serde_json::Map::new();
        let mut visitor = JsonVisitor { fields: &mut fields };
        event.record(&mut visitor);

        let line = serde_json::json!({
            "role": self.role,
            "level": event.metadata().level().to_string(),
            "target": event.metadata().target(),
            "fields": fields,
        })
        .to_string();

        let _ = self.sender.send(line + "\n");
    }
}

struct JsonVisitor<'a> {
    fields: &'a mut serde_json::Map<String, serde_json::Value>,
}

impl Visit for JsonVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.fields.insert(field.name().to_string(), serde_json::Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_words_and_ignores_unknown_ones() {
        let flags = VerboseFlags::parse("metric, route bogus");
        assert!(flags.metric);
        assert!(flags.route);
        assert!(!flags.logging);
        assert!(!flags.error_caller);
    }

    #[test]
    fn empty_string_yields_no_flags() {
        assert_eq!(VerboseFlags::parse(""), VerboseFlags::default());
    }
}
