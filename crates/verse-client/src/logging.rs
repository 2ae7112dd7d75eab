use std::path::PathBuf;

use tokio::sync::broadcast;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::core::ClientUpdate;

pub const DEFAULT_FILTER: &str = "debug,hyper_util=warn,reqwest=warn,hyper=warn,tungstenite=warn";

/// A tracing layer that forwards WARN/ERROR events to the presentation layer.
pub struct ForwardLayer {
    sender: broadcast::Sender<ClientUpdate>,
}

impl ForwardLayer {
    pub fn new(sender: broadcast::Sender<ClientUpdate>) -> Self {
        Self { sender }
    }
}

impl<S> tracing_subscriber::Layer<S> for ForwardLayer
where
    S: tracing::Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let level = event.metadata().level();
        if !matches!(*level, tracing::Level::WARN | tracing::Level::ERROR) {
            return;
        }

        let mut message = format!("{} [{}] ", chrono::Local::now().format("%H:%M:%S"), level);
        event.record(&mut MessageVisitor(&mut message));

        // No receivers is OK.
        let _ = self.sender.send(ClientUpdate::Log(message));
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl tracing::field::Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

/// Log to `<data_dir>/versefind.log` and forward warnings to `sender`.
/// Returns the log file path.
pub fn init(sender: broadcast::Sender<ClientUpdate>) -> anyhow::Result<PathBuf> {
    let data_dir = verse_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("versefind.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(ForwardLayer::new(sender))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER)),
        )
        .init();

    Ok(log_path)
}
