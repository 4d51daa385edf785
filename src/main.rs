use anyhow::Context;
use clap::Parser;
use inspector_bridge::config::Config;
use inspector_bridge::inspector::{
    FrontendChannel, InspectionTarget, RemoteInspectorBuilder, StopSource, TargetIdentifier,
    TargetType,
};
use log::{debug, info};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{mpsc, Arc, Mutex};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on (default: 0.0.0.0:9123)
    #[clap(long)]
    listen: Option<SocketAddr>,

    /// Path to configuration file (default: ~/.config/ibridge/config.toml)
    #[clap(long)]
    config: Option<PathBuf>,

    /// Trace every sent and received frame, requires debug level for "wire" log target
    #[clap(long)]
    trace_wire: bool,

    /// Register a script target that echoes every message back to the client
    #[clap(long)]
    demo_target: Option<String>,
}

/// Script target that answers every message with the message itself.
struct EchoTarget {
    name: String,
    channel: Mutex<Option<Arc<dyn FrontendChannel>>>,
}

impl EchoTarget {
    const IDENTIFIER: TargetIdentifier = 1;
}

impl InspectionTarget for EchoTarget {
    fn target_identifier(&self) -> TargetIdentifier {
        Self::IDENTIFIER
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn target_type(&self) -> TargetType {
        TargetType::JavaScript
    }

    fn remote_debugging_allowed(&self) -> bool {
        true
    }

    fn connect(&self, channel: Arc<dyn FrontendChannel>, _: bool, _: bool) -> bool {
        let mut current = self.channel.lock().unwrap_or_else(|e| e.into_inner());
        if current.is_some() {
            return false;
        }
        *current = Some(channel);
        info!(target: "inspector", "demo target \"{}\" connected", self.name);
        true
    }

    fn disconnect(&self) {
        *self.channel.lock().unwrap_or_else(|e| e.into_inner()) = None;
        info!(target: "inspector", "demo target \"{}\" disconnected", self.name);
    }

    fn dispatch_message_from_remote(&self, message: &str) {
        debug!(target: "inspector", "demo target \"{}\" received: {message}", self.name);
        let channel = self
            .channel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(channel) = channel {
            channel.send_message_to_frontend(message);
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = Config::from_file(args.config.as_deref()).context("load configuration")?;
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    config.trace_wire |= args.trace_wire;
    if config.trace_wire {
        inspector_bridge::log::enable_wire_trace();
    }

    let inspector = RemoteInspectorBuilder::from_config(&config)
        .on_active_session_change(|active| {
            info!(target: "inspector", "active debug session: {active}");
        })
        .build();
    inspector
        .start()
        .with_context(|| format!("start inspector on {}", config.listen))?;

    let demo_target = args.demo_target.map(|name| {
        Arc::new(EchoTarget {
            name,
            channel: Mutex::new(None),
        })
    });
    if let Some(target) = &demo_target {
        inspector.target_updated(target.clone());
    }

    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        _ = stop_tx.send(());
    })
    .context("set signal handler")?;
    _ = stop_rx.recv();

    inspector.stop(StopSource::Signal);
    if let Some(target) = demo_target {
        inspector.unregister_target(target.target_identifier());
    }
    Ok(())
}
