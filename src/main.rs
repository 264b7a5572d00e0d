//! ipacd - drive an ipac-ng engine from a line protocol on stdin.
//!
//! One command per line, one reply per line:
//!
//! ```text
//! allow <ip>          -> allowed | denied
//! warn <ip>           -> true | false
//! details <ip>        -> JSON record
//! auth <event> <ip>   -> ok | error: ...
//! purge               -> ok
//! cleanup             -> JSON cleanup report
//! stats               -> JSON stats
//! metrics             -> Prometheus text exposition
//! ```

use anyhow::Context;
use ipac_ng::{
    Config, EnforcementBackend, Engine, Enforcer, IptablesEnforcer, NoopEnforcer, Notification,
    Notifier, metrics,
};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Logs every notification as a JSON line.
struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        match serde_json::to_string(&notification) {
            Ok(json) => info!(kind = %notification.kind, notification = %json, "notification"),
            Err(e) => error!(error = %e, "failed to serialize notification"),
        }
    }
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if !Path::new(path).exists() {
        warn!(path, "config file not found, using defaults");
        return Ok(Config::default());
    }
    Config::load(path).with_context(|| format!("loading {path}"))
}

fn parse_addr(arg: Option<&str>) -> Result<IpAddr, String> {
    let arg = arg.ok_or("missing address")?;
    arg.parse().map_err(|_| format!("invalid address '{arg}'"))
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("error: {e}"))
}

/// Execute one protocol line and produce the reply.
fn handle_command(engine: &Engine, line: &str) -> String {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return "error: empty command".to_string();
    };

    let reply = match command {
        "allow" => parse_addr(parts.next()).map(|addr| {
            if engine.test_address_allowed(addr) {
                "allowed".to_string()
            } else {
                "denied".to_string()
            }
        }),
        "warn" => parse_addr(parts.next()).map(|addr| engine.test_address_warn(addr).to_string()),
        "details" => parse_addr(parts.next()).map(|addr| to_json(&engine.address_details(addr))),
        "auth" => match parts.next() {
            Some(event) => parse_addr(parts.next()).and_then(|addr| {
                engine
                    .apply_auth_event_str(event, addr)
                    .map(|()| "ok".to_string())
                    .map_err(|e| e.to_string())
            }),
            None => Err("missing auth event".to_string()),
        },
        "purge" => {
            engine.request_purge();
            Ok("ok".to_string())
        }
        "cleanup" => Ok(to_json(&engine.run_cleanup())),
        "stats" => Ok(to_json(&engine.stats())),
        "metrics" => Ok(metrics::gather_metrics().trim_end().to_string()),
        other => Err(format!("unknown command '{other}'")),
    };

    reply.unwrap_or_else(|e| format!("error: {e}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ipac.toml".to_string());
    let config = load_config(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    let enforcer: Arc<dyn Enforcer> = match config.enforcement.backend {
        EnforcementBackend::Iptables => {
            Arc::new(IptablesEnforcer::new(config.enforcement.chain.clone()))
        }
        EnforcementBackend::None => Arc::new(NoopEnforcer),
    };
    info!(
        backend = ?config.enforcement.backend,
        chain = %config.enforcement.chain,
        "Starting ipacd"
    );

    let engine = Engine::start(config.engine, enforcer, Some(Arc::new(LogNotifier)))?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = handle_command(&engine, &line);
        stdout.write_all(reply.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    info!("stdin closed, shutting down");
    engine.settle().await;
    engine.shutdown();
    Ok(())
}
