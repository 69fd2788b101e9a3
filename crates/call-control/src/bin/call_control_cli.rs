//! Feed notification messages into a live registry from stdin
//!
//! Each stdin line is one JSON notification (`{"event": ..., "body": ...}`).
//! Registry events are printed to stdout as they happen; with `--snapshot`
//! the final registry contents are printed as JSON once stdin closes.
//!
//! ```text
//! RC_ACCESS_TOKEN=... call-control-cli --snapshot < notifications.ndjson
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use rvoip_call_control::logging::{parse_log_level, setup_logging, LoggingConfig};
use rvoip_call_control::{
    CallControlBuilder, CallControlEvent, HttpTransportConfig, IngestOutcome, NotificationMessage, SessionData,
};

#[derive(Parser, Debug)]
#[command(name = "call-control-cli")]
#[command(about = "Track telephony sessions from a notification feed on stdin")]
struct Args {
    /// Platform base URL (defaults to RC_SERVER_URL)
    #[arg(long)]
    server_url: Option<String>,

    /// OAuth access token (defaults to RC_ACCESS_TOKEN)
    #[arg(long)]
    token: Option<String>,

    /// Track every extension of the account
    #[arg(long)]
    account_level: bool,

    /// Skip the active-call preload
    #[arg(long)]
    no_preload_sessions: bool,

    /// Skip the device inventory load
    #[arg(long)]
    no_preload_devices: bool,

    /// Seed the registry from a snapshot file before reading stdin
    #[arg(long)]
    restore: Option<PathBuf>,

    /// Print the registry snapshot as JSON when stdin closes
    #[arg(long)]
    snapshot: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut logging = LoggingConfig::new(parse_log_level(&args.log_level)?, "call-control-cli");
    if args.json_logs {
        logging = logging.with_json();
    }
    setup_logging(logging)?;

    let mut http = HttpTransportConfig::from_env();
    if let Some(url) = args.server_url {
        http.server_url = url;
    }
    if let Some(token) = args.token {
        http = http.with_access_token(token);
    }

    let control = CallControlBuilder::new()
        .http_transport(http)
        .account_level(args.account_level)
        .preload_sessions(!args.no_preload_sessions)
        .preload_devices(!args.no_preload_devices)
        .build()
        .context("failed to build registry")?;

    let mut events = control.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(CallControlEvent::NewSession { session }) => {
                    println!("new      {} {:?}", session.id(), session.status());
                }
                Ok(CallControlEvent::SessionEvicted { session_id, reason }) => {
                    println!("evicted  {} {}", session_id, reason.unwrap_or_default());
                }
                Ok(CallControlEvent::Ready) => println!("ready"),
                Err(RecvError::Lagged(skipped)) => warn!("Event printer lagged, skipped {}", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    control.initialize().await;

    if let Some(path) = args.restore {
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let snapshot: Vec<SessionData> = serde_json::from_str(&raw).context("unreadable snapshot")?;
        control.restore(snapshot);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let message: NotificationMessage = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(e) => {
                warn!("Line {}: not a notification: {}", line_no, e);
                continue;
            }
        };
        match control.ingest(&message) {
            IngestOutcome::Ignored => {}
            outcome => info!("Line {}: {:?}", line_no, outcome),
        }
    }

    info!("Input closed with {} tracked sessions", control.len());
    if args.snapshot {
        println!("{}", serde_json::to_string_pretty(&control.snapshot())?);
    }

    drop(control);
    printer.abort();
    Ok(())
}
