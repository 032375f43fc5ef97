//! reel-cli: command-line client for a Reel server
//!
//! # Subcommands
//! - `list [--page N]`                : one page of recorded sessions
//! - `show <session_id> [--json]`     : a session and its event log
//! - `status`                         : server health
//! - `push <file.jsonl> [--url ...]`  : replay captured events through the recorder

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::{Parser, Subcommand};
use reel_core::models::{SessionDetail, SessionPage, SessionSummary, Viewport};
use reel_recorder::{
    CaptureOptions, ChannelCapture, HttpTransport, Message, PageInfo, Recorder, RecorderConfig,
    Transport,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8080";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "reel-cli", version, about = "Reel session recorder client")]
struct Cli {
    /// Reel HTTP server URL
    #[arg(long, env = "REEL_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    /// Admin user for the guarded endpoints
    #[arg(long, env = "REEL_ADMIN_USER", default_value = "admin")]
    user: String,

    /// Admin password for the guarded endpoints
    #[arg(long, env = "REEL_ADMIN_PASS", default_value = "admin", hide_env_values = true)]
    password: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List recorded sessions, most recently updated first
    List {
        #[arg(short, long, default_value_t = 1)]
        page: u32,
    },

    /// Show one session
    Show {
        session_id: String,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Show server health
    Status,

    /// Record the events of a JSONL file (one event per line) as a new session
    Push {
        file: String,

        /// Page URL reported in the session metadata
        #[arg(long, default_value = "")]
        url: String,

        /// Page title reported in the session metadata
        #[arg(long, default_value = "")]
        title: String,

        #[arg(long, default_value_t = 1280)]
        width: u32,

        #[arg(long, default_value_t = 720)]
        height: u32,

        #[arg(long, default_value_t = 50)]
        batch_size: usize,
    },
}

// ============================================================================
// Output Formatting
// ============================================================================

pub fn format_summary(s: &SessionSummary) -> String {
    format!(
        "{:<40} {:<19} {}",
        s.session_id,
        s.updated_at.format("%Y-%m-%d %H:%M:%S"),
        if s.title.is_empty() { &s.url } else { &s.title }
    )
}

pub fn format_page(page: &SessionPage) -> String {
    let mut out = format!(
        "{} sessions | page {} of {}\n",
        page.total,
        page.page,
        page.pages.max(1)
    );
    for s in &page.sessions {
        out.push_str(&format_summary(s));
        out.push('\n');
    }
    out
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client() -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?)
}

/// GET a guarded admin endpoint. Exits on transport or HTTP failure.
fn get_admin(cli: &Cli, path: &str) -> anyhow::Result<reqwest::blocking::Response> {
    let url = format!("{}{}", cli.server, path);
    let resp = match client()?
        .get(&url)
        .basic_auth(&cli.user, Some(&cli.password))
        .send()
    {
        Ok(r) => r,
        Err(e) => {
            eprintln!("reel-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        eprintln!("reel-cli: authentication failed (check REEL_ADMIN_USER / REEL_ADMIN_PASS)");
        std::process::exit(1);
    }
    if !status.is_success() {
        let body = resp.text().unwrap_or_default();
        eprintln!("reel-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }
    Ok(resp)
}

fn do_list(cli: &Cli, page: u32) -> anyhow::Result<()> {
    let page: SessionPage = get_admin(cli, &format!("/api/sessions?page={}", page))?
        .json()
        .context("failed to parse session listing")?;

    if page.sessions.is_empty() {
        eprintln!("No sessions found.");
        return Ok(());
    }
    print!("{}", format_page(&page));
    Ok(())
}

fn do_show(cli: &Cli, session_id: &str, json: bool) -> anyhow::Result<()> {
    let resp = get_admin(cli, &format!("/api/sessions/{}", session_id))?;

    if json {
        let body: serde_json::Value = resp.json().context("failed to parse session")?;
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let detail: SessionDetail = resp.json().context("failed to parse session")?;
    let s = &detail.summary;
    println!("Session:  {}", s.session_id);
    println!("URL:      {}", s.url);
    println!("Title:    {}", s.title);
    println!("Browser:  {}", s.user_agent);
    println!("Viewport: {}x{}", s.viewport.width, s.viewport.height);
    println!("Created:  {}", s.created_at);
    println!("Updated:  {}", s.updated_at);
    println!("Events:   {}", detail.events.len());
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(cli: &Cli) -> anyhow::Result<()> {
    let url = format!("{}/health", cli.server);

    match client()?.get(&url).send() {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Reel server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:     {}", body["version"].as_str().unwrap_or("?"));
            println!("SQLite:      {}", body["sqlite"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            eprintln!("reel-cli: server unhealthy (HTTP {})", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("reel-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Push
// ============================================================================

/// Parse a JSONL file of capture events. Blank lines are skipped.
pub fn read_events(path: &Path) -> anyhow::Result<Vec<serde_json::Value>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;

    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}: invalid JSON", i + 1))
        })
        .collect()
}

/// Queues messages in send order so they can be delivered one at a time,
/// with their outcome reported, before the process exits.
#[derive(Debug, Default)]
pub struct QueueTransport {
    queue: Mutex<Vec<Message>>,
}

impl QueueTransport {
    pub fn drain(&self) -> Vec<Message> {
        std::mem::take(&mut *self.queue.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn enqueue(&self, message: Message) {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message);
    }
}

impl Transport for QueueTransport {
    fn send(&self, message: Message) {
        self.enqueue(message);
    }

    fn send_on_teardown(&self, message: Message) {
        self.enqueue(message);
    }
}

struct PushArgs<'a> {
    file: &'a str,
    page: PageInfo,
    batch_size: usize,
}

async fn do_push(server: &str, args: PushArgs<'_>) -> anyhow::Result<()> {
    let events = read_events(Path::new(args.file))?;
    let config = RecorderConfig {
        batch_size: args.batch_size,
        ..RecorderConfig::new(format!("{}/api/sessions", server))
    };
    let http = HttpTransport::new(config.clone())?;
    let queue = Arc::new(QueueTransport::default());

    let (capture, feed) = ChannelCapture::new();
    let recorder = Recorder::start(
        &capture,
        &CaptureOptions::default(),
        &args.page,
        config,
        queue.clone(),
    )?;
    let session_id = recorder.session_id().to_string();

    for event in events {
        feed.emit(event);
    }
    recorder.stop();

    let mut sent = 0;
    for message in queue.drain() {
        http.deliver(&message)
            .await
            .with_context(|| format!("failed to post {}", http.url_for(&message)))?;
        if let Message::Events(batch) = &message {
            sent += batch.events.len();
            tracing::debug!(events = batch.events.len(), "Batch delivered");
        }
    }

    println!("{} ({} events)", session_id, sent);
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let mut cli = Cli::parse();
    cli.server = cli.server.trim_end_matches('/').to_string();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Commands::List { page } => do_list(&cli, *page),
        Commands::Show { session_id, json } => do_show(&cli, session_id, *json),
        Commands::Status => do_status(&cli),
        Commands::Push {
            file,
            url,
            title,
            width,
            height,
            batch_size,
        } => {
            let args = PushArgs {
                file,
                page: PageInfo {
                    url: url.clone(),
                    title: title.clone(),
                    user_agent: format!("reel-cli/{}", env!("CARGO_PKG_VERSION")),
                    viewport: Viewport {
                        width: *width,
                        height: *height,
                    },
                },
                batch_size: *batch_size,
            };
            tokio::runtime::Runtime::new()
                .map_err(anyhow::Error::from)
                .and_then(|rt| rt.block_on(do_push(&cli.server, args)))
        }
    };

    if let Err(e) = result {
        eprintln!("reel-cli: {:#}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::io::Write;

    fn summary(session_id: &str, title: &str) -> SessionSummary {
        SessionSummary {
            id: 1,
            session_id: session_id.to_string(),
            url: "https://shop.example/".to_string(),
            title: title.to_string(),
            user_agent: "ua".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            viewport: Viewport::default(),
        }
    }

    #[test]
    fn test_summary_line() {
        let line = format_summary(&summary("session_1_abc", "Cart"));
        assert!(line.starts_with("session_1_abc"));
        assert!(line.contains("2024-01-02 03:04:05"));
        assert!(line.ends_with("Cart"));
    }

    #[test]
    fn test_summary_falls_back_to_url() {
        let line = format_summary(&summary("s", ""));
        assert!(line.ends_with("https://shop.example/"));
    }

    #[test]
    fn test_page_header() {
        let page = SessionPage {
            sessions: vec![summary("a", "A"), summary("b", "B")],
            total: 22,
            page: 2,
            limit: 20,
            pages: 2,
        };
        let out = format_page(&page);
        assert!(out.starts_with("22 sessions | page 2 of 2\n"));
        assert_eq!(out.lines().count(), 3);
    }

    #[test]
    fn test_read_events_skips_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{\"type\": 4}}\n\n{{\"type\": 2}}\n").unwrap();
        let events = read_events(file.path()).unwrap();
        assert_eq!(events, vec![json!({"type": 4}), json!({"type": 2})]);
    }

    #[test]
    fn test_read_events_reports_bad_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{\"type\": 4}}\nnot json").unwrap();
        let err = read_events(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));
    }

    #[tokio::test]
    async fn test_queue_keeps_recorder_order() {
        let queue = Arc::new(QueueTransport::default());
        let (capture, feed) = ChannelCapture::new();
        let config = RecorderConfig {
            batch_size: 2,
            ..RecorderConfig::default()
        };
        let recorder = Recorder::start(
            &capture,
            &CaptureOptions::default(),
            &PageInfo::default(),
            config,
            queue.clone(),
        )
        .unwrap();
        for n in 0..3 {
            feed.emit(json!(n));
        }
        recorder.stop();

        let messages = queue.drain();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].suffix(), "metadata");
        match (&messages[1], &messages[2]) {
            (Message::Events(first), Message::Events(last)) => {
                assert_eq!(first.events, vec![json!(0), json!(1)]);
                assert_eq!(last.events, vec![json!(2)]);
            }
            other => panic!("unexpected messages: {:?}", other),
        }
        assert!(queue.drain().is_empty());
    }
}
