//! Command-line client for the pastebin API.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use pastebin_core::constants::DEFAULT_CLI_SERVER_URL;
use serde_json::{json, Value};
use std::io::{self, Read};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "pbin", about = "Pastebin CLI", version)]
struct Cli {
    /// Server URL (can also be set via PB_SERVER env var)
    #[arg(short, long, env = "PB_SERVER")]
    server: Option<String>,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    json: bool,

    /// Print timing for API requests
    #[arg(long, global = true)]
    timing: bool,

    /// Request timeout in seconds
    #[arg(short = 't', long, default_value = "30")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
    /// Create a paste from a file or stdin
    New {
        #[arg(short, long)]
        file: Option<String>,
        /// Expire the paste after this many seconds
        #[arg(long)]
        ttl: Option<u64>,
        /// Stop serving the paste after this many reads
        #[arg(short, long)]
        max_views: Option<u64>,
    },
    /// Print a paste (counts as a view)
    Get { id: String },
    /// Check server and store health
    Health,
}

fn log_timing(timing: bool, label: &str, request: Duration, parse: Duration) {
    if !timing {
        return;
    }
    let total = request + parse;
    eprintln!(
        "[timing] {}: request {:.1} ms, parse {:.1} ms, total {:.1} ms",
        label,
        request.as_secs_f64() * 1000.0,
        parse.as_secs_f64() * 1000.0,
        total.as_secs_f64() * 1000.0
    );
}

fn error_message_for_response(status: reqwest::StatusCode, body: &str) -> String {
    if body.trim().is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string();
    }

    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return value
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or(body)
            .to_string();
    }

    body.to_string()
}

async fn ensure_success_or_exit(res: reqwest::Response, action: &str) -> reqwest::Response {
    let status = res.status();
    if status.is_success() {
        return res;
    }

    let body = match res.text().await {
        Ok(body) => body,
        Err(err) => format!("failed to read error response body: {}", err),
    };
    let message = error_message_for_response(status, &body);
    eprintln!("{} failed ({}): {}", action, status, message);
    std::process::exit(1);
}

fn exit_with(action: &str, message: &str) -> ! {
    eprintln!("{} failed: {}", action, message);
    std::process::exit(1);
}

fn create_body(content: String, ttl: Option<u64>, max_views: Option<u64>) -> Value {
    let mut body = json!({ "content": content });
    if let Some(ttl) = ttl {
        body["ttl_seconds"] = ttl.into();
    }
    if let Some(max_views) = max_views {
        body["max_views"] = max_views.into();
    }
    body
}

fn pretty(value: &Value) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|err| format!("response encoding error: {}", err))
}

fn format_new_output(created: &Value, json: bool) -> Result<String, String> {
    if json {
        return pretty(created);
    }

    let id = created.get("id").and_then(Value::as_str);
    let url = created.get("url").and_then(Value::as_str);
    match (id, url) {
        (Some(id), Some(url)) => Ok(format!("Created: {} ({})", url, id)),
        _ => Err("response missing 'id' or 'url' field".to_string()),
    }
}

fn format_get_output(paste: &Value, json: bool) -> Result<String, String> {
    if json {
        return pretty(paste);
    }

    paste
        .get("content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| "response missing 'content' field".to_string())
}

/// Render a health response. The flag is whether the store answered.
fn format_health_output(health: &Value, json: bool) -> Result<(String, bool), String> {
    let ok = health
        .get("ok")
        .and_then(Value::as_bool)
        .ok_or_else(|| "response missing 'ok' field".to_string())?;
    if json {
        return Ok((pretty(health)?, ok));
    }
    let line = if ok {
        "Store: ok"
    } else {
        "Store: unavailable"
    };
    Ok((line.to_string(), ok))
}

fn api_url(server: &str, segments: &[&str]) -> Result<reqwest::Url, String> {
    let mut url = reqwest::Url::parse(server)
        .map_err(|err| format!("Invalid server URL '{}': {}", server, err))?;
    let mut path = url
        .path_segments_mut()
        .map_err(|_| "Server URL cannot be used as an API base".to_string())?;
    path.pop_if_empty();
    for segment in segments {
        path.push(segment);
    }
    drop(path);
    Ok(url)
}

fn api_url_or_exit(server: &str, action: &str, segments: &[&str]) -> reqwest::Url {
    match api_url(server, segments) {
        Ok(url) => url,
        Err(message) => exit_with(action, &message),
    }
}

fn normalize_server(server: String) -> String {
    if let Ok(mut url) = reqwest::Url::parse(&server) {
        let should_normalize_localhost =
            url.scheme().eq_ignore_ascii_case("http") && url.host_str() == Some("localhost");
        if should_normalize_localhost && url.set_host(Some("127.0.0.1")).is_err() {
            return server;
        }
        let mut normalized = url.to_string();
        while normalized.ends_with('/') {
            normalized.pop();
        }
        return normalized;
    }
    server
}

fn resolve_server(server: Option<String>) -> String {
    server
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_CLI_SERVER_URL.to_string())
}

fn read_content(file: Option<String>) -> io::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path),
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let Cli {
        server,
        json,
        timing,
        timeout,
        command,
    } = Cli::parse();

    if let Commands::Completions { shell } = &command {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(*shell, &mut cmd, name, &mut io::stdout());
        return Ok(());
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout))
        .build()?;
    let server = normalize_server(resolve_server(server));

    match command {
        Commands::Completions { .. } => unreachable!("completions handled before client setup"),
        Commands::New {
            file,
            ttl,
            max_views,
        } => {
            let endpoint = api_url_or_exit(&server, "New", &["api", "pastes"]);
            let body = create_body(read_content(file)?, ttl, max_views);

            let request_start = Instant::now();
            let res = client.post(endpoint).json(&body).send().await?;
            let request_elapsed = request_start.elapsed();
            let res = ensure_success_or_exit(res, "New").await;

            let parse_start = Instant::now();
            let created: Value = res.json().await?;
            log_timing(timing, "new", request_elapsed, parse_start.elapsed());

            match format_new_output(&created, json) {
                Ok(output) => println!("{}", output),
                Err(message) => exit_with("New", &message),
            }
        }
        Commands::Get { id } => {
            let endpoint = api_url_or_exit(&server, "Get", &["api", "pastes", id.as_str()]);
            let request_start = Instant::now();
            let res = client.get(endpoint).send().await?;
            let request_elapsed = request_start.elapsed();
            let res = ensure_success_or_exit(res, "Get").await;

            let parse_start = Instant::now();
            let paste: Value = res.json().await?;
            log_timing(timing, "get", request_elapsed, parse_start.elapsed());

            match format_get_output(&paste, json) {
                Ok(output) => println!("{}", output),
                Err(message) => exit_with("Get", &message),
            }
        }
        Commands::Health => {
            let endpoint = api_url_or_exit(&server, "Health", &["api", "healthz"]);
            let request_start = Instant::now();
            let res = client.get(endpoint).send().await?;
            let request_elapsed = request_start.elapsed();
            let res = ensure_success_or_exit(res, "Health").await;

            let parse_start = Instant::now();
            let health: Value = res.json().await?;
            log_timing(timing, "health", request_elapsed, parse_start.elapsed());

            match format_health_output(&health, json) {
                Ok((output, ok)) => {
                    println!("{}", output);
                    if !ok {
                        std::process::exit(1);
                    }
                }
                Err(message) => exit_with("Health", &message),
            }
        }
    }

    Ok(())
}
