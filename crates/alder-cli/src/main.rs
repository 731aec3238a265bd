use alder_audit::{AuditLog, ChainVerification};
use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use reqwest::Client;
use serde_json::{json, Value};
use std::process::{Command, Stdio};

#[derive(Parser)]
#[command(name = "alder", about = "Alder platform operator CLI")]
#[command(version)]
struct Cli {
    /// Daemon endpoint
    #[arg(long, env = "ALDER_ENDPOINT", default_value = "http://127.0.0.1:7421")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the alderd daemon lifecycle
    Daemon {
        #[command(subcommand)]
        command: DaemonCommands,
    },

    /// Daemon health and component readiness
    Health,

    /// Invoke a domain kernel with a free-text intent
    Kernel(KernelArgs),

    /// Inspect and settle the approval queue
    Approvals {
        #[command(subcommand)]
        command: ApprovalCommands,
    },

    /// Audit chain utilities
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },

    /// Recent platform events
    Logs(LogsArgs),

    /// Mission lists
    Missions {
        /// One of: active, proactive, followups
        #[arg(default_value = "active")]
        kind: String,
    },

    /// Run a preflight validation pass now
    Preflight,

    /// Force a triage cycle now
    Triage,

    /// Set the autonomy tier (a governed action)
    Autonomy {
        /// Target tier, 0..=3
        tier: u8,
    },
}

#[derive(Subcommand)]
enum DaemonCommands {
    /// Spawn alderd in the background
    Start {
        /// Root directory handed to alderd
        #[arg(long)]
        root: Option<String>,
    },
    /// Ask a running daemon to shut down gracefully
    Stop,
    /// Show daemon status
    Status,
}

#[derive(Subcommand)]
enum ApprovalCommands {
    /// List pending approvals
    List,
    /// Grant every pending approval
    GrantAll,
}

#[derive(Subcommand)]
enum AuditCommands {
    /// Dump a range of audit entries
    Dump {
        #[arg(long, default_value_t = 0)]
        from: u64,
        #[arg(long)]
        to: Option<u64>,
        /// Read a local audit file instead of the daemon
        #[arg(long)]
        file: Option<String>,
    },
    /// Verify the hash chain
    Verify {
        /// Verify a local audit file instead of the daemon
        #[arg(long)]
        file: Option<String>,
    },
}

#[derive(Args)]
struct KernelArgs {
    /// Kernel name (core, memory, code, governance, verification,
    /// intelligence, infrastructure, federation)
    name: String,
    /// The intent, in plain words
    intent: Vec<String>,
    /// Context entries as key=value
    #[arg(long = "context", value_name = "KEY=VALUE")]
    context: Vec<String>,
}

#[derive(Args)]
struct LogsArgs {
    #[arg(long, default_value_t = 20)]
    limit: u64,
    /// Minimum severity (info, low, medium, high, critical)
    #[arg(long)]
    level: Option<String>,
    /// Event domain, e.g. error or mission
    #[arg(long)]
    domain: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let endpoint = cli.endpoint.trim_end_matches('/').to_string();

    match cli.command {
        Commands::Daemon { command } => daemon_command(&client, &endpoint, command).await?,
        Commands::Health => {
            let body = get(&client, &endpoint, "/api/v1/health").await?;
            print_json(&body);
        }
        Commands::Kernel(args) => kernel_command(&client, &endpoint, args).await?,
        Commands::Approvals { command } => match command {
            ApprovalCommands::List => {
                let body = get(&client, &endpoint, "/api/v1/approvals").await?;
                print_json(&body);
            }
            ApprovalCommands::GrantAll => {
                let body = post(&client, &endpoint, "/api/v1/approvals/grant-all", json!({}))
                    .await?;
                print_json(&body);
            }
        },
        Commands::Audit { command } => audit_command(&client, &endpoint, command).await?,
        Commands::Logs(args) => {
            let mut path = format!("/api/v1/logs/recent?limit={}", args.limit);
            if let Some(level) = args.level {
                path.push_str(&format!("&level={level}"));
            }
            if let Some(domain) = args.domain {
                path.push_str(&format!("&domain={domain}"));
            }
            let body = get(&client, &endpoint, &path).await?;
            print_json(&body);
        }
        Commands::Missions { kind } => {
            let body = get(&client, &endpoint, &format!("/api/v1/missions/{kind}")).await?;
            print_json(&body);
        }
        Commands::Preflight => {
            let body = post(&client, &endpoint, "/api/v1/preflight/run", json!({})).await?;
            print_json(&body);
        }
        Commands::Triage => {
            let body = post(&client, &endpoint, "/api/v1/triage/cycle", json!({})).await?;
            print_json(&body);
        }
        Commands::Autonomy { tier } => {
            let body = post(
                &client,
                &endpoint,
                "/api/v1/autonomy/tier",
                json!({ "tier": tier }),
            )
            .await?;
            print_json(&body);
        }
    }
    Ok(())
}

async fn daemon_command(
    client: &Client,
    endpoint: &str,
    command: DaemonCommands,
) -> anyhow::Result<()> {
    match command {
        DaemonCommands::Start { root } => {
            let mut cmd = Command::new("alderd");
            if let Some(root) = root {
                cmd.arg("--root").arg(root);
            }
            let child = cmd
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .context("spawning alderd (is it on PATH?)")?;
            println!("alderd started (pid {})", child.id());
        }
        DaemonCommands::Stop => {
            let body = post(client, endpoint, "/api/v1/system/shutdown", json!({})).await?;
            print_json(&body);
        }
        DaemonCommands::Status => match get(client, endpoint, "/api/v1/health").await {
            Ok(body) => {
                println!(
                    "daemon: {} (uptime {}s, {} audit entries)",
                    body["status"].as_str().unwrap_or("unknown"),
                    body["uptime_seconds"],
                    body["audit_entries"],
                );
                if let Some(components) = body["components"].as_array() {
                    for component in components {
                        println!(
                            "  {} {}",
                            if component["ready"].as_bool().unwrap_or(false) {
                                "ready   "
                            } else {
                                "degraded"
                            },
                            component["name"].as_str().unwrap_or("?"),
                        );
                    }
                }
            }
            Err(_) => println!("daemon: not reachable at {endpoint}"),
        },
    }
    Ok(())
}

async fn kernel_command(client: &Client, endpoint: &str, args: KernelArgs) -> anyhow::Result<()> {
    if args.intent.is_empty() {
        bail!("an intent is required, e.g. `alder kernel core status`");
    }
    let mut context = serde_json::Map::new();
    for pair in &args.context {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("context entries must be key=value, got '{pair}'");
        };
        context.insert(key.to_string(), json!(value));
    }
    let body = post(
        client,
        endpoint,
        &format!("/api/v1/kernel/{}", args.name),
        json!({
            "intent": args.intent.join(" "),
            "context": context,
        }),
    )
    .await?;

    if let Some(answer) = body["answer"].as_str() {
        println!("{answer}");
        println!();
    }
    print_json(&body);
    Ok(())
}

async fn audit_command(
    client: &Client,
    endpoint: &str,
    command: AuditCommands,
) -> anyhow::Result<()> {
    match command {
        AuditCommands::Dump { from, to, file } => match file {
            Some(path) => {
                let log = AuditLog::open(&path)
                    .await
                    .with_context(|| format!("opening audit file {path}"))?;
                let len = log.len().await;
                let entries = log.read_range(from, to.unwrap_or(len)).await?;
                for entry in entries {
                    println!("{}", serde_json::to_string(&entry)?);
                }
            }
            None => {
                let mut path = format!("/api/v1/audit/entries?from={from}");
                if let Some(to) = to {
                    path.push_str(&format!("&to={to}"));
                }
                let body = get(client, endpoint, &path).await?;
                print_json(&body);
            }
        },
        AuditCommands::Verify { file } => match file {
            Some(path) => {
                // A broken chain refuses to open; surface that as the verdict.
                match AuditLog::open(&path).await {
                    Ok(log) => {
                        let len = log.len().await;
                        match log.verify_chain(0, len).await? {
                            ChainVerification::Ok { checked } => {
                                println!("chain intact ({checked} entries)");
                            }
                            ChainVerification::BrokenAt { sequence, detail } => {
                                println!("chain BROKEN at {sequence}: {detail}");
                                std::process::exit(1);
                            }
                        }
                    }
                    Err(err) => {
                        println!("chain BROKEN: {err}");
                        std::process::exit(1);
                    }
                }
            }
            None => {
                let body = get(client, endpoint, "/api/v1/audit/verify").await?;
                print_json(&body);
                if body["intact"] != json!(true) {
                    std::process::exit(1);
                }
            }
        },
    }
    Ok(())
}

async fn get(client: &Client, endpoint: &str, path: &str) -> anyhow::Result<Value> {
    let response = client
        .get(format!("{endpoint}{path}"))
        .send()
        .await
        .with_context(|| format!("GET {path}"))?;
    parse_response(response).await
}

async fn post(
    client: &Client,
    endpoint: &str,
    path: &str,
    body: Value,
) -> anyhow::Result<Value> {
    let response = client
        .post(format!("{endpoint}{path}"))
        .json(&body)
        .send()
        .await
        .with_context(|| format!("POST {path}"))?;
    parse_response(response).await
}

async fn parse_response(response: reqwest::Response) -> anyhow::Result<Value> {
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .unwrap_or_else(|_| json!({ "error": "non-JSON response" }));
    if !status.is_success() {
        bail!(
            "{}: {}",
            status,
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );
    }
    Ok(body)
}

fn print_json(value: &Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}
