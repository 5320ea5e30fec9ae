//! NFS-e CLI - operator interface to the ingestion daemon over JSON-RPC

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9527";
const MB: f64 = 1024.0 * 1024.0;

#[derive(Parser)]
#[command(name = "nfse")]
#[command(about = "NFS-e ingestion daemon CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "NFSE_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a job
    Enqueue {
        /// Tenant id
        #[arg(short, long)]
        tenant: String,

        /// Job kind (SYNC_DOCUMENTS, CONSULT_PERIOD, PROCESS_DOCUMENT, GENERATE_REPORT)
        #[arg(short, long)]
        kind: String,

        /// Payload as JSON string
        #[arg(long, default_value = "{}")]
        payload: String,

        /// Priority (lower = claimed first; 1 high, 5 normal, 10 low)
        #[arg(short, long)]
        priority: Option<i32>,

        /// Not eligible before this many seconds from now
        #[arg(long)]
        delay_secs: Option<i64>,
    },

    /// Sync a tenant now (high priority)
    Sync {
        /// Tenant id
        tenant: String,

        /// Periods as yyyy-mm; omitted: chosen by the sync policy
        #[arg(long = "period")]
        periods: Vec<String>,

        /// Re-fetch documents already stored
        #[arg(long)]
        force_refresh: bool,
    },

    /// List jobs
    Jobs {
        #[arg(long)]
        tenant: Option<String>,

        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        kind: Option<String>,

        #[arg(long, default_value = "1")]
        page: u32,

        #[arg(long, default_value = "20")]
        per_page: u32,
    },

    /// Show one job with its params and result
    Show {
        /// Job ID
        job_id: String,
    },

    /// Cancel a pending or running job
    Cancel {
        /// Job ID
        job_id: String,
    },

    /// Show system status
    Status,

    /// Run maintenance operations
    Maintenance {
        /// Force VACUUM even if not needed
        #[arg(long)]
        force_vacuum: bool,
    },
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize, Tabled)]
struct EnqueueResult {
    job_id: String,
    status: String,
    unit_key: String,
    created: bool,
}

/// The subset of a job the listing shows
#[derive(Deserialize)]
struct JobSummary {
    id: String,
    tenant_id: String,
    kind: String,
    status: String,
    priority: i32,
    unit_key: String,
    retry_count: i32,
    max_retries: i32,
    created_at: i64,
}

#[derive(Tabled)]
struct JobRow {
    id: String,
    tenant: String,
    kind: String,
    status: String,
    priority: i32,
    unit: String,
    retries: String,
    created: String,
}

impl From<JobSummary> for JobRow {
    fn from(job: JobSummary) -> Self {
        Self {
            id: job.id,
            tenant: job.tenant_id,
            kind: job.kind,
            status: job.status,
            priority: job.priority,
            unit: job.unit_key,
            retries: format!("{}/{}", job.retry_count, job.max_retries),
            created: format_millis(job.created_at),
        }
    }
}

#[derive(Deserialize)]
struct JobPage {
    jobs: Vec<JobSummary>,
    total: i64,
    page: u32,
    per_page: u32,
}

fn format_millis(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn colored_status(status: &str) -> colored::ColoredString {
    match status {
        "COMPLETED" => status.green(),
        "FAILED" => status.red(),
        "RUNNING" => status.cyan(),
        "CANCELLED" => status.yellow(),
        _ => status.normal(),
    }
}

/// Parameters for jobs.list.v1; unset filters are omitted
fn list_params(
    tenant: Option<String>,
    status: Option<String>,
    kind: Option<String>,
    page: u32,
    per_page: u32,
) -> Value {
    let mut params = json!({ "page": page, "per_page": per_page });
    if let Some(tenant) = tenant {
        params["tenant_id"] = json!(tenant);
    }
    if let Some(status) = status {
        params["status"] = json!(status.to_uppercase());
    }
    if let Some(kind) = kind {
        params["kind"] = json!(kind.to_uppercase());
    }
    params
}

async fn call_rpc(url: &str, method: &str, params: Value) -> Result<Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0",
        method,
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

fn print_enqueued(result: Value, headline: &str) -> Result<()> {
    let enqueue_result: EnqueueResult = serde_json::from_value(result)?;
    if enqueue_result.created {
        println!("{}", format!("✓ {}", headline).green().bold());
    } else {
        println!("{}", "○ Already in flight, existing job returned".yellow().bold());
    }
    println!();
    println!("{}", Table::new(vec![enqueue_result]));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Enqueue {
            tenant,
            kind,
            payload,
            priority,
            delay_secs,
        } => {
            let payload_json: Value =
                serde_json::from_str(&payload).context("Invalid JSON payload")?;

            let not_before = delay_secs.map(|s| Utc::now().timestamp_millis() + s * 1000);
            let params = json!({
                "tenant_id": tenant,
                "kind": kind.to_uppercase(),
                "payload": payload_json,
                "priority": priority,
                "not_before": not_before,
            });

            let result = call_rpc(&cli.rpc_url, "jobs.enqueue.v1", params).await?;
            print_enqueued(result, "Job enqueued successfully")?;
        }

        Commands::Sync {
            tenant,
            periods,
            force_refresh,
        } => {
            let params = json!({
                "tenant_id": tenant,
                "periods": periods,
                "force_refresh": force_refresh,
            });

            let result = call_rpc(&cli.rpc_url, "tenants.sync.v1", params).await?;
            print_enqueued(result, "Sync scheduled")?;
        }

        Commands::Jobs {
            tenant,
            status,
            kind,
            page,
            per_page,
        } => {
            let params = list_params(tenant, status, kind, page, per_page);
            let result = call_rpc(&cli.rpc_url, "jobs.list.v1", params).await?;
            let page: JobPage = serde_json::from_value(result)?;

            if page.jobs.is_empty() {
                println!("{}", "No jobs found".yellow());
                return Ok(());
            }
            let rows: Vec<JobRow> = page.jobs.into_iter().map(JobRow::from).collect();
            println!("{}", Table::new(rows));
            println!(
                "page {} ({} per page), {} jobs total",
                page.page, page.per_page, page.total
            );
        }

        Commands::Show { job_id } => {
            let job = call_rpc(&cli.rpc_url, "jobs.get.v1", json!({ "job_id": job_id })).await?;
            let status = job["status"].as_str().unwrap_or("?");

            println!("{} {}", "Job".cyan().bold(), job_id.bold());
            println!("  {} {}", "Status:".bold(), colored_status(status));
            println!("  {} {}", "Kind:".bold(), job["kind"].as_str().unwrap_or("?"));
            println!("  {} {}", "Tenant:".bold(), job["tenant_id"].as_str().unwrap_or("?"));
            println!("  {} {}", "Unit:".bold(), job["unit_key"].as_str().unwrap_or("?"));
            println!("  {} {}", "Priority:".bold(), job["priority"]);
            println!(
                "  {} {}/{}",
                "Retries:".bold(),
                job["retry_count"],
                job["max_retries"]
            );
            for (label, field) in [
                ("Created:", "created_at"),
                ("Scheduled:", "scheduled_at"),
                ("Started:", "started_at"),
                ("Completed:", "completed_at"),
            ] {
                if let Some(ms) = job[field].as_i64() {
                    println!("  {} {}", label.bold(), format_millis(ms));
                }
            }
            println!("  {} {}", "Params:".bold(), job["params"]);
            if let Some(err) = job["error_message"].as_str() {
                println!("  {} {}", "Error:".bold(), err.red());
            }
            if !job["result"].is_null() {
                println!("  {}", "Result:".bold());
                println!("{}", serde_json::to_string_pretty(&job["result"])?);
            }
        }

        Commands::Cancel { job_id } => {
            let params = json!({
                "job_id": job_id,
            });

            call_rpc(&cli.rpc_url, "jobs.cancel.v1", params).await?;

            println!("{}", format!("✓ Job {} cancelled", job_id).green().bold());
        }

        Commands::Status => {
            println!("{}", "System Status".cyan().bold());
            println!();

            match call_rpc(&cli.rpc_url, "admin.stats.v1", json!({})).await {
                Ok(stats) => {
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!();
                    println!("  {} {}", "Total Jobs:".bold(), stats["total_jobs"]);
                    println!("  {} {}", "Pending:".bold(), stats["pending_jobs"]);
                    println!("  {} {}", "Running:".bold(), stats["running_jobs"]);
                    println!("  {} {}", "Completed:".bold(), stats["completed_jobs"]);
                    println!("  {} {}", "Failed:".bold(), stats["failed_jobs"]);
                    println!("  {} {}", "Cancelled:".bold(), stats["cancelled_jobs"]);
                    println!();
                    let db_mb = stats["db_size_bytes"].as_i64().unwrap_or(0) as f64 / MB;
                    println!("  {} {:.2} MB", "DB Size:".bold(), db_mb);
                    println!(
                        "  {} {:.1}%",
                        "Fragmentation:".bold(),
                        stats["fragmentation_percent"].as_f64().unwrap_or(0.0)
                    );
                    println!("  {} {} seconds", "Uptime:".bold(), stats["uptime_seconds"]);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }

        Commands::Maintenance { force_vacuum } => {
            println!("{}", "Running maintenance...".cyan().bold());
            println!();

            if force_vacuum {
                println!("  {} Force VACUUM enabled", "•".bold());
            }

            let params = json!({ "force_vacuum": force_vacuum });

            match call_rpc(&cli.rpc_url, "admin.maintenance.v1", params).await {
                Ok(result) => {
                    println!("  ✓ Maintenance completed");
                    println!();
                    if result["vacuumed"].as_bool().unwrap_or(false) {
                        println!(
                            "  {} VACUUM executed, {:.2} MB reclaimed",
                            "✓".green(),
                            result["reclaimed_mb"].as_f64().unwrap_or(0.0)
                        );
                    } else {
                        println!("  ○ VACUUM skipped (not needed)");
                    }
                    println!("  {} {} jobs deleted", "✓".green(), result["jobs_deleted"]);
                    let size_mb = result["db_size_bytes"].as_i64().unwrap_or(0) as f64 / MB;
                    println!("  {} {:.2} MB", "DB Size:".bold(), size_mb);
                }
                Err(e) => {
                    println!("  {} Maintenance failed: {}", "✗".red(), e);
                }
            }
        }
    }

    Ok(())
}
