use std::{ path::PathBuf, time::Duration };

use anyhow::{ anyhow, Context, Error, Result };
use clap::{ Args, Parser, Subcommand, ValueEnum };
use tokio::sync::broadcast;
use tracing::{ error, info };

use ipcheck::{ aggregator::Aggregator, http::{ HttpClient, DEFAULT_TIMEOUT_SECONDS }, intel, logger, utils, Report };

#[derive(Parser)]
#[command(
    version,
    about = "IP reputation lookup",
    long_about = "IP reputation lookup\n\n\
    Queries every configured threat intel provider for an IP address concurrently\n\
    and prints a combined verdict. Providers are read from configs/intel_*.json."
)]
struct Cli {
    #[command(subcommand)]
    subcommand: SubCommands,
    /// Increase logging verbosity
    #[arg(short('v'), long, action = clap::ArgAction::Count)]
    verbosity: u8,
    /// Emit logs in JSON format
    #[arg(long = "json_log", env = "IPCHECK_JSON_LOG", default_value_t = false)]
    json_log: bool,
}

#[derive(Subcommand)]
enum SubCommands {
    #[command(
        about = "Look up an IP address",
        long_about = "Look up an IP address against all enabled intel providers",
        name = "lookup"
    )] LookupCommand(LookupArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Args, Debug)]
struct LookupArgs {
    /// IPv4 or IPv6 address to check
    #[arg(value_name = "ip")]
    ip: String,
    /// HTTP timeout for each provider request
    #[arg(
        short('t'),
        long = "timeout",
        env = "IPCHECK_TIMEOUT",
        value_name = "seconds",
        default_value_t = DEFAULT_TIMEOUT_SECONDS
    )]
    timeout: u64,
    /// Overall time limit, providers still running afterwards are reported as cancelled
    #[arg(short('d'), long = "deadline", env = "IPCHECK_DEADLINE", value_name = "seconds", default_value_t = 30)]
    deadline: u64,
    /// Output format
    #[arg(short('f'), long = "format", value_enum, default_value_t = Format::Text)]
    format: Format,
    /// Directory holding intel_*.json, defaults to configs/ next to the executable
    #[arg(short('c'), long = "config_dir", env = "IPCHECK_CONFIG_DIR", value_name = "path")]
    config_dir: Option<PathBuf>,
}

fn log_startup_err(context: &str, err: Error) -> Error {
    error!("error {}: {:?}", context, err);
    err
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let level = logger::verbosity_to_level_filter(args.verbosity);
    tracing::subscriber::set_global_default(logger::setup_logger(level, args.json_log))?;

    let SubCommands::LookupCommand(largs) = args.subcommand;
    let client = HttpClient::new(Duration::from_secs(largs.timeout)).map_err(|e|
        log_startup_err("creating HTTP client", e)
    )?;
    let cfg_dir = utils::intel_config_dir(largs.config_dir)?;
    let checkers = intel
        ::load_intel(&cfg_dir, &client)
        .map_err(|e| log_startup_err("loading intels", e))?;
    if checkers.is_empty() {
        return Err(
            log_startup_err(
                "loading intels",
                anyhow!("no enabled intel source found in {}", cfg_dir.display())
            )
        );
    }

    let (cancel_tx, mut cancel_rx) = broadcast::channel::<()>(1);
    ctrlc
        ::set_handler(move || {
            let _ = cancel_tx.send(());
        })
        .context("cannot set ctrl-c handler")?;

    let aggregator = Aggregator::new(checkers).with_deadline(Duration::from_secs(largs.deadline));
    info!("looking up {} using {} intel plugins", largs.ip, aggregator.len());
    let report = aggregator.lookup_until(&largs.ip, async move {
        if cancel_rx.recv().await.is_ok() {
            info!("cancel signal received, returning completed checks");
        }
    }).await?;

    match largs.format {
        Format::Text => print!("{}", render_text(&report)),
        Format::Json => println!("{}", render_json(&report)?),
    }
    Ok(())
}

fn render_text(report: &Report) -> String {
    let mut out = String::new();
    for c in report.checks.iter() {
        let flag = if c.is_malicious() { " [malicious]" } else { "" };
        out += &format!("{}: {}{}\n", c.description, c.ip_addr_info.summary(), flag);
    }
    for f in report.failures.iter() {
        out += &format!("{}: error: {}\n", f.provider, f.error);
    }
    let verdict = if report.is_malicious() { "malicious" } else { "not malicious" };
    out += &format!("{} is {}\n", report.ip, verdict);
    out
}

fn render_json(report: &Report) -> Result<String> {
    let mut v = serde_json::to_value(report)?;
    v["malicious"] = serde_json::Value::Bool(report.is_malicious());
    Ok(serde_json::to_string_pretty(&v)?)
}
