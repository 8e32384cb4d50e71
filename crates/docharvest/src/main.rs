//! Command-line entry point for docharvest.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docharvest_core::{
    EventKind, ExtractionOutcome, FsStore, HarvestConfig, HarvestError, JobSlot, Pipeline,
    ProgressEvent, Provider, providers,
};
use docharvest_imap::{Config, Connector, ImapConnector, MailSession, Security};

const DEFAULT_LOG_FILTER: &str = "docharvest=info,docharvest_core=info,docharvest_imap=info";
const VERBOSE_LOG_FILTER: &str = "docharvest=debug,docharvest_core=debug,docharvest_imap=debug";

#[derive(Parser)]
#[command(
    name = "docharvest",
    version,
    about = "Harvest PDF and Word attachments from an IMAP folder"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in server presets
    Providers {
        #[arg(long)]
        json: bool,
    },
    /// List the folders of a mailbox
    Folders {
        #[command(flatten)]
        conn: ConnectionArgs,
        #[arg(long)]
        json: bool,
    },
    /// Harvest one folder into ZIP archives
    Extract(ExtractArgs),
}

#[derive(Args)]
struct ConnectionArgs {
    /// Login name, usually the email address
    #[arg(short, long)]
    user: String,

    /// Password or app password
    #[arg(long, env = "DOCHARVEST_PASSWORD", hide_env_values = true)]
    password: String,

    /// Server preset id (see `docharvest providers`)
    #[arg(long, conflicts_with = "host")]
    provider: Option<String>,

    /// IMAP host
    #[arg(long)]
    host: Option<String>,

    /// IMAP port
    #[arg(long)]
    port: Option<u16>,

    /// Connect without TLS
    #[arg(long)]
    no_tls: bool,
}

#[derive(Args)]
struct ExtractArgs {
    #[command(flatten)]
    conn: ConnectionArgs,

    /// Folder to harvest, as listed by `docharvest folders`
    #[arg(short, long)]
    folder: String,

    /// Directory the archives are written to
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Messages per structure scan request
    #[arg(long, value_name = "N")]
    scan_batch: Option<usize>,

    /// Messages per full fetch batch
    #[arg(long, value_name = "N")]
    fetch_batch: Option<usize>,

    /// Attachments per archive file
    #[arg(long, value_name = "N")]
    max_per_archive: Option<usize>,

    /// Leave message bodies out of the summary
    #[arg(long)]
    no_body: bool,

    /// Print progress as JSON lines
    #[arg(long)]
    json: bool,

    /// Carry base64 archive data on the final event
    #[arg(long)]
    inline_base64: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let fallback = if verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config_path = cli.config.unwrap_or_else(HarvestConfig::default_path);

    match cli.command {
        Commands::Providers { json } => {
            print_providers(json)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Folders { conn, json } => {
            let config = HarvestConfig::load_from(&config_path).await?;
            list_folders(&conn, &config, json).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Extract(args) => {
            let mut config = HarvestConfig::load_from(&config_path).await?;
            args.apply(&mut config);
            config.validate()?;
            extract(&args, config).await
        }
    }
}

impl ExtractArgs {
    fn apply(&self, config: &mut HarvestConfig) {
        if let Some(dir) = &self.output {
            config.output_dir.clone_from(dir);
        }
        if let Some(n) = self.scan_batch {
            config.scan_batch_size = n;
        }
        if let Some(n) = self.fetch_batch {
            config.fetch_batch_size = n;
        }
        if let Some(n) = self.max_per_archive {
            config.max_per_archive = n;
        }
        if self.no_body {
            config.include_body = false;
        }
        if self.inline_base64 {
            config.inline_base64 = true;
        }
    }
}

/// Resolves the server from `--provider`, `--host` or the login domain.
fn server_config(conn: &ConnectionArgs, scan_batch_size: usize) -> anyhow::Result<Config> {
    let preset = match conn.provider.as_deref() {
        Some(id) => Some(
            providers::lookup(id)
                .with_context(|| format!("unknown provider '{id}', see `docharvest providers`"))?,
        ),
        None if conn.host.is_none() => Provider::from_email(&conn.user),
        None => None,
    };

    let host = match (conn.host.as_deref(), preset) {
        (Some(host), _) => host.to_string(),
        (None, Some(p)) if p.has_host() => p.host.to_string(),
        (None, Some(p)) => bail!("provider '{}' needs --host", p.id),
        (None, None) => bail!("cannot guess the server for {}, pass --host or --provider", conn.user),
    };

    let tls = preset.is_none_or(|p| p.tls) && !conn.no_tls;
    let security = Security::from_tls(tls);
    let port = conn
        .port
        .or_else(|| preset.filter(|p| p.has_host()).map(|p| p.port))
        .unwrap_or_else(|| security.default_port());

    if let Some(p) = preset
        && !p.verified
    {
        info!(provider = p.id, "preset has not been verified end to end");
    }

    Ok(Config::builder(host)
        .port(port)
        .security(security)
        .credentials(&conn.user, &conn.password)
        .scan_batch_size(scan_batch_size)
        .build())
}

fn print_providers(json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(providers::all())?);
        return Ok(());
    }
    for p in providers::all() {
        let server = if p.has_host() {
            format!("{}:{}", p.host, p.port)
        } else {
            "(set --host)".to_string()
        };
        let tls = if p.tls { "tls" } else { "plain" };
        let mark = if p.verified { "verified" } else { "" };
        println!("{:<12} {:<26} {:<40} {:<5} {mark}", p.id, p.name, server, tls);
    }
    Ok(())
}

async fn list_folders(
    conn: &ConnectionArgs,
    config: &HarvestConfig,
    json: bool,
) -> anyhow::Result<()> {
    let connector = ImapConnector::new(server_config(conn, config.scan_batch_size)?);
    let mut session = connector
        .connect()
        .await
        .with_context(|| format!("connecting to {}", connector.describe()))?;
    let folders = session.list_folders().await;
    session.disconnect().await;
    let folders = folders.context("listing folders")?;

    if json {
        let list: Vec<_> = folders
            .iter()
            .map(|f| serde_json::json!({ "name": f.name, "display_name": f.display_name }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&list)?);
    } else {
        for folder in &folders {
            println!("{}", folder.display_name);
        }
    }
    Ok(())
}

async fn extract(args: &ExtractArgs, config: HarvestConfig) -> anyhow::Result<ExitCode> {
    let store = FsStore::new(&config.work_dir);
    match store.sweep_expired(config.work_expiry()).await {
        Ok(0) => {}
        Ok(n) => info!(removed = n, "swept expired working directories"),
        Err(e) => warn!(error = %e, "working store sweep failed"),
    }

    let connector = ImapConnector::new(server_config(&args.conn, config.scan_batch_size)?);
    let pipeline = Pipeline::new(connector, Arc::new(store), config);

    let slot = JobSlot::new();
    let (job, mut events) = slot.begin(&args.folder)?;

    let json = args.json;
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event, json);
        }
    });

    let handle = job.handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping after the current batch");
            handle.cancel();
        }
    });

    let result = pipeline.run(&args.folder, &job).await;
    interrupt.abort();
    drop(job);
    if let Err(e) = printer.await {
        warn!(error = %e, "progress printer stopped");
    }

    Ok(match result {
        Ok(outcome) => {
            if !json {
                print_outcome(&outcome);
            }
            ExitCode::SUCCESS
        }
        Err(HarvestError::Cancelled) => ExitCode::from(130),
        Err(_) => ExitCode::FAILURE,
    })
}

fn print_event(event: &ProgressEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "failed to encode progress event"),
        }
        return;
    }

    match (event.kind, event.current, event.total) {
        (EventKind::RunError, ..) => eprintln!("Error: {}", event.message),
        (EventKind::AttachmentFound, ..) => println!("  {}", event.message),
        (_, Some(current), Some(total)) if total > 0 => {
            println!("[{current}/{total}] {}", event.message);
        }
        _ => println!("{}", event.message),
    }
}

fn print_outcome(outcome: &ExtractionOutcome) {
    if outcome.archives.is_empty() {
        println!("No documents found in {}", outcome.folder);
        return;
    }
    for shard in &outcome.archives {
        println!(
            "Wrote {} ({} attachments, {} bytes)",
            shard.path.display(),
            shard.attachment_count(),
            shard.size
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    fn conn(args: &[&str]) -> ConnectionArgs {
        let mut argv = vec!["docharvest", "folders", "--password", "secret"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Folders { conn, .. } => conn,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_provider_preset() {
        let config = server_config(&conn(&["--user", "me@x.com", "--provider", "dreamhost"]), 50)
            .unwrap();
        assert_eq!(config.host, "imap.dreamhost.com");
        assert_eq!(config.port, 993);
        assert_eq!(config.security, Security::Implicit);
        assert_eq!(config.scan_batch_size, 50);
    }

    #[test]
    fn test_provider_guessed_from_address() {
        let config = server_config(&conn(&["--user", "me@gmail.com"]), 100).unwrap();
        assert_eq!(config.host, "imap.gmail.com");
    }

    #[test]
    fn test_explicit_host_without_tls() {
        let config = server_config(
            &conn(&["--user", "me", "--host", "mail.local", "--no-tls"]),
            100,
        )
        .unwrap();
        assert_eq!(config.host, "mail.local");
        assert_eq!(config.port, 143);
        assert_eq!(config.security, Security::None);
    }

    #[test]
    fn test_bridge_preset_is_plaintext() {
        let config =
            server_config(&conn(&["--user", "me@proton.me", "--provider", "protonmail"]), 100)
                .unwrap();
        assert_eq!((config.host.as_str(), config.port), ("127.0.0.1", 1143));
        assert_eq!(config.security, Security::None);
    }

    #[test]
    fn test_unresolvable_server() {
        assert!(server_config(&conn(&["--user", "me@example.org"]), 100).is_err());
        assert!(server_config(&conn(&["--user", "me", "--provider", "custom"]), 100).is_err());
        assert!(server_config(&conn(&["--user", "me", "--provider", "nope"]), 100).is_err());
    }

    #[test]
    fn test_extract_flags_override_config() {
        let cli = Cli::try_parse_from([
            "docharvest",
            "extract",
            "--user",
            "me@gmail.com",
            "--password",
            "pw",
            "--folder",
            "Jobs",
            "--fetch-batch",
            "5",
            "--no-body",
            "--inline-base64",
        ])
        .unwrap();
        let Commands::Extract(args) = cli.command else {
            unreachable!()
        };

        let mut config = HarvestConfig::default();
        args.apply(&mut config);
        assert_eq!(config.fetch_batch_size, 5);
        assert_eq!(config.scan_batch_size, 100);
        assert!(!config.include_body);
        assert!(config.inline_base64);
    }
}
