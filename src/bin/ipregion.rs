//! ipregion: CLI for querying and refreshing an ip2region xdb database.

use clap::{Parser, Subcommand};
use ipregion::{
    data_file, set_data_dir, CachePolicy, CancelToken, OpenOptions, XdbProvider,
    DEFAULT_DOWNLOAD_URL,
};
use std::path::PathBuf;
use std::time::{Duration, UNIX_EPOCH};

#[derive(Parser)]
#[command(name = "ipregion")]
#[command(author = "Kaitu.io")]
#[command(version = "0.1.0")]
#[command(about = "Look up IPv4 region and ISP in an ip2region xdb database", long_about = None)]
struct Cli {
    /// Database file (default: <data dir>/ip2region.xdb)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Data directory used to resolve the default database path
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Cache policy: file, index or content
    #[arg(long, global = true, default_value = "file")]
    cache: CachePolicy,

    /// Download URL for missing or refreshed databases
    #[arg(long, global = true, default_value = DEFAULT_DOWNLOAD_URL)]
    url: String,

    /// Do not report download progress
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up one or more addresses
    Query {
        /// IPv4 addresses in dotted-quad form
        #[arg(required = true)]
        ips: Vec<String>,

        /// Print results as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Download a fresh database and swap it in
    Update {
        /// Only update if the last update is older than this many hours
        #[arg(long)]
        older_than: Option<u64>,
    },

    /// Show database header information
    Info,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Some(dir) = &cli.data_dir {
        set_data_dir(dir);
    }
    let db = cli.db.clone().unwrap_or_else(|| data_file("ip2region.xdb"));

    let mut options = OpenOptions::default()
        .with_cache(cli.cache)
        .with_download_url(cli.url.clone());
    if cli.quiet {
        options = options.without_progress();
    }

    let cancel = CancelToken::new();
    let provider = match XdbProvider::open(&db, options, &cancel) {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!("Error: failed to open {:?}: {}", db, e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Query { ips, json } => query(&provider, &ips, json, &cancel),
        Commands::Update { older_than } => update(&provider, older_than, &cancel),
        Commands::Info => info(&provider),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn query(
    provider: &XdbProvider,
    ips: &[String],
    json: bool,
    cancel: &CancelToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut failed = 0;

    for ip in ips {
        match provider.search(ip, &[], cancel) {
            Ok(region) if json => println!("{}", serde_json::to_string(&region)?),
            Ok(region) => println!("{}", region),
            Err(e) => {
                eprintln!("{:>15}: {}", ip, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(format!("{} of {} lookups failed", failed, ips.len()).into());
    }
    Ok(())
}

fn update(
    provider: &XdbProvider,
    older_than: Option<u64>,
    cancel: &CancelToken,
) -> Result<(), Box<dyn std::error::Error>> {
    match older_than {
        Some(hours) => {
            let interval = older_than_interval(hours);
            if !provider.update_if_needed(interval, cancel)? {
                println!("Database is less than {} hours old, not updated", hours);
                return Ok(());
            }
        }
        None => provider.update(cancel)?,
    }

    let header = provider.header()?;
    println!(
        "Updated {:?}: {} segments",
        provider.path(),
        header.segment_count()
    );
    Ok(())
}

/// Age threshold for `--older-than`, clamped instead of overflowing.
fn older_than_interval(hours: u64) -> Duration {
    Duration::from_secs(hours.saturating_mul(3600))
}

fn info(provider: &XdbProvider) -> Result<(), Box<dyn std::error::Error>> {
    let header = provider.header()?;
    let created = header
        .created()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    println!("Path:          {:?}", provider.path());
    println!("Cache policy:  {}", provider.cache_policy());
    println!("Version:       {}", header.version);
    println!("Index policy:  {}", header.index_policy);
    println!("Created at:    {} (unix seconds)", created);
    println!("Segments:      {}", header.segment_count());
    println!(
        "Segment index: {}..={}",
        header.start_index_ptr, header.end_index_ptr
    );

    match provider.last_updated()? {
        Some(at) => {
            let secs = at
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default();
            println!("Last updated:  {} (unix seconds)", secs);
        }
        None => println!("Last updated:  never"),
    }
    Ok(())
}
