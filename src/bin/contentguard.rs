//! ContentGuard CLI binary.
//!
//! Content-policy enforcement gateway for LLM APIs.
//!
//! # Commands
//!
//! - `serve` - Start the moderating gateway
//! - `scan` - Match text against a sensitive-word list
//! - `check` - Run one moderation vendor check
//! - `config` - Print an example configuration

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use contentguard::{
    breaker::{BreakerConfig, CircuitBreaker},
    config::{self, Config, ContentSecurityHandle},
    matcher::{parse_word_list, MatchMode, PatternMatcher},
    moderation::{CheckPhase, CheckerRegistry, ModerationGate},
    proxy::GatewayServer,
    VERSION,
};

#[derive(Parser)]
#[command(name = "contentguard")]
#[command(version = VERSION)]
#[command(about = "ContentGuard - Content-policy enforcement for LLM gateways", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the moderating gateway
    Serve {
        /// Config file (default: <config dir>/contentguard/contentguard.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Upstream API URL
        #[arg(short, long)]
        upstream: Option<String>,

        /// API key injected when clients send none (or OPENAI_API_KEY env)
        #[arg(long)]
        api_key: Option<String>,

        /// Emit logs as JSON lines
        #[arg(long)]
        log_json: bool,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,
    },

    /// Match text against a sensitive-word list
    Scan {
        /// Text to scan (or - for stdin)
        input: Option<String>,

        /// Input file path
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Word list, one keyword per line
        #[arg(short, long)]
        words: PathBuf,

        /// Report every keyword ending at a position, not only the longest
        #[arg(long)]
        all: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run one moderation vendor check
    Check {
        /// Text to check (or - for stdin)
        input: Option<String>,

        /// Input file path
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Vendor name
        #[arg(long, default_value = "zkrj")]
        vendor: String,

        /// Vendor endpoint
        #[arg(long)]
        url: String,

        /// Vendor access key (or CONTENTGUARD_ACCESS_KEY env)
        #[arg(long)]
        access_key: Option<String>,

        /// Vendor access token (or CONTENTGUARD_ACCESS_TOKEN env)
        #[arg(long)]
        access_token: Option<String>,

        /// Which side of the exchange the text is
        #[arg(long, value_enum, default_value = "content")]
        phase: Phase,

        /// Deadline in milliseconds
        #[arg(long, default_value = "1800")]
        timeout_ms: u64,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print an example configuration
    Config {
        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Phase {
    Prompt,
    Content,
}

impl From<Phase> for CheckPhase {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Prompt => CheckPhase::Prompt,
            Phase::Content => CheckPhase::Content,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            port,
            host,
            upstream,
            api_key,
            log_json,
            verbose,
        } => cmd_serve(config, port, host, upstream, api_key, log_json, verbose),

        Commands::Scan {
            input,
            file,
            words,
            all,
            json,
        } => cmd_scan(input, file, &words, all, json),

        Commands::Check {
            input,
            file,
            vendor,
            url,
            access_key,
            access_token,
            phase,
            timeout_ms,
            verbose,
        } => cmd_check(
            input,
            file,
            vendor,
            url,
            access_key,
            access_token,
            phase,
            timeout_ms,
            verbose,
        ),

        Commands::Config { output } => write_output(output, config::EXAMPLE),
    }
}

fn init_logging(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_serve(
    config_path: Option<PathBuf>,
    port: Option<u16>,
    host: Option<String>,
    upstream: Option<String>,
    api_key: Option<String>,
    log_json: bool,
    verbose: bool,
) -> anyhow::Result<()> {
    let file = config_path.or_else(|| {
        dirs::config_dir()
            .map(|dir| dir.join("contentguard").join("contentguard.toml"))
            .filter(|path| path.exists())
    });

    // Loaded before logging is initialized, so rules are logged below.
    let mut config = match &file {
        Some(path) => Config::from_file(path)?.apply_env(),
        None => Config::from_env(),
    };

    if let Some(port) = port {
        config.proxy.port = port;
    }
    if let Some(host) = host {
        config.proxy.host = host;
    }
    if let Some(upstream) = upstream {
        config.proxy.upstream = upstream;
    }
    if let Some(key) = api_key.or_else(|| std::env::var("OPENAI_API_KEY").ok()) {
        config.proxy.api_key = Some(key);
    }

    init_logging(verbose || config.proxy.verbose, log_json);
    match &file {
        Some(path) => tracing::info!("Loaded config from {}", path.display()),
        None => tracing::warn!("No config file, every path is forwarded without rules"),
    }
    config.log_rules();

    let server = GatewayServer::new(config)?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async { server.run().await.map_err(anyhow::Error::from) })
}

fn cmd_scan(
    input: Option<String>,
    file: Option<PathBuf>,
    words: &Path,
    all: bool,
    json: bool,
) -> anyhow::Result<()> {
    let content = read_input(input, file)?;
    let list = parse_word_list(&std::fs::read_to_string(words)?);
    let mode = if all {
        MatchMode::AllPerPosition
    } else {
        MatchMode::FirstPerPosition
    };

    let matcher = PatternMatcher::from_words(list, mode);
    let hits = matcher.search(&content);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "keywords": matcher.len(),
                "hits": hits,
            }))?
        );
    } else if hits.is_empty() {
        println!("No sensitive words found ({} keywords)", matcher.len());
    } else {
        println!("Found {} hit(s):", hits.len());
        for hit in &hits {
            println!("  - {hit}");
        }
    }

    if hits.is_empty() {
        Ok(())
    } else {
        std::process::exit(2);
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_check(
    input: Option<String>,
    file: Option<PathBuf>,
    vendor: String,
    url: String,
    access_key: Option<String>,
    access_token: Option<String>,
    phase: Phase,
    timeout_ms: u64,
    verbose: bool,
) -> anyhow::Result<()> {
    init_logging(verbose, false);
    let text = read_input(input, file)?;

    let handle = ContentSecurityHandle {
        access_key: access_key
            .or_else(|| std::env::var("CONTENTGUARD_ACCESS_KEY").ok())
            .unwrap_or_default(),
        access_token: access_token
            .or_else(|| std::env::var("CONTENTGUARD_ACCESS_TOKEN").ok())
            .unwrap_or_default(),
        breaker: BreakerConfig {
            timeout_ms,
            ..BreakerConfig::default()
        },
        ..ContentSecurityHandle::new(vendor, url)
    };
    handle.validate()?;

    let checkers = CheckerRegistry::with_http_vendors(reqwest::Client::new());
    let checker = checkers.get(&handle.vendor)?;
    let breaker = Arc::new(CircuitBreaker::new(
        format!("{}:cli", checker.vendor()),
        handle.breaker.clone(),
    ));
    let gate = ModerationGate::new(handle, checker, breaker);

    let runtime = tokio::runtime::Runtime::new()?;
    let verdict = runtime.block_on(gate.check(&text, phase.into()));
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}

// Helper functions

fn read_input(input: Option<String>, file: Option<PathBuf>) -> anyhow::Result<String> {
    if let Some(path) = file {
        Ok(std::fs::read_to_string(path)?)
    } else if let Some(s) = input {
        if s == "-" {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        } else {
            Ok(s)
        }
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    }
}

fn write_output(output: Option<PathBuf>, content: &str) -> anyhow::Result<()> {
    if let Some(path) = output {
        std::fs::write(path, content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}
