use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use proxy_pool::{
    config::{JudgeConfig, Overflow, PoolConfig, QueueBound},
    proxy::{HttpJudge, ProxyCrawler, ProxyParser, ProxySource, ProxyType},
    ProxyPool,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// A live pool of verified proxies
#[derive(Parser)]
#[command(name = "proxy-pool")]
#[command(about = "A live pool of verified proxies with continuous re-validation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pool until Ctrl-C
    Run(RunArgs),
    /// Judge every proxy in a file once and print the verdicts
    Check {
        /// Input file containing proxies
        input: PathBuf,
        /// Proxy type for entries without a scheme (http, https, socks4, socks5)
        #[arg(short = 't', long, default_value = "http")]
        proxy_type: String,
        /// Number of proxies judged concurrently
        #[arg(short = 'n', long, default_value = "16")]
        threads: usize,
        /// Print verdicts as JSON lines
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        judge: JudgeArgs,
    },
    /// Normalise a proxy list into canonical URIs
    Parse {
        /// Input file containing proxies
        input: PathBuf,
        /// Output file for parsed proxies
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Proxy type for entries without a scheme (http, https, socks4, socks5)
        #[arg(short = 't', long, default_value = "http")]
        proxy_type: String,
    },
}

#[derive(Args)]
struct JudgeArgs {
    /// Probe timeout in seconds
    #[arg(long, default_value = "4")]
    timeout: f64,
    /// Latency above which a proxy is graded slow, in seconds
    #[arg(long, default_value = "2.0")]
    slow_threshold: f64,
}

#[derive(Args)]
struct RunArgs {
    /// Proxy list files ingested once at startup
    #[arg(short, long)]
    seed: Vec<PathBuf>,
    /// URLs crawled for proxies on every feed interval (can specify multiple)
    #[arg(short = 'u', long)]
    source: Vec<String>,
    /// File containing source URLs (one URL per line)
    #[arg(short = 'f', long)]
    source_file: Option<PathBuf>,
    /// Also crawl common free proxy sources
    #[arg(long)]
    common_sources: bool,
    /// Proxy type for entries without a scheme (http, https, socks4, socks5)
    #[arg(short = 't', long, default_value = "http")]
    proxy_type: String,
    /// Number of adjudicator workers
    #[arg(long, default_value = "16")]
    adjudicators: usize,
    /// Number of reviewer workers
    #[arg(long, default_value = "4")]
    reviewers: usize,
    /// Seconds between source crawls
    #[arg(long, default_value = "600")]
    feed_interval: u64,
    /// Seconds between review passes
    #[arg(long, default_value = "60")]
    review_interval: u64,
    /// Milliseconds between review enqueues
    #[arg(long, default_value = "10")]
    review_pacing: u64,
    /// Seconds between status reports
    #[arg(long, default_value = "30")]
    report_interval: u64,
    /// Bound the candidate queue to this many entries
    #[arg(long)]
    queue_capacity: Option<usize>,
    /// What a full candidate queue does
    #[arg(long, value_enum, default_value = "block")]
    overflow: OverflowArg,
    /// Print final stats as JSON on exit
    #[arg(long)]
    json: bool,
    #[command(flatten)]
    judge: JudgeArgs,
}

#[derive(Clone, Copy, ValueEnum)]
enum OverflowArg {
    Block,
    DropOldest,
    Reject,
}

impl From<OverflowArg> for Overflow {
    fn from(arg: OverflowArg) -> Self {
        match arg {
            OverflowArg::Block => Overflow::Block,
            OverflowArg::DropOldest => Overflow::DropOldest,
            OverflowArg::Reject => Overflow::Reject,
        }
    }
}

impl JudgeArgs {
    fn to_config(&self) -> Result<JudgeConfig> {
        let timeout = Duration::try_from_secs_f64(self.timeout).context("invalid --timeout")?;
        let slow = Duration::try_from_secs_f64(self.slow_threshold)
            .context("invalid --slow-threshold")?;
        Ok(JudgeConfig::new().with_timeout(timeout).with_slow_threshold(slow))
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format.eq_ignore_ascii_case("json") {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args).await?,
        Commands::Check {
            input,
            proxy_type,
            threads,
            json,
            judge,
        } => {
            let ptype = parse_proxy_type(&proxy_type)?;
            let content = std::fs::read_to_string(&input)
                .with_context(|| format!("cannot read {}", input.display()))?;
            let proxies = ProxyParser::parse_candidates(&content, ptype);
            info!(count = proxies.len(), threads, "judging proxies");

            let judge = HttpJudge::with_config(judge.to_config()?);
            for (proxy, verdict) in judge.judge_all(proxies, threads).await {
                if json {
                    let line = serde_json::json!({ "proxy": proxy, "verdict": verdict });
                    println!("{line}");
                } else {
                    println!(
                        "[{}] ({}) {:.1}s <{} {}>",
                        verdict.grade,
                        verdict
                            .status
                            .map_or_else(|| "---".to_string(), |s| s.to_string()),
                        verdict.latency_secs(),
                        verdict.label(),
                        proxy
                    );
                }
            }
        }
        Commands::Parse {
            input,
            output,
            proxy_type,
        } => {
            let ptype = parse_proxy_type(&proxy_type)?;
            let content = std::fs::read_to_string(&input)
                .with_context(|| format!("cannot read {}", input.display()))?;
            let proxies = ProxyParser::parse_candidates(&content, ptype);

            if let Some(output_path) = output {
                ProxyParser::save_to_file(&proxies, &output_path)?;
                info!(count = proxies.len(), output = %output_path.display(), "saved parsed proxies");
            } else {
                for proxy in &proxies {
                    println!("{proxy}");
                }
            }
        }
    }

    Ok(())
}

async fn run(args: RunArgs) -> Result<()> {
    let ptype = parse_proxy_type(&args.proxy_type)?;

    let mut sources: Vec<ProxySource> = args
        .source
        .iter()
        .map(|url| ProxySource::from_url(url, ptype.clone()))
        .collect();
    if let Some(path) = &args.source_file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        sources.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(|url| ProxySource::from_url(url, ptype.clone())),
        );
    }
    if args.common_sources {
        sources.extend(ProxyCrawler::get_common_sources());
    }

    let candidate_queue = match args.queue_capacity {
        Some(capacity) => QueueBound::bounded(capacity, args.overflow.into()),
        None => QueueBound::Unbounded,
    };

    let config = PoolConfig::new()
        .with_adjudicators(args.adjudicators)
        .with_reviewers(args.reviewers)
        .with_feed_interval(Duration::from_secs(args.feed_interval))
        .with_review_interval(Duration::from_secs(args.review_interval))
        .with_review_pacing(Duration::from_millis(args.review_pacing))
        .with_report_interval(Duration::from_secs(args.report_interval))
        .with_candidate_queue(candidate_queue)
        .with_sources(sources)
        .with_judge(args.judge.to_config()?);

    let pool = ProxyPool::with_config(config)?;
    let running = pool.start();

    for path in &args.seed {
        let proxies = ProxyParser::parse_file(path, ptype.clone())?;
        let queued = pool.ingest_all(proxies.iter().map(|proxy| proxy.url())).await;
        info!(count = proxies.len(), queued, seed = %path.display(), "seed list ingested");
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    running.shutdown().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&pool.stats())?);
    } else {
        for proxy in pool.list_http() {
            println!("http  {proxy}");
        }
        for proxy in pool.list_https() {
            println!("https {proxy}");
        }
    }

    Ok(())
}

fn parse_proxy_type(s: &str) -> Result<ProxyType> {
    match s.to_lowercase().as_str() {
        "http" => Ok(ProxyType::Http),
        "https" => Ok(ProxyType::Https),
        "socks4" => Ok(ProxyType::Socks4),
        "socks5" => Ok(ProxyType::Socks5),
        _ => Err(anyhow!(
            "Invalid proxy type: {}. Use: http, https, socks4, socks5",
            s
        )),
    }
}
