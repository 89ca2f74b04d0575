use anyhow::Result;
use clap::{Parser, Subcommand};
use queryroute_core::PageFetcher;
use queryroute_local::extract::{self, DEFAULT_TEXT_WIDTH};
use queryroute_local::openai_compat::OpenAiCompatClient;
use queryroute_local::router::Router;
use queryroute_local::search::{search_context, SerpApiSearchProvider};
use queryroute_local::{LocalFetcher, Settings};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod shell;

#[derive(Parser, Debug)]
#[command(name = "queryroute")]
#[command(
    about = "Answer queries from a scraped URL, the model's own knowledge, or web search",
    long_about = None
)]
struct Cli {
    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(flatten)]
    overrides: Overrides,
    #[command(subcommand)]
    command: Commands,
}

/// Flags that take precedence over `QUERYROUTE_*` environment settings.
#[derive(clap::Args, Debug)]
struct Overrides {
    /// Chat model identifier.
    #[arg(long, global = true)]
    model: Option<String>,
    /// Fetch attempts per URL.
    #[arg(long, global = true)]
    retries: Option<u32>,
    /// Delay between fetch attempts (ms).
    #[arg(long, global = true)]
    delay_ms: Option<u64>,
    /// Keep a per-URL copy of every scraped page in this directory.
    #[arg(long, global = true)]
    scrape_dir: Option<PathBuf>,
}

impl Overrides {
    fn apply(self, mut s: Settings) -> Settings {
        if let Some(m) = self.model {
            s.model = m;
        }
        if let Some(r) = self.retries {
            s.fetch.retries = r;
        }
        if let Some(d) = self.delay_ms {
            s.fetch.delay_ms = d;
        }
        if self.scrape_dir.is_some() {
            s.scrape_dir = self.scrape_dir;
        }
        s
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive chat: one query per line, full history after each answer.
    Chat,
    /// Answer a single query and exit.
    Ask(AskCmd),
    /// Fetch a URL, strip it to plain text, and save it to a file.
    Scrape(ScrapeCmd),
    /// Print the formatted web-search context for a query.
    Search(SearchCmd),
    /// Diagnose configuration (json; no secrets).
    Doctor(DoctorCmd),
}

#[derive(clap::Args, Debug)]
struct AskCmd {
    query: String,
    /// Print the routing outcome as JSON instead of the bare response.
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args, Debug)]
struct ScrapeCmd {
    url: String,
    /// Output path; overwritten on every run.
    #[arg(long, default_value = "output.txt")]
    out: PathBuf,
    /// Wrap width for the extracted text.
    #[arg(long, default_value_t = DEFAULT_TEXT_WIDTH)]
    width: usize,
}

#[derive(clap::Args, Debug)]
struct SearchCmd {
    query: String,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent("queryroute/0.1")
        .connect_timeout(Duration::from_secs(10))
        .build()?)
}

fn build_router(settings: &Settings) -> Result<Router> {
    let client = http_client()?;
    let model = OpenAiCompatClient::from_settings(client.clone(), settings)?;
    let search = SerpApiSearchProvider::from_settings(client, settings)?;
    let fetcher = LocalFetcher::new(settings.fetch.clone())?;
    info!(model = model.model(), "router ready");
    Ok(
        Router::new(Arc::new(model), Arc::new(fetcher), Arc::new(search))
            .with_scrape_dir(settings.scrape_dir.clone()),
    )
}

fn init_tracing(verbose: bool) -> Result<()> {
    let default = if verbose {
        "queryroute=debug,queryroute_local=debug"
    } else {
        "queryroute=info,queryroute_local=info"
    };
    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::try_new(v)?,
        _ => EnvFilter::try_new(default)?,
    };
    // stdout carries answers; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Don't override explicit process env.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose)?;
    let settings = cli.overrides.apply(Settings::from_env());

    match cli.command {
        Commands::Chat => {
            let router = build_router(&settings)?;
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let session = shell::run(&router, stdin, std::io::stdout()).await?;
            info!(turns = session.len(), "session ended");
        }
        Commands::Ask(args) => {
            let router = build_router(&settings)?;
            let outcome = router.route(&args.query).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", outcome.response);
            }
        }
        Commands::Scrape(args) => {
            let fetcher = LocalFetcher::new(settings.fetch.clone())?;
            info!(
                url = args.url.as_str(),
                retries = fetcher.settings().retries,
                delay_ms = fetcher.settings().delay_ms,
                "scraping"
            );
            let html = fetcher.fetch_html(&args.url).await;
            match extract::extract_and_persist(&args.url, html.as_deref(), &args.out, args.width)?
            {
                Some(_) => println!("Data from {} saved to {}", args.url, args.out.display()),
                None => anyhow::bail!("failed to retrieve content from {}", args.url),
            }
        }
        Commands::Search(args) => {
            let provider = SerpApiSearchProvider::from_settings(http_client()?, &settings)?;
            println!("{}", search_context(&provider, &args.query).await);
        }
        Commands::Doctor(args) => {
            // Booleans only; never print values.
            let mut checks = vec![
                serde_json::json!({
                    "name": "openai_api_key",
                    "ok": settings.openai_api_key.is_some(),
                    "hint": "Set QUERYROUTE_OPENAI_API_KEY (or OPENAI_API_KEY).",
                }),
                serde_json::json!({
                    "name": "serpapi_key",
                    "ok": settings.serpapi_key.is_some(),
                    "hint": "Set QUERYROUTE_SERPAPI_KEY (or SERP_API_KEY).",
                }),
            ];
            if let Some(dir) = &settings.scrape_dir {
                let writable = (|| -> Result<()> {
                    std::fs::create_dir_all(dir)?;
                    let probe = dir.join("queryroute-doctor.probe");
                    std::fs::write(&probe, b"ok")?;
                    let _ = std::fs::remove_file(&probe);
                    Ok(())
                })()
                .is_ok();
                checks.push(serde_json::json!({
                    "name": "scrape_dir_writable",
                    "ok": writable,
                    "hint": "Set QUERYROUTE_SCRAPE_DIR to a writable directory.",
                }));
            }
            let ok = checks.iter().all(|c| c["ok"].as_bool() == Some(true));
            let report = serde_json::json!({
                "schema_version": 1,
                "kind": "doctor",
                "ok": ok,
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
                "settings": settings.redacted_json(),
                "checks": checks,
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => {
                    for c in &checks {
                        let mark = if c["ok"].as_bool() == Some(true) { "ok" } else { "missing" };
                        println!("{:<22} {mark}", c["name"].as_str().unwrap_or(""));
                    }
                }
                _ => println!("{}", serde_json::to_string_pretty(&report)?),
            }
        }
    }
    Ok(())
}
