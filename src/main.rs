use anyhow::{bail, Context, Result};
use clap::Parser;
use env_logger::Env;
use log::info;
use std::io;
use std::path::PathBuf;

use mailsift::{
    CategoryRouter, Config, CredentialStore, FailurePolicy, GeminiClassifier, ImapStore, Pipeline,
    RateLimiter, RunOptions, RunStats,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to config.toml (defaults to the user config directory).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Classifier API key, overrides the config file.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Messages fetched per batch.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Minimum seconds between classification requests.
    #[arg(long)]
    delay_secs: Option<u64>,

    /// Classify and log decisions without moving anything.
    #[arg(long)]
    dry_run: bool,

    /// Skip a message whose classification or move fails instead of stopping.
    #[arg(long)]
    continue_on_error: bool,

    /// Debug logging (RUST_LOG still wins).
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    let config_path = match &args.config {
        Some(p) => p.clone(),
        None => Config::path()?,
    };
    let (mut config, created) = Config::load_or_create(&config_path)?;
    if created {
        println!(
            "{} created. Fill in your server and classifier settings, then run again.",
            config_path.display()
        );
        return Ok(());
    }

    if let Some(key) = args.api_key.clone() {
        config.classifier.api_key = key;
    }
    if let Some(n) = args.batch_size {
        config.routing.batch_size = n;
    }
    if let Some(secs) = args.delay_secs {
        config.routing.request_delay_secs = secs;
    }
    config.validate()?;
    if config.classifier.api_key.trim().is_empty() {
        bail!("no classifier API key: set classifier.api_key or GEMINI_API_KEY");
    }

    let cred_dir = config_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    let cred_store = CredentialStore::new(cred_dir.join("credentials.json"));
    let creds = {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        cred_store
            .obtain(&mut input, &mut io::stdout(), config.imap.login_domain.as_deref())
            .with_context(|| format!("reading credentials ({})", cred_store.path().display()))?
    };

    let options = RunOptions {
        batch_size: config.routing.batch_size,
        dry_run: args.dry_run,
        on_error: if args.continue_on_error {
            FailurePolicy::Skip
        } else {
            FailurePolicy::Abort
        },
    };

    // IMAP and the HTTP client both block
    let stats = tokio::task::spawn_blocking(move || -> Result<RunStats> {
        let router = CategoryRouter::new(config.routing.inbox.clone(), &config.routing.categories);
        let classifier = GeminiClassifier::new(&config.classifier, config.routing.categories.clone())?;
        let limiter = RateLimiter::new(config.routing.request_delay());

        info!("Connecting to {}:{}...", config.imap.host, config.imap.port);
        let mut store = ImapStore::connect(&config.imap, &creds)?;
        info!("Login successful. Starting email processing...");

        let mut pipeline = Pipeline::new(classifier, router, limiter, options);
        let result = pipeline.run(&mut store);
        store.logout();
        Ok(result?)
    })
    .await
    .context("processing task panicked")??;

    println!(
        "Done: {} considered, {} moved, {} left in place, {} failed",
        stats.considered, stats.moved, stats.left, stats.failed
    );
    Ok(())
}
