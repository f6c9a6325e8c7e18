//! mailguard daemon
//!
//! Loads configuration, opens the decision store and scoring model, and
//! periodically triggers a sweep over the configured folder. Credentials are
//! taken from the environment at startup and captured as an immutable
//! snapshot per sweep; obtaining and refreshing tokens is the deployment's
//! concern.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mailguard::config::AppConfig;
use mailguard::mailbox::{rest::RestMailbox, CredentialSnapshot};
use mailguard::narrative::Synthesizer;
use mailguard::scan::{ScanCoordinator, ScanRequest};
use mailguard::scorer::Scorer;
use mailguard::store::DecisionStore;
use mailguard::types::error::MailguardError;

/// Seconds between triggered sweeps.
const SWEEP_INTERVAL_SECS: u64 = 300;

#[tokio::main]
async fn main() {
    // In debug builds default to debug logs for our crate, info for others.
    // Can be overridden with RUST_LOG.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            EnvFilter::new("mailguard=debug,info")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting mailguard ...");

    if let Err(e) = run().await {
        error!("mailguard exited with error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), MailguardError> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "mailguard.toml".to_string());
    let config = AppConfig::load(&config_path)?;

    let account = std::env::var("MAILGUARD_ACCOUNT")
        .map_err(|_| MailguardError::Config("MAILGUARD_ACCOUNT not set".into()))?;
    let access_token = std::env::var("MAILGUARD_ACCESS_TOKEN")
        .map_err(|_| MailguardError::Config("MAILGUARD_ACCESS_TOKEN not set".into()))?;

    let store = Arc::new(DecisionStore::open(&config.storage.db_path)?);
    let scorer = Arc::new(Scorer::load(&config.scorer.model_path));
    if !scorer.is_available() {
        info!("Running without a scoring model: all messages pass through unclassified");
    }

    let mailbox = Arc::new(RestMailbox::new(&config.mailbox));
    let synthesizer = Arc::new(Synthesizer::from_config(&config.narrative));

    let coordinator = ScanCoordinator::new(
        mailbox,
        store.clone(),
        scorer,
        synthesizer,
        config.scan.clone(),
        Duration::from_secs(config.mailbox.call_timeout_secs),
    );

    let mut interval = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
    loop {
        interval.tick().await;

        let creds = CredentialSnapshot::new(account.clone(), access_token.clone());
        let ack = coordinator.start_scan(creds, ScanRequest::default());
        info!(
            "Triggered sweep {} (max_messages={}, page_size={})",
            ack.sweep_id, ack.max_messages, ack.page_size
        );

        let stats = store.stats()?;
        info!(
            "Decision log: {} total, {} phishing, {} safe",
            stats.total, stats.phishing, stats.safe
        );
    }
}
