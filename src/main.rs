use clap::Parser;
use miette::{IntoDiagnostic, Result};
use rtgs_settler::application::runner::{RunSummary, SettlementRunner};
use rtgs_settler::application::settler::TransactionSettler;
use rtgs_settler::config::Settings;
use rtgs_settler::domain::ports::{EventSourceBox, SettlementLedgerBox};
use rtgs_settler::infrastructure::credential::{
    CredentialBox, ManagedIdentityCredential, StaticTokenCredential,
};
use rtgs_settler::infrastructure::digital_twins::DigitalTwinsClient;
use rtgs_settler::infrastructure::in_memory::InMemorySettlementLedger;
use rtgs_settler::interfaces::json::event_reader::JsonLinesEventSource;
use rtgs_settler::telemetry::{LogFormat, init_logging};
use std::path::PathBuf;
use tokio::io::BufReader;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Newline-delimited JSON transaction events. Reads stdin when omitted or "-".
    input: Option<PathBuf>,

    /// TOML settings file (optional).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to persistent settlement ledger (optional). If provided, uses RocksDB.
    #[arg(long)]
    ledger_path: Option<PathBuf>,

    /// Consume from the configured Event Hub instead of a file.
    #[arg(long)]
    event_hub: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let settings = Settings::load(cli.config.as_deref()).into_diagnostic()?;
    let endpoint = settings.require_adt_instance_url().into_diagnostic()?;

    let credential: CredentialBox = match &settings.adt_access_token {
        Some(token) => Box::new(StaticTokenCredential::new(token.clone())),
        None => {
            let http = reqwest::Client::builder()
                .timeout(settings.request_timeout())
                .build()
                .into_diagnostic()?;
            Box::new(ManagedIdentityCredential::from_env(
                http,
                settings.adt_resource.clone(),
            ))
        }
    };

    let twins = DigitalTwinsClient::new(
        endpoint,
        settings.adt_api_version.clone(),
        credential,
        settings.request_timeout(),
    )
    .into_diagnostic()?;
    info!(endpoint = %twins.endpoint(), "twin store configured");

    let ledger_path = cli
        .ledger_path
        .clone()
        .or_else(|| settings.ledger_path.clone().map(PathBuf::from));
    let ledger = open_ledger(ledger_path)?;

    let runner = SettlementRunner::new(TransactionSettler::new(Box::new(twins), ledger));
    let mut source = open_source(&cli, &settings).await?;

    let summary: RunSummary = tokio::select! {
        result = runner.run(source.as_mut()) => result.into_diagnostic()?,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, stopping");
            return Ok(());
        }
    };

    println!("{}", serde_json::to_string(&summary).into_diagnostic()?);
    Ok(())
}

fn open_ledger(path: Option<PathBuf>) -> Result<SettlementLedgerBox> {
    match path {
        Some(path) => {
            #[cfg(feature = "storage-rocksdb")]
            {
                use rtgs_settler::infrastructure::rocksdb::RocksDBSettlementLedger;
                let ledger = RocksDBSettlementLedger::open(&path).into_diagnostic()?;
                info!(path = %path.display(), "using persistent settlement ledger");
                Ok(Box::new(ledger))
            }
            #[cfg(not(feature = "storage-rocksdb"))]
            {
                warn!(
                    path = %path.display(),
                    "Persistent ledger requested via --ledger-path, but 'storage-rocksdb' feature is not enabled. Falling back to in-memory ledger."
                );
                Ok(Box::new(InMemorySettlementLedger::new()))
            }
        }
        None => Ok(Box::new(InMemorySettlementLedger::new())),
    }
}

async fn open_source(cli: &Cli, settings: &Settings) -> Result<EventSourceBox> {
    if cli.event_hub {
        #[cfg(feature = "event-hub-kafka")]
        {
            use rtgs_settler::interfaces::kafka::event_consumer::KafkaEventSource;
            let source = KafkaEventSource::from_settings(settings).into_diagnostic()?;
            return Ok(Box::new(source));
        }
        #[cfg(not(feature = "event-hub-kafka"))]
        {
            let _ = settings;
            miette::bail!("the 'event-hub-kafka' feature is required for --event-hub");
        }
    }

    match &cli.input {
        Some(path) if path.as_os_str() != "-" => {
            let file = tokio::fs::File::open(path).await.into_diagnostic()?;
            Ok(Box::new(JsonLinesEventSource::new(BufReader::new(file))))
        }
        _ => Ok(Box::new(JsonLinesEventSource::new(BufReader::new(
            tokio::io::stdin(),
        )))),
    }
}
