use anyhow::Context;
use clap::Parser;
use specmock_stub::{
    Contract, FanoutSink, LogFormat, MemorySink, ServerConfig, StubEngine, StubServer, TelemetrySink,
    TracingSink,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "specmock-stub",
    version,
    about = "Contract-validated HTTP stub server"
)]
struct Args {
    /// YAML configuration file; flags override its values
    #[arg(short, long, env = "SPECMOCK_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "SPECMOCK_HOST")]
    host: Option<String>,

    #[arg(short, long, env = "SPECMOCK_PORT")]
    port: Option<u16>,

    /// Contract file (repeatable)
    #[arg(long = "contract", env = "SPECMOCK_CONTRACTS", value_delimiter = ',')]
    contracts: Vec<PathBuf>,

    /// Stub file or directory (repeatable)
    #[arg(long = "stubs", env = "SPECMOCK_STUBS", value_delimiter = ',')]
    stubs: Vec<PathBuf>,

    /// Answer unmatched requests with 400 instead of generating a response
    #[arg(long, env = "SPECMOCK_STRICT")]
    strict: bool,

    #[arg(long, env = "SPECMOCK_MAX_EXTERNAL_COMMANDS")]
    max_external_commands: Option<usize>,

    #[arg(long, value_enum, env = "SPECMOCK_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => ServerConfig::default(),
        };
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        config.contracts.extend(self.contracts);
        config.stubs.extend(self.stubs);
        config.strict |= self.strict;
        if let Some(max) = self.max_external_commands {
            config.max_external_commands = max;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config()?;
    init_tracing(config.log_format);

    let contract = Contract::from_files(&config.contracts).context("Failed to load contracts")?;
    info!(
        contracts = config.contracts.len(),
        operations = contract.operations().len(),
        mode = ?config.mode(),
        "Contracts loaded"
    );

    let sinks: Vec<Arc<dyn TelemetrySink>> =
        vec![Arc::new(TracingSink), Arc::new(MemorySink::default())];
    let engine = StubEngine::new(contract, config.mode())
        .with_telemetry(Arc::new(FanoutSink::new(sinks)))
        .with_max_external_commands(config.max_external_commands);
    engine.load_files(&config.stubs);

    let server = StubServer::bind(&config.bind_addr(), Arc::new(engine)).await?;
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;
    Ok(())
}
