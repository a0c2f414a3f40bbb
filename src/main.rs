use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use ehr_ai::config::{self, Settings};
use ehr_ai::core_state::CoreState;
use ehr_ai::provisioning::seed_facilities;

#[derive(Parser)]
#[command(name = "ehr-ai-services", version, about = "EHR AI Services API server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default).
    Serve {
        /// Overrides BIND_ADDR.
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Provision the sample facilities when the database has none.
    SeedFacilities,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(Command::Serve { bind: Some(addr) }) = &cli.command {
        settings.bind_addr = *addr;
    }

    ehr_ai::init_tracing(&settings);
    tracing::info!(
        version = config::APP_VERSION,
        environment = %settings.environment,
        "{} starting",
        config::APP_NAME
    );

    let core = Arc::new(CoreState::new(settings));
    if let Err(e) = core.ensure_directories() {
        tracing::error!(error = %e, "Failed to create data directories");
        return ExitCode::FAILURE;
    }

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::SeedFacilities => seed(&core),
        Command::Serve { .. } => {
            core.initialize_ai();
            match ehr_ai::api::serve(core).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    tracing::error!(error = %e, "Server failed");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn seed(core: &CoreState) -> ExitCode {
    let result = core
        .open_db()
        .map_err(|e| e.to_string())
        .and_then(|mut conn| seed_facilities(&mut conn).map_err(|e| e.to_string()));

    match result {
        Ok(created) => {
            for provisioned in &created {
                tracing::info!(
                    facility_id = %provisioned.facility.id,
                    name = %provisioned.facility.name,
                    "Seeded facility"
                );
            }
            tracing::info!(count = created.len(), "Seeding finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Seeding failed");
            ExitCode::FAILURE
        }
    }
}
