use certificate_notary::application::Severity;
use certificate_notary::handlers::{
    handle_fetch, handle_hash, handle_issue, handle_list, handle_verify, handle_verify_file,
    open_registry, CommandReport,
};
use certificate_notary::infrastructure::config::{database_path_from_env, NotaryConfig};
use certificate_notary::infrastructure::gateway::{ContentStore, GatewayClient};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "certificate-notary")]
#[command(about = "Anchor document hashes in a certificate registry and verify them", long_about = None)]
struct Args {
    /// Use the local SQLite registry at NOTARY_DB_PATH instead of the HTTP registry
    #[arg(long, global = true)]
    local: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Hash a document and submit it to the registry
    Issue {
        file: PathBuf,
        #[arg(long)]
        issued_to: String,
        #[arg(long)]
        issued_by: String,
        /// With --local, do not pin a snapshot of the document to the gateway.
        /// The HTTP registry pins uploaded documents itself.
        #[arg(long)]
        no_snapshot: bool,
    },
    /// Look a certificate hash up in the registry
    Verify {
        hash: String,
        /// Also fetch the stored snapshot and re-hash it
        #[arg(long)]
        check_content: bool,
    },
    /// Hash a local document and look it up in the registry
    VerifyFile { file: PathBuf },
    /// List issued certificates
    List {
        #[arg(long)]
        search: Option<String>,
    },
    /// Fetch a stored snapshot from the gateway
    Fetch {
        content_id: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the digest of a local file
    Hash { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("certificate_notary=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = NotaryConfig::from_env()?;
    let local_db = args.local.then(database_path_from_env);
    let gateway = Arc::new(GatewayClient::new(&config));
    info!("Gateway at {}", config.gateway_url);

    let report = match args.command {
        Command::Issue {
            file,
            issued_to,
            issued_by,
            no_snapshot,
        } => {
            let registry = open_registry(&config, local_db.as_deref())?;
            let store = (args.local && !no_snapshot)
                .then(|| gateway.clone() as Arc<dyn ContentStore>);
            handle_issue(registry, store, &file, &issued_to, &issued_by).await?
        }
        Command::Verify {
            hash,
            check_content,
        } => {
            let registry = open_registry(&config, local_db.as_deref())?;
            handle_verify(registry, gateway, &hash, check_content).await?
        }
        Command::VerifyFile { file } => {
            let registry = open_registry(&config, local_db.as_deref())?;
            handle_verify_file(registry, gateway, &file).await?
        }
        Command::List { search } => {
            let registry = open_registry(&config, local_db.as_deref())?;
            handle_list(registry, search.as_deref()).await?
        }
        Command::Fetch { content_id, output } => {
            handle_fetch(gateway, &content_id, output.as_deref()).await?
        }
        Command::Hash { file } => handle_hash(&file)?,
    };

    print_report(&report)?;
    if report.severity == Severity::Attention {
        error!("Command finished with a failure that needs attention");
        std::process::exit(1);
    }

    Ok(())
}

fn print_report(report: &CommandReport) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(&report.output)?);
    Ok(())
}
