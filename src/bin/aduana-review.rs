use std::path::PathBuf;

use aduana_review::config::{ReviewConfig, ReviewOptions};
use aduana_review::functions::{DocumentBundle, DocumentFile};
use aduana_review::history::export_csv;
use aduana_review::models::User;
use aduana_review::session::Delivery;
use aduana_review::{error::Result, AduanaReview};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(
    name = "aduana-review",
    version,
    about = "Audit pedimento documents with the hosted AI functions"
)]
struct Cli {
    /// Reviewer name recorded in the report
    #[clap(long, global = true, default_value = "Revisor CLI")]
    user: String,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run an audit and print the resulting report
    Audit {
        #[clap(long, value_name = "PDF", required_unless_present = "certificate_only")]
        pedimento: Option<PathBuf>,

        /// Invoice or other evidence; may be repeated
        #[clap(long, value_name = "PDF")]
        invoice: Vec<PathBuf>,

        #[clap(long, value_name = "PDF")]
        cove: Option<PathBuf>,

        /// Certificate of origin
        #[clap(long, value_name = "PDF")]
        certificate: Option<PathBuf>,

        /// Review only the certificate of origin
        #[clap(long, requires = "certificate")]
        certificate_only: bool,

        /// Print the report as CSV instead of JSON
        #[clap(long)]
        csv: bool,
    },
    /// Ask the customs expert assistant
    Chat {
        #[clap(value_name = "MESSAGE")]
        message: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let review = AduanaReview::new(ReviewConfig::from_env()?, ReviewOptions::default())?;
    let user = User {
        email: format!("cli{}", review.options().email_domain),
        name: cli.user,
        password: String::new(),
        is_super_user: false,
    };

    match cli.command {
        Command::Audit {
            pedimento,
            invoice,
            cove,
            certificate,
            certificate_only,
            csv,
        } => {
            let bundle = if certificate_only {
                match certificate {
                    Some(path) => DocumentBundle::certificate_only(load(path).await?),
                    None => DocumentBundle::audit(),
                }
            } else {
                let mut bundle = DocumentBundle::audit();
                if let Some(path) = pedimento {
                    bundle = bundle.pedimento(load(path).await?);
                }
                for path in invoice {
                    bundle = bundle.invoice(load(path).await?);
                }
                if let Some(path) = cove {
                    bundle = bundle.cove(load(path).await?);
                }
                if let Some(path) = certificate {
                    bundle = bundle.certificate(load(path).await?).include_certificate(true);
                }
                bundle
            };

            let run = review.reviewer().run_audit(&user, &bundle).await?;
            if csv {
                println!("{}", export_csv(&[run.report]));
            } else {
                println!("{}", serde_json::to_string_pretty(&run.report)?);
            }
        }
        Command::Chat { message } => {
            let mut session = review.start_session(user).await?;
            if let Delivery::Answered { reply } = session.send(&message).await? {
                println!("{}", reply);
            }
        }
    }
    Ok(())
}

async fn load(path: PathBuf) -> Result<DocumentFile> {
    Ok(DocumentFile::from_path(path).await?)
}
