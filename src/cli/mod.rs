pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "registro")]
#[command(about = "Protocol registry - numbering, filing and register maintenance")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Create or update the database schema")]
    Migrate,

    #[command(about = "Show protocol counters")]
    Counters {
        #[arg(long, help = "Only counters of this year")]
        year: Option<i32>,
    },

    #[command(about = "File a PDF: allocate a number, stamp, upload and record it")]
    File {
        #[arg(help = "Path to the PDF to file")]
        pdf: std::path::PathBuf,
        #[arg(long = "type", short = 't', help = "Protocol type: E (entrata), U (uscita), I (interno)")]
        protocol_type: String,
        #[arg(long, help = "Subject of the document")]
        subject: Option<String>,
        #[arg(long, help = "Sender or recipient")]
        counterparty: Option<String>,
        #[arg(long, short = 'o', help = "Write the stamped PDF here")]
        output: Option<std::path::PathBuf>,
    },

    #[command(about = "List the register")]
    List {
        #[arg(long, help = "Year (defaults to the current one)")]
        year: Option<i32>,
        #[arg(long = "type", short = 't', help = "Only this protocol type")]
        protocol_type: Option<String>,
        #[arg(long, help = "Case-insensitive text search")]
        search: Option<String>,
    },

    #[command(about = "Export the register of a year as CSV")]
    Export {
        #[arg(long, help = "Year (defaults to the current one)")]
        year: Option<i32>,
        #[arg(long = "type", short = 't', help = "Only this protocol type")]
        protocol_type: Option<String>,
        #[arg(long, short = 'o', help = "Write here instead of the default file name")]
        output: Option<std::path::PathBuf>,
    },

    #[command(about = "List users")]
    Users,

    #[command(about = "Create a user")]
    UserAdd {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "operator", help = "admin or operator")]
        role: String,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
        #[arg(long)]
        email: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Migrate => commands::database::migrate(output_format).await,
        Commands::Counters { year } => commands::registry::counters(year, output_format).await,
        Commands::File {
            pdf,
            protocol_type,
            subject,
            counterparty,
            output,
        } => {
            let args = commands::registry::FileArgs {
                pdf,
                protocol_type,
                subject,
                counterparty,
                output,
            };
            commands::registry::file(args, output_format).await
        }
        Commands::List {
            year,
            protocol_type,
            search,
        } => commands::registry::list(year, protocol_type, search, output_format).await,
        Commands::Export {
            year,
            protocol_type,
            output,
        } => commands::registry::export(year, protocol_type, output, output_format).await,
        Commands::Users => commands::user::list(output_format).await,
        Commands::UserAdd {
            username,
            password,
            role,
            first_name,
            last_name,
            email,
        } => {
            let role = role.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            let new_user = crate::auth::NewUser {
                username,
                password,
                first_name,
                last_name,
                email,
                role,
            };
            commands::user::add(new_user, output_format).await
        }
    }
}
