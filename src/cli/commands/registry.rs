use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{Datelike, Local};
use serde_json::json;
use std::path::PathBuf;

use super::connect;
use crate::cli::utils::{format_table, output_success};
use crate::cli::OutputFormat;
use crate::config;
use crate::registry::{export as register_export, query, FilingRequest, ListFilter};
use crate::state::AppState;
use crate::storage;
use crate::types::ProtocolType;

pub struct FileArgs {
    pub pdf: PathBuf,
    pub protocol_type: String,
    pub subject: Option<String>,
    pub counterparty: Option<String>,
    pub output: Option<PathBuf>,
}

pub async fn counters(year: Option<i32>, output_format: OutputFormat) -> anyhow::Result<()> {
    let pool = connect().await?;
    let counters = query::counters(&pool, year).await?;

    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&json!({ "counters": counters }))?),
        OutputFormat::Text => {
            if counters.is_empty() {
                println!("No counters yet");
                return Ok(());
            }
            let rows: Vec<Vec<String>> = counters
                .iter()
                .map(|c| {
                    vec![
                        c.year.to_string(),
                        c.protocol_type.clone(),
                        c.last_seq.to_string(),
                        c.updated_at.with_timezone(&Local).format("%d/%m/%Y %H:%M").to_string(),
                    ]
                })
                .collect();
            println!("{}", format_table(&["year", "type", "last", "updated"], &rows));
        }
    }
    Ok(())
}

pub async fn file(args: FileArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let config = config::config();
    let bytes = tokio::fs::read(&args.pdf)
        .await
        .with_context(|| format!("reading {}", args.pdf.display()))?;

    let pool = connect().await?;
    let storage = storage::from_config(&config.storage)?;
    let state = AppState::new(pool, config, storage);

    let request = FilingRequest {
        protocol_type: Some(args.protocol_type),
        subject: args.subject,
        counterparty: args.counterparty,
        file_name: args
            .pdf
            .file_name()
            .map(|n| n.to_string_lossy().into_owned()),
        pdf_base64: Some(STANDARD.encode(&bytes)),
        filed_by: std::env::var("USER").ok(),
    };
    let receipt = state.registry.file(request).await?;

    if let Some(output) = &args.output {
        tokio::fs::write(output, &receipt.pdf)
            .await
            .with_context(|| format!("writing {}", output.display()))?;
    }

    output_success(
        &output_format,
        &format!("Filed as {} ({})", receipt.protocol_number, receipt.storage_url),
        Some(json!({
            "id": receipt.id,
            "protocol_number": receipt.protocol_number,
            "protocol_date": receipt.protocol_date,
            "storage_url": receipt.storage_url,
            "stored_file_name": receipt.stored_file_name,
            "sha256": receipt.sha256,
        })),
    )
}

pub async fn list(
    year: Option<i32>,
    protocol_type: Option<String>,
    search: Option<String>,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let protocol_type = protocol_type.map(|t| t.parse::<ProtocolType>()).transpose()?;
    let filter = ListFilter {
        year,
        protocol_type,
        search,
    };
    let year = year.unwrap_or_else(|| Local::now().year());

    let pool = connect().await?;
    let register = query::list(&pool, year, &filter).await?;

    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&register)?),
        OutputFormat::Text => {
            let rows: Vec<Vec<String>> = register
                .records
                .iter()
                .map(|r| {
                    vec![
                        r.record.protocol_number.clone(),
                        r.record.protocol_date.with_timezone(&Local).format("%d/%m/%Y").to_string(),
                        r.record.counterparty.clone(),
                        r.record.subject.clone(),
                        r.document_count.to_string(),
                    ]
                })
                .collect();
            println!(
                "{}",
                format_table(&["number", "date", "counterparty", "subject", "docs"], &rows)
            );
            let t = &register.totals;
            println!(
                "\n{}: {} total ({} E, {} U, {} I)",
                register.year, t.total, t.incoming, t.outgoing, t.internal
            );
        }
    }
    Ok(())
}

pub async fn export(
    year: Option<i32>,
    protocol_type: Option<String>,
    output: Option<PathBuf>,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let protocol_type = protocol_type.map(|t| t.parse::<ProtocolType>()).transpose()?;
    let today = Local::now().date_naive();
    let year = year.unwrap_or_else(|| today.year());

    let pool = connect().await?;
    let rows = register_export::rows(&pool, year, protocol_type).await?;
    let csv = register_export::to_csv(&rows)?;

    let path = output.unwrap_or_else(|| PathBuf::from(register_export::file_name(year, protocol_type, today)));
    tokio::fs::write(&path, &csv)
        .await
        .with_context(|| format!("writing {}", path.display()))?;

    output_success(
        &output_format,
        &format!("Exported {} rows to {}", rows.len(), path.display()),
        Some(json!({ "rows": rows.len(), "path": path.display().to_string() })),
    )
}
