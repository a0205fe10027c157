// Register export as CSV, one line per stored document

use chrono::NaiveDate;
use sqlx::PgPool;

use crate::registry::error::FilingError;
use crate::types::ProtocolType;

const HEADER: [&str; 9] = [
    "Numero Protocollo",
    "Data Protocollo",
    "Tipo",
    "Categoria",
    "Mittente/Destinatario",
    "Oggetto",
    "Nome File",
    "URL Documento",
    "Creato Il",
];

/// Spreadsheets need the byte order mark to pick UTF-8
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExportRow {
    pub protocol_number: String,
    pub protocol_date: String,
    pub protocol_type: String,
    pub category: String,
    pub counterparty: String,
    pub subject: String,
    pub stored_file_name: Option<String>,
    pub storage_url: Option<String>,
    pub created_at: String,
}

/// Protocols of `year`, newest first, joined with their documents
pub async fn rows(
    pool: &PgPool,
    year: i32,
    protocol_type: Option<ProtocolType>,
) -> Result<Vec<ExportRow>, FilingError> {
    sqlx::query_as(
        "SELECT p.protocol_number,
                TO_CHAR(p.protocol_date, 'DD/MM/YYYY HH24:MI') AS protocol_date,
                p.protocol_type,
                p.category,
                p.counterparty,
                p.subject,
                d.stored_file_name,
                d.storage_url,
                TO_CHAR(p.created_at, 'DD/MM/YYYY HH24:MI') AS created_at
         FROM protocol_records p
         LEFT JOIN documents d ON d.protocol_id = p.id
         WHERE p.year = $1 AND ($2::TEXT IS NULL OR p.protocol_type = $2)
         ORDER BY p.protocol_date DESC, p.protocol_number DESC",
    )
    .bind(year)
    .bind(protocol_type.map(|t| t.code()))
    .fetch_all(pool)
    .await
    .map_err(FilingError::Database)
}

pub fn to_csv(rows: &[ExportRow]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(UTF8_BOM.to_vec());
    writer.write_record(HEADER)?;
    for row in rows {
        writer.write_record([
            row.protocol_number.as_str(),
            row.protocol_date.as_str(),
            row.protocol_type.trim(),
            row.category.as_str(),
            row.counterparty.as_str(),
            row.subject.as_str(),
            row.stored_file_name.as_deref().unwrap_or(""),
            row.storage_url.as_deref().unwrap_or(""),
            row.created_at.as_str(),
        ])?;
    }
    writer.into_inner().map_err(|e| e.into_error().into())
}

/// `Protocolli_{year}_{type or Tutti}_{date}.csv`
pub fn file_name(year: i32, protocol_type: Option<ProtocolType>, today: NaiveDate) -> String {
    let label = protocol_type.map(|t| t.code()).unwrap_or("Tutti");
    format!("Protocolli_{}_{}_{}.csv", year, label, today.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(number: &str, subject: &str) -> ExportRow {
        ExportRow {
            protocol_number: number.to_string(),
            protocol_date: "07/03/2025 10:15".to_string(),
            protocol_type: "E".to_string(),
            category: "SOR".to_string(),
            counterparty: "Prefettura".to_string(),
            subject: subject.to_string(),
            stored_file_name: Some("0001E_SOR_CAMPANIA_x.pdf".to_string()),
            storage_url: None,
            created_at: "07/03/2025 10:15".to_string(),
        }
    }

    #[test]
    fn writes_bom_header_and_quoted_fields() {
        let bytes = to_csv(&[row("2025/0001/SOR/E", "Nota, \"urgente\"\nseconda riga")]).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));

        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("Numero Protocollo,Data Protocollo,Tipo,Categoria,Mittente/Destinatario,Oggetto,Nome File,URL Documento,Creato Il")
        );
        assert!(text.contains("\"Nota, \"\"urgente\"\"\nseconda riga\""));
        assert!(text.contains("0001E_SOR_CAMPANIA_x.pdf,,07/03/2025 10:15"));
    }

    #[test]
    fn reads_back_with_the_same_columns() {
        let bytes = to_csv(&[row("2025/0001/SOR/E", "a"), row("2025/0002/SOR/E", "b")]).unwrap();
        let mut reader = csv::Reader::from_reader(&bytes[UTF8_BOM.len()..]);
        let records: Vec<csv::StringRecord> = reader.records().collect::<Result<_, _>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[1][0], "2025/0002/SOR/E");
        assert_eq!(records[1].len(), HEADER.len());
    }

    #[test]
    fn names_files_by_year_and_type() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(file_name(2025, None, today), "Protocolli_2025_Tutti_2025-03-07.csv");
        assert_eq!(
            file_name(2025, Some(ProtocolType::Outgoing), today),
            "Protocolli_2025_U_2025-03-07.csv"
        );
    }
}
