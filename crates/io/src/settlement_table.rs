// Urban settlement population tables (Statistics Norway CSV export)
//
// Layout: two header rows, then one row per settlement:
//
//   settlement;municipality;population total;population in municipality
//   0801 Oslo i alt;0301 Oslo;1000467;
//   ;3024 Bærum;;116734
//
// A row with an empty first column continues the settlement above it with
// one more municipality share. Codes are the first four characters of a
// field and names start at the sixth.

use std::path::Path;

use chrono::NaiveDate;

use popsync_recon::model::{MemberRef, Population, SourceRecord};
use popsync_recon::{EntityId, EntityKind};

use crate::error::IoError;

const HEADER_ROWS: usize = 2;

/// Decode a downloaded or local table. A UTF-8 BOM is dropped; input that
/// is not valid UTF-8 is read as Windows-1252.
pub fn decode(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

pub fn read(path: &Path, record_date: NaiveDate) -> Result<Vec<SourceRecord>, IoError> {
    let bytes = std::fs::read(path).map_err(|e| IoError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse(&decode(&bytes), record_date)
}

pub fn parse(text: &str, record_date: NaiveDate) -> Result<Vec<SourceRecord>, IoError> {
    let text = text
        .trim_start_matches('\u{feff}')
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\u{a0}', "");

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records: Vec<SourceRecord> = Vec::new();

    for (index, result) in reader.records().enumerate() {
        let row = index + 1;
        let fields = result.map_err(|e| IoError::Table { row, message: e.to_string() })?;
        if row <= HEADER_ROWS {
            continue;
        }

        let field = |i: usize| fields.get(i).map(str::trim).unwrap_or_default();
        let (settlement, municipality) = (field(0), field(1));
        let (total, share) = (field(2), field(3));

        if settlement.is_empty() && municipality.is_empty() {
            continue;
        }

        if settlement.is_empty() {
            let Some(current) = records.last_mut() else {
                return Err(IoError::Table {
                    row,
                    message: "municipality share before the first settlement".into(),
                });
            };
            current.parent_refs.push(member(municipality, share, row)?);
            continue;
        }

        let (code, name) = split_code(settlement);
        let id = match EntityId::parse(EntityKind::Settlement, &code) {
            Ok(id) => id,
            // Footnotes at the end of the export only fill the first column.
            Err(_) if municipality.is_empty() && total.is_empty() => {
                log::debug!("row {row}: skipping note {settlement:?}");
                continue;
            }
            Err(e) => return Err(IoError::Table { row, message: e.to_string() }),
        };

        let mut record = SourceRecord {
            id,
            name: settlement_name(&name),
            population: population(total, row)?,
            record_date,
            parent_refs: Vec::new(),
        };
        if !municipality.is_empty() {
            record.parent_refs.push(member(municipality, total, row)?);
        }
        records.push(record);
    }

    log::info!("{} urban settlements in table", records.len());
    Ok(records)
}

fn split_code(field: &str) -> (String, String) {
    let code = field.chars().take(4).collect();
    let name = field.chars().skip(5).collect::<String>().trim().to_string();
    (code, name)
}

/// "Oslo i alt" -> "Oslo", "Moss (Østfold)" -> "Moss".
fn settlement_name(raw: &str) -> String {
    let name = raw.replace(" i alt", "");
    match name.find('(') {
        Some(i) => name[..i].trim().to_string(),
        None => name.trim().to_string(),
    }
}

fn population(value: &str, row: usize) -> Result<Population, IoError> {
    value
        .parse()
        .map_err(|e: popsync_recon::ReconError| IoError::Table { row, message: e.to_string() })
}

fn member(field: &str, population_field: &str, row: usize) -> Result<MemberRef, IoError> {
    let (code, name) = split_code(field);
    let id = EntityId::parse(EntityKind::Municipality, &code)
        .map_err(|e| IoError::Table { row, message: e.to_string() })?;
    Ok(MemberRef {
        id: id.code().to_string(),
        name,
        population: population(population_field, row)?,
    })
}
