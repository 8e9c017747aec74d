use csv::{ReaderBuilder, Terminator, WriterBuilder};

use crate::errors::{AppError, AppResult};
use crate::model::{Address, Location};

/// Fixed column order for both import and export.
pub const CSV_HEADER: [&str; 7] = [
    "name",
    "address_name",
    "address_lat",
    "address_lng",
    "description",
    "subtitle",
    "image",
];

const REQUIRED_COLUMNS: usize = 4;

/// Parse raw CSV file content into location records, without ids.
///
/// The first row is a header and is discarded; every remaining row maps
/// positionally to `[title, address.name, lat, lng, description, subtitle,
/// image]`. Any undecodable content, short row, or unparseable coordinate
/// rejects the whole file so a failed import never applies partially.
pub fn import_locations(bytes: &[u8]) -> AppResult<Vec<Location>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|err| AppError::Decode(format!("invalid UTF-8 in CSV: {err}")))?;

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut locations = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record =
            record.map_err(|err| AppError::Decode(format!("malformed CSV: {err}")))?;
        let row_number = index + 2;
        if record.len() < REQUIRED_COLUMNS {
            return Err(AppError::Decode(format!(
                "row {row_number} has {} columns, expected at least {REQUIRED_COLUMNS}",
                record.len()
            )));
        }

        let lat = parse_coordinate(record.get(2), "address_lat", row_number)?;
        let lng = parse_coordinate(record.get(3), "address_lng", row_number)?;

        locations.push(Location {
            id: None,
            title: field(&record, 0),
            address: Address {
                name: field(&record, 1),
                lat,
                lng,
            },
            description: field(&record, 4),
            subtitle: field(&record, 5),
            image: field(&record, 6),
        });
    }
    Ok(locations)
}

/// Serialize the current list as CSV text, one row per location in list
/// order, with the fixed header row first.
pub fn export_locations(locations: &[Location]) -> AppResult<String> {
    let mut writer = WriterBuilder::new()
        .terminator(Terminator::CRLF)
        .from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for location in locations {
        let lat = location.address.lat.to_string();
        let lng = location.address.lng.to_string();
        writer.write_record([
            location.title.as_str(),
            location.address.name.as_str(),
            lat.as_str(),
            lng.as_str(),
            location.description.as_str(),
            location.subtitle.as_str(),
            location.image.as_str(),
        ])?;
    }
    finish(writer)
}

/// Header-only CSV used to prime spreadsheet tools with the column names.
pub fn template() -> AppResult<String> {
    let mut writer = WriterBuilder::new()
        .terminator(Terminator::CRLF)
        .from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    finish(writer)
}

fn finish(writer: csv::Writer<Vec<u8>>) -> AppResult<String> {
    let bytes = writer
        .into_inner()
        .map_err(|err| AppError::Decode(format!("failed to flush CSV writer: {err}")))?;
    String::from_utf8(bytes).map_err(|err| AppError::Decode(format!("non-UTF-8 CSV output: {err}")))
}

fn field(record: &csv::StringRecord, index: usize) -> String {
    record.get(index).unwrap_or_default().to_string()
}

fn parse_coordinate(value: Option<&str>, column: &str, row_number: usize) -> AppResult<f64> {
    let raw = value.unwrap_or_default().trim();
    raw.parse::<f64>()
        .ok()
        .filter(|parsed| parsed.is_finite())
        .ok_or_else(|| {
            AppError::Decode(format!("row {row_number}: {column} is not a number: {raw:?}"))
        })
}
