//! Quote-aware splitting of delimited statement text into rows and fields

use tracing::debug;

/// Split `text` into rows of fields.
///
/// Double quotes group a field, `""` inside a quoted field is a literal
/// quote, and newlines inside quotes belong to the field. Rows may differ in
/// width. Blank lines and the trailing newline produce no row, and an
/// unterminated quote is closed at end of input.
pub fn tokenize(text: &str, delimiter: u8) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for result in reader.records() {
        match result {
            Ok(record) => rows.push(record.iter().map(str::to_string).collect()),
            Err(err) => {
                debug!(error = %err, "Stopped reading delimited text");
                break;
            }
        }
    }
    rows
}

/// Join fields into one delimited line, quoting where needed
pub fn join_row(fields: &[String], delimiter: u8) -> String {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_writer(Vec::new());
    if let Err(err) = writer.write_record(fields) {
        debug!(error = %err, "Could not join fields");
        return String::new();
    }
    let bytes = writer.into_inner().unwrap_or_default();
    String::from_utf8_lossy(&bytes)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}
