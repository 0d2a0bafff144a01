//! RFC 4180 CSV rendering.

use super::ExportTable;

pub const CONTENT_TYPE: &str = "text/csv; charset=utf-8";

/// Quotes a field if it contains a delimiter, quote, line break or
/// surrounding whitespace.
pub fn escape_csv_field(field: &str) -> String {
    let needs_quotes = field.contains([',', '"', '\n', '\r'])
        || field.starts_with(' ')
        || field.ends_with(' ');
    if needs_quotes {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn push_record<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a String>) {
    let line = fields
        .into_iter()
        .map(|f| escape_csv_field(f))
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(&line);
    out.push_str("\r\n");
}

pub fn render(table: &ExportTable) -> String {
    let mut out = String::new();
    push_record(&mut out, &table.headers);
    for row in &table.rows {
        push_record(&mut out, row);
    }
    out
}
