//! Minimal Office Open XML workbook writer.
//!
//! Produces two sheets, "Scraped Data" and "Job Info", using inline strings
//! so no shared-string table is needed.

use std::io::{Cursor, Write};

use quick_xml::escape::escape;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::ExportTable;
use crate::error::ExportError;
use crate::job::Job;

pub const CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub const DATA_SHEET: &str = "Scraped Data";
pub const INFO_SHEET: &str = "Job Info";

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/worksheets/sheet2.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/></Types>"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet2.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

// Style 0 is the default, style 1 is bold (header row).
const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="1" fillId="0" borderId="0" xfId="0" applyFont="1"/></cellXfs></styleSheet>"#;

enum Cell<'a> {
    Text(&'a str),
    Number(i64),
}

/// Column letters for a zero-based index: 0 -> A, 25 -> Z, 26 -> AA.
fn column_name(mut index: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

/// Drops characters XML 1.0 cannot represent.
fn xml_text(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect();
    escape(cleaned.as_str()).into_owned()
}

fn write_cell(out: &mut String, reference: &str, cell: &Cell<'_>, style: u8) {
    let style_attr = if style > 0 {
        format!(r#" s="{}""#, style)
    } else {
        String::new()
    };
    match cell {
        Cell::Text(text) => out.push_str(&format!(
            r#"<c r="{}" t="inlineStr"{}><is><t xml:space="preserve">{}</t></is></c>"#,
            reference,
            style_attr,
            xml_text(text)
        )),
        Cell::Number(n) => out.push_str(&format!(
            r#"<c r="{}"{}><v>{}</v></c>"#,
            reference, style_attr, n
        )),
    }
}

fn sheet_xml(rows: &[Vec<Cell<'_>>]) -> String {
    let mut out = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, row) in rows.iter().enumerate() {
        let row_number = r + 1;
        out.push_str(&format!(r#"<row r="{}">"#, row_number));
        let style = if r == 0 { 1 } else { 0 };
        for (c, cell) in row.iter().enumerate() {
            let reference = format!("{}{}", column_name(c), row_number);
            write_cell(&mut out, &reference, cell, style);
        }
        out.push_str("</row>");
    }
    out.push_str("</sheetData></worksheet>");
    out
}

fn workbook_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/><sheet name="{}" sheetId="2" r:id="rId2"/></sheets></workbook>"#,
        escape(DATA_SHEET),
        escape(INFO_SHEET)
    )
}

/// Renders the table and the job summary as an `.xlsx` file.
pub fn render(table: &ExportTable, job: &Job) -> Result<Vec<u8>, ExportError> {
    let mut data_rows: Vec<Vec<Cell<'_>>> = Vec::with_capacity(table.rows.len() + 1);
    data_rows.push(table.headers.iter().map(|h| Cell::Text(h)).collect());
    for row in &table.rows {
        data_rows.push(row.iter().map(|v| Cell::Text(v)).collect());
    }

    let status = job.status.to_string();
    let created_at = job.created_at.to_rfc3339();
    let completed_at = job
        .completed_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();
    let info_rows = vec![
        vec![
            Cell::Text("Job ID"),
            Cell::Text("Query"),
            Cell::Text("Status"),
            Cell::Text("Max Results"),
            Cell::Text("Created At"),
            Cell::Text("Completed At"),
            Cell::Text("Results Count"),
            Cell::Text("Error Message"),
        ],
        vec![
            Cell::Number(job.id),
            Cell::Text(&job.query),
            Cell::Text(&status),
            Cell::Number(i64::from(job.max_results)),
            Cell::Text(&created_at),
            Cell::Text(&completed_at),
            Cell::Number(i64::from(job.results_count)),
            Cell::Text(job.error_message.as_deref().unwrap_or_default()),
        ],
    ];

    let parts: [(&str, String); 7] = [
        ("[Content_Types].xml", CONTENT_TYPES_XML.to_string()),
        ("_rels/.rels", ROOT_RELS_XML.to_string()),
        ("xl/workbook.xml", workbook_xml()),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS_XML.to_string()),
        ("xl/styles.xml", STYLES_XML.to_string()),
        ("xl/worksheets/sheet1.xml", sheet_xml(&data_rows)),
        ("xl/worksheets/sheet2.xml", sheet_xml(&info_rows)),
    ];

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, contents) in parts {
        zip.start_file(name, options)
            .map_err(|e| ExportError::Spreadsheet(format!("{}: {}", name, e)))?;
        zip.write_all(contents.as_bytes())
            .map_err(|e| ExportError::Spreadsheet(format!("{}: {}", name, e)))?;
    }
    let cursor = zip
        .finish()
        .map_err(|e| ExportError::Spreadsheet(e.to_string()))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::tests::{details, item};
    use serde_json::json;
    use std::io::Read;

    fn read_part(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut xml = String::new();
        file.read_to_string(&mut xml).unwrap();
        xml
    }

    fn text_cell(text: &str) -> String {
        format!(r#"<t xml:space="preserve">{}</t>"#, text)
    }

    #[test]
    fn test_column_name() {
        assert_eq!(column_name(0), "A");
        assert_eq!(column_name(25), "Z");
        assert_eq!(column_name(26), "AA");
        assert_eq!(column_name(27), "AB");
        assert_eq!(column_name(701), "ZZ");
        assert_eq!(column_name(702), "AAA");
    }

    #[test]
    fn test_workbook_has_both_sheets() {
        let details = details(vec![item("a & b", json!({"color": "<Blue>"}))]);
        let table = ExportTable::from_job(&details).unwrap();
        let bytes = render(&table, &details.job).unwrap();

        let workbook = read_part(&bytes, "xl/workbook.xml");
        assert!(workbook.contains(r#"name="Scraped Data""#));
        assert!(workbook.contains(r#"name="Job Info""#));

        let data = read_part(&bytes, "xl/worksheets/sheet1.xml");
        assert!(data.contains(r#"<c r="A1" t="inlineStr" s="1">"#));
        assert!(data.contains(&text_cell("Title")));
        assert!(data.contains(r#"<c r="G1" t="inlineStr" s="1"><is><t xml:space="preserve">color</t>"#));
        assert!(data.contains(&text_cell("a &amp; b")));
        assert!(data.contains(&text_cell("&lt;Blue&gt;")));

        let info = read_part(&bytes, "xl/worksheets/sheet2.xml");
        assert!(info.contains(&text_cell("Job ID")));
        assert!(info.contains(r#"<c r="A2"><v>12</v></c>"#));
        assert!(info.contains(&text_cell("iphone 15")));
        assert!(info.contains(&text_cell("completed")));
    }

    #[test]
    fn test_control_characters_are_dropped() {
        assert_eq!(xml_text("a\u{0}b\tc"), "ab\tc");
    }
}
