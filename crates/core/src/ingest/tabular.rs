//! Raw bytes -> header + string cells.
//!
//! Accepts delimited text (UTF-8, or Windows-1251 as produced by Russian
//! spreadsheet exports) and Excel workbooks, both XLSX and legacy XLS (first
//! worksheet). No domain knowledge here; column meaning is resolved in `schema`.

use std::borrow::Cow;
use std::io::Cursor;

use calamine::{open_workbook_from_rs, Data, Reader, Xls, XlsError, Xlsx, XlsxError};
use encoding_rs::WINDOWS_1251;

use crate::error::{FileRole, IngestError};
use crate::ingest::RowIssue;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
/// OLE compound document, the container of `.xls` workbooks.
const OLE_MAGIC: &[u8] = b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone)]
pub struct RawRow {
    /// 1-based line (or sheet row) number, header included.
    pub line: usize,
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
    /// Rows the tabular reader itself could not decode.
    pub broken: Vec<RowIssue>,
}

pub fn read_table(raw: &[u8], file: FileRole) -> Result<RawTable, IngestError> {
    if raw.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(IngestError::EmptyInput { file });
    }
    if raw.starts_with(ZIP_MAGIC) {
        let workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(raw.to_vec()))
            .map_err(|e: XlsxError| IngestError::not_tabular(file, format!("not a readable XLSX workbook: {e}")))?;
        return read_workbook(workbook, file);
    }
    if raw.starts_with(OLE_MAGIC) {
        let workbook: Xls<_> = open_workbook_from_rs(Cursor::new(raw.to_vec()))
            .map_err(|e: XlsError| IngestError::not_tabular(file, format!("not a readable XLS workbook: {e}")))?;
        return read_workbook(workbook, file);
    }
    let text = decode_text(raw);
    read_delimited(&text, file)
}

/// UTF-8 when valid, otherwise Windows-1251 (UTF-16 BOMs are honoured too).
pub fn decode_text(raw: &[u8]) -> Cow<'_, str> {
    let body = raw.strip_prefix(UTF8_BOM).unwrap_or(raw);
    if let Ok(s) = std::str::from_utf8(body) {
        return Cow::Borrowed(s);
    }
    let (cow, _, _) = WINDOWS_1251.decode(raw);
    cow
}

/// Most frequent of `,` `;` tab in the header line; ties keep the earlier one.
pub fn detect_delimiter(text: &str) -> u8 {
    let header = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let mut best = (b',', header.matches(',').count());
    for (delim, pat) in [(b';', ';'), (b'\t', '\t')] {
        let count = header.matches(pat).count();
        if count > best.1 {
            best = (delim, count);
        }
    }
    best.0
}

fn read_delimited(text: &str, file: FileRole) -> Result<RawTable, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(detect_delimiter(text))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| IngestError::not_tabular(file, format!("failed to read header row: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut table = RawTable {
        headers,
        ..RawTable::default()
    };

    // The reader skips empty lines, so line numbers come from record positions.
    let mut last_line = 1;
    for result in reader.records() {
        match result {
            Ok(record) => {
                let line = record.position().map_or(last_line + 1, |p| p.line() as usize);
                last_line = line;
                let cells: Vec<String> = record.iter().map(str::to_string).collect();
                if cells.iter().all(|c| c.is_empty()) {
                    continue;
                }
                table.rows.push(RawRow { line, cells });
            }
            Err(e) => {
                let line = e.position().map_or(last_line + 1, |p| p.line() as usize);
                last_line = line;
                table.broken.push(RowIssue {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
            }
        }
    }

    Ok(table)
}

fn read_workbook<R>(mut workbook: R, file: FileRole) -> Result<RawTable, IngestError>
where
    R: Reader<Cursor<Vec<u8>>>,
    R::Error: std::fmt::Display,
{
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| IngestError::not_tabular(file, "workbook has no worksheets"))?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| IngestError::not_tabular(file, format!("failed to read worksheet '{sheet_name}': {e}")))?;

    // Sheet rows are 1-based; the used range may not start at the first row.
    let first_row = range.start().map_or(1, |(row, _)| row as usize + 1);

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Err(IngestError::EmptyInput { file });
    };

    let mut table = RawTable {
        headers: header_row.iter().map(cell_text).collect(),
        ..RawTable::default()
    };

    for (idx, row) in rows.enumerate() {
        let cells: Vec<String> = row.iter().map(cell_text).collect();
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        table.rows.push(RawRow {
            line: first_row + idx + 1,
            cells,
        });
    }

    Ok(table)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ts) => ts.date().format("%Y-%m-%d").to_string(),
            None => dt.as_f64().to_string(),
        },
        Data::DateTimeIso(s) => s.trim().to_string(),
        other => other.to_string().trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_semicolon_and_tab() {
        assert_eq!(detect_delimiter("дата;товар;кол-во\n"), b';');
        assert_eq!(detect_delimiter("date\tproduct\tqty\n"), b'\t');
        assert_eq!(detect_delimiter("date,product,qty\n"), b',');
        assert_eq!(detect_delimiter("single\n"), b',');
    }

    #[test]
    fn decodes_windows_1251() {
        let (bytes, _, _) = WINDOWS_1251.encode("дата;товар;кол-во");
        assert!(std::str::from_utf8(&bytes).is_err());
        assert_eq!(decode_text(&bytes), "дата;товар;кол-во");
    }

    #[test]
    fn strips_utf8_bom() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice("date,product".as_bytes());
        assert_eq!(decode_text(&bytes), "date,product");
    }

    #[test]
    fn reads_rows_and_skips_blank_lines() {
        let text = "date,product,qty\n2026-06-01,A,3\n,,\n2026-06-02,B,4\n";
        let table = read_table(text.as_bytes(), FileRole::Sales).unwrap();
        assert_eq!(table.headers, vec!["date", "product", "qty"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1].line, 4);
        assert_eq!(table.rows[1].cells[1], "B");
    }

    #[test]
    fn whitespace_only_input_is_empty() {
        assert!(matches!(
            read_table(b"  \n\n", FileRole::Writeoffs),
            Err(IngestError::EmptyInput {
                file: FileRole::Writeoffs
            })
        ));
    }

    #[test]
    fn line_numbers_count_empty_lines() {
        let text = "date,product,qty\n2026-06-01,A,3\n\n\n2026-06-02,B,4\n";
        let table = read_table(text.as_bytes(), FileRole::Sales).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].line, 2);
        assert_eq!(table.rows[1].line, 5);
    }

    #[test]
    fn garbage_zip_is_schema_mismatch() {
        match read_table(b"PK\x03\x04not really a workbook", FileRole::Sales) {
            Err(IngestError::SchemaMismatch { detail, column, .. }) => {
                assert!(detail.contains("XLSX"), "{detail}");
                assert_eq!(column, None);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn legacy_xls_is_read_as_workbook_not_text() {
        let mut raw = OLE_MAGIC.to_vec();
        raw.extend_from_slice(&[0u8; 24]);
        match read_table(&raw, FileRole::Writeoffs) {
            Err(IngestError::SchemaMismatch { file, detail, column, .. }) => {
                assert_eq!(file, FileRole::Writeoffs);
                assert!(detail.contains("XLS workbook"), "{detail}");
                assert_eq!(column, None);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    /// Minimal single-sheet XLSX: shared strings, a date style (numFmt 14), numeric cells.
    fn xlsx_fixture(sheet_rows: &str, strings: &[&str]) -> Vec<u8> {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
        const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

        let shared: String = strings.iter().map(|s| format!("<si><t>{s}</t></si>")).collect();
        let parts = [
            (
                "[Content_Types].xml",
                r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#.to_string(),
            ),
            (
                "_rels/.rels",
                format!(r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="{REL_NS}/officeDocument" Target="xl/workbook.xml"/></Relationships>"#),
            ),
            (
                "xl/workbook.xml",
                format!(r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="{MAIN_NS}" xmlns:r="{REL_NS}"><sheets><sheet name="Продажи" sheetId="1" r:id="rId1"/></sheets></workbook>"#),
            ),
            (
                "xl/_rels/workbook.xml.rels",
                format!(r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="{REL_NS}/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="{REL_NS}/sharedStrings" Target="sharedStrings.xml"/><Relationship Id="rId3" Type="{REL_NS}/styles" Target="styles.xml"/></Relationships>"#),
            ),
            (
                "xl/styles.xml",
                format!(r#"<?xml version="1.0" encoding="UTF-8"?><styleSheet xmlns="{MAIN_NS}"><cellXfs count="2"><xf numFmtId="0"/><xf numFmtId="14"/></cellXfs></styleSheet>"#),
            ),
            (
                "xl/sharedStrings.xml",
                format!(r#"<?xml version="1.0" encoding="UTF-8"?><sst xmlns="{MAIN_NS}" count="{n}" uniqueCount="{n}">{shared}</sst>"#, n = strings.len()),
            ),
            (
                "xl/worksheets/sheet1.xml",
                format!(r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="{MAIN_NS}"><sheetData>{sheet_rows}</sheetData></worksheet>"#),
            ),
        ];

        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, body) in parts {
            zip.start_file(name, options).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn reads_xlsx_with_native_dates_and_numbers() {
        // 46174 / 46175 are the Excel serials of 2026-06-01 / 2026-06-02.
        let rows = concat!(
            r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c><c r="C1" t="s"><v>2</v></c></row>"#,
            r#"<row r="2"><c r="A2" s="1"><v>46174</v></c><c r="B2" t="s"><v>3</v></c><c r="C2"><v>12</v></c></row>"#,
            r#"<row r="4"><c r="A4" s="1"><v>46175</v></c><c r="B4" t="s"><v>4</v></c><c r="C4"><v>2.5</v></c></row>"#,
        );
        let raw = xlsx_fixture(rows, &["дата", "товар", "кол-во", "Эклер", "Тирамису кг"]);

        let table = read_table(&raw, FileRole::Sales).unwrap();
        assert_eq!(table.headers, vec!["дата", "товар", "кол-во"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].cells, vec!["2026-06-01", "Эклер", "12"]);
        assert_eq!(table.rows[1].line, 4);
        assert_eq!(table.rows[1].cells, vec!["2026-06-02", "Тирамису кг", "2.5"]);
    }

    #[test]
    fn xlsx_sales_ingest_end_to_end() {
        let rows = concat!(
            r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c><c r="C1" t="s"><v>2</v></c></row>"#,
            r#"<row r="2"><c r="A2" s="1"><v>46174</v></c><c r="B2" t="s"><v>3</v></c><c r="C2"><v>12</v></c></row>"#,
            r#"<row r="3"><c r="A3" s="1"><v>46175</v></c><c r="B3" t="s"><v>3</v></c><c r="C3"><v>1.5</v></c></row>"#,
        );
        let raw = xlsx_fixture(rows, &["дата", "товар", "кол-во", "Тирамису кг"]);

        let (records, stats) = crate::ingest::parse_sales(&raw, &Default::default()).unwrap();
        assert_eq!(stats.malformed, 0);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].date, chrono::NaiveDate::from_ymd_opt(2026, 6, 1).unwrap());
        assert_eq!(records[0].quantity_sold, 12.0);
        assert_eq!(records[1].quantity_sold, 1.5);
        assert_eq!(records[1].unit, crate::domain::records::Unit::Weight);
    }
}
