//! Multi-format text extraction (markdown, PDF, DOCX, XLSX).
//!
//! Every extractor returns plain UTF-8 text or an [`ExtractError`]; nothing
//! here panics on malformed input. The ingestion loop treats an error as
//! "skip this file".

use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

pub use crate::error::ExtractError;
use crate::models::FileFormat;

/// Maximum sheets to process in an xlsx.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet (avoids unbounded memory).
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Column count of the OOXML grid (`A` through `XFD`).
const XLSX_MAX_COLUMNS: usize = 16_384;
/// Maximum cells in a sheet after padding rows to equal width.
const XLSX_MAX_GRID_CELLS: usize = 2_000_000;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

/// Reads `path` and extracts its text according to the file extension.
pub fn extract_text(path: &Path) -> Result<String, ExtractError> {
    let format = FileFormat::from_path(path).ok_or_else(|| {
        ExtractError::UnsupportedFormat(
            path.extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string()),
        )
    })?;
    let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    match format {
        FileFormat::Markdown => {
            String::from_utf8(bytes).map_err(|_| ExtractError::Encoding {
                path: path.to_path_buf(),
            })
        }
        other => extract_bytes(&bytes, other),
    }
}

/// Extracts text from in-memory content of a binary format.
///
/// Markdown bytes are decoded lossily here; [`extract_text`] is strict.
pub fn extract_bytes(bytes: &[u8], format: FileFormat) -> Result<String, ExtractError> {
    match format {
        FileFormat::Markdown => Ok(String::from_utf8_lossy(bytes).into_owned()),
        FileFormat::Pdf => extract_pdf(bytes),
        FileFormat::Docx => extract_docx(bytes),
        FileFormat::Xlsx => extract_xlsx(bytes),
    }
}

/// Pages that carry text, joined by a blank line.
///
/// pdf-extract panics on some malformed inputs; those are reported as
/// ordinary extraction failures.
fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| ExtractError::Pdf("parser panicked".to_string()))?
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    let pages: Vec<String> = pages
        .into_iter()
        .filter(|page| !page.trim().is_empty())
        .collect();
    Ok(pages.join("\n\n"))
}

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut Archive<'_>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn has_entry(archive: &Archive<'_>, name: &str) -> bool {
    archive.file_names().any(|n| n == name)
}

fn xml_err(e: quick_xml::Error) -> ExtractError {
    ExtractError::Ooxml(e.to_string())
}

fn unescaped(te: &quick_xml::events::BytesText<'_>) -> Result<String, ExtractError> {
    te.unescape().map(|s| s.into_owned()).map_err(xml_err)
}

fn attr_value(e: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Non-blank paragraphs of `word/document.xml`, joined by a blank line.
fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    if !has_entry(&archive, "word/document.xml") {
        return Err(ExtractError::Ooxml(
            "word/document.xml not found".to_string(),
        ));
    }
    let doc_xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    let paragraphs = docx_paragraphs(&doc_xml)?;
    Ok(paragraphs.join("\n\n"))
}

fn docx_paragraphs(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    // Text boxes nest paragraphs; their text folds into the outer one.
    let mut p_depth = 0usize;
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => {
                    if p_depth == 0 {
                        current.clear();
                    }
                    p_depth += 1;
                }
                b"t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" if p_depth > 0 => current.push('\t'),
                b"br" | b"cr" if p_depth > 0 => current.push('\n'),
                _ => {}
            },
            Event::Text(te) if in_text => current.push_str(&unescaped(&te)?),
            Event::CData(cd) if in_text => {
                current.push_str(&String::from_utf8_lossy(&cd.into_inner()));
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    p_depth = p_depth.saturating_sub(1);
                    if p_depth == 0 && !current.trim().is_empty() {
                        paragraphs.push(std::mem::take(&mut current));
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs)
}

/// One `Sheet: <name>` block per worksheet in workbook order; rows are cells
/// joined by ` | `, all-empty rows dropped, and each sheet ends with an empty line.
fn extract_xlsx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let shared_strings = if has_entry(&archive, "xl/sharedStrings.xml") {
        read_shared_strings(&mut archive)?
    } else {
        Vec::new()
    };
    let sheets = list_worksheets(&mut archive)?;
    let mut parts: Vec<String> = Vec::new();
    for sheet in sheets.into_iter().take(XLSX_MAX_SHEETS) {
        let sheet_xml = read_zip_entry_bounded(&mut archive, &sheet.entry, MAX_XML_ENTRY_BYTES)?;
        parts.push(format!("Sheet: {}", sheet.name));
        for row in xlsx_sheet_rows(&sheet_xml, &shared_strings)? {
            if row.iter().any(|c| !c.is_empty()) {
                parts.push(row.join(" | "));
            }
        }
        parts.push(String::new());
    }
    Ok(parts.join("\n"))
}

fn read_shared_strings(archive: &mut Archive<'_>) -> Result<Vec<String>, ExtractError> {
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
    let mut strings = Vec::new();
    let mut reader = Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    // Phonetic hints (<rPh>) are not part of the displayed value.
    let mut in_phonetic = false;
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"rPh" => in_phonetic = true,
                b"t" => in_t = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(te) if in_t && !in_phonetic => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&unescaped(&te)?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.push(current.take().unwrap_or_default()),
                b"rPh" => in_phonetic = false,
                b"t" => in_t = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

struct SheetEntry {
    name: String,
    entry: String,
}

/// Worksheets in workbook order, resolved through the workbook relationships.
/// Falls back to `xl/worksheets/sheetN.xml` ordering when the workbook part
/// is missing.
fn list_worksheets(archive: &mut Archive<'_>) -> Result<Vec<SheetEntry>, ExtractError> {
    if !has_entry(archive, "xl/workbook.xml") {
        return Ok(fallback_worksheets(archive));
    }
    let workbook = read_zip_entry_bounded(archive, "xl/workbook.xml", MAX_XML_ENTRY_BYTES)?;
    let declared = workbook_sheets(&workbook)?;
    let targets = if has_entry(archive, "xl/_rels/workbook.xml.rels") {
        let rels =
            read_zip_entry_bounded(archive, "xl/_rels/workbook.xml.rels", MAX_XML_ENTRY_BYTES)?;
        workbook_relationships(&rels)?
    } else {
        Vec::new()
    };

    let mut sheets = Vec::new();
    for (idx, (name, rel_id)) in declared.into_iter().enumerate() {
        let target = rel_id
            .and_then(|id| targets.iter().find(|(rid, _)| *rid == id))
            .map(|(_, target)| resolve_target(target))
            .unwrap_or_else(|| format!("xl/worksheets/sheet{}.xml", idx + 1));
        if has_entry(archive, &target) {
            sheets.push(SheetEntry {
                name,
                entry: target,
            });
        }
    }
    Ok(sheets)
}

fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}

fn fallback_worksheets(archive: &Archive<'_>) -> Vec<SheetEntry> {
    let mut names: Vec<(u32, String)> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|name| {
            let n = name
                .trim_start_matches("xl/worksheets/sheet")
                .trim_end_matches(".xml")
                .parse::<u32>()
                .unwrap_or(u32::MAX);
            (n, name.to_string())
        })
        .collect();
    names.sort();
    names
        .into_iter()
        .map(|(n, entry)| SheetEntry {
            name: format!("Sheet{}", n),
            entry,
        })
        .collect()
}

fn workbook_sheets(xml: &[u8]) -> Result<Vec<(String, Option<String>)>, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let name = attr_value(&e, b"name").unwrap_or_default();
                sheets.push((name, attr_value(&e, b"id")));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(sheets)
}

fn workbook_relationships(xml: &[u8]) -> Result<Vec<(String, String)>, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut rels = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (attr_value(&e, b"Id"), attr_value(&e, b"Target"))
                {
                    rels.push((id, target));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(rels)
}

/// Zero-based column index from a cell reference such as `C7` or `AA12`.
/// `None` when there are no column letters or the column lies past `XFD`.
fn column_index(cell_ref: &str) -> Option<usize> {
    let mut idx = 0usize;
    let mut letters = 0;
    for b in cell_ref.bytes().take_while(|b| b.is_ascii_alphabetic()) {
        let digit = (b.to_ascii_uppercase() - b'A' + 1) as usize;
        idx = idx.checked_mul(26)?.checked_add(digit)?;
        if idx > XLSX_MAX_COLUMNS {
            return None;
        }
        letters += 1;
    }
    if letters == 0 {
        return None;
    }
    Some(idx - 1)
}

/// Column of a `<c>` element: `None` without an `r` attribute, an error
/// when the reference is malformed or out of range.
fn cell_column(e: &quick_xml::events::BytesStart<'_>) -> Result<Option<usize>, ExtractError> {
    match attr_value(e, b"r") {
        None => Ok(None),
        Some(r) => column_index(&r)
            .map(Some)
            .ok_or_else(|| ExtractError::Ooxml(format!("invalid cell reference '{}'", r))),
    }
}

#[derive(Default)]
struct CellState {
    column: Option<usize>,
    kind: String,
    value: String,
}

impl CellState {
    fn render(&self, shared_strings: &[String]) -> String {
        match self.kind.as_str() {
            "s" => self
                .value
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|i| shared_strings.get(i).cloned())
                .unwrap_or_default(),
            "b" => match self.value.trim() {
                "1" => "True".to_string(),
                "0" => "False".to_string(),
                other => other.to_string(),
            },
            _ => self.value.clone(),
        }
    }
}

/// Rows of rendered cell values, each padded to the widest row of the sheet.
fn xlsx_sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<Vec<Vec<String>>, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell: Option<CellState> = None;
    let mut in_value = false;
    let mut cell_count = 0usize;
    loop {
        if cell_count >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => row.clear(),
                b"c" => {
                    cell = Some(CellState {
                        column: cell_column(&e)?,
                        kind: attr_value(&e, b"t").unwrap_or_default(),
                        value: String::new(),
                    });
                }
                // <v> for stored values, <t> inside <is> for inline strings.
                b"v" | b"t" => in_value = cell.is_some(),
                _ => {}
            },
            Event::Text(te) if in_value => {
                if let Some(c) = cell.as_mut() {
                    c.value.push_str(&unescaped(&te)?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let Some(c) = cell.take() {
                        let col = c.column.unwrap_or(row.len());
                        if col >= XLSX_MAX_COLUMNS {
                            return Err(ExtractError::Ooxml(format!(
                                "row wider than {} columns",
                                XLSX_MAX_COLUMNS
                            )));
                        }
                        if col >= row.len() {
                            row.resize(col + 1, String::new());
                        }
                        row[col] = c.render(shared_strings);
                        cell_count += 1;
                    }
                }
                b"row" => rows.push(std::mem::take(&mut row)),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    if width.saturating_mul(rows.len()) > XLSX_MAX_GRID_CELLS {
        return Err(ExtractError::Ooxml(format!(
            "sheet grid of {} rows x {} columns is too large",
            rows.len(),
            width
        )));
    }
    for r in rows.iter_mut() {
        r.resize(width, String::new());
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_with(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            for (name, body) in entries {
                zip.start_file(*name, zip::write::SimpleFileOptions::default())
                    .unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn unsupported_extension_returns_error() {
        let err = extract_text(Path::new("notes/readme.txt")).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_bytes(b"not a pdf", FileFormat::Pdf).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_bytes(b"not a zip", FileFormat::Docx).unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }

    #[test]
    fn markdown_must_be_utf8() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("bad.md");
        std::fs::write(&path, [0x66, 0x6f, 0xff, 0xfe]).unwrap();
        let err = extract_text(&path).unwrap_err();
        assert!(matches!(err, ExtractError::Encoding { .. }));
    }

    #[test]
    fn docx_paragraphs_join_runs_and_skip_blank() {
        let xml = r#"<?xml version="1.0"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
<w:p><w:r><w:t xml:space="preserve">Quarterly </w:t></w:r><w:r><w:t>revenue</w:t></w:r></w:p>
<w:p><w:r><w:t>   </w:t></w:r></w:p>
<w:p/>
<w:p><w:r><w:t>Costs &amp; margins</w:t></w:r></w:p>
</w:body></w:document>"#;
        let bytes = zip_with(&[("word/document.xml", xml)]);
        let text = extract_bytes(&bytes, FileFormat::Docx).unwrap();
        assert_eq!(text, "Quarterly revenue\n\nCosts & margins");
    }

    #[test]
    fn docx_without_document_part_is_an_error() {
        let bytes = zip_with(&[("word/styles.xml", "<styles/>")]);
        let err = extract_bytes(&bytes, FileFormat::Docx).unwrap_err();
        assert!(err.to_string().contains("word/document.xml"));
    }

    #[test]
    fn xlsx_renders_sheets_in_workbook_order() {
        let workbook = r#"<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>
<sheet name="Budget" sheetId="1" r:id="rId2"/>
<sheet name="Notes" sheetId="2" r:id="rId1"/>
</sheets></workbook>"#;
        let rels = r#"<Relationships>
<Relationship Id="rId1" Target="worksheets/sheet2.xml"/>
<Relationship Id="rId2" Target="worksheets/sheet1.xml"/>
</Relationships>"#;
        let shared = r#"<sst><si><t>Item</t></si><si><t>Cost</t></si><si><r><t>Mark</t></r><r><t>eting</t></r></si></sst>"#;
        let sheet1 = r#"<worksheet><sheetData>
<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>
<row r="2"><c r="A2" t="s"><v>2</v></c><c r="B2"><v>1200.5</v></c></row>
<row r="3"></row>
<row r="4"><c r="B4"><v>7</v></c></row>
</sheetData></worksheet>"#;
        let sheet2 = r#"<worksheet><sheetData>
<row r="1"><c r="A1" t="inlineStr"><is><t>remember</t></is></c><c r="B1" t="b"><v>1</v></c></row>
</sheetData></worksheet>"#;
        let bytes = zip_with(&[
            ("xl/workbook.xml", workbook),
            ("xl/_rels/workbook.xml.rels", rels),
            ("xl/sharedStrings.xml", shared),
            ("xl/worksheets/sheet1.xml", sheet1),
            ("xl/worksheets/sheet2.xml", sheet2),
        ]);
        let text = extract_bytes(&bytes, FileFormat::Xlsx).unwrap();
        assert_eq!(
            text,
            "Sheet: Budget\nItem | Cost\nMarketing | 1200.5\n | 7\n\nSheet: Notes\nremember | True\n"
        );
    }

    #[test]
    fn xlsx_without_workbook_falls_back_to_sheet_files() {
        let sheet = r#"<worksheet><sheetData><row r="1"><c r="A1"><v>42</v></c></row></sheetData></worksheet>"#;
        let bytes = zip_with(&[("xl/worksheets/sheet1.xml", sheet)]);
        let text = extract_bytes(&bytes, FileFormat::Xlsx).unwrap();
        assert_eq!(text, "Sheet: Sheet1\n42\n");
    }

    #[test]
    fn column_index_parses_letters() {
        assert_eq!(column_index("A1"), Some(0));
        assert_eq!(column_index("C7"), Some(2));
        assert_eq!(column_index("AA12"), Some(26));
        assert_eq!(column_index("XFD1"), Some(16_383));
        assert_eq!(column_index("12"), None);
    }

    #[test]
    fn column_index_rejects_columns_past_the_grid() {
        assert_eq!(column_index("XFE1"), None);
        assert_eq!(column_index("ZZZZZZ1"), None);
        assert_eq!(column_index(&format!("{}1", "Z".repeat(40))), None);
    }

    #[test]
    fn xlsx_with_out_of_range_cell_reference_is_an_error() {
        let sheet = r#"<worksheet><sheetData><row r="1"><c r="ZZZZZZZZZZZZZZZ1"><v>1</v></c></row></sheetData></worksheet>"#;
        let bytes = zip_with(&[("xl/worksheets/sheet1.xml", sheet)]);
        let err = extract_bytes(&bytes, FileFormat::Xlsx).unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(ref m) if m.contains("ZZZZZZZZZZZZZZZ1")));
    }

    #[test]
    fn xlsx_last_column_is_kept() {
        let sheet = r#"<worksheet><sheetData><row r="1"><c r="A1"><v>first</v></c><c r="XFD1"><v>last</v></c></row></sheetData></worksheet>"#;
        let bytes = zip_with(&[("xl/worksheets/sheet1.xml", sheet)]);
        let text = extract_bytes(&bytes, FileFormat::Xlsx).unwrap();
        assert!(text.starts_with("Sheet: Sheet1
first | "));
        assert!(text.ends_with(" | last
"));
    }

    #[test]
    fn xlsx_padding_past_the_grid_limit_is_an_error() {
        let mut rows = String::from(r#"<row r="1"><c r="XFD1"><v>wide</v></c></row>"#);
        for i in 2..200 {
            rows.push_str(&format!(r#"<row r="{i}"><c r="A{i}"><v>{i}</v></c></row>"#));
        }
        let sheet = format!("<worksheet><sheetData>{}</sheetData></worksheet>", rows);
        let bytes = zip_with(&[("xl/worksheets/sheet1.xml", sheet.as_str())]);
        assert!(matches!(
            extract_bytes(&bytes, FileFormat::Xlsx),
            Err(ExtractError::Ooxml(_))
        ));
    }
}
