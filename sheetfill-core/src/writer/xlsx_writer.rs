// ! XLSX writer functionality for storing numeric cell values

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, Cursor, Read, Seek, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use super::formula::shift_formula;
use crate::error::WorkbookError;
use crate::reader::{CellRange, CellReference, SheetEdits};

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const CALC_CHAIN_PART: &str = "xl/calcChain.xml";

/// Copy the package at `input` to `output`, rewriting the worksheets that have
/// edits. All other parts are copied without recompression. The output is
/// assembled in memory and written once, so a failure leaves no partial file.
pub fn save_xlsx_with_edits(
    input: &Path,
    output: &Path,
    edits: &BTreeMap<String, SheetEdits>,
) -> Result<(), WorkbookError> {
    let file = File::open(input)?;
    let reader = BufReader::new(file);
    let mut archive = ZipArchive::new(reader)?;

    // Map sheet names to their parts through workbook.xml and its relationships
    let workbook_xml = read_file_from_zip(&mut archive, WORKBOOK_PART)?;
    let rels_xml = read_file_from_zip(&mut archive, WORKBOOK_RELS_PART)?;
    let sheet_info = parse_sheet_info(&workbook_xml)?;
    let targets = parse_relationship_targets(&rels_xml)?;

    let mut patches: HashMap<String, &SheetEdits> = HashMap::new();
    for (sheet, sheet_edits) in edits.iter().filter(|(_, e)| !e.is_empty()) {
        let part = sheet_info
            .iter()
            .find(|(name, _)| name == sheet)
            .and_then(|(_, rid)| targets.get(rid))
            .map(|target| resolve_part_name(target))
            .ok_or_else(|| WorkbookError::MissingWorksheetPart(sheet.clone()))?;
        patches.insert(part, sheet_edits);
    }

    // A calculation chain may name formula cells that now hold constants
    let drop_calc_chain = !patches.is_empty() && archive.index_for_name(CALC_CHAIN_PART).is_some();

    let mut zip_writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    for i in 0..archive.len() {
        let name = archive.by_index_raw(i)?.name().to_string();

        if drop_calc_chain && name == CALC_CHAIN_PART {
            continue;
        }

        if let Some(sheet_edits) = patches.get(&name) {
            let content = read_file_from_zip(&mut archive, &name)?;
            let patched = apply_cell_edits(&content, sheet_edits)?;
            zip_writer.start_file(name.as_str(), options)?;
            zip_writer.write_all(&patched)?;
        } else if drop_calc_chain && name == CONTENT_TYPES_PART {
            let content = read_file_from_zip(&mut archive, &name)?;
            let modified = remove_content_type_override(&content, "/xl/calcChain.xml")?;
            zip_writer.start_file(name.as_str(), options)?;
            zip_writer.write_all(modified.as_bytes())?;
        } else if drop_calc_chain && name == WORKBOOK_RELS_PART {
            let modified = remove_relationship(&rels_xml, "calcChain.xml")?;
            zip_writer.start_file(name.as_str(), options)?;
            zip_writer.write_all(modified.as_bytes())?;
        } else {
            // Copy file as is
            zip_writer.raw_copy_file(archive.by_index_raw(i)?)?;
        }
    }

    let buffer = zip_writer.finish()?.into_inner();
    fs::write(output, buffer)?;
    Ok(())
}

/// Rewrite a worksheet part so every edited cell holds its number.
///
/// Existing cells keep their style index and lose type, formula and value.
/// Missing rows and cells are created in order, and `<dimension>` is widened
/// to cover the edits. Cells sharing the formula of an overwritten cell get
/// the formula written out in full.
pub fn apply_cell_edits(xml: &str, edits: &SheetEdits) -> Result<Vec<u8>, WorkbookError> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let bounds = edit_bounds(edits);
    let mut applied = edits.is_empty();

    loop {
        match reader.read_event()? {
            Event::Empty(e) if e.local_name().as_ref() == b"dimension" => {
                let widened = widen_dimension(&e, bounds)?;
                writer.write_event(Event::Empty(widened))?;
            }
            Event::Start(e) if e.local_name().as_ref() == b"sheetData" => {
                let prefix = element_prefix(&e);
                let end = BytesEnd::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                writer.write_event(Event::Start(e))?;

                let mut rows = read_rows(&mut reader)?;
                detach_shared_formulas(&mut rows, edits)?;
                merge_edits(&mut rows, edits, prefix.as_deref())?;
                write_rows(&mut writer, rows)?;

                writer.write_event(Event::End(end))?;
                applied = true;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"sheetData" => {
                let prefix = element_prefix(&e);
                let end = BytesEnd::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                writer.write_event(Event::Start(e))?;

                let mut rows = Vec::new();
                merge_edits(&mut rows, edits, prefix.as_deref())?;
                write_rows(&mut writer, rows)?;

                writer.write_event(Event::End(end))?;
                applied = true;
            }
            Event::Eof => break,
            e => writer.write_event(e)?,
        }
    }

    if !applied {
        return Err(WorkbookError::Malformed(
            "worksheet has no sheetData element".to_string(),
        ));
    }

    Ok(writer.into_inner().into_inner())
}

/// A `<row>` element with its cells kept as raw events
struct RowXml {
    index: u32,
    start: BytesStart<'static>,
    cells: Vec<CellXml>,
    /// Non-cell children such as `extLst`, written after the cells
    extra: Vec<Event<'static>>,
}

/// A `<c>` element kept as raw events
struct CellXml {
    col: u32,
    events: Vec<Event<'static>>,
}

impl CellXml {
    fn numeric(row: u32, col: u32, value: f64, style: Option<String>, prefix: Option<&str>) -> Self {
        let mut start = BytesStart::new(qualified(prefix, "c"));
        start.push_attribute(("r", CellReference::new(row, col).to_excel_ref().as_str()));
        if let Some(style) = style {
            start.push_attribute(("s", style.as_str()));
        }

        let events = vec![
            Event::Start(start),
            Event::Start(BytesStart::new(qualified(prefix, "v"))),
            Event::Text(BytesText::from_escaped(value.to_string())),
            Event::End(BytesEnd::new(qualified(prefix, "v"))),
            Event::End(BytesEnd::new(qualified(prefix, "c"))),
        ];
        Self { col, events }
    }

    /// Style index (`s` attribute) of the original cell
    fn style(&self) -> Result<Option<String>, WorkbookError> {
        match self.events.first() {
            Some(Event::Start(e)) | Some(Event::Empty(e)) => Ok(e
                .try_get_attribute("s")?
                .map(|attr| String::from_utf8_lossy(&attr.value).into_owned())),
            _ => Ok(None),
        }
    }

    fn formula_position(&self) -> Option<usize> {
        self.events.iter().position(|event| {
            matches!(event, Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"f")
        })
    }

    /// The `<f t="shared">` of this cell, if it has one
    fn shared_formula(&self) -> Result<Option<SharedFormula>, WorkbookError> {
        let Some(pos) = self.formula_position() else {
            return Ok(None);
        };
        let (Event::Start(f) | Event::Empty(f)) = &self.events[pos] else {
            return Ok(None);
        };

        let shared = f
            .try_get_attribute("t")?
            .is_some_and(|attr| attr.value.as_ref() == b"shared");
        let index = f
            .try_get_attribute("si")?
            .map(|attr| String::from_utf8_lossy(&attr.value).into_owned());
        let (true, Some(index)) = (shared, index) else {
            return Ok(None);
        };

        let mut text = String::new();
        if matches!(self.events[pos], Event::Start(_)) {
            for event in &self.events[pos + 1..] {
                match event {
                    Event::Text(t) => text.push_str(&t.unescape().map_err(quick_xml::Error::from)?),
                    _ => break,
                }
            }
        }

        Ok(Some(SharedFormula {
            index,
            text: Some(text).filter(|t| !t.is_empty()),
        }))
    }

    /// Replace the cell's `<f>` element with a plain formula
    fn set_formula(&mut self, formula: &str) {
        let Some(pos) = self.formula_position() else {
            return;
        };
        let (name, end) = match &self.events[pos] {
            Event::Start(f) => {
                let end = self.events[pos..]
                    .iter()
                    .position(|e| matches!(e, Event::End(e) if e.local_name().as_ref() == b"f"))
                    .map_or(pos, |offset| pos + offset);
                (String::from_utf8_lossy(f.name().as_ref()).into_owned(), end)
            }
            Event::Empty(f) => (String::from_utf8_lossy(f.name().as_ref()).into_owned(), pos),
            _ => return,
        };

        self.events.splice(
            pos..=end,
            [
                Event::Start(BytesStart::new(name.clone())),
                Event::Text(BytesText::new(formula).into_owned()),
                Event::End(BytesEnd::new(name)),
            ],
        );
    }
}

/// `si` index of a shared formula; only the master cell carries the text
struct SharedFormula {
    index: String,
    text: Option<String>,
}

/// A shared formula is stored once, on its master cell. When an edit
/// overwrites a master, every dependent left outside the edits gets the
/// formula translated to its own position.
fn detach_shared_formulas(rows: &mut [RowXml], edits: &SheetEdits) -> Result<(), WorkbookError> {
    let mut masters: HashMap<String, (u32, u32, String)> = HashMap::new();
    for row in rows.iter() {
        for cell in &row.cells {
            if !edits.contains_key(&(row.index, cell.col)) {
                continue;
            }
            if let Some(SharedFormula {
                index,
                text: Some(text),
            }) = cell.shared_formula()?
            {
                masters.insert(index, (row.index, cell.col, text));
            }
        }
    }

    if masters.is_empty() {
        return Ok(());
    }

    for row in rows.iter_mut() {
        let row_index = row.index;
        for cell in row.cells.iter_mut() {
            if edits.contains_key(&(row_index, cell.col)) {
                continue;
            }
            let Some(shared) = cell.shared_formula()? else {
                continue;
            };
            if let Some((master_row, master_col, text)) = masters.get(&shared.index) {
                let formula = shift_formula(
                    text,
                    i64::from(row_index) - i64::from(*master_row),
                    i64::from(cell.col) - i64::from(*master_col),
                );
                cell.set_formula(&formula);
            }
        }
    }

    Ok(())
}

fn read_rows(reader: &mut Reader<&[u8]>) -> Result<Vec<RowXml>, WorkbookError> {
    let mut rows = Vec::new();
    let mut current: Option<RowXml> = None;
    let mut next_row = 0u32;
    let mut next_col = 0u32;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"row" => {
                let index = row_index(&e)?.unwrap_or(next_row);
                next_row = index + 1;
                next_col = 0;
                current = Some(RowXml {
                    index,
                    start: e.into_owned(),
                    cells: Vec::new(),
                    extra: Vec::new(),
                });
            }
            Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                let index = row_index(&e)?.unwrap_or(next_row);
                next_row = index + 1;
                rows.push(RowXml {
                    index,
                    start: e.into_owned(),
                    cells: Vec::new(),
                    extra: Vec::new(),
                });
            }
            Event::End(e) if e.local_name().as_ref() == b"row" => {
                if let Some(row) = current.take() {
                    rows.push(row);
                }
            }
            Event::Start(e) if e.local_name().as_ref() == b"c" => {
                let col = cell_column(&e)?.unwrap_or(next_col);
                next_col = col + 1;
                let mut events = vec![Event::Start(e.into_owned())];
                read_element_body(reader, &mut events)?;
                push_cell(&mut current, CellXml { col, events })?;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                let col = cell_column(&e)?.unwrap_or(next_col);
                next_col = col + 1;
                let events = vec![Event::Empty(e.into_owned())];
                push_cell(&mut current, CellXml { col, events })?;
            }
            Event::End(e) if e.local_name().as_ref() == b"sheetData" => break,
            Event::Eof => {
                return Err(WorkbookError::Malformed(
                    "unexpected end of sheetData".to_string(),
                ));
            }
            // Whitespace between rows and cells
            Event::Text(_) => {}
            other => {
                if let Some(row) = current.as_mut() {
                    row.extra.push(other.into_owned());
                }
            }
        }
    }

    rows.sort_by_key(|row| row.index);
    for row in &mut rows {
        row.cells.sort_by_key(|cell| cell.col);
    }
    Ok(rows)
}

fn push_cell(current: &mut Option<RowXml>, cell: CellXml) -> Result<(), WorkbookError> {
    match current.as_mut() {
        Some(row) => {
            row.cells.push(cell);
            Ok(())
        }
        None => Err(WorkbookError::Malformed(
            "cell outside of a row".to_string(),
        )),
    }
}

/// Collect events up to and including the end tag of the current element
fn read_element_body(
    reader: &mut Reader<&[u8]>,
    events: &mut Vec<Event<'static>>,
) -> Result<(), WorkbookError> {
    let mut depth = 0usize;
    loop {
        let event = reader.read_event()?;
        let is_start = matches!(event, Event::Start(_));
        let is_end = matches!(event, Event::End(_));
        if matches!(event, Event::Eof) {
            return Err(WorkbookError::Malformed("unterminated cell".to_string()));
        }

        events.push(event.into_owned());

        if is_start {
            depth += 1;
        } else if is_end {
            if depth == 0 {
                return Ok(());
            }
            depth -= 1;
        }
    }
}

fn merge_edits(
    rows: &mut Vec<RowXml>,
    edits: &SheetEdits,
    prefix: Option<&str>,
) -> Result<(), WorkbookError> {
    for (&(row, col), &value) in edits {
        let row_pos = match rows.binary_search_by_key(&row, |r| r.index) {
            Ok(pos) => pos,
            Err(pos) => {
                let mut start = BytesStart::new(qualified(prefix, "row"));
                start.push_attribute(("r", (row + 1).to_string().as_str()));
                rows.insert(
                    pos,
                    RowXml {
                        index: row,
                        start,
                        cells: Vec::new(),
                        extra: Vec::new(),
                    },
                );
                pos
            }
        };

        let cells = &mut rows[row_pos].cells;
        match cells.binary_search_by_key(&col, |c| c.col) {
            Ok(pos) => {
                let style = cells[pos].style()?;
                cells[pos] = CellXml::numeric(row, col, value, style, prefix);
            }
            Err(pos) => cells.insert(pos, CellXml::numeric(row, col, value, None, prefix)),
        }
    }
    Ok(())
}

fn write_rows<W: Write>(writer: &mut Writer<W>, rows: Vec<RowXml>) -> Result<(), WorkbookError> {
    for row in rows {
        // `spans` is an optional hint that edits may invalidate
        let name = String::from_utf8_lossy(row.start.name().as_ref()).into_owned();
        let mut start = BytesStart::new(name.clone());
        for attr in row.start.attributes() {
            let attr = attr?;
            if attr.key.as_ref() != b"spans" {
                start.push_attribute(attr);
            }
        }

        if row.cells.is_empty() && row.extra.is_empty() {
            writer.write_event(Event::Empty(start))?;
            continue;
        }

        writer.write_event(Event::Start(start))?;
        for cell in row.cells {
            for event in cell.events {
                writer.write_event(event)?;
            }
        }
        for event in row.extra {
            writer.write_event(event)?;
        }
        writer.write_event(Event::End(BytesEnd::new(name)))?;
    }
    Ok(())
}

fn widen_dimension(
    e: &BytesStart<'_>,
    bounds: Option<CellRange>,
) -> Result<BytesStart<'static>, WorkbookError> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let current = e
        .try_get_attribute("ref")?
        .and_then(|attr| CellRange::parse(&String::from_utf8_lossy(&attr.value)).ok());

    let widened = match (current, bounds) {
        (Some(current), Some(bounds)) => Some(current.union(&bounds)),
        (current, bounds) => current.or(bounds),
    };

    let mut dimension = BytesStart::new(name);
    if let Some(range) = widened {
        dimension.push_attribute(("ref", range.to_string().as_str()));
    }
    Ok(dimension)
}

/// Bounding range of the edited cells
fn edit_bounds(edits: &SheetEdits) -> Option<CellRange> {
    edits
        .keys()
        .map(|&(row, col)| {
            let cell = CellReference::new(row, col);
            CellRange::new(cell, cell)
        })
        .reduce(|acc, cell| acc.union(&cell))
}

fn row_index(e: &BytesStart<'_>) -> Result<Option<u32>, WorkbookError> {
    Ok(e.try_get_attribute("r")?.and_then(|attr| {
        String::from_utf8_lossy(&attr.value)
            .parse::<u32>()
            .ok()
            .and_then(|r| r.checked_sub(1))
    }))
}

fn cell_column(e: &BytesStart<'_>) -> Result<Option<u32>, WorkbookError> {
    Ok(e.try_get_attribute("r")?
        .and_then(|attr| CellReference::parse(&String::from_utf8_lossy(&attr.value)))
        .map(|cell| cell.col))
}

fn element_prefix(e: &BytesStart<'_>) -> Option<String> {
    e.name()
        .prefix()
        .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned())
}

fn qualified(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}:{}", prefix, local),
        None => local.to_string(),
    }
}

// Helper functions

fn read_file_from_zip<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    filename: &str,
) -> Result<String, WorkbookError> {
    let mut file = archive.by_name(filename)?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(content)
}

/// Sheet names with their relationship ids, in workbook order
fn parse_sheet_info(workbook_xml: &str) -> Result<Vec<(String, String)>, WorkbookError> {
    let mut reader = Reader::from_str(workbook_xml);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let mut name = String::new();
                let mut rel_id = String::new();

                for attr in e.attributes() {
                    let attr = attr?;
                    match attr.key.local_name().as_ref() {
                        b"name" => {
                            name = attr
                                .unescape_value()
                                .map_err(quick_xml::Error::from)?
                                .into_owned();
                        }
                        b"id" => {
                            rel_id = String::from_utf8_lossy(&attr.value).into_owned();
                        }
                        _ => {}
                    }
                }

                sheets.push((name, rel_id));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(sheets)
}

/// Relationship id to target
fn parse_relationship_targets(rels_xml: &str) -> Result<HashMap<String, String>, WorkbookError> {
    let mut reader = Reader::from_str(rels_xml);
    let mut buf = Vec::new();
    let mut targets = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let mut id = String::new();
                let mut target = String::new();

                for attr in e.attributes() {
                    let attr = attr?;
                    match attr.key.as_ref() {
                        b"Id" => id = String::from_utf8_lossy(&attr.value).into_owned(),
                        b"Target" => {
                            target = attr
                                .unescape_value()
                                .map_err(quick_xml::Error::from)?
                                .into_owned();
                        }
                        _ => {}
                    }
                }

                targets.insert(id, target);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(targets)
}

/// Package part name of a workbook relationship target
fn resolve_part_name(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}

fn remove_content_type_override(xml: &str, part_name: &str) -> Result<String, WorkbookError> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e) if e.name().as_ref() == b"Override" => {
                let matches_part = e
                    .try_get_attribute("PartName")?
                    .is_some_and(|attr| attr.value.as_ref() == part_name.as_bytes());

                if !matches_part {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Event::Eof => break,
            e => writer.write_event(e)?,
        }
        buf.clear();
    }

    let result = writer.into_inner().into_inner();
    String::from_utf8(result).map_err(|e| WorkbookError::Malformed(e.to_string()))
}

fn remove_relationship(xml: &str, target_file: &str) -> Result<String, WorkbookError> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e) if e.name().as_ref() == b"Relationship" => {
                let matches_target = e.try_get_attribute("Target")?.is_some_and(|attr| {
                    String::from_utf8_lossy(&attr.value)
                        .rsplit('/')
                        .next()
                        .is_some_and(|file| file == target_file)
                });

                if !matches_target {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Event::Eof => break,
            e => writer.write_event(e)?,
        }
        buf.clear();
    }

    let result = writer.into_inner().into_inner();
    String::from_utf8(result).map_err(|e| WorkbookError::Malformed(e.to_string()))
}
