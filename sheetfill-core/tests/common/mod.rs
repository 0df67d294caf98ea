#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Registry;
use tracing_subscriber::layer::{Context, Layer, Layered, SubscriberExt};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Cell content of a fixture worksheet
#[derive(Clone, Copy)]
pub enum Fixture<'a> {
    Number(f64),
    Text(&'a str),
    Formula(&'a str, f64),
    /// Master of a shared formula: text, covered range, `si` index, cached value
    SharedFormula(&'a str, &'a str, u32, f64),
    /// Cell reusing the shared formula with the given `si` index
    SharedFormulaRef(u32, f64),
}

pub struct SheetFixture<'a> {
    pub name: &'a str,
    pub cells: Vec<(&'a str, Fixture<'a>)>,
}

impl<'a> SheetFixture<'a> {
    pub fn new(name: &'a str) -> Self {
        Self {
            name,
            cells: Vec::new(),
        }
    }

    pub fn cell(mut self, cell_ref: &'a str, value: Fixture<'a>) -> Self {
        self.cells.push((cell_ref, value));
        self
    }
}

// Helper to create a minimal valid XLSX file for testing
pub fn create_xlsx(path: &Path, sheets: &[SheetFixture], with_calc_chain: bool) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    // 1. [Content_Types].xml
    zip.start_file("[Content_Types].xml", options)?;
    let mut content_types = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
"#,
    );
    for (i, _) in sheets.iter().enumerate() {
        content_types.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
            i + 1
        ));
    }
    if with_calc_chain {
        content_types.push_str(r#"<Override PartName="/xl/calcChain.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml"/>"#);
    }
    content_types.push_str("</Types>");
    zip.write_all(content_types.as_bytes())?;

    // 2. _rels/.rels
    zip.start_file("_rels/.rels", options)?;
    zip.write_all(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#.as_bytes())?;

    // 3. xl/workbook.xml
    zip.start_file("xl/workbook.xml", options)?;
    let mut workbook_xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets>
"#,
    );
    for (i, sheet) in sheets.iter().enumerate() {
        workbook_xml.push_str(&format!(
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            sheet.name,
            i + 1,
            i + 1
        ));
    }
    workbook_xml.push_str("</sheets></workbook>");
    zip.write_all(workbook_xml.as_bytes())?;

    // 4. xl/_rels/workbook.xml.rels
    zip.start_file("xl/_rels/workbook.xml.rels", options)?;
    let mut rels_xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
"#,
    );
    for (i, _) in sheets.iter().enumerate() {
        rels_xml.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.xml"/>"#,
            i + 1, i + 1
        ));
    }
    if with_calc_chain {
        rels_xml.push_str(r#"<Relationship Id="rId100" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain" Target="calcChain.xml"/>"#);
    }
    rels_xml.push_str("</Relationships>");
    zip.write_all(rels_xml.as_bytes())?;

    // 5. sheets
    for (i, sheet) in sheets.iter().enumerate() {
        zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)?;
        zip.write_all(sheet_xml(sheet).as_bytes())?;
    }

    if with_calc_chain {
        zip.start_file("xl/calcChain.xml", options)?;
        zip.write_all(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<calcChain xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><c r="A1" i="1"/></calcChain>"#.as_bytes())?;
    }

    zip.finish()?;
    Ok(())
}

fn sheet_xml(sheet: &SheetFixture) -> String {
    // Group cells by their row number, keeping the given order inside a row
    let mut rows: Vec<(u32, Vec<String>)> = Vec::new();
    for (cell_ref, value) in &sheet.cells {
        let row: u32 = cell_ref
            .trim_start_matches(|c: char| c.is_ascii_alphabetic())
            .parse()
            .expect("fixture cell reference");
        let xml = match value {
            Fixture::Number(n) => format!(r#"<c r="{}"><v>{}</v></c>"#, cell_ref, n),
            Fixture::Text(t) => format!(r#"<c r="{}" t="inlineStr"><is><t>{}</t></is></c>"#, cell_ref, t),
            Fixture::Formula(f, v) => format!(r#"<c r="{}"><f>{}</f><v>{}</v></c>"#, cell_ref, f, v),
            Fixture::SharedFormula(f, range, si, v) => format!(
                r#"<c r="{}"><f t="shared" ref="{}" si="{}">{}</f><v>{}</v></c>"#,
                cell_ref, range, si, f, v
            ),
            Fixture::SharedFormulaRef(si, v) => {
                format!(r#"<c r="{}"><f t="shared" si="{}"/><v>{}</v></c>"#, cell_ref, si, v)
            }
        };
        match rows.iter_mut().find(|(r, _)| *r == row) {
            Some((_, cells)) => cells.push(xml),
            None => rows.push((row, vec![xml])),
        }
    }
    rows.sort_by_key(|(r, _)| *r);

    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (row, cells) in rows {
        xml.push_str(&format!(r#"<row r="{}">"#, row));
        for cell in cells {
            xml.push_str(&cell);
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

/// Read one part of a zip package as text
pub fn read_part(path: &Path, part: &str) -> anyhow::Result<String> {
    let file = File::open(path)?;
    let mut zip = zip::ZipArchive::new(file)?;
    let mut entry = zip.by_name(part)?;
    let mut content = String::new();
    std::io::Read::read_to_string(&mut entry, &mut content)?;
    Ok(content)
}

/// Records every event as (level, message)
#[derive(Clone, Default)]
pub struct LogCapture {
    events: Arc<Mutex<Vec<(Level, String)>>>,
}

impl LogCapture {
    pub fn subscriber(&self) -> Layered<LogCapture, Registry> {
        Registry::default().with(self.clone())
    }

    pub fn events(&self) -> Vec<(Level, String)> {
        self.events.lock().unwrap().clone()
    }

    pub fn at(&self, level: Level) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message)
            .collect()
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.insert_str(0, &format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        self.events
            .lock()
            .unwrap()
            .push((*event.metadata().level(), visitor.0));
    }
}
