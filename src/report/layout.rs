//! Page layout and pagination of the customer report.
//!
//! Coordinates are PDF points measured from the top-left corner of the
//! page; the renderer flips them.

use serde::Deserialize;

use crate::record::CustomerRecord;

pub const TITLE: &str = "Relatório de clientes";
pub const COLUMN_HEADERS: [&str; 3] = ["Nome", "Telefone", "E-mail"];

const TITLE_SIZE: f32 = 16.0;
const HEADER_SIZE: f32 = 11.0;
const ROW_SIZE: f32 = 10.0;
const FOOTER_SIZE: f32 = 9.0;

/// Geometry of a report page. Defaults to A4 portrait.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PageLayout {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
    pub title_y: f32,
    pub header_y: f32,
    /// Baseline of the first row on every page.
    pub first_row_y: f32,
    /// Vertical increment between rows.
    pub row_height: f32,
    /// A row whose bottom would pass this line goes to the next page.
    pub bottom_limit: f32,
    pub footer_y: f32,
    /// Left edge of the phone and email columns.
    pub phone_x: f32,
    pub email_x: f32,
}

impl Default for PageLayout {
    fn default() -> Self {
        Self {
            width: 595.0,
            height: 842.0,
            margin: 40.0,
            title_y: 50.0,
            header_y: 80.0,
            first_row_y: 100.0,
            row_height: 20.0,
            bottom_limit: 780.0,
            footer_y: 810.0,
            phone_x: 260.0,
            email_x: 380.0,
        }
    }
}

impl PageLayout {
    /// How many rows fit between the first row and the bottom limit.
    ///
    /// Never less than one, so pagination always makes progress.
    pub fn rows_per_page(&self) -> usize {
        let step = self.row_height.max(1.0);
        let span = self.bottom_limit - self.first_row_y;
        if !span.is_finite() || span < step {
            return 1;
        }
        ((span / step).floor() as usize).max(1)
    }

    /// Reject geometry that cannot be drawn on a page.
    ///
    /// # Errors
    ///
    /// Returns a description of the first offending value.
    pub fn validate(&self) -> Result<(), String> {
        let values = [
            ("width", self.width),
            ("height", self.height),
            ("margin", self.margin),
            ("title_y", self.title_y),
            ("header_y", self.header_y),
            ("first_row_y", self.first_row_y),
            ("row_height", self.row_height),
            ("bottom_limit", self.bottom_limit),
            ("footer_y", self.footer_y),
            ("phone_x", self.phone_x),
            ("email_x", self.email_x),
        ];
        if let Some((name, value)) = values.iter().find(|(_, v)| !v.is_finite()) {
            return Err(format!("report.layout.{name} must be finite, got {value}"));
        }
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err("report.layout page size must be positive".to_owned());
        }
        if self.row_height <= 0.0 {
            return Err("report.layout.row_height must be positive".to_owned());
        }
        if self.first_row_y >= self.bottom_limit {
            return Err(format!(
                "report.layout.first_row_y ({}) must be above bottom_limit ({})",
                self.first_row_y, self.bottom_limit
            ));
        }
        if self.bottom_limit > self.height || self.footer_y > self.height {
            return Err("report.layout rows and footer must fit on the page".to_owned());
        }
        Ok(())
    }
}

/// A drawing instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Text {
        x: f32,
        y: f32,
        size: f32,
        bold: bool,
        text: String,
    },
    /// Horizontal line from `x1` to `x2` at `y`.
    Rule { x1: f32, x2: f32, y: f32 },
}

impl Element {
    fn text(x: f32, y: f32, size: f32, bold: bool, text: impl Into<String>) -> Self {
        Self::Text {
            x,
            y,
            size,
            bold,
            text: text.into(),
        }
    }

    /// The string drawn by a text element.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } => Some(text),
            Self::Rule { .. } => None,
        }
    }
}

/// One page of the report, 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub number: usize,
    pub elements: Vec<Element>,
}

impl Page {
    /// Text elements in drawing order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.elements.iter().filter_map(Element::as_text)
    }
}

/// A laid-out report, ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportDocument {
    pub layout: PageLayout,
    pub pages: Vec<Page>,
}

/// The footer stamped on page `number` of `total`.
pub fn footer_text(number: usize, total: usize) -> String {
    format!("Página {number} de {total}")
}

/// Lay out `records` (already sorted) into pages.
///
/// Every page opens with the title and column header. The footer needs
/// the page count, so it is stamped in a second pass once all pages exist.
/// An empty record set yields a single page with header and footer.
pub fn paginate(records: &[CustomerRecord], layout: &PageLayout) -> ReportDocument {
    let per_page = layout.rows_per_page();
    let mut pages = Vec::new();

    let mut chunks = records.chunks(per_page).peekable();
    if chunks.peek().is_none() {
        pages.push(page_with_header(1, layout));
    }
    for (index, chunk) in chunks.enumerate() {
        let mut page = page_with_header(index + 1, layout);
        let mut y = layout.first_row_y;
        for record in chunk {
            push_row(&mut page, record, y, layout);
            y += layout.row_height.max(1.0);
        }
        pages.push(page);
    }

    let total = pages.len();
    for page in &mut pages {
        let footer = footer_text(page.number, total);
        let x = layout.width - layout.margin - approx_width(&footer, FOOTER_SIZE);
        page.elements
            .push(Element::text(x, layout.footer_y, FOOTER_SIZE, false, footer));
    }

    ReportDocument {
        layout: layout.clone(),
        pages,
    }
}

fn page_with_header(number: usize, layout: &PageLayout) -> Page {
    let [name, phone, email] = COLUMN_HEADERS;
    let elements = vec![
        Element::text(layout.margin, layout.title_y, TITLE_SIZE, true, TITLE),
        Element::text(layout.margin, layout.header_y, HEADER_SIZE, true, name),
        Element::text(layout.phone_x, layout.header_y, HEADER_SIZE, true, phone),
        Element::text(layout.email_x, layout.header_y, HEADER_SIZE, true, email),
        Element::Rule {
            x1: layout.margin,
            x2: layout.width - layout.margin,
            y: layout.header_y + 5.0,
        },
    ];
    Page { number, elements }
}

fn push_row(page: &mut Page, record: &CustomerRecord, y: f32, layout: &PageLayout) {
    let f = &record.fields;
    let name_width = layout.phone_x - layout.margin - 8.0;
    let phone_width = layout.email_x - layout.phone_x - 8.0;
    let email_width = layout.width - layout.margin - layout.email_x;
    page.elements.extend([
        Element::text(layout.margin, y, ROW_SIZE, false, fit(&f.name, name_width, ROW_SIZE)),
        Element::text(layout.phone_x, y, ROW_SIZE, false, fit(&f.phone, phone_width, ROW_SIZE)),
        Element::text(layout.email_x, y, ROW_SIZE, false, fit(&f.email, email_width, ROW_SIZE)),
    ]);
}

/// Rough Helvetica width: half an em per character.
fn approx_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * 0.5
}

/// Truncate `text` with an ellipsis so it fits `width` points.
fn fit(text: &str, width: f32, size: f32) -> String {
    if approx_width(text, size) <= width {
        return text.to_owned();
    }
    let max_chars = ((width / (size * 0.5)) as usize).saturating_sub(3);
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
