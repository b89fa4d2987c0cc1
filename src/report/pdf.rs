//! Minimal PDF 1.4 writer for laid-out report pages.
//!
//! Uses the standard Helvetica fonts, so nothing is embedded. Text is
//! encoded as WinAnsi; characters outside Latin-1 are drawn as `?`.

use std::fmt::Write as _;

use super::layout::{Element, Page, ReportDocument};

const FONT_REGULAR: &str = "F1";
const FONT_BOLD: &str = "F2";

/// Object ids fixed by the document skeleton.
const CATALOG_ID: usize = 1;
const PAGES_ID: usize = 2;
const REGULAR_FONT_ID: usize = 3;
const BOLD_FONT_ID: usize = 4;
const FIRST_PAGE_ID: usize = 5;

struct PdfWriter {
    out: Vec<u8>,
    offsets: Vec<usize>,
}

impl PdfWriter {
    fn new() -> Self {
        let mut out = Vec::new();
        out.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");
        Self {
            out,
            offsets: Vec::new(),
        }
    }

    /// Append object `id`. Objects must be written in id order.
    fn object(&mut self, id: usize, body: &[u8]) {
        debug_assert_eq!(id, self.offsets.len() + 1);
        self.offsets.push(self.out.len());
        self.out
            .extend_from_slice(format!("{id} 0 obj\n").as_bytes());
        self.out.extend_from_slice(body);
        self.out.extend_from_slice(b"\nendobj\n");
    }

    fn stream(&mut self, id: usize, content: &[u8]) {
        let mut body = format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(b"\nendstream");
        self.object(id, &body);
    }

    fn finish(mut self) -> Vec<u8> {
        let xref_offset = self.out.len();
        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", self.offsets.len() + 1);
        for offset in &self.offsets {
            let _ = write!(xref, "{offset:010} 00000 n \n");
        }
        let _ = write!(
            xref,
            "trailer\n<< /Size {} /Root {CATALOG_ID} 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
            self.offsets.len() + 1
        );
        self.out.extend_from_slice(xref.as_bytes());
        self.out
    }
}

/// Render `doc` to PDF bytes.
pub fn render(doc: &ReportDocument) -> Vec<u8> {
    let mut pdf = PdfWriter::new();
    let page_ids: Vec<usize> = (0..doc.pages.len())
        .map(|i| FIRST_PAGE_ID + 2 * i)
        .collect();

    pdf.object(
        CATALOG_ID,
        format!("<< /Type /Catalog /Pages {PAGES_ID} 0 R >>").as_bytes(),
    );

    let kids = page_ids
        .iter()
        .map(|id| format!("{id} 0 R"))
        .collect::<Vec<_>>()
        .join(" ");
    pdf.object(
        PAGES_ID,
        format!(
            "<< /Type /Pages /Kids [{kids}] /Count {} >>",
            page_ids.len()
        )
        .as_bytes(),
    );
    pdf.object(REGULAR_FONT_ID, font_dict("Helvetica").as_bytes());
    pdf.object(BOLD_FONT_ID, font_dict("Helvetica-Bold").as_bytes());

    let layout = &doc.layout;
    for (page, id) in doc.pages.iter().zip(&page_ids) {
        let content_id = id + 1;
        pdf.object(
            *id,
            format!(
                "<< /Type /Page /Parent {PAGES_ID} 0 R /MediaBox [0 0 {} {}] \
                 /Resources << /Font << /{FONT_REGULAR} {REGULAR_FONT_ID} 0 R \
                 /{FONT_BOLD} {BOLD_FONT_ID} 0 R >> >> /Contents {content_id} 0 R >>",
                num(layout.width),
                num(layout.height)
            )
            .as_bytes(),
        );
        pdf.stream(content_id, &page_content(page, layout.height));
    }

    pdf.finish()
}

fn font_dict(base: &str) -> String {
    format!("<< /Type /Font /Subtype /Type1 /BaseFont /{base} /Encoding /WinAnsiEncoding >>")
}

fn page_content(page: &Page, page_height: f32) -> Vec<u8> {
    let mut out = String::new();
    for element in &page.elements {
        match element {
            Element::Text {
                x,
                y,
                size,
                bold,
                text,
            } => {
                let font = if *bold { FONT_BOLD } else { FONT_REGULAR };
                let _ = writeln!(
                    out,
                    "BT /{font} {} Tf {} {} Td ({}) Tj ET",
                    num(*size),
                    num(*x),
                    num(page_height - y),
                    escape(text)
                );
            }
            Element::Rule { x1, x2, y } => {
                let y = num(page_height - y);
                let _ = writeln!(out, "0.5 w {} {y} m {} {y} l S", num(*x1), num(*x2));
            }
        }
    }
    out.into_bytes()
}

fn num(v: f32) -> String {
    let s = format!("{v:.2}");
    s.trim_end_matches('0').trim_end_matches('.').to_owned()
}

/// Escape `text` as the body of a PDF literal string.
///
/// Non-ASCII Latin-1 characters become octal escapes so the content
/// stream stays 7-bit.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            ' '..='~' => out.push(c),
            _ => match u8::try_from(u32::from(c)) {
                Ok(byte) if byte >= 0xA0 => {
                    let _ = write!(out, "\\{byte:03o}");
                }
                _ => out.push('?'),
            },
        }
    }
    out
}
