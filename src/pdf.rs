//! Minimal PDF writer for the printed directory.
//!
//! Text is set in an embedded TrueType font (see [`crate::font`]) when one
//! is configured and readable, otherwise in base-14 Helvetica. Photos are
//! embedded as JPEG streams.

use image::DynamicImage;
use log::{debug, warn};
use std::io::Write;

use crate::directory::{Canvas, DirectoryRequest, LayoutOptions, RenderStats, compose, render};
use crate::font::{PdfFont, TrueTypeFont};
use crate::photo::jpeg_bytes;
use crate::roster::Table;

const PT_PER_MM: f32 = 72.0 / 25.4;

/// Catalog, page tree and shared resources come first; fonts follow.
const FIRST_FONT_OBJECT: usize = 4;

struct PdfImage {
    width: u32,
    height: u32,
    jpeg: Vec<u8>,
}

/// Numbered objects written in order, with their offsets for the xref table.
pub(crate) struct ObjectWriter {
    out: Vec<u8>,
    offsets: Vec<usize>,
}

impl ObjectWriter {
    fn new(object_count: usize) -> Self {
        let mut out = Vec::new();
        out.extend_from_slice(b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n");
        ObjectWriter {
            out,
            offsets: vec![0; object_count],
        }
    }

    pub(crate) fn object(&mut self, id: usize, body: &[u8]) {
        self.offsets[id] = self.out.len();
        self.out.extend_from_slice(format!("{} 0 obj\n", id).as_bytes());
        self.out.extend_from_slice(body);
        self.out.extend_from_slice(b"\nendobj\n");
    }

    /// A stream object; `entries` are extra dictionary entries besides `/Length`.
    pub(crate) fn stream(&mut self, id: usize, entries: &str, data: &[u8]) {
        self.offsets[id] = self.out.len();
        let entries = if entries.is_empty() {
            String::new()
        } else {
            format!("{} ", entries)
        };
        self.out.extend_from_slice(
            format!("{} 0 obj\n<< {}/Length {} >>\nstream\n", id, entries, data.len()).as_bytes(),
        );
        self.out.extend_from_slice(data);
        self.out.extend_from_slice(b"\nendstream\nendobj\n");
    }

    fn finish(mut self) -> Vec<u8> {
        let object_count = self.offsets.len();
        let xref_offset = self.out.len();
        self.out
            .extend_from_slice(format!("xref\n0 {}\n", object_count).as_bytes());
        self.out.extend_from_slice(b"0000000000 65535 f \n");
        for offset in self.offsets.iter().skip(1) {
            self.out
                .extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        self.out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                object_count, xref_offset
            )
            .as_bytes(),
        );
        self.out
    }
}

/// A document being drawn, page by page.
pub struct PdfDocument {
    page_width: f32,
    page_height: f32,
    font: PdfFont,
    pages: Vec<Vec<u8>>,
    images: Vec<PdfImage>,
    y: f32,
}

impl PdfDocument {
    /// New empty document set in Helvetica; sizes in millimetres.
    pub fn new(page_width: f32, page_height: f32) -> Self {
        Self::with_font(page_width, page_height, PdfFont::Helvetica)
    }

    pub fn with_font(page_width: f32, page_height: f32, font: PdfFont) -> Self {
        PdfDocument {
            page_width,
            page_height,
            font,
            pages: Vec::new(),
            images: Vec::new(),
            y: 0.0,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn current(&mut self) -> &mut Vec<u8> {
        if self.pages.is_empty() {
            self.add_page();
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn to_pt(mm: f32) -> f32 {
        mm * PT_PER_MM
    }

    /// PDF y coordinate (from the bottom) of a point `y` mm from the top.
    fn flip(&self, y: f32) -> f32 {
        Self::to_pt(self.page_height - y)
    }

    fn wrap(&self, width: f32, size: f32, text: &str) -> Vec<String> {
        self.font.wrap(Self::to_pt(width), size, text)
    }

    /// Serializes the document.
    pub fn finish(mut self) -> Vec<u8> {
        if self.pages.is_empty() {
            self.add_page();
        }

        let image_base = FIRST_FONT_OBJECT + self.font.object_count();
        let page_base = image_base + self.images.len();
        let object_count = page_base + 2 * self.pages.len();
        let mut writer = ObjectWriter::new(object_count);

        let kids: Vec<String> = (0..self.pages.len())
            .map(|i| format!("{} 0 R", page_base + 2 * i))
            .collect();
        let xobjects: String = (0..self.images.len())
            .map(|i| format!("/Im{} {} 0 R ", i, image_base + i))
            .collect();

        writer.object(1, b"<< /Type /Catalog /Pages 2 0 R >>");
        writer.object(
            2,
            format!(
                "<< /Type /Pages /Kids [{}] /Count {} >>",
                kids.join(" "),
                self.pages.len()
            )
            .as_bytes(),
        );
        writer.object(
            3,
            format!(
                "<< /Font << /F1 {} 0 R >> /XObject << {}>> >>",
                FIRST_FONT_OBJECT, xobjects
            )
            .as_bytes(),
        );
        self.font.write_objects(&mut writer, FIRST_FONT_OBJECT);

        for (i, image) in self.images.iter().enumerate() {
            let entries = format!(
                "/Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceRGB /BitsPerComponent 8 /Filter /DCTDecode",
                image.width, image.height
            );
            writer.stream(image_base + i, &entries, &image.jpeg);
        }

        let media_box = format!(
            "[0 0 {:.2} {:.2}]",
            Self::to_pt(self.page_width),
            Self::to_pt(self.page_height)
        );
        for (i, content) in self.pages.iter().enumerate() {
            let page_id = page_base + 2 * i;
            let content_id = page_id + 1;
            writer.object(
                page_id,
                format!(
                    "<< /Type /Page /Parent 2 0 R /MediaBox {} /Resources 3 0 R /Contents {} 0 R >>",
                    media_box, content_id
                )
                .as_bytes(),
            );
            writer.stream(content_id, "", content);
        }

        let out = writer.finish();
        debug!(
            "pdf: {} pages, {} images, {} bytes",
            self.pages.len(),
            self.images.len(),
            out.len()
        );
        out
    }
}

impl Canvas for PdfDocument {
    fn add_page(&mut self) {
        self.pages.push(b"0.5 w\n".to_vec());
        self.y = 0.0;
    }

    fn y(&self) -> f32 {
        self.y
    }

    fn set_y(&mut self, y: f32) {
        self.y = y;
    }

    fn image(&mut self, image: &DynamicImage, x: f32, y: f32, w: f32, h: f32) -> bool {
        let jpeg = match jpeg_bytes(image) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                debug!("could not embed image: {}", e);
                return false;
            }
        };
        let index = self.images.len();
        self.images.push(PdfImage {
            width: image.width(),
            height: image.height(),
            jpeg,
        });
        let bottom = self.flip(y + h);
        let command = format!(
            "q {:.2} 0 0 {:.2} {:.2} {:.2} cm /Im{} Do Q\n",
            Self::to_pt(w),
            Self::to_pt(h),
            Self::to_pt(x),
            bottom,
            index
        );
        self.current().extend_from_slice(command.as_bytes());
        true
    }

    fn rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        let bottom = self.flip(y + h);
        let command = format!(
            "{:.2} {:.2} {:.2} {:.2} re S\n",
            Self::to_pt(x),
            bottom,
            Self::to_pt(w),
            Self::to_pt(h)
        );
        self.current().extend_from_slice(command.as_bytes());
    }

    fn text(&mut self, x: f32, y: f32, width: f32, line_height: f32, size: f32, text: &str) -> f32 {
        let lines = self.wrap(width, size, text);
        for (i, line) in lines.iter().enumerate() {
            if line.is_empty() {
                continue;
            }
            let baseline = self.flip(y + (i as f32 + 0.7) * line_height);
            let mut command = Vec::new();
            // writing into a Vec cannot fail
            let _ = write!(
                command,
                "BT /F1 {:.1} Tf {:.2} {:.2} Td ",
                size,
                Self::to_pt(x),
                baseline
            );
            command.extend_from_slice(&self.font.encode(line));
            command.extend_from_slice(b" Tj ET\n");
            self.current().extend_from_slice(&command);
        }
        lines.len() as f32 * line_height
    }

    fn wrapped_height(&self, width: f32, line_height: f32, size: f32, text: &str) -> f32 {
        self.wrap(width, size, text).len() as f32 * line_height
    }
}

/// The configured TrueType font, or Helvetica when there is none or it
/// cannot be read.
pub fn load_font(layout: &LayoutOptions) -> PdfFont {
    let Some(path) = &layout.font_path else {
        return PdfFont::Helvetica;
    };
    match TrueTypeFont::load(path) {
        Ok(font) => {
            debug!("embedding font {} from {}", font.name(), path.display());
            PdfFont::TrueType(font)
        }
        Err(e) => {
            warn!(
                "font {} unavailable ({}); falling back to Helvetica, non-Latin text prints as ?",
                path.display(),
                e
            );
            PdfFont::Helvetica
        }
    }
}

/// Renders the directory for `table` as PDF bytes, in the font from
/// [`load_font`].
///
/// # Examples
/// ```
/// use roster::directory::{DirectoryRequest, LayoutOptions};
/// use roster::member::NewMember;
/// use roster::pdf::render_pdf;
/// use roster::roster::Table;
///
/// let mut table = Table::default();
/// table.register(NewMember { name: "Alice".into(), address: "1 Main".into(), ..Default::default() }).unwrap();
/// let layout = LayoutOptions { font_path: None, ..Default::default() };
/// let (bytes, stats) = render_pdf(&table, &DirectoryRequest::default(), &layout);
/// assert!(bytes.starts_with(b"%PDF"));
/// assert_eq!(stats.households, 1);
/// ```
pub fn render_pdf(
    table: &Table,
    request: &DirectoryRequest,
    layout: &LayoutOptions,
) -> (Vec<u8>, RenderStats) {
    render_pdf_with_font(table, request, layout, load_font(layout))
}

pub fn render_pdf_with_font(
    table: &Table,
    request: &DirectoryRequest,
    layout: &LayoutOptions,
    font: PdfFont,
) -> (Vec<u8>, RenderStats) {
    let blocks = compose(table, request, layout);
    let mut document = PdfDocument::with_font(layout.page_width, layout.page_height, font);
    let stats = render(&mut document, &blocks, layout);
    (document.finish(), stats)
}
