//! Fonts for the PDF writer.
//!
//! A TrueType file is embedded whole as a Type0 font with Identity-H
//! encoding, so Hangul and any other glyph the font carries print as
//! written. Without one the writer falls back to base-14 Helvetica, which
//! only covers Latin-1.

use flate2::Compression;
use flate2::write::ZlibEncoder;
use log::debug;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use ttf_parser::{Face, GlyphId};

use crate::errors::FontError;
use crate::pdf::ObjectWriter;

/// Helvetica advance widths for `' '..='~'`, in 1/1000 em.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // 'A'..'M'
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N'..'Z'
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // 'a'..'m'
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // 'n'..'z'
    334, 260, 334, 584, // '{'..'~'
];

const HELVETICA_DEFAULT_WIDTH: u16 = 556;

/// Objects written for the Type0 font: the font itself, its CID font,
/// descriptor, font file and ToUnicode map.
const TRUETYPE_OBJECTS: usize = 5;

/// An embeddable TrueType font and the glyphs drawn with it so far.
pub struct TrueTypeFont {
    name: String,
    data: Vec<u8>,
    units_per_em: u16,
    ascent: i16,
    descent: i16,
    cap_height: i16,
    bbox: [i16; 4],
    /// Glyph id to the character it was drawn for and its advance.
    used: BTreeMap<u16, (char, u16)>,
}

impl TrueTypeFont {
    /// Reads a `.ttf` file; the PDF font name comes from the file stem.
    pub fn load(path: &Path) -> Result<Self, FontError> {
        let data = fs::read(path)?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        Self::from_bytes(stem, data)
    }

    pub fn from_bytes(name: &str, data: Vec<u8>) -> Result<Self, FontError> {
        let face = Face::parse(&data, 0).map_err(|e| FontError::Parse(e.to_string()))?;
        let bbox = face.global_bounding_box();
        let units_per_em = face.units_per_em();
        let ascent = face.ascender();
        let descent = face.descender();
        let cap_height = face.capital_height().unwrap_or(ascent);
        debug!(
            "font {}: {} glyphs, {} units/em",
            name,
            face.number_of_glyphs(),
            units_per_em
        );

        let mut pdf_name: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect();
        if pdf_name.is_empty() {
            pdf_name = "RosterFont".to_string();
        }

        Ok(TrueTypeFont {
            name: pdf_name,
            units_per_em,
            ascent,
            descent,
            cap_height,
            bbox: [bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max],
            used: BTreeMap::new(),
            data,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Font units scaled to the 1000-unit em PDF widths use.
    fn scale(&self, units: i32) -> i32 {
        units * 1000 / i32::from(self.units_per_em)
    }
}

/// Glyph for `c`; characters the font lacks use its `?`, then `.notdef`.
fn lookup(face: &Face<'_>, c: char) -> (u16, u16) {
    let glyph = face
        .glyph_index(c)
        .or_else(|| face.glyph_index('?'))
        .unwrap_or(GlyphId(0));
    (glyph.0, face.glyph_hor_advance(glyph).unwrap_or(0))
}

/// The font every piece of text on a page is set in.
pub enum PdfFont {
    Helvetica,
    TrueType(TrueTypeFont),
}

enum Metrics<'a> {
    Helvetica,
    TrueType { face: Face<'a>, units_per_em: f32 },
}

impl Metrics<'_> {
    /// Advance of `text` in 1/1000 em.
    fn units(&self, text: &str) -> f32 {
        match self {
            Metrics::Helvetica => text
                .chars()
                .map(|c| match c {
                    ' '..='~' => HELVETICA_WIDTHS[c as usize - 0x20],
                    _ => HELVETICA_DEFAULT_WIDTH,
                })
                .map(f32::from)
                .sum(),
            Metrics::TrueType { face, units_per_em } => {
                let total: f32 = text.chars().map(|c| f32::from(lookup(face, c).1)).sum();
                total * 1000.0 / units_per_em
            }
        }
    }
}

impl PdfFont {
    fn metrics(&self) -> Metrics<'_> {
        match self {
            PdfFont::TrueType(font) => match Face::parse(&font.data, 0) {
                Ok(face) => Metrics::TrueType {
                    face,
                    units_per_em: f32::from(font.units_per_em),
                },
                Err(_) => Metrics::Helvetica,
            },
            PdfFont::Helvetica => Metrics::Helvetica,
        }
    }

    /// Width of `text` set at `size`, in points.
    pub fn text_width(&self, text: &str, size: f32) -> f32 {
        self.metrics().units(text) * size / 1000.0
    }

    /// Breaks `text` into lines no wider than `max_width` points.
    ///
    /// Lines break at whitespace; a word wider than a whole line is broken
    /// between characters. Explicit newlines always start a new line.
    pub fn wrap(&self, max_width: f32, size: f32, text: &str) -> Vec<String> {
        let metrics = self.metrics();
        let fits = |s: &str| metrics.units(s) * size / 1000.0 <= max_width;
        let mut lines = Vec::new();

        for paragraph in text.lines() {
            let mut line = String::new();
            for word in paragraph.split_whitespace() {
                let candidate = if line.is_empty() {
                    word.to_string()
                } else {
                    format!("{} {}", line, word)
                };
                if fits(&candidate) {
                    line = candidate;
                    continue;
                }
                if !line.is_empty() {
                    lines.push(std::mem::take(&mut line));
                }
                for c in word.chars() {
                    line.push(c);
                    if line.chars().count() > 1 && !fits(&line) {
                        line.pop();
                        lines.push(std::mem::replace(&mut line, c.to_string()));
                    }
                }
            }
            lines.push(line);
        }
        lines
    }

    /// The string operand that shows `text`, recording the glyphs used.
    pub fn encode(&mut self, text: &str) -> Vec<u8> {
        match self {
            PdfFont::Helvetica => {
                let mut operand = vec![b'('];
                operand.extend_from_slice(&winansi_string(text));
                operand.push(b')');
                operand
            }
            PdfFont::TrueType(font) => {
                let Ok(face) = Face::parse(&font.data, 0) else {
                    return b"<>".to_vec();
                };
                let mut hex = String::from("<");
                for c in text.chars() {
                    let (glyph, advance) = lookup(&face, c);
                    font.used.entry(glyph).or_insert((c, advance));
                    hex.push_str(&format!("{:04X}", glyph));
                }
                hex.push('>');
                hex.into_bytes()
            }
        }
    }

    /// Number of PDF objects [`write_objects`](Self::write_objects) writes.
    pub fn object_count(&self) -> usize {
        match self {
            PdfFont::Helvetica => 1,
            PdfFont::TrueType(_) => TRUETYPE_OBJECTS,
        }
    }

    /// Writes the font objects; the font dictionary itself gets `first`.
    pub(crate) fn write_objects(&self, writer: &mut ObjectWriter, first: usize) {
        let font = match self {
            PdfFont::Helvetica => {
                writer.object(
                    first,
                    b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>",
                );
                return;
            }
            PdfFont::TrueType(font) => font,
        };
        let (cid_font, descriptor, file, to_unicode) = (first + 1, first + 2, first + 3, first + 4);

        writer.object(
            first,
            format!(
                "<< /Type /Font /Subtype /Type0 /BaseFont /{} /Encoding /Identity-H /DescendantFonts [{} 0 R] /ToUnicode {} 0 R >>",
                font.name, cid_font, to_unicode
            )
            .as_bytes(),
        );

        let widths: String = font
            .used
            .iter()
            .map(|(glyph, (_, advance))| format!("{} [{}] ", glyph, font.scale(i32::from(*advance))))
            .collect();
        writer.object(
            cid_font,
            format!(
                "<< /Type /Font /Subtype /CIDFontType2 /BaseFont /{} /CIDSystemInfo << /Registry (Adobe) /Ordering (Identity) /Supplement 0 >> /FontDescriptor {} 0 R /DW 1000 /W [{}] /CIDToGIDMap /Identity >>",
                font.name, descriptor, widths
            )
            .as_bytes(),
        );

        let [x_min, y_min, x_max, y_max] = font.bbox.map(|v| font.scale(i32::from(v)));
        writer.object(
            descriptor,
            format!(
                "<< /Type /FontDescriptor /FontName /{} /Flags 32 /FontBBox [{} {} {} {}] /ItalicAngle 0 /Ascent {} /Descent {} /CapHeight {} /StemV 80 /FontFile2 {} 0 R >>",
                font.name,
                x_min,
                y_min,
                x_max,
                y_max,
                font.scale(i32::from(font.ascent)),
                font.scale(i32::from(font.descent)),
                font.scale(i32::from(font.cap_height)),
                file
            )
            .as_bytes(),
        );

        let length1 = font.data.len();
        match compress(&font.data) {
            Some(packed) => writer.stream(
                file,
                &format!("/Length1 {} /Filter /FlateDecode", length1),
                &packed,
            ),
            None => writer.stream(file, &format!("/Length1 {}", length1), &font.data),
        }

        writer.stream(to_unicode, "", to_unicode_cmap(&font.used).as_bytes());
    }
}

fn compress(data: &[u8]) -> Option<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).ok()?;
    encoder.finish().ok()
}

/// CMap that lets viewers copy and search the text drawn by glyph id.
fn to_unicode_cmap(used: &BTreeMap<u16, (char, u16)>) -> String {
    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n12 dict begin\nbegincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n/CMapType 2 def\n\
         1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
    );
    let entries: Vec<(&u16, &(char, u16))> = used.iter().collect();
    // at most 100 entries per bfchar block
    for chunk in entries.chunks(100) {
        cmap.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (glyph, (c, _)) in chunk {
            let utf16: String = c
                .encode_utf16(&mut [0u16; 2])
                .iter()
                .map(|unit| format!("{:04X}", unit))
                .collect();
            cmap.push_str(&format!("<{:04X}> <{}>\n", glyph, utf16));
        }
        cmap.push_str("endbfchar\n");
    }
    cmap.push_str("endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n");
    cmap
}

/// Encodes text as the body of a PDF literal string in WinAnsi.
///
/// Characters outside Latin-1 become `?`.
pub fn winansi_string(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                bytes.push(b'\\');
                bytes.push(c as u8);
            }
            ' '..='~' => bytes.push(c as u8),
            '\u{a0}'..='\u{ff}' => bytes.push(c as u32 as u8),
            _ => bytes.push(b'?'),
        }
    }
    bytes
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn push16(out: &mut Vec<u8>, v: u16) {
        out.extend_from_slice(&v.to_be_bytes());
    }

    fn push32(out: &mut Vec<u8>, v: u32) {
        out.extend_from_slice(&v.to_be_bytes());
    }

    /// Glyph id the test font gives `c`: its rank among the covered
    /// characters, after `.notdef`.
    pub(crate) fn glyph_of(covered: &str, c: char) -> u16 {
        let mut chars: Vec<char> = covered.chars().collect();
        chars.sort_unstable();
        chars.dedup();
        chars.iter().position(|x| *x == c).map(|i| i as u16 + 1).unwrap_or(0)
    }

    /// A minimal TrueType font mapping every character of `covered` to its
    /// own glyph. Hangul syllables are a full em wide, everything else half.
    pub(crate) fn test_font(covered: &str) -> Vec<u8> {
        let mut chars: Vec<char> = covered.chars().collect();
        chars.sort_unstable();
        chars.dedup();
        let glyphs = chars.len() as u16 + 1;

        let mut cmap = Vec::new();
        push16(&mut cmap, 0);
        push16(&mut cmap, 1);
        push16(&mut cmap, 3);
        push16(&mut cmap, 10);
        push32(&mut cmap, 12);
        push16(&mut cmap, 12);
        push16(&mut cmap, 0);
        push32(&mut cmap, 16 + 12 * chars.len() as u32);
        push32(&mut cmap, 0);
        push32(&mut cmap, chars.len() as u32);
        for (i, c) in chars.iter().enumerate() {
            push32(&mut cmap, *c as u32);
            push32(&mut cmap, *c as u32);
            push32(&mut cmap, i as u32 + 1);
        }

        let mut head = Vec::new();
        push32(&mut head, 0x0001_0000);
        push32(&mut head, 0x0001_0000);
        push32(&mut head, 0);
        push32(&mut head, 0x5F0F_3CF5);
        push16(&mut head, 0);
        push16(&mut head, 1000);
        head.extend_from_slice(&[0; 16]);
        for v in [0i16, -200, 1000, 800] {
            push16(&mut head, v as u16);
        }
        push16(&mut head, 0);
        push16(&mut head, 8);
        push16(&mut head, 2);
        push16(&mut head, 0);
        push16(&mut head, 0);

        let mut hhea = Vec::new();
        push32(&mut hhea, 0x0001_0000);
        for v in [800i16, -200, 0] {
            push16(&mut hhea, v as u16);
        }
        push16(&mut hhea, 1000);
        // side bearings, extent, caret, reserved and metric format
        hhea.extend_from_slice(&[0; 22]);
        push16(&mut hhea, glyphs);

        let mut hmtx = Vec::new();
        push16(&mut hmtx, 500);
        push16(&mut hmtx, 0);
        for c in &chars {
            let hangul = ('\u{AC00}'..='\u{D7A3}').contains(c);
            push16(&mut hmtx, if hangul { 1000 } else { 500 });
            push16(&mut hmtx, 0);
        }

        let mut maxp = Vec::new();
        push32(&mut maxp, 0x0000_5000);
        push16(&mut maxp, glyphs);

        let tables: [(&[u8; 4], Vec<u8>); 5] = [
            (b"cmap", cmap),
            (b"head", head),
            (b"hhea", hhea),
            (b"hmtx", hmtx),
            (b"maxp", maxp),
        ];
        let mut font = Vec::new();
        push32(&mut font, 0x0001_0000);
        push16(&mut font, tables.len() as u16);
        push16(&mut font, 64);
        push16(&mut font, 2);
        push16(&mut font, 16);
        let mut offset = 12 + 16 * tables.len();
        let mut body = Vec::new();
        for (tag, data) in &tables {
            font.extend_from_slice(*tag);
            push32(&mut font, 0);
            push32(&mut font, offset as u32);
            push32(&mut font, data.len() as u32);
            body.extend_from_slice(data);
            while body.len() % 4 != 0 {
                body.push(0);
            }
            offset = 12 + 16 * tables.len() + body.len();
        }
        font.extend_from_slice(&body);
        font
    }

    #[test]
    fn winansi_strings_are_escaped() {
        assert_eq!(winansi_string("a(b)\\"), b"a\\(b\\)\\\\".to_vec());
        assert_eq!(winansi_string("é한"), vec![0xe9, b'?']);
    }

    #[test]
    fn helvetica_widths_follow_the_font_metrics() {
        let font = PdfFont::Helvetica;
        assert_eq!(font.text_width("i", 10.0), 2.22);
        assert!(font.text_width("WWW", 10.0) > font.text_width("iii", 10.0) * 4.0);
    }

    #[test]
    fn truetype_font_measures_real_advances() {
        let font = PdfFont::TrueType(TrueTypeFont::from_bytes("Test Font", test_font("가나다라마바ab")).unwrap());
        assert_eq!(font.text_width("가나", 10.0), 20.0);
        assert_eq!(font.text_width("ab", 10.0), 10.0);
        // 35 pt holds three full-width syllables at 10 pt
        assert_eq!(font.wrap(35.0, 10.0, "가나다라마바"), vec!["가나다", "라마바"]);
        assert_eq!(font.wrap(35.0, 10.0, "가나 다라"), vec!["가나", "다라"]);
    }

    #[test]
    fn glyphs_are_encoded_by_id_and_mapped_back_to_text() {
        let covered = "김철수 ";
        let mut font = PdfFont::TrueType(TrueTypeFont::from_bytes("Nanum", test_font(covered)).unwrap());
        let operand = font.encode("김철수");
        let expected: String = "김철수"
            .chars()
            .map(|c| format!("{:04X}", glyph_of(covered, c)))
            .collect();
        assert_eq!(operand, format!("<{}>", expected).into_bytes());

        let PdfFont::TrueType(font) = &font else {
            unreachable!()
        };
        let cmap = to_unicode_cmap(&font.used);
        assert!(cmap.contains(&format!("<{:04X}> <AE40>", glyph_of(covered, '김'))));
        assert!(cmap.contains("3 beginbfchar"));
    }

    #[test]
    fn missing_characters_use_the_question_mark_glyph() {
        let covered = "ab?";
        let mut font = PdfFont::TrueType(TrueTypeFont::from_bytes("t", test_font(covered)).unwrap());
        let operand = String::from_utf8(font.encode("a한")).unwrap();
        assert_eq!(
            operand,
            format!("<{:04X}{:04X}>", glyph_of(covered, 'a'), glyph_of(covered, '?'))
        );
    }

    #[test]
    fn garbage_is_not_a_font() {
        assert!(matches!(
            TrueTypeFont::from_bytes("x", b"not a font".to_vec()),
            Err(FontError::Parse(_))
        ));
        assert!(matches!(
            TrueTypeFont::load(Path::new("/nonexistent/NanumGothic.ttf")),
            Err(FontError::Io(_))
        ));
    }

    #[test]
    fn font_names_are_valid_pdf_names() {
        let font = TrueTypeFont::from_bytes("Nanum Gothic (1)", test_font("a")).unwrap();
        assert_eq!(font.name(), "NanumGothic1");
    }
}
