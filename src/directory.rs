//! Printable directory layout.
//!
//! Members are filtered by status, grouped into households by address and
//! laid out one block per household: a strip of photo thumbnails, a combined
//! name line and the selected detail lines. Pagination happens between
//! households only, so a household never spans two pages.

use image::DynamicImage;
use log::{debug, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::member::{Column, MemberRecord, Status};
use crate::photo::{PhotoDecode, decode_photo};
use crate::roster::{Table, filter_by_status};

/// Optional per-household information a directory can include.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum DirectoryField {
    Phone,
    Email,
    BirthDate,
    Address,
    BusinessAddress,
    FamilyNote,
    MinistryHistory,
}

impl DirectoryField {
    pub const ALL: [DirectoryField; 7] = [
        DirectoryField::Phone,
        DirectoryField::Address,
        DirectoryField::BusinessAddress,
        DirectoryField::FamilyNote,
        DirectoryField::BirthDate,
        DirectoryField::Email,
        DirectoryField::MinistryHistory,
    ];

    /// What a new directory includes unless told otherwise.
    pub const DEFAULT: [DirectoryField; 3] = [
        DirectoryField::Phone,
        DirectoryField::Address,
        DirectoryField::FamilyNote,
    ];

    fn column(self) -> Column {
        match self {
            DirectoryField::Phone => Column::Phone,
            DirectoryField::Email => Column::Email,
            DirectoryField::BirthDate => Column::BirthDate,
            DirectoryField::Address => Column::Address,
            DirectoryField::BusinessAddress => Column::BusinessAddress,
            DirectoryField::FamilyNote => Column::FamilyNote,
            DirectoryField::MinistryHistory => Column::MinistryHistory,
        }
    }

    pub fn label(self) -> &'static str {
        self.column().header()
    }

    /// Household fields come from the representative member; the rest are
    /// listed for every member.
    fn is_household_level(self) -> bool {
        matches!(
            self,
            DirectoryField::Address | DirectoryField::BusinessAddress | DirectoryField::FamilyNote
        )
    }

    /// Accepts the sheet label or the API key of the column.
    pub fn from_name(name: &str) -> Option<Self> {
        let column = Column::from_header(name)?;
        Self::ALL.into_iter().find(|f| f.column() == column)
    }
}

/// Which members to include and what to show about them.
#[derive(Clone, Debug, Default)]
pub struct DirectoryRequest {
    /// Accepted statuses; empty means everyone.
    pub statuses: Vec<Status>,
    pub fields: Vec<DirectoryField>,
}

impl DirectoryRequest {
    /// Builds a request from comma separated status labels and field names,
    /// as sent by the directory form. Unknown field names are ignored; no
    /// fields at all selects [`DirectoryField::DEFAULT`].
    pub fn from_lists(statuses: &str, fields: &str) -> Self {
        let statuses = statuses
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Status::from_label)
            .collect();
        let mut parsed: Vec<DirectoryField> = fields
            .split(',')
            .filter_map(DirectoryField::from_name)
            .collect();
        let mut seen = HashSet::new();
        parsed.retain(|field| seen.insert(*field));
        if parsed.is_empty() {
            parsed = DirectoryField::DEFAULT.to_vec();
        }
        DirectoryRequest {
            statuses,
            fields: parsed,
        }
    }
}

/// Page geometry and type sizes. Lengths are millimetres, sizes points.
#[derive(Clone, Debug)]
pub struct LayoutOptions {
    pub title: String,
    pub page_width: f32,
    pub page_height: f32,
    pub margin: f32,
    /// A household block must end above this line, unless it is the first
    /// block on its page.
    pub page_threshold: f32,
    pub title_size: f32,
    pub title_height: f32,
    pub photo_size: f32,
    pub photo_gap: f32,
    /// Horizontal room for the photo strip of one household.
    pub photo_budget: f32,
    pub name_size: f32,
    pub name_line_height: f32,
    pub detail_size: f32,
    pub detail_line_height: f32,
    pub block_spacing: f32,
    /// TrueType font embedded in the PDF; Helvetica is used without one.
    pub font_path: Option<PathBuf>,
}

impl Default for LayoutOptions {
    /// A4 portrait, 35 mm thumbnails, room for three photos per household.
    fn default() -> Self {
        Self {
            title: "Church Address Book".to_string(),
            page_width: 210.0,
            page_height: 297.0,
            margin: 10.0,
            page_threshold: 285.0,
            title_size: 16.0,
            title_height: 20.0,
            photo_size: 35.0,
            photo_gap: 3.0,
            photo_budget: 115.0,
            name_size: 12.0,
            name_line_height: 8.0,
            detail_size: 10.0,
            detail_line_height: 6.0,
            block_spacing: 10.0,
            font_path: Some(PathBuf::from("NanumGothic.ttf")),
        }
    }
}

impl LayoutOptions {
    /// Number of thumbnails that fit in the photo budget.
    pub fn max_photos(&self) -> usize {
        let slot = self.photo_size + self.photo_gap;
        if slot <= 0.0 {
            return 0;
        }
        ((self.photo_budget + self.photo_gap) / slot).floor().max(0.0) as usize
    }
}

/// Members sharing one trimmed address.
#[derive(Debug)]
pub struct Household<'a> {
    pub address_key: String,
    pub members: Vec<&'a MemberRecord>,
}

impl<'a> Household<'a> {
    /// First member in table order; source of the household-level fields.
    pub fn representative(&self) -> &'a MemberRecord {
        self.members[0]
    }

    /// `"Name Role / Name Role"` for every member.
    pub fn name_line(&self) -> String {
        self.members
            .iter()
            .map(|m| {
                let role = m.role.label();
                if role.is_empty() {
                    m.name.clone()
                } else {
                    format!("{} {}", m.name, role)
                }
            })
            .collect::<Vec<_>>()
            .join(" / ")
    }
}

/// Groups members by trimmed address.
///
/// Members without an address each form their own household. Households are
/// ordered by their representative's name (plain string order); households
/// with equal names keep the order in which they were first seen.
pub fn group_households<'a, I>(records: I) -> Vec<Household<'a>>
where
    I: IntoIterator<Item = &'a MemberRecord>,
{
    let mut households: Vec<Household<'a>> = Vec::new();
    let mut by_address: HashMap<String, usize> = HashMap::new();

    for record in records {
        let key = record.address_key();
        if key.is_empty() {
            households.push(Household {
                address_key: String::new(),
                members: vec![record],
            });
            continue;
        }
        match by_address.get(key) {
            Some(&index) => households[index].members.push(record),
            None => {
                by_address.insert(key.to_string(), households.len());
                households.push(Household {
                    address_key: key.to_string(),
                    members: vec![record],
                });
            }
        }
    }

    households.sort_by(|a, b| a.representative().name.cmp(&b.representative().name));
    households
}

/// A photo cell waiting to be drawn, with the owner's name for diagnostics.
#[derive(Clone, Debug, Serialize)]
pub struct PhotoSlot {
    pub member: String,
    pub cell: String,
}

/// Everything drawn for one household.
#[derive(Clone, Debug, Serialize)]
pub struct HouseholdBlock {
    pub name_line: String,
    pub details: Vec<String>,
    pub photos: Vec<PhotoSlot>,
}

/// Filters, groups and orders the table into household blocks.
pub fn compose(
    table: &Table,
    request: &DirectoryRequest,
    layout: &LayoutOptions,
) -> Vec<HouseholdBlock> {
    let members = filter_by_status(table.records(), &request.statuses);
    let max_photos = layout.max_photos();

    group_households(members)
        .iter()
        .map(|household| HouseholdBlock {
            name_line: household.name_line(),
            details: detail_lines(household, &request.fields),
            photos: household
                .members
                .iter()
                .take(max_photos)
                .map(|m| PhotoSlot {
                    member: m.name.clone(),
                    cell: m.photo.clone(),
                })
                .collect(),
        })
        .collect()
}

fn detail_lines(household: &Household<'_>, fields: &[DirectoryField]) -> Vec<String> {
    let mut lines = Vec::new();
    for field in fields {
        let column = field.column();
        if field.is_household_level() {
            let value = household.representative().cell(column);
            if !value.is_empty() {
                lines.push(format!("{}: {}", field.label(), value));
            }
            continue;
        }

        let entries: Vec<(&str, &str)> = household
            .members
            .iter()
            .map(|m| (m.name.as_str(), m.cell(column)))
            .filter(|(_, value)| !value.is_empty())
            .collect();
        let Some(first) = entries.first() else {
            continue;
        };
        if entries.iter().all(|(_, value)| *value == first.1) {
            lines.push(format!("{}: {}", field.label(), first.1));
        } else {
            let listed: Vec<String> = entries
                .iter()
                .map(|(name, value)| format!("{} {}", name, value))
                .collect();
            lines.push(format!("{}: {}", field.label(), listed.join(" / ")));
        }
    }
    lines
}

/// Drawing primitives the directory needs from a document.
///
/// Coordinates are millimetres from the top-left corner of the page.
pub trait Canvas {
    fn add_page(&mut self);

    /// Current vertical cursor.
    fn y(&self) -> f32;

    fn set_y(&mut self, y: f32);

    /// Places a bitmap; returns `false` when it could not be embedded.
    fn image(&mut self, image: &DynamicImage, x: f32, y: f32, w: f32, h: f32) -> bool;

    /// Outlined rectangle.
    fn rect(&mut self, x: f32, y: f32, w: f32, h: f32);

    /// Writes `text` wrapped to `width` and returns the height used.
    fn text(&mut self, x: f32, y: f32, width: f32, line_height: f32, size: f32, text: &str) -> f32;

    /// Height `text` would take when wrapped to `width`.
    fn wrapped_height(&self, width: f32, line_height: f32, size: f32, text: &str) -> f32;
}

/// Pages and households written by [`render`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RenderStats {
    pub pages: usize,
    pub households: usize,
    pub placeholders: usize,
}

/// Lays the blocks out on `canvas`, starting a new page between blocks
/// whenever the next block would cross the page threshold.
///
/// A block taller than a whole page is still placed in one piece at the top
/// of a fresh page.
pub fn render<C: Canvas>(canvas: &mut C, blocks: &[HouseholdBlock], layout: &LayoutOptions) -> RenderStats {
    let mut stats = RenderStats::default();

    canvas.add_page();
    stats.pages += 1;
    let title_width = layout.page_width - 2.0 * layout.margin;
    canvas.text(
        layout.margin,
        layout.margin,
        title_width,
        layout.title_height,
        layout.title_size,
        &layout.title,
    );
    canvas.set_y(layout.margin + layout.title_height);
    let mut at_page_top = true;

    for block in blocks {
        let height = block_height(canvas, block, layout);
        if !at_page_top && canvas.y() + height > layout.page_threshold {
            canvas.add_page();
            canvas.set_y(layout.margin);
            stats.pages += 1;
            debug!("page {} starts with {}", stats.pages, block.name_line);
        }

        let top = canvas.y();
        stats.placeholders += draw_block(canvas, block, layout, top);
        canvas.set_y(top + height);
        at_page_top = false;
        stats.households += 1;
    }
    stats
}

fn text_column(block: &HouseholdBlock, layout: &LayoutOptions) -> (f32, f32) {
    let x = layout.margin + block.photos.len() as f32 * (layout.photo_size + layout.photo_gap);
    let width = (layout.page_width - layout.margin - x).max(layout.photo_size);
    (x, width)
}

/// Full height of a block including the spacing after it.
pub fn block_height<C: Canvas>(canvas: &C, block: &HouseholdBlock, layout: &LayoutOptions) -> f32 {
    let (_, width) = text_column(block, layout);
    let mut text_height =
        canvas.wrapped_height(width, layout.name_line_height, layout.name_size, &block.name_line);
    for line in &block.details {
        text_height +=
            canvas.wrapped_height(width, layout.detail_line_height, layout.detail_size, line);
    }
    let photo_height = if block.photos.is_empty() {
        0.0
    } else {
        layout.photo_size
    };
    text_height.max(photo_height) + layout.block_spacing
}

/// Draws one block at `top`; returns how many placeholders were drawn.
fn draw_block<C: Canvas>(canvas: &mut C, block: &HouseholdBlock, layout: &LayoutOptions, top: f32) -> usize {
    let mut placeholders = 0;
    for (i, slot) in block.photos.iter().enumerate() {
        let x = layout.margin + i as f32 * (layout.photo_size + layout.photo_gap);
        let placed = match decode_photo(&slot.cell) {
            PhotoDecode::Image(image) => {
                canvas.image(&image, x, top, layout.photo_size, layout.photo_size)
            }
            PhotoDecode::Missing => false,
            PhotoDecode::Malformed => {
                warn!("unreadable photo for {}; drawing a placeholder", slot.member);
                false
            }
        };
        if !placed {
            canvas.rect(x, top, layout.photo_size, layout.photo_size);
            placeholders += 1;
        }
    }

    let (x, width) = text_column(block, layout);
    let mut y = top;
    y += canvas.text(x, y, width, layout.name_line_height, layout.name_size, &block.name_line);
    for line in &block.details {
        y += canvas.text(x, y, width, layout.detail_line_height, layout.detail_size, line);
    }
    placeholders
}
