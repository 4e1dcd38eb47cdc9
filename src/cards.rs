//! On-screen directory: the same household blocks as the PDF, rendered as a
//! scrolling HTML card list.

use handlebars::{Handlebars, RenderError};
use log::warn;
use serde::Serialize;

use crate::directory::{DirectoryRequest, HouseholdBlock, LayoutOptions, compose};
use crate::photo::{PhotoDecode, decode_photo};
use crate::roster::Table;

const CARDS_TEMPLATE: &str = include_str!("./static/cards.hbs");

#[derive(Serialize)]
struct CardPhoto<'a> {
    member: &'a str,
    /// Set only for cells that decode to a bitmap.
    src: Option<&'a str>,
}

#[derive(Serialize)]
struct Card<'a> {
    name_line: &'a str,
    details: &'a [String],
    photos: Vec<CardPhoto<'a>>,
}

#[derive(Serialize)]
struct CardPage<'a> {
    title: &'a str,
    households: usize,
    cards: Vec<Card<'a>>,
}

fn card(block: &HouseholdBlock) -> Card<'_> {
    let photos = block
        .photos
        .iter()
        .map(|slot| {
            let src = match decode_photo(&slot.cell) {
                PhotoDecode::Image(_) => Some(slot.cell.as_str()),
                PhotoDecode::Missing => None,
                PhotoDecode::Malformed => {
                    warn!("unreadable photo for {}; showing a placeholder", slot.member);
                    None
                }
            };
            CardPhoto {
                member: &slot.member,
                src,
            }
        })
        .collect();
    Card {
        name_line: &block.name_line,
        details: &block.details,
        photos,
    }
}

/// Renders already composed blocks as an HTML page.
pub fn render_cards(title: &str, blocks: &[HouseholdBlock]) -> Result<String, RenderError> {
    let page = CardPage {
        title,
        households: blocks.len(),
        cards: blocks.iter().map(card).collect(),
    };
    Handlebars::new().render_template(CARDS_TEMPLATE, &page)
}

/// Filters, groups and renders the table as an HTML card list.
pub fn directory_cards(
    table: &Table,
    request: &DirectoryRequest,
    layout: &LayoutOptions,
) -> Result<String, RenderError> {
    render_cards(&layout.title, &compose(table, request, layout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::NewMember;
    use crate::photo::{Rotation, encode_photo};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png() -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 30, Rgb([200, 20, 20])));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn cards_group_households_and_escape_text() {
        let mut table = Table::default();
        for (name, address) in [("Kim <b>", "1 Main"), ("Lee", "1 Main"), ("Park", "2 Oak")] {
            table
                .register(NewMember {
                    name: name.to_string(),
                    address: address.to_string(),
                    ..Default::default()
                })
                .unwrap();
        }
        let html = directory_cards(&table, &DirectoryRequest::default(), &LayoutOptions::default()).unwrap();
        assert!(html.contains("2 households"));
        assert!(html.contains("Kim &lt;b&gt; / Lee"));
        assert!(html.contains("주소: 2 Oak"));
        assert_eq!(html.matches("class=\"card\"").count(), 2);
    }

    #[test]
    fn only_decodable_photos_become_images() {
        let mut table = Table::default();
        table
            .register(NewMember {
                name: "Good".to_string(),
                address: "1 Main".to_string(),
                photo: encode_photo(&png(), Rotation::None).unwrap(),
                ..Default::default()
            })
            .unwrap();
        table
            .register(NewMember {
                name: "Bad".to_string(),
                address: "1 Main".to_string(),
                photo: "not a photo".to_string(),
                ..Default::default()
            })
            .unwrap();
        let html = directory_cards(&table, &DirectoryRequest::default(), &LayoutOptions::default()).unwrap();
        assert_eq!(html.matches("<img ").count(), 1);
        assert!(html.contains("class=\"placeholder\" title=\"Bad\""));
    }

    #[test]
    fn empty_directory_says_so() {
        let html = render_cards("Title", &[]).unwrap();
        assert!(html.contains("No members match."));
        assert!(html.contains("<h1>Title</h1>"));
    }
}
