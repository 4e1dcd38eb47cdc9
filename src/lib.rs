/*!
# Church Roster

A membership roster kept in a spreadsheet, with a printable household
directory.

## Overview

Staff search, edit and add member records (name, role, contact details,
photo, visitation notes). The roster lives in a Google Sheet, or a CSV file
for local use, and is always written back whole. From the same table the
directory groups members into households and lays them out as PDF pages or
an HTML card list.

## Architecture

### Record store
- **Backends**: Google Sheets (feature `web`), CSV file, in-memory
- **Adapter**: header-keyed rows in, normalized [`member::MemberRecord`]s out
- **Save**: clear then rewrite every row; a content fingerprint detects
  edits made by another session since the load (last writer still wins)
- **Degradation**: an unreachable sheet yields an empty table that refuses
  to be saved

### Directory compositor
- Status filter, grouping by trimmed address, ordering by representative
- Per-household blocks: photo strip, name line, selected detail lines
- Page breaks only between households

## Modules

- **member**: schema columns, roles, statuses and the record type
- **normalize**: cell cleaning, phone and date formats, header-row detection
- **roster**: the in-memory table, edits and search
- **store**: backend trait, load and whole-table save
- **loader**: CSV backend
- **photo**: thumbnail encoding and tolerant decoding
- **directory**: household grouping and pagination over a `Canvas`
- **pdf**: the PDF canvas
- **font**: TrueType embedding and the Helvetica fallback for PDF text
- **cards**: the HTML card list
- **downloader**: CSV and XLSX export
- **config**: `ROSTER_*` environment settings
- **google**, **app**: Sheets backend and HTTP routes (feature `web`)

## REST API Endpoints

- `GET|POST /api/members` - Search, register
- `GET|PUT|DELETE /api/members/{id}` - Read, edit, remove
- `POST /api/members/{id}/visits`, `POST /api/members/{id}/photo`
- `POST /api/session/rotate`, `POST /api/reload`
- `GET /directory`, `GET /api/directory.pdf`
- `GET /api/export.csv`, `GET /api/export.xlsx`
*/

pub mod cards;
pub mod config;
pub mod directory;
pub mod downloader;
pub mod errors;
pub mod font;
pub mod loader;
pub mod member;
pub mod normalize;
pub mod pdf;
pub mod photo;
pub mod roster;
pub mod store;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod google;

pub use errors::*;
pub use roster::{EditSession, Table};
pub use store::{RecordStore, SaveReport, SheetBackend};
