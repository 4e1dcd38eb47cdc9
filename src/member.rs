use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;
use crate::normalize::{clean_cell, normalize_birth_date, normalize_phone};

/// Opaque, stable identifier of a member row.
pub type MemberId = String;

/// Bumped whenever the option lists of [`Role`] or [`Status`] change.
pub const ROLE_OPTIONS_VERSION: u32 = 1;

/// Church office held by a member.
///
/// The sheet stores the Korean label. Labels outside the option list are
/// kept verbatim in `Other` so a load/save round trip never rewrites them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Role {
    #[default]
    Unspecified,
    Pastor,
    Elder,
    SeniorDeaconess,
    Deacon,
    Member,
    Youth,
    Other(String),
}

impl Role {
    /// Selectable offices, in display order.
    pub const OPTIONS: [Role; 6] = [
        Role::Pastor,
        Role::Elder,
        Role::SeniorDeaconess,
        Role::Deacon,
        Role::Member,
        Role::Youth,
    ];

    pub fn label(&self) -> &str {
        match self {
            Role::Unspecified => "",
            Role::Pastor => "목사",
            Role::Elder => "장로",
            Role::SeniorDeaconess => "권사",
            Role::Deacon => "집사",
            Role::Member => "성도",
            Role::Youth => "청년",
            Role::Other(label) => label,
        }
    }

    fn english(&self) -> &'static str {
        match self {
            Role::Pastor => "pastor",
            Role::Elder => "elder",
            Role::SeniorDeaconess => "senior deaconess",
            Role::Deacon => "deacon",
            Role::Member => "member",
            Role::Youth => "youth",
            Role::Unspecified | Role::Other(_) => "",
        }
    }

    /// Parses a sheet label or English name; unknown text becomes `Other`.
    pub fn from_label(raw: &str) -> Self {
        let label = raw.trim();
        if label.is_empty() {
            return Role::Unspecified;
        }
        Self::OPTIONS
            .iter()
            .find(|role| role.label() == label || role.english().eq_ignore_ascii_case(label))
            .cloned()
            .unwrap_or_else(|| Role::Other(label.to_string()))
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        Role::from_label(&s)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.label().to_string()
    }
}

/// Attendance / membership state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Status {
    #[default]
    Unspecified,
    Active,
    LongAbsent,
    Relocated,
    TransferredOut,
    Other(String),
}

impl Status {
    pub const OPTIONS: [Status; 4] = [
        Status::Active,
        Status::LongAbsent,
        Status::Relocated,
        Status::TransferredOut,
    ];

    pub fn label(&self) -> &str {
        match self {
            Status::Unspecified => "",
            Status::Active => "출석 중",
            Status::LongAbsent => "장기 결석",
            Status::Relocated => "이사",
            Status::TransferredOut => "타교회 이적",
            Status::Other(label) => label,
        }
    }

    fn english(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::LongAbsent => "long-absent",
            Status::Relocated => "relocated",
            Status::TransferredOut => "transferred-out",
            Status::Unspecified | Status::Other(_) => "",
        }
    }

    pub fn from_label(raw: &str) -> Self {
        let label = raw.trim();
        if label.is_empty() {
            return Status::Unspecified;
        }
        Self::OPTIONS
            .iter()
            .find(|status| status.label() == label || status.english().eq_ignore_ascii_case(label))
            .cloned()
            .unwrap_or_else(|| Status::Other(label.to_string()))
    }
}

impl From<String> for Status {
    fn from(s: String) -> Self {
        Status::from_label(&s)
    }
}

impl From<Status> for String {
    fn from(status: Status) -> Self {
        status.label().to_string()
    }
}

/// Sheet columns, in the order they are written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    Id,
    Name,
    Role,
    Status,
    Phone,
    BirthDate,
    Email,
    Address,
    BusinessAddress,
    FamilyNote,
    MinistryHistory,
    Photo,
    VisitationLog,
}

impl Column {
    pub const ALL: [Column; 13] = [
        Column::Id,
        Column::Name,
        Column::Role,
        Column::Status,
        Column::Phone,
        Column::BirthDate,
        Column::Email,
        Column::Address,
        Column::BusinessAddress,
        Column::FamilyNote,
        Column::MinistryHistory,
        Column::Photo,
        Column::VisitationLog,
    ];

    /// Header label written to the sheet.
    pub fn header(self) -> &'static str {
        match self {
            Column::Id => "ID",
            Column::Name => "이름",
            Column::Role => "직분",
            Column::Status => "상태",
            Column::Phone => "전화번호",
            Column::BirthDate => "생년월일",
            Column::Email => "이메일",
            Column::Address => "주소",
            Column::BusinessAddress => "비즈니스 주소",
            Column::FamilyNote => "자녀",
            Column::MinistryHistory => "사역 이력",
            Column::Photo => "사진",
            Column::VisitationLog => "심방 기록",
        }
    }

    /// Field name used by the JSON API.
    pub fn key(self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::Name => "name",
            Column::Role => "role",
            Column::Status => "status",
            Column::Phone => "phone",
            Column::BirthDate => "birthDate",
            Column::Email => "email",
            Column::Address => "address",
            Column::BusinessAddress => "businessAddress",
            Column::FamilyNote => "familyNote",
            Column::MinistryHistory => "ministryHistory",
            Column::Photo => "photo",
            Column::VisitationLog => "visitationLog",
        }
    }

    /// Matches a sheet header by label or API key, ignoring surrounding
    /// whitespace and ASCII case.
    pub fn from_header(header: &str) -> Option<Column> {
        let header = header.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.header() == header || c.key().eq_ignore_ascii_case(header))
    }

    pub fn header_row() -> Vec<String> {
        Self::ALL.iter().map(|c| c.header().to_string()).collect()
    }
}

/// One row of the roster.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRecord {
    pub id: MemberId,
    pub name: String,
    pub role: Role,
    pub status: Status,
    pub phone: String,
    pub birth_date: String,
    pub email: String,
    pub address: String,
    pub business_address: String,
    pub family_note: String,
    pub ministry_history: String,
    pub photo: String,
    visitation_log: String,
}

impl MemberRecord {
    /// Builds a record from cell values, normalizing every cell.
    ///
    /// `cell` is asked once per schema column and may return an empty string
    /// for columns the sheet does not have.
    pub fn from_cells<F>(mut cell: F) -> Self
    where
        F: FnMut(Column) -> String,
    {
        let mut get = |column| clean_cell(&cell(column));
        MemberRecord {
            id: get(Column::Id),
            name: get(Column::Name),
            role: Role::from_label(&get(Column::Role)),
            status: Status::from_label(&get(Column::Status)),
            phone: normalize_phone(&get(Column::Phone)),
            birth_date: normalize_birth_date(&get(Column::BirthDate)),
            email: get(Column::Email),
            address: get(Column::Address),
            business_address: get(Column::BusinessAddress),
            family_note: get(Column::FamilyNote),
            ministry_history: get(Column::MinistryHistory),
            photo: get(Column::Photo),
            visitation_log: get(Column::VisitationLog),
        }
    }

    pub fn cell(&self, column: Column) -> &str {
        match column {
            Column::Id => &self.id,
            Column::Name => &self.name,
            Column::Role => self.role.label(),
            Column::Status => self.status.label(),
            Column::Phone => &self.phone,
            Column::BirthDate => &self.birth_date,
            Column::Email => &self.email,
            Column::Address => &self.address,
            Column::BusinessAddress => &self.business_address,
            Column::FamilyNote => &self.family_note,
            Column::MinistryHistory => &self.ministry_history,
            Column::Photo => &self.photo,
            Column::VisitationLog => &self.visitation_log,
        }
    }

    /// Values in schema column order.
    pub fn to_row(&self) -> Vec<String> {
        Column::ALL
            .iter()
            .map(|c| self.cell(*c).to_string())
            .collect()
    }

    pub fn visitation_log(&self) -> &str {
        &self.visitation_log
    }

    /// Appends a dated note to the visitation journal.
    ///
    /// Existing content is never touched; blank notes are ignored and
    /// return `false`.
    pub fn append_visitation(&mut self, date: NaiveDate, note: &str) -> bool {
        let note = note.trim();
        if note.is_empty() {
            return false;
        }
        if !self.visitation_log.is_empty() {
            self.visitation_log.push('\n');
        }
        self.visitation_log
            .push_str(&format!("[{}] {}", date.format("%Y-%m-%d"), note));
        true
    }

    pub fn has_photo(&self) -> bool {
        !self.photo.is_empty()
    }

    /// Trimmed address, the household grouping key.
    pub fn address_key(&self) -> &str {
        self.address.trim()
    }
}

/// Registration form.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewMember {
    pub name: String,
    pub role: Role,
    pub status: Status,
    pub phone: String,
    pub birth_date: String,
    pub email: String,
    pub address: String,
    pub business_address: String,
    pub family_note: String,
    pub ministry_history: String,
    pub photo: String,
}

impl NewMember {
    /// Validates the form and builds the record under `id`.
    pub fn into_record(self, id: MemberId) -> Result<MemberRecord, ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::MissingName);
        }
        Ok(MemberRecord {
            id,
            name: name.to_string(),
            role: self.role,
            status: self.status,
            phone: normalize_phone(&clean_cell(&self.phone)),
            birth_date: normalize_birth_date(&clean_cell(&self.birth_date)),
            email: clean_cell(&self.email),
            address: clean_cell(&self.address),
            business_address: clean_cell(&self.business_address),
            family_note: clean_cell(&self.family_note),
            ministry_history: clean_cell(&self.ministry_history),
            photo: clean_cell(&self.photo),
            visitation_log: String::new(),
        })
    }
}

/// Edit form: every present field overwrites the stored value.
///
/// There is deliberately no way to set `id` or the visitation journal here.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemberPatch {
    pub name: Option<String>,
    pub role: Option<Role>,
    pub status: Option<Status>,
    pub phone: Option<String>,
    pub birth_date: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub business_address: Option<String>,
    pub family_note: Option<String>,
    pub ministry_history: Option<String>,
    pub photo: Option<String>,
}

impl MemberPatch {
    /// Applies the patch. A blank name rejects the whole patch.
    pub fn apply(self, record: &mut MemberRecord) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(ValidationError::MissingName);
            }
        }

        if let Some(name) = self.name {
            record.name = name.trim().to_string();
        }
        if let Some(role) = self.role {
            record.role = role;
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(phone) = self.phone {
            record.phone = normalize_phone(&clean_cell(&phone));
        }
        if let Some(birth_date) = self.birth_date {
            record.birth_date = normalize_birth_date(&clean_cell(&birth_date));
        }
        let text_fields = [
            (self.email, &mut record.email),
            (self.address, &mut record.address),
            (self.business_address, &mut record.business_address),
            (self.family_note, &mut record.family_note),
            (self.ministry_history, &mut record.ministry_history),
            (self.photo, &mut record.photo),
        ];
        for (value, slot) in text_fields {
            if let Some(value) = value {
                *slot = clean_cell(&value);
            }
        }
        Ok(())
    }
}
