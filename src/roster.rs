use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::{RosterError, ValidationError};
use crate::member::{MemberId, MemberPatch, MemberRecord, NewMember, Status};
use crate::photo::Rotation;

/// Where a [`Table`] snapshot came from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Origin {
    /// Built in memory; never read from the sheet.
    #[default]
    Fresh,
    /// Read from the sheet; `version` fingerprints the content at load time.
    Loaded { version: String },
    /// The sheet could not be read and this is an empty stand-in.
    Degraded,
}

/// In-memory snapshot of the roster for one session.
#[derive(Clone, Debug, Default)]
pub struct Table {
    records: Vec<MemberRecord>,
    origin: Origin,
}

impl Table {
    pub fn new(records: Vec<MemberRecord>) -> Self {
        Table {
            records,
            origin: Origin::Fresh,
        }
    }

    pub(crate) fn with_origin(records: Vec<MemberRecord>, origin: Origin) -> Self {
        Table { records, origin }
    }

    /// Empty stand-in handed out when the sheet is unreachable.
    pub fn degraded() -> Self {
        Table {
            records: Vec::new(),
            origin: Origin::Degraded,
        }
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub(crate) fn set_origin(&mut self, origin: Origin) {
        self.origin = origin;
    }

    pub fn records(&self) -> &[MemberRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemberRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&MemberRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut MemberRecord, RosterError> {
        self.records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| RosterError::UnknownMember(id.to_string()))
    }

    /// 1-based position of the member, as shown in list views.
    pub fn display_index(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|r| r.id == id).map(|i| i + 1)
    }

    /// Adds a member from the registration form and returns the new id.
    ///
    /// Nothing is added when validation fails.
    pub fn register(&mut self, form: NewMember) -> Result<MemberId, ValidationError> {
        let id = self.fresh_id();
        let record = form.into_record(id.clone())?;
        self.records.push(record);
        Ok(id)
    }

    pub fn update(&mut self, id: &str, patch: MemberPatch) -> Result<(), RosterError> {
        let record = self.get_mut(id)?;
        patch.apply(record)?;
        Ok(())
    }

    /// Appends a dated note to the member's visitation journal.
    pub fn append_visitation(
        &mut self,
        id: &str,
        date: NaiveDate,
        note: &str,
    ) -> Result<bool, RosterError> {
        let record = self.get_mut(id)?;
        Ok(record.append_visitation(date, note))
    }

    /// Drops a member. The sheet only changes on the next save.
    pub fn remove(&mut self, id: &str) -> Option<MemberRecord> {
        let index = self.records.iter().position(|r| r.id == id)?;
        Some(self.records.remove(index))
    }

    /// Case-insensitive search over name, address and email. Queries made
    /// only of digits and separators also match phone digits.
    pub fn search(&self, query: &str) -> Vec<&MemberRecord> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.records.iter().collect();
        }
        let digits: String = needle.chars().filter(|c| c.is_ascii_digit()).collect();
        let phone_query = !digits.is_empty()
            && needle
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '.' | '(' | ')' | '+'));

        self.records
            .iter()
            .filter(|r| {
                let text_hit = [&r.name, &r.address, &r.email]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&needle));
                let phone_hit = phone_query && {
                    let phone: String = r.phone.chars().filter(|c| c.is_ascii_digit()).collect();
                    phone.contains(&digits)
                };
                text_hit || phone_hit
            })
            .collect()
    }

    /// Members whose status is in `accepted`; an empty set keeps everyone.
    pub fn filter_by_status(&self, accepted: &[Status]) -> Vec<&MemberRecord> {
        filter_by_status(&self.records, accepted)
    }

    fn fresh_id(&self) -> MemberId {
        loop {
            let id = new_member_id();
            if self.get(&id).is_none() {
                return id;
            }
        }
    }
}

/// Keeps records whose status is in `accepted`; an empty set keeps all.
pub fn filter_by_status<'a>(
    records: &'a [MemberRecord],
    accepted: &[Status],
) -> Vec<&'a MemberRecord> {
    records
        .iter()
        .filter(|r| accepted.is_empty() || accepted.contains(&r.status))
        .collect()
}

pub fn new_member_id() -> MemberId {
    Uuid::new_v4().simple().to_string()
}

/// Editing state of one client: the member being edited and the rotation
/// applied to the next photo upload.
#[derive(Clone, Debug, Default, Serialize)]
pub struct EditSession {
    pub selected: Option<MemberId>,
    pub rotation: Rotation,
}

impl EditSession {
    /// Selects a member for editing; switching members resets the rotation.
    pub fn select(&mut self, id: &str) {
        if self.selected.as_deref() != Some(id) {
            self.selected = Some(id.to_string());
            self.rotation = Rotation::default();
        }
    }

    pub fn rotate(&mut self) -> Rotation {
        self.rotation = self.rotation.next();
        self.rotation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::Role;

    fn member(name: &str, address: &str, status: Status) -> NewMember {
        NewMember {
            name: name.to_string(),
            address: address.to_string(),
            status,
            ..Default::default()
        }
    }

    fn sample() -> (Table, Vec<MemberId>) {
        let mut table = Table::default();
        let ids = vec![
            table.register(member("Alice Kim", "1 Main", Status::Active)).unwrap(),
            table.register(member("Bob Lee", "1 Main", Status::LongAbsent)).unwrap(),
            table.register(member("Chris Park", "2 Oak", Status::Active)).unwrap(),
        ];
        (table, ids)
    }

    #[test]
    fn register_assigns_unique_ids() {
        let (table, ids) = sample();
        assert_eq!(table.len(), 3);
        assert_ne!(ids[0], ids[1]);
        assert_eq!(table.display_index(&ids[2]), Some(3));
    }

    #[test]
    fn failed_registration_adds_nothing() {
        let (mut table, _) = sample();
        assert!(table.register(member("", "x", Status::Active)).is_err());
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn update_unknown_member_is_an_error() {
        let (mut table, _) = sample();
        let err = table.update("nope", MemberPatch::default()).unwrap_err();
        assert_eq!(err, RosterError::UnknownMember("nope".to_string()));
    }

    #[test]
    fn update_keeps_id() {
        let (mut table, ids) = sample();
        let patch = MemberPatch {
            role: Some(Role::Elder),
            ..Default::default()
        };
        table.update(&ids[1], patch).unwrap();
        let record = table.get(&ids[1]).unwrap();
        assert_eq!(record.role, Role::Elder);
        assert_eq!(record.id, ids[1]);
    }

    #[test]
    fn visitation_appends_in_order() {
        let (mut table, ids) = sample();
        let day = NaiveDate::from_ymd_opt(2025, 1, 5).unwrap();
        table.append_visitation(&ids[0], day, "x").unwrap();
        table.append_visitation(&ids[0], day, "y").unwrap();
        let log = table.get(&ids[0]).unwrap().visitation_log();
        let x = log.find("x").unwrap();
        let y = log.find("y").unwrap();
        assert!(x < y);
    }

    #[test]
    fn remove_drops_by_id() {
        let (mut table, ids) = sample();
        let removed = table.remove(&ids[1]).unwrap();
        assert_eq!(removed.name, "Bob Lee");
        assert!(table.get(&ids[1]).is_none());
        assert!(table.remove(&ids[1]).is_none());
        assert_eq!(table.display_index(&ids[2]), Some(2));
    }

    #[test]
    fn search_matches_text_and_phone_digits() {
        let (mut table, ids) = sample();
        let patch = MemberPatch {
            phone: Some("4165551234".to_string()),
            ..Default::default()
        };
        table.update(&ids[2], patch).unwrap();

        assert_eq!(table.search("alice").len(), 1);
        assert_eq!(table.search("main").len(), 2);
        assert_eq!(table.search("555 1234")[0].name, "Chris Park");
        assert_eq!(table.search("").len(), 3);
    }

    #[test]
    fn empty_status_filter_keeps_everything() {
        let (table, _) = sample();
        let all = table.filter_by_status(&[]);
        assert_eq!(all.len(), table.len());
        assert!(all.iter().zip(table.iter()).all(|(a, b)| *a == b));

        let active = table.filter_by_status(&[Status::Active]);
        assert_eq!(active.len(), 2);
    }

    #[test]
    fn session_rotation_resets_on_new_selection() {
        let mut session = EditSession::default();
        session.select("a");
        session.rotate();
        assert_eq!(session.rotation, Rotation::Cw90);
        session.select("a");
        assert_eq!(session.rotation, Rotation::Cw90);
        session.select("b");
        assert_eq!(session.rotation, Rotation::None);
    }
}
