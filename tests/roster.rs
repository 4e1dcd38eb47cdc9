use chrono::NaiveDate;
use roster::cards::directory_cards;
use roster::directory::{DirectoryField, DirectoryRequest, LayoutOptions};
use roster::loader::CsvSheet;
use roster::member::{MemberPatch, NewMember, Role, Status};
use roster::pdf::render_pdf;
use roster::store::RecordStore;
use std::fs;

const SHEET: &str = "\
ID,이름,직분,상태,전화번호,생년월일,주소,자녀,심방 기록
a1,Kim Minsu,집사,출석 중,01012345678,1970.03.05,12 Maple St,\"Jisoo, Jiho\",[2023-12-01] first visit
a2,Kim Younghee,권사,출석 중,010-9876-5432,19720811, 12 Maple St ,,
,Lee Jun,성도,이사,nan,NaT,4 Oak Ave,None,
이름,,,,,,,,
,,,,,,,,
a1,Park Sora,청년,출석 중,4165550000,,,,
";

#[test]
fn load_edit_save_and_print() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roster.csv");
    fs::write(&path, SHEET).unwrap();

    let store = RecordStore::new(Box::new(CsvSheet::new(&path)));
    let mut table = store.load().unwrap();

    // header echo and blank rows are dropped, ids repaired
    assert_eq!(table.len(), 4);
    let ids: Vec<&str> = table.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids[0], "a1");
    assert!(!ids[2].is_empty());
    assert_ne!(ids[3], "a1");

    let kim = table.get("a1").unwrap();
    assert_eq!(kim.role, Role::Deacon);
    assert_eq!(kim.phone, "010-1234-5678");
    assert_eq!(kim.birth_date, "1970-03-05");
    let lee = &table.records()[2];
    assert_eq!(lee.phone, "");
    assert_eq!(lee.birth_date, "");
    assert_eq!(lee.family_note, "");
    assert_eq!(lee.status, Status::Relocated);

    // edits through the form paths
    table
        .append_visitation("a1", NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(), "hospital visit")
        .unwrap();
    table
        .update(
            "a2",
            MemberPatch {
                email: Some("yh@example.com".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    let new_id = table
        .register(NewMember {
            name: "Choi Hana".to_string(),
            address: "9 Birch Rd".to_string(),
            status: Status::Active,
            ..Default::default()
        })
        .unwrap();

    let report = store.save(&mut table).unwrap();
    assert!(!report.conflict);
    assert_eq!(report.rows_written, 5);

    let reloaded = store.load().unwrap();
    assert_eq!(reloaded.records(), table.records());
    assert_eq!(
        reloaded.get("a1").unwrap().visitation_log(),
        "[2023-12-01] first visit\n[2024-05-01] hospital visit"
    );
    assert!(reloaded.get(&new_id).is_some());

    // directory of active members: the Kims share a household
    let request = DirectoryRequest {
        statuses: vec![Status::Active],
        fields: vec![DirectoryField::Phone, DirectoryField::FamilyNote],
    };
    let layout = LayoutOptions::default();
    let html = directory_cards(&reloaded, &request, &layout).unwrap();
    assert!(html.contains("Kim Minsu 집사 / Kim Younghee 권사"));
    assert!(html.contains("자녀: Jisoo, Jiho"));
    assert!(!html.contains("Lee Jun"));
    assert!(html.contains("3 households"));

    let (pdf, stats) = render_pdf(&reloaded, &request, &layout);
    assert!(pdf.starts_with(b"%PDF"));
    assert_eq!(stats.households, 3);
    assert_eq!(stats.pages, 1);
}

#[test]
fn concurrent_sessions_last_writer_wins() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roster.csv");
    fs::write(&path, "이름\nAlice\n").unwrap();

    let first = RecordStore::new(Box::new(CsvSheet::new(&path)));
    let second = RecordStore::new(Box::new(CsvSheet::new(&path)));
    let mut a = first.load().unwrap();
    let mut b = second.load().unwrap();

    a.register(NewMember {
        name: "Bob".to_string(),
        ..Default::default()
    })
    .unwrap();
    assert!(!first.save(&mut a).unwrap().conflict);

    b.register(NewMember {
        name: "Carol".to_string(),
        ..Default::default()
    })
    .unwrap();
    assert!(second.save(&mut b).unwrap().conflict);

    let names: Vec<String> = first.load().unwrap().iter().map(|r| r.name.clone()).collect();
    assert_eq!(names, vec!["Alice", "Carol"]);
}
