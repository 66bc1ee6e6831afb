//! Tests for the gradebook and reconciliation.

use std::path::PathBuf;

use nbgrade::{
    bulk::BulkResult,
    constants::INELIGIBLE_FEEDBACK,
    error::{GradeError, NotebookError},
    grade::GradeRecord,
    gradebook::{Gradebook, ReviewItem, reconcile},
};
use tempfile::TempDir;

const GRADEBOOK: &str = "\
Identifier,Full name,Email address,Status,Grade,Maximum Grade
Participant 1001,Jane Doe,jane@example.org,Submitted,,10.00
Participant 1002,John Roe,john@example.org,Submitted,,10.00
Participant 1003,Max Mu,max@example.org,No submission,,10.00
";

fn gradebook(dir: &TempDir, text: &str) -> PathBuf {
    let path = dir.path().join("grades.csv");
    std::fs::write(&path, text).expect("write gradebook");
    path
}

fn graded(participant_id: u64, username: &str, total_grade: u32, eid_matches: bool) -> BulkResult {
    BulkResult {
        participant_id,
        username: username.to_string(),
        total_grade,
        feedback: format!("{{1: {total_grade}}}"),
        eid_matches,
    }
}

#[test]
fn load_adds_missing_output_columns() {
    let dir = TempDir::new().expect("tempdir");
    let book = Gradebook::load(&gradebook(&dir, GRADEBOOK)).expect("load");
    assert_eq!(book.full_name(1002).expect("row"), "John Roe");
    assert_eq!(book.get(1003, "Status").expect("cell"), "No submission");
    assert_eq!(book.get(1001, "Feedback comments").expect("cell"), "");
}

#[test]
fn load_requires_identifier_and_name() {
    let dir = TempDir::new().expect("tempdir");
    let err = Gradebook::load(&gradebook(&dir, "Identifier,Grade\nParticipant 1,\n"))
        .expect_err("no name column");
    assert!(err.to_string().contains("Full name"), "{err}");
}

#[test]
fn load_rejects_rows_longer_than_the_header() {
    let dir = TempDir::new().expect("tempdir");
    let text = format!("{GRADEBOOK}Participant 1004,Ann Lee,ann@example.org,Submitted,,10.00,x\n");
    let err = Gradebook::load(&gradebook(&dir, &text)).expect_err("extra field");
    assert!(matches!(err, GradeError::Gradebook { .. }), "{err:?}");
    assert!(err.to_string().contains("row 5 has 7 fields, the header has 6"), "{err}");
}

#[test]
fn load_pads_short_rows() {
    let dir = TempDir::new().expect("tempdir");
    let text = "Identifier,Full name,Email address,Grade\nParticipant 1001,Jane Doe\n";
    let book = Gradebook::load(&gradebook(&dir, text)).expect("load");
    assert_eq!(book.get(1001, "Email address").expect("cell"), "");
    assert_eq!(book.get(1001, "Grade").expect("cell"), "");
}

#[test]
fn record_and_save_quote_text_fields() {
    let dir = TempDir::new().expect("tempdir");
    let path = gradebook(&dir, GRADEBOOK);
    let mut book = Gradebook::load(&path).expect("load");
    book.record(1001, 7, "{1: 5, 2: 2}").expect("record");
    book.save().expect("save");

    let written = std::fs::read_to_string(&path).expect("read back");
    let mut lines = written.lines();
    assert_eq!(
        lines.next(),
        Some(
            "\"Identifier\",\"Full name\",\"Email address\",\"Status\",\"Grade\",\"Maximum \
             Grade\",\"Feedback comments\""
        )
    );
    assert_eq!(
        lines.next(),
        Some(
            "\"Participant 1001\",\"Jane Doe\",\"jane@example.org\",\"Submitted\",7,10.00,\"{1: \
             5, 2: 2}\""
        )
    );

    let reloaded = Gradebook::load(&path).expect("reload");
    assert_eq!(reloaded.get(1001, "Grade").expect("cell"), "7");
    assert_eq!(reloaded.get(1002, "Grade").expect("cell"), "");
}

#[test]
fn reconcile_writes_grades_and_lists_anomalies() {
    let dir = TempDir::new().expect("tempdir");
    let path = gradebook(&dir, GRADEBOOK);
    let mut book = Gradebook::load(&path).expect("load");
    let results = vec![
        graded(1001, "jdoe", 9, true),
        graded(1002, "jdoe", 4, false),
        BulkResult::missing(1003),
    ];

    let summary = reconcile(&mut book, &results, false).expect("reconcile");
    assert_eq!(book.get(1002, "Grade").expect("cell"), "4");
    assert_eq!(summary.eid_mismatches, vec!["jdoe:1002".to_string()]);
    assert_eq!(
        summary.duplicates.get("jdoe"),
        Some(&vec!["Jane Doe".to_string(), "John Roe".to_string()])
    );
    assert_eq!(
        summary.review,
        vec![ReviewItem {
            participant_id: 1003,
            full_name:      "Max Mu".into(),
            username:       "None".into(),
            feedback:       "No .ipynb file was submitted.".into(),
        }]
    );

    let report = summary.to_string();
    assert!(report.contains("maybe look at 1003 Max Mu None"));
    assert!(report.contains("username jdoe used 2 times:"));
    assert!(report.contains("1 user(s) with eid mismatch"));
}

#[test]
fn force_eid_zeroes_mismatches() {
    let dir = TempDir::new().expect("tempdir");
    let mut book = Gradebook::load(&gradebook(&dir, GRADEBOOK)).expect("load");
    let results = vec![graded(1001, "jane", 9, true), graded(1002, "john", 8, false)];

    let summary = reconcile(&mut book, &results, true).expect("reconcile");
    assert_eq!(book.get(1001, "Grade").expect("cell"), "9");
    assert_eq!(book.get(1002, "Grade").expect("cell"), "0");
    assert_eq!(
        book.get(1002, "Feedback comments").expect("cell"),
        INELIGIBLE_FEEDBACK
    );
    assert_eq!(summary.review.len(), 1);
    assert_eq!(summary.review[0].participant_id, 1002);
    assert!(summary.duplicates.is_empty());
}

#[test]
fn force_eid_keeps_unreadable_feedback() {
    let dir = TempDir::new().expect("tempdir");
    let mut book = Gradebook::load(&gradebook(&dir, GRADEBOOK)).expect("load");
    let unreadable =
        GradeRecord::from_notebook_error(&NotebookError::Unreadable("bad utf-8".into()));
    let results = vec![BulkResult::graded(1001, &unreadable, "ex01")];

    let summary = reconcile(&mut book, &results, true).expect("reconcile");
    assert_eq!(book.get(1001, "Grade").expect("cell"), "0");
    assert!(
        book.get(1001, "Feedback comments")
            .expect("cell")
            .ends_with("0: UNREADABLE")
    );
    assert!(summary.eid_mismatches.is_empty());
}

#[test]
fn missing_usernames_are_not_duplicates() {
    let dir = TempDir::new().expect("tempdir");
    let mut book = Gradebook::load(&gradebook(&dir, GRADEBOOK)).expect("load");
    let results = vec![
        BulkResult::missing(1001),
        BulkResult::timed_out(1002),
        graded(1003, "max", 3, true),
    ];
    let summary = reconcile(&mut book, &results, false).expect("reconcile");
    assert!(summary.duplicates.is_empty());
    assert_eq!(summary.review.len(), 2);
}

#[test]
fn same_person_twice_is_not_a_duplicate() {
    let dir = TempDir::new().expect("tempdir");
    let text = format!("{GRADEBOOK}Participant 1004,Jane Doe,jane2@example.org,Submitted,,10.00\n");
    let mut book = Gradebook::load(&gradebook(&dir, &text)).expect("load");
    let results = vec![graded(1001, "jdoe", 9, true), graded(1004, "jdoe", 9, true)];
    let summary = reconcile(&mut book, &results, false).expect("reconcile");
    assert!(summary.duplicates.is_empty());
}

#[test]
fn unknown_participant_leaves_gradebook_untouched() {
    let dir = TempDir::new().expect("tempdir");
    let path = gradebook(&dir, GRADEBOOK);
    let mut book = Gradebook::load(&path).expect("load");
    let results = vec![graded(1001, "jane", 9, true), graded(4242, "ghost", 1, true)];

    let err = reconcile(&mut book, &results, false).expect_err("unknown id");
    assert!(matches!(err, GradeError::Gradebook { .. }), "{err:?}");
    assert!(err.to_string().contains("Participant 4242"));
    assert_eq!(book.get(1001, "Grade").expect("cell"), "");
    assert_eq!(std::fs::read_to_string(&path).expect("read"), GRADEBOOK);
}
