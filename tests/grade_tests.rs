//! Tests for grading a single submission.

mod support;

use std::collections::BTreeMap;

use nbgrade::{
    error::{GradeError, NotebookError},
    grade::{Alternatives, GradeRecord, evaluate, grade_file},
    literal::Value,
    reference::Reference,
};
use serde_json::Value as JsonValue;
use support::{ScriptedExecutor, code, notebook, problem, sample_solution, solving_executor};
use tempfile::TempDir;

async fn reference(exec: &ScriptedExecutor) -> Reference {
    let dir = TempDir::new().expect("tempdir");
    Reference::build(&support::parse(&sample_solution()), exec, dir.path())
        .await
        .expect("reference")
}

fn student(cells: Vec<JsonValue>) -> JsonValue {
    let mut all = vec![code("import math")];
    all.extend(cells);
    notebook(all, "jdoe", "ex01")
}

async fn grade(
    doc: &JsonValue,
    exec: &ScriptedExecutor,
    alternatives: &Alternatives,
) -> Result<GradeRecord, GradeError> {
    let reference = reference(exec).await;
    let dir = TempDir::new().expect("tempdir");
    evaluate(
        support::parse(doc),
        &reference.problems,
        alternatives,
        exec,
        dir.path(),
    )
    .await
}

#[tokio::test]
async fn correct_submission_gets_full_points() {
    let doc = student(vec![
        problem(1, 5, "4"),
        problem(2, 3, "round(math.pi, 5)"),
        problem(3, 2, "def double(x):\n    return x + x"),
    ]);
    let record = grade(&doc, &solving_executor(), &Alternatives::new())
        .await
        .expect("graded");

    assert_eq!(record.points, BTreeMap::from([(1, 5), (2, 3), (3, 2)]));
    assert!(record.diagnostics.is_empty());
    assert_eq!(record.total(), 10);
    assert_eq!(record.username, "jdoe");
    assert_eq!(record.eid, "ex01");
    assert_eq!(record.feedback(), "{1: 5, 2: 3, 3: 2}");
}

#[tokio::test]
async fn custom_test_is_appended_to_the_student_unit() {
    let doc = student(vec![
        problem(1, 5, "4"),
        problem(2, 3, "round(math.pi, 5)"),
        problem(3, 2, "def double(x):\n    return x + x"),
    ]);
    let exec = solving_executor();
    grade(&doc, &exec, &Alternatives::new()).await.expect("graded");

    let sources = exec.sources();
    let student_run = sources.last().expect("student run");
    assert_eq!(
        student_run[3],
        "def double(x):\n    return x + x\n[double(i) for i in range(3)]"
    );
    assert_eq!(student_run[1], "4");
}

#[tokio::test]
async fn wrong_answers_and_errors_get_diagnostics() {
    let doc = student(vec![
        problem(1, 5, "5"),
        problem(2, 3, "1 / 0"),
        problem(3, 2, "def double(x):\n    return x"),
    ]);
    let exec = solving_executor()
        .result("5", "5")
        .error("1 / 0", "ZeroDivisionError", "division by zero");
    let record = grade(&doc, &exec, &Alternatives::new()).await.expect("graded");

    assert_eq!(record.points, BTreeMap::from([(1, 0), (2, 0), (3, 2)]));
    assert_eq!(record.diagnostics[&1], "4 / 5");
    assert_eq!(record.diagnostics[&2], "ZeroDivisionError: division by zero");
    assert!(!record.diagnostics.contains_key(&3));
    insta::assert_snapshot!(
        record.feedback(),
        @"{1: 0, 2: 0, 3: 2}<br>problem_no: expected / yours<br>1: 4 / 5<br>2: ZeroDivisionError: division by zero"
    );
}

#[tokio::test]
async fn missing_result_is_reported_as_none() {
    let doc = student(vec![
        problem(1, 5, "x = 4"),
        problem(2, 3, "round(math.pi, 5)"),
        problem(3, 2, "def double(x):\n    return x + x"),
    ]);
    let record = grade(&doc, &solving_executor(), &Alternatives::new())
        .await
        .expect("graded");
    assert_eq!(record.points[&1], 0);
    assert_eq!(record.diagnostics[&1], "4 / None");
}

#[tokio::test]
async fn several_representations_score_zero_for_that_problem() {
    let doc = student(vec![
        problem(1, 5, "df"),
        problem(2, 3, "round(math.pi, 5)"),
        problem(3, 2, "def double(x):\n    return x + x"),
    ]);
    let exec = solving_executor().rich("df", "'df'", "<table/>");
    let record = grade(&doc, &exec, &Alternatives::new()).await.expect("graded");

    assert_eq!(record.points, BTreeMap::from([(1, 0), (2, 3), (3, 2)]));
    assert_eq!(
        record.diagnostics[&1],
        "ambiguous output: execute_result with 2 representations"
    );
    assert_eq!(record.diagnostics.len(), 1);
}

#[tokio::test]
async fn float_answer_matches_integer_reference() {
    let doc = student(vec![
        problem(1, 5, "4.0"),
        problem(2, 3, "3.14"),
        problem(3, 2, "def double(x):\n    return x + x"),
    ]);
    let exec = solving_executor().result("4.0", "4.0").result("3.14", "3.14");
    let record = grade(&doc, &exec, &Alternatives::new()).await.expect("graded");
    assert_eq!(record.total(), 10);
}

#[tokio::test]
async fn custom_test_results_are_not_rounded() {
    let doc = notebook(
        vec![code("# problem(1)\nf = abs\n# PROBLEM-TEST\nf(-1.234)")],
        "DUMMYUSER",
        "ex",
    );
    let exec = ScriptedExecutor::new().result("f(-1.234)", "1.234");
    let dir = TempDir::new().expect("tempdir");
    let reference = Reference::build(&support::parse(&doc), &exec, dir.path())
        .await
        .expect("reference");

    let attempt = notebook(vec![problem(1, 1, "f = round1")], "jdoe", "ex");
    let exec = exec.result("f(-1.234)", "1.23");
    let record = evaluate(
        support::parse(&attempt),
        &reference.problems,
        &Alternatives::new(),
        &exec,
        dir.path(),
    )
    .await
    .expect("graded");
    assert_eq!(record.points[&1], 0);
    assert_eq!(record.diagnostics[&1], "1.234 / 1.23");
}

#[tokio::test]
async fn alternatives_extend_the_accepted_set() {
    let doc = student(vec![
        problem(1, 5, "'four'"),
        problem(2, 3, "round(math.pi, 5)"),
        problem(3, 2, "def double(x):\n    return x + x"),
    ]);
    let exec = solving_executor().result("'four'", "'four'");

    let record = grade(&doc, &exec, &Alternatives::new()).await.expect("graded");
    assert_eq!(record.points[&1], 0);

    let alternatives = Alternatives::from_json(r#"{"1": ["'four'", "4.5"]}"#).expect("json");
    let record = grade(&doc, &exec, &alternatives).await.expect("graded");
    assert_eq!(record.points[&1], 5);

    let mut alternatives = Alternatives::new();
    alternatives.insert(1, Value::Str("four".into()));
    let record = grade(&doc, &exec, &alternatives).await.expect("graded");
    assert_eq!(record.points[&1], 5);
}

#[tokio::test]
async fn problem_count_mismatch_is_an_integrity_error() {
    let doc = student(vec![problem(1, 5, "4"), problem(2, 3, "round(math.pi, 5)")]);
    let err = grade(&doc, &solving_executor(), &Alternatives::new())
        .await
        .expect_err("must fail");
    assert!(matches!(err, GradeError::Integrity(_)), "{err:?}");

    let doc = student(vec![
        problem(1, 5, "4"),
        problem(2, 3, "round(math.pi, 5)"),
        problem(3, 2, "def double(x):\n    return x + x"),
        problem(4, 1, "extra"),
    ]);
    let err = grade(&doc, &solving_executor(), &Alternatives::new())
        .await
        .expect_err("must fail");
    assert!(matches!(err, GradeError::Integrity(_)), "{err:?}");
}

#[tokio::test]
async fn unknown_or_duplicate_problem_number_is_an_integrity_error() {
    let doc = student(vec![
        problem(1, 5, "4"),
        problem(2, 3, "round(math.pi, 5)"),
        problem(7, 2, "def double(x):\n    return x + x"),
    ]);
    let err = grade(&doc, &solving_executor(), &Alternatives::new())
        .await
        .expect_err("must fail");
    assert!(err.to_string().contains("problem number 7"), "{err}");

    let doc = student(vec![
        problem(1, 5, "4"),
        problem(1, 5, "4"),
        problem(3, 2, "def double(x):\n    return x + x"),
    ]);
    let err = grade(&doc, &solving_executor(), &Alternatives::new())
        .await
        .expect_err("must fail");
    assert!(matches!(err, GradeError::Integrity(_)), "{err:?}");
}

#[tokio::test]
async fn unreadable_and_invalid_files_grade_as_zero() {
    let exec = solving_executor();
    let reference = reference(&exec).await;
    let dir = TempDir::new().expect("tempdir");

    let binary = dir.path().join("binary.ipynb");
    std::fs::write(&binary, [0xff, 0xfe, 0x00]).expect("write");
    let record = grade_file(
        &binary,
        &reference.problems,
        &Alternatives::new(),
        &exec,
        dir.path(),
    )
    .await
    .expect("graded");
    assert_eq!(record.feedback(), "{}<br>problem_no: expected / yours<br>0: UNREADABLE");
    assert_eq!(record.username, "unknown-user");
    assert_eq!(record.total(), 0);

    let invalid = dir.path().join("invalid.ipynb");
    std::fs::write(&invalid, r#"{"cells": []}"#).expect("write");
    let record = grade_file(
        &invalid,
        &reference.problems,
        &Alternatives::new(),
        &exec,
        dir.path(),
    )
    .await
    .expect("graded");
    assert_eq!(
        record,
        GradeRecord::from_notebook_error(&NotebookError::Invalid(String::new()))
    );
    assert_eq!(record.diagnostics[&0], "NOT A VALID NOTEBOOK FILE");
}

#[tokio::test]
async fn result_table_lists_every_problem() {
    let doc = student(vec![
        problem(1, 5, "5"),
        problem(2, 3, "round(math.pi, 5)"),
        problem(3, 2, "def double(x):\n    return x + x"),
    ]);
    let exec = solving_executor().result("5", "5");
    let reference = reference(&exec).await;
    let dir = TempDir::new().expect("tempdir");
    let record = evaluate(
        support::parse(&doc),
        &reference.problems,
        &Alternatives::new(),
        &exec,
        dir.path(),
    )
    .await
    .expect("graded");

    let table = record.render(&reference.problems);
    assert!(table.contains("Grading Overview (jdoe)"));
    assert!(table.contains("0/5"));
    assert!(table.contains("3/3"));
    assert!(table.contains("Total: 5/10"));
}
