//! Shared helpers: notebook builders and an in-memory executor.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use nbgrade::{
    bulk::Containment,
    error::GradeError,
    executor::Executor,
    notebook::{CellType, ErrorOutput, Notebook, Output},
};
use serde_json::{Map, Value as JsonValue, json};

/// What a scripted cell produces when executed.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// An `execute_result` with this `text/plain` body.
    Result(String),
    /// An `execute_result` with a `text/plain` and a `text/html` body.
    Rich(String, String),
    /// An `error` output.
    Error(String, String),
    /// No output at all.
    Nothing,
    /// Never finishes.
    Hang,
    /// The adapter itself fails.
    Fail(String),
}

/// Executor that answers from a script keyed by the last code line of a cell.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    script:   HashMap<String, Outcome>,
    workdirs: Mutex<Vec<PathBuf>>,
    sources:  Mutex<Vec<Vec<String>>>,
}

/// Last line of a cell that is neither blank nor a comment.
fn key_line(source: &str) -> String {
    source
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .last()
        .unwrap_or_default()
        .to_string()
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cells ending in `line` produce `text` as their result.
    pub fn result(mut self, line: &str, text: &str) -> Self {
        self.script
            .insert(line.to_string(), Outcome::Result(text.to_string()));
        self
    }

    /// Cells ending in `line` produce a result with two representations,
    /// like a data frame does.
    pub fn rich(mut self, line: &str, text: &str, html: &str) -> Self {
        self.script.insert(
            line.to_string(),
            Outcome::Rich(text.to_string(), html.to_string()),
        );
        self
    }

    /// Cells ending in `line` raise `ename: evalue`.
    pub fn error(mut self, line: &str, ename: &str, evalue: &str) -> Self {
        self.script.insert(
            line.to_string(),
            Outcome::Error(ename.to_string(), evalue.to_string()),
        );
        self
    }

    /// Cells ending in `line` run forever.
    pub fn hang(mut self, line: &str) -> Self {
        self.script.insert(line.to_string(), Outcome::Hang);
        self
    }

    /// Notebooks containing a cell ending in `line` cannot be executed.
    pub fn fail(mut self, line: &str, reason: &str) -> Self {
        self.script
            .insert(line.to_string(), Outcome::Fail(reason.to_string()));
        self
    }

    /// Working directories handed to `execute`, in call order.
    pub fn workdirs(&self) -> Vec<PathBuf> {
        self.workdirs.lock().expect("lock").clone()
    }

    /// Code cell sources seen by each `execute` call.
    pub fn sources(&self) -> Vec<Vec<String>> {
        self.sources.lock().expect("lock").clone()
    }
}

impl Executor for ScriptedExecutor {
    async fn execute(&self, notebook: &Notebook, workdir: &Path) -> Result<Notebook, GradeError> {
        assert!(workdir.is_dir(), "workdir must exist during execution");
        self.workdirs
            .lock()
            .expect("lock")
            .push(workdir.to_path_buf());

        let mut executed = notebook.clone();
        self.sources.lock().expect("lock").push(
            executed
                .code_cells()
                .map(|(_, cell)| cell.source.clone())
                .collect(),
        );

        for (count, cell) in executed
            .cells
            .iter_mut()
            .filter(|cell| cell.cell_type == CellType::Code)
            .enumerate()
        {
            let outcome = self
                .script
                .get(&key_line(&cell.source))
                .cloned()
                .unwrap_or(Outcome::Nothing);
            let outputs = match outcome {
                Outcome::Result(text) => {
                    let mut data = Map::new();
                    data.insert("text/plain".into(), JsonValue::from(text));
                    vec![Output::ExecuteResult {
                        data,
                        metadata: Map::new(),
                        execution_count: Some(count as u32 + 1),
                    }]
                }
                Outcome::Rich(text, html) => {
                    let mut data = Map::new();
                    data.insert("text/plain".into(), JsonValue::from(text));
                    data.insert("text/html".into(), JsonValue::from(html));
                    vec![Output::ExecuteResult {
                        data,
                        metadata: Map::new(),
                        execution_count: Some(count as u32 + 1),
                    }]
                }
                Outcome::Error(ename, evalue) => vec![Output::Error(ErrorOutput {
                    ename,
                    evalue,
                    traceback: Vec::new(),
                })],
                Outcome::Nothing => Vec::new(),
                Outcome::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Vec::new()
                }
                Outcome::Fail(reason) => return Err(GradeError::Execution(reason)),
            };
            cell.outputs = Some(outputs);
        }
        Ok(executed)
    }
}

/// A code cell without outputs.
pub fn code(source: &str) -> JsonValue {
    json!({
        "cell_type": "code",
        "execution_count": null,
        "metadata": {},
        "outputs": [],
        "source": source,
    })
}

/// A markdown cell.
pub fn markdown(source: &str) -> JsonValue {
    json!({
        "cell_type": "markdown",
        "metadata": {},
        "source": source,
    })
}

/// A code cell tagged as problem `number`, as distributed to students.
pub fn problem(number: u32, points: u32, source: &str) -> JsonValue {
    json!({
        "cell_type": "code",
        "execution_count": null,
        "metadata": {
            "deletable": false,
            "tags": ["problem"],
            "problem_number": number,
            "points": points,
        },
        "outputs": [],
        "source": source,
    })
}

/// A version 4 notebook document.
pub fn notebook(cells: Vec<JsonValue>, user: &str, eid: &str) -> JsonValue {
    json!({
        "cells": cells,
        "metadata": {
            "kernelspec": {"name": "python3", "display_name": "Python 3", "language": "python"},
            "user": user,
            "eid": eid,
        },
        "nbformat": 4,
        "nbformat_minor": 5,
    })
}

/// Parses a notebook built with the helpers above.
pub fn parse(doc: &JsonValue) -> Notebook {
    Notebook::from_bytes(doc.to_string().as_bytes()).expect("valid notebook")
}

/// Writes `doc` to `dir/name`.
pub fn write(dir: &Path, name: &str, doc: &JsonValue) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent");
    }
    std::fs::write(&path, doc.to_string()).expect("write notebook");
    path
}

/// Sample solution with three problems: a plain value, a float, and a
/// custom test.
pub fn sample_solution() -> JsonValue {
    notebook(
        vec![
            markdown("# Exercise sheet 1"),
            code("import math"),
            code("# problem(5)\n2 + 2"),
            code("# Problem (3)\nmath.pi"),
            code(
                "# problem(2)\ndef double(x):\n    return 2 * x\n# PROBLEM-TEST\n[double(i) for i in range(3)]",
            ),
        ],
        "DUMMYUSER",
        "ex01",
    )
}

/// Executor that plays the sample solution and answers like a student who
/// solved everything.
pub fn solving_executor() -> ScriptedExecutor {
    ScriptedExecutor::new()
        .result("2 + 2", "4")
        .result("math.pi", "3.141592653589793")
        .result("[double(i) for i in range(3)]", "[0, 2, 4]")
        .result("4", "4")
        .result("round(math.pi, 5)", "3.14159")
}

/// Containment proof for tests.
pub fn contained() -> Containment {
    Containment::detect_with(|key| (key == "APPTAINER_CONTAINER").then(|| "/img.sif".to_string()))
        .expect("marker present")
}
