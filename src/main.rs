#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # nbgrade
//! ## Introduction
//!
//! Grades Jupyter notebooks against a sample solution.
//!
//! Bulk grading executes untrusted student code. Run it inside a
//! singularity/apptainer/docker container with networking disabled; the
//! command refuses to start anywhere else.

use std::path::PathBuf;

use anyhow::Result;
use bpaf::*;
use dotenvy::dotenv;
use nbgrade::{
    bulk::{BulkOptions, Containment},
    config,
    executor::JupyterExecutor,
    grade::Alternatives,
    grade_bulk, grade_single, show_reference,
    watchdog::Watchdog,
};
use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// What to grade.
#[derive(Debug, Clone)]
enum Input {
    /// A single notebook.
    Notebook(PathBuf),
    /// An archive of submissions plus the gradebook to update.
    Bulk {
        /// Zip file or directory of submission folders.
        zipfile:     PathBuf,
        /// Gradebook CSV, overwritten in place.
        grading_csv: PathBuf,
    },
}

/// Options of the `grade` command.
#[derive(Debug, Clone)]
struct GradeArgs {
    /// Sample solution notebook.
    sample_solution: PathBuf,
    /// Notebook or archive to grade.
    input:           Input,
    /// Folder name fragments to skip.
    skip:            Vec<String>,
    /// Zero out submissions with a foreign eid.
    force_eid:       bool,
    /// Start grading after this folder and keep the gradebook untouched.
    debug_after:     Option<String>,
    /// JSON file with extra accepted answers.
    alternatives:    Option<PathBuf>,
}

/// Top-level CLI commands.
#[derive(Debug, Clone)]
enum Cmd {
    /// Grade a notebook or an archive
    Grade(GradeArgs),
    /// Print the problem table of a sample solution
    Reference {
        /// Sample solution notebook.
        sample_solution: PathBuf,
        /// Print JSON instead of a table.
        json:            bool,
    },
}

/// Parse the command line arguments and return a `Cmd` enum
fn options() -> Cmd {
    /// parses the sample solution path
    fn sample() -> impl Parser<PathBuf> {
        long("sample-solution")
            .help(".ipynb file with the sample solution")
            .argument::<PathBuf>("IPYNB")
    }

    let notebook = long("notebook")
        .help(".ipynb file with the notebook to be graded")
        .argument::<PathBuf>("IPYNB")
        .map(Input::Notebook);

    let zipfile = long("zipfile")
        .help("zip file or directory with student solutions as downloaded from the course platform")
        .argument::<PathBuf>("ZIP");
    let grading_csv = long("grading-csv")
        .help("Gradebook CSV as downloaded from the course platform. The file will be overwritten!")
        .argument::<PathBuf>("CSV");
    let bulk = construct!(Input::Bulk {
        zipfile,
        grading_csv
    });

    let input = construct!([notebook, bulk]);

    let skip = long("skip")
        .help("names of users to skip (may be repeated, whitespace separated)")
        .argument::<String>("NAME")
        .many()
        .map(|names| {
            names
                .iter()
                .flat_map(|name| name.split_whitespace())
                .map(str::to_string)
                .collect::<Vec<_>>()
        });
    let force_eid = long("force-eid")
        .help("set grade to 0 if the exercise ID does not match the sample solution")
        .switch();
    let debug_after = long("debug-after")
        .help("start grading after this user and do not store grades")
        .argument::<String>("NAME")
        .optional();
    let alternatives = long("alternatives")
        .help("JSON file mapping problem numbers to extra accepted answers")
        .argument::<PathBuf>("JSON")
        .optional();

    let sample_solution = sample();
    let grade = construct!(GradeArgs {
        sample_solution,
        input,
        skip,
        force_eid,
        debug_after,
        alternatives
    })
    .to_options()
    .command("grade")
    .help("Grade a notebook or an archive of notebooks")
    .map(Cmd::Grade);

    let sample_solution = sample();
    let json = long("json").help("print the table as JSON").switch();
    let reference = construct!(Cmd::Reference {
        sample_solution,
        json
    })
    .to_options()
    .command("reference")
    .help("Execute the sample solution and print its problems");

    let cmd = construct!([grade, reference]);

    cmd.to_options()
        .descr("Grade Jupyter notebooks against a sample solution")
        .run()
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let fmt = fmt::layer()
        .without_time()
        .with_file(false)
        .with_line_number(false);
    let filter_layer = LevelFilter::from_level(Level::INFO);
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    let cmd = options();

    match cmd {
        Cmd::Grade(args) => {
            let alternatives = match &args.alternatives {
                Some(path) => Alternatives::load(path)?,
                None => Alternatives::new(),
            };

            match args.input {
                Input::Notebook(notebook) => {
                    let executor = JupyterExecutor::from_config()?;
                    grade_single(
                        &args.sample_solution,
                        &notebook,
                        &alternatives,
                        Watchdog::new(config::watchdog()),
                        &executor,
                    )
                    .await?;
                }
                Input::Bulk {
                    zipfile,
                    grading_csv,
                } => {
                    let containment = Containment::detect()?;
                    let executor = JupyterExecutor::from_config()?;
                    let options = BulkOptions::builder()
                        .skip_names(args.skip)
                        .maybe_debug_after(args.debug_after)
                        .timeout(config::watchdog())
                        .alternatives(alternatives)
                        .build();
                    grade_bulk(
                        &containment,
                        &args.sample_solution,
                        &zipfile,
                        &grading_csv,
                        &options,
                        args.force_eid,
                        &executor,
                    )
                    .await?;
                }
            }
        }
        Cmd::Reference {
            sample_solution,
            json,
        } => {
            let executor = JupyterExecutor::from_config()?;
            show_reference(&sample_solution, json, &executor).await?;
        }
    };

    Ok(())
}
