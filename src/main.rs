use quire::{MergeEngineBuilder, MergeError, MergeRequest};
use std::env;
use std::fs;
use std::process;

const USAGE: &str = "Usage: quire [--title <title>] [--config <file.json>] <fragments-dir> <templates-dir> <template> <output.hml> <question-id>...";

/// A simple CLI to merge question fragments into an exam document.
fn main() -> Result<(), MergeError> {
    env_logger::init();

    let mut title = String::new();
    let mut config_path = None;
    let mut positional = Vec::new();
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--title" => title = args.next().unwrap_or_default(),
            "--config" => config_path = args.next(),
            "-h" | "--help" => {
                println!("{USAGE}");
                return Ok(());
            }
            _ => positional.push(arg),
        }
    }

    let [fragments_dir, templates_dir, template, output_path, questions @ ..] = positional.as_slice()
    else {
        eprintln!("Merges HML question fragments into a template document.");
        eprintln!();
        eprintln!("{USAGE}");
        process::exit(1);
    };
    if questions.is_empty() {
        eprintln!("{USAGE}");
        process::exit(1);
    }

    let mut builder = MergeEngineBuilder::new()
        .with_fragment_dir(fragments_dir)
        .with_template_dir(templates_dir);
    if let Some(path) = config_path {
        builder = builder.with_config_file(path)?;
    }
    let engine = builder.build()?;

    println!("Merging {} questions into {}...", questions.len(), template);
    let request = MergeRequest::new(template.as_str(), questions.iter().map(String::as_str)).with_title(title);
    let output = match engine.merge(&request) {
        Ok(output) => output,
        Err(err) => {
            match (err.stage(), err.question()) {
                (Some(stage), Some(question)) => eprintln!("Merge failed at {stage} (question {question}): {err}"),
                (Some(stage), None) => eprintln!("Merge failed at {stage}: {err}"),
                _ => eprintln!("Merge failed: {err}"),
            }
            process::exit(2);
        }
    };

    fs::write(output_path, &output.bytes)?;
    let report = &output.report;
    for warning in &report.warnings {
        eprintln!("warning: question {}: {}", warning.question, warning.diagnostic);
    }
    for degraded in &report.degraded {
        eprintln!(
            "degraded: question {} (#{}) at {}: {}",
            degraded.question, degraded.number, degraded.stage, degraded.reason
        );
    }
    if report.is_degraded() {
        println!(
            "Generated {} with {} of {} questions replaced by placeholders",
            output_path,
            report.degraded.len(),
            report.questions
        );
    } else {
        println!("Successfully generated {}", output_path);
    }
    Ok(())
}
