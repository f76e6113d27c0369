//! TDV CLI - Command line interface
//!
//! Project-based execution - all configuration from pipeline.json

use clap::Parser;
use std::path::PathBuf;
use std::process;

mod config;
mod logging;
mod project;

use crate::config::LogConfig;
use crate::logging::LogFormat;
use crate::project::Project;
use tdv_api::{get_config, init_config, Pipeline, Service, Target, Value};
use tracing::{debug, info};

const TARGET: &str = Target::Cli.target();

#[derive(Parser)]
#[command(
    name = "tdv",
    about = "Run a pipeline of processing blocks over a JSON document",
    version = "0.1.0"
)]
struct Cli {
    /// Pipeline file path (default: ./pipeline.json)
    #[arg(value_name = "PIPELINE_JSON", default_value = "pipeline.json")]
    pipeline: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    let project = match Project::load(&cli.pipeline) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = init_logging(&project) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    if let Err(e) = run(&project) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_logging(project: &Project) -> Result<(), String> {
    let file = &project.file;
    let log_config = LogConfig::from_project(file.log_level.as_deref(), &file.log)?;
    let format = match &file.log_format {
        Some(s) => LogFormat::parse(s)?,
        None => LogFormat::Compact,
    };
    let log_file = file.log_file.as_deref().map(|p| project.resolve(p));
    logging::init_with_file(&log_config, format, log_file)
}

fn run(project: &Project) -> Result<(), String> {
    // Initialize API config (global singleton for convenience)
    init_config(project.tdv_config()).map_err(|e| e.to_report().to_string())?;
    let service = Service::in_memory(get_config());

    let mut pipeline = Pipeline::new();
    for unit in project.unit_configs()? {
        let block = service
            .create_processing_block(unit)
            .map_err(|e| e.to_report().to_string())?;
        debug!(target: TARGET, unit_type = block.unit_type(), "stage added");
        pipeline.push(block);
    }

    let mut document = project.read_input()?;
    let added = pipeline
        .run_map(&mut document)
        .map_err(|e| e.to_report().to_string())?;
    info!(target: TARGET, stages = pipeline.len(), added, "pipeline done");

    let text = serde_json::to_string_pretty(&Value::Object(document).to_json())
        .map_err(|e| format!("无法序列化结果: {}", e))?;
    match &project.file.output {
        Some(output) => {
            let path = project.resolve(output);
            std::fs::write(&path, text + "\n")
                .map_err(|e| format!("无法写入 '{}': {}", path.display(), e))?;
        }
        None => println!("{}", text),
    }
    Ok(())
}
