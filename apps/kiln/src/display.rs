//! Final result rendering

use crate::error::CliError;
use comfy_table::{presets::UTF8_BORDERS_ONLY, Table};
use console::style;
use kiln_types::RunReport;

/// Renders final run reports as human-readable output or JSON
pub struct OutputRenderer {
    json: bool,
}

impl OutputRenderer {
    /// Create new output renderer
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    /// Render a single run report
    pub fn render_report(&self, report: &RunReport) -> Result<(), CliError> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(report)?);
            return Ok(());
        }

        if !report.phases.is_empty() {
            let mut table = Table::new();
            table.load_preset(UTF8_BORDERS_ONLY);
            table.set_header(vec!["phase", "exit", "duration"]);
            for phase in &report.phases {
                table.add_row(vec![
                    phase.phase.to_string(),
                    phase.exit_code.to_string(),
                    format!("{:.2?}", phase.duration),
                ]);
            }
            println!("{table}");
        }

        if let Some(artifact) = &report.artifact {
            println!("source: {} ({} bytes, {})", artifact.url, artifact.size, artifact.digest);
        }

        match &report.failure {
            None => {
                println!(
                    "{} {} {} ({}, {:.2?})",
                    style("ok").green().bold(),
                    report.name,
                    report.version,
                    report.state,
                    report.duration
                );
            }
            Some(failure) => {
                println!(
                    "{} {} {}: {}",
                    style("failed").red().bold(),
                    report.name,
                    report.version,
                    failure.message
                );
                if let Some(hint) = &failure.hint {
                    println!("  Hint: {hint}");
                }
                if let Some(path) = &report.retained_build_root {
                    println!("  Build directory kept at {}", path.display());
                }
            }
        }

        Ok(())
    }
}
