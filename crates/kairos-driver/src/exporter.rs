//! Export simulation results to various formats

use crate::error::{Result, SimulationError};
use kairos_core::Duration;
use kairos_engine::{ProfileSegment, SimulationResults};
use std::io::Write;

/// Export format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// RON format (Rust Object Notation)
    Ron,
    /// JSON format (requires serde_json feature)
    Json,
    /// CSV format (profiles only)
    Csv,
    /// Human-readable text format
    Text,
}

/// Exporter for simulation results
pub struct Exporter<'a> {
    results: &'a SimulationResults,
}

impl<'a> Exporter<'a> {
    pub fn new(results: &'a SimulationResults) -> Self {
        Self { results }
    }

    /// Export to a string in the specified format
    pub fn export(&self, format: ExportFormat) -> Result<String> {
        match format {
            ExportFormat::Ron => self.to_ron(),
            ExportFormat::Json => self.to_json(),
            ExportFormat::Csv => Ok(self.to_csv()),
            ExportFormat::Text => Ok(self.to_text()),
        }
    }

    /// Export to a writer
    pub fn export_to<W: Write>(&self, writer: &mut W, format: ExportFormat) -> Result<()> {
        let content = self.export(format)?;
        writer
            .write_all(content.as_bytes())
            .map_err(|e| SimulationError::Export(e.to_string()))?;
        Ok(())
    }

    pub fn to_ron(&self) -> Result<String> {
        ron::ser::to_string_pretty(self.results, ron::ser::PrettyConfig::default())
            .map_err(|e| SimulationError::Serialization(e.to_string()))
    }

    #[cfg(feature = "serde_json")]
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self.results)
            .map_err(|e| SimulationError::Serialization(e.to_string()))
    }

    #[cfg(not(feature = "serde_json"))]
    pub fn to_json(&self) -> Result<String> {
        Err(SimulationError::Export(
            "JSON export requires the 'serde_json' feature".to_string(),
        ))
    }

    /// One row per profile segment, with its start relative to the
    /// simulation start
    pub fn to_csv(&self) -> String {
        let mut output = String::new();
        output.push_str("resource,kind,start,extent,dynamics\n");

        let profiles = self
            .results
            .real_profiles
            .iter()
            .map(|profile| ("real", profile))
            .chain(
                self.results
                    .discrete_profiles
                    .iter()
                    .map(|profile| ("discrete", profile)),
            );
        for (kind, (name, segments)) in profiles {
            let mut start = Duration::ZERO;
            for segment in segments {
                output.push_str(&format!(
                    "{},{},{},{},{}\n",
                    quoted(name),
                    kind,
                    start,
                    segment.extent,
                    quoted(&segment.dynamics.to_string())
                ));
                start = start + segment.extent;
            }
        }
        output
    }

    pub fn to_text(&self) -> String {
        let results = self.results;
        let mut output = String::new();

        output.push_str("=== Simulation Results ===\n\n");
        output.push_str(&format!("Start: {}\n", results.start_time.to_rfc3339()));
        output.push_str(&format!("Duration: {}\n", results.duration));
        output.push_str(&format!(
            "Activities: {} finished, {} unfinished\n",
            results.simulated_activities.len(),
            results.unfinished_activities.len()
        ));
        let event_count: usize = results.events.iter().map(|(_, graph)| graph.len()).sum();
        output.push_str(&format!(
            "Events: {} in {} commits on {} topics\n",
            event_count,
            results.events.len(),
            results.topics.len()
        ));

        output.push_str("\n=== Activities ===\n\n");
        for (id, activity) in &results.simulated_activities {
            output.push_str(&format!(
                "{} {} at {} for {}",
                id,
                activity.activity_type,
                activity.start.to_rfc3339(),
                activity.duration
            ));
            if let Some(parent) = activity.parent {
                output.push_str(&format!(" (child of {})", parent));
            }
            output.push('\n');
        }
        for (id, activity) in &results.unfinished_activities {
            output.push_str(&format!(
                "{} {} at {} (unfinished)\n",
                id,
                activity.activity_type,
                activity.start.to_rfc3339()
            ));
        }

        output.push_str("\n=== Profiles ===\n");
        for (name, segments) in results
            .real_profiles
            .iter()
            .chain(results.discrete_profiles.iter())
        {
            output.push_str(&format!("\n--- {} ---\n", name));
            write_segments(&mut output, segments);
        }

        output
    }
}

/// Quote a CSV field, doubling embedded quotes
fn quoted(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn write_segments(output: &mut String, segments: &[ProfileSegment]) {
    let mut start = Duration::ZERO;
    for segment in segments {
        output.push_str(&format!("  {} +{}: {}\n", start, segment.extent, segment.dynamics));
        start = start + segment.extent;
    }
}
