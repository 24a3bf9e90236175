use crate::guard::{Diagnostic, FileReport};
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// `file:line:col: message`, one per line
    Text,
    Json,
}

/// Diagnostics of a whole run, in the order the files were given.
#[derive(Debug, Serialize)]
pub struct GuardSummary<'a> {
    pub diagnostics: Vec<&'a Diagnostic>,
    pub files_analyzed: usize,
    pub files_skipped: usize,
}

impl<'a> GuardSummary<'a> {
    pub fn new(reports: &'a [FileReport]) -> Self {
        let scanned = reports.iter().filter(|report| report.scanned).count();
        Self {
            diagnostics: reports
                .iter()
                .flat_map(|report| &report.diagnostics)
                .collect(),
            files_analyzed: scanned,
            files_skipped: reports.len() - scanned,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

pub trait OutputWriter {
    fn write_summary(&mut self, summary: &GuardSummary<'_>) -> anyhow::Result<()>;
}

pub struct TextWriter<W: Write> {
    writer: W,
}

impl<W: Write> TextWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> OutputWriter for TextWriter<W> {
    fn write_summary(&mut self, summary: &GuardSummary<'_>) -> anyhow::Result<()> {
        for diagnostic in &summary.diagnostics {
            writeln!(self.writer, "{diagnostic}")?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

pub struct JsonWriter<W: Write> {
    writer: W,
}

impl<W: Write> JsonWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> OutputWriter for JsonWriter<W> {
    fn write_summary(&mut self, summary: &GuardSummary<'_>) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(summary)?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()?;
        Ok(())
    }
}

pub fn create_writer(format: OutputFormat) -> Box<dyn OutputWriter> {
    match format {
        OutputFormat::Text => Box::new(TextWriter::new(std::io::stdout())),
        OutputFormat::Json => Box::new(JsonWriter::new(std::io::stdout())),
    }
}
