//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::diagnostics::{Diagnostic, Diagnostics, Severity};
use crate::graph::UiGraph;
use crate::hooks::HookCounts;
use crate::state::State;

use super::commands::{GraphFormat, OutputFormat};

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Resource row for table display.
#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Provider")]
    provider: String,
    #[tabled(rename = "ID")]
    id: String,
}

/// JSON shape of an apply result.
#[derive(Serialize)]
struct ApplyJson<'a> {
    success: bool,
    counts: HookCounts,
    diagnostics: &'a Diagnostics,
    #[serde(skip_serializing_if = "Option::is_none")]
    outputs: Option<BTreeMap<&'a str, &'a serde_json::Value>>,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the result of an apply.
    #[must_use]
    pub fn format_apply(&self, state: Option<&State>, diags: &Diagnostics, counts: HookCounts) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = ApplyJson {
                    success: state.is_some() && !diags.has_errors(),
                    counts,
                    diagnostics: diags,
                    outputs: state.map(|s| {
                        s.outputs
                            .iter()
                            .filter(|(_, o)| !o.sensitive)
                            .map(|(name, o)| (name.as_str(), &o.value))
                            .collect()
                    }),
                };
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_apply_text(state, diags, counts),
        }
    }

    /// Formats an apply result as text.
    fn format_apply_text(state: Option<&State>, diags: &Diagnostics, counts: HookCounts) -> String {
        let mut output = Self::format_diagnostics(diags);

        let Some(state) = state else {
            let _ = writeln!(output, "\n{} Apply did not run.", "✗".red());
            return output;
        };

        let rows: Vec<ResourceRow> = state
            .resources
            .iter()
            .flat_map(|(resource, rs)| {
                rs.instances.iter().map(move |(key, object)| ResourceRow {
                    address: resource.instance(key.clone()).to_string(),
                    provider: rs.provider.to_string(),
                    id: object
                        .value
                        .get("id")
                        .and_then(serde_json::Value::as_str)
                        .map_or_else(|| String::from("-"), |id| Self::truncate(id, 24)),
                })
            })
            .collect();

        if !rows.is_empty() {
            output.push('\n');
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        let status = if diags.has_errors() {
            format!("{} Apply finished with errors", "✗".red())
        } else {
            format!("{} Apply complete", "✓".green())
        };
        let _ = writeln!(
            output,
            "\n{status}! Resources: {} added, {} changed, {} destroyed.",
            counts.added.to_string().green(),
            counts.changed.to_string().yellow(),
            counts.removed.to_string().red()
        );
        if counts.imported > 0 || counts.forgotten > 0 {
            let _ = writeln!(
                output,
                "   {} imported, {} forgotten.",
                counts.imported, counts.forgotten
            );
        }

        if !state.outputs.is_empty() {
            output.push_str("\nOutputs:\n");
            for (name, value) in &state.outputs {
                let shown = if value.sensitive {
                    String::from("(sensitive)")
                } else {
                    value.value.to_string()
                };
                let _ = writeln!(output, "   {name} = {shown}");
            }
        }

        output
    }

    /// Formats diagnostics, one block per entry.
    #[must_use]
    pub fn format_diagnostics(diags: &Diagnostics) -> String {
        let mut output = String::new();
        for diag in diags {
            Self::write_diagnostic(&mut output, diag);
        }
        output
    }

    fn write_diagnostic(output: &mut String, diag: &Diagnostic) {
        let label = match diag.severity {
            Severity::Error => "Error:".red().bold(),
            Severity::Warning => "Warning:".yellow().bold(),
        };
        let _ = writeln!(output, "\n{label} {}", diag.summary);
        if let Some(address) = &diag.address {
            let _ = writeln!(output, "   with {}", address.cyan());
        }
        if !diag.detail.is_empty() {
            let _ = writeln!(output, "   {}", diag.detail);
        }
    }

    /// Formats an apply graph.
    #[must_use]
    pub fn format_graph(&self, graph: &UiGraph, format: GraphFormat) -> String {
        match format {
            GraphFormat::Dot => graph.to_dot(),
            GraphFormat::Json => serde_json::to_string_pretty(graph).unwrap_or_default(),
        }
    }

    /// Formats diagnostics for a command that produced nothing else.
    #[must_use]
    pub fn format_failure(&self, diags: &Diagnostics) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(diags).unwrap_or_default(),
            OutputFormat::Text => Self::format_diagnostics(diags),
        }
    }

    /// Truncates a string to a maximum length.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}
