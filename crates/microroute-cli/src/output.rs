//! Rendering of command results for stdout.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

use microroute_lib::{ConnectivityReport, Diagnostics, RouteResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Pretty-printed JSON.
    #[default]
    Json,
    /// Short human-readable summary.
    Text,
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{json}");
    Ok(())
}

pub fn print_route(result: &RouteResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(result),
        OutputFormat::Text => {
            print!("{}", render_route(result));
            Ok(())
        }
    }
}

pub fn print_reports(reports: &[ConnectivityReport], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json if reports.len() == 1 => print_json(&reports[0]),
        OutputFormat::Json => print_json(reports),
        OutputFormat::Text => {
            for report in reports {
                print!("{}", render_report(report));
            }
            Ok(())
        }
    }
}

pub fn print_diagnostics(diagnostics: &Diagnostics, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(diagnostics),
        OutputFormat::Text => {
            print!("{}", render_diagnostics(diagnostics));
            Ok(())
        }
    }
}

fn render_route(result: &RouteResult) -> String {
    let mut out = String::new();
    if !result.success {
        out.push_str(&format!(
            "Routing failed: {}\n",
            result.message.as_deref().unwrap_or("unknown error")
        ));
        return out;
    }
    out.push_str(&format!(
        "Route via {} (confidence {:.2}{})\n",
        result.provenance,
        result.confidence,
        if result.cached { ", cached" } else { "" }
    ));
    out.push_str(&format!(
        "{:.0} m, about {:.0} s\n",
        result.distance_m, result.duration_s
    ));
    if let Some(reason) = &result.fallback_reason {
        out.push_str(&format!("Fallback: {reason}\n"));
    }
    for (index, instruction) in result.instructions.iter().enumerate() {
        out.push_str(&format!("{:>3}. {}\n", index + 1, instruction.text));
    }
    if !result.alternatives.is_empty() {
        out.push_str("Alternatives:\n");
        for alternative in &result.alternatives {
            out.push_str(&format!(
                "  - {:.0} m, about {:.0} s\n",
                alternative.distance_m, alternative.duration_s
            ));
        }
    }
    out
}

fn render_report(report: &ConnectivityReport) -> String {
    format!(
        "{}: {} nodes, {} edges, {} components ({}), coverage {:.1}%, {} isolated\n",
        report.dataset,
        report.nodes,
        report.edges,
        report.component_count,
        report.verdict,
        report.coverage * 100.0,
        report.isolated_nodes
    )
}

fn render_diagnostics(diagnostics: &Diagnostics) -> String {
    let mut out = format!(
        "requests {} | failures {} ({:.1}%) | cache {} entries, {} hits | external calls {}\n",
        diagnostics.requests,
        diagnostics.failures,
        diagnostics.failure_rate * 100.0,
        diagnostics.cache_size,
        diagnostics.cache_hits,
        diagnostics.external_calls
    );
    for graph in &diagnostics.graphs {
        out.push_str(&format!(
            "{} [{}]: {} nodes, {} edges, {} components\n",
            graph.site, graph.stats.mode, graph.stats.nodes, graph.stats.edges, graph.stats.components
        ));
    }
    out
}
