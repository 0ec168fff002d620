mod logging;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::warn;

use microroute_lib::routing::RawCoordinate;
use microroute_lib::{
    RawRouteRequest, RouteOptions, RouteResult, RoutingConfig, RoutingService, SearchAlgorithm,
    TravelMode,
};

use crate::logging::{init_logging, LoggingConfig};
use crate::output::{print_diagnostics, print_reports, print_route, OutputFormat};

/// Exit code for rejected request input.
const EXIT_INVALID_INPUT: u8 = 2;

#[derive(Parser, Debug)]
#[command(author, version, about = "Micro-area routing with graceful fallback")]
struct Cli {
    /// Override the data directory holding `sites.json` and the datasets.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Never call the external directions provider.
    #[arg(long, global = true)]
    offline: bool,

    /// Output format for command results.
    #[arg(long, value_enum, default_value_t = OutputFormat::Json, global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute a route between two `lat,lng` coordinates.
    Route {
        /// Origin as `lat,lng`.
        #[arg(long = "from", allow_hyphen_values = true)]
        from: String,
        /// Destination as `lat,lng`.
        #[arg(long = "to", allow_hyphen_values = true)]
        to: String,
        /// Travel mode (walking, cycling, driving or an alias).
        #[arg(long, default_value = "walking")]
        mode: String,
        /// Never use steps.
        #[arg(long)]
        avoid_steps: bool,
        /// Penalise unpaved surfaces.
        #[arg(long)]
        prefer_paved: bool,
        /// Number of alternative local routes (at most 3).
        #[arg(long, default_value_t = 0)]
        alternatives: usize,
        /// Search algorithm for the local graph.
        #[arg(long, value_enum, default_value_t = AlgorithmArg::AStar)]
        algorithm: AlgorithmArg,
    },
    /// Report connected components of a site's path network.
    Connectivity {
        /// Site id; all sites when omitted.
        #[arg(long)]
        site: Option<String>,
    },
    /// Build every site graph and print service diagnostics.
    Diagnostics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AlgorithmArg {
    Dijkstra,
    #[value(name = "a-star", alias = "astar")]
    AStar,
}

impl From<AlgorithmArg> for SearchAlgorithm {
    fn from(value: AlgorithmArg) -> Self {
        match value {
            AlgorithmArg::Dijkstra => SearchAlgorithm::Dijkstra,
            AlgorithmArg::AStar => SearchAlgorithm::AStar,
        }
    }
}

fn main() -> Result<ExitCode> {
    init_logging(&LoggingConfig::from_env());
    let cli = Cli::parse();

    let mut config = RoutingConfig::from_env();
    if let Some(dir) = &cli.data_dir {
        config = config.with_data_dir(dir);
    }
    let mut builder = RoutingService::builder(config);
    if cli.offline {
        builder = builder.without_provider();
    }
    let service = builder
        .build()
        .context("failed to initialise the routing service")?;

    match cli.command {
        Command::Route {
            from,
            to,
            mode,
            avoid_steps,
            prefer_paved,
            alternatives,
            algorithm,
        } => {
            let options = RouteOptions {
                avoid_steps,
                prefer_paved,
                alternatives,
                algorithm: algorithm.into(),
            };
            handle_route(&service, &from, &to, &mode, options, cli.format)
        }
        Command::Connectivity { site } => {
            handle_connectivity(&service, site.as_deref(), cli.format)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Diagnostics => {
            handle_diagnostics(&service, cli.format)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn handle_route(
    service: &RoutingService,
    from: &str,
    to: &str,
    mode: &str,
    options: RouteOptions,
    format: OutputFormat,
) -> Result<ExitCode> {
    let raw = RawRouteRequest {
        from: Some(parse_coordinate(from)),
        to: Some(parse_coordinate(to)),
        mode: Some(mode.to_string()),
        options,
    };

    let request = match raw.into_request() {
        Ok(request) => request,
        Err(err) if err.is_validation() => {
            print_route(&RouteResult::invalid(err.to_string()), format)?;
            return Ok(ExitCode::from(EXIT_INVALID_INPUT));
        }
        Err(err) => return Err(err).context("failed to build route request"),
    };

    let result = service
        .calculate_route(&request)
        .context("failed to calculate route")?;
    print_route(&result, format)?;
    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Split `lat,lng` without interpreting the parts; validation happens in
/// [`RawRouteRequest::into_request`].
fn parse_coordinate(text: &str) -> RawCoordinate {
    let mut parts = text.splitn(2, ',').map(|part| part.trim().to_string());
    RawCoordinate {
        lat: parts.next().filter(|part| !part.is_empty()).map(Value::String),
        lng: parts.next().filter(|part| !part.is_empty()).map(Value::String),
    }
}

fn handle_connectivity(
    service: &RoutingService,
    site: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let ids: Vec<String> = match site {
        Some(site) => vec![site.to_string()],
        None => service
            .catalog()
            .sites()
            .iter()
            .map(|site| site.id.clone())
            .collect(),
    };

    let reports = ids
        .iter()
        .map(|id| {
            service
                .analyze_connectivity(id)
                .with_context(|| format!("failed to analyze connectivity of site {id}"))
        })
        .collect::<Result<Vec<_>>>()?;
    print_reports(&reports, format)
}

fn handle_diagnostics(service: &RoutingService, format: OutputFormat) -> Result<()> {
    for site in service.catalog().sites() {
        for mode in TravelMode::ALL {
            if let Err(err) = service.graph_stats(&site.id, mode) {
                warn!(site = %site.id, %mode, error = %err, "could not build site graph");
            }
        }
    }
    print_diagnostics(&service.diagnostics(), format)
}
