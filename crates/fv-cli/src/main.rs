#![forbid(unsafe_code)]

//! FlowViz CLI - parse and explore FlowMD flowcharts.
//!
//! # Commands
//!
//! - `parse`: Parse a FlowMD document and print the graph JSON
//! - `downstream`: Compute the reachable subgraph from a start node
//! - `export`: Write the edge list as CSV
//! - `selftest`: Run the fixture suite and write a JSON report
//! - `serve`: Local HTTP viewer over the engine (requires `serve` feature)

use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fv_core::{DEFAULT_MAX_NODES, DEFAULT_PREFERRED_MAX_NODES};
use fv_highlight::HighlightEngine;
use fv_parser::{ParseLimits, parse_with_limits};
use tracing::{info, warn};

/// FlowViz CLI - parse and explore FlowMD flowcharts.
#[derive(Debug, Parser)]
#[command(
    name = "fv-cli",
    version,
    about = "FlowViz CLI - parse and explore FlowMD flowcharts",
    long_about = "Parses the FlowMD flowchart DSL into a typed graph, reports\n\
        cycles, answers downstream-reachability queries, and serves a local\n\
        viewer for a browser."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging (can be repeated for more detail: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse a FlowMD document and print the graph as JSON.
    Parse {
        /// Input file path or "-" for stdin. If omitted, reads from stdin.
        #[arg(default_value = "-")]
        input: String,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// Hard node limit; parsing fails above this
        #[arg(long, default_value_t = DEFAULT_MAX_NODES)]
        max_nodes: usize,

        /// Advisory node limit; above this the result is flagged degraded
        #[arg(long, default_value_t = DEFAULT_PREFERRED_MAX_NODES)]
        preferred_max_nodes: usize,
    },

    /// Compute the downstream subgraph reachable from a start node.
    Downstream {
        /// Input file path or "-" for stdin.
        #[arg(default_value = "-")]
        input: String,

        /// Node id to start the traversal from
        #[arg(short, long)]
        start: String,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Export the edge list as CSV (header plus one row per edge).
    Export {
        /// Input file path or "-" for stdin.
        #[arg(default_value = "-")]
        input: String,

        /// Output file path. If omitted, writes to stdout.
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Run the fixture selftest and write a JSON report.
    Selftest {
        /// Testcase directory (index.json plus one file per case)
        #[arg(long, default_value = "assets/testcases")]
        dir: String,

        /// Report output path
        #[arg(long, default_value = "logs/test-report.json")]
        report: String,
    },

    /// Start the local HTTP viewer (requires `serve` feature).
    #[cfg(feature = "serve")]
    Serve {
        /// Port to listen on; overrides the config file. 0 = ephemeral.
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Settings file consulted when --port is absent
        #[arg(long, default_value = "config/appsettings.json")]
        config: String,

        /// Open browser automatically
        #[arg(long)]
        open: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Command::Parse {
            input,
            pretty,
            max_nodes,
            preferred_max_nodes,
        } => cmd_parse(&input, pretty, max_nodes, preferred_max_nodes),

        Command::Downstream {
            input,
            start,
            pretty,
        } => cmd_downstream(&input, &start, pretty),

        Command::Export { input, output } => cmd_export(&input, output.as_deref()),

        Command::Selftest { dir, report } => cmd_selftest(&dir, &report),

        #[cfg(feature = "serve")]
        Command::Serve {
            port,
            host,
            config,
            open,
        } => serve::cmd_serve(&host, port, &config, open),
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .try_init();
}

fn load_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        Ok(buffer)
    } else if Path::new(input).exists() {
        std::fs::read_to_string(input).context(format!("Failed to read file: {input}"))
    } else {
        // Treat as inline FlowMD text
        Ok(input.to_string())
    }
}

fn write_output(output: Option<&str>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content).context(format!("Failed to write to: {path}"))?;
            info!("Wrote output to: {path}");
        }
        None => {
            io::stdout()
                .write_all(content.as_bytes())
                .context("Failed to write to stdout")?;
        }
    }
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String> {
    let body = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(body)
}

// =============================================================================
// Command: parse
// =============================================================================

fn cmd_parse(input: &str, pretty: bool, max_nodes: usize, preferred_max_nodes: usize) -> Result<()> {
    let source = load_input(input)?;
    let limits = ParseLimits {
        max_nodes,
        preferred_max_nodes,
    };
    let graph = parse_with_limits(&source, limits)?;

    for warning in &graph.meta.warnings {
        warn!("Parse warning: {}", warning.message);
    }

    println!("{}", to_json(&graph, pretty)?);

    info!(
        "Parsed {} nodes, {} edges, {} warnings",
        graph.node_count(),
        graph.edge_count(),
        graph.meta.warnings.len()
    );

    Ok(())
}

// =============================================================================
// Command: downstream
// =============================================================================

fn cmd_downstream(input: &str, start: &str, pretty: bool) -> Result<()> {
    let source = load_input(input)?;
    let graph = parse_with_limits(&source, ParseLimits::default())?;

    let engine = HighlightEngine::new(&graph);
    let result = engine.downstream(start);

    info!(
        "Downstream of {start}: {} nodes, {} edges in {:.2}ms",
        result.nodes.len(),
        result.edges.len(),
        result.duration_ms
    );

    println!("{}", to_json(&result, pretty)?);

    Ok(())
}

// =============================================================================
// Command: export
// =============================================================================

fn cmd_export(input: &str, output: Option<&str>) -> Result<()> {
    let source = load_input(input)?;
    let graph = parse_with_limits(&source, ParseLimits::default())?;
    let csv = fv_harness::edges_csv(&graph);

    info!("Exporting {} edges", graph.edge_count());
    write_output(output, &csv)
}

// =============================================================================
// Command: selftest
// =============================================================================

fn cmd_selftest(dir: &str, report_path: &str) -> Result<()> {
    let report =
        fv_harness::run_directory(Path::new(dir)).context("Failed to run the fixture suite")?;
    fv_harness::write_report(&report, Path::new(report_path))
        .context("Failed to write the selftest report")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    info!("Selftest {}/{}", report.passed, report.total);

    Ok(())
}

// =============================================================================
// Command: serve
// =============================================================================

#[cfg(feature = "serve")]
mod serve {
    use std::io::Read;
    use std::time::Instant;

    use anyhow::Result;
    use fv_highlight::HighlightEngine;
    use fv_parser::{ParseLimits, parse_with_limits};
    use serde::Deserialize;
    use tiny_http::{Header, Method, Request, Response, Server};
    use tracing::{info, warn};

    const VIEWER_HTML: &str = include_str!("viewer/viewer.html");
    const VIEWER_CSS: &str = include_str!("viewer/viewer.css");
    const VIEWER_JS: &str = include_str!("viewer/viewer.js");

    type BodyResponse = Response<std::io::Cursor<Vec<u8>>>;

    /// Settings file of the viewer; `port` 0 means an ephemeral port.
    #[derive(Debug, Deserialize)]
    #[serde(default)]
    struct AppSettings {
        port: u16,
    }

    impl Default for AppSettings {
        fn default() -> Self {
            Self { port: 0 }
        }
    }

    fn load_settings(path: &str) -> AppSettings {
        match std::fs::read_to_string(path) {
            Ok(body) => match serde_json::from_str(&body) {
                Ok(settings) => settings,
                Err(error) => {
                    warn!("Ignoring invalid settings file {path}: {error}");
                    AppSettings::default()
                }
            },
            Err(_) => AppSettings::default(),
        }
    }

    pub(crate) fn cmd_serve(
        host: &str,
        port: Option<u16>,
        config: &str,
        open: bool,
    ) -> Result<()> {
        let port = port.unwrap_or_else(|| load_settings(config).port);
        let addr = format!("{host}:{port}");
        let server =
            Server::http(&addr).map_err(|e| anyhow::anyhow!("Failed to start server: {e}"))?;

        let bound_port = server
            .server_addr()
            .to_ip()
            .map_or(port, |socket| socket.port());
        let url = format!("http://{host}:{bound_port}/");
        println!("FlowViz viewer running at: {url}");
        println!("Press Ctrl+C to stop");
        info!("Server started on {url}");

        if open {
            let _ = open_browser(&url);
        }

        for mut request in server.incoming_requests() {
            let started = Instant::now();
            let method = request.method().clone();
            let path = request.url().to_string();

            let (status, response) = route(&mut request);
            let _ = request.respond(response.with_status_code(status));

            info!(
                "Served {method} {path} {status} ({:.1} ms)",
                started.elapsed().as_secs_f64() * 1000.0
            );
        }

        Ok(())
    }

    fn route(request: &mut Request) -> (u16, BodyResponse) {
        let (path, query) = match request.url().split_once('?') {
            Some((path, query)) => (path.to_string(), query.to_string()),
            None => (request.url().to_string(), String::new()),
        };

        match (request.method().clone(), path.as_str()) {
            (Method::Get, "/" | "/viewer.html") => {
                (200, with_headers(VIEWER_HTML, "text/html; charset=utf-8"))
            }
            (Method::Get, "/viewer.css") => {
                (200, with_headers(VIEWER_CSS, "text/css; charset=utf-8"))
            }
            (Method::Get, "/viewer.js") => (
                200,
                with_headers(VIEWER_JS, "text/javascript; charset=utf-8"),
            ),
            (Method::Post, "/api/parse") => match read_body(request) {
                Ok(body) => handle_parse(&body),
                Err(response) => response,
            },
            (Method::Post, "/api/downstream") => match read_body(request) {
                Ok(body) => handle_downstream(&body, &query),
                Err(response) => response,
            },
            _ => (404, with_headers("Not Found", "text/plain; charset=utf-8")),
        }
    }

    fn read_body(request: &mut Request) -> Result<String, (u16, BodyResponse)> {
        let mut body = String::new();
        match request.as_reader().read_to_string(&mut body) {
            Ok(_) => Ok(body),
            Err(error) => Err((
                400,
                json_response(&serde_json::json!({
                    "error": format!("Failed to read request body: {error}"),
                })),
            )),
        }
    }

    fn handle_parse(body: &str) -> (u16, BodyResponse) {
        match parse_with_limits(body, ParseLimits::default()) {
            Ok(graph) => (200, json_response(&graph)),
            Err(error) => (
                422,
                json_response(&serde_json::json!({
                    "error": error.to_string(),
                    "code": error.code().as_str(),
                    "line": error.line(),
                })),
            ),
        }
    }

    fn handle_downstream(body: &str, query: &str) -> (u16, BodyResponse) {
        let Some(start) = query_param(query, "start") else {
            return (
                400,
                json_response(&serde_json::json!({
                    "error": "Missing 'start' query parameter",
                })),
            );
        };

        match parse_with_limits(body, ParseLimits::default()) {
            Ok(graph) => {
                let engine = HighlightEngine::new(&graph);
                (200, json_response(&engine.downstream(&start)))
            }
            Err(error) => (
                422,
                json_response(&serde_json::json!({
                    "error": error.to_string(),
                    "code": error.code().as_str(),
                    "line": error.line(),
                })),
            ),
        }
    }

    fn query_param(query: &str, name: &str) -> Option<String> {
        query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == name && !value.is_empty()).then(|| value.to_string())
        })
    }

    fn json_response<T: serde::Serialize>(value: &T) -> BodyResponse {
        let body = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
        with_headers(&body, "application/json; charset=utf-8")
    }

    fn with_headers(body: &str, content_type: &str) -> BodyResponse {
        let mut response = Response::from_data(body.as_bytes().to_vec());
        for (name, value) in [
            ("Content-Type", content_type),
            (
                "Content-Security-Policy",
                "default-src 'self'; script-src 'self'; style-src 'self'; img-src 'self' data:;",
            ),
            ("Cross-Origin-Opener-Policy", "same-origin"),
            ("Cross-Origin-Embedder-Policy", "require-corp"),
        ] {
            if let Ok(header) = Header::from_bytes(name.as_bytes(), value.as_bytes()) {
                response = response.with_header(header);
            }
        }
        response
    }

    fn open_browser(url: &str) -> Result<()> {
        #[cfg(target_os = "macos")]
        std::process::Command::new("open").arg(url).spawn()?;

        #[cfg(target_os = "linux")]
        std::process::Command::new("xdg-open").arg(url).spawn()?;

        #[cfg(target_os = "windows")]
        std::process::Command::new("cmd")
            .args(["/c", "start", url])
            .spawn()?;

        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::query_param;

        #[test]
        fn query_param_finds_named_value() {
            assert_eq!(query_param("start=B&x=1", "start").as_deref(), Some("B"));
            assert_eq!(query_param("x=1", "start"), None);
            assert_eq!(query_param("start=", "start"), None);
            assert_eq!(query_param("", "start"), None);
        }
    }
}
