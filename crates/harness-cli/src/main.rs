use anyhow::Result;
use clap::{ArgAction, Parser, ValueEnum};
use harness_runner::{
    EngineInvocation, HarnessConfig, HarnessError, JavaEngine, RunPaths, RunReport, RunRequest,
    SizeLabel,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "knn-harness",
    version,
    about = "Runs the external ANN engine on one dataset size and stores its results as HDF5"
)]
struct Cli {
    /// Dataset size: 100K, 300K, 10M, 30M or 100M.
    #[arg(long, default_value = "100K", value_parser = parse_size)]
    size: SizeLabel,
    /// Neighbors per query.
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    k: u64,
    /// Build the index before searching (`--buildindex false` reuses one).
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    buildindex: bool,
    /// YAML file with harness settings; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    root: Option<PathBuf>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    #[arg(long)]
    kind: Option<String>,
    #[arg(long)]
    algo: Option<String>,
    #[arg(long)]
    dataset_url: Option<String>,
    #[arg(long)]
    java: Option<PathBuf>,
    #[arg(long)]
    jar: Option<PathBuf>,
    /// JVM heap ceiling, e.g. 500g.
    #[arg(long)]
    max_heap: Option<String>,
    /// Print the resolved paths and engine command without running anything.
    #[arg(long)]
    describe: bool,
    #[arg(long)]
    json: bool,
    #[arg(long, default_value = "info")]
    log_level: String,
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn parse_size(raw: &str) -> std::result::Result<SizeLabel, String> {
    raw.parse::<SizeLabel>().map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);
    let json_mode = cli.json;
    match run_command(cli) {
        Ok(payload) => {
            if let Some(payload) = payload {
                emit_json(&payload);
            }
            Ok(())
        }
        Err(err) => {
            if json_mode {
                emit_json(&json_error(
                    "run_failed",
                    format!("{:#}", err),
                    json!({ "stage": error_stage(&err) }),
                ));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

/// Stage reported for a failure; anything outside the pipeline happened
/// while reporting its outcome.
fn error_stage(err: &anyhow::Error) -> &'static str {
    err.downcast_ref::<HarnessError>()
        .map(|e| e.stage())
        .unwrap_or("report")
}

fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn resolve_config(cli: &Cli) -> Result<HarnessConfig> {
    let mut config = match &cli.config {
        Some(path) => HarnessConfig::load(path).map_err(HarnessError::from)?,
        None => HarnessConfig::default(),
    };
    if let Some(root) = &cli.root {
        config.root_folder = root.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(kind) = &cli.kind {
        config.kind = kind.clone();
    }
    if let Some(algo) = &cli.algo {
        config.algorithm = algo.clone();
    }
    if let Some(url) = &cli.dataset_url {
        config.dataset_url = url.clone();
    }
    if let Some(java) = &cli.java {
        config.engine.java = java.clone();
    }
    if let Some(jar) = &cli.jar {
        config.engine.jar = jar.clone();
    }
    if let Some(heap) = &cli.max_heap {
        config.engine.max_heap = heap.clone();
    }
    config.validate().map_err(HarnessError::from)?;
    Ok(config)
}

fn run_command(cli: Cli) -> Result<Option<Value>> {
    let config = resolve_config(&cli)?;
    let request =
        RunRequest::new(cli.size, cli.k as usize, cli.buildindex).map_err(HarnessError::from)?;

    if cli.describe {
        let plan = describe(&config, &request);
        if cli.json {
            return Ok(Some(json!({
                "ok": true,
                "command": "describe",
                "plan": plan,
            })));
        }
        print_fields(&plan);
        return Ok(None);
    }

    let report = harness_runner::run_benchmark(config, &request)?;
    if cli.json {
        return Ok(Some(json!({
            "ok": true,
            "command": "run",
            "run": serde_json::to_value(&report)?,
        })));
    }
    print_report(&report);
    Ok(None)
}

fn describe(config: &HarnessConfig, request: &RunRequest) -> Value {
    let bundle = harness_runner::resolve(
        &config.root_folder,
        &config.kind,
        request.size,
        &config.dataset_url,
    );
    let paths = RunPaths::derive(
        &config.root_folder,
        &config.output_dir,
        &bundle,
        &config.kind,
        request.size,
        &config.algorithm,
    );
    let invocation = EngineInvocation {
        dataset_orig_path: bundle.dataset_orig.local_path(),
        dataset_path: bundle.dataset.local_path(),
        query_orig_path: bundle.query_orig.local_path(),
        query_path: bundle.query.local_path(),
        size: request.size,
        build_index: request.build_index,
        k: request.k,
    };
    let mut command = vec![config.engine.java.display().to_string()];
    command.extend(JavaEngine::new(config.engine.clone()).argv(&invocation));
    let downloads: Vec<Value> = bundle
        .distinct()
        .into_iter()
        .map(|a| {
            json!({
                "url": a.remote_url,
                "path": a.local_path().display().to_string(),
                "present": a.local_path().exists(),
            })
        })
        .collect();
    json!({
        "algo": config.algorithm,
        "data": config.kind,
        "size": request.size.as_str(),
        "k": request.k,
        "buildindex": request.build_index,
        "downloads": downloads,
        "engine_command": command,
        "side_channel": paths.side_channel.display().to_string(),
        "engine_result": paths.engine_result.display().to_string(),
        "result": paths.container.display().to_string(),
    })
}

fn print_fields(plan: &Value) {
    if let Some(fields) = plan.as_object() {
        for (key, value) in fields {
            match value {
                Value::String(s) => println!("{}: {}", key, s),
                other => println!("{}: {}", key, other),
            }
        }
    }
}

fn print_report(report: &RunReport) {
    println!("result: {}", report.result_path.display());
    println!("raw_result: {}", report.raw_result_path.display());
    println!("algo: {}", report.algorithm);
    println!("data: {}", report.kind);
    println!("size: {}", report.size);
    println!("k: {}", report.k);
    println!("buildindex: {}", report.build_index);
    println!("buildtime: {}", report.build_time);
    println!("querytime: {}", report.query_time);
    if !report.params.is_empty() {
        println!("params: {}", report.params);
    }
    println!("engine_wall_seconds: {:.3}", report.engine_wall_seconds);
    println!("engine_stdout_lines: {}", report.engine_stdout_lines);
    println!(
        "shape: [{}, {}]",
        report.queries, report.neighbors_per_query
    );
    println!("sha256: {}", report.sha256);
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}
