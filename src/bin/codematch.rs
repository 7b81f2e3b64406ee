//! codematch CLI — corpus ingestion, plagiarism checks and the HTTP service.
//!
//! Usage:
//!   codematch fetch
//!   codematch index [--prune]
//!   codematch check <snippet> [-k N]
//!   codematch serve [--bind addr]
//!   codematch evaluate [--cases file] [--output file]

use clap::{Parser, Subcommand};
use codematch::config::{default_config_path, Config};
use codematch::corpus::{fetch_repositories, FetchOutcome, IngestError};
use codematch::evaluation::{self, EvalCase};
use codematch::server::{self, AppState};
use codematch::{
    build_embedder, CheckOutcome, CheckRequest, CorpusIndexer, CorpusSource, Embedder,
    OpenAiOracle, OpenStore, Oracle, PlagiarismPipeline, Retriever, ScriptedOracle, SqliteStore,
    VectorIndex, Verifier,
};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "codematch",
    version,
    about = "Embedding-based source code plagiarism detection"
)]
struct Cli {
    /// Path to the YAML config file
    #[arg(long, global = true, env = "CODEMATCH_CONFIG")]
    config: Option<PathBuf>,
    /// SQLite index file (overrides index.path)
    #[arg(long, global = true, env = "CODEMATCH_INDEX")]
    index: Option<PathBuf>,
    /// Corpus directory (overrides corpus.data_dir)
    #[arg(long, global = true, env = "CODEMATCH_DATA_DIR")]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clone the configured reference repositories
    Fetch,
    /// Embed the corpus into the index
    Index {
        /// Remove index entries whose files no longer exist
        #[arg(long)]
        prune: bool,
    },
    /// Check one snippet
    Check {
        /// Source code to check
        snippet: String,
        /// Number of candidates to retrieve
        #[arg(short, long)]
        k: Option<usize>,
        /// Answer oracle requests with REPLY instead of calling the API
        #[arg(long, value_name = "REPLY")]
        offline: Option<String>,
    },
    /// Start the HTTP service
    Serve {
        /// Listen address (overrides server.bind)
        #[arg(long, env = "CODEMATCH_BIND")]
        bind: Option<String>,
    },
    /// Run labelled cases and write a CSV report
    Evaluate {
        /// YAML list of {code, expected}; built-in cases when omitted
        #[arg(long)]
        cases: Option<PathBuf>,
        /// Report path
        #[arg(long, default_value = "evaluation_results.csv")]
        output: PathBuf,
        /// Answer oracle requests with REPLY instead of calling the API
        #[arg(long, value_name = "REPLY")]
        offline: Option<String>,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config, String> {
    let path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = Config::load_or_default(&path).map_err(|e| e.to_string())?;
    if let Some(index) = &cli.index {
        config.index.path = Some(index.clone());
    }
    if let Some(data_dir) = &cli.data_dir {
        config.corpus.data_dir = data_dir.clone();
    }
    Ok(config)
}

fn open_index(config: &Config, embedder: &dyn Embedder) -> Result<Arc<VectorIndex>, String> {
    let dimensions = embedder.dimensions();
    match &config.index.path {
        Some(path) => {
            let store =
                SqliteStore::open(path).map_err(|e| format!("Failed to open index: {}", e))?;
            let index = VectorIndex::with_store(embedder.model_id(), dimensions, Arc::new(store))
                .map_err(|e| format!("Failed to load index: {}", e))?;
            Ok(Arc::new(index))
        }
        None => Ok(Arc::new(VectorIndex::in_memory(dimensions))),
    }
}

fn build_oracle(config: &Config, offline: Option<String>) -> Result<Arc<dyn Oracle>, String> {
    if let Some(reply) = offline {
        return Ok(Arc::new(ScriptedOracle::replying(reply)));
    }
    let api_key = config
        .oracle
        .api_key()
        .ok_or_else(|| format!("{} is not set", config.oracle.api_key_env))?;
    let oracle = OpenAiOracle::new(
        &api_key,
        &config.oracle.base_url,
        &config.oracle.model,
        config.oracle.timeout(),
    )
    .map_err(|e| e.to_string())?;
    Ok(Arc::new(oracle))
}

fn build_pipeline(config: &Config, offline: Option<String>) -> Result<PlagiarismPipeline, String> {
    let embedder = build_embedder(&config.embedding).map_err(|e| e.to_string())?;
    let index = open_index(config, embedder.as_ref())?;
    let oracle = build_oracle(config, offline)?;

    let retriever =
        Retriever::new(embedder, index).with_min_similarity(config.retrieval.min_similarity);
    let verifier = Verifier::new(oracle, config.oracle.timeout());
    Ok(PlagiarismPipeline::new(retriever, verifier)
        .with_k_limits(config.retrieval.default_k, config.retrieval.max_k))
}

fn runtime() -> Result<tokio::runtime::Runtime, String> {
    tokio::runtime::Runtime::new().map_err(|e| format!("failed to create tokio runtime: {}", e))
}

fn cmd_fetch(config: &Config) -> i32 {
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let outcomes = rt.block_on(fetch_repositories(
        &config.corpus.repositories,
        &config.corpus.data_dir,
    ));

    let mut failed = 0;
    for (url, outcome) in outcomes {
        match outcome {
            Ok(FetchOutcome::Cloned(path)) => println!("cloned   {} -> {}", url, path.display()),
            Ok(FetchOutcome::AlreadyPresent(path)) => {
                println!("present  {} ({})", url, path.display())
            }
            Err(e) => {
                eprintln!("failed   {}: {}", url, e);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        1
    } else {
        0
    }
}

fn cmd_index(config: &Config, prune: bool) -> i32 {
    let embedder = match build_embedder(&config.embedding) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let index = match open_index(config, embedder.as_ref()) {
        Ok(i) => i,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if !config.corpus.data_dir.is_dir() {
        eprintln!(
            "Error: corpus directory '{}' does not exist (run `codematch fetch`)",
            config.corpus.data_dir.display()
        );
        return 1;
    }

    let source = CorpusSource::new(&config.corpus.data_dir, &config.corpus.extensions);
    let indexer = CorpusIndexer::new(embedder, index.clone())
        .with_batch_size(config.embedding.batch_size);

    let mut discovered = HashSet::new();
    let report = indexer.index_artifacts(source.artifacts().inspect(|item| {
        if let Ok(artifact) = item {
            discovered.insert(artifact.id.clone());
        }
    }));

    println!(
        "indexed {}, unchanged {}, failed {} (index holds {})",
        report.indexed,
        report.unchanged,
        report.failed.len(),
        index.len()
    );
    for failure in &report.failed {
        eprintln!("  {}: {}", failure.id, failure.error);
    }

    if prune {
        let unreadable = report
            .failed
            .iter()
            .any(|f| matches!(f.error, IngestError::Discovery(_)));
        if unreadable {
            eprintln!("Warning: skipping prune, some files could not be read");
        } else {
            match indexer.prune(&discovered) {
                Ok(removed) => println!("pruned {}", removed.len()),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return 1;
                }
            }
        }
    }

    if report.is_clean() {
        0
    } else {
        1
    }
}

fn cmd_check(config: &Config, snippet: String, k: Option<usize>, offline: Option<String>) -> i32 {
    let pipeline = match build_pipeline(config, offline) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let mut request = CheckRequest::new(snippet);
    request.k = k;
    match rt.block_on(pipeline.handle(&request)) {
        Ok(outcome) => {
            if let CheckOutcome::Verified(record) = &outcome {
                for m in &record.matches {
                    eprintln!("  {:.4}  {}", m.score, m.id);
                }
            }
            match serde_json::to_string_pretty(&outcome.into_response()) {
                Ok(json) => {
                    println!("{}", json);
                    0
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    1
                }
            }
        }
        Err(e) => {
            eprintln!("Error [{}]: {}", e.kind(), e);
            1
        }
    }
}

fn cmd_serve(config: &Config, bind: Option<String>) -> i32 {
    let pipeline = match build_pipeline(config, None) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let addr = bind.unwrap_or_else(|| config.server.bind.clone());
    let state = AppState::new(Arc::new(pipeline));
    match rt.block_on(server::serve(state, &addr)) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: server on {}: {}", addr, e);
            1
        }
    }
}

fn cmd_evaluate(
    config: &Config,
    cases: Option<PathBuf>,
    output: PathBuf,
    offline: Option<String>,
) -> i32 {
    let cases: Vec<EvalCase> = match cases {
        Some(path) => match evaluation::load_cases(&path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        },
        None => evaluation::default_cases(),
    };
    let pipeline = match build_pipeline(config, offline) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let results = rt.block_on(evaluation::evaluate(&pipeline, &cases));
    if let Err(e) = evaluation::write_csv(&output, &results) {
        eprintln!("Error: {}", e);
        return 1;
    }
    let accuracy = evaluation::accuracy(&results).unwrap_or(0.0);
    println!(
        "Evaluation complete: {}/{} correct ({:.0}%). Results saved to {}",
        results.iter().filter(|r| r.is_correct()).count(),
        results.len(),
        accuracy * 100.0,
        output.display()
    );
    0
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Fetch => cmd_fetch(&config),
        Commands::Index { prune } => cmd_index(&config, prune),
        Commands::Check { snippet, k, offline } => cmd_check(&config, snippet, k, offline),
        Commands::Serve { bind } => cmd_serve(&config, bind),
        Commands::Evaluate {
            cases,
            output,
            offline,
        } => cmd_evaluate(&config, cases, output, offline),
    };
    std::process::exit(code);
}
