//! Rankfuse CLI
//!
//! Hybrid retrieval engine with an IR and LLM-judged evaluation harness.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rankfuse::{
    benchmark::{create_sample_benchmark, Benchmark, BenchmarkFilter},
    config::Config,
    embedding::{CachedEmbedder, HttpEmbedder},
    harness::{EvalHarness, RunOptions},
    judge::HttpJudge,
    llm::LlmClient,
    passage::{create_sample_corpus, InMemoryPassageStore, Passage},
    report::print_comparison,
    retrieval::{HybridRetriever, InMemoryLexicalIndex, InMemoryVectorIndex},
    sink::{JsonlSink, NoopSink, ScoreSink},
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Rankfuse - hybrid retrieval engine and quality-evaluation harness
#[derive(Parser)]
#[command(name = "rankfuse")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AlgorithmArg {
    /// Fused semantic + lexical retrieval
    Hybrid,
    /// Dense vector retrieval only
    Semantic,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a benchmark through the retrieval engine
    Run {
        /// Path to the benchmark JSON file (omit for the built-in sample)
        #[arg(short, long)]
        benchmark: Option<PathBuf>,

        /// Path to the corpus JSON file (omit for the built-in sample)
        #[arg(short, long)]
        corpus: Option<PathBuf>,

        /// Only run queries with this topic label
        #[arg(long)]
        topic: Option<String>,

        /// Only run queries with this category label
        #[arg(long)]
        category: Option<String>,

        /// Only run queries with this difficulty label
        #[arg(long)]
        difficulty: Option<String>,

        /// Cap the number of queries
        #[arg(short, long)]
        limit: Option<usize>,

        /// Retrieval algorithm
        #[arg(short, long, value_enum, default_value = "hybrid")]
        algorithm: AlgorithmArg,

        /// Also run the other algorithm and print a side-by-side comparison
        #[arg(long)]
        compare: bool,

        /// Print what would run without touching any external service
        #[arg(long)]
        dry_run: bool,

        /// Generate answers and score them with the LLM judge
        #[arg(long)]
        judged: bool,

        /// Write the full JSON report to this path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Append per-query and run records to this JSONL file
        #[arg(long)]
        scores: Option<PathBuf>,
    },

    /// Show benchmark composition statistics
    Stats {
        /// Path to the benchmark JSON file (omit for the built-in sample)
        #[arg(short, long)]
        benchmark: Option<PathBuf>,
    },

    /// Test connectivity to the configured external services
    Test,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            benchmark,
            corpus,
            topic,
            category,
            difficulty,
            limit,
            algorithm,
            compare,
            dry_run,
            judged,
            output,
            scores,
        } => {
            let filter = BenchmarkFilter {
                category,
                topic,
                difficulty,
                limit,
            };
            cmd_run(RunArgs {
                benchmark,
                corpus,
                filter,
                algorithm,
                compare,
                dry_run,
                judged,
                output,
                scores,
            })
            .await
        }
        Commands::Stats { benchmark } => cmd_stats(benchmark),
        Commands::Test => cmd_test().await,
    }
}

struct RunArgs {
    benchmark: Option<PathBuf>,
    corpus: Option<PathBuf>,
    filter: BenchmarkFilter,
    algorithm: AlgorithmArg,
    compare: bool,
    dry_run: bool,
    judged: bool,
    output: Option<PathBuf>,
    scores: Option<PathBuf>,
}

fn load_benchmark(path: Option<&PathBuf>) -> Result<Benchmark> {
    match path {
        Some(path) => {
            if !path.exists() {
                return Err(rankfuse::RankfuseError::BenchmarkNotFound(path.clone()).into());
            }
            Benchmark::load_json(path)
        }
        None => {
            println!("No benchmark file given; using the built-in sample benchmark.");
            Ok(create_sample_benchmark())
        }
    }
}

fn load_corpus(path: Option<&PathBuf>) -> Result<Vec<Passage>> {
    match path {
        Some(path) => {
            let store = InMemoryPassageStore::load_json(path)
                .with_context(|| format!("Failed to load corpus from '{}'", path.display()))?;
            Ok(store.all())
        }
        None => {
            println!("No corpus file given; using the built-in sample corpus.");
            Ok(create_sample_corpus())
        }
    }
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let benchmark = load_benchmark(args.benchmark.as_ref())?;
    let corpus = load_corpus(args.corpus.as_ref())?;

    let selected = benchmark.filter(&args.filter);
    println!(
        "Benchmark '{}' v{}: {} queries selected of {}",
        benchmark.name,
        benchmark.version,
        selected.len(),
        benchmark.len()
    );
    println!("Corpus: {} passages", corpus.len());

    if args.dry_run {
        println!("\nDry run; queries that would execute:");
        for query in &selected {
            println!(
                "  {:<20} [{}/{}/{}] {}",
                query.id, query.category, query.topic, query.difficulty, query.text
            );
        }
        return Ok(());
    }

    if selected.is_empty() {
        anyhow::bail!("No benchmark queries match the given filters");
    }

    // Credentials are checked before any query runs.
    config
        .validate_embedding()
        .context("Invalid configuration")?;
    if args.judged {
        config.validate_judged().context("Invalid configuration")?;
    }

    let retriever = HybridRetriever::new(
        Arc::new(InMemoryVectorIndex::build(&corpus)),
        Arc::new(InMemoryLexicalIndex::build(&corpus)),
    );

    let embedder = Arc::new(CachedEmbedder::from_config(
        Arc::new(HttpEmbedder::new(config.embedding.clone())),
        &config.embedding,
    ));

    let sink: Arc<dyn ScoreSink> = match &args.scores {
        Some(path) => Arc::new(
            JsonlSink::create(path)
                .with_context(|| format!("Failed to open score file '{}'", path.display()))?,
        ),
        None => Arc::new(NoopSink),
    };

    let mut harness = EvalHarness::new(retriever, embedder, sink, config.clone());
    if args.judged {
        harness = harness.with_judge(
            Arc::new(LlmClient::new(config.llm.clone())),
            Arc::new(HttpJudge::new(config.judge.clone())),
        );
    }

    let options = RunOptions {
        filter: args.filter.clone(),
        judged: args.judged,
        semantic_only: matches!(args.algorithm, AlgorithmArg::Semantic),
    };

    let report = harness
        .run(&benchmark, &options)
        .await
        .context("Evaluation run failed")?;
    report.print_summary();

    if args.compare {
        let other = RunOptions {
            semantic_only: !options.semantic_only,
            ..options.clone()
        };
        let other_report = harness
            .run(&benchmark, &other)
            .await
            .context("Comparison run failed")?;
        print_comparison(&report, &other_report);
    }

    if let Some(path) = &args.output {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to '{}'", path.display()))?;
        println!("Report written to: {}", path.display());
    }

    if !report.passed {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_stats(benchmark_path: Option<PathBuf>) -> Result<()> {
    let benchmark = load_benchmark(benchmark_path.as_ref())?;
    let stats = benchmark.stats();

    println!("Benchmark '{}' v{}", benchmark.name, benchmark.version);
    println!("{}", "─".repeat(40));
    println!("  Total queries: {}", stats.total);

    println!("  By category:");
    for (category, count) in &stats.by_category {
        println!("    {:<16} {}", category, count);
    }
    println!("  By topic:");
    for (topic, count) in &stats.by_topic {
        println!("    {:<16} {}", topic, count);
    }
    println!("  By difficulty:");
    for (difficulty, count) in &stats.by_difficulty {
        println!("    {:<16} {}", difficulty, count);
    }

    Ok(())
}

async fn cmd_test() -> Result<()> {
    println!("Testing external services...\n");

    let config = Config::load().context("Failed to load configuration")?;

    println!("Configuration:");
    println!("  LLM API base:       {}", config.llm.api_base);
    println!("  LLM model:          {}", config.llm.model);
    println!("  Embedding API base: {}", config.embedding.api_base);
    println!("  Judge API base:     {}", config.judge.api_base);
    println!();

    if config.llm.api_base.is_empty() {
        println!("LLM is not configured; set LLM_API_BASE and LLM_API_KEY.");
        return Ok(());
    }

    let client = LlmClient::new(config.llm);
    println!("Sending LLM test request...");
    match client.test_connection().await {
        Ok(()) => println!("LLM connection successful!"),
        Err(e) => println!("LLM connection failed: {}", e),
    }

    Ok(())
}
