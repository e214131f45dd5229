use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use concord::{
    execute_render, read_classifications, read_subjects, run_pipeline_parallel, sort_observations,
    ConsensusConfig, FilterConfig, GroupingCache, IngestConfig, JsonFileCache, LineCountSummary,
    LineMatchConfig, NoCache, ReliabilitySummary, RenderConfig, RenderTargets, RunSummary,
    SubjectIndex,
};

#[derive(Parser)]
#[command(name = "concord")]
#[command(author, version, about = "Consensus transcription of hand-marked text lines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build consensus lines from a classification export and write them out
    Process {
        #[command(flatten)]
        source: SourceArgs,

        /// Subject manifest CSV with catalogue ids and image urls
        #[arg(short, long)]
        subjects: Option<PathBuf>,

        /// Output file for the per-line export
        #[arg(long)]
        linewise: Option<PathBuf>,

        /// Output file for the per-subject export
        #[arg(long)]
        subjectwise: Option<PathBuf>,

        /// Output file for the JSON export
        #[arg(long)]
        json: Option<PathBuf>,

        /// Keep immediately repeated words
        #[arg(long)]
        no_collapse_words: bool,

        /// Keep lines that repeat the previous line
        #[arg(long)]
        no_suppress_lines: bool,

        /// Forget the previous line at each new subject
        #[arg(long)]
        reset_filter_per_subject: bool,

        /// Directory for cached line groups
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },

    /// Print the reliability distribution of a classification export
    Analyze {
        #[command(flatten)]
        source: SourceArgs,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// Classification export CSV
    #[arg(short, long)]
    input: PathBuf,

    /// Maximum y distance in pixels between marks of the same line
    #[arg(long, default_value = "40")]
    y_tolerance: f64,

    /// Maximum x distance in pixels between marks of the same line
    #[arg(long)]
    x_tolerance: Option<f64>,

    /// Merge adjacent lines whose mean y differ by less than this
    #[arg(long)]
    merge_threshold: Option<f64>,

    /// Ignore classifications started before this RFC 3339 timestamp
    #[arg(long)]
    live_since: Option<String>,

    /// Accept every page type, not only telegrams
    #[arg(long)]
    all_pages: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl SourceArgs {
    fn line_match(&self) -> LineMatchConfig {
        LineMatchConfig {
            y_tolerance: self.y_tolerance,
            x_tolerance: self.x_tolerance,
            merge_mean_y_threshold: self.merge_threshold,
        }
    }

    fn ingest(&self) -> Result<IngestConfig> {
        let live_since = self
            .live_since
            .as_deref()
            .map(|raw| {
                DateTime::parse_from_rfc3339(raw)
                    .map(|t| t.with_timezone(&Utc))
                    .with_context(|| format!("Invalid --live-since timestamp: {}", raw))
            })
            .transpose()?;

        let mut config = IngestConfig {
            live_since,
            ..Default::default()
        };
        if self.all_pages {
            config.type_prefix = None;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            source,
            subjects,
            linewise,
            subjectwise,
            json,
            no_collapse_words,
            no_suppress_lines,
            reset_filter_per_subject,
            cache_dir,
        } => {
            setup_logging(source.verbose);
            let filter = FilterConfig {
                collapse_repeated_words: !no_collapse_words,
                suppress_repeated_lines: !no_suppress_lines,
                reset_per_subject: reset_filter_per_subject,
            };
            let targets = RenderTargets {
                linewise: linewise.as_deref(),
                subjectwise: subjectwise.as_deref(),
                json: json.as_deref(),
            };
            process_export(&source, subjects, filter, targets, cache_dir).await
        }
        Commands::Analyze { source } => {
            setup_logging(source.verbose);
            analyze_export(&source).await
        }
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

async fn process_export(
    source: &SourceArgs,
    subjects: Option<PathBuf>,
    filter: FilterConfig,
    targets: RenderTargets<'_>,
    cache_dir: Option<PathBuf>,
) -> Result<()> {
    info!("Loading classifications from {:?}", source.input);
    let ingest = source.ingest()?;
    let mut observations = read_classifications(&source.input, &ingest)?.observations;
    sort_observations(&mut observations);

    let subject_index = match &subjects {
        Some(path) => {
            read_subjects(path, &ingest.catalogue_key).context("Failed to read subject manifest")?
        }
        None => SubjectIndex::new(),
    };

    let file_cache = cache_dir
        .as_deref()
        .map(JsonFileCache::open)
        .transpose()
        .context("Failed to open grouping cache")?;
    let cache: &dyn GroupingCache = match &file_cache {
        Some(c) => c,
        None => &NoCache,
    };

    let config = ConsensusConfig {
        line_match: source.line_match(),
        filter,
    };
    let result = run_pipeline_parallel(&observations, &config, cache).await?;

    let summary = RunSummary {
        y_tolerance: config.line_match.y_tolerance,
        x_tolerance: config.line_match.x_tolerance,
        lines_suppressed: result.filtered.lines_suppressed,
        words_collapsed: result.filtered.words_collapsed,
    };
    let rendered = execute_render(
        &result.filtered,
        &subject_index,
        summary,
        targets,
        &RenderConfig::default(),
    )?;

    for path in [
        &rendered.linewise_path,
        &rendered.subjectwise_path,
        &rendered.json_path,
    ]
    .into_iter()
    .flatten()
    {
        info!("Output written to {:?}", path);
    }

    info!(
        "Complete: {} subjects, {} lines grouped, {} emitted ({} suppressed)",
        result.subject_count,
        result.group_count,
        result.filtered.lines.len(),
        result.filtered.lines_suppressed
    );

    Ok(())
}

async fn analyze_export(source: &SourceArgs) -> Result<()> {
    info!("Analyzing classifications from {:?}", source.input);
    let ingest = source.ingest()?;
    let ingested = read_classifications(&source.input, &ingest)?;
    let mut observations = ingested.observations;
    sort_observations(&mut observations);

    let config = ConsensusConfig {
        line_match: source.line_match(),
        ..Default::default()
    };
    let line_counts = LineCountSummary::from_observations(&observations);
    let result = run_pipeline_parallel(&observations, &config, &NoCache).await?;
    let summary = ReliabilitySummary::from_lines(&result.consensus);

    println!("Classification Analysis");
    println!("=======================");
    println!("Records read: {}", ingested.records_read);
    println!("Records accepted: {}", ingested.records_accepted);
    println!("Line observations: {}", result.observation_count);
    println!("Subjects: {}", result.subject_count);
    println!("Line groups: {}", result.group_count);
    println!();

    println!("Lines per Transcription");
    println!("-----------------------");
    println!(
        "Min {}, max {}, mean {:.1}",
        line_counts.min(),
        line_counts.max(),
        line_counts.mean()
    );
    for subject in &line_counts.subjects {
        debug!(
            "Subject {}: {} transcriptions, lines min {} max {} mean {:.1}",
            subject.subject_id, subject.transcriptions, subject.min, subject.max, subject.mean
        );
    }
    println!();

    println!("Word Positions");
    println!("--------------");
    println!("Total positions: {}", summary.slot_count);
    println!("Majority agreement: {}", summary.majority_slots);
    println!("Single candidate: {}", summary.single_candidate_slots);
    println!("Two-way disagreement: {}", summary.low_support_slots);
    println!();

    println!("Line Reliability");
    println!("----------------");
    for (index, count) in summary.histogram.iter().enumerate() {
        let (low, high) = ReliabilitySummary::bin_range(index);
        println!("{:.1}-{:.1}: {}", low, high, count);
    }
    println!("Mean line reliability: {:.3}", summary.mean_line_reliability);
    println!(
        "Mean subject reliability: {:.3}",
        summary.mean_subject_reliability
    );

    println!();
    println!("Filtering");
    println!("---------");
    println!("Lines emitted: {}", result.filtered.lines.len());
    println!("Lines suppressed: {}", result.filtered.lines_suppressed);
    println!("Words collapsed: {}", result.filtered.words_collapsed);

    Ok(())
}
