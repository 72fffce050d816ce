use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use facebench_core::eval::effective_folds;
use facebench_core::{
    create_classifier, create_extractor, create_filter, cross_validate, find_preset, presets, random_roc, report,
    run_pair_benchmark, ClassifierKind, ExtractorKind, ExtractorParams, FacePipeline, FeatureChain, FilterKind,
    PipelineConfig, PredictorMode, RocPoint, SampleSet, TrainMethod,
};
use facebench_img::dataset::read_sample_list;
use facebench_img::{DirectoryImageSource, PairDataset, PreprocessKind, Preprocessor};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "facebench", about = "Face recognition pipeline benchmarks")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Print per-fold progress lines to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Emit reports as JSON
    #[arg(long, global = true)]
    json: bool,
    /// Seed for the random generator (drawn from entropy when omitted)
    #[arg(long, global = true)]
    seed: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List selector indices and names, and the built-in presets
    Options,
    /// Per-person k-fold cross-validation
    Cross {
        #[command(flatten)]
        data: SampleArgs,
        #[command(flatten)]
        stages: StageArgs,
        /// Fold count
        #[arg(short = 'k', long)]
        folds: Option<usize>,
    },
    /// Randomized ROC sampling; writes one `<name>.roc` file per run
    Roc {
        #[command(flatten)]
        data: SampleArgs,
        #[command(flatten)]
        stages: StageArgs,
        /// One sample in RATIO goes to each trial's test set
        #[arg(long)]
        ratio: Option<u32>,
        /// Number of trials
        #[arg(long)]
        iterations: Option<usize>,
        /// Directory for `.roc` files
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// LFW pair verification benchmark
    Pairs {
        /// LFW root holding pairsDevTrain.txt and pairs.txt
        #[arg(long)]
        root: Option<PathBuf>,
        #[command(flatten)]
        stages: StageArgs,
        /// Training pairs: `dev` or `split`
        #[arg(short, long)]
        train_method: Option<TrainMethod>,
        /// Use every SKIP-th pair
        #[arg(long)]
        skip: Option<usize>,
        /// Compare predicted labels instead of verifying pairs directly
        #[arg(short, long)]
        labels: bool,
    },
}

#[derive(Args)]
struct SampleArgs {
    /// Sample list file (`path;identity` or `identity/file` per line)
    #[arg(short, long)]
    samples: Option<PathBuf>,
    /// Cap on loaded samples (0 loads all)
    #[arg(long)]
    max_images: Option<usize>,
    /// Preset to run, repeatable; `all` runs every preset
    #[arg(short, long = "preset")]
    presets: Vec<String>,
}

#[derive(Args)]
struct StageArgs {
    /// Extractor, by index or name
    #[arg(short, long)]
    extractor: Option<ExtractorKind>,
    /// Filter, by index or name
    #[arg(short, long)]
    filter: Option<FilterKind>,
    /// Classifier / verifier comparison, by index or name
    #[arg(short, long)]
    classifier: Option<ClassifierKind>,
    /// Preprocessing, by index or name
    #[arg(short = 'P', long)]
    preprocess: Option<PreprocessKind>,
    /// Border margin cropped before preprocessing
    #[arg(long)]
    crop: Option<u32>,
}

impl StageArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(v) = self.extractor {
            config.extractor = v;
        }
        if let Some(v) = self.filter {
            config.filter = v;
        }
        if let Some(v) = self.classifier {
            config.classifier = v;
        }
        if let Some(v) = self.preprocess {
            config.preprocess = v;
        }
        if let Some(v) = self.crop {
            config.crop = v;
        }
    }
}

impl SampleArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(v) = &self.samples {
            config.samples = v.clone();
        }
        if let Some(v) = self.max_images {
            config.max_images = v;
        }
    }
}

/// One named extractor / filter / classifier combination to evaluate.
struct Run {
    name: String,
    extractor: ExtractorKind,
    filter: FilterKind,
    classifier: ClassifierKind,
    params: ExtractorParams,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(seed) = cli.seed {
        config.seed = Some(seed);
    }

    match cli.command {
        Commands::Options => {
            print!("{}", report::options_listing());
            println!("presets:");
            for p in presets() {
                println!(
                    "  {:<16} {:<6} {:<7} {}",
                    p.name,
                    p.extractor.name(),
                    p.filter.name(),
                    p.classifier
                );
            }
        }
        Commands::Cross { data, stages, folds } => {
            data.apply(&mut config);
            stages.apply(&mut config);
            if let Some(v) = folds {
                config.folds = v;
            }
            cmd_cross(&config, &data.presets, cli.verbose, cli.json)?;
        }
        Commands::Roc {
            data,
            stages,
            ratio,
            iterations,
            out_dir,
        } => {
            data.apply(&mut config);
            stages.apply(&mut config);
            if let Some(v) = ratio {
                config.ratio = v;
            }
            if let Some(v) = iterations {
                config.iterations = v;
            }
            if let Some(v) = out_dir {
                config.roc_dir = v;
            }
            cmd_roc(&config, &data.presets, cli.json)?;
        }
        Commands::Pairs {
            root,
            stages,
            train_method,
            skip,
            labels,
        } => {
            stages.apply(&mut config);
            if let Some(v) = root {
                config.lfw_root = v;
            }
            if let Some(v) = train_method {
                config.train_method = v;
            }
            if let Some(v) = skip {
                config.skip = v;
            }
            if labels {
                config.mode = PredictorMode::Classifier;
            }
            cmd_pairs(&config, cli.json)?;
        }
    }

    Ok(())
}

/// Runs named by `--preset`, or the single configured combination.
fn runs(config: &Config, names: &[String]) -> Result<Vec<Run>> {
    let base = config.extractor_params();
    if names.is_empty() {
        return Ok(vec![Run {
            name: format!("{}_{}", config.extractor, config.classifier).to_lowercase(),
            extractor: config.extractor,
            filter: config.filter,
            classifier: config.classifier,
            params: base,
        }]);
    }
    let selected: Vec<_> = if names.iter().any(|n| n.eq_ignore_ascii_case("all")) {
        presets().iter().collect()
    } else {
        names.iter().map(|n| find_preset(n)).collect::<Result<_, _>>()?
    };
    Ok(selected
        .into_iter()
        .map(|p| Run {
            name: p.name.clone(),
            extractor: p.extractor,
            filter: p.filter,
            classifier: p.classifier,
            params: p.extractor_params(&base),
        })
        .collect())
}

fn load_samples(config: &Config) -> Result<SampleSet> {
    let records = read_sample_list(&config.samples)
        .with_context(|| format!("reading sample list {}", config.samples.display()))?;
    let source = DirectoryImageSource::new(config.sample_image_root());
    let preprocessor = Preprocessor::new(config.preprocess, config.crop);
    SampleSet::load(&records, &source, &preprocessor, config.max_images()).context("loading samples")
}

fn cmd_cross(config: &Config, preset_names: &[String], verbose: bool, json: bool) -> Result<()> {
    let runs = runs(config, preset_names)?;
    let samples = load_samples(config)?;
    if !json {
        println!(
            "{}",
            report::dataset_banner(
                effective_folds(config.folds, &samples),
                samples.persons(),
                samples.len(),
                config.preprocess
            )
        );
    }

    let mut summaries = Vec::with_capacity(runs.len());
    for run in &runs {
        let extractor = create_extractor(run.extractor, &run.params)?;
        let filter = create_filter(run.filter, &config.filter_params())?;
        let mut classifier = create_classifier(run.classifier);
        let result = cross_validate(
            &run.name,
            FeatureChain::new(extractor.as_ref(), filter.as_deref()),
            classifier.as_mut(),
            &samples,
            config.folds,
        )
        .with_context(|| format!("cross-validating {}", run.name))?;
        if verbose {
            for stats in &result.fold_stats {
                eprintln!("{}", report::fold_line(&run.name, stats));
            }
        }
        let summary = result.summary();
        if !json {
            println!("{}", report::cross_row(&summary));
        }
        summaries.push(summary);
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    }
    Ok(())
}

#[derive(Serialize)]
struct RocRun {
    name: String,
    path: PathBuf,
    points: Vec<RocPoint>,
}

fn cmd_roc(config: &Config, preset_names: &[String], json: bool) -> Result<()> {
    let runs = runs(config, preset_names)?;
    let samples = load_samples(config)?;
    let seed = config.seed.unwrap_or_else(|| rand::thread_rng().next_u64());
    tracing::info!(seed, "random generator seeded");
    let mut rng = StdRng::seed_from_u64(seed);

    let mut results = Vec::with_capacity(runs.len());
    for run in &runs {
        let extractor = create_extractor(run.extractor, &run.params)?;
        let filter = create_filter(run.filter, &config.filter_params())?;
        let mut classifier = create_classifier(run.classifier);
        let points = random_roc(
            &run.name,
            FeatureChain::new(extractor.as_ref(), filter.as_deref()),
            classifier.as_mut(),
            &samples,
            config.ratio,
            config.iterations,
            &mut rng,
        )
        .with_context(|| format!("roc sampling {}", run.name))?;
        let path = report::write_roc(&config.roc_dir, &run.name, &points)?;
        if !json {
            eprintln!("{}", run.name);
        }
        results.push(RocRun {
            name: run.name.clone(),
            path,
            points,
        });
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }
    Ok(())
}

fn cmd_pairs(config: &Config, json: bool) -> Result<()> {
    let pipeline_config = PipelineConfig {
        extractor: config.extractor,
        extractor_params: config.extractor_params(),
        filter: config.filter,
        filter_params: config.filter_params(),
        comparator: config.classifier,
        mode: config.mode,
        preprocess: config.preprocess,
        crop: config.crop,
        train_method: config.train_method,
        skip: config.skip,
    };
    let mut pipeline = FacePipeline::new(&pipeline_config)?;
    let dataset = PairDataset::load(&config.lfw_root)
        .with_context(|| format!("loading LFW pairs from {}", config.lfw_root.display()))?;
    let source = DirectoryImageSource::new(config.pair_image_root());

    let bench = run_pair_benchmark(&mut pipeline, &dataset, &source)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&bench)?);
    } else {
        for split in &bench.splits {
            println!("{}", report::split_line(split));
        }
        println!(
            "{}",
            report::pair_summary(config.extractor, config.filter, config.classifier, &bench)
        );
    }
    Ok(())
}
