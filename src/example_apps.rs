use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, error::ErrorKind};

use crate::config::PartitionConfig;
use crate::corpus::{CorpusStore, InMemoryCorpus, PartitionFilter};
use crate::distribution::DistributionIndex;
use crate::folds::Dataset;
use crate::labels::PredictionLabel;
use crate::metrics::label_skew;
use crate::orchestrator::{DatasetOrchestrator, PartitionedDataset};
use crate::sampler::SamplingMode;
use crate::types::SampleId;

#[derive(Debug, Parser)]
#[command(
    name = "partition_demo",
    disable_help_subcommand = true,
    about = "Partition a review corpus into training, grid-search, and test sets",
    long_about = "Load a JSON-lines review corpus, draw a held-out test set plus training and grid-search folds, and print fold sizes with per-label skew.",
    after_help = "Settings are resolved in order by explicit arg, then --config file, then built-in defaults. Set RUST_LOG=debug to trace each draw."
)]
/// CLI for `partition_demo`.
///
/// Common usage:
/// - Stratified 10-fold run: `--corpus reviews.jsonl --groups Arma_3,Dota_2`
/// - Even run over 5 derived bins: `--sampling even --bins 5`
/// - Cross-game test set: `--test-groups Football_Manager_2015 --test-size 200`
struct PartitionDemoCli {
    #[arg(
        long,
        value_name = "PATH",
        help = "JSON-lines corpus, one review document per line"
    )]
    corpus: PathBuf,
    #[arg(
        long,
        value_name = "PATH",
        help = "Optional JSON partition config used as the base for all other flags"
    )]
    config: Option<PathBuf>,
    #[arg(
        long,
        value_delimiter = ',',
        help = "Comma-separated training groups (defaults to every group in the corpus)"
    )]
    groups: Vec<String>,
    #[arg(
        long = "test-groups",
        value_delimiter = ',',
        help = "Comma-separated test groups (defaults to the training groups)"
    )]
    test_groups: Vec<String>,
    #[arg(long = "train-partition", help = "Partition filter for training: training, test, or all")]
    train_partition: Option<PartitionFilter>,
    #[arg(long = "test-partition", help = "Partition filter for the test set: training, test, or all")]
    test_partition: Option<PartitionFilter>,
    #[arg(long, help = "Prediction label, e.g. total_game_hours_bin")]
    label: Option<PredictionLabel>,
    #[arg(long, help = "Sampling mode: stratified or even")]
    sampling: Option<SamplingMode>,
    #[arg(long = "folds", help = "Number of training folds")]
    n_folds: Option<usize>,
    #[arg(long = "fold-size", help = "Target size of each training fold")]
    fold_size: Option<usize>,
    #[arg(long = "grid-search-folds", help = "Number of grid-search folds")]
    n_grid_search_folds: Option<usize>,
    #[arg(long = "grid-search-fold-size", help = "Target size of each grid-search fold")]
    grid_search_fold_size: Option<usize>,
    #[arg(long = "test-size", help = "Target test-set size (0 disables the test set)")]
    test_size: Option<usize>,
    #[arg(long = "bins", help = "Derive this many label bins from the corpus")]
    n_bins: Option<usize>,
    #[arg(long = "bin-factor", help = "Growth factor between successive derived bin widths")]
    bin_factor: Option<f64>,
    #[arg(long, conflicts_with = "power", help = "Apply a natural-log transform to labels")]
    lognormal: bool,
    #[arg(long, help = "Raise labels to this power")]
    power: Option<f64>,
    #[arg(long, help = "Maximum documents read per corpus query")]
    limit: Option<usize>,
    #[arg(long, help = "Optional deterministic seed override")]
    seed: Option<u64>,
}

impl PartitionDemoCli {
    fn resolve_config(self, corpus: &dyn CorpusStore) -> Result<PartitionConfig, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => PartitionConfig::from_json_path(path)?,
            None => PartitionConfig::default(),
        };
        if !self.groups.is_empty() {
            config.groups = self.groups;
        } else if config.groups.is_empty() {
            config.groups = corpus.groups().iter().cloned().collect();
        }
        if !self.test_groups.is_empty() {
            config.test_groups = self.test_groups;
        }
        config.train_partition = self.train_partition.unwrap_or(config.train_partition);
        config.test_partition = self.test_partition.unwrap_or(config.test_partition);
        config.label = self.label.unwrap_or(config.label);
        config.sampling = self.sampling.unwrap_or(config.sampling);
        config.n_folds = self.n_folds.unwrap_or(config.n_folds);
        config.fold_size = self.fold_size.unwrap_or(config.fold_size);
        config.n_grid_search_folds = self.n_grid_search_folds.unwrap_or(config.n_grid_search_folds);
        config.grid_search_fold_size = self
            .grid_search_fold_size
            .unwrap_or(config.grid_search_fold_size);
        config.test_size = self.test_size.unwrap_or(config.test_size);
        config.n_bins = self.n_bins.unwrap_or(config.n_bins);
        config.bin_factor = self.bin_factor.or(config.bin_factor);
        config.transform.lognormal |= self.lognormal;
        config.transform.power = self.power.or(config.transform.power);
        config.limit = self.limit.unwrap_or(config.limit);
        config.seed = self.seed.unwrap_or(config.seed);
        Ok(config)
    }
}

/// Run the partition demo over a JSON-lines corpus.
pub fn run_partition_demo<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) = parse_cli::<PartitionDemoCli, _>(
        std::iter::once("partition_demo".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let corpus = InMemoryCorpus::from_jsonl_path(&cli.corpus)?;
    println!(
        "Loaded {} documents across {} groups from {}",
        corpus.len(),
        corpus.groups().len(),
        cli.corpus.display()
    );
    let config = cli.resolve_config(&corpus)?;
    println!(
        "label={} sampling={} seed={} groups=[{}]",
        config.label,
        config.sampling,
        config.seed,
        config.groups.join(", ")
    );

    let orchestrator = DatasetOrchestrator::new(&corpus, config)?;
    println!("label transform: {}", orchestrator.train_transform().name());
    let dataset = orchestrator.build()?;
    print_partition(&dataset);
    Ok(())
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

fn print_partition(dataset: &PartitionedDataset) {
    println!(
        "=== indexed {} samples over {} labels ===",
        dataset.index.len(),
        dataset.index.distribution().len()
    );
    print_dataset(&dataset.training, &dataset.index);
    print_dataset(&dataset.grid_search, &dataset.index);
    if !dataset.test_set.is_empty() {
        println!("=== test set: {} samples ===", dataset.test_set.len());
        print_label_summary("test set", dataset.test_distribution_index(), &dataset.test_set);
    }
}

fn print_dataset(dataset: &Dataset, index: &DistributionIndex) {
    println!(
        "=== {}: {} of {} folds, {} samples ===",
        dataset.name,
        dataset.len(),
        dataset.requested,
        dataset.sample_count()
    );
    for (idx, fold) in dataset.folds.iter().enumerate() {
        println!("fold {}: {} samples", idx + 1, fold.len());
    }
    if !dataset.is_empty() {
        print_label_summary(&dataset.name, index, dataset.ids());
    }
}

fn print_label_summary<'a, I>(label: &str, index: &DistributionIndex, ids: I)
where
    I: IntoIterator<Item = &'a SampleId>,
{
    let Some(skew) = label_skew(index, ids) else {
        return;
    };
    println!("--- {} by label ---", label);
    for entry in &skew.per_label {
        println!(
            "{}: count={} share={:.2} corpus_share={:.2}",
            entry.label, entry.count, entry.share, entry.expected_share
        );
    }
    println!(
        "skew: labels={} total={} min={} max={} mean={:.2} ratio={:.2} max_drift={:.3}",
        skew.labels, skew.total, skew.min, skew.max, skew.mean, skew.ratio, skew.max_drift
    );
}
