use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::Parser;

use paravec::{real, Corpus, EmbeddingTable, Model, ModelKind, Role, TrainConfig, Trainer, Vocabulary};

#[derive(Parser)]
#[command(about = "Word and paragraph vector training", long_about = None, version)]
struct Options {
    /// Use text data from FILE to train the model
    #[arg(long = "train", value_name = "FILE")]
    train_file: PathBuf,

    /// Use FILE to save the resulting word vectors (or, with --infer, the
    /// inferred paragraph vectors)
    #[arg(long = "output", value_name = "FILE")]
    output_file: PathBuf,

    /// Read training settings from a JSON file; flags below override it
    #[arg(long = "config", value_name = "FILE")]
    config_file: Option<PathBuf>,

    /// Network to train
    #[arg(long, value_enum)]
    arch: Option<ModelKind>,

    /// Set size of word vectors; default is 100
    #[arg(long = "size")]
    layer1_size: Option<usize>,

    /// Set max skip length between words; default is 5
    #[arg(long)]
    window: Option<usize>,

    /// Set threshold for occurrence of words. Those that appear with higher
    /// frequency in the training data will be randomly down-sampled; default
    /// is 1e-3, useful range is (0, 1e-5)
    #[arg(long)]
    sample: Option<real>,

    /// Use Hierarchical Softmax
    #[arg(long)]
    hs: bool,

    /// Number of negative examples; default is 5, common values are 3 - 10 (0 = not used)
    #[arg(long)]
    negative: Option<usize>,

    /// Use N threads
    #[arg(long = "threads", value_name = "N")]
    num_threads: Option<usize>,

    /// Run more training iterations; default is 5
    #[arg(long)]
    iter: Option<usize>,

    /// Discard words that appear less than N times; default is 5
    #[arg(long = "min-count", value_name = "N")]
    min_count: Option<u64>,

    /// Set the starting learning rate; default is 0.025 for skip-gram and
    /// PV-DBOW, 0.05 for CBOW and PV-DM
    #[arg(long)]
    alpha: Option<real>,

    /// PV-DM: concatenate the paragraph and window vectors instead of averaging
    #[arg(long)]
    concat: bool,

    /// The first token of each line is the paragraph's label
    #[arg(long)]
    labels: bool,

    /// Convert the training data to lower case
    #[arg(long)]
    lowercase: bool,

    /// Count pruned words as <unk> instead of dropping them
    #[arg(long)]
    replace_unknown: bool,

    /// Don't show a progress bar
    #[arg(long)]
    quiet: bool,

    /// Save the resulting vectors in binary mode
    #[arg(long)]
    binary: bool,

    /// The vocabulary will be saved to FILE
    #[arg(long = "save-vocab", value_name = "FILE")]
    save_vocab_file: Option<PathBuf>,

    /// The vocabulary will be read from FILE, not constructed from the training data
    #[arg(long = "read-vocab", value_name = "FILE")]
    read_vocab_file: Option<PathBuf>,

    /// Save the paragraph vectors to FILE
    #[arg(long = "paragraph-output", value_name = "FILE")]
    paragraph_file: Option<PathBuf>,

    /// Save the whole model to FILE
    #[arg(long = "model", value_name = "FILE")]
    model_file: Option<PathBuf>,

    /// Read and write models in bincode format
    #[arg(long)]
    snapshot: bool,

    /// Load a model from FILE instead of training a new one
    #[arg(long = "load", value_name = "FILE", requires = "infer")]
    load_file: Option<PathBuf>,

    /// Infer vectors for the paragraphs of the --train file with the loaded model
    #[arg(long, requires = "load_file")]
    infer: bool,
}

impl Options {
    fn config(&self) -> Result<TrainConfig> {
        let mut config = match &self.config_file {
            Some(path) => TrainConfig::load(path)?,
            None => TrainConfig::default(),
        };
        if let Some(arch) = self.arch {
            config.model = arch;
        }
        if let Some(size) = self.layer1_size {
            config.dim = size;
        }
        if let Some(window) = self.window {
            config.window = window;
        }
        if let Some(sample) = self.sample {
            config.sample = sample;
        }
        if let Some(negative) = self.negative {
            config.negative = negative;
        }
        if let Some(threads) = self.num_threads {
            config.threads = threads;
        }
        if let Some(iter) = self.iter {
            config.epochs = iter;
        }
        if let Some(min_count) = self.min_count {
            config.min_count = min_count;
        }
        if self.alpha.is_some() {
            config.alpha = self.alpha;
        }
        config.hs |= self.hs;
        config.concat |= self.concat;
        config.labels |= self.labels;
        config.lowercase |= self.lowercase;
        config.replace_unknown |= self.replace_unknown;
        config.progress &= !self.quiet;
        config.validate()?;
        Ok(config)
    }
}

fn save_table(table: Option<&EmbeddingTable>, path: &Path, binary: bool) -> Result<()> {
    let table = table.with_context(|| format!("model has no table to save in {}", path.display()))?;
    table.save(path, binary)
}

fn infer(options: &Options, corpus: &Corpus) -> Result<()> {
    let Some(path) = &options.load_file else {
        anyhow::bail!("--infer requires --load");
    };
    let mut model = if options.snapshot {
        Model::load_snapshot(path)?
    } else {
        Model::load(path)?
    };
    if let Some(threads) = options.num_threads {
        model.set_threads(threads);
    }
    model.set_progress(!options.quiet);
    if options.labels {
        model.set_labels(true);
    }
    if options.lowercase {
        model.set_lowercase(true);
    }
    if options.replace_unknown {
        model.set_replace_unknown(true);
    }

    let vectors = Trainer::new(&mut model).infer(corpus)?;
    let dim = model.config().dim;
    let values: Vec<real> = vectors.concat();
    let table = EmbeddingTable::from_values(Role::Paragraphs, vectors.len(), dim, &values);
    table.save(&options.output_file, options.binary)
}

fn train(options: &Options, corpus: &Corpus) -> Result<()> {
    let config = options.config()?;
    let mut model = match &options.read_vocab_file {
        Some(path) => Model::build_with_vocab(config, Vocabulary::load(path)?, corpus)?,
        None => Model::build(config, corpus)?,
    };
    if let Some(path) = &options.save_vocab_file {
        model.vocab().save(path)?;
    }

    let stats = Trainer::new(&mut model).train(corpus)?;
    tracing::info!(
        words = stats.words,
        error = stats.mean_error(),
        "saving to {}",
        options.output_file.display()
    );

    save_table(model.table(Role::Words), &options.output_file, options.binary)?;
    if let Some(path) = &options.paragraph_file {
        save_table(model.table(Role::Paragraphs), path, options.binary)?;
    }
    if let Some(path) = &options.model_file {
        if options.snapshot {
            model.save_snapshot(path)?;
        } else {
            model.save(path)?;
        }
    }
    Ok(())
}

fn run(options: &Options) -> Result<()> {
    let corpus = Corpus::open(&options.train_file)?;
    if options.infer {
        infer(options, &corpus)
    } else {
        train(options, &corpus)
    }
}

fn main() {
    let options = Options::parse();
    paravec::logging::init();

    if let Err(err) = run(&options) {
        eprintln!("{err:#}");
        process::exit(1);
    }
}
