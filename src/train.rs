//! The training engine: forward and backward passes for one context, and
//! the worker threads that run them over the corpus.

use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Instant;

use anyhow::{anyhow, Result};
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::TrainConfig;
use crate::context::{Context, ContextPool, Slot, WindowGenerator};
use crate::corpus::{Corpus, Shard};
use crate::linalg;
use crate::negative::{self, NegativeSamplingTable};
use crate::real;
use crate::rng::Rng;
use crate::schedule::RateTracker;
use crate::sigmoid::SigmoidTable;
use crate::table::{EmbeddingTable, Init, Role};
use crate::vocab::{self, ScanOptions, Vocabulary, UNKNOWN};
use crate::{Model, MAX_SENTENCE_LENGTH};

/// How often, in words, a worker reports progress and updates its
/// learning rate.
const REPORT_INTERVAL: u64 = 10_000;

/// Negative draws that keep hitting the true center are given up after
/// this many tries.
const MAX_RESAMPLE: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrainStats {
    /// Words read, including those dropped by subsampling.
    pub words: u64,
    pub contexts: u64,
    /// Output units trained (tree nodes and positive/negative samples).
    pub samples: u64,
    /// Sum of `|label - sigmoid(score)|` over all samples.
    pub error_sum: f64,
}

impl TrainStats {
    pub fn mean_error(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.error_sum / self.samples as f64
        }
    }

    pub fn merge(&mut self, other: &TrainStats) {
        self.words += other.words;
        self.contexts += other.contexts;
        self.samples += other.samples;
        self.error_sum += other.error_sum;
    }

    /// Statistics accumulated since `earlier`.
    fn since(&self, earlier: &TrainStats) -> TrainStats {
        TrainStats {
            words: self.words - earlier.words,
            contexts: self.contexts - earlier.contexts,
            samples: self.samples - earlier.samples,
            error_sum: self.error_sum - earlier.error_sum,
        }
    }
}

pub struct Trainer<'m> {
    model: &'m mut Model,
    negative: Option<NegativeSamplingTable>,
}

impl<'m> Trainer<'m> {
    pub fn new(model: &'m mut Model) -> Self {
        let config = model.config();
        let negative = (config.negative > 0).then(|| {
            NegativeSamplingTable::new(model.vocab(), config.negative_table_size, negative::POWER)
        });
        Trainer { model, negative }
    }

    /// Train the model on `corpus` for the configured number of epochs.
    pub fn train(&mut self, corpus: &Corpus) -> Result<TrainStats> {
        let model: &Model = &*self.model;
        let config = model.config();
        let corpus = corpus.clone().lowercase(config.lowercase);
        let paragraphs = match model.paragraphs() {
            Some(p) => {
                let rows = model.table(Role::Paragraphs).map_or(0, EmbeddingTable::rows);
                anyhow::ensure!(
                    rows == p.len(),
                    "paragraph table has {rows} rows for {} paragraphs",
                    p.len()
                );
                Some((p, 0))
            }
            None => None,
        };
        let shards = corpus.shards(config.threads)?;
        tracing::info!(
            "Starting training using file {}",
            corpus.path().display()
        );
        tracing::info!(
            model = ?config.model,
            vocab = model.vocab().len(),
            words = model.train_words(),
            threads = shards.len(),
            epochs = config.epochs,
            "training"
        );
        run(model, self.negative.as_ref(), &corpus, &shards, paragraphs, model.train_words())
    }

    /// Learn vectors for the paragraphs of `corpus` with every other weight
    /// held fixed, and return them in paragraph order. The model is left as
    /// it was.
    pub fn infer(&mut self, corpus: &Corpus) -> Result<Vec<Vec<real>>> {
        let config = self.model.config().clone();
        anyhow::ensure!(
            config.model.has_paragraphs(),
            "model type {:?} has no paragraph vectors",
            config.model
        );
        let corpus = corpus.clone().lowercase(config.lowercase);
        let shards = corpus.shards(config.threads)?;
        let options = ScanOptions {
            labels: config.labels,
            max_vocab: usize::MAX,
        };
        let scan = Vocabulary::scan(&corpus, &shards, options)?;
        let new = scan.paragraphs;
        let total_words = new.train_words() + scan.lines;

        let old_rows = match self.model.table(Role::Paragraphs) {
            Some(t) => t.rows(),
            None => anyhow::bail!("model has no paragraph table"),
        };
        let mut rng = Rng::new(config.seed ^ old_rows as u64);
        let was_frozen = self.freeze_fixed_tables();
        if let Some(t) = self.model.table_mut(Role::Paragraphs) {
            t.resize(old_rows + new.len(), Init::Uniform, &mut rng);
        }
        tracing::info!(paragraphs = new.len(), "inferring paragraph vectors");

        let model: &Model = &*self.model;
        let result = run(
            model,
            self.negative.as_ref(),
            &corpus,
            &shards,
            Some((&new, old_rows)),
            total_words,
        );

        let mut vectors = Vec::with_capacity(new.len());
        if let Some(t) = self.model.table_mut(Role::Paragraphs) {
            for i in 0..new.len() {
                vectors.push(t.row_view(old_rows + i).to_vec());
            }
            t.resize(old_rows, Init::Zero, &mut rng);
        }
        self.restore_frozen(was_frozen);
        let stats = result?;
        tracing::debug!(error = stats.mean_error(), "inference done");
        Ok(vectors)
    }

    /// Freeze every table but the paragraphs, returning their old flags.
    fn freeze_fixed_tables(&mut self) -> [bool; 3] {
        FIXED_ROLES.map(|role| match self.model.table_mut(role) {
            Some(t) => {
                let was = t.is_frozen();
                t.set_frozen(true);
                was
            }
            None => false,
        })
    }

    fn restore_frozen(&mut self, was_frozen: [bool; 3]) {
        for (role, frozen) in FIXED_ROLES.into_iter().zip(was_frozen) {
            if let Some(t) = self.model.table_mut(role) {
                t.set_frozen(frozen);
            }
        }
    }
}

const FIXED_ROLES: [Role; 3] = [Role::Words, Role::HierarchicalSoftmax, Role::NegativeSampling];

/// State shared by all workers. Everything here is read-only except the
/// tables (see `table::Real`) and the progress counter.
struct Shared<'a> {
    config: &'a TrainConfig,
    corpus: &'a Corpus,
    vocab: &'a Vocabulary,
    unknown: Option<usize>,
    /// Paragraph labels and the table row of the first one.
    paragraphs: Option<(&'a Vocabulary, usize)>,
    words: &'a EmbeddingTable,
    paragraph_table: Option<&'a EmbeddingTable>,
    hs: Option<&'a EmbeddingTable>,
    ns: Option<(&'a EmbeddingTable, &'a NegativeSamplingTable)>,
    generator: WindowGenerator,
    total_words: u64,
    sample_words: u64,
    word_count_actual: AtomicU64,
    progress: ProgressBar,
}

impl<'a> Shared<'a> {
    /// The table and row a window slot reads.
    fn table_for(&self, slot: Slot) -> (&'a EmbeddingTable, usize) {
        match slot {
            Slot::Word(i) => (self.words, i),
            Slot::Paragraph(i) => match self.paragraph_table {
                Some(t) => (t, i),
                None => unreachable!("paragraph slot without a paragraph table"),
            },
        }
    }
}

fn run(
    model: &Model,
    negative: Option<&NegativeSamplingTable>,
    corpus: &Corpus,
    shards: &[Shard],
    paragraphs: Option<(&Vocabulary, usize)>,
    total_words: u64,
) -> Result<TrainStats> {
    let config = model.config();
    let words = model
        .table(Role::Words)
        .ok_or_else(|| anyhow!("model has no word table"))?;
    let ns = match (model.table(Role::NegativeSampling), negative) {
        (Some(t), Some(n)) if !n.is_empty() => Some((t, n)),
        _ => None,
    };
    let vocab = model.vocab();
    if config.hs {
        anyhow::ensure!(vocab.is_encoded(), "vocabulary has no Huffman codes");
    }

    let len = config.epochs as u64 * total_words;
    let progress = if config.progress {
        let bar = ProgressBar::new(len);
        bar.set_style(ProgressStyle::with_template(
            "{elapsed_precise} [{bar:40}] {percent}% {per_sec} {msg}",
        )?);
        bar
    } else {
        ProgressBar::hidden()
    };

    let shared = Shared {
        config,
        corpus,
        vocab,
        unknown: if config.replace_unknown {
            vocab.index_of(UNKNOWN)
        } else {
            None
        },
        paragraphs,
        words,
        paragraph_table: model.table(Role::Paragraphs),
        hs: model.table(Role::HierarchicalSoftmax).filter(|_| config.hs),
        ns,
        generator: WindowGenerator::from_config(config),
        total_words,
        sample_words: model.train_words(),
        word_count_actual: AtomicU64::new(0),
        progress,
    };

    let start = Instant::now();
    let results = thread::scope(|s| {
        let shared = &shared;
        let threads = shards
            .iter()
            .map(|shard| s.spawn(move || Worker::new(shared, shard.id).run(shard)))
            .collect::<Vec<_>>();
        threads
            .into_iter()
            .map(|t| {
                t.join()
                    .unwrap_or_else(|_| Err(anyhow!("worker thread panicked")))
            })
            .collect::<Vec<Result<TrainStats>>>()
    });
    shared.progress.finish_and_clear();

    let mut stats = TrainStats::default();
    for result in results {
        stats.merge(&result?);
    }
    tracing::info!(
        words = stats.words,
        contexts = stats.contexts,
        error = stats.mean_error(),
        seconds = start.elapsed().as_secs_f64(),
        "training finished"
    );
    Ok(stats)
}

/// Per-thread scratch space. Nothing here is shared.
struct Worker<'a> {
    shared: &'a Shared<'a>,
    id: usize,
    rng: Rng,
    sigmoid: SigmoidTable,
    rate: RateTracker,
    hidden: Vec<real>,
    grad: Vec<real>,
    pool: ContextPool,
    line: Vec<usize>,
    /// Word rows of the current window.
    indices: Vec<usize>,
    stats: TrainStats,
    warned: bool,
}

impl<'a> Worker<'a> {
    fn new(shared: &'a Shared<'a>, id: usize) -> Self {
        let config = shared.config;
        let hidden = config.hidden_size();
        Worker {
            shared,
            id,
            rng: Rng::for_worker(config.seed, id),
            sigmoid: SigmoidTable::default(),
            rate: RateTracker::new(config.schedule, config.starting_alpha()),
            hidden: vec![0.0; hidden],
            grad: vec![0.0; hidden],
            pool: ContextPool::new(),
            line: Vec::with_capacity(MAX_SENTENCE_LENGTH),
            indices: Vec::new(),
            stats: TrainStats::default(),
            warned: false,
        }
    }

    fn run(mut self, shard: &Shard) -> Result<TrainStats> {
        let shared = self.shared;
        let config = shared.config;
        let mut reader = shared.corpus.reader(shard)?;
        let mut word_count: u64 = 0;
        let mut last_word_count: u64 = 0;

        for epoch in 0..config.epochs {
            if epoch > 0 {
                reader.rewind()?;
            }
            self.rate.start_epoch(epoch, config.epochs);
            let at_start = self.stats;
            let mut ordinal = shard.first_line;
            let mut line = mem::take(&mut self.line);

            while let Some(mut tokens) = reader.next_line()? {
                let label = if config.labels { tokens.next() } else { None };
                let paragraph = shared.paragraphs.and_then(|(p, offset)| {
                    let i = match label {
                        Some(label) => p.index_of(label),
                        None => p.index_of(&vocab::paragraph_label(ordinal)),
                    };
                    i.map(|i| i + offset)
                });
                ordinal += 1;

                line.clear();
                for token in tokens {
                    let Some(word) = shared.vocab.index_of(token).or(shared.unknown) else {
                        continue;
                    };
                    word_count += 1;
                    if self.keep(word) {
                        line.push(word);
                    }
                }
                // the boundary symbol
                word_count += 1;

                if word_count - last_word_count > REPORT_INTERVAL {
                    self.report(word_count - last_word_count);
                    last_word_count = word_count;
                }
                if shared.paragraphs.is_some() && paragraph.is_none() {
                    continue;
                }
                for segment in line.chunks(MAX_SENTENCE_LENGTH) {
                    self.train_segment(segment, paragraph);
                }
            }

            self.line = line;
            let epoch_stats = self.stats.since(&at_start);
            self.rate.end_epoch(epoch_stats.mean_error());
            tracing::debug!(
                worker = self.id,
                epoch,
                rate = self.rate.rate(),
                error = epoch_stats.mean_error(),
                "epoch finished"
            );
        }

        self.report(word_count - last_word_count);
        self.stats.words = word_count;
        Ok(self.stats)
    }

    /// Subsampling of frequent words: keeps the ranking the same while
    /// discarding a share of the most common words.
    fn keep(&mut self, word: usize) -> bool {
        let sample = self.shared.config.sample;
        if sample <= 0.0 {
            return true;
        }
        let f = self.shared.vocab.at(word).count as real;
        if f <= 0.0 {
            return true;
        }
        let k = sample * self.shared.sample_words as real;
        let ran = ((f / k).sqrt() + 1.0) * k / f;
        ran >= self.rng.rand_real()
    }

    fn report(&mut self, words: u64) {
        let shared = self.shared;
        let word_count_actual = shared.word_count_actual.fetch_add(words, Ordering::Relaxed) + words;
        self.rate
            .progress(word_count_actual, shared.total_words, shared.config.epochs);
        shared.progress.set_position(word_count_actual);
        if self.id == 0 {
            shared.progress.set_message(format!("alpha {:.6}", self.rate.rate()));
        }
    }

    fn train_segment(&mut self, segment: &[usize], paragraph: Option<usize>) {
        let shared = self.shared;
        let mut pool = mem::take(&mut self.pool);
        let contexts = shared
            .generator
            .generate(segment, paragraph, &mut self.rng, &mut pool);
        for ctx in contexts {
            self.train_context(ctx);
        }
        self.pool = pool;
    }

    /// One forward/backward pass for one context.
    fn train_context(&mut self, ctx: &Context) {
        debug_assert!(ctx.size() > 0, "empty context window");
        self.stats.contexts += 1;
        let shared = self.shared;
        let config = shared.config;

        if config.model.averages_window() {
            let dim = config.dim;
            let mut words = mem::take(&mut self.indices);
            words.clear();
            let mut paragraph = None;
            for &slot in &ctx.window {
                match slot {
                    Slot::Word(w) => words.push(w),
                    Slot::Paragraph(_) => paragraph = Some(shared.table_for(slot)),
                }
            }

            // the paragraph comes first in a concatenated window
            let offset = if paragraph.is_some() { dim } else { 0 };
            if config.concat {
                if let Some((table, p)) = paragraph {
                    table.read_row(p, &mut self.hidden[..dim]);
                }
                shared.words.forward_lookup_concat(&words, &mut self.hidden[offset..]);
            } else if let Some((table, p)) = paragraph {
                shared.words.forward_lookup_sum(&words, &mut self.hidden);
                linalg::axpy_from_cells(1.0, table.row(p), &mut self.hidden);
                linalg::scale(&mut self.hidden, 1.0 / ctx.size() as real);
            } else {
                shared.words.forward_lookup_average(&words, &mut self.hidden);
            }

            self.grad.fill(0.0);
            self.output(ctx.center);

            if config.concat {
                if let Some((table, p)) = paragraph {
                    table.backward_direct(p, &self.grad[..dim]);
                }
                for (&w, chunk) in words.iter().zip(self.grad[offset..].chunks(dim)) {
                    shared.words.backward_direct(w, chunk);
                }
            } else {
                if let Some((table, p)) = paragraph {
                    table.backward_direct(p, &self.grad);
                }
                for &w in &words {
                    shared.words.backward_direct(w, &self.grad);
                }
            }
            self.indices = words;
        } else {
            for &slot in &ctx.window {
                let (table, row) = shared.table_for(slot);
                table.read_row(row, &mut self.hidden);
                self.grad.fill(0.0);
                self.output(ctx.center);
                table.backward_direct(row, &self.grad);
            }
        }
    }

    /// Train the output layers to predict `target` from `self.hidden`,
    /// accumulating the gradient with respect to the hidden layer in
    /// `self.grad`.
    fn output(&mut self, target: usize) {
        let shared = self.shared;
        let rate = self.rate.rate();

        if let Some(hs) = shared.hs {
            if let Some(code) = &shared.vocab.at(target).huffman {
                for (bit, node) in code.decisions() {
                    let score = hs.forward_dot(node, &self.hidden);
                    // saturated: no gradient
                    let Some(out) = self.sigmoid.get_unclipped(score) else {
                        continue;
                    };
                    let label = 1.0 - bit as real;
                    let g = (label - out) * rate;
                    self.record(label, out);
                    hs.backward_accumulate(node, g, &self.hidden, &mut self.grad);
                }
            }
        }

        if let Some((ns, table)) = shared.ns {
            for d in 0..=shared.config.negative {
                let (sample, label) = if d == 0 {
                    (target, 1.0)
                } else {
                    match self.draw_negative(table, target) {
                        Some(sample) => (sample, 0.0),
                        None => continue,
                    }
                };
                let out = self.sigmoid.get(ns.forward_dot(sample, &self.hidden));
                let g = (label - out) * rate;
                self.record(label, out);
                ns.backward_accumulate(sample, g, &self.hidden, &mut self.grad);
            }
        }

        if shared.config.check_numerics && !self.warned && !self.grad.iter().all(|g| g.is_finite()) {
            self.warned = true;
            tracing::warn!(worker = self.id, target, "gradient is not finite");
        }
    }

    fn draw_negative(&mut self, table: &NegativeSamplingTable, target: usize) -> Option<usize> {
        (0..MAX_RESAMPLE)
            .map(|_| table.draw(&mut self.rng))
            .find(|&sample| sample != target)
    }

    fn record(&mut self, label: real, out: real) {
        self.stats.samples += 1;
        self.stats.error_sum += (label - out).abs() as f64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelKind;
    use crate::vocab::EntryKind;
    use std::io::Write;

    fn corpus(lines: &[&str]) -> (tempfile::NamedTempFile, Corpus) {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
        f.flush().unwrap();
        let c = Corpus::open(f.path()).unwrap();
        (f, c)
    }

    fn config(model: ModelKind) -> TrainConfig {
        TrainConfig {
            model,
            dim: 8,
            window: 2,
            sample: 0.0,
            hs: true,
            negative: 3,
            threads: 2,
            epochs: 2,
            min_count: 1,
            negative_table_size: 10_000,
            progress: false,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn stats_merge_and_mean() {
        let mut a = TrainStats::default();
        assert_eq!(a.mean_error(), 0.0);
        a.merge(&TrainStats {
            words: 3,
            contexts: 2,
            samples: 4,
            error_sum: 2.0,
        });
        assert_eq!(a.mean_error(), 0.5);
    }

    #[test]
    fn hierarchical_softmax_trains_tree_nodes() {
        let mut vocab = Vocabulary::new();
        vocab.insert("a", EntryKind::Word, 5);
        vocab.insert("b", EntryKind::Word, 3);
        vocab.sort();
        let c = TrainConfig {
            negative: 0,
            check_numerics: true,
            ..config(ModelKind::Cbow)
        };
        let mut model = Model::new(c, vocab, None).unwrap();
        let (_f, corpus) = corpus(&["a b a b a b"]);
        let before = model.table(Role::HierarchicalSoftmax).unwrap().to_vec();
        let stats = Trainer::new(&mut model).train(&corpus).unwrap();
        assert!(stats.samples > 0);
        assert!(stats.mean_error() > 0.0 && stats.mean_error() < 1.0);
        assert_ne!(model.table(Role::HierarchicalSoftmax).unwrap().to_vec(), before);
    }

    #[test]
    fn frozen_tables_do_not_change() {
        let (_f, corpus) = corpus(&["x y z x y z", "z y x"]);
        let mut model = Model::build(config(ModelKind::Skipgram), &corpus).unwrap();
        for role in [Role::Words, Role::HierarchicalSoftmax, Role::NegativeSampling] {
            model.table_mut(role).unwrap().set_frozen(true);
        }
        let before = model.table(Role::Words).unwrap().to_vec();
        let stats = Trainer::new(&mut model).train(&corpus).unwrap();
        assert!(stats.contexts > 0);
        assert_eq!(model.table(Role::Words).unwrap().to_vec(), before);
    }

    #[test]
    fn counts_every_known_word_and_subsamples_frequent_ones() {
        let lines: Vec<String> = (0..200).map(|i| format!("a a a a b{}", i % 4)).collect();
        let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
        let (_f, corpus) = corpus(&lines);

        let mut model = Model::build(config(ModelKind::Cbow), &corpus).unwrap();
        let all = Trainer::new(&mut model).train(&corpus).unwrap();
        // five tokens and a boundary per line, twice
        assert_eq!(all.words, 2 * 200 * 6);
        assert_eq!(all.contexts, 2 * 200 * 5);

        let c = TrainConfig {
            sample: 1e-3,
            ..config(ModelKind::Cbow)
        };
        let mut model = Model::build(c, &corpus).unwrap();
        let sampled = Trainer::new(&mut model).train(&corpus).unwrap();
        assert_eq!(sampled.words, all.words);
        assert!(sampled.contexts < all.contexts / 2, "{sampled:?}");
    }

    #[test]
    fn unknown_words_train_only_when_replaced() {
        let lines: Vec<String> = (0..100).map(|i| format!("a b c once{i}")).collect();
        let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
        let (_f, corpus) = corpus(&lines);

        let c = TrainConfig {
            min_count: 2,
            replace_unknown: true,
            ..config(ModelKind::Cbow)
        };
        let mut model = Model::build(c, &corpus).unwrap();
        assert_eq!(model.vocab().lookup(UNKNOWN).unwrap().count, 100);
        let replaced = Trainer::new(&mut model).train(&corpus).unwrap();
        assert_eq!(replaced.words, 2 * 100 * 5);
        assert_eq!(replaced.contexts, 2 * 100 * 4);

        let c = TrainConfig {
            min_count: 2,
            ..config(ModelKind::Cbow)
        };
        let mut model = Model::build(c, &corpus).unwrap();
        assert!(model.vocab().lookup(UNKNOWN).is_none());
        let skipped = Trainer::new(&mut model).train(&corpus).unwrap();
        assert_eq!(skipped.words, 2 * 100 * 4);
        assert_eq!(skipped.contexts, 2 * 100 * 3);
    }

    #[test]
    fn lines_without_paragraph_are_skipped() {
        let (_f, corpus) = corpus(&["p q r s", "q r s p"]);
        let mut model = Model::build(config(ModelKind::Pvdbow), &corpus).unwrap();
        model.drop_paragraphs();
        let stats = Trainer::new(&mut model).train(&corpus).unwrap();
        assert_eq!(stats.contexts, 0);
        assert_eq!(stats.words, 2 * 10);
    }
}
