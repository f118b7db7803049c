//! A trained (or trainable) model: vocabularies plus an ordered list of
//! layers.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::{ModelKind, TrainConfig};
use crate::corpus::Corpus;
use crate::layer::{Layer, LayerTag, LinearLayer};
use crate::linalg;
use crate::real;
use crate::rng::Rng;
use crate::table::{EmbeddingTable, Init, Role};
use crate::vocab::{EntryKind, ScanOptions, Vocabulary, UNKNOWN};

#[derive(Debug)]
pub struct Model {
    config: TrainConfig,
    vocab: Vocabulary,
    /// Present for the paragraph models. Entry `i` owns row `i` of the
    /// paragraph table.
    paragraphs: Option<Vocabulary>,
    /// Lookup tables in the order words, paragraphs, hierarchical softmax,
    /// negative sampling (each only if used), then any linear layers.
    layers: Vec<Layer>,
    train_words: u64,
}

impl Model {
    /// Count the words of `corpus`, drop the rare ones and set up a fresh
    /// model for it.
    pub fn build(config: TrainConfig, corpus: &Corpus) -> Result<Self> {
        config.validate()?;
        let corpus = corpus.clone().lowercase(config.lowercase);
        let shards = corpus.shards(config.threads)?;
        let options = ScanOptions {
            labels: config.labels,
            max_vocab: config.max_vocab,
        };
        let scan = Vocabulary::scan(&corpus, &shards, options)?;
        tracing::info!(
            lines = scan.lines,
            symbols = scan.words.len(),
            "scanned {}",
            corpus.path().display()
        );
        let mut vocab = scan.words;
        vocab.reduce(config.min_count, config.replace_unknown);
        let paragraphs = config.model.has_paragraphs().then_some(scan.paragraphs);
        Model::new(config, vocab, paragraphs)
    }

    /// Use a saved vocabulary instead of counting the corpus. Paragraphs
    /// (if the model has them) are still taken from the corpus.
    pub fn build_with_vocab(config: TrainConfig, mut vocab: Vocabulary, corpus: &Corpus) -> Result<Self> {
        config.validate()?;
        vocab.reduce(config.min_count, config.replace_unknown);
        let paragraphs = if config.model.has_paragraphs() {
            let corpus = corpus.clone().lowercase(config.lowercase);
            let shards = corpus.shards(config.threads)?;
            let options = ScanOptions {
                labels: config.labels,
                max_vocab: usize::MAX,
            };
            Some(Vocabulary::scan(&corpus, &shards, options)?.paragraphs)
        } else {
            None
        };
        Model::new(config, vocab, paragraphs)
    }

    /// Allocate and initialize the tables for a sorted vocabulary.
    pub fn new(config: TrainConfig, mut vocab: Vocabulary, paragraphs: Option<Vocabulary>) -> Result<Self> {
        config.validate()?;
        anyhow::ensure!(vocab.is_sorted(), "vocabulary must be sorted");
        anyhow::ensure!(
            paragraphs.is_some() == config.model.has_paragraphs(),
            "paragraph vocabulary does not match model type {:?}",
            config.model
        );
        if config.hs && !vocab.is_encoded() {
            vocab.encode_huffman();
        }

        let mut rng = Rng::new(config.seed);
        let v = vocab.len();
        let dim = config.dim;
        let hidden = config.hidden_size();
        let mut layers = vec![Layer::Lookup(EmbeddingTable::new(
            Role::Words,
            v,
            dim,
            Init::Uniform,
            &mut rng,
        ))];
        if let Some(p) = &paragraphs {
            layers.push(Layer::Lookup(EmbeddingTable::new(
                Role::Paragraphs,
                p.len(),
                dim,
                Init::Uniform,
                &mut rng,
            )));
        }
        if config.hs {
            layers.push(Layer::Lookup(EmbeddingTable::new(
                Role::HierarchicalSoftmax,
                v.saturating_sub(1),
                hidden,
                Init::Zero,
                &mut rng,
            )));
        }
        if config.negative > 0 {
            layers.push(Layer::Lookup(EmbeddingTable::new(
                Role::NegativeSampling,
                v,
                hidden,
                Init::Zero,
                &mut rng,
            )));
        }

        let train_words = vocab.train_words();
        tracing::debug!(vocab = v, train_words, layers = layers.len(), "initialized model");
        Ok(Model {
            config,
            vocab,
            paragraphs,
            layers,
            train_words,
        })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Number of worker threads for the next training run.
    pub fn set_threads(&mut self, threads: usize) {
        self.config.threads = threads.max(1);
    }

    pub fn set_progress(&mut self, progress: bool) {
        self.config.progress = progress;
    }

    /// Whether the first token of each line names its paragraph.
    pub fn set_labels(&mut self, labels: bool) {
        self.config.labels = labels;
    }

    pub fn set_lowercase(&mut self, lowercase: bool) {
        self.config.lowercase = lowercase;
    }

    /// Map out-of-vocabulary tokens to `<unk>`. Has no effect unless the
    /// vocabulary contains it.
    pub fn set_replace_unknown(&mut self, replace: bool) {
        self.config.replace_unknown = replace;
    }

    pub fn kind(&self) -> ModelKind {
        self.config.model
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn paragraphs(&self) -> Option<&Vocabulary> {
        self.paragraphs.as_ref()
    }

    /// Total count of all vocabulary entries.
    pub fn train_words(&self) -> u64 {
        self.train_words
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn table(&self, role: Role) -> Option<&EmbeddingTable> {
        self.layers
            .iter()
            .filter_map(Layer::as_table)
            .find(|t| t.role() == role)
    }

    pub fn table_mut(&mut self, role: Role) -> Option<&mut EmbeddingTable> {
        self.layers
            .iter_mut()
            .filter_map(Layer::as_table_mut)
            .find(|t| t.role() == role)
    }

    /// Append a linear layer, e.g. a classifier over paragraph vectors.
    pub fn push_linear(&mut self, inputs: usize, outputs: usize) -> &mut LinearLayer {
        let mut rng = Rng::new(self.config.seed ^ self.layers.len() as u64);
        self.layers
            .push(Layer::Linear(LinearLayer::new(inputs, outputs, &mut rng)));
        match self.layers.last_mut() {
            Some(Layer::Linear(l)) => l,
            _ => unreachable!(),
        }
    }

    /// Vector of `word`, if it is in the vocabulary.
    pub fn word_vector(&mut self, word: &str) -> Option<&[real]> {
        let i = self.vocab.index_of(word)?;
        Some(self.table_mut(Role::Words)?.row_view(i))
    }

    /// The `n` words closest to `word` by cosine similarity, best first.
    pub fn nearest(&mut self, word: &str, n: usize) -> Option<Vec<(String, real)>> {
        let target = self.vocab.index_of(word)?;
        let table = self.table_mut(Role::Words)?;
        let cols = table.cols();
        let mut query = table.row_view(target).to_vec();
        linalg::normalize(&mut query);

        let mut row = vec![0.0; cols];
        let mut scored: Vec<(usize, real)> = (1..table.rows())
            .filter(|&i| i != target)
            .map(|i| {
                table.read_row(i, &mut row);
                linalg::normalize(&mut row);
                (i, linalg::dot(&query, &row))
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(n);
        Some(
            scored
                .into_iter()
                .map(|(i, sim)| (self.vocab.at(i).symbol.clone(), sim))
                .collect(),
        )
    }

    /// Forget all paragraphs, keeping an empty paragraph table.
    pub fn drop_paragraphs(&mut self) {
        if let Some(p) = &mut self.paragraphs {
            *p = Vocabulary::empty();
            let mut rng = Rng::new(self.config.seed);
            if let Some(t) = self.table_mut(Role::Paragraphs) {
                t.resize(0, Init::Zero, &mut rng);
            }
        }
    }

    fn lookup_roles(&self) -> Vec<Role> {
        let mut roles = vec![Role::Words];
        if self.paragraphs.is_some() {
            roles.push(Role::Paragraphs);
        }
        if self.config.hs {
            roles.push(Role::HierarchicalSoftmax);
        }
        if self.config.negative > 0 {
            roles.push(Role::NegativeSampling);
        }
        roles
    }

    /// Writes the model: a header line of settings, the layer count and
    /// types, the vocabulary (and paragraph vocabulary), then every layer's
    /// binary dump in order.
    pub fn write<W: Write>(&self, out: &mut W) -> Result<()> {
        let c = &self.config;
        writeln!(
            out,
            "{} {} {} {} {} {} {} {} {} {} {} {} {}",
            c.model.code(),
            u8::from(self.paragraphs.is_some()),
            c.window,
            c.sample,
            c.starting_alpha(),
            u8::from(c.hs),
            c.negative,
            c.epochs,
            c.dim,
            self.train_words,
            u8::from(c.concat),
            u8::from(c.labels),
            u8::from(c.lowercase),
        )
        .context("error writing model")?;
        let tags: Vec<&str> = self.layers.iter().map(|l| l.tag().name()).collect();
        writeln!(out, "{}\n{}", self.layers.len(), tags.join(" ")).context("error writing model")?;
        writeln!(out, "{}", self.vocab.len()).context("error writing model")?;
        self.vocab.write_entries(out)?;
        if let Some(p) = &self.paragraphs {
            writeln!(out, "{}", p.len()).context("error writing model")?;
            p.write_entries(out)?;
        }
        for layer in &self.layers {
            layer.write_binary(out)?;
        }
        Ok(())
    }

    pub fn read<R: BufRead>(input: &mut R) -> Result<Self> {
        let mut line = String::new();
        input.read_line(&mut line).context("error reading model header")?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        anyhow::ensure!(fields.len() >= 10, "invalid model header");
        let model = ModelKind::from_code(parse(fields[0])?)
            .ok_or_else(|| anyhow!("unknown model type {}", fields[0]))?;
        let has_paragraphs = parse_flag(fields[1])?;
        let mut config = TrainConfig {
            model,
            window: parse(fields[2])?,
            sample: parse(fields[3])?,
            alpha: Some(parse(fields[4])?),
            hs: parse_flag(fields[5])?,
            negative: parse(fields[6])?,
            epochs: parse(fields[7])?,
            dim: parse(fields[8])?,
            ..TrainConfig::default()
        };
        let train_words: u64 = parse(fields[9])?;
        if let Some(f) = fields.get(10) {
            config.concat = parse_flag(f)?;
        }
        if let Some(f) = fields.get(11) {
            config.labels = parse_flag(f)?;
        }
        if let Some(f) = fields.get(12) {
            config.lowercase = parse_flag(f)?;
        }
        anyhow::ensure!(
            has_paragraphs == model.has_paragraphs(),
            "model type {model:?} does not match paragraph flag"
        );

        let num_layers: usize = read_count(input)?;
        line.clear();
        input.read_line(&mut line).context("error reading model layer types")?;
        let tags = line
            .split_whitespace()
            .map(LayerTag::parse)
            .collect::<Result<Vec<LayerTag>>>()?;
        anyhow::ensure!(
            tags.len() == num_layers,
            "model declares {num_layers} layers but lists {} types",
            tags.len()
        );

        let n = read_count(input)?;
        let mut vocab = Vocabulary::read_entries(input, Some(n), None)?;
        vocab.assume_sorted();
        config.replace_unknown = vocab.index_of(UNKNOWN).is_some();
        if config.hs {
            vocab.encode_huffman();
        }
        let paragraphs = if has_paragraphs {
            let n = read_count(input)?;
            Some(Vocabulary::read_entries(input, Some(n), Some(EntryKind::Paragraph))?)
        } else {
            None
        };

        let mut model = Model {
            config,
            vocab,
            paragraphs,
            layers: Vec::with_capacity(tags.len()),
            train_words,
        };
        let roles = model.lookup_roles();
        let mut next_role = roles.iter();
        for (k, &tag) in tags.iter().enumerate() {
            let role = match tag {
                LayerTag::Lookup => *next_role
                    .next()
                    .ok_or_else(|| anyhow!("model has too many lookup layers"))?,
                LayerTag::Linear => Role::Words,
            };
            let layer = Layer::read_binary(input, tag, role)
                .with_context(|| format!("error reading model layer {k}"))?;
            model.layers.push(layer);
        }
        anyhow::ensure!(next_role.next().is_none(), "model is missing lookup layers");
        model.check_shapes()?;
        Ok(model)
    }

    fn check_shapes(&self) -> Result<()> {
        let v = self.vocab.len();
        let hidden = self.config.hidden_size();
        for table in self.layers.iter().filter_map(Layer::as_table) {
            let (rows, cols) = match table.role() {
                Role::Words => (v, self.config.dim),
                Role::Paragraphs => (
                    self.paragraphs.as_ref().map_or(0, Vocabulary::len),
                    self.config.dim,
                ),
                Role::HierarchicalSoftmax => (v.saturating_sub(1), hidden),
                Role::NegativeSampling => (v, hidden),
            };
            if (table.rows(), table.cols()) != (rows, cols) {
                bail!(
                    "{:?} table is {}x{}, expected {rows}x{cols}",
                    table.role(),
                    table.rows(),
                    table.cols()
                );
            }
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut out = BufWriter::new(
            File::create(path).with_context(|| format!("error creating model file {}", path.display()))?,
        );
        self.write(&mut out)?;
        out.flush().context("error writing model")?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut input = BufReader::new(
            File::open(path).with_context(|| format!("error opening model file {}", path.display()))?,
        );
        Model::read(&mut input).with_context(|| format!("error loading model {}", path.display()))
    }

    /// Save everything, settings included, in `bincode` format.
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let snapshot = Snapshot {
            config: self.config.clone(),
            vocab: self.vocab.clone(),
            paragraphs: self.paragraphs.clone(),
            train_words: self.train_words,
            layers: self.layers.iter().map(LayerData::from_layer).collect(),
        };
        let out = BufWriter::new(
            File::create(path).with_context(|| format!("error creating snapshot {}", path.display()))?,
        );
        bincode::serialize_into(out, &snapshot).context("error writing snapshot")?;
        Ok(())
    }

    pub fn load_snapshot(path: &Path) -> Result<Self> {
        let input = BufReader::new(
            File::open(path).with_context(|| format!("error opening snapshot {}", path.display()))?,
        );
        let snapshot: Snapshot = bincode::deserialize_from(input)
            .with_context(|| format!("error reading snapshot {}", path.display()))?;
        let Snapshot {
            config,
            mut vocab,
            mut paragraphs,
            train_words,
            layers,
        } = snapshot;
        vocab.rehash();
        if let Some(p) = &mut paragraphs {
            p.rehash();
        }
        let model = Model {
            config,
            vocab,
            paragraphs,
            layers: layers
                .into_iter()
                .map(LayerData::into_layer)
                .collect::<Result<Vec<Layer>>>()?,
            train_words,
        };
        model.check_shapes()?;
        Ok(model)
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    config: TrainConfig,
    vocab: Vocabulary,
    paragraphs: Option<Vocabulary>,
    train_words: u64,
    layers: Vec<LayerData>,
}

#[derive(Serialize, Deserialize)]
enum LayerData {
    Lookup {
        role: Role,
        rows: usize,
        cols: usize,
        values: Vec<real>,
    },
    Linear {
        inputs: usize,
        outputs: usize,
        weights: Vec<real>,
        bias: Vec<real>,
    },
}

impl LayerData {
    fn from_layer(layer: &Layer) -> Self {
        match layer {
            Layer::Lookup(t) => LayerData::Lookup {
                role: t.role(),
                rows: t.rows(),
                cols: t.cols(),
                values: t.to_vec(),
            },
            Layer::Linear(l) => LayerData::Linear {
                inputs: l.inputs(),
                outputs: l.outputs(),
                weights: l.weights().iter().copied().collect(),
                bias: l.bias().to_vec(),
            },
        }
    }

    fn into_layer(self) -> Result<Layer> {
        Ok(match self {
            LayerData::Lookup {
                role,
                rows,
                cols,
                values,
            } => {
                anyhow::ensure!(values.len() == rows * cols, "snapshot table has the wrong size");
                Layer::Lookup(EmbeddingTable::from_values(role, rows, cols, &values))
            }
            LayerData::Linear {
                inputs,
                outputs,
                weights,
                bias,
            } => Layer::Linear(LinearLayer::from_parts(
                ndarray::Array2::from_shape_vec((outputs, inputs), weights)?,
                ndarray::Array1::from(bias),
            )),
        })
    }
}

fn parse<T>(field: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    field
        .parse()
        .with_context(|| format!("invalid model header field {field:?}"))
}

fn parse_flag(field: &str) -> Result<bool> {
    match field {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => bail!("invalid model header flag {field:?}"),
    }
}

fn read_count<R: BufRead>(input: &mut R) -> Result<usize> {
    let mut line = String::new();
    input.read_line(&mut line).context("error reading model")?;
    line.trim()
        .parse()
        .with_context(|| format!("invalid count {:?} in model", line.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn vocab() -> Vocabulary {
        let mut v = Vocabulary::new();
        for (w, c) in [("the", 10), ("cat", 4), ("sat", 3), ("mat", 1)] {
            v.insert(w, EntryKind::Word, c);
        }
        v.sort();
        v
    }

    fn paragraphs(n: u64) -> Vocabulary {
        let mut p = Vocabulary::empty();
        for i in 0..n {
            p.insert(&crate::vocab::paragraph_label(i), EntryKind::Paragraph, 3);
        }
        p
    }

    fn config(model: ModelKind) -> TrainConfig {
        TrainConfig {
            model,
            dim: 4,
            window: 2,
            hs: true,
            negative: 2,
            threads: 1,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn layer_order_and_shapes() {
        let m = Model::new(config(ModelKind::Pvdm), vocab(), Some(paragraphs(3))).unwrap();
        let roles: Vec<Role> = m.layers().iter().filter_map(Layer::as_table).map(|t| t.role()).collect();
        assert_eq!(
            roles,
            [Role::Words, Role::Paragraphs, Role::HierarchicalSoftmax, Role::NegativeSampling]
        );
        assert_eq!(m.table(Role::HierarchicalSoftmax).unwrap().rows(), 4);
        assert_eq!(m.table(Role::Paragraphs).unwrap().rows(), 3);
        assert!(m.vocab().is_encoded());
        assert_eq!(m.train_words(), 18);
    }

    #[test]
    fn paragraphs_must_match_model() {
        assert!(Model::new(config(ModelKind::Cbow), vocab(), Some(paragraphs(1))).is_err());
        assert!(Model::new(config(ModelKind::Pvdbow), vocab(), None).is_err());
    }

    #[test]
    fn concat_widens_output_tables() {
        let c = TrainConfig {
            concat: true,
            ..config(ModelKind::Pvdm)
        };
        let m = Model::new(c, vocab(), Some(paragraphs(2))).unwrap();
        assert_eq!(m.table(Role::Words).unwrap().cols(), 4);
        assert_eq!(m.table(Role::NegativeSampling).unwrap().cols(), 12);
    }

    #[test]
    fn write_read_is_exact() {
        let mut m = Model::new(config(ModelKind::Pvdbow), vocab(), Some(paragraphs(2))).unwrap();
        m.push_linear(4, 3);
        let mut buf = vec![];
        m.write(&mut buf).unwrap();
        let back = Model::read(&mut Cursor::new(buf)).unwrap();

        assert_eq!(back.kind(), ModelKind::Pvdbow);
        assert_eq!(back.train_words(), m.train_words());
        assert_eq!(back.config().starting_alpha(), m.config().starting_alpha());
        assert_eq!(back.vocab().at(1).symbol, "the");
        assert_eq!(back.paragraphs().unwrap().len(), 2);
        assert_eq!(back.layers().len(), m.layers().len());
        for (a, b) in m.layers().iter().zip(back.layers()) {
            match (a, b) {
                (Layer::Lookup(a), Layer::Lookup(b)) => {
                    assert_eq!(a.role(), b.role());
                    let x: Vec<u32> = a.to_vec().iter().map(|v| v.to_bits()).collect();
                    let y: Vec<u32> = b.to_vec().iter().map(|v| v.to_bits()).collect();
                    assert_eq!(x, y);
                }
                (Layer::Linear(a), Layer::Linear(b)) => assert_eq!(a, b),
                _ => panic!("layer types differ"),
            }
        }
    }

    #[test]
    fn snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let m = Model::new(config(ModelKind::Skipgram), vocab(), None).unwrap();
        m.save_snapshot(&path).unwrap();
        let back = Model::load_snapshot(&path).unwrap();
        assert_eq!(back.config(), m.config());
        assert_eq!(back.vocab().index_of("cat"), m.vocab().index_of("cat"));
        assert_eq!(
            back.table(Role::Words).unwrap().to_vec(),
            m.table(Role::Words).unwrap().to_vec()
        );
    }

    #[test]
    fn drop_paragraphs_empties_table() {
        let mut m = Model::new(config(ModelKind::Pvdm), vocab(), Some(paragraphs(5))).unwrap();
        m.drop_paragraphs();
        assert_eq!(m.paragraphs().unwrap().len(), 0);
        assert_eq!(m.table(Role::Paragraphs).unwrap().rows(), 0);
        let mut buf = vec![];
        m.write(&mut buf).unwrap();
        assert!(Model::read(&mut Cursor::new(buf)).is_ok());
    }

    #[test]
    fn corrupt_header_is_an_error() {
        let err = Model::read(&mut Cursor::new(b"7 0 5\n".to_vec())).unwrap_err();
        assert!(err.to_string().contains("invalid model header"));
        let err = Model::read(&mut Cursor::new(b"9 0 5 0.001 0.05 1 5 5 100 10\n".to_vec())).unwrap_err();
        assert!(err.to_string().contains("unknown model type"));
    }

    #[test]
    fn reading_keeps_line_options() {
        let mut v = vocab();
        v.insert(UNKNOWN, EntryKind::Special, 2);
        v.sort();
        let c = TrainConfig {
            labels: true,
            lowercase: true,
            replace_unknown: true,
            ..config(ModelKind::Pvdbow)
        };
        let m = Model::new(c, v, Some(paragraphs(2))).unwrap();
        let mut buf = vec![];
        m.write(&mut buf).unwrap();
        let back = Model::read(&mut Cursor::new(buf)).unwrap();
        assert!(back.config().labels);
        assert!(back.config().lowercase);
        assert!(back.config().replace_unknown);

        let m = Model::new(config(ModelKind::Pvdbow), vocab(), Some(paragraphs(2))).unwrap();
        let mut buf = vec![];
        m.write(&mut buf).unwrap();
        let back = Model::read(&mut Cursor::new(buf)).unwrap();
        assert!(!back.config().labels);
        assert!(!back.config().replace_unknown);
    }

    #[test]
    fn huge_layer_count_is_an_error() {
        let m = Model::new(config(ModelKind::Cbow), vocab(), None).unwrap();
        let mut buf = vec![];
        m.write(&mut buf).unwrap();
        let text = String::from_utf8_lossy(&buf).into_owned();
        let header = text.lines().next().unwrap();
        let corrupt = format!("{header}\n18446744073709551615\nlookup\n");
        assert!(Model::read(&mut Cursor::new(corrupt.into_bytes())).is_err());

        let corrupt = format!("{header}\n1\nlookup\n5\n</s> 0\nthe 10\ncat 4\nsat 3\nmat 1\n4611686018427387904 8\n");
        let err = Model::read(&mut Cursor::new(corrupt.into_bytes())).unwrap_err();
        assert!(format!("{err:#}").contains("too large"));
    }

    #[test]
    fn nearest_excludes_query_and_boundary() {
        let mut m = Model::new(config(ModelKind::Cbow), vocab(), None).unwrap();
        let near = m.nearest("cat", 2).unwrap();
        assert_eq!(near.len(), 2);
        assert!(near.iter().all(|(w, _)| w != "cat" && w != crate::vocab::BOUNDARY));
        assert!(near[0].1 >= near[1].1);
        assert!(near.iter().all(|&(_, sim)| (-1.0001..=1.0001).contains(&sim)));
        assert!(m.nearest("dog", 2).is_none());
    }

    #[test]
    fn word_vector_lookup() {
        let mut m = Model::new(config(ModelKind::Cbow), vocab(), None).unwrap();
        assert_eq!(m.word_vector("cat").map(<[real]>::len), Some(4));
        assert!(m.word_vector("dog").is_none());
    }
}
