//! The vocabulary: every distinct token with its frequency, sorted so that
//! frequent words get small indices.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::corpus::{Corpus, Shard};
use crate::huffman::{self, HuffmanCode};

/// Sentence-boundary symbol, counted once per line and pinned to index 0.
pub const BOUNDARY: &str = "</s>";

/// Aggregate of pruned words, when pruning replaces instead of dropping.
pub const UNKNOWN: &str = "<unk>";

/// Prefix of the generated label of an unlabeled paragraph.
pub const PARAGRAPH_PREFIX: &str = "_*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Word,
    Paragraph,
    /// The boundary and unknown-word symbols. Never pruned.
    Special,
}

impl EntryKind {
    fn of_symbol(symbol: &str) -> Self {
        if symbol == BOUNDARY || symbol == UNKNOWN {
            EntryKind::Special
        } else {
            EntryKind::Word
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabEntry {
    pub symbol: String,
    pub count: u64,
    /// Position in the vocabulary. Dense rank by descending count once the
    /// vocabulary is sorted.
    pub index: usize,
    pub kind: EntryKind,
    /// Set by `encode_huffman`; cleared whenever the entry set changes.
    pub huffman: Option<HuffmanCode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    entries: Vec<VocabEntry>,
    #[serde(skip)]
    hash: HashMap<String, usize>,
    sorted: bool,
    /// Threshold of the next mid-scan pruning pass.
    min_reduce: u64,
}

/// Options for `Vocabulary::scan`.
#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    /// The first token of each line is a paragraph label, not a word.
    pub labels: bool,
    /// Prune rare words during the scan when a partial vocabulary grows
    /// beyond this many entries.
    pub max_vocab: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            labels: false,
            max_vocab: 21_000_000,
        }
    }
}

/// Result of scanning a corpus.
#[derive(Debug, Clone, Default)]
pub struct Scan {
    pub words: Vocabulary,
    /// One entry per paragraph, in corpus order. Its `index` is the
    /// paragraph's row in the paragraph table.
    pub paragraphs: Vocabulary,
    pub lines: u64,
}

impl Scan {
    fn new() -> Self {
        Scan {
            words: Vocabulary::new(),
            paragraphs: Vocabulary::empty(),
            lines: 0,
        }
    }

    fn merge(mut self, other: Scan) -> Scan {
        self.words.merge(other.words);
        self.paragraphs.merge(other.paragraphs);
        self.lines += other.lines;
        self
    }
}

/// Label of paragraph `ordinal` when the corpus carries no labels.
pub fn paragraph_label(ordinal: u64) -> String {
    format!("{PARAGRAPH_PREFIX}{ordinal}")
}

impl Vocabulary {
    /// A vocabulary holding only the boundary symbol.
    pub fn new() -> Self {
        let mut vocab = Vocabulary::empty();
        vocab.insert(BOUNDARY, EntryKind::Special, 0);
        vocab
    }

    /// A vocabulary with no entries at all, for paragraph labels.
    pub fn empty() -> Self {
        Vocabulary {
            entries: Vec::new(),
            hash: HashMap::new(),
            sorted: false,
            min_reduce: 1,
        }
    }

    /// Count the tokens of `corpus`, one partial vocabulary per shard, in
    /// parallel, then merge the partial vocabularies pairwise. The result
    /// is not sorted.
    pub fn scan(corpus: &Corpus, shards: &[Shard], options: ScanOptions) -> Result<Scan> {
        shards
            .par_iter()
            .map(|shard| Vocabulary::scan_shard(corpus, shard, options))
            .try_reduce(Scan::new, |a, b| Ok(a.merge(b)))
    }

    fn scan_shard(corpus: &Corpus, shard: &Shard, options: ScanOptions) -> Result<Scan> {
        let mut scan = Scan::new();
        let mut reader = corpus.reader(shard)?;
        let mut ordinal = shard.first_line;
        while let Some(mut tokens) = reader.next_line()? {
            let label = if options.labels {
                tokens.next().map(str::to_string)
            } else {
                Some(paragraph_label(ordinal))
            };
            let mut n = 0;
            for token in tokens {
                scan.words.add(token);
                n += 1;
                if scan.words.len() > options.max_vocab {
                    scan.words.prune_rare();
                }
            }
            scan.words.add(BOUNDARY);
            if let Some(label) = label {
                scan.paragraphs.insert(&label, EntryKind::Paragraph, n);
            }
            scan.lines += 1;
            ordinal += 1;
        }
        Ok(scan)
    }

    /// Increment the count of `symbol`, adding it if new.
    pub fn add(&mut self, symbol: &str) -> usize {
        self.insert(symbol, EntryKind::of_symbol(symbol), 1)
    }

    /// Add `count` to `symbol`, inserting it with `kind` if new.
    pub fn insert(&mut self, symbol: &str, kind: EntryKind, count: u64) -> usize {
        if let Some(&i) = self.hash.get(symbol) {
            self.entries[i].count += count;
            self.invalidate();
            return i;
        }
        let i = self.entries.len();
        self.entries.push(VocabEntry {
            symbol: symbol.to_string(),
            count,
            index: i,
            kind,
            huffman: None,
        });
        self.hash.insert(symbol.to_string(), i);
        self.invalidate();
        i
    }

    fn invalidate(&mut self) {
        if self.sorted {
            self.sorted = false;
            for e in &mut self.entries {
                e.huffman = None;
            }
        }
    }

    /// Multiset union: counts of shared symbols are summed, new symbols are
    /// appended in `other`'s order.
    pub fn merge(&mut self, other: Vocabulary) {
        for e in other.entries {
            self.insert(&e.symbol, e.kind, e.count);
        }
        self.min_reduce = self.min_reduce.max(other.min_reduce);
        self.invalidate();
    }

    /// Reduces the vocabulary by removing infrequent tokens. Each call
    /// raises the bar for the next one.
    pub fn prune_rare(&mut self) {
        let min_reduce = self.min_reduce;
        self.entries
            .retain(|e| e.kind == EntryKind::Special || e.count > min_reduce);
        self.min_reduce += 1;
        self.reindex();
    }

    /// Remove words seen fewer than `min_count` times, then sort. With
    /// `replace`, their counts are summed into the `<unk>` entry instead of
    /// being dropped. Special entries are never removed.
    pub fn reduce(&mut self, min_count: u64, replace: bool) {
        let mut pruned = 0;
        self.entries.retain(|e| {
            let keep = e.kind != EntryKind::Word || e.count >= min_count;
            if !keep {
                pruned += e.count;
            }
            keep
        });
        self.reindex();
        if replace && pruned > 0 {
            self.insert(UNKNOWN, EntryKind::Special, pruned);
        }
        self.sort();
    }

    /// Sort by descending count, keeping the boundary symbol first, and
    /// assign indices.
    pub fn sort(&mut self) {
        if let Some(b) = self.entries.iter().position(|e| e.symbol == BOUNDARY) {
            self.entries.swap(0, b);
            self.entries[1..].sort_by_key(|e| Reverse(e.count));
        } else {
            self.entries.sort_by_key(|e| Reverse(e.count));
        }
        self.reindex();
        for e in &mut self.entries {
            e.huffman = None;
        }
        self.sorted = true;
    }

    /// Hash will be re-computed, as it is not actual after moving entries.
    fn reindex(&mut self) {
        self.hash.clear();
        for (i, e) in self.entries.iter_mut().enumerate() {
            e.index = i;
            self.hash.insert(e.symbol.clone(), i);
        }
    }

    /// Rebuild the symbol index after deserializing.
    pub(crate) fn rehash(&mut self) {
        self.hash = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.symbol.clone(), i))
            .collect();
    }

    /// Assign every entry its Huffman code and path.
    ///
    /// *Panics* if the vocabulary is not sorted.
    pub fn encode_huffman(&mut self) {
        assert!(self.sorted, "vocabulary must be sorted before Huffman encoding");
        let counts: Vec<u64> = self.entries.iter().map(|e| e.count).collect();
        for (e, code) in self.entries.iter_mut().zip(huffman::encode(&counts)) {
            e.huffman = Some(code);
        }
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn is_encoded(&self) -> bool {
        !self.entries.is_empty() && self.entries.iter().all(|e| e.huffman.is_some())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, symbol: &str) -> Option<&VocabEntry> {
        self.index_of(symbol).map(|i| &self.entries[i])
    }

    /// Returns position of a symbol in the vocabulary, if present.
    pub fn index_of(&self, symbol: &str) -> Option<usize> {
        self.hash.get(symbol).copied()
    }

    /// *Panics* if `index` is out of range.
    pub fn at(&self, index: usize) -> &VocabEntry {
        &self.entries[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &VocabEntry> + '_ {
        self.entries.iter()
    }

    /// Sum of all counts.
    pub fn train_words(&self) -> u64 {
        self.entries.iter().map(|e| e.count).sum()
    }

    /// Writes one `"{symbol} {count}"` line per entry, in index order.
    pub fn write_entries<W: Write>(&self, out: &mut W) -> Result<()> {
        for e in &self.entries {
            writeln!(out, "{} {}", e.symbol, e.count).context("error writing vocab file")?;
        }
        Ok(())
    }

    /// Reads `n` lines written by `write_entries` (all of them if `n` is
    /// `None`), keeping their order.
    pub fn read_entries<R: BufRead>(input: &mut R, n: Option<usize>, kind: Option<EntryKind>) -> Result<Self> {
        let mut vocab = Vocabulary::empty();
        let mut line = String::new();
        let mut line_num = 0;
        while n.map_or(true, |n| vocab.len() < n) {
            line.clear();
            let read = input
                .read_line(&mut line)
                .context("error reading vocabulary file")?;
            line_num += 1;
            if read == 0 {
                anyhow::ensure!(n.is_none(), "vocabulary is truncated at line {line_num}");
                break;
            }
            let fields = line.split_whitespace().collect::<Vec<&str>>();
            anyhow::ensure!(
                fields.len() == 2,
                "vocabulary file syntax error on line {line_num}"
            );
            let count = fields[1].parse::<u64>().with_context(|| {
                format!("error reading vocabulary file: unrecognized frequency number format on line {line_num}")
            })?;
            let kind = kind.unwrap_or_else(|| EntryKind::of_symbol(fields[0]));
            vocab.insert(fields[0], kind, count);
        }
        Ok(vocab)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut out = BufWriter::new(
            File::create(path).context("error creating vocab file for write")?,
        );
        self.write_entries(&mut out)?;
        out.flush().context("error writing vocab file")?;
        Ok(())
    }

    /// Load a saved word vocabulary and sort it.
    pub fn load(path: &Path) -> Result<Self> {
        let mut input = BufReader::new(File::open(path).context("error opening vocabulary file")?);
        let mut vocab = Vocabulary::read_entries(&mut input, None, None)?;
        if vocab.index_of(BOUNDARY).is_none() {
            vocab.insert(BOUNDARY, EntryKind::Special, 0);
        }
        vocab.sort();
        Ok(vocab)
    }

    /// Mark a vocabulary read back in saved order as sorted.
    pub(crate) fn assume_sorted(&mut self) {
        self.reindex();
        self.sorted = true;
    }
}
