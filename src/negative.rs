use crate::rng::Rng;
use crate::vocab::Vocabulary;

pub const TABLE_SIZE: usize = 100_000_000;
pub const POWER: f64 = 0.75;

/// Lookup table for drawing negative samples: word `i` fills a share of the
/// slots proportional to `count_i ^ 0.75`, so a uniformly random slot is a
/// draw from the smoothed unigram distribution.
///
/// Built once before training and only read afterwards.
#[derive(Debug, Clone)]
pub struct NegativeSamplingTable {
    table: Vec<u32>,
    vocab_len: usize,
}

impl NegativeSamplingTable {
    pub fn new(vocab: &Vocabulary, size: usize, power: f64) -> Self {
        let vocab_len = vocab.len();
        let mut table = Vec::with_capacity(size);
        if vocab_len == 0 {
            return NegativeSamplingTable { table, vocab_len };
        }
        let weight = |i: usize| (vocab.at(i).count as f64).powf(power);
        let train_words_pow = (0..vocab_len).map(weight).sum::<f64>();
        let train_words_pow = if train_words_pow > 0.0 { train_words_pow } else { 1.0 };

        let mut i = 0;
        let mut d1 = weight(i) / train_words_pow;
        for a in 0..size {
            table.push(i as u32);
            if (a as f64 / size as f64) > d1 {
                i += 1;
                if i < vocab_len {
                    d1 += weight(i) / train_words_pow;
                }
            }
            if i >= vocab_len {
                i = vocab_len - 1;
            }
        }
        NegativeSamplingTable { table, vocab_len }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn slot(&self, slot: usize) -> usize {
        self.table[slot] as usize
    }

    /// Draw one negative sample. Draws of the boundary symbol are replaced
    /// by a uniformly chosen word.
    pub fn draw(&self, rng: &mut Rng) -> usize {
        let r = rng.rand_u64();
        let target = self.table[(r >> 16) as usize % self.table.len()] as usize;
        if target == 0 && self.vocab_len > 1 {
            r as usize % (self.vocab_len - 1) + 1
        } else {
            target
        }
    }
}
