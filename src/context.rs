//! Turning a line of vocabulary indices into training examples.

use crate::config::{ModelKind, TrainConfig};
use crate::rng::Rng;

/// One input of a context's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Row of the word table.
    Word(usize),
    /// Row of the paragraph table.
    Paragraph(usize),
}

/// A training example: predict `center` from the rows in `window`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    pub center: usize,
    pub window: Vec<Slot>,
    left: usize,
    right: usize,
}

impl Context {
    pub fn size(&self) -> usize {
        self.window.len()
    }

    /// Number of words taken from before the center.
    pub fn left_len(&self) -> usize {
        self.left
    }

    /// Number of words taken from after the center.
    pub fn right_len(&self) -> usize {
        self.right
    }

    fn reset(&mut self, center: usize) {
        self.center = center;
        self.window.clear();
        self.left = 0;
        self.right = 0;
    }
}

/// Contexts reused from line to line, so the training loop does not
/// allocate once the pool has grown to the longest line.
#[derive(Debug, Default)]
pub struct ContextPool {
    contexts: Vec<Context>,
    len: usize,
}

impl ContextPool {
    pub fn new() -> Self {
        ContextPool::default()
    }

    fn clear(&mut self) {
        self.len = 0;
    }

    fn next(&mut self, center: usize) -> &mut Context {
        if self.len == self.contexts.len() {
            self.contexts.push(Context::default());
        }
        let ctx = &mut self.contexts[self.len];
        self.len += 1;
        ctx.reset(center);
        ctx
    }

    pub fn as_slice(&self) -> &[Context] {
        &self.contexts[..self.len]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WindowGenerator {
    kind: ModelKind,
    before: usize,
    after: usize,
    randomize: bool,
    /// Keep every window the same width by filling positions past the ends
    /// of the line with the boundary symbol (index 0).
    padding: bool,
}

impl WindowGenerator {
    pub fn new(kind: ModelKind, before: usize, after: usize, randomize: bool, padding: bool) -> Self {
        let after = if kind == ModelKind::Pvdm { 0 } else { after };
        WindowGenerator {
            kind,
            before,
            after,
            randomize: randomize && !padding,
            padding,
        }
    }

    pub fn from_config(config: &TrainConfig) -> Self {
        WindowGenerator::new(
            config.model,
            config.window,
            config.window_after(),
            config.randomize_window,
            config.concat,
        )
    }

    /// Width of every window when padding is on.
    pub fn padded_width(&self) -> usize {
        self.before + self.after + usize::from(self.kind == ModelKind::Pvdm)
    }

    /// Generate the contexts of `line` (vocabulary indices) into `pool`, one
    /// per token. `paragraph` is required by the paragraph models and
    /// ignored by the others.
    pub fn generate<'p>(
        &self,
        line: &[usize],
        paragraph: Option<usize>,
        rng: &mut Rng,
        pool: &'p mut ContextPool,
    ) -> &'p [Context] {
        pool.clear();
        if line.len() < 2 {
            return pool.as_slice();
        }
        if self.kind.has_paragraphs() && paragraph.is_none() {
            debug_assert!(false, "paragraph models need a paragraph for every line");
            return pool.as_slice();
        }

        for (pos, &center) in line.iter().enumerate() {
            let ctx = pool.next(center);
            match self.kind {
                ModelKind::Pvdbow => {
                    ctx.window.extend(paragraph.map(Slot::Paragraph));
                    continue;
                }
                ModelKind::Pvdm => ctx.window.extend(paragraph.map(Slot::Paragraph)),
                ModelKind::Cbow | ModelKind::Skipgram => {}
            }

            let (before, after) = if self.randomize {
                (
                    if self.before > 0 { 1 + rng.below(self.before) } else { 0 },
                    if self.after > 0 { 1 + rng.below(self.after) } else { 0 },
                )
            } else {
                (self.before, self.after)
            };

            if self.padding {
                for k in (1..=before).rev() {
                    ctx.window.push(Slot::Word(pos.checked_sub(k).map_or(0, |i| line[i])));
                }
                for k in 1..=after {
                    ctx.window.push(Slot::Word(line.get(pos + k).copied().unwrap_or(0)));
                }
                ctx.left = before.min(pos);
                ctx.right = after.min(line.len() - pos - 1);
            } else {
                let lo = pos.saturating_sub(before);
                let hi = (pos + after + 1).min(line.len());
                ctx.window.extend(line[lo..pos].iter().map(|&w| Slot::Word(w)));
                ctx.window.extend(line[pos + 1..hi].iter().map(|&w| Slot::Word(w)));
                ctx.left = pos - lo;
                ctx.right = hi - pos - 1;
            }
        }
        pool.as_slice()
    }
}
