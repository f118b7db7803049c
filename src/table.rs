//! Embedding tables: dense row-major weight matrices shared by all workers.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::process;
use std::sync::atomic::{AtomicU32, Ordering};

use aligned_box::AlignedBox;
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::linalg;
use crate::real;
use crate::rng::Rng;

const ALIGNMENT: usize = 128;

/// One weight in a shared table.
///
/// Training threads read and write weights concurrently with no locks
/// (asynchronous "Hogwild" SGD). Each weight is a relaxed atomic, so every
/// individual load and store is well-defined, but `add` is a plain
/// load-then-store: two threads adding to the same weight at once can lose
/// one of the updates. Updates are small and collisions rare, and training
/// still converges.
#[derive(Default)]
#[repr(transparent)]
pub struct Real {
    bits: AtomicU32,
}

impl Real {
    pub fn get(&self) -> real {
        real::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn set(&self, value: real) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn add(&self, x: real) {
        let a = self.get();
        self.set(a + x);
    }
}

/// What a table is used for. Determines its place in a saved model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Input vectors of vocabulary words; the learned embeddings.
    Words,
    /// One vector per paragraph (line) of the corpus.
    Paragraphs,
    /// One vector per internal node of the Huffman tree.
    HierarchicalSoftmax,
    /// Output vectors of vocabulary words for negative sampling.
    NegativeSampling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Init {
    Zero,
    /// Uniform in `[-0.5 / cols, 0.5 / cols)`.
    Uniform,
}

pub struct EmbeddingTable {
    role: Role,
    rows: usize,
    cols: usize,
    /// A frozen table is read during training but never written.
    frozen: bool,
    /// `cells[k * cols..(k+1) * cols]` is row `k`.
    cells: AlignedBox<[Real]>,
}

impl fmt::Debug for EmbeddingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingTable")
            .field("role", &self.role)
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("frozen", &self.frozen)
            .finish()
    }
}

/// Allocation failure happens only while setting up a model, before any
/// work is done, so it is not recoverable.
fn alloc_cells(len: usize) -> AlignedBox<[Real]> {
    match AlignedBox::slice_from_default(ALIGNMENT, len.max(1)) {
        Ok(cells) => cells,
        Err(err) => {
            tracing::error!(len, "memory allocation failed: {err}");
            process::abort();
        }
    }
}

impl EmbeddingTable {
    pub fn new(role: Role, rows: usize, cols: usize, init: Init, rng: &mut Rng) -> Self {
        let table = EmbeddingTable {
            role,
            rows,
            cols,
            frozen: false,
            cells: alloc_cells(rows * cols),
        };
        table.initialize(0, init, rng);
        table
    }

    /// Build a table from row-major `values`.
    pub fn from_values(role: Role, rows: usize, cols: usize, values: &[real]) -> Self {
        assert_eq!(values.len(), rows * cols, "table shape does not match data");
        let cells = alloc_cells(rows * cols);
        for (c, &v) in cells.iter().zip(values) {
            c.set(v);
        }
        EmbeddingTable {
            role,
            rows,
            cols,
            frozen: false,
            cells,
        }
    }

    fn initialize(&self, first_row: usize, init: Init, rng: &mut Rng) {
        if init == Init::Uniform {
            let cols = self.cols as real;
            for c in &self.cells[first_row * self.cols..self.rows * self.cols] {
                c.set((rng.rand_real() - 0.5) / cols);
            }
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    fn cells(&self) -> &[Real] {
        &self.cells[..self.rows * self.cols]
    }

    pub fn row(&self, index: usize) -> &[Real] {
        debug_assert!(index < self.rows, "row {index} out of range 0..{}", self.rows);
        &self.cells[index * self.cols..][..self.cols]
    }

    /// Copy row `index` into `out`.
    pub fn read_row(&self, index: usize, out: &mut [real]) {
        linalg::load_cells(self.row(index), out);
    }

    /// Read-only view of the whole table.
    ///
    /// Taking `&mut self` guarantees no training thread is writing.
    pub fn as_slice(&mut self) -> &[real] {
        let cells = &self.cells[..self.rows * self.cols];
        // SAFETY: `Real` is a transparent wrapper around `AtomicU32`, which
        // has the same size, alignment and bit validity as `u32`, and every
        // `u32` bit pattern is a valid `f32`. The exclusive borrow of `self`
        // rules out concurrent atomic access for the lifetime of the result.
        unsafe { std::slice::from_raw_parts(cells.as_ptr() as *const real, cells.len()) }
    }

    pub fn row_view(&mut self, index: usize) -> &[real] {
        let cols = self.cols;
        &self.as_slice()[index * cols..][..cols]
    }

    pub fn to_vec(&self) -> Vec<real> {
        self.cells().iter().map(Real::get).collect()
    }

    /// `out = Σ table[i]` over `indices`.
    pub fn forward_lookup_sum(&self, indices: &[usize], out: &mut [real]) {
        debug_assert_eq!(out.len(), self.cols);
        out.fill(0.0);
        for &i in indices {
            linalg::axpy_from_cells(1.0, self.row(i), out);
        }
    }

    /// `out` = average of the selected rows.
    pub fn forward_lookup_average(&self, indices: &[usize], out: &mut [real]) {
        self.forward_lookup_sum(indices, out);
        if !indices.is_empty() {
            linalg::scale(out, 1.0 / indices.len() as real);
        }
    }

    /// `out` = the selected rows laid end to end.
    pub fn forward_lookup_concat(&self, indices: &[usize], out: &mut [real]) {
        debug_assert_eq!(out.len(), indices.len() * self.cols);
        for (&i, chunk) in indices.iter().zip(out.chunks_mut(self.cols)) {
            self.read_row(i, chunk);
        }
    }

    pub fn forward_dot(&self, index: usize, input: &[real]) -> real {
        linalg::dot_cells(self.row(index), input)
    }

    /// Backpropagate a score gradient through `table[index] · input`.
    ///
    /// Adds `grad * table[index]` to `acc` (the gradient with respect to
    /// `input`) and, unless the table is frozen, adds `grad * input` to the
    /// row in place. Must read the row before writing it.
    pub fn backward_accumulate(&self, index: usize, grad: real, input: &[real], acc: &mut [real]) {
        let row = self.row(index);
        linalg::axpy_from_cells(grad, row, acc);
        if !self.frozen {
            linalg::axpy_cells(grad, input, row);
        }
    }

    /// Add `delta` to row `index` unless the table is frozen.
    pub fn backward_direct(&self, index: usize, delta: &[real]) {
        if !self.frozen {
            linalg::axpy_cells(1.0, delta, self.row(index));
        }
    }

    /// Change the number of rows. Existing rows up to `min(old, new)` are
    /// kept; new rows are initialized with `init`.
    pub fn resize(&mut self, new_rows: usize, init: Init, rng: &mut Rng) {
        let cells = alloc_cells(new_rows * self.cols);
        let keep = self.rows.min(new_rows) * self.cols;
        for (new, old) in cells.iter().zip(&self.cells[..keep]) {
            new.set(old.get());
        }
        let old_rows = self.rows;
        self.cells = cells;
        self.rows = new_rows;
        if new_rows > old_rows {
            self.initialize(old_rows, init, rng);
        }
    }

    /// Writes the `"{rows} {cols}\n"` header and raw little-endian `f32`s.
    pub fn write_binary<W: Write>(&self, out: &mut W) -> Result<()> {
        write_binary_matrix(out, self.rows, self.cols, self.cells().iter().map(Real::get))
    }

    pub fn read_binary<R: BufRead>(input: &mut R, role: Role) -> Result<Self> {
        let (rows, cols, values) = read_binary_matrix(input)?;
        Ok(EmbeddingTable::from_values(role, rows, cols, &values))
    }

    /// Writes the header, then one line of space-separated numbers per row.
    pub fn write_text<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(out, "{} {}", self.rows, self.cols).context("error writing table")?;
        for k in 0..self.rows {
            let line = self
                .row(k)
                .iter()
                .map(|c| c.get().to_string())
                .collect::<Vec<String>>()
                .join(" ");
            writeln!(out, "{line}").context("error writing table")?;
        }
        Ok(())
    }

    pub fn read_text<R: BufRead>(input: &mut R, role: Role) -> Result<Self> {
        let (rows, cols, len) = read_header(input)?;
        let mut values = Vec::with_capacity(len.min(READ_CHUNK));
        let mut line = String::new();
        for k in 0..rows {
            line.clear();
            if input.read_line(&mut line).context("error reading table")? == 0 {
                bail!("error reading table: file is truncated at row {k}");
            }
            let before = values.len();
            for field in line.split_whitespace() {
                values.push(
                    field
                        .parse::<real>()
                        .with_context(|| format!("invalid number on table row {k}"))?,
                );
            }
            anyhow::ensure!(
                values.len() - before == cols,
                "table row {k} has {} values, expected {cols}",
                values.len() - before
            );
        }
        Ok(EmbeddingTable::from_values(role, rows, cols, &values))
    }

    pub fn save(&self, path: &Path, binary: bool) -> Result<()> {
        let mut out = BufWriter::new(
            File::create(path).with_context(|| format!("error creating {}", path.display()))?,
        );
        if binary {
            self.write_binary(&mut out)?;
        } else {
            self.write_text(&mut out)?;
        }
        out.flush().context("error writing table")?;
        Ok(())
    }

    pub fn load(path: &Path, role: Role, binary: bool) -> Result<Self> {
        let mut input = BufReader::new(
            File::open(path).with_context(|| format!("error opening {}", path.display()))?,
        );
        if binary {
            EmbeddingTable::read_binary(&mut input, role)
        } else {
            EmbeddingTable::read_text(&mut input, role)
        }
    }
}

pub(crate) fn write_binary_matrix<W: Write>(
    out: &mut W,
    rows: usize,
    cols: usize,
    values: impl Iterator<Item = real>,
) -> Result<()> {
    writeln!(out, "{rows} {cols}").context("error writing table")?;
    let mut buf: Vec<u32> = Vec::with_capacity(cols.max(1));
    let mut values = values.peekable();
    while values.peek().is_some() {
        buf.clear();
        buf.extend(values.by_ref().take(cols.max(1)).map(|v| v.to_bits().to_le()));
        out.write_all(bytemuck::cast_slice::<u32, u8>(&buf))
            .context("error writing table")?;
    }
    Ok(())
}

pub(crate) fn read_binary_matrix<R: BufRead>(input: &mut R) -> Result<(usize, usize, Vec<real>)> {
    let (rows, cols, len) = read_header(input)?;
    let mut values = Vec::with_capacity(len.min(READ_CHUNK));
    let mut bits = vec![0u32; len.min(READ_CHUNK)];
    while values.len() < len {
        let n = (len - values.len()).min(READ_CHUNK);
        input
            .read_exact(bytemuck::cast_slice_mut::<u32, u8>(&mut bits[..n]))
            .context("error reading table: file is truncated")?;
        values.extend(bits[..n].iter().map(|&b| real::from_bits(u32::from_le(b))));
    }
    Ok((rows, cols, values))
}

/// Tables are read this many values at a time, so a corrupt header cannot
/// allocate more than the input actually holds.
const READ_CHUNK: usize = 1 << 16;

/// Returns rows, columns and their product.
fn read_header<R: BufRead>(input: &mut R) -> Result<(usize, usize, usize)> {
    let mut line = String::new();
    input.read_line(&mut line).context("error reading table header")?;
    let mut fields = line.split_whitespace();
    let rows: usize = fields
        .next()
        .ok_or_else(|| anyhow!("invalid table header"))?
        .parse()
        .context("invalid table header")?;
    let cols: usize = fields
        .next()
        .ok_or_else(|| anyhow!("invalid table header"))?
        .parse()
        .context("invalid table header")?;
    let len = rows
        .checked_mul(cols)
        .filter(|n| n.checked_mul(std::mem::size_of::<real>()).is_some())
        .ok_or_else(|| anyhow!("invalid table header: {rows}x{cols} is too large"))?;
    Ok((rows, cols, len))
}
