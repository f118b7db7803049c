//! Reading the training corpus: one paragraph per line, tokens separated by
//! whitespace.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::str::SplitWhitespace;

use anyhow::{Context, Result};
use rayon::prelude::*;

/// Tokens longer than this many bytes are truncated.
pub const MAX_STRING: usize = 100;

#[derive(Debug, Clone)]
pub struct Corpus {
    path: PathBuf,
    size: u64,
    lowercase: bool,
}

/// A byte range of the corpus owned by one worker. Ranges start on line
/// boundaries, so no line is read by two workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shard {
    pub id: usize,
    pub start: u64,
    pub end: u64,
    /// Ordinal of the first line of the shard within the whole corpus.
    pub first_line: u64,
}

impl Corpus {
    pub fn open(path: &Path) -> Result<Self> {
        let size = std::fs::metadata(path)
            .with_context(|| format!("error opening training data file {}", path.display()))?
            .len();
        Ok(Corpus {
            path: path.to_path_buf(),
            size,
            lowercase: false,
        })
    }

    /// Fold tokens to lower case as they are read.
    pub fn lowercase(mut self, yes: bool) -> Self {
        self.lowercase = yes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    fn open_file(&self) -> Result<File> {
        File::open(&self.path)
            .with_context(|| format!("error opening training data file {}", self.path.display()))
    }

    /// Split the corpus into `n` byte ranges of roughly equal size, each
    /// starting at the beginning of a line.
    pub fn shards(&self, n: usize) -> Result<Vec<Shard>> {
        let n = n.max(1);
        let mut f = BufReader::new(self.open_file()?);
        let mut bounds = vec![0u64];
        for i in 1..n {
            let raw = self.size * i as u64 / n as u64;
            let prev = *bounds.last().unwrap_or(&0);
            let start = snap_to_line_start(&mut f, raw)?.max(prev);
            bounds.push(start);
        }
        bounds.push(self.size);

        let line_counts = bounds
            .par_windows(2)
            .map(|w| self.count_lines(w[0], w[1]))
            .collect::<Result<Vec<u64>>>()?;

        let mut first_line = 0;
        let mut shards = Vec::with_capacity(n);
        for (id, (w, lines)) in bounds.windows(2).zip(line_counts).enumerate() {
            shards.push(Shard {
                id,
                start: w[0],
                end: w[1],
                first_line,
            });
            first_line += lines;
        }
        Ok(shards)
    }

    /// Number of lines starting in `[start, end)`.
    fn count_lines(&self, start: u64, end: u64) -> Result<u64> {
        if start >= end {
            return Ok(0);
        }
        let mut f = self.open_file()?;
        f.seek(SeekFrom::Start(start))
            .context("error seeking within training data file")?;
        let mut f = BufReader::new(f).take(end - start);
        let mut buf = [0u8; 64 * 1024];
        let mut lines = 0;
        let mut last = b'\n';
        loop {
            let n = f.read(&mut buf).context("error reading training data file")?;
            if n == 0 {
                break;
            }
            lines += buf[..n].iter().filter(|&&b| b == b'\n').count() as u64;
            last = buf[n - 1];
        }
        if last != b'\n' {
            lines += 1;
        }
        Ok(lines)
    }

    /// Open a reader over one shard.
    pub fn reader(&self, shard: &Shard) -> Result<LineReader<BufReader<File>>> {
        LineReader::new(
            BufReader::new(self.open_file()?),
            shard.start,
            shard.end,
            self.lowercase,
        )
    }
}

/// Returns the offset of the first line that starts at or after `offset`.
fn snap_to_line_start<R: BufRead + Seek>(f: &mut R, offset: u64) -> Result<u64> {
    if offset == 0 {
        return Ok(0);
    }
    f.seek(SeekFrom::Start(offset - 1))
        .context("error seeking within training data file")?;
    let mut skipped = vec![];
    let n = f
        .read_until(b'\n', &mut skipped)
        .context("error reading training data file")?;
    Ok(offset - 1 + n as u64)
}

/// Reads the lines of `[start, end)`, splitting each into tokens.
pub struct LineReader<R> {
    inner: R,
    start: u64,
    end: u64,
    pos: u64,
    lowercase: bool,
    buf: Vec<u8>,
    line: String,
}

impl<R: BufRead + Seek> LineReader<R> {
    pub fn new(mut inner: R, start: u64, end: u64, lowercase: bool) -> Result<Self> {
        inner
            .seek(SeekFrom::Start(start))
            .context("error seeking within training data file")?;
        Ok(LineReader {
            inner,
            start,
            end,
            pos: start,
            lowercase,
            buf: Vec::new(),
            line: String::new(),
        })
    }

    /// Go back to the start of the range, for the next epoch.
    pub fn rewind(&mut self) -> Result<()> {
        self.inner
            .seek(SeekFrom::Start(self.start))
            .context("error rewinding training data file")?;
        self.pos = self.start;
        Ok(())
    }

    /// Read the next line. Returns `None` at the end of the range.
    pub fn next_line(&mut self) -> Result<Option<Tokens<'_>>> {
        if self.pos >= self.end {
            return Ok(None);
        }
        self.buf.clear();
        let n = self
            .inner
            .read_until(b'\n', &mut self.buf)
            .context("error reading training data file")?;
        if n == 0 {
            return Ok(None);
        }
        self.pos += n as u64;

        self.line.clear();
        self.line.push_str(&String::from_utf8_lossy(&self.buf));
        if self.lowercase {
            self.line = self.line.to_lowercase();
        }
        Ok(Some(Tokens {
            inner: self.line.split_whitespace(),
        }))
    }
}

/// Whitespace-separated tokens of one line.
pub struct Tokens<'a> {
    inner: SplitWhitespace<'a>,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        self.inner.next().map(truncate)
    }
}

fn truncate(token: &str) -> &str {
    if token.len() < MAX_STRING {
        return token;
    }
    let mut end = MAX_STRING - 1;
    while !token.is_char_boundary(end) {
        end -= 1;
    }
    &token[..end]
}
