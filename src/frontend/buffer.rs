use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::Path;

/// Block size for each buffer half. Matches the usual disk block size so
/// refills map onto whole reads.
pub const BLOCK_SIZE: usize = 4096;

/// Sentinel byte marking the end of a half. The null byte cannot appear in
/// legal PL/0 source, so a single comparison in the scanning loop detects
/// both buffer seams and end of input.
pub const SENTINEL: u8 = 0;

const SENTINEL1: usize = BLOCK_SIZE;
const HALF2: usize = BLOCK_SIZE + 1;
const SENTINEL2: usize = 2 * BLOCK_SIZE + 1;
const BUF_LEN: usize = 2 * BLOCK_SIZE + 2;

/// Double-buffered character source for the lexer.
///
/// Layout:
/// ```text
/// +------------------+---+------------------+---+
/// |      half 1      | 0 |      half 2      | 0 |
/// +------------------+---+------------------+---+
/// ```
///
/// `forward` scans; `lexeme_begin` marks where the current lexeme started.
/// When `forward` lands on a sentinel the other half is refilled and the
/// cursor wraps, so memory use stays constant for arbitrarily large files.
/// A short read writes the sentinel just past the last byte and flags that
/// half as final.
///
/// The buffer owns its byte source; reinitializing drops the previous one.
/// Position tracking is per byte: `\n` bumps the line, `\r` is swallowed,
/// everything else bumps the column. Completed lines are cached for the
/// diagnostic renderer.
pub struct InputBuffer {
    input: Option<Box<dyn Read>>,
    buf: Box<[u8]>,
    forward: usize,
    lexeme_begin: usize,

    eof1: bool,
    eof2: bool,
    exhausted: bool,
    // Whether a half already holds the continuation of the stream, so a
    // lookahead that crossed the seam does not trigger a second (skipping)
    // refill when the real cursor arrives.
    half1_loaded: bool,
    half2_loaded: bool,

    line: usize,
    column: usize,
    lexeme_line: usize,
    lexeme_column: usize,

    source_lines: Vec<String>,
    current_line: Vec<u8>,
}

impl InputBuffer {
    pub fn new() -> Self {
        InputBuffer {
            input: None,
            buf: vec![SENTINEL; BUF_LEN].into_boxed_slice(),
            forward: 0,
            lexeme_begin: 0,
            eof1: true,
            eof2: true,
            exhausted: true,
            half1_loaded: false,
            half2_loaded: false,
            line: 1,
            column: 1,
            lexeme_line: 1,
            lexeme_column: 1,
            source_lines: Vec::new(),
            current_line: Vec::new(),
        }
    }

    pub fn init_from_file(&mut self, path: &Path) -> io::Result<()> {
        let file = File::open(path)?;
        self.init_from_reader(Box::new(file));
        Ok(())
    }

    pub fn init_from_str(&mut self, source: &str) {
        self.init_from_reader(Box::new(Cursor::new(source.as_bytes().to_vec())));
    }

    /// Take ownership of an arbitrary byte source. The previous source, if
    /// any, is dropped here.
    pub fn init_from_reader(&mut self, reader: Box<dyn Read>) {
        self.input = Some(reader);
        self.reset();
        self.load_half1();
        self.forward = 0;
        self.lexeme_begin = 0;
    }

    fn reset(&mut self) {
        self.line = 1;
        self.column = 1;
        self.lexeme_line = 1;
        self.lexeme_column = 1;
        self.eof1 = false;
        self.eof2 = false;
        self.exhausted = false;
        self.half1_loaded = false;
        self.half2_loaded = false;
        self.source_lines.clear();
        self.current_line.clear();
        self.buf[SENTINEL1] = SENTINEL;
        self.buf[SENTINEL2] = SENTINEL;
    }

    /// Read up to one block into `buf[start..start + BLOCK_SIZE]`.
    /// A mid-stream read failure is treated as end of input.
    fn fill(&mut self, start: usize) -> usize {
        let mut total = 0;
        if let Some(input) = self.input.as_mut() {
            while total < BLOCK_SIZE {
                match input.read(&mut self.buf[start + total..start + BLOCK_SIZE]) {
                    Ok(0) => break,
                    Ok(n) => total += n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
        }
        total
    }

    fn load_half1(&mut self) {
        if self.exhausted {
            self.eof1 = true;
            self.buf[0] = SENTINEL;
            self.half1_loaded = true;
            return;
        }
        let n = self.fill(0);
        if n < BLOCK_SIZE {
            self.buf[n] = SENTINEL;
            self.eof1 = true;
            self.exhausted = true;
        } else {
            self.buf[SENTINEL1] = SENTINEL;
            self.eof1 = false;
        }
        self.half1_loaded = true;
    }

    fn load_half2(&mut self) {
        if self.exhausted {
            self.eof2 = true;
            self.buf[HALF2] = SENTINEL;
            self.half2_loaded = true;
            return;
        }
        let n = self.fill(HALF2);
        if n < BLOCK_SIZE {
            self.buf[HALF2 + n] = SENTINEL;
            self.eof2 = true;
            self.exhausted = true;
        } else {
            self.buf[SENTINEL2] = SENTINEL;
            self.eof2 = false;
        }
        self.half2_loaded = true;
    }

    /// The byte under the cursor, or the sentinel at true end of input.
    pub fn current(&self) -> u8 {
        self.buf[self.forward]
    }

    pub fn is_eof(&self) -> bool {
        let b = self.buf[self.forward];
        if b != SENTINEL {
            return false;
        }
        if self.forward == SENTINEL1 {
            self.eof1
        } else if self.forward == SENTINEL2 {
            self.eof2
        } else {
            true
        }
    }

    /// Move the cursor without position accounting, refilling and wrapping
    /// at seams. At true end of input this is a no-op past the sentinel.
    fn step(&mut self) {
        self.forward += 1;
        if self.buf[self.forward] != SENTINEL {
            return;
        }
        if self.forward == SENTINEL1 {
            if !self.eof1 {
                if !self.half2_loaded {
                    self.load_half2();
                }
                self.half1_loaded = false;
                self.forward = HALF2;
            }
        } else if self.forward == SENTINEL2 {
            if !self.eof2 {
                if !self.half1_loaded {
                    self.load_half1();
                }
                self.half2_loaded = false;
                self.forward = 0;
            }
        }
    }

    /// Consume one byte, updating line/column and the line cache.
    pub fn advance(&mut self) {
        if self.is_eof() {
            return;
        }
        let b = self.buf[self.forward];
        self.track(b);
        self.step();
    }

    fn track(&mut self, b: u8) {
        if b == b'\n' {
            if self.source_lines.len() < self.line {
                let text = String::from_utf8_lossy(&self.current_line).into_owned();
                self.source_lines.push(text);
            }
            self.current_line.clear();
            self.line += 1;
            self.column = 1;
        } else if b != b'\r' {
            self.current_line.push(b);
            self.column += 1;
        }
    }

    /// Look ahead `k` bytes without consuming anything. Exact for any
    /// `k <= BLOCK_SIZE`: a refill triggered here is remembered so the
    /// real cursor does not refill (and skip) again at the seam.
    pub fn peek(&mut self, k: usize) -> u8 {
        let saved = self.forward;
        for _ in 0..k {
            if self.is_eof() {
                break;
            }
            self.step();
        }
        let b = if self.is_eof() {
            SENTINEL
        } else {
            self.buf[self.forward]
        };
        self.forward = saved;
        b
    }

    pub fn mark_lexeme_start(&mut self) {
        self.lexeme_begin = self.forward;
        self.lexeme_line = self.line;
        self.lexeme_column = self.column;
    }

    /// The text between the lexeme mark and the cursor, spanning at most one
    /// buffer wrap. Sentinels inside the walk are skipped.
    pub fn lexeme(&self) -> String {
        let mut bytes = Vec::new();
        let mut p = self.lexeme_begin;
        while p != self.forward {
            let b = self.buf[p];
            if b != SENTINEL {
                bytes.push(b);
            }
            p += 1;
            if p == SENTINEL2 + 1 {
                p = 0;
            }
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn lexeme_start_line(&self) -> usize {
        self.lexeme_line
    }

    pub fn lexeme_start_column(&self) -> usize {
        self.lexeme_column
    }

    /// Hand the completed-line cache to the diagnostic engine. The line the
    /// cursor stopped on is included even without a trailing newline.
    pub fn take_source_lines(&mut self) -> Vec<String> {
        let mut lines = std::mem::take(&mut self.source_lines);
        if !self.current_line.is_empty() {
            lines.push(String::from_utf8_lossy(&self.current_line).into_owned());
            self.current_line.clear();
        }
        if lines.is_empty() {
            lines.push(String::new());
        }
        lines
    }
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self::new()
    }
}
