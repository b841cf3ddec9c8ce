//! Splits configuration text into logical directive lines.
//!
//! - blank lines and lines starting with `#` are dropped;
//! - a trailing `\` joins the line with the next one;
//! - a line ending in a lone backtick opens a block that runs until a line
//!   starting with a backtick, newlines included.

/// One directive, possibly assembled from several physical lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// 1-based number of the first physical line.
    pub line: usize,
    /// The joined text.
    pub text: String,
}

/// A backtick block opened on `line` is never closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnterminatedBlock {
    /// Line of the opening backtick.
    pub line: usize,
}

/// Split `source` into logical lines.
pub fn logical_lines(source: &str) -> Result<Vec<LogicalLine>, UnterminatedBlock> {
    let mut lines = Vec::new();
    let mut buffer = String::new();
    let mut start = 0;
    let mut block_open: Option<usize> = None;

    for (index, raw) in source.lines().enumerate() {
        let number = index + 1;
        let line = raw.trim();

        if block_open.is_some() {
            buffer.push_str(line);
            buffer.push('\n');
            if line.starts_with('`') {
                block_open = None;
                flush(&mut lines, &mut buffer, start);
            }
            continue;
        }

        if buffer.is_empty() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            start = number;
        }

        if line.ends_with('`') && line.matches('`').count() == 1 {
            block_open = Some(number);
            buffer.push_str(line);
            buffer.push('\n');
        } else if let Some(joined) = line.strip_suffix('\\') {
            buffer.push_str(joined);
        } else {
            buffer.push_str(line);
            flush(&mut lines, &mut buffer, start);
        }
    }

    if let Some(line) = block_open {
        return Err(UnterminatedBlock { line });
    }
    if !buffer.trim().is_empty() {
        flush(&mut lines, &mut buffer, start);
    }
    Ok(lines)
}

fn flush(lines: &mut Vec<LogicalLine>, buffer: &mut String, line: usize) {
    let text = std::mem::take(buffer);
    if !text.trim().is_empty() {
        lines.push(LogicalLine { line, text });
    }
}
