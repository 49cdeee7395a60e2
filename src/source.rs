//! Source text management: owns the buffer and maps positions to lines.
//!
//! The buffer is stored with a trailing NUL so the scanner may peek one
//! character past any position without bounds checks. Line starts are
//! discovered once at construction; converting a location into a
//! `(line, column)` pair is a binary search over that table.

/// Byte offset into the source buffer. Cheap to copy, resolved to a
/// line and column only when a diagnostic needs one.
pub type SourceLocation = usize;

/// The position of a lexeme inside the source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRange {
  pub start: SourceLocation,
  pub len: usize,
}

impl SourceRange {
  pub fn new(start: SourceLocation, len: usize) -> Self {
    Self { start, len }
  }

  /// A zero-width range, used by synthesized declarations.
  pub fn empty() -> Self {
    Self { start: 0, len: 0 }
  }

  pub fn end(&self) -> SourceLocation {
    self.start + self.len
  }

  /// The smallest range covering both `first` and `last`.
  pub fn through(first: SourceRange, last: SourceRange) -> Self {
    Self {
      start: first.start,
      len: last.end().saturating_sub(first.start),
    }
  }
}

/// An immutable source file plus its line-start table.
pub struct SourceFile {
  name: String,
  text: String, // includes the sentinel NUL
  lines: Vec<SourceLocation>,
}

impl SourceFile {
  pub fn new(name: impl Into<String>, source_text: &str) -> Self {
    let mut text = String::with_capacity(source_text.len() + 1);
    text.push_str(source_text);
    text.push('\0');

    let mut lines = vec![0];
    for (pos, byte) in text.bytes().enumerate() {
      if byte == b'\n' {
        lines.push(pos + 1);
      }
    }

    Self {
      name: name.into(),
      text,
      lines,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// View of the source text including the sentinel terminator.
  pub fn text_with_terminator(&self) -> &str {
    &self.text
  }

  /// The lexeme addressed by a range.
  pub fn range_text(&self, range: SourceRange) -> &str {
    &self.text[range.start..range.end()]
  }

  /// 1-based line and byte column of a location.
  pub fn line_and_column(&self, loc: SourceLocation) -> (usize, usize) {
    let line_index = match self.lines.binary_search(&loc) {
      Ok(index) => index,
      Err(index) => index - 1,
    };
    (line_index + 1, loc - self.lines[line_index] + 1)
  }

  /// Full text of a 1-based line, without its terminator.
  pub fn line_text(&self, line: usize) -> &str {
    let start = self.lines[line - 1];
    let end = self
      .lines
      .get(line)
      .map(|next| next - 1)
      .unwrap_or(self.text.len() - 1);
    self.text[start..end].trim_end_matches('\r')
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn locations_resolve_to_lines_and_columns() {
    let source = SourceFile::new("t.cm", "int x;\nint y;\n\nvoid f(void) {}\n");

    assert_eq!(source.line_and_column(0), (1, 1));
    assert_eq!(source.line_and_column(4), (1, 5));
    assert_eq!(source.line_and_column(7), (2, 1));
    assert_eq!(source.line_and_column(14), (3, 1));
    assert_eq!(source.line_and_column(15), (4, 1));
  }

  #[test]
  fn terminated_view_ends_with_nul() {
    let source = SourceFile::new("t.cm", "int x;");
    assert!(source.text_with_terminator().ends_with('\0'));
  }

  #[test]
  fn line_text_strips_terminators() {
    let source = SourceFile::new("t.cm", "int x;\nint y;");
    assert_eq!(source.line_text(1), "int x;");
    assert_eq!(source.line_text(2), "int y;");
  }

  #[test]
  fn range_text_addresses_the_lexeme() {
    let source = SourceFile::new("t.cm", "while (x)");
    assert_eq!(source.range_text(SourceRange::new(0, 5)), "while");
    assert_eq!(source.range_text(SourceRange::new(7, 1)), "x");
  }
}
