//! Byte-offset / editor-position mapping.
//!
//! The parser works in byte offsets; the host speaks zero-based lines and
//! UTF-16 code units per line. [`LineIndex`] converts between the two.

use petrel_worker::{Position, Range};

/// Line-start table for one document text.
#[derive(Debug)]
pub struct LineIndex {
	line_starts: Vec<usize>,
}

impl LineIndex {
	pub fn new(text: &str) -> Self {
		let mut line_starts = vec![0];
		for (offset, byte) in text.bytes().enumerate() {
			if byte == b'\n' {
				line_starts.push(offset + 1);
			}
		}
		Self { line_starts }
	}

	/// Byte offset of `position`, clamped to the end of its line. Positions
	/// past the last line clamp to the end of the text.
	pub fn offset(&self, text: &str, position: Position) -> usize {
		let Some(&start) = self.line_starts.get(position.line as usize) else {
			return text.len();
		};
		let end = match self.line_starts.get(position.line as usize + 1) {
			Some(&next) => next - 1,
			None => text.len(),
		};
		let mut line = &text[start..end];
		if let Some(stripped) = line.strip_suffix('\r') {
			line = stripped;
		}
		let mut units: u32 = 0;
		for (offset, ch) in line.char_indices() {
			if units >= position.character {
				return start + offset;
			}
			units += ch.len_utf16() as u32;
		}
		start + line.len()
	}

	/// Position of the byte at `offset`. Offsets past the end clamp.
	pub fn position(&self, text: &str, offset: usize) -> Position {
		let offset = offset.min(text.len());
		let line = match self.line_starts.binary_search(&offset) {
			Ok(line) => line,
			Err(insertion) => insertion - 1,
		};
		let start = self.line_starts[line];
		let character = text[start..offset].chars().map(|c| c.len_utf16() as u32).sum();
		Position::new(line as u32, character)
	}

	pub fn range(&self, text: &str, start: usize, end: usize) -> Range {
		Range::new(self.position(text, start), self.position(text, end))
	}

	/// The range spanning the whole text.
	pub fn full_range(&self, text: &str) -> Range {
		self.range(text, 0, text.len())
	}
}
