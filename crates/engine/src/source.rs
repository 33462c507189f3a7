// EDB - Ethereum Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Source texts and positions within them.

use std::{collections::BTreeMap, fmt, sync::Arc};

use foundry_compilers::artifacts::ast::SourceLocation;
use serde::{Deserialize, Serialize};

/// A 0-based line/column position in a source file. Columns count bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// 0-based line
    pub line: usize,
    /// 0-based byte column
    pub column: usize,
}

impl Position {
    /// Creates a new position.
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A byte range in a source file, as written by the compiler (`start:length:file`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRange {
    /// Compiler file index
    pub file: usize,
    /// Byte offset of the first character
    pub start: usize,
    /// Length in bytes
    pub length: usize,
}

impl SourceRange {
    /// Creates a new source range.
    pub fn new(file: usize, start: usize, length: usize) -> Self {
        Self { file, start, length }
    }

    /// Byte offset one past the last character.
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    /// Converts a compiler location, which is `None` for generated code.
    pub fn from_location(location: &SourceLocation) -> Option<Self> {
        match (location.index, location.start, location.length) {
            (Some(file), Some(start), Some(length)) => Some(Self { file, start, length }),
            _ => None,
        }
    }
}

/// A half-open `[start, end)` range of positions in one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceExtent {
    /// Compiler file index
    pub file: usize,
    /// First position covered
    pub start: Position,
    /// First position not covered
    pub end: Position,
}

impl SourceExtent {
    /// Whether `position` in `file` lies inside this extent.
    pub fn contains(&self, file: usize, position: Position) -> bool {
        self.file == file && self.start <= position && position < self.end
    }
}

impl fmt::Display for SourceExtent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}[{}, {})", self.file, self.start, self.end)
    }
}

/// A resolved source range: positions plus the file path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceSpan {
    /// Compiler file index
    pub file: usize,
    /// Path of the file
    pub path: Arc<str>,
    /// First position covered
    pub start: Position,
    /// First position not covered
    pub end: Position,
    /// Byte offset of the range
    pub offset: usize,
    /// Byte length of the range
    pub length: usize,
}

impl SourceSpan {
    /// The span as an extent.
    pub fn extent(&self) -> SourceExtent {
        SourceExtent { file: self.file, start: self.start, end: self.end }
    }
}

/// One source file with a precomputed line index.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Compiler file index
    pub index: usize,
    /// Path as listed by the compiler
    pub path: Arc<str>,
    /// Full text
    pub content: String,
    line_starts: Vec<usize>,
}

impl SourceFile {
    /// Creates a source file and indexes its lines.
    pub fn new(index: usize, path: impl AsRef<str>, content: impl Into<String>) -> Self {
        let content = content.into();
        let line_starts = std::iter::once(0)
            .chain(content.bytes().enumerate().filter(|(_, b)| *b == b'\n').map(|(i, _)| i + 1))
            .collect();
        Self { index, path: Arc::from(path.as_ref()), content, line_starts }
    }

    /// Converts a byte offset to a position.
    ///
    /// The line is the number of newlines before `offset`, the column is the
    /// distance from the preceding newline. Offsets past the end are clamped.
    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.content.len());
        let line = self.line_starts.partition_point(|start| *start <= offset).saturating_sub(1);
        Position { line, column: offset - self.line_starts[line] }
    }

    /// Number of lines in the file.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Text of a 0-based line, without the trailing newline.
    pub fn line(&self, line: usize) -> Option<&str> {
        let start = *self.line_starts.get(line)?;
        let end = self.line_starts.get(line + 1).map(|e| e - 1).unwrap_or(self.content.len());
        self.content.get(start..end)
    }
}

/// All source files of a compilation, keyed by compiler file index.
#[derive(Debug, Clone, Default)]
pub struct SourceFiles {
    files: BTreeMap<usize, SourceFile>,
}

impl SourceFiles {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file, replacing any file with the same index.
    pub fn insert(&mut self, file: SourceFile) {
        self.files.insert(file.index, file);
    }

    /// Adds a file from its parts.
    pub fn add(&mut self, index: usize, path: impl AsRef<str>, content: impl Into<String>) {
        self.insert(SourceFile::new(index, path, content));
    }

    /// Looks up a file by index.
    pub fn get(&self, index: usize) -> Option<&SourceFile> {
        self.files.get(&index)
    }

    /// Looks up a file by exact path.
    pub fn by_path(&self, path: &str) -> Option<&SourceFile> {
        self.files.values().find(|f| &*f.path == path)
    }

    /// Iterates over files in index order.
    pub fn iter(&self) -> impl Iterator<Item = &SourceFile> {
        self.files.values()
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no file is known.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Converts a byte range to an extent, if its file is known.
    pub fn extent(&self, range: SourceRange) -> Option<SourceExtent> {
        let file = self.files.get(&range.file)?;
        Some(SourceExtent {
            file: range.file,
            start: file.position(range.start),
            end: file.position(range.end()),
        })
    }

    /// Converts a byte range to a span, if its file is known.
    pub fn span(&self, range: SourceRange) -> Option<SourceSpan> {
        let file = self.files.get(&range.file)?;
        Some(SourceSpan {
            file: range.file,
            path: file.path.clone(),
            start: file.position(range.start),
            end: file.position(range.end()),
            offset: range.start,
            length: range.length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_to_position() {
        let file = SourceFile::new(0, "A.sol", "ab\ncd\n\nef");
        assert_eq!(file.position(0), Position::new(0, 0));
        assert_eq!(file.position(2), Position::new(0, 2)); // the newline itself
        assert_eq!(file.position(3), Position::new(1, 0));
        assert_eq!(file.position(6), Position::new(2, 0));
        assert_eq!(file.position(8), Position::new(3, 1));
        assert_eq!(file.position(100), Position::new(3, 2));
        assert_eq!(file.line_count(), 4);
        assert_eq!(file.line(1), Some("cd"));
        assert_eq!(file.line(3), Some("ef"));
        assert_eq!(file.line(4), None);
    }

    #[test]
    fn test_extent_containment() {
        let mut sources = SourceFiles::new();
        sources.add(0, "A.sol", "line0\nline1\nline2\nline3");

        let outer = sources.extent(SourceRange::new(0, 6, 12)).unwrap();
        assert_eq!(outer.start, Position::new(1, 0));
        assert_eq!(outer.end, Position::new(3, 0));

        assert!(outer.contains(0, Position::new(1, 3)));
        assert!(outer.contains(0, Position::new(2, 5)));
        assert!(!outer.contains(0, Position::new(3, 0)));
        assert!(!outer.contains(1, Position::new(1, 3)));

        assert!(sources.extent(SourceRange::new(7, 0, 1)).is_none());
    }

    #[test]
    fn test_range_from_compiler_location() {
        let location: SourceLocation = "10:5:1".parse().unwrap();
        assert_eq!(SourceRange::from_location(&location), Some(SourceRange::new(1, 10, 5)));

        let generated: SourceLocation = "-1:-1:-1".parse().unwrap();
        assert_eq!(SourceRange::from_location(&generated), None);
    }
}
