//! Source map for managing source files and resolving locations.
//!
//! The [`SourceMap`] owns every file loaded during a compile job: the
//! main translation unit and each file pulled in by `#include`. Files are
//! handed out as cheap `Rc<SourceFile>` clones so the preprocessor can
//! keep suspended files alive on its include stack.

use std::rc::Rc;

use super::FileId;

/// A source file with its content and metadata.
#[derive(Debug)]
pub struct SourceFile {
    /// Unique file identifier.
    id: FileId,
    /// File name (path or display name).
    name: String,
    /// File content.
    content: String,
    /// Precomputed line start offsets.
    line_starts: Vec<usize>,
}

impl SourceFile {
    fn new(id: FileId, name: String, content: String) -> Self {
        let line_starts = compute_line_starts(&content);
        Self {
            id,
            name,
            content,
            line_starts,
        }
    }

    /// Get the file identifier.
    #[inline]
    pub fn id(&self) -> FileId {
        self.id
    }

    /// Get the file name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the file content.
    #[inline]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Get the total number of lines.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Compute the 1-based (line, column) of a byte offset.
    pub fn location(&self, offset: usize) -> (u32, u32) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        let column = offset - self.line_starts[line];
        (line as u32 + 1, column as u32 + 1)
    }

    /// Get the text of a 1-based line, without its trailing newline.
    pub fn line_text(&self, line: u32) -> Option<&str> {
        let idx = line.checked_sub(1)? as usize;
        let start = *self.line_starts.get(idx)?;
        let end = self
            .line_starts
            .get(idx + 1)
            .map(|&next| next)
            .unwrap_or(self.content.len());
        Some(self.content[start..end].trim_end_matches(['\n', '\r']))
    }
}

fn compute_line_starts(content: &str) -> Vec<usize> {
    let mut line_starts = vec![0];
    for (i, b) in content.bytes().enumerate() {
        if b == b'\n' {
            line_starts.push(i + 1);
        }
    }
    line_starts
}

/// Collection of all source files in a compile job.
///
/// # Examples
///
/// ```
/// use qcc_util::span::SourceMap;
///
/// let mut map = SourceMap::new();
/// let file = map.add_file("main.c", "int x;\n");
/// assert_eq!(map.name_of(file.id()), "main.c");
/// ```
#[derive(Default)]
pub struct SourceMap {
    files: Vec<Rc<SourceFile>>,
}

impl SourceMap {
    /// Create an empty source map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file, assigning it the next [`FileId`].
    pub fn add_file(&mut self, name: impl Into<String>, content: impl Into<String>) -> Rc<SourceFile> {
        let id = FileId(self.files.len() as u32);
        let file = Rc::new(SourceFile::new(id, name.into(), content.into()));
        self.files.push(Rc::clone(&file));
        file
    }

    /// Look up a file by id.
    pub fn file(&self, id: FileId) -> Option<Rc<SourceFile>> {
        self.files.get(id.index()).cloned()
    }

    /// Name of a file, or `"<unknown>"` if the id is stale.
    pub fn name_of(&self, id: FileId) -> &str {
        self.files
            .get(id.index())
            .map(|f| f.name())
            .unwrap_or("<unknown>")
    }

    /// Number of loaded files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if no files are loaded.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterate over files in load order.
    pub fn iter(&self) -> impl Iterator<Item = &Rc<SourceFile>> {
        self.files.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_lookup() {
        let mut map = SourceMap::new();
        let a = map.add_file("a.c", "int a;\n");
        let b = map.add_file("b.c", "int b;\n");
        assert_eq!(a.id(), FileId(0));
        assert_eq!(b.id(), FileId(1));
        assert_eq!(map.name_of(FileId(1)), "b.c");
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_location() {
        let mut map = SourceMap::new();
        let f = map.add_file("t.c", "abc\ndef\nghi");
        assert_eq!(f.location(0), (1, 1));
        assert_eq!(f.location(2), (1, 3));
        assert_eq!(f.location(4), (2, 1));
        assert_eq!(f.location(9), (3, 2));
    }

    #[test]
    fn test_line_text() {
        let mut map = SourceMap::new();
        let f = map.add_file("t.c", "first\nsecond\n");
        assert_eq!(f.line_text(1), Some("first"));
        assert_eq!(f.line_text(2), Some("second"));
        assert_eq!(f.line_text(9), None);
    }

    #[test]
    fn test_line_count() {
        let mut map = SourceMap::new();
        let f = map.add_file("t.c", "a\nb\nc");
        assert_eq!(f.line_count(), 3);
    }

    #[test]
    fn test_unknown_file_name() {
        let map = SourceMap::new();
        assert_eq!(map.name_of(FileId(7)), "<unknown>");
    }
}
