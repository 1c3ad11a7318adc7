//! Source Manager
//!
//! Holds immutable source buffers keyed by logical path and answers
//! offset → (line, column) queries. Grounded on the include-resolution
//! identity guarantee of a stack-language compiler's include resolver
//! (`HashSet` of already-resolved canonical paths, "resolve once"),
//! generalized from "files on disk" to "whatever the `source_request`
//! collaborator resolves a logical path to".

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// Opaque handle identifying one resolved source buffer. Stable for the
/// lifetime of a single compilation; never reused across compilations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u32);

impl SourceId {
    #[must_use]
    pub fn new(index: u32) -> Self {
        SourceId(index)
    }

    #[must_use]
    pub fn index(self) -> u32 {
        self.0
    }
}

/// A quadruple (source, start-offset, end-offset, resolved line+column)
/// as specified by §3. Every AST and IR node carries one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub source: SourceId,
    pub start_offset: u32,
    pub end_offset: u32,
    pub line: u32,
    pub column: u32,
}

impl Span {
    #[must_use]
    pub fn new(source: SourceId, start_offset: u32, end_offset: u32, line: u32, column: u32) -> Self {
        debug_assert!(start_offset <= end_offset);
        Span {
            source,
            start_offset,
            end_offset,
            line,
            column,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        (self.end_offset - self.start_offset) as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start_offset == self.end_offset
    }

    /// Does `self` strictly contain `other` (used by the invariant in §8:
    /// `E.span` strictly contains the spans of all descendants)?
    #[must_use]
    pub fn contains(&self, other: &Span) -> bool {
        self.source == other.source
            && self.start_offset <= other.start_offset
            && other.end_offset <= self.end_offset
    }

    /// Merge two spans from the same source into their covering span.
    #[must_use]
    pub fn merge(&self, other: &Span) -> Span {
        debug_assert_eq!(self.source, other.source);
        Span {
            source: self.source,
            start_offset: self.start_offset.min(other.start_offset),
            end_offset: self.end_offset.max(other.end_offset),
            line: self.line.min(other.line),
            column: if self.start_offset <= other.start_offset {
                self.column
            } else {
                other.column
            },
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.column + 1)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("failed to resolve import '{path}': {message}")]
    ImportFailed { path: String, message: String },
    #[error("source '{path}' is {size} bytes, exceeding the {limit}-byte limit")]
    TooLarge {
        path: String,
        size: usize,
        limit: usize,
    },
}

struct Entry {
    resolved_name: String,
    bytes: Vec<u8>,
    /// Byte offset of the start of each line, for binary-search line/column lookup.
    line_starts: Vec<u32>,
}

/// Maps logical import paths to byte buffers and path handles.
///
/// Importing the same resolved path twice yields the same [`SourceId`];
/// the `source_request` collaborator is invoked at most once per resolved
/// name (§4.1, §6).
pub struct SourceManager {
    entries: Vec<Entry>,
    by_resolved_name: HashMap<String, SourceId>,
    max_source_bytes: usize,
}

/// Default cap on a single source buffer, matching the "source too large"
/// I/O diagnostic in §7.
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 16 * 1024 * 1024;

impl SourceManager {
    #[must_use]
    pub fn new() -> Self {
        SourceManager {
            entries: Vec::new(),
            by_resolved_name: HashMap::new(),
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
        }
    }

    #[must_use]
    pub fn with_max_source_bytes(max_source_bytes: usize) -> Self {
        SourceManager {
            max_source_bytes,
            ..SourceManager::new()
        }
    }

    /// Register a resolved `(resolved_name, bytes)` pair, deduplicating on
    /// `resolved_name`. Returns the existing handle if already registered.
    pub fn insert(
        &mut self,
        resolved_name: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<SourceId, SourceError> {
        let resolved_name = resolved_name.into();
        if let Some(&id) = self.by_resolved_name.get(&resolved_name) {
            return Ok(id);
        }
        if bytes.len() > self.max_source_bytes {
            return Err(SourceError::TooLarge {
                path: resolved_name,
                size: bytes.len(),
                limit: self.max_source_bytes,
            });
        }
        let line_starts = compute_line_starts(&bytes);
        let id = SourceId::new(self.entries.len() as u32);
        self.entries.push(Entry {
            resolved_name: resolved_name.clone(),
            bytes,
            line_starts,
        });
        self.by_resolved_name.insert(resolved_name, id);
        Ok(id)
    }

    #[must_use]
    pub fn resolved_name(&self, id: SourceId) -> &str {
        &self.entries[id.index() as usize].resolved_name
    }

    #[must_use]
    pub fn bytes(&self, id: SourceId) -> &[u8] {
        &self.entries[id.index() as usize].bytes
    }

    #[must_use]
    pub fn text(&self, id: SourceId) -> &str {
        std::str::from_utf8(self.bytes(id)).unwrap_or("")
    }

    /// Resolve a byte offset within `id`'s source into a 0-indexed
    /// (line, column) pair via binary search over precomputed line starts.
    #[must_use]
    pub fn locate(&self, id: SourceId, offset: u32) -> (u32, u32) {
        let entry = &self.entries[id.index() as usize];
        let line = match entry.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let line_start = entry.line_starts[line];
        (line as u32, offset - line_start)
    }

    #[must_use]
    pub fn span(&self, id: SourceId, start_offset: u32, end_offset: u32) -> Span {
        let (line, column) = self.locate(id, start_offset);
        Span::new(id, start_offset, end_offset, line, column)
    }
}

impl Default for SourceManager {
    fn default() -> Self {
        SourceManager::new()
    }
}

fn compute_line_starts(bytes: &[u8]) -> Vec<u32> {
    let mut starts = vec![0u32];
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'\n' {
            starts.push((i + 1) as u32);
        }
    }
    starts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedups_same_resolved_name() {
        let mut mgr = SourceManager::new();
        let a = mgr.insert("foo.dsl", b"hello".to_vec()).unwrap();
        let b = mgr.insert("foo.dsl", b"hello".to_vec()).unwrap();
        assert_eq!(a, b);
        assert_eq!(mgr.entries.len(), 1);
    }

    #[test]
    fn locate_finds_line_and_column() {
        let mut mgr = SourceManager::new();
        let id = mgr.insert("x.dsl", b"ab\ncd\nef".to_vec()).unwrap();
        assert_eq!(mgr.locate(id, 0), (0, 0));
        assert_eq!(mgr.locate(id, 2), (0, 2)); // the '\n'
        assert_eq!(mgr.locate(id, 3), (1, 0)); // 'c'
        assert_eq!(mgr.locate(id, 6), (2, 0)); // 'e'
    }

    #[test]
    fn rejects_oversized_source() {
        let mut mgr = SourceManager::with_max_source_bytes(4);
        let err = mgr.insert("big.dsl", vec![0u8; 5]).unwrap_err();
        assert!(matches!(err, SourceError::TooLarge { .. }));
    }

    #[test]
    fn span_strictly_contains_sub_span() {
        let mut mgr = SourceManager::new();
        let id = mgr.insert("x.dsl", b"1 + 2".to_vec()).unwrap();
        let outer = mgr.span(id, 0, 5);
        let inner = mgr.span(id, 0, 1);
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
    }
}
