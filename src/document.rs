//! Line-delimited JSON document source.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{BenchError, Result};

/// One corpus record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
}

impl Document {
    /// Id assigned by the reader; records without one get the next id past
    /// the largest seen so far.
    pub fn key(&self) -> i64 {
        self.id.unwrap_or_default()
    }
}

/// Streams documents from a JSON-lines source, up to `limit` records.
///
/// Lines that are not valid UTF-8 JSON documents, or that repeat an id
/// already handed out, are logged and skipped; blank lines are ignored.
pub struct DocumentReader<R> {
    reader: R,
    buf: Vec<u8>,
    limit: usize,
    line_no: usize,
    accepted: usize,
    skipped: usize,
    used_ids: HashSet<i64>,
    max_id: i64,
}

impl DocumentReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P, limit: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            BenchError::Setup(format!("cannot open data file {}: {}", path.display(), e))
        })?;
        Ok(DocumentReader::new(BufReader::new(file), limit))
    }
}

impl<R: BufRead> DocumentReader<R> {
    pub fn new(reader: R, limit: usize) -> Self {
        DocumentReader {
            reader,
            buf: Vec::new(),
            limit,
            line_no: 0,
            accepted: 0,
            skipped: 0,
            used_ids: HashSet::new(),
            max_id: 0,
        }
    }

    /// Up to `batch_size` documents; empty once the source or the limit is exhausted.
    pub fn next_batch(&mut self, batch_size: usize) -> Result<Vec<Document>> {
        self.by_ref().take(batch_size.max(1)).collect()
    }

    pub fn accepted(&self) -> usize {
        self.accepted
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<R: BufRead> Iterator for DocumentReader<R> {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.accepted >= self.limit {
            return None;
        }

        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            self.line_no += 1;

            let line = match std::str::from_utf8(&self.buf) {
                Ok(line) => line.trim(),
                Err(e) => {
                    self.skip(format_args!("invalid UTF-8: {}", e));
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }

            let mut doc = match serde_json::from_str::<Document>(line) {
                Ok(doc) => doc,
                Err(e) => {
                    self.skip(format_args!("{}", e));
                    continue;
                }
            };

            let id = match doc.id {
                Some(id) => id,
                None => self.max_id.saturating_add(1),
            };
            if !self.used_ids.insert(id) {
                self.skip(format_args!("duplicate id {}", id));
                continue;
            }
            self.max_id = self.max_id.max(id);
            doc.id = Some(id);
            self.accepted += 1;
            return Some(Ok(doc));
        }
    }
}

impl<R> DocumentReader<R> {
    fn skip(&mut self, reason: std::fmt::Arguments<'_>) {
        self.skipped += 1;
        warn!("skipping malformed record on line {}: {}", self.line_no, reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(text: &str, limit: usize) -> DocumentReader<Cursor<Vec<u8>>> {
        DocumentReader::new(Cursor::new(text.as_bytes().to_vec()), limit)
    }

    #[test]
    fn test_reads_and_assigns_ids() {
        let mut docs = reader(
            "{\"title\": \"a\", \"content\": \"alpha\"}\n{\"id\": 42, \"title\": \"b\", \"content\": \"beta\", \"parent_id\": 1}\n",
            10,
        );

        let first = docs.next().unwrap().unwrap();
        let second = docs.next().unwrap().unwrap();
        assert!(docs.next().is_none());

        assert_eq!(first.key(), 1);
        assert_eq!(first.parent_id, None);
        assert_eq!(second.key(), 42);
        assert_eq!(second.parent_id, Some(1));
    }

    #[test]
    fn test_skips_malformed_lines() {
        let mut docs = reader("{\"title\": \"a\"}\nnot json\n\n{\"content\": \"c\"}\n", 10);
        let all: Vec<Document> = docs.by_ref().collect::<Result<_>>().unwrap();

        assert_eq!(all.len(), 2);
        assert_eq!(all[1].key(), 2);
        assert_eq!(all[1].title, "");
        assert_eq!(docs.skipped(), 1);
        assert_eq!(docs.accepted(), 2);
    }

    #[test]
    fn test_skips_invalid_utf8_line() {
        let mut bytes = b"{\"title\": \"ok1\"}\n".to_vec();
        bytes.extend_from_slice(b"\xff\xfe\n");
        bytes.extend_from_slice(b"{\"title\": \"ok2\"}\n");
        let mut docs = DocumentReader::new(Cursor::new(bytes), 10);

        let batch = docs.next_batch(10).unwrap();

        assert_eq!(batch.iter().map(|d| d.title.as_str()).collect::<Vec<_>>(), vec!["ok1", "ok2"]);
        assert_eq!(docs.skipped(), 1);
    }

    #[test]
    fn test_mixed_ids_stay_unique() {
        let mut docs = reader("{\"id\": 2}\n{}\n{}\n{\"id\": 3}\n{\"id\": 10}\n{}\n", 10);
        let all: Vec<Document> = docs.by_ref().collect::<Result<_>>().unwrap();

        assert_eq!(all.iter().map(Document::key).collect::<Vec<_>>(), vec![2, 3, 4, 10, 11]);
        assert_eq!(docs.skipped(), 1);
        assert_eq!(docs.accepted(), 5);
    }

    #[test]
    fn test_stops_at_limit() {
        let text: String = (0..10).map(|i| format!("{{\"title\": \"t{}\"}}\n", i)).collect();
        let mut docs = reader(&text, 4);

        let first = docs.next_batch(3).unwrap();
        let second = docs.next_batch(3).unwrap();
        let third = docs.next_batch(3).unwrap();

        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 1);
        assert!(third.is_empty());
    }

    #[test]
    fn test_missing_file() {
        assert!(DocumentReader::open("/nonexistent/documents_small.json", 10).is_err());
    }
}
