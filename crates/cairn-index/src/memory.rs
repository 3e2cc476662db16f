//! In-memory inverted index.
//!
//! Documents are tokenized into lowercase alphanumeric terms. Staged
//! operations are buffered per transaction and replayed on commit, so a
//! rollback simply drops the buffer.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use tracing::debug;

use crate::document::IndexDocument;
use crate::error::{IndexError, IndexResult};
use crate::traits::Indexer;

/// A ranked search result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchHit {
    pub path: String,
    /// Total occurrences of the query terms in the document.
    pub score: u32,
}

#[derive(Clone, Debug)]
enum PendingOp {
    Add(IndexDocument),
    Delete(String),
    DeleteSubtree(String),
}

#[derive(Debug, Default)]
struct State {
    documents: BTreeMap<String, IndexDocument>,
    term_counts: HashMap<String, HashMap<String, u32>>,
    postings: HashMap<String, BTreeSet<String>>,
    pending: Option<Vec<PendingOp>>,
}

impl State {
    fn insert(&mut self, document: IndexDocument) {
        self.remove(&document.path.clone());
        let mut counts: HashMap<String, u32> = HashMap::new();
        for term in tokenize(&document.text()) {
            *counts.entry(term).or_default() += 1;
        }
        for term in counts.keys() {
            self.postings
                .entry(term.clone())
                .or_default()
                .insert(document.path.clone());
        }
        self.term_counts.insert(document.path.clone(), counts);
        self.documents.insert(document.path.clone(), document);
    }

    fn remove(&mut self, path: &str) -> bool {
        let Some(counts) = self.term_counts.remove(path) else {
            return false;
        };
        for term in counts.keys() {
            if let Some(paths) = self.postings.get_mut(term) {
                paths.remove(path);
                if paths.is_empty() {
                    self.postings.remove(term);
                }
            }
        }
        self.documents.remove(path);
        true
    }

    fn remove_subtree(&mut self, path: &str) -> usize {
        let prefix = if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{path}/")
        };
        let doomed: Vec<String> = self
            .documents
            .keys()
            .filter(|k| k.as_str() == path || k.starts_with(&prefix))
            .cloned()
            .collect();
        doomed.iter().filter(|p| self.remove(p)).count()
    }

    fn stage(&mut self, op: PendingOp) -> IndexResult<()> {
        self.pending
            .as_mut()
            .ok_or(IndexError::NoTransaction)?
            .push(op);
        Ok(())
    }
}

/// Split text into lowercase alphanumeric terms.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Token inverted index held in memory.
#[derive(Debug, Default)]
pub struct InMemoryIndexer {
    state: RwLock<State>,
}

impl InMemoryIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed documents.
    pub fn len(&self) -> usize {
        self.state.read().expect("lock poisoned").documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, path: &str) -> Option<IndexDocument> {
        self.state
            .read()
            .expect("lock poisoned")
            .documents
            .get(path)
            .cloned()
    }

    pub fn in_transaction(&self) -> bool {
        self.state.read().expect("lock poisoned").pending.is_some()
    }

    /// Committed document paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.state
            .read()
            .expect("lock poisoned")
            .documents
            .keys()
            .cloned()
            .collect()
    }

    /// Documents containing every term of `query`, best first.
    pub fn search(&self, query: &str) -> Vec<SearchHit> {
        let terms = tokenize(query);
        if terms.is_empty() {
            return Vec::new();
        }
        let state = self.state.read().expect("lock poisoned");
        let mut candidates: Option<BTreeSet<String>> = None;
        for term in &terms {
            let paths = state.postings.get(term).cloned().unwrap_or_default();
            candidates = Some(match candidates {
                None => paths,
                Some(acc) => acc.intersection(&paths).cloned().collect(),
            });
        }

        let mut hits: Vec<SearchHit> = candidates
            .unwrap_or_default()
            .into_iter()
            .map(|path| {
                let score = state
                    .term_counts
                    .get(&path)
                    .map(|counts| terms.iter().filter_map(|t| counts.get(t)).sum::<u32>())
                    .unwrap_or(0);
                SearchHit { path, score }
            })
            .collect();
        hits.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.path.cmp(&b.path)));
        hits
    }
}

impl Indexer for InMemoryIndexer {
    fn begin(&self) -> IndexResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        if state.pending.is_some() {
            return Err(IndexError::TransactionActive);
        }
        state.pending = Some(Vec::new());
        Ok(())
    }

    fn add_document(&self, document: IndexDocument) -> IndexResult<()> {
        self.state
            .write()
            .expect("lock poisoned")
            .stage(PendingOp::Add(document))
    }

    fn delete_document(&self, path: &str) -> IndexResult<()> {
        self.state
            .write()
            .expect("lock poisoned")
            .stage(PendingOp::Delete(path.to_string()))
    }

    fn delete_subtree(&self, path: &str) -> IndexResult<()> {
        self.state
            .write()
            .expect("lock poisoned")
            .stage(PendingOp::DeleteSubtree(path.to_string()))
    }

    fn commit(&self) -> IndexResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        let ops = state.pending.take().ok_or(IndexError::NoTransaction)?;
        let count = ops.len();
        for op in ops {
            match op {
                PendingOp::Add(document) => state.insert(document),
                PendingOp::Delete(path) => {
                    state.remove(&path);
                }
                PendingOp::DeleteSubtree(path) => {
                    state.remove_subtree(&path);
                }
            }
        }
        debug!(operations = count, documents = state.documents.len(), "index commit");
        Ok(())
    }

    fn rollback(&self) -> IndexResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        let dropped = state.pending.take().map(|ops| ops.len()).unwrap_or(0);
        debug!(dropped, "index rollback");
        Ok(())
    }
}
