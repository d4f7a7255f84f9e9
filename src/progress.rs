//! Progress reporting
//!
//! The extractor and the corpus runner report to a [`Progress`] observer
//! passed in by the caller. Every hook has a no-op default.

use crate::corpus::{FileSummary, RunSummary};
use std::path::Path;
use tracing::{debug, info};

pub trait Progress {
    /// A run over `files` input files is starting
    fn start_run(&mut self, _files: usize) {}

    /// `total` is the exact tree count, when it was computed up front
    fn start_file(&mut self, _path: &Path, _total: Option<usize>) {}

    /// Tree `index` (1-based) has been evaluated
    fn tree_done(&mut self, _index: usize, _matched: bool) {}

    fn finish_file(&mut self, _path: &Path, _summary: &FileSummary) {}

    fn finish_run(&mut self, _summary: &RunSummary) {}
}

/// Reports nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl Progress for Silent {}

/// Reports through `tracing`: files at info, tree counts at debug
#[derive(Debug, Clone)]
pub struct LogProgress {
    every: usize,
    total: Option<usize>,
    matches: usize,
}

impl LogProgress {
    pub const DEFAULT_INTERVAL: usize = 10_000;

    /// Log the tree count once every `every` trees
    pub fn new(every: usize) -> Self {
        Self {
            every: every.max(1),
            total: None,
            matches: 0,
        }
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL)
    }
}

impl Progress for LogProgress {
    fn start_run(&mut self, files: usize) {
        info!(files, "starting extraction");
    }

    fn start_file(&mut self, path: &Path, total: Option<usize>) {
        self.total = total;
        self.matches = 0;
        match total {
            Some(trees) => info!(path = %path.display(), trees, "processing"),
            None => info!(path = %path.display(), "processing"),
        }
    }

    fn tree_done(&mut self, index: usize, matched: bool) {
        if matched {
            self.matches += 1;
        }
        if index % self.every == 0 {
            match self.total {
                Some(total) => debug!(matches = self.matches, "{index}/{total} trees"),
                None => debug!(matches = self.matches, "{index} trees"),
            }
        }
    }

    fn finish_file(&mut self, path: &Path, summary: &FileSummary) {
        let extract = &summary.extract;
        match &summary.output {
            Some(output) => info!(
                path = %path.display(),
                output = %output.display(),
                trees = extract.trees,
                matches = extract.matches,
                "done"
            ),
            None => info!(
                path = %path.display(),
                trees = extract.trees,
                "done, no matches"
            ),
        }
    }

    fn finish_run(&mut self, summary: &RunSummary) {
        info!(
            files = summary.files,
            outputs = summary.outputs,
            trees = summary.trees,
            matches = summary.matches,
            "extraction finished"
        );
    }
}
