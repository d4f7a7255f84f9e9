//! Directory-level extraction
//!
//! Runs the extractor over every input file of a source directory, writing
//! `<destination>/<stem>.txt` per file. Outputs that end up empty are
//! removed. The first error aborts the run; outputs already written stay.

use crate::extract::{ExtractError, ExtractSummary, extract};
use crate::normalize::normalize;
use crate::parser::QueryError;
use crate::progress::Progress;
use crate::query::{Query, QuerySource};
use crate::reader::{count_trees, open_input, read_input};
use glob::Pattern;
use std::fs::{self, File};
use std::io::{self, BufRead, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Layout of the input files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InputFormat {
    /// Well-formed `.xml` documents, streamed
    #[default]
    Xml,
    /// Concatenated `.data` dumps, normalized in memory first
    Sharded,
}

impl InputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Xml => "xml",
            Self::Sharded => "data",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CorpusConfig {
    pub source_dir: PathBuf,
    pub destination_dir: PathBuf,
    pub query: QuerySource,
    pub format: InputFormat,
    /// Count the trees of each file before extracting from it
    pub exact_progress: bool,
}

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("source directory {} does not exist", .0.display())]
    MissingSource(PathBuf),

    #[error("cannot create destination directory {}", .path.display())]
    CreateDestination { path: PathBuf, source: io::Error },

    #[error("cannot read query file {}", .path.display())]
    QueryFile { path: PathBuf, source: io::Error },

    #[error("invalid query {query:?}")]
    Query { query: String, source: QueryError },

    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    #[error(transparent)]
    Scan(#[from] glob::GlobError),

    #[error("cannot open {}", .path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("cannot write {}", .path.display())]
    Output { path: PathBuf, source: io::Error },

    #[error("failed to process {}", .path.display())]
    Extract { path: PathBuf, source: ExtractError },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSummary {
    pub input: PathBuf,
    /// `None` when nothing matched and the output was removed
    pub output: Option<PathBuf>,
    pub extract: ExtractSummary,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub files: usize,
    /// Files that produced a non-empty output
    pub outputs: usize,
    pub trees: usize,
    pub matches: usize,
}

/// Input files of `dir` in sorted order, plain and gzipped
///
/// A gzipped file whose plain twin is also present (`a.xml` next to
/// `a.xml.gz`) is skipped, since both would write `a.txt`.
pub fn input_files(dir: &Path, format: InputFormat) -> Result<Vec<PathBuf>, CorpusError> {
    let dir = Pattern::escape(&dir.to_string_lossy());
    let ext = format.extension();

    let mut files = Vec::new();
    for entry in glob::glob(&format!("{dir}/*.{ext}"))? {
        let path = entry?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    let mut gzipped = Vec::new();
    for entry in glob::glob(&format!("{dir}/*.{ext}.gz"))? {
        let path = entry?;
        if !path.is_file() {
            continue;
        }
        let plain = path.with_extension("");
        if files.binary_search(&plain).is_ok() {
            warn!(
                path = %path.display(),
                plain = %plain.display(),
                "skipping gzipped input, its plain twin is read instead"
            );
        } else {
            gzipped.push(path);
        }
    }

    files.append(&mut gzipped);
    files.sort();
    Ok(files)
}

/// `<destination>/<stem>.txt`, where a `.gz` suffix is not part of the stem
pub fn output_path(destination: &Path, input: &Path) -> PathBuf {
    let mut name = PathBuf::from(input.file_name().unwrap_or_default());
    if name.extension().is_some_and(|ext| ext == "gz") {
        name.set_extension("");
    }
    name.set_extension("txt");
    destination.join(name)
}

/// Extract from one input file into its output file
pub fn process_file(
    config: &CorpusConfig,
    query: &Query,
    input: &Path,
    progress: &mut dyn Progress,
) -> Result<FileSummary, CorpusError> {
    let open_error = |source| CorpusError::Open {
        path: input.to_path_buf(),
        source,
    };
    let extract_error = |source| CorpusError::Extract {
        path: input.to_path_buf(),
        source,
    };
    let read_error = |source: crate::reader::ReadError| extract_error(source.into());

    let output = output_path(&config.destination_dir, input);
    let output_error = |source| CorpusError::Output {
        path: output.clone(),
        source,
    };

    // The output is only created once the input is open
    let document;
    let (reader, total): (Box<dyn BufRead + '_>, Option<usize>) = match config.format {
        InputFormat::Xml => {
            let total = if config.exact_progress {
                Some(count_trees(open_input(input).map_err(open_error)?).map_err(read_error)?)
            } else {
                None
            };
            (open_input(input).map_err(open_error)?, total)
        }
        InputFormat::Sharded => {
            document = normalize(&read_input(input).map_err(open_error)?);
            let total = if config.exact_progress {
                Some(count_trees(document.as_slice()).map_err(read_error)?)
            } else {
                None
            };
            (Box::new(document.as_slice()) as Box<dyn BufRead + '_>, total)
        }
    };

    let mut writer = BufWriter::new(File::create(&output).map_err(output_error)?);
    progress.start_file(input, total);
    let summary = extract(reader, query, &mut writer, progress).map_err(extract_error)?;
    drop(writer);

    let output = if summary.bytes_written == 0 {
        fs::remove_file(&output).map_err(output_error)?;
        debug!(path = %output.display(), "removed empty output");
        None
    } else {
        Some(output)
    };

    Ok(FileSummary {
        input: input.to_path_buf(),
        output,
        extract: summary,
    })
}

/// Resolve and compile the query, then process every input file in order
pub fn run(config: &CorpusConfig, progress: &mut dyn Progress) -> Result<RunSummary, CorpusError> {
    if !config.source_dir.is_dir() {
        return Err(CorpusError::MissingSource(config.source_dir.clone()));
    }

    let text = match &config.query {
        QuerySource::Literal(text) => text.clone(),
        QuerySource::File(path) => config.query.resolve().map_err(|source| CorpusError::QueryFile {
            path: path.clone(),
            source,
        })?,
    };
    let query = Query::scoped(&text).map_err(|source| CorpusError::Query {
        query: text.clone(),
        source,
    })?;
    info!(query = query.as_str(), "compiled query");

    fs::create_dir_all(&config.destination_dir).map_err(|source| CorpusError::CreateDestination {
        path: config.destination_dir.clone(),
        source,
    })?;

    let files = input_files(&config.source_dir, config.format)?;
    debug!(
        dir = %config.source_dir.display(),
        count = files.len(),
        "found input files"
    );
    progress.start_run(files.len());

    let mut summary = RunSummary::default();
    for input in &files {
        let file = process_file(config, &query, input, progress)?;
        summary.files += 1;
        summary.outputs += usize::from(file.output.is_some());
        summary.trees += file.extract.trees;
        summary.matches += file.extract.matches;
        progress.finish_file(input, &file);
    }

    progress.finish_run(&summary);
    Ok(summary)
}
