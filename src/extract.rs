//! Per-document sentence extraction
//!
//! Reads trees one at a time, evaluates the query against each and writes
//! the sentence of every matching tree as one line. A tree is dropped as
//! soon as it has been handled.

use crate::eval::EvalError;
use crate::progress::Progress;
use crate::query::Query;
use crate::reader::{ReadError, TreeReader};
use crate::tree::Tree;
use std::io::{self, BufRead, Write};
use thiserror::Error;
use tracing::trace;

/// Child of `alpino_ds` holding the raw sentence
pub const SENTENCE_TAG: &str = "sentence";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error("tree {tree}: query evaluation failed: {source}")]
    Eval { tree: usize, source: EvalError },

    #[error("tree {tree}: matched but has no <sentence> element")]
    MissingSentence { tree: usize },

    #[error("tree {tree}: matched but its <sentence> has no text")]
    MissingSentenceText { tree: usize },

    #[error("failed to write output: {0}")]
    Write(#[from] io::Error),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractSummary {
    pub trees: usize,
    pub matches: usize,
    pub bytes_written: u64,
}

/// Sentence of tree number `index`, without surrounding whitespace
pub fn sentence_text(tree: &Tree, index: usize) -> Result<&str, ExtractError> {
    let sentence = tree
        .root()
        .and_then(|root| tree.child_element(root, SENTENCE_TAG))
        .ok_or(ExtractError::MissingSentence { tree: index })?;
    let text = tree
        .text(sentence)
        .ok_or(ExtractError::MissingSentenceText { tree: index })?;
    Ok(text.trim())
}

/// Write the sentence of every tree in `input` that `query` matches
pub fn extract<R: BufRead, W: Write>(
    input: R,
    query: &Query,
    output: &mut W,
    progress: &mut dyn Progress,
) -> Result<ExtractSummary, ExtractError> {
    let mut summary = ExtractSummary::default();

    for (i, tree) in TreeReader::new(input).enumerate() {
        let tree = tree?;
        let index = i + 1;
        let matched = query
            .matches(&tree)
            .map_err(|source| ExtractError::Eval { tree: index, source })?;

        if matched {
            let sentence = sentence_text(&tree, index)?;
            trace!(tree = index, sentence, "match");
            writeln!(output, "{sentence}")?;
            summary.matches += 1;
            summary.bytes_written += sentence.len() as u64 + 1;
        }
        summary.trees = index;
        progress.tree_done(index, matched);
    }

    output.flush()?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::Silent;

    const A_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<treebank>
  <alpino_ds version="1.3">
    <node cat="top" id="0" rel="top">
      <node id="1" rel="su" word="Hij"/>
      <node id="2" rel="hd" word="loopt"/>
    </node>
    <sentence>Hij loopt.</sentence>
  </alpino_ds>
  <alpino_ds version="1.3">
    <node cat="top" id="0" rel="top">
      <node id="1" rel="hd" word="Regent"/>
    </node>
    <sentence>Regent.</sentence>
  </alpino_ds>
  <alpino_ds version="1.3">
    <node cat="top" id="0" rel="top">
      <node id="1" rel="su" word="Wij"/>
      <node id="2" rel="hd" word="zwemmen"/>
    </node>
    <sentence>  Wij   zwemmen.
</sentence>
  </alpino_ds>
</treebank>
"#;

    fn run(xml: &str, query: &str) -> Result<(String, ExtractSummary), ExtractError> {
        let query = Query::scoped(query).unwrap();
        let mut out = Vec::new();
        let summary = extract(xml.as_bytes(), &query, &mut out, &mut Silent)?;
        Ok((String::from_utf8(out).unwrap(), summary))
    }

    #[test]
    fn test_matching_sentences_in_order() {
        let (out, summary) = run(A_XML, r#"//node[@rel="su"]"#).unwrap();
        assert_eq!(out, "Hij loopt.\nWij   zwemmen.\n");
        assert_eq!(summary.trees, 3);
        assert_eq!(summary.matches, 2);
        assert_eq!(summary.bytes_written, out.len() as u64);
    }

    #[test]
    fn test_no_matches_writes_nothing() {
        let (out, summary) = run(A_XML, r#"//node[@rel="obj1"]"#).unwrap();
        assert!(out.is_empty());
        assert_eq!(summary.matches, 0);
        assert_eq!(summary.bytes_written, 0);
    }

    #[test]
    fn test_query_is_scoped_to_each_tree() {
        // An unscoped absolute path would see the whole document
        let (out, _) = run(A_XML, r#"//node[@word="Regent"]"#).unwrap();
        assert_eq!(out, "Regent.\n");
    }

    #[test]
    fn test_missing_sentence() {
        let xml = r#"<treebank><alpino_ds><node rel="su"/></alpino_ds></treebank>"#;
        let err = run(xml, r#"//node[@rel="su"]"#).unwrap_err();
        assert!(matches!(err, ExtractError::MissingSentence { tree: 1 }));
    }

    #[test]
    fn test_missing_sentence_ignored_without_match() {
        let xml = r#"<treebank><alpino_ds><node rel="hd"/></alpino_ds></treebank>"#;
        let (out, summary) = run(xml, r#"//node[@rel="su"]"#).unwrap();
        assert!(out.is_empty());
        assert_eq!(summary.trees, 1);
    }

    #[test]
    fn test_empty_sentence_is_an_error() {
        let xml = r#"<treebank>
<alpino_ds><node rel="su"/><sentence>Ja.</sentence></alpino_ds>
<alpino_ds><node rel="su"/><sentence/></alpino_ds>
</treebank>"#;
        let err = run(xml, r#"//node[@rel="su"]"#).unwrap_err();
        assert!(matches!(err, ExtractError::MissingSentenceText { tree: 2 }));
    }

    #[test]
    fn test_whitespace_sentence_writes_empty_line() {
        let xml = r#"<alpino_ds><node rel="su"/><sentence>   </sentence></alpino_ds>"#;
        let (out, _) = run(xml, r#"//node[@rel="su"]"#).unwrap();
        assert_eq!(out, "\n");
    }

    #[test]
    fn test_sentence_text_before_first_child() {
        let xml = r#"<alpino_ds><sentence> Ik <b>ook</b> niet </sentence></alpino_ds>"#;
        let tree = TreeReader::from_bytes(xml.as_bytes()).next().unwrap().unwrap();
        assert_eq!(sentence_text(&tree, 1).unwrap(), "Ik");
    }

    #[test]
    fn test_sentence_text_stops_at_comment() {
        let xml = r#"<alpino_ds><node rel="su"/><sentence>Hij<!-- c --> loopt.</sentence></alpino_ds>"#;
        let (out, _) = run(xml, r#"//node[@rel="su"]"#).unwrap();
        assert_eq!(out, "Hij\n");
    }

    #[test]
    fn test_sentence_starting_with_comment_has_no_text() {
        let xml = r#"<alpino_ds><node rel="su"/><sentence><!-- c -->Hij loopt.</sentence></alpino_ds>"#;
        let err = run(xml, r#"//node[@rel="su"]"#).unwrap_err();
        assert!(matches!(err, ExtractError::MissingSentenceText { tree: 1 }));
    }

    #[test]
    fn test_malformed_xml_after_output() {
        let xml = r#"<treebank>
<alpino_ds><node rel="su"/><sentence>Ja.</sentence></alpino_ds>
<alpino_ds><node rel="su"></alpino_ds>
</treebank>"#;
        let query = Query::scoped(r#"//node[@rel="su"]"#).unwrap();
        let mut out = Vec::new();
        let err = extract(xml.as_bytes(), &query, &mut out, &mut Silent).unwrap_err();
        assert!(matches!(err, ExtractError::Read(_)));
        assert_eq!(out, b"Ja.\n");
    }

    #[test]
    fn test_eval_error_reports_tree() {
        let query = Query::compile("count('x')").unwrap();
        let mut out = Vec::new();
        let err = extract(A_XML.as_bytes(), &query, &mut out, &mut Silent).unwrap_err();
        assert!(matches!(err, ExtractError::Eval { tree: 1, .. }));
    }

    #[test]
    fn test_progress_sees_every_tree() {
        #[derive(Default)]
        struct Record(Vec<(usize, bool)>);
        impl Progress for Record {
            fn tree_done(&mut self, index: usize, matched: bool) {
                self.0.push((index, matched));
            }
        }

        let query = Query::scoped(r#"//node[@rel="su"]"#).unwrap();
        let mut record = Record::default();
        extract(A_XML.as_bytes(), &query, &mut io::sink(), &mut record).unwrap();
        assert_eq!(record.0, vec![(1, true), (2, false), (3, true)]);
    }
}
