//! Streaming `alpino_ds` reader
//!
//! Pulls XML events one at a time and only builds node structure while
//! inside an `alpino_ds` element. A finished tree is handed to the caller
//! before the next byte of the document is read, so memory is bounded by
//! the largest single tree no matter how big the file is.
//!
//! The reader also enforces the document-level rules a conforming XML
//! parser would: one root element, no text outside it, no misplaced XML
//! declarations, no unclosed elements at end of input.

use crate::names::NamePool;
use crate::tree::{Attribute, DOCUMENT, NodeId, Tree};
use flate2::bufread::MultiGzDecoder;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use thiserror::Error;

/// Element name of a single parse tree
pub const TREE_TAG: &str = "alpino_ds";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
pub(crate) const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("XML error at byte {position}: {source}")]
    Xml {
        position: u64,
        source: quick_xml::Error,
    },

    #[error("malformed document at byte {position}: {message}")]
    Malformed { position: u64, message: String },
}

/// Open a file for reading, decompressing it if it is gzipped
pub fn open_input(path: &Path) -> io::Result<Box<dyn BufRead>> {
    let mut reader = BufReader::new(File::open(path)?);
    let is_gzip = reader.fill_buf()?.starts_with(&GZIP_MAGIC);
    if is_gzip {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(reader))))
    } else {
        Ok(Box::new(reader))
    }
}

/// Read a whole (possibly gzipped) file into memory
pub fn read_input(path: &Path) -> io::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    open_input(path)?.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Count the trees in a document without building any of them
pub fn count_trees<R: BufRead>(input: R) -> Result<usize, ReadError> {
    let mut reader = TreeReader::counting(input);
    while reader.advance()?.is_some() {}
    Ok(reader.trees_read)
}

/// Well-formedness bookkeeping outside of the trees themselves
#[derive(Debug, Default)]
struct DocumentState {
    depth: usize,
    seen_root: bool,
    started: bool,
}

impl DocumentState {
    fn start(&mut self) -> Result<(), &'static str> {
        if self.depth == 0 {
            if self.seen_root {
                return Err("content after the root element");
            }
            self.seen_root = true;
        }
        self.started = true;
        self.depth += 1;
        Ok(())
    }

    fn end(&mut self) -> Result<(), &'static str> {
        if self.depth == 0 {
            return Err("closing tag without a matching opening tag");
        }
        self.depth -= 1;
        Ok(())
    }

    fn text(&mut self, bytes: &[u8]) -> Result<(), &'static str> {
        if is_blank(bytes) {
            return Ok(());
        }
        if self.depth == 0 {
            return Err("text outside the root element");
        }
        self.started = true;
        Ok(())
    }

    fn declaration(&self) -> Result<(), &'static str> {
        if self.started {
            Err("XML declaration is only allowed at the start of the document")
        } else {
            Ok(())
        }
    }

    fn finish(&self) -> Result<(), &'static str> {
        if self.depth > 0 {
            Err("unexpected end of document inside an open element")
        } else if !self.seen_root {
            Err("document has no root element")
        } else {
            Ok(())
        }
    }
}

fn is_blank(bytes: &[u8]) -> bool {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    bytes.iter().all(u8::is_ascii_whitespace)
}

/// Collects the nodes of the tree currently being read
struct TreeBuilder {
    tree: Tree,
    open: Vec<NodeId>,
}

impl TreeBuilder {
    fn new(names: NamePool) -> Self {
        Self {
            tree: Tree::new(names),
            open: vec![DOCUMENT],
        }
    }

    fn current(&self) -> NodeId {
        self.open.last().copied().unwrap_or(DOCUMENT)
    }

    fn start(&mut self, name: &str, attributes: Vec<Attribute>) {
        let id = self.tree.add_element(self.current(), name, attributes);
        self.open.push(id);
    }

    /// Close the innermost element; true once the tree's root is closed
    fn end(&mut self) -> bool {
        if let Some(id) = self.open.pop() {
            self.tree.close(id);
        }
        if self.open.len() == 1 {
            self.tree.close(DOCUMENT);
            true
        } else {
            false
        }
    }

    fn text(&mut self, text: &str) {
        let parent = self.current();
        self.tree.add_text(parent, text);
    }

    fn comment(&mut self, comment: &str) {
        let parent = self.current();
        self.tree.add_comment(parent, comment);
    }

    fn instruction(&mut self, instruction: &str) {
        let parent = self.current();
        self.tree.add_instruction(parent, instruction);
    }
}

/// What is being captured right now
enum Capture {
    Outside,
    Build(TreeBuilder),
    /// Counting mode: depth inside the current tree
    Skip(usize),
}

/// Iterator over the `alpino_ds` trees of a document
///
/// Trees are yielded in document order. An error ends the iteration.
pub struct TreeReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    names: NamePool,
    state: DocumentState,
    build: bool,
    done: bool,
    trees_read: usize,
}

impl TreeReader<Box<dyn BufRead>> {
    /// Create a reader from a file path (plain or gzipped)
    pub fn from_file(path: &Path) -> io::Result<Self> {
        Ok(Self::new(open_input(path)?))
    }
}

impl<'a> TreeReader<&'a [u8]> {
    /// Create a reader over an in-memory document
    pub fn from_bytes(bytes: &'a [u8]) -> Self {
        Self::new(bytes)
    }
}

impl<R: BufRead> TreeReader<R> {
    pub fn new(input: R) -> Self {
        Self::with_names(input, NamePool::new())
    }

    /// Create a reader whose trees intern names into an existing pool
    pub fn with_names(input: R, names: NamePool) -> Self {
        let mut reader = Reader::from_reader(input);
        let config = reader.config_mut();
        config.expand_empty_elements = true;
        config.check_end_names = true;
        Self {
            reader,
            buf: Vec::new(),
            names,
            state: DocumentState::default(),
            build: true,
            done: false,
            trees_read: 0,
        }
    }

    fn counting(input: R) -> Self {
        let mut reader = Self::new(input);
        reader.build = false;
        reader
    }

    pub fn names(&self) -> &NamePool {
        &self.names
    }

    /// Number of trees completed so far
    pub fn trees_read(&self) -> usize {
        self.trees_read
    }

    /// Read until the next tree closes
    ///
    /// Returns `Ok(None)` at the end of a well-formed document. In counting
    /// mode the returned tree is always `None` inside `Some`.
    fn advance(&mut self) -> Result<Option<Option<Tree>>, ReadError> {
        let Self {
            reader,
            buf,
            names,
            state,
            build,
            trees_read,
            ..
        } = self;
        let mut capture = Capture::Outside;

        loop {
            buf.clear();
            let event = match reader.read_event_into(buf) {
                Ok(event) => event,
                Err(source) => {
                    return Err(ReadError::Xml {
                        position: reader.error_position() as u64,
                        source,
                    });
                }
            };
            let position = reader.buffer_position() as u64;
            let malformed = |message: &str| ReadError::Malformed {
                position,
                message: message.to_string(),
            };

            match event {
                Event::Start(start) => {
                    state.start().map_err(malformed)?;
                    match &mut capture {
                        Capture::Build(builder) => {
                            let name = element_name(&start, position)?;
                            builder.start(name, attributes(&start, names, position)?);
                        }
                        Capture::Skip(depth) => *depth += 1,
                        Capture::Outside => {
                            if start.name().as_ref() == TREE_TAG.as_bytes() {
                                capture = if *build {
                                    let mut builder = TreeBuilder::new(names.clone());
                                    builder.start(TREE_TAG, attributes(&start, names, position)?);
                                    Capture::Build(builder)
                                } else {
                                    Capture::Skip(1)
                                };
                            }
                        }
                    }
                }
                Event::End(_) => {
                    state.end().map_err(malformed)?;
                    match &mut capture {
                        Capture::Build(builder) => {
                            if builder.end() {
                                *trees_read += 1;
                                if let Capture::Build(builder) =
                                    std::mem::replace(&mut capture, Capture::Outside)
                                {
                                    return Ok(Some(Some(builder.tree)));
                                }
                            }
                        }
                        Capture::Skip(depth) => {
                            *depth -= 1;
                            if *depth == 0 {
                                *trees_read += 1;
                                return Ok(Some(None));
                            }
                        }
                        Capture::Outside => {}
                    }
                }
                Event::Text(text) => {
                    state.text(&text).map_err(malformed)?;
                    if let Capture::Build(builder) = &mut capture {
                        let text = text.unescape().map_err(|source| ReadError::Xml {
                            position,
                            source,
                        })?;
                        builder.text(&text);
                    }
                }
                Event::CData(cdata) => {
                    if state.depth == 0 {
                        return Err(malformed("CDATA outside the root element"));
                    }
                    state.started = true;
                    if let Capture::Build(builder) = &mut capture {
                        let text = std::str::from_utf8(&cdata)
                            .map_err(|_| malformed("CDATA section is not valid UTF-8"))?;
                        builder.text(text);
                    }
                }
                Event::Comment(comment) => {
                    state.started = true;
                    if let Capture::Build(builder) = &mut capture {
                        let comment = std::str::from_utf8(&comment)
                            .map_err(|_| malformed("comment is not valid UTF-8"))?;
                        builder.comment(comment);
                    }
                }
                Event::PI(instruction) => {
                    state.started = true;
                    if let Capture::Build(builder) = &mut capture {
                        let instruction = std::str::from_utf8(&instruction)
                            .map_err(|_| malformed("processing instruction is not valid UTF-8"))?;
                        builder.instruction(instruction);
                    }
                }
                Event::Decl(_) => state.declaration().map_err(malformed)?,
                Event::Eof => {
                    state.finish().map_err(malformed)?;
                    return Ok(None);
                }
                _ => state.started = true,
            }
        }
    }
}

fn element_name<'e>(start: &'e BytesStart<'_>, position: u64) -> Result<&'e str, ReadError> {
    std::str::from_utf8(start.name().into_inner()).map_err(|_| ReadError::Malformed {
        position,
        message: "element name is not valid UTF-8".to_string(),
    })
}

fn attributes(
    start: &BytesStart<'_>,
    names: &NamePool,
    position: u64,
) -> Result<Vec<Attribute>, ReadError> {
    let xml_error = |source: quick_xml::Error| ReadError::Xml { position, source };
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| xml_error(e.into()))?;
        let key = std::str::from_utf8(attr.key.as_ref()).map_err(|_| ReadError::Malformed {
            position,
            message: "attribute name is not valid UTF-8".to_string(),
        })?;
        let value = attr.unescape_value().map_err(xml_error)?;
        attributes.push(Attribute {
            name: names.intern(key),
            value: value.into_owned(),
        });
    }
    Ok(attributes)
}

impl<R: BufRead> Iterator for TreeReader<R> {
    type Item = Result<Tree, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(Some(tree))) => Some(Ok(tree)),
            Ok(_) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TWO_TREES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<treebank>
  <alpino_ds version="1.3">
    <node id="0" cat="top" rel="top">
      <node id="1" rel="su" word="Hij"/>
      <node id="2" rel="hd" word="loopt"/>
    </node>
    <sentence sentid="1">Hij loopt.</sentence>
  </alpino_ds>
  <alpino_ds version="1.3">
    <node id="0" cat="top" rel="top"/>
    <sentence sentid="2">  Zij &amp; ik  </sentence>
  </alpino_ds>
</treebank>
"#;

    fn read_all(xml: &str) -> Result<Vec<Tree>, ReadError> {
        TreeReader::from_bytes(xml.as_bytes()).collect()
    }

    #[test]
    fn test_reads_trees_in_order() {
        let trees = read_all(TWO_TREES).unwrap();

        assert_eq!(trees.len(), 2);
        let root = trees[0].root().unwrap();
        assert_eq!(trees[0].name(root), Some("alpino_ds"));
        assert_eq!(trees[0].attribute(root, "version"), Some("1.3"));

        let sentence = trees[1].child_element(trees[1].root().unwrap(), "sentence").unwrap();
        assert_eq!(trees[1].text(sentence), Some("  Zij & ik  "));
    }

    #[test]
    fn test_tree_contains_only_its_own_nodes() {
        let trees = read_all(TWO_TREES).unwrap();
        let elements = |tree: &Tree| tree.nodes.iter().filter(|n| n.is_element()).count();

        assert_eq!(elements(&trees[0]), 5);
        assert_eq!(elements(&trees[1]), 3);
    }

    #[test]
    fn test_trees_share_name_pool() {
        let mut reader = TreeReader::from_bytes(TWO_TREES.as_bytes());
        let first = reader.next().unwrap().unwrap();
        let names_after_first = reader.names().len();
        let second = reader.next().unwrap().unwrap();

        assert_eq!(reader.names().len(), names_after_first);
        assert_eq!(first.names().lookup("node"), second.names().lookup("node"));
        assert_eq!(reader.trees_read(), 2);
    }

    #[test]
    fn test_top_level_tree() {
        let trees = read_all("<alpino_ds><sentence>Ja.</sentence></alpino_ds>").unwrap();
        assert_eq!(trees.len(), 1);
    }

    #[test]
    fn test_nested_tree_belongs_to_outer() {
        let xml = "<alpino_ds><alpino_ds/><sentence>Ja.</sentence></alpino_ds>";
        let trees = read_all(xml).unwrap();

        assert_eq!(trees.len(), 1);
        assert_eq!(trees[0].children(trees[0].root().unwrap()).len(), 2);
    }

    #[test]
    fn test_document_without_trees() {
        assert!(read_all("<treebank/>").unwrap().is_empty());
    }

    #[test]
    fn test_cdata_merges_with_text() {
        let xml = "<alpino_ds><sentence>a <![CDATA[<b>]]> c</sentence></alpino_ds>";
        let trees = read_all(xml).unwrap();
        let sentence = trees[0].child_element(1, "sentence").unwrap();

        assert_eq!(trees[0].text(sentence), Some("a <b> c"));
    }

    #[test]
    fn test_comments_and_instructions_kept_in_tree() {
        let xml = "<!-- head --><alpino_ds><sentence>Hij<!-- c --> loopt<?pi x?>.</sentence></alpino_ds>";
        let trees = read_all(xml).unwrap();
        let sentence = trees[0].child_element(1, "sentence").unwrap();
        let children = trees[0].children(sentence);

        assert_eq!(children.len(), 4);
        assert_eq!(trees[0].text(sentence), Some("Hij"));
        assert_eq!(trees[0].string_value(children[1]), " c ");
        assert_eq!(trees[0].string_value(children[3]), "pi x");
        assert_eq!(trees[0].string_value(sentence), "Hij loopt.");
    }

    #[test]
    fn test_error_on_multiple_roots() {
        let xml = "<alpino_ds/>\n<alpino_ds/>\n";
        let mut reader = TreeReader::from_bytes(xml.as_bytes());

        assert!(reader.next().unwrap().is_ok());
        assert!(matches!(reader.next(), Some(Err(ReadError::Malformed { .. }))));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_error_on_late_declaration() {
        let xml = "<root>\n<?xml version=\"1.0\"?>\n<alpino_ds/></root>";
        assert!(matches!(read_all(xml), Err(ReadError::Malformed { .. })));
    }

    #[test]
    fn test_error_on_unclosed_element() {
        let xml = "<treebank><alpino_ds><sentence>Ja.</sentence>";
        assert!(matches!(read_all(xml), Err(ReadError::Malformed { .. })));
    }

    #[test]
    fn test_error_on_mismatched_tag() {
        let xml = "<treebank><alpino_ds></node></treebank>";
        assert!(read_all(xml).is_err());
    }

    #[test]
    fn test_error_on_empty_document() {
        assert!(read_all("").is_err());
        assert!(read_all("   \n").is_err());
    }

    #[test]
    fn test_error_on_stray_text() {
        assert!(read_all("<treebank/> trailing").is_err());
    }

    #[test]
    fn test_count_trees() {
        assert_eq!(count_trees(TWO_TREES.as_bytes()).unwrap(), 2);
        assert_eq!(count_trees("<treebank/>".as_bytes()).unwrap(), 0);
        assert!(count_trees("<treebank>".as_bytes()).is_err());
    }

    #[test]
    fn test_open_gzipped_input() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plain.xml");
        let gzipped = dir.path().join("packed.xml.gz");

        std::fs::write(&plain, TWO_TREES).unwrap();
        let file = std::fs::File::create(&gzipped).unwrap();
        let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        encoder.write_all(TWO_TREES.as_bytes()).unwrap();
        encoder.finish().unwrap();

        assert_eq!(read_input(&gzipped).unwrap(), TWO_TREES.as_bytes());
        let plain_count = TreeReader::from_file(&plain).unwrap().count();
        let gz_count = TreeReader::from_file(&gzipped).unwrap().count();
        assert_eq!(plain_count, 2);
        assert_eq!(gz_count, 2);
    }
}
