//! Sharded dump normalization
//!
//! Sharded `.data` files are concatenations of complete XML documents, each
//! with its own declaration and no common root. Dropping the declarations and
//! wrapping everything in one element turns them into a single well-formed
//! document the tree reader accepts.
//!
//! Unlike the rest of the pipeline this holds the whole file in memory.
//! Shard files are small enough for that.

use crate::reader::UTF8_BOM;
use bstr::ByteSlice;

/// Synthetic root element around a sharded dump
pub const WRAPPER_TAG: &str = "alpino_wrapper";

/// Rewrite a sharded dump into a single-rooted document
pub fn normalize(raw: &[u8]) -> Vec<u8> {
    let raw = raw.strip_prefix(UTF8_BOM).unwrap_or(raw);
    let open = format!("<{WRAPPER_TAG}>\n");
    let close = format!("</{WRAPPER_TAG}>\n");

    let mut out = Vec::with_capacity(raw.len() + open.len() + close.len());
    out.extend_from_slice(open.as_bytes());
    for line in raw.lines_with_terminator() {
        if !line.trim_start().starts_with(b"<?xml") {
            out.extend_from_slice(line);
        }
    }
    if !out.ends_with(b"\n") {
        out.push(b'\n');
    }
    out.extend_from_slice(close.as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract;
    use crate::progress::Silent;
    use crate::query::Query;
    use crate::reader::count_trees;

    const SHARDED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<alpino_ds version="1.3">
  <node rel="top"><node rel="su" word="Hij"/></node>
  <sentence>Hij loopt.</sentence>
</alpino_ds>
  <?xml version="1.0" encoding="UTF-8"?>
<alpino_ds version="1.3">
  <node rel="top"><node rel="hd" word="Regent"/></node>
  <sentence>Regent.</sentence>
</alpino_ds>
<?xml version="1.0"?>
<alpino_ds version="1.3">
  <node rel="top"><node rel="su" word="Wij"/></node>
  <sentence>Wij zwemmen.</sentence>
</alpino_ds>"#;

    const WELL_FORMED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<treebank>
<alpino_ds version="1.3">
  <node rel="top"><node rel="su" word="Hij"/></node>
  <sentence>Hij loopt.</sentence>
</alpino_ds>
<alpino_ds version="1.3">
  <node rel="top"><node rel="hd" word="Regent"/></node>
  <sentence>Regent.</sentence>
</alpino_ds>
<alpino_ds version="1.3">
  <node rel="top"><node rel="su" word="Wij"/></node>
  <sentence>Wij zwemmen.</sentence>
</alpino_ds>
</treebank>
"#;

    fn sentences(xml: &[u8]) -> String {
        let query = Query::scoped(r#"//node[@rel="su"]"#).unwrap();
        let mut out = Vec::new();
        extract(xml, &query, &mut out, &mut Silent).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_declarations_dropped_and_wrapped() {
        let out = normalize(b"<?xml version=\"1.0\"?>\n<a/>\n<?xml version=\"1.0\"?>\n<b/>\n");
        assert_eq!(out, b"<alpino_wrapper>\n<a/>\n<b/>\n</alpino_wrapper>\n");
    }

    #[test]
    fn test_missing_final_newline() {
        let out = normalize(b"<a/>");
        assert_eq!(out, b"<alpino_wrapper>\n<a/>\n</alpino_wrapper>\n");
    }

    #[test]
    fn test_byte_order_mark_removed() {
        let out = normalize(b"\xEF\xBB\xBF<?xml version=\"1.0\"?>\n<a/>\n");
        assert_eq!(out, b"<alpino_wrapper>\n<a/>\n</alpino_wrapper>\n");
    }

    #[test]
    fn test_declaration_text_inside_line_kept() {
        let out = normalize(b"<s>x <?xml not a declaration</s>\n");
        assert_eq!(out, b"<alpino_wrapper>\n<s>x <?xml not a declaration</s>\n</alpino_wrapper>\n");
    }

    #[test]
    fn test_raw_dump_is_not_well_formed() {
        assert!(count_trees(SHARDED.as_bytes()).is_err());
        assert_eq!(count_trees(normalize(SHARDED.as_bytes()).as_slice()).unwrap(), 3);
    }

    #[test]
    fn test_same_results_as_well_formed_document() {
        let normalized = normalize(SHARDED.as_bytes());
        assert_eq!(sentences(&normalized), sentences(WELL_FORMED.as_bytes()));
        assert_eq!(sentences(&normalized), "Hij loopt.\nWij zwemmen.\n");
    }
}
