use alpino_extract::{Query, Silent, count_trees, extract, parse_xpath};
use divan::AllocProfiler;
use divan::{Bencher, black_box};
use std::fmt::Write;

#[global_allocator]
static ALLOC: AllocProfiler = AllocProfiler::system();

fn main() {
    divan::main();
}

/// A treebank of `trees` small Alpino trees, every third one with a subject
fn synthetic_corpus(trees: usize) -> Vec<u8> {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<treebank>\n");
    for i in 0..trees {
        let rel = if i % 3 == 0 { "su" } else { "obj1" };
        write!(
            xml,
            r#"<alpino_ds version="1.3">
  <node begin="0" cat="top" end="3" id="0" rel="top">
    <node begin="0" cat="smain" end="3" id="1" rel="--">
      <node begin="0" end="1" id="2" lemma="hij" pos="pron" rel="{rel}" word="Hij"/>
      <node begin="1" end="2" id="3" lemma="zien" pos="verb" rel="hd" word="ziet"/>
      <node begin="2" cat="np" end="3" id="4" rel="obj1">
        <node begin="2" end="3" id="5" lemma="boom" pos="noun" rel="hd" word="bomen"/>
      </node>
    </node>
  </node>
  <sentence sentid="{i}">Hij ziet bomen .</sentence>
</alpino_ds>
"#
        )
        .unwrap();
    }
    xml.push_str("</treebank>\n");
    xml.into_bytes()
}

#[divan::bench(args = [1_000, 10_000])]
fn extract_subjects(bencher: Bencher, trees: usize) {
    let corpus = synthetic_corpus(trees);
    let query = Query::scoped(r#"//node[@rel="su"]"#).unwrap();
    bencher.bench_local(|| {
        let mut out = Vec::new();
        let summary = extract(corpus.as_slice(), &query, &mut out, &mut Silent).unwrap();
        black_box(summary);
    });
}

#[divan::bench(args = [1_000, 10_000])]
fn extract_nested_predicate(bencher: Bencher, trees: usize) {
    let corpus = synthetic_corpus(trees);
    let query =
        Query::scoped(r#"//node[@cat="smain" and node[@rel="obj1"]/node[@pos="noun"]]"#).unwrap();
    bencher.bench_local(|| {
        let mut out = Vec::new();
        let summary = extract(corpus.as_slice(), &query, &mut out, &mut Silent).unwrap();
        black_box(summary);
    });
}

#[divan::bench(args = [1_000, 10_000])]
fn count_only(bencher: Bencher, trees: usize) {
    let corpus = synthetic_corpus(trees);
    bencher.bench_local(|| black_box(count_trees(corpus.as_slice()).unwrap()));
}

#[divan::bench]
fn parse_query() {
    black_box(
        parse_xpath(r#"//node[@rel="su" and ../node[@rel="hd" and @lemma="zien"]][1]"#).unwrap(),
    );
}
