//! alpino-extract: streaming sentence extraction from Alpino treebanks
//!
//! Reads corpora of `alpino_ds` parse trees one tree at a time, evaluates an
//! XPath query against each tree and writes the sentences of the matching
//! trees, one per line.

pub mod ast; // XPath expression tree
pub mod corpus; // Directory-level runs
pub mod eval; // XPath evaluation over one tree
pub mod extract; // Per-document extraction loop
pub mod names; // Interned element and attribute names
pub mod normalize; // Sharded dump repair
pub mod parser; // XPath parser
pub mod progress; // Progress observers
pub mod query; // Query resolution and scoping
pub mod reader; // Streaming tree reader
pub mod tree; // Arena tree of one alpino_ds element

// Re-exports for convenience
pub use corpus::{CorpusConfig, CorpusError, FileSummary, InputFormat, RunSummary, run};
pub use eval::{EvalError, Value};
pub use extract::{ExtractError, ExtractSummary, extract};
pub use parser::{QueryError, parse_xpath};
pub use progress::{LogProgress, Progress, Silent};
pub use query::{Query, QuerySource, scope_to_node};
pub use reader::{ReadError, TreeReader, count_trees};
pub use tree::{Node, NodeId, Tree};
