//! # FlureeDB Core
//!
//! The core of an RDF/JSON-LD ledger: content-addressed commit storage with
//! pluggable backends, a columnar tabular execution engine, and a
//! pushdown/routing planner that maps RDF graph patterns onto tabular
//! sources.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! R2RML mapping (Turtle / JSON-LD)
//!     ↓
//! [Mapping Parser]          → TriplesMap records + join graph
//!     ↓
//! [Pushdown Analyzer]       → per-pattern pushdown predicates + residuals
//!     ↓
//! [Plan Compiler]           → greedy-ordered Scan/HashJoin operator tree
//!     ↓
//! [Operator Tree]           → batches pulled from tabular sources
//! ```
//!
//! ```text
//! Connection
//!     ├── Storage substrate (file | memory | s3 | ipfs | remote)
//!     ├── LRU resolver cache (byte-budgeted, single-flight)
//!     ├── Index resolver (branch/leaf nodes by comparator)
//!     └── Name service (address ↔ alias, head push/lookup)
//! ```
//!
//! ## Usage
//!
//! ### Commit write and head push
//! ```rust,ignore
//! use flureedb::{Connection, Ledger};
//!
//! let conn = Connection::new(storage, config)?;
//! let ledger = Ledger::main("my-alias");
//! let record = conn.commit_write(&ledger, &commit).await?;
//! conn.push(&flureedb::address::head_path("my-alias", "main"), &record.address).await?;
//! ```
//!
//! ### Mapping-routed tabular query
//! ```rust,ignore
//! use flureedb::{compile, parse_turtle, CompileOptions, JoinGraph, StatsRegistry};
//!
//! let mappings = parse_turtle(&mapping_doc)?;
//! let graph = JoinGraph::from_mappings(&mappings);
//! let mut plan = compile(source, groups, &graph, &stats, &CompileOptions::default())?;
//! plan.open()?;
//! while let Some(batch) = plan.next_batch()? { /* ... */ }
//! plan.close();
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `address` | `fluree:<method>://<path>` addresses |
//! | `storage` | Content-addressed substrate, pluggable backends |
//! | `cache` | Byte-budgeted LRU with single-flight loads |
//! | `index` | B-tree node model and resolver |
//! | `connection` | Facade binding storage, cache, serializer, names |
//! | `mapping` | R2RML model, Turtle/JSON-LD parsers, join graph |
//! | `pushdown` | Filter/VALUES analysis, coercion, IN-coalescing |
//! | `exec` | Pull-based operator tree over columnar batches |
//! | `planner` | Greedy join ordering and plan compilation |

pub mod address;
pub mod cache;
pub mod config;
pub mod connection;
pub mod crypto;
pub mod error;
pub mod exec;
pub mod index;
pub mod ledger_records;
pub mod mapping;
pub mod planner;
pub mod pushdown;
pub mod storage;
pub mod value;

// Re-export the crate surface
pub use address::{Address, Method, ADDRESS_SCHEME};
pub use cache::{ResolverCache, DEFAULT_MEMORY_BUDGET_BYTES};
pub use config::{
    Config, ConnectionConfig, FileStoreConfig, IndexerConfig, IpfsStoreConfig, ObjectStoreConfig,
    RemoteStoreConfig,
};
pub use connection::{Connection, Indexer, JsonSerializer, Ledger, Serializer};
pub use crypto::{content_hash, Encryptor, HashEncoding};
pub use error::{Error, ErrorKind, Result};
pub use exec::{
    AggregateFn, AggregateSpec, Batch, ColumnarBatch, FilterOp, HashAggregateOp, HashJoinOp,
    JoinType, MemoryTable, MemoryTableSource, Operator, ParquetTableSource, ProjectOp, RowBatch,
    ScanOp, ScanOptions, TableStats, TabularSource, TimeTravel, UnionOp,
};
pub use index::{
    scan_range, ChildPointer, Flake, FlakeObject, FlakeRange, IndexResolver, IndexType,
    ResolvedNode, EMPTY_NODE_ID,
};
pub use ledger_records::{canonical_json, GarbageRecord, IndexRootRecord};
pub use mapping::{
    parse_jsonld, parse_turtle, JoinEdge, JoinGraph, MappingSet, ObjectMap, SubjectTemplate,
    TriplesMap,
};
pub use planner::{compile, CompileOptions, PatternGroup, StatsRegistry};
pub use pushdown::{
    coalesce, coerce_literal, AnalyzedGroup, CoercionTarget, CompareOp, FilterExpr, FilterOperand,
    PredicateValue, PushdownOp, PushdownPredicate, Term, TriplePattern, ValuesClause,
};
pub use storage::{
    ByteStore, ContentAddressedStore, Credentials, EraseableStore, FileStore, IpfsStore,
    JsonArchive, MemoryStore, ObjectClient, ObjectStat, ObjectStore, RangeReadableStore,
    RemoteStore, StatStore, Store, WriteRecord,
};
pub use value::{ColumnType, Value};

// The pushdown annotation entry point lives beside its types.
pub use pushdown::analyze::annotate;
