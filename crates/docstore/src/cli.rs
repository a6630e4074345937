//! Clap CLI definitions for the `docstore` command.
//!
//! Every subcommand below takes a single JSON request body -- either inline
//! via `--request` or piped over stdin -- and prints the matching facade
//! response as JSON on success. This mirrors how a managed key-value store's
//! own CLI tooling shells out to its wire API one call at a time, rather
//! than reinventing a bespoke flag per field of every operation.

use clap::{Args, Parser, Subcommand};

/// docstore -- embedded, wire-compatible key-value document store emulator.
#[derive(Parser, Debug)]
#[command(
    name = "docstore",
    about = "Embedded, wire-compatible key-value document store emulator",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Global flags available to all subcommands.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Connection string, e.g. "Data Source=./store.db;Mode=File"
    /// (default: $DOCSTORE_DATA_SOURCE / $DOCSTORE_MODE / $DOCSTORE_CACHE).
    #[arg(long, global = true, default_value = "Data Source=:memory:;Mode=Memory")]
    pub connection_string: String,

    /// Output compact JSON instead of pretty-printed JSON.
    #[arg(long, global = true)]
    pub compact: bool,

    /// Enable verbose/debug logging.
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

/// One request body, given inline or read from stdin when absent.
#[derive(Args, Debug, Clone)]
pub struct RequestArgs {
    /// The operation's request body as a JSON string. Reads stdin if absent.
    #[arg(long)]
    pub request: Option<String>,
}

/// All available subcommands, one per public engine operation (§4.12).
#[derive(Subcommand, Debug)]
pub enum Commands {
    // ===== Catalog =====
    /// Create a table.
    CreateTable(RequestArgs),
    /// Delete a table.
    DeleteTable(RequestArgs),
    /// Describe a table's metadata.
    DescribeTable(RequestArgs),
    /// List table names.
    ListTables(RequestArgs),
    /// Add a global secondary index to an existing table.
    CreateGsi(RequestArgs),
    /// Remove a secondary index from an existing table.
    DeleteGsi(RequestArgs),
    /// Attach tags to a table.
    TagResource(RequestArgs),
    /// Remove tags from a table.
    UntagResource(RequestArgs),
    /// List a table's tags.
    ListTags(RequestArgs),
    /// Enable or disable TTL on a table.
    UpdateTtl(RequestArgs),
    /// Describe a table's TTL configuration.
    DescribeTtl(RequestArgs),

    // ===== Item CRUD =====
    /// Write a single item.
    PutItem(RequestArgs),
    /// Read a single item by key.
    GetItem(RequestArgs),
    /// Update (or create) a single item.
    UpdateItem(RequestArgs),
    /// Delete a single item by key.
    DeleteItem(RequestArgs),

    // ===== Query / Scan =====
    /// Query a table or index by partition key (and optional sort key condition).
    Query(RequestArgs),
    /// Scan an entire table or index.
    Scan(RequestArgs),

    // ===== Batch =====
    /// Read up to 100 items across one or more tables.
    BatchGetItem(RequestArgs),
    /// Write or delete up to 25 items across one or more tables.
    BatchWriteItem(RequestArgs),

    // ===== Transactions =====
    /// Apply up to 100 write actions atomically.
    TransactWriteItems(RequestArgs),
    /// Read up to 100 items as one consistent batch.
    TransactGetItems(RequestArgs),

    // ===== Export / Import =====
    /// Export a table's items to a directory.
    ExportTable(RequestArgs),
    /// Import a table's items from a directory.
    ImportTable(RequestArgs),
}
