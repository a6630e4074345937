//! `docstore` -- embedded, wire-compatible key-value document store emulator.
//!
//! Parses CLI arguments with clap, opens the engine from a connection
//! string, reads one JSON request body per invocation, dispatches it to the
//! matching [`docstore::Engine`] method, and prints the JSON response.

mod cli;

use std::io::Read as _;

use clap::Parser;
use serde::de::DeserializeOwned;
use serde::Serialize;

use cli::{Cli, Commands, GlobalArgs, RequestArgs};
use docstore::{DocstoreError, Engine};
use docstore_config::EngineOptions;

fn read_request<T: DeserializeOwned>(args: &RequestArgs) -> anyhow::Result<T> {
    let body = match &args.request {
        Some(s) => s.clone(),
        None => {
            let mut s = String::new();
            std::io::stdin().read_to_string(&mut s)?;
            s
        }
    };
    Ok(serde_json::from_str(&body)?)
}

fn print_response<T: Serialize>(global: &GlobalArgs, value: &T) -> anyhow::Result<()> {
    let text = if global.compact { serde_json::to_string(value)? } else { serde_json::to_string_pretty(value)? };
    println!("{text}");
    Ok(())
}

fn dispatch(engine: &Engine, global: &GlobalArgs, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::CreateTable(args) => print_response(global, &engine.create_table(read_request(&args)?)?),
        Commands::DeleteTable(args) => print_response(global, &engine.delete_table(read_request(&args)?)?),
        Commands::DescribeTable(args) => print_response(global, &engine.describe_table(read_request(&args)?)?),
        Commands::ListTables(args) => print_response(global, &engine.list_tables(read_request(&args)?)?),
        Commands::CreateGsi(args) => print_response(global, &engine.create_global_secondary_index(read_request(&args)?)?),
        Commands::DeleteGsi(args) => print_response(global, &engine.delete_global_secondary_index(read_request(&args)?)?),
        Commands::TagResource(args) => {
            engine.tag_resource(read_request(&args)?)?;
            print_response(global, &serde_json::json!({}))
        }
        Commands::UntagResource(args) => {
            engine.untag_resource(read_request(&args)?)?;
            print_response(global, &serde_json::json!({}))
        }
        Commands::ListTags(args) => print_response(global, &engine.list_tags_of_resource(read_request(&args)?)?),
        Commands::UpdateTtl(args) => print_response(global, &engine.update_time_to_live(read_request(&args)?)?),
        Commands::DescribeTtl(args) => print_response(global, &engine.describe_time_to_live(read_request(&args)?)?),

        Commands::PutItem(args) => print_response(global, &engine.put_item(read_request(&args)?)?),
        Commands::GetItem(args) => print_response(global, &engine.get_item(read_request(&args)?)?),
        Commands::UpdateItem(args) => print_response(global, &engine.update_item(read_request(&args)?)?),
        Commands::DeleteItem(args) => print_response(global, &engine.delete_item(read_request(&args)?)?),

        Commands::Query(args) => print_response(global, &engine.query(read_request(&args)?)?),
        Commands::Scan(args) => print_response(global, &engine.scan(read_request(&args)?)?),

        Commands::BatchGetItem(args) => print_response(global, &engine.batch_get_item(read_request(&args)?)?),
        Commands::BatchWriteItem(args) => print_response(global, &engine.batch_write_item(read_request(&args)?)?),

        Commands::TransactWriteItems(args) => print_response(global, &engine.transact_write_items(read_request(&args)?)?),
        Commands::TransactGetItems(args) => print_response(global, &engine.transact_get_items(read_request(&args)?)?),

        Commands::ExportTable(args) => print_response(global, &engine.export_table_to_point_in_time(read_request(&args)?)?),
        Commands::ImportTable(args) => print_response(global, &engine.import_table(read_request(&args)?)?),
    }
}

fn main() {
    let cli = Cli::parse();

    if cli.global.verbose {
        tracing_subscriber::fmt().with_env_filter("docstore=debug").with_writer(std::io::stderr).init();
    }

    let result = run(cli);

    if let Err(e) = result {
        if let Some(docstore_err) = e.downcast_ref::<DocstoreError>() {
            let err_json = serde_json::json!({
                "code": docstore_err.code,
                "message": docstore_err.message,
                "cancellation_reasons": docstore_err.cancellation_reasons,
            });
            eprintln!("{}", serde_json::to_string_pretty(&err_json).unwrap_or_else(|_| docstore_err.to_string()));
        } else {
            eprintln!("Error: {e:#}");
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let options = EngineOptions::parse(&cli.global.connection_string)?;
    let engine = Engine::open(&options)?;
    dispatch(&engine, &cli.global, cli.command)
}
