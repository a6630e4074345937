//! End-to-end CLI integration tests for the `docstore` binary.
//!
//! Each test runs against a fresh file-backed database in a temporary
//! directory and exercises the `docstore` binary as a subprocess via
//! `assert_cmd`, one JSON request per invocation.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn docstore(tmp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("docstore").unwrap();
    let db_path = tmp.path().join("store.db");
    cmd.arg("--connection-string").arg(format!("Data Source={};Mode=File", db_path.display())).arg("--compact");
    cmd
}

fn run_json(tmp: &TempDir, args: &[&str], request: &serde_json::Value) -> serde_json::Value {
    let output = docstore(tmp).args(args).arg("--request").arg(request.to_string()).output().unwrap();
    assert!(output.status.success(), "command failed: {}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).unwrap()
}

fn create_table(tmp: &TempDir, name: &str) {
    run_json(
        tmp,
        &["create-table"],
        &serde_json::json!({
            "table_name": name,
            "key_schema": [
                {"attribute_name": "PK", "kind": "Hash"},
                {"attribute_name": "SK", "kind": "Range"},
            ],
            "attribute_definitions": [
                {"name": "PK", "attr_type": "S"},
                {"name": "SK", "attr_type": "N"},
            ],
            "global_secondary_indexes": [],
            "local_secondary_indexes": [],
        }),
    );
}

#[test]
fn create_table_then_describe_round_trips_metadata() {
    let tmp = TempDir::new().unwrap();
    create_table(&tmp, "Orders");

    let described = run_json(&tmp, &["describe-table"], &serde_json::json!({"table_name": "Orders"}));
    assert_eq!(described["table_description"]["name"], "Orders");
    assert_eq!(described["table_description"]["status"], "Active");
}

#[test]
fn create_table_twice_fails_with_resource_in_use() {
    let tmp = TempDir::new().unwrap();
    create_table(&tmp, "Orders");

    docstore(&tmp)
        .args(["create-table"])
        .arg("--request")
        .arg(
            serde_json::json!({
                "table_name": "Orders",
                "key_schema": [{"attribute_name": "PK", "kind": "Hash"}],
                "attribute_definitions": [{"name": "PK", "attr_type": "S"}],
                "global_secondary_indexes": [],
                "local_secondary_indexes": [],
            })
            .to_string(),
        )
        .assert()
        .failure()
        .stderr(predicate::str::contains("ResourceInUseException"));
}

#[test]
fn put_get_update_delete_item_lifecycle() {
    let tmp = TempDir::new().unwrap();
    create_table(&tmp, "Orders");

    run_json(
        &tmp,
        &["put-item"],
        &serde_json::json!({
            "table_name": "Orders",
            "item": {"PK": {"S": "cust#1"}, "SK": {"N": "1"}, "status": {"S": "pending"}},
        }),
    );

    let got = run_json(
        &tmp,
        &["get-item"],
        &serde_json::json!({"table_name": "Orders", "key": {"PK": {"S": "cust#1"}, "SK": {"N": "1"}}}),
    );
    assert_eq!(got["item"]["status"]["S"], "pending");

    let updated = run_json(
        &tmp,
        &["update-item"],
        &serde_json::json!({
            "table_name": "Orders",
            "key": {"PK": {"S": "cust#1"}, "SK": {"N": "1"}},
            "update_expression": "SET #s = :s",
            "expression_attribute_names": {"#s": "status"},
            "expression_attribute_values": {":s": {"S": "shipped"}},
            "return_values": "ALL_NEW",
        }),
    );
    assert_eq!(updated["attributes"]["status"]["S"], "shipped");

    run_json(&tmp, &["delete-item"], &serde_json::json!({"table_name": "Orders", "key": {"PK": {"S": "cust#1"}, "SK": {"N": "1"}}}));

    let got = run_json(
        &tmp,
        &["get-item"],
        &serde_json::json!({"table_name": "Orders", "key": {"PK": {"S": "cust#1"}, "SK": {"N": "1"}}}),
    );
    assert!(got["item"].is_null());
}

#[test]
fn put_item_with_condition_expression_fails_on_existing_key() {
    let tmp = TempDir::new().unwrap();
    create_table(&tmp, "Orders");

    run_json(&tmp, &["put-item"], &serde_json::json!({"table_name": "Orders", "item": {"PK": {"S": "a"}, "SK": {"N": "1"}}}));

    docstore(&tmp)
        .args(["put-item"])
        .arg("--request")
        .arg(
            serde_json::json!({
                "table_name": "Orders",
                "item": {"PK": {"S": "a"}, "SK": {"N": "1"}},
                "condition_expression": "attribute_not_exists(PK)",
            })
            .to_string(),
        )
        .assert()
        .failure()
        .stderr(predicate::str::contains("ConditionalCheckFailedException"));
}

#[test]
fn query_returns_items_in_sort_key_order() {
    let tmp = TempDir::new().unwrap();
    create_table(&tmp, "Orders");

    for sk in [20, 1, 10, 2] {
        run_json(&tmp, &["put-item"], &serde_json::json!({"table_name": "Orders", "item": {"PK": {"S": "cust#1"}, "SK": {"N": sk.to_string()}}}));
    }

    let result = run_json(
        &tmp,
        &["query"],
        &serde_json::json!({
            "table_name": "Orders",
            "key_condition_expression": "PK = :pk",
            "expression_attribute_values": {":pk": {"S": "cust#1"}},
        }),
    );
    let sks: Vec<i64> = result["items"].as_array().unwrap().iter().map(|i| i["SK"]["N"].as_str().unwrap().parse().unwrap()).collect();
    assert_eq!(sks, vec![1, 2, 10, 20]);
    assert_eq!(result["count"], 4);
}

#[test]
fn scan_with_limit_returns_last_evaluated_key_for_pagination() {
    let tmp = TempDir::new().unwrap();
    create_table(&tmp, "Orders");

    for sk in 0..5 {
        run_json(&tmp, &["put-item"], &serde_json::json!({"table_name": "Orders", "item": {"PK": {"S": "cust#1"}, "SK": {"N": sk.to_string()}}}));
    }

    let page = run_json(&tmp, &["scan"], &serde_json::json!({"table_name": "Orders", "limit": 2}));
    assert_eq!(page["items"].as_array().unwrap().len(), 2);
    assert!(!page["last_evaluated_key"].is_null());
}

#[test]
fn batch_write_then_batch_get_round_trips() {
    let tmp = TempDir::new().unwrap();
    create_table(&tmp, "Orders");

    run_json(
        &tmp,
        &["batch-write-item"],
        &serde_json::json!({
            "request_items": {
                "Orders": [
                    {"action": "put", "item": {"PK": {"S": "a"}, "SK": {"N": "1"}}},
                    {"action": "put", "item": {"PK": {"S": "b"}, "SK": {"N": "1"}}},
                ],
            },
        }),
    );

    let got = run_json(
        &tmp,
        &["batch-get-item"],
        &serde_json::json!({
            "request_items": {
                "Orders": {"keys": [{"PK": {"S": "a"}, "SK": {"N": "1"}}, {"PK": {"S": "b"}, "SK": {"N": "1"}}]},
            },
        }),
    );
    assert_eq!(got["responses"]["Orders"].as_array().unwrap().len(), 2);
}

#[test]
fn transact_write_items_rolls_back_on_condition_failure() {
    let tmp = TempDir::new().unwrap();
    create_table(&tmp, "Orders");
    run_json(&tmp, &["put-item"], &serde_json::json!({"table_name": "Orders", "item": {"PK": {"S": "a"}, "SK": {"N": "1"}}}));

    docstore(&tmp)
        .args(["transact-write-items"])
        .arg("--request")
        .arg(
            serde_json::json!({
                "transact_items": [
                    {"action": "put", "table_name": "Orders", "item": {"PK": {"S": "new"}, "SK": {"N": "1"}}},
                    {
                        "action": "condition_check",
                        "table_name": "Orders",
                        "key": {"PK": {"S": "a"}, "SK": {"N": "1"}},
                        "condition_expression": "attribute_not_exists(PK)",
                    },
                ],
            })
            .to_string(),
        )
        .assert()
        .failure()
        .stderr(predicate::str::contains("TransactionCanceledException"));

    let got = run_json(&tmp, &["get-item"], &serde_json::json!({"table_name": "Orders", "key": {"PK": {"S": "new"}, "SK": {"N": "1"}}}));
    assert!(got["item"].is_null(), "the put should have been rolled back with the whole transaction");
}

#[test]
fn export_table_then_import_into_another_table() {
    let tmp = TempDir::new().unwrap();
    create_table(&tmp, "Orders");
    create_table(&tmp, "OrdersCopy");
    run_json(&tmp, &["put-item"], &serde_json::json!({"table_name": "Orders", "item": {"PK": {"S": "a"}, "SK": {"N": "1"}}}));
    run_json(&tmp, &["put-item"], &serde_json::json!({"table_name": "Orders", "item": {"PK": {"S": "b"}, "SK": {"N": "2"}}}));

    let export_dir = tmp.path().join("export");
    let export = run_json(
        &tmp,
        &["export-table"],
        &serde_json::json!({"table_name": "Orders", "export_id": "e1", "destination": export_dir}),
    );
    assert_eq!(export["manifest"]["item_count"], 2);

    let import = run_json(&tmp, &["import-table"], &serde_json::json!({"table_name": "OrdersCopy", "source": export_dir}));
    assert_eq!(import["imported_item_count"], 2);

    let got = run_json(&tmp, &["get-item"], &serde_json::json!({"table_name": "OrdersCopy", "key": {"PK": {"S": "a"}, "SK": {"N": "1"}}}));
    assert!(got["item"].is_object());
}

#[test]
fn update_ttl_then_describe_ttl_round_trips() {
    let tmp = TempDir::new().unwrap();
    create_table(&tmp, "Orders");

    run_json(&tmp, &["update-ttl"], &serde_json::json!({"table_name": "Orders", "enabled": true, "attribute_name": "expires_at"}));

    let ttl = run_json(&tmp, &["describe-ttl"], &serde_json::json!({"table_name": "Orders"}));
    assert_eq!(ttl["ttl"]["Enabled"]["attribute_name"], "expires_at");
}

#[test]
fn list_tables_reflects_created_and_deleted_tables() {
    let tmp = TempDir::new().unwrap();
    create_table(&tmp, "Orders");
    create_table(&tmp, "Customers");

    let listed = run_json(&tmp, &["list-tables"], &serde_json::json!({}));
    let names: Vec<&str> = listed["table_names"].as_array().unwrap().iter().map(|v| v.as_str().unwrap()).collect();
    assert!(names.contains(&"Orders"));
    assert!(names.contains(&"Customers"));

    run_json(&tmp, &["delete-table"], &serde_json::json!({"table_name": "Orders"}));
    let listed = run_json(&tmp, &["list-tables"], &serde_json::json!({}));
    let names: Vec<&str> = listed["table_names"].as_array().unwrap().iter().map(|v| v.as_str().unwrap()).collect();
    assert!(!names.contains(&"Orders"));
}

#[test]
fn get_item_on_missing_table_reports_resource_not_found() {
    let tmp = TempDir::new().unwrap();
    docstore(&tmp)
        .args(["get-item"])
        .arg("--request")
        .arg(serde_json::json!({"table_name": "Nope", "key": {"PK": {"S": "a"}}}).to_string())
        .assert()
        .failure()
        .stderr(predicate::str::contains("ResourceNotFoundException"));
}
