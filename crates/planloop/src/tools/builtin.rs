//! Built-in customer-service tools over the `inventory` and `transactions`
//! collections.

use serde_json::{json, Map, Value};

use crate::error::{CoreError, CoreResult};
use crate::store::{record_id, Mutation, Record, RecordQuery, Store};

use super::registry::ToolRegistry;
use super::schema::{as_number, ToolArgs, ToolDefinition, ToolKind, ToolSpec};

pub const INVENTORY: &str = "inventory";
pub const TRANSACTIONS: &str = "transactions";

const ITEM_ID: &str = "item_id";
const QUANTITY: &str = "quantity_in_stock";
const TRANSACTION_ID: &str = "transaction_id";
const BALANCE: &str = "balance_after_transaction";

/// Registry with the full customer-service tool set.
pub fn customer_service() -> CoreResult<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for tool in [
        inventory_lookup("get_inventory_data"),
        inventory_lookup("lookup_product"),
        transaction_data(),
        update_inventory(),
        project_inventory(),
        append_transaction(),
        propose_transaction(),
        amount("compute_total", 1.0),
        amount("compute_refund", -1.0),
        assert_truthy("assert_true"),
        assert_truthy("assert"),
        assert_non_null(),
        compare("assert_gt", |value, threshold| value > threshold),
        compare("assert_gte", |value, threshold| value >= threshold),
        assert_nonnegative_stock(),
        assert_sufficient_stock(),
    ] {
        registry.register(tool)?;
    }
    Ok(registry)
}

// --- read ---

fn inventory_lookup(name: &str) -> ToolDefinition {
    let spec = ToolSpec::new(name, ToolKind::Read)
        .describe("Inventory rows by product name (case-insensitive) or item_id; all rows when neither is given.")
        .alias("name", "product_name")
        .alias("product", "product_name")
        .alias("query", "product_name");

    ToolDefinition::new(spec, |args, store| {
        let rows = store.list_records(INVENTORY)?;
        let rows: Vec<Record> = if let Some(item_id) = args.opt_str(ITEM_ID)? {
            rows.into_iter()
                .filter(|row| record_id(row, ITEM_ID).as_deref() == Some(item_id))
                .collect()
        } else if let Some(product) = args.opt_str("product_name")? {
            let query = RecordQuery::field_eq_ci("name", product);
            rows.into_iter()
                .filter(|row| query.matches(ITEM_ID, row))
                .collect()
        } else {
            rows
        };

        let item = match rows.as_slice() {
            [only] => Value::Object(only.clone()),
            _ => Value::Null,
        };
        let match_count = rows.len();
        Ok(json!({
            "rows": rows,
            "match_count": match_count,
            "item": item,
        }))
    })
}

fn transaction_data() -> ToolDefinition {
    let spec = ToolSpec::new("get_transaction_data", ToolKind::Read)
        .describe("Last transaction id and running balance (mode \"last_balance\").");

    ToolDefinition::new(spec, |args, store| {
        let mode = args.opt_str("mode")?.unwrap_or("last_balance");
        if mode != "last_balance" {
            return Ok(json!({ "mode": mode }));
        }
        let rows = store.list_records(TRANSACTIONS)?;
        let last_id = rows.last().and_then(|row| record_id(row, TRANSACTION_ID));
        Ok(json!({
            "mode": mode,
            "last_txn_id": last_id,
            "last_balance": current_balance(&rows),
        }))
    })
}

// --- mutate ---

fn update_inventory() -> ToolDefinition {
    let spec = ToolSpec::new("update_inventory", ToolKind::Mutate)
        .describe("Set (quantity_new) or adjust (delta) an item's quantity_in_stock.")
        .require(&[ITEM_ID])
        .require_any(&["delta", "quantity_new"])
        .alias("change", "delta")
        .alias("new_quantity", "quantity_new")
        .alias("quantity", "quantity_new")
        .alias("qty_new", "quantity_new");

    ToolDefinition::new(spec, apply_stock_change)
}

/// Same effect as `update_inventory` with a delta.
fn project_inventory() -> ToolDefinition {
    let spec = ToolSpec::new("project_inventory", ToolKind::Mutate)
        .describe("Apply a quantity delta to an item and return the new stock level.")
        .require(&[ITEM_ID, "delta"])
        .alias("change", "delta");

    ToolDefinition::new(spec, apply_stock_change)
}

fn apply_stock_change(args: &ToolArgs, store: &dyn Store) -> CoreResult<Value> {
    let item_id = args.str(ITEM_ID)?;
    if store
        .get_record(INVENTORY, &RecordQuery::by_id(item_id))?
        .is_none()
    {
        return Err(CoreError::InvalidInput("item_not_found".into()));
    }

    let mutation = match args.opt_i64("quantity_new")? {
        Some(quantity) => Mutation::set(QUANTITY, Value::from(quantity)),
        None => match args.opt_i64("delta")? {
            Some(delta) => Mutation::delta(QUANTITY, delta as f64),
            None => return Err(CoreError::InvalidInput("need_delta_or_quantity_new".into())),
        },
    };

    let updated = store.apply_mutation(INVENTORY, item_id, &mutation)?;
    Ok(json!({
        "updated": {
            ITEM_ID: item_id,
            QUANTITY: updated.get(QUANTITY).cloned().unwrap_or(Value::Null),
        }
    }))
}

fn append_transaction() -> ToolDefinition {
    let spec = ToolSpec::new("append_transaction", ToolKind::Mutate)
        .describe("Record a transaction and update the running balance. Positive amounts are sales, negative are refunds.")
        .require(&["customer_name", "summary", "amount"])
        .alias("transaction_summary", "summary");

    ToolDefinition::new(spec, |args, store| {
        let prefix = args.opt_str("txn_prefix")?.unwrap_or("TXN");
        let rows = store.list_records(TRANSACTIONS)?;
        let mut row = transaction_row(args, &rows)?;
        row.insert(TRANSACTION_ID.into(), Value::String(next_transaction_id(&rows, prefix)));
        row.insert("timestamp".into(), Value::String(chrono::Utc::now().to_rfc3339()));

        let stored = store.append_record(TRANSACTIONS, row)?;
        Ok(json!({ "transaction": stored }))
    })
}

fn propose_transaction() -> ToolDefinition {
    let spec = ToolSpec::new("propose_transaction", ToolKind::Compute)
        .describe("Preview a transaction and its resulting balance without recording it.")
        .require(&["customer_name", "summary", "amount"])
        .alias("transaction_summary", "summary");

    ToolDefinition::new(spec, |args, store| {
        let rows = store.list_records(TRANSACTIONS)?;
        let mut row = transaction_row(args, &rows)?;
        row.insert(TRANSACTION_ID.into(), Value::String("AUTO_TXN".into()));
        Ok(Value::Object(row))
    })
}

fn transaction_row(args: &ToolArgs, history: &[Record]) -> CoreResult<Record> {
    let amount = args.f64("amount")?;
    let mut row = Map::new();
    row.insert("customer_name".into(), Value::String(args.str("customer_name")?.into()));
    row.insert("transaction_summary".into(), Value::String(args.str("summary")?.into()));
    row.insert("transaction_amount".into(), json!(amount));
    row.insert(BALANCE.into(), json!(current_balance(history) + amount));
    Ok(row)
}

fn current_balance(history: &[Record]) -> f64 {
    history
        .last()
        .and_then(|row| row.get(BALANCE))
        .and_then(as_number)
        .unwrap_or(0.0)
}

/// `prefix` followed by one more than the highest number already used with
/// that prefix, zero-padded to three digits.
fn next_transaction_id(history: &[Record], prefix: &str) -> String {
    let next = history
        .iter()
        .filter_map(|row| record_id(row, TRANSACTION_ID))
        .filter_map(|id| id.strip_prefix(prefix).and_then(|n| n.parse::<u64>().ok()))
        .max()
        .unwrap_or(0)
        + 1;
    format!("{prefix}{next:03}")
}

// --- compute ---

fn amount(name: &str, sign: f64) -> ToolDefinition {
    let spec = ToolSpec::new(name, ToolKind::Compute)
        .describe(if sign < 0.0 {
            "Refund amount for qty units at price (negative)."
        } else {
            "Purchase amount for qty units at price."
        })
        .require(&["qty", "price"])
        .alias("quantity", "qty")
        .alias("unit_price", "price");

    ToolDefinition::new(spec, move |args, _store| {
        let total = args.f64("qty")? * args.f64("price")?;
        Ok(json!({ "amount": sign * total }))
    })
}

// --- validations ---

fn assert_truthy(name: &str) -> ToolDefinition {
    let spec = ToolSpec::new(name, ToolKind::Validation)
        .describe("Holds when value is truthy.")
        .require(&["value"]);
    ToolDefinition::new(spec, |args, _store| {
        Ok(json!({ "ok": truthy(args.raw("value").unwrap_or(&Value::Null)) }))
    })
}

fn assert_non_null() -> ToolDefinition {
    let spec = ToolSpec::new("assert_non_null", ToolKind::Validation)
        .describe("Holds when value is not null.")
        .require(&["value"]);
    ToolDefinition::new(spec, |args, _store| {
        Ok(json!({ "ok": args.get("value").is_some() }))
    })
}

fn compare(name: &str, holds: fn(f64, f64) -> bool) -> ToolDefinition {
    let spec = ToolSpec::new(name, ToolKind::Validation)
        .describe("Numeric comparison of value against threshold.")
        .require(&["value", "threshold"]);
    ToolDefinition::new(spec, move |args, _store| {
        let value = args.get("value").and_then(as_number);
        let threshold = args.get("threshold").and_then(as_number);
        Ok(match (value, threshold) {
            (Some(value), Some(threshold)) => json!({ "ok": holds(value, threshold) }),
            _ => json!({ "ok": false, "reason": "non_numeric" }),
        })
    })
}

fn assert_nonnegative_stock() -> ToolDefinition {
    let spec = ToolSpec::new("assert_nonnegative_stock", ToolKind::Validation)
        .describe("Holds when the item's quantity_in_stock is at least zero.")
        .require(&[ITEM_ID]);
    ToolDefinition::new(spec, |args, store| {
        let Some(qty) = stock_level(args, store)? else {
            return Ok(json!({ "ok": false, "reason": "item_not_found" }));
        };
        Ok(json!({ "ok": qty >= 0.0, "qty": qty }))
    })
}

/// Checks a purchase against current stock before any mutation happens.
fn assert_sufficient_stock() -> ToolDefinition {
    let spec = ToolSpec::new("assert_sufficient_stock", ToolKind::Validation)
        .describe("Holds when the item has at least qty units in stock.")
        .require(&[ITEM_ID, "qty"])
        .alias("quantity", "qty");
    ToolDefinition::new(spec, |args, store| {
        let Some(qty) = stock_level(args, store)? else {
            return Ok(json!({ "ok": false, "reason": "item_not_found" }));
        };
        let requested = args.f64("qty")?;
        let remaining = qty - requested;
        Ok(json!({
            "ok": remaining >= 0.0,
            "qty": qty,
            "requested": requested,
            "remaining": remaining,
        }))
    })
}

fn stock_level(args: &ToolArgs, store: &dyn Store) -> CoreResult<Option<f64>> {
    let item_id = args.str(ITEM_ID)?;
    Ok(store
        .get_record(INVENTORY, &RecordQuery::by_id(item_id))?
        .map(|row| row.get(QUANTITY).and_then(as_number).unwrap_or(0.0)))
}

/// Null, false, zero and anything empty are falsy.
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|n| n != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn seeded() -> MemoryStore {
        MemoryStore::new()
            .with_collection(
                INVENTORY,
                ITEM_ID,
                vec![
                    record(json!({"item_id": "SG001", "name": "Aviator", "quantity_in_stock": 10, "price": 80.0})),
                    record(json!({"item_id": "SG002", "name": "Sport", "quantity_in_stock": 3, "price": 60.0})),
                ],
            )
            .with_collection(
                TRANSACTIONS,
                TRANSACTION_ID,
                vec![record(json!({"transaction_id": "TXN001", "balance_after_transaction": 500.0}))],
            )
    }

    fn run(registry: &ToolRegistry, store: &MemoryStore, tool: &str, raw: Value) -> CoreResult<Value> {
        registry.dispatch(tool, args(raw), store).map(|out| out.result)
    }

    #[test]
    fn registers_every_tool() {
        let registry = customer_service().unwrap();
        assert_eq!(registry.len(), 16);
        assert!(registry.lookup_validation("assert_sufficient_stock").is_ok());
        assert!(registry.lookup_validation("update_inventory").is_err());
    }

    #[test]
    fn lookup_by_name_is_case_insensitive() {
        let registry = customer_service().unwrap();
        let store = seeded();
        let out = run(&registry, &store, "lookup_product", json!({"product_name": "aviator"})).unwrap();
        assert_eq!(out["match_count"], json!(1));
        assert_eq!(out["item"]["item_id"], json!("SG001"));

        let all = run(&registry, &store, "get_inventory_data", json!({})).unwrap();
        assert_eq!(all["match_count"], json!(2));
        assert_eq!(all["item"], Value::Null);
    }

    #[test]
    fn last_balance_reads_latest_transaction() {
        let registry = customer_service().unwrap();
        let out = run(&registry, &seeded(), "get_transaction_data", json!({})).unwrap();
        assert_eq!(out["last_txn_id"], json!("TXN001"));
        assert_eq!(out["last_balance"], json!(500.0));
    }

    #[test]
    fn update_inventory_by_delta_and_absolute() {
        let registry = customer_service().unwrap();
        let store = seeded();
        let out = run(&registry, &store, "update_inventory", json!({"item_id": "SG001", "delta": -2})).unwrap();
        assert_eq!(out["updated"]["quantity_in_stock"], json!(8));

        let out = run(&registry, &store, "update_inventory", json!({"item_id": "SG001", "quantity_new": 4})).unwrap();
        assert_eq!(out["updated"]["quantity_in_stock"], json!(4));
        assert_eq!(store.mutation_count(), 2);
    }

    #[test]
    fn update_inventory_unknown_item_fails_without_mutation() {
        let registry = customer_service().unwrap();
        let store = seeded();
        let err = run(&registry, &store, "update_inventory", json!({"item_id": "SG999", "delta": 1})).unwrap_err();
        assert!(matches!(err, CoreError::Tool { ref message, .. } if message == "item_not_found"));
        assert_eq!(store.mutation_count(), 0);
    }

    #[test]
    fn update_inventory_needs_delta_or_quantity() {
        let registry = customer_service().unwrap();
        let err = run(&registry, &seeded(), "update_inventory", json!({"item_id": "SG001"})).unwrap_err();
        assert!(matches!(err, CoreError::MissingArguments { ref missing, .. } if missing == &vec!["delta|quantity_new".to_string()]));
    }

    #[test]
    fn append_transaction_continues_sequence_and_balance() {
        let registry = customer_service().unwrap();
        let store = seeded();
        let out = run(
            &registry,
            &store,
            "append_transaction",
            json!({"customer_name": "Ada", "summary": "2 Aviator", "amount": 160.0}),
        )
        .unwrap();
        assert_eq!(out["transaction"]["transaction_id"], json!("TXN002"));
        assert_eq!(out["transaction"]["balance_after_transaction"], json!(660.0));
        assert_eq!(store.snapshot(TRANSACTIONS).len(), 2);
    }

    #[test]
    fn propose_transaction_does_not_write() {
        let registry = customer_service().unwrap();
        let store = seeded();
        let out = run(
            &registry,
            &store,
            "propose_transaction",
            json!({"customer_name": "Ada", "summary": "refund", "amount": -60.0}),
        )
        .unwrap();
        assert_eq!(out["transaction_id"], json!("AUTO_TXN"));
        assert_eq!(out["balance_after_transaction"], json!(440.0));
        assert_eq!(store.mutation_count(), 0);
    }

    #[test]
    fn compute_total_and_refund() {
        let registry = customer_service().unwrap();
        let store = seeded();
        let total = run(&registry, &store, "compute_total", json!({"qty": 2, "price": 5})).unwrap();
        assert_eq!(total["amount"], json!(10.0));
        let refund = run(&registry, &store, "compute_refund", json!({"qty": 2, "price": 5})).unwrap();
        assert_eq!(refund["amount"], json!(-10.0));
    }

    #[test]
    fn validations_report_ok_flag() {
        let registry = customer_service().unwrap();
        let store = seeded();
        assert_eq!(run(&registry, &store, "assert_true", json!({"value": ""})).unwrap()["ok"], json!(false));
        assert_eq!(run(&registry, &store, "assert", json!({"value": [1]})).unwrap()["ok"], json!(true));
        assert_eq!(run(&registry, &store, "assert_non_null", json!({"value": null})).unwrap()["ok"], json!(false));
        assert_eq!(
            run(&registry, &store, "assert_gt", json!({"value": 3, "threshold": 3})).unwrap()["ok"],
            json!(false)
        );
        assert_eq!(
            run(&registry, &store, "assert_gte", json!({"value": 3, "threshold": 3})).unwrap()["ok"],
            json!(true)
        );
        assert_eq!(
            run(&registry, &store, "assert_gt", json!({"value": "abc", "threshold": 1})).unwrap()["reason"],
            json!("non_numeric")
        );
    }

    #[test]
    fn stock_validations() {
        let registry = customer_service().unwrap();
        let store = seeded();
        let enough = run(&registry, &store, "assert_sufficient_stock", json!({"item_id": "SG002", "qty": 3})).unwrap();
        assert_eq!(enough["ok"], json!(true));
        let short = run(&registry, &store, "assert_sufficient_stock", json!({"item_id": "SG002", "qty": 4})).unwrap();
        assert_eq!(short["ok"], json!(false));
        assert_eq!(short["remaining"], json!(-1.0));

        let missing = run(&registry, &store, "assert_nonnegative_stock", json!({"item_id": "SG999"})).unwrap();
        assert_eq!(missing["reason"], json!("item_not_found"));
    }

    #[test]
    fn next_id_follows_highest_number() {
        let rows = vec![
            record(json!({"transaction_id": "TXN009"})),
            record(json!({"transaction_id": "REF001"})),
        ];
        assert_eq!(next_transaction_id(&rows, "TXN"), "TXN010");
        assert_eq!(next_transaction_id(&rows, "REF"), "REF002");
        assert_eq!(next_transaction_id(&[], "TXN"), "TXN001");
    }
}
