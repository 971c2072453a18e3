//! Unit tests for CSV order exchange and contacts export.

use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};

use bot_supervisor::models::order::{NewOrder, Order, OrderStatus};
use bot_supervisor::persistence::csv::{
    contacts_csv, export_filename, export_orders, import_orders, parse, read_contacts,
};

fn sample_order() -> Order {
    let now = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();
    let mut order = Order::from_new(
        "ORD1".into(),
        NewOrder {
            customer_name: Some("Doe, Jane".into()),
            customer_number: "+15550100".into(),
            status: Some(OrderStatus::Shipped),
            details: Some("2x \"large\" box".into()),
            tracking_number: Some("TRK-1".into()),
            ..NewOrder::default()
        },
        now,
    )
    .unwrap();
    order.current_location = "Hub".into();
    order
}

#[test]
fn export_has_header_and_quotes_special_fields() {
    let csv = export_orders(&[sample_order()]);
    let mut lines = csv.split("\r\n");
    assert_eq!(
        lines.next(),
        Some("Customer Name,Customer Number,Status,Current Location,Order Number,Estimated Delivery,Details")
    );
    assert_eq!(
        lines.next(),
        Some("\"Doe, Jane\",+15550100,shipped,Hub,TRK-1,,\"2x \"\"large\"\" box\"")
    );
}

#[test]
fn exported_orders_import_back() {
    let now = Utc.with_ymd_and_hms(2024, 3, 6, 0, 0, 0).unwrap();
    let report = import_orders(&export_orders(&[sample_order()]), now).expect("parses");
    assert!(report.errors.is_empty());
    assert_eq!(report.orders.len(), 1);
    let order = &report.orders[0];
    assert_eq!(order.customer_name, "Doe, Jane");
    assert_eq!(order.details, "2x \"large\" box");
    assert_eq!(order.tracking_number.as_deref(), Some("TRK-1"));
    assert_eq!(order.estimated_delivery, None);
    assert_eq!(order.id, format!("ORD{}_0", now.timestamp()));
}

#[test]
fn rows_without_customer_number_are_skipped() {
    let text = "Customer Name,Customer Number,Status\nAna,,pending\nBo,+1,pending\n";
    let report = import_orders(text, Utc::now()).expect("parses");
    assert_eq!(report.skipped, 1);
    assert_eq!(report.orders.len(), 1);
    assert_eq!(
        report.summary(),
        "Import completed successfully. 1 orders imported, 1 skipped. Previous data has been overwritten."
    );
}

#[test]
fn invalid_status_is_a_row_error() {
    let text = "Customer Number,Status\n+1,pending\n+2,teleported\n";
    let report = import_orders(text, Utc::now()).expect("parses");
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].starts_with("Error on row 2:"));
}

#[test]
fn missing_status_defaults_to_processing() {
    let report = import_orders("Customer Number\n+1\n", Utc::now()).expect("parses");
    assert_eq!(report.orders[0].status, OrderStatus::Processing);
    assert_eq!(report.orders[0].customer_name, "Not specified");
}

#[test]
fn empty_input_imports_nothing() {
    let report = import_orders("", Utc::now()).expect("parses");
    assert!(report.orders.is_empty());
    assert_eq!(report.skipped, 0);
}

#[test]
fn bom_and_blank_lines_are_ignored() {
    let rows = parse("\u{feff}a,b\n\n1,2\n").expect("parses");
    assert_eq!(rows, vec![vec!["a", "b"], vec!["1", "2"]]);
}

#[test]
fn stray_quote_is_rejected() {
    assert!(parse("ab\"c,d\n").is_err());
}

#[test]
fn export_filename_uses_date() {
    let now = Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 0).unwrap();
    assert_eq!(export_filename(now), "orders_20240131.csv");
}

#[test]
fn contacts_rows_are_name_name_number() {
    let contacts = BTreeMap::from([("+15550100".to_owned(), "Jane".to_owned())]);
    assert_eq!(
        contacts_csv(&contacts),
        "Contact ID,Name,Phone Number\r\nJane,Jane,+15550100\r\n"
    );
}

#[tokio::test]
async fn absent_contacts_file_is_none() {
    let temp = tempfile::tempdir().expect("tempdir");
    let contacts = read_contacts(&temp.path().join("contacts.json"))
        .await
        .expect("readable");
    assert!(contacts.is_none());
}

#[tokio::test]
async fn contacts_file_is_parsed() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("contacts.json");
    std::fs::write(&path, r#"{"+1": "Ana", "+2": "Bo"}"#).expect("write");
    let contacts = read_contacts(&path).await.expect("readable").expect("present");
    assert_eq!(contacts.get("+2").map(String::as_str), Some("Bo"));
}
