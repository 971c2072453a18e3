//! CSV exchange for orders and contacts.
//!
//! A small RFC 4180 reader/writer: comma separated, double-quote escaping,
//! quoted fields may span lines. Output uses CRLF row terminators.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::models::order::{Order, OrderStatus};
use crate::{AppError, Result};

/// Header row of the order export, also the column names read on import.
pub const ORDER_HEADERS: [&str; 7] = [
    "Customer Name",
    "Customer Number",
    "Status",
    "Current Location",
    "Order Number",
    "Estimated Delivery",
    "Details",
];

/// Header row of the contacts export.
pub const CONTACT_HEADERS: [&str; 3] = ["Contact ID", "Name", "Phone Number"];

/// Parse CSV text into rows of fields.
///
/// A leading UTF-8 BOM is ignored, as are blank lines.
///
/// # Errors
///
/// Returns `AppError::Csv` if a quoted field is never closed or a quote
/// appears in the middle of an unquoted field.
pub fn parse(text: &str) -> Result<Vec<Vec<String>>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut field_started = false;
    let mut line = 1_usize;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(ch);
                }
                _ => field.push(ch),
            }
            continue;
        }
        match ch {
            '"' if !field_started => {
                in_quotes = true;
                field_started = true;
            }
            '"' => {
                return Err(AppError::Csv(format!("unexpected quote on line {line}")));
            }
            ',' => {
                row.push(std::mem::take(&mut field));
                field_started = false;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                end_row(&mut rows, &mut row, &mut field);
                field_started = false;
                line += 1;
            }
            _ => {
                field.push(ch);
                field_started = true;
            }
        }
    }
    if in_quotes {
        return Err(AppError::Csv(format!(
            "unterminated quoted field starting before line {line}"
        )));
    }
    end_row(&mut rows, &mut row, &mut field);
    Ok(rows)
}

fn end_row(rows: &mut Vec<Vec<String>>, row: &mut Vec<String>, field: &mut String) {
    if row.is_empty() && field.is_empty() {
        return;
    }
    row.push(std::mem::take(field));
    rows.push(std::mem::take(row));
}

/// Append one CSV row, quoting fields that need it.
pub fn write_row<S: AsRef<str>>(out: &mut String, fields: &[S]) {
    for (index, field) in fields.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        let field = field.as_ref();
        if field.contains([',', '"', '\n', '\r']) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push_str("\r\n");
}

/// Render orders in the export layout.
#[must_use]
pub fn export_orders(orders: &[Order]) -> String {
    let mut out = String::new();
    write_row(&mut out, &ORDER_HEADERS);
    for order in orders {
        write_row(
            &mut out,
            &[
                order.customer_name.as_str(),
                order.customer_number.as_str(),
                order.status.as_str(),
                order.current_location.as_str(),
                order.tracking_number.as_deref().unwrap_or(""),
                order.estimated_delivery.as_deref().unwrap_or(""),
                order.details.as_str(),
            ],
        );
    }
    out
}

/// Export file name for `now`, e.g. `orders_20240131.csv`.
#[must_use]
pub fn export_filename(now: DateTime<Utc>) -> String {
    format!("orders_{}.csv", now.format("%Y%m%d"))
}

/// Result of reading an order import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Orders built from valid rows.
    pub orders: Vec<Order>,
    /// Rows skipped for lacking a customer number.
    pub skipped: usize,
    /// Per-row errors; a non-empty list means nothing should be saved.
    pub errors: Vec<String>,
}

impl ImportReport {
    /// Summary line for a successful import.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Import completed successfully. {} orders imported, {} skipped. Previous data has been overwritten.",
            self.orders.len(),
            self.skipped
        )
    }
}

/// Build orders from CSV text in the export layout.
///
/// Columns are matched by header name; missing columns read as empty.
/// Rows without a customer number are skipped. Ids are
/// `ORD<unix-seconds>_<index>`.
///
/// # Errors
///
/// Returns `AppError::Csv` if the text is not well-formed CSV. Row-level
/// problems are collected in [`ImportReport::errors`] instead.
pub fn import_orders(text: &str, now: DateTime<Utc>) -> Result<ImportReport> {
    let mut rows = parse(text)?.into_iter();
    let Some(header) = rows.next() else {
        return Ok(ImportReport::default());
    };
    let column = |name: &str| header.iter().position(|h| h.trim() == name);
    let columns: Vec<Option<usize>> = ORDER_HEADERS.iter().map(|name| column(name)).collect();

    let mut report = ImportReport::default();
    for row in rows {
        let cell = |index: usize| -> Option<&str> {
            columns[index].and_then(|c| row.get(c)).map(String::as_str)
        };
        let customer_number = cell(1).unwrap_or("").trim();
        if customer_number.is_empty() {
            report.skipped += 1;
            continue;
        }
        let row_number = report.orders.len() + report.skipped + 1;

        let status = match cell(2).map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => match raw.parse::<OrderStatus>() {
                Ok(status) => status,
                Err(err) => {
                    report.errors.push(format!("Error on row {row_number}: {err}"));
                    continue;
                }
            },
            None => OrderStatus::default(),
        };

        let optional = |index: usize| {
            cell(index)
                .filter(|value| !value.trim().is_empty())
                .map(str::to_owned)
        };
        report.orders.push(Order {
            id: format!("ORD{}_{}", now.timestamp(), report.orders.len()),
            customer_name: cell(0).map_or_else(|| "Not specified".to_owned(), str::to_owned),
            customer_number: customer_number.to_owned(),
            status,
            details: cell(6).unwrap_or("").to_owned(),
            tracking_number: optional(4),
            created_at: now,
            updated_at: now,
            estimated_delivery: optional(5),
            current_location: cell(3).unwrap_or("").to_owned(),
        });
    }
    Ok(report)
}

/// Read the contacts map (`{number: name}`); `None` if the file is absent.
///
/// # Errors
///
/// Returns `AppError::Io` if the file cannot be read, or `AppError::Store`
/// if it is not a JSON object of strings.
pub async fn read_contacts(path: &Path) -> Result<Option<BTreeMap<String, String>>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(AppError::Io(format!(
            "failed to read {}: {err}",
            path.display()
        ))),
    }
}

/// Render contacts as `Contact ID, Name, Phone Number` rows.
#[must_use]
pub fn contacts_csv(contacts: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    write_row(&mut out, &CONTACT_HEADERS);
    for (number, name) in contacts {
        write_row(&mut out, &[name.as_str(), name.as_str(), number.as_str()]);
    }
    out
}
