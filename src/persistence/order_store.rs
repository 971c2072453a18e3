//! JSON-file order store.
//!
//! The whole collection lives in one `{"orders": [...]}` document. Every
//! read-modify-write runs under a single async mutex, and writes go through
//! a temporary file in the same directory followed by an atomic rename, so
//! a crash mid-write never leaves a truncated document behind.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::models::order::{NewOrder, Order, OrderUpdate};
use crate::{AppError, Result};

/// On-disk document shape.
#[derive(Debug, Default, Serialize, Deserialize)]
struct OrderDocument {
    #[serde(default)]
    orders: Vec<Order>,
}

/// Order repository backed by a single JSON file.
#[derive(Debug)]
pub struct OrderStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl OrderStore {
    /// Create a store over `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All orders in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` or `AppError::Store` if the file cannot be read
    /// or parsed.
    pub async fn list(&self) -> Result<Vec<Order>> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.orders)
    }

    /// Fetch one order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if no order has `id`.
    pub async fn get(&self, id: &str) -> Result<Order> {
        let _guard = self.lock.lock().await;
        self.read()
            .await?
            .orders
            .into_iter()
            .find(|order| order.id == id)
            .ok_or_else(|| AppError::NotFound("Order not found".into()))
    }

    /// Create an order with a fresh `ORD<unix-seconds>` id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for an invalid payload, or a storage
    /// error if the document cannot be read or written.
    pub async fn create(&self, new: NewOrder) -> Result<Order> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read().await?;
        let now = Utc::now();
        let id = unique_id(&doc.orders, &format!("ORD{}", now.timestamp()));
        let order = Order::from_new(id, new, now)?;
        doc.orders.push(order.clone());
        self.write(&doc).await?;
        info!(order_id = %order.id, "order created");
        Ok(order)
    }

    /// Merge `update` into an existing order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if no order has `id`.
    pub async fn update(&self, id: &str, update: OrderUpdate) -> Result<Order> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read().await?;
        let order = doc
            .orders
            .iter_mut()
            .find(|order| order.id == id)
            .ok_or_else(|| AppError::NotFound("Order not found".into()))?;
        order.apply(update, Utc::now());
        let updated = order.clone();
        self.write(&doc).await?;
        info!(order_id = %id, "order updated");
        Ok(updated)
    }

    /// Delete an order. Deleting a missing id is not an error; the return
    /// value reports whether anything was removed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the document cannot be read or written.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read().await?;
        let before = doc.orders.len();
        doc.orders.retain(|order| order.id != id);
        let removed = doc.orders.len() != before;
        self.write(&doc).await?;
        if removed {
            info!(order_id = %id, "order deleted");
        }
        Ok(removed)
    }

    /// Overwrite the whole collection.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the document cannot be written.
    pub async fn replace_all(&self, orders: Vec<Order>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let count = orders.len();
        self.write(&OrderDocument { orders }).await?;
        info!(count, "order collection replaced");
        Ok(())
    }

    async fn read(&self) -> Result<OrderDocument> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) if text.trim().is_empty() => Ok(OrderDocument::default()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "order file missing, starting empty");
                Ok(OrderDocument::default())
            }
            Err(err) => Err(AppError::Io(format!(
                "failed to read {}: {err}",
                self.path.display()
            ))),
        }
    }

    async fn write(&self, doc: &OrderDocument) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|err| AppError::Io(format!("order write task failed: {err}")))?
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)
        .map_err(|err| AppError::Io(format!("failed to create {}: {err}", parent.display())))?;

    let mut tmp = NamedTempFile::new_in(parent)
        .map_err(|err| AppError::Io(format!("failed to create temporary file: {err}")))?;
    tmp.write_all(bytes)
        .map_err(|err| AppError::Io(format!("failed to write temporary file: {err}")))?;
    tmp.persist(path)
        .map_err(|err| AppError::Io(format!("failed to persist {}: {err}", path.display())))?;
    Ok(())
}

/// `base`, or `base-<n>` for the first `n` not already taken.
fn unique_id(orders: &[Order], base: &str) -> String {
    let taken = |candidate: &str| orders.iter().any(|order| order.id == candidate);
    if !taken(base) {
        return base.to_owned();
    }
    (1..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_owned())
}
