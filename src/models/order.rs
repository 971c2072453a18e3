//! Order tracking records.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AppError;

/// Delivery status of an order.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Received, not yet handled.
    Pending,
    /// Being prepared.
    #[default]
    Processing,
    /// Handed to the courier.
    Shipped,
    /// Delivered to the customer.
    Delivered,
    /// Cancelled.
    Cancelled,
}

impl OrderStatus {
    /// Wire name of the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(AppError::BadRequest(format!("unknown order status: {other}"))),
        }
    }
}

fn default_customer_name() -> String {
    "Not specified".into()
}

fn default_location() -> String {
    "Processing".into()
}

/// Persisted order record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Unique order identifier (`ORD<unix-seconds>`).
    pub id: String,
    /// Customer display name.
    #[serde(default = "default_customer_name")]
    pub customer_name: String,
    /// Customer phone number.
    pub customer_number: String,
    /// Delivery status.
    #[serde(default)]
    pub status: OrderStatus,
    /// Free-form order details.
    #[serde(default)]
    pub details: String,
    /// Courier tracking number.
    #[serde(default)]
    pub tracking_number: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
    /// Estimated delivery, as entered by the operator.
    #[serde(default)]
    pub estimated_delivery: Option<String>,
    /// Current location of the parcel.
    #[serde(default = "default_location")]
    pub current_location: String,
}

/// Payload for creating an order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    /// Customer display name.
    pub customer_name: Option<String>,
    /// Customer phone number (required).
    pub customer_number: String,
    /// Initial status.
    pub status: Option<OrderStatus>,
    /// Free-form details.
    pub details: Option<String>,
    /// Courier tracking number.
    pub tracking_number: Option<String>,
    /// Estimated delivery.
    pub estimated_delivery: Option<String>,
    /// Current location.
    pub current_location: Option<String>,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdate {
    /// New customer name.
    pub customer_name: Option<String>,
    /// New customer number.
    pub customer_number: Option<String>,
    /// New status.
    pub status: Option<OrderStatus>,
    /// New details.
    pub details: Option<String>,
    /// New tracking number.
    pub tracking_number: Option<String>,
    /// New estimated delivery.
    pub estimated_delivery: Option<String>,
    /// New location.
    pub current_location: Option<String>,
}

impl Order {
    /// Build a fresh order from a creation payload.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` if the customer number is blank.
    pub fn from_new(id: String, new: NewOrder, now: DateTime<Utc>) -> crate::Result<Self> {
        if new.customer_number.trim().is_empty() {
            return Err(AppError::BadRequest("customerNumber is required".into()));
        }
        Ok(Self {
            id,
            customer_name: new.customer_name.unwrap_or_else(default_customer_name),
            customer_number: new.customer_number,
            status: new.status.unwrap_or_default(),
            details: new.details.unwrap_or_default(),
            tracking_number: new.tracking_number,
            created_at: now,
            updated_at: now,
            estimated_delivery: new.estimated_delivery,
            current_location: new.current_location.unwrap_or_else(default_location),
        })
    }

    /// Merge an update into this order and refresh `updated_at`.
    pub fn apply(&mut self, update: OrderUpdate, now: DateTime<Utc>) {
        if let Some(name) = update.customer_name {
            self.customer_name = name;
        }
        if let Some(number) = update.customer_number {
            self.customer_number = number;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(details) = update.details {
            self.details = details;
        }
        if let Some(tracking) = update.tracking_number {
            self.tracking_number = Some(tracking);
        }
        if let Some(eta) = update.estimated_delivery {
            self.estimated_delivery = Some(eta);
        }
        if let Some(location) = update.current_location {
            self.current_location = location;
        }
        self.updated_at = now;
    }
}
