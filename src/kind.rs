//! Request kind adapter.
//!
//! Maps a domain order (ride or food delivery) into the common record shape
//! before creation, and projects a stored record back into kind-specific
//! data. The kind is a closed tagged variant, so every projection is an
//! exhaustive match rather than a check for optional fields.

use crate::error::{Result, SyncError};
use crate::types::{Place, RequestInput, RequestRecord, UserId};
use serde::{Deserialize, Serialize};

/// Kind tag plus the fields that only exist for that kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestKind {
    Ride,
    Food {
        items: Vec<FoodItem>,
        #[serde(rename = "deliveryMode")]
        delivery_mode: DeliveryMode,
    },
}

impl RequestKind {
    pub fn tag(&self) -> &'static str {
        match self {
            RequestKind::Ride => "ride",
            RequestKind::Food { .. } => "food",
        }
    }
}

/// One line of a food order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodItem {
    pub name: String,
    pub quantity: u32,
    pub unit_price: f64,
}

impl FoodItem {
    pub fn new(name: impl Into<String>, quantity: u32, unit_price: f64) -> Self {
        Self {
            name: name.into(),
            quantity,
            unit_price,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    Standard,
    Express,
}

/// A domain order as handed over by the presentation layer.
#[derive(Clone, Debug, PartialEq)]
pub struct Order {
    pub pickup: Place,
    pub destination: Place,
    pub stops: Vec<Place>,
    pub vehicle_or_mode: String,
    pub price: f64,
    pub user_id: UserId,
    pub user_name: String,
    pub kind: RequestKind,
}

impl Order {
    /// Build the common record input, rejecting orders the store must never
    /// see (negative or non-finite prices, empty food lines).
    pub fn to_input(&self) -> Result<RequestInput> {
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(SyncError::InvalidOrder(format!(
                "price must be a non-negative number, got {}",
                self.price
            )));
        }

        if let RequestKind::Food { items, .. } = &self.kind {
            if items.is_empty() {
                return Err(SyncError::InvalidOrder("food order has no items".into()));
            }
            for item in items {
                if item.quantity == 0 {
                    return Err(SyncError::InvalidOrder(format!(
                        "item {:?} has zero quantity",
                        item.name
                    )));
                }
                if !item.unit_price.is_finite() || item.unit_price < 0.0 {
                    return Err(SyncError::InvalidOrder(format!(
                        "item {:?} has invalid unit price {}",
                        item.name, item.unit_price
                    )));
                }
            }
        }

        Ok(RequestInput {
            kind: self.kind.clone(),
            pickup: self.pickup.clone(),
            destination: self.destination.clone(),
            stops: self.stops.clone(),
            vehicle_or_mode: self.vehicle_or_mode.clone(),
            price: self.price,
            user_id: self.user_id.clone(),
            user_name: self.user_name.clone(),
        })
    }
}

/// Immutable request context, built once when the user confirms an order.
///
/// Everything downstream (initial create, retries, cancel fallback lookup)
/// reads from this one value.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestContext {
    order: Order,
}

impl RequestContext {
    /// Validate the order up front so retries cannot fail on input.
    pub fn new(order: Order) -> Result<Self> {
        order.to_input()?;
        Ok(Self { order })
    }

    pub fn order(&self) -> &Order {
        &self.order
    }

    pub fn user_id(&self) -> &UserId {
        &self.order.user_id
    }

    /// Fresh record input for a create or a retry.
    pub fn input(&self) -> Result<RequestInput> {
        self.order.to_input()
    }
}

/// Kind-specific projection of a stored record.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum KindView<'a> {
    Ride {
        vehicle: &'a str,
    },
    Food {
        mode: &'a str,
        items: &'a [FoodItem],
        delivery_mode: DeliveryMode,
    },
}

impl RequestRecord {
    pub fn kind_view(&self) -> KindView<'_> {
        match &self.kind {
            RequestKind::Ride => KindView::Ride {
                vehicle: &self.vehicle_or_mode,
            },
            RequestKind::Food {
                items,
                delivery_mode,
            } => KindView::Food {
                mode: &self.vehicle_or_mode,
                items,
                delivery_mode: *delivery_mode,
            },
        }
    }
}
