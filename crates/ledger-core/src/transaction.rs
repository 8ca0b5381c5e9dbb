//! A single recorded fact about one business order.

use crate::error::{LedgerError, Result};
use crate::now_millis;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The closed set of order state transitions the ledger records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    OrderCreated,
    OrderPaid,
    MerchantAccepted,
    CourierAccepted,
    OrderDelivered,
    OrderRefunded,
}

impl TransactionKind {
    pub const ALL: [TransactionKind; 6] = [
        TransactionKind::OrderCreated,
        TransactionKind::OrderPaid,
        TransactionKind::MerchantAccepted,
        TransactionKind::CourierAccepted,
        TransactionKind::OrderDelivered,
        TransactionKind::OrderRefunded,
    ];

    /// Stable tag used in the canonical encoding. Never renumber.
    pub fn code(self) -> u8 {
        match self {
            TransactionKind::OrderCreated => 1,
            TransactionKind::OrderPaid => 2,
            TransactionKind::MerchantAccepted => 3,
            TransactionKind::CourierAccepted => 4,
            TransactionKind::OrderDelivered => 5,
            TransactionKind::OrderRefunded => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::OrderCreated => "ORDER_CREATED",
            TransactionKind::OrderPaid => "ORDER_PAID",
            TransactionKind::MerchantAccepted => "MERCHANT_ACCEPTED",
            TransactionKind::CourierAccepted => "COURIER_ACCEPTED",
            TransactionKind::OrderDelivered => "ORDER_DELIVERED",
            TransactionKind::OrderRefunded => "ORDER_REFUNDED",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = LedgerError;

    /// Accepts `ORDER_PAID` as well as `OrderPaid`.
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        TransactionKind::ALL
            .into_iter()
            .find(|kind| {
                kind.as_str() == wanted || format!("{kind:?}") == wanted
            })
            .ok_or_else(|| LedgerError::InvalidTransactionKind(s.to_string()))
    }
}

/// Immutable once constructed; fields are read through accessors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub(crate) id: Uuid,
    pub(crate) order_id: String,
    pub(crate) kind: TransactionKind,
    pub(crate) timestamp: u64,
    pub(crate) actor: String,
    pub(crate) counterparty: Option<String>,
    pub(crate) payload: String,
    pub(crate) off_chain_digest: Option<String>,
}

impl Transaction {
    /// Records a new fact with a fresh id and the current unix time in milliseconds.
    pub fn new(
        order_id: impl Into<String>,
        kind: TransactionKind,
        actor: impl Into<String>,
        counterparty: Option<String>,
        payload: impl Into<String>,
        off_chain_digest: Option<String>,
    ) -> Result<Self> {
        let order_id = order_id.into();
        if order_id.trim().is_empty() {
            return Err(LedgerError::MissingField("order_id"));
        }
        let actor = actor.into();
        if actor.trim().is_empty() {
            return Err(LedgerError::MissingField("actor"));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            order_id,
            kind,
            timestamp: now_millis(),
            actor,
            counterparty,
            payload: payload.into(),
            off_chain_digest,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn counterparty(&self) -> Option<&str> {
        self.counterparty.as_deref()
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn off_chain_digest(&self) -> Option<&str> {
        self.off_chain_digest.as_deref()
    }

    /// Deterministic, field-ordered encoding. Every variable-length field is
    /// length-prefixed and every optional field carries a presence tag, so no
    /// two distinct transactions share an encoding.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(
            16 + 1 + 8 + self.order_id.len() + self.actor.len() + self.payload.len() + 64,
        );
        bytes.extend_from_slice(self.id.as_bytes());
        put_str(&mut bytes, &self.order_id);
        bytes.push(self.kind.code());
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        put_str(&mut bytes, &self.actor);
        put_opt_str(&mut bytes, self.counterparty.as_deref());
        put_str(&mut bytes, &self.payload);
        put_opt_str(&mut bytes, self.off_chain_digest.as_deref());
        bytes
    }
}

pub(crate) fn put_len_prefixed(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u64).to_le_bytes());
    buf.extend_from_slice(data);
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    put_len_prefixed(buf, s.as_bytes());
}

fn put_opt_str(buf: &mut Vec<u8>, s: Option<&str>) {
    match s {
        None => buf.push(0),
        Some(s) => {
            buf.push(1);
            put_str(buf, s);
        }
    }
}
