use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use lp_common::{luhn_valid, Points};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

//--------------------------------------    OrderNumber      ---------------------------------------------------------
/// An order number as submitted by a user. Always numeric and Luhn-valid.
///
/// The only way to build one from external input is [`OrderNumber::from_str`], which enforces the checksum, so any
/// `OrderNumber` floating around the system can be assumed well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize)]
#[sqlx(transparent)]
pub struct OrderNumber(String);

#[derive(Debug, Clone, Error)]
#[error("{0} is not a valid order number")]
pub struct InvalidOrderNumber(pub String);

impl FromStr for OrderNumber {
    type Err = InvalidOrderNumber;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if luhn_valid(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(InvalidOrderNumber(s.to_string()))
        }
    }
}

// Only used when decoding rows. Numbers are validated before they are ever written.
impl From<String> for OrderNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl OrderNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------    OrderStatus      ---------------------------------------------------------
/// Lifecycle of an order through the accrual pipeline.
///
/// `New → Registered → Processing → {Processed, Invalid}`. The two terminal states absorb: once an order is
/// `Processed` or `Invalid` no further transition is ever applied. The on-disk and wire spelling is the accrual
/// oracle's vocabulary (`NEW`, `REGISTERED`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type)]
#[sqlx(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// The order has been accepted into the ledger but not yet seen by the accrual oracle.
    New,
    /// The oracle knows about the order but has not started evaluating it.
    Registered,
    /// The oracle is evaluating the accrual.
    Processing,
    /// Terminal. The accrual was computed and credited to the owner's balance.
    Processed,
    /// Terminal. The oracle refused the order. No points are credited.
    Invalid,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Processed | OrderStatus::Invalid)
    }

    /// Position in the lifecycle. Legal transitions never decrease this.
    pub fn rank(&self) -> u8 {
        match self {
            OrderStatus::New => 0,
            OrderStatus::Registered => 1,
            OrderStatus::Processing => 2,
            OrderStatus::Processed | OrderStatus::Invalid => 3,
        }
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::New => write!(f, "NEW"),
            OrderStatus::Registered => write!(f, "REGISTERED"),
            OrderStatus::Processing => write!(f, "PROCESSING"),
            OrderStatus::Processed => write!(f, "PROCESSED"),
            OrderStatus::Invalid => write!(f, "INVALID"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid order status: {0}")]
pub struct ConversionError(String);

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(Self::New),
            "REGISTERED" => Ok(Self::Registered),
            "PROCESSING" => Ok(Self::Processing),
            "PROCESSED" => Ok(Self::Processed),
            "INVALID" => Ok(Self::Invalid),
            s => Err(ConversionError(s.to_string())),
        }
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to New");
            OrderStatus::New
        })
    }
}

impl Serialize for OrderStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

//--------------------------------------       Order         ---------------------------------------------------------
/// A row in the order ledger. Created once by order submission, mutated only by accrual settlement, never deleted.
#[derive(Debug, Clone, FromRow)]
pub struct Order {
    pub id: i64,
    pub number: OrderNumber,
    pub user_id: String,
    pub status: OrderStatus,
    /// Zero until the order reaches `Processed`.
    pub accrual: Points,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------      NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub number: OrderNumber,
    pub user_id: String,
}

impl NewOrder {
    pub fn new(number: OrderNumber, user_id: impl Into<String>) -> Self {
        Self { number, user_id: user_id.into() }
    }
}

//--------------------------------------     OrderClaim      ---------------------------------------------------------
/// Outcome of submitting an order number. A number belongs to exactly one user forever, so a resubmission is
/// distinguished from another user's attempt to claim the same number.
#[derive(Debug, Clone)]
pub enum OrderClaim {
    /// The number was unknown and a fresh `NEW` order was recorded.
    Accepted(Order),
    /// The same user already submitted this number. Nothing was written.
    AlreadyYours(Order),
    /// Another user owns this number. Nothing was written.
    ClaimedByOther(Order),
}

//--------------------------------------  ReconcileOutcome   ---------------------------------------------------------
/// Result of applying an oracle verdict to the ledger.
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    /// The status (and, for `Processed`, the accrual and balance credit) was written.
    Applied(Order),
    /// The order was already in a terminal state. Nothing was written.
    AlreadySettled(Order),
    /// The ledger already holds a more advanced non-terminal state than the verdict. Nothing was written; the
    /// order still needs a future poll.
    Stale(Order),
}

//-------------------------------------- WithdrawalOutcome   ---------------------------------------------------------
/// Business outcome of a withdrawal request. Insufficient funds is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawalOutcome {
    Accepted,
    InsufficientFunds,
}

//--------------------------------------  BalanceSummary     ---------------------------------------------------------
/// A user's balance position: points currently spendable and the lifetime total withdrawn.
#[derive(Debug, Clone, Copy, Default, FromRow, Serialize, Deserialize)]
pub struct BalanceSummary {
    pub current: Points,
    pub withdrawn: Points,
}

//--------------------------------------     Withdrawal      ---------------------------------------------------------
/// A row in the withdrawal log. Write-once.
#[derive(Debug, Clone, FromRow)]
pub struct Withdrawal {
    pub id: i64,
    pub user_id: String,
    pub number: OrderNumber,
    pub amount: Points,
    pub processed_at: DateTime<Utc>,
}
