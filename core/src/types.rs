//! Shared primitive types used across the entire ledger.

/// A user's stable identity, as issued by the identity provider.
pub type UserId = String;

pub type TableId = String;

/// Seat position at a table. Validated at the callable boundary.
pub type SeatNumber = i64;

pub type SessionId = String;

pub type WithdrawalRequestId = String;

pub type OrderId = String;

/// A chip quantity. Never negative once it has passed validation.
pub type Chips = i64;

/// A monetary amount owed, in minor currency units.
pub type Money = i64;
