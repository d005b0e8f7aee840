//! Domain models for the credit engine.

pub mod account;
pub mod amortization;
pub mod credit;
pub mod ids;
pub mod money;
pub mod schedule;
pub mod transaction;

pub use account::{Account, AccountStatus};
pub use credit::{Credit, CreditStatus};
pub use ids::{AccountId, CreditId, EntryId, TransactionId, UserId};
pub use money::{Currency, Money};
pub use schedule::{PaymentScheduleEntry, PaymentStatus};
pub use transaction::{Transaction, TransactionStatus, TransactionType};
