//! Port traits (interfaces for adapters).
//!
//! These are the contracts that adapters must implement.
//! The application layer depends on these traits, not concrete implementations.

mod clock;
mod credit;
mod ledger;
mod notify;
mod rates;
mod schedule;

pub use clock::{Clock, ManualClock, SystemClock};
pub use credit::CreditStore;
pub use ledger::LedgerStore;
pub use notify::{NotificationKind, Notifier, NotifyError};
pub use rates::{RateError, RateProvider};
pub use schedule::{PaymentScheduleStore, Settlement};

/// Everything the services need from persistence, behind one bound.
pub trait Store: LedgerStore + CreditStore + PaymentScheduleStore {}

impl<T> Store for T where T: LedgerStore + CreditStore + PaymentScheduleStore {}
