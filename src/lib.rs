//! Availability watcher for the Amul online shop.
//!
//! Each run captures the shop's product listing through a headless browser,
//! compares it with the availability recorded by the previous run, and sends
//! an alert for every watched product that has come back in stock.

pub mod config;
pub mod monitor;
pub mod notify;
pub mod product;
pub mod reconcile;
pub mod source;
pub mod state;

pub use config::Config;
pub use monitor::{Monitor, RunError, RunOutcome, RunReport};
pub use notify::{Notifier, NotifyError, NtfyNotifier};
pub use product::ProductObservation;
pub use reconcile::{AlertEvent, Reconciliation, TargetSet, reconcile};
pub use source::{BrowserConfig, BrowserSource, ObservationSource, SourceError};
pub use state::{JsonFileStore, StateStore, StockState, StoreError};
