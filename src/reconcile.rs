//! Availability diffing and alert decisions.

use crate::product::{ProductObservation, format_price, normalize};
use crate::state::StockState;
use std::collections::BTreeSet;

/// Product identities the operator wants watched. Empty watches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSet(BTreeSet<String>);

impl TargetSet {
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse a comma-separated list of product names.
    pub fn parse(list: &str) -> Self {
        list.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.0.contains(identity)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for TargetSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(|name| normalize(name.as_ref())).collect())
    }
}

/// A product that went from unavailable (or unknown) to available.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub product: ProductObservation,
}

impl AlertEvent {
    pub fn title(&self) -> String {
        format!("🎉 Stock Alert: {} is available!", self.product.name)
    }

    pub fn message(&self) -> String {
        format!(
            "Price: ₹{}\nStock: {}",
            format_price(self.product.price),
            self.product.inventory_quantity
        )
    }

    pub fn url(&self) -> String {
        self.product.url()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub next: StockState,
    /// Alerts in observation order.
    pub events: Vec<AlertEvent>,
    /// Targets missing from the observations, forced to unavailable.
    pub unseen_targets: Vec<String>,
}

/// Compute the next state and the alerts it implies.
///
/// Each observation is compared against `previous`, never against the state
/// being built, so a product listed twice cannot suppress its own alert.
/// Targets absent from `observations` are recorded as unavailable, which also
/// covers an empty scrape.
pub fn reconcile(
    previous: &StockState,
    observations: &[ProductObservation],
    targets: &TargetSet,
) -> Reconciliation {
    let mut next = previous.clone();
    let mut seen = BTreeSet::new();
    let mut events = Vec::new();

    for product in observations {
        let id = product.identity();
        seen.insert(id.clone());

        if !targets.is_empty() && !targets.contains(&id) {
            continue;
        }

        if !previous.is_available(&id) && product.available {
            events.push(AlertEvent {
                product: product.clone(),
            });
        }
        next.set(id, product.available);
    }

    let unseen_targets: Vec<String> = targets
        .iter()
        .filter(|id| !seen.contains(*id))
        .map(str::to_owned)
        .collect();
    for id in &unseen_targets {
        next.set(id.as_str(), false);
    }

    Reconciliation {
        next,
        events,
        unseen_targets,
    }
}
