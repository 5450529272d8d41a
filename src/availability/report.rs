use std::collections::{BTreeMap, BTreeSet};

use super::demand::Demand;
use crate::domain::{AvailabilitySnapshot, ProductId, SubjectId, VariantId};

/// What a reconciler currently knows about its demand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailabilityReport {
    /// A batch fetch is in flight.
    pub loading: bool,
    /// Last known snapshot per tracked subject. Kept when a later fetch fails.
    pub snapshots: BTreeMap<SubjectId, AvailabilitySnapshot>,
    /// Products whose subject is out of stock or short of the wanted quantity.
    pub unavailable: BTreeSet<ProductId>,
    /// Tracked subjects without a snapshot: never fetched, or missing from the last answer.
    pub unknown: BTreeSet<SubjectId>,
    /// Error of the most recent fetch, cleared by the next successful one.
    pub last_error: Option<String>,
}

impl AvailabilityReport {
    pub(crate) fn derive(
        demand: &Demand,
        snapshots: &BTreeMap<SubjectId, AvailabilitySnapshot>,
        loading: bool,
        last_error: Option<String>,
    ) -> Self {
        let mut report = Self {
            loading,
            last_error,
            ..Self::default()
        };

        for (subject, need) in demand.needs() {
            match snapshots.get(subject) {
                None => {
                    report.unknown.insert(subject.clone());
                }
                Some(snapshot) => {
                    if !snapshot.can_fulfil(need.quantity) {
                        report.unavailable.extend(need.products.iter().cloned());
                    }
                    report.snapshots.insert(subject.clone(), snapshot.clone());
                }
            }
        }
        report
    }

    /// Checkout must not proceed while anything is unavailable or unverified.
    pub fn blocked(&self) -> bool {
        !self.unavailable.is_empty() || !self.unknown.is_empty()
    }

    pub fn product_availability(&self) -> BTreeMap<ProductId, AvailabilitySnapshot> {
        self.snapshots
            .iter()
            .filter_map(|(subject, snapshot)| match subject {
                SubjectId::Product(id) => Some((id.clone(), snapshot.clone())),
                SubjectId::Variant(_) => None,
            })
            .collect()
    }

    pub fn variant_availability(&self) -> BTreeMap<VariantId, AvailabilitySnapshot> {
        self.snapshots
            .iter()
            .filter_map(|(subject, snapshot)| match subject {
                SubjectId::Variant(id) => Some((id.clone(), snapshot.clone())),
                SubjectId::Product(_) => None,
            })
            .collect()
    }

    pub fn view(&self) -> AvailabilityView {
        AvailabilityView {
            loading: self.loading,
            product_availability: self.product_availability(),
            variant_availability: self.variant_availability(),
        }
    }
}

/// Availability as shown next to product listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailabilityView {
    pub loading: bool,
    pub product_availability: BTreeMap<ProductId, AvailabilitySnapshot>,
    pub variant_availability: BTreeMap<VariantId, AvailabilitySnapshot>,
}
