use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use super::demand::Demand;
use super::report::{AvailabilityReport, AvailabilityView};
use crate::cart_actor::Cart;
use crate::domain::{AvailabilitySnapshot, ProductId, StockLevel, SubjectId, VariantId};
use crate::error::AvailabilityError;
use crate::services::{AvailabilityQuery, InventoryService, ServiceError};

#[derive(Debug)]
pub enum AvailabilityRequest {
    RefreshNow { respond_to: oneshot::Sender<()> },
}

type FetchResult = (BTreeSet<SubjectId>, Result<HashMap<SubjectId, StockLevel>, ServiceError>);

/// Keeps availability snapshots for the current [`Demand`] fresh.
///
/// Fetches are triggered by the timer, by a change in the demand's
/// composition and by [`AvailabilityHandle::refresh_now`]. At most one batch
/// fetch is in flight. A composition change or manual refresh arriving while
/// one is in flight is remembered and served by a single follow-up fetch; a
/// timer tick arriving while one is in flight is dropped.
pub struct AvailabilityReconciler {
    inventory: Arc<dyn InventoryService>,
    demand: watch::Receiver<Demand>,
    receiver: mpsc::Receiver<AvailabilityRequest>,
    report: watch::Sender<AvailabilityReport>,
    interval: Duration,
    current: Demand,
    snapshots: BTreeMap<SubjectId, AvailabilitySnapshot>,
    fetches: JoinSet<FetchResult>,
    pending: bool,
    last_error: Option<String>,
}

impl AvailabilityReconciler {
    pub fn new(
        inventory: Arc<dyn InventoryService>,
        demand: watch::Receiver<Demand>,
        interval: Duration,
        buffer_size: usize,
    ) -> (Self, AvailabilityHandle) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let (report, report_rx) = watch::channel(AvailabilityReport::default());
        let reconciler = Self {
            inventory,
            demand,
            receiver,
            report,
            interval,
            current: Demand::default(),
            snapshots: BTreeMap::new(),
            fetches: JoinSet::new(),
            pending: false,
            last_error: None,
        };
        let handle = AvailabilityHandle {
            sender,
            report: report_rx,
        };
        (reconciler, handle)
    }

    /// Runs until the demand source or every handle is dropped.
    #[instrument(name = "availability_reconciler", skip(self), fields(interval_ms = self.interval.as_millis() as u64))]
    pub async fn run(mut self) {
        info!("Availability reconciler starting");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.current = self.demand.borrow_and_update().clone();
        self.publish();

        loop {
            tokio::select! {
                _ = ticker.tick() => self.request_fetch("timer", false),
                changed = self.demand.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let next = self.demand.borrow_and_update().clone();
                    self.on_demand(next);
                }
                request = self.receiver.recv() => match request {
                    Some(AvailabilityRequest::RefreshNow { respond_to }) => {
                        self.request_fetch("manual", true);
                        let _ = respond_to.send(());
                    }
                    None => break,
                },
                Some(joined) = self.fetches.join_next() => self.complete(joined),
            }
        }

        self.fetches.abort_all();
        info!("Availability reconciler stopped");
    }

    fn on_demand(&mut self, next: Demand) {
        let recomposed = next.subjects() != self.current.subjects();
        self.current = next;
        if recomposed {
            let tracked = self.current.subjects();
            self.snapshots.retain(|subject, _| tracked.contains(subject));
            self.request_fetch("composition", true);
        } else {
            self.publish();
        }
    }

    fn request_fetch(&mut self, trigger: &'static str, queue_if_busy: bool) {
        if !self.fetches.is_empty() {
            if queue_if_busy {
                debug!(trigger, "Fetch in flight; queueing a follow-up");
                self.pending = true;
            }
            return;
        }
        self.pending = false;

        let subjects = self.current.subjects();
        if subjects.is_empty() {
            self.snapshots.clear();
            self.last_error = None;
            self.publish();
            return;
        }

        debug!(trigger, subjects = subjects.len(), "Fetching availability");
        let query = AvailabilityQuery::from_subjects(&subjects);
        let inventory = Arc::clone(&self.inventory);
        self.fetches.spawn(async move {
            let result = inventory.get_availability(query).await;
            (subjects, result)
        });
        self.publish();
    }

    fn complete(&mut self, joined: Result<FetchResult, JoinError>) {
        let fetched = match joined {
            Ok((subjects, Ok(levels))) => {
                for subject in &subjects {
                    match levels.get(subject) {
                        Some(level) => {
                            let snapshot = AvailabilitySnapshot::new(subject.clone(), *level);
                            self.snapshots.insert(subject.clone(), snapshot);
                        }
                        None => {
                            self.snapshots.remove(subject);
                        }
                    }
                }
                let tracked = self.current.subjects();
                self.snapshots.retain(|subject, _| tracked.contains(subject));
                self.last_error = None;
                debug!(received = levels.len(), requested = subjects.len(), "Availability updated");
                Some(subjects)
            }
            Ok((_, Err(e))) => {
                warn!(error = %e, "Availability fetch failed; keeping previous snapshots");
                self.last_error = Some(e.to_string());
                None
            }
            Err(e) => {
                error!(error = %e, "Availability fetch task failed");
                self.last_error = Some(e.to_string());
                None
            }
        };

        let uncovered = fetched.is_some_and(|subjects| !self.current.subjects().is_subset(&subjects));
        if self.pending || uncovered {
            self.request_fetch("follow-up", true);
        } else {
            self.publish();
        }
    }

    fn publish(&self) {
        let report = AvailabilityReport::derive(
            &self.current,
            &self.snapshots,
            !self.fetches.is_empty(),
            self.last_error.clone(),
        );
        self.report.send_if_modified(|current| {
            if *current == report {
                return false;
            }
            *current = report;
            true
        });
    }
}

/// Handle to a running [`AvailabilityReconciler`].
#[derive(Debug, Clone)]
pub struct AvailabilityHandle {
    sender: mpsc::Sender<AvailabilityRequest>,
    report: watch::Receiver<AvailabilityReport>,
}

impl AvailabilityHandle {
    pub fn report(&self) -> AvailabilityReport {
        self.report.borrow().clone()
    }

    /// Receives every published report.
    pub fn watch(&self) -> watch::Receiver<AvailabilityReport> {
        self.report.clone()
    }

    /// Asks for an immediate fetch. Returns once the request is scheduled,
    /// not when the fetch completes.
    #[instrument(skip(self))]
    pub async fn refresh_now(&self) -> Result<(), AvailabilityError> {
        debug!("Sending request");
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(AvailabilityRequest::RefreshNow { respond_to })
            .await
            .map_err(|_| AvailabilityError::ActorCommunicationError("Actor closed".to_string()))?;
        response
            .await
            .map_err(|_| AvailabilityError::ActorCommunicationError("Actor dropped".to_string()))
    }
}

/// Mirrors the cart's composition and quantities into a reconciler's demand.
/// Ends when the cart is deleted or the reconciler goes away.
#[instrument(name = "cart_demand", skip_all)]
pub async fn forward_cart_demand(mut cart: watch::Receiver<Cart>, demand: watch::Sender<Demand>) {
    loop {
        tokio::select! {
            changed = cart.changed() => {
                if changed.is_err() {
                    break;
                }
                let next = Demand::from_cart(&cart.borrow_and_update());
                demand.send_if_modified(|current| {
                    if *current == next {
                        return false;
                    }
                    *current = next;
                    true
                });
            }
            _ = demand.closed() => break,
        }
    }
    debug!("Cart demand forwarder stopped");
}

/// Availability badges for a fixed list of products and variants.
#[derive(Debug, Clone)]
pub struct BadgeAvailability {
    handle: AvailabilityHandle,
    subjects: Arc<watch::Sender<Demand>>,
}

impl BadgeAvailability {
    pub fn view(&self) -> AvailabilityView {
        self.handle.report().view()
    }

    pub fn watch(&self) -> watch::Receiver<AvailabilityReport> {
        self.handle.watch()
    }

    pub async fn refresh_now(&self) -> Result<(), AvailabilityError> {
        self.handle.refresh_now().await
    }

    /// Replaces the tracked subjects. A different set triggers a fetch.
    pub fn set_subjects(&self, product_ids: &[ProductId], variant_ids: &[VariantId]) {
        let next = Demand::for_subjects(product_ids, variant_ids);
        self.subjects.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

/// Starts a reconciler for passive availability badges. It stops once every
/// clone of the returned handle is dropped.
pub fn use_availability(
    inventory: Arc<dyn InventoryService>,
    product_ids: &[ProductId],
    variant_ids: &[VariantId],
    refresh_interval: Duration,
) -> BadgeAvailability {
    let (subjects, demand) = watch::channel(Demand::for_subjects(product_ids, variant_ids));
    let (reconciler, handle) = AvailabilityReconciler::new(inventory, demand, refresh_interval, 8);
    tokio::spawn(reconciler.run());
    BadgeAvailability {
        handle,
        subjects: Arc::new(subjects),
    }
}
