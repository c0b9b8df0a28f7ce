//! Client-side orchestration for the disaster-report registry.
//!
//! Everything user-facing funnels through [`RegistryClient`], which
//! composes the debounce coalescer, the write orchestrator, the read
//! synchronizer and the balance reconciler into the four mutating
//! flows: create report, delete report, add image, delete image.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::SecondsFormat;
use serde_json::json;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use ledger::{methods, LedgerConnector};
use shared::domain::{DisasterImage, ImageIndex, Report, ReportDraft, ReportId, WalletSnapshot};
use shared::error::FlowError;
use shared::protocol::Receipt;

pub mod balance;
pub mod debounce;
pub mod flow;
pub mod sync;

pub use balance::{BalanceDisplay, BalanceReconciler};
pub use debounce::Debouncer;
pub use flow::{PendingOperationState, WriteFlow};
pub use sync::ReadSynchronizer;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Quiet period for field coalescing.
    pub quiet_period: Duration,
    /// How long a flow waits on finality before failing with a timeout.
    pub confirmation_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            quiet_period: Duration::from_millis(500),
            confirmation_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    CreateReport,
    DeleteReport,
    AddImage,
    DeleteImage,
}

impl FlowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowKind::CreateReport => "create_report",
            FlowKind::DeleteReport => "delete_report",
            FlowKind::AddImage => "add_image",
            FlowKind::DeleteImage => "delete_image",
        }
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the presentation layer reacts to. Refresh events carry the
/// re-fetched authoritative records so views never re-derive state by
/// re-mounting.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    WriteConfirmed {
        flow: FlowKind,
        receipt: Receipt,
    },
    ReportRefreshed {
        id: ReportId,
        report: Option<Report>,
    },
    ImagesRefreshed {
        id: ReportId,
        images: Vec<DisasterImage>,
    },
    ReportCountChanged {
        count: u64,
    },
    Error(String),
}

/// Explicit invalidation sent by a flow when its write confirms (or when
/// a failed confirmation leaves the ledger state in doubt).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefetchRequest {
    ReportCreated,
    ReportChanged { id: ReportId },
    ImagesChanged { id: ReportId },
}

pub struct RegistryClient {
    connector: Arc<dyn LedgerConnector>,
    wallet: watch::Receiver<WalletSnapshot>,
    sync: Arc<ReadSynchronizer>,
    balance: BalanceReconciler,
    options: ClientOptions,
    events: broadcast::Sender<ClientEvent>,
    refetch_tx: mpsc::UnboundedSender<RefetchRequest>,
    last_count: Arc<Mutex<Option<u64>>>,
}

impl RegistryClient {
    pub fn new(
        connector: Arc<dyn LedgerConnector>,
        wallet: watch::Receiver<WalletSnapshot>,
        options: ClientOptions,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (refetch_tx, refetch_rx) = mpsc::unbounded_channel();
        let sync = Arc::new(ReadSynchronizer::new(Arc::clone(&connector)));
        let last_count = Arc::new(Mutex::new(None));

        spawn_reconcile_loop(
            Arc::clone(&sync),
            events.clone(),
            Arc::clone(&last_count),
            refetch_rx,
        );

        Arc::new(Self {
            connector,
            wallet,
            sync,
            balance: BalanceReconciler::new(),
            options,
            events,
            refetch_tx,
            last_count,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn wallet(&self) -> WalletSnapshot {
        self.wallet.borrow().clone()
    }

    fn wallet_connected(&self) -> bool {
        self.wallet.borrow().is_connected
    }

    /// Balance line for the header: shown only when connected with a
    /// known balance, always formatted to two decimals.
    pub fn balance_display(&self) -> BalanceDisplay {
        self.balance.derive_from(&self.wallet.borrow())
    }

    /// Current registry length, remembered so a later create knows what
    /// count it expects to observe.
    pub async fn report_count(&self) -> Result<u64, FlowError> {
        let count = self.sync.report_count().await?;
        *self.last_count.lock().await = Some(count);
        Ok(count)
    }

    pub async fn report(&self, id: ReportId) -> Result<Option<Report>, FlowError> {
        self.sync.fetch(id).await
    }

    pub async fn images(&self, id: ReportId) -> Result<Vec<DisasterImage>, FlowError> {
        self.sync.fetch_images(id).await
    }

    pub fn create_report_flow(self: &Arc<Self>) -> CreateReportFlow {
        CreateReportFlow {
            client: Arc::clone(self),
            form: ReportForm::new(self.options.quiet_period),
            flow: WriteFlow::new(
                FlowKind::CreateReport.as_str(),
                self.options.confirmation_timeout,
            ),
        }
    }

    pub fn delete_report_flow(self: &Arc<Self>, id: ReportId) -> DeleteReportFlow {
        DeleteReportFlow {
            client: Arc::clone(self),
            id,
            flow: WriteFlow::new(
                FlowKind::DeleteReport.as_str(),
                self.options.confirmation_timeout,
            ),
        }
    }

    pub fn add_image_flow(self: &Arc<Self>, id: ReportId) -> AddImageFlow {
        AddImageFlow {
            client: Arc::clone(self),
            id,
            image_url: Debouncer::new(String::new(), self.options.quiet_period),
            flow: WriteFlow::new(
                FlowKind::AddImage.as_str(),
                self.options.confirmation_timeout,
            ),
        }
    }

    pub fn delete_image_flow(self: &Arc<Self>, id: ReportId) -> DeleteImageFlow {
        DeleteImageFlow {
            client: Arc::clone(self),
            id,
            flow: WriteFlow::new(
                FlowKind::DeleteImage.as_str(),
                self.options.confirmation_timeout,
            ),
        }
    }

    fn publish_confirmed(&self, flow: FlowKind, receipt: Receipt, refetch: RefetchRequest) {
        info!(%flow, tx_hash = %receipt.tx_hash, "flow confirmed");
        let _ = self.events.send(ClientEvent::WriteConfirmed { flow, receipt });
        let _ = self.refetch_tx.send(refetch);
    }

    /// One human-readable line per surfaced failure; `AlreadyInProgress`
    /// is dropped silently. After an uncertain confirmation the affected
    /// identity is re-fetched anyway — the ledger is authoritative.
    fn surface_error(&self, flow: FlowKind, err: &FlowError, refetch: RefetchRequest) {
        if !err.is_surfaced() {
            debug!(%flow, "duplicate submit ignored");
            return;
        }
        warn!(%flow, error = %err, "flow failed");
        let _ = self
            .events
            .send(ClientEvent::Error(format!("{flow}: {err}")));
        if err.warrants_refetch() {
            let _ = self.refetch_tx.send(refetch);
        }
    }
}

fn spawn_reconcile_loop(
    sync: Arc<ReadSynchronizer>,
    events: broadcast::Sender<ClientEvent>,
    last_count: Arc<Mutex<Option<u64>>>,
    mut refetch_rx: mpsc::UnboundedReceiver<RefetchRequest>,
) {
    tokio::spawn(async move {
        while let Some(request) = refetch_rx.recv().await {
            if let Err(err) = reconcile(&sync, &events, &last_count, request).await {
                warn!(?request, error = %err, "post-write refetch failed");
                let _ = events.send(ClientEvent::Error(format!(
                    "refreshing after a confirmed write failed: {err}"
                )));
            }
        }
        debug!("reconcile loop stopped: client dropped");
    });
}

async fn reconcile(
    sync: &ReadSynchronizer,
    events: &broadcast::Sender<ClientEvent>,
    last_count: &Mutex<Option<u64>>,
    request: RefetchRequest,
) -> Result<(), FlowError> {
    match request {
        RefetchRequest::ReportCreated => {
            let expected = last_count.lock().await.map(|count| count + 1);
            let count = match expected {
                Some(expected) => sync.await_count_at_least(expected).await?,
                None => sync.report_count().await?,
            };
            *last_count.lock().await = Some(count);
            let _ = events.send(ClientEvent::ReportCountChanged { count });

            if count > 0 {
                let id = ReportId(count - 1);
                let report = sync.await_report_visible(id).await?;
                let _ = events.send(ClientEvent::ReportRefreshed { id, report });
            }
        }
        RefetchRequest::ReportChanged { id } => {
            let report = sync.fetch(id).await?;
            let _ = events.send(ClientEvent::ReportRefreshed { id, report });
            let count = sync.report_count().await?;
            *last_count.lock().await = Some(count);
            let _ = events.send(ClientEvent::ReportCountChanged { count });
        }
        RefetchRequest::ImagesChanged { id } => {
            let images = sync.fetch_images(id).await?;
            let _ = events.send(ClientEvent::ImagesRefreshed { id, images });
        }
    }
    Ok(())
}

/// Debounced composite draft behind the create-report form. Every field
/// setter supersedes the pending snapshot as a whole, so validation and
/// argument building always see the same tuple.
pub struct ReportForm {
    draft: Debouncer<ReportDraft>,
}

macro_rules! form_setter {
    ($setter:ident, $field:ident) => {
        pub fn $setter(&self, value: impl Into<String>) {
            self.update(|draft| draft.$field = value.into());
        }
    };
}

impl ReportForm {
    fn new(quiet_period: Duration) -> Self {
        Self {
            draft: Debouncer::new(ReportDraft::default(), quiet_period),
        }
    }

    form_setter!(set_reporter_name, reporter_name);
    form_setter!(set_email, email);
    form_setter!(set_disaster_type, disaster_type);
    form_setter!(set_image_url, image_url);
    form_setter!(set_city, city);
    form_setter!(set_state, state);
    form_setter!(set_date, date);
    form_setter!(set_severity, severity);
    form_setter!(set_impact, impact);

    /// Fills both coordinate fields at once, the programmatic
    /// counterpart of the "use my location" button.
    pub fn set_coordinates(&self, latitude: impl Into<String>, longitude: impl Into<String>) {
        self.update(|draft| {
            draft.latitude = latitude.into();
            draft.longitude = longitude.into();
        });
    }

    pub fn set_latitude(&self, value: impl Into<String>) {
        self.update(|draft| draft.latitude = value.into());
    }

    pub fn set_longitude(&self, value: impl Into<String>) {
        self.update(|draft| draft.longitude = value.into());
    }

    fn update(&self, apply: impl FnOnce(&mut ReportDraft)) {
        let mut draft = self.draft.snapshot();
        apply(&mut draft);
        self.draft.set(draft);
    }

    pub fn snapshot(&self) -> ReportDraft {
        self.draft.snapshot()
    }

    pub fn settled(&self) -> watch::Receiver<ReportDraft> {
        self.draft.settled()
    }

    pub fn is_complete(&self) -> bool {
        self.snapshot().is_complete()
    }

    fn clear(&self) {
        self.draft.reset(ReportDraft::default());
    }
}

pub struct CreateReportFlow {
    client: Arc<RegistryClient>,
    form: ReportForm,
    flow: WriteFlow,
}

impl CreateReportFlow {
    pub fn form(&self) -> &ReportForm {
        &self.form
    }

    pub fn state(&self) -> watch::Receiver<PendingOperationState> {
        self.flow.state()
    }

    pub fn current_state(&self) -> PendingOperationState {
        self.flow.current_state()
    }

    pub fn acknowledge(&self) {
        self.flow.acknowledge();
    }

    /// Submits the draft. The form is cleared only after `Succeeded`, so
    /// a caller returning mid-submission still sees the pending draft.
    pub async fn trigger(&self) {
        let draft = self.form.snapshot();
        let result = self
            .flow
            .submit(
                &self.client.connector,
                self.client.wallet_connected(),
                methods::CREATE_REPORT,
                || match draft.first_missing_field() {
                    Some(field) => Err(FlowError::Validation { field }),
                    None => Ok(draft.ledger_args()),
                },
            )
            .await;

        match result {
            Ok(receipt) => {
                self.form.clear();
                self.client.publish_confirmed(
                    FlowKind::CreateReport,
                    receipt,
                    RefetchRequest::ReportCreated,
                );
            }
            Err(err) => {
                self.client
                    .surface_error(FlowKind::CreateReport, &err, RefetchRequest::ReportCreated);
            }
        }
    }
}

pub struct DeleteReportFlow {
    client: Arc<RegistryClient>,
    id: ReportId,
    flow: WriteFlow,
}

impl DeleteReportFlow {
    pub fn id(&self) -> ReportId {
        self.id
    }

    pub fn state(&self) -> watch::Receiver<PendingOperationState> {
        self.flow.state()
    }

    pub fn current_state(&self) -> PendingOperationState {
        self.flow.current_state()
    }

    pub fn acknowledge(&self) {
        self.flow.acknowledge();
    }

    pub async fn trigger(&self) {
        let id = self.id;
        let result = self
            .flow
            .submit(
                &self.client.connector,
                self.client.wallet_connected(),
                methods::DELETE_REPORT,
                || Ok(vec![json!(id.0)]),
            )
            .await;

        let refetch = RefetchRequest::ReportChanged { id };
        match result {
            Ok(receipt) => {
                self.client
                    .publish_confirmed(FlowKind::DeleteReport, receipt, refetch);
            }
            Err(err) => self.client.surface_error(FlowKind::DeleteReport, &err, refetch),
        }
    }
}

pub struct AddImageFlow {
    client: Arc<RegistryClient>,
    id: ReportId,
    image_url: Debouncer<String>,
    flow: WriteFlow,
}

impl AddImageFlow {
    pub fn id(&self) -> ReportId {
        self.id
    }

    pub fn set_image_url(&self, url: &str) {
        self.image_url.set(url.trim().to_string());
    }

    pub fn image_url(&self) -> String {
        self.image_url.snapshot()
    }

    pub fn state(&self) -> watch::Receiver<PendingOperationState> {
        self.flow.state()
    }

    pub fn current_state(&self) -> PendingOperationState {
        self.flow.current_state()
    }

    pub fn acknowledge(&self) {
        self.flow.acknowledge();
    }

    /// The attachment timestamp is captured at submit time, not at
    /// typing time, so it reflects when the user actually confirmed.
    pub async fn trigger(&self) {
        let id = self.id;
        let url = self.image_url.snapshot();
        let timestamp = chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let result = self
            .flow
            .submit(
                &self.client.connector,
                self.client.wallet_connected(),
                methods::ADD_IMAGE,
                move || {
                    if url.trim().is_empty() {
                        return Err(FlowError::Validation { field: "image_url" });
                    }
                    Ok(vec![json!(id.0), json!(url), json!(timestamp)])
                },
            )
            .await;

        let refetch = RefetchRequest::ImagesChanged { id };
        match result {
            Ok(receipt) => {
                self.image_url.reset(String::new());
                self.client
                    .publish_confirmed(FlowKind::AddImage, receipt, refetch);
            }
            Err(err) => self.client.surface_error(FlowKind::AddImage, &err, refetch),
        }
    }
}

pub struct DeleteImageFlow {
    client: Arc<RegistryClient>,
    id: ReportId,
    flow: WriteFlow,
}

impl DeleteImageFlow {
    pub fn id(&self) -> ReportId {
        self.id
    }

    pub fn state(&self) -> watch::Receiver<PendingOperationState> {
        self.flow.state()
    }

    pub fn current_state(&self) -> PendingOperationState {
        self.flow.current_state()
    }

    pub fn acknowledge(&self) {
        self.flow.acknowledge();
    }

    /// The index is taken at trigger time because deletion shifts every
    /// later image down by one; callers must not hold indexes across a
    /// confirmed delete.
    pub async fn trigger(&self, index: ImageIndex) {
        let id = self.id;
        let result = self
            .flow
            .submit(
                &self.client.connector,
                self.client.wallet_connected(),
                methods::DELETE_IMAGE,
                || Ok(vec![json!(id.0), json!(index.0)]),
            )
            .await;

        let refetch = RefetchRequest::ImagesChanged { id };
        match result {
            Ok(receipt) => {
                self.client
                    .publish_confirmed(FlowKind::DeleteImage, receipt, refetch);
            }
            Err(err) => self.client.surface_error(FlowKind::DeleteImage, &err, refetch),
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
