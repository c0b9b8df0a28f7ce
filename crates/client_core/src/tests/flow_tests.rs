use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use ledger::{methods, LedgerConnector, LedgerError, TransactionHandle};

use super::*;

#[derive(Clone, Copy, PartialEq)]
enum WriteOutcome {
    Confirm,
    ConfirmAfter(Duration),
    RejectSubmission,
    Revert,
    NeverConfirm,
}

struct MockConnector {
    outcome: WriteOutcome,
    write_ready: bool,
    write_delay: Duration,
    writes: Arc<Mutex<Vec<(String, Vec<Value>)>>>,
}

impl MockConnector {
    fn new(outcome: WriteOutcome) -> Self {
        Self {
            outcome,
            write_ready: true,
            write_delay: Duration::ZERO,
            writes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn not_ready() -> Self {
        Self {
            write_ready: false,
            ..Self::new(WriteOutcome::Confirm)
        }
    }

    fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }
}

struct MockHandle {
    outcome: WriteOutcome,
}

#[async_trait]
impl TransactionHandle for MockHandle {
    async fn await_finality(self: Box<Self>) -> Result<shared::protocol::Receipt, LedgerError> {
        match self.outcome {
            WriteOutcome::Confirm => {}
            WriteOutcome::ConfirmAfter(delay) => tokio::time::sleep(delay).await,
            WriteOutcome::Revert => {
                return Err(LedgerError::Reverted {
                    reason: "execution reverted".to_string(),
                })
            }
            WriteOutcome::NeverConfirm => futures::future::pending::<()>().await,
            WriteOutcome::RejectSubmission => unreachable!("rejected before a handle exists"),
        }
        Ok(shared::protocol::Receipt {
            tx_hash: "0xfeed".to_string(),
            block_number: 42,
            confirmed_at: chrono::Utc::now(),
        })
    }

    fn tx_hash(&self) -> &str {
        "0xfeed"
    }
}

#[async_trait]
impl LedgerConnector for MockConnector {
    async fn read(&self, _method: &str, _args: &[Value]) -> Result<Value, LedgerError> {
        Ok(Value::Null)
    }

    async fn write(
        &self,
        method: &str,
        args: &[Value],
    ) -> Result<Box<dyn TransactionHandle>, LedgerError> {
        if self.outcome == WriteOutcome::RejectSubmission {
            return Err(LedgerError::Submission {
                message: "user rejected signature".to_string(),
            });
        }
        if !self.write_delay.is_zero() {
            tokio::time::sleep(self.write_delay).await;
        }
        self.writes
            .lock()
            .await
            .push((method.to_string(), args.to_vec()));
        Ok(Box::new(MockHandle {
            outcome: self.outcome,
        }))
    }

    fn is_write_ready(&self) -> bool {
        self.write_ready
    }
}

fn flow() -> WriteFlow {
    WriteFlow::new("test", Duration::from_secs(60))
}

#[tokio::test(start_paused = true)]
async fn successful_submit_walks_the_full_state_sequence() {
    let mock = MockConnector::new(WriteOutcome::ConfirmAfter(Duration::from_secs(5)))
        .with_write_delay(Duration::from_secs(1));
    let connector: Arc<dyn LedgerConnector> = Arc::new(mock);
    let flow = Arc::new(flow());
    assert_eq!(flow.current_state(), PendingOperationState::Idle);

    let submit = {
        let flow = Arc::clone(&flow);
        let connector = Arc::clone(&connector);
        tokio::spawn(async move {
            flow.submit(&connector, true, methods::CREATE_REPORT, || {
                Ok(vec![json!("Ada")])
            })
            .await
        })
    };

    // Submission itself takes 1s, confirmation another 5s.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(flow.current_state(), PendingOperationState::Submitting);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(
        flow.current_state(),
        PendingOperationState::AwaitingConfirmation
    );

    let receipt = submit.await.expect("join").expect("submit");
    assert_eq!(receipt.tx_hash, "0xfeed");
    assert_eq!(flow.current_state(), PendingOperationState::Succeeded);
}

#[tokio::test]
async fn validation_failure_never_reaches_the_ledger() {
    let mock = MockConnector::new(WriteOutcome::Confirm);
    let writes = mock.writes.clone();
    let connector: Arc<dyn LedgerConnector> = Arc::new(mock);
    let flow = flow();

    let err = flow
        .submit(&connector, true, methods::CREATE_REPORT, || {
            Err(FlowError::Validation { field: "email" })
        })
        .await
        .expect_err("must fail");

    assert_eq!(err, FlowError::Validation { field: "email" });
    assert!(writes.lock().await.is_empty());
    assert_eq!(
        flow.current_state(),
        PendingOperationState::Failed(FlowError::Validation { field: "email" })
    );
}

#[tokio::test]
async fn disconnected_wallet_leaves_the_state_machine_idle() {
    let connector: Arc<dyn LedgerConnector> = Arc::new(MockConnector::new(WriteOutcome::Confirm));
    let flow = flow();

    let err = flow
        .submit(&connector, false, methods::DELETE_REPORT, || {
            Ok(vec![json!(1)])
        })
        .await
        .expect_err("must fail");

    assert!(matches!(err, FlowError::OperationUnavailable { .. }));
    assert_eq!(flow.current_state(), PendingOperationState::Idle);
}

#[tokio::test]
async fn unresolved_write_surface_fails_before_submitting() {
    let connector: Arc<dyn LedgerConnector> = Arc::new(MockConnector::not_ready());
    let flow = flow();

    let err = flow
        .submit(&connector, true, methods::ADD_IMAGE, || Ok(vec![json!(1)]))
        .await
        .expect_err("must fail");

    assert!(matches!(err, FlowError::OperationUnavailable { .. }));
    assert_eq!(flow.current_state(), PendingOperationState::Idle);
}

#[tokio::test]
async fn rejected_signature_surfaces_a_submission_error() {
    let connector: Arc<dyn LedgerConnector> =
        Arc::new(MockConnector::new(WriteOutcome::RejectSubmission));
    let flow = flow();

    let err = flow
        .submit(&connector, true, methods::DELETE_IMAGE, || {
            Ok(vec![json!(1), json!(0)])
        })
        .await
        .expect_err("must fail");

    assert!(matches!(err, FlowError::Submission { .. }));
    assert_eq!(
        flow.current_state(),
        PendingOperationState::Failed(err.clone())
    );
}

#[tokio::test]
async fn reverted_transaction_surfaces_a_confirmation_error() {
    let connector: Arc<dyn LedgerConnector> = Arc::new(MockConnector::new(WriteOutcome::Revert));
    let flow = flow();

    let err = flow
        .submit(&connector, true, methods::DELETE_REPORT, || {
            Ok(vec![json!(1)])
        })
        .await
        .expect_err("must fail");

    assert_eq!(
        err,
        FlowError::Confirmation {
            failure: ConfirmationFailure::Reverted
        }
    );
    assert!(err.warrants_refetch());
}

#[tokio::test(start_paused = true)]
async fn confirmation_that_never_lands_times_out() {
    let connector: Arc<dyn LedgerConnector> =
        Arc::new(MockConnector::new(WriteOutcome::NeverConfirm));
    let flow = WriteFlow::new("test", Duration::from_secs(30));

    let err = flow
        .submit(&connector, true, methods::CREATE_REPORT, || {
            Ok(vec![json!("Ada")])
        })
        .await
        .expect_err("must time out");

    assert_eq!(
        err,
        FlowError::Confirmation {
            failure: ConfirmationFailure::Timeout
        }
    );
}

#[tokio::test(start_paused = true)]
async fn concurrent_submits_produce_exactly_one_ledger_write() {
    let mock = MockConnector::new(WriteOutcome::ConfirmAfter(Duration::from_secs(5)));
    let writes = mock.writes.clone();
    let connector: Arc<dyn LedgerConnector> = Arc::new(mock);
    let flow = Arc::new(flow());

    let first = {
        let flow = Arc::clone(&flow);
        let connector = Arc::clone(&connector);
        tokio::spawn(async move {
            flow.submit(&connector, true, methods::CREATE_REPORT, || {
                Ok(vec![json!("first")])
            })
            .await
        })
    };

    // Let the first submission reach AwaitingConfirmation.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(flow.current_state().is_in_flight());

    let err = flow
        .submit(&connector, true, methods::CREATE_REPORT, || {
            Ok(vec![json!("second")])
        })
        .await
        .expect_err("second submit must be rejected");
    assert_eq!(err, FlowError::AlreadyInProgress);
    assert!(!err.is_surfaced());

    first.await.expect("join").expect("first submit");
    let writes = writes.lock().await;
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].1, vec![json!("first")]);
}

#[tokio::test]
async fn acknowledge_resets_only_terminal_states() {
    let connector: Arc<dyn LedgerConnector> = Arc::new(MockConnector::new(WriteOutcome::Confirm));
    let flow = flow();

    // Idle stays idle.
    flow.acknowledge();
    assert_eq!(flow.current_state(), PendingOperationState::Idle);

    flow.submit(&connector, true, methods::CREATE_REPORT, || {
        Ok(vec![json!("Ada")])
    })
    .await
    .expect("submit");
    assert_eq!(flow.current_state(), PendingOperationState::Succeeded);

    flow.acknowledge();
    assert_eq!(flow.current_state(), PendingOperationState::Idle);
}

#[tokio::test]
async fn retry_after_failure_starts_a_fresh_lifecycle() {
    let rejecting: Arc<dyn LedgerConnector> =
        Arc::new(MockConnector::new(WriteOutcome::RejectSubmission));
    let confirming: Arc<dyn LedgerConnector> = Arc::new(MockConnector::new(WriteOutcome::Confirm));
    let flow = flow();

    flow.submit(&rejecting, true, methods::CREATE_REPORT, || {
        Ok(vec![json!("Ada")])
    })
    .await
    .expect_err("first attempt fails");
    assert!(matches!(
        flow.current_state(),
        PendingOperationState::Failed(_)
    ));

    flow.submit(&confirming, true, methods::CREATE_REPORT, || {
        Ok(vec![json!("Ada")])
    })
    .await
    .expect("retry succeeds");
    assert_eq!(flow.current_state(), PendingOperationState::Succeeded);
}
