use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::drag::{DragEnd, DragIntent, IgnoreReason};
use crate::leads::LeadOperations;
use crate::notify::{Action, Notice};

/// What the board did with a drag-end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragOutcome {
    Ignored(IgnoreReason),
    Moved { lead_id: String, column: String },
    Failed { lead_id: String, column: String },
}

/// Turns drag gestures into status updates, one at a time.
///
/// Whatever the outcome of the update, the full lead list is fetched again
/// afterwards: the drag library has already drawn the card in its new
/// place, and the refetch is what puts it back when the write failed or
/// another session moved it first.
pub struct KanbanReconciler {
    ops: Arc<LeadOperations>,
    in_flight: Mutex<()>,
}

impl KanbanReconciler {
    pub fn new(ops: Arc<LeadOperations>) -> Self {
        Self {
            ops,
            in_flight: Mutex::new(()),
        }
    }

    pub fn operations(&self) -> &Arc<LeadOperations> {
        &self.ops
    }

    /// Whether a drag is being processed right now
    pub fn is_busy(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    pub async fn handle_drag_end(&self, event: &DragEnd) -> DragOutcome {
        let (lead_id, column) = match event.intent() {
            DragIntent::Ignore(reason) => {
                debug!(lead_id = %event.draggable_id, ?reason, "drag ignored");
                return DragOutcome::Ignored(reason);
            }
            DragIntent::Move { lead_id, to } => (lead_id.to_string(), to.trim().to_string()),
        };

        // Single slot: a drop arriving while another is in flight is dropped,
        // not queued. The next refetch redraws the board.
        let Ok(_slot) = self.in_flight.try_lock() else {
            warn!(lead_id = %lead_id, "drag ignored, previous move still in flight");
            return DragOutcome::Ignored(IgnoreReason::Busy);
        };

        // The try_ form keeps a failed drop to a single notice.
        let notifier = self.ops.notifier().clone();
        let outcome = match self.ops.try_update_status(&lead_id, &column).await {
            Ok(_) => {
                info!(lead_id = %lead_id, column = %column, "lead moved");
                notifier.notify(Notice::LeadMoved {
                    column: column.clone(),
                });
                DragOutcome::Moved { lead_id, column }
            }
            Err(e) => {
                warn!(lead_id = %lead_id, column = %column, error = %e, "lead move failed");
                notifier.notify(Notice::failed(Action::MoveLead, e.user_message()));
                DragOutcome::Failed { lead_id, column }
            }
        };

        self.ops.fetch_leads().await;

        let grace = self.ops.options().drag_release_delay;
        if !grace.is_zero() {
            tokio::time::sleep(grace).await;
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientOptions;
    use crate::kanban::DraggableLocation;
    use crate::notify::RecordingNotifier;
    use crate::store::MemoryLeadStore;
    use std::time::Duration;

    struct Fixture {
        store: Arc<MemoryLeadStore>,
        notifier: Arc<RecordingNotifier>,
        board: KanbanReconciler,
    }

    fn fixture(store: MemoryLeadStore) -> Fixture {
        let store = Arc::new(store);
        let notifier = Arc::new(RecordingNotifier::new());
        let ops = LeadOperations::new(store.clone(), notifier.clone(), ClientOptions::immediate());
        Fixture {
            store,
            notifier,
            board: KanbanReconciler::new(Arc::new(ops)),
        }
    }

    fn drag(lead: &str, from: (&str, usize), to: Option<(&str, usize)>) -> DragEnd {
        DragEnd::new(
            lead,
            DraggableLocation::new(from.0, from.1),
            to.map(|(column, index)| DraggableLocation::new(column, index)),
        )
    }

    #[tokio::test]
    async fn drop_outside_calls_nothing() {
        let f = fixture(MemoryLeadStore::seeded(&[("L1", "Novo")]));

        let outcome = f.board.handle_drag_end(&drag("L1", ("Novo", 0), None)).await;

        assert_eq!(outcome, DragOutcome::Ignored(IgnoreReason::NoDestination));
        assert_eq!(f.store.calls().await.total(), 0);
    }

    #[tokio::test]
    async fn drop_in_place_calls_nothing() {
        let f = fixture(MemoryLeadStore::seeded(&[("L1", "Novo")]));

        let outcome = f
            .board
            .handle_drag_end(&drag("L1", ("Novo", 0), Some(("Novo", 0))))
            .await;

        assert_eq!(outcome, DragOutcome::Ignored(IgnoreReason::SamePosition));
        assert_eq!(f.store.calls().await.total(), 0);
    }

    #[tokio::test]
    async fn reorder_within_column_never_reaches_the_store() {
        let f = fixture(MemoryLeadStore::seeded(&[
            ("L2", "Novo"),
            ("L5", "Novo"),
            ("L6", "Novo"),
        ]));

        let outcome = f
            .board
            .handle_drag_end(&drag("L2", ("Novo", 0), Some(("Novo", 2))))
            .await;

        assert_eq!(outcome, DragOutcome::Ignored(IgnoreReason::SameColumn));
        assert_eq!(f.store.calls().await.total(), 0);
        assert!(f.notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn successful_move_announces_and_refetches_once() {
        let f = fixture(MemoryLeadStore::seeded(&[("L1", "Novo")]));

        let outcome = f
            .board
            .handle_drag_end(&drag("L1", ("Novo", 0), Some(("Em Andamento", 0))))
            .await;

        assert_eq!(
            outcome,
            DragOutcome::Moved {
                lead_id: "L1".to_string(),
                column: "Em Andamento".to_string()
            }
        );
        assert_eq!(f.store.calls().await.fetches, 1);
        assert_eq!(
            f.notifier.notices(),
            vec![Notice::LeadMoved {
                column: "Em Andamento".to_string()
            }]
        );
        let cached = f.board.operations().leads().await;
        assert_eq!(cached[0].status, "Em Andamento");
        assert!(!f.board.is_busy());
    }

    #[tokio::test]
    async fn failed_move_still_refetches_once() {
        let f = fixture(MemoryLeadStore::seeded(&[("L1", "Novo")]));
        f.store.fail_writes(true);

        let outcome = f
            .board
            .handle_drag_end(&drag("L1", ("Novo", 0), Some(("Fechado", 0))))
            .await;

        assert!(matches!(outcome, DragOutcome::Failed { .. }));
        assert_eq!(f.store.calls().await.fetches, 1);
        // The refetch restores the card to where the store says it is.
        assert_eq!(f.board.operations().leads().await[0].status, "Novo");

        assert_eq!(
            f.notifier.errors(),
            vec![Notice::failed(
                Action::MoveLead,
                "the server could not complete the request"
            )]
        );
        assert!(!f.board.is_busy());
    }

    #[tokio::test]
    async fn vanished_lead_fails_and_refetches() {
        let f = fixture(MemoryLeadStore::seeded(&[("L1", "Novo"), ("L2", "Novo")]));
        f.store.remove_externally("L1").await;

        let outcome = f
            .board
            .handle_drag_end(&drag("L1", ("Novo", 0), Some(("Fechado", 0))))
            .await;

        assert!(matches!(outcome, DragOutcome::Failed { .. }));
        assert_eq!(f.store.calls().await.fetches, 1);
        assert_eq!(f.board.operations().leads().await.len(), 1);
    }

    #[tokio::test]
    async fn refetch_picks_up_writes_from_other_sessions() {
        let f = fixture(
            MemoryLeadStore::seeded(&[("L1", "Novo"), ("L2", "Novo")])
                .with_latency(Duration::from_millis(10)),
        );
        f.board.operations().fetch_leads().await;
        f.store.reset_calls().await;

        let event = drag("L1", ("Novo", 0), Some(("Em Andamento", 0)));
        let (outcome, _) = tokio::join!(
            f.board.handle_drag_end(&event),
            f.store.set_status_externally("L2", "Fechado")
        );

        assert!(matches!(outcome, DragOutcome::Moved { .. }));
        assert_eq!(f.store.calls().await.fetches, 1);
        let cached = f.board.operations().leads().await;
        let mut stored = f.store.snapshot().await;
        stored.reverse();
        assert_eq!(cached, stored, "cache mirrors the store, newest first");
        let l2 = cached.iter().find(|l| l.id == "L2").unwrap();
        assert_eq!(l2.status, "Fechado");
    }

    #[tokio::test]
    async fn second_drop_while_busy_is_dropped() {
        let f = fixture(
            MemoryLeadStore::seeded(&[("L1", "Novo"), ("L2", "Novo")])
                .with_latency(Duration::from_millis(20)),
        );

        let first = drag("L1", ("Novo", 0), Some(("Em Andamento", 0)));
        let second = drag("L2", ("Novo", 1), Some(("Fechado", 0)));
        let (a, b) = tokio::join!(
            f.board.handle_drag_end(&first),
            f.board.handle_drag_end(&second)
        );

        assert!(matches!(a, DragOutcome::Moved { .. }));
        assert_eq!(b, DragOutcome::Ignored(IgnoreReason::Busy));

        assert_eq!(f.store.peek("L2").await.unwrap().status, "Novo");
        let calls = f.store.calls().await;
        assert_eq!(calls.updates, 1);
        assert_eq!(calls.fetches, 1);
    }

    #[tokio::test]
    async fn board_accepts_drops_again_after_grace_period() {
        let store = Arc::new(MemoryLeadStore::seeded(&[("L1", "Novo")]));
        let ops = LeadOperations::new(
            store.clone(),
            Arc::new(RecordingNotifier::new()),
            ClientOptions::immediate().with_drag_release_delay(Duration::from_millis(10)),
        );
        let board = KanbanReconciler::new(Arc::new(ops));

        let first = board
            .handle_drag_end(&drag("L1", ("Novo", 0), Some(("Em Andamento", 0))))
            .await;
        let second = board
            .handle_drag_end(&drag("L1", ("Em Andamento", 0), Some(("Fechado", 0))))
            .await;

        assert!(matches!(first, DragOutcome::Moved { .. }));
        assert!(matches!(second, DragOutcome::Moved { .. }));
        assert_eq!(store.peek("L1").await.unwrap().status, "Fechado");
    }
}
