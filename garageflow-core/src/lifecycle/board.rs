use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{GarageError, PersistenceError, Result};
use crate::gateway::{with_deadline, PersistenceGateway};
use crate::lifecycle::events::BoardEvent;
use crate::lifecycle::transition::{BoardPolicy, TransitionPolicy};
use crate::models::payment::total_paid;
use crate::models::{Job, JobStatus};
use crate::sequencer::Sequencer;

const EVENT_CAPACITY: usize = 256;

/// Shadow state of one job on the board.
///
/// `committed` is the last status the gateway confirmed, `working` is what
/// the board shows. They differ only while a move is reconciling.
#[derive(Debug, Clone, Copy)]
struct BoardEntry {
    tenant_id: Uuid,
    committed: JobStatus,
    working: JobStatus,
    version: u64,
    reconciling: bool,
    order: u64,
}

/// Result of a move that was not rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MoveOutcome {
    /// The new status was persisted.
    Committed {
        job_id: Uuid,
        status: JobStatus,
        version: u64,
    },
    /// `from == to`; nothing was written.
    Unchanged { job_id: Uuid, status: JobStatus },
    /// A newer move of the same job replaced this one before it was sent.
    Superseded { job_id: Uuid, status: JobStatus },
}

/// One card on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardCard {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub reconciling: bool,
    pub version: u64,
}

/// One column on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardColumn {
    pub status: JobStatus,
    pub allowed_targets: Vec<JobStatus>,
    pub jobs: Vec<BoardCard>,
}

/// Board view of one tenant, columns in lifecycle order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardSnapshot {
    pub tenant_id: Uuid,
    pub columns: Vec<BoardColumn>,
}

/// Optimistic board coordinator.
///
/// Owns the in-memory shadow copy of job statuses. A move is shown at once,
/// persisted in the background of the caller's await, and rolled back to the
/// last committed status if persisting fails. Commits of the same job are
/// serialised; different jobs commit concurrently.
pub struct BoardCoordinator {
    gateway: Arc<dyn PersistenceGateway>,
    entries: Mutex<HashMap<Uuid, BoardEntry>>,
    commits: Sequencer,
    events: broadcast::Sender<BoardEvent>,
    persistence_timeout: Duration,
    next_order: Mutex<u64>,
}

impl BoardCoordinator {
    pub fn new(gateway: Arc<dyn PersistenceGateway>, persistence_timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            gateway,
            entries: Mutex::new(HashMap::new()),
            commits: Sequencer::new(),
            events,
            persistence_timeout,
            next_order: Mutex::new(0),
        }
    }

    /// Subscribes to board changes.
    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.events.subscribe()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Uuid, BoardEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_order(&self) -> u64 {
        let mut order = self.next_order.lock().unwrap_or_else(PoisonError::into_inner);
        *order += 1;
        *order
    }

    fn emit(&self, event: BoardEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Seeds the board with jobs loaded elsewhere.
    ///
    /// Jobs with a move in flight keep their shadow state.
    pub fn hydrate(&self, jobs: &[Job]) {
        let mut orders = Vec::with_capacity(jobs.len());
        for _ in jobs {
            orders.push(self.next_order());
        }

        let mut entries = self.entries();
        for (job, order) in jobs.iter().zip(orders) {
            match entries.get_mut(&job.id) {
                Some(entry) if entry.reconciling => {
                    debug!(job_id = %job.id, "Skipping hydrate of reconciling job");
                }
                Some(entry) => {
                    entry.committed = job.status;
                    entry.working = job.status;
                }
                None => {
                    entries.insert(
                        job.id,
                        BoardEntry {
                            tenant_id: job.tenant_id,
                            committed: job.status,
                            working: job.status,
                            version: 0,
                            reconciling: false,
                            order,
                        },
                    );
                }
            }
        }
    }

    /// Loads every job of `tenant_id` through the gateway onto the board.
    pub async fn load_tenant(&self, tenant_id: Uuid) -> Result<usize> {
        let jobs = with_deadline(self.persistence_timeout, self.gateway.list_jobs(tenant_id)).await?;
        self.hydrate(&jobs);
        info!(tenant_id = %tenant_id, jobs = jobs.len(), "Board hydrated");
        Ok(jobs.len())
    }

    /// Status currently shown for a job.
    pub fn status_of(&self, job_id: Uuid) -> Option<JobStatus> {
        self.entries().get(&job_id).map(|entry| entry.working)
    }

    /// Whether a move of the job is waiting for the gateway.
    pub fn is_reconciling(&self, job_id: Uuid) -> bool {
        self.entries()
            .get(&job_id)
            .is_some_and(|entry| entry.reconciling)
    }

    /// Board view of one tenant.
    pub fn snapshot(&self, tenant_id: Uuid) -> BoardSnapshot {
        let entries = self.entries();
        let mut cards: Vec<(u64, BoardCard)> = entries
            .iter()
            .filter(|(_, entry)| entry.tenant_id == tenant_id)
            .map(|(job_id, entry)| {
                (
                    entry.order,
                    BoardCard {
                        job_id: *job_id,
                        status: entry.working,
                        reconciling: entry.reconciling,
                        version: entry.version,
                    },
                )
            })
            .collect();
        cards.sort_by_key(|(order, _)| *order);

        let columns = JobStatus::ALL
            .into_iter()
            .map(|status| BoardColumn {
                status,
                allowed_targets: status.allowed_targets(),
                jobs: cards
                    .iter()
                    .filter(|(_, card)| card.status == status)
                    .map(|(_, card)| card.clone())
                    .collect(),
            })
            .collect();

        BoardSnapshot { tenant_id, columns }
    }

    /// Makes sure the job is on the board, loading it on first use.
    async fn ensure_tracked(&self, tenant_id: Uuid, job_id: Uuid) -> Result<()> {
        let owner = self.entries().get(&job_id).map(|entry| entry.tenant_id);
        if let Some(owner) = owner {
            return if owner == tenant_id {
                Ok(())
            } else {
                Err(GarageError::JobNotFound(job_id))
            };
        }

        let job = with_deadline(
            self.persistence_timeout,
            self.gateway.load_job(tenant_id, job_id),
        )
        .await?
        .ok_or(GarageError::JobNotFound(job_id))?;

        self.hydrate(std::slice::from_ref(&job));
        Ok(())
    }

    /// Refuses completion unless the job's invoice is fully paid.
    ///
    /// The balance is derived from the recorded payments rather than the
    /// stored counter.
    async fn ensure_paid(&self, tenant_id: Uuid, job_id: Uuid) -> Result<()> {
        let invoice = with_deadline(
            self.persistence_timeout,
            self.gateway.load_invoice_by_job(tenant_id, job_id),
        )
        .await?;

        let Some(invoice) = invoice else {
            return Err(GarageError::PaymentRequired {
                job_id,
                invoice_id: None,
                total_amount: Decimal::ZERO,
                paid_amount: Decimal::ZERO,
                outstanding: Decimal::ZERO,
            });
        };

        let payments = with_deadline(
            self.persistence_timeout,
            self.gateway.list_payments(tenant_id, invoice.id),
        )
        .await?;
        let paid_amount = total_paid(&payments);
        let (balance, _) = invoice.balance_for(paid_amount);

        if balance > Decimal::ZERO {
            info!(
                job_id = %job_id,
                invoice_id = %invoice.id,
                outstanding = %balance,
                "Completion refused, invoice not settled"
            );
            return Err(GarageError::PaymentRequired {
                job_id,
                invoice_id: Some(invoice.id),
                total_amount: invoice.total_amount,
                paid_amount,
                outstanding: balance,
            });
        }
        Ok(())
    }

    /// Moves a job between board columns.
    ///
    /// Illegal moves are rejected before anything changes. A legal move is
    /// applied to the board immediately, then persisted; on failure the board
    /// goes back to the last committed status and the error is returned.
    pub async fn move_job(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<MoveOutcome> {
        BoardPolicy::ensure_transition(from, to)?;
        self.ensure_tracked(tenant_id, job_id).await?;

        if from == to {
            let current = self.current_status(job_id)?;
            if current != from {
                return Err(GarageError::StaleStatus {
                    job_id,
                    expected: from,
                    actual: current,
                });
            }
            return Ok(MoveOutcome::Unchanged { job_id, status: to });
        }

        if to == JobStatus::Completed {
            self.ensure_paid(tenant_id, job_id).await?;
        }

        let version = self.apply(tenant_id, job_id, from, to)?;

        // Queue behind any commit of this job already in flight.
        let _turn = self.commits.acquire(job_id).await;

        if let Some(outcome) = self.prepare_commit(tenant_id, job_id, to, version)? {
            return Ok(outcome);
        }

        let saved = with_deadline(
            self.persistence_timeout,
            self.gateway.save_job_status(tenant_id, job_id, to),
        )
        .await;

        self.settle(tenant_id, job_id, to, version, saved)
    }

    fn current_status(&self, job_id: Uuid) -> Result<JobStatus> {
        self.entries()
            .get(&job_id)
            .map(|entry| entry.working)
            .ok_or(GarageError::JobNotFound(job_id))
    }

    /// Optimistically applies `to` and returns the version of this move.
    fn apply(&self, tenant_id: Uuid, job_id: Uuid, from: JobStatus, to: JobStatus) -> Result<u64> {
        let mut entries = self.entries();
        let entry = entries
            .get_mut(&job_id)
            .ok_or(GarageError::JobNotFound(job_id))?;

        if entry.working != from {
            return Err(GarageError::StaleStatus {
                job_id,
                expected: from,
                actual: entry.working,
            });
        }

        entry.working = to;
        entry.version += 1;
        entry.reconciling = true;
        let version = entry.version;
        drop(entries);

        debug!(job_id = %job_id, from = %from, to = %to, version, "Move applied");
        self.emit(BoardEvent::Applied {
            tenant_id,
            job_id,
            from,
            to,
            version,
        });
        Ok(version)
    }

    /// Decides, once this move holds the commit turn, whether it still has
    /// to be sent. `Some` short-circuits the move with that outcome.
    fn prepare_commit(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
        to: JobStatus,
        version: u64,
    ) -> Result<Option<MoveOutcome>> {
        let mut entries = self.entries();
        let entry = entries
            .get_mut(&job_id)
            .ok_or(GarageError::JobNotFound(job_id))?;

        if entry.version != version {
            drop(entries);
            debug!(job_id = %job_id, version, "Queued move superseded");
            self.emit(BoardEvent::Superseded {
                tenant_id,
                job_id,
                status: to,
                version,
            });
            return Ok(Some(MoveOutcome::Superseded { job_id, status: to }));
        }

        if entry.committed == to {
            entry.reconciling = false;
            drop(entries);
            self.emit(BoardEvent::Committed {
                tenant_id,
                job_id,
                status: to,
                version,
            });
            return Ok(Some(MoveOutcome::Committed {
                job_id,
                status: to,
                version,
            }));
        }

        // A move queued behind a failed one was validated against a status
        // that never reached storage; check it against what did.
        if !BoardPolicy::is_valid_transition(entry.committed, to) {
            let restored = entry.committed;
            entry.working = restored;
            entry.reconciling = false;
            drop(entries);
            warn!(job_id = %job_id, from = %restored, to = %to, "Queued move no longer valid");
            self.emit(BoardEvent::Reverted {
                tenant_id,
                job_id,
                attempted: to,
                restored,
                version,
                reason: format!("cannot move job from {} to {}", restored, to),
            });
            return Err(GarageError::InvalidTransition { from: restored, to });
        }

        Ok(None)
    }

    /// Folds the gateway's answer back into the board.
    fn settle(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
        to: JobStatus,
        version: u64,
        saved: std::result::Result<(), PersistenceError>,
    ) -> Result<MoveOutcome> {
        let mut entries = self.entries();
        let entry = entries
            .get_mut(&job_id)
            .ok_or(GarageError::JobNotFound(job_id))?;
        let latest = entry.version == version;

        match saved {
            Ok(()) => {
                entry.committed = to;
                if latest {
                    entry.reconciling = false;
                }
                drop(entries);
                info!(job_id = %job_id, status = %to, version, "Move committed");
                self.emit(BoardEvent::Committed {
                    tenant_id,
                    job_id,
                    status: to,
                    version,
                });
                Ok(MoveOutcome::Committed {
                    job_id,
                    status: to,
                    version,
                })
            }
            Err(e) => {
                if latest {
                    let restored = entry.committed;
                    entry.working = restored;
                    entry.reconciling = false;
                    drop(entries);
                    warn!(
                        job_id = %job_id,
                        attempted = %to,
                        restored = %restored,
                        "Move failed, board reverted: {}",
                        e
                    );
                    self.emit(BoardEvent::Reverted {
                        tenant_id,
                        job_id,
                        attempted: to,
                        restored,
                        version,
                        reason: e.to_string(),
                    });
                } else {
                    // A newer move owns the working copy now.
                    drop(entries);
                    warn!(job_id = %job_id, version, "Stale move failed: {}", e);
                }
                Err(GarageError::Persistence(e))
            }
        }
    }
}
