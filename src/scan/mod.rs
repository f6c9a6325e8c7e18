//! Scan coordinator
//!
//! Orchestrates one bounded sweep over a mailbox folder: sequential
//! pagination, a small worker pool per page for metadata fetch and
//! classification, and at-most-once remediation enforced through the
//! decision store's check-then-append claim.
//!
//! Sweeps are fire-and-forget: `start_scan` captures an immutable credential
//! snapshot, spawns the sweep on the runtime and returns an acknowledgement
//! immediately. There is no cancellation surface beyond process shutdown.
//! A failed message is skipped and stays undecided for the next sweep; a
//! failed page listing aborts only the current sweep.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ScanConfig;
use crate::mailbox::{CredentialSnapshot, MailboxService, LABEL_QUARANTINE};
use crate::narrative::{NarrativeContext, Synthesizer, NOT_SCORED_RATIONALE, SAFE_RATIONALE};
use crate::remediation::RemediationExecutor;
use crate::scorer::Scorer;
use crate::store::DecisionStore;
use crate::types::{Explanation, NewVerdict, RemediationAction};

/// Clamp bounds for the per-sweep message budget.
const MIN_MAX_MESSAGES: u32 = 10;
const MAX_MAX_MESSAGES: u32 = 1000;
/// Clamp bounds for the listing page size.
const MIN_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

/// Caller-facing sweep parameters, all optional.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanRequest {
    pub max_messages: Option<u32>,
    pub page_size: Option<u32>,
}

/// Immediate acknowledgement returned by `start_scan`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScanAck {
    pub accepted: bool,
    pub sweep_id: Uuid,
    /// Budget after clamping
    pub max_messages: u32,
    /// Page size after clamping
    pub page_size: u32,
}

/// Progress notifications emitted by a running sweep.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    Started {
        sweep_id: Uuid,
    },
    Decided {
        sweep_id: Uuid,
        message_id: String,
        is_phishing: bool,
    },
    Skipped {
        sweep_id: Uuid,
        message_id: String,
    },
    Finished {
        sweep_id: Uuid,
        processed: u32,
        quarantined: u32,
    },
}

/// Outcome of handling a single message inside the pool.
enum MessageOutcome {
    Decided { is_phishing: bool },
    Skipped,
}

/// Coordinates background sweeps. Cheap to clone via the inner Arc.
#[derive(Clone)]
pub struct ScanCoordinator {
    inner: Arc<SweepContext>,
}

/// Shared state for one coordinator; sweeps borrow it through an Arc so they
/// outlive the triggering call.
struct SweepContext {
    mailbox: Arc<dyn MailboxService>,
    store: Arc<DecisionStore>,
    scorer: Arc<Scorer>,
    synthesizer: Arc<Synthesizer>,
    executor: RemediationExecutor,
    config: ScanConfig,
    call_timeout: Duration,
    events: Option<flume::Sender<ScanEvent>>,
}

impl ScanCoordinator {
    pub fn new(
        mailbox: Arc<dyn MailboxService>,
        store: Arc<DecisionStore>,
        scorer: Arc<Scorer>,
        synthesizer: Arc<Synthesizer>,
        config: ScanConfig,
        call_timeout: Duration,
    ) -> Self {
        let executor = RemediationExecutor::new(mailbox.clone());
        Self {
            inner: Arc::new(SweepContext {
                mailbox,
                store,
                scorer,
                synthesizer,
                executor,
                config,
                call_timeout,
                events: None,
            }),
        }
    }

    /// Attach a progress-event channel. Must be called before any sweep runs.
    pub fn with_events(mut self, sender: flume::Sender<ScanEvent>) -> Self {
        let ctx = Arc::get_mut(&mut self.inner)
            .expect("with_events must be called before sweeps start");
        ctx.events = Some(sender);
        self
    }

    /// Trigger a sweep. Clamps the request, spawns the background task and
    /// returns immediately; the caller never waits on the sweep itself.
    pub fn start_scan(&self, creds: Arc<CredentialSnapshot>, request: ScanRequest) -> ScanAck {
        let max_messages = request
            .max_messages
            .unwrap_or(self.inner.config.default_max_messages)
            .clamp(MIN_MAX_MESSAGES, MAX_MAX_MESSAGES);
        let page_size = request
            .page_size
            .unwrap_or(self.inner.config.default_page_size)
            .clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE);

        let sweep_id = Uuid::new_v4();
        info!(
            "Sweep {} accepted for {} (max_messages={}, page_size={})",
            sweep_id, creds.account, max_messages, page_size
        );

        let ctx = self.inner.clone();
        tokio::spawn(async move {
            run_sweep(ctx, creds, sweep_id, max_messages, page_size).await;
        });

        ScanAck {
            accepted: true,
            sweep_id,
            max_messages,
            page_size,
        }
    }
}

async fn run_sweep(
    ctx: Arc<SweepContext>,
    creds: Arc<CredentialSnapshot>,
    sweep_id: Uuid,
    max_messages: u32,
    page_size: u32,
) {
    emit(&ctx, ScanEvent::Started { sweep_id });

    let mut remaining = max_messages as usize;
    let mut page_token: Option<String> = None;
    let mut processed: u32 = 0;
    let mut quarantined: u32 = 0;

    loop {
        let listing = timeout(
            ctx.call_timeout,
            ctx.mailbox.list_messages(
                &creds,
                &ctx.config.folder,
                page_size,
                page_token.as_deref(),
            ),
        )
        .await;

        let page = match listing {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                // Listing failure aborts this sweep; the next one starts over
                error!("Sweep {}: page listing failed, aborting: {}", sweep_id, e);
                break;
            }
            Err(_) => {
                error!("Sweep {}: page listing timed out, aborting", sweep_id);
                break;
            }
        };

        // Pre-filter already-settled messages so the budget only counts new
        // work. The authoritative check happens again at append time.
        let mut candidates = Vec::new();
        for id in &page.ids {
            match ctx.store.exists(id) {
                Ok(true) => debug!("Sweep {}: {} already decided", sweep_id, id),
                Ok(false) => candidates.push(id.clone()),
                Err(e) => {
                    // Storage failure must not look like "already decided"
                    warn!("Sweep {}: existence check failed for {}: {}", sweep_id, id, e);
                }
            }
        }

        let take = remaining.min(candidates.len());
        if take > 0 {
            let semaphore = Arc::new(Semaphore::new(ctx.config.worker_count));
            let mut pool: JoinSet<MessageOutcome> = JoinSet::new();

            for id in candidates.into_iter().take(take) {
                let ctx = ctx.clone();
                let creds = creds.clone();
                let semaphore = semaphore.clone();
                pool.spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .expect("scan semaphore closed");
                    process_message(&ctx, &creds, sweep_id, &id).await
                });
            }

            while let Some(joined) = pool.join_next().await {
                match joined {
                    Ok(MessageOutcome::Decided { is_phishing }) => {
                        processed += 1;
                        if is_phishing {
                            quarantined += 1;
                        }
                    }
                    Ok(MessageOutcome::Skipped) => {}
                    Err(e) => warn!("Sweep {}: worker panicked: {}", sweep_id, e),
                }
            }

            remaining -= take;
        }

        if remaining == 0 {
            debug!("Sweep {}: message budget exhausted", sweep_id);
            break;
        }

        page_token = page.next_page_token;
        if page_token.is_none() {
            debug!("Sweep {}: pagination exhausted", sweep_id);
            break;
        }
    }

    info!(
        "Sweep {} finished: {} decided, {} quarantined",
        sweep_id, processed, quarantined
    );
    emit(
        &ctx,
        ScanEvent::Finished {
            sweep_id,
            processed,
            quarantined,
        },
    );
}

/// Classify one message and persist the verdict.
///
/// Every failure path returns `Skipped` and leaves the message undecided;
/// an undecided message is picked up again by the next sweep, never silently
/// marked safe.
async fn process_message(
    ctx: &SweepContext,
    creds: &CredentialSnapshot,
    sweep_id: Uuid,
    message_id: &str,
) -> MessageOutcome {
    let meta = match timeout(ctx.call_timeout, ctx.mailbox.get_metadata(creds, message_id)).await
    {
        Ok(Ok(meta)) => meta,
        Ok(Err(e)) => {
            warn!("Sweep {}: metadata fetch failed for {}: {}", sweep_id, message_id, e);
            return skip(ctx, sweep_id, message_id);
        }
        Err(_) => {
            warn!("Sweep {}: metadata fetch timed out for {}", sweep_id, message_id);
            return skip(ctx, sweep_id, message_id);
        }
    };

    // Listing excludes the quarantine folder, but a message can carry the
    // label anyway (user-moved mid-sweep). Leave those alone.
    if meta.label_ids.iter().any(|l| l == LABEL_QUARANTINE) {
        return skip(ctx, sweep_id, message_id);
    }

    let excerpt: String = meta.snippet.chars().take(ctx.config.excerpt_len).collect();
    if excerpt.is_empty() {
        debug!("Sweep {}: {} has no body excerpt", sweep_id, message_id);
        return skip(ctx, sweep_id, message_id);
    }

    let verdict = ctx.scorer.classify(&excerpt);

    if verdict.is_phishing {
        let rationale = ctx
            .synthesizer
            .synthesize(&NarrativeContext {
                sender: &meta.sender,
                subject: &meta.subject,
                body_excerpt: &excerpt,
                confidence: verdict.confidence,
                tokens: &verdict.risk_tokens,
            })
            .await;

        let record = NewVerdict {
            message_id: message_id.to_string(),
            sender: meta.sender.clone(),
            subject: meta.subject.clone(),
            body_excerpt: excerpt,
            is_phishing: true,
            confidence: verdict.confidence,
            rationale,
            explanation: Explanation {
                phishing_tokens: verdict.risk_tokens,
                safe_tokens: verdict.safe_tokens,
            },
            action_taken: RemediationAction::Quarantined,
        };

        // The append is the claim: only the worker that inserted the record
        // may touch the mailbox, so remediation happens at most once per id
        // no matter how many sweeps race.
        match ctx.store.append_if_absent(&record) {
            Ok(true) => {
                if !ctx.executor.quarantine(creds, message_id).await {
                    // Partial failure: verdict recorded, label mutation lost.
                    // The record stands; the message is settled either way.
                    warn!(
                        "Sweep {}: quarantine call failed for {} after claim",
                        sweep_id, message_id
                    );
                }
                decided(ctx, sweep_id, message_id, true)
            }
            Ok(false) => {
                debug!("Sweep {}: {} claimed by a concurrent sweep", sweep_id, message_id);
                skip(ctx, sweep_id, message_id)
            }
            Err(e) => {
                warn!("Sweep {}: append failed for {}: {}", sweep_id, message_id, e);
                skip(ctx, sweep_id, message_id)
            }
        }
    } else {
        let rationale = if verdict.model_available {
            SAFE_RATIONALE.to_string()
        } else {
            NOT_SCORED_RATIONALE.to_string()
        };

        let record = NewVerdict {
            message_id: message_id.to_string(),
            sender: meta.sender.clone(),
            subject: meta.subject.clone(),
            body_excerpt: excerpt,
            is_phishing: false,
            confidence: verdict.confidence,
            rationale,
            explanation: Explanation::default(),
            action_taken: RemediationAction::Delivered,
        };

        match ctx.store.append_if_absent(&record) {
            Ok(true) => decided(ctx, sweep_id, message_id, false),
            Ok(false) => skip(ctx, sweep_id, message_id),
            Err(e) => {
                warn!("Sweep {}: append failed for {}: {}", sweep_id, message_id, e);
                skip(ctx, sweep_id, message_id)
            }
        }
    }
}

fn decided(
    ctx: &SweepContext,
    sweep_id: Uuid,
    message_id: &str,
    is_phishing: bool,
) -> MessageOutcome {
    emit(
        ctx,
        ScanEvent::Decided {
            sweep_id,
            message_id: message_id.to_string(),
            is_phishing,
        },
    );
    MessageOutcome::Decided { is_phishing }
}

fn skip(ctx: &SweepContext, sweep_id: Uuid, message_id: &str) -> MessageOutcome {
    emit(
        ctx,
        ScanEvent::Skipped {
            sweep_id,
            message_id: message_id.to_string(),
        },
    );
    MessageOutcome::Skipped
}

fn emit(ctx: &SweepContext, event: ScanEvent) {
    if let Some(sender) = &ctx.events {
        let _ = sender.send(event);
    }
}
