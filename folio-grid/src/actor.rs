//! Asynchronous invocation service.
//!
//! Each partition gets its own worker task fed by a bounded channel, so
//! invocations against one partition run in submission order (unit of
//! order) while different partitions proceed in parallel. The worker hands
//! each command to the blocking pool, where [`Member::invoke`] holds the
//! partition lock for the duration of the command and its interceptor
//! dispatch. Interceptors may block without stalling the runtime.
//!
//! ```text
//! submit(p, cmd) ──► mpsc ──► worker(p) ──► spawn_blocking(Member::invoke) ──► oneshot reply
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use folio_core::PartitionId;
use folio_partition::{Command, CommandResult};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{GridError, GridResult};
use crate::member::Member;

/// One queued invocation.
#[derive(Debug)]
struct Invocation {
    command: Command,
    reply: oneshot::Sender<GridResult<CommandResult>>,
}

/// A partition's worker task and its queue.
#[derive(Debug)]
struct Worker {
    tx: mpsc::Sender<Invocation>,
    task: JoinHandle<()>,
}

/// Configuration for the invocation service.
#[derive(Debug, Clone, Copy)]
pub struct InvocationConfig {
    /// Per-partition queue length.
    pub channel_buffer_size: usize,
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: 1000,
        }
    }
}

/// An invocation that has been queued but not yet answered.
#[derive(Debug)]
pub struct PendingInvocation {
    partition: PartitionId,
    reply: oneshot::Receiver<GridResult<CommandResult>>,
}

impl PendingInvocation {
    /// Returns the target partition.
    #[must_use]
    pub const fn partition(&self) -> PartitionId {
        self.partition
    }

    /// Waits for the result.
    ///
    /// # Errors
    /// Returns the command's error, or `ServiceShutdown` if the worker
    /// stopped before answering.
    pub async fn wait(self) -> GridResult<CommandResult> {
        self.reply.await.map_err(|_| GridError::ServiceShutdown)?
    }
}

/// Routes commands to per-partition workers on a member.
#[derive(Debug)]
pub struct InvocationService {
    member: Arc<Member>,
    config: InvocationConfig,
    workers: Mutex<BTreeMap<PartitionId, Worker>>,
    closed: AtomicBool,
}

impl InvocationService {
    /// Creates a service over a member with default configuration.
    #[must_use]
    pub fn new(member: Arc<Member>) -> Self {
        Self::with_config(member, InvocationConfig::default())
    }

    /// Creates a service with explicit configuration.
    #[must_use]
    pub fn with_config(member: Arc<Member>, config: InvocationConfig) -> Self {
        Self {
            member,
            config,
            workers: Mutex::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the member this service invokes on.
    #[must_use]
    pub const fn member(&self) -> &Arc<Member> {
        &self.member
    }

    /// Queues a command and returns a handle to its result.
    ///
    /// Commands submitted for the same partition execute in submission order.
    ///
    /// # Errors
    /// Returns `ServiceShutdown` if the service has been shut down.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime. Panics if the worker
    /// table lock is poisoned.
    pub async fn submit(
        &self,
        partition: PartitionId,
        command: Command,
    ) -> GridResult<PendingInvocation> {
        let tx = self.sender(partition)?;
        let (reply_tx, reply_rx) = oneshot::channel();

        tx.send(Invocation {
            command,
            reply: reply_tx,
        })
        .await
        .map_err(|_| GridError::ServiceShutdown)?;

        Ok(PendingInvocation {
            partition,
            reply: reply_rx,
        })
    }

    /// Runs a command and waits for its result.
    ///
    /// # Errors
    /// Returns the command's error or `ServiceShutdown`.
    pub async fn invoke(
        &self,
        partition: PartitionId,
        command: Command,
    ) -> GridResult<CommandResult> {
        self.submit(partition, command).await?.wait().await
    }

    /// Stops accepting commands, drains queued ones and waits for every
    /// worker to exit.
    ///
    /// # Panics
    ///
    /// Panics if the worker table lock is poisoned.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let workers = std::mem::take(&mut *self.workers.lock().expect("workers lock poisoned"));
        let count = workers.len();

        for (_, worker) in workers {
            drop(worker.tx);
            // A panicked worker has already dropped its pending replies.
            let _ = worker.task.await;
        }
        info!(member = %self.member.id(), workers = count, "invocation service stopped");
    }

    fn sender(&self, partition: PartitionId) -> GridResult<mpsc::Sender<Invocation>> {
        let mut workers = self.workers.lock().expect("workers lock poisoned");
        if self.closed.load(Ordering::SeqCst) {
            return Err(GridError::ServiceShutdown);
        }

        let worker = workers.entry(partition).or_insert_with(|| {
            let (tx, rx) = mpsc::channel(self.config.channel_buffer_size);
            let task = tokio::spawn(run_worker(Arc::clone(&self.member), partition, rx));
            debug!(member = %self.member.id(), partition = %partition, "spawned partition worker");
            Worker { tx, task }
        });
        Ok(worker.tx.clone())
    }
}

async fn run_worker(member: Arc<Member>, partition: PartitionId, mut rx: mpsc::Receiver<Invocation>) {
    while let Some(invocation) = rx.recv().await {
        let invoker = Arc::clone(&member);
        let command = invocation.command;
        let joined =
            tokio::task::spawn_blocking(move || invoker.invoke(partition, &command)).await;
        match joined {
            // The caller may have dropped its pending handle.
            Ok(result) => {
                let _ = invocation.reply.send(result);
            }
            // Dropping the reply reports ServiceShutdown to the caller.
            Err(e) => warn!(
                member = %member.id(),
                partition = %partition,
                error = %e,
                "invocation task failed"
            ),
        }
    }
    debug!(member = %member.id(), partition = %partition, "partition worker exiting");
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    use bytes::Bytes;
    use folio_core::{MemberId, TopicConfig};
    use folio_partition::OfferRequest;

    use super::*;
    use crate::event::TransactionEvent;
    use crate::interceptor::{Abort, Interceptor, InterceptorRegistry};

    const P: PartitionId = PartitionId::new(3);

    fn service() -> InvocationService {
        let member = Member::new(
            MemberId::new(1),
            Arc::new(TopicConfig::new("t")),
            InterceptorRegistry::new(),
        )
        .unwrap();
        member.declare_lost(P).unwrap();
        InvocationService::new(Arc::new(member))
    }

    fn offer(value: &'static [u8]) -> Command {
        Command::Offer(OfferRequest::new(vec![Bytes::from_static(value)]))
    }

    #[tokio::test]
    async fn test_invoke_runs_command() {
        let service = service();
        let result = service.invoke(P, offer(b"a")).await.unwrap();
        assert!(matches!(result, CommandResult::Offered(r) if r.accepted_count == 1));
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_submissions_keep_partition_order() {
        let service = service();
        let mut pending = Vec::new();
        for value in [b"a", b"b", b"c"] {
            pending.push(service.submit(P, offer(value)).await.unwrap());
        }

        let mut offsets = Vec::new();
        for p in pending {
            match p.wait().await.unwrap() {
                CommandResult::Offered(r) => offsets.push(r.offset.unwrap().offset),
                other => panic!("unexpected result {other:?}"),
            }
        }
        assert_eq!(offsets, vec![0, 1, 2]);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_errors_are_returned_to_caller() {
        let service = service();
        let err = service
            .invoke(PartitionId::new(9), offer(b"a"))
            .await
            .unwrap_err();
        assert!(matches!(err, GridError::NotOwned { .. }));
        service.shutdown().await;
    }

    /// Blocks COMMITTING on one partition until released.
    struct Gate {
        partition: PartitionId,
        release: Mutex<std_mpsc::Receiver<()>>,
    }

    impl Interceptor for Gate {
        fn on_transaction(&self, event: &mut TransactionEvent<'_>) -> Result<(), Abort> {
            if event.entries_mut().is_some() && event.partition() == self.partition {
                let _ = self.release.lock().unwrap().recv();
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_blocked_interceptor_does_not_stall_other_partitions() {
        let (release, gate) = std_mpsc::channel();
        let registry = InterceptorRegistry::new()
            .with(
                "gate",
                Arc::new(Gate {
                    partition: P,
                    release: Mutex::new(gate),
                }),
            )
            .unwrap();
        let member = Member::new(MemberId::new(1), Arc::new(TopicConfig::new("t")), registry)
            .unwrap();
        let other = PartitionId::new(4);
        member.declare_lost(P).unwrap();
        member.declare_lost(other).unwrap();
        let service = InvocationService::new(Arc::new(member));

        let blocked = service.submit(P, offer(b"a")).await.unwrap();
        let other_offer = service.invoke(other, offer(b"b"));
        let result = tokio::time::timeout(Duration::from_secs(5), other_offer)
            .await
            .expect("other partition stalled")
            .unwrap();
        assert!(matches!(result, CommandResult::Offered(r) if r.accepted_count == 1));

        release.send(()).unwrap();
        assert!(blocked.wait().await.is_ok());
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_work() {
        let service = service();
        service.invoke(P, offer(b"a")).await.unwrap();
        service.shutdown().await;

        let err = service.invoke(P, offer(b"b")).await.unwrap_err();
        assert_eq!(err, GridError::ServiceShutdown);
    }
}
