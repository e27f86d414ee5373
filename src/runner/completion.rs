/// One-shot completion of a sandbox command.
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::process::ChildProcess;

/// Terminal event of a spawned command. Only the first one is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// The process terminated. `code` is `None` when it was killed by a signal.
    Exit { code: Option<i32> },
    /// The process could not be launched or waited on.
    Error {
        kind: io::ErrorKind,
        message: String,
    },
    /// The process cannot report termination; resolved right after spawn.
    Detached,
}

impl ProcessEvent {
    pub fn error(err: &io::Error) -> Self {
        Self::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    fn from_wait(result: io::Result<Option<i32>>) -> Self {
        match result {
            Ok(code) => Self::Exit { code },
            Err(e) => Self::error(&e),
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exit { code } => *code,
            _ => None,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code() == Some(0)
    }
}

/// Sending half of the completion. Fires at most once: later events are
/// dropped.
#[derive(Debug)]
pub struct CompletionSignal {
    tx: Option<oneshot::Sender<ProcessEvent>>,
}

impl CompletionSignal {
    /// Creates a signal and the [`Completion`] it resolves.
    pub fn channel() -> (Self, Completion) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, Completion { rx })
    }

    /// Delivers `event` if nothing was delivered yet. Returns whether it was.
    pub fn fire(&mut self, event: ProcessEvent) -> bool {
        match self.tx.take() {
            Some(tx) => {
                // receiver gone means nobody is waiting, still counts as fired
                let _ = tx.send(event);
                true
            }
            None => false,
        }
    }

    pub fn is_fired(&self) -> bool {
        self.tx.is_none()
    }
}

/// Awaitable completion of a sandbox command.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<ProcessEvent>,
}

impl Future for Completion {
    type Output = ProcessEvent;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|res| {
            res.unwrap_or_else(|_| ProcessEvent::Error {
                kind: io::ErrorKind::Other,
                message: "process supervisor stopped before completion".to_string(),
            })
        })
    }
}

/// Handle on a spawned sandbox command.
///
/// The child itself belongs to the supervising task, so the handle only
/// exposes its pid, a kill request and the completion. Standard streams
/// are inherited from the host by [`ShellSpawner`](super::ShellSpawner);
/// a custom [`ProcessSpawner`](super::ProcessSpawner) that needs to
/// capture them does so before handing the child over.
#[derive(Debug)]
pub struct CommandHandle {
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    completion: Completion,
}

impl CommandHandle {
    /// Hands `child` to a supervising task that fires the completion on the
    /// first terminal event. Must be called from within a tokio runtime.
    pub(crate) fn supervise(mut child: Box<dyn ChildProcess>) -> Self {
        let (mut signal, completion) = CompletionSignal::channel();
        let pid = child.id();

        if !child.observable() {
            signal.fire(ProcessEvent::Detached);
            return Self {
                pid,
                kill_tx: None,
                completion,
            };
        }

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let event = tokio::select! {
                res = child.wait() => ProcessEvent::from_wait(res),
                Ok(()) = kill_rx => match child.kill().await {
                    Ok(()) => ProcessEvent::from_wait(child.wait().await),
                    Err(e) => ProcessEvent::error(&e),
                },
            };
            debug!("Process {pid:?} finished: {event:?}");
            signal.fire(event);
        });

        Self {
            pid,
            kill_tx: Some(kill_tx),
            completion,
        }
    }

    /// Handle for a process that never started. The completion is already
    /// resolved with the launch error.
    pub(crate) fn failed(err: &io::Error) -> Self {
        let (mut signal, completion) = CompletionSignal::channel();
        warn!("Failed to spawn sandbox command: {err}");
        signal.fire(ProcessEvent::error(err));
        Self {
            pid: None,
            kill_tx: None,
            completion,
        }
    }

    /// OS process id, if the process was launched.
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Asks the supervisor to kill the process. Returns false if the
    /// process already finished or a kill was already requested.
    pub fn kill(&mut self) -> bool {
        self.kill_tx
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }

    /// Borrows the completion, to race it against other events without
    /// giving up the ability to `kill()`.
    pub fn completion_mut(&mut self) -> &mut Completion {
        &mut self.completion
    }

    /// Waits for the first terminal event.
    pub async fn wait(self) -> ProcessEvent {
        self.completion.await
    }

    /// Waits up to `timeout`, then kills the process and waits for it to
    /// terminate.
    pub async fn wait_timeout(mut self, timeout: Duration) -> ProcessEvent {
        tokio::select! {
            event = &mut self.completion => event,
            _ = tokio::time::sleep(timeout) => {
                warn!("Process {:?} timed out after {timeout:?}, killing it", self.pid);
                self.kill();
                self.completion.await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;

    #[tokio::test]
    async fn test_signal_fires_once() {
        let (mut signal, completion) = CompletionSignal::channel();
        assert!(!signal.is_fired());
        assert!(signal.fire(ProcessEvent::Exit { code: Some(0) }));
        assert!(signal.is_fired());
        assert!(!signal.fire(ProcessEvent::Exit { code: Some(1) }));
        assert!(!signal.fire(ProcessEvent::Detached));
        assert_eq!(completion.await, ProcessEvent::Exit { code: Some(0) });
    }

    #[tokio::test]
    async fn test_first_event_wins_error_first() {
        let (mut signal, completion) = CompletionSignal::channel();
        let err = io::Error::new(io::ErrorKind::NotFound, "sh: not found");
        signal.fire(ProcessEvent::error(&err));
        signal.fire(ProcessEvent::Exit { code: Some(0) });

        match completion.await {
            ProcessEvent::Error { kind, message } => {
                assert_eq!(kind, io::ErrorKind::NotFound);
                assert!(message.contains("not found"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dropped_signal_resolves_with_error() {
        let (signal, completion) = CompletionSignal::channel();
        drop(signal);
        assert!(matches!(completion.await, ProcessEvent::Error { .. }));
    }

    #[test]
    fn test_event_helpers() {
        assert!(ProcessEvent::Exit { code: Some(0) }.success());
        assert!(!ProcessEvent::Exit { code: Some(2) }.success());
        assert_eq!(ProcessEvent::Exit { code: Some(2) }.exit_code(), Some(2));
        assert_eq!(ProcessEvent::Exit { code: None }.exit_code(), None);
        assert_eq!(ProcessEvent::Detached.exit_code(), None);
    }

    /// Child that exits with a fixed code once released, or on kill.
    struct FakeChild {
        code: i32,
        release: Option<oneshot::Receiver<()>>,
        killed: Arc<AtomicBool>,
        observable: bool,
    }

    #[async_trait]
    impl ChildProcess for FakeChild {
        fn id(&self) -> Option<u32> {
            Some(4242)
        }

        fn observable(&self) -> bool {
            self.observable
        }

        async fn wait(&mut self) -> io::Result<Option<i32>> {
            if self.killed.load(Ordering::SeqCst) {
                return Ok(None);
            }
            if let Some(rx) = self.release.take() {
                let _ = rx.await;
            }
            Ok(Some(self.code))
        }

        async fn kill(&mut self) -> io::Result<()> {
            self.killed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fake(code: i32, observable: bool) -> (FakeChild, oneshot::Sender<()>, Arc<AtomicBool>) {
        let (tx, rx) = oneshot::channel();
        let killed = Arc::new(AtomicBool::new(false));
        (
            FakeChild {
                code,
                release: Some(rx),
                killed: killed.clone(),
                observable,
            },
            tx,
            killed,
        )
    }

    #[tokio::test]
    async fn test_supervise_reports_exit() {
        let (child, release, _) = fake(3, true);
        let handle = CommandHandle::supervise(Box::new(child));
        assert_eq!(handle.id(), Some(4242));
        release.send(()).unwrap();
        assert_eq!(handle.wait().await, ProcessEvent::Exit { code: Some(3) });
    }

    #[tokio::test]
    async fn test_supervise_unobservable_resolves_immediately() {
        let (child, _release, _) = fake(0, false);
        let handle = CommandHandle::supervise(Box::new(child));
        assert_eq!(handle.wait().await, ProcessEvent::Detached);
    }

    #[tokio::test]
    async fn test_kill_terminates() {
        let (child, _release, killed) = fake(0, true);
        let mut handle = CommandHandle::supervise(Box::new(child));
        assert!(handle.kill());
        assert!(!handle.kill());
        assert_eq!(handle.wait().await, ProcessEvent::Exit { code: None });
        assert!(killed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_wait_timeout_kills() {
        let (child, _release, killed) = fake(0, true);
        let handle = CommandHandle::supervise(Box::new(child));
        let event = handle.wait_timeout(Duration::from_millis(20)).await;
        assert_eq!(event, ProcessEvent::Exit { code: None });
        assert!(killed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failed_handle_resolves_with_error() {
        let err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let mut handle = CommandHandle::failed(&err);
        assert_eq!(handle.id(), None);
        assert!(!handle.kill());
        assert!(matches!(
            handle.wait().await,
            ProcessEvent::Error { kind: io::ErrorKind::PermissionDenied, .. }
        ));
    }
}
