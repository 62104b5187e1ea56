use tokio::select;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Coordinates graceful shutdown across the dispatcher and worker loops.
///
/// A single background task waits for any of the signals the CLI is meant to
/// honor (SIGTERM, SIGINT, SIGHUP, SIGQUIT, SIGTSTP) or a manual `shutdown()`
/// call, then flips a watched boolean that every loop iteration checks.
#[derive(Debug)]
pub struct GracefulShutdown {
    pub shutdown_finished: JoinHandle<()>,

    start_shutdown: Option<oneshot::Sender<()>>,
    consumer: GracefulShutdownConsumer,
}

#[derive(Clone, Debug)]
pub struct GracefulShutdownConsumer(watch::Receiver<bool>);

impl GracefulShutdown {
    pub fn new() -> GracefulShutdown {
        // This channel changes to true and drops when shutdown is started
        let (shutdown_started_tx, shutdown_started_rx) = watch::channel(false);

        // Send a value or close this channel to start shutting down.
        let (start_shutdown_tx, start_shutdown_rx) = oneshot::channel();

        let shutdown_waiter = tokio::spawn(async move {
            wait_for_signal(start_shutdown_rx).await;

            // Explicitly drop this so that we'll have ownership of it.
            shutdown_started_tx.send(true).unwrap();
        });

        GracefulShutdown {
            start_shutdown: Some(start_shutdown_tx),
            shutdown_finished: shutdown_waiter,
            consumer: GracefulShutdownConsumer(shutdown_started_rx),
        }
    }

    pub fn consumer(&self) -> GracefulShutdownConsumer {
        self.consumer.clone()
    }

    pub fn shutdown(&mut self) {
        if let Some(sender) = self.start_shutdown.take() {
            sender.send(()).unwrap();
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal(manual: oneshot::Receiver<()>) {
    // One task owns all the signal dispositions so shutdown can come
    // from any of them or from an in-process caller.
    let mut term = signal(SignalKind::terminate()).expect("installing SIGTERM handler");
    let mut int = signal(SignalKind::interrupt()).expect("installing SIGINT handler");
    let mut hup = signal(SignalKind::hangup()).expect("installing SIGHUP handler");
    let mut quit = signal(SignalKind::quit()).expect("installing SIGQUIT handler");
    let mut tstp = signal(SignalKind::from_raw(20)).expect("installing SIGTSTP handler");

    select! {
        _ = term.recv() => {},
        _ = int.recv() => {},
        _ = hup.recv() => {},
        _ = quit.recv() => {},
        _ = tstp.recv() => {},
        _ = manual => {},
    };
}

#[cfg(not(unix))]
async fn wait_for_signal(manual: oneshot::Receiver<()>) {
    select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = manual => {},
    };
}

impl GracefulShutdownConsumer {
    pub fn shutting_down(&mut self) -> bool {
        *self.0.borrow()
    }

    pub async fn wait_for_shutdown(&mut self) {
        loop {
            match self.0.changed().await {
                Ok(_) => {
                    // Sender is still open, but value is true so we're shutting down.
                    if *self.0.borrow() {
                        return;
                    }
                }
                // Sender closed, which means we're shutting down.
                Err(_) => return,
            }
        }
    }
}
