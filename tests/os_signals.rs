#![cfg(unix)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use conductor::{Coordinator, Phase, Signal, TokioSignals, release_fn};
use nix::sys::signal::{Signal as NixSignal, raise};
use tokio::signal::unix::{SignalKind, signal};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sigusr1_drives_shutdown_once() {
    // keep a listener of our own so an early raise never hits the default action
    let mut ours = signal(SignalKind::user_defined1()).unwrap();

    let coordinator = Coordinator::new(|_| {});
    let released = Arc::new(AtomicUsize::new(0));
    let r = released.clone();
    coordinator
        .register(release_fn("socket", move || {
            r.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
        .unwrap();

    let waiting = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            let mut signals = TokioSignals::new();
            coordinator
                .shutdown_on_signals(&mut signals, &[Signal::User1])
                .await
        })
    };

    // the registrar may not be listening yet; keep raising until shutdown finishes
    while !waiting.is_finished() {
        raise(NixSignal::SIGUSR1).unwrap();
        let _ = tokio::time::timeout(Duration::from_millis(20), ours.recv()).await;
    }
    waiting.await.unwrap().unwrap();
    assert_eq!(coordinator.phase(), Phase::Finished);
    assert_eq!(released.load(Ordering::SeqCst), 1);

    raise(NixSignal::SIGUSR1).unwrap();
    let _ = tokio::time::timeout(Duration::from_millis(50), ours.recv()).await;
    assert_eq!(released.load(Ordering::SeqCst), 1);
}
