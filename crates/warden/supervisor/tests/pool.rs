//! Worker pool bounds and exclusive slot behaviour under load

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use warden_supervisor::{
    ExclusiveSlot, SubmitOptions, Supervisor, SupervisorConfig, SupervisorError, TaskState,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn never_exceeds_worker_count() {
    let sup = Supervisor::new(SupervisorConfig {
        workers: 3,
        retained_terminal: 64,
    })
    .unwrap();
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for i in 0..12 {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        let handle = sup
            .submit_blocking(format!("job {i}"), "tester", SubmitOptions::default(), move |token| {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(15));
                running.fetch_sub(1, Ordering::SeqCst);
                token.check()?;
                Ok(i)
            })
            .unwrap();
        handles.push(handle);
    }
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.join().await.unwrap());
    }
    assert_eq!(results, (0..12).collect::<Vec<_>>());
    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(sup.list().iter().all(|t| t.state == TaskState::Succeeded));
}

#[tokio::test]
async fn second_sampler_is_refused_while_first_is_listed() {
    let sup = Supervisor::new(SupervisorConfig::default()).unwrap();
    let slot: ExclusiveSlot<warden_supervisor::TaskId> = ExclusiveSlot::new("Profiling");

    let guard = slot.enter().unwrap();
    let generation = guard.generation();
    let first = sup
        .submit("profile", "tester", SubmitOptions::default(), move |token| async move {
            let _guard = guard;
            token.cancelled().await;
            Err::<(), _>(warden_supervisor::TaskError::Cancelled)
        })
        .unwrap();
    slot.annotate(generation, first.id());

    assert_eq!(
        slot.enter().unwrap_err(),
        SupervisorError::AlreadyRunning("Profiling".into())
    );
    assert!(sup.list().iter().any(|t| t.id == first.id() && !t.state.is_terminal()));

    assert_eq!(slot.current(), Some(first.id()));
    assert!(first.cancel());
    first.join().await.unwrap_err();
    assert!(!slot.is_occupied());
    assert!(slot.enter().is_ok());
}
