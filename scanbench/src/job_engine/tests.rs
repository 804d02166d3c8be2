use crate::global_config::DispatchStrategy;
use crate::job_engine::bounded_pool::BoundedPool;
use crate::job_engine::closure_job::ClosureJob;
use crate::job_engine::completion::CompletionSignal;
use crate::job_engine::inline::Inline;
use crate::job_engine::job::FailureKind;
use crate::job_engine::persistent_worker::{PersistentWorker, State};
use crate::job_engine::transient::Transient;

use super::*;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Simple shared event log
fn shared_log() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}

fn logging_job(log: &Arc<Mutex<Vec<String>>>, name: &str, sleep: Duration) -> ClosureJob<String> {
    let log = log.clone();
    let name = name.to_string();
    ClosureJob::new(name.clone(), move |_| {
        log.lock().unwrap().push(format!("start {name}"));
        thread::sleep(sleep);
        Ok(name)
    })
}

//
// 1. Ordering test
//
#[test]
fn test_job_ordering() {
    let mut worker = PersistentWorker::started().unwrap();
    let log = shared_log();

    for name in ["a", "b", "c"] {
        let done_log = log.clone();
        worker
            .submit(
                logging_job(&log, name, Duration::from_millis(5)),
                move |outcome| done_log.lock().unwrap().push(format!("done {}", outcome.unwrap())),
            )
            .unwrap();
    }

    worker.join().unwrap();

    // each callback fires before the next job starts
    assert_eq!(
        *log.lock().unwrap(),
        vec!["start a", "done a", "start b", "done b", "start c", "done c"]
    );
}

//
// 2. State machine of the persistent worker
//
#[test]
fn test_worker_lifecycle() {
    let mut worker = PersistentWorker::new();
    assert_eq!(worker.state(), State::Idle);
    assert_eq!(
        worker.run_and_wait(ClosureJob::new("early", |_| Ok(())), None).unwrap_err().to_string(),
        DispatchError::NotRunning.to_string()
    );
    assert_eq!(worker.join(), Err(DispatchError::NotRunning));

    worker.start().unwrap();
    assert_eq!(worker.state(), State::Running);
    assert_eq!(worker.start(), Err(DispatchError::AlreadyStarted));

    worker.join().unwrap();
    assert_eq!(worker.state(), State::Stopped);
    assert_eq!(worker.join(), Err(DispatchError::AlreadyStopped));
    assert!(matches!(
        worker.run_and_wait(ClosureJob::new("late", |_| Ok(())), None),
        Err(JobError::Dispatch(DispatchError::AlreadyStopped))
    ));
}

//
// 3. Jobs queued before join still run
//
#[test]
fn test_join_drains_queue() {
    let mut worker = PersistentWorker::started().unwrap();
    let count = Arc::new(Mutex::new(0));
    for _ in 0..50 {
        let c = count.clone();
        worker
            .submit(
                ClosureJob::new("increment", move |_| {
                    *c.lock().unwrap() += 1;
                    Ok(())
                }),
                |_| {},
            )
            .unwrap();
    }
    worker.join().unwrap();
    assert_eq!(*count.lock().unwrap(), 50);
}

//
// 4. Failure isolation
//
#[test]
fn test_job_failure_does_not_crash_worker() {
    let mut worker = PersistentWorker::started().unwrap();

    let err = worker
        .run_and_wait(
            ClosureJob::<()>::new("broken", |_| Err(anyhow::anyhow!("disk full"))),
            None,
        )
        .unwrap_err();
    match err {
        JobError::Failed(failure) => {
            assert_eq!(failure.job, "broken");
            assert_eq!(failure.kind, FailureKind::Error("disk full".to_string()));
            assert!(failure.submitted_from.location.file().ends_with("tests.rs"));
        }
        other => panic!("unexpected error {other}"),
    }

    let err = worker
        .run_and_wait(
            ClosureJob::<()>::new("panicking", |_| panic!("intentional test panic")),
            None,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        JobError::Failed(JobFailure {
            kind: FailureKind::Panicked(_),
            ..
        })
    ));

    // the worker survived both
    let value = worker
        .run_and_wait(ClosureJob::new("healthy", |_| Ok(42)), None)
        .unwrap();
    assert_eq!(value, 42);
    worker.join().unwrap();
}

#[test]
fn test_panicking_callback_does_not_crash_worker() {
    let mut worker = PersistentWorker::started().unwrap();
    worker
        .submit(ClosureJob::new("first", |_| Ok(())), |_| panic!("callback panic"))
        .unwrap();
    let value = worker
        .run_and_wait(ClosureJob::new("second", |_| Ok(7)), None)
        .unwrap();
    assert_eq!(value, 7);
    worker.join().unwrap();
}

//
// 5. Timeout and cancellation
//
#[test]
fn test_timeout_cancels_cooperative_job() {
    let mut worker = PersistentWorker::started().unwrap();
    let observed = Arc::new(Mutex::new(false));
    let o = observed.clone();
    let err = worker
        .run_and_wait(
            ClosureJob::new("long", move |cancel: &CancellationToken| {
                let started = Instant::now();
                while !cancel.is_cancelled() && started.elapsed() < Duration::from_secs(5) {
                    thread::sleep(Duration::from_millis(1));
                }
                *o.lock().unwrap() = cancel.is_cancelled();
                Ok(())
            }),
            Some(Duration::from_millis(20)),
        )
        .unwrap_err();
    assert!(matches!(err, JobError::TimedOut { .. }));

    // join waits for the job, which bails out once it sees the cancellation
    worker.join().unwrap();
    assert!(*observed.lock().unwrap());
}

#[test]
fn test_cancelled_before_start_is_skipped() {
    let mut worker = PersistentWorker::started().unwrap();
    let gate = CompletionSignal::new();

    // blocks the worker until the gate opens
    let g = gate.clone();
    worker
        .submit(
            ClosureJob::new("blocker", move |_| {
                g.wait();
                Ok(())
            }),
            |_| {},
        )
        .unwrap();

    let outcome = Arc::new(Mutex::new(None));
    let out = outcome.clone();
    let cancel = worker
        .submit(ClosureJob::new("skipped", |_| Ok(())), move |o| {
            *out.lock().unwrap() = Some(o.map_err(|f| f.kind));
        })
        .unwrap();
    cancel.cancel();
    gate.set();
    worker.join().unwrap();

    assert_eq!(
        outcome.lock().unwrap().take(),
        Some(Err(FailureKind::Cancelled))
    );
}

//
// 6. Bounded pool
//
#[test]
fn test_pool_size_does_not_change_outcome() {
    for size in [1, 10] {
        let mut pool = BoundedPool::new(size).unwrap();
        assert_eq!(pool.size(), size);
        let handle = pool
            .submit_with_handle(ClosureJob::new("sum", |_| Ok((1..=10).sum::<u32>())))
            .unwrap();
        assert_eq!(handle.result().unwrap(), 55);
        pool.shutdown().unwrap();
    }
}

#[test]
fn test_pool_rejects_zero_workers() {
    assert_eq!(BoundedPool::new(0).unwrap_err(), DispatchError::EmptyPool);
}

#[test]
fn test_pool_double_shutdown() {
    let mut pool = BoundedPool::new(2).unwrap();
    pool.shutdown().unwrap();
    assert_eq!(pool.shutdown(), Err(DispatchError::AlreadyStopped));
    assert!(pool
        .submit_with_handle(ClosureJob::new("late", |_| Ok(())))
        .is_err());
}

#[test]
fn test_pool_shutdown_releases_queued_jobs() {
    let mut pool = BoundedPool::new(1).unwrap();
    let started = CompletionSignal::new();
    let gate = CompletionSignal::new();
    let (s, g) = (started.clone(), gate.clone());
    let running = pool
        .submit_with_handle(ClosureJob::new("blocker", move |_| {
            s.set();
            g.wait();
            Ok(1)
        }))
        .unwrap();
    // the single worker is busy from here on
    started.wait();
    let queued = pool
        .submit_with_handle(ClosureJob::new("queued", |_| Ok(2)))
        .unwrap();

    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        gate.set();
    });
    pool.shutdown().unwrap();
    releaser.join().unwrap();

    assert_eq!(running.result().unwrap(), 1);
    assert!(matches!(queued.result(), Err(JobError::Abandoned { .. })));
}

#[test]
fn test_pool_handle_timeout() {
    let mut pool = BoundedPool::new(1).unwrap();
    let handle = pool
        .submit_with_handle(ClosureJob::new("slow", |cancel: &CancellationToken| {
            while !cancel.is_cancelled() {
                thread::sleep(Duration::from_millis(1));
            }
            Ok(())
        }))
        .unwrap();
    assert!(!handle.is_done());
    assert!(matches!(
        handle.result_timeout(Duration::from_millis(10)),
        Err(JobError::TimedOut { .. })
    ));
    pool.shutdown().unwrap();
}

//
// 7. Transient threads
//
#[test]
fn test_transient_runs_each_job_on_a_new_thread() {
    let mut transient = Transient::new();
    let caller = thread::current().id();
    let mut seen = Vec::new();
    for _ in 0..3 {
        let id = transient
            .run(ClosureJob::new("thread id", |_| Ok(thread::current().id())))
            .unwrap();
        assert_ne!(id, caller);
        assert!(!seen.contains(&id));
        seen.push(id);
    }
    assert_eq!(transient.spawned(), 3);
    transient.shutdown().unwrap();
    assert_eq!(transient.shutdown(), Err(DispatchError::AlreadyStopped));
}

//
// 8. Inline baseline
//
#[test]
fn test_inline_runs_on_caller() {
    let mut inline = Inline::new();
    let caller = thread::current().id();
    let id = inline
        .run_and_wait(ClosureJob::new("thread id", |_| Ok(thread::current().id())), None)
        .unwrap();
    assert_eq!(id, caller);
    inline.shutdown().unwrap();
    assert_eq!(inline.shutdown(), Err(DispatchError::AlreadyStopped));
}

//
// 9. Dispatcher slot
//
#[test]
fn test_slot_creates_lazily_and_recreates_after_shutdown() {
    let slot = DispatcherSlot::new(DispatchStrategy::SingleWorker, 1);
    assert!(!slot.is_live());
    assert_eq!(slot.generation(), 0);
    assert_eq!(slot.shutdown(), Err(DispatchError::AlreadyStopped));

    assert_eq!(slot.run_and_wait(ClosureJob::new("one", |_| Ok(1)), None).unwrap(), 1);
    assert_eq!(slot.run_and_wait(ClosureJob::new("two", |_| Ok(2)), None).unwrap(), 2);
    assert!(slot.is_live());
    assert_eq!(slot.generation(), 1);

    slot.shutdown().unwrap();
    assert!(!slot.is_live());
    assert_eq!(slot.shutdown(), Err(DispatchError::AlreadyStopped));

    assert_eq!(slot.run_and_wait(ClosureJob::new("three", |_| Ok(3)), None).unwrap(), 3);
    assert_eq!(slot.generation(), 2);
    slot.shutdown().unwrap();
}

#[test]
fn test_slot_creates_one_dispatcher_for_concurrent_callers() {
    let slot = Arc::new(DispatcherSlot::new(DispatchStrategy::BoundedPool, 2));
    let callers: Vec<_> = (0..8)
        .map(|i| {
            let slot = slot.clone();
            thread::spawn(move || slot.run_and_wait(ClosureJob::new("id", move |_| Ok(i)), None))
        })
        .collect();
    let mut values: Vec<i32> = callers
        .into_iter()
        .map(|c| c.join().unwrap().unwrap())
        .collect();
    values.sort();
    assert_eq!(values, (0..8).collect::<Vec<_>>());
    assert_eq!(slot.generation(), 1);
    slot.shutdown().unwrap();
}

#[test]
fn test_slot_reports_pool_misconfiguration() {
    let slot = DispatcherSlot::new(DispatchStrategy::BoundedPool, 0);
    assert!(matches!(
        slot.run_and_wait(ClosureJob::new("never", |_| Ok(())), None),
        Err(JobError::Dispatch(DispatchError::EmptyPool))
    ));
    assert!(!slot.is_live());
}

#[test]
fn test_every_strategy_returns_the_value() {
    for strategy in [
        DispatchStrategy::None,
        DispatchStrategy::SingleWorker,
        DispatchStrategy::BoundedPool,
        DispatchStrategy::Transient,
    ] {
        let mut dispatcher = create_dispatcher(strategy, 3).unwrap();
        assert_eq!(dispatcher.strategy(), strategy);
        let value = dispatcher
            .run_and_wait(ClosureJob::new("answer", |_| Ok("done")), None)
            .unwrap();
        assert_eq!(value, "done");
        dispatcher.shutdown().unwrap();
        assert_eq!(dispatcher.shutdown(), Err(DispatchError::AlreadyStopped));
    }
}

//
// 10. Transient threads are gone once the wait returns
//
struct SetOnThreadExit(Arc<AtomicBool>);

impl Drop for SetOnThreadExit {
    fn drop(&mut self) {
        // slow teardown, so a missing join shows up
        thread::sleep(Duration::from_millis(100));
        self.0.store(true, Ordering::SeqCst);
    }
}

thread_local! {
    static EXIT_GUARD: RefCell<Option<SetOnThreadExit>> = RefCell::new(None);
}

fn exit_guard_job(exited: &Arc<AtomicBool>) -> ClosureJob<()> {
    let exited = exited.clone();
    ClosureJob::new("exit guard", move |_| {
        EXIT_GUARD.with(|guard| *guard.borrow_mut() = Some(SetOnThreadExit(exited)));
        Ok(())
    })
}

#[test]
fn test_transient_thread_joined_after_slot_wait() {
    let slot = DispatcherSlot::new(DispatchStrategy::Transient, 1);
    for _ in 0..2 {
        let exited = Arc::new(AtomicBool::new(false));
        slot.run_and_wait(exit_guard_job(&exited), None).unwrap();
        assert!(exited.load(Ordering::SeqCst));
    }
    slot.shutdown().unwrap();
}

#[test]
fn test_transient_thread_joined_after_dispatcher_wait() {
    let mut dispatcher = create_dispatcher(DispatchStrategy::Transient, 1).unwrap();
    let exited = Arc::new(AtomicBool::new(false));
    dispatcher
        .run_and_wait(exit_guard_job(&exited), Some(Duration::from_secs(5)))
        .unwrap();
    assert!(exited.load(Ordering::SeqCst));

    let mut transient = Transient::new();
    let exited = Arc::new(AtomicBool::new(false));
    transient.run(exit_guard_job(&exited)).unwrap();
    assert!(exited.load(Ordering::SeqCst));
}

#[test]
fn test_failed_transient_job_still_joins_its_thread() {
    let slot = DispatcherSlot::new(DispatchStrategy::Transient, 1);
    let exited = Arc::new(AtomicBool::new(false));
    let e = exited.clone();
    let err = slot
        .run_and_wait(
            ClosureJob::<()>::new("failing exit guard", move |_| {
                EXIT_GUARD.with(|guard| *guard.borrow_mut() = Some(SetOnThreadExit(e)));
                anyhow::bail!("scan aborted")
            }),
            None,
        )
        .unwrap_err();
    assert!(matches!(err, JobError::Failed(_)));
    assert!(exited.load(Ordering::SeqCst));
}
