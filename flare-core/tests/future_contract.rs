//! 完成 Future 契约：终态唯一、监听器扇出、死锁防护与 void 变体。

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use flare_core::{
    CoreError, CoreServices, EventExecutor, ImmediateExecutor, Promise, SingleThreadExecutor, codes,
};
use support::*;

fn immediate_promise() -> Promise {
    Promise::new(
        Arc::new(ImmediateExecutor) as Arc<dyn EventExecutor>,
        &CoreServices::default(),
    )
}

/// 属性 3：并发竞争 try_success / try_failure / try_cancel，恰好一个胜出。
#[test]
fn exactly_one_terminal_transition_wins() {
    for _ in 0..32 {
        let promise = Promise::cancellable(
            Arc::new(ImmediateExecutor) as Arc<dyn EventExecutor>,
            &CoreServices::default(),
        );
        let wins = Arc::new(AtomicUsize::new(0));
        let mut workers = Vec::new();
        for op in 0..3 {
            let promise = promise.clone();
            let wins = Arc::clone(&wins);
            workers.push(thread::spawn(move || {
                let won = match op {
                    0 => promise.try_success(()),
                    1 => promise.try_failure(CoreError::new("test.race", "并发失败")),
                    _ => promise.try_cancel(),
                };
                if won {
                    wins.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for worker in workers {
            worker.join().expect("worker join");
        }
        assert_eq!(wins.load(Ordering::SeqCst), 1, "恰好一个终态迁移胜出");
        assert!(promise.is_done());
        let observed = (
            promise.is_success(),
            promise.is_cancelled(),
            promise.cause().is_some(),
        );
        match observed {
            (true, false, false) | (false, true, true) | (false, false, true) => {}
            other => panic!("终态观察不一致: {other:?}"),
        }
    }
}

/// 属性 4：监听器按注册序通知；完成后注册的立即通知一次；
/// 通知中注册的监听器在下一批执行，不递归。
#[test]
fn listeners_fire_in_registration_order() {
    let promise = immediate_promise();
    let order = Arc::new(Mutex::new(Vec::new()));
    for index in 0..3 {
        let order = Arc::clone(&order);
        promise
            .add_listener(move |_promise| {
                order.lock().expect("order lock").push(format!("l{index}"));
            })
            .expect("register listener");
    }
    promise.try_success(());
    assert_eq!(
        order.lock().expect("order lock").clone(),
        vec!["l0", "l1", "l2"],
        "通知顺序即注册顺序"
    );

    let order_late = Arc::clone(&order);
    promise
        .add_listener(move |_promise| {
            order_late.lock().expect("order lock").push("late".to_string());
        })
        .expect("late listener");
    assert_eq!(
        order.lock().expect("order lock").last().map(String::as_str),
        Some("late"),
        "完成后注册的监听器立即通知恰好一次"
    );
}

#[test]
fn listener_added_during_notification_runs_in_next_pass() {
    let promise = immediate_promise();
    let order = Arc::new(Mutex::new(Vec::new()));
    let outer_order = Arc::clone(&order);
    promise
        .add_listener(move |promise| {
            outer_order
                .lock()
                .expect("order lock")
                .push("outer".to_string());
            let inner_order = Arc::clone(&outer_order);
            promise
                .add_listener(move |_promise| {
                    inner_order
                        .lock()
                        .expect("order lock")
                        .push("inner".to_string());
                })
                .expect("nested listener");
            // 嵌套注册返回时不得已被递归执行。
            assert_eq!(outer_order.lock().expect("order lock").len(), 1);
        })
        .expect("outer listener");
    promise.try_success(());
    assert_eq!(
        order.lock().expect("order lock").clone(),
        vec!["outer", "inner"],
        "嵌套注册的监听器在下一批执行"
    );
}

#[test]
fn removed_listener_is_not_notified() {
    let promise = immediate_promise();
    let order = Arc::new(Mutex::new(Vec::new()));
    let first_order = Arc::clone(&order);
    let first = promise
        .add_listener(move |_promise| {
            first_order.lock().expect("order lock").push("first");
        })
        .expect("first listener");
    let second_order = Arc::clone(&order);
    promise
        .add_listener(move |_promise| {
            second_order.lock().expect("order lock").push("second");
        })
        .expect("second listener");
    promise.remove_listener(first);
    promise.try_success(());
    assert_eq!(order.lock().expect("order lock").clone(), vec!["second"]);
}

/// S5 与属性 5：限时等待在非反应器线程按时返回且 Future 仍为 Pending；
/// 反应器线程上的等待立即报死锁。
#[test]
fn wait_timeout_elapses_and_reactor_wait_deadlocks() {
    let reactor = SingleThreadExecutor::new("future-reactor");
    let reactor_dyn: Arc<dyn EventExecutor> = reactor.clone();
    let promise: Promise<()> = Promise::new(Arc::clone(&reactor_dyn), &CoreServices::default());

    let started = Instant::now();
    let completed = promise
        .wait_timeout(Duration::from_millis(100))
        .expect("wait from foreign thread");
    assert!(!completed, "限期内未完成应返回 false");
    assert!(started.elapsed() >= Duration::from_millis(90));
    assert!(!promise.is_done(), "超时不改变 Future 状态");

    let (tx, rx) = mpsc::channel();
    let reactor_promise = promise.clone();
    reactor_dyn.execute(Box::new(move || {
        let _ = tx.send(reactor_promise.wait_timeout(Duration::from_millis(1)));
    }));
    let err = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("reactor reply")
        .expect_err("wait on own executor must fail");
    assert_eq!(err.code(), codes::FUTURE_DEADLOCK);

    let sync_err = {
        let (tx, rx) = mpsc::channel();
        let reactor_promise = promise.clone();
        reactor_dyn.execute(Box::new(move || {
            let _ = tx.send(reactor_promise.sync());
        }));
        rx.recv_timeout(Duration::from_secs(5))
            .expect("reactor reply")
            .expect_err("sync on own executor must fail")
    };
    assert_eq!(sync_err.code(), codes::FUTURE_DEADLOCK);
    reactor.shutdown();
}

#[test]
fn wait_returns_after_cross_thread_completion() {
    let reactor = SingleThreadExecutor::new("future-reactor");
    let reactor_dyn: Arc<dyn EventExecutor> = reactor.clone();
    let promise: Promise<()> = Promise::new(Arc::clone(&reactor_dyn), &CoreServices::default());

    let completer = promise.clone();
    let worker = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        completer.try_success(());
    });
    promise.wait().expect("wait for completion");
    assert!(promise.is_success());
    worker.join().expect("completer join");
    reactor.shutdown();
}

#[test]
fn sync_reraises_failure_and_cancellation() {
    let failed = immediate_promise();
    failed.try_failure(CoreError::new("test.io", "写失败"));
    let err = failed.sync().expect_err("sync must reraise failure");
    assert_eq!(err.code(), "test.io");
    assert_eq!(failed.cause().expect("cause").code(), "test.io");

    let cancelled: Promise<()> = Promise::cancellable(
        Arc::new(ImmediateExecutor) as Arc<dyn EventExecutor>,
        &CoreServices::default(),
    );
    assert!(cancelled.is_cancellable());
    assert!(cancelled.try_cancel());
    assert!(cancelled.is_cancelled());
    let err = cancelled.sync().expect_err("sync must reraise cancellation");
    assert_eq!(err.code(), codes::FUTURE_CANCELLED);

    let plain = immediate_promise();
    assert!(!plain.is_cancellable(), "I/O Promise 默认不可取消");
    assert!(!plain.try_cancel());
    assert!(!plain.is_done());
}

/// 属性 8 与 void 契约：监听与等待失败、观察方法返回固定值、完成被丢弃。
#[test]
fn void_promise_rejects_listeners_and_waits() {
    let reactor = SingleThreadExecutor::new("future-reactor");
    let reactor_dyn: Arc<dyn EventExecutor> = reactor.clone();
    let void = Promise::void(Arc::clone(&reactor_dyn), &CoreServices::default());

    assert!(void.is_void());
    assert!(void.is_done());
    assert!(void.is_success());
    assert!(!void.is_cancelled());
    assert!(void.cause().is_none());

    let err = void
        .add_listener(|_promise| {})
        .expect_err("listener on void must fail");
    assert_eq!(err.code(), codes::FUTURE_VOID_OPERATION);
    assert_eq!(
        void.wait().expect_err("wait on void must fail").code(),
        codes::FUTURE_VOID_OPERATION
    );
    assert_eq!(
        void.sync().expect_err("sync on void must fail").code(),
        codes::FUTURE_VOID_OPERATION
    );
    assert!(!void.try_cancel());
    assert!(void.try_success(()), "写方的完成被接受并丢弃");
    reactor.shutdown();
}

/// 监听器通知运行在 Future 绑定的执行器线程上。
#[test]
fn listeners_run_on_bound_executor_thread() {
    let reactor = SingleThreadExecutor::new("future-reactor");
    let reactor_dyn: Arc<dyn EventExecutor> = reactor.clone();
    let expected = executor_thread_id(&reactor_dyn);
    let promise = Promise::new(Arc::clone(&reactor_dyn), &CoreServices::default());

    let observed = Arc::new(Mutex::new(None));
    let observed_in_listener = Arc::clone(&observed);
    promise
        .add_listener(move |_promise| {
            *observed_in_listener.lock().expect("observed lock") =
                Some(thread::current().id());
        })
        .expect("register listener");
    promise.try_success(());
    assert!(
        wait_until(
            || observed.lock().expect("observed lock").is_some(),
            Duration::from_secs(2)
        ),
        "监听器应被调度执行"
    );
    assert_eq!(
        observed.lock().expect("observed lock").expect("thread id"),
        expected,
        "通知运行在绑定执行器线程"
    );
    reactor.shutdown();
}
