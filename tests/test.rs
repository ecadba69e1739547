use merge_bridge::prelude::*;
use merge_bridge::{
    AlreadyClosed, BoxSource, BridgeState, Capacity, ConflatingSource, PushError, ReplayingSource,
    SendError,
};

use futures_lite::future::{block_on, poll_once};
use futures_lite::prelude::*;
use futures_lite::stream;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn teardown_counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    (count, move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

/// Position of `n` in `out`.
fn pos(out: &[u32], n: u32) -> usize {
    out.iter().position(|&x| x == n).unwrap()
}

#[test]
fn merge_preserves_per_source_order() {
    for _ in 0..100 {
        let out: Vec<u32> = block_on(async {
            let a = stream::iter(vec![1, 2, 3]);
            let b = stream::iter(vec![4, 5]);
            let (s, _handle) = vec![a, b].bridge().start();
            s.collect().await
        });

        assert_eq!(out.len(), 5);
        assert!(pos(&out, 1) < pos(&out, 2));
        assert!(pos(&out, 2) < pos(&out, 3));
        assert!(pos(&out, 4) < pos(&out, 5));

        let mut sorted = out.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 2, 3, 4, 5]);
    }
}

#[test]
fn many_sources_keep_their_own_order() {
    block_on(async {
        let sources: Vec<_> = (0..10u32)
            .map(|n| stream::iter((0..20u32).map(move |i| n * 100 + i)))
            .collect();
        let (s, _handle) = MergeSource::new(sources).start();
        let out: Vec<u32> = s.collect().await;

        assert_eq!(out.len(), 200);
        for n in 0..10 {
            let own: Vec<_> = out.iter().filter(|x| *x / 100 == n).collect();
            assert!(own.windows(2).all(|w| w[0] < w[1]));
            assert_eq!(own.len(), 20);
        }
    })
}

#[test]
fn push_close_push() {
    block_on(async {
        let (count, teardown) = teardown_counter();
        let (mut s, handle) = vec![stream::pending::<u32>()]
            .bridge()
            .burst(1..=5)
            .on_teardown(teardown)
            .start();

        for n in 1..=5 {
            assert_eq!(s.next().await, Some(n));
        }

        assert_eq!(handle.push(6), Ok(()));
        assert_eq!(handle.close(), Ok(()));
        assert_eq!(handle.push(7), Err(PushError::AlreadyClosed(7)));

        assert_eq!(s.next().await, Some(6));
        assert_eq!(s.next().await, None);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    })
}

#[test]
fn close_stops_forwarding_from_sources() {
    block_on(async {
        let (mut s, handle) = vec![stream::repeat(1u32)].bridge().start();

        assert_eq!(s.next().await, Some(1));
        handle.close().unwrap();
        assert_eq!(s.next().await, None);
        assert_eq!(s.next().await, None);
    })
}

#[test]
fn close_twice_is_idempotent() {
    block_on(async {
        let (count, teardown) = teardown_counter();
        let (mut s, handle) = vec![stream::pending::<u32>()]
            .bridge()
            .on_teardown(teardown)
            .start();
        assert_eq!(poll_once(s.next()).await, None);

        assert_eq!(handle.close(), Ok(()));
        assert_eq!(handle.close(), Err(AlreadyClosed));
        assert_eq!(handle.clone().close(), Err(AlreadyClosed));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(handle.state(), BridgeState::Closed);
    })
}

#[test]
fn teardown_runs_once_after_exhaustion() {
    block_on(async {
        let (count, teardown) = teardown_counter();
        let (s, handle) = vec![stream::iter(vec![1u32, 2]), stream::iter(vec![3])]
            .bridge()
            .on_teardown(teardown)
            .start();

        let out: Vec<_> = s.collect().await;
        assert_eq!(out.len(), 3);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert_eq!(handle.close(), Err(AlreadyClosed));
        assert_eq!(handle.push(4), Err(PushError::AlreadyClosed(4)));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    })
}

#[test]
fn dropping_the_stream_cancels_and_tears_down() {
    block_on(async {
        let (count, teardown) = teardown_counter();
        let (mut s, handle) = vec![stream::repeat(0u32)]
            .bridge()
            .on_teardown(teardown)
            .start();

        assert_eq!(s.next().await, Some(0));
        drop(s);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(handle.is_closed());
        assert_eq!(handle.push(1), Err(PushError::AlreadyClosed(1)));
    })
}

#[test]
fn never_polled_stream_still_tears_down_once() {
    let (count, teardown) = teardown_counter();
    let (s, handle) = vec![stream::pending::<u32>()]
        .bridge()
        .on_teardown(teardown)
        .start();

    assert_eq!(handle.state(), BridgeState::Created);
    assert_eq!(handle.close(), Ok(()));
    assert_eq!(count.load(Ordering::SeqCst), 0);

    drop(s);
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(handle.close(), Err(AlreadyClosed));
}

#[test]
fn push_after_close_never_blocks_on_a_full_channel() {
    block_on(async {
        let (mut s, handle) = vec![stream::pending::<u32>()]
            .bridge()
            .capacity(Capacity::bounded(1).unwrap())
            .start();
        assert_eq!(poll_once(s.next()).await, None);

        handle.push(1).unwrap();
        assert_eq!(handle.push(2), Err(PushError::WouldBlock(2)));
        handle.close().unwrap();
        assert_eq!(handle.push(3), Err(PushError::AlreadyClosed(3)));
        assert_eq!(handle.send(4).await, Err(SendError(4)));

        assert_eq!(s.next().await, Some(1));
        assert_eq!(s.next().await, None);
    })
}

#[test]
fn heterogeneous_sources() {
    block_on(async {
        let a: BoxSource<'static, u32> = Box::pin(stream::iter(vec![1, 2]));
        let b: BoxSource<'static, u32> = Box::pin(stream::once(3));
        let (s, _handle) = MergeSource::new(vec![a, b]).start();
        let mut out: Vec<_> = s.collect().await;
        out.sort_unstable();
        assert_eq!(out, vec![1, 2, 3]);
    })
}

#[test]
fn hot_sources_feed_a_bridge() {
    block_on(async {
        let latest = ConflatingSource::with_value(10u32);
        let history = ReplayingSource::with_history(4);
        history.publish(1).unwrap();
        history.publish(2).unwrap();

        let a: BoxSource<'static, u32> = Box::pin(latest.subscribe());
        let b: BoxSource<'static, u32> = Box::pin(history.subscribe());
        let (mut s, _handle) = MergeSource::new(vec![a, b]).start();

        let mut out = vec![];
        for _ in 0..3 {
            out.push(s.next().await.unwrap());
        }
        out.sort_unstable();
        assert_eq!(out, vec![1, 2, 10]);

        latest.publish(11).unwrap();
        assert_eq!(s.next().await, Some(11));

        drop(latest);
        drop(history);
        assert_eq!(s.next().await, None);
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pushes_from_other_threads() {
    let (mut s, handle) = vec![stream::pending::<u32>()]
        .bridge()
        .close_on_exhaustion(false)
        .start();
    assert_eq!(poll_once(s.next()).await, None);

    let mut tasks = vec![];
    for t in 0..4u32 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..100 {
                handle.push(t * 1000 + i).unwrap();
                if i % 10 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }

    let consumer = tokio::spawn(async move {
        let mut out = vec![];
        while let Some(n) = s.next().await {
            out.push(n);
        }
        out
    });

    for task in tasks {
        task.await.unwrap();
    }
    handle.close().unwrap();

    let out = consumer.await.unwrap();
    assert_eq!(out.len(), 400);
    for t in 0..4 {
        let own: Vec<_> = out.iter().filter(|n| **n / 1000 == t).collect();
        assert!(own.windows(2).all(|w| w[0] < w[1]));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn send_waits_for_room() {
    let (mut s, handle) = vec![stream::pending::<u32>()]
        .bridge()
        .capacity(Capacity::bounded(2).unwrap())
        .close_on_exhaustion(false)
        .start();
    assert_eq!(poll_once(s.next()).await, None);

    let producer = tokio::spawn(async move {
        for n in 0..50 {
            handle.send(n).await.unwrap();
        }
        handle.close().unwrap();
    });

    let mut out = vec![];
    while let Some(n) = s.next().await {
        out.push(n);
        if n % 7 == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
    producer.await.unwrap();
    assert_eq!(out, (0..50).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn parked_send_fails_when_closed() {
    let (mut s, handle) = vec![stream::pending::<u32>()]
        .bridge()
        .capacity(Capacity::bounded(1).unwrap())
        .close_on_exhaustion(false)
        .start();
    assert_eq!(poll_once(s.next()).await, None);
    handle.push(1).unwrap();

    let sender = handle.clone();
    let parked = tokio::spawn(async move { sender.send(2).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!parked.is_finished());

    handle.close().unwrap();
    assert_eq!(parked.await.unwrap(), Err(SendError(2)));
    assert_eq!(s.next().await, Some(1));
    assert_eq!(s.next().await, None);
}

#[test]
fn concurrent_close_has_one_winner() {
    for _ in 0..200 {
        let (count, teardown) = teardown_counter();
        let (mut s, handle) = vec![stream::pending::<u32>()]
            .bridge()
            .on_teardown(teardown)
            .start();
        assert_eq!(block_on(poll_once(s.next())), None);

        let barrier = Arc::new(Barrier::new(4));
        let closers: Vec<_> = (0..4)
            .map(|_| {
                let handle = handle.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    handle.close()
                })
            })
            .collect();
        let results: Vec<_> = closers.into_iter().map(|t| t.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(block_on(s.next()), None);
    }
}

#[test]
fn push_racing_close_delivers_exactly_the_accepted() {
    for _ in 0..20 {
        let (mut s, handle) = vec![stream::pending::<u32>()]
            .bridge()
            .close_on_exhaustion(false)
            .start();
        assert_eq!(block_on(poll_once(s.next())), None);

        let pushers: Vec<_> = (0..4u32)
            .map(|t| {
                let handle = handle.clone();
                thread::spawn(move || {
                    let mut accepted = vec![];
                    for i in 0..500 {
                        match handle.push(t * 1000 + i) {
                            Ok(()) => accepted.push(t * 1000 + i),
                            Err(PushError::AlreadyClosed(_)) => {}
                            Err(err) => panic!("unexpected {err:?}"),
                        }
                    }
                    accepted
                })
            })
            .collect();
        thread::sleep(Duration::from_micros(200));
        handle.close().unwrap();

        let mut accepted: Vec<_> = pushers
            .into_iter()
            .flat_map(|t| t.join().unwrap())
            .collect();
        let mut delivered: Vec<u32> = block_on(s.collect());
        accepted.sort_unstable();
        delivered.sort_unstable();
        assert_eq!(delivered, accepted);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn teardown_finishes_before_the_stream_ends() {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let (mut s, handle) = vec![stream::pending::<u32>()]
        .bridge()
        .close_on_exhaustion(false)
        .on_teardown(move || {
            thread::sleep(Duration::from_millis(100));
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .start();
    assert_eq!(poll_once(s.next()).await, None);
    handle.push(1).unwrap();
    assert_eq!(s.next().await, Some(1));

    let closer = thread::spawn(move || handle.close());
    while s.next().await.is_some() {}
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(closer.join().unwrap(), Ok(()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_from_another_task_ends_a_timed_source() {
    let (count, teardown) = teardown_counter();
    let ticks = stream::unfold(0u32, |n| async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Some((n, n + 1))
    });
    let (mut s, handle) = MergeSource::new(vec![Box::pin(ticks)])
        .on_teardown(teardown)
        .start();

    assert_eq!(s.next().await, Some(0));
    let closer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.close().unwrap();
    });

    let mut last = 0;
    while let Some(n) = s.next().await {
        assert_eq!(n, last + 1);
        last = n;
    }
    assert_eq!(count.load(Ordering::SeqCst), 1);
    closer.await.unwrap();
}
