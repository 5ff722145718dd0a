// tests/concurrency.rs

//! Multi-threaded tests of the pipeline.
//!
//! These tests verify that:
//! 1. Concurrent producers and adapter churn lose no source
//! 2. Commands from one producer are applied in that producer's order
//! 3. An adapter registered while a transformation executes is not missed

mod common;

use common::{
    EVENT_TIMEOUT, RecordingSink, bare_config, next_event, props_stream_adapter,
    props_stream_metadata, stream,
};
use conflux::adapter::spec::SourceIs;
use conflux::{
    Adapter, CommandOutcome, Identity, Pipeline, PropertySet, SourceObject, SpecAdapter,
    TransformationEvent,
};
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const PRODUCERS: usize = 4;
const PER_PRODUCER: usize = 25;
const UNADAPTABLE: usize = 10;

fn u16_adapter() -> Arc<dyn Adapter> {
    SpecAdapter::shared("u16", SourceIs::<u16>::new(), |source| {
        let value = source.downcast_ref::<u16>()?;
        Some(Arc::new(PropertySet::new().with("value", *value)) as SourceObject)
    })
}

/// Wait until the pipeline is idle with `parked` transformations left over
async fn settle(pipeline: &Pipeline, parked: usize) {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            if pipeline.wait_idle(Duration::from_millis(100)).await
                && pipeline.transformations().failed_len() == parked
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("pipeline did not settle");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_and_adapter_churn() {
    let sink = RecordingSink::new();
    let pipeline = Arc::new(Pipeline::new(bare_config()));
    pipeline.register_adapter(props_stream_adapter());
    pipeline.set_sink(Some(sink.shared()));
    let mut results = pipeline.commands().subscribe();
    pipeline.start().unwrap();

    let mut tasks = Vec::new();
    for producer in 0..PRODUCERS {
        let pipeline = Arc::clone(&pipeline);
        tasks.push(tokio::spawn(async move {
            for n in 0..PER_PRODUCER {
                let content = format!("n={}", n);
                pipeline.update(
                    Identity::pid(format!("p{}-{}", producer, n)).unwrap(),
                    stream(content.as_bytes()),
                    props_stream_metadata(),
                );
                tokio::task::yield_now().await;
            }
        }));
    }

    // Sources no adapter ever accepts
    let parked = Arc::clone(&pipeline);
    tasks.push(tokio::spawn(async move {
        for n in 0..UNADAPTABLE {
            let identity = Identity::pid(format!("orphan-{}", n)).unwrap();
            parked.update(identity, Arc::new(n as u64), PropertySet::new());
            tokio::task::yield_now().await;
        }
    }));

    // Adapters coming and going, each registration triggering a retry
    let churn = Arc::clone(&pipeline);
    tasks.push(tokio::spawn(async move {
        for _ in 0..50 {
            let handle = churn.register_adapter(u16_adapter());
            tokio::task::yield_now().await;
            assert!(churn.unregister_adapter(&handle));
        }
    }));

    let retrier = Arc::clone(&pipeline);
    tasks.push(tokio::spawn(async move {
        for _ in 0..50 {
            retrier.retry_failed();
            tokio::task::yield_now().await;
        }
    }));

    for task in tasks {
        task.await.unwrap();
    }
    settle(&pipeline, UNADAPTABLE).await;

    let store = sink.store();
    assert_eq!(store.len(), PRODUCERS * PER_PRODUCER);
    assert_eq!(pipeline.transformations().metrics().succeeded, (PRODUCERS * PER_PRODUCER) as u64);

    let mut applied: Vec<String> = Vec::new();
    while let Ok(event) = results.try_recv() {
        assert_eq!(event.result, Ok(CommandOutcome::Applied));
        applied.push(event.command);
    }
    assert_eq!(applied.len(), PRODUCERS * PER_PRODUCER);

    for producer in 0..PRODUCERS {
        let prefix = format!("update p{}-", producer);
        let order: Vec<usize> = applied
            .iter()
            .filter_map(|c| c.strip_prefix(&prefix))
            .map(|n| n.parse().unwrap())
            .collect();
        assert_eq!(order, (0..PER_PRODUCER).collect::<Vec<_>>());
    }

    pipeline.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_registration_during_execution_is_not_missed() {
    let sink = RecordingSink::new();
    let pipeline = Pipeline::new(bare_config());
    pipeline.set_sink(Some(sink.shared()));
    let mut transformations = pipeline.transformations().subscribe();
    pipeline.start().unwrap();

    // Slow specification that never matches
    let slow = AtomicBool::new(true);
    pipeline.register_adapter(SpecAdapter::shared(
        "slow",
        move |_: &PropertySet, _: &(dyn Any + Send + Sync)| {
            if slow.swap(false, Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(100));
            }
            false
        },
        |_| None,
    ));

    pipeline.update(Identity::pid("late").unwrap(), Arc::new(5u16), PropertySet::new());
    tokio::time::sleep(Duration::from_millis(30)).await;
    pipeline.register_adapter(u16_adapter());

    loop {
        match next_event(&mut transformations).await {
            TransformationEvent::Transformed { identity } => {
                assert_eq!(identity, Identity::pid("late").unwrap());
                break;
            }
            TransformationEvent::Parked { .. } | TransformationEvent::Rescheduled { .. } => {}
            other => panic!("unexpected event {:?}", other),
        }
    }

    assert!(pipeline.wait_idle(EVENT_TIMEOUT).await);
    assert_eq!(pipeline.transformations().failed_len(), 0);
    let stored = sink.store().get("late").unwrap().properties.unwrap();
    assert_eq!(stored.get("value"), Some(&serde_json::json!(5)));

    pipeline.stop().await;
}
