//! Topic delivery across native framework threads.

use std::sync::Arc;
use std::time::{Duration, Instant};

use corelink::sync::Mutex;
use corelink::{Context, Error, FrameworkConfig};

const TEMPERATURE: u16 = 10;

type Log = Arc<Mutex<Vec<(i32, Option<String>)>>>;

fn wait_for(log: &Log, count: usize) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if log.lock().len() >= count {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}

fn context() -> Context {
    Context::native(FrameworkConfig::default()).unwrap()
}

#[test]
fn callbacks_run_on_the_subscribing_thread_in_order() {
    let ctx = context();
    let log: Log = Arc::default();
    let consumer = ctx.spawn("consumer", 0, || {}).unwrap();

    let sink = Arc::clone(&log);
    let sub = ctx
        .topics()
        .subscribe(TEMPERATURE, &consumer, move |celsius: i32| {
            let name = std::thread::current().name().map(String::from);
            sink.lock().push((celsius, name));
        })
        .unwrap();
    consumer.enable();

    for celsius in [21, 22, 23, 24, 25] {
        assert_eq!(ctx.topics().publish(TEMPERATURE, celsius), Ok(1));
    }

    assert!(wait_for(&log, 5), "deliveries did not arrive");
    let log = log.lock();
    let values: Vec<i32> = log.iter().map(|(v, _)| *v).collect();
    assert_eq!(values, [21, 22, 23, 24, 25]);
    assert!(log.iter().all(|(_, name)| name.as_deref() == Some("consumer")));
    assert_eq!(sub.delivered(), 5);
    assert_eq!(sub.thread_id(), consumer.id());
}

#[test]
fn suspended_thread_holds_samples_until_enabled() {
    let ctx = context();
    let log: Log = Arc::default();
    let consumer = ctx.spawn("late", 0, || {}).unwrap();

    let sink = Arc::clone(&log);
    ctx.topics()
        .subscribe(TEMPERATURE, &consumer, move |v: i32| sink.lock().push((v, None)))
        .unwrap();

    for v in 0..3 {
        ctx.topics().publish(TEMPERATURE, v).unwrap();
    }
    std::thread::sleep(Duration::from_millis(30));
    assert!(log.lock().is_empty());

    consumer.enable();
    assert!(wait_for(&log, 3));
    assert_eq!(log.lock().len(), 3);
}

#[test]
fn each_subscriber_gets_its_own_copy() {
    let ctx = context();
    let first: Log = Arc::default();
    let second: Log = Arc::default();
    let a = ctx.spawn("a", 0, || {}).unwrap();
    let b = ctx.spawn("b", 0, || {}).unwrap();

    for (thread, log) in [(&a, &first), (&b, &second)] {
        let sink = Arc::clone(log);
        ctx.topics()
            .subscribe(TEMPERATURE, thread, move |v: i32| sink.lock().push((v, None)))
            .unwrap();
        thread.enable();
    }

    assert_eq!(ctx.topics().publish(TEMPERATURE, 7), Ok(2));
    assert!(wait_for(&first, 1));
    assert!(wait_for(&second, 1));
    assert_eq!(first.lock()[0].0, 7);
    assert_eq!(second.lock()[0].0, 7);
}

#[test]
fn stopped_thread_stops_receiving() {
    let ctx = context();
    let consumer = ctx.spawn("gone", 0, || {}).unwrap();
    ctx.topics()
        .subscribe(TEMPERATURE, &consumer, |_: i32| {})
        .unwrap();
    let topic = ctx.topics().topic::<i32>(TEMPERATURE).unwrap();
    assert_eq!(topic.subscriber_count(), 1);

    consumer.stop();
    assert_eq!(topic.publish(1), 0);
    assert_eq!(topic.subscriber_count(), 0);
}

#[test]
fn topic_type_is_fixed_by_first_use() {
    let ctx = context();
    ctx.topics().topic::<i32>(TEMPERATURE).unwrap();
    assert_eq!(
        ctx.topics().publish(TEMPERATURE, 1.5f32),
        Err(Error::TypeMismatch(TEMPERATURE))
    );
}
