//! Service calls across threads and registries.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use corelink::messaging::service::ServiceRegistry;
use corelink::{Context, Error, FrameworkConfig};

const SCALE: u16 = 1;
const CALIBRATE: u16 = 2;
const STATUS_TOPIC: u16 = 40;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Reading {
    raw: u16,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Scaled {
    millivolts: u32,
}

#[test]
fn clients_on_many_threads_share_one_handler() {
    let services = ServiceRegistry::new();
    services
        .register(SCALE, |r: &Reading| Scaled {
            millivolts: u32::from(r.raw) * 3300 / 4095,
        })
        .unwrap();

    let workers: Vec<_> = (0..4u16)
        .map(|i| {
            let client = services.client::<Reading, Scaled>(SCALE);
            std::thread::spawn(move || {
                (0..25)
                    .map(|_| client.call(&Reading { raw: 4095 - i }).unwrap())
                    .last()
            })
        })
        .collect();
    for w in workers {
        assert!(w.join().unwrap().is_some());
    }

    let service = services.service::<Reading, Scaled>(SCALE).unwrap();
    assert_eq!(service.calls(), 100);
    assert_eq!(service.call(&Reading { raw: 4095 }), Scaled { millivolts: 3300 });
}

#[test]
fn client_becomes_available_on_registration() {
    let services = ServiceRegistry::new();
    let client = services.client::<Reading, Scaled>(SCALE);
    assert!(!client.is_available());
    assert_eq!(client.call(&Reading { raw: 0 }), Err(Error::NotFound(SCALE)));

    services
        .register(SCALE, |_: &Reading| Scaled { millivolts: 0 })
        .unwrap();
    assert!(client.is_available());
    assert!(client.call(&Reading { raw: 0 }).is_ok());
}

#[test]
fn ids_are_unique_and_typed() {
    let services = ServiceRegistry::new();
    services.register(SCALE, |x: &u32| x + 1).unwrap();
    assert_eq!(
        services.register(SCALE, |x: &u32| x + 2),
        Err(Error::AlreadyRegistered(SCALE))
    );
    assert_eq!(services.call::<u32, u32>(SCALE, &1), Ok(2));
    assert_eq!(
        services.call::<u8, u8>(SCALE, &1).map(|_| ()),
        Err(Error::TypeMismatch(SCALE))
    );
    assert_eq!(services.len(), 1);
}

#[test]
fn handler_may_call_another_service() {
    let services = ServiceRegistry::new();
    services.register(SCALE, |x: &u32| x * 2).unwrap();

    let inner = services.client::<u32, u32>(SCALE);
    services
        .register(CALIBRATE, move |x: &u32| inner.call(x).map(|y| y + 1).unwrap_or(0))
        .unwrap();

    assert_eq!(services.call::<u32, u32>(CALIBRATE, &20), Ok(41));
}

#[test]
fn handler_publishes_through_the_context() {
    let ctx = Context::native(FrameworkConfig::default()).unwrap();
    let status = ctx.topics().subscribe_receiver::<u32>(STATUS_TOPIC).unwrap();
    let topic = ctx.topics().topic::<u32>(STATUS_TOPIC).unwrap();
    let hits = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&hits);
    ctx.services()
        .register(CALIBRATE, move |x: &u32| {
            counter.fetch_add(1, Ordering::Relaxed);
            topic.publish(*x);
            *x
        })
        .unwrap();

    assert_eq!(ctx.services().call::<u32, u32>(CALIBRATE, &5), Ok(5));
    assert_eq!(status.try_recv(), Some(5));
    assert_eq!(hits.load(Ordering::Relaxed), 1);
}
