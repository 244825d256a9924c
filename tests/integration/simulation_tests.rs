//! Sensor → topic → consumer pipelines on the simulated backend.

use std::sync::Arc;

use corelink::ports::{Configure, DigitalOutput, Enable, WriteValue, publish_reading};
use corelink::sync::Mutex;
use corelink::{Context, FrameworkConfig};

use crate::mock_peripheral::{AdcConfig, MockAdc, RecordingPin};

const ADC_TOPIC: u16 = 20;

type Trace = Arc<Mutex<Vec<(u64, u16)>>>;

/// A 5 ms sensor server feeding an event-driven consumer. Returns what the
/// consumer saw, stamped with simulated time.
fn run_pipeline(ms: u64) -> Trace {
    let ctx = Context::simulated(FrameworkConfig::default()).unwrap();
    let scheduler = ctx.scheduler().unwrap().clone();
    let topic = ctx.topics().topic::<u16>(ADC_TOPIC).unwrap();

    let mut adc = MockAdc::new(&[100, 200, 300]);
    adc.configure(&AdcConfig { gain: 2 }).unwrap();
    adc.enable().unwrap();
    let server = ctx
        .spawn("adc_server", 5, move || {
            let _ = publish_reading(&mut adc, &topic);
        })
        .unwrap();

    let trace: Trace = Arc::default();
    let consumer = ctx.spawn("consumer", 0, || {}).unwrap();
    let sink = Arc::clone(&trace);
    let clock = scheduler.clone();
    ctx.topics()
        .subscribe(ADC_TOPIC, &consumer, move |v: u16| sink.lock().push((clock.now_ms(), v)))
        .unwrap();

    server.enable();
    consumer.enable();
    scheduler.run_for_ms(ms).unwrap();
    trace
}

#[test]
fn samples_reach_the_consumer_in_the_same_step() {
    let trace = run_pipeline(20);
    assert_eq!(
        trace.lock().as_slice(),
        &[(5, 200), (10, 400), (15, 600), (20, 200)]
    );
}

#[test]
fn identical_runs_produce_identical_traces() {
    let first = run_pipeline(37);
    let second = run_pipeline(37);
    assert_eq!(*first.lock(), *second.lock());
    assert_eq!(first.lock().len(), 7);
}

#[test]
fn actuator_thread_toggles_on_schedule() {
    let ctx = Context::simulated(FrameworkConfig::default()).unwrap();
    let pin = RecordingPin::default();
    let mut output = DigitalOutput::new(pin.clone());
    output.enable().unwrap();

    let mut on = false;
    let blinker = ctx
        .spawn("blink", 10, move || {
            on = !on;
            let _ = output.write(on);
        })
        .unwrap();
    blinker.enable();

    let scheduler = ctx.scheduler().unwrap();
    scheduler.run(25).unwrap();
    assert_eq!(pin.levels.lock().as_slice(), &[false, true, false]);

    scheduler.run(15).unwrap();
    assert_eq!(pin.levels.lock().as_slice(), &[false, true, false, true, false]);
}

#[test]
fn disabled_server_publishes_nothing() {
    let ctx = Context::simulated(FrameworkConfig::default()).unwrap();
    let topic = ctx.topics().topic::<u16>(ADC_TOPIC).unwrap();
    let rx = topic.subscribe_receiver();

    let mut adc = MockAdc::new(&[1]);
    adc.enable().unwrap();
    let publisher = Arc::clone(&topic);
    let server = ctx
        .spawn("idle_server", 1, move || {
            let _ = publish_reading(&mut adc, &publisher);
        })
        .unwrap();

    let scheduler = ctx.scheduler().unwrap();
    scheduler.run(5).unwrap();
    assert_eq!(rx.pending(), 0);

    server.enable();
    scheduler.run(5).unwrap();
    assert_eq!(rx.pending(), 5);
    assert_eq!(topic.published(), 5);
}
