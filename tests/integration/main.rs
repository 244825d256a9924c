//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises one subsystem against
//! mock transports and peripherals. All tests run on the host (x86_64)
//! with no real hardware required.

mod mock_peripheral;
mod mock_transport;
mod protocol_tests;
mod pubsub_tests;
mod service_tests;
mod simulation_tests;
