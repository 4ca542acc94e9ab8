//! Shared fixtures for the driver integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Instant;

use ctr_driver::bus::sim::SimulatedBus;
use ctr_driver::{ClientId, Driver, DriverConfig, Endian, Platform, RegisterBus, UserArg, VirtualPlatform};

/// Wall-clock platform for tests that block in one thread and act in another.
pub struct HostPlatform {
    start: Instant,
}

impl HostPlatform {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Platform for HostPlatform {
    fn ticks(&self) -> u64 {
        (self.start.elapsed().as_millis() / 10) as u64
    }

    fn relax(&self) {
        std::thread::yield_now();
    }
}

pub fn sims(n: usize) -> (Vec<Arc<SimulatedBus>>, Vec<Arc<dyn RegisterBus>>) {
    let sims: Vec<_> = (0..n).map(|_| Arc::new(SimulatedBus::new(Endian::Little))).collect();
    let buses = sims.iter().map(|s| s.clone() as Arc<dyn RegisterBus>).collect();
    (sims, buses)
}

pub fn virtual_driver(n: usize) -> (Vec<Arc<SimulatedBus>>, Driver<VirtualPlatform>) {
    let (sims, buses) = sims(n);
    let driver = Driver::install(DriverConfig::default(), VirtualPlatform::new(), buses).expect("install");
    (sims, driver)
}

pub fn host_driver(n: usize) -> (Vec<Arc<SimulatedBus>>, Arc<Driver<HostPlatform>>) {
    let (sims, buses) = sims(n);
    let driver = Driver::install(DriverConfig::default(), HostPlatform::new(), buses).expect("install");
    (sims, Arc::new(driver))
}

/// Linear congruential generator, same constants as the fuzz mutator.
pub struct Lcg(pub u64);

impl Lcg {
    pub fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1);
        self.0 >> 33
    }

    pub fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

/// Run a scalar-argument ioctl and return the first word of the reply.
pub fn ioctl_word<P: Platform>(driver: &Driver<P>, id: ClientId, cmd: u32, value: u32) -> u32 {
    let mut buf = value.to_le_bytes();
    driver
        .ioctl(id, cmd, Some(&mut UserArg::read_write(&mut buf)))
        .expect("ioctl");
    u32::from_le_bytes(buf)
}
