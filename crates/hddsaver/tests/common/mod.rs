//! Shared helpers for `hddsaver` integration tests.
//!
//! Every rig runs the real driver against the emulated NCT6791 with a recording bus in front of
//! it, so tests can assert on both chip state and the exact port traffic.

#![allow(dead_code)]

use std::sync::Arc;

use hddsaver::sim::{Nct6791Config, SimulatedBoard};
use hddsaver::{DriverConfig, HddSaverDevice, HddSaverDriver};
use hddsaver_platform::{BoardIdentity, IoPortBus, ManualClock, PortAccess, RecordingPortBus};

pub type Recorder = RecordingPortBus<Arc<IoPortBus>>;

pub struct Rig {
    pub sim: SimulatedBoard,
    pub bus: Arc<Recorder>,
    pub clock: Arc<ManualClock>,
    pub driver: HddSaverDriver,
}

impl Rig {
    pub fn new(sim: SimulatedBoard, config: DriverConfig) -> Self {
        let bus = Arc::new(RecordingPortBus::new(sim.bus()));
        let clock = Arc::new(ManualClock::new());
        let driver = HddSaverDriver::new(config, bus.clone(), sim.regions(), clock.clone());
        Self {
            sim,
            bus,
            clock,
            driver,
        }
    }

    pub fn register(&self) -> hddsaver::Result<HddSaverDevice> {
        self.driver.register(self.sim.board())
    }
}

pub fn z97_rig() -> Rig {
    Rig::new(SimulatedBoard::z97_extreme4(), DriverConfig::default())
}

pub fn rig_with(cfg: Nct6791Config) -> Rig {
    Rig::new(
        SimulatedBoard::new(cfg, BoardIdentity::new("ASRock", "Z97 Extreme4")),
        DriverConfig::default(),
    )
}

pub fn rig_on_board(vendor: &str, name: &str) -> Rig {
    Rig::new(
        SimulatedBoard::new(Nct6791Config::default(), BoardIdentity::new(vendor, name)),
        DriverConfig::default(),
    )
}

/// Port traffic of an enter/exit pair with nothing in between.
pub fn empty_session(base: u16) -> Vec<PortAccess> {
    vec![
        PortAccess::Write { port: base, value: 0x87 },
        PortAccess::Write { port: base, value: 0x87 },
        PortAccess::Write { port: base, value: 0xAA },
        PortAccess::Write { port: base, value: 0x02 },
        PortAccess::Write { port: base + 1, value: 0x02 },
    ]
}
