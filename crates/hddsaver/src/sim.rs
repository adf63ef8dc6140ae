//! Emulated Nuvoton NCT6791D configuration space.
//!
//! Only the parts of the chip the driver touches are modelled:
//! - the extended-function key (`0x87 0x87` to unlock, `0xAA` to relock);
//! - global registers `0x00..0x30` (device ID, I/O space lock `0x28`, strap `0x2A`);
//! - per logical device registers `0x30..=0xFF` selected through `0x07`.
//!
//! While locked the data port floats high and writes are ignored, like the real part.

use std::sync::{Arc, Mutex, MutexGuard};

use hddsaver_platform::{BoardIdentity, IoPortBus, PortIoDevice, RegionRegistry};

use crate::capability::{
    HDD_SAVER_GPIO_BIT, HDD_SAVER_STRAP_BIT, NCT6791_REG_GPIO1_DATA, NCT6791_REG_GPIO_STRAP,
};
use crate::chip::{
    LD_GPIO_DATA, LD_HWM, NCT6791_HM_IO_SPACE_LOCK_BIT, NCT6791_REG_HM_IO_SPACE_LOCK,
};
use crate::config::DEFAULT_SIO_BASE;
use crate::superio::{
    SIO_ENTER_KEY, SIO_EXIT_KEY, SIO_REG_ADDR, SIO_REG_DEVID, SIO_REG_ENABLE, SIO_REG_LDSEL,
};

const LD_COUNT: usize = 0x20;
const GLOBAL_REGS: usize = 0x30;

/// Silicon revision 3 of the NCT6791D.
pub const SIM_DEVICE_ID: u16 = 0xC803;
pub const SIM_HWM_BASE: u16 = 0x0290;

/// Power-on configuration of the emulated chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nct6791Config {
    pub device_id: u16,
    /// Raw value of the monitor base address registers (`0x60/0x61` in LD `0x0B`).
    pub hwm_base: u16,
    pub hwm_enabled: bool,
    pub io_space_locked: bool,
    pub hdd_saver_strap: bool,
    /// Raw GPIO1 data register (LD 8, `0xF1`). Bit 0 set means the drives are unpowered.
    pub gpio1_data: u8,
}

impl Default for Nct6791Config {
    fn default() -> Self {
        Self {
            device_id: SIM_DEVICE_ID,
            hwm_base: SIM_HWM_BASE,
            hwm_enabled: true,
            io_space_locked: true,
            hdd_saver_strap: true,
            gpio1_data: 1 << HDD_SAVER_GPIO_BIT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Nct6791Model {
    cfg: Nct6791Config,
    unlocked: bool,
    key_pending: bool,
    index: u8,
    ldn: u8,
    global: [u8; GLOBAL_REGS],
    ld_regs: Vec<[u8; 256]>,
}

impl Nct6791Model {
    pub fn new(cfg: Nct6791Config) -> Self {
        let mut model = Self {
            cfg,
            unlocked: false,
            key_pending: false,
            index: 0,
            ldn: 0,
            global: [0; GLOBAL_REGS],
            ld_regs: vec![[0; 256]; LD_COUNT],
        };
        model.power_on();
        model
    }

    fn power_on(&mut self) {
        let cfg = self.cfg;
        self.unlocked = false;
        self.key_pending = false;
        self.index = 0;
        self.ldn = 0;
        self.global = [0; GLOBAL_REGS];
        for regs in self.ld_regs.iter_mut() {
            *regs = [0; 256];
        }

        let [id_hi, id_lo] = cfg.device_id.to_be_bytes();
        self.global[usize::from(SIO_REG_DEVID)] = id_hi;
        self.global[usize::from(SIO_REG_DEVID) + 1] = id_lo;
        if cfg.io_space_locked {
            self.global[usize::from(NCT6791_REG_HM_IO_SPACE_LOCK)] |=
                1 << NCT6791_HM_IO_SPACE_LOCK_BIT;
        }
        if cfg.hdd_saver_strap {
            self.global[usize::from(NCT6791_REG_GPIO_STRAP)] |= 1 << HDD_SAVER_STRAP_BIT;
        }

        let [base_hi, base_lo] = cfg.hwm_base.to_be_bytes();
        let hwm = &mut self.ld_regs[usize::from(LD_HWM)];
        hwm[usize::from(SIO_REG_ADDR)] = base_hi;
        hwm[usize::from(SIO_REG_ADDR) + 1] = base_lo;
        hwm[usize::from(SIO_REG_ENABLE)] = u8::from(cfg.hwm_enabled);

        self.ld_regs[usize::from(LD_GPIO_DATA)][usize::from(NCT6791_REG_GPIO1_DATA)] =
            cfg.gpio1_data;
    }

    pub fn config(&self) -> Nct6791Config {
        self.cfg
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    pub fn global(&self, index: u8) -> u8 {
        self.global[usize::from(index) % GLOBAL_REGS]
    }

    pub fn ld_register(&self, ldn: u8, index: u8) -> u8 {
        self.ld_regs[usize::from(ldn) % LD_COUNT][usize::from(index)]
    }

    pub fn set_ld_register(&mut self, ldn: u8, index: u8, value: u8) {
        self.ld_regs[usize::from(ldn) % LD_COUNT][usize::from(index)] = value;
    }

    pub fn gpio1_data(&self) -> u8 {
        self.ld_register(LD_GPIO_DATA, NCT6791_REG_GPIO1_DATA)
    }

    pub fn set_gpio1_data(&mut self, value: u8) {
        self.set_ld_register(LD_GPIO_DATA, NCT6791_REG_GPIO1_DATA, value);
    }

    /// True when the drives have power (GPIO low).
    pub fn drives_powered(&self) -> bool {
        self.gpio1_data() & (1 << HDD_SAVER_GPIO_BIT) == 0
    }

    fn write_index_port(&mut self, value: u8) {
        if self.unlocked {
            if value == SIO_EXIT_KEY {
                self.unlocked = false;
            } else {
                self.index = value;
            }
            return;
        }

        if value == SIO_ENTER_KEY && self.key_pending {
            self.unlocked = true;
            self.key_pending = false;
        } else {
            self.key_pending = value == SIO_ENTER_KEY;
        }
    }

    fn read_data_port(&self) -> u8 {
        if !self.unlocked {
            return 0xFF;
        }
        match self.index {
            SIO_REG_LDSEL => self.ldn,
            i if usize::from(i) < GLOBAL_REGS => self.global[usize::from(i)],
            i => self.ld_register(self.ldn, i),
        }
    }

    fn write_data_port(&mut self, value: u8) {
        if !self.unlocked {
            return;
        }
        match self.index {
            SIO_REG_LDSEL => self.ldn = value,
            // Device ID is read-only.
            i if i == SIO_REG_DEVID || i == SIO_REG_DEVID + 1 => {}
            i if usize::from(i) < GLOBAL_REGS => self.global[usize::from(i)] = value,
            i => {
                let ldn = self.ldn;
                self.set_ld_register(ldn, i, value);
            }
        }
    }
}

impl Default for Nct6791Model {
    fn default() -> Self {
        Self::new(Nct6791Config::default())
    }
}

/// Shared handle to an emulated chip.
pub type SharedNct6791 = Arc<Mutex<Nct6791Model>>;

/// The chip's index/data pair as one port-mapped device.
pub struct Nct6791Ports {
    chip: SharedNct6791,
    base: u16,
}

impl Nct6791Ports {
    pub fn new(chip: SharedNct6791, base: u16) -> Self {
        Self { chip, base }
    }

    fn chip(&self) -> MutexGuard<'_, Nct6791Model> {
        match self.chip.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl PortIoDevice for Nct6791Ports {
    fn read(&mut self, port: u16) -> u8 {
        if port == self.base {
            // The index port reads back as open bus on this part.
            return 0xFF;
        }
        self.chip().read_data_port()
    }

    fn write(&mut self, port: u16, value: u8) {
        let mut chip = self.chip();
        if port == self.base {
            chip.write_index_port(value);
        } else {
            chip.write_data_port(value);
        }
    }

    fn reset(&mut self) {
        self.chip().power_on();
    }
}

/// An emulated board: chip, port bus, region table and DMI strings.
#[derive(Clone)]
pub struct SimulatedBoard {
    chip: SharedNct6791,
    bus: Arc<IoPortBus>,
    regions: RegionRegistry,
    board: BoardIdentity,
}

impl SimulatedBoard {
    pub fn new(cfg: Nct6791Config, board: BoardIdentity) -> Self {
        Self::at(DEFAULT_SIO_BASE, cfg, board)
    }

    /// Board with the chip strapped to `sio_base`.
    pub fn at(sio_base: u16, cfg: Nct6791Config, board: BoardIdentity) -> Self {
        let chip = Arc::new(Mutex::new(Nct6791Model::new(cfg)));
        let bus = Arc::new(IoPortBus::new());
        bus.register_range(sio_base, 2, Box::new(Nct6791Ports::new(chip.clone(), sio_base)));
        Self {
            chip,
            bus,
            regions: RegionRegistry::new(),
            board,
        }
    }

    /// A board with nothing decoding the configuration ports.
    pub fn empty(board: BoardIdentity) -> Self {
        Self {
            chip: Arc::new(Mutex::new(Nct6791Model::default())),
            bus: Arc::new(IoPortBus::new()),
            regions: RegionRegistry::new(),
            board,
        }
    }

    /// The ASRock Z97 Extreme4 the HDD Saver was built for, drives powered off.
    pub fn z97_extreme4() -> Self {
        Self::new(
            Nct6791Config::default(),
            BoardIdentity::new("ASRock", "Z97 Extreme4"),
        )
    }

    pub fn chip(&self) -> MutexGuard<'_, Nct6791Model> {
        match self.chip.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn bus(&self) -> Arc<IoPortBus> {
        self.bus.clone()
    }

    pub fn regions(&self) -> RegionRegistry {
        self.regions.clone()
    }

    pub fn board(&self) -> &BoardIdentity {
        &self.board
    }

    /// Returns every register to its power-on value, as a lost S3 context would.
    pub fn power_cycle(&self) {
        self.bus.reset();
    }
}
