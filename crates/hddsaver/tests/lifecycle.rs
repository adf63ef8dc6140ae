mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{empty_session, rig_on_board, rig_with, z97_rig, Rig};
use hddsaver::chip::{LD_GPIO_DATA, LD_HWM};
use hddsaver::config::ALT_SIO_BASE;
use hddsaver::sim::{Nct6791Config, SimulatedBoard};
use hddsaver::{ChipKind, DriverConfig, HddSaverError};
use hddsaver_platform::BoardIdentity;
use pretty_assertions::assert_eq;

#[test]
fn binds_on_an_allow_listed_board() {
    let rig = z97_rig();
    let device = rig.register().unwrap();

    assert!(device.has_hdd_saver());
    assert_eq!(device.identity().kind, ChipKind::Nct6791);
    assert_eq!(device.identity().sio_base, 0x2E);
    assert_eq!(device.identity().hwm_base, 0x0290);

    // Power-on GPIO is high: drives unpowered.
    assert_eq!(device.show_status(), "Off\n");

    // Chip relocked, config ports free, monitor ports held for the device lifetime.
    assert!(!rig.sim.chip().is_unlocked());
    assert!(!rig.sim.regions().is_claimed(0x2E, 2));
    assert!(rig.sim.regions().is_claimed(0x295, 2));
}

#[test]
fn every_listed_model_is_capable() {
    for model in ["Z97 Extreme4", "Z97 Extreme6", "X99 Extreme4/3.1"] {
        let rig = rig_on_board("ASRock", model);
        assert!(rig.register().unwrap().has_hdd_saver(), "{model}");
    }
}

#[test]
fn unlisted_board_binds_without_the_switch() {
    for (vendor, name) in [
        ("ASRock", "Z97 Pro4"),
        ("ASRock", "z97 extreme4"),
        ("ASUSTeK COMPUTER INC.", "Z97 Extreme4"),
    ] {
        let rig = rig_on_board(vendor, name);
        let device = rig.register().unwrap();
        assert!(!device.has_hdd_saver(), "{vendor}/{name}");
        assert_eq!(device.show_status(), "Off\n");
    }

    let rig = Rig::new(
        SimulatedBoard::new(Nct6791Config::default(), BoardIdentity::unknown()),
        DriverConfig::default(),
    );
    assert!(!rig.register().unwrap().has_hdd_saver());
}

#[test]
fn unstrapped_chip_is_not_capable() {
    let rig = rig_with(Nct6791Config {
        hdd_saver_strap: false,
        ..Nct6791Config::default()
    });
    assert!(!rig.register().unwrap().has_hdd_saver());
}

#[test]
fn reading_an_incapable_device_still_refreshes_the_cache() {
    let rig = rig_on_board("ASRock", "Z97 Pro4");
    let device = rig.register().unwrap();
    rig.clock.advance(Duration::from_secs(3));

    assert!(!device.status());
    let state = device.power().snapshot();
    assert!(state.is_valid());
    assert_eq!(state.last_updated(), Some(Duration::from_secs(3)));
}

#[test]
fn failed_registration_error_is_printable() {
    let rig = rig_with(Nct6791Config {
        device_id: 0xD428,
        ..Nct6791Config::default()
    });
    let err = rig.register().unwrap_err();
    assert!(matches!(err, HddSaverError::DeviceNotFound), "{err}");

    let device = z97_rig().register().unwrap();
    let shown = format!("{device:?}");
    assert!(shown.contains("Nct6791"), "{shown}");
    assert!(shown.contains("0x0290"), "{shown}");
}

#[test]
fn writes_to_an_incapable_device_are_rejected_untouched() {
    let rig = rig_on_board("ASRock", "Z97 Pro4");
    let device = rig.register().unwrap();
    rig.bus.clear();

    let err = device.store_status("on").unwrap_err();
    assert!(matches!(err, HddSaverError::UnsupportedPlatform), "{err}");
    assert!(err.is_absence());
    assert_eq!(rig.bus.write_count(), 0);
    assert!(!rig.sim.chip().drives_powered());
}

#[test]
fn status_round_trips_through_the_gpio() {
    let rig = z97_rig();
    let device = rig.register().unwrap();

    device.set_status(true).unwrap();
    assert!(device.status());
    assert_eq!(device.show_status(), "On\n");
    assert!(rig.sim.chip().drives_powered());

    assert_eq!(device.store_status("off\n").unwrap(), 4);
    assert!(!device.status());
    assert!(!rig.sim.chip().drives_powered());

    // Other GPIO1 pins are left alone.
    rig.sim.chip().set_gpio1_data(0xF1);
    device.set_status(true).unwrap();
    assert_eq!(rig.sim.chip().gpio1_data(), 0xF0);
}

#[test]
fn repeating_a_write_touches_only_the_key_sequence() {
    let rig = z97_rig();
    let device = rig.register().unwrap();

    device.set_status(false).unwrap();
    rig.bus.clear();
    device.set_status(false).unwrap();

    assert_eq!(rig.bus.indexed_writes(0x2E, 0xF1), 0);
    assert_eq!(rig.bus.accesses(), empty_session(0x2E));
}

#[test]
fn malformed_writes_touch_no_hardware() {
    let rig = z97_rig();
    let device = rig.register().unwrap();
    rig.bus.clear();

    for input in ["", "maybe", "2", "o"] {
        let err = device.store_status(input).unwrap_err();
        assert!(matches!(err, HddSaverError::InvalidArgument(_)), "{input:?}: {err}");
    }
    assert!(rig.bus.accesses().is_empty());
}

#[test]
fn reading_status_never_touches_hardware() {
    let rig = z97_rig();
    let device = rig.register().unwrap();
    rig.bus.clear();

    // Hardware changes behind the driver's back are not observed by reads.
    rig.sim.chip().set_gpio1_data(0x00);
    assert!(!device.status());
    assert!(rig.bus.accesses().is_empty());
}

#[test]
fn status_cache_refreshes_after_the_window() {
    let rig = z97_rig();
    let device = rig.register().unwrap();
    rig.clock.advance(Duration::from_secs(10));

    device.status();
    let first = device.power().snapshot();
    assert!(first.is_valid());
    assert_eq!(first.last_updated(), Some(Duration::from_secs(10)));

    rig.clock.advance(Duration::from_millis(1500));
    device.status();
    assert_eq!(device.power().snapshot().last_updated(), first.last_updated());

    rig.clock.advance(Duration::from_millis(1));
    device.status();
    assert_eq!(
        device.power().snapshot().last_updated(),
        Some(Duration::from_millis(11_501))
    );
}

#[test]
fn concurrent_writers_leave_cache_and_hardware_in_agreement() {
    let rig = z97_rig();
    let device = Arc::new(rig.register().unwrap());

    let workers: Vec<_> = (0..8)
        .map(|i| {
            let device = device.clone();
            thread::spawn(move || {
                for n in 0..50 {
                    device.set_status((i + n) % 3 == 0).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(device.status(), rig.sim.chip().drives_powered());
    assert!(!rig.sim.chip().is_unlocked());
    assert!(!rig.sim.regions().is_claimed(0x2E, 2));
}

#[test]
fn missing_chip_is_not_found() {
    let rig = Rig::new(
        SimulatedBoard::empty(BoardIdentity::new("ASRock", "Z97 Extreme4")),
        DriverConfig::default(),
    );
    let err = rig.register().unwrap_err();
    assert!(matches!(err, HddSaverError::DeviceNotFound), "{err}");
    assert!(err.is_absence());
    assert!(!rig.sim.regions().is_claimed(0x2E, 2));
}

#[test]
fn other_chips_are_not_found() {
    for device_id in [0xD428, 0xC560, 0xC810] {
        let rig = rig_with(Nct6791Config {
            device_id,
            ..Nct6791Config::default()
        });
        let err = rig.register().unwrap_err();
        assert!(matches!(err, HddSaverError::DeviceNotFound), "{device_id:#06x}: {err}");
    }
}

#[test]
fn any_silicon_revision_is_accepted() {
    let rig = rig_with(Nct6791Config {
        device_id: 0xC807,
        ..Nct6791Config::default()
    });
    rig.register().unwrap();
}

#[test]
fn zero_monitor_base_is_not_found() {
    for hwm_base in [0x0000, 0x0005] {
        let rig = rig_with(Nct6791Config {
            hwm_base,
            ..Nct6791Config::default()
        });
        let err = rig.register().unwrap_err();
        assert!(matches!(err, HddSaverError::DeviceNotFound), "{hwm_base:#06x}: {err}");
    }
}

#[test]
fn monitor_base_is_aligned_down() {
    let rig = rig_with(Nct6791Config {
        hwm_base: 0x0A07,
        ..Nct6791Config::default()
    });
    let device = rig.register().unwrap();
    assert_eq!(device.identity().hwm_base, 0x0A00);
    assert!(rig.sim.regions().is_claimed(0x0A05, 2));
}

#[test]
fn disabled_monitor_is_forced_on() {
    let rig = rig_with(Nct6791Config {
        hwm_enabled: false,
        ..Nct6791Config::default()
    });
    let device = rig.register().unwrap();

    assert_eq!(rig.sim.chip().ld_register(LD_HWM, 0x30) & 1, 1);
    assert_eq!(device.power().snapshot().sio_enable_shadow() & 1, 1);
}

#[test]
fn io_space_lock_is_cleared_once() {
    let rig = z97_rig();
    rig.register().unwrap();
    assert_eq!(rig.sim.chip().global(0x28) & 0x10, 0);

    let rig = rig_with(Nct6791Config {
        io_space_locked: false,
        ..Nct6791Config::default()
    });
    rig.register().unwrap();
    assert_eq!(rig.bus.indexed_writes(0x2E, 0x28), 0);
}

#[test]
fn probe_gives_up_after_bounded_retries_while_busy() {
    let rig = z97_rig();
    let _monitor = rig.sim.regions().try_claim(0x2E, 2, "nct6775").unwrap();

    let err = rig.register().unwrap_err();
    assert!(matches!(err, HddSaverError::DeviceBusy { port: 0x2E }), "{err}");
    assert_eq!(rig.clock.sleeps(), vec![Duration::from_millis(100); 4]);
    // Never touched the chip.
    assert_eq!(rig.bus.write_count(), 0);
}

#[test]
fn probe_retries_busy_monitor_ports() {
    let rig = z97_rig();
    let _monitor = rig.sim.regions().try_claim(0x0290, 8, "nct6775").unwrap();

    let err = rig.register().unwrap_err();
    assert!(matches!(err, HddSaverError::DeviceBusy { port: 0x295 }), "{err}");
    assert_eq!(rig.clock.sleeps().len(), 4);
}

#[test]
fn runtime_writes_fail_fast_while_busy() {
    let rig = z97_rig();
    let device = rig.register().unwrap();
    let _monitor = rig.sim.regions().try_claim(0x2E, 2, "nct6775").unwrap();

    let err = device.set_status(true).unwrap_err();
    assert!(matches!(err, HddSaverError::DeviceBusy { port: 0x2E }), "{err}");
    assert!(rig.clock.sleeps().is_empty());
    assert!(!device.status());
    assert!(!rig.sim.chip().drives_powered());
}

#[test]
fn firmware_reserved_monitor_ports_are_a_conflict() {
    let rig = z97_rig();
    rig.sim.regions().reserve(0x0290, 0x10, "ACPI PM").unwrap();

    let err = rig.register().unwrap_err();
    match &err {
        HddSaverError::ResourceConflict { start, len, owner } => {
            assert_eq!((*start, *len, owner.as_str()), (0x295, 2, "ACPI PM"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_absence());
    assert!(!rig.sim.regions().is_claimed(0x295, 2));
}

#[test]
fn full_region_table_is_exhaustion() {
    let sim = SimulatedBoard::z97_extreme4();
    let rig = Rig::new(sim, DriverConfig::default());
    let mut held = Vec::new();
    let mut port = 0x1000;
    while let Ok(guard) = rig.sim.regions().try_claim(port, 1, "filler") {
        held.push(guard);
        port += 1;
    }

    let err = rig.register().unwrap_err();
    assert!(matches!(err, HddSaverError::ResourceExhausted(_)), "{err}");
    assert!(!err.is_absence());
}

#[test]
fn remove_releases_the_monitor_ports() {
    let rig = z97_rig();
    let device = rig.register().unwrap();
    device.set_status(true).unwrap();
    device.remove();
    assert!(!rig.sim.regions().is_claimed(0x295, 2));

    // Rebinding reads the switch back from the chip.
    let device = rig.register().unwrap();
    assert!(device.status());
}

#[test]
fn chip_strapped_to_the_alternate_port() {
    let sim = SimulatedBoard::at(
        ALT_SIO_BASE,
        Nct6791Config::default(),
        BoardIdentity::new("ASRock", "X99 Extreme4/3.1"),
    );
    let rig = Rig::new(sim, DriverConfig::default().with_sio_base(ALT_SIO_BASE));
    let device = rig.register().unwrap();
    assert_eq!(device.identity().sio_base, 0x4E);

    device.set_status(true).unwrap();
    assert_eq!(rig.sim.chip().ld_register(LD_GPIO_DATA, 0xF1) & 1, 0);
}
