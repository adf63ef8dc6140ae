use assert_cmd::Command;
use predicates::prelude::*;

fn ctl() -> Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("hddsaver-ctl");
    for var in [
        "HDDSAVER_SIO_ADDR",
        "HDDSAVER_SIMULATE",
        "HDDSAVER_BOARD_VENDOR",
        "HDDSAVER_BOARD_NAME",
        "HDDSAVER_LOG_LEVEL",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn probe_reports_the_emulated_chip() {
    ctl()
        .args(["--simulate", "probe"])
        .assert()
        .success()
        .stdout(predicate::str::contains("chip: nct6791"))
        .stdout(predicate::str::contains("config port: 0x2e"))
        .stdout(predicate::str::contains("hardware monitor: 0x290"))
        .stdout(predicate::str::contains("HDD Saver: present"));
}

#[test]
fn status_starts_off() {
    ctl()
        .args(["--simulate", "status"])
        .assert()
        .success()
        .stdout("Off\n");
}

#[test]
fn set_switches_the_rail_on() {
    ctl()
        .args(["--simulate", "set", "on"])
        .assert()
        .success()
        .stdout("On\n");
}

#[test]
fn suspend_resume_keeps_the_position() {
    ctl()
        .args(["--simulate", "suspend-resume"])
        .assert()
        .success()
        .stdout("Off\n");
}

#[test]
fn malformed_value_is_rejected() {
    ctl()
        .args(["--simulate", "set", "maybe"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid argument"));
}

#[test]
fn unlisted_board_has_no_switch() {
    ctl()
        .args(["--simulate", "--board-name", "Z97 Pro4", "probe"])
        .assert()
        .success()
        .stdout(predicate::str::contains("HDD Saver: absent"));

    ctl()
        .args(["--simulate", "--board-name", "Z97 Pro4", "set", "on"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not known to wire the HDD Saver"));
}

#[test]
fn options_fall_back_to_the_environment() {
    ctl()
        .env("HDDSAVER_SIMULATE", "1")
        .env("HDDSAVER_SIO_ADDR", "0x4e")
        .env("HDDSAVER_BOARD_NAME", "X99 Extreme4/3.1")
        .arg("probe")
        .assert()
        .success()
        .stdout(predicate::str::contains("config port: 0x4e"))
        .stdout(predicate::str::contains("HDD Saver: present"));
}

#[test]
fn bad_port_is_a_usage_error() {
    ctl()
        .args(["--simulate", "--sio-addr", "nowhere", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid port"));
}

#[test]
fn last_port_cannot_hold_an_index_data_pair() {
    ctl()
        .args(["--simulate", "--sio-addr", "0xffff", "status"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("needs two ports"));
}
