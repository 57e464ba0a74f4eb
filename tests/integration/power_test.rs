use std::sync::{Arc, Mutex};
use std::time::Duration;

use railbench::core::device::{Device, OsClass, PowerChannel, PowerState, UsbDescriptor};
use railbench::core::power::{PowerController, PowerSequencer, PowerTimings};
use railbench::core::recharge::RechargeThreshold;
use railbench::error::{Result, RigError};
use railbench::hw::{HubPort, PortState, RailSwitch, SampleBlock, Supply, SupplySession};

type ActionLog = Arc<Mutex<Vec<String>>>;

fn actions(log: &ActionLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn test_device() -> Device {
    Device {
        name: "pixel".to_string(),
        os: OsClass::Android,
        usb: UsbDescriptor {
            id: "18d1:4ee7".to_string(),
            ykush_serial: "YK00001".to_string(),
            ykush_port: 1,
        },
        channel: PowerChannel {
            gpio_pin: 17,
            voltage: 4.2,
        },
        bt_mac_address: None,
        adb_identifier: Some("ABC123".to_string()),
        ip: None,
        pin_code: None,
    }
}

fn fast_timings() -> PowerTimings {
    PowerTimings {
        availability_timeout: Duration::from_millis(10),
        mux_settle: Duration::ZERO,
        post_enumeration_settle: Duration::ZERO,
    }
}

struct FakeRail {
    log: ActionLog,
    channel_on: bool,
    other_channel_on: bool,
}

impl RailSwitch for FakeRail {
    fn switch_to(&mut self, _channel: &PowerChannel) -> Result<()> {
        self.log.lock().unwrap().push("rail.switch_to".to_string());
        self.channel_on = true;
        Ok(())
    }

    fn switch_off(&mut self, _channel: &PowerChannel) -> Result<()> {
        self.log.lock().unwrap().push("rail.switch_off".to_string());
        self.channel_on = false;
        Ok(())
    }

    fn read_state(&mut self, _channel: &PowerChannel) -> Result<PowerState> {
        Ok(if self.channel_on {
            PowerState::On
        } else {
            PowerState::Off
        })
    }

    fn all_channels_off(&mut self) -> Result<bool> {
        Ok(!self.channel_on && !self.other_channel_on)
    }
}

struct FakeHub {
    log: ActionLog,
    state: PortState,
    device_available: bool,
}

impl HubPort for FakeHub {
    fn set_state(&mut self, state: PortState) -> Result<()> {
        self.log.lock().unwrap().push(format!("hub.{state}"));
        self.state = state;
        Ok(())
    }

    fn get_state(&mut self) -> Result<PortState> {
        Ok(self.state)
    }

    fn is_device_available(&mut self) -> Result<bool> {
        Ok(self.device_available)
    }
}

struct FakeSupply {
    log: ActionLog,
    mains_on: bool,
    available: bool,
}

impl Supply for FakeSupply {
    fn rail_switch(&mut self, state: PowerState) -> Result<()> {
        self.log.lock().unwrap().push(format!("supply.{state}"));
        self.mains_on = state == PowerState::On;
        Ok(())
    }

    fn rail_state(&mut self) -> Result<PowerState> {
        Ok(if self.mains_on {
            PowerState::On
        } else {
            PowerState::Off
        })
    }

    fn is_available(&mut self) -> Result<bool> {
        Ok(self.available)
    }

    fn connect(&mut self) -> Result<Box<dyn SupplySession>> {
        self.log.lock().unwrap().push("supply.connect".to_string());
        Ok(Box::new(FakeSession {
            log: Arc::clone(&self.log),
        }))
    }
}

struct FakeSession {
    log: ActionLog,
}

impl SupplySession for FakeSession {
    fn set_voltage(&mut self, volts: f64) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("session.set_voltage {volts}"));
        Ok(())
    }

    fn select_main_channels(&mut self) -> Result<()> {
        Ok(())
    }

    fn start_sampling(&mut self) -> Result<f64> {
        Ok(0.0)
    }

    fn read_block(&mut self, _max_samples: usize) -> Result<SampleBlock> {
        Ok(SampleBlock::default())
    }

    fn stop_sampling(&mut self) -> Result<()> {
        Ok(())
    }
}

struct FakeSequencer {
    log: ActionLog,
    shutdown_fails: bool,
}

impl PowerSequencer for FakeSequencer {
    fn after_power_on(
        &self,
        _hub: &mut dyn HubPort,
        _recharge: Option<RechargeThreshold>,
    ) -> Result<()> {
        self.log.lock().unwrap().push("seq.after_power_on".to_string());
        Ok(())
    }

    fn shutdown_device(&self) -> Result<()> {
        self.log.lock().unwrap().push("seq.shutdown".to_string());
        if self.shutdown_fails {
            return Err(RigError::bridge("device unreachable"));
        }
        Ok(())
    }
}

fn rig(
    log: &ActionLog,
    other_channel_on: bool,
    supply_available: bool,
) -> (PowerController, FakeHub, FakeSequencer) {
    let rail = FakeRail {
        log: Arc::clone(log),
        channel_on: false,
        other_channel_on,
    };
    let supply = FakeSupply {
        log: Arc::clone(log),
        mains_on: false,
        available: supply_available,
    };
    let controller =
        PowerController::with_timings(Box::new(rail), Box::new(supply), fast_timings());
    let hub = FakeHub {
        log: Arc::clone(log),
        state: PortState::Disabled,
        device_available: true,
    };
    let sequencer = FakeSequencer {
        log: Arc::clone(log),
        shutdown_fails: false,
    };
    (controller, hub, sequencer)
}

#[test]
fn test_power_on_sequences_actuators_in_order() {
    let log: ActionLog = Arc::new(Mutex::new(Vec::new()));
    let (mut controller, mut hub, sequencer) = rig(&log, false, true);
    let device = test_device();

    controller
        .power_on(&device, &mut hub, &sequencer, None)
        .unwrap();

    assert_eq!(
        actions(&log),
        vec![
            "supply.on",
            "supply.connect",
            "hub.enabled",
            "rail.switch_to",
            "session.set_voltage 4.2",
            "seq.after_power_on",
        ]
    );
    assert_eq!(controller.read_state(&device).unwrap(), PowerState::On);
}

#[test]
fn test_power_on_refuses_when_another_channel_is_live() {
    let log: ActionLog = Arc::new(Mutex::new(Vec::new()));
    let (mut controller, mut hub, sequencer) = rig(&log, true, true);
    let device = test_device();

    let err = controller
        .power_on(&device, &mut hub, &sequencer, None)
        .unwrap_err();

    assert!(matches!(err, RigError::RailConflict));
    // the conflict is detected before any actuator is touched
    assert!(actions(&log).is_empty());
}

#[test]
fn test_power_on_fails_when_supply_never_appears() {
    let log: ActionLog = Arc::new(Mutex::new(Vec::new()));
    let (mut controller, mut hub, sequencer) = rig(&log, false, false);
    let device = test_device();

    let err = controller
        .power_on(&device, &mut hub, &sequencer, None)
        .unwrap_err();

    assert!(matches!(err, RigError::SupplyUnavailable(_)));
    // the mains relay was energized but nothing past the availability gate ran
    assert_eq!(actions(&log), vec!["supply.on"]);
}

#[test]
fn test_power_off_after_power_on_de_energizes_everything() {
    let log: ActionLog = Arc::new(Mutex::new(Vec::new()));
    let (mut controller, mut hub, sequencer) = rig(&log, false, true);
    let device = test_device();

    controller
        .power_on(&device, &mut hub, &sequencer, None)
        .unwrap();
    log.lock().unwrap().clear();

    controller.power_off(&device, &mut hub, &sequencer).unwrap();

    let recorded = actions(&log);
    assert!(recorded.contains(&"hub.disabled".to_string()));
    assert!(recorded.contains(&"seq.shutdown".to_string()));
    assert!(recorded.contains(&"session.set_voltage 0".to_string()));
    assert!(recorded.contains(&"rail.switch_off".to_string()));
    assert!(recorded.contains(&"supply.off".to_string()));
    assert_eq!(controller.read_state(&device).unwrap(), PowerState::Off);
}

#[test]
fn test_power_off_is_idempotent() {
    let log: ActionLog = Arc::new(Mutex::new(Vec::new()));
    let (mut controller, mut hub, sequencer) = rig(&log, false, true);
    let device = test_device();

    controller.power_off(&device, &mut hub, &sequencer).unwrap();
    controller.power_off(&device, &mut hub, &sequencer).unwrap();

    assert_eq!(controller.read_state(&device).unwrap(), PowerState::Off);
}

#[test]
fn test_power_off_continues_past_failing_steps() {
    let log: ActionLog = Arc::new(Mutex::new(Vec::new()));
    let (mut controller, mut hub, _) = rig(&log, false, true);
    let sequencer = FakeSequencer {
        log: Arc::clone(&log),
        shutdown_fails: true,
    };
    let device = test_device();

    controller
        .power_on(&device, &mut hub, &sequencer, None)
        .unwrap();
    log.lock().unwrap().clear();

    // the os-level shutdown fails, but the rail and supply still go down
    controller.power_off(&device, &mut hub, &sequencer).unwrap();

    let recorded = actions(&log);
    assert!(recorded.contains(&"rail.switch_off".to_string()));
    assert!(recorded.contains(&"supply.off".to_string()));
    assert_eq!(controller.read_state(&device).unwrap(), PowerState::Off);
}
