use railbench::core::device::{DeviceRegistry, OsClass};
use railbench::error::RigError;
use tempfile::TempDir;

const FIXTURE: &str = r#"{
    "supply": {
        "gpio_pin": 27,
        "usb": { "id": "2ab9:0001", "ykush_serial": "YK00000", "ykush_port": 1 }
    },
    "devices": {
        "pixel": {
            "os": "Android",
            "usb": { "id": "18d1:4ee7", "ykush_serial": "YK00001", "ykush_port": 2 },
            "channel": { "gpio_pin": 17, "voltage": 4.2 },
            "adb_identifier": "ABC123"
        },
        "iphone": {
            "os": "iOS",
            "usb": { "id": "05ac:12a8", "ykush_serial": "YK00001", "ykush_port": 3 },
            "channel": { "gpio_pin": 22, "voltage": 4.0 },
            "bt_mac_address": "aa:bb:cc:dd:ee:ff",
            "pin_code": "1234"
        }
    }
}"#;

fn load_fixture(dir: &TempDir) -> DeviceRegistry {
    let path = dir.path().join("devices.json");
    std::fs::write(&path, FIXTURE).unwrap();
    DeviceRegistry::load_from(&path).unwrap()
}

#[test]
fn test_registry_fills_device_names_from_keys() {
    let dir = TempDir::new().unwrap();
    let registry = load_fixture(&dir);

    let pixel = registry.get("pixel").unwrap();
    assert_eq!(pixel.name, "pixel");
    assert_eq!(pixel.os, OsClass::Android);
    assert_eq!(pixel.channel.gpio_pin, 17);
    assert_eq!(pixel.adb_identifier.as_deref(), Some("ABC123"));
}

#[test]
fn test_registry_parses_ios_os_class() {
    let dir = TempDir::new().unwrap();
    let registry = load_fixture(&dir);

    let iphone = registry.get("iphone").unwrap();
    assert_eq!(iphone.os, OsClass::Ios);
    assert_eq!(iphone.bt_mac_address.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
    assert_eq!(iphone.pin_code.as_deref(), Some("1234"));
}

#[test]
fn test_unknown_device_name_is_an_error() {
    let dir = TempDir::new().unwrap();
    let registry = load_fixture(&dir);

    let err = registry.get("toaster").unwrap_err();
    assert!(matches!(err, RigError::UnknownDevice(name) if name == "toaster"));
}

#[test]
fn test_channels_cover_the_whole_rack() {
    let dir = TempDir::new().unwrap();
    let registry = load_fixture(&dir);

    let channels = registry.channels();
    assert_eq!(channels.len(), 2);
    let mut pins: Vec<u32> = channels.iter().map(|c| c.gpio_pin).collect();
    pins.sort_unstable();
    assert_eq!(pins, vec![17, 22]);
}

#[test]
fn test_supply_config_is_loaded() {
    let dir = TempDir::new().unwrap();
    let registry = load_fixture(&dir);

    assert_eq!(registry.supply().gpio_pin, 27);
    assert_eq!(registry.supply().usb.vid_pid().unwrap(), (0x2ab9, 0x0001));
}

#[test]
fn test_missing_config_file_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let result = DeviceRegistry::load_from(&dir.path().join("nope.json"));
    assert!(matches!(result, Err(RigError::Config(_))));
}

#[test]
fn test_malformed_config_is_a_json_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("devices.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
        DeviceRegistry::load_from(&path),
        Err(RigError::Json(_))
    ));
}
