//! Property-based tests for device enumeration.
//!
//! Verified invariants:
//! - every enumerated device has a non-empty name and a kind from the
//!   defined set, whatever mix of failing devices and platforms is present.
//! - an empty or failing platform never hides devices of its siblings.
//! - memory formatting picks the unit from the magnitude.

use clvec_common::DeviceKind;
use clvec_common::mock::{MockDevice, MockDriver, MockOp, MockPlatform};
use clvec_device_probe::{DeviceDirectory, format_memory_size};
use proptest::prelude::*;

// ── Strategies ───────────────────────────────────────────────────────────────

fn device_strategy() -> impl Strategy<Value = MockDevice> {
    (
        "[a-z]{0,6}",
        prop_oneof![Just(1u64 << 1), Just(1u64 << 2), Just(1u64 << 3), Just(1u64 << 4)],
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(name, bits, bad_name, bad_kind)| {
            let mut dev = MockDevice::new(name, bits);
            if bad_name {
                dev = dev.failing(MockOp::DeviceName);
            }
            if bad_kind {
                dev = dev.failing(MockOp::DeviceKind);
            }
            dev
        })
}

fn platform_strategy() -> impl Strategy<Value = MockPlatform> {
    (proptest::collection::vec(device_strategy(), 0..4), any::<bool>()).prop_map(
        |(devices, broken)| {
            let mut p = MockPlatform::new("P");
            for d in devices {
                p = p.with_device(d);
            }
            if broken { p.with_failing_device_query() } else { p }
        },
    )
}

// ── Properties ───────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn enumerated_devices_are_well_formed(
        platforms in proptest::collection::vec(platform_strategy(), 1..5)
    ) {
        let expected: usize = platforms
            .iter()
            .filter(|p| !p.fail_device_query)
            .flat_map(|p| p.devices.iter())
            .filter(|d| d.faults.is_empty() && !d.name.is_empty())
            .count();

        let driver = MockDriver::new(platforms);
        let dir = DeviceDirectory::enumerate(&driver).unwrap();

        prop_assert_eq!(dir.len(), expected);
        for dev in &dir {
            prop_assert!(!dev.name.is_empty());
            prop_assert!(DeviceKind::ALL.contains(&dev.kind));
        }
        let ids: Vec<_> = dir.iter().map(|d| d.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        prop_assert_eq!(ids, sorted, "directory must keep discovery order");
    }

    #[test]
    fn memory_units_follow_magnitude(bytes in any::<u64>()) {
        let s = format_memory_size(bytes);
        if bytes > 1 << 30 {
            prop_assert!(s.ends_with("GB"));
        } else if bytes > 1 << 20 {
            prop_assert!(s.ends_with("MB"));
        } else if bytes > 1 << 10 {
            prop_assert!(s.ends_with("kB"));
        } else {
            prop_assert_eq!(s, bytes.to_string());
        }
    }
}

// ── Scenarios ────────────────────────────────────────────────────────────────

/// A platform with zero devices must not abort enumeration of its siblings.
#[test]
fn empty_platform_does_not_hide_siblings() {
    let driver = MockDriver::new(vec![
        MockPlatform::new("first").with_device(MockDevice::gpu("g0")),
        MockPlatform::new("empty"),
        MockPlatform::new("last").with_device(MockDevice::cpu("c0")),
    ]);
    let dir = DeviceDirectory::enumerate(&driver).unwrap();
    let listed: Vec<_> = dir.iter().map(|d| d.describe()).collect();
    assert_eq!(listed, ["0.0: g0 [gpu]", "2.0: c0 [cpu]"]);
}
