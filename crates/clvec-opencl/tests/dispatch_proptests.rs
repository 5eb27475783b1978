//! Property-based tests for the dispatch pipeline.
//!
//! Verified invariants:
//! - a correct device always verifies, whatever the length and seed.
//! - equal seeds give equal inputs and equal reference outputs.
//! - a single corrupted element is reported at its own index.
//! - comparison is by bit pattern, so one flipped bit is a mismatch.

use clvec_common::DispatchConfig;
use clvec_common::mock::{MockDevice, MockDriver, MockPlatform};
use clvec_device_probe::DeviceDirectory;
use clvec_opencl::{DispatchPipeline, HostInputs, ReferenceRun, Verification, verify};
use proptest::prelude::*;

fn driver() -> MockDriver {
    MockDriver::new(vec![MockPlatform::new("P").with_device(MockDevice::gpu("g"))])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn correct_device_always_verifies(len in 1usize..2048, seed in any::<u64>()) {
        let driver = driver();
        let dir = DeviceDirectory::enumerate(&driver).unwrap();
        let cfg = DispatchConfig { vector_length: len, seed, ..DispatchConfig::default() };
        let summary = DispatchPipeline::new(&driver, cfg).unwrap().run(&dir);
        prop_assert_eq!(summary.devices[0].verification, Verification::Passed);
        prop_assert_eq!(summary.passed(), 1);
    }

    #[test]
    fn equal_seeds_give_equal_inputs(len in 0usize..512, seed in any::<u64>()) {
        let a = HostInputs::generate(len, seed);
        let b = HostInputs::generate(len, seed);
        prop_assert_eq!(&a, &b);
        let ra = ReferenceRun::compute(&a).output;
        let rb = ReferenceRun::compute(&b).output;
        prop_assert!(ra.iter().zip(&rb).all(|(x, y)| x.to_bits() == y.to_bits()));
    }

    #[test]
    fn corrupted_element_is_found_at_its_index(len in 1usize..1024, pick in any::<prop::sample::Index>()) {
        let index = pick.index(len);
        // Inputs are in [0, 1), so a negative value can never be a correct sum.
        let driver = driver().with_corrupt_output(index, -1.0);
        let dir = DeviceDirectory::enumerate(&driver).unwrap();
        let cfg = DispatchConfig { vector_length: len, ..DispatchConfig::default() };
        let summary = DispatchPipeline::new(&driver, cfg).unwrap().run(&dir);
        match summary.devices[0].verification {
            Verification::Mismatch { index: got, actual, .. } => {
                prop_assert_eq!(got, index);
                prop_assert_eq!(actual, -1.0);
            }
            other => prop_assert!(false, "expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn verify_accepts_only_identical_bits(values in proptest::collection::vec(any::<f32>(), 1..64)) {
        let zeros = vec![0.0f32; values.len()];
        prop_assert_eq!(verify(&zeros, &zeros, &values, &values), Verification::Passed);

        let mut flipped = values.clone();
        let last = flipped.len() - 1;
        flipped[last] = f32::from_bits(flipped[last].to_bits() ^ 1);
        let is_mismatch_at_last =
            matches!(verify(&zeros, &zeros, &values, &flipped), Verification::Mismatch { index, .. } if index == last);
        prop_assert!(is_mismatch_at_last);
    }
}
