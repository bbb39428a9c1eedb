//! Property tests: in-place and verified dispatch agree with a plain
//! reference run for arbitrary inputs.

use core_types::{Device, WriteMode};
use execution::parity::first_mismatch;
use execution::{DispatchConfig, ExecutionEngine, Tolerance};
use memory::MemoryManager;
use opattr_ops::{registry, InvocationContext};
use proptest::prelude::*;
use tensor::Tensor;

fn arb_op() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("_maximum_scalar"),
        Just("_minimum_scalar"),
        Just("_power_scalar"),
        Just("_rpower_scalar"),
        Just("_hypot_scalar"),
        Just("smooth_l1"),
    ]
}

fn run(engine: &ExecutionEngine, op: &str, scalar: f32, x: &[f32], req: WriteMode) -> Vec<f32> {
    let mm = MemoryManager::new();
    let input = Tensor::<f32>::from_vec(&mm, x, &[x.len()], Device::cpu()).unwrap();
    let output = match req {
        WriteMode::Inplace => input.clone(),
        _ => Tensor::<f32>::empty(&mm, &[x.len()], Device::cpu()).unwrap(),
    };
    let ctx = InvocationContext::new(&mm, vec![input.into()], vec![output.clone().into()]).with_req(vec![req]);
    let scalar = scalar.to_string();
    engine
        .dispatch_named(registry().unwrap(), op, [("scalar", scalar.as_str())], &ctx)
        .unwrap();
    output.to_vec(&mm).unwrap()
}

fn bits(values: &[f32]) -> Vec<u32> {
    values.iter().map(|v| v.to_bits()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn in_place_matches_fresh(
        op in arb_op(),
        scalar in 0.25f32..3.0,
        x in prop::collection::vec(-4.0f32..4.0, 1..64),
    ) {
        let engine = ExecutionEngine::default();
        let fresh = run(&engine, op, scalar, &x, WriteMode::Overwrite);
        let inplace = run(&engine, op, scalar, &x, WriteMode::Inplace);
        prop_assert_eq!(bits(&fresh), bits(&inplace));
    }

    #[test]
    fn verified_dispatch_matches_reference(
        op in arb_op(),
        scalar in 0.25f32..3.0,
        x in prop::collection::vec(-4.0f32..4.0, 1..64),
        inplace in any::<bool>(),
    ) {
        let req = if inplace { WriteMode::Inplace } else { WriteMode::Overwrite };
        let reference = run(&ExecutionEngine::new(DispatchConfig::reference_only()), op, scalar, &x, req);
        let verified = run(&ExecutionEngine::new(DispatchConfig::verified(Tolerance::default())), op, scalar, &x, req);
        let widen = |v: &[f32]| v.iter().map(|&x| x as f64).collect::<Vec<_>>();
        prop_assert_eq!(first_mismatch(&widen(&reference), &widen(&verified), Tolerance::default()), None);
    }
}
