use core_types::Device;
use execution::ExecutionEngine;
use memory::MemoryManager;
use opattr_ops::{registry, GradSource, GradientRule, InvocationContext, OpNode, TensorAny};
use tensor::Tensor;

const PAIRS: &[(&str, &str)] = &[
    ("_maximum_scalar", "_backward_maximum_scalar"),
    ("_minimum_scalar", "_backward_minimum_scalar"),
    ("_power_scalar", "_backward_power_scalar"),
    ("_rpower_scalar", "_backward_rpower_scalar"),
    ("_hypot_scalar", "_backward_hypot_scalar"),
    ("smooth_l1", "_backward_smooth_l1"),
];

#[test]
fn every_forward_op_binds_its_backward() {
    let reg = registry().unwrap();
    for (forward, backward) in PAIRS {
        let spec = reg.bind_gradient(forward).unwrap().unwrap();
        assert_eq!(spec.backward.name(), *backward);
        assert_eq!(spec.backward.num_inputs(), spec.sources.len());
        assert_eq!(spec.backward.num_outputs(), spec.forward.num_inputs());
        assert_eq!(spec.backward.gradient(), GradientRule::None);
        assert!(reg.bind_gradient(backward).unwrap().is_none());
    }
}

#[test]
fn uses_output_rule_passes_gradient_then_output() {
    let reg = registry().unwrap();
    let spec = reg.bind_gradient("_rpower_scalar").unwrap().unwrap();
    assert_eq!(spec.sources, vec![GradSource::OutputGrad(0), GradSource::ForwardOutput(0)]);

    let args = spec.gather(&["dy"], &["x"], &["y"]).unwrap();
    assert_eq!(args, vec!["dy", "y"]);
}

#[test]
fn uses_input_rule_passes_gradient_then_input() {
    let reg = registry().unwrap();
    let spec = reg.bind_gradient("_PowerScalar").unwrap().unwrap();
    assert_eq!(spec.sources, vec![GradSource::OutputGrad(0), GradSource::ForwardInput(0)]);
    assert_eq!(spec.gather(&["dy"], &["x"], &["y"]).unwrap(), vec!["dy", "x"]);
    assert!(spec.gather(&["dy"], &[], &["y"]).is_err());
}

/// Run forward, then the backward node the binder derives, and return dx.
fn forward_backward(op: &str, scalar: &str, x: &[f64], dy: &[f64]) -> Vec<f64> {
    let reg = registry().unwrap();
    let mm = MemoryManager::new();
    let engine = ExecutionEngine::default();
    let shape = [x.len()];

    let x = TensorAny::from(Tensor::<f64>::from_vec(&mm, x, &shape, Device::cpu()).unwrap());
    let y = TensorAny::from(Tensor::<f64>::empty(&mm, &shape, Device::cpu()).unwrap());
    let node = OpNode::new(reg, op, [("scalar", scalar)]).unwrap();
    engine.dispatch(&node, &InvocationContext::new(&mm, vec![x.clone()], vec![y.clone()])).unwrap();

    let (bwd, spec) = node.backward_node(reg).unwrap().unwrap();
    assert_eq!(bwd.params().float("scalar").unwrap(), node.params().float("scalar").unwrap());

    let dy = TensorAny::from(Tensor::<f64>::from_vec(&mm, dy, &shape, Device::cpu()).unwrap());
    let dx = Tensor::<f64>::empty(&mm, &shape, Device::cpu()).unwrap();
    let args = spec.gather(&[dy], &[x], &[y]).unwrap();
    engine.dispatch(&bwd, &InvocationContext::new(&mm, args, vec![dx.clone().into()])).unwrap();
    dx.to_vec(&mm).unwrap()
}

#[test]
fn backward_values() {
    assert_eq!(forward_backward("_maximum_scalar", "2", &[1.0, 2.0, 3.0], &[1.0, 1.0, 1.0]), vec![0.0, 1.0, 1.0]);
    assert_eq!(forward_backward("_minimum_scalar", "2", &[1.0, 2.0, 3.0], &[0.5, 0.5, 0.5]), vec![0.5, 0.5, 0.0]);
    assert_eq!(forward_backward("_power_scalar", "3", &[1.0, 2.0], &[1.0, 2.0]), vec![3.0, 24.0]);
    assert_eq!(forward_backward("_hypot_scalar", "4", &[3.0], &[10.0]), vec![6.0]);
    assert_eq!(forward_backward("smooth_l1", "1", &[-2.0, 0.5, 2.0], &[1.0, 1.0, 1.0]), vec![-1.0, 0.5, 1.0]);

    // d(2^x)/dx = 2^x · ln 2, computed from the forward output
    let dx = forward_backward("_rpower_scalar", "2", &[0.0, 1.0, 3.0], &[1.0, 1.0, 1.0]);
    for (got, y) in dx.iter().zip([1.0, 2.0, 8.0]) {
        assert!((got - y * 2f64.ln()).abs() < 1e-12);
    }
}

#[test]
fn backward_may_reuse_the_gradient_buffer() {
    let reg = registry().unwrap();
    let mm = MemoryManager::new();
    let backward = OpNode::new(reg, "_backward_maximum_scalar", [("scalar", "0")]).unwrap();
    let dy = Tensor::<f32>::from_vec(&mm, &[3.0, 3.0], &[2], Device::cpu()).unwrap();
    let x = Tensor::<f32>::from_vec(&mm, &[-1.0, 1.0], &[2], Device::cpu()).unwrap();

    let ctx = InvocationContext::new(&mm, vec![dy.clone().into(), x.into()], vec![dy.clone().into()])
        .with_req(vec![core_types::WriteMode::Inplace]);
    ExecutionEngine::default().dispatch(&backward, &ctx).unwrap();
    assert_eq!(dy.to_vec(&mm).unwrap(), vec![0.0, 3.0]);
}
