use std::collections::HashSet;
use std::rc::Rc;

use tessera_ir::{BinaryOp, LazyOp, Src};
use tessera_schedule::{CompileConfig, compile_kernel};

use crate::test::helpers::{load, st};
use crate::{CacheStats, CachedKernel, Interpreter, KernelCache};

fn compile(ast: &Src) -> Result<CachedKernel, String> {
    let kernel = Rc::new(compile_kernel(ast, &CompileConfig::default()).map_err(|e| e.to_string())?);
    let program = Box::new(Interpreter::new(kernel.clone()).map_err(|e| e.to_string())?);
    Ok(CachedKernel { kernel, program, device: "CPU".to_string() })
}

fn ast(op: BinaryOp) -> Src {
    let value = LazyOp::binary(op, load(1, &[4]), load(2, &[4])).unwrap();
    LazyOp::sink(vec![LazyOp::store(0, st(&[4]), value).unwrap()])
}

fn recompiled() -> Result<CachedKernel, String> {
    panic!("recompiled")
}

#[test]
fn test_identical_trees_compile_once() {
    let mut cache = KernelCache::new();
    let (first, second) = (ast(BinaryOp::Add), ast(BinaryOp::Add));
    assert!(!std::sync::Arc::ptr_eq(&first, &second));

    let a = cache.get_or_compile(&first, "CPU", || compile(&first)).unwrap();
    let b = cache.get_or_compile(&second, "CPU", recompiled).unwrap();
    assert!(Rc::ptr_eq(&a, &b));
    assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    assert_eq!(a.program.name(), "E_4");
}

#[test]
fn test_distinct_trees_get_distinct_kernels() {
    let mut cache = KernelCache::new();
    let (add, sub) = (ast(BinaryOp::Add), ast(BinaryOp::Sub));
    let a = cache.get_or_compile(&add, "CPU", || compile(&add)).unwrap();
    let b = cache.get_or_compile(&sub, "CPU", || compile(&sub)).unwrap();

    assert!(!Rc::ptr_eq(&a, &b));
    assert_eq!(cache.stats(), CacheStats { hits: 0, misses: 2 });
}

#[test]
fn test_device_is_part_of_key() {
    let mut cache = KernelCache::new();
    let tree = ast(BinaryOp::Mul);
    cache.get_or_compile(&tree, "CPU", || compile(&tree)).unwrap();
    cache.get_or_compile(&tree, "CPU:1", || compile(&tree)).unwrap();
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_failed_compile_is_not_cached() {
    let mut cache = KernelCache::new();
    let tree = ast(BinaryOp::Add);
    let failed: Result<_, String> = cache.get_or_compile(&tree, "CPU", || Err("boom".to_string()));
    assert!(failed.is_err());
    assert!(cache.is_empty());
}

#[test]
fn test_retain_live_trees() {
    let mut cache = KernelCache::new();
    let (add, mul) = (ast(BinaryOp::Add), ast(BinaryOp::Mul));
    cache.get_or_compile(&add, "CPU", || compile(&add)).unwrap();
    cache.get_or_compile(&mul, "CPU", || compile(&mul)).unwrap();

    // A rebuilt tree keeps the entry compiled for its equal.
    cache.retain_live(&HashSet::from([ast(BinaryOp::Mul)]));
    assert_eq!(cache.len(), 1);
    cache.get_or_compile(&mul, "CPU", recompiled).unwrap();
    cache.clear();
    assert!(cache.is_empty());
}
