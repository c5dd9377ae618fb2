// tests/property/handle_table_test.rs

//! Property-based tests for the per-connection handle table
//! The table must agree with a map model across bind, translate, and
//! release sequences, including stale handles whose index was reissued.

use proptest::prelude::*;
use secmux::core::BrokerError;
use secmux::core::handles::{HandleKind, HandleMap, ModuleHandle, VirtualHandle};
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum Op {
    Bind(u32),
    Release(u8),
    Translate(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => any::<u32>().prop_map(Op::Bind),
        2 => any::<u8>().prop_map(Op::Release),
        2 => any::<u8>().prop_map(Op::Translate),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 50,
        max_shrink_iters: 500,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_handle_table_matches_model(ops in prop::collection::vec(op_strategy(), 1..48)) {
        const CAPACITY: usize = 16;
        let table = HandleMap::new(HandleKind::Transient, CAPACITY);

        // Current truth: virtual handle raw value -> bound physical value.
        let mut model: HashMap<u32, u32> = HashMap::new();
        // Every handle the table ever issued, live or stale.
        let mut issued_ever: Vec<VirtualHandle> = Vec::new();

        for op in ops {
            match op {
                Op::Bind(raw) => {
                    if model.len() >= CAPACITY {
                        prop_assert!(matches!(
                            table.bind(ModuleHandle::new(raw)).unwrap_err(),
                            BrokerError::HandleTableFull(CAPACITY)
                        ));
                    } else {
                        let virt = table.bind(ModuleHandle::new(raw)).unwrap();
                        prop_assert_eq!(virt.raw() >> 24, 0x80);
                        prop_assert!(model.insert(virt.raw(), raw).is_none());
                        issued_ever.push(virt);
                    }
                }
                Op::Release(sel) => {
                    if issued_ever.is_empty() {
                        continue;
                    }
                    let virt = issued_ever[sel as usize % issued_ever.len()];
                    match model.remove(&virt.raw()) {
                        Some(raw) => {
                            prop_assert_eq!(table.release(virt).unwrap().raw(), raw);
                        }
                        None => {
                            prop_assert!(matches!(
                                table.release(virt).unwrap_err(),
                                BrokerError::UnknownHandle(_)
                            ));
                        }
                    }
                }
                Op::Translate(sel) => {
                    if issued_ever.is_empty() {
                        continue;
                    }
                    let virt = issued_ever[sel as usize % issued_ever.len()];
                    match model.get(&virt.raw()) {
                        Some(raw) => {
                            prop_assert_eq!(table.translate(virt).unwrap().raw(), *raw);
                        }
                        None => {
                            prop_assert!(matches!(
                                table.translate(virt).unwrap_err(),
                                BrokerError::UnknownHandle(_)
                            ));
                        }
                    }
                }
            }
            prop_assert_eq!(table.len(), model.len());
        }
    }
}
