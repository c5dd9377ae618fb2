// tests/property/registry_model_test.rs

//! Property-based tests for the dual-keyed registry
//! Any sequence of inserts and removals must keep both key views in step.

use proptest::prelude::*;
use secmux::core::BrokerError;
use secmux::core::connection::{ClientEndpoint, Connection};
use secmux::core::handles::{HandleKind, HandleMap};
use secmux::core::pipe::PipeFlags;
use secmux::core::registry::ConnectionRegistry;
use std::os::unix::io::RawFd;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Insert,
    RemoveById(u8),
    RemoveByFd(u8),
    /// Attempt to register a fresh connection under an id that is already
    /// live. The registry must reject it and keep the existing entry.
    ReuseLiveId(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Insert),
        2 => any::<u8>().prop_map(Op::RemoveById),
        2 => any::<u8>().prop_map(Op::RemoveByFd),
        1 => any::<u8>().prop_map(Op::ReuseLiveId),
    ]
}

fn new_connection(id: u64) -> (Arc<Connection>, ClientEndpoint) {
    let map = Arc::new(HandleMap::new(HandleKind::Transient, 4));
    let (connection, client) = Connection::new(id, PipeFlags::CLOEXEC, map).unwrap();
    (Arc::new(connection), client)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 50,
        max_shrink_iters: 500,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_both_key_views_stay_in_step(ops in prop::collection::vec(op_strategy(), 1..24)) {
        let registry = ConnectionRegistry::new(64);
        // Model: the live (id, fd) pairs, plus the client endpoints that keep
        // descriptor numbers from being reused mid-case.
        let mut live: Vec<(u64, RawFd)> = Vec::new();
        let mut clients: Vec<ClientEndpoint> = Vec::new();
        let mut next_id: u64 = 1;

        for op in ops {
            match op {
                Op::Insert => {
                    let id = next_id;
                    next_id += 1;
                    let (connection, client) = new_connection(id);
                    let fd = connection.key_fd();
                    registry.insert(connection).unwrap();
                    live.push((id, fd));
                    clients.push(client);
                }
                Op::RemoveById(sel) => {
                    if live.is_empty() {
                        prop_assert!(matches!(
                            registry.remove_by_id(9999).unwrap_err(),
                            BrokerError::IdNotFound(9999)
                        ));
                    } else {
                        let (id, fd) = live.remove(sel as usize % live.len());
                        let removed = registry.remove_by_id(id).unwrap();
                        prop_assert_eq!(removed.key_fd(), fd);
                        prop_assert!(registry.find_by_id(id).is_none());
                        prop_assert!(registry.find_by_fd(fd).is_none());
                    }
                }
                Op::RemoveByFd(sel) => {
                    if live.is_empty() {
                        prop_assert!(matches!(
                            registry.remove_by_fd(-1).unwrap_err(),
                            BrokerError::DescriptorNotFound(-1)
                        ));
                    } else {
                        let (id, fd) = live.remove(sel as usize % live.len());
                        let removed = registry.remove_by_fd(fd).unwrap();
                        prop_assert_eq!(removed.key_id(), id);
                        prop_assert!(registry.find_by_id(id).is_none());
                        prop_assert!(registry.find_by_fd(fd).is_none());
                    }
                }
                Op::ReuseLiveId(sel) => {
                    if !live.is_empty() {
                        let (id, fd) = live[sel as usize % live.len()];
                        let (imposter, _imposter_client) = new_connection(id);
                        let err = registry.insert(imposter).unwrap_err();
                        prop_assert!(matches!(err, BrokerError::DuplicateId(_)));
                        prop_assert_eq!(registry.find_by_id(id).unwrap().key_fd(), fd);
                    }
                }
            }

            // After every operation the registry and the model agree exactly,
            // and every live connection is reachable through both keys.
            prop_assert_eq!(registry.len(), live.len());
            for (id, fd) in &live {
                let by_id = registry.find_by_id(*id).unwrap();
                let by_fd = registry.find_by_fd(*fd).unwrap();
                prop_assert_eq!(by_id.key_fd(), *fd);
                prop_assert_eq!(by_fd.key_id(), *id);
            }
        }
    }
}
