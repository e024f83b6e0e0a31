#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use weft_render::{VecHost, reconcile};

#[derive(Arbitrary, Debug)]
struct Input {
    prev: Vec<u8>,
    next: Vec<u8>,
}

/// Keep first occurrences only; the reconciler rejects duplicate keys.
fn dedup(items: &[u8]) -> Vec<u8> {
    let mut seen = [false; 256];
    items
        .iter()
        .copied()
        .filter(|&b| !std::mem::replace(&mut seen[b as usize], true))
        .collect()
}

fuzz_target!(|input: Input| {
    let prev = dedup(&input.prev);
    let mut host = VecHost::new();
    let prev_nodes = reconcile(&mut host, &[], &[], &prev, |&b| (b, 0u8), |_, _| {})
        .expect("mount")
        .nodes;

    // Raw next may carry duplicates: then the host must be untouched.
    match reconcile(&mut host, &prev, &prev_nodes, &input.next, |&b| (b, 1u8), |_, _| {}) {
        Ok(out) => {
            assert_eq!(host.children(), out.nodes.as_slice());
            let shown: Vec<u8> = out.nodes.iter().map(|n| n.0).collect();
            assert_eq!(shown, input.next);
        }
        Err(_) => assert_eq!(host.children(), prev_nodes.as_slice()),
    }
});
