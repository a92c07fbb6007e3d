//! # Coremap properties
//!
//! Randomized allocate/release sequences against a small machine, checking
//! after every step that the frames marked allocated are exactly those
//! covered by outstanding runs.

use alloc::sync::Arc;
use alloc::vec::Vec;
use proptest::prelude::*;
use crate::arch::SimMachine;
use crate::memory::{Addr, Coremap, PhyAddr, PAGE_SIZE};
use crate::utils::error::KernelError;

#[derive(Clone, Debug)]
enum Op {
    Allocate(usize),
    Release(usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1usize..8).prop_map(Op::Allocate),
        any::<usize>().prop_map(Op::Release),
    ]
}

fn small_coremap() -> Coremap {
    let machine = Arc::new(SimMachine::builder()
        .with_ram_size(64 * PAGE_SIZE)
        .with_kernel_end(4 * PAGE_SIZE)
        .build());
    let coremap = Coremap::new(machine);
    coremap.bootstrap();
    coremap
}

fn check_consistent(coremap: &Coremap, outstanding: &[(PhyAddr, usize)]) -> Result<(), TestCaseError> {
    let range = coremap.managed_range().unwrap();
    let reserved = coremap.stats().unwrap().reserved;
    let first_usable = range.start.to_offset((reserved * PAGE_SIZE) as isize);
    let mut frame = first_usable;
    while frame < range.end {
        let owner = outstanding.iter().filter(|(head, n)| {
            *head <= frame && frame < head.to_offset((n * PAGE_SIZE) as isize)
        }).count();
        prop_assert!(owner <= 1, "{} is in {} runs", frame, owner);
        prop_assert_eq!(coremap.is_free(frame), Some(owner == 0));
        let expected_len = outstanding.iter().find(|(head, _)| *head == frame).map_or(0, |(_, n)| *n);
        prop_assert_eq!(coremap.run_length(frame), Some(expected_len));
        frame = frame.to_offset(PAGE_SIZE as isize);
    }
    let held: usize = outstanding.iter().map(|(_, n)| n).sum();
    let stats = coremap.stats().unwrap();
    prop_assert_eq!(stats.free + held + stats.reserved, stats.total);
    Ok(())
}

proptest! {
    #[test]
    fn allocated_frames_match_outstanding_runs(ops in proptest::collection::vec(arb_op(), 1..64)) {
        let coremap = small_coremap();
        let mut outstanding: Vec<(PhyAddr, usize)> = Vec::new();
        for op in ops {
            match op {
                Op::Allocate(n) => match coremap.allocate(n) {
                    Ok(pa) => outstanding.push((pa, n)),
                    Err(e) => prop_assert_eq!(e, KernelError::OutOfMemory),
                },
                Op::Release(pick) => {
                    if !outstanding.is_empty() {
                        let (pa, _) = outstanding.swap_remove(pick % outstanding.len());
                        coremap.release(pa);
                    }
                }
            }
            check_consistent(&coremap, &outstanding)?;
        }
    }

    #[test]
    fn allocate_release_pair_is_a_no_op(prefix in proptest::collection::vec(1usize..6, 0..10), n in 1usize..10) {
        let coremap = small_coremap();
        for size in prefix {
            let _ = coremap.allocate(size);
        }
        let before = coremap.stats();
        if let Ok(pa) = coremap.allocate(n) {
            coremap.release(pa);
            prop_assert_eq!(coremap.run_length(pa), Some(0));
        }
        prop_assert_eq!(coremap.stats(), before);
    }
}
