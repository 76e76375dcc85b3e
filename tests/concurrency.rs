//! Call sites shared across threads

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use common::*;
use dynlink::*;

const THREADS: usize = 8;
const CALLS: usize = 500;

fn hammer<F>(threads: usize, f: F)
where
    F: Fn(usize) + Send + Sync + 'static,
{
    let f = Arc::new(f);
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let f = f.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                f(t);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_synchronized_relink_links_once_per_type() {
    let linker = DynamicLinkerFactory::new()
        .sync_on_relink(true)
        .build()
        .unwrap();
    let site = color_site(&linker);
    let red = palette().red;

    let shared = site.clone();
    hammer(THREADS, move |_| {
        for _ in 0..CALLS {
            assert_eq!(shared.invoke(&[red.clone()]), Ok(Value::str("red")));
        }
    });

    let stats = site.stats();
    assert_eq!(stats.relinks, 1);
    assert_eq!(stats.chain_length, 1);
    assert_eq!(stats.hits + stats.misses, (THREADS * CALLS) as u64);
    // Threads that waited on the relink found the new entry: hits, not misses
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, (THREADS * CALLS - 1) as u64);
}

#[test]
fn test_unsynchronized_polymorphic_results_stay_correct() {
    let linker = DynamicLinkerFactory::new()
        .site_policy(SitePolicy::Chained {
            max_chain_length: 4,
            eviction: EvictionPolicy::Fifo,
        })
        .unstable_relink_threshold(0)
        .build()
        .unwrap();
    let site = color_site(&linker);
    let receivers = Arc::new(shades(6));

    let shared = site.clone();
    hammer(THREADS, move |t| {
        for i in 0..CALLS {
            let n = (t + i) % receivers.len();
            let expected = Value::str(format!("shade-{}", n));
            assert_eq!(shared.invoke(&[receivers[n].clone()]), Ok(expected));
        }
    });

    let stats = site.stats();
    assert!(stats.chain_length <= 4);
    assert!(stats.relinks >= 6);
}

#[test]
fn test_concurrent_sites_go_megamorphic_consistently() {
    let linker = DynamicLinkerFactory::new()
        .site_policy(SitePolicy::Chained {
            max_chain_length: 2,
            eviction: EvictionPolicy::Megamorphic,
        })
        .sync_on_relink(true)
        .build()
        .unwrap();
    let site = color_site(&linker);
    let receivers = Arc::new(shades(5));

    let shared = site.clone();
    hammer(THREADS, move |t| {
        for i in 0..CALLS {
            let n = (t * 7 + i) % receivers.len();
            let expected = Value::str(format!("shade-{}", n));
            assert_eq!(shared.invoke(&[receivers[n].clone()]), Ok(expected));
        }
    });

    let stats = site.stats();
    assert_eq!(stats.state, LinkState::Megamorphic);
    assert!(stats.megamorphic_dispatches > 0);
    // Relinking stops once the site is megamorphic
    assert!(stats.relinks <= 3);
}

#[test]
fn test_code_unit_sites_are_created_once() {
    let linker = DynamicLinkerFactory::new().build().unwrap();
    let unit = Arc::new(CodeUnit::new(linker, "shared"));
    let red = palette().red;

    let shared = unit.clone();
    hammer(THREADS, move |t| {
        let op = color_op();
        let shape = MethodShape::generic(1);
        for i in 0..CALLS {
            let index = ((t + i) % 4) as u32;
            assert_eq!(
                shared.invoke(index, &op, &shape, &[red.clone()]),
                Ok(Value::str("red"))
            );
        }
    });

    assert_eq!(unit.site_count(), 4);
}
