use kernel_sync::SpinLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::{panic, thread};

#[test]
fn guard_releases_on_drop() {
    let l = SpinLock::new(0_u64);
    {
        let mut g = l.lock();
        *g = 0x1000;
        assert!(l.try_lock().is_none());
    }
    assert!(l.try_lock().is_some());

    let mut g = l.lock();
    *g += 0x1000;
    assert_eq!(*g, 0x2000);
}

#[test]
fn try_lock_fails_while_held() {
    let l = SpinLock::new([0_u64; 4]);

    let held = l.try_lock();
    assert!(held.is_some());
    assert!(l.try_lock().is_none());

    drop(held);
    assert!(l.try_lock().is_some());
}

#[test]
fn with_lock_returns_closure_result() {
    let l = SpinLock::new(Vec::<(u64, u64)>::new());
    let n = l.with_lock(|ranges| {
        ranges.push((0x1000, 0x2000));
        ranges.push((0x3000, 0x1000));
        ranges.len()
    });
    assert_eq!(n, 2);
    assert!(l.try_lock().is_some());
    assert_eq!(l.with_lock(|r| r.iter().map(|&(_, s)| s).sum::<u64>()), 0x3000);
}

#[test]
fn get_mut_skips_locking() {
    let mut l = SpinLock::new(vec![1_u64, 2]);
    l.get_mut().push(3);
    assert_eq!(l.lock().as_slice(), [1, 2, 3]);
}

#[test]
fn const_static_lock() {
    static COUNTER: SpinLock<u64> = SpinLock::new(0);
    COUNTER.with_lock(|c| *c += 7);
    assert_eq!(COUNTER.with_lock(|c| *c), 7);
}

#[test]
fn contended_updates_stay_exclusive() {
    const THREADS: usize = 8;
    const ITERS: usize = 2_000;

    // Disjoint bump allocations; any lost update would overlap two ranges.
    let lock = Arc::new(SpinLock::new((0_u64, Vec::new())));
    let in_cs = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let in_cs = Arc::clone(&in_cs);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for _ in 0..ITERS {
                    lock.with_lock(|(next, handed_out)| {
                        assert_eq!(in_cs.fetch_add(1, Ordering::SeqCst), 0);
                        handed_out.push(*next);
                        *next += 0x1000;
                        in_cs.fetch_sub(1, Ordering::SeqCst);
                    });
                    thread::yield_now();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    let (next, mut handed_out) = lock.with_lock(|(next, handed_out)| (*next, handed_out.clone()));
    assert_eq!(next, (THREADS * ITERS) as u64 * 0x1000);
    handed_out.sort_unstable();
    handed_out.dedup();
    assert_eq!(handed_out.len(), THREADS * ITERS);
}

#[test]
fn lock_is_released_on_panic() {
    let l = SpinLock::new(0_u32);

    let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        l.with_lock(|v| {
            *v = 123;
            panic!("boom");
        });
    }));
    assert!(res.is_err());
    assert!(l.try_lock().is_some());
    assert_eq!(l.with_lock(|v| *v), 123);
}

#[test]
fn lock_is_sync_for_send_payload() {
    fn takes_sync<S: Sync>(_s: &S) {}
    let l = SpinLock::new(0_u8);
    takes_sync(&l);
}
