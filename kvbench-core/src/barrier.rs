//! Reusable N-way rendezvous barrier.
//!
//! A generation-counted barrier: every `wait()` call blocks until `n`
//! calls have arrived, then releases all of them and rolls over to the
//! next generation so the same `Barrier` can be reused stage after
//! stage — unlike a one-shot barrier, nothing needs to be reallocated
//! between rounds. This stands in for the original C implementation's
//! hand-rolled `pthread_barrier_t` emulation (needed there because OSX's
//! libc has none); a mutex + condvar pair is enough to express the same
//! contract portably.

use std::sync::{Condvar, Mutex};

struct State {
    /// Number of threads that have arrived for the current generation.
    arrived: usize,
    /// Incremented every time the barrier releases a generation.
    generation: u64,
}

pub struct Barrier {
    n: usize,
    state: Mutex<State>,
    cv: Condvar,
}

impl Barrier {
    /// Creates a barrier for exactly `n` parties.
    pub fn new(n: usize) -> Self {
        Barrier { n, state: Mutex::new(State { arrived: 0, generation: 0 }), cv: Condvar::new() }
    }

    /// Blocks until `n` parties (across all callers) have called `wait`
    /// for the current generation, then releases them all at once.
    ///
    /// Returns `true` for exactly one of the `n` callers per generation —
    /// the one whose arrival completed the round — so callers can elect
    /// a leader to run between-round bookkeeping without an extra
    /// coordination primitive.
    pub fn wait(&self) -> bool {
        let mut state = self.state.lock().expect("barrier mutex poisoned");
        let my_generation = state.generation;
        state.arrived += 1;

        if state.arrived == self.n {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.cv.notify_all();
            true
        } else {
            state = self
                .cv
                .wait_while(state, |s| s.generation == my_generation)
                .expect("barrier mutex poisoned");
            debug_assert_ne!(state.generation, my_generation);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn releases_all_parties_together() {
        let barrier = Arc::new(Barrier::new(4));
        let counter = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let barrier = barrier.clone();
                let counter = counter.clone();
                thread::spawn(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    barrier.wait();
                    // every thread observes all arrivals once released
                    counter.load(Ordering::SeqCst)
                })
            })
            .collect();

        let results: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.iter().all(|&r| r == 4));
    }

    #[test]
    fn exactly_one_leader_per_generation() {
        let barrier = Arc::new(Barrier::new(3));
        let leaders = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let barrier = barrier.clone();
                let leaders = leaders.clone();
                thread::spawn(move || {
                    if barrier.wait() {
                        leaders.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(leaders.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reusable_across_generations() {
        let barrier = Arc::new(Barrier::new(2));
        for _ in 0..5 {
            let b1 = barrier.clone();
            let b2 = barrier.clone();
            let t1 = thread::spawn(move || b1.wait());
            let t2 = thread::spawn(move || b2.wait());
            t1.join().unwrap();
            t2.join().unwrap();
        }
    }
}
