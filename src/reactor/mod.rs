//! The single-threaded event loop.
//!
//! One reactor thread owns every stream, connection, and listener; all
//! of their futures are polled here and none of them are `Send`. Socket
//! readiness registration is the runtime I/O driver's job (sockets
//! register when created and deregister when closed, one registration
//! per fd); the reactor owns the rest: spawning connection tasks,
//! running until the stop condition resolves, and the timer wheel used
//! for keep-alive idle timeouts.
//!
//! A panicking task is contained by the runtime: the task dies, its
//! socket is dropped and closed with it, and every other task keeps
//! running.

use std::future::Future;
use std::io;

use tokio::runtime::{Builder, Runtime};
use tokio::task::{JoinHandle, LocalSet};

/// The event loop: a current-thread runtime plus a local task set.
pub struct Reactor {
    runtime: Runtime,
    local: LocalSet,
}

impl Reactor {
    pub fn new() -> io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_io().enable_time().build()?;
        Ok(Self { runtime, local: LocalSet::new() })
    }

    /// Drive the reactor until `future` resolves. Spawned tasks keep
    /// being polled while it runs; `future` is the stop condition.
    pub fn run<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(self.local.run_until(future))
    }
}

/// Spawn a task onto the reactor thread. Must be called from within
/// [`Reactor::run`].
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + 'static,
    F::Output: 'static,
{
    tokio::task::spawn_local(future)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn spawned_tasks_run_while_the_stop_future_is_pending() {
        let reactor = Reactor::new().unwrap();
        let ticks = Rc::new(Cell::new(0));

        let observed = reactor.run({
            let ticks = Rc::clone(&ticks);
            async move {
                let counter = Rc::clone(&ticks);
                let task = spawn(async move {
                    for _ in 0..3 {
                        counter.set(counter.get() + 1);
                        tokio::task::yield_now().await;
                    }
                });
                task.await.unwrap();
                ticks.get()
            }
        });

        assert_eq!(observed, 3);
    }

    #[test]
    fn a_panicking_task_does_not_take_down_the_reactor() {
        let reactor = Reactor::new().unwrap();

        let survived = reactor.run(async {
            let doomed = spawn(async {
                panic!("task fault");
            });
            assert!(doomed.await.is_err());

            let healthy = spawn(async { 42 });
            healthy.await.unwrap()
        });

        assert_eq!(survived, 42);
    }
}
