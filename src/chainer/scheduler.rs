//! Drives steps until the chainer terminates.
//!
//! The sequential driver runs one step at a time on the calling thread. The
//! concurrent driver keeps up to `jobs` steps in flight: a token channel
//! seeded with one token per job gates dispatch, and every finished worker
//! sends a token back (the next iteration, or `Terminate`). Dispatch ends once every
//! token has come back as `Terminate`, so a worker still running when the
//! run first looks over can revive it by adding sources. Workers are scoped
//! threads, so leaving the scope joins them all.

use std::thread;

use tracing::debug;

use super::pool::{Token, TokenPool};
use super::ForwardChainer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduler {
    Sequential,
    Concurrent { jobs: usize },
}

impl Scheduler {
    pub fn for_jobs(jobs: usize) -> Self {
        if jobs <= 1 {
            Self::Sequential
        } else {
            Self::Concurrent { jobs }
        }
    }

    /// Run `chainer` until it terminates.
    pub fn drive(self, chainer: &ForwardChainer) {
        match self {
            Self::Sequential => while chainer.step().is_some() {},
            Self::Concurrent { jobs } => drive_concurrent(chainer, jobs),
        }
    }
}

fn drive_concurrent(chainer: &ForwardChainer, jobs: usize) {
    let pool = TokenPool::new();
    for _ in 0..jobs {
        pool.push(chainer.next_token());
    }
    // Tokens in the pool plus tokens held by running workers. Every worker
    // hands back exactly one token, so the count only drops on `Terminate`.
    // Once it reaches zero every worker has finished and the last token
    // handed back saw the final state.
    let mut outstanding = jobs;

    thread::scope(|scope| {
        while outstanding > 0 {
            let Some(token) = pool.take() else {
                break;
            };
            let Token::Iteration(iteration) = token else {
                outstanding -= 1;
                continue;
            };

            chainer.enter_worker();
            let tx = pool.sender();
            scope.spawn(move || {
                chainer.do_step(iteration);
                chainer.leave_worker();
                let _ = tx.send(chainer.next_token());
            });

            // A worker that finished while the run looked over retired its
            // token; put one back now that there is work again.
            if outstanding < jobs && chainer.check_termination().is_none() {
                pool.push(chainer.next_token());
                outstanding += 1;
            }
        }
        debug!("all tokens retired, stop dispatching");
    });
}
