//! Token channel that throttles concurrent steps.
//!
//! The dispatcher owns the receiving end; each worker gets its own
//! [`Sender`] clone to hand its token back when its step is done.

use std::sync::mpsc::{self, Receiver, Sender};

/// Work token handed between the dispatcher and workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// Permission to run the step with this iteration number.
    Iteration(u64),
    /// The run is over; the dispatcher should stop.
    Terminate,
}

/// FIFO token queue with a single consumer.
///
/// Sending never blocks; [`take`](Self::take) blocks until a token arrives.
#[derive(Debug)]
pub struct TokenPool {
    tx: Sender<Token>,
    rx: Receiver<Token>,
}

impl Default for TokenPool {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenPool {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }

    /// A sending handle for a worker thread.
    pub fn sender(&self) -> Sender<Token> {
        self.tx.clone()
    }

    pub fn push(&self, token: Token) {
        // The pool holds the receiver, so the channel stays open while `self`
        // is alive.
        let _ = self.tx.send(token);
    }

    /// Block until a token is available. `None` once every sender is gone,
    /// which cannot happen while the pool keeps its own.
    pub fn take(&self) -> Option<Token> {
        self.rx.recv().ok()
    }

    /// Take a token if one is queued, without blocking.
    pub fn try_take(&self) -> Option<Token> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn tokens_come_out_in_order() {
        let pool = TokenPool::new();
        pool.push(Token::Iteration(0));
        pool.push(Token::Iteration(1));
        pool.push(Token::Terminate);
        assert_eq!(pool.take(), Some(Token::Iteration(0)));
        assert_eq!(pool.take(), Some(Token::Iteration(1)));
        assert_eq!(pool.take(), Some(Token::Terminate));
        assert_eq!(pool.try_take(), None);
    }

    #[test]
    fn take_blocks_until_a_worker_sends() {
        let pool = TokenPool::new();
        let tx = pool.sender();
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            tx.send(Token::Iteration(9)).unwrap();
        });
        assert_eq!(pool.take(), Some(Token::Iteration(9)));
        worker.join().unwrap();
    }

    #[test]
    fn every_worker_token_reaches_the_dispatcher() {
        let pool = TokenPool::new();
        let workers: Vec<_> = (0..4)
            .map(|i| {
                let tx = pool.sender();
                thread::spawn(move || tx.send(Token::Iteration(i)).unwrap())
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        let mut got: Vec<u64> = (0..4)
            .map(|_| match pool.take() {
                Some(Token::Iteration(i)) => i,
                other => panic!("unexpected token {other:?}"),
            })
            .collect();
        got.sort_unstable();
        assert_eq!(got, vec![0, 1, 2, 3]);
        assert_eq!(pool.try_take(), None);
    }
}
