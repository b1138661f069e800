//! Serial task worker for post-move side effects.
//!
//! Database writes, display callbacks, physical validation and game-end
//! handling must run in strict FIFO order even when moves arrive quickly.
//! A single worker thread drains a closure channel; submission never blocks.

use std::sync::mpsc::{channel, Sender};
use std::thread::{self, JoinHandle};

use log::{debug, error};

type Task = Box<dyn FnOnce() + Send>;

pub struct GameTaskWorker {
    sender: Option<Sender<Task>>,
    handle: Option<JoinHandle<()>>,
}

impl GameTaskWorker {
    /// Start the worker thread.
    pub fn start() -> Self {
        let (sender, receiver) = channel::<Task>();
        let handle = thread::Builder::new()
            .name("game-task-worker".to_string())
            .spawn(move || {
                while let Ok(task) = receiver.recv() {
                    task();
                }
                debug!("[GameTaskWorker] Queue closed, worker exiting");
            })
            .expect("spawn game task worker");
        GameTaskWorker {
            sender: Some(sender),
            handle: Some(handle),
        }
    }

    /// Submit a task to be executed in FIFO order.
    pub fn submit(&self, task: impl FnOnce() + Send + 'static) {
        if let Some(sender) = &self.sender {
            if sender.send(Box::new(task)).is_err() {
                error!("[GameTaskWorker] Worker gone, dropping task");
            }
        }
    }

    /// Block until every task submitted so far has finished.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = channel::<()>();
        self.submit(move || {
            let _ = ack_tx.send(());
        });
        let _ = ack_rx.recv();
    }

    /// Close the queue and join the worker.
    pub fn stop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for GameTaskWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
