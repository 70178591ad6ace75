//! Queued commands and the FIFO queues that carry them from intake to the
//! tick.

use chrono::{DateTime, Utc};
use realm_common::{CharacterId, ObjectId};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Attack request. `target` is a bare id: character or NPC is decided when
/// the tick resolves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackCommand {
    pub attacker: CharacterId,
    pub target: u64,
    pub issued_at: DateTime<Utc>,
}

impl AttackCommand {
    pub fn new(attacker: CharacterId, target: u64) -> Self {
        Self {
            attacker,
            target,
            issued_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractCommand {
    pub actor: CharacterId,
    pub object: ObjectId,
    pub issued_at: DateTime<Utc>,
}

impl InteractCommand {
    pub fn new(actor: CharacterId, object: ObjectId) -> Self {
        Self {
            actor,
            object,
            issued_at: Utc::now(),
        }
    }
}

type Shared<T> = Arc<Mutex<VecDeque<T>>>;

fn lock<T>(queue: &Shared<T>) -> MutexGuard<'_, VecDeque<T>> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Create an unbounded FIFO queue. Many producers, one consumer.
pub fn command_queue<T>() -> (QueueSender<T>, QueueDrain<T>) {
    let shared: Shared<T> = Arc::new(Mutex::new(VecDeque::new()));
    (
        QueueSender {
            queue: Arc::clone(&shared),
        },
        QueueDrain { queue: shared },
    )
}

/// Producer half. Cloned into every intake path.
#[derive(Debug)]
pub struct QueueSender<T> {
    queue: Shared<T>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<T> QueueSender<T> {
    /// Append one command. Returns the queue depth after the push.
    pub fn push(&self, command: T) -> usize {
        let mut queue = lock(&self.queue);
        queue.push_back(command);
        queue.len()
    }

    pub fn len(&self) -> usize {
        lock(&self.queue).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Consumer half. Not cloneable: the tick owns it.
#[derive(Debug)]
pub struct QueueDrain<T> {
    queue: Shared<T>,
}

impl<T> QueueDrain<T> {
    /// Pop the oldest command. The lock is released before returning, so
    /// producers are never blocked while a command resolves.
    pub fn pop(&mut self) -> Option<T> {
        lock(&self.queue).pop_front()
    }

    /// Pop the commands queued right now, and only those. Commands pushed
    /// while the iterator is consumed stay queued.
    pub fn take_pending(&mut self) -> Pending<'_, T> {
        let remaining = self.len();
        Pending { drain: self, remaining }
    }

    pub fn len(&self) -> usize {
        lock(&self.queue).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Iterator returned by [`QueueDrain::take_pending`].
#[derive(Debug)]
pub struct Pending<'a, T> {
    drain: &'a mut QueueDrain<T>,
    remaining: usize,
}

impl<T> Iterator for Pending<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.drain.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_across_senders() {
        let (tx, mut rx) = command_queue();
        let tx2 = tx.clone();
        assert_eq!(tx.push(AttackCommand::new(CharacterId(1), 2)), 1);
        assert_eq!(tx2.push(AttackCommand::new(CharacterId(3), 4)), 2);
        assert_eq!(rx.len(), 2);

        assert_eq!(rx.pop().unwrap().attacker, CharacterId(1));
        assert_eq!(rx.pop().unwrap().attacker, CharacterId(3));
        assert!(rx.pop().is_none());
        assert!(tx.is_empty());
    }

    #[test]
    fn take_pending_stops_at_the_depth_it_started_with() {
        let (tx, mut rx) = command_queue();
        tx.push(AttackCommand::new(CharacterId(1), 2));
        tx.push(AttackCommand::new(CharacterId(2), 1));

        let mut taken = Vec::new();
        for command in rx.take_pending() {
            tx.push(AttackCommand::new(CharacterId(9), 9));
            taken.push(command.attacker);
        }
        assert_eq!(taken, vec![CharacterId(1), CharacterId(2)]);
        assert_eq!(tx.len(), 2);
        assert!(rx.pop().is_some_and(|c| c.attacker == CharacterId(9)));
    }

    #[test]
    fn producers_on_many_threads_lose_nothing() {
        let (tx, mut rx) = command_queue();
        let threads: Vec<_> = (0..8u64)
            .map(|n| {
                let tx = tx.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        tx.push(AttackCommand::new(CharacterId(n), 1000));
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(rx.len(), 400);

        let mut per_producer = [0usize; 8];
        for command in rx.take_pending() {
            per_producer[command.attacker.0 as usize] += 1;
        }
        assert_eq!(per_producer, [50; 8]);
    }

    #[test]
    fn commands_are_timestamped_at_capture() {
        let before = Utc::now();
        let cmd = InteractCommand::new(CharacterId(1), ObjectId(2003));
        assert!(cmd.issued_at >= before);
        assert!(cmd.issued_at <= Utc::now());
    }

    #[test]
    fn command_serializes_with_timestamp() {
        let cmd = AttackCommand::new(CharacterId(1), 1000);
        let value = serde_json::to_value(cmd).unwrap();
        assert_eq!(value["attacker"], 1);
        assert_eq!(value["target"], 1000);
        assert!(value["issued_at"].is_string());
    }
}
