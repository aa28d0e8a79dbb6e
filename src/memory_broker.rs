use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::{
    Config, Error, Result,
    broker::{Channel, Consumer, Delivery, Properties},
};

/// In-process broker with AMQP-style queue semantics.
///
/// Provides what this crate expects from the external broker it is normally
/// deployed against: named durable queues, at-least-once push delivery,
/// per-attempt delivery tags, explicit ack/nack with optional requeue, and
/// consumer cancellation. Used by the test suite and local runs; production
/// deployments implement [`Channel`] over a real broker client instead.
///
/// Delivery is round-robin across the queue's active consumers, and a
/// nack-requeued message goes back to the *front* of the queue. Together
/// these model the worst case the dispatch protocol must survive: a
/// declined message is redelivered immediately, possibly to the consumer
/// that just declined it.
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(Inner {
                queues: Mutex::new(HashMap::new()),
                consumer_queues: Mutex::new(HashMap::new()),
                unsettled: Mutex::new(HashMap::new()),
                next_tag: AtomicU64::new(1),
                cancel_token: CancellationToken::new(),
                channel_size: config.channel_size,
            }),
        }
    }

    /// Open a channel to this broker. Channels share the broker's queues
    /// but are owned exclusively by the component that opened them.
    pub fn channel(&self) -> Arc<dyn Channel> {
        Arc::new(MemoryChannel {
            inner: self.inner.clone(),
        })
    }

    /// Stop all queue pumps. Subsequent channel operations fail with
    /// [`Error::Connection`].
    pub fn close(&self) {
        self.inner.cancel_token.cancel();
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

struct Inner {
    queues: Mutex<HashMap<String, Arc<Queue>>>,
    /// consumer tag -> queue it consumes from
    consumer_queues: Mutex<HashMap<String, Arc<Queue>>>,
    /// delivery tag -> message awaiting ack/nack
    unsettled: Mutex<HashMap<u64, Unsettled>>,
    next_tag: AtomicU64,
    cancel_token: CancellationToken,
    channel_size: usize,
}

struct Queue {
    name: Arc<str>,
    state: Mutex<QueueState>,
    notify: Notify,
}

struct QueueState {
    ready: VecDeque<Stored>,
    consumers: Vec<ConsumerEntry>,
    cursor: usize,
}

struct Stored {
    body: Vec<u8>,
    redelivered: bool,
}

struct ConsumerEntry {
    tag: Arc<str>,
    sender: mpsc::Sender<Delivery>,
}

struct Unsettled {
    queue: Arc<Queue>,
    consumer_tag: Arc<str>,
    body: Vec<u8>,
}

impl Inner {
    fn ensure_open(&self) -> Result<()> {
        if self.cancel_token.is_cancelled() {
            return Err(Error::Connection("broker is closed".into()));
        }
        Ok(())
    }

    fn queue(inner: &Arc<Inner>, name: &str) -> Arc<Queue> {
        let mut queues = inner.queues.lock().expect("queue map lock poisoned");
        queues
            .entry(name.to_string())
            .or_insert_with(|| {
                let queue = Arc::new(Queue {
                    name: Arc::from(name),
                    state: Mutex::new(QueueState {
                        ready: VecDeque::new(),
                        consumers: Vec::new(),
                        cursor: 0,
                    }),
                    notify: Notify::new(),
                });
                tokio::spawn(pump(queue.clone(), inner.clone()));
                debug!(queue = name, "declared queue");
                queue
            })
            .clone()
    }

    /// Move one ready message to the next consumer, round-robin. Returns
    /// the sender to push through outside the lock, or `None` when there is
    /// nothing deliverable.
    fn next_delivery(&self, queue: &Arc<Queue>) -> Option<(mpsc::Sender<Delivery>, Delivery, u64)> {
        let mut state = queue.state.lock().expect("queue state lock poisoned");
        state.consumers.retain(|c| !c.sender.is_closed());
        if state.ready.is_empty() || state.consumers.is_empty() {
            return None;
        }

        let idx = state.cursor % state.consumers.len();
        state.cursor = state.cursor.wrapping_add(1);
        let consumer = &state.consumers[idx];
        let sender = consumer.sender.clone();
        let consumer_tag = consumer.tag.clone();

        let stored = state.ready.pop_front().expect("ready checked non-empty");
        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed);
        let delivery = Delivery {
            delivery_tag: tag,
            redelivered: stored.redelivered,
            body: stored.body.clone(),
        };
        self.unsettled
            .lock()
            .expect("unsettled lock poisoned")
            .insert(
                tag,
                Unsettled {
                    queue: queue.clone(),
                    consumer_tag,
                    body: stored.body,
                },
            );
        trace!(queue = %queue.name, tag, "delivering message");
        Some((sender, delivery, tag))
    }

    fn requeue(&self, entry: Unsettled) {
        let mut state = entry.queue.state.lock().expect("queue state lock poisoned");
        state.ready.push_front(Stored {
            body: entry.body,
            redelivered: true,
        });
        drop(state);
        entry.queue.notify.notify_one();
    }

    fn take_unsettled(&self, tag: u64) -> Option<Unsettled> {
        self.unsettled
            .lock()
            .expect("unsettled lock poisoned")
            .remove(&tag)
    }
}

/// Per-queue delivery loop. Runs until the broker closes.
async fn pump(queue: Arc<Queue>, inner: Arc<Inner>) {
    loop {
        // The notified future is created before the state check so a
        // notify racing the check still wakes the loop.
        let notified = queue.notify.notified();

        if let Some((sender, delivery, tag)) = inner.next_delivery(&queue) {
            if sender.send(delivery).await.is_err() {
                // Consumer went away mid-delivery; put the message back.
                if let Some(entry) = inner.take_unsettled(tag) {
                    inner.requeue(entry);
                }
            }
            continue;
        }

        tokio::select! {
            _ = inner.cancel_token.cancelled() => break,
            _ = notified => {}
        }
    }
    debug!(queue = %queue.name, "queue pump stopped");
}

struct MemoryChannel {
    inner: Arc<Inner>,
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn publish(&self, queue: &str, body: Vec<u8>, props: Properties) -> Result<()> {
        self.inner.ensure_open()?;
        let queue = Inner::queue(&self.inner, queue);
        {
            let mut state = queue.state.lock().expect("queue state lock poisoned");
            state.ready.push_back(Stored {
                body,
                redelivered: false,
            });
        }
        queue.notify.notify_one();
        trace!(queue = %queue.name, content_type = props.content_type, "stored message");
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<Consumer> {
        self.inner.ensure_open()?;
        let queue = Inner::queue(&self.inner, queue);
        let consumer_tag = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(self.inner.channel_size);
        {
            let mut state = queue.state.lock().expect("queue state lock poisoned");
            state.consumers.push(ConsumerEntry {
                tag: Arc::from(consumer_tag.as_str()),
                sender: tx,
            });
        }
        self.inner
            .consumer_queues
            .lock()
            .expect("consumer map lock poisoned")
            .insert(consumer_tag.clone(), queue.clone());
        queue.notify.notify_one();
        debug!(queue = %queue.name, %consumer_tag, "consumer started");
        Ok(Consumer {
            consumer_tag,
            deliveries: rx,
        })
    }

    async fn ack(&self, delivery_tag: u64) -> Result<()> {
        self.inner.ensure_open()?;
        match self.inner.take_unsettled(delivery_tag) {
            Some(entry) => trace!(queue = %entry.queue.name, delivery_tag, "acked"),
            // Double-settles are broker-defined behavior the protocol never
            // relies on; treat them as a no-op.
            None => debug!(delivery_tag, "ack for unknown delivery tag"),
        }
        Ok(())
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<()> {
        self.inner.ensure_open()?;
        let Some(entry) = self.inner.take_unsettled(delivery_tag) else {
            debug!(delivery_tag, "nack for unknown delivery tag");
            return Ok(());
        };
        if requeue {
            trace!(queue = %entry.queue.name, delivery_tag, "requeued");
            self.inner.requeue(entry);
        } else {
            debug!(queue = %entry.queue.name, delivery_tag, "message rejected");
        }
        Ok(())
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<()> {
        self.inner.ensure_open()?;
        let queue = self
            .inner
            .consumer_queues
            .lock()
            .expect("consumer map lock poisoned")
            .remove(consumer_tag);
        let Some(queue) = queue else {
            debug!(%consumer_tag, "cancel for unknown consumer");
            return Ok(());
        };

        {
            let mut state = queue.state.lock().expect("queue state lock poisoned");
            state.consumers.retain(|c| c.tag.as_ref() != consumer_tag);
        }

        // Deliveries pushed to this consumer but never settled go back to
        // the queue. Tags the consumer already acked/nacked are gone from
        // the unsettled map, so in-flight settlement always wins.
        let orphaned: Vec<Unsettled> = {
            let mut unsettled = self.inner.unsettled.lock().expect("unsettled lock poisoned");
            let tags: Vec<u64> = unsettled
                .iter()
                .filter(|(_, e)| e.consumer_tag.as_ref() == consumer_tag)
                .map(|(tag, _)| *tag)
                .collect();
            tags.into_iter()
                .filter_map(|tag| unsettled.remove(&tag))
                .collect()
        };
        for entry in orphaned {
            self.inner.requeue(entry);
        }
        debug!(queue = %queue.name, %consumer_tag, "consumer cancelled");
        Ok(())
    }
}
