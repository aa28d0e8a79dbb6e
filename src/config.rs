/// Runtime configuration for queue components.
///
/// Use the builder pattern to customize, or use [`Default`] for the values
/// the rest of the system agrees on.
///
/// # Examples
///
/// ```rust
/// use notiq::Config;
///
/// let config = Config::default()
///     .with_queue("notifications_queue")
///     .with_channel_size(64);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Name of the shared durable queue.
    /// Default: `notifications_queue`
    pub queue: String,

    /// Size of each consumer's delivery buffer. Determines how many
    /// deliveries can be pushed ahead of the consumer before the broker
    /// applies backpressure.
    /// Default: 16
    pub channel_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            queue: crate::pattern::NOTIFICATIONS_QUEUE.to_string(),
            channel_size: 16,
        }
    }
}

impl Config {
    /// Set the shared queue name. Every publisher and consumer of the same
    /// event stream must use the same value.
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    /// Set the delivery buffer size for consumers.
    ///
    /// Larger buffers allow more in-flight deliveries but delay
    /// backpressure; a dispatcher settles messages one at a time either
    /// way.
    pub fn with_channel_size(mut self, size: usize) -> Self {
        self.channel_size = size;
        self
    }
}
