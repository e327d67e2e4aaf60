//! Consumer trait implemented by each stream handler.

/// Receives frames from a [`spawn_stream`](crate::spawn_stream) task.
///
/// The consumer is owned by the stream task; callbacks run on that task,
/// so they must not block. Heavy work belongs behind a channel.
pub trait StreamConsumer: Send + 'static {
    /// Subscription payload sent as a text frame after every (re)connect.
    ///
    /// Called fresh on each connect, so a consumer holding a shared token
    /// set always subscribes to the current universe.
    fn subscription(&self) -> Option<String>;

    /// Heartbeat text sent every ping interval. `None` disables the
    /// application-level heartbeat.
    fn ping_text(&self) -> Option<String> {
        None
    }

    /// Handle one text frame.
    fn on_text(&mut self, text: &str);

    /// Called once per established connection, before the subscription is
    /// sent. `reconnect` is false only for the very first connection.
    fn on_connected(&mut self, reconnect: bool) {
        let _ = reconnect;
    }

    /// Called when a connection drops (before backoff starts).
    fn on_disconnected(&mut self) {}
}
