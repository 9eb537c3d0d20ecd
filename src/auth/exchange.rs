//! Driving a protocol state machine over a channel.

use tracing::debug;

use super::channel::MessageChannel;
use super::error::AuthError;
use crate::protocol::Message;

/// One side of one protocol run.
///
/// Implementations hold a stage enum and move it forward one incoming
/// message at a time. Once finished (COMPLETED or ERROR) they produce no
/// further messages and never leave that stage.
pub trait Exchange {
    /// Opening message if this side speaks first.
    fn start(&mut self) -> Option<Message>;

    /// Feed one incoming message; returns the reply, if any.
    fn step(&mut self, incoming: Message) -> Option<Message>;

    /// Move to ERROR after a transport fault.
    fn abort(&mut self, cause: &AuthError);

    /// Whether the run reached COMPLETED or ERROR.
    fn is_finished(&self) -> bool;

    /// Whether the run reached COMPLETED.
    fn is_completed(&self) -> bool;
}

/// Run `exchange` to the end over `channel`.
///
/// Every transport or decode fault is mapped to ERROR. Returns `true` only
/// if the run completed.
pub fn run<E, C>(exchange: &mut E, channel: &mut C) -> bool
where
    E: Exchange + ?Sized,
    C: MessageChannel + ?Sized,
{
    if let Some(opening) = exchange.start() {
        if let Err(err) = channel.send(&opening) {
            exchange.abort(&err.into());
            return false;
        }
    }

    while !exchange.is_finished() {
        let incoming = match channel.receive() {
            Ok(message) => message,
            Err(err) => {
                exchange.abort(&err.into());
                break;
            }
        };

        if let Some(reply) = exchange.step(incoming) {
            if let Err(err) = channel.send(&reply) {
                exchange.abort(&err.into());
                break;
            }
        }
    }

    exchange.is_completed()
}

/// Log a failed transition. The cause stays local to this process.
pub(crate) fn log_failure(protocol: &'static str, cause: &AuthError) {
    debug!(protocol, error = %cause, "protocol run failed");
}
