//! The two ordered one-way channels between control and render contexts.
//!
//! Commands flow control → render on an unbounded channel; the control side
//! may allocate. Notifications flow render → control on a bounded channel
//! written with `try_send`, so the render side never blocks on a slow reader.

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};

use crate::command::Command;
use crate::error::BridgeError;
use crate::notification::Notification;

/// Control-context end.
pub struct ControlPort {
    commands: Sender<Command>,
    notifications: Receiver<Notification>,
}

/// Render-context end.
pub struct RenderPort {
    commands: Receiver<Command>,
    notifications: Sender<Notification>,
    dropped: u64,
}

/// Create a connected pair. `capacity` bounds undelivered notifications.
pub fn channel(capacity: usize) -> (ControlPort, RenderPort) {
    let (command_tx, command_rx) = crossbeam_channel::unbounded();
    let (notify_tx, notify_rx) = crossbeam_channel::bounded(capacity);
    (
        ControlPort {
            commands: command_tx,
            notifications: notify_rx,
        },
        RenderPort {
            commands: command_rx,
            notifications: notify_tx,
            dropped: 0,
        },
    )
}

impl ControlPort {
    pub fn send(&self, command: Command) -> Result<(), BridgeError> {
        self.commands
            .send(command)
            .map_err(|_| BridgeError::Disconnected)
    }

    /// Send the initialization command carrying the engine module.
    pub fn init(&self, module: impl Into<Vec<u8>>) -> Result<(), BridgeError> {
        self.send(Command::init(module))
    }

    pub fn try_recv(&self) -> Option<Notification> {
        self.notifications.try_recv().ok()
    }

    /// Take every notification delivered so far.
    pub fn drain(&self) -> Vec<Notification> {
        self.notifications.try_iter().collect()
    }
}

impl RenderPort {
    /// Next pending command, without blocking.
    pub fn try_recv(&self) -> Option<Command> {
        match self.commands.try_recv() {
            Ok(command) => Some(command),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Queue a notification; drops it if the control side is behind or gone.
    pub fn emit(&mut self, notification: Notification) {
        match self.notifications.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(n)) => {
                self.dropped += 1;
                log::debug!("Notification queue full, dropped {}", n.kind());
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_arrive_in_send_order() {
        let (control, render) = channel(4);
        for kind in ["cutoff", "resonance", "cutoff"] {
            control.send(Command::bare(kind)).unwrap();
        }
        let kinds: Vec<String> = std::iter::from_fn(|| render.try_recv())
            .map(|c| c.kind().to_string())
            .collect();
        assert_eq!(kinds, ["cutoff", "resonance", "cutoff"]);
    }

    #[test]
    fn full_notification_queue_drops_instead_of_blocking() {
        let (control, mut render) = channel(2);
        for _ in 0..5 {
            render.emit(Notification::Ready);
        }
        assert_eq!(render.dropped(), 3);
        assert_eq!(control.drain().len(), 2);
        render.emit(Notification::Ready);
        assert_eq!(control.try_recv(), Some(Notification::Ready));
    }

    #[test]
    fn send_after_render_side_dropped() {
        let (control, render) = channel(1);
        drop(render);
        assert!(matches!(
            control.send(Command::bare("panic")),
            Err(BridgeError::Disconnected)
        ));
    }
}
