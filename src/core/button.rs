//! Single/double click detection for the tag button.
//!
//! The tag notifies one value per press. A press opens a decision window;
//! a second press inside it is a double click, otherwise the window elapses
//! and the press counts as a single click. The owner runs the window timer
//! and reports its expiry back with the epoch it was given.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickEvent {
    Single,
    Double,
}

impl ClickEvent {
    /// Payload published on the button topic
    pub fn payload(self) -> &'static str {
        match self {
            ClickEvent::Single => "1",
            ClickEvent::Double => "2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClickState {
    Idle,
    AwaitingSecondClick { started_at: Instant, epoch: u64 },
}

/// What the owner has to do after a press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressOutcome {
    /// Start a window timer of `window` and report back with `epoch`.
    WindowOpened { epoch: u64, window: Duration },
    /// The open window had already run out before its timer was handled:
    /// emit a single click for it, replace the timer and report back with `epoch`.
    WindowRestarted { epoch: u64, window: Duration },
    /// Cancel the running window timer and emit a double click.
    DoubleClick { interval: Duration },
}

#[derive(Debug)]
pub struct ClickDisambiguator {
    window: Duration,
    state: ClickState,
    next_epoch: u64,
}

impl ClickDisambiguator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: ClickState::Idle,
            next_epoch: 0,
        }
    }

    pub fn press(&mut self, now: Instant) -> PressOutcome {
        match self.state {
            ClickState::Idle => {
                let epoch = self.open_window(now);
                PressOutcome::WindowOpened {
                    epoch,
                    window: self.window,
                }
            }
            ClickState::AwaitingSecondClick { started_at, .. } => {
                let interval = now.saturating_duration_since(started_at);
                if interval >= self.window {
                    let epoch = self.open_window(now);
                    return PressOutcome::WindowRestarted {
                        epoch,
                        window: self.window,
                    };
                }
                self.state = ClickState::Idle;
                PressOutcome::DoubleClick { interval }
            }
        }
    }

    fn open_window(&mut self, now: Instant) -> u64 {
        let epoch = self.next_epoch;
        self.next_epoch += 1;
        self.state = ClickState::AwaitingSecondClick {
            started_at: now,
            epoch,
        };
        epoch
    }

    /// Called when the timer of window `epoch` fires. Returns the single click
    /// only if that window is still the open one.
    pub fn window_elapsed(&mut self, epoch: u64) -> Option<ClickEvent> {
        match self.state {
            ClickState::AwaitingSecondClick { epoch: open, .. } if open == epoch => {
                self.state = ClickState::Idle;
                Some(ClickEvent::Single)
            }
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn is_idle(&self) -> bool {
        self.state == ClickState::Idle
    }
}
