//! User-visible notifications.
//!
//! The core only decides what to show and when. Whatever is attached to
//! the terminal (serial console, LEDs, a display) implements
//! [`FeedbackSink`].

use log::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Error,
}

impl Severity {
    pub fn is_error(self) -> bool {
        self == Severity::Error
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub severity: Severity,
}

impl Notification {
    pub fn info(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(title, body, Severity::Info)
    }

    pub fn success(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(title, body, Severity::Success)
    }

    pub fn error(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(title, body, Severity::Error)
    }

    fn new(title: impl Into<String>, body: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            severity,
        }
    }

    /// Idle prompt shown while waiting for a card
    pub fn ready() -> Self {
        Self::info("Ready", "Scan your card")
    }
}

pub trait FeedbackSink {
    fn emit(&mut self, notification: &Notification);
}

impl<S: FeedbackSink + ?Sized> FeedbackSink for &mut S {
    fn emit(&mut self, notification: &Notification) {
        (**self).emit(notification)
    }
}

impl<S: FeedbackSink + ?Sized> FeedbackSink for Box<S> {
    fn emit(&mut self, notification: &Notification) {
        (**self).emit(notification)
    }
}

/// Renders notifications into the log (serial console on the device).
#[derive(Debug, Default)]
pub struct LogSink;

impl FeedbackSink for LogSink {
    fn emit(&mut self, notification: &Notification) {
        if notification.severity.is_error() {
            error!("[{}] {}", notification.title, notification.body);
        } else {
            info!("[{}] {}", notification.title, notification.body);
        }
    }
}

/// Forwards every notification to two sinks, in order.
pub struct Tee<A, B> {
    first: A,
    second: B,
}

impl<A, B> Tee<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: FeedbackSink, B: FeedbackSink> FeedbackSink for Tee<A, B> {
    fn emit(&mut self, notification: &Notification) {
        self.first.emit(notification);
        self.second.emit(notification);
    }
}
