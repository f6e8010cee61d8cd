//! Session controller: the terminal's main loop.
//!
//! One cooperative loop, one card at a time. Each iteration checks the
//! link, announces readiness on a fixed cadence, polls the reader and, if a
//! card showed up, reports it and shows the outcome.

use std::convert::Infallible;
use std::time::Duration;

use log::{error, info};

use crate::card::{CardIdentifier, CardReader, NfcTransceiver};
use crate::clock::Clock;
use crate::config::{Config, SessionTiming};
use crate::connectivity::{ConnectivityManager, ConnectivityState, NetworkLink};
use crate::error::Error;
use crate::feedback::{FeedbackSink, Notification};
use crate::reporter::{AttendanceOutcome, AttendanceReporter, HttpTransport};

/// What a single loop iteration did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cycle {
    /// The link was down; it is back up and card polling was skipped.
    Recovered(ConnectivityState),
    /// No card in the field.
    Idle,
    Card {
        identifier: CardIdentifier,
        outcome: AttendanceOutcome,
    },
}

pub struct SessionController<R, L, T, S, C> {
    reader: CardReader<R>,
    connectivity: ConnectivityManager<L>,
    reporter: AttendanceReporter<T>,
    sink: S,
    clock: C,
    device_id: String,
    timing: SessionTiming,
    last_ready: Option<Duration>,
}

impl<R, L, T, S, C> SessionController<R, L, T, S, C>
where
    R: NfcTransceiver,
    L: NetworkLink,
    T: HttpTransport,
    S: FeedbackSink,
    C: Clock,
{
    pub fn new(
        reader: CardReader<R>,
        connectivity: ConnectivityManager<L>,
        reporter: AttendanceReporter<T>,
        sink: S,
        clock: C,
        config: &Config,
    ) -> Self {
        Self {
            reader,
            connectivity,
            reporter,
            sink,
            clock,
            device_id: config.device_id.clone(),
            timing: config.timing,
            last_ready: None,
        }
    }

    /// Get on the network (provisioning if needed) and announce readiness.
    pub fn start(&mut self) -> Result<(), Error> {
        info!("Device {} starting session", self.device_id);
        self.connectivity
            .ensure_provisioned(&mut self.clock, &mut self.sink)?;
        self.announce_service();
        self.announce_ready();
        Ok(())
    }

    /// `start`, then loop until a fatal error.
    pub fn run(&mut self) -> Result<Infallible, Error> {
        self.start()?;
        loop {
            self.run_cycle()?;
        }
    }

    pub fn run_cycle(&mut self) -> Result<Cycle, Error> {
        if !self.connectivity.check_health().is_connected() {
            self.sink
                .emit(&Notification::error("WiFi disconnected", "Reconnecting..."));
            let state = self
                .connectivity
                .reconnect(&mut self.clock, &mut self.sink)?;
            self.announce_service();
            self.announce_ready();
            return Ok(Cycle::Recovered(state));
        }

        self.announce_ready_if_due();

        let cycle = match self.reader.poll() {
            Some(identifier) => {
                let outcome = self.process_card(&identifier);
                Cycle::Card {
                    identifier,
                    outcome,
                }
            }
            None => Cycle::Idle,
        };

        self.clock.sleep(self.timing.poll_delay);
        Ok(cycle)
    }

    fn process_card(&mut self, identifier: &CardIdentifier) -> AttendanceOutcome {
        info!("Card detected: {}", identifier);
        self.sink
            .emit(&Notification::info("Card detected", identifier.as_str()));

        let outcome = self.reporter.submit(identifier, &self.device_id);
        self.sink.emit(&outcome.notification(identifier));

        // A held card must not be reported again straight away
        self.clock.sleep(self.timing.cooldown);
        self.last_ready = None;
        outcome
    }

    fn announce_service(&mut self) {
        if let Some(status) = self.reporter.probe_service() {
            self.sink.emit(&status.notification());
        }
    }

    fn announce_ready(&mut self) {
        self.sink.emit(&Notification::ready());
        self.last_ready = Some(self.clock.now());
    }

    fn announce_ready_if_due(&mut self) {
        let due = match self.last_ready {
            None => true,
            Some(at) => self.clock.now().saturating_sub(at) >= self.timing.idle_interval,
        };
        if due {
            self.announce_ready();
        }
    }

    /// Show `error` forever. Used for conditions with no recovery path.
    pub fn halt(&mut self, error: &Error) -> ! {
        halt_forever(&mut self.sink, &mut self.clock, error, self.timing.halt_interval)
    }

    pub fn connectivity(&self) -> &ConnectivityManager<L> {
        &self.connectivity
    }

    pub fn connectivity_mut(&mut self) -> &mut ConnectivityManager<L> {
        &mut self.connectivity
    }

    pub fn reporter(&self) -> &AttendanceReporter<T> {
        &self.reporter
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

/// Re-emit the fatal notification every `interval`, never returning.
pub fn halt_forever<S, C>(sink: &mut S, clock: &mut C, error: &Error, interval: Duration) -> !
where
    S: FeedbackSink,
    C: Clock,
{
    error!("Fatal: {}", error);
    let notification = Notification::error(error.title(), error.to_string());
    loop {
        sink.emit(&notification);
        clock.sleep(interval);
    }
}
