//! TapStation PC Simulator
//!
//! Runs the terminal's session logic on the desktop. Card taps and network
//! events are typed on stdin; submissions go to a real attendance service
//! (`TAPSTATION_ENDPOINT`) or, with `--offline`, to canned answers.
//!
//! # Usage
//! ```bash
//! # Against a running service
//! TAPSTATION_ENDPOINT=http://localhost:5000/api/attendance cargo run -p tapstation-simulator
//!
//! # Without a service, opening the setup portal first
//! cargo run -p tapstation-simulator -- --offline --reset
//! ```
//!
//! # Console input
//! - `04:a2:3f`, `04A23F`, `04 a2 3f`: tap a card
//! - `drop`: brief WiFi loss
//! - `outage`: WiFi stays down until the setup portal succeeds
//! - `portal`: toggle whether the next setup portal succeeds
//! - `quit`: exit

mod console;
mod link;
mod transport;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{info, warn};
use tapstation_core::{
    AttendanceReporter, CardReader, Config, ConnectivityManager, Cycle, FeedbackSink, HttpTransport,
    LogSink, SessionController, SystemClock,
};

use console::ConsoleReader;
use link::{LinkControl, SimulatedLink};
use transport::{OfflineTransport, ReqwestTransport};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

struct Options {
    offline: bool,
    reset: bool,
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("usage: tapstation-simulator [--offline] [--reset]");
        return Ok(());
    }
    let options = Options {
        offline: args.iter().any(|a| a == "--offline"),
        reset: args.iter().any(|a| a == "--reset"),
    };

    let mut config = Config::from_env()?;
    config.reset_credentials |= options.reset;

    info!("TapStation Simulator - device {}", config.device_id);
    if options.offline {
        info!("Offline mode: every submission is recorded as 'Simulated Holder'");
    } else {
        info!("Reporting to {}", config.endpoint);
    }
    info!("Type a card UID (e.g. 04:a2:3f), drop, outage, portal or quit");

    let control = Arc::new(Mutex::new(LinkControl::new()));
    let reader = console::spawn(control.clone());

    if options.offline {
        run(config, reader, control, || Ok(OfflineTransport))
    } else {
        run(config, reader, control, || ReqwestTransport::new(HTTP_TIMEOUT))
    }
}

/// Boot the session, rebooting on provisioning failures the way the device
/// restarts itself.
fn run<T, F>(
    mut config: Config,
    reader: ConsoleReader,
    control: Arc<Mutex<LinkControl>>,
    transport: F,
) -> anyhow::Result<()>
where
    T: HttpTransport,
    F: Fn() -> anyhow::Result<T>,
{
    loop {
        let card_reader = CardReader::init(reader.clone(), config.timing.reader_timeout, config.uid_case)?;
        let connectivity = ConnectivityManager::new(SimulatedLink::new(control.clone()), &config);
        let reporter = AttendanceReporter::new(transport()?, config.endpoint.clone(), config.status_url.clone());
        let mut session =
            SessionController::new(card_reader, connectivity, reporter, LogSink, SystemClock::new(), &config);

        match drive(&mut session, &reader) {
            Ok(()) => {
                info!("Bye");
                return Ok(());
            }
            Err(e) if e.is_restart_required() => {
                warn!("{} - restarting", e);
                // A reboot does not repeat the one-shot reset request
                config.reset_credentials = false;
            }
            Err(e) => session.halt(&e),
        }
    }
}

fn drive<T, S>(
    session: &mut SessionController<ConsoleReader, SimulatedLink, T, S, SystemClock>,
    reader: &ConsoleReader,
) -> Result<(), tapstation_core::Error>
where
    T: HttpTransport,
    S: FeedbackSink,
{
    session.start()?;
    while !reader.quit_requested() {
        match session.run_cycle()? {
            Cycle::Idle => {}
            Cycle::Recovered(state) => info!("[sim] recovered: {}", state),
            Cycle::Card { identifier, outcome } => info!("[sim] {} -> {}", identifier, outcome),
        }
    }
    Ok(())
}
