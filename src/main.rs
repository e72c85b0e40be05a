use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use owner_dispatch::{
    DispatchError, Dispatcher, DispatcherConfig, EarlyWake, HeadlessRunLoop, LoopEvent,
    OwnerBound,
};
use rayon::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt as log_fmt, prelude::*};

const STEPS: u32 = 40;
const STEP_DELAY: Duration = Duration::from_millis(10);
const OWNER_PAUSE_AFTER: Duration = Duration::from_millis(100);
const OWNER_PAUSE: Duration = Duration::from_millis(250);

/// The two progress fields of the demo, owned by the main thread.
#[derive(Default)]
struct ProgressBoard {
    sync: String,
    nosync: String,
    redraws: u32,
}

impl fmt::Display for ProgressBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Sync: {}", self.sync)?;
        writeln!(f, "NoSync: {}", self.nosync)?;
        write!(f, "redraws: {}", self.redraws)
    }
}

#[derive(Clone, Copy)]
enum Field {
    Sync,
    NoSync,
}

impl ProgressBoard {
    fn set(&mut self, field: Field, text: String) {
        match field {
            Field::Sync => self.sync = text,
            Field::NoSync => self.nosync = text,
        }
        self.redraws += 1;
    }
}

/// Stand-in for the work done between progress updates.
fn long_computation(step: u32) -> u64 {
    (0..20_000_u64)
        .into_par_iter()
        .map(|n| (n * u64::from(step + 1)) % 7)
        .sum()
}

fn run_worker(
    board: &OwnerBound<ProgressBoard>,
    field: Field,
    label: &str,
) -> Result<(), DispatchError> {
    for step in 0..=STEPS {
        let checksum = long_computation(step);
        let text = format!("Progress: {step:02}");
        info!(worker = label, step, checksum, "{text}");

        match field {
            Field::Sync => board.with(move |board| board.set(field, text))?,
            Field::NoSync => board.with_nosync(move |board| board.set(field, text))?,
        }

        thread::sleep(STEP_DELAY);
    }

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A second init (from the test below) is harmless.
    let _ = tracing_subscriber::registry()
        .with(log_fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .try_init();

    let run_loop = HeadlessRunLoop::new(EarlyWake::Defer).with_tick(OWNER_PAUSE_AFTER);
    let stopper = run_loop.stopper();
    let dispatcher = Dispatcher::bind_current(
        run_loop.waker(),
        DispatcherConfig::from_env().with_name("progress-demo"),
    );

    let board = Arc::new(OwnerBound::new(&dispatcher, ProgressBoard::default)?);

    let workers = [(Field::Sync, "  Sync"), (Field::NoSync, "NoSync")].map(|(field, label)| {
        let board = Arc::clone(&board);
        thread::spawn(move || run_worker(&board, field, label))
    });

    let monitor_dispatcher = dispatcher.clone();
    let monitor = thread::spawn(move || -> Result<(), DispatchError> {
        let mut outcome = Ok(());
        for worker in workers {
            match worker.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => outcome = Err(err),
                Err(_) => warn!("progress worker panicked"),
            }
        }

        // Queued updates run in order, so this returns once they have all
        // been applied.
        monitor_dispatcher.call(|| ())?;
        stopper.stop();
        outcome
    });

    let mut paused = false;
    run_loop.run(|event| match event {
        LoopEvent::Wake => {
            if let Err(err) = dispatcher.drain() {
                warn!(%err, "drain failed");
            }
        }
        LoopEvent::Tick if !paused => {
            paused = true;
            info!(pause_ms = OWNER_PAUSE.as_millis() as u64, "blocking the main thread");
            thread::sleep(OWNER_PAUSE);
        }
        LoopEvent::Tick => {}
    })?;

    monitor
        .join()
        .map_err(|_| "progress monitor panicked")??;

    let board = Arc::into_inner(board).ok_or("progress board still shared")?;
    let snapshot = board.with(|board| board.to_string())?;
    drop(board);
    dispatcher.shutdown();

    println!("{snapshot}");
    println!("{:?}", dispatcher.stats());

    Ok(())
}
