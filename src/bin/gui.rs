use std::thread::{self, JoinHandle};
use std::time::Duration;

use owner_dispatch::{DispatchError, Dispatcher, DispatcherConfig, WinitWaker};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use winit::{
    dpi::LogicalSize,
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoopBuilder},
    window::{Window, WindowBuilder},
};

#[derive(Debug, Clone, Copy)]
struct DispatchWake;

fn spawn_title_worker(
    dispatcher: Dispatcher,
    window: &'static Window,
    label: &'static str,
    nosync: bool,
) -> JoinHandle<Result<(), DispatchError>> {
    thread::spawn(move || {
        for step in 0..=100 {
            let title = format!("Progress Demo - {label}: {step:02}");
            info!(worker = label, step, "progress");

            if nosync {
                dispatcher.call_nosync(move || window.set_title(&title))?;
            } else {
                dispatcher.call(move || window.set_title(&title))?;
            }

            thread::sleep(Duration::from_millis(125));
        }

        Ok(())
    })
}

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let event_loop = EventLoopBuilder::<DispatchWake>::with_user_event()
        .build()
        .expect("Failed to create event loop");

    let window: &'static Window = Box::leak(Box::new(
        WindowBuilder::new()
            .with_title("Progress Demo")
            .with_inner_size(LogicalSize::new(480.0, 120.0))
            .build(&event_loop)
            .expect("Failed to create window"),
    ));

    let dispatcher = Dispatcher::bind_current(
        WinitWaker::new(event_loop.create_proxy(), || DispatchWake),
        DispatcherConfig::from_env().with_name("winit"),
    );

    let workers = [
        spawn_title_worker(dispatcher.clone(), window, "Sync", false),
        spawn_title_worker(dispatcher.clone(), window, "NoSync", true),
    ];

    event_loop
        .run(|event, elwt| {
            elwt.set_control_flow(ControlFlow::Wait);

            match event {
                Event::UserEvent(DispatchWake) => {
                    if let Err(err) = dispatcher.drain() {
                        debug!(%err, "drain skipped");
                    }
                }
                Event::WindowEvent {
                    event: WindowEvent::CloseRequested,
                    window_id,
                } if window_id == window.id() => {
                    elwt.exit();
                }
                Event::LoopExiting => {
                    dispatcher.run_loop_exited();
                }
                _ => {}
            }
        })
        .expect("Event loop failed");

    for worker in workers {
        match worker.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => info!(%err, "worker stopped early"),
            Err(_) => eprintln!("Worker panicked"),
        }
    }

    println!("{:?}", dispatcher.stats());
}
