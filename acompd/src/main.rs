use std::{process::ExitCode, time::Duration, time::Instant};

use acomp::{
    protocol::Interface,
    reexports::calloop::timer::{TimeoutAction, Timer},
    server::{Display, DisplayConfig},
    wayland::{
        event_loop::{CompositorLoop, LoopConfig, LoopData},
        socket::ListeningSocketSource,
    },
};
use clap::Parser;
use tracing::{error, info};

mod state;

use state::HeadlessRenderer;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Name of the listening socket, in `$XDG_RUNTIME_DIR`
    ///
    /// The first free `wayland-N` is picked if omitted.
    #[arg(short, long)]
    socket: Option<String>,
    /// Longest time a poll may block, in milliseconds
    #[arg(long, default_value_t = 100)]
    tick_ms: u64,
    /// Interval between two frames, in milliseconds
    #[arg(long, default_value_t = 16)]
    frame_interval_ms: u64,
    /// Largest accepted request, in bytes
    #[arg(long, default_value_t = 4096)]
    max_message_size: usize,
}

fn init_logging() {
    if let Ok(env_filter) = tracing_subscriber::EnvFilter::try_from_default_env() {
        tracing_subscriber::fmt().compact().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().compact().init();
    }
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut display = Display::new(DisplayConfig {
        max_message_size: cli.max_message_size,
        ..Default::default()
    });
    display.create_global(Interface::Compositor, 4)?;
    display.create_global(Interface::Shm, 1)?;

    let config = LoopConfig {
        tick_timeout: Duration::from_millis(cli.tick_ms),
    };
    let mut event_loop = CompositorLoop::new(display, HeadlessRenderer::default(), config)?;
    // signals are blocked from here on, before clients can find the socket
    event_loop.handle_signals()?;

    let source = match &cli.socket {
        Some(name) => ListeningSocketSource::with_name(name)?,
        None => ListeningSocketSource::new_auto()?,
    };
    if let Some(name) = source.socket_name() {
        std::env::set_var("WAYLAND_DISPLAY", name);
        info!(?name, "Listening on wayland socket");
    }
    event_loop.listen(source)?;

    let start = Instant::now();
    let interval = Duration::from_millis(cli.frame_interval_ms.max(1));
    event_loop
        .handle()
        .insert_source(
            Timer::from_duration(interval),
            move |_, _, data: &mut LoopData<HeadlessRenderer>| {
                for (client, buffer) in data.handler.take_releases() {
                    data.display.release_buffer(client, buffer);
                }
                data.display.send_all_frame_callbacks(start.elapsed().as_millis() as u32);
                TimeoutAction::ToDuration(interval)
            },
        )
        .map_err(|err| err.error)?;

    event_loop.run()?;
    info!(frames = event_loop.handler().frames(), "Shut down");
    Ok(())
}
