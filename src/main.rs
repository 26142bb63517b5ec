//! # LED Matrix Controller Application Entry Point
//!
//! This binary wires the library together: configuration, image assets, the serial
//! handshake, the device directory and the render loop. Requests arrive as JSON lines
//! on stdin and each one is answered on stdout.
//!
//! Any transport failure ends the process with exit status 1 so that the supervisor
//! restarts it and the matrix gets a fresh reset and handshake.


use anyhow::Context;
use led_matrix_lib::commands::ControllerHandle;
use led_matrix_lib::config::{Config, CONFIG_FILE};
use led_matrix_lib::devices::{DeviceDirectory, StaticDeviceSource};
use led_matrix_lib::image_asset::{IconSet, PaneAssets};
use led_matrix_lib::layout::layout_inputs;
use led_matrix_lib::pane::{MediaState, StandardPanes};
use led_matrix_lib::rpc::RpcServer;
use led_matrix_lib::scheduler::{ControlMode, RenderLoop};
use led_matrix_lib::transport::{CommandReset, SerialLink, TransportError, TtyOpener};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &Config) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn start_mode(config: &Config) -> ControlMode {
    if config.display.start_interactive {
        ControlMode::Interactive
    } else {
        ControlMode::Pairing
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    // Images are fixed resources: the display cannot run without them
    let assets = PaneAssets::load_dir(&config.assets.image_dir).with_context(|| {
        format!("loading pane images from {}", config.assets.image_dir.display())
    })?;
    let icons = IconSet::load_dir(&config.assets.icon_dir).with_context(|| {
        format!("loading icons from {}", config.assets.icon_dir.display())
    })?;

    // The handshake read blocks without a timeout, keep it off the runtime threads
    let settings = config.serial.link_settings();
    let opener = TtyOpener::new(&config.serial.port);
    let reset = CommandReset::new(&config.serial.reset_command);
    let link = tokio::task::spawn_blocking(move || -> Result<_, TransportError> {
        let mut link = SerialLink::new(settings);
        link.connect(&opener, &reset)?;
        Ok(link)
    })
    .await
    .context("handshake task panicked")?
    .context("connecting to LED matrix")?;

    let directory = DeviceDirectory::new(Arc::new(StaticDeviceSource::new(config.devices.clone())));
    let (media_state, media_reports) = watch::channel(MediaState::default());
    let panes = StandardPanes::new(assets, directory, media_reports, config.display.debounce())
        .with_diagnostic_pane(config.diagnostic_pane());

    let (commands, command_queue) = mpsc::unbounded_channel();
    let (waker, inputs) = layout_inputs();
    let handle = ControllerHandle::new(commands, Arc::new(icons), waker);

    let render = RenderLoop::new(
        link,
        command_queue,
        Box::new(panes),
        inputs,
        config.display.idle_timeout(),
        start_mode(&config),
    );

    let server = RpcServer::new(handle.clone(), media_state);
    tokio::spawn(async move {
        let stdin = BufReader::new(tokio::io::stdin());
        if let Err(e) = server.serve(stdin, tokio::io::stdout()).await {
            warn!("Request reader stopped: {}", e);
        }
    });

    let shutdown = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            if let Err(e) = shutdown.shutdown() {
                warn!("{}", e);
            }
        }
    });

    render.run().await.context("render loop failed")
}

fn main() {
    // Optional config path as the first argument
    let path = env::args().nth(1).unwrap_or_else(|| CONFIG_FILE.to_string());
    let (config, origin) = Config::read_from_path(path);
    init_logging(&config);
    origin.log(&config);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    let result = rt.block_on(run(config));
    // stdin and a wedged write can hold blocking threads forever
    rt.shutdown_timeout(Duration::from_secs(1));

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
