use log::{info, warn};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use actix_web::{App, HttpServer, web};

use vitolink::{
    AppConfig, AppState, DeviceLink, EdgeSource, GpioSampler, PulseTimer, RegisterTree, channel,
    epoch_secs,
};

#[cfg(feature = "hardware-gpio")]
use vitolink::LibgpiodSource;
#[cfg(not(feature = "hardware-gpio"))]
use vitolink::MockEdgeSource;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("VITOLINK_CONFIG").ok())
        .unwrap_or_else(|| "config.json".to_string());
    let config =
        AppConfig::load_from_file(&config_path).unwrap_or_else(|e| panic!("Failed to load config: {e}"));

    let link = match &config.serial {
        Some(serial) => match channel::open(&serial.device) {
            Ok(chan) => {
                let link = DeviceLink::new(chan);
                if let Err(e) = link.initialize() {
                    warn!("Handshake failed, continuing: {e}");
                }
                link
            }
            Err(e) => {
                warn!("Failed to open serial port ({e}). Operating in simulation mode.");
                DeviceLink::simulated()
            }
        },
        None => {
            info!("No serial device configured. Operating in simulation mode.");
            DeviceLink::simulated()
        }
    };
    let link = Arc::new(link);

    let registry = Arc::new(
        RegisterTree::from_config(&config.registers, config.default_refresh, link)
            .unwrap_or_else(|e| panic!("Failed to load register tree: {e}")),
    );

    let pulses = PulseTimer::new(registry.clone());
    let sampler = make_sampler(&config, registry.clone());
    thread::spawn(move || poll_loop(pulses, sampler));

    let app_state = AppState {
        registry,
        metrics_prefix: config.metrics.prefix.clone(),
        metrics_root: config.metrics.root.clone(),
    };

    let http_cfg = config.http.clone();
    let server = HttpServer::new(move || {
        let scope_path = http_cfg.path.clone();
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .service(app_state.api_scope(&scope_path))
    });

    let bind_addrs: String;
    let http_cfg = config.http.clone();
    let server = match (&http_cfg.unix_socket, &http_cfg.host) {
        (Some(socket_path), Some(host)) => {
            if Path::new(socket_path).exists() {
                fs::remove_file(socket_path)?;
            }
            bind_addrs = format!("{} and {}", socket_path, host);

            server.bind_uds(socket_path)?.bind_auto_h2c(host)?
        }
        (Some(socket_path), None) => {
            if Path::new(socket_path).exists() {
                fs::remove_file(socket_path)?;
            }
            bind_addrs = socket_path.clone();

            server.bind_uds(socket_path)?
        }
        (None, Some(host)) => {
            bind_addrs = host.clone();

            server.bind_auto_h2c(host)?
        }
        _ => {
            panic!("Config error: either 'unix_socket' or 'host' must be specified")
        }
    };

    info!("Starting server on {}...", bind_addrs);

    server.run().await
}

fn make_sampler(config: &AppConfig, registry: Arc<RegisterTree>) -> Option<GpioSampler> {
    let leaves = registry.gpio_leaves();
    if leaves.is_empty() {
        return None;
    }

    #[cfg(feature = "hardware-gpio")]
    let source: Box<dyn EdgeSource> = {
        let mut lines: Vec<u32> = leaves.iter().map(|&(line, _)| line).collect();
        lines.sort_unstable();
        lines.dedup();
        Box::new(
            LibgpiodSource::open(&config.gpio.chip, &lines)
                .unwrap_or_else(|e| panic!("Failed to init gpio: {e}")),
        )
    };
    #[cfg(not(feature = "hardware-gpio"))]
    let source: Box<dyn EdgeSource> = Box::new(MockEdgeSource::default());

    Some(GpioSampler::new(registry, source, &config.gpio.filters))
}

fn poll_loop(pulses: PulseTimer, mut sampler: Option<GpioSampler>) {
    let mut last = 0u64;
    loop {
        let now = epoch_secs();
        if now != last {
            pulses.tick(now);
            last = now;
        }
        match sampler.as_mut() {
            Some(sampler) => {
                if let Err(e) = sampler.poll(now) {
                    warn!("gpio poll failed: {e}");
                    thread::sleep(Duration::from_secs(1));
                }
            }
            None => thread::sleep(Duration::from_secs(1)),
        }
    }
}
