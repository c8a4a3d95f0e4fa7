use std::path::PathBuf;

use clap::Parser;
use log::info;

use keywarden::config::ControllerConfig;
use keywarden::logging::init_logging;

#[derive(Parser)]
#[command(name = "keywarden", version, about = "RFID key cabinet controller")]
struct Args {
    /// Controller configuration file (JSON5); defaults apply when absent
    #[arg(short, long, default_value = "./controller.json5")]
    config: PathBuf,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    info!("keywarden {}", keywarden::VERSION);

    let config = if args.config.exists() {
        ControllerConfig::from_file(&args.config)?
    } else {
        info!(
            "no configuration at {}, using defaults",
            args.config.display()
        );
        ControllerConfig::default()
    };

    run(config)
}

#[cfg(feature = "rpi")]
fn run(config: ControllerConfig) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use anyhow::Context;
    use log::error;
    use parking_lot::Mutex;
    use rppal::gpio::Gpio;
    use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

    use keywarden::bus::{BusArbiter, LineHandle};
    use keywarden::catalog::Catalog;
    use keywarden::hw::{DigitalOutput, GpioPin};
    use keywarden::net::server::load_tls_config;
    use keywarden::net::{Outbound, WsServer};
    use keywarden::orchestrator::Orchestrator;
    use keywarden::rfid::constants::SPI_FREQUENCY_HZ;
    use keywarden::rfid::mfrc522::Mfrc522;
    use keywarden::rfid::{CardReader, Mfrc522Reader};
    use keywarden::session::SessionManager;
    use keywarden::slot::{KeySlot, SlotConfig, UserSlot};
    use keywarden::wiring::wire_alerts;

    // rustls resolves its crypto provider at process level; ring is ours
    let _ = rustls::crypto::ring::default_provider().install_default();

    let catalog = Arc::new(
        Catalog::load(&config.database_file, &config.passwords_file)
            .context("loading key/user catalog")?,
    );
    let secret = std::fs::read(&config.secret_file)
        .with_context(|| format!("reading secret file {}", config.secret_file.display()))?;
    let tls = load_tls_config(&config.tls_cert_file, &config.tls_key_file)
        .context("loading TLS certificate and key")?;

    let gpio = Gpio::new().context("opening GPIO")?;

    // Pulse the shared reset line so every reader starts from a known state.
    let mut reset = gpio
        .get(config.pins.reader_reset)
        .context("claiming reader reset pin")?
        .into_output();
    reset.set_low();
    thread::sleep(Duration::from_secs(1));
    reset.set_high();

    let spi = Arc::new(Mutex::new(
        Spi::new(Bus::Spi0, SlaveSelect::Ss0, SPI_FREQUENCY_HZ, Mode::Mode0)
            .context("opening SPI bus")?,
    ));

    // Select line 0 belongs to the user reader, the rest follow slot order.
    let mut select_pins: Vec<Arc<dyn DigitalOutput>> = Vec::new();
    select_pins.push(Arc::new(GpioPin::new(
        gpio.get(config.pins.user_reader_select)
            .context("claiming user reader select pin")?
            .into_output(),
    )));
    for slot in &config.slots {
        select_pins.push(Arc::new(GpioPin::new(
            gpio.get(slot.reader_select)
                .with_context(|| format!("claiming select pin for {}", slot.name))?
                .into_output(),
        )));
    }
    let arbiter = BusArbiter::new(select_pins);

    let user_reader: Arc<dyn CardReader> = Arc::new(Mfrc522Reader::new(
        Mfrc522::new(Arc::clone(&spi), LineHandle::new(Arc::clone(&arbiter), 0))
            .context("initializing user reader")?,
    ));

    let mut key_slots: Vec<Arc<KeySlot>> = Vec::new();
    for (index, slot_pins) in config.slots.iter().enumerate() {
        let chip = Mfrc522::new(Arc::clone(&spi), LineHandle::new(Arc::clone(&arbiter), index + 1))
            .with_context(|| format!("initializing reader for {}", slot_pins.name))?;
        let reader: Arc<dyn CardReader> = Arc::new(Mfrc522Reader::new(chip));
        // Solenoids must come up de-energized, whatever the pin held before.
        let solenoid: Arc<dyn DigitalOutput> = Arc::new(GpioPin::new(
            gpio.get(slot_pins.solenoid)
                .with_context(|| format!("claiming solenoid pin for {}", slot_pins.name))?
                .into_output_low(),
        ));
        key_slots.push(KeySlot::new(
            SlotConfig {
                name: slot_pins.name.clone(),
                reader_timeout: config.reader_timeout(),
                relock_timeout: config.relock_timeout(),
                solenoid_settle: config.solenoid_settle(),
                theft_window: config.theft_window(),
                // Boot unlocked; the first tick settles into the locked
                // baseline and de-energizes the coil.
                init_locked: false,
            },
            reader,
            Arc::clone(&catalog),
            solenoid,
        ));
    }

    let outbound = Outbound::new();
    let session = SessionManager::new(
        Arc::clone(&catalog),
        key_slots.clone(),
        secret,
        config.session_timeout(),
        Arc::clone(&outbound),
    );
    let user_slot = UserSlot::new(
        user_reader,
        Arc::clone(&catalog),
        Arc::clone(&session),
        config.reader_timeout(),
    );
    wire_alerts(&key_slots, &user_slot, &outbound);

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            info!("shutdown requested");
            running.store(false, Ordering::SeqCst);
        })
        .context("installing signal handler")?;
    }

    let server = WsServer::new(
        Arc::clone(&session),
        outbound,
        tls,
        config.listen_port,
        Arc::clone(&running),
    );
    thread::Builder::new()
        .name("ws-server".to_string())
        .spawn(move || {
            if let Err(e) = server.run() {
                error!("control channel failed: {e}");
            }
        })
        .context("spawning network thread")?;

    Orchestrator::new(
        user_slot,
        key_slots,
        session,
        config.main_loop_delay(),
        running,
    )
    .run();

    info!("controller stopped");
    Ok(())
}

#[cfg(not(feature = "rpi"))]
fn run(_config: ControllerConfig) -> anyhow::Result<()> {
    anyhow::bail!("built without Raspberry Pi hardware support; rebuild with the `rpi` feature")
}
