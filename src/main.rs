use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use govee_led_controller::*;
use tokio::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// MAC address (or platform id) of the LED strip
    #[arg(short, long, default_value = "A4:C1:38:35:97:24")]
    address: String,

    /// Settle time after each command in milliseconds
    #[arg(long, default_value_t = 300)]
    delay_ms: u64,

    /// Connection timeout in seconds
    #[arg(long, default_value_t = 15)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Query power, turn on if off, set lime, read color and brightness
    Demo,
    /// Turn LED strip on
    On {
        /// Ramp brightness up first
        #[arg(short, long)]
        smooth: bool,
    },
    /// Turn LED strip off
    Off {
        /// Ramp brightness down first
        #[arg(short, long)]
        smooth: bool,
    },
    /// Set brightness
    Brightness {
        /// Brightness level (0-255)
        level: i64,
    },
    /// Set color by name, R,G,B or #rrggbb
    Color {
        /// e.g. lime, 255,0,14 or #ff000e
        spec: String,
    },
    /// Print power, color and brightness
    Status,
    /// List known color names
    Colors,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("govee_led_controller=info")),
        )
        .compact()
        .init();

    // Initialize color-eyre for pretty error reporting
    color_eyre::install()?;

    let cli = Cli::parse();
    debug!("Parsed command line arguments");

    let command = cli.command.unwrap_or(Commands::Demo);
    if let Commands::Colors = command {
        for c in COLORS {
            println!("{:<14} {}", c.name, c.rgb);
        }
        return Ok(());
    }

    let config = DeviceConfig {
        command_delay: Duration::from_millis(cli.delay_ms),
        connect_timeout: Duration::from_secs(cli.timeout_secs),
        ..DeviceConfig::default()
    };

    let transport = BtleplugTransport::new().await?;
    let mut session = Session::with_config(transport, cli.address, config);
    if let Err(e) = session.connect().await {
        error!("Failed to connect: {}", e);
        return Err(e.into());
    }

    let outcome = run(&mut session, command).await;

    // Always release the connection, even if the command failed
    session.disconnect().await?;
    outcome
}

#[instrument(skip_all)]
async fn run(session: &mut Session<BtleplugTransport>, command: Commands) -> Result<()> {
    match command {
        Commands::Demo => run_demo(session).await?,
        Commands::On { smooth } => session.turn_on(smooth).await?,
        Commands::Off { smooth } => session.turn_off(smooth).await?,
        Commands::Brightness { level } => session.set_brightness(level).await?,
        Commands::Color { spec } => {
            let spec: ColorSpec = spec.parse()?;
            session.set_color(spec).await?;
        }
        Commands::Status => {
            let state = session.refresh().await?;
            print_state(&state);
        }
        Commands::Colors => {}
    }
    Ok(())
}

fn print_state(state: &DeviceState) {
    let or_unknown = |v: Option<String>| v.unwrap_or_else(|| "unknown".to_string());
    println!(
        "power:      {}",
        or_unknown(state.power.map(|on| (if on { "on" } else { "off" }).to_string()))
    );
    println!(
        "color:      {} ({})",
        or_unknown(state.rgb.map(|rgb| rgb.to_string())),
        or_unknown(state.color_name.clone())
    );
    println!(
        "brightness: {}",
        or_unknown(state.brightness.map(|b| b.to_string()))
    );
}

/// Run the basic power/color/status walkthrough
#[instrument(skip(session))]
async fn run_demo(session: &mut Session<BtleplugTransport>) -> Result<()> {
    info!(
        "Running demo against {}",
        session.device_name().unwrap_or("unnamed device")
    );

    info!("Getting LED power");
    if !session.get_power().await? {
        info!("Turning on LED");
        session.turn_on(false).await?;
    }

    info!("Changing color");
    session.set_color("lime").await?;

    info!("Getting LED color");
    let rgb = session.get_rgb().await?;
    info!("Color is {}", rgb);

    info!("Getting LED brightness");
    let brightness = session.get_brightness().await?;
    info!("Brightness is {}", brightness);

    info!("Demo completed!");
    Ok(())
}
