use govee_led_controller::*;
use std::env;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Executes one `command[:argument]` line against the session
async fn execute(session: &mut Session<BtleplugTransport>, line: &str) -> Result<Option<String>> {
    let (command, argument) = match line.split_once(':') {
        Some((command, argument)) => (command, Some(argument.trim())),
        None => (line, None),
    };

    match (command, argument) {
        ("power_on", _) => session.turn_on(false).await?,
        ("power_off", _) => session.turn_off(false).await?,
        ("set_color", Some(spec)) => {
            let spec: ColorSpec = spec.parse()?;
            session.set_color(spec).await?;
        }
        ("set_brightness", Some(level)) => {
            let level: i64 = level
                .parse()
                .map_err(|_| Error::InvalidArgument(format!("invalid brightness {level:?}")))?;
            session.set_brightness(level).await?;
        }
        ("status", _) => {
            let state = session.refresh().await?;
            let rgb = state.rgb.unwrap_or_default();
            return Ok(Some(format!(
                "{} {},{},{} {}",
                u8::from(state.power.unwrap_or_default()),
                rgb.r,
                rgb.g,
                rgb.b,
                state.brightness.unwrap_or_default()
            )));
        }
        ("set_color" | "set_brightness", None) => {
            return Err(Error::InvalidArgument(format!("{command} needs an argument")));
        }
        (other, _) => {
            return Err(Error::InvalidArgument(format!("unknown command: {other}")));
        }
    }
    Ok(None)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the line protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("govee_led_controller=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Get a target id/mac address from command line arguments.
    let usage = "Usage: goveed <id/mac address>";
    let Some(address) = env::args().nth(1) else {
        eprintln!("{usage}");
        std::process::exit(1);
    };
    if address == "-h" || address == "--help" {
        eprintln!("{usage}");
        std::process::exit(0);
    }

    let transport = BtleplugTransport::new().await?;
    let mut session = Session::new(transport, address);
    session.connect().await?;

    // Inform about successful initialization
    println!("OK");

    // Mainloop: one command per line until stdin closes
    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                eprintln!("ERR {e}");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match execute(&mut session, line).await {
            Ok(Some(reply)) => println!("OK {reply}"),
            Ok(None) => println!("OK"),
            Err(e) => println!("ERR {e}"),
        }
    }

    session.disconnect().await
}
