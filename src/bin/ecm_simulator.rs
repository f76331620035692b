use colored::*;
use ecm_unlock::cli::arg_value;
use ecm_unlock::config::DEFAULT_BUS_ADDRESS;
use ecm_unlock::ecm::VirtualEcm;
use ecm_unlock::seed_key::Seed;
use ecm_unlock::transport::{BusTransport, DiagnosticTransport};
use ecm_unlock::types::{CanFrame, can_ids};
use ecm_unlock::uds::{format_hex, strip_pci};
use std::time::{Duration, Instant};

const ECU_NAME: &str = "GLOBAL_A_ECM";
const POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_RNG_SEED: u64 = 0x7E8;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let bus_address =
        arg_value(&args, "--can-channel").unwrap_or_else(|| DEFAULT_BUS_ADDRESS.to_string());
    let rng_seed = match arg_value(&args, "--rng-seed") {
        Some(value) => value.parse::<u64>()?,
        None => DEFAULT_RNG_SEED,
    };

    let mut ecm = VirtualEcm::new(rng_seed);
    if let Some(seed) = arg_value(&args, "--fixed-seed") {
        ecm = ecm.with_fixed_seed(Seed::from_hex(&seed)?);
    }

    println!("{}", "═══════════════════════════════════════".magenta().bold());
    println!("{}", "       Virtual Global-A ECM            ".magenta().bold());
    println!("{}", "═══════════════════════════════════════".magenta().bold());
    println!();

    let mut transport = BusTransport::connect(&bus_address, ECU_NAME.to_string())?;
    println!(
        "{} Listening on 0x{:03X}, answering on 0x{:03X} via {}",
        "✓".green().bold(),
        can_ids::ECM_REQUEST.value(),
        can_ids::ECM_RESPONSE.value(),
        bus_address.bright_white()
    );

    loop {
        let Some(frame) = transport.receive(POLL_INTERVAL)? else {
            continue;
        };
        if frame.id != can_ids::ECM_REQUEST {
            continue;
        }

        let request = strip_pci(&frame.data);
        let response = ecm.handle_request(request, Instant::now());
        println!(
            "  {} {} from {} -> {}",
            "→".yellow(),
            format_hex(request).bright_white(),
            frame.source.bright_cyan(),
            format_hex(&response)
        );

        transport.send(&CanFrame::new(
            can_ids::ECM_RESPONSE,
            response,
            ECU_NAME.to_string(),
        ))?;
    }
}
