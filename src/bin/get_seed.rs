use colored::*;
use ecm_unlock::cli::{audit_logger, session_config};
use ecm_unlock::errors::SecurityAccessError;
use ecm_unlock::seed_key::Seed;
use ecm_unlock::session::SecurityAccessSession;
use ecm_unlock::transport::BusTransport;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let config = session_config(&args)?;

    println!("{}", "═══════════════════════════════════════".cyan().bold());
    println!("{}", "       Global-A Seed Retrieval         ".cyan().bold());
    println!("{}", "═══════════════════════════════════════".cyan().bold());
    println!();

    let transport = BusTransport::connect(&config.bus_address, config.client_name.clone())?;
    println!(
        "{} Connected to CAN bus on {}",
        "✓".green().bold(),
        config.bus_address.bright_white()
    );

    let audit = audit_logger(&config)?;
    let mut session = SecurityAccessSession::new(transport, config);
    if let Some(logger) = audit {
        println!("{} Audit log: {}", "ℹ".bright_blue(), logger.log_path().display());
        session = session.with_audit_log(logger);
    }

    match fetch_seed(&mut session) {
        Ok(seed) => {
            println!("{} Retrieved seed: {}", "✓".green().bold(), seed.to_string().bright_white());
            if !seed.is_global_a_typical() {
                println!(
                    "{} Seed does not end in 0x06, which is unusual for a Global-A ECM",
                    "⚠".yellow()
                );
            }
        }
        Err(e) => {
            eprintln!("{} {}", "✗".red(), e);
            eprintln!("{} Failed to retrieve seed.", "✗".red());
        }
    }

    session.close();
    println!("{} CAN bus shutdown.", "→".bright_black());
    Ok(())
}

fn fetch_seed(
    session: &mut SecurityAccessSession<BusTransport>,
) -> Result<Seed, SecurityAccessError> {
    session.open_extended_session()?;
    println!("{} Extended diagnostic session started.", "✓".green());
    session.send_tester_present()?;
    session.request_seed()
}
