use colored::*;
use ecm_unlock::cli::{audit_logger, session_config};
use ecm_unlock::errors::SecurityAccessError;
use ecm_unlock::session::SecurityAccessSession;
use ecm_unlock::transport::BusTransport;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let config = session_config(&args)?;

    println!("{}", "═══════════════════════════════════════".green().bold());
    println!("{}", "      Global-A SecurityAccess Unlock   ".green().bold());
    println!("{}", "═══════════════════════════════════════".green().bold());
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

    println!("{} Running seed/key handshake...", "→".cyan());
    match session.unlock() {
        Ok(report) => {
            if report.atypical_seed {
                println!(
                    "{} Seed does not end in 0x06, which is unusual for a Global-A ECM",
                    "⚠".yellow()
                );
            }
            println!("{} Seed: {}", "→".cyan(), report.seed.to_string().bright_white());
            println!("{} Key:  {}", "→".cyan(), report.key.to_string().bright_white());
            println!("{} ECM Unlocked! Algorithm is correct.", "✓".green().bold());
        }
        Err(SecurityAccessError::InvalidKey) => {
            eprintln!("{} Invalid Key (NRC 0x35). Algorithm may be incorrect.", "✗".red());
        }
        Err(SecurityAccessError::LockedOut { delay }) => {
            eprintln!(
                "{} Lockout (NRC 0x36). Waited {} seconds; retry later.",
                "⚠".yellow().bold(),
                delay.as_secs()
            );
        }
        Err(e) => eprintln!("{} {}", "✗".red(), e),
    }

    println!("{} CAN bus shutdown. Final state: {}", "→".bright_black(), session.state());
    Ok(())
}
