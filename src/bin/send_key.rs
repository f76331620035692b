use colored::*;
use ecm_unlock::cli::{USAGE_EXIT_CODE, arg_value, audit_logger, session_config};
use ecm_unlock::errors::SecurityAccessError;
use ecm_unlock::seed_key::Key;
use ecm_unlock::session::SecurityAccessSession;
use ecm_unlock::transport::BusTransport;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let Some(key_arg) = arg_value(&args, "--key") else {
        eprintln!("{} --key is required", "✗".red());
        eprintln!("Usage: send_key --key 0x1D1E82E706 [--can-channel 127.0.0.1:9000] [--config ecm.json]");
        std::process::exit(USAGE_EXIT_CODE);
    };
    let key = Key::from_hex(&key_arg)?;
    let config = session_config(&args)?;

    println!("{}", "═══════════════════════════════════════".yellow().bold());
    println!("{}", "        Global-A Key Submission        ".yellow().bold());
    println!("{}", "═══════════════════════════════════════".yellow().bold());
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
        session = session.with_audit_log(logger);
    }

    match session.unlock_with_key(key) {
        Ok(report) => {
            println!("{} Seed: {}", "→".cyan(), report.seed);
            println!("{} ECM Unlocked! Algorithm is correct.", "✓".green().bold());
            println!("{} Key {} unlocked the ECM.", "✓".green().bold(), key);
        }
        Err(SecurityAccessError::LockedOut { delay }) => {
            eprintln!(
                "{} Lockout (NRC 0x36). Waited {} seconds.",
                "⚠".yellow().bold(),
                delay.as_secs()
            );
            eprintln!("{} Key {} failed.", "✗".red(), key);
        }
        Err(e) => {
            eprintln!("{} {}", "✗".red(), e);
            eprintln!("{} Key {} failed.", "✗".red(), key);
        }
    }

    println!("{} CAN bus shutdown. Final state: {}", "→".bright_black(), session.state());
    Ok(())
}
