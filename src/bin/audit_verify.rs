use colored::*;
use ecm_unlock::audit_log::verify_log_file;
use ecm_unlock::cli::USAGE_EXIT_CODE;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let Some(path) = std::env::args().nth(1).map(PathBuf::from) else {
        eprintln!("Usage: audit_verify <security_logs/TESTER_....jsonl>");
        std::process::exit(USAGE_EXIT_CODE);
    };

    let result = verify_log_file(&path)?;

    println!("{} {}", "→".cyan(), path.display().to_string().bright_white());
    println!("  Entries: {}", result.total_entries);
    if result.verified {
        println!("{} Audit chain intact", "✓".green().bold());
    } else {
        println!("{} Audit chain BROKEN", "✗".red().bold());
        for issue in &result.issues {
            println!("  {} {}", "•".red(), issue);
        }
        std::process::exit(1);
    }
    Ok(())
}
