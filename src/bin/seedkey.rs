use colored::*;
use ecm_unlock::cli::{USAGE_EXIT_CODE, arg_value};
use ecm_unlock::seed_key::{Seed, derive_key, scan_for_seeds};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if let Some(seed_arg) = arg_value(&args, "--seed") {
        let seed = Seed::from_hex(&seed_arg)?;
        if !seed.is_global_a_typical() {
            eprintln!(
                "{} Seed does not end in 0x06, which is unusual for a Global-A ECM",
                "⚠".yellow()
            );
        }
        println!("{} = {}", seed, derive_key(seed));
    } else if let Some(path) = arg_value(&args, "--file") {
        let data = std::fs::read(&path)?;
        let pairs = scan_for_seeds(&data);
        if pairs.is_empty() {
            println!("No 5-byte seeds ending in 0x06 found.");
        }
        for pair in pairs {
            println!("{}", pair);
        }
    } else {
        eprintln!("{} Either --seed or --file must be provided.", "✗".red());
        eprintln!("Usage: seedkey --seed 0xA3A3859E06");
        eprintln!("       seedkey --file firmware.bin");
        std::process::exit(USAGE_EXIT_CODE);
    }

    Ok(())
}
