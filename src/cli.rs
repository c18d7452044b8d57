//! Command-line argument parsing for ChargeWatch

/// Parse command line arguments
pub struct Args {
    pub once: bool,
    pub validate: bool,
    pub help: bool,
    pub slots: Option<String>,
}

pub fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    parse_args_from(&args)
}

fn parse_args_from(args: &[String]) -> Args {
    let mut result = Args {
        once: false,
        validate: false,
        help: false,
        slots: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--once" => result.once = true,
            "--validate" => result.validate = true,
            "--help" | "-h" => result.help = true,
            "--slots" => {
                if i + 1 < args.len() {
                    i += 1;
                    result.slots = Some(args[i].clone());
                }
            }
            _ => {}
        }
        i += 1;
    }

    result
}

pub fn print_help() {
    println!("ChargeWatch - Smart-Charge Slot Monitor\n");
    println!("USAGE:");
    println!("    chargewatch [OPTIONS]\n");
    println!("OPTIONS:");
    println!("    --once              Evaluate the slot data once and exit");
    println!("    --validate          Validate configuration and slot data, then exit");
    println!("    --slots PATH        JSON slot data file (overrides SLOTS_FILE)");
    println!("    --help, -h          Show this help message\n");
    println!("ENVIRONMENT:");
    println!("    See .env.example for configuration variables");
}
