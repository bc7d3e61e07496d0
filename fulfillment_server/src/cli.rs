use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // The bot token and merchant id are secrets
    const DISPLAY_ENVS: [&str; 17] = [
        "RUST_LOG",
        "OFP_HOST",
        "OFP_PORT",
        "OFP_DATABASE_URL",
        "OFP_PUBLIC_BASE_URL",
        "OFP_DEBUG_ERRORS",
        "OFP_MAX_WS_CONNECTIONS",
        "OFP_HIGH_VALUE_THRESHOLD",
        "OFP_FIRST_ORDER_THRESHOLD",
        "OFP_BOT_CHAT_IDS",
        "OFP_BOT_API_URL",
        "OFP_BOT_TIMEOUT",
        "OFP_GATEWAY_URL",
        "OFP_GATEWAY_MERCHANT_NAME",
        "OFP_GATEWAY_TIMEOUT",
        "OFP_QR_RETENTION_DAYS",
        "OFP_QR_CLEANUP_INTERVAL",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
