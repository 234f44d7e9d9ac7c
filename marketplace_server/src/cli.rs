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
    // Webhook secrets, the JWT secret and API keys are deliberately absent from this list
    const DISPLAY_ENVS: [&str; 15] = [
        "RUST_LOG",
        "MKP_HOST",
        "MKP_PORT",
        "MKP_DATABASE_URL",
        "MKP_RUN_MIGRATIONS",
        "MKP_ALLOW_UNSIGNED_WEBHOOKS",
        "MKP_GATEWAY_MODE",
        "MKP_GATEWAY_PROXY_URL",
        "MKP_GATEWAY_TIMEOUT_SECS",
        "MKP_AFTERSHIP_BASE_URL",
        "MKP_PLATFORM_FEE_BPS",
        "MKP_SALES_TAX_BPS",
        "MKP_GATEWAY_FEE_PAYER",
        "MKP_TRACKING_SYNC_INTERVAL_MINS",
        "MKP_AUTO_COMPLETE_AFTER_DAYS",
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
