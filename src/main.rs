//! Kodegen Bundler Pipeline - packaging pipeline for desktop applications.
//!
//! This binary evaluates the target graph declared in `packaging.toml` and
//! produces the source archive, macOS bundle and AppImage with proper error
//! handling and artifact verification.

use kodegen_bundler_pipeline::cli::{self, RuntimeConfig};
use std::process;

#[tokio::main]
async fn main() {
    let args = cli::Args::parse_args();

    // Initialize logging; RUST_LOG still wins over the flags.
    let default_level = if args.verbose {
        "debug"
    } else if args.quiet {
        "warn"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();

    let config = RuntimeConfig::from(&args);
    let exit_code = match cli::run(args, &config).await {
        Ok(()) => 0,
        Err(e) => {
            let output = config.output();
            let _ = output.error(&e.to_string());
            for suggestion in e.recovery_suggestions() {
                let _ = output.indent(&format!("hint: {suggestion}"));
            }
            e.exit_code()
        }
    };

    process::exit(exit_code);
}
