//! ai-gate-config — 加载、校验并打印生效的治理配置
//!
//! Usage:
//!   ai-gate-config [<config.yaml>]
//!
//! Without a path, `AI_GATE_CONFIG` is used; without either, the defaults.
//! `AI_GATE_*` overrides are applied in every case.

use ai_gate::GovernanceConfig;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("AI_GATE_CONFIG").ok());

    if matches!(path.as_deref(), Some("--help" | "-h")) {
        println!("usage: ai-gate-config [<config.yaml>]");
        return;
    }

    let loaded = match &path {
        Some(p) => {
            tracing::info!(path = %p, "loading configuration");
            GovernanceConfig::load(p)
        }
        None => {
            tracing::info!("no configuration file given, using defaults");
            GovernanceConfig::from_env()
        }
    };

    let config = match loaded {
        Ok(c) => c,
        Err(e) => {
            let field = e
                .context()
                .and_then(|c| c.field_path.clone())
                .unwrap_or_default();
            tracing::error!(error = %e, code = e.standard_code().code(), field = %field, "invalid configuration");
            std::process::exit(1);
        }
    };

    match config.to_json_pretty() {
        Ok(json) => println!("{json}"),
        Err(e) => {
            tracing::error!(error = %e, "failed to render configuration");
            std::process::exit(1);
        }
    }
}
