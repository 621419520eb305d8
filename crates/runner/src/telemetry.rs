use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Default filter when `RUST_LOG` adds nothing more specific
pub const DEFAULT_DIRECTIVE: &str = "candela=info";

/// Install the global fmt subscriber filtered by `RUST_LOG`
pub fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(DEFAULT_DIRECTIVE.parse()?))
        .try_init()?;
    Ok(())
}
