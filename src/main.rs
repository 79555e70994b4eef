use smallsh::config::ShellOptions;
use smallsh::{Interpreter, ignore_interrupts};
use tracing_subscriber::{EnvFilter, fmt};

fn main() -> anyhow::Result<()> {
    let options: ShellOptions = argh::from_env();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&options.log_level));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    tracing::debug!("Parsed CLI arguments: {:?}", options);

    ignore_interrupts()?;
    Interpreter::with_config(options.config()).repl()?;
    Ok(())
}
