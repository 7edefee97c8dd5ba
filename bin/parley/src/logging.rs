//! Logging to stderr, so log lines never interleave with console output.

use eyre::{Result, WrapErr};
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::cli::LogArgs;

/// Install the global subscriber.
pub(crate) fn init_logging(args: &LogArgs) -> Result<()> {
    let output = fmt::layer().with_writer(std::io::stderr);
    let output = if args.json {
        output.json().boxed()
    } else {
        output.without_time().boxed()
    };
    tracing_subscriber::registry()
        .with(output.with_filter(filter_for(args)?))
        .try_init()?;
    Ok(())
}

/// `--quiet` wins outright. Otherwise `RUST_LOG` applies, falling back to the
/// `-v` level, and `--log.filter` directives go on top.
fn filter_for(args: &LogArgs) -> Result<EnvFilter> {
    let mut filter = if args.quiet {
        EnvFilter::new("error")
    } else {
        let level = match args.verbosity {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        };
        EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env()
            .wrap_err("invalid RUST_LOG")?
    };
    if !args.quiet {
        let directives = args.filter.iter().flat_map(|f| f.split(','));
        for directive in directives.map(str::trim).filter(|d| !d.is_empty()) {
            let directive = directive
                .parse()
                .wrap_err_with(|| format!("invalid --log.filter directive {directive:?}"))?;
            filter = filter.add_directive(directive);
        }
    }
    Ok(filter)
}
