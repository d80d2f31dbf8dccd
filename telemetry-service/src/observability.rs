use tracing_subscriber::{filter::Directive, filter::LevelFilter, EnvFilter};

/// Directives applied on top of `RUST_LOG`.
///
/// sqlx logs every statement at info, which on the ingestion path means two
/// lines per reading.
const DEFAULT_DIRECTIVES: [&str; 2] = ["telemetry_service=info", "sqlx=warn"];

pub fn init_tracing() {
    let filter = DEFAULT_DIRECTIVES
        .iter()
        .fold(EnvFilter::from_default_env(), |filter, d| {
            let directive: Directive = d.parse().unwrap_or_else(|_| LevelFilter::INFO.into());
            filter.add_directive(directive)
        });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
