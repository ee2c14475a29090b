use clap::Parser as _;
use ecl310_tools::commands;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[derive(clap::Parser)]
#[clap(version, about, author)]
enum Commands {
    Registers(commands::registers::Args),
    Read(commands::read::Args),
    HeatCurve(commands::heat_curve::Args),
    Circuits(commands::circuits::Args),
    Info(commands::info::Args),
    DateTime(commands::date_time::Args),
    Health(commands::health::Args),
}

fn end<E: std::error::Error>(r: Result<(), E>) {
    std::process::exit(match r {
        Ok(_) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            let mut cause = e.source();
            while let Some(e) = cause {
                eprintln!("  because: {e}");
                cause = e.source();
            }
            1
        }
    });
}

fn main() {
    let filter_description = std::env::var("ECL310_TOOLS_LOG").unwrap_or_default();
    let filter = match filter_description.parse::<tracing_subscriber::filter::Targets>() {
        Ok(filter) if !filter_description.is_empty() => filter,
        Ok(_) => tracing_subscriber::filter::Targets::new()
            .with_default(tracing_subscriber::filter::LevelFilter::WARN),
        Err(e) => {
            eprintln!("warning: ignoring ECL310_TOOLS_LOG: {e}");
            tracing_subscriber::filter::Targets::new()
                .with_default(tracing_subscriber::filter::LevelFilter::WARN)
        }
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
    match Commands::parse() {
        Commands::Registers(args) => end(commands::registers::run(args)),
        Commands::Read(args) => end(commands::read::run(args)),
        Commands::HeatCurve(args) => end(commands::heat_curve::run(args)),
        Commands::Circuits(args) => end(commands::circuits::run(args)),
        Commands::Info(args) => end(commands::info::run(args)),
        Commands::DateTime(args) => end(commands::date_time::run(args)),
        Commands::Health(args) => end(commands::health::run(args)),
    }
}
