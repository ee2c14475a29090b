use std::future::Future;

use crate::access::OneBased;
use crate::connection::{self, Connection};
use crate::registers::RegisterIndex;
use crate::{output, service};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not start the async runtime")]
    Runtime(#[source] std::io::Error),
    #[error(transparent)]
    Output(#[from] output::Error),
    #[error("the request to the controller failed")]
    Service(#[from] service::Error),
    #[error("no known register matches `{0}`")]
    NoMatchingRegisters(String),
    #[error("the controller is not healthy")]
    Unhealthy,
}

type Service = service::Service<OneBased<Connection>>;

/// Registers selected by `filter`: the one named exactly by it, otherwise every register whose
/// name, description or PNU contains it.
fn select_registers(filter: Option<&str>) -> Vec<RegisterIndex> {
    let Some(filter) = filter else {
        return RegisterIndex::all().collect();
    };
    match RegisterIndex::from_name(filter) {
        Some(exact) => vec![exact],
        None => RegisterIndex::all().filter(|r| r.is_match(filter)).collect(),
    }
}

/// Runs `future` to completion with a controller connection.
fn with_service<T, F: Future<Output = Result<T, Error>>>(
    args: connection::Args,
    f: impl FnOnce(Service) -> F,
) -> Result<T, Error> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(Error::Runtime)?;
    runtime.block_on(async move { f(service::Service::new(OneBased::new(Connection::new(args)))).await })
}

pub mod registers {
    use super::{Error, select_registers};
    use crate::output::{self, Record};
    use crate::registers::{Kind, Mode, RegisterIndex};

    /// Search and output known controller parameters.
    #[derive(clap::Parser)]
    pub struct Args {
        /// A register name, or text to look for in names, descriptions and PNUs.
        filter: Option<String>,
        /// Only show registers that can be written to.
        #[arg(long)]
        writable: bool,
        #[clap(flatten)]
        output: output::Args,
    }

    #[derive(serde::Serialize)]
    pub struct RegisterSchema {
        pub address: u16,
        pub name: &'static str,
        pub mode: Mode,
        pub kind: Kind,
        pub description: &'static str,
    }

    impl Record for RegisterSchema {
        const HEADERS: &'static [&'static str] = &["PNU", "Name", "Mode", "Kind", "Description"];

        fn cells(&self) -> Vec<String> {
            vec![
                self.address.to_string(),
                self.name.to_string(),
                self.mode.to_string(),
                self.kind.to_string(),
                self.description.to_string(),
            ]
        }
    }

    impl From<RegisterIndex> for RegisterSchema {
        fn from(index: RegisterIndex) -> Self {
            RegisterSchema {
                address: index.address(),
                name: index.name(),
                mode: index.mode(),
                kind: index.kind(),
                description: index.description(),
            }
        }
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let mut output = args.output.open::<RegisterSchema>()?;
        let matching = select_registers(args.filter.as_deref())
            .into_iter()
            .filter(|r| !args.writable || r.mode().is_writable());
        for register in matching.map(RegisterSchema::from) {
            output.write(&register)?;
        }
        Ok(output.finish()?)
    }
}

pub mod read {
    use tracing::warn;

    use super::{Error, select_registers, with_service};
    use crate::access::RegisterAccess as _;
    use crate::connection;
    use crate::output::{self, Record};

    /// Read the raw values of known controller parameters.
    #[derive(clap::Parser)]
    pub struct Args {
        /// A register name, or text to look for in names, descriptions and PNUs.
        filter: Option<String>,
        #[clap(flatten)]
        connection: connection::Args,
        #[clap(flatten)]
        output: output::Args,
    }

    #[derive(serde::Serialize)]
    struct RegisterValue {
        address: u16,
        name: &'static str,
        raw: Option<u16>,
        value: Option<String>,
    }

    impl Record for RegisterValue {
        const HEADERS: &'static [&'static str] = &["PNU", "Name", "Raw", "Value"];

        fn cells(&self) -> Vec<String> {
            vec![
                self.address.to_string(),
                self.name.to_string(),
                self.raw.map(|r| r.to_string()).unwrap_or_default(),
                self.value.clone().unwrap_or_else(|| "unavailable".into()),
            ]
        }
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let registers = select_registers(args.filter.as_deref());
        if registers.is_empty() {
            return Err(Error::NoMatchingRegisters(args.filter.unwrap_or_default()));
        }
        let mut output = args.output.open::<RegisterValue>()?;
        with_service(args.connection, |service| async move {
            for register in registers {
                let address = register.address();
                let raw = match service.access().read_holdings(address, 1).await {
                    Ok(block) => Some(block.word(0)),
                    Err(error) => {
                        warn!(
                            message = "could not read register",
                            pnu = address,
                            error = (&error as &dyn std::error::Error)
                        );
                        None
                    }
                };
                let value = RegisterValue {
                    address,
                    name: register.name(),
                    raw,
                    value: raw.map(|raw| register.kind().render(raw)),
                };
                output.write(&value)?;
            }
            Ok(output.finish()?)
        })
    }
}

pub mod heat_curve {
    use super::{Error, with_service};
    use crate::connection;
    use crate::model::{HeatCurve, PointUpdate, PointsUpdate, SlopeUpdate};
    use crate::output::{self, Record};

    #[derive(clap::Subcommand)]
    enum Action {
        /// Show the heat curve.
        Get,
        /// Change the slope and the flow temperature limits. Omitted values stay as they are.
        Slope {
            /// Between -10 and -0.1.
            #[arg(long, allow_hyphen_values = true)]
            slope: Option<f32>,
            #[arg(long)]
            min_flow_temp: Option<i32>,
            #[arg(long)]
            max_flow_temp: Option<i32>,
        },
        /// Change the flow temperature at some of the outdoor temperatures -30, -15, -5, 0, 5
        /// and 15 °C.
        Points {
            #[arg(long)]
            min_flow_temp: Option<i32>,
            #[arg(long)]
            max_flow_temp: Option<i32>,
            /// `OUTDOOR:FLOW` pairs, e.g. `-15:63`.
            #[arg(allow_hyphen_values = true)]
            points: Vec<PointUpdate>,
        },
    }

    /// Show or change the heat curve of a circuit.
    #[derive(clap::Parser)]
    pub struct Args {
        /// The circuit, 1 to 3.
        #[arg(long, short = 'c', default_value = "1")]
        circuit: u8,
        #[command(subcommand)]
        action: Action,
        #[clap(flatten)]
        connection: connection::Args,
        #[clap(flatten)]
        output: output::Args,
    }

    impl Record for HeatCurve {
        const HEADERS: &'static [&'static str] =
            &["Circuit", "Slope", "Min flow", "Max flow", "Points"];

        fn cells(&self) -> Vec<String> {
            let points = self
                .curve_points
                .iter()
                .map(|p| format!("{}:{}", p.outdoor_temp, p.flow_temp))
                .collect::<Vec<_>>();
            vec![
                self.circuit.to_string(),
                self.slope.to_string(),
                self.min_flow_temp.to_string(),
                self.max_flow_temp.to_string(),
                points.join(" "),
            ]
        }
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let mut output = args.output.open::<HeatCurve>()?;
        let circuit = args.circuit;
        let curve = with_service(args.connection, |service| async move {
            Ok(match args.action {
                Action::Get => service.heat_curve(circuit).await?,
                Action::Slope { slope, min_flow_temp, max_flow_temp } => {
                    let update = SlopeUpdate { slope, min_flow_temp, max_flow_temp };
                    service.set_heat_curve_by_slope(circuit, &update).await?
                }
                Action::Points { min_flow_temp, max_flow_temp, points } => {
                    let update = PointsUpdate { min_flow_temp, max_flow_temp, curve_points: points };
                    service.set_heat_curve_by_points(circuit, &update).await?
                }
            })
        })?;
        output.write(&curve)?;
        Ok(output.finish()?)
    }
}

pub mod circuits {
    use super::{Error, with_service};
    use crate::model::{Circuit, CircuitStatus};
    use crate::output::{self, Record};
    use crate::{connection, validate};

    /// Show the mode and state of the circuits.
    #[derive(clap::Parser)]
    pub struct Args {
        /// Only show this circuit.
        circuit: Option<u8>,
        #[clap(flatten)]
        connection: connection::Args,
        #[clap(flatten)]
        output: output::Args,
    }

    #[derive(serde::Serialize)]
    struct Row {
        circuit: Circuit,
        #[serde(flatten)]
        status: Option<CircuitStatus>,
    }

    impl Record for Row {
        const HEADERS: &'static [&'static str] = &["Circuit", "Mode", "State"];

        fn cells(&self) -> Vec<String> {
            match self.status {
                Some(CircuitStatus { mode, state }) => {
                    vec![self.circuit.to_string(), mode.to_string(), state.to_string()]
                }
                None => vec![self.circuit.to_string(), "not installed".into(), String::new()],
            }
        }
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let mut output = args.output.open::<Row>()?;
        let requested = args.circuit;
        let rows = with_service(args.connection, |service| async move {
            Ok(match requested {
                Some(number) => {
                    let status = service.circuit(number).await?;
                    let circuit = validate::circuit(number).map_err(crate::service::Error::from)?;
                    vec![Row { circuit, status: Some(status) }]
                }
                None => service
                    .circuits()
                    .await?
                    .iter()
                    .map(|(circuit, status)| Row { circuit, status })
                    .collect(),
            })
        })?;
        for row in &rows {
            output.write(row)?;
        }
        Ok(output.finish()?)
    }
}

pub mod info {
    use super::{Error, with_service};
    use crate::connection;
    use crate::model::SystemIdentity;
    use crate::output::{self, Record};

    /// Show what the controller reports about itself.
    #[derive(clap::Parser)]
    pub struct Args {
        #[clap(flatten)]
        connection: connection::Args,
        #[clap(flatten)]
        output: output::Args,
    }

    impl Record for SystemIdentity {
        const HEADERS: &'static [&'static str] = &[
            "Hardware",
            "Software",
            "Serial",
            "Addressing",
            "IP address",
            "Netmask",
            "Gateway",
            "Application",
            "Produced",
        ];

        fn cells(&self) -> Vec<String> {
            vec![
                self.hardware_revision.clone(),
                self.software_version.to_string(),
                self.serial_number.to_string(),
                self.address_type.to_string(),
                self.ip_address.to_string(),
                self.netmask.to_string(),
                self.gateway.to_string(),
                format!("{} ({})", self.application, self.application_version),
                format!("{} week {}", self.production_year, self.production_week),
            ]
        }
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let mut output = args.output.open::<SystemIdentity>()?;
        let info = with_service(args.connection, |service| async move {
            Ok(service.system_info().await?)
        })?;
        output.write(&info)?;
        Ok(output.finish()?)
    }
}

pub mod date_time {
    use super::{Error, with_service};
    use crate::connection;
    use crate::model::DeviceDateTime;
    use crate::output::{self, Record};

    #[derive(clap::Subcommand)]
    enum Action {
        /// Show the controller's clock.
        Get,
        /// Set the controller's clock.
        Set {
            /// Local date and time, e.g. `2024-02-29T09:13`.
            datetime: jiff::civil::DateTime,
            /// Whether the controller switches to and from daylight saving time on its own.
            /// Stays as it is unless given.
            #[arg(long)]
            daylight_saving: Option<bool>,
        },
        /// Set the controller's clock to the local time of this machine.
        Sync {
            /// Whether the controller switches to and from daylight saving time on its own.
            /// Stays as it is unless given.
            #[arg(long)]
            daylight_saving: Option<bool>,
        },
    }

    /// Show or change the controller's clock.
    #[derive(clap::Parser)]
    pub struct Args {
        #[command(subcommand)]
        action: Action,
        #[clap(flatten)]
        connection: connection::Args,
        #[clap(flatten)]
        output: output::Args,
    }

    impl Record for DeviceDateTime {
        const HEADERS: &'static [&'static str] = &["Date and time", "Automatic daylight saving"];

        fn cells(&self) -> Vec<String> {
            vec![self.to_string(), self.auto_daylight_saving.to_string()]
        }
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let mut output = args.output.open::<DeviceDateTime>()?;
        let now = with_service(args.connection, |service| async move {
            Ok(match args.action {
                Action::Get => service.date_time().await?,
                Action::Set { datetime, daylight_saving } => {
                    service.set_local_date_time(datetime, daylight_saving).await?
                }
                Action::Sync { daylight_saving } => service.sync_date_time(daylight_saving).await?,
            })
        })?;
        output.write(&now)?;
        Ok(output.finish()?)
    }
}

pub mod health {
    use super::{Error, with_service};
    use crate::connection;
    use crate::model::Health;
    use crate::output::{self, Record};

    /// Check whether the controller responds. Exits with an error if it does not.
    #[derive(clap::Parser)]
    pub struct Args {
        #[clap(flatten)]
        connection: connection::Args,
        #[clap(flatten)]
        output: output::Args,
    }

    impl Record for Health {
        const HEADERS: &'static [&'static str] = &["Status"];

        fn cells(&self) -> Vec<String> {
            vec![self.status.to_string()]
        }
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let mut output = args.output.open::<Health>()?;
        let health = with_service(args.connection, |service| async move {
            Ok(service.health().await)
        })?;
        output.write(&health)?;
        output.finish()?;
        if health.is_ok() { Ok(()) } else { Err(Error::Unhealthy) }
    }
}
