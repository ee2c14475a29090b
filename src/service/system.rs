use tracing::warn;

use super::{Error, Service, decode};
use crate::access::RegisterAccess;
use crate::codec::{self, UnknownValue};
use crate::model::{
    Circuit, CircuitStatus, Circuits, DeviceDateTime, Health, HealthStatus, SystemIdentity,
};
use crate::planner;
use crate::registers::pnu;
use crate::validate;

impl<R: RegisterAccess> Service<R> {
    pub async fn system_info(&self) -> Result<SystemIdentity, Error> {
        let hardware = self.read(pnu::HARDWARE_REVISION, 1).await?;
        let software = self.read(pnu::SOFTWARE, 4).await?;
        let address_type = self.read(pnu::ADDRESS_TYPE, 1).await?;
        let network = self.read(pnu::NETWORK, 12).await?;
        let application = self.read(pnu::APPLICATION, 4).await?;
        let production = self.read(pnu::PRODUCTION_DATE, 1).await?;

        let (version_major, version_minor) = codec::byte_pair(application.word(3));
        let (production_year, production_week) = codec::byte_pair(production.word(0));
        Ok(SystemIdentity {
            hardware_revision: format!("087H{}", hardware.word(0)),
            software_version: software.word(1),
            serial_number: software.double_word(2),
            address_type: decode(pnu::ADDRESS_TYPE, codec::decode_enum(address_type.word(0)))?,
            ip_address: codec::decode_quad(&network, 0),
            gateway: codec::decode_quad(&network, 4),
            netmask: codec::decode_quad(&network, 8),
            application: codec::decode_application(&application),
            application_version: format!("{version_major}.{version_minor}"),
            production_year: 2000 + u16::from(production_year),
            production_week,
        })
    }

    pub async fn circuit(&self, circuit: u8) -> Result<CircuitStatus, Error> {
        let circuit = validate::circuit(circuit)?;
        self.read_circuit(circuit).await
    }

    /// Status of all circuits. The third circuit is optional hardware, so failing to reach it
    /// is not an error.
    pub async fn circuits(&self) -> Result<Circuits, Error> {
        let modes = self.read(pnu::circuit_mode(Circuit::HEATING), 2).await?;
        let states = self.read(pnu::circuit_state(Circuit::HEATING), 2).await?;
        let status = |index: usize| -> Result<CircuitStatus, Error> {
            let circuit = Circuit::ALL[index];
            Ok(CircuitStatus {
                mode: decode(pnu::circuit_mode(circuit), codec::decode_enum(modes.word(index)))?,
                state: decode(pnu::circuit_state(circuit), codec::decode_enum(states.word(index)))?,
            })
        };
        let heating = status(0)?;
        let warm_water = status(1)?;
        let circuit3 = match self.read_circuit(Circuit::THIRD).await {
            Ok(status) => Some(status),
            Err(error @ Error::UpstreamUnavailable { .. }) => {
                warn!(
                    message = "could not read the third circuit, assuming it is absent",
                    error = (&error as &dyn std::error::Error)
                );
                None
            }
            Err(error) => return Err(error),
        };
        Ok(Circuits { heating, warm_water, circuit3 })
    }

    async fn read_circuit(&self, circuit: Circuit) -> Result<CircuitStatus, Error> {
        let mode_address = pnu::circuit_mode(circuit);
        let state_address = pnu::circuit_state(circuit);
        let mode = self.read(mode_address, 1).await?.word(0);
        let state = self.read(state_address, 1).await?.word(0);
        Ok(CircuitStatus {
            mode: decode(mode_address, codec::decode_enum(mode))?,
            state: decode(state_address, codec::decode_enum(state))?,
        })
    }

    pub async fn date_time(&self) -> Result<DeviceDateTime, Error> {
        let clock = self.read(pnu::HOUR, 5).await?;
        let daylight_saving = self.read(pnu::AUTO_DAYLIGHT_SAVING, 1).await?.word(0);
        let narrow = |index: usize, kind: &'static str| -> Result<u8, Error> {
            let value = clock.word(index);
            let address = pnu::HOUR + index as u16;
            decode(address, u8::try_from(value).map_err(|_| UnknownValue { value, kind }))
        };
        Ok(DeviceDateTime {
            hour: narrow(0, "hour")?,
            minute: narrow(1, "minute")?,
            day: narrow(2, "day")?,
            month: narrow(3, "month")?,
            year: clock.word(4),
            auto_daylight_saving: decode(
                pnu::AUTO_DAYLIGHT_SAVING,
                codec::decode_flag(daylight_saving, "daylight saving flag"),
            )?,
        })
    }

    /// Moves the controller's clock to `target` and returns what the controller reports
    /// afterwards.
    pub async fn set_date_time(&self, target: &DeviceDateTime) -> Result<DeviceDateTime, Error> {
        validate::date_time(target)?;
        let current = self.date_time().await?;
        self.apply_date_time(&current, target).await
    }

    /// Sets the controller's clock to the calendar date and time of `datetime`.
    ///
    /// Unless `auto_daylight_saving` says otherwise, the controller keeps its current daylight
    /// saving setting.
    pub async fn set_local_date_time(
        &self,
        datetime: jiff::civil::DateTime,
        auto_daylight_saving: Option<bool>,
    ) -> Result<DeviceDateTime, Error> {
        // The flag has no bearing on validity.
        let target = DeviceDateTime::from_civil(datetime, auto_daylight_saving.unwrap_or_default());
        validate::date_time(&target)?;
        let current = self.date_time().await?;
        let target = DeviceDateTime {
            auto_daylight_saving: auto_daylight_saving.unwrap_or(current.auto_daylight_saving),
            ..target
        };
        self.apply_date_time(&current, &target).await
    }

    /// Sets the controller's clock to the local time of this machine.
    pub async fn sync_date_time(
        &self,
        auto_daylight_saving: Option<bool>,
    ) -> Result<DeviceDateTime, Error> {
        self.set_local_date_time(jiff::Zoned::now().datetime(), auto_daylight_saving).await
    }

    async fn apply_date_time(
        &self,
        current: &DeviceDateTime,
        target: &DeviceDateTime,
    ) -> Result<DeviceDateTime, Error> {
        for step in planner::plan(current, target) {
            self.update(step.field.address(), step.value, step.field.name()).await?;
        }
        self.date_time().await
    }

    /// Whether the controller answers at all. Never fails.
    pub async fn health(&self) -> Health {
        let status = match self.access.read_holdings(pnu::NETWORK, 4).await {
            Ok(_) => HealthStatus::Ok,
            Err(error) => {
                warn!(
                    message = "controller is not reachable",
                    error = (&error as &dyn std::error::Error)
                );
                HealthStatus::Fail
            }
        };
        Health { status }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use crate::model::{AddressType, CircuitMode, CircuitState, DeviceDateTime, HealthStatus};
    use crate::modbus::Operation;
    use crate::service::{Access, Error};
    use crate::testing::FakeDevice;

    fn identity() -> FakeDevice {
        FakeDevice::default()
            .with(19, &[42])
            .with(34, &[0, 0x0103, 2, 42])
            .with(258, &[1])
            .with(278, &[192, 168, 1, 1, 10, 0, 0, 1, 255, 255, 255, 128])
            .with(2060, &[u16::from(b'f'), 42, 0x0101, 0x0307])
            .with(2099, &[0x1521])
    }

    #[tokio::test]
    async fn reads_system_info() {
        let (device, service) = identity().start();
        let info = service.system_info().await.unwrap();
        assert_eq!(info.hardware_revision, "087H42");
        assert_eq!(info.software_version, (1 << 8) + 3);
        assert_eq!(info.serial_number, (2 << 16) + 42);
        assert_eq!(info.address_type, AddressType::Static);
        assert_eq!(info.ip_address, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(info.netmask, Ipv4Addr::new(255, 255, 255, 128));
        assert_eq!(info.gateway, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(info.application.to_string(), "f42.257");
        assert_eq!(info.application_version, "3.7");
        assert_eq!((info.production_year, info.production_week), (2021, 33));
        let reads = device.calls().into_iter().map(|call| match call {
            Operation::GetHoldings { address, count } => (address, count),
            other => panic!("unexpected {other:?}"),
        });
        assert_eq!(
            reads.collect::<Vec<_>>(),
            [(18, 1), (33, 4), (257, 1), (277, 12), (2059, 4), (2098, 1)]
        );
    }

    #[tokio::test]
    async fn unknown_address_type_is_fatal() {
        let (_, service) = identity().with(258, &[2]).start();
        let error = service.system_info().await.unwrap_err();
        let Error::UnexpectedDeviceValue { address, source } = error else { panic!("{error:?}") };
        assert_eq!(address, 258);
        assert_eq!(source.value, 2);
    }

    #[tokio::test]
    async fn system_info_needs_every_register() {
        let (_, service) = identity().failing(2099).start();
        let error = service.system_info().await.unwrap_err();
        assert!(matches!(
            error,
            Error::UpstreamUnavailable { operation: Access::Read { address: 2099, count: 1 }, .. }
        ));
    }

    #[tokio::test]
    async fn reads_one_circuit() {
        let (device, service) = FakeDevice::default().with(4201, &[0]).with(4211, &[1]).start();
        let status = service.circuit(1).await.unwrap();
        assert_eq!((status.mode, status.state), (CircuitMode::Manual, CircuitState::PreComfort));
        assert_eq!(
            device.calls(),
            [
                Operation::GetHoldings { address: 4200, count: 1 },
                Operation::GetHoldings { address: 4210, count: 1 }
            ]
        );
        assert!(service.circuit(0).await.unwrap_err().is_invalid_input());
        assert!(service.circuit(4).await.unwrap_err().is_invalid_input());
        assert_eq!(device.calls().len(), 2);
    }

    #[tokio::test]
    async fn reads_all_circuits() {
        let (device, service) = FakeDevice::default()
            .with(4201, &[2, 3, 4])
            .with(4211, &[1, 2, 3])
            .start();
        let circuits = service.circuits().await.unwrap();
        assert_eq!(circuits.heating.mode, CircuitMode::ConstantComfortTemp);
        assert_eq!(circuits.heating.state, CircuitState::PreComfort);
        assert_eq!(circuits.warm_water.mode, CircuitMode::ConstantSetbackTemp);
        assert_eq!(circuits.warm_water.state, CircuitState::Comfort);
        let third = circuits.circuit3.unwrap();
        assert_eq!((third.mode, third.state), (CircuitMode::FrostProtection, CircuitState::PreSetback));
        assert_eq!(
            device.calls(),
            [
                Operation::GetHoldings { address: 4200, count: 2 },
                Operation::GetHoldings { address: 4210, count: 2 },
                Operation::GetHoldings { address: 4202, count: 1 },
                Operation::GetHoldings { address: 4212, count: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn third_circuit_is_optional() {
        let (_, service) = FakeDevice::default()
            .with(4201, &[1, 1, 1])
            .with(4211, &[2, 2, 2])
            .failing(4213)
            .start();
        let circuits = service.circuits().await.unwrap();
        assert_eq!(circuits.circuit3, None);
        assert_eq!(circuits.warm_water.state, CircuitState::Comfort);

        let (_, service) = FakeDevice::default().with(4201, &[1, 1]).with(4211, &[2, 2]).start();
        assert!(service.circuits().await.unwrap().circuit3.is_none());

        let (_, service) = FakeDevice::default().failing(4201).start();
        assert!(matches!(service.circuits().await, Err(Error::UpstreamUnavailable { .. })));

        let (_, service) =
            FakeDevice::default().with(4201, &[1, 1, 9]).with(4211, &[2, 2, 2]).start();
        assert!(matches!(
            service.circuits().await,
            Err(Error::UnexpectedDeviceValue { address: 4203, .. })
        ));
    }

    fn clock(hour: u16, minute: u16, day: u16, month: u16, year: u16, dst: u16) -> FakeDevice {
        FakeDevice::default().with(64045, &[hour, minute, day, month, year]).with(10198, &[dst])
    }

    fn at(year: u16, month: u8, day: u8, hour: u8, minute: u8, dst: bool) -> DeviceDateTime {
        DeviceDateTime { year, month, day, hour, minute, auto_daylight_saving: dst }
    }

    #[tokio::test]
    async fn reads_date_time() {
        let (device, service) = clock(10, 11, 14, 2, 2022, 1).start();
        let now = service.date_time().await.unwrap();
        assert_eq!(now, at(2022, 2, 14, 10, 11, true));
        assert_eq!(
            device.calls(),
            [
                Operation::GetHoldings { address: 64044, count: 5 },
                Operation::GetHoldings { address: 10197, count: 1 }
            ]
        );

        let (_, service) = clock(10, 11, 14, 2, 2022, 2).start();
        assert!(matches!(
            service.date_time().await,
            Err(Error::UnexpectedDeviceValue { address: 10198, .. })
        ));
        let (_, service) = clock(10, 11, 300, 2, 2022, 0).start();
        assert!(matches!(
            service.date_time().await,
            Err(Error::UnexpectedDeviceValue { address: 64047, .. })
        ));
    }

    #[tokio::test]
    async fn rejects_invalid_date_times() {
        let cases = [
            (at(1999, 2, 1, 12, 2, false), "year 1999"),
            (at(2009, 13, 1, 12, 2, false), "month 13"),
            (at(2009, 2, 32, 12, 2, false), "day 32"),
            (at(2009, 2, 1, 24, 2, false), "hour 24"),
            (at(2009, 2, 1, 10, 60, false), "minute 60"),
            (at(2009, 2, 29, 10, 11, false), "day 29 for month 2"),
            (at(2016, 2, 30, 10, 11, false), "day 30 for month 2"),
        ];
        let (device, service) = clock(10, 11, 14, 2, 2022, 1).start();
        for (target, message) in cases {
            let error = service.set_date_time(&target).await.unwrap_err();
            assert!(error.is_invalid_input());
            assert!(error.to_string().contains(message), "`{error}` lacks `{message}`");
        }
        assert!(device.calls().is_empty());
    }

    #[tokio::test]
    async fn widens_the_month_before_the_day() {
        let (device, service) = clock(10, 11, 14, 2, 2021, 1).start();
        let target = at(2016, 3, 5, 9, 13, false);
        let confirmed = service.set_date_time(&target).await.unwrap();
        assert_eq!(confirmed, target);

        let calls = device.calls();
        assert_eq!(calls.len(), 16);
        let expected = [(3, 64047, 3), (5, 64046, 5), (7, 64048, 2016), (9, 64044, 9), (11, 64045, 13)];
        for (index, address, value) in expected {
            assert_eq!(calls[index], Operation::SetHolding { address, value });
        }
        assert_eq!(calls[13], Operation::SetHolding { address: 10197, value: 0 });
    }

    #[tokio::test]
    async fn skips_fields_that_already_match() {
        let (device, service) = clock(9, 13, 14, 2, 2022, 1).start();
        service.set_date_time(&at(2022, 2, 20, 9, 13, true)).await.unwrap();
        assert_eq!(device.writes(), [(64046, 20)]);
    }

    #[tokio::test]
    async fn never_passes_through_an_invalid_date() {
        let targets = [
            at(2016, 2, 29, 0, 0, true),
            at(2017, 2, 28, 0, 0, true),
            at(2016, 4, 30, 0, 0, true),
            at(2016, 3, 31, 0, 0, true),
            at(2024, 1, 31, 0, 0, true),
        ];
        let currents = [(31, 1, 2015), (29, 2, 2016), (31, 3, 2016), (30, 4, 2017), (28, 2, 2023)];
        for target in targets {
            for (day, month, year) in currents {
                let (device, service) = clock(0, 0, day, month, year, 1).validating_dates().start();
                let confirmed = service.set_date_time(&target).await.unwrap();
                assert_eq!(confirmed, target, "from {year}-{month}-{day}");
                assert_eq!(device.holding(64047), Some(u16::from(target.day)));
            }
        }
    }

    #[tokio::test]
    async fn unreachable_clock_is_not_written() {
        let (device, service) = clock(10, 11, 14, 2, 2021, 1).failing(64045).start();
        let error = service.set_date_time(&at(2016, 3, 5, 9, 13, true)).await.unwrap_err();
        assert!(matches!(
            error,
            Error::UpstreamUnavailable { operation: Access::Read { address: 64045, count: 5 }, .. }
        ));
        assert!(device.writes().is_empty());
    }

    #[tokio::test]
    async fn sets_local_date_time() {
        let (device, service) = clock(10, 11, 14, 2, 2022, 1).start();
        let now = jiff::civil::date(2024, 2, 29).at(23, 59, 30, 0);
        let confirmed = service.set_local_date_time(now, None).await.unwrap();
        assert_eq!(confirmed, at(2024, 2, 29, 23, 59, true));
        // Month and daylight saving already match.
        assert_eq!(device.writes(), [(64048, 2024), (64046, 29), (64044, 23), (64045, 59)]);

        let (_, service) = clock(10, 11, 14, 2, 2022, 1).start();
        let confirmed = service.set_local_date_time(now, Some(false)).await.unwrap();
        assert!(!confirmed.auto_daylight_saving);
    }

    #[tokio::test]
    async fn synchronises_with_this_machine() {
        let (device, service) = clock(10, 11, 14, 2, 2022, 0).validating_dates().start();
        let before = jiff::Zoned::now().datetime();
        let confirmed = service.sync_date_time(None).await.unwrap();
        assert!(i32::from(confirmed.year) >= i32::from(before.year()));
        assert!(!confirmed.auto_daylight_saving);
        assert_eq!(device.holding(64049), Some(confirmed.year));
    }

    #[tokio::test]
    async fn local_date_time_is_validated_before_any_traffic() {
        let (device, service) = clock(10, 11, 14, 2, 2022, 1).start();
        let far = jiff::civil::date(2150, 1, 1).at(0, 0, 0, 0);
        for daylight_saving in [None, Some(true), Some(false)] {
            let error = service.set_local_date_time(far, daylight_saving).await.unwrap_err();
            assert!(error.is_invalid_input(), "{error:?}");
        }
        let early = jiff::civil::date(2008, 12, 31).at(23, 59, 0, 0);
        assert!(service.set_local_date_time(early, None).await.unwrap_err().is_invalid_input());
        assert!(device.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_write_keeps_earlier_fields() {
        let (device, service) = clock(10, 11, 14, 2, 2021, 1).failing_writes(64047).start();
        let error = service.set_date_time(&at(2016, 3, 5, 9, 13, true)).await.unwrap_err();
        let Error::UpstreamUnavailable { operation, .. } = error else { panic!("{error:?}") };
        assert_eq!(operation, Access::Write { address: 64047, value: 5 });
        // The month went out first and stays, nothing after the day is attempted.
        assert_eq!(device.writes(), [(64047, 3), (64046, 5)]);
        assert_eq!(device.calls().last(), Some(&Operation::SetHolding { address: 64046, value: 5 }));
        assert_eq!(device.holding(64048), Some(3));
        assert_eq!(device.holding(64047), Some(14));
        assert_eq!(device.holding(64049), Some(2021));
        assert_eq!(device.holding(64045), Some(10));
    }

    #[tokio::test]
    async fn health_never_fails() {
        let (device, service) = identity().start();
        assert!(service.health().await.is_ok());
        assert_eq!(device.calls(), [Operation::GetHoldings { address: 277, count: 4 }]);

        let (_, service) = identity().failing(280).start();
        assert_eq!(service.health().await.status, HealthStatus::Fail);
        let (_, service) = FakeDevice::default().start();
        assert_eq!(service.health().await.status, HealthStatus::Fail);
    }
}
