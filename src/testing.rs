//! An in-memory controller for exercising the domain operations without a network.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::{Arc, Mutex};

use crate::access::{OneBased, Transport, to_transport};
use crate::model::DeviceDateTime;
use crate::modbus::{Operation, ResponseKind};
use crate::registers::pnu;
use crate::service::Service;
use crate::validate;

const ILLEGAL_FUNCTION: u8 = 1;
const ILLEGAL_ADDRESS: u8 = 2;
const ILLEGAL_VALUE: u8 = 3;

#[derive(thiserror::Error, Debug)]
#[error("the fake controller is unreachable at wire address {0}")]
pub struct Unreachable(pub u16);

#[derive(Default)]
struct State {
    /// Keyed by wire address.
    holdings: BTreeMap<u16, u16>,
    calls: Vec<Operation>,
    failing: BTreeSet<u16>,
    failing_writes: BTreeSet<u16>,
    validate_dates: bool,
}

/// Holding registers keyed by their zero-based wire address, with a log of every operation.
#[derive(Default)]
pub struct FakeDevice {
    state: Mutex<State>,
}

impl FakeDevice {
    /// Stores `words` at the PNUs starting with `pnu`.
    pub fn with(self, pnu: u16, words: &[u16]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for (address, word) in (to_transport(pnu)..).zip(words) {
                state.holdings.insert(address, *word);
            }
        }
        self
    }

    /// Any operation touching `pnu` fails as if the controller could not be reached.
    pub fn failing(self, pnu: u16) -> Self {
        self.state.lock().unwrap().failing.insert(to_transport(pnu));
        self
    }

    /// Writes to `pnu` fail as if the controller could not be reached. Reads still succeed.
    pub fn failing_writes(self, pnu: u16) -> Self {
        self.state.lock().unwrap().failing_writes.insert(to_transport(pnu));
        self
    }

    /// Reject writes of day, month or year that would leave an invalid date behind.
    pub fn validating_dates(self) -> Self {
        self.state.lock().unwrap().validate_dates = true;
        self
    }

    pub fn start(self) -> (Arc<FakeDevice>, Service<OneBased<Arc<FakeDevice>>>) {
        let device = Arc::new(self);
        (Arc::clone(&device), Service::new(OneBased::new(device)))
    }

    pub fn calls(&self) -> Vec<Operation> {
        self.state.lock().unwrap().calls.clone()
    }

    /// The value at a PNU.
    pub fn holding(&self, pnu: u16) -> Option<u16> {
        self.state.lock().unwrap().holdings.get(&to_transport(pnu)).copied()
    }

    /// Wire addresses of all single register writes, in order.
    pub fn writes(&self) -> Vec<(u16, u16)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Operation::SetHolding { address, value } => Some((address, value)),
                _ => None,
            })
            .collect()
    }

    fn stored_date(state: &State) -> DeviceDateTime {
        let word = |pnu| state.holdings.get(&to_transport(pnu)).copied().unwrap_or(0);
        DeviceDateTime {
            year: word(pnu::YEAR),
            month: word(pnu::MONTH) as u8,
            day: word(pnu::DAY) as u8,
            hour: 0,
            minute: 0,
            auto_daylight_saving: false,
        }
    }

    fn respond(&self, operation: Operation) -> Result<ResponseKind, Unreachable> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(operation.clone());
        match operation {
            Operation::GetHoldings { address, count } => {
                let addresses = address..address.saturating_add(count);
                if let Some(failing) = addresses.clone().find(|a| state.failing.contains(a)) {
                    return Err(Unreachable(failing));
                }
                let mut values = Vec::with_capacity(2 * usize::from(count));
                for address in addresses {
                    let Some(word) = state.holdings.get(&address) else {
                        return Ok(ResponseKind::Exception(ILLEGAL_ADDRESS));
                    };
                    values.extend(word.to_be_bytes());
                }
                Ok(ResponseKind::Words { values })
            }
            Operation::SetHolding { address, value } => {
                if state.failing.contains(&address) || state.failing_writes.contains(&address) {
                    return Err(Unreachable(address));
                }
                let previous = state.holdings.insert(address, value);
                let date_fields = [pnu::DAY, pnu::MONTH, pnu::YEAR].map(to_transport);
                if state.validate_dates
                    && date_fields.contains(&address)
                    && validate::date_time(&Self::stored_date(&state)).is_err()
                {
                    match previous {
                        Some(previous) => state.holdings.insert(address, previous),
                        None => state.holdings.remove(&address),
                    };
                    return Ok(ResponseKind::Exception(ILLEGAL_VALUE));
                }
                Ok(ResponseKind::Written { address, value })
            }
            _ => Ok(ResponseKind::Exception(ILLEGAL_FUNCTION)),
        }
    }
}

impl Transport for Arc<FakeDevice> {
    type Error = Unreachable;

    fn execute(
        &self,
        operation: Operation,
    ) -> impl Future<Output = Result<ResponseKind, Self::Error>> + Send {
        let result = self.respond(operation);
        async move { result }
    }
}
