//! Minimal collaborators for unit tests: a controller that always starts, a store
//! without records and a clock whose delays elapse at once.
use embassy_time::{Duration, Instant};
use futures_util::Future;

use crate::core::ControllerStats;
use crate::protocol::transport::{
    bus_manager::BusManager,
    can_frame::CanFrame,
    traits::{
        can_controller::CanController,
        clock::Clock,
        settings_store::{SettingsKey, SettingsStore},
    },
};

pub(crate) struct IdleController;

impl CanController for IdleController {
    type Error = ();

    fn install_interrupt(&mut self, _bus: u8) {}

    fn start(&mut self, _bitrate: u32) -> Result<(), ()> {
        Ok(())
    }

    fn stop(&mut self) {}

    fn transmit<'a>(
        &'a mut self,
        _frame: &'a CanFrame,
    ) -> impl Future<Output = Result<(), ()>> + 'a {
        core::future::ready(Ok(()))
    }

    fn statistics(&self) -> ControllerStats {
        ControllerStats::default()
    }
}

pub(crate) struct NullStore;

impl SettingsStore for NullStore {
    type Error = ();

    fn load(&mut self, _key: SettingsKey, _buf: &mut [u8]) -> Result<usize, ()> {
        Err(())
    }

    fn store(&mut self, _key: SettingsKey, _data: &[u8]) -> Result<(), ()> {
        Ok(())
    }
}

/// Clock stuck at zero; bounded waits on a pending future time out immediately.
pub(crate) struct FrozenClock;

impl Clock for FrozenClock {
    fn now(&self) -> Instant {
        Instant::from_ticks(0)
    }

    fn delay(&self, _duration: Duration) -> impl Future<Output = ()> + '_ {
        core::future::ready(())
    }
}

pub(crate) fn frozen_manager() -> BusManager<IdleController, NullStore, FrozenClock> {
    BusManager::new(
        [IdleController, IdleController, IdleController],
        NullStore,
        FrozenClock,
    )
}
