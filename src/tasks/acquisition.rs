// WearLog — Acquisition Task
//
// Runs the polling scheduler back to back.  The only interruption is a
// pending file-listing request, serviced between cycles so the listing never
// interleaves with a flush.  A fatal storage error ends acquisition: the task
// parks in a halt loop that keeps reporting the fault on the console.

use std::thread;
use std::time::Duration;

use embedded_hal::digital::OutputPin;

use crate::acquisition::Scheduler;
use crate::config::HALT_REPORT_INTERVAL_MS;
use crate::events::ControlEvent;
use crate::storage::{BusPeer, FlashFs, FlashStore, LogWriter, StorageError};

pub type FlashScheduler<F, P, C> = Scheduler<LogWriter<FlashStore<F, P, C>>>;

pub fn acquisition_task<F, P, C>(mut scheduler: FlashScheduler<F, P, C>) -> !
where
    F: FlashFs,
    P: BusPeer,
    C: OutputPin,
{
    log::info!("Acquisition task started");

    loop {
        match service(&mut scheduler) {
            Ok(0) => thread::sleep(Duration::from_millis(1)),
            Ok(_) => {}
            Err(e) => fatal_halt(&mut scheduler, &e),
        }
    }
}

/// One pass: a requested file listing, then one scheduler cycle.
pub fn service<F, P, C>(scheduler: &mut FlashScheduler<F, P, C>) -> Result<usize, StorageError>
where
    F: FlashFs,
    P: BusPeer,
    C: OutputPin,
{
    if scheduler.state().take_file_listing_request() {
        let store = scheduler.sink_mut().store_mut();
        log::info!("Flash directory ({} in catalog):", store.catalog_count());
        store.list_files()?;
        log::info!("{}", store.device_status());
    }
    scheduler.run_cycle()
}

/// Stop recording and tell the control task, which locks the switch off.
pub fn halt<F, P, C>(scheduler: &mut FlashScheduler<F, P, C>)
where
    F: FlashFs,
    P: BusPeer,
    C: OutputPin,
{
    scheduler.state().set_recording_enabled(false);
    scheduler.sink().store().notify(ControlEvent::StorageHalted);
}

fn fatal_halt<F, P, C>(scheduler: &mut FlashScheduler<F, P, C>, error: &StorageError) -> !
where
    F: FlashFs,
    P: BusPeer,
    C: OutputPin,
{
    halt(scheduler);
    loop {
        log::error!("Storage halted: {}", error);
        log::error!("Device: {}", scheduler.sink_mut().store_mut().device_status());
        thread::sleep(Duration::from_millis(HALT_REPORT_INTERVAL_MS));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{AcquisitionState, Clock, Sample, SensorSource};
    use crate::config::StorageConfig;
    use crate::record::{Tag, Timestamp};
    use crate::storage::bus::tests::{BusEvent, BusLog, FakePeer, FakePin};
    use crate::storage::engine::tests::{CountingGate, MemFs};
    use crate::storage::BusArbiter;
    use std::sync::{mpsc, Arc};

    struct EveryCycle(Arc<AcquisitionState>);

    impl SensorSource for EveryCycle {
        fn tag(&self) -> Tag {
            Tag::Eda
        }

        fn poll(&mut self) -> anyhow::Result<Sample> {
            Ok(if self.0.eda.take() {
                Sample::Ready("512".into())
            } else {
                Sample::Idle
            })
        }

        fn set_power(&mut self, _: bool) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct Epoch;

    impl Clock for Epoch {
        fn now(&mut self) -> anyhow::Result<Timestamp> {
            Ok(Timestamp::default())
        }
    }

    fn scheduler(fs: MemFs, log: &BusLog) -> FlashScheduler<MemFs, FakePeer, FakePin> {
        scheduler_with(fs, log, None)
    }

    fn scheduler_with(
        fs: MemFs,
        log: &BusLog,
        events: Option<mpsc::Sender<ControlEvent>>,
    ) -> FlashScheduler<MemFs, FakePeer, FakePin> {
        let state = AcquisitionState::new();
        state.set_recording_enabled(true);
        let mut cfg = StorageConfig::new(112, 100, 10).unwrap();
        cfg.ready_poll_limit = 3;
        cfg.ready_poll_interval = Duration::ZERO;

        let bus = BusArbiter::new(FakePeer(log.clone()), FakePin(log.clone())).unwrap();
        let mut store = FlashStore::open(fs, bus, Box::new(CountingGate::default()), cfg).unwrap();
        if let Some(tx) = events {
            store = store.with_notifier(tx);
        }
        let writer = LogWriter::new(store, state.clone()).unwrap();
        let sources: Vec<Box<dyn SensorSource + Send>> = vec![Box::new(EveryCycle(state.clone()))];
        Scheduler::new(sources, Box::new(Epoch), writer, state)
    }

    #[test]
    fn listing_request_is_served_before_the_cycle() {
        let log = BusLog::default();
        let mut fs = MemFs::new(&log);
        fs.files.insert("r0.txt".into(), vec![0; 112]);
        let mut sched = scheduler(fs, &log);

        sched.state().request_file_listing();
        sched.state().eda.raise();
        log.lock().unwrap().clear();

        assert_eq!(service(&mut sched).unwrap(), 1);
        assert!(log.lock().unwrap().contains(&BusEvent::Flash("list")));
        assert!(!sched.state().take_file_listing_request());
        assert_eq!(sched.sink().buffer().as_bytes(), b"E:512\nT:0:0:0:0:0:0:0\n");
    }

    #[test]
    fn device_stall_surfaces_as_fatal_error() {
        let log = BusLog::default();
        let mut fs = MemFs::new(&log);
        fs.busy_polls = u32::MAX;
        let mut sched = scheduler(fs, &log);

        // "E:512\n" + "T:0:0:0:0:0:0:0\n" = 22 bytes per cycle; the fifth
        // cycle crosses the threshold and forces a flush.
        let mut result = Ok(0);
        for _ in 0..5 {
            sched.state().eda.raise();
            result = service(&mut sched);
            if result.is_err() {
                break;
            }
        }
        let err = result.unwrap_err();
        assert!(matches!(err, StorageError::DeviceTimeout { attempts: 3 }));
        assert!(err.is_fatal());
    }

    #[test]
    fn halt_disables_recording_and_notifies_control() {
        let log = BusLog::default();
        let (tx, rx) = mpsc::channel();
        let mut sched = scheduler_with(MemFs::new(&log), &log, Some(tx));

        halt(&mut sched);
        assert!(!sched.state().recording_enabled());
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![ControlEvent::StorageHalted]);
    }
}
