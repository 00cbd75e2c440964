// WearLog — End-to-end pipeline tests
//
// Scheduler -> LogWriter -> FlashStore -> DirFs on a scratch directory, with
// a bus peer that records whether it currently owns the SPI bus.

use std::convert::Infallible;
use std::fs;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use embedded_hal::digital::{ErrorType, OutputPin};
use tempfile::TempDir;

use wearlog::acquisition::{
    AcquisitionState, Clock, ReadinessGate, RecordSink, Sample, Scheduler, SensorSource,
};
use wearlog::config::{file_name, StorageConfig};
use wearlog::events::ControlEvent;
use wearlog::record::{Record, Tag, Timestamp};
use wearlog::storage::{
    BusArbiter, BusPeer, CapacityState, DirFs, FileInfo, FlashFs, FlashStore, LogWriter,
};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------
#[derive(Clone, Default)]
struct Bus {
    peer_selected: Arc<AtomicBool>,
    violations: Arc<AtomicU32>,
    masked: Arc<AtomicBool>,
}

struct Peer(Bus);

impl BusPeer for Peer {
    fn suspend(&mut self) -> anyhow::Result<()> {
        self.0.peer_selected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&mut self) -> anyhow::Result<()> {
        self.0.peer_selected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct AuxSelect;

impl ErrorType for AuxSelect {
    type Error = Infallible;
}

impl OutputPin for AuxSelect {
    fn set_low(&mut self) -> Result<(), Infallible> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

struct Gate(Bus);

impl ReadinessGate for Gate {
    fn suspend(&mut self) {
        self.0.masked.store(true, Ordering::SeqCst);
    }

    fn resume(&mut self) {
        self.0.masked.store(false, Ordering::SeqCst);
    }
}

/// `DirFs` that counts every access made while the AFE held the bus or the
/// readiness interrupts were live.
struct Guarded {
    inner: DirFs,
    bus: Bus,
}

impl Guarded {
    fn check(&self) {
        if self.bus.peer_selected.load(Ordering::SeqCst) || !self.bus.masked.load(Ordering::SeqCst)
        {
            self.bus.violations.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl FlashFs for Guarded {
    fn list(&mut self) -> io::Result<Vec<FileInfo>> {
        self.check();
        self.inner.list()
    }

    fn exists(&mut self, name: &str) -> io::Result<bool> {
        self.check();
        self.inner.exists(name)
    }

    fn create(&mut self, name: &str, size: usize) -> io::Result<()> {
        self.check();
        self.inner.create(name, size)
    }

    fn write(&mut self, name: &str, data: &[u8]) -> io::Result<()> {
        self.check();
        self.inner.write(name, data)
    }

    fn is_ready(&mut self) -> io::Result<bool> {
        self.check();
        self.inner.is_ready()
    }

    fn status(&mut self) -> String {
        self.inner.status()
    }
}

type Store = FlashStore<Guarded, Peer, AuxSelect>;

struct Rig {
    dir: TempDir,
    bus: Bus,
    state: Arc<AcquisitionState>,
}

impl Rig {
    fn new() -> Self {
        let bus = Bus::default();
        bus.peer_selected.store(true, Ordering::SeqCst);
        let state = AcquisitionState::new();
        state.set_recording_enabled(true);
        Self {
            dir: tempfile::tempdir().unwrap(),
            bus,
            state,
        }
    }

    fn preexisting(&self, index: u32) {
        fs::write(self.dir.path().join(file_name(index)), vec![0u8; 112]).unwrap();
    }

    fn config(max_files: u32) -> StorageConfig {
        let mut cfg = StorageConfig::new(112, 100, max_files).unwrap();
        cfg.ready_poll_limit = 10;
        cfg.ready_poll_interval = Duration::ZERO;
        cfg
    }

    fn store(&self, max_files: u32) -> Store {
        let fs = Guarded {
            inner: DirFs::new(self.dir.path()).unwrap(),
            bus: self.bus.clone(),
        };
        let arbiter = BusArbiter::new(Peer(self.bus.clone()), AuxSelect).unwrap();
        FlashStore::open(fs, arbiter, Box::new(Gate(self.bus.clone())), Self::config(max_files))
            .unwrap()
    }

    fn writer(&self, max_files: u32) -> LogWriter<Store> {
        LogWriter::new(self.store(max_files), self.state.clone()).unwrap()
    }

    fn file(&self, index: u32) -> Vec<u8> {
        fs::read(self.dir.path().join(file_name(index))).unwrap()
    }

    fn file_count(&self) -> usize {
        fs::read_dir(self.dir.path()).unwrap().count()
    }

    fn assert_exclusive(&self) {
        assert_eq!(self.bus.violations.load(Ordering::SeqCst), 0);
        assert!(self.bus.peer_selected.load(Ordering::SeqCst));
        assert!(!self.bus.masked.load(Ordering::SeqCst));
    }
}

fn rec(tag: Tag, payload: &str) -> Record {
    Record::new(tag, payload).unwrap()
}

// ---------------------------------------------------------------------------
// Writer + store
// ---------------------------------------------------------------------------
#[test]
fn small_records_accumulate_without_touching_flash() {
    let rig = Rig::new();
    let mut writer = rig.writer(2);
    for _ in 0..5 {
        writer.submit(&rec(Tag::Eda, "10")).unwrap();
    }
    assert_eq!(writer.buffer().as_bytes(), b"E:10\nE:10\nE:10\nE:10\nE:10\n");
    assert_eq!(rig.file_count(), 0);
    rig.assert_exclusive();
}

#[test]
fn crossing_the_threshold_writes_one_padded_file() {
    let rig = Rig::new();
    let mut writer = rig.writer(2);
    for _ in 0..18 {
        writer.submit(&rec(Tag::Eda, "10")).unwrap();
    }
    writer.submit(&rec(Tag::Eda, "1234")).unwrap();
    assert_eq!(writer.buffer().len(), 97);
    let held = writer.buffer().as_bytes().to_vec();

    writer.submit(&rec(Tag::Motion, "1:2:3")).unwrap();

    let file = rig.file(0);
    assert_eq!(file.len(), 112);
    assert_eq!(&file[..97], &held[..]);
    assert!(file[97..].iter().all(|&b| b == 0));
    assert_eq!(writer.buffer().as_bytes(), b"A:1:2:3\n");
    assert_eq!(writer.store().catalog_count(), 1);
    rig.assert_exclusive();
}

#[test]
fn catalog_continues_after_existing_file_then_exhausts() {
    let rig = Rig::new();
    rig.preexisting(0);
    let (tx, rx) = mpsc::channel();
    let mut writer = LogWriter::new(rig.store(3).with_notifier(tx), rig.state.clone()).unwrap();
    assert_eq!(writer.store().catalog_count(), 1);

    // Each page: twenty "E:10" lines, the twentieth forces the flush.
    let fill_page = |w: &mut LogWriter<Store>| {
        for _ in 0..20 {
            w.submit(&rec(Tag::Eda, "10")).unwrap();
        }
    };

    fill_page(&mut writer);
    assert_eq!(rig.file(1).len(), 112);
    fill_page(&mut writer);
    assert_eq!(rig.file(2).len(), 112);
    assert_eq!(writer.store().state(), CapacityState::Active);

    fill_page(&mut writer);
    assert_eq!(writer.store().state(), CapacityState::Exhausted);
    assert_eq!(rig.file_count(), 3);

    // Exhausted is terminal for the session and notified once.
    for _ in 0..3 {
        fill_page(&mut writer);
    }
    assert_eq!(rig.file_count(), 3);
    assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![ControlEvent::CapacityExhausted]);
    rig.assert_exclusive();
}

#[test]
fn exhaustion_is_rederived_on_the_next_boot() {
    let rig = Rig::new();
    for i in 0..3 {
        rig.preexisting(i);
    }
    let mut writer = rig.writer(3);
    assert_eq!(writer.store().state(), CapacityState::Active);

    for _ in 0..20 {
        writer.submit(&rec(Tag::Eda, "10")).unwrap();
    }
    assert_eq!(writer.store().state(), CapacityState::Exhausted);
    assert_eq!(rig.file_count(), 3);
}

#[test]
fn disabling_recording_holds_the_buffer() {
    let rig = Rig::new();
    let mut writer = rig.writer(2);
    writer.submit(&rec(Tag::Eda, "10")).unwrap();

    rig.state.set_recording_enabled(false);
    for _ in 0..100 {
        writer.submit(&rec(Tag::Ppg, "812")).unwrap();
    }
    assert_eq!(writer.buffer().as_bytes(), b"E:10\n");
    assert_eq!(rig.file_count(), 0);

    rig.state.set_recording_enabled(true);
    writer.submit(&rec(Tag::Ppg, "812")).unwrap();
    assert_eq!(writer.buffer().as_bytes(), b"E:10\nP:812\n");
}

// ---------------------------------------------------------------------------
// Full scheduler
// ---------------------------------------------------------------------------
struct Steady {
    tag: Tag,
    state: Arc<AcquisitionState>,
    payload: &'static str,
}

impl SensorSource for Steady {
    fn tag(&self) -> Tag {
        self.tag
    }

    fn poll(&mut self) -> anyhow::Result<Sample> {
        let flag = match self.tag {
            Tag::Eda => &self.state.eda,
            Tag::Motion => &self.state.motion,
            _ => &self.state.ppg,
        };
        Ok(if flag.take() {
            Sample::Ready(self.payload.to_string())
        } else {
            Sample::Idle
        })
    }

    fn set_power(&mut self, _: bool) -> anyhow::Result<()> {
        Ok(())
    }
}

struct Frozen;

impl Clock for Frozen {
    fn now(&mut self) -> anyhow::Result<Timestamp> {
        Ok(Timestamp {
            year: 2016,
            month: 5,
            day: 1,
            hour: 12,
            minute: 0,
            second: 0,
            subsecond: 250,
        })
    }
}

#[test]
fn scheduler_output_lands_in_files_in_poll_order() {
    let rig = Rig::new();
    let state = rig.state.clone();
    let source = |tag, payload| -> Box<dyn SensorSource + Send> {
        Box::new(Steady {
            tag,
            state: state.clone(),
            payload,
        })
    };
    let sources = vec![
        source(Tag::Ppg, "812"),
        source(Tag::Motion, "1:2:3"),
        source(Tag::Eda, "1200"),
    ];
    let mut sched = Scheduler::new(sources, Box::new(Frozen), rig.writer(10), state.clone());

    // 43 bytes per cycle; the third cycle's motion record crosses T = 100.
    for _ in 0..3 {
        state.eda.raise();
        state.motion.raise();
        state.ppg.raise();
        assert_eq!(sched.run_cycle().unwrap(), 3);
    }

    let cycle = "E:1200\nA:1:2:3\nP:812\nT:2016:5:1:12:0:0:250\n";
    let flushed = format!("{}{}E:1200\n", cycle, cycle);
    assert_eq!(flushed.len(), 93);

    let file = rig.file(0);
    assert_eq!(&file[..93], flushed.as_bytes());
    assert!(file[93..].iter().all(|&b| b == 0));
    assert_eq!(
        sched.sink().buffer().as_bytes(),
        b"A:1:2:3\nP:812\nT:2016:5:1:12:0:0:250\n"
    );
    assert_eq!(rig.file_count(), 1);
    rig.assert_exclusive();
}
