#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use reminder_core::{
    BannerOptions, BannerSink, BlockQuery, BlockRecord, BlockSource, CommandRegistry, CommandSpec,
    HostError, ManualClock, MemorySettings, ReminderService, Severity,
};
use serde_json::Value;
use tokio::sync::Notify;

pub fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 10, d)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

pub fn block(id: &str, raw: &str) -> BlockRecord {
    BlockRecord {
        id: id.to_string(),
        raw_text: raw.to_string(),
        container_name: "Oct 14th, 2025".to_string(),
        scheduled_property: None,
    }
}

/// In-memory host database answering both block queries.
#[derive(Default)]
pub struct FakeBlocks {
    blocks: Mutex<Vec<BlockRecord>>,
    failing: Mutex<bool>,
}

impl FakeBlocks {
    pub fn with(blocks: Vec<BlockRecord>) -> Self {
        Self {
            blocks: Mutex::new(blocks),
            failing: Mutex::new(false),
        }
    }

    pub fn push(&self, block: BlockRecord) {
        self.blocks.lock().push(block);
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }
}

#[async_trait]
impl BlockSource for FakeBlocks {
    async fn query(&self, query: &BlockQuery) -> Result<Vec<BlockRecord>, HostError> {
        if *self.failing.lock() {
            return Err(HostError::Unavailable("database offline".into()));
        }
        let blocks = self.blocks.lock();
        let matches = blocks
            .iter()
            .filter(|block| match query {
                BlockQuery::ContainsMarker(marker) => block.raw_text.contains(marker.as_str()),
                BlockQuery::HasScheduledProperty => block.scheduled_property.is_some(),
            })
            .cloned()
            .collect();
        Ok(matches)
    }
}

#[derive(Default)]
pub struct RecordingBanner {
    pub failing: Mutex<bool>,
    pub shown: Mutex<Vec<(String, Severity)>>,
    gate: Mutex<Option<Arc<Notify>>>,
    parked: Mutex<usize>,
}

impl RecordingBanner {
    pub fn messages(&self) -> Vec<String> {
        self.shown.lock().iter().map(|(m, _)| m.clone()).collect()
    }

    /// Makes every later `show` wait on the returned gate before recording.
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    /// Number of `show` calls currently waiting on the gate.
    pub fn parked(&self) -> usize {
        *self.parked.lock()
    }
}

#[async_trait]
impl BannerSink for RecordingBanner {
    async fn show(
        &self,
        message: &str,
        severity: Severity,
        _options: Option<BannerOptions>,
    ) -> Result<(), HostError> {
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            *self.parked.lock() += 1;
            gate.notified().await;
            *self.parked.lock() -= 1;
        }
        if *self.failing.lock() {
            return Err(HostError::Rejected("banner".into()));
        }
        self.shown.lock().push((message.to_string(), severity));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingCommands {
    pub registered: Mutex<Vec<CommandSpec>>,
}

impl CommandRegistry for RecordingCommands {
    fn register(&self, spec: CommandSpec) -> Result<(), HostError> {
        self.registered.lock().push(spec);
        Ok(())
    }
}

pub struct Harness {
    pub blocks: Arc<FakeBlocks>,
    pub banner: Arc<RecordingBanner>,
    pub store: Arc<MemorySettings>,
    pub clock: Arc<ManualClock>,
    pub service: Arc<ReminderService>,
}

impl Harness {
    pub fn new(blocks: Vec<BlockRecord>, settings: Value, now: NaiveDateTime) -> Self {
        Self::with_store(blocks, Arc::new(MemorySettings::with_values(settings)), now)
    }

    pub fn with_store(
        blocks: Vec<BlockRecord>,
        store: Arc<MemorySettings>,
        now: NaiveDateTime,
    ) -> Self {
        let blocks = Arc::new(FakeBlocks::with(blocks));
        let banner = Arc::new(RecordingBanner::default());
        let clock = Arc::new(ManualClock::new(now));
        let service = ReminderService::builder()
            .with_block_source(blocks.clone())
            .with_banner_sink(banner.clone())
            .with_settings_store(store.clone())
            .with_clock(clock.clone())
            .build()
            .expect("build reminder service");
        Self {
            blocks,
            banner,
            store,
            clock,
            service: Arc::new(service),
        }
    }
}
