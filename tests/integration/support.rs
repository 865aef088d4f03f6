//! Scripted source and sinks shared by the harvest scenarios

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use match_harvester::fetcher::{FetcherError, FetcherResult, MatchSource};
use match_harvester::output::{ExportRow, OutputError, OutputResult, RecordSink};
use match_harvester::shutdown::SharedShutdown;
use match_harvester::{DetailRecord, MatchId, UnitRef};

/// Match id on the KR platform
pub fn id(n: u64) -> MatchId {
    MatchId::parse(&format!("KR_{n}")).unwrap()
}

/// Ranked solo record with ten participants
pub fn ranked_record(id: &MatchId) -> DetailRecord {
    let participants: Vec<_> = (0..10).map(|i| json!({ "participantId": i })).collect();
    DetailRecord::from_payload(
        id.clone(),
        json!({
            "metadata": { "matchId": id.to_string() },
            "info": {
                "queueId": 420,
                "gameVersion": "14.3.558.106",
                "gameCreation": 1_700_000_000_000i64,
                "participants": participants,
                "teams": [ { "teamId": 100, "win": true }, { "teamId": 200, "win": false } ]
            }
        }),
    )
}

/// Deterministic in-memory API.
///
/// Detail fetches succeed with [`ranked_record`] unless a failure was queued
/// for that id; queued failures are served first, in order.
#[derive(Default)]
pub struct ScriptedSource {
    pages: Vec<Vec<UnitRef>>,
    candidates: HashMap<String, Vec<MatchId>>,
    failures: Mutex<HashMap<MatchId, VecDeque<FetcherError>>>,
    page_failures: Mutex<HashMap<u32, VecDeque<FetcherError>>>,
    detail_calls: Mutex<Vec<MatchId>>,
    listing_calls: Mutex<Vec<u32>>,
    candidate_calls: Mutex<Vec<String>>,
    stop_after_details: Mutex<Option<(usize, SharedShutdown)>>,
    stop_after_listings: Mutex<Option<(usize, SharedShutdown)>>,
}

impl ScriptedSource {
    /// Single discovery page with one unit per `(puuid, ids)` entry
    pub fn single_page(units: &[(&str, Vec<MatchId>)]) -> Self {
        Self::paged(&[units])
    }

    /// One discovery page per slice, in order; later pages are empty
    pub fn paged(pages: &[&[(&str, Vec<MatchId>)]]) -> Self {
        let mut source = Self::default();
        for units in pages {
            let page = units
                .iter()
                .map(|(puuid, _)| UnitRef::from_puuid(*puuid, Some("CHALLENGER".to_string())))
                .collect();
            source.pages.push(page);
            for (puuid, ids) in units.iter() {
                source.candidates.insert(puuid.to_string(), ids.clone());
            }
        }
        source
    }

    /// Queue `failure` for the next listing of discovery page `page`
    pub fn fail_page(&self, page: u32, failure: FetcherError) {
        self.page_failures
            .lock()
            .unwrap()
            .entry(page)
            .or_default()
            .push_back(failure);
    }

    /// Request a stop once `count` discovery listings have been served
    pub fn stop_after_listings(&self, count: usize, shutdown: SharedShutdown) {
        *self.stop_after_listings.lock().unwrap() = Some((count, shutdown));
    }

    /// Discovery pages requested, in call order
    pub fn listing_calls(&self) -> Vec<u32> {
        self.listing_calls.lock().unwrap().clone()
    }

    /// Unit keys whose candidate ids were listed, in call order
    pub fn candidate_calls(&self) -> Vec<String> {
        self.candidate_calls.lock().unwrap().clone()
    }

    /// Queue `failure` for the next fetch of `id`
    pub fn fail_next(&self, id: &MatchId, failure: FetcherError) {
        self.failures
            .lock()
            .unwrap()
            .entry(id.clone())
            .or_default()
            .push_back(failure);
    }

    /// Request a stop once `count` detail fetches have been served
    pub fn stop_after_details(&self, count: usize, shutdown: SharedShutdown) {
        *self.stop_after_details.lock().unwrap() = Some((count, shutdown));
    }

    /// Ids passed to `fetch_detail`, in call order
    pub fn detail_calls(&self) -> Vec<MatchId> {
        self.detail_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MatchSource for ScriptedSource {
    async fn list_discovery_units(&self, page: u32) -> FetcherResult<Vec<UnitRef>> {
        let served = {
            let mut calls = self.listing_calls.lock().unwrap();
            calls.push(page);
            calls.len()
        };
        if let Some((limit, shutdown)) = self.stop_after_listings.lock().unwrap().as_ref() {
            if served >= *limit {
                shutdown.request_shutdown();
            }
        }

        let failure = self
            .page_failures
            .lock()
            .unwrap()
            .get_mut(&page)
            .and_then(|queue| queue.pop_front());
        match failure {
            Some(err) => Err(err),
            None => Ok(self.pages.get(page as usize).cloned().unwrap_or_default()),
        }
    }

    async fn list_candidate_identifiers(
        &self,
        unit: &UnitRef,
        count: u32,
    ) -> FetcherResult<Vec<MatchId>> {
        let key = unit.key().unwrap_or_default();
        self.candidate_calls.lock().unwrap().push(key.clone());
        let ids = self.candidates.get(&key).cloned().unwrap_or_default();
        Ok(ids.into_iter().take(count as usize).collect())
    }

    async fn fetch_detail(&self, id: &MatchId) -> FetcherResult<DetailRecord> {
        let served = {
            let mut calls = self.detail_calls.lock().unwrap();
            calls.push(id.clone());
            calls.len()
        };
        if let Some((limit, shutdown)) = self.stop_after_details.lock().unwrap().as_ref() {
            if served >= *limit {
                shutdown.request_shutdown();
            }
        }

        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(id)
            .and_then(|queue| queue.pop_front());
        match failure {
            Some(err) => Err(err),
            None => Ok(ranked_record(id)),
        }
    }

    fn describe(&self) -> String {
        "scripted source".to_string()
    }
}

/// Sink keeping records in memory; the append log is shared with the test.
#[derive(Default, Clone)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<DetailRecord>>>,
}

impl MemorySink {
    /// Ids appended so far, in append order
    pub fn appended(&self) -> Vec<MatchId> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.id.clone())
            .collect()
    }
}

impl RecordSink for MemorySink {
    fn append(&mut self, record: &DetailRecord) -> OutputResult<bool> {
        let mut records = self.records.lock().unwrap();
        if records.iter().any(|r| r.id == record.id) {
            return Ok(false);
        }
        records.push(record.clone());
        Ok(true)
    }

    fn contains(&self, id: &MatchId) -> bool {
        self.records.lock().unwrap().iter().any(|r| &r.id == id)
    }

    fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    fn export_snapshot(&self) -> OutputResult<Vec<ExportRow>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .map(ExportRow::from)
            .collect())
    }
}

/// Sink whose disk is always full
pub struct FailingSink;

impl RecordSink for FailingSink {
    fn append(&mut self, _record: &DetailRecord) -> OutputResult<bool> {
        Err(OutputError::IoError("No space left on device".to_string()))
    }

    fn contains(&self, _id: &MatchId) -> bool {
        false
    }

    fn len(&self) -> usize {
        0
    }

    fn export_snapshot(&self) -> OutputResult<Vec<ExportRow>> {
        Ok(Vec::new())
    }
}
