use super::producer::Worker;
use crate::data::{FailureKind, FetchFailure, FetchKind, FetchOutcome};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Worker that replays queued outcomes per kind.
///
/// The last queued outcome repeats once the queue is drained. A kind with
/// nothing queued fails with a process error.
#[derive(Default)]
pub struct ScriptedWorker {
    outcomes: Mutex<HashMap<FetchKind, VecDeque<FetchOutcome>>>,
    delays: HashMap<FetchKind, Duration>,
    calls: Mutex<Vec<(FetchKind, String)>>,
    finished: Mutex<Vec<FetchKind>>,
}

impl ScriptedWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, kind: FetchKind, outcome: FetchOutcome) -> Self {
        self.outcomes
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push_back(outcome);
        self
    }

    pub fn with_delay(mut self, kind: FetchKind, delay: Duration) -> Self {
        self.delays.insert(kind, delay);
        self
    }

    pub fn calls(&self, kind: FetchKind) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    pub fn urls(&self, kind: FetchKind) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, url)| url.clone())
            .collect()
    }

    pub fn finished(&self, kind: FetchKind) -> bool {
        self.finished.lock().unwrap().contains(&kind)
    }

    fn next(&self, kind: FetchKind) -> FetchOutcome {
        let mut outcomes = self.outcomes.lock().unwrap();
        match outcomes.get_mut(&kind) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Err(FetchFailure::new(
                FailureKind::ProcessError,
                format!("nothing scripted for {}", kind),
            )),
        }
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    async fn run(&self, kind: FetchKind, url: &str) -> FetchOutcome {
        self.calls.lock().unwrap().push((kind, url.to_string()));
        if let Some(delay) = self.delays.get(&kind) {
            tokio::time::sleep(*delay).await;
        }
        let outcome = self.next(kind);
        self.finished.lock().unwrap().push(kind);
        outcome
    }
}
