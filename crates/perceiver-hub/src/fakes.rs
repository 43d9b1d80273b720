//! In-memory scanner, probe and model used by the hub's unit tests.

use std::collections::{BTreeSet, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use perception_core_types::{ChunkScan, ScanResult};
use perceiver_layout::{ContainerBox, LayoutError, LayoutProbe, ProbeCapture, WordBox};
use serde_json::{json, Value};

use crate::errors::{ModelError, ScanError};
use crate::llm::{CompletionCall, ExtractCall, ObserveCall, PerceptionModel, RefineCall};
use crate::scanner::CandidateScanner;

type Reply = Result<Value, ModelError>;

/// Replies are queued per operation. Empty queues fall back to: extract fails, refine keeps the
/// latest data, completion says "not yet", observe fails.
#[derive(Default)]
pub struct FakeModel {
    pub extract_replies: Mutex<VecDeque<Reply>>,
    pub refine_replies: Mutex<VecDeque<Reply>>,
    pub completion_replies: Mutex<VecDeque<Reply>>,
    pub observe_replies: Mutex<VecDeque<Reply>>,
    pub extract_calls: Mutex<Vec<ExtractCall>>,
    pub refine_calls: Mutex<Vec<RefineCall>>,
    pub completion_calls: Mutex<Vec<CompletionCall>>,
    pub observe_calls: Mutex<Vec<ObserveCall>>,
}

impl FakeModel {
    pub fn queue_extract(&self, reply: Value) {
        self.extract_replies.lock().push_back(Ok(reply));
    }

    pub fn queue_observe(&self, reply: Value) {
        self.observe_replies.lock().push_back(Ok(reply));
    }
}

#[async_trait]
impl PerceptionModel for FakeModel {
    async fn extract(&self, call: &ExtractCall) -> Reply {
        self.extract_calls.lock().push(call.clone());
        self.extract_replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Transport("no extract reply".into())))
    }

    async fn refine(&self, call: &RefineCall) -> Reply {
        self.refine_calls.lock().push(call.clone());
        self.refine_replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(json!({ "data": call.latest })))
    }

    async fn check_completion(&self, call: &CompletionCall) -> Reply {
        self.completion_calls.lock().push(call.clone());
        self.completion_replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(json!({ "completed": false })))
    }

    async fn observe(&self, call: &ObserveCall) -> Reply {
        self.observe_calls.lock().push(call.clone());
        self.observe_replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Transport("no observe reply".into())))
    }
}

/// Scanner over a fixed list of chunks. Each chunk scan returns the lowest unseen chunk, or chunk
/// 0 again once every chunk has been seen.
#[derive(Default)]
pub struct FakeScanner {
    pub chunks: Vec<String>,
    pub full: Option<ScanResult>,
    pub fail_chunks: bool,
    pub chunk_requests: Mutex<Vec<usize>>,
    pub full_requests: Mutex<Vec<Option<String>>>,
}

impl FakeScanner {
    pub fn chunked(count: usize) -> Self {
        Self {
            chunks: (0..count).map(|idx| format!("chunk {idx} text")).collect(),
            ..Self::default()
        }
    }

    pub fn full(scan: ScanResult) -> Self {
        Self {
            full: Some(scan),
            ..Self::default()
        }
    }

    /// Chunk indices handed out, in order.
    pub fn served(&self) -> Vec<usize> {
        self.chunk_requests.lock().clone()
    }
}

#[async_trait]
impl CandidateScanner for FakeScanner {
    async fn scan(&self, root_xpath: Option<&str>) -> Result<ScanResult, ScanError> {
        self.full_requests
            .lock()
            .push(root_xpath.map(str::to_string));
        self.full
            .clone()
            .ok_or_else(|| ScanError::NotInjected("processAllOfDom".into()))
    }

    async fn scan_chunk(&self, seen: &BTreeSet<usize>) -> Result<ChunkScan, ScanError> {
        if self.fail_chunks || self.chunks.is_empty() {
            return Err(ScanError::Evaluation("scanner crashed".into()));
        }
        let index = (0..self.chunks.len())
            .find(|idx| !seen.contains(idx))
            .unwrap_or(0);
        self.chunk_requests.lock().push(index);
        Ok(ChunkScan {
            serialized_text: self.chunks[index].clone(),
            candidates: Default::default(),
            chunk_index: index,
            total_chunks: self.chunks.len(),
        })
    }
}

pub struct FakeProbe {
    pub container: ContainerBox,
    pub words: Option<Vec<WordBox>>,
    pub captures: Mutex<usize>,
    pub measured: Mutex<Vec<Vec<String>>>,
    pub restores: Mutex<usize>,
}

impl FakeProbe {
    pub fn new(words: Option<Vec<WordBox>>) -> Self {
        Self {
            container: ContainerBox {
                x: 0.0,
                y: 0.0,
                width: 1024.0,
                height: 512.0,
            },
            words,
            captures: Mutex::new(0),
            measured: Mutex::new(Vec::new()),
            restores: Mutex::new(0),
        }
    }
}

#[async_trait]
impl LayoutProbe for FakeProbe {
    async fn capture(&self, scope: Option<&str>) -> Result<ProbeCapture, LayoutError> {
        *self.captures.lock() += 1;
        Ok(ProbeCapture {
            scope: scope.map(str::to_string),
            container: self.container,
            markup: "<main>original</main>".into(),
        })
    }

    async fn measure(&self, xpaths: &[String]) -> Result<Vec<WordBox>, LayoutError> {
        self.measured.lock().push(xpaths.to_vec());
        self.words
            .clone()
            .ok_or_else(|| LayoutError::MalformedProbe("boxes missing".into()))
    }

    async fn restore(&self, _capture: &ProbeCapture) -> Result<(), LayoutError> {
        *self.restores.lock() += 1;
        Ok(())
    }
}
