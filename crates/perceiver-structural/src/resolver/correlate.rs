use std::collections::HashMap;
use std::time::Instant;

use perception_core_types::{BackendNodeId, CandidateIndex, SelectorMap};
use tracing::debug;

use crate::events;
use crate::ports::AccessibilityPort;

/// Backend node id -> scanner candidate, for one scan.
#[derive(Clone, Debug, Default)]
pub struct CorrelationMap {
    by_backend: HashMap<BackendNodeId, CandidateIndex>,
}

impl CorrelationMap {
    pub fn candidate_for(&self, backend_node_id: BackendNodeId) -> Option<&CandidateIndex> {
        self.by_backend.get(&backend_node_id)
    }

    pub fn insert(&mut self, backend_node_id: BackendNodeId, index: CandidateIndex) {
        self.by_backend.entry(backend_node_id).or_insert(index);
    }

    pub fn len(&self) -> usize {
        self.by_backend.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_backend.is_empty()
    }
}

/// Resolve every candidate's xpaths to a live backend id. The first path that resolves wins;
/// when two candidates land on the same node the lower index keeps it.
///
/// This costs one evaluate + describe round trip per attempted path on every call.
// TODO: take backend ids straight from the scanner payload once it reports them, and drop the
// per-candidate round trips.
pub async fn build_correlation_map<P>(port: &P, selectors: &SelectorMap) -> CorrelationMap
where
    P: AccessibilityPort + ?Sized,
{
    let started = Instant::now();
    let mut map = CorrelationMap::default();
    let mut round_trips = 0usize;

    for (index, xpaths) in selectors {
        for xpath in xpaths.iter().filter(|xpath| !xpath.is_empty()) {
            round_trips += 1;
            match port.backend_id_for_xpath(xpath).await {
                Ok(Some(backend_id)) => {
                    map.insert(backend_id, index.clone());
                    break;
                }
                Ok(None) => {}
                Err(err) => {
                    debug!(
                        target: "perceiver-structural",
                        %index,
                        %xpath,
                        ?err,
                        "candidate xpath did not resolve"
                    );
                }
            }
        }
    }

    events::emit_correlation(selectors.len(), map.len(), round_trips, started.elapsed());
    map
}
