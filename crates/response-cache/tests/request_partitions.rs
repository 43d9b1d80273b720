use std::sync::Arc;

use perception_core_types::RequestId;
use response_cache::{CacheKey, CacheOp, ResponseCache};
use serde_json::json;

fn key(request: usize, step: usize) -> CacheKey {
    CacheKey::derive(
        CacheOp::Extract,
        &json!({ "instruction": format!("request {request}"), "chunk": step }),
    )
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_purge_independently() {
    let cache = Arc::new(ResponseCache::default());
    let requests: Vec<RequestId> = (0..8).map(|_| RequestId::new()).collect();

    let mut handles = Vec::new();
    for (n, request_id) in requests.iter().cloned().enumerate() {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            for step in 0..10 {
                cache.put(key(n, step), json!({ "step": step }), &request_id);
            }
            if n % 2 == 0 {
                cache.purge(&request_id)
            } else {
                0
            }
        }));
    }
    let mut purged = 0;
    for handle in handles {
        purged += handle.await.unwrap();
    }

    assert_eq!(purged, 40);
    assert_eq!(cache.len(), 40);
    for n in 0..requests.len() {
        for step in 0..10 {
            let hit = cache.get(&key(n, step));
            if n % 2 == 0 {
                assert!(hit.is_none());
            } else {
                assert_eq!(hit, Some(json!({ "step": step })));
            }
        }
    }
}

#[test]
fn identical_inputs_share_one_entry() {
    let cache = ResponseCache::default();
    let first = RequestId::new();
    let second = RequestId::new();
    let inputs = json!({ "instruction": "price", "schema": { "type": "number" } });

    cache.put(CacheKey::derive(CacheOp::Extract, &inputs).unwrap(), json!(1), &first);
    cache.put(CacheKey::derive(CacheOp::Extract, &inputs).unwrap(), json!(2), &second);
    assert_eq!(cache.len(), 1);

    // The entry now belongs to the second request only.
    assert_eq!(cache.purge(&first), 0);
    assert_eq!(cache.purge(&second), 1);
    assert!(cache.is_empty());
}
