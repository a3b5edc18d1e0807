//! The same scenarios as the in-process tests, against a live Redis.
//!
//! Runs only with `--features redis` and `REDIS_URL` set, e.g.
//! `REDIS_URL=redis://127.0.0.1:6379/15 cargo test --features redis`.
//! Each test works in its own namespace and deletes it afterwards.

#![cfg(feature = "redis")]

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::time::Duration;

use vicinity_lsh::distance::normalize;
use vicinity_lsh::{
    BucketStore, IndexAction, LshConfig, LshError, LshIndex, RedisStore, StoreConfig,
};

fn store_config() -> Option<StoreConfig> {
    let uri = std::env::var("REDIS_URL").ok()?;
    Some(StoreConfig {
        uri,
        pool_size: 4,
        timeout: Duration::from_secs(2),
    })
}

/// Namespace unique to this process and test.
fn namespace(test: &str) -> String {
    format!("vlsh-test-{}-{test}", std::process::id())
}

fn config(store: StoreConfig, ns: &str) -> LshConfig {
    LshConfig::new(8)
        .with_bands(32, 4)
        .with_namespace(ns)
        .with_seed(11)
        .with_workers(2)
        .with_scan_batch(3)
        .with_store(store)
}

fn vectors(n: usize) -> Vec<Vec<f32>> {
    (0..n)
        .map(|i| {
            let v: Vec<f32> = (0..8).map(|d| ((i * 8 + d) as f32 * 0.61).sin()).collect();
            normalize(&v)
        })
        .collect()
}

/// Deletes the namespace when dropped, even if the test panics.
struct Cleanup(RedisStore);

impl Drop for Cleanup {
    fn drop(&mut self) {
        let _ = self.0.clear_namespace();
    }
}

fn cleanup(store: &StoreConfig, ns: &str) -> Cleanup {
    Cleanup(RedisStore::connect(store, ns).unwrap())
}

#[test]
fn store_primitives_round_trip() {
    let Some(sc) = store_config() else { return };
    let ns = namespace("primitives");
    let _guard = cleanup(&sc, &ns);
    let store = RedisStore::connect(&sc, ns.clone()).unwrap();

    store.add_members(7, &[(0, 1), (1, 2), (2, 3)]).unwrap();
    for id in 0..10 {
        store.add_member(0, 1, id).unwrap();
    }
    assert_eq!(store.get_members(0, 1).unwrap(), (0..10).collect::<HashSet<_>>());

    // Small sets may come back in one reply whatever the COUNT hint.
    let mut visits = 0;
    store
        .scan_members(0, 1, 2, &mut |chunk| {
            assert!(!chunk.is_empty());
            visits += 1;
            ControlFlow::Break(())
        })
        .unwrap();
    assert_eq!(visits, 1);

    store.remove_members(7, &[(0, 1), (1, 2), (2, 3)]).unwrap();
    assert!(store.get_members(1, 2).unwrap().is_empty());

    store.put_vector(1, b"one").unwrap();
    store.put_vector(3, b"three").unwrap();
    assert_eq!(
        store.get_vectors(&[3, 2, 1]).unwrap(),
        vec![Some(b"three".to_vec()), None, Some(b"one".to_vec())]
    );
    assert!(store.delete_vector(3).unwrap());
    assert!(!store.delete_vector(3).unwrap());

    assert!(store.put_meta_if_absent(b"first").unwrap());
    assert!(!store.put_meta_if_absent(b"second").unwrap());
    assert_eq!(store.get_meta().unwrap().as_deref(), Some(&b"first"[..]));

    let counts = store.counts().unwrap();
    assert_eq!(counts.vectors, 1);
    assert_eq!(counts.buckets, 1);
}

#[test]
fn reindex_purges_previous_buckets() {
    let Some(sc) = store_config() else { return };
    let ns = namespace("reindex");
    let _guard = cleanup(&sc, &ns);
    let index = LshIndex::connect(config(sc, &ns)).unwrap();

    let old = vectors(1).remove(0);
    let new: Vec<f32> = old.iter().map(|x| -x).collect();
    assert_eq!(index.index_one(5, &old).unwrap(), IndexAction::Inserted);
    assert_eq!(index.index_one(5, &new).unwrap(), IndexAction::Replaced);

    let old_buckets = index
        .partitioner()
        .band_hashes(&index.projector().compute_signature(&old).unwrap());
    for (band, hash) in old_buckets.into_iter().enumerate() {
        assert!(!index.store().get_members(band, hash).unwrap().contains(&5));
    }
    assert!(!index.candidates(&old).unwrap().contains(&5));
    assert_eq!(index.get_top_k(&new, 1).unwrap()[0].id, 5);
}

#[test]
fn clear_empties_namespace() {
    let Some(sc) = store_config() else { return };
    let ns = namespace("clear");
    let _guard = cleanup(&sc, &ns);
    let index = LshIndex::connect(config(sc, &ns)).unwrap();

    let data = vectors(50);
    let ids: Vec<u64> = (0..50).collect();
    assert!(index.index(&ids, &data).unwrap().is_complete());
    assert_eq!(index.stats().unwrap().indexed_items, 50);
    assert_eq!(index.get_top_k(&data[17], 1).unwrap()[0].id, 17);

    index.clear().unwrap();
    let stats = index.stats().unwrap();
    assert_eq!(stats.indexed_items, 0);
    assert_eq!(stats.nonempty_buckets, 0);
    assert!(index.get_top_k(&data[17], 5).unwrap().is_empty());
}

#[test]
fn glob_characters_in_prefix_stay_isolated() {
    let Some(sc) = store_config() else { return };
    let base = namespace("glob");
    let wild = format!("{base}*");
    let sibling = format!("{base}x");
    let _g1 = cleanup(&sc, &wild);
    let _g2 = cleanup(&sc, &sibling);

    // Stores bypass config validation, so a raw prefix can hold `*`.
    let wild_store = RedisStore::connect(&sc, wild).unwrap();
    let sibling_store = RedisStore::connect(&sc, sibling).unwrap();
    sibling_store.put_vector(1, b"keep").unwrap();
    sibling_store.add_member(0, 0, 1).unwrap();
    wild_store.put_vector(1, b"drop").unwrap();

    let counts = wild_store.counts().unwrap();
    assert_eq!(counts.vectors, 1);
    assert_eq!(counts.buckets, 0);

    assert_eq!(wild_store.clear_namespace().unwrap(), 1);
    assert_eq!(sibling_store.get_vector(1).unwrap().as_deref(), Some(&b"keep"[..]));
    assert_eq!(sibling_store.counts().unwrap().buckets, 1);
}

#[test]
fn namespaces_are_isolated() {
    let Some(sc) = store_config() else { return };
    let (a_ns, b_ns) = (namespace("iso-a"), namespace("iso-b"));
    let _ga = cleanup(&sc, &a_ns);
    let _gb = cleanup(&sc, &b_ns);
    let a = LshIndex::connect(config(sc.clone(), &a_ns)).unwrap();
    let b = LshIndex::connect(config(sc, &b_ns)).unwrap();

    let data = vectors(4);
    a.index(&[1, 2], &data[..2]).unwrap();
    b.index(&[1, 2, 3], &data[1..]).unwrap();

    a.clear().unwrap();
    assert_eq!(a.stats().unwrap().indexed_items, 0);
    assert_eq!(b.stats().unwrap().indexed_items, 3);
    assert_eq!(b.get_top_k(&data[3], 1).unwrap()[0].id, 3);
}

#[test]
fn reopen_with_mismatched_config_is_refused() {
    let Some(sc) = store_config() else { return };
    let ns = namespace("reopen");
    let _guard = cleanup(&sc, &ns);
    let first = LshIndex::connect(config(sc.clone(), &ns)).unwrap();
    first.index_one(1, &vectors(1)[0]).unwrap();

    let err = LshIndex::connect(config(sc.clone(), &ns).with_bands(32, 8)).unwrap_err();
    assert!(matches!(err, LshError::StorageInconsistent(_)), "{err:?}");

    let mut unseeded = config(sc, &ns);
    unseeded.seed = None;
    let reopened = LshIndex::connect(unseeded).unwrap();
    assert_eq!(reopened.seed(), first.seed());
    assert_eq!(reopened.get_top_k(&vectors(1)[0], 1).unwrap()[0].id, 1);
}
