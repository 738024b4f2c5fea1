#[cfg(test)]
mod tests {
    use crate::barrel::client::BarrelClient;
    use crate::barrel::handlers;
    use crate::barrel::service::BarrelNode;
    use crate::barrel::store::BarrelStore;
    use crate::barrel::types::QueueSnapshot;
    use crate::config::Config;
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::Arc;

    fn terms(words: &[&str]) -> HashSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn store() -> BarrelStore {
        BarrelStore::new(1_000, 0.01)
    }

    fn query(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    // ============================================================
    // SEARCH
    // ============================================================

    #[test]
    fn empty_index_returns_nothing() {
        let store = store();
        assert!(store.search(&query(&["anything"])).is_empty());
    }

    #[test]
    fn empty_term_list_returns_nothing() {
        let store = store();
        store.update_index(
            "http://a",
            "A",
            "hello world",
            &terms(&["hello", "world"]),
            &HashSet::new(),
        );
        assert!(store.search(&[]).is_empty());
    }

    #[test]
    fn index_then_search_single_term() {
        let store = store();
        store.update_index(
            "http://a",
            "A",
            "hello world",
            &terms(&["hello", "world"]),
            &terms(&["http://b"]),
        );

        let results = store.search(&query(&["hello"]));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "http://a");
        assert_eq!(results[0].title, "A");
        assert_eq!(results[0].snippet, "hello world");
        assert_eq!(results[0].relevance, 0);
    }

    #[test]
    fn search_is_case_insensitive() {
        let store = store();
        store.update_index("http://a", "A", "", &terms(&["hello"]), &HashSet::new());
        assert_eq!(store.search(&query(&["HELLO"])).len(), 1);
    }

    #[test]
    fn conjunctive_and_requires_every_term() {
        let store = store();
        store.update_index("p1", "P1", "", &terms(&["x", "y"]), &HashSet::new());
        store.update_index("p2", "P2", "", &terms(&["x"]), &HashSet::new());

        let results = store.search(&query(&["x", "y"]));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "p1");
    }

    #[test]
    fn one_unindexed_term_empties_the_result() {
        let store = store();
        store.update_index("p1", "P1", "", &terms(&["x", "y"]), &HashSet::new());
        assert!(store.search(&query(&["x", "zzz"])).is_empty());
    }

    #[test]
    fn relevance_counts_backlinks() {
        let store = store();
        store.update_index(
            "http://a",
            "A",
            "hello world",
            &terms(&["hello", "world"]),
            &terms(&["http://b"]),
        );
        store.update_index(
            "http://c",
            "C",
            "hello planet",
            &terms(&["hello", "planet"]),
            &terms(&["http://a"]),
        );

        let results = store.search(&query(&["hello"]));
        assert_eq!(results.len(), 2);
        let a = results.iter().find(|r| r.url == "http://a").unwrap();
        let c = results.iter().find(|r| r.url == "http://c").unwrap();
        assert_eq!(a.relevance, 1);
        assert_eq!(c.relevance, 0);
    }

    // ============================================================
    // UPDATE SEMANTICS
    // ============================================================

    #[test]
    fn update_is_idempotent() {
        let store = store();
        let words = terms(&["hello", "world"]);
        let links = terms(&["http://b"]);

        store.update_index("http://a", "A", "hello world", &words, &links);
        let stats_before = store.stats_line();
        let results_before = store.search(&query(&["hello"]));

        store.update_index("http://a", "A", "hello world", &words, &links);
        assert_eq!(store.stats_line(), stats_before);
        assert_eq!(store.search(&query(&["hello"])), results_before);
    }

    #[test]
    fn reindexing_overwrites_page_record() {
        let store = store();
        store.update_index("http://a", "Old", "old words", &terms(&["old"]), &HashSet::new());
        store.update_index("http://a", "New", "new words", &terms(&["new"]), &HashSet::new());

        let results = store.search(&query(&["new"]));
        assert_eq!(results[0].title, "New");
        assert_eq!(results[0].snippet, "new words");

        // The index is monotonic: the old term still resolves.
        assert_eq!(store.search(&query(&["old"])).len(), 1);
    }

    #[test]
    fn counts_never_decrease() {
        let store = store();
        let mut last_words = 0;
        let mut last_urls = 0;
        for i in 0..20 {
            store.update_index(
                &format!("http://page{}", i),
                "T",
                "",
                &terms(&[&format!("term{}", i % 7)]),
                &HashSet::new(),
            );
            assert!(store.word_count() >= last_words);
            assert!(store.url_count() >= last_urls);
            last_words = store.word_count();
            last_urls = store.url_count();
        }
    }

    #[test]
    fn backlinks_are_duplicate_free() {
        let store = store();
        store.update_index("s1", "S1", "", &HashSet::new(), &terms(&["t"]));
        store.update_index("s1", "S1", "", &HashSet::new(), &terms(&["t"]));
        store.update_index("s2", "S2", "", &HashSet::new(), &terms(&["t"]));

        let mut links = store.backlinks_of("t");
        links.sort();
        assert_eq!(links, vec!["s1", "s2"]);
        assert!(store.backlinks_of("unknown").is_empty());
    }

    #[test]
    fn stats_line_format() {
        let store = store();
        store.update_index("http://a", "A", "", &terms(&["hello", "world"]), &HashSet::new());
        let stats = store.stats_line();
        assert!(stats.starts_with("Index: 2 words, 1 URLs. BloomFilter[m="));
        assert!(stats.ends_with("%]"));
    }

    // ============================================================
    // SYNC / EXPORT / MERGE
    // ============================================================

    #[test]
    fn merge_produces_a_superset() {
        let source = store();
        source.update_index(
            "http://a",
            "A",
            "s",
            &terms(&["alpha", "beta"]),
            &terms(&["http://b"]),
        );
        source.update_index("http://b", "B", "s", &terms(&["beta"]), &HashSet::new());

        let target = store();
        target.update_index("http://c", "C", "s", &terms(&["gamma"]), &HashSet::new());
        target.merge(
            source.export_index(),
            source.export_backlinks(),
            source.export_pages(),
        );
        target.rebuild_bloom();

        // Everything the source knew, the target now knows too.
        for (term, urls) in source.export_index() {
            let target_index = target.export_index();
            let target_urls = target_index.get(&term).unwrap();
            assert!(urls.is_subset(target_urls));
        }
        assert_eq!(target.search(&query(&["alpha"])).len(), 1);
        // Pre-existing data survives the merge.
        assert_eq!(target.search(&query(&["gamma"])).len(), 1);
    }

    // ============================================================
    // DISK SNAPSHOT
    // ============================================================

    #[test]
    fn state_snapshot_roundtrip_rebuilds_bloom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("barrel_state_primary.bin");

        let original = store();
        original.update_index(
            "http://a",
            "A",
            "hello world",
            &terms(&["hello", "world"]),
            &terms(&["http://b"]),
        );
        original.save_state(&path).unwrap();

        let restored = store();
        assert!(restored.load_state(&path).unwrap());
        let results = restored.search(&query(&["hello", "world"]));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "http://a");
        assert_eq!(restored.backlinks_of("http://b"), vec!["http://a"]);
    }

    #[test]
    fn loading_a_missing_snapshot_is_not_an_error() {
        let restored = store();
        assert!(!restored.load_state(Path::new("no_such_state.bin")).unwrap());
        assert!(restored.is_empty());
    }

    #[test]
    fn queue_snapshot_serialization_preserves_order() {
        let snapshot = QueueSnapshot {
            pending: vec!["u1".into(), "u2".into(), "u3".into()],
            visited: ["u1", "u2", "u3", "u0"].iter().map(|s| s.to_string()).collect(),
        };
        let encoded = bincode::serialize(&snapshot).unwrap();
        let decoded: QueueSnapshot = bincode::deserialize(&encoded).unwrap();
        assert_eq!(decoded.pending, snapshot.pending);
        assert_eq!(decoded.visited, snapshot.visited);
        assert_eq!(decoded.coverage(), 7);
    }

    // ============================================================
    // NODE LIFECYCLE
    // ============================================================

    fn node_config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.data_dir = dir.to_path_buf();
        config
    }

    #[tokio::test]
    async fn queue_backup_survives_a_cold_start() {
        let dir = tempfile::tempdir().unwrap();
        let config = node_config(dir.path());

        let snapshot = QueueSnapshot {
            pending: vec!["http://a".into()],
            visited: ["http://a".to_string()].into_iter().collect(),
        };

        let node = BarrelNode::new(&config, 1);
        node.store_queue_backup(snapshot.clone());
        assert_eq!(node.restore_queue(), snapshot);

        // A fresh process with the same data dir still has the snapshot.
        let restarted = BarrelNode::new(&config, 1);
        assert_eq!(restarted.restore_queue(), snapshot);
    }

    #[tokio::test]
    async fn recovery_falls_back_to_the_primary_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let config = node_config(dir.path());

        let primary = BarrelNode::new(&config, 0);
        primary.store.update_index(
            "http://a",
            "A",
            "s",
            &terms(&["hello"]),
            &HashSet::new(),
        );
        primary.store.save_state(&primary.state_file()).unwrap();

        // No peers reachable: the restarted node loads the disk snapshot.
        let restarted = BarrelNode::new(&config, 0);
        restarted.recover(&[]).await;
        assert_eq!(restarted.store.search(&query(&["hello"])).len(), 1);
    }

    #[tokio::test]
    async fn recovery_prefers_a_live_peer() {
        let peer_dir = tempfile::tempdir().unwrap();
        let peer_node = Arc::new(BarrelNode::new(&node_config(peer_dir.path()), 0));
        peer_node.store.update_index(
            "http://a",
            "A",
            "s",
            &terms(&["hello", "world"]),
            &terms(&["http://b"]),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = handlers::router(Arc::clone(&peer_node));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let peer_client = BarrelClient::new("GoogolBarrel0", format!("http://{}", addr));

        let dir = tempfile::tempdir().unwrap();
        let node = BarrelNode::new(&node_config(dir.path()), 1);
        node.recover(&[peer_client]).await;

        // Peer sync property: the synced node is a superset of the peer.
        for (term, urls) in peer_node.store.export_index() {
            let index = node.store.export_index();
            assert!(urls.is_subset(index.get(&term).unwrap()));
        }
        let results = node.store.search(&query(&["hello"]));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "http://a");
    }
}
