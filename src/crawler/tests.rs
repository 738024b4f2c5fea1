#[cfg(test)]
mod tests {
    use crate::barrel::client::BarrelClient;
    use crate::barrel::handlers as barrel_handlers;
    use crate::barrel::service::BarrelNode;
    use crate::config::Config;
    use crate::crawler::fetch::{PageFetcher, parse_page, tokenize_text};
    use crate::crawler::types::FetchedPage;
    use crate::crawler::worker::{CrawlerWorker, build_snippet, SNIPPET_TOKENS};
    use crate::dispatcher::client::DispatcherClient;
    use crate::dispatcher::handlers as dispatcher_handlers;
    use crate::dispatcher::service::Dispatcher;
    use anyhow::{Result, anyhow};
    use std::collections::{HashMap, HashSet};
    use std::path::Path;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use url::Url;

    struct StubFetcher {
        pages: HashMap<String, FetchedPage>,
    }

    impl PageFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedPage> {
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow!("no such page: {}", url))
        }
    }

    fn page(title: &str, tokens: &[&str], links: &[&str]) -> FetchedPage {
        FetchedPage {
            title: title.to_string(),
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            links: links.iter().map(|l| l.to_string()).collect(),
        }
    }

    fn test_config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.rpc_port = 39351;
        config.data_dir = dir.to_path_buf();
        config
    }

    async fn spawn_barrel(dir: &Path) -> (Arc<BarrelNode>, BarrelClient) {
        let config = test_config(dir);
        let node = Arc::new(BarrelNode::new(&config, 0));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = barrel_handlers::router(Arc::clone(&node));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let client = BarrelClient::new(node.name.clone(), format!("http://{}", addr));
        (node, client)
    }

    async fn spawn_dispatcher(
        dir: &Path,
        replicas: Vec<BarrelClient>,
    ) -> (Dispatcher, DispatcherClient) {
        let dispatcher = Dispatcher::with_replicas(test_config(dir), replicas);
        let app = dispatcher_handlers::router(dispatcher.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (dispatcher, DispatcherClient::new(format!("http://{}", addr)))
    }

    fn query(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    // ============================================================
    // SNIPPET AND TOKENIZATION
    // ============================================================

    #[test]
    fn snippet_takes_the_first_thirty_tokens() {
        let tokens: Vec<String> = (0..40).map(|i| format!("t{}", i)).collect();
        let snippet = build_snippet(&tokens);
        let words: Vec<&str> = snippet.split(' ').collect();
        assert_eq!(words.len(), SNIPPET_TOKENS);
        assert_eq!(words[0], "t0");
        assert_eq!(words[29], "t29");
    }

    #[test]
    fn snippet_of_a_short_page_is_the_whole_page() {
        let tokens = vec!["hello".to_string(), "world".to_string()];
        assert_eq!(build_snippet(&tokens), "hello world");
        assert_eq!(build_snippet(&[]), "");
    }

    #[test]
    fn tokenization_lowercases_and_splits_on_whitespace() {
        let tokens = tokenize_text("Hello  WORLD\n\tRust-lang 123");
        assert_eq!(tokens, vec!["hello", "world", "rust-lang", "123"]);
        assert!(tokenize_text("   ").is_empty());
    }

    #[test]
    fn parse_page_extracts_title_tokens_and_absolute_links() {
        let base = Url::parse("http://example.com/dir/page.html").unwrap();
        let html = r#"
            <html>
              <head><title>My Page</title></head>
              <body>
                <p>Hello World</p>
                <a href="http://other.com/x">abs</a>
                <a href="relative.html">rel</a>
                <a href="/root.html">rooted</a>
              </body>
            </html>
        "#;

        let page = parse_page(&base, html);
        assert_eq!(page.title, "My Page");
        assert!(page.tokens.contains(&"hello".to_string()));
        assert!(page.tokens.contains(&"world".to_string()));
        assert!(page.links.contains("http://other.com/x"));
        assert!(page.links.contains("http://example.com/dir/relative.html"));
        assert!(page.links.contains("http://example.com/root.html"));
    }

    // ============================================================
    // WORKER PIPELINE
    // ============================================================

    #[tokio::test]
    async fn a_crawled_page_reaches_barrels_and_reports_links() {
        let dir = tempfile::tempdir().unwrap();
        let (node, barrel_client) = spawn_barrel(dir.path()).await;
        let (dispatcher, dispatcher_client) =
            spawn_dispatcher(dir.path(), vec![barrel_client.clone()]).await;

        let fetcher = Arc::new(StubFetcher {
            pages: HashMap::from([(
                "http://a".to_string(),
                page("A", &["hello", "world"], &["http://b"]),
            )]),
        });

        let barrels = Arc::new(Mutex::new(vec![barrel_client]));
        let mut worker = CrawlerWorker::new(
            0,
            dispatcher_client,
            barrels,
            fetcher,
            test_config(dir.path()),
        );

        worker.process_url("http://a").await;

        // The discovered link went back to the dispatcher...
        assert_eq!(dispatcher.next_url(), Some("http://b".to_string()));
        // ...and the update reached the barrel.
        let results = node.store.search(&query(&["hello", "world"]));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "http://a");
        assert_eq!(results[0].title, "A");
        assert_eq!(results[0].snippet, "hello world");
        assert_eq!(node.store.backlinks_of("http://b"), vec!["http://a"]);
    }

    #[tokio::test]
    async fn the_full_token_stream_feeds_the_term_set() {
        let dir = tempfile::tempdir().unwrap();
        let (node, barrel_client) = spawn_barrel(dir.path()).await;
        let (_dispatcher, dispatcher_client) =
            spawn_dispatcher(dir.path(), vec![barrel_client.clone()]).await;

        let tokens: Vec<String> = (0..80).map(|i| format!("word{}", i)).collect();
        let token_refs: Vec<&str> = tokens.iter().map(String::as_str).collect();
        let fetcher = Arc::new(StubFetcher {
            pages: HashMap::from([("http://long".to_string(), page("L", &token_refs, &[]))]),
        });

        let barrels = Arc::new(Mutex::new(vec![barrel_client]));
        let mut worker = CrawlerWorker::new(
            0,
            dispatcher_client,
            barrels,
            fetcher,
            test_config(dir.path()),
        );
        worker.process_url("http://long").await;

        // Terms beyond any snippet window are still indexed...
        let results = node.store.search(&query(&["word79"]));
        assert_eq!(results.len(), 1);
        // ...while the snippet stays capped at 30 tokens.
        assert_eq!(results[0].snippet.split(' ').count(), SNIPPET_TOKENS);
    }

    #[tokio::test]
    async fn fetch_failures_abandon_the_url() {
        let dir = tempfile::tempdir().unwrap();
        let (node, barrel_client) = spawn_barrel(dir.path()).await;
        let (dispatcher, dispatcher_client) =
            spawn_dispatcher(dir.path(), vec![barrel_client.clone()]).await;

        let fetcher = Arc::new(StubFetcher {
            pages: HashMap::new(),
        });
        let barrels = Arc::new(Mutex::new(vec![barrel_client]));
        let mut worker = CrawlerWorker::new(
            0,
            dispatcher_client,
            barrels,
            fetcher,
            test_config(dir.path()),
        );

        worker.process_url("http://gone").await;

        assert!(node.store.is_empty());
        assert_eq!(dispatcher.next_url(), None);
        assert!(worker.pending_counts().is_empty());
    }

    // ============================================================
    // RELIABLE MULTICAST
    // ============================================================

    #[tokio::test]
    async fn undeliverable_updates_spill_and_drain_when_the_barrel_returns() {
        let dir = tempfile::tempdir().unwrap();

        // Reserve a port, then free it so the barrel is "down".
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut config = test_config(dir.path());
        // Make GoogolBarrel0 resolve to exactly that port.
        config.rpc_port = port - 1;
        config.barrels_count = 1;

        let name = config.barrel_names()[0].clone();
        let down_client = BarrelClient::new(name.clone(), format!("http://127.0.0.1:{}", port));

        let fetcher = Arc::new(StubFetcher {
            pages: HashMap::from([(
                "http://a".to_string(),
                page("A", &["hello", "world"], &[]),
            )]),
        });
        let barrels = Arc::new(Mutex::new(vec![down_client]));
        let (_dispatcher, dispatcher_client) = spawn_dispatcher(dir.path(), Vec::new()).await;
        let mut worker = CrawlerWorker::new(
            0,
            dispatcher_client,
            Arc::clone(&barrels),
            fetcher,
            config.clone(),
        );

        worker.process_url("http://a").await;

        // The update spilled into the pending queue and the barrel left
        // the active list.
        assert_eq!(worker.pending_counts().get(&name), Some(&1));
        assert!(barrels.lock().await.is_empty());

        // A retry pass with the barrel still down changes nothing.
        worker.retry_pending().await;
        assert_eq!(worker.pending_counts().get(&name), Some(&1));

        // Bring the barrel up on the reserved port and retry again.
        let node = Arc::new(BarrelNode::new(&config, 0));
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        let app = barrel_handlers::router(Arc::clone(&node));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        worker.retry_pending().await;

        assert!(worker.pending_counts().is_empty());
        assert_eq!(barrels.lock().await.len(), 1);
        let results = node.store.search(&query(&["hello"]));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "http://a");
    }
}
