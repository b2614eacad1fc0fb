//! Scan Behavior Tests
//!
//! Drive the walker through the public API with a scripted namespace and a
//! recording sink, checking traversal order, pruning and fault handling.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use pretty_assertions::assert_eq;
use rumqttc::QoS;

use owmqtt::{
    IgnoreList, MessageSink, Namespace, NamespaceError, OutboundMessage, PublishError, Publisher,
    Scanner, TopicMapper,
};

/// Namespace scripted from a path -> result table, logging every query.
struct ScriptedNamespace {
    nodes: HashMap<String, String>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedNamespace {
    fn new(entries: &[(&str, &str)]) -> Self {
        Self {
            nodes: entries
                .iter()
                .map(|(path, result)| (path.to_string(), result.to_string()))
                .collect(),
            queries: Mutex::new(Vec::new()),
        }
    }

    fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Namespace for &ScriptedNamespace {
    async fn get(&self, path: &str) -> Result<Bytes, NamespaceError> {
        self.queries.lock().unwrap().push(path.to_string());
        match self.nodes.get(path) {
            Some(result) => Ok(Bytes::from(result.clone())),
            None => Err(NamespaceError::Query(-1)),
        }
    }
}

/// Sink recording accepted messages; optionally fails from the nth submit on.
#[derive(Default)]
struct RecordingSink {
    accepted: Mutex<Vec<(String, String)>>,
    fail_from: Option<usize>,
    submissions: Mutex<usize>,
}

impl RecordingSink {
    fn failing_from(n: usize) -> Self {
        Self {
            fail_from: Some(n),
            ..Self::default()
        }
    }

    fn accepted(&self) -> Vec<(String, String)> {
        self.accepted.lock().unwrap().clone()
    }
}

impl MessageSink for &RecordingSink {
    fn submit(&self, message: OutboundMessage) -> Result<(), PublishError> {
        let mut submissions = self.submissions.lock().unwrap();
        *submissions += 1;
        if let Some(n) = self.fail_from {
            if *submissions >= n {
                return Err(PublishError::new(&message.topic, "connection lost"));
            }
        }
        self.accepted.lock().unwrap().push((
            message.topic,
            String::from_utf8_lossy(&message.payload).into_owned(),
        ));
        Ok(())
    }
}

fn ignore(prefixes: &[&str]) -> IgnoreList {
    let owned: Vec<String> = prefixes.iter().map(|s| s.to_string()).collect();
    IgnoreList::compile(&owned).unwrap()
}

fn scanner<'a>(
    namespace: &'a ScriptedNamespace,
    sink: &'a RecordingSink,
    prefixes: &[&str],
) -> Scanner<&'a ScriptedNamespace, &'a RecordingSink> {
    let publisher = Publisher::new(sink, TopicMapper::new("/1wire"), QoS::AtMostOnce, true);
    Scanner::new(namespace, ignore(prefixes), publisher)
}

#[tokio::test]
async fn single_device_with_ignored_settings() {
    let namespace = ScriptedNamespace::new(&[
        ("/", "28.AA/,settings/"),
        ("/28.AA/", "temperature"),
        ("/28.AA/temperature", "19.8"),
    ]);
    let sink = RecordingSink::default();

    let stats = scanner(&namespace, &sink, &["/settings/"])
        .scan("/")
        .await
        .unwrap();

    assert_eq!(
        sink.accepted(),
        vec![("/1wire/28.AA/temperature".to_string(), "19.8".to_string())]
    );
    assert!(namespace
        .queries()
        .iter()
        .all(|path| !path.starts_with("/settings/")));
    assert_eq!(stats.published, 1);
    assert_eq!(stats.ignored, 1);
}

#[tokio::test]
async fn ignored_subtree_issues_no_queries() {
    let namespace = ScriptedNamespace::new(&[
        ("/", "a/,b/"),
        ("/a/", "x,y"),
        ("/a/x", "1"),
        ("/a/y", "2"),
        ("/b/", "z"),
        ("/b/z", "3"),
    ]);
    let sink = RecordingSink::default();

    scanner(&namespace, &sink, &["/a/"]).scan("/").await.unwrap();

    let queries = namespace.queries();
    assert!(queries.iter().all(|path| !path.starts_with("/a/")));
    assert_eq!(queries, vec!["/", "/b/", "/b/z"]);
}

#[tokio::test]
async fn overlapping_ignore_prefixes_prune_once() {
    let namespace = ScriptedNamespace::new(&[
        ("/", "a/,c"),
        ("/a/", "b/"),
        ("/a/b/", "c"),
        ("/a/b/c", "nope"),
        ("/c", "7"),
    ]);
    let sink = RecordingSink::default();

    let stats = scanner(&namespace, &sink, &["/a/", "/a/b/"])
        .scan("/")
        .await
        .unwrap();

    assert!(namespace
        .queries()
        .iter()
        .all(|path| !path.starts_with("/a/")));
    assert_eq!(sink.accepted(), vec![("/1wire/c".to_string(), "7".to_string())]);
    assert_eq!(stats.ignored, 1);
}

#[tokio::test]
async fn consecutive_scans_publish_identical_preorder_sequence() {
    let namespace = ScriptedNamespace::new(&[
        ("/", "10.B7/,28.AA/"),
        ("/10.B7/", "humidity,temperature"),
        ("/10.B7/humidity", "41"),
        ("/10.B7/temperature", "22.1"),
        ("/28.AA/", "temperature"),
        ("/28.AA/temperature", "19.8"),
    ]);
    let sink = RecordingSink::default();
    let scanner = scanner(&namespace, &sink, &[]);

    scanner.scan("/").await.unwrap();
    let first = sink.accepted();
    scanner.scan("/").await.unwrap();
    let second = sink.accepted();

    let expected = vec![
        ("/1wire/10.B7/humidity".to_string(), "41".to_string()),
        ("/1wire/10.B7/temperature".to_string(), "22.1".to_string()),
        ("/1wire/28.AA/temperature".to_string(), "19.8".to_string()),
    ];
    assert_eq!(first, expected);
    assert_eq!(second[expected.len()..], expected[..]);
}

#[tokio::test]
async fn every_topic_starts_with_prefix_and_container_path() {
    let namespace = ScriptedNamespace::new(&[
        ("/", "28.AA/"),
        ("/28.AA/", "temperature,power"),
        ("/28.AA/temperature", "19.8"),
        ("/28.AA/power", "1"),
    ]);
    let sink = RecordingSink::default();

    scanner(&namespace, &sink, &[]).scan("/").await.unwrap();

    for (topic, _) in sink.accepted() {
        assert!(topic.starts_with("/1wire/28.AA/"), "topic {}", topic);
    }
}

#[tokio::test]
async fn leading_whitespace_is_trimmed_trailing_kept() {
    let namespace = ScriptedNamespace::new(&[("/", "28.AA/"), ("/28.AA/", "temperature"), ("/28.AA/temperature", "  21.4\n")]);
    let sink = RecordingSink::default();

    scanner(&namespace, &sink, &[]).scan("/").await.unwrap();

    assert_eq!(
        sink.accepted(),
        vec![("/1wire/28.AA/temperature".to_string(), "21.4\n".to_string())]
    );
}

#[tokio::test]
async fn publish_failure_abandons_rest_of_scan() {
    let namespace = ScriptedNamespace::new(&[
        ("/", "28.AA/,28.BB/"),
        ("/28.AA/", "temperature"),
        ("/28.AA/temperature", "19.8"),
        ("/28.BB/", "temperature"),
        ("/28.BB/temperature", "20.2"),
    ]);
    let sink = RecordingSink::failing_from(2);

    let result = scanner(&namespace, &sink, &[]).scan("/").await;

    assert!(result.is_err());
    assert_eq!(
        sink.accepted(),
        vec![("/1wire/28.AA/temperature".to_string(), "19.8".to_string())]
    );
    // The second device's leaf was reached, the failure unwound the walk
    // before anything further was queried.
    assert_eq!(namespace.queries().last().unwrap(), "/28.BB/temperature");
}

#[tokio::test]
async fn read_failure_abandons_branch_only() {
    let namespace = ScriptedNamespace::new(&[
        ("/", "x/,y/"),
        // "/x/" is missing: its query fails
        ("/y/", "value"),
        ("/y/value", "1"),
    ]);
    let sink = RecordingSink::default();

    let stats = scanner(&namespace, &sink, &[]).scan("/").await.unwrap();

    assert_eq!(stats.failed, 1);
    assert_eq!(
        sink.accepted(),
        vec![("/1wire/y/value".to_string(), "1".to_string())]
    );
}

#[tokio::test]
async fn malformed_enumeration_skips_empty_tokens() {
    let namespace = ScriptedNamespace::new(&[
        ("/", "a,,b,"),
        ("/a", "1"),
        ("/b", "2"),
    ]);
    let sink = RecordingSink::default();

    scanner(&namespace, &sink, &[]).scan("/").await.unwrap();

    assert_eq!(namespace.queries(), vec!["/", "/a", "/b"]);
    assert_eq!(
        sink.accepted(),
        vec![
            ("/1wire/a".to_string(), "1".to_string()),
            ("/1wire/b".to_string(), "2".to_string()),
        ]
    );
}
