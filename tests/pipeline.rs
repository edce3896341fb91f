//! End-to-end runs of the pipeline against in-memory collaborators.

use std::cell::Cell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::time::{Duration, Instant};

use mailsift::{
    CategoryRouter, ClassificationResult, Classifier, ClassifyError, Clock, FailurePolicy,
    MailStore, Message, MessageId, Pipeline, PipelineError, RateLimiter, RunOptions, StoreError,
};

/// Virtual time shared between the limiter and the classifier fake.
#[derive(Clone)]
struct TestClock {
    origin: Instant,
    offset: Rc<Cell<Duration>>,
}

impl TestClock {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Rc::new(Cell::new(Duration::ZERO)),
        }
    }

    fn advance(&self, d: Duration) {
        self.offset.set(self.offset.get() + d);
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.origin + self.offset.get()
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}

#[derive(Default)]
struct FakeStore {
    inbox: Vec<Message>,
    fetch_calls: Vec<Vec<MessageId>>,
    moves: Vec<(MessageId, String)>,
    fail_fetch_on_call: Option<usize>,
    fail_move_for: HashSet<MessageId>,
    vanished: HashSet<MessageId>,
}

impl FakeStore {
    fn with_messages(n: u32) -> Self {
        Self {
            inbox: (1..=n).map(message).collect(),
            ..Self::default()
        }
    }
}

fn message(i: u32) -> Message {
    Message {
        id: MessageId(i),
        subject: format!("message {i}"),
        senders: vec![format!("sender{i}@example.com"), "cc@example.com".to_string()],
        body: format!("body {i}"),
    }
}

impl MailStore for FakeStore {
    fn list_pending(&mut self, folder: &str) -> Result<Vec<MessageId>, StoreError> {
        assert_eq!(folder, "INBOX");
        Ok(self.inbox.iter().map(|m| m.id).collect())
    }

    fn fetch_batch(&mut self, ids: &[MessageId]) -> Result<Vec<Message>, StoreError> {
        self.fetch_calls.push(ids.to_vec());
        if self.fail_fetch_on_call == Some(self.fetch_calls.len()) {
            return Err(StoreError::Fetch("connection reset".to_string()));
        }
        // reverse order: callers must not rely on it
        Ok(self
            .inbox
            .iter()
            .rev()
            .filter(|m| ids.contains(&m.id) && !self.vanished.contains(&m.id))
            .cloned()
            .collect())
    }

    fn move_message(&mut self, id: MessageId, folder: &str) -> Result<(), StoreError> {
        if self.fail_move_for.contains(&id) {
            return Err(StoreError::Move {
                id,
                folder: folder.to_string(),
                reason: "NO [TRYCREATE] no such mailbox".to_string(),
            });
        }
        self.moves.push((id, folder.to_string()));
        Ok(())
    }

    fn list_folders(&mut self) -> Result<Vec<String>, StoreError> {
        Ok(vec!["INBOX".to_string(), "INBOX.Spam".to_string()])
    }
}

/// Answers by subject; records the virtual time of each call.
struct FakeClassifier {
    clock: TestClock,
    labels: HashMap<String, Result<String, String>>,
    queue: VecDeque<Result<String, String>>,
    calls: Vec<(String, String, Instant)>,
    work: Duration,
}

impl FakeClassifier {
    fn new(clock: TestClock) -> Self {
        Self {
            clock,
            labels: HashMap::new(),
            queue: VecDeque::new(),
            calls: vec![],
            work: Duration::from_millis(500),
        }
    }

    fn answering(clock: TestClock, answers: Vec<Result<&str, &str>>) -> Self {
        let mut c = Self::new(clock);
        c.queue = answers
            .into_iter()
            .map(|a| a.map(str::to_string).map_err(str::to_string))
            .collect();
        c
    }
}

impl Classifier for FakeClassifier {
    fn classify(
        &mut self,
        subject: &str,
        senders: &str,
        _body: &str,
    ) -> Result<ClassificationResult, ClassifyError> {
        self.calls.push((subject.to_string(), senders.to_string(), self.clock.now()));
        self.clock.advance(self.work);

        let answer = self
            .labels
            .get(subject)
            .cloned()
            .or_else(|| self.queue.pop_front())
            .unwrap_or_else(|| Ok("INBOX".to_string()));

        match answer {
            Ok(label) => Ok(ClassificationResult::new(label)),
            Err(status) => Err(ClassifyError::Status {
                status: 503,
                body: status,
            }),
        }
    }
}

fn pipeline(
    classifier: FakeClassifier,
    clock: TestClock,
    options: RunOptions,
) -> Pipeline<FakeClassifier, TestClock> {
    Pipeline::new(
        classifier,
        CategoryRouter::new("INBOX", ["INBOX", "INBOX.Spam"]),
        RateLimiter::with_clock(Duration::from_secs(3), clock),
        options,
    )
}

fn batch_of(n: usize) -> RunOptions {
    RunOptions {
        batch_size: n,
        ..RunOptions::default()
    }
}

#[test]
fn test_empty_mailbox_short_circuits() {
    let clock = TestClock::new();
    let mut store = FakeStore::default();
    let mut p = pipeline(FakeClassifier::new(clock.clone()), clock, RunOptions::default());

    let stats = p.run(&mut store).unwrap();

    assert_eq!(stats.considered, 0);
    assert_eq!(stats.batches, 0);
    assert!(store.fetch_calls.is_empty());
    assert!(store.moves.is_empty());
    assert!(p.classifier().calls.is_empty());
}

#[test]
fn test_every_identifier_visited_once_for_any_batch_size() {
    for batch_size in [1, 2, 3, 7, 10, 11, 50] {
        let clock = TestClock::new();
        let mut store = FakeStore::with_messages(10);
        let mut p = pipeline(FakeClassifier::new(clock.clone()), clock, batch_of(batch_size));

        let stats = p.run(&mut store).unwrap();

        assert_eq!(stats.considered, 10, "batch size {batch_size}");
        assert_eq!(stats.batches, 10usize.div_ceil(batch_size), "batch size {batch_size}");

        let fetched: Vec<MessageId> = store.fetch_calls.iter().flatten().copied().collect();
        assert_eq!(fetched, (1..=10).map(MessageId).collect::<Vec<_>>());
        assert!(store.fetch_calls.iter().all(|b| b.len() <= batch_size));

        let mut subjects: Vec<String> = p.classifier().calls.iter().map(|c| c.0.clone()).collect();
        subjects.sort();
        subjects.dedup();
        assert_eq!(subjects.len(), 10, "batch size {batch_size}");
    }
}

#[test]
fn test_moves_only_non_inbox_categories_once() {
    let clock = TestClock::new();
    let mut store = FakeStore::with_messages(4);
    let mut classifier = FakeClassifier::new(clock.clone());
    classifier.labels.insert("message 1".into(), Ok(" inbox.spam \n".into()));
    classifier.labels.insert("message 2".into(), Ok("INBOX".into()));
    classifier.labels.insert("message 3".into(), Ok("Newsletter".into()));
    classifier.labels.insert("message 4".into(), Ok("Spam".into()));
    let mut p = pipeline(classifier, clock, RunOptions::default());

    let stats = p.run(&mut store).unwrap();

    let mut moves = store.moves.clone();
    moves.sort();
    assert_eq!(
        moves,
        vec![
            (MessageId(1), "INBOX.Spam".to_string()),
            (MessageId(4), "INBOX.Spam".to_string()),
        ]
    );
    assert_eq!(stats.moved, 2);
    assert_eq!(stats.left, 2);
    assert_eq!(stats.failed, 0);
}

#[test]
fn test_senders_are_comma_joined() {
    let clock = TestClock::new();
    let mut store = FakeStore::with_messages(1);
    let mut p = pipeline(FakeClassifier::new(clock.clone()), clock, RunOptions::default());

    p.run(&mut store).unwrap();

    assert_eq!(p.classifier().calls[0].1, "sender1@example.com,cc@example.com");
}

#[test]
fn test_classification_calls_are_spaced() {
    let clock = TestClock::new();
    let mut store = FakeStore::with_messages(6);
    let mut p = pipeline(FakeClassifier::new(clock.clone()), clock.clone(), batch_of(4));

    let start = clock.now();
    p.run(&mut store).unwrap();

    let starts: Vec<Instant> = p.classifier().calls.iter().map(|c| c.2).collect();
    assert_eq!(starts.len(), 6);
    assert!(starts[0] - start >= Duration::from_secs(3));
    for pair in starts.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_secs(3));
    }
}

#[test]
fn test_classifier_error_aborts_after_first_message() {
    let clock = TestClock::new();
    let mut store = FakeStore::with_messages(3);
    // store returns the batch in reverse, so answers line up with 3, 2, 1
    let classifier = FakeClassifier::answering(
        clock.clone(),
        vec![Ok("INBOX.Spam"), Err("quota exceeded"), Ok("INBOX.Spam")],
    );
    let mut p = pipeline(classifier, clock, RunOptions::default());

    let err = p.run(&mut store).unwrap_err();

    match &err {
        PipelineError::Classify { id, source } => {
            assert_eq!(*id, MessageId(2));
            assert!(matches!(source, ClassifyError::Status { status: 503, .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.message_id(), Some(MessageId(2)));
    assert_eq!(store.moves, vec![(MessageId(3), "INBOX.Spam".to_string())]);
    assert_eq!(p.classifier().calls.len(), 2);
}

#[test]
fn test_skip_policy_continues_past_failures() {
    let clock = TestClock::new();
    let mut store = FakeStore::with_messages(3);
    store.fail_move_for.insert(MessageId(1));
    let classifier = FakeClassifier::answering(
        clock.clone(),
        vec![Err("bad gateway"), Ok("INBOX.Spam"), Ok("INBOX.Spam")],
    );
    let options = RunOptions {
        on_error: FailurePolicy::Skip,
        ..RunOptions::default()
    };
    let mut p = pipeline(classifier, clock, options);

    let stats = p.run(&mut store).unwrap();

    assert_eq!(stats.considered, 3);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.moved, 1);
    assert_eq!(store.moves, vec![(MessageId(2), "INBOX.Spam".to_string())]);
}

#[test]
fn test_move_error_aborts_run() {
    let clock = TestClock::new();
    let mut store = FakeStore::with_messages(3);
    store.fail_move_for.insert(MessageId(2));
    let classifier = FakeClassifier::answering(clock.clone(), vec![Ok("INBOX.Spam"); 3]);
    let mut p = pipeline(classifier, clock, RunOptions::default());

    let err = p.run(&mut store).unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Move { id: MessageId(2), ref folder, .. } if folder == "INBOX.Spam"
    ));
    assert_eq!(store.moves, vec![(MessageId(3), "INBOX.Spam".to_string())]);
    assert_eq!(p.classifier().calls.len(), 2);
}

#[test]
fn test_fetch_error_keeps_earlier_moves() {
    let clock = TestClock::new();
    let mut store = FakeStore::with_messages(4);
    store.fail_fetch_on_call = Some(2);
    let classifier = FakeClassifier::answering(clock.clone(), vec![Ok("INBOX.Spam"); 4]);
    let options = RunOptions {
        batch_size: 2,
        on_error: FailurePolicy::Skip,
        ..RunOptions::default()
    };
    let mut p = pipeline(classifier, clock, options);

    let err = p.run(&mut store).unwrap_err();

    assert!(matches!(err, PipelineError::Store(StoreError::Fetch(_))));
    assert_eq!(err.message_id(), None);
    assert_eq!(store.moves.len(), 2);
    assert_eq!(p.classifier().calls.len(), 2);
}

#[test]
fn test_vanished_messages_are_counted_not_classified() {
    let clock = TestClock::new();
    let mut store = FakeStore::with_messages(5);
    store.vanished.insert(MessageId(2));
    store.vanished.insert(MessageId(5));
    let mut p = pipeline(FakeClassifier::new(clock.clone()), clock, batch_of(3));

    let stats = p.run(&mut store).unwrap();

    assert_eq!(stats.considered, 3);
    assert_eq!(stats.missing, 2);
    assert_eq!(p.classifier().calls.len(), 3);
}

#[test]
fn test_inbox_category_never_triggers_move() {
    let clock = TestClock::new();
    let mut store = FakeStore::with_messages(3);
    let classifier = FakeClassifier::answering(clock.clone(), vec![Ok("INBOX"), Ok("inbox "), Ok("")]);
    let mut p = pipeline(classifier, clock, RunOptions::default());

    let stats = p.run(&mut store).unwrap();

    assert!(store.moves.is_empty());
    assert_eq!(stats.left, 3);
}

/// Store that hands back the same message twice in one fetch.
struct RepeatingStore(Vec<(MessageId, String)>);

impl MailStore for RepeatingStore {
    fn list_pending(&mut self, _folder: &str) -> Result<Vec<MessageId>, StoreError> {
        Ok(vec![MessageId(1)])
    }

    fn fetch_batch(&mut self, _ids: &[MessageId]) -> Result<Vec<Message>, StoreError> {
        Ok(vec![message(1), message(1), message(9)])
    }

    fn move_message(&mut self, id: MessageId, folder: &str) -> Result<(), StoreError> {
        self.0.push((id, folder.to_string()));
        Ok(())
    }

    fn list_folders(&mut self) -> Result<Vec<String>, StoreError> {
        Err(StoreError::List("LIST not permitted".to_string()))
    }
}

#[test]
fn test_repeated_or_foreign_fetch_results_are_ignored() {
    let clock = TestClock::new();
    let mut store = RepeatingStore(vec![]);
    let classifier = FakeClassifier::answering(clock.clone(), vec![Ok("INBOX.Spam"); 3]);
    let mut p = pipeline(classifier, clock, RunOptions::default());

    let stats = p.run(&mut store).unwrap();

    assert_eq!(stats.considered, 1);
    assert_eq!(store.0, vec![(MessageId(1), "INBOX.Spam".to_string())]);
}
