//! End-to-end conversation scenarios against the store.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use contextrank_core::{
    Classifier, ClassifierError, Detection, DomainTag, Message, MessageId, MessagePatch,
    PriorityTier, ProjectId, ScriptedClassifier, Signals, StoreEvent,
};
use contextrank_engine::assigner::DEMOTED_INSTRUCTION_REASON;
use contextrank_engine::{ContextWindowBuilder, ConversationStore, StoreOptions, WindowBudget};
use tokio::sync::broadcast::error::TryRecvError;

// ── Helpers ───────────────────────────────────────────────────────────

fn project() -> ProjectId {
    ProjectId::from("project-1")
}

fn base() -> DateTime<Utc> {
    Utc::now() - Duration::hours(1)
}

fn id(s: &str) -> MessageId {
    MessageId::from(s)
}

fn tag(domain: &str, features: &[&str]) -> DomainTag {
    DomainTag::new(domain).with_features(features.iter().copied())
}

fn tier(store: &ConversationStore, message: &str) -> PriorityTier {
    store.get_priority_context(&id(message)).unwrap().tier
}

/// At most one message is flagged current, and it is the one the pointer names.
fn assert_single_current(store: &ConversationStore, project_id: &ProjectId) {
    let snapshot = store.snapshot(project_id).unwrap();
    let flagged: Vec<&Arc<Message>> = snapshot
        .messages()
        .iter()
        .filter(|m| m.is_current_instruction())
        .collect();
    match snapshot.current_instruction_id() {
        Some(current) => {
            assert_eq!(flagged.len(), 1, "exactly one message must be current");
            assert_eq!(&flagged[0].id, current);
            let ctx = flagged[0].priority.as_ref().unwrap();
            assert_eq!(ctx.tier, PriorityTier::Critical);
        }
        None => assert!(flagged.is_empty(), "no pointer but a flagged message"),
    }
}

/// The cached ordering is a permutation of the live ids sorted by tier then time.
fn assert_ordering_consistent(store: &ConversationStore, project_id: &ProjectId) {
    let snapshot = store.snapshot(project_id).unwrap();
    let live: HashSet<&MessageId> = snapshot
        .messages()
        .iter()
        .map(|m| &m.id)
        .filter(|id| !snapshot.is_excluded(id))
        .collect();
    let ordered: HashSet<&MessageId> = snapshot.priority_ordering().iter().collect();
    assert_eq!(live, ordered);
    assert_eq!(snapshot.priority_ordering().len(), live.len());

    let view = snapshot.ordered_messages();
    for pair in view.windows(2) {
        let key = |m: &Message| (m.priority.as_ref().unwrap().tier, m.created_at);
        assert!(key(&pair[0]) <= key(&pair[1]), "ordering is not sorted");
    }
}

/// A classifier that is always down.
struct OfflineClassifier;

impl Classifier for OfflineClassifier {
    fn name(&self) -> &str {
        "offline"
    }

    fn detect_domain(&self, _message: &Message) -> Result<Detection, ClassifierError> {
        Err(ClassifierError::Unavailable("connection refused".into()))
    }

    fn relevance(&self, _a: &Message, _b: &Message) -> Result<f32, ClassifierError> {
        Err(ClassifierError::Timeout { elapsed_ms: 250 })
    }

    fn should_exclude(
        &self,
        _message: &Message,
        _current_instruction: Option<&MessageId>,
    ) -> Result<bool, ClassifierError> {
        Err(ClassifierError::Unavailable("connection refused".into()))
    }

    fn is_error_resolved(
        &self,
        _message: &Message,
        _history: &[Arc<Message>],
    ) -> Result<bool, ClassifierError> {
        Err(ClassifierError::Unavailable("connection refused".into()))
    }

    fn detects_closure(
        &self,
        _message: &Message,
        _prior: &[Arc<Message>],
    ) -> Result<bool, ClassifierError> {
        Err(ClassifierError::Unavailable("connection refused".into()))
    }
}

// ── Scenarios ─────────────────────────────────────────────────────────

#[test]
fn login_then_dashboard() {
    let classifier = Arc::new(ScriptedClassifier::new());
    classifier.script("ask", Signals::tagged(tag("auth", &["login"])));
    classifier.script("reply", Signals::tagged(tag("auth", &["login"])));
    classifier.script("next", Signals::tagged(tag("ui", &["dashboard"])).closing());
    classifier.relate("reply", "ask", 0.9);
    let store = ConversationStore::new(classifier);
    let t0 = base();

    let ask = store
        .append(&project(), Message::user("Build a login page").with_id("ask").at(t0))
        .unwrap();
    assert_eq!(ask.tier, PriorityTier::Critical);
    assert!(ask.is_current_instruction);

    let reply = store
        .append(
            &project(),
            Message::assistant("Done, login page created")
                .with_id("reply")
                .at(t0 + Duration::seconds(1)),
        )
        .unwrap();
    assert_eq!(reply.tier, PriorityTier::High);

    let next_at = t0 + Duration::seconds(2);
    let next = store
        .append(
            &project(),
            Message::user("Now let's work on the dashboard")
                .with_id("next")
                .at(next_at),
        )
        .unwrap();
    assert_eq!(next.tier, PriorityTier::Critical);
    assert!(next.is_current_instruction);
    assert!(next.starts_new_topic);
    assert!(next.related_message_ids.contains(&id("ask")));
    assert!(next.related_message_ids.contains(&id("reply")));

    for resolved in ["ask", "reply"] {
        let message = store.get_message(&id(resolved)).unwrap();
        assert!(message.is_resolved(), "{resolved} should be resolved");
        assert_eq!(message.resolved_at, Some(next_at));
    }

    let demoted = store.get_priority_context(&id("ask")).unwrap();
    assert_eq!(demoted.tier, PriorityTier::High);
    assert!(!demoted.is_current_instruction);
    assert_eq!(demoted.reason, DEMOTED_INSTRUCTION_REASON);

    assert_single_current(&store, &project());
    assert_ordering_consistent(&store, &project());
    assert_eq!(store.stats().resolutions, 2);
    assert_eq!(store.groups(&project()).len(), 2);
}

#[test]
fn clear_reseeds_a_single_notice() {
    let store = ConversationStore::new(Arc::new(ScriptedClassifier::new()));
    let t0 = base();
    for i in 0..50 {
        let message = if i % 2 == 0 {
            Message::user(format!("request {i}"))
        } else {
            Message::assistant(format!("answer {i}"))
        };
        store.append(
            &project(),
            message.with_id(format!("m{i}")).at(t0 + Duration::seconds(i)),
        );
    }
    assert_eq!(store.messages(&project()).len(), 50);

    let notice = store.clear(&project());

    let messages = store.messages(&project());
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, notice);
    assert_eq!(messages[0].content, "Conversation history cleared.");
    assert_eq!(tier(&store, notice.as_str()), PriorityTier::Medium);
    assert_eq!(store.priority_ordering(&project()), vec![notice.clone()]);
    assert_eq!(store.groups(&project()).len(), 1);
    assert!(store.current_instruction(&project()).is_none());
    assert!(store.get_priority_context(&id("m0")).is_none());
    assert_single_current(&store, &project());
}

#[test]
fn single_current_instruction_under_mixed_operations() {
    let store = ConversationStore::new(Arc::new(ScriptedClassifier::new()));
    let t0 = base();

    for i in 0..12 {
        let at = t0 + Duration::seconds(i);
        let message = match i % 3 {
            0 => Message::user(format!("instruction {i}")),
            1 => Message::assistant(format!("working on {i}")),
            _ => Message::system(format!("status {i}")),
        };
        store.append(&project(), message.with_id(format!("m{i}")).at(at));
        assert_single_current(&store, &project());

        if i % 4 == 3 {
            store.mark_current_instruction(&id(&format!("m{}", i - 2)));
            assert_single_current(&store, &project());
        }
    }

    store.reassign_priority(&id("m10"), PriorityTier::Low, "manual", false);
    assert_single_current(&store, &project());
    assert_ordering_consistent(&store, &project());
}

#[test]
fn promotion_demotes_the_previous_holder_to_high() {
    let store = ConversationStore::new(Arc::new(ScriptedClassifier::new()));
    let t0 = base();
    store.append(&project(), Message::user("first").with_id("m1").at(t0));
    store.append(
        &project(),
        Message::system("status").with_id("s").at(t0 + Duration::seconds(1)),
    );

    assert!(store.mark_current_instruction(&id("s")));

    let m1 = store.get_priority_context(&id("m1")).unwrap();
    assert_eq!(m1.tier, PriorityTier::High);
    assert!(!m1.is_current_instruction);
    let s = store.get_priority_context(&id("s")).unwrap();
    assert_eq!(s.tier, PriorityTier::Critical);
    assert!(s.is_current_instruction);
    assert_eq!(
        store.current_instruction(&project()).map(|m| m.id.clone()),
        Some(id("s"))
    );
}

#[test]
fn ordering_tracks_timestamp_edits() {
    let store = ConversationStore::new(Arc::new(ScriptedClassifier::new()));
    let t0 = base();
    for (i, name) in ["a", "b", "c"].iter().enumerate() {
        store.append(
            &project(),
            Message::system(format!("status {name}"))
                .with_id(*name)
                .at(t0 + Duration::seconds(i as i64)),
        );
    }
    assert_ordering_consistent(&store, &project());

    // The backend acknowledges "a" with a later authoritative timestamp.
    assert!(store.update(
        &id("a"),
        MessagePatch::Persisted {
            created_at: t0 + Duration::seconds(10)
        }
    ));

    let chronological: Vec<MessageId> =
        store.messages(&project()).iter().map(|m| m.id.clone()).collect();
    assert_eq!(chronological, vec![id("b"), id("c"), id("a")]);
    assert!(store.get_message(&id("a")).unwrap().persisted);
    assert_ordering_consistent(&store, &project());
}

#[test]
fn resolution_never_reverts() {
    let classifier = Arc::new(ScriptedClassifier::new());
    classifier.script("err", Signals::tagged(tag("build", &[])));
    classifier.script("fix", Signals::tagged(tag("build", &[])).closing());
    let store = ConversationStore::new(classifier);
    let t0 = base();

    store.append(
        &project(),
        Message::system("Build failed: missing import").with_id("err").at(t0),
    );
    store.append(
        &project(),
        Message::user("fixed the import, rebuild")
            .with_id("fix")
            .at(t0 + Duration::seconds(1)),
    );
    let resolved_at = store.get_message(&id("err")).unwrap().resolved_at;
    assert!(resolved_at.is_some());

    // A later resolution attempt keeps the first timestamp.
    store.update(&id("err"), MessagePatch::MarkResolved { at: Utc::now() });
    assert_eq!(store.get_message(&id("err")).unwrap().resolved_at, resolved_at);

    // Recomputing every tier keeps the flag.
    store.bulk_reassign(&project(), None);
    assert!(store.get_message(&id("err")).unwrap().is_resolved());

    // So does a reload with a stale remote copy.
    let stale = Message::system("Build failed: missing import")
        .with_id("err")
        .at(t0);
    store.hydrate(&project(), vec![stale]);
    let err = store.get_message(&id("err")).unwrap();
    assert!(err.is_resolved());
    assert_eq!(err.resolved_at, resolved_at);
}

#[test]
fn closure_leaves_disjoint_topics_alone() {
    let classifier = Arc::new(ScriptedClassifier::new());
    classifier.script("ask", Signals::tagged(tag("ui", &["dashboard"])));
    classifier.script("login-note", Signals::tagged(tag("auth", &["login"])));
    classifier.script("billing-note", Signals::tagged(tag("billing", &[])));
    classifier.script("charts", Signals::tagged(tag("ui", &["charts"])).closing());
    let store = ConversationStore::new(classifier);
    let t0 = base();

    store.append(&project(), Message::user("Build the dashboard").with_id("ask").at(t0));
    store.append(
        &project(),
        Message::system("Session token refreshed")
            .with_id("login-note")
            .at(t0 + Duration::seconds(1)),
    );
    store.append(
        &project(),
        Message::system("Invoice sync ran")
            .with_id("billing-note")
            .at(t0 + Duration::seconds(2)),
    );
    store.append(
        &project(),
        Message::user("Dashboard is fine, add charts next")
            .with_id("charts")
            .at(t0 + Duration::seconds(3)),
    );

    assert!(store.get_message(&id("ask")).unwrap().is_resolved());
    assert!(!store.get_message(&id("login-note")).unwrap().is_resolved());
    assert!(!store.get_message(&id("billing-note")).unwrap().is_resolved());
}

#[test]
fn reassign_priority_is_idempotent() {
    let store = ConversationStore::new(Arc::new(ScriptedClassifier::new()));
    store.append(&project(), Message::system("status").with_id("s"));
    let mut events = store.subscribe();

    assert!(store.reassign_priority(&id("s"), PriorityTier::BackgroundContext, "manual", false));
    let first = store.get_priority_context(&id("s")).unwrap();
    let first_view = store.priority_ordering(&project());

    assert!(store.reassign_priority(&id("s"), PriorityTier::BackgroundContext, "manual", false));
    let second = store.get_priority_context(&id("s")).unwrap();

    assert_eq!(first, second);
    assert_eq!(first_view, store.priority_ordering(&project()));
    assert_eq!(store.stats().reassignments, 1);

    assert!(matches!(
        events.try_recv().unwrap().as_ref(),
        StoreEvent::PriorityReassigned { .. }
    ));
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[test]
fn offline_classifier_degrades_to_low() {
    let store = ConversationStore::new(Arc::new(OfflineClassifier));
    let t0 = base();

    let ask = store
        .append(&project(), Message::user("Build a login page").with_id("ask").at(t0))
        .unwrap();
    assert_eq!(ask.tier, PriorityTier::Critical);

    let status = store
        .append(
            &project(),
            Message::system("Compiling").with_id("status").at(t0 + Duration::seconds(1)),
        )
        .unwrap();
    assert_eq!(status.tier, PriorityTier::Low);
    assert!(status.reason.starts_with("classifier unavailable"));

    assert_eq!(store.messages(&project()).len(), 2);
    assert!(store.stats().classifier_failures >= 3);
    assert_ordering_consistent(&store, &project());
}

#[test]
fn bulk_reassign_moves_the_pointer_and_drops_excluded() {
    let classifier = Arc::new(ScriptedClassifier::new());
    classifier.script("retry", Signals::default().excluded());
    let store = ConversationStore::new(classifier.clone());
    let t0 = base();
    store.append(&project(), Message::user("first ask").with_id("a").at(t0));
    store.append(
        &project(),
        Message::system("Retrying in 5s").with_id("retry").at(t0 + Duration::seconds(1)),
    );
    store.append(
        &project(),
        Message::user("second ask").with_id("b").at(t0 + Duration::seconds(2)),
    );
    let mut events = store.subscribe();

    let live = store.bulk_reassign(&project(), Some(&id("a")));

    assert_eq!(live, 2);
    assert_eq!(store.messages(&project()).len(), 3);
    assert!(!store.priority_ordering(&project()).contains(&id("retry")));
    assert_eq!(tier(&store, "a"), PriorityTier::Critical);
    assert_eq!(
        store.current_instruction(&project()).map(|m| m.id.clone()),
        Some(id("a"))
    );
    assert_single_current(&store, &project());
    assert_ordering_consistent(&store, &project());

    let mut saw_pointer_move = false;
    let mut saw_recompute = false;
    while let Ok(event) = events.try_recv() {
        match event.as_ref() {
            StoreEvent::CurrentInstructionChanged { current, .. } => {
                saw_pointer_move = current.as_ref() == Some(&id("a"));
            }
            StoreEvent::PrioritiesRecomputed { live, excluded, .. } => {
                saw_recompute = *live == 2 && *excluded == 1;
            }
            _ => {}
        }
    }
    assert!(saw_pointer_move);
    assert!(saw_recompute);

    // Unknown target: counted, pointer unchanged.
    store.bulk_reassign(&project(), Some(&id("ghost")));
    assert_eq!(store.stats().unknown_ids, 1);
    assert_eq!(
        store.current_instruction(&project()).map(|m| m.id.clone()),
        Some(id("a"))
    );
}

#[test]
fn hydrate_merges_remote_and_unsent_local() {
    let store = ConversationStore::new(Arc::new(ScriptedClassifier::new()));
    let t0 = base();

    store.append(&project(), Message::system("saved").with_id("a").at(t0));
    store.update(&id("a"), MessagePatch::Persisted { created_at: t0 });
    store.append(
        &project(),
        Message::system("deleted elsewhere")
            .with_id("c")
            .at(t0 + Duration::seconds(1)),
    );
    store.update(
        &id("c"),
        MessagePatch::Persisted {
            created_at: t0 + Duration::seconds(1),
        },
    );
    store.append(
        &project(),
        Message::user("unsent ask").with_id("b").at(t0 + Duration::seconds(3)),
    );

    let remote = vec![
        Message::system("saved (edited)").with_id("a").at(t0),
        Message::assistant("from another tab")
            .with_id("d")
            .at(t0 + Duration::seconds(2)),
    ];
    let report = store.hydrate(&project(), remote);

    assert_eq!(report.remote, 2);
    assert_eq!(report.kept_local, 1);
    assert_eq!(report.dropped_local, 1);
    assert_eq!(report.ranked, 1);

    let ids: Vec<MessageId> = store.messages(&project()).iter().map(|m| m.id.clone()).collect();
    assert_eq!(ids, vec![id("a"), id("d"), id("b")]);
    assert_eq!(store.get_message(&id("a")).unwrap().content, "saved (edited)");
    assert!(store.get_message(&id("d")).unwrap().persisted);
    assert!(store.get_message(&id("c")).is_none());
    assert_eq!(
        store.current_instruction(&project()).map(|m| m.id.clone()),
        Some(id("b"))
    );
    assert_single_current(&store, &project());
    assert_ordering_consistent(&store, &project());
}

#[test]
fn hydrate_prefers_the_newest_flagged_instruction() {
    let store = ConversationStore::new(Arc::new(ScriptedClassifier::new()));
    let t0 = base();
    store.append(&project(), Message::user("local ask").with_id("local").at(t0));
    store.update(&id("local"), MessagePatch::Persisted { created_at: t0 });

    let mut remote_ask = Message::user("remote ask")
        .with_id("remote")
        .at(t0 + Duration::seconds(5));
    remote_ask.priority = Some(contextrank_core::PriorityContext::current_instruction(
        "current user instruction",
    ));
    let local_copy = store.get_message(&id("local")).unwrap().as_ref().clone();

    store.hydrate(&project(), vec![local_copy, remote_ask]);

    assert_eq!(
        store.current_instruction(&project()).map(|m| m.id.clone()),
        Some(id("remote"))
    );
    assert_eq!(tier(&store, "local"), PriorityTier::High);
    assert_single_current(&store, &project());
}

#[tokio::test]
async fn streaming_takes_the_light_path() {
    let store = ConversationStore::new(Arc::new(ScriptedClassifier::new()));
    store.append(&project(), Message::assistant("Creating").with_id("r"));
    let mut events = store.subscribe();

    for chunk in [" the", " login", " page"] {
        assert!(store.stream_chunk(&id("r"), chunk));
    }
    assert_eq!(store.get_message(&id("r")).unwrap().content, "Creating the login page");
    assert_eq!(store.stats().streamed_chunks, 3);
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

    store.update(
        &id("r"),
        MessagePatch::ReplaceContent {
            content: "Done, created src/pages/Login.tsx".into(),
        },
    );
    let event = events.recv().await.unwrap();
    assert!(matches!(
        event.as_ref(),
        StoreEvent::MessageUpdated { message_id, .. } if message_id == &id("r")
    ));
    let ctx = store.get_priority_context(&id("r")).unwrap();
    assert!(ctx.file_references.contains("src/pages/Login.tsx"));
}

#[tokio::test]
async fn appends_publish_events() {
    let store = ConversationStore::new(Arc::new(ScriptedClassifier::new()));
    let mut events = store.subscribe();

    store.append(&project(), Message::user("Build a login page").with_id("ask"));

    let appended = events.recv().await.unwrap();
    match appended.as_ref() {
        StoreEvent::MessageAppended { message_id, tier, .. } => {
            assert_eq!(message_id, &id("ask"));
            assert_eq!(*tier, PriorityTier::Critical);
        }
        other => panic!("expected MessageAppended, got {other:?}"),
    }
    let changed = events.recv().await.unwrap();
    match changed.as_ref() {
        StoreEvent::CurrentInstructionChanged { previous, current, .. } => {
            assert!(previous.is_none());
            assert_eq!(current.as_ref(), Some(&id("ask")));
        }
        other => panic!("expected CurrentInstructionChanged, got {other:?}"),
    }
    assert_eq!(changed.project_id(), &project());
}

#[test]
fn concurrent_writers_keep_one_current_instruction() {
    let store = ConversationStore::new(Arc::new(ScriptedClassifier::new()));
    let p = project();

    std::thread::scope(|scope| {
        for worker in 0..4 {
            let store = &store;
            let p = &p;
            scope.spawn(move || {
                for i in 0..25 {
                    let name = format!("w{worker}-{i}");
                    store.append(p, Message::user(format!("ask {name}")).with_id(name.clone()));
                    if i % 5 == 0 {
                        store.mark_current_instruction(&MessageId(name));
                    }
                }
            });
        }
    });

    assert_eq!(store.messages(&p).len(), 100);
    assert_single_current(&store, &p);
    assert_ordering_consistent(&store, &p);
}

#[test]
fn window_fits_the_ordered_view() {
    let store = ConversationStore::new(Arc::new(ScriptedClassifier::new()));
    let t0 = base();
    store.append(&project(), Message::user("Build a login page").with_id("ask").at(t0));
    for i in 0..20 {
        store.append(
            &project(),
            Message::system(format!("progress update number {i}"))
                .with_id(format!("s{i}"))
                .at(t0 + Duration::seconds(i + 1)),
        );
    }

    let builder = ContextWindowBuilder::new(WindowBudget {
        token_budget: 40,
        include_background: false,
        drop_resolved_low: true,
    });
    let window = builder.build(&store, &project());

    assert!(window.stats.tokens <= 40);
    assert!(window.stats.dropped > 0);
    assert!(window.messages.iter().any(|m| m.id == id("ask")));
    let times: Vec<_> = window.messages.iter().map(|m| m.created_at).collect();
    let mut sorted = times.clone();
    sorted.sort();
    assert_eq!(times, sorted);
}

#[test]
fn recompute_demotes_the_displaced_instruction() {
    let store = ConversationStore::new(Arc::new(ScriptedClassifier::new()));
    let t0 = base();
    store.append(&project(), Message::user("Build a login page").with_id("m1").at(t0));
    for n in 0..6 {
        store.append(
            &project(),
            Message::system(format!("step {n}"))
                .with_id(format!("s{n}"))
                .at(t0 + Duration::seconds(n + 1)),
        );
    }

    store.bulk_reassign(&project(), Some(&id("s5")));

    let m1 = store.get_priority_context(&id("m1")).unwrap();
    assert_eq!(m1.tier, PriorityTier::High);
    assert_eq!(m1.reason, DEMOTED_INSTRUCTION_REASON);
    assert!(!m1.is_current_instruction);
    assert_eq!(tier(&store, "s5"), PriorityTier::Critical);
    assert_single_current(&store, &project());
    assert_ordering_consistent(&store, &project());
}

#[test]
fn closing_notice_does_not_resolve_the_live_instruction() {
    let classifier = Arc::new(ScriptedClassifier::new());
    classifier.script("ask", Signals::tagged(tag("auth", &["login"])));
    classifier.script("reply", Signals::tagged(tag("ui", &["misc"])).closing());
    let store = ConversationStore::new(classifier);
    let t0 = base();

    store.append(&project(), Message::user("Build a login page").with_id("ask").at(t0));
    store.append(
        &project(),
        Message::assistant("Switching over to the sidebar")
            .with_id("reply")
            .at(t0 + Duration::seconds(1)),
    );

    let ask = store.get_message(&id("ask")).unwrap();
    assert!(ask.is_current_instruction());
    assert!(!ask.is_resolved());
    assert_eq!(tier(&store, "ask"), PriorityTier::Critical);
    assert_single_current(&store, &project());
}

#[test]
fn unpromoted_closing_message_keeps_the_marked_instruction() {
    let classifier = Arc::new(ScriptedClassifier::new());
    classifier.script("ask", Signals::tagged(tag("auth", &["login"])));
    classifier.script("aside", Signals::tagged(tag("ui", &["misc"])).closing());
    let options = StoreOptions {
        promote_user_messages: false,
        ..StoreOptions::default()
    };
    let store = ConversationStore::with_options(classifier, options);
    let t0 = base();

    store.append(&project(), Message::user("Build a login page").with_id("ask").at(t0));
    assert!(store.mark_current_instruction(&id("ask")));
    store.append(
        &project(),
        Message::user("Unrelated: what font is the sidebar using?")
            .with_id("aside")
            .at(t0 + Duration::seconds(1)),
    );

    let ask = store.get_message(&id("ask")).unwrap();
    assert!(ask.is_current_instruction());
    assert!(!ask.is_resolved());
}

#[test]
fn classifier_resolution_reaches_pretagged_errors() {
    let classifier = Arc::new(ScriptedClassifier::new());
    classifier.script(
        "err",
        Signals {
            tag: Some(tag("ci", &[])),
            resolved: true,
            ..Signals::default()
        },
    );
    let store = ConversationStore::new(classifier);

    let ctx = store
        .append(
            &project(),
            Message::system("Build failed: missing import")
                .with_id("err")
                .with_domain(tag("build", &[])),
        )
        .unwrap();

    assert_eq!(ctx.tier, PriorityTier::Low);
    assert_eq!(ctx.reason, "resolved error");
    let err = store.get_message(&id("err")).unwrap();
    assert!(err.is_resolved());
    assert_eq!(err.domain_tag.as_ref().unwrap().domain, "build");
}

#[test]
fn recompute_picks_up_new_relevance() {
    let classifier = Arc::new(ScriptedClassifier::new());
    let store = ConversationStore::new(classifier.clone());
    let t0 = base();
    store.append(&project(), Message::user("Ship the preview").with_id("ask").at(t0));
    store.append(
        &project(),
        Message::system("Deploy preview ready")
            .with_id("s")
            .at(t0 + Duration::seconds(1)),
    );
    assert_eq!(tier(&store, "s"), PriorityTier::Medium);

    classifier.relate("s", "ask", 0.9);
    store.bulk_reassign(&project(), None);

    assert_eq!(tier(&store, "s"), PriorityTier::High);
    assert_eq!(tier(&store, "ask"), PriorityTier::Critical);
}
