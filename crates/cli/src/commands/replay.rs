//! `contextrank replay` — run a transcript through the store and print the ranking.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use contextrank_config::AppConfig;
use contextrank_core::{
    Error, MessageId, PriorityTier, ProjectId, ScriptedClassifier, StoreEvent,
};
use contextrank_engine::{
    ContextWindow, ContextWindowBuilder, ConversationStore, ProjectConversation, StatsSnapshot,
    StoreOptions, WindowBudget, WindowStats,
};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::transcript::{self, Line, Record};

pub struct ReplayOptions {
    pub file: PathBuf,
    pub project: String,
    pub budget: Option<usize>,
    pub json: bool,
}

#[derive(Serialize)]
struct RankedEntry {
    id: String,
    tier: PriorityTier,
    reason: String,
    current: bool,
    resolved: bool,
    in_window: bool,
}

#[derive(Serialize)]
struct ReplayReport<'a> {
    project: &'a str,
    ordering: Vec<RankedEntry>,
    excluded: Vec<String>,
    window: &'a WindowStats,
    stats: StatsSnapshot,
    events: usize,
}

pub async fn run(config: &AppConfig, opts: ReplayOptions) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::open(&opts.file)
        .map_err(|e| format!("Failed to open {}: {e}", opts.file.display()))?;
    let lines = transcript::parse(BufReader::new(file))?;
    info!(records = lines.len(), file = %opts.file.display(), "replaying transcript");

    let classifier = Arc::new(ScriptedClassifier::new());
    let store = ConversationStore::with_options(classifier.clone(), StoreOptions::from(config));
    let listener = spawn_listener(store.subscribe());

    let project = ProjectId(opts.project.clone());
    let origin = Utc::now();
    for line in &lines {
        apply(&store, &classifier, &project, line, origin);
    }

    let mut budget = WindowBudget::from(&config.window);
    if let Some(tokens) = opts.budget {
        budget.token_budget = tokens;
    }
    let window = ContextWindowBuilder::new(budget).build(&store, &project);
    let snapshot = store
        .snapshot(&project)
        .unwrap_or_else(|| Arc::new(ProjectConversation::new(project.clone())));
    let stats = store.stats();

    // Dropping the store closes the event bus and ends the listener.
    drop(store);
    let events = listener
        .await
        .map_err(|e| Error::Internal(format!("event listener failed: {e}")))?;

    let report = ReplayReport {
        project: &opts.project,
        ordering: ranked_entries(&snapshot, &window),
        excluded: snapshot
            .messages()
            .iter()
            .filter(|m| snapshot.is_excluded(&m.id))
            .map(|m| m.id.to_string())
            .collect(),
        window: &window.stats,
        stats,
        events,
    };

    if opts.json {
        println!("{}", to_json(&report)?);
    } else {
        print_table(&snapshot, &report);
    }
    Ok(())
}

fn to_json(report: &ReplayReport<'_>) -> contextrank_core::Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

fn apply(
    store: &ConversationStore,
    classifier: &ScriptedClassifier,
    project: &ProjectId,
    line: &Line,
    origin: DateTime<Utc>,
) {
    debug!(line = line.number, "applying record");
    match &line.record {
        Record::Append {
            id,
            author,
            content,
            at,
            signals,
        } => {
            if let Some(signals) = signals {
                classifier.script(id.clone(), signals.clone());
            }
            let message = transcript::message_for(id, *author, content, *at, origin, line.number);
            if store.append(project, message).is_none() {
                warn!(line = line.number, %id, "duplicate message id skipped");
            }
        }
        Record::Relate { a, b, score } => classifier.relate(a.clone(), b.clone(), *score),
        Record::Chunk { id, text } => {
            store.stream_chunk(&MessageId::from(id), text);
        }
        Record::Patch { id, patch } => {
            store.update(&MessageId::from(id), patch.clone());
        }
        Record::MarkCurrent { id } => {
            store.mark_current_instruction(&MessageId::from(id));
        }
        Record::Reassign {
            id,
            tier,
            reason,
            current,
        } => {
            store.reassign_priority(&MessageId::from(id), *tier, reason, *current);
        }
        Record::Recompute { current } => {
            let current = current.as_deref().map(MessageId::from);
            store.bulk_reassign(project, current.as_ref());
        }
        Record::Clear => {
            store.clear(project);
        }
        Record::Hydrate { messages } => {
            store.hydrate(project, messages.clone());
        }
    }
}

/// Count store events until the bus closes.
fn spawn_listener(mut events: broadcast::Receiver<Arc<StoreEvent>>) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut seen = 0usize;
        loop {
            match events.recv().await {
                Ok(event) => {
                    seen += 1;
                    debug!(project = %event.project_id(), ?event, "store event");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event listener lagged");
                    seen += skipped as usize;
                }
                Err(RecvError::Closed) => break seen,
            }
        }
    })
}

fn ranked_entries(snapshot: &ProjectConversation, window: &ContextWindow) -> Vec<RankedEntry> {
    snapshot
        .ordered_messages()
        .iter()
        .map(|m| {
            let (tier, reason) = m
                .priority
                .as_ref()
                .map_or((PriorityTier::Low, String::new()), |p| (p.tier, p.reason.clone()));
            RankedEntry {
                id: m.id.to_string(),
                tier,
                reason,
                current: m.is_current_instruction(),
                resolved: m.is_resolved(),
                in_window: window.messages.iter().any(|w| w.id == m.id),
            }
        })
        .collect()
}

fn print_table(snapshot: &ProjectConversation, report: &ReplayReport<'_>) {
    println!("📋 Project {} — {} messages", report.project, snapshot.len());
    println!();
    println!("   {:<4} {:<11} {:<14} {:<18} CONTENT", "#", "TIER", "ID", "FLAGS");
    for (rank, entry) in report.ordering.iter().enumerate() {
        let mut flags = Vec::new();
        if entry.current {
            flags.push("current");
        }
        if entry.resolved {
            flags.push("resolved");
        }
        if !entry.in_window {
            flags.push("dropped");
        }
        let content = snapshot
            .get(&MessageId::from(entry.id.as_str()))
            .map(|m| preview(&m.content))
            .unwrap_or_default();
        println!(
            "   {:<4} {:<11} {:<14} {:<18} {}",
            rank + 1,
            entry.tier.label(),
            entry.id,
            flags.join(","),
            content
        );
    }
    if !report.excluded.is_empty() {
        println!();
        println!("   Excluded: {}", report.excluded.join(", "));
    }

    let w = report.window;
    let s = &report.stats;
    println!();
    println!(
        "   Window:  {} included, {} dropped, {} filtered, {}/{} tokens",
        w.included, w.dropped, w.filtered, w.tokens, w.budget
    );
    println!(
        "   Store:   {} appended, {} resolved, {} classifier failures, {} unknown ids",
        s.appended, s.resolutions, s.classifier_failures, s.unknown_ids
    );
    println!("   Events:  {}", report.events);
}

fn preview(content: &str) -> String {
    const MAX: usize = 60;
    let mut out: String = content.chars().take(MAX).collect();
    if content.chars().count() > MAX {
        out.push('…');
    }
    out.replace('\n', " ")
}
