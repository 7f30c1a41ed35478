//! End-to-end pipeline behaviour with stub tasks

use analyst_core::{
    GraphError, NodeId, OutputField, ResultRecord, Subject, TaskError, resolve,
};
use analyst_graph::{AnalysisPipeline, AnalystTask, TaskTable, Vertex, build};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
enum Behavior {
    Return(String),
    ReturnAfter(String, Duration),
    Fail(TaskError),
    FailAfter(TaskError, Duration),
    Hang,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Started(NodeId, Vec<OutputField>),
    Finished(NodeId),
}

type Journal = Arc<Mutex<Vec<Event>>>;

struct StubTask {
    node: NodeId,
    behavior: Behavior,
    journal: Journal,
    dropped_early: Arc<AtomicBool>,
}

/// Sets its flag if the task future is dropped before finishing
struct DropFlag {
    flag: Arc<AtomicBool>,
    armed: bool,
}

impl Drop for DropFlag {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(true, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl AnalystTask for StubTask {
    fn node(&self) -> NodeId {
        self.node
    }

    async fn run(&self, record: &ResultRecord) -> Result<String, TaskError> {
        self.journal
            .lock()
            .unwrap()
            .push(Event::Started(self.node, record.present_fields()));
        let mut guard = DropFlag {
            flag: Arc::clone(&self.dropped_early),
            armed: true,
        };

        let result = match &self.behavior {
            Behavior::Return(text) => Ok(text.clone()),
            Behavior::ReturnAfter(text, delay) => {
                tokio::time::sleep(*delay).await;
                Ok(text.clone())
            }
            Behavior::Fail(err) => Err(err.clone()),
            Behavior::FailAfter(err, delay) => {
                tokio::time::sleep(*delay).await;
                Err(err.clone())
            }
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
        };

        guard.armed = false;
        self.journal.lock().unwrap().push(Event::Finished(self.node));
        result
    }
}

/// Builds a task table where every node returns `"<short name> ok"` unless overridden
struct Harness {
    behaviors: Vec<(NodeId, Behavior)>,
    journal: Journal,
    dropped_early: Arc<AtomicBool>,
}

impl Harness {
    fn new() -> Self {
        Self {
            behaviors: Vec::new(),
            journal: Arc::new(Mutex::new(Vec::new())),
            dropped_early: Arc::new(AtomicBool::new(false)),
        }
    }

    fn with(mut self, node: NodeId, behavior: Behavior) -> Self {
        self.behaviors.push((node, behavior));
        self
    }

    fn returning(self, node: NodeId, text: &str) -> Self {
        self.with(node, Behavior::Return(text.to_string()))
    }

    fn tasks(&self) -> TaskTable {
        TaskTable::from_fn(|id| {
            let behavior = self
                .behaviors
                .iter()
                .rev()
                .find(|(node, _)| *node == id)
                .map(|(_, b)| b.clone())
                .unwrap_or_else(|| Behavior::Return(format!("{} ok", id.short_name())));
            Arc::new(StubTask {
                node: id,
                behavior,
                journal: Arc::clone(&self.journal),
                dropped_early: Arc::clone(&self.dropped_early),
            })
        })
    }

    fn events(&self) -> Vec<Event> {
        self.journal.lock().unwrap().clone()
    }

    fn started(&self, node: NodeId) -> bool {
        self.events()
            .iter()
            .any(|e| matches!(e, Event::Started(n, _) if *n == node))
    }
}

fn subject() -> Subject {
    Subject::new(
        "600519.SH",
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
    )
}

#[tokio::test]
async fn scenario_single_analyst() {
    let harness = Harness::new()
        .returning(NodeId::News, "positive")
        .returning(NodeId::Risk, "low")
        .returning(NodeId::Portfolio, "BUY");
    let pipeline = AnalysisPipeline::new(Some(["news"].as_slice()), harness.tasks()).unwrap();

    let record = pipeline.invoke(subject()).await.unwrap();

    assert_eq!(record.get(OutputField::NewsAnalysis), Some("positive"));
    assert_eq!(record.get(OutputField::RiskAnalysis), Some("low"));
    assert_eq!(record.get(OutputField::PortfolioRecommendation), Some("BUY"));
    assert_eq!(
        record.present_fields(),
        vec![
            OutputField::NewsAnalysis,
            OutputField::RiskAnalysis,
            OutputField::PortfolioRecommendation
        ]
    );

    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["stock_code"], "600519.SH");
    assert!(json.get("technical_analysis_result").is_none());
}

#[tokio::test]
async fn scenario_tool_failure_aborts_run() {
    let harness = Harness::new()
        .with(
            NodeId::Technical,
            Behavior::Fail(TaskError::Tool("stock_data returned 502".to_string())),
        )
        .with(
            NodeId::Growth,
            Behavior::ReturnAfter("strong".to_string(), Duration::from_millis(20)),
        );
    let pipeline =
        AnalysisPipeline::new(Some(["technical", "growth"].as_slice()), harness.tasks()).unwrap();

    let err = pipeline.invoke(subject()).await.unwrap_err();

    assert_eq!(err.failed_node(), Some(NodeId::Technical));
    assert!(matches!(
        &err,
        GraphError::NodeExecution { cause: TaskError::Tool(_), .. }
    ));
    assert!(err.to_string().contains("technical_analyst"));
    assert!(!harness.started(NodeId::Risk));
    assert!(!harness.started(NodeId::Portfolio));
}

#[tokio::test]
async fn failure_after_sibling_merged_discards_record() {
    let harness = Harness::new()
        .with(
            NodeId::Technical,
            Behavior::FailAfter(
                TaskError::Tool("stock_data returned 502".to_string()),
                Duration::from_millis(30),
            ),
        )
        .returning(NodeId::Growth, "strong");
    let pipeline =
        AnalysisPipeline::new(Some(["technical", "growth"].as_slice()), harness.tasks()).unwrap();

    let result = pipeline.invoke(subject()).await;

    // Growth finished and was merged before technical failed
    assert!(harness.events().contains(&Event::Finished(NodeId::Growth)));
    let Err(err) = result else {
        panic!("run succeeded despite a failing analyst");
    };
    assert_eq!(err.failed_node(), Some(NodeId::Technical));
    assert!(err.to_string().contains("technical_analyst"));
    assert!(!harness.started(NodeId::Risk));
    assert!(!harness.started(NodeId::Portfolio));
}

#[tokio::test]
async fn scenario_default_selection_fills_every_field() {
    let harness = Harness::new();
    let pipeline = AnalysisPipeline::new::<&str>(None, harness.tasks()).unwrap();

    let record = pipeline.invoke(subject()).await.unwrap();

    assert_eq!(record.present_fields().len(), 7);
    for id in NodeId::ALL {
        let expected = format!("{} ok", id.short_name());
        assert_eq!(record.output_of(id), Some(expected.as_str()));
    }

    let starts = harness
        .events()
        .iter()
        .filter(|e| matches!(e, Event::Started(..)))
        .count();
    assert_eq!(starts, 7);
}

#[tokio::test]
async fn completion_order_does_not_change_result() {
    let delays = [5, 15, 25, 35, 45];
    let mut records = Vec::new();

    for reversed in [false, true] {
        let mut harness = Harness::new();
        for (i, id) in NodeId::CANDIDATES.into_iter().enumerate() {
            let delay = if reversed { delays[4 - i] } else { delays[i] };
            harness = harness.with(
                id,
                Behavior::ReturnAfter(format!("{id} result"), Duration::from_millis(delay)),
            );
        }
        let pipeline = AnalysisPipeline::new::<&str>(None, harness.tasks()).unwrap();
        records.push(pipeline.invoke(subject()).await.unwrap());
    }

    assert_eq!(records[0], records[1]);
}

#[tokio::test]
async fn fan_out_tasks_overlap() {
    struct Rendezvous {
        node: NodeId,
        barrier: Arc<tokio::sync::Barrier>,
    }

    #[async_trait]
    impl AnalystTask for Rendezvous {
        fn node(&self) -> NodeId {
            self.node
        }

        async fn run(&self, _record: &ResultRecord) -> Result<String, TaskError> {
            // Only passes once every analyst is running at the same time
            self.barrier.wait().await;
            Ok("met".to_string())
        }
    }

    let barrier = Arc::new(tokio::sync::Barrier::new(NodeId::CANDIDATES.len()));
    let stubs = Harness::new().tasks();
    let tasks = NodeId::CANDIDATES.into_iter().fold(stubs, |table, id| {
        table.with(Arc::new(Rendezvous {
            node: id,
            barrier: Arc::clone(&barrier),
        }))
    });
    let pipeline = AnalysisPipeline::new::<&str>(None, tasks).unwrap();

    let record = tokio::time::timeout(Duration::from_secs(5), pipeline.invoke(subject()))
        .await
        .expect("analysts did not run concurrently")
        .unwrap();
    assert_eq!(record.get(OutputField::ValuationAnalysis), Some("met"));
}

#[tokio::test]
async fn failure_does_not_wait_for_siblings() {
    let harness = Harness::new()
        .with(NodeId::News, Behavior::Hang)
        .with(NodeId::Fundamentals, Behavior::Hang)
        .with(
            NodeId::Valuation,
            Behavior::Fail(TaskError::Model("context length exceeded".to_string())),
        );
    let pipeline = AnalysisPipeline::new(
        Some(["news", "fundamentals", "valuation"].as_slice()),
        harness.tasks(),
    )
    .unwrap();

    let err = tokio::time::timeout(Duration::from_secs(5), pipeline.invoke(subject()))
        .await
        .expect("executor blocked on cancelled siblings")
        .unwrap_err();
    assert_eq!(err.failed_node(), Some(NodeId::Valuation));

    // Cancelled siblings stop at their next await point
    for _ in 0..50 {
        if harness.dropped_early.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(harness.dropped_early.load(Ordering::SeqCst));
    assert!(!harness.started(NodeId::Risk));
    assert!(!harness.started(NodeId::Portfolio));
}

#[tokio::test]
async fn tail_runs_strictly_in_sequence() {
    let harness = Harness::new().with(
        NodeId::Risk,
        Behavior::ReturnAfter("moderate".to_string(), Duration::from_millis(30)),
    );
    let pipeline =
        AnalysisPipeline::new(Some(["growth", "valuation"].as_slice()), harness.tasks()).unwrap();

    let record = pipeline.invoke(subject()).await.unwrap();
    assert_eq!(record.get(OutputField::RiskAnalysis), Some("moderate"));

    let events = harness.events();
    let position = |event: &Event| events.iter().position(|e| e == event).unwrap();

    let risk_start = events
        .iter()
        .find_map(|e| match e {
            Event::Started(NodeId::Risk, seen) => Some(seen.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        risk_start,
        vec![OutputField::GrowthAnalysis, OutputField::ValuationAnalysis]
    );

    let portfolio_seen = events
        .iter()
        .find_map(|e| match e {
            Event::Started(NodeId::Portfolio, seen) => Some(seen.clone()),
            _ => None,
        })
        .unwrap();
    assert!(portfolio_seen.contains(&OutputField::RiskAnalysis));

    let portfolio_start = events
        .iter()
        .position(|e| matches!(e, Event::Started(NodeId::Portfolio, _)))
        .unwrap();
    assert!(position(&Event::Finished(NodeId::Risk)) < portfolio_start);
    assert!(position(&Event::Finished(NodeId::Growth)) < position(&Event::Started(NodeId::Risk, risk_start.clone())));
}

#[tokio::test]
async fn empty_selection_goes_straight_to_tail() {
    let harness = Harness::new();
    let pipeline = AnalysisPipeline::new(Some(Vec::<String>::new().as_slice()), harness.tasks())
        .unwrap();

    assert_eq!(pipeline.graph().in_degree(Vertex::Barrier), 0);

    let record = pipeline.invoke(subject()).await.unwrap();
    assert_eq!(
        record.present_fields(),
        vec![OutputField::RiskAnalysis, OutputField::PortfolioRecommendation]
    );
}

#[test]
fn barrier_in_degree_matches_every_subset() {
    let candidates = NodeId::CANDIDATES;

    for mask in 1u32..(1 << candidates.len()) {
        let subset: Vec<&str> = candidates
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, id)| id.short_name())
            .collect();

        let active = resolve(Some(subset.as_slice())).unwrap();
        let graph = build(&active);

        assert_eq!(graph.in_degree(Vertex::Barrier), subset.len());
        assert_eq!(graph.out_degree(Vertex::Barrier), 1);
        let names: Vec<&str> = graph.active().ids().map(NodeId::short_name).collect();
        assert_eq!(names, subset);
        assert!(graph.validate().is_ok());
    }
}

#[test]
fn tail_nodes_are_not_selectable() {
    assert!(AnalysisPipeline::new(Some(["risk"].as_slice()), Harness::new().tasks()).is_err());
    assert!(
        AnalysisPipeline::new(Some(["news", "news"].as_slice()), Harness::new().tasks()).is_err()
    );
}
