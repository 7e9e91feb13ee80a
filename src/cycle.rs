// Processing-cycle state machine.
//
// One cycle per detected clipboard change: broadcast `Processing`, run the
// solve call, broadcast the `Success`/`Error` result. The loop consumes
// change events sequentially, so at most one cycle (and one solve call) is
// ever in flight; changes that arrive mid-cycle queue up and are coalesced
// to the newest image once the cycle completes.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::clipboard::CapturedImage;
use crate::hub::BroadcastHub;
use crate::protocol::CycleMessage;
use crate::solver::Solver;

/// Where the controller is within the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    /// Watching; no cycle in flight.
    Idle,
    /// `Processing` broadcast sent, solve call in flight.
    Processing,
    /// Solve finished, result broadcast underway.
    Delivering,
}

pub struct CycleController {
    hub: Arc<BroadcastHub>,
    solver: Arc<dyn Solver>,
    phase: CyclePhase,
}

impl CycleController {
    pub fn new(hub: Arc<BroadcastHub>, solver: Arc<dyn Solver>) -> Self {
        CycleController {
            hub,
            solver,
            phase: CyclePhase::Idle,
        }
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    /// Run one full cycle for `image`. Always returns the machine to `Idle`;
    /// a solve failure becomes an `Error` broadcast, never a halted loop.
    pub async fn run_cycle(&mut self, image: &CapturedImage) {
        self.phase = CyclePhase::Processing;
        self.hub.broadcast(&CycleMessage::Processing.to_frame());

        let outcome = self.solver.solve(image).await;

        self.phase = CyclePhase::Delivering;
        let result = match outcome {
            Ok(content) => {
                info!("cycle finished with an answer");
                CycleMessage::Success { content }
            }
            Err(e) => {
                warn!("cycle finished with an error: {e}");
                CycleMessage::Error {
                    content: e.to_string(),
                }
            }
        };
        self.hub.broadcast(&result.to_frame());

        self.phase = CyclePhase::Idle;
    }

    /// Consume change events until the sender is dropped.
    ///
    /// Events that accumulated while the previous cycle was in flight are
    /// drained and coalesced: only the newest pending image starts a cycle,
    /// since older clipboard content is already stale.
    pub async fn run(mut self, mut events: mpsc::Receiver<CapturedImage>) {
        info!("cycle controller started");

        while let Some(mut image) = events.recv().await {
            let mut skipped = 0usize;
            while let Ok(newer) = events.try_recv() {
                image = newer;
                skipped += 1;
            }
            if skipped > 0 {
                debug!(skipped, "coalesced stale clipboard changes");
            }

            self.run_cycle(&image).await;
        }

        info!("cycle controller stopped");
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::SolveError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Scripted solver: pops one outcome per call and records what it saw.
    struct ScriptedSolver {
        outcomes: Mutex<VecDeque<Result<String, SolveError>>>,
        solved: Mutex<Vec<CapturedImage>>,
        delay: Duration,
    }

    impl ScriptedSolver {
        fn new(outcomes: Vec<Result<String, SolveError>>) -> Self {
            ScriptedSolver {
                outcomes: Mutex::new(outcomes.into()),
                solved: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl Solver for ScriptedSolver {
        async fn solve(&self, image: &CapturedImage) -> Result<String, SolveError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.solved.lock().push(image.clone());
            self.outcomes
                .lock()
                .pop_front()
                .unwrap_or(Err(SolveError::MalformedResponse(
                    "scripted solver exhausted".to_string(),
                )))
        }
    }

    fn image(byte: u8) -> CapturedImage {
        CapturedImage {
            width: 1,
            height: 1,
            rgba: vec![byte; 4],
        }
    }

    fn parse(frame: &str) -> Value {
        serde_json::from_str(frame).expect("frame should be valid JSON")
    }

    #[tokio::test]
    async fn success_cycle_broadcasts_processing_then_success() {
        let hub = Arc::new(BroadcastHub::new());
        let (_id, mut rx) = hub.connect();

        let solver = Arc::new(ScriptedSolver::new(vec![Ok("answer-1".to_string())]));
        let mut controller = CycleController::new(Arc::clone(&hub), solver);

        controller.run_cycle(&image(1)).await;

        let first = parse(&rx.recv().await.unwrap());
        assert_eq!(first["status"], "processing");

        let second = parse(&rx.recv().await.unwrap());
        assert_eq!(second["status"], "success");
        assert_eq!(second["content"], "answer-1");

        // Exactly two frames per cycle.
        assert!(rx.try_recv().is_err());
        assert_eq!(controller.phase(), CyclePhase::Idle);
    }

    #[tokio::test]
    async fn failed_solve_broadcasts_error_and_returns_to_idle() {
        let hub = Arc::new(BroadcastHub::new());
        let (_id, mut rx) = hub.connect();

        let solver = Arc::new(ScriptedSolver::new(vec![Err(SolveError::Api(
            "status 429: rate limit exceeded".to_string(),
        ))]));
        let mut controller = CycleController::new(Arc::clone(&hub), solver);

        controller.run_cycle(&image(1)).await;

        let first = parse(&rx.recv().await.unwrap());
        assert_eq!(first["status"], "processing");

        let second = parse(&rx.recv().await.unwrap());
        assert_eq!(second["status"], "error");
        assert_eq!(
            second["content"],
            "AI provider error: status 429: rate limit exceeded"
        );
        assert_eq!(controller.phase(), CyclePhase::Idle);
    }

    #[tokio::test]
    async fn missing_credentials_cycle_still_produces_both_frames() {
        let hub = Arc::new(BroadcastHub::new());
        let (_id, mut rx) = hub.connect();

        let solver = Arc::new(ScriptedSolver::new(vec![Err(
            SolveError::MissingCredentials,
        )]));
        let mut controller = CycleController::new(Arc::clone(&hub), solver);

        controller.run_cycle(&image(1)).await;

        assert_eq!(parse(&rx.recv().await.unwrap())["status"], "processing");
        let result = parse(&rx.recv().await.unwrap());
        assert_eq!(result["status"], "error");
        assert!(result["content"]
            .as_str()
            .unwrap()
            .contains("TENCENT_SECRET_ID"));
    }

    #[tokio::test]
    async fn error_cycle_does_not_stop_subsequent_cycles() {
        let hub = Arc::new(BroadcastHub::new());
        let (_id, mut rx) = hub.connect();

        let solver = Arc::new(ScriptedSolver::new(vec![
            Err(SolveError::Network("connection reset".to_string())),
            Ok("answer-2".to_string()),
        ]));
        let mut controller = CycleController::new(Arc::clone(&hub), solver);

        controller.run_cycle(&image(1)).await;
        controller.run_cycle(&image(2)).await;

        let statuses: Vec<String> = {
            let mut out = Vec::new();
            while let Ok(frame) = rx.try_recv() {
                out.push(parse(&frame)["status"].as_str().unwrap().to_string());
            }
            out
        };
        assert_eq!(statuses, ["processing", "error", "processing", "success"]);
    }

    #[tokio::test]
    async fn pending_changes_are_coalesced_to_the_newest() {
        let hub = Arc::new(BroadcastHub::new());
        let (_id, mut rx) = hub.connect();

        let solver = Arc::new(ScriptedSolver::new(vec![Ok("latest".to_string())]));
        let solver_handle = Arc::clone(&solver);
        let controller = CycleController::new(Arc::clone(&hub), solver);

        // Three changes queue up before the controller runs: only the newest
        // should start a cycle.
        let (tx, events) = mpsc::channel(8);
        tx.send(image(1)).await.unwrap();
        tx.send(image(2)).await.unwrap();
        tx.send(image(3)).await.unwrap();
        drop(tx);

        controller.run(events).await;

        let solved = solver_handle.solved.lock().clone();
        assert_eq!(solved, vec![image(3)]);

        // Exactly one cycle's worth of frames.
        assert_eq!(parse(&rx.recv().await.unwrap())["status"], "processing");
        assert_eq!(parse(&rx.recv().await.unwrap())["status"], "success");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn changes_during_a_slow_solve_wait_for_the_next_cycle() {
        let hub = Arc::new(BroadcastHub::new());
        let (_id, mut rx) = hub.connect();

        let solver = Arc::new(ScriptedSolver {
            outcomes: Mutex::new(
                vec![Ok("first".to_string()), Ok("second".to_string())].into(),
            ),
            solved: Mutex::new(Vec::new()),
            delay: Duration::from_millis(50),
        });
        let solver_handle = Arc::clone(&solver);
        let controller = CycleController::new(Arc::clone(&hub), solver);

        let (tx, events) = mpsc::channel(8);
        let run = tokio::spawn(controller.run(events));

        tx.send(image(1)).await.unwrap();
        // Arrives while the first solve sleeps; must not overlap it.
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(image(2)).await.unwrap();
        drop(tx);

        run.await.unwrap();

        let solved = solver_handle.solved.lock().clone();
        assert_eq!(solved, vec![image(1), image(2)]);

        // Strict per-cycle ordering: next Processing only after previous result.
        let mut statuses = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            statuses.push(parse(&frame)["status"].as_str().unwrap().to_string());
        }
        assert_eq!(statuses, ["processing", "success", "processing", "success"]);
    }
}
