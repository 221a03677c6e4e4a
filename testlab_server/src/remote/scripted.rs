//! Scripted remote client for tests and local development.
//!
//! Each operation replays a queue of canned results. The last queued
//! result is sticky: once a queue is down to one entry it is returned for
//! every further call.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{RemoteError, RemoteJobClient};
use crate::models::build::StepLink;
use crate::models::matrix::{MatrixSnapshot, StartedMatrix};
use crate::models::run_request::TestMatrixRequest;
use crate::models::step::StepReport;

type Script<T> = Mutex<VecDeque<Result<T, RemoteError>>>;

#[derive(Debug, Default)]
pub struct ScriptedRemote {
    matrices: Script<MatrixSnapshot>,
    steps: Script<Vec<StepReport>>,
    starts: Script<StartedMatrix>,
    resolve_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    start_calls: AtomicUsize,
    fetched_links: Mutex<Vec<StepLink>>,
}

fn next<T: Clone>(script: &Script<T>, operation: &'static str) -> Result<T, RemoteError> {
    let mut queue = script
        .lock()
        .map_err(|_| RemoteError::Transport(format!("{operation} script poisoned")))?;
    let result = if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    };
    result.unwrap_or_else(|| Err(RemoteError::Transport(format!("no scripted {operation}"))))
}

fn push<T>(script: &Script<T>, result: Result<T, RemoteError>) {
    if let Ok(mut queue) = script.lock() {
        queue.push_back(result);
    }
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_matrix(&self, result: Result<MatrixSnapshot, RemoteError>) -> &Self {
        push(&self.matrices, result);
        self
    }

    pub fn push_steps(&self, result: Result<Vec<StepReport>, RemoteError>) -> &Self {
        push(&self.steps, result);
        self
    }

    pub fn push_start(&self, result: Result<StartedMatrix, RemoteError>) -> &Self {
        push(&self.starts, result);
        self
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    /// Step links passed to `fetch_step_reports`, in call order.
    pub fn fetched_links(&self) -> Vec<StepLink> {
        self.fetched_links
            .lock()
            .map(|links| links.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RemoteJobClient for ScriptedRemote {
    async fn resolve_matrix(&self, _matrix_id: &str) -> Result<MatrixSnapshot, RemoteError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        next(&self.matrices, "matrix")
    }

    async fn fetch_step_reports(
        &self,
        link: &StepLink,
        _projection: &str,
    ) -> Result<Vec<StepReport>, RemoteError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut links) = self.fetched_links.lock() {
            links.push(link.clone());
        }
        next(&self.steps, "steps")
    }

    async fn start_matrix(
        &self,
        _app_slug: &str,
        _build_slug: &str,
        _request: &TestMatrixRequest,
    ) -> Result<StartedMatrix, RemoteError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        next(&self.starts, "start")
    }
}
