//! Scripted producer doubles shared by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sensorlink_core::{ManualClock, Measurement, MeasurementSource, SourceError};

/// What the scripted producer does on one call.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Reply(Measurement),
    Fail,
    Hang,
    Malformed,
}

/// Producer that replays a fixed script, then repeats `then` forever.
pub(crate) struct ScriptedSource {
    script: Mutex<VecDeque<Step>>,
    then: Step,
    calls: AtomicU32,
    paths: Mutex<Vec<String>>,
    advance: Option<(Arc<ManualClock>, u64)>,
}

impl ScriptedSource {
    pub(crate) fn new(script: Vec<Step>, then: Step) -> Self {
        Self {
            script: Mutex::new(script.into()),
            then,
            calls: AtomicU32::new(0),
            paths: Mutex::new(Vec::new()),
            advance: None,
        }
    }

    pub(crate) fn always(step: Step) -> Self {
        Self::new(Vec::new(), step)
    }

    /// Moves `clock` forward by `delta_ms` on every call, simulating
    /// wall-clock time spent in the exchange.
    pub(crate) fn advancing(mut self, clock: Arc<ManualClock>, delta_ms: u64) -> Self {
        self.advance = Some((clock, delta_ms));
        self
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}

#[async_trait]
impl MeasurementSource for ScriptedSource {
    async fn fetch_latest(&self, path: &str) -> Result<Measurement, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.paths.lock().unwrap().push(path.to_string());
        if let Some((clock, delta_ms)) = &self.advance {
            clock.advance(*delta_ms);
        }

        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.then.clone());

        match step {
            Step::Reply(m) => Ok(m),
            Step::Fail => Err(SourceError::Transport("connection refused".to_string())),
            Step::Hang => std::future::pending().await,
            Step::Malformed => Err(Measurement::decode(b"{").unwrap_err().into()),
        }
    }
}

pub(crate) fn reading(value: f64) -> Measurement {
    Measurement::at_millis(value, 1_700_000_000_000)
}
