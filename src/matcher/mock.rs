use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use serde_json::Map;
use uuid::Uuid;

use crate::matcher::{MatchError, MatchQuery, Matcher, RankedCandidate};
use crate::report::{Location, SightingReport};

type Script =
    dyn Fn(&MatchQuery, &[SightingReport]) -> Result<Vec<RankedCandidate>, MatchError> + Send + Sync;

/// What the matcher was asked, for later inspection.
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub description: String,
    pub image: Vec<u8>,
    pub location: Option<Location>,
    pub candidates: Vec<SightingReport>,
}

/// A matcher that answers from a closure and remembers every call.
pub struct ScriptedMatcher {
    script: Box<Script>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedMatcher {
    pub fn new(
        script: impl Fn(&MatchQuery, &[SightingReport]) -> Result<Vec<RankedCandidate>, MatchError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            delays: HashMap::new(),
            calls: Mutex::new(vec![]),
        }
    }

    /// Ranks the whole pool in the order given, with falling scores.
    pub fn pool_order() -> Self {
        Self::new(|_, candidates| Ok(rank_in_order(candidates)))
    }

    /// Fails every query whose description is `description`; ranks
    /// everything else like `pool_order`.
    pub fn failing_on(description: impl Into<String>) -> Self {
        let description = description.into();

        Self::new(move |query, candidates| {
            if query.description == description {
                Err(MatchError::Unavailable(format!(
                    "refused to match {:?}",
                    query.description
                )))
            } else {
                Ok(rank_in_order(candidates))
            }
        })
    }

    /// Makes queries with the given description wait before answering.
    pub fn with_delay(mut self, description: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(description.into(), delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("lock recorded calls").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("lock recorded calls").len()
    }

    /// The IDs of the candidates offered in every call so far.
    pub fn offered_candidates(&self) -> Vec<Vec<Uuid>> {
        self.calls()
            .iter()
            .map(|c| c.candidates.iter().map(|s| s.id).collect())
            .collect()
    }
}

impl Matcher for ScriptedMatcher {
    fn rank<'a>(
        &'a self,
        query: &'a MatchQuery,
        candidates: &'a [SightingReport],
    ) -> BoxFuture<'a, Result<Vec<RankedCandidate>, MatchError>> {
        async move {
            self.calls
                .lock()
                .expect("lock recorded calls")
                .push(RecordedCall {
                    description: query.description.clone(),
                    image: query.image.clone(),
                    location: query.location,
                    candidates: candidates.to_vec(),
                });

            if let Some(delay) = self.delays.get(&query.description) {
                tokio::time::sleep(*delay).await;
            }

            (self.script)(query, candidates)
        }
        .boxed()
    }
}

/// Ranks candidates in the order given, scores falling from 1.
pub fn rank_in_order(candidates: &[SightingReport]) -> Vec<RankedCandidate> {
    candidates
        .iter()
        .enumerate()
        .map(|(i, sighting)| RankedCandidate {
            sighting: sighting.clone(),
            score: 1.0 / (i as f64 + 1.0),
            details: Map::new(),
        })
        .collect()
}
