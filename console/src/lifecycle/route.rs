//! Stages and the navigation routes between them

use std::fmt;

use openapi_client::RunId;
use url::{form_urlencoded, Url};

use crate::errors::ConsoleError;

/// One of the four pipeline steps, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Upload,
    Prepare,
    Deploy,
    Monitor,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Upload, Stage::Prepare, Stage::Deploy, Stage::Monitor];

    pub fn index(&self) -> usize {
        match self {
            Stage::Upload => 0,
            Stage::Prepare => 1,
            Stage::Deploy => 2,
            Stage::Monitor => 3,
        }
    }

    /// Stage reached by advancing from this one
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Upload => Some(Stage::Prepare),
            Stage::Prepare => Some(Stage::Deploy),
            Stage::Deploy => Some(Stage::Monitor),
            Stage::Monitor => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Upload => "upload",
            Stage::Prepare => "prepare",
            Stage::Deploy => "deploy",
            Stage::Monitor => "monitor",
        }
    }

    fn from_segment(segment: &str) -> Option<Stage> {
        Stage::ALL.into_iter().find(|s| s.as_str() == segment)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry point of a stage, carrying the run id forward
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub stage: Stage,
    pub run_id: Option<RunId>,
}

impl Route {
    pub fn new(stage: Stage, run_id: Option<RunId>) -> Self {
        Self { stage, run_id }
    }

    /// Render as `/prepare?runId=…`, `/deploy?runId=…` or `/monitor/{runId}`
    pub fn path(&self) -> String {
        let run_id = self.run_id.as_ref().filter(|id| !id.is_empty());
        match (self.stage, run_id) {
            (Stage::Upload, _) | (_, None) => format!("/{}", self.stage),
            (Stage::Monitor, Some(run_id)) => {
                format!("/monitor/{}", encode_component(run_id.as_str()))
            }
            (stage, Some(run_id)) => {
                format!("/{}?runId={}", stage, encode_component(run_id.as_str()))
            }
        }
    }

    /// Recover the stage and explicit run id from a rendered path
    pub fn parse(path: &str) -> Result<Route, ConsoleError> {
        let base = Url::parse("http://localhost/")
            .map_err(|e| ConsoleError::Internal(e.to_string()))?;
        let url = base
            .join(path.trim())
            .map_err(|e| ConsoleError::Precondition(format!("Invalid route {}: {}", path, e)))?;

        let mut segments = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter();

        let stage = segments
            .next()
            .and_then(Stage::from_segment)
            .ok_or_else(|| ConsoleError::Precondition(format!("Unknown route: {}", path)))?;

        let query_run_id = url
            .query_pairs()
            .find(|(key, _)| key == "runId")
            .map(|(_, value)| value.into_owned());
        let path_run_id = match stage {
            Stage::Monitor => segments.next().map(decode_component),
            _ => None,
        };

        let run_id = query_run_id
            .or(path_run_id)
            .filter(|id| !id.trim().is_empty())
            .map(RunId::from);

        Ok(Route { stage, run_id })
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

fn encode_component(raw: &str) -> String {
    // byte_serialize escapes '+' itself, so every '+' left is an encoded space
    form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn decode_component(encoded: &str) -> String {
    form_urlencoded::parse(format!("v={}", encoded.replace('+', "%2B")).as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default()
}
