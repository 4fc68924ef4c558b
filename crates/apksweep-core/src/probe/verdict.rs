use serde::Serialize;
use std::fmt;

use crate::target::CandidateId;

/// Which request path confirmed a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DetectionMethod {
    /// Cheap HEAD check succeeded, then a ranged GET confirmed the signature.
    #[serde(rename = "HEAD+GET")]
    HeadGet,
    /// HEAD was refused (403); a ranged GET after the cooldown confirmed it.
    #[serde(rename = "GET-RANGE")]
    GetRange,
    #[serde(rename = "none")]
    None,
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DetectionMethod::HeadGet => "HEAD+GET",
            DetectionMethod::GetRange => "GET-RANGE",
            DetectionMethod::None => "none",
        };
        f.write_str(s)
    }
}

/// Classification of one probed candidate. Built once by the prober and
/// never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    #[serde(serialize_with = "serialize_id")]
    pub id: CandidateId,
    pub url: String,
    pub valid: bool,
    /// Resource size in bytes (0 when no header exposed it).
    pub size: u64,
    pub detection_method: DetectionMethod,
    /// Transport failure or unexpected status, if that is why it is invalid.
    pub error: Option<String>,
    /// The cheap check was answered with 403.
    pub soft_blocked: bool,
}

fn serialize_id<S: serde::Serializer>(id: &CandidateId, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&id.to_string())
}

impl Verdict {
    pub(crate) fn valid(id: CandidateId, url: String, size: u64, method: DetectionMethod) -> Self {
        Self {
            id,
            url,
            valid: true,
            size,
            detection_method: method,
            error: None,
            soft_blocked: method == DetectionMethod::GetRange,
        }
    }

    pub(crate) fn invalid(id: CandidateId, url: String, soft_blocked: bool) -> Self {
        Self {
            id,
            url,
            valid: false,
            size: 0,
            detection_method: DetectionMethod::None,
            error: None,
            soft_blocked,
        }
    }

    pub(crate) fn failed(id: CandidateId, url: String, soft_blocked: bool, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::invalid(id, url, soft_blocked)
        }
    }
}
