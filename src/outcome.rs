//! Classification of store responses.
//!
//! Every store interaction ends in an [`Outcome`] with one of three severities:
//!
//! | store response | outcome |
//! |---|---|
//! | `{"ok": true}`, a design-document listing, or a per-document `id`/`rev` pair | [`Severity::Ok`] |
//! | `error` = `file_exists`, `conflict`, `not_found`, `compilation_error` | [`Severity::Recoverable`] |
//! | any other `error` | [`Severity::Fatal`] |
//! | anything else | [`Severity::Fatal`], [`FatalCause::UnknownResponse`] |

use std::fmt;

use crate::error::IngestionError;
use crate::store::RawResponse;

/// Error tags that do not abort a run.
pub const RECOVERABLE_TAGS: [&str; 4] = ["file_exists", "conflict", "not_found", "compilation_error"];

/// Tags meaning "the thing being created is already there".
pub const ALREADY_EXISTS_TAGS: [&str; 2] = ["file_exists", "conflict"];

/// Tri-state severity of an outcome, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Ok,
    Recoverable,
    Fatal,
}

/// Why an outcome is fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FatalCause {
    /// The store answered with an error tag outside [`RECOVERABLE_TAGS`].
    Store(String),
    /// The response shape was not recognized.
    UnknownResponse,
    /// The store could not be reached.
    Transport,
}

/// Classified result of one store interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Recoverable { tag: String, message: String },
    Fatal { cause: FatalCause, message: String },
}

impl Outcome {
    pub fn severity(&self) -> Severity {
        match self {
            Outcome::Ok => Severity::Ok,
            Outcome::Recoverable { .. } => Severity::Recoverable,
            Outcome::Fatal { .. } => Severity::Fatal,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Outcome::Fatal { .. })
    }

    /// Error tag reported by the store, if any.
    pub fn tag(&self) -> Option<&str> {
        match self {
            Outcome::Recoverable { tag, .. } => Some(tag),
            Outcome::Fatal {
                cause: FatalCause::Store(tag),
                ..
            } => Some(tag),
            _ => None,
        }
    }

    /// `true` for recoverable outcomes saying the target already exists.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Outcome::Recoverable { tag, .. } if ALREADY_EXISTS_TAGS.contains(&tag.as_str()))
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Outcome::Ok => None,
            Outcome::Recoverable { message, .. } | Outcome::Fatal { message, .. } => Some(message),
        }
    }

    /// Outcome for an interaction that never reached the store.
    pub fn transport_failure(message: impl Into<String>) -> Self {
        Outcome::Fatal {
            cause: FatalCause::Transport,
            message: message.into(),
        }
    }

    /// Keep the worse of two outcomes; on a tie the current one wins.
    pub fn worst(self, other: Outcome) -> Outcome {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    /// The error this outcome stands for, `None` when it is [`Outcome::Ok`].
    pub fn to_error(&self) -> Option<IngestionError> {
        match self {
            Outcome::Ok => None,
            Outcome::Recoverable { tag, message } => Some(IngestionError::RecoverableStore {
                tag: tag.clone(),
                message: message.clone(),
            }),
            Outcome::Fatal { cause, message } => Some(match cause {
                FatalCause::Store(tag) => IngestionError::FatalStore {
                    tag: tag.clone(),
                    message: message.clone(),
                },
                FatalCause::UnknownResponse => IngestionError::UnknownResponse {
                    raw: message.clone(),
                },
                FatalCause::Transport => IngestionError::TransportFailure(
                    crate::store::TransportError::new(message.clone()),
                ),
            }),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ok => write!(f, "ok"),
            Outcome::Recoverable { tag, message } => write!(f, "recoverable ({tag}): {message}"),
            Outcome::Fatal { cause, message } => match cause {
                FatalCause::Store(tag) => write!(f, "fatal ({tag}): {message}"),
                FatalCause::UnknownResponse => write!(f, "fatal (unknown response): {message}"),
                FatalCause::Transport => write!(f, "fatal (transport): {message}"),
            },
        }
    }
}

/// Classify a raw store response.
pub fn classify(response: &RawResponse) -> Outcome {
    match response {
        serde_json::Value::Array(items) => classify_items(items),
        serde_json::Value::Object(_) => classify_object(response),
        other => unknown(other),
    }
}

fn classify_object(response: &RawResponse) -> Outcome {
    if let Some(error) = response.get("error") {
        let tag = match error.as_str() {
            Some(tag) => tag,
            None => return unknown(response),
        };
        let reason = response.get("reason").and_then(|r| r.as_str());
        return classify_error_tag(tag, reason);
    }

    match response.get("ok") {
        Some(serde_json::Value::Bool(true)) => return Outcome::Ok,
        Some(_) => return unknown(response),
        None => {}
    }

    // Listings carry `rows`; per-document bulk results carry `id` + `rev`.
    if response.get("rows").is_some_and(|r| r.is_array())
        || (response.get("id").is_some() && response.get("rev").is_some())
    {
        return Outcome::Ok;
    }

    unknown(response)
}

fn classify_items(items: &[serde_json::Value]) -> Outcome {
    let mut worst = Outcome::Ok;
    let mut affected = 0usize;
    for item in items {
        let outcome = match item {
            serde_json::Value::Object(_) => classify_object(item),
            other => unknown(other),
        };
        if !outcome.is_ok() {
            affected += 1;
        }
        worst = worst.worst(outcome);
    }

    match worst {
        Outcome::Ok => Outcome::Ok,
        Outcome::Recoverable { tag, message } => Outcome::Recoverable {
            tag,
            message: format!("{affected} of {} documents affected; first: {message}", items.len()),
        },
        Outcome::Fatal { cause, message } => Outcome::Fatal {
            cause,
            message: format!("{affected} of {} documents affected; first: {message}", items.len()),
        },
    }
}

fn classify_error_tag(tag: &str, reason: Option<&str>) -> Outcome {
    if RECOVERABLE_TAGS.contains(&tag) {
        let hint = match tag {
            "file_exists" => "document already exists",
            "conflict" => "conflict with existing document",
            "not_found" => "database or document does not exist",
            _ => "index function did not compile; check that field names follow convention",
        };
        return Outcome::Recoverable {
            tag: tag.to_string(),
            message: join_reason(hint, reason),
        };
    }
    Outcome::Fatal {
        cause: FatalCause::Store(tag.to_string()),
        message: join_reason("store rejected the request", reason),
    }
}

fn join_reason(hint: &str, reason: Option<&str>) -> String {
    match reason {
        Some(r) if !r.is_empty() => format!("{hint} ({r})"),
        _ => hint.to_string(),
    }
}

fn unknown(response: &serde_json::Value) -> Outcome {
    Outcome::Fatal {
        cause: FatalCause::UnknownResponse,
        message: response.to_string(),
    }
}
