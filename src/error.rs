//! Uniform outcome of every remote call.
//!
//! Transport failures never leak past the components in this crate: each call is folded into a
//! [`RemoteCallError`] carrying a kind, a human-readable detail and the HTTP status when one exists.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failed call or a rejected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection, timeout or body-read failure; no usable HTTP status.
    Network,
    /// Non-2xx answer (or an unusable 2xx body) from the backend.
    Remote,
    /// Non-2xx answer explicitly tolerated by the caller.
    SoftDegradation,
    /// Precondition rejection before any call was made.
    TextTooShort,
    /// Mutual-exclusion rejection.
    AlreadyRunning,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Remote => "remote",
            ErrorKind::SoftDegradation => "soft_degradation",
            ErrorKind::TextTooShort => "text_too_short",
            ErrorKind::AlreadyRunning => "already_running",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{detail}")]
pub struct RemoteCallError {
    pub kind: ErrorKind,
    pub detail: String,
    pub status_code: Option<u16>,
}

/// `Ok(value)` or `Err{kind, detail, status_code}`.
pub type RemoteCallResult<T> = Result<T, RemoteCallError>;

impl RemoteCallError {
    pub fn network(detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Network,
            detail: non_empty(detail.into(), "network error"),
            status_code: None,
        }
    }

    pub fn remote(status_code: Option<u16>, detail: impl Into<String>) -> Self {
        let fallback = match status_code {
            Some(code) => format!("HTTP {code}"),
            None => "remote error".to_string(),
        };
        Self {
            kind: ErrorKind::Remote,
            detail: non_empty(detail.into(), &fallback),
            status_code,
        }
    }

    /// True when the status code is one of `codes`.
    pub fn status_in(&self, codes: &BTreeSet<u16>) -> bool {
        self.status_code.is_some_and(|c| codes.contains(&c))
    }

    /// Re-tag a tolerated failure.
    pub fn into_soft(mut self) -> Self {
        self.kind = ErrorKind::SoftDegradation;
        self
    }
}

fn non_empty(detail: String, fallback: &str) -> String {
    let trimmed = detail.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Run `fut` on its own task so a panic inside it settles as an error instead of
/// unwinding through the component that awaits it.
pub(crate) async fn contained<F, T>(fut: F) -> RemoteCallResult<T>
where
    F: Future<Output = RemoteCallResult<T>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => Err(RemoteCallError::network("call aborted: task panicked")),
        Err(e) => Err(RemoteCallError::network(format!("call aborted: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_without_detail_falls_back_to_status() {
        let e = RemoteCallError::remote(Some(503), "   ");
        assert_eq!(e.detail, "HTTP 503");
        assert_eq!(e.kind, ErrorKind::Remote);
    }

    #[test]
    fn status_in_ignores_missing_status() {
        let codes: BTreeSet<u16> = [403].into_iter().collect();
        assert!(!RemoteCallError::network("down").status_in(&codes));
        assert!(RemoteCallError::remote(Some(403), "limit").status_in(&codes));
    }

    #[tokio::test]
    async fn contained_turns_panic_into_network_error() {
        let explode = true;
        let out = contained(async move {
            if explode {
                panic!("boom");
            }
            Ok::<u8, RemoteCallError>(1)
        })
        .await;
        let err = out.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Network);
        assert!(err.detail.contains("panicked"));
    }
}
