//! Credential pool and worker assignment
//!
//! N credentials expand into N x M logical workers. Workers that share a
//! credential still get their own identity and their own backend connection.

use std::fmt;

/// An opaque credential handed to the backend factory
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Human-readable label used in logs
    pub label: String,
    /// Secret material (API key, session id). Never logged.
    pub secret: Option<String>,
}

impl Credential {
    pub fn new(label: impl Into<String>, secret: Option<String>) -> Self {
        Self {
            label: label.into(),
            secret,
        }
    }

    /// A credential for backends that need no secret
    pub fn anonymous() -> Self {
        Self::new("local", None)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("label", &self.label)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerAssignment {
    /// 1-based worker identity, unique within a pass
    pub worker_id: usize,
    pub credential: Credential,
}

/// Expand credentials into worker assignments.
///
/// With `workers_per_credential` unset (fan-out disabled) there is one worker
/// per credential; otherwise each credential is shared by that many workers.
/// Ordering is deterministic: credential-major, worker ids ascending.
pub fn assign_workers(
    credentials: &[Credential],
    workers_per_credential: Option<usize>,
) -> Vec<WorkerAssignment> {
    let per_credential = workers_per_credential.unwrap_or(1).max(1);

    credentials
        .iter()
        .flat_map(|credential| std::iter::repeat_n(credential, per_credential))
        .enumerate()
        .map(|(i, credential)| WorkerAssignment {
            worker_id: i + 1,
            credential: credential.clone(),
        })
        .collect()
}

/// Worker count for the recovery pass: half the original, at least two
pub fn recovery_worker_count(original_workers: usize) -> usize {
    (original_workers / 2).max(2)
}

/// Build the reduced worker set for the recovery pass.
///
/// Credentials are taken in order of first appearance in `original` and
/// reused round-robin.
pub fn recovery_assignments(original: &[WorkerAssignment]) -> Vec<WorkerAssignment> {
    let mut credentials: Vec<&Credential> = Vec::new();
    for assignment in original {
        if !credentials.contains(&&assignment.credential) {
            credentials.push(&assignment.credential);
        }
    }

    if credentials.is_empty() {
        return Vec::new();
    }

    (0..recovery_worker_count(original.len()))
        .map(|i| WorkerAssignment {
            worker_id: i + 1,
            credential: credentials[i % credentials.len()].clone(),
        })
        .collect()
}
