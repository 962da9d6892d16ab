//! Engine thread: sole owner of the [`Verifier`], reached by message passing.
//!
//! Requests are served one at a time, which serializes every gallery write and
//! audit append. Dropping the future returned by an [`EngineHandle`] method
//! closes its reply channel; the engine treats that as cancellation and skips
//! the commit.

use std::thread::JoinHandle;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use facegate_core::{
    AuditLog, AuditRecord, CancelToken, Decision, Enrollment, Frame, Gallery, IdentitySummary, Profile, Stats,
    Verifier, VerifyError,
};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Verify(#[from] VerifyError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

type Reply<T> = oneshot::Sender<Result<T, VerifyError>>;

/// Messages sent from the command layer to the engine thread.
enum EngineRequest {
    Enroll {
        identity: String,
        profile: Profile,
        frame: Frame,
        reply: Reply<Enrollment>,
    },
    Authenticate {
        frame: Frame,
        reply: Reply<Decision>,
    },
    Remove {
        identity: String,
        reply: Reply<bool>,
    },
    Identities {
        reply: Reply<Vec<IdentitySummary>>,
    },
    History {
        limit: usize,
        reply: Reply<Vec<AuditRecord>>,
    },
    Stats {
        reply: Reply<Stats>,
    },
}

/// Cancelled once the requester stops waiting for the reply.
struct ReplyClosed<'a, T>(&'a oneshot::Sender<T>);

impl<T> CancelToken for ReplyClosed<'_, T> {
    fn is_cancelled(&self) -> bool {
        self.0.is_closed()
    }
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Enroll `identity` from `frame`.
    pub async fn enroll(&self, identity: String, profile: Profile, frame: Frame) -> Result<Enrollment, EngineError> {
        self.request(|reply| EngineRequest::Enroll {
            identity,
            profile,
            frame,
            reply,
        })
        .await
    }

    /// Authenticate the face in `frame` against the gallery.
    pub async fn authenticate(&self, frame: Frame) -> Result<Decision, EngineError> {
        self.request(|reply| EngineRequest::Authenticate { frame, reply }).await
    }

    pub async fn remove(&self, identity: String) -> Result<bool, EngineError> {
        self.request(|reply| EngineRequest::Remove { identity, reply }).await
    }

    pub async fn identities(&self) -> Result<Vec<IdentitySummary>, EngineError> {
        self.request(|reply| EngineRequest::Identities { reply }).await
    }

    pub async fn history(&self, limit: usize) -> Result<Vec<AuditRecord>, EngineError> {
        self.request(|reply| EngineRequest::History { limit, reply }).await
    }

    pub async fn stats(&self) -> Result<Stats, EngineError> {
        self.request(|reply| EngineRequest::Stats { reply }).await
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> EngineRequest) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread exits once every [`EngineHandle`] has been dropped; join the
/// returned handle to wait for an in-flight request to finish.
pub fn spawn_engine<G, A>(mut verifier: Verifier<G, A>) -> Result<(EngineHandle, JoinHandle<()>), EngineError>
where
    G: Gallery + 'static,
    A: AuditLog + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    let thread = std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                handle_request(&mut verifier, req);
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok((EngineHandle { tx }, thread))
}

fn handle_request<G: Gallery, A: AuditLog>(verifier: &mut Verifier<G, A>, req: EngineRequest) {
    match req {
        EngineRequest::Enroll {
            identity,
            profile,
            frame,
            reply,
        } => {
            let result = verifier.enroll_with(&identity, profile, &frame, &ReplyClosed(&reply));
            let _ = reply.send(result);
        }
        EngineRequest::Authenticate { frame, reply } => {
            let result = verifier.authenticate_with(&frame, &ReplyClosed(&reply));
            let _ = reply.send(result);
        }
        EngineRequest::Remove { identity, reply } => {
            let _ = reply.send(verifier.remove(&identity));
        }
        EngineRequest::Identities { reply } => {
            let _ = reply.send(verifier.identities());
        }
        EngineRequest::History { limit, reply } => {
            let _ = reply.send(verifier.history(limit));
        }
        EngineRequest::Stats { reply } => {
            let _ = reply.send(verifier.stats());
        }
    }
}
