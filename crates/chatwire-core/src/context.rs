//! Ambient session context.
//!
//! Tool code invoked deep inside the agent runtime usually has no session
//! parameter of its own. [`scoped_session`] binds a [`SessionId`] to the
//! current task for the lifetime of a future; [`current_session`] reads it
//! back. The binding is a `tokio` task-local:
//!
//! - it is never shared between tasks, so no locking is needed;
//! - nested scopes shadow the outer binding and restore it on exit;
//! - exit covers normal completion, panics and the future being dropped
//!   (cancellation), because the previous value is restored by the scope
//!   guard rather than by code that runs after the body.
//!
//! Task-locals do not follow `tokio::spawn`. Use [`spawn_in_session`] to carry
//! the binding into a child task explicitly.

use std::future::Future;

use tokio::task::JoinHandle;

use crate::ids::SessionId;

tokio::task_local! {
    static CURRENT_SESSION: SessionId;
}

/// Run `fut` with `session_id` bound as the ambient session.
pub fn scoped_session<F>(session_id: SessionId, fut: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    CURRENT_SESSION.scope(session_id, fut)
}

/// Run a synchronous closure with `session_id` bound as the ambient session.
pub fn with_session<R>(session_id: SessionId, f: impl FnOnce() -> R) -> R {
    CURRENT_SESSION.sync_scope(session_id, f)
}

/// The ambient session of the calling task, if one is bound.
pub fn current_session() -> Option<SessionId> {
    CURRENT_SESSION.try_with(Clone::clone).ok()
}

/// Spawn `fut` on the runtime, re-binding `session_id` inside the new task.
pub fn spawn_in_session<F>(session_id: SessionId, fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(CURRENT_SESSION.scope(session_id, fut))
}
