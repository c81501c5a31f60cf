//! Human-in-the-loop confirmation broker.
//!
//! Each confirmation is a tiny state machine: `Pending` resolves exactly once
//! to a human choice or to the configured default when the timeout fires,
//! whichever happens first. The pending map is the single source of truth
//! for "is this still awaiting a human"; removal from the map is the
//! resolution arbiter, so the race between a response and the timer can only
//! produce one winner.

use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::config::AllowlistStore;

use super::event_bus::{EventBus, Subscription};
use super::events::{ConfirmationChoice, ConfirmationOptions, EventKind, EventPayload};
use super::interceptor::SHELL_TOOLS;

/// Applied when a request carries no timeout of its own.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

struct PendingConfirmation {
    resolver: oneshot::Sender<ConfirmationChoice>,
    options: ConfirmationOptions,
}

/// Asynchronous confirmation broker with timeout and "remember" semantics.
pub struct ConfirmationManager {
    bus: Arc<EventBus>,
    pending: DashMap<String, PendingConfirmation>,
    allowlist: Arc<dyn AllowlistStore>,
}

impl ConfirmationManager {
    pub fn new(bus: Arc<EventBus>, allowlist: Arc<dyn AllowlistStore>) -> Arc<Self> {
        Arc::new(Self {
            bus,
            pending: DashMap::new(),
            allowlist,
        })
    }

    /// Subscribe this manager to confirmation-response events on its bus.
    /// The returned handle must outlive the manager's use; unsubscribing
    /// detaches response routing.
    pub fn attach(self: &Arc<Self>) -> Subscription {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.bus
            .subscribe(EventKind::ToolConfirmationResponse, move |event| {
                let EventPayload::ToolConfirmationResponse {
                    confirmation_id,
                    approved,
                    choice,
                } = &event.payload
                else {
                    return;
                };
                if let Some(manager) = weak.upgrade() {
                    manager.handle_response(confirmation_id, *approved, *choice);
                }
            })
    }

    /// Ask for approval, reducing the human's choice to a boolean.
    pub async fn request_approval(
        &self,
        tool_name: &str,
        args: Value,
        description: &str,
        options: ConfirmationOptions,
    ) -> bool {
        self.request_approval_with_choice(tool_name, args, description, options)
            .await
            .is_approval()
    }

    /// Ask for approval and return the full choice.
    ///
    /// Emits a confirmation-request event and suspends until a matching
    /// response arrives or the timeout elapses. On timeout the configured
    /// default choice (deny when unset) is applied, and a synthetic response
    /// event is emitted so observers see the resolution.
    pub async fn request_approval_with_choice(
        &self,
        tool_name: &str,
        args: Value,
        description: &str,
        options: ConfirmationOptions,
    ) -> ConfirmationChoice {
        let confirmation_id = format!("confirm-{}", Uuid::new_v4());
        let (resolver, mut receiver) = oneshot::channel();

        self.pending.insert(
            confirmation_id.clone(),
            PendingConfirmation {
                resolver,
                options: options.clone(),
            },
        );

        self.bus.emit(EventPayload::ToolConfirmationRequest {
            confirmation_id: confirmation_id.clone(),
            tool_name: tool_name.to_string(),
            args: args.clone(),
            description: description.to_string(),
            options: options.clone(),
        });

        let timeout = options
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TIMEOUT);
        let fallback = options.default_choice.unwrap_or(ConfirmationChoice::Deny);

        let sleep = tokio::time::sleep(timeout);
        tokio::pin!(sleep);

        let response = tokio::select! {
            response = &mut receiver => Some(response),
            _ = &mut sleep => None,
        };

        let choice = match response {
            Some(response) => response.unwrap_or(fallback),
            // Removal from the map is the arbiter: if the entry is still
            // there the timeout wins, otherwise a response beat the timer
            // and its choice is already on the resolver.
            None => {
                if self.pending.remove(&confirmation_id).is_some() {
                    tracing::warn!(
                        confirmation_id = %confirmation_id,
                        tool = tool_name,
                        "confirmation timed out, applying default choice"
                    );
                    self.bus.emit(EventPayload::ToolConfirmationResponse {
                        confirmation_id: confirmation_id.clone(),
                        approved: fallback.is_approval(),
                        choice: Some(fallback),
                    });
                    fallback
                } else {
                    receiver.await.unwrap_or(fallback)
                }
            }
        };

        if choice == ConfirmationChoice::ApproveAndRemember {
            self.remember_command(tool_name, &args);
        }

        choice
    }

    /// Route a confirmation response to its pending request. A response for
    /// an unknown (or already resolved) identifier is ignored with a
    /// diagnostic; it never faults.
    pub fn handle_response(
        &self,
        confirmation_id: &str,
        approved: bool,
        choice: Option<ConfirmationChoice>,
    ) {
        let Some((_, entry)) = self.pending.remove(confirmation_id) else {
            tracing::debug!(
                confirmation_id,
                "response for unknown or already-resolved confirmation ignored"
            );
            return;
        };

        let mut resolved = choice.unwrap_or(if approved {
            ConfirmationChoice::Approve
        } else {
            ConfirmationChoice::Deny
        });

        // "Remember" can only be granted when the request offered it.
        if resolved == ConfirmationChoice::ApproveAndRemember && !entry.options.show_remember_option
        {
            resolved = ConfirmationChoice::Approve;
        }

        if entry.resolver.send(resolved).is_err() {
            tracing::debug!(confirmation_id, "confirmation caller no longer waiting");
        }
    }

    /// Number of confirmations still awaiting resolution.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Persist the base command of an approved shell invocation. Failures
    /// are logged, never raised: the approval itself already stands.
    fn remember_command(&self, tool_name: &str, args: &Value) {
        if !SHELL_TOOLS.contains(&tool_name) {
            return;
        }
        let Some(command) = args.get("command").and_then(|v| v.as_str()) else {
            return;
        };
        let Some(base) = base_command_name(command) else {
            return;
        };

        if self.allowlist.allowlist().iter().any(|c| c == &base) {
            tracing::debug!(command = %base, "command already allowlisted");
            return;
        }
        match self.allowlist.append(&base) {
            Ok(()) => tracing::info!(command = %base, "command added to allowlist"),
            Err(e) => tracing::warn!(command = %base, error = %e, "failed to persist allowlist"),
        }
    }
}

/// Extract the base command token: first word of the command line with path
/// segments stripped, platform executable extensions removed, case-folded.
pub(crate) fn base_command_name(command: &str) -> Option<String> {
    let tokens = shell_words::split(command)
        .unwrap_or_else(|_| command.split_whitespace().map(ToString::to_string).collect());
    let first = tokens.into_iter().next()?;
    let stem = Path::new(&first).file_name()?.to_str()?;
    let lower = stem.to_lowercase();
    for ext in [".exe", ".bat", ".cmd", ".com"] {
        if let Some(stripped) = lower.strip_suffix(ext) {
            return Some(stripped.to_string());
        }
    }
    Some(lower)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemoryAllowlist {
        entries: Mutex<Vec<String>>,
        appends: AtomicUsize,
        fail: bool,
    }

    impl MemoryAllowlist {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }
    }

    impl AllowlistStore for MemoryAllowlist {
        fn allowlist(&self) -> Vec<String> {
            self.entries.lock().clone()
        }

        fn append(&self, name: &str) -> Result<(), CoreError> {
            self.appends.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CoreError::NoConfigDir);
            }
            self.entries.lock().push(name.to_string());
            Ok(())
        }
    }

    fn manager_with_store(
        store: Arc<MemoryAllowlist>,
    ) -> (Arc<ConfirmationManager>, Arc<EventBus>, Subscription) {
        let bus = EventBus::new("test-session");
        let manager = ConfirmationManager::new(bus.clone(), store);
        let sub = manager.attach();
        (manager, bus, sub)
    }

    fn auto_respond(
        bus: &Arc<EventBus>,
        approved: bool,
        choice: Option<ConfirmationChoice>,
    ) -> Subscription {
        let responder_bus = bus.clone();
        bus.subscribe(EventKind::ToolConfirmationRequest, move |event| {
            let EventPayload::ToolConfirmationRequest {
                confirmation_id, ..
            } = &event.payload
            else {
                return;
            };
            responder_bus.emit(EventPayload::ToolConfirmationResponse {
                confirmation_id: confirmation_id.clone(),
                approved,
                choice,
            });
        })
    }

    fn options(timeout_ms: u64) -> ConfirmationOptions {
        ConfirmationOptions {
            show_remember_option: true,
            default_choice: None,
            timeout_ms: Some(timeout_ms),
        }
    }

    #[tokio::test]
    async fn response_resolves_pending_confirmation() {
        let store = Arc::new(MemoryAllowlist::default());
        let (manager, bus, _sub) = manager_with_store(store);
        let _responder = auto_respond(&bus, true, Some(ConfirmationChoice::Approve));

        let choice = manager
            .request_approval_with_choice("shell", json!({ "command": "ls" }), "list", options(60_000))
            .await;

        assert_eq!(choice, ConfirmationChoice::Approve);
        assert_eq!(manager.pending_count(), 0);
    }

    #[tokio::test]
    async fn approval_wrapper_reduces_choice_to_bool() {
        let store = Arc::new(MemoryAllowlist::default());
        let (manager, bus, _sub) = manager_with_store(store);
        let _responder = auto_respond(&bus, true, Some(ConfirmationChoice::ApproveAndRemember));

        let approved = manager
            .request_approval("shell", json!({ "command": "ls" }), "list", options(60_000))
            .await;

        assert!(approved);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_applies_deny_when_no_default_configured() {
        let store = Arc::new(MemoryAllowlist::default());
        let (manager, _bus, _sub) = manager_with_store(store);

        let choice = manager
            .request_approval_with_choice("shell", json!({ "command": "rm x" }), "remove", options(1_000))
            .await;

        assert_eq!(choice, ConfirmationChoice::Deny);
        assert_eq!(manager.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_applies_configured_default_and_emits_synthetic_response() {
        let store = Arc::new(MemoryAllowlist::default());
        let (manager, bus, _sub) = manager_with_store(store);

        let responses = Arc::new(Mutex::new(Vec::new()));
        let sink = responses.clone();
        let _observer = bus.subscribe(EventKind::ToolConfirmationResponse, move |event| {
            sink.lock().push(event.payload.clone());
        });

        let opts = ConfirmationOptions {
            show_remember_option: false,
            default_choice: Some(ConfirmationChoice::Approve),
            timeout_ms: Some(2_000),
        };
        let choice = manager
            .request_approval_with_choice("write_file", json!({ "path": "a" }), "write", opts)
            .await;

        assert_eq!(choice, ConfirmationChoice::Approve);
        let responses = responses.lock();
        assert_eq!(responses.len(), 1);
        match &responses[0] {
            EventPayload::ToolConfirmationResponse {
                approved, choice, ..
            } => {
                assert!(approved);
                assert_eq!(*choice, Some(ConfirmationChoice::Approve));
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[tokio::test]
    async fn response_for_unknown_id_is_ignored() {
        let store = Arc::new(MemoryAllowlist::default());
        let (manager, bus, _sub) = manager_with_store(store);

        bus.emit(EventPayload::ToolConfirmationResponse {
            confirmation_id: "confirm-never-issued".to_string(),
            approved: true,
            choice: Some(ConfirmationChoice::Approve),
        });

        assert_eq!(manager.pending_count(), 0);
    }

    #[tokio::test]
    async fn second_resolution_has_no_observable_effect() {
        let store = Arc::new(MemoryAllowlist::default());
        let (manager, bus, _sub) = manager_with_store(store);

        // Respond twice to every request: deny first, then approve.
        let responder_bus = bus.clone();
        let _responder = bus.subscribe(EventKind::ToolConfirmationRequest, move |event| {
            let EventPayload::ToolConfirmationRequest {
                confirmation_id, ..
            } = &event.payload
            else {
                return;
            };
            for approved in [false, true] {
                responder_bus.emit(EventPayload::ToolConfirmationResponse {
                    confirmation_id: confirmation_id.clone(),
                    approved,
                    choice: None,
                });
            }
        });

        let choice = manager
            .request_approval_with_choice("shell", json!({ "command": "ls" }), "list", options(60_000))
            .await;

        // The first resolution wins; the duplicate is a no-op.
        assert_eq!(choice, ConfirmationChoice::Deny);
    }

    #[tokio::test]
    async fn concurrent_confirmations_resolve_independently() {
        let store = Arc::new(MemoryAllowlist::default());
        let (manager, bus, _sub) = manager_with_store(store);

        let ids = Arc::new(Mutex::new(Vec::new()));
        let sink = ids.clone();
        let _collector = bus.subscribe(EventKind::ToolConfirmationRequest, move |event| {
            if let EventPayload::ToolConfirmationRequest {
                confirmation_id,
                tool_name,
                ..
            } = &event.payload
            {
                sink.lock().push((confirmation_id.clone(), tool_name.clone()));
            }
        });

        let responder_bus = bus.clone();
        let responder_ids = ids.clone();
        let responder = tokio::spawn(async move {
            loop {
                {
                    let ids = responder_ids.lock();
                    if ids.len() == 2 {
                        for (id, tool) in ids.iter() {
                            responder_bus.emit(EventPayload::ToolConfirmationResponse {
                                confirmation_id: id.clone(),
                                approved: tool == "shell",
                                choice: None,
                            });
                        }
                        break;
                    }
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });

        let (first, second) = tokio::join!(
            manager.request_approval_with_choice(
                "shell",
                json!({ "command": "ls" }),
                "list",
                options(60_000),
            ),
            manager.request_approval_with_choice(
                "write_file",
                json!({ "path": "a" }),
                "write",
                options(60_000),
            ),
        );
        responder.await.unwrap();

        assert_eq!(first, ConfirmationChoice::Approve);
        assert_eq!(second, ConfirmationChoice::Deny);
    }

    #[tokio::test]
    async fn approve_and_remember_persists_base_command_once() {
        let store = Arc::new(MemoryAllowlist::default());
        let (manager, bus, _sub) = manager_with_store(store.clone());
        let _responder = auto_respond(&bus, true, Some(ConfirmationChoice::ApproveAndRemember));

        for _ in 0..3 {
            manager
                .request_approval_with_choice(
                    "shell",
                    json!({ "command": "/usr/local/bin/Cargo.EXE build --release" }),
                    "build",
                    options(60_000),
                )
                .await;
        }

        assert_eq!(store.allowlist(), vec!["cargo"]);
        assert_eq!(store.appends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn remember_is_downgraded_when_not_offered() {
        let store = Arc::new(MemoryAllowlist::default());
        let (manager, bus, _sub) = manager_with_store(store.clone());
        let _responder = auto_respond(&bus, true, Some(ConfirmationChoice::ApproveAndRemember));

        let opts = ConfirmationOptions {
            show_remember_option: false,
            default_choice: None,
            timeout_ms: Some(60_000),
        };
        let choice = manager
            .request_approval_with_choice("shell", json!({ "command": "ls" }), "list", opts)
            .await;

        assert_eq!(choice, ConfirmationChoice::Approve);
        assert!(store.allowlist().is_empty());
    }

    #[tokio::test]
    async fn allowlist_failure_does_not_undo_approval() {
        let store = Arc::new(MemoryAllowlist::failing());
        let (manager, bus, _sub) = manager_with_store(store.clone());
        let _responder = auto_respond(&bus, true, Some(ConfirmationChoice::ApproveAndRemember));

        let choice = manager
            .request_approval_with_choice(
                "shell",
                json!({ "command": "git push" }),
                "push",
                options(60_000),
            )
            .await;

        assert_eq!(choice, ConfirmationChoice::ApproveAndRemember);
        assert_eq!(store.appends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn remember_ignores_non_shell_tools() {
        let store = Arc::new(MemoryAllowlist::default());
        let (manager, bus, _sub) = manager_with_store(store.clone());
        let _responder = auto_respond(&bus, true, Some(ConfirmationChoice::ApproveAndRemember));

        manager
            .request_approval_with_choice(
                "write_file",
                json!({ "path": "a.txt" }),
                "write",
                options(60_000),
            )
            .await;

        assert!(store.allowlist().is_empty());
    }

    #[test]
    fn base_command_extraction() {
        assert_eq!(base_command_name("cargo build"), Some("cargo".to_string()));
        assert_eq!(
            base_command_name("/usr/bin/git push origin"),
            Some("git".to_string())
        );
        assert_eq!(
            base_command_name("C:/Tools/RipGrep.exe -n foo"),
            Some("ripgrep".to_string())
        );
        assert_eq!(base_command_name("Deploy.CMD --all"), Some("deploy".to_string()));
        assert_eq!(base_command_name("LS"), Some("ls".to_string()));
        assert_eq!(base_command_name(""), None);
    }
}
