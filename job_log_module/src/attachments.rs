//! Attachment handling for tracked threads.
//!
//! Files reach the service two ways. Files listed on a message routed by the
//! dispatcher are handled in place ([`AttachmentReconciler::process_attachments`]).
//! A `file_shared` event carries only the file id; its owning thread is found by
//! scanning the recent history of every conversation the file was shared into
//! ([`AttachmentReconciler::reconcile_shared_file`]). That scan only covers the
//! last `history_limit` messages per conversation, so a file whose message has
//! scrolled past that window is dropped.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::chat::ChatFile;
use crate::collaborators::{ChatPlatform, DocumentStore, ImageRelay};
use crate::thread_registry::{ThreadRegistry, TrackedThread};
use crate::transcript::attachment_line;

pub const IMAGE_RELAY_FAILED_REPLY: &str = ":warning: sorry, I can't process that image. Please try sending as a link, or adding directly to the google doc";

/// What happened to the files of one message.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AttachmentReport {
    pub relayed: usize,
    pub linked: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Result of reconciling a `file_shared` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    NotAnImage,
    LookupFailed,
    Relayed { thread_ts: String },
    AlreadyRelayed { thread_ts: String },
    RelayFailed { thread_ts: String },
    NoTrackedThread,
}

pub struct AttachmentReconciler {
    registry: Arc<ThreadRegistry>,
    chat: Arc<dyn ChatPlatform>,
    documents: Arc<dyn DocumentStore>,
    relay: Arc<dyn ImageRelay>,
    history_limit: usize,
}

impl AttachmentReconciler {
    pub fn new(
        registry: Arc<ThreadRegistry>,
        chat: Arc<dyn ChatPlatform>,
        documents: Arc<dyn DocumentStore>,
        relay: Arc<dyn ImageRelay>,
        history_limit: usize,
    ) -> Self {
        Self {
            registry,
            chat,
            documents,
            relay,
            history_limit,
        }
    }

    /// Mirror the files of a routed message into the thread's document.
    ///
    /// Images with a private URL go through the image relay; a relay failure is
    /// reported back into the thread. Other files with a permalink become a
    /// reference line. Each file is handled independently.
    pub async fn process_attachments(
        &self,
        channel: &str,
        thread_ts: &str,
        tracked: &TrackedThread,
        files: &[ChatFile],
    ) -> AttachmentReport {
        let mut report = AttachmentReport::default();
        for file in files {
            match (file.is_image(), file.url_private.as_deref(), file.permalink.as_deref()) {
                (true, Some(url), _) => {
                    if !self.registry.mark_file_relayed(thread_ts, &file.id) {
                        debug!("file {} already relayed for thread {}", file.id, thread_ts);
                        report.skipped += 1;
                        continue;
                    }
                    match self.relay.relay_image(&tracked.document, url).await {
                        Ok(()) => {
                            info!("image {} relayed to doc {}", file.id, tracked.document.id);
                            report.relayed += 1;
                        }
                        Err(err) => {
                            warn!(
                                "image relay failed for {} (doc {}): {}",
                                file.id, tracked.document.id, err
                            );
                            report.failed += 1;
                            self.registry.release_file(thread_ts, &file.id);
                            if let Err(err) = self
                                .chat
                                .post_thread_reply(channel, thread_ts, IMAGE_RELAY_FAILED_REPLY)
                                .await
                            {
                                warn!("failed to post relay warning in {}: {}", thread_ts, err);
                            }
                        }
                    }
                }
                (_, _, Some(permalink)) => {
                    let line = attachment_line(file.name.as_deref(), permalink);
                    match self.documents.append_text(&tracked.document, &line).await {
                        Ok(()) => {
                            info!("file link {} appended to doc {}", permalink, tracked.document.id);
                            report.linked += 1;
                        }
                        Err(err) => {
                            warn!(
                                "failed to append file link for {} to doc {}: {}",
                                file.id, tracked.document.id, err
                            );
                            report.failed += 1;
                        }
                    }
                }
                _ => {
                    debug!("file {} has neither an image url nor a permalink", file.id);
                    report.skipped += 1;
                }
            }
        }
        report
    }

    /// Find the tracked thread owning a shared image and relay it there.
    pub async fn reconcile_shared_file(&self, file_id: &str) -> ReconcileOutcome {
        let file = match self.chat.file_info(file_id).await {
            Ok(file) => file,
            Err(err) => {
                warn!("files.info failed for {}: {}", file_id, err);
                return ReconcileOutcome::LookupFailed;
            }
        };
        let Some(image_url) = file.url_private.as_deref().filter(|_| file.is_image()) else {
            debug!("shared file {} is not a relayable image", file_id);
            return ReconcileOutcome::NotAnImage;
        };

        for conversation in file.conversations() {
            let history = match self
                .chat
                .channel_history(conversation, self.history_limit)
                .await
            {
                Ok(history) => history,
                Err(err) => {
                    warn!("history fetch failed for {}: {}", conversation, err);
                    continue;
                }
            };

            let owner = history.iter().find_map(|message| {
                let thread_ts = message.thread_ts.as_deref()?;
                if !message.has_file(file_id) {
                    return None;
                }
                self.registry
                    .lookup(thread_ts)
                    .map(|tracked| (thread_ts.to_string(), tracked))
            });
            let Some((thread_ts, tracked)) = owner else {
                continue;
            };

            if !self.registry.mark_file_relayed(&thread_ts, file_id) {
                debug!("shared file {} already relayed for thread {}", file_id, thread_ts);
                return ReconcileOutcome::AlreadyRelayed { thread_ts };
            }
            info!(
                "matched shared file {} to tracked thread {}; relaying to doc {}",
                file_id, thread_ts, tracked.document.id
            );
            return match self.relay.relay_image(&tracked.document, image_url).await {
                Ok(()) => ReconcileOutcome::Relayed { thread_ts },
                Err(err) => {
                    warn!("image relay failed for shared file {}: {}", file_id, err);
                    self.registry.release_file(&thread_ts, file_id);
                    ReconcileOutcome::RelayFailed { thread_ts }
                }
            };
        }

        debug!("no tracked thread found for shared file {}", file_id);
        ReconcileOutcome::NoTrackedThread
    }
}
