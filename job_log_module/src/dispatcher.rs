//! Routing of inbound chat events.
//!
//! Each thread is either untracked or tracked. An untracked thread becomes
//! tracked once, on the first human message whose job tag is listed in the jobs
//! sheet and has a document; that message gets a reply in the thread either way.
//! Every later message in a tracked thread is appended to the document as a
//! reply line, and failures on that path are only logged.

use std::sync::Arc;

use chrono::FixedOffset;
use tracing::{debug, info, trace, warn};

use crate::attachments::{AttachmentReconciler, ReconcileOutcome, IMAGE_RELAY_FAILED_REPLY};
use crate::chat::{ChatMessage, InboundEvent};
use crate::collaborators::{ChatPlatform, DocumentHandle, DocumentStore, ImageRelay, JobRecords};
use crate::job_number::{extract_job_number, JobNumber};
use crate::thread_registry::{RegisterOutcome, ThreadRegistry, TrackedThread};
use crate::transcript::{format_messages, format_reply, AuthorNames};

/// Leading text of every reply this service posts into a thread.
const OWN_REPLY_PREFIXES: [&str; 5] = [
    ":white_check_mark: Got it! Logging to job #",
    ":warning: Job #",
    ":warning: No Google Doc found for job #",
    ":x: Could not validate job number #",
    IMAGE_RELAY_FAILED_REPLY,
];

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// User id of this bot, to drop the echo of its own replies.
    pub bot_user_id: Option<String>,
    /// Bot id of this bot, for the same purpose.
    pub bot_id: Option<String>,
    /// How many recent messages per conversation a `file_shared` scan inspects.
    pub history_limit: usize,
    /// Offset transcript times are rendered in.
    pub utc_offset: FixedOffset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NonContent,
    OwnMessage,
    Automated,
    NoJobTag,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Ignored(IgnoreReason),
    StartedTracking {
        thread_ts: String,
        job_number: JobNumber,
    },
    JobNotFound(JobNumber),
    DocumentNotFound(JobNumber),
    ValidationFailed(JobNumber),
    /// Another event bound the thread to the same job first.
    AlreadyTracked,
    RegistryConflict,
    ReplyLogged,
    ReplyNotLogged,
    FileShared(ReconcileOutcome),
}

/// Outcome of checking a job tag against the sheet and the document store.
enum Validation {
    Valid(DocumentHandle),
    NotInRecords,
    NoDocument,
    Failed,
}

pub struct EventDispatcher {
    registry: Arc<ThreadRegistry>,
    chat: Arc<dyn ChatPlatform>,
    records: Arc<dyn JobRecords>,
    documents: Arc<dyn DocumentStore>,
    attachments: AttachmentReconciler,
    settings: DispatcherSettings,
}

impl EventDispatcher {
    pub fn new(
        registry: Arc<ThreadRegistry>,
        chat: Arc<dyn ChatPlatform>,
        records: Arc<dyn JobRecords>,
        documents: Arc<dyn DocumentStore>,
        relay: Arc<dyn ImageRelay>,
        settings: DispatcherSettings,
    ) -> Self {
        let attachments = AttachmentReconciler::new(
            registry.clone(),
            chat.clone(),
            documents.clone(),
            relay,
            settings.history_limit,
        );
        Self {
            registry,
            chat,
            records,
            documents,
            attachments,
            settings,
        }
    }

    pub fn registry(&self) -> &ThreadRegistry {
        &self.registry
    }

    pub fn attachments(&self) -> &AttachmentReconciler {
        &self.attachments
    }

    pub async fn handle(&self, event: InboundEvent) -> DispatchOutcome {
        match event {
            InboundEvent::MessagePosted { channel, message } => {
                self.handle_message(&channel, &message).await
            }
            InboundEvent::FileShared { file_id } => self.handle_file_shared(&file_id).await,
        }
    }

    pub async fn handle_file_shared(&self, file_id: &str) -> DispatchOutcome {
        info!("file_shared event received with file_id: {}", file_id);
        DispatchOutcome::FileShared(self.attachments.reconcile_shared_file(file_id).await)
    }

    pub async fn handle_message(&self, channel: &str, message: &ChatMessage) -> DispatchOutcome {
        if !message.is_content() {
            trace!("ignoring {:?} message in {}", message.subtype, channel);
            return DispatchOutcome::Ignored(IgnoreReason::NonContent);
        }
        if self.is_own_message(message) {
            trace!("ignoring own message {} in {}", message.ts, channel);
            return DispatchOutcome::Ignored(IgnoreReason::OwnMessage);
        }

        let thread_ts = message.thread_key();
        if let Some(tracked) = self.registry.lookup(thread_ts) {
            return self.log_reply(channel, thread_ts, &tracked, message).await;
        }

        // Automation may post into tracked threads but never opens one.
        if message.is_automated() {
            trace!("ignoring automated message {} in {}", message.ts, channel);
            return DispatchOutcome::Ignored(IgnoreReason::Automated);
        }
        let Some(job_number) = extract_job_number(message.text_or_empty()) else {
            trace!("no job tag in message {} in {}", message.ts, channel);
            return DispatchOutcome::Ignored(IgnoreReason::NoJobTag);
        };

        info!("Detected job number: {}", job_number);
        self.start_tracking(channel, thread_ts, job_number, message)
            .await
    }

    fn is_own_message(&self, message: &ChatMessage) -> bool {
        let own_user = self.settings.bot_user_id.is_some()
            && message.user.as_deref() == self.settings.bot_user_id.as_deref();
        let own_bot = self.settings.bot_id.is_some()
            && message.bot_id.as_deref() == self.settings.bot_id.as_deref();
        // Without a known identity, fall back to recognising our reply texts.
        let own_text = message.is_automated()
            && OWN_REPLY_PREFIXES
                .iter()
                .any(|prefix| message.text_or_empty().starts_with(prefix));
        own_user || own_bot || own_text
    }

    async fn validate(&self, job_number: &JobNumber) -> Validation {
        match self.records.contains_job(job_number).await {
            Ok(true) => {}
            Ok(false) => return Validation::NotInRecords,
            Err(err) => {
                warn!("Validation failed for job {}: {}", job_number, err);
                return Validation::Failed;
            }
        }
        match self.documents.find_document(job_number).await {
            Ok(Some(document)) => Validation::Valid(document),
            Ok(None) => Validation::NoDocument,
            Err(err) => {
                warn!("document search failed for job {}: {}", job_number, err);
                Validation::Failed
            }
        }
    }

    async fn start_tracking(
        &self,
        channel: &str,
        thread_ts: &str,
        job_number: JobNumber,
        message: &ChatMessage,
    ) -> DispatchOutcome {
        let document = match self.validate(&job_number).await {
            Validation::Valid(document) => document,
            Validation::NotInRecords => {
                self.reply(
                    channel,
                    thread_ts,
                    &format!(":warning: Job #{} not found in records.", job_number),
                )
                .await;
                return DispatchOutcome::JobNotFound(job_number);
            }
            Validation::NoDocument => {
                self.reply(
                    channel,
                    thread_ts,
                    &format!(":warning: No Google Doc found for job #{}!", job_number),
                )
                .await;
                return DispatchOutcome::DocumentNotFound(job_number);
            }
            Validation::Failed => {
                self.reply(
                    channel,
                    thread_ts,
                    &format!(":x: Could not validate job number #{}.", job_number),
                )
                .await;
                return DispatchOutcome::ValidationFailed(job_number);
            }
        };

        // Registration is the single point that decides which of several
        // concurrent first messages mirrors the thread.
        match self
            .registry
            .register(thread_ts, job_number.clone(), document.clone())
        {
            RegisterOutcome::Registered => {}
            RegisterOutcome::AlreadyRegistered => {
                debug!("thread {} was registered by a concurrent event", thread_ts);
                return DispatchOutcome::AlreadyTracked;
            }
            RegisterOutcome::Conflict { .. } => return DispatchOutcome::RegistryConflict,
        }
        let tracked = TrackedThread {
            job_number: job_number.clone(),
            document,
        };

        self.reply(
            channel,
            thread_ts,
            &format!(":white_check_mark: Got it! Logging to job #{}.", job_number),
        )
        .await;

        match self.chat.fetch_thread(channel, thread_ts).await {
            Ok(history) => {
                let mut names = AuthorNames::new(self.chat.as_ref());
                let transcript =
                    format_messages(&history, true, &mut names, &self.settings.utc_offset).await;
                if transcript.is_empty() {
                    debug!("thread {} has no human messages to mirror", thread_ts);
                } else {
                    self.append(&tracked, &transcript).await;
                }
            }
            Err(err) => warn!("error fetching thread {}: {}", thread_ts, err),
        }

        self.attachments
            .process_attachments(channel, thread_ts, &tracked, &message.files)
            .await;

        DispatchOutcome::StartedTracking {
            thread_ts: thread_ts.to_string(),
            job_number,
        }
    }

    async fn log_reply(
        &self,
        channel: &str,
        thread_ts: &str,
        tracked: &TrackedThread,
        message: &ChatMessage,
    ) -> DispatchOutcome {
        info!("Logging reply in tracked thread {}", thread_ts);
        let mut names = AuthorNames::new(self.chat.as_ref());
        let line = format_reply(message, &mut names, &self.settings.utc_offset).await;
        let appended = self.append(tracked, &line).await;

        if message.files.is_empty() {
            debug!("no files on reply {} in thread {}", message.ts, thread_ts);
        } else {
            self.attachments
                .process_attachments(channel, thread_ts, tracked, &message.files)
                .await;
        }

        if appended {
            DispatchOutcome::ReplyLogged
        } else {
            DispatchOutcome::ReplyNotLogged
        }
    }

    async fn append(&self, tracked: &TrackedThread, text: &str) -> bool {
        match self.documents.append_text(&tracked.document, text).await {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "failed to append to doc {} for job {}: {}",
                    tracked.document.id, tracked.job_number, err
                );
                false
            }
        }
    }

    async fn reply(&self, channel: &str, thread_ts: &str, text: &str) {
        if let Err(err) = self.chat.post_thread_reply(channel, thread_ts, text).await {
            warn!("failed to reply in thread {}: {}", thread_ts, err);
        }
    }
}
